//! Create-or-update reconciliation of one source record.
//!
//! The reconciler looks up the destination counterpart through the profile's
//! lookup key, computes the desired attribute set (plain mappings, hooks,
//! members, identifiers) and records it on a [`DestEntry`] as add/replace
//! operations. It never writes; the caller applies the result.

use tracing::{debug, error, instrument, warn};

use dirsync_connector::operation::{DestEntry, Entry};
use dirsync_connector::traits::DirectoryClient;
use dirsync_connector::transform::{escape_dn_value, strip_commas};

use crate::error::SyncResult;
use crate::identifiers::IdentifierAllocator;
use crate::members::{MemberResolution, MemberResolver};
use crate::profile::hooks::domain_of;
use crate::profile::AttributeMappingProfile;

/// A user address moved to another domain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressChange {
    /// Address on the source, before the change.
    pub old: String,
    /// Address written to the destination.
    pub new: String,
}

/// A destination record ready to be written.
#[derive(Debug, Clone)]
pub struct Reconciled {
    pub entry: DestEntry,
    pub address_change: Option<AddressChange>,
    pub members: Option<MemberResolution>,
}

/// Decision for one source record.
#[derive(Debug, Clone)]
pub enum Reconciliation {
    /// No destination counterpart; add it.
    Create(Reconciled),
    /// Counterpart found; modify it.
    Update(Reconciled),
    /// The record violates an invariant and must not be written.
    Discard { dn: String, reason: String },
    /// The record carries no lookup key.
    Skip { dn: String, reason: String },
}

impl Reconciliation {
    /// The record to write, if any.
    pub fn reconciled(&self) -> Option<&Reconciled> {
        match self {
            Reconciliation::Create(r) | Reconciliation::Update(r) => Some(r),
            _ => None,
        }
    }
}

/// Reconciles source records against the destination.
pub struct EntryReconciler<'a> {
    source: &'a dyn DirectoryClient,
    destination: &'a dyn DirectoryClient,
    allocator: &'a mut IdentifierAllocator,
    domain: Option<&'a str>,
}

impl<'a> EntryReconciler<'a> {
    pub fn new(
        source: &'a dyn DirectoryClient,
        destination: &'a dyn DirectoryClient,
        allocator: &'a mut IdentifierAllocator,
        domain: Option<&'a str>,
    ) -> Self {
        Self {
            source,
            destination,
            allocator,
            domain,
        }
    }

    /// Reconcile `record` under `profile`. `created` is the number of records
    /// created so far in this run.
    #[instrument(skip(self, profile, record), fields(kind = %profile.kind, dn = %record.dn()))]
    pub async fn reconcile(
        &mut self,
        profile: &AttributeMappingProfile,
        record: &Entry,
        created: u64,
    ) -> SyncResult<Reconciliation> {
        let Some(key) = profile.login(record) else {
            warn!(attribute = %profile.lookup.source, "Lookup attribute missing on source; skipped");
            return Ok(Reconciliation::Skip {
                dn: record.dn().to_string(),
                reason: format!("no {} value", profile.lookup.source),
            });
        };

        let existing = self
            .destination
            .find_by(&profile.base_dn, &profile.lookup.destination, key, &[])
            .await?
            .into_iter()
            .next();
        let is_new = existing.is_none();
        debug!(key = %key, is_new, "Destination lookup done");

        let mut desired = Desired::default();

        for mapping in &profile.mappings {
            if profile.is_computed(&mapping.target) {
                continue;
            }
            let values: Vec<String> = record
                .get(&mapping.source)
                .iter()
                .filter(|v| !v.is_empty())
                .cloned()
                .collect();
            if values.is_empty() {
                warn!(attribute = %mapping.source, "Source attribute missing or empty; skipped");
                continue;
            }
            desired.put(&mapping.target, values);
        }

        for hook in &profile.hooks {
            let applies = if is_new {
                hook.applies_on_create()
            } else {
                hook.applies_on_update()
            };
            if !applies {
                continue;
            }
            match hook.compute(record, profile) {
                Some(values) => desired.put(hook.target(), values),
                None => debug!(hook = hook.name(), attribute = hook.target(), "Hook produced no value"),
            }
        }

        let mut members = None;
        if let Some(slot) = &profile.members {
            let resolution = MemberResolver::new(self.source, self.destination, self.domain)
                .resolve(slot, record)
                .await?;
            if resolution.is_empty() {
                error!(
                    references = resolution.references,
                    "No member could be resolved; entry discarded"
                );
                return Ok(Reconciliation::Discard {
                    dn: record.dn().to_string(),
                    reason: format!(
                        "none of {} member reference(s) resolved",
                        resolution.references
                    ),
                });
            }
            desired.put(&slot.config.target_attribute, resolution.values.clone());
            members = Some(resolution);
        }

        if let Some(attribute) = &profile.identifier {
            let current = existing.as_ref().and_then(|e| e.first(attribute));
            match current {
                Some(id) => debug!(attribute = %attribute, id = %id, "Keeping existing identifier"),
                None => {
                    let id = self
                        .allocator
                        .allocate(attribute, record, created, self.destination, &profile.base_dn)
                        .await?;
                    desired.put(attribute, vec![id.to_string()]);
                }
            }
        }

        let mut entry = match existing {
            Some(existing) => DestEntry::update(existing),
            None => {
                let naming = desired
                    .first(&profile.rdn_attribute)
                    .unwrap_or(key)
                    .to_string();
                let rdn_plain = strip_commas(&naming);
                let dn = format!(
                    "{}={},{}",
                    profile.rdn_attribute,
                    escape_dn_value(&rdn_plain),
                    profile.base_dn
                );

                let mut naming_values = desired.take(&profile.rdn_attribute).unwrap_or_default();
                if !naming_values.contains(&rdn_plain) {
                    naming_values.push(rdn_plain);
                }
                desired.put(&profile.rdn_attribute, naming_values);

                let mut entry = DestEntry::create(dn);
                entry.set("objectClass", profile.object_classes.clone());
                entry
            }
        };

        for (name, values) in desired.into_inner() {
            entry.set(name, values);
        }

        let address_change = profile.address_trigger.as_ref().and_then(|trigger| {
            if !entry.is_pending(&trigger.target_attribute) {
                return None;
            }
            let old = record.first(&trigger.source_attribute)?;
            let new = entry.current(&trigger.target_attribute).first()?;
            let moved = domain_of(old) != domain_of(new);
            moved.then(|| AddressChange {
                old: old.to_string(),
                new: new.clone(),
            })
        });

        debug!(dn = %entry.dn(), changes = entry.ops().len(), "Entry reconciled");

        let reconciled = Reconciled {
            entry,
            address_change,
            members,
        };
        Ok(if is_new {
            Reconciliation::Create(reconciled)
        } else {
            Reconciliation::Update(reconciled)
        })
    }
}

/// Desired attribute values in recording order; a later value for the same
/// attribute replaces the earlier one.
#[derive(Debug, Default)]
struct Desired(Vec<(String, Vec<String>)>);

impl Desired {
    fn put(&mut self, name: &str, values: Vec<String>) {
        match self.0.iter_mut().find(|(n, _)| n.eq_ignore_ascii_case(name)) {
            Some((_, slot)) => *slot = values,
            None => self.0.push((name.to_string(), values)),
        }
    }

    fn first(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .and_then(|(_, v)| v.first())
            .map(String::as_str)
    }

    fn take(&mut self, name: &str) -> Option<Vec<String>> {
        let index = self.0.iter().position(|(n, _)| n.eq_ignore_ascii_case(name))?;
        Some(self.0.remove(index).1)
    }

    fn into_inner(self) -> Vec<(String, Vec<String>)> {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_desired_later_value_wins() {
        let mut desired = Desired::default();
        desired.put("mail", vec!["a@corp.local".into()]);
        desired.put("cn", vec!["John".into()]);
        desired.put("Mail", vec!["a@example.org".into()]);

        assert_eq!(desired.first("mail"), Some("a@example.org"));
        assert_eq!(desired.take("cn"), Some(vec!["John".to_string()]));
        assert_eq!(desired.into_inner().len(), 1);
    }
}
