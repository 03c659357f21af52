//! Membership resolution.
//!
//! Translates member references found on a source group or list into values
//! the destination understands: logins, DNs or mail addresses.

use tracing::{debug, info, instrument, warn};

use dirsync_connector::error::ConnectorError;
use dirsync_connector::operation::{Entry, Filter, Scope};
use dirsync_connector::traits::DirectoryClient;
use dirsync_connector::transform::{escape_dn_value, transliterate};

use crate::config::{MemberMode, MemberValueKind};
use crate::error::SyncResult;
use crate::profile::{MembershipSlot, UserLocator};

/// Outcome of resolving one record's members.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemberResolution {
    /// Kept values, in reference order, without duplicates.
    pub values: Vec<String>,
    /// References present on the source record.
    pub references: usize,
    /// References whose source account was found.
    pub source_found: usize,
    /// Values kept for the destination.
    pub confirmed: usize,
}

impl MemberResolution {
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Resolves member references across both directories.
pub struct MemberResolver<'a> {
    source: &'a dyn DirectoryClient,
    destination: &'a dyn DirectoryClient,
    domain: Option<&'a str>,
}

impl<'a> MemberResolver<'a> {
    pub fn new(
        source: &'a dyn DirectoryClient,
        destination: &'a dyn DirectoryClient,
        domain: Option<&'a str>,
    ) -> Self {
        Self {
            source,
            destination,
            domain,
        }
    }

    /// Resolve every reference in the slot's source attribute of `entry`.
    #[instrument(skip(self, slot, entry), fields(dn = %entry.dn(), mode = ?slot.config.mode))]
    pub async fn resolve(&self, slot: &MembershipSlot, entry: &Entry) -> SyncResult<MemberResolution> {
        let references = entry.get(&slot.config.source_attribute);
        let mut resolution = MemberResolution {
            references: references.len(),
            ..Default::default()
        };

        for reference in references.iter().filter(|r| !r.is_empty()) {
            let account = self.lookup_source(&slot.users, reference).await?;
            if account.is_some() {
                resolution.source_found += 1;
            }

            let value = match slot.config.mode {
                MemberMode::Verified => {
                    self.verified_value(slot, reference, account.as_ref())
                        .await?
                }
                MemberMode::Unverified => self.unverified_value(slot, reference, account.as_ref()),
            };

            match value {
                Some(value) => {
                    if !resolution.values.contains(&value) {
                        resolution.values.push(value);
                    }
                }
                None => warn!(member = %reference, "Bad member"),
            }
        }

        resolution.confirmed = resolution.values.len();

        match slot.config.mode {
            MemberMode::Verified => info!(
                source_members = resolution.source_found,
                destination_members = resolution.confirmed,
                "Members verified on destination"
            ),
            MemberMode::Unverified => info!(
                source_members = resolution.source_found,
                destination_members = resolution.confirmed,
                verified = false,
                "Members kept without destination check"
            ),
        }

        Ok(resolution)
    }

    /// Find the source account a reference names, by DN or by login.
    async fn lookup_source(&self, users: &UserLocator, reference: &str) -> SyncResult<Option<Entry>> {
        let attributes = vec![
            users.source_login_attribute.clone(),
            users.source_mail_attribute.clone(),
        ];

        let found = if looks_like_dn(reference) {
            self.source
                .search(reference, Scope::Base, &Filter::present("objectClass"), &attributes)
                .await
        } else {
            self.source
                .find_by(
                    &users.source_base,
                    &users.source_login_attribute,
                    reference,
                    &attributes,
                )
                .await
        };

        match found {
            Ok(entries) => Ok(entries.into_iter().next()),
            Err(ConnectorError::ObjectNotFound { .. }) => Ok(None),
            Err(e) if e.is_transient() => Err(e.into()),
            Err(e) => {
                warn!(member = %reference, error = %e.diagnostic(), "Source member lookup failed");
                Ok(None)
            }
        }
    }

    async fn verified_value(
        &self,
        slot: &MembershipSlot,
        reference: &str,
        account: Option<&Entry>,
    ) -> SyncResult<Option<String>> {
        let users = &slot.users;
        let Some(login) = account.and_then(|a| a.first(&users.source_login_attribute)) else {
            debug!(member = %reference, "Member has no source account");
            return Ok(None);
        };

        let found = self
            .destination
            .find_by(
                &users.destination_base,
                &users.destination_login_attribute,
                login,
                &[
                    users.destination_login_attribute.clone(),
                    users.destination_mail_attribute.clone(),
                ],
            )
            .await?;
        let Some(existing) = found.into_iter().next() else {
            debug!(member = %reference, login = %login, "Member not present on destination");
            return Ok(None);
        };

        Ok(match slot.config.value_kind {
            MemberValueKind::Login => Some(
                existing
                    .first(&users.destination_login_attribute)
                    .unwrap_or(login)
                    .to_string(),
            ),
            MemberValueKind::Dn => Some(existing.dn().to_string()),
            MemberValueKind::Address => existing
                .first(&users.destination_mail_attribute)
                .map(str::to_string)
                .or_else(|| self.synthesized_address(login)),
        })
    }

    fn unverified_value(
        &self,
        slot: &MembershipSlot,
        reference: &str,
        account: Option<&Entry>,
    ) -> Option<String> {
        let users = &slot.users;
        let login = account
            .and_then(|a| a.first(&users.source_login_attribute))
            .or_else(|| (!looks_like_dn(reference)).then_some(reference))?;

        match slot.config.value_kind {
            MemberValueKind::Login => Some(login.to_string()),
            MemberValueKind::Dn => Some(format!(
                "{}={},{}",
                users.destination_rdn_attribute,
                escape_dn_value(login),
                users.destination_base
            )),
            MemberValueKind::Address => account
                .and_then(|a| a.first(&users.source_mail_attribute))
                .map(str::to_string)
                .or_else(|| self.synthesized_address(login)),
        }
    }

    fn synthesized_address(&self, login: &str) -> Option<String> {
        let domain = self.domain?;
        Some(transliterate(&format!("{login}@{domain}")))
    }
}

/// Whether a member reference is a distinguished name rather than a login.
fn looks_like_dn(reference: &str) -> bool {
    reference
        .split_once(',')
        .map_or(reference.contains('='), |(rdn, _)| rdn.contains('='))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_looks_like_dn() {
        assert!(looks_like_dn("CN=John Doe,OU=Staff,DC=corp,DC=local"));
        assert!(looks_like_dn("uid=jdoe"));
        assert!(!looks_like_dn("jdoe"));
        assert!(!looks_like_dn("doe, john"));
    }
}
