//! Alias records for users whose address moved to another domain.
//!
//! The alias is keyed by the old address and points at the new one. It goes
//! through the same create-or-update reconciliation as any other record, but
//! its outcome never affects the user entry that triggered it.

use tracing::{info, instrument};

use dirsync_connector::operation::Entry;
use dirsync_connector::traits::DirectoryClient;

use crate::config::AliasConfig;
use crate::error::{SyncError, SyncResult};
use crate::profile::AttributeMappingProfile;
use crate::reconcile::{AddressChange, EntryReconciler, Reconciliation};

/// What happened to an alias record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AliasOutcome {
    Created,
    Updated,
}

/// Synchronises alias records.
pub struct AliasSyncer<'a> {
    profile: &'a AttributeMappingProfile,
    config: &'a AliasConfig,
    destination: &'a dyn DirectoryClient,
    dry_run: bool,
}

impl<'a> AliasSyncer<'a> {
    pub fn new(
        profile: &'a AttributeMappingProfile,
        config: &'a AliasConfig,
        destination: &'a dyn DirectoryClient,
        dry_run: bool,
    ) -> Self {
        Self {
            profile,
            config,
            destination,
            dry_run,
        }
    }

    /// The record an alias is reconciled from.
    pub fn alias_record(&self, change: &AddressChange) -> Entry {
        Entry::new(change.old.clone())
            .with(self.config.mapping_name_attribute.clone(), [change.old.clone()])
            .with(self.config.mapping_value_attribute.clone(), [change.new.clone()])
    }

    /// Create or update the alias for `change` and write it.
    #[instrument(skip(self, reconciler), fields(old = %change.old, new = %change.new))]
    pub async fn sync(
        &self,
        reconciler: &mut EntryReconciler<'_>,
        change: &AddressChange,
    ) -> SyncResult<AliasOutcome> {
        let record = self.alias_record(change);

        let (entry, outcome) = match reconciler.reconcile(self.profile, &record, 0).await? {
            Reconciliation::Create(r) => (r.entry, AliasOutcome::Created),
            Reconciliation::Update(r) => (r.entry, AliasOutcome::Updated),
            Reconciliation::Discard { reason, .. } | Reconciliation::Skip { reason, .. } => {
                return Err(SyncError::alias(&change.old, reason));
            }
        };

        if self.dry_run {
            info!(dn = %entry.dn(), outcome = ?outcome, "Dry run; alias not written");
            return Ok(outcome);
        }

        self.destination.apply(&entry).await?;
        info!(dn = %entry.dn(), outcome = ?outcome, "Alias synchronised");
        Ok(outcome)
    }
}
