//! The sync run loop.
//!
//! ```text
//! bind ─► watermark + live high-water ─► filter ─► pages ─┐
//!                                                         ▼
//!            record watermark ◄─ counters ◄─ apply ◄─ reconcile ◄─ blacklist
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

use dirsync_connector::operation::{Entry, Filter, Scope};
use dirsync_connector::traits::{DirectoryClient, KeyValueStore};

use crate::alias::AliasSyncer;
use crate::blacklist::BlacklistFilter;
use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::filter::FilterBuilder;
use crate::identifiers::IdentifierAllocator;
use crate::paged::PagedSearchDriver;
use crate::profile::{strategy_for, AttributeMappingProfile, EntryKind, ProfileStrategy};
use crate::reconcile::{EntryReconciler, Reconciliation};
use crate::status::SyncStatus;
use crate::watermark::ChangeTracker;

/// Entry types a run can target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncTarget {
    User,
    Group,
    List,
}

impl SyncTarget {
    /// Every target, in the order a full pass runs them.
    pub const ALL: [SyncTarget; 3] = [SyncTarget::User, SyncTarget::Group, SyncTarget::List];

    #[must_use]
    pub fn kind(&self) -> EntryKind {
        match self {
            SyncTarget::User => EntryKind::User,
            SyncTarget::Group => EntryKind::Group,
            SyncTarget::List => EntryKind::List,
        }
    }
}

impl std::fmt::Display for SyncTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.kind())
    }
}

impl std::str::FromStr for SyncTarget {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.parse::<EntryKind>()? {
            EntryKind::User => Ok(SyncTarget::User),
            EntryKind::Group => Ok(SyncTarget::Group),
            EntryKind::List => Ok(SyncTarget::List),
            EntryKind::Alias => Err(SyncError::InvalidTarget(s.to_string())),
        }
    }
}

/// Drives runs for one source/destination pair.
pub struct Synchronizer {
    config: SyncConfig,
    source: Arc<dyn DirectoryClient>,
    destination: Arc<dyn DirectoryClient>,
    strategy: Box<dyn ProfileStrategy>,
    profiles: HashMap<EntryKind, Arc<AttributeMappingProfile>>,
    alias_profile: Option<AttributeMappingProfile>,
    blacklist: BlacklistFilter,
    tracker: ChangeTracker,
    filter_builder: FilterBuilder,
    allocator: IdentifierAllocator,
    filter_override: Option<Filter>,
    dry_run: bool,
}

impl Synchronizer {
    /// Validate `config` and build every configured profile.
    pub fn new(
        config: SyncConfig,
        source: Arc<dyn DirectoryClient>,
        destination: Arc<dyn DirectoryClient>,
        store: Arc<dyn KeyValueStore>,
    ) -> SyncResult<Self> {
        config.validate()?;

        let strategy = strategy_for(config.deployment);
        let mut profiles = HashMap::new();
        for target in SyncTarget::ALL {
            let configured = match target {
                SyncTarget::User => config.users.is_some(),
                SyncTarget::Group => config.groups.is_some(),
                SyncTarget::List => config.lists.is_some(),
            };
            if configured {
                let profile = strategy.profile(target.kind(), &config)?;
                debug!(profile = ?profile, "Profile built");
                profiles.insert(target.kind(), Arc::new(profile));
            }
        }

        let alias_profile = match (&config.aliases, strategy.syncs_aliases()) {
            (Some(_), true) => Some(strategy.profile(EntryKind::Alias, &config)?),
            _ => None,
        };

        info!(
            deployment = strategy.name(),
            incremental = config.incremental,
            profiles = profiles.len(),
            aliases = alias_profile.is_some(),
            "Synchronizer configured"
        );

        Ok(Self {
            blacklist: BlacklistFilter::new(&config.blacklist)?,
            tracker: ChangeTracker::new(Arc::clone(&store)),
            filter_builder: FilterBuilder::new(config.incremental, &config.change_attribute),
            allocator: IdentifierAllocator::new(config.identifiers.clone(), store),
            config,
            source,
            destination,
            strategy,
            profiles,
            alias_profile,
            filter_override: None,
            dry_run: false,
        })
    }

    /// Reconcile and log without writing anything.
    #[must_use]
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn strategy_name(&self) -> &'static str {
        self.strategy.name()
    }

    /// Profile for a configured target.
    pub fn profile(&self, target: SyncTarget) -> Option<&AttributeMappingProfile> {
        self.profiles.get(&target.kind()).map(AsRef::as_ref)
    }

    pub fn tracker(&self) -> &ChangeTracker {
        &self.tracker
    }

    /// Use `filter` instead of the built filter for the next run only.
    pub fn set_filter_override(&mut self, filter: Filter) {
        self.filter_override = Some(filter);
    }

    /// Snapshot the watermark and reset it so the next run selects everything.
    pub async fn begin_full_resync(&self) -> SyncResult<u64> {
        self.tracker.begin_full_resync().await
    }

    /// Run one pass over `target`.
    #[instrument(skip(self), fields(dry_run = self.dry_run))]
    pub async fn run(&mut self, target: SyncTarget) -> SyncResult<SyncStatus> {
        let mut status = SyncStatus::new(target.kind());
        let filter_override = self.filter_override.take();

        let profile = self.profiles.get(&target.kind()).cloned().ok_or_else(|| {
            SyncError::configuration(format!("no {} section configured", target.kind()))
        })?;

        self.allocator.start_run();
        info!(target = %target, "Starting sync run");

        self.source
            .bind()
            .await
            .map_err(|e| SyncError::bind(self.source.name(), e))?;
        self.destination
            .bind()
            .await
            .map_err(|e| SyncError::bind(self.destination.name(), e))?;

        let (watermark, high_water) = if self.config.incremental {
            let watermark = self.tracker.fetch_watermark().await?;
            let high_water = self.read_high_water().await?;
            info!(watermark, high_water, "Incremental run");
            (watermark, Some(high_water))
        } else {
            (0, None)
        };

        let filter = match filter_override {
            Some(filter) => {
                info!(filter = %filter, "Using one-shot filter override");
                filter
            }
            None => self.filter_builder.build(&profile, watermark),
        };

        let source = Arc::clone(&self.source);
        let mut pages = PagedSearchDriver::new(
            source.as_ref(),
            profile.source_base.clone(),
            Scope::Subtree,
            filter,
            Vec::new(),
            self.config.source.page_size,
        );

        loop {
            let page = match pages.next_page().await {
                Ok(Some(page)) => page,
                Ok(None) => break,
                Err(e) => {
                    status.finish();
                    error!(summary = %status, alert = true, "Run aborted by source search failure");
                    return Err(e);
                }
            };

            for record in &page {
                self.process(&profile, record, &mut status).await?;
            }
        }

        if let Some(high_water) = high_water {
            if self.dry_run {
                info!(high_water, "Dry run; watermark not recorded");
            } else if self.tracker.record_watermark(high_water).await? {
                status.watermark = Some(high_water);
            }
        }

        status.finish();
        info!(
            target = %target,
            new = status.new_entries,
            updated = status.upd_entries,
            blacklisted = status.blacklisted,
            errors = status.errors,
            skipped = status.skipped,
            aliases = status.aliases_synced,
            alias_errors = status.alias_errors,
            pages = pages.pages(),
            "Sync run finished"
        );
        Ok(status)
    }

    async fn read_high_water(&self) -> SyncResult<u64> {
        let attribute = &self.config.watermark_attribute;
        let value = self
            .source
            .read_root_attribute(attribute)
            .await
            .map_err(|e| SyncError::metadata(attribute, e.diagnostic()))?
            .ok_or_else(|| SyncError::metadata(attribute, "not present in root DSE"))?;

        value
            .trim()
            .parse::<u64>()
            .map_err(|_| SyncError::metadata(attribute, format!("'{value}' is not a number")))
    }

    /// Blacklist gate, reconciliation, write and counters for one record.
    ///
    /// Only fatal errors are returned; everything else is logged and counted.
    async fn process(
        &mut self,
        profile: &AttributeMappingProfile,
        record: &Entry,
        status: &mut SyncStatus,
    ) -> SyncResult<()> {
        let dn = record.dn();
        if self.blacklist.is_blacklisted(dn) {
            info!(dn = %dn, "Blacklisted; skipped");
            status.blacklisted += 1;
            return Ok(());
        }

        let domain = self.config.mail_domain.as_deref();
        let mut reconciler = EntryReconciler::new(
            self.source.as_ref(),
            self.destination.as_ref(),
            &mut self.allocator,
            domain,
        );

        let outcome = match reconciler.reconcile(profile, record, status.new_entries).await {
            Ok(outcome) => outcome,
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                error!(dn = %dn, error = %e.diagnostic(), "Reconciliation failed");
                status.errors += 1;
                return Ok(());
            }
        };

        let reconciled = match outcome {
            Reconciliation::Skip { dn, reason } => {
                info!(dn = %dn, reason = %reason, "Skipped");
                status.skipped += 1;
                return Ok(());
            }
            Reconciliation::Discard { dn, reason } => {
                error!(dn = %dn, reason = %reason, "Entry discarded");
                status.errors += 1;
                return Ok(());
            }
            Reconciliation::Create(r) | Reconciliation::Update(r) => r,
        };

        let entry = &reconciled.entry;
        if self.dry_run {
            info!(dn = %entry.dn(), is_new = entry.is_new(), ops = ?entry.ops(), "Dry run; entry not written");
        } else if let Err(e) = self.destination.apply(entry).await {
            error!(
                dn = %entry.dn(),
                code = e.error_code(),
                error = %e.diagnostic(),
                "Destination write failed"
            );
            status.errors += 1;
            return Ok(());
        }

        if entry.is_new() {
            status.new_entries += 1;
            info!(dn = %entry.dn(), "Entry created");
        } else {
            status.upd_entries += 1;
            debug!(dn = %entry.dn(), changes = entry.ops().len(), "Entry updated");
        }

        if let (Some(change), Some(alias_profile), Some(alias_config)) = (
            &reconciled.address_change,
            &self.alias_profile,
            &self.config.aliases,
        ) {
            let syncer = AliasSyncer::new(
                alias_profile,
                alias_config,
                self.destination.as_ref(),
                self.dry_run,
            );
            let mut reconciler = EntryReconciler::new(
                self.source.as_ref(),
                self.destination.as_ref(),
                &mut self.allocator,
                domain,
            );
            match syncer.sync(&mut reconciler, change).await {
                Ok(_) => status.aliases_synced += 1,
                Err(e) => {
                    warn!(old = %change.old, new = %change.new, error = %e.diagnostic(), "Alias synchronisation failed");
                    status.alias_errors += 1;
                }
            }
        }

        Ok(())
    }
}

impl std::fmt::Debug for Synchronizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Synchronizer")
            .field("source", &self.source.name())
            .field("destination", &self.destination.name())
            .field("strategy", &self.strategy.name())
            .field("dry_run", &self.dry_run)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_parse() {
        assert_eq!("user".parse::<SyncTarget>().unwrap(), SyncTarget::User);
        assert_eq!("lists".parse::<SyncTarget>().unwrap(), SyncTarget::List);
        assert!("alias".parse::<SyncTarget>().is_err());
        assert!("all".parse::<SyncTarget>().is_err());
        assert_eq!(SyncTarget::Group.to_string(), "group");
    }
}
