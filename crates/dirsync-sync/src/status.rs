//! Per-run counters.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::profile::EntryKind;

/// Counters for one `run` call; never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncStatus {
    /// Target type the run processed.
    pub target: EntryKind,
    /// Records created on the destination.
    pub new_entries: u64,
    /// Records updated on the destination.
    pub upd_entries: u64,
    /// Records excluded by the deny list.
    pub blacklisted: u64,
    /// Write failures and discarded records.
    pub errors: u64,
    /// Records without a lookup key.
    pub skipped: u64,
    /// Alias records written.
    pub aliases_synced: u64,
    /// Alias records that failed.
    pub alias_errors: u64,
    /// Watermark stored at the end of the run, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub watermark: Option<u64>,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl SyncStatus {
    /// Fresh counters, stamped with the current time.
    #[must_use]
    pub fn new(target: EntryKind) -> Self {
        Self {
            target,
            new_entries: 0,
            upd_entries: 0,
            blacklisted: 0,
            errors: 0,
            skipped: 0,
            aliases_synced: 0,
            alias_errors: 0,
            watermark: None,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    /// Records looked at, whatever their fate.
    #[must_use]
    pub fn processed(&self) -> u64 {
        self.new_entries + self.upd_entries + self.blacklisted + self.errors + self.skipped
    }

    /// Mark the run finished.
    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    /// Run duration in milliseconds, once finished.
    #[must_use]
    pub fn duration_ms(&self) -> Option<i64> {
        self.finished_at
            .map(|end| (end - self.started_at).num_milliseconds())
    }
}

impl std::fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}: new={} updated={} blacklisted={} errors={} skipped={} aliases={} alias_errors={}",
            self.target,
            self.new_entries,
            self.upd_entries,
            self.blacklisted,
            self.errors,
            self.skipped,
            self.aliases_synced,
            self.alias_errors
        )
    }
}
