//! Incremental change watermark.
//!
//! The stored `highestCommittedUSN` only ever moves forward during incremental
//! runs. A full resync snapshots it into `oldUSN` and resets it to zero so the
//! next filter selects every source record.

use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use dirsync_connector::traits::KeyValueStore;

use crate::error::{SyncError, SyncResult};

/// Key of the stored watermark.
pub const WATERMARK_KEY: &str = "highestCommittedUSN";

/// Key of the snapshot taken by a full resync.
pub const OLD_WATERMARK_KEY: &str = "oldUSN";

/// Owns the persisted watermark.
#[derive(Clone)]
pub struct ChangeTracker {
    store: Arc<dyn KeyValueStore>,
}

impl ChangeTracker {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Stored watermark; 0 when never written.
    #[instrument(skip(self))]
    pub async fn fetch_watermark(&self) -> SyncResult<u64> {
        let value = self.store.get(WATERMARK_KEY).await?;
        let watermark = match value {
            Some(raw) => parse_watermark(&raw)?,
            None => 0,
        };
        debug!(watermark, "Fetched watermark");
        Ok(watermark)
    }

    /// Snapshot the current watermark and reset it to 0.
    #[instrument(skip(self))]
    pub async fn begin_full_resync(&self) -> SyncResult<u64> {
        let current = self.fetch_watermark().await?;
        self.store
            .put(OLD_WATERMARK_KEY, &current.to_string())
            .await?;
        self.store.put(WATERMARK_KEY, "0").await?;
        info!(previous = current, "Full resync requested; watermark reset");
        Ok(current)
    }

    /// Persist `new_value` if it advances the watermark. Returns whether it
    /// was stored.
    #[instrument(skip(self))]
    pub async fn record_watermark(&self, new_value: u64) -> SyncResult<bool> {
        let current = self.fetch_watermark().await?;
        if new_value <= current {
            if new_value < current {
                warn!(current, new_value, "Refusing to move watermark backwards");
            }
            return Ok(false);
        }

        self.store
            .put(WATERMARK_KEY, &new_value.to_string())
            .await?;
        info!(previous = current, watermark = new_value, "Watermark advanced");
        Ok(true)
    }

    /// Value saved by the last full resync.
    pub async fn previous_watermark(&self) -> SyncResult<Option<u64>> {
        match self.store.get(OLD_WATERMARK_KEY).await? {
            Some(raw) => parse_watermark(&raw).map(Some),
            None => Ok(None),
        }
    }
}

fn parse_watermark(raw: &str) -> SyncResult<u64> {
    raw.trim()
        .parse::<u64>()
        .map_err(|_| SyncError::store(format!("stored watermark '{raw}' is not a number")))
}

impl std::fmt::Debug for ChangeTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeTracker").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn tracker_with(pairs: &[(&str, &str)]) -> ChangeTracker {
        ChangeTracker::new(Arc::new(MemoryStore::with_values(pairs.iter().copied())))
    }

    #[tokio::test]
    async fn test_absent_watermark_is_zero() {
        let tracker = tracker_with(&[]);
        assert_eq!(tracker.fetch_watermark().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_watermark_never_decreases() {
        let tracker = tracker_with(&[]);
        assert!(tracker.record_watermark(100).await.unwrap());
        assert!(!tracker.record_watermark(50).await.unwrap());
        assert!(!tracker.record_watermark(100).await.unwrap());
        assert_eq!(tracker.fetch_watermark().await.unwrap(), 100);
    }

    #[tokio::test]
    async fn test_full_resync_snapshots_and_resets() {
        let tracker = tracker_with(&[(WATERMARK_KEY, "4711")]);
        assert_eq!(tracker.begin_full_resync().await.unwrap(), 4711);
        assert_eq!(tracker.fetch_watermark().await.unwrap(), 0);
        assert_eq!(tracker.previous_watermark().await.unwrap(), Some(4711));

        assert!(tracker.record_watermark(4800).await.unwrap());
    }

    #[tokio::test]
    async fn test_garbage_watermark_is_store_error() {
        let tracker = tracker_with(&[(WATERMARK_KEY, "abc")]);
        assert!(matches!(
            tracker.fetch_watermark().await,
            Err(SyncError::Store { .. })
        ));
    }
}
