//! Numeric identifier allocation (`uidNumber`, `gidNumber`).
//!
//! Every candidate is checked against the destination before it is handed
//! out; a conflict moves on to the next candidate, up to `max_attempts`.
//! The SID-derived policy is deterministic and keeps its candidate on a
//! conflict.

use rand::Rng;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, error, instrument, warn};

use dirsync_connector::operation::Entry;
use dirsync_connector::sid::SecurityIdentifier;
use dirsync_connector::traits::{DirectoryClient, KeyValueStore};

use crate::config::{IdentifierConfig, IdentifierPolicy};
use crate::error::{SyncError, SyncResult};

/// Prefix of the persisted maintenance counters; the attribute name follows.
pub const COUNTER_KEY_PREFIX: &str = "maintenance.";

/// Maintenance-counter key for an identifier attribute.
pub fn counter_key(attribute: &str) -> String {
    format!("{COUNTER_KEY_PREFIX}{attribute}")
}

/// Allocates numeric identifiers under the configured policy.
pub struct IdentifierAllocator {
    config: IdentifierConfig,
    store: Arc<dyn KeyValueStore>,
    /// Extra offset consumed by conflicts in offset mode during this run.
    offset_skew: u64,
}

impl IdentifierAllocator {
    pub fn new(config: IdentifierConfig, store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            config,
            store,
            offset_skew: 0,
        }
    }

    pub fn policy(&self) -> IdentifierPolicy {
        self.config.policy
    }

    /// Reset per-run state.
    pub fn start_run(&mut self) {
        self.offset_skew = 0;
    }

    /// Allocate a value for `attribute` of a new destination record below
    /// `base_dn`. `created` is the number of records created so far in this run.
    #[instrument(skip(self, source, destination), fields(dn = %source.dn()))]
    pub async fn allocate(
        &mut self,
        attribute: &str,
        source: &Entry,
        created: u64,
        destination: &dyn DirectoryClient,
        base_dn: &str,
    ) -> SyncResult<u64> {
        if self.config.policy == IdentifierPolicy::Sid {
            let id = self.derive_from_sid(attribute, source)?;
            if self.in_use(destination, base_dn, attribute, id).await? {
                warn!(attribute = %attribute, id, "SID-derived identifier already in use on destination; keeping it");
            }
            return Ok(id);
        }

        for attempt in 1..=self.config.max_attempts {
            let candidate = if self.config.policy == IdentifierPolicy::Offset {
                self.config.base_offset + created + self.offset_skew
            } else {
                self.next_from_counter(attribute).await?
            };

            if !self.in_use(destination, base_dn, attribute, candidate).await? {
                debug!(attribute = %attribute, id = candidate, attempt, "Identifier allocated");
                return Ok(candidate);
            }

            warn!(attribute = %attribute, id = candidate, attempt, "Identifier already in use; retrying");
            if self.config.policy == IdentifierPolicy::Offset {
                self.offset_skew += 1;
            }
        }

        error!(attribute = %attribute, attempts = self.config.max_attempts, alert = true, "No free identifier found");
        Err(SyncError::allocation(
            attribute,
            format!(
                "no free value after {} attempts",
                self.config.max_attempts
            ),
        ))
    }

    /// Counter value when present (advancing it), otherwise a random draw.
    async fn next_from_counter(&self, attribute: &str) -> SyncResult<u64> {
        let key = counter_key(attribute);
        let stored = self.store.get(&key).await?;

        let current = match stored.as_deref().map(str::trim).map(u64::from_str) {
            Some(Ok(value)) => Some(value),
            Some(Err(_)) => {
                warn!(key = %key, "Maintenance counter is not a number; using random fallback");
                None
            }
            None => None,
        };

        match current {
            Some(value) => {
                if let Err(e) = self.store.put(&key, &(value + 1).to_string()).await {
                    error!(key = %key, error = %e, "Failed to advance maintenance counter");
                }
                Ok(value)
            }
            None => {
                let value = rand::thread_rng()
                    .gen_range(self.config.random_min..=self.config.random_max);
                debug!(key = %key, value, "No maintenance counter; drew random identifier");
                Ok(value)
            }
        }
    }

    fn derive_from_sid(&self, attribute: &str, source: &Entry) -> SyncResult<u64> {
        let raw = source.first(&self.config.sid_attribute).ok_or_else(|| {
            SyncError::allocation(
                attribute,
                format!("source has no {}", self.config.sid_attribute),
            )
        })?;
        let sid: SecurityIdentifier = raw
            .parse()
            .map_err(|e| SyncError::allocation(attribute, format!("{e}")))?;
        let rid = sid
            .rid()
            .ok_or_else(|| SyncError::allocation(attribute, "security identifier has no RID"))?;
        Ok(u64::from(rid) + self.config.sid_offset)
    }

    async fn in_use(
        &self,
        destination: &dyn DirectoryClient,
        base_dn: &str,
        attribute: &str,
        id: u64,
    ) -> SyncResult<bool> {
        let found = destination
            .find_by(base_dn, attribute, &id.to_string(), &[attribute.to_string()])
            .await?;
        Ok(!found.is_empty())
    }
}

impl std::fmt::Debug for IdentifierAllocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentifierAllocator")
            .field("config", &self.config)
            .field("offset_skew", &self.offset_skew)
            .finish()
    }
}
