//! # Directory Sync Engine
//!
//! One-way reconciliation of users, groups and mailing lists from a source
//! directory into a destination directory.
//!
//! A run selects records changed since the last stored watermark, drops
//! blacklisted ones, looks up each record's destination counterpart and
//! creates or updates it through an [`AttributeMappingProfile`]. Member
//! references are translated on the way and numeric identifiers allocated
//! for new accounts.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   pages   ┌──────────────┐  add/modify  ┌──────────────┐
//! │    Source    │──────────►│  Synchronizer│─────────────►│ Destination  │
//! │  directory   │           │              │              │  directory   │
//! └──────────────┘           └──────┬───────┘              └──────────────┘
//!                                   │
//!                    ┌──────────────┼──────────────┐
//!                    ▼              ▼              ▼
//!             ┌────────────┐ ┌────────────┐ ┌────────────┐
//!             │ Blacklist  │ │ Reconciler │ │ Watermark  │
//!             │            │ │ + profiles │ │   store    │
//!             └────────────┘ └────────────┘ └────────────┘
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use dirsync_sync::{SyncConfig, SyncTarget, Synchronizer};
//!
//! let config = SyncConfig::from_file("dirsync.yaml")?;
//! let mut sync = Synchronizer::new(config, source, destination, store)?;
//! let status = sync.run(SyncTarget::User).await?;
//! println!("{status}");
//! ```

pub mod alias;
pub mod blacklist;
pub mod config;
pub mod error;
pub mod filter;
pub mod identifiers;
pub mod members;
pub mod paged;
pub mod profile;
pub mod reconcile;
pub mod runner;
pub mod status;
pub mod store;
pub mod watermark;

pub use alias::{AliasOutcome, AliasSyncer};
pub use blacklist::BlacklistFilter;
pub use config::{
    AliasConfig, Deployment, EntryConfig, IdentifierConfig, IdentifierPolicy, LogFormat,
    LoggingConfig, MemberConfig, MemberMode, MemberValueKind, SyncConfig,
};
pub use error::{SyncError, SyncResult};
pub use filter::FilterBuilder;
pub use identifiers::IdentifierAllocator;
pub use members::{MemberResolution, MemberResolver};
pub use paged::PagedSearchDriver;
pub use profile::{AttributeMappingProfile, EntryKind, ProfileStrategy};
pub use reconcile::{AddressChange, EntryReconciler, Reconciled, Reconciliation};
pub use runner::{SyncTarget, Synchronizer};
pub use status::SyncStatus;
pub use store::MemoryStore;
pub use watermark::ChangeTracker;
