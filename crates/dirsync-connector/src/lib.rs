//! # Directory Connector Framework
//!
//! Collaborator abstractions for directory-to-directory synchronisation.
//!
//! The sync engine never speaks a wire protocol itself. It consumes:
//!
//! - [`DirectoryClient`] - search, paged search, add/modify and root DSE reads
//! - [`KeyValueStore`] - persisted watermarks and identifier counters
//!
//! ## Crate Organization
//!
//! - [`error`] - Error types with transient/permanent classification
//! - [`operation`] - Entries, pending attribute operations, filters, pages
//! - [`traits`] - Collaborator traits
//! - [`config`] - Connection and TLS settings
//! - [`transform`] - Escaping and transliteration helpers
//! - [`sid`] - Security identifier parsing
//!
//! [`DirectoryClient`]: traits::DirectoryClient
//! [`KeyValueStore`]: traits::KeyValueStore

pub mod config;
pub mod error;
pub mod operation;
pub mod sid;
pub mod traits;
pub mod transform;

/// Prelude module for convenient imports.
///
/// ```
/// use dirsync_connector::prelude::*;
/// ```
pub mod prelude {
    pub use crate::config::{ConnectionSettings, TlsConfig};
    pub use crate::error::{ConnectorError, ConnectorResult};
    pub use crate::operation::{AttributeOp, DestEntry, Entry, Filter, Scope, SearchPage};
    pub use crate::sid::SecurityIdentifier;
    pub use crate::traits::{DirectoryClient, KeyValueStore};
}

// Re-export async_trait for collaborator implementors
pub use async_trait::async_trait;
