//! Collaborator traits
//!
//! The sync engine only ever talks to a directory through [`DirectoryClient`]
//! and to persisted counters through [`KeyValueStore`].

use async_trait::async_trait;

use crate::error::ConnectorResult;
use crate::operation::{DestEntry, Entry, Filter, Scope, SearchPage};

/// A directory the engine reads from or writes to.
///
/// Source and destination are independent instances. Every call is a single
/// round trip; implementations own connection setup, TLS and timeouts.
#[async_trait]
pub trait DirectoryClient: Send + Sync {
    /// Display name used in logs.
    fn name(&self) -> &str;

    /// Authenticate against the directory.
    ///
    /// A rejected bind is reported as an error, never as a silent success.
    async fn bind(&self) -> ConnectorResult<()>;

    /// Run a single search and return every matching entry.
    ///
    /// # Arguments
    /// * `base` - Search base DN
    /// * `scope` - Search scope
    /// * `filter` - Search filter
    /// * `attributes` - Attributes to return (empty = all user attributes)
    async fn search(
        &self,
        base: &str,
        scope: Scope,
        filter: &Filter,
        attributes: &[String],
    ) -> ConnectorResult<Vec<Entry>>;

    /// Fetch one page of a paginated search.
    ///
    /// Pass `None` as cookie for the first page and the cookie of the previous
    /// page afterwards. The returned page carries no cookie on the last page.
    async fn search_page(
        &self,
        base: &str,
        scope: Scope,
        filter: &Filter,
        attributes: &[String],
        page_size: u32,
        cookie: Option<Vec<u8>>,
    ) -> ConnectorResult<SearchPage>;

    /// Write a reconciled record: an add when it is new, a modify otherwise.
    async fn apply(&self, entry: &DestEntry) -> ConnectorResult<()>;

    /// Read an attribute of the directory's root DSE (server metadata).
    async fn read_root_attribute(&self, attribute: &str) -> ConnectorResult<Option<String>>;

    /// Look up entries with `attribute=value` below `base`.
    async fn find_by(
        &self,
        base: &str,
        attribute: &str,
        value: &str,
        attributes: &[String],
    ) -> ConnectorResult<Vec<Entry>> {
        self.search(base, Scope::Subtree, &Filter::eq(attribute, value), attributes)
            .await
    }
}

/// Persisted string key-value storage (watermarks, identifier counters).
///
/// Implementations provide exclusive access for the lifetime of the handle;
/// the engine itself performs no locking.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Read a value; `None` when the key was never written.
    async fn get(&self, key: &str) -> ConnectorResult<Option<String>>;

    /// Write a value, replacing any previous one.
    async fn put(&self, key: &str, value: &str) -> ConnectorResult<()>;
}
