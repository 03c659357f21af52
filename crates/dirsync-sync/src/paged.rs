//! Source search driver.
//!
//! Runs either one plain search or a cookie-driven paged search. Pages are
//! fetched one at a time when the caller asks for them; nothing is prefetched.

use tracing::{debug, error, instrument};

use dirsync_connector::operation::{Entry, Filter, Scope};
use dirsync_connector::traits::DirectoryClient;

use crate::error::{SyncError, SyncResult};

#[derive(Debug, Clone, PartialEq, Eq)]
enum State {
    NotStarted,
    Continue(Vec<u8>),
    Done,
}

/// A finite, non-restartable sequence of source pages.
pub struct PagedSearchDriver<'a> {
    client: &'a dyn DirectoryClient,
    base: String,
    scope: Scope,
    filter: Filter,
    attributes: Vec<String>,
    page_size: u32,
    state: State,
    pages: usize,
}

impl<'a> PagedSearchDriver<'a> {
    /// Page size 0 selects a single plain search.
    pub fn new(
        client: &'a dyn DirectoryClient,
        base: impl Into<String>,
        scope: Scope,
        filter: Filter,
        attributes: Vec<String>,
        page_size: u32,
    ) -> Self {
        Self {
            client,
            base: base.into(),
            scope,
            filter,
            attributes,
            page_size,
            state: State::NotStarted,
            pages: 0,
        }
    }

    /// Whether paging is used.
    pub fn is_paged(&self) -> bool {
        self.page_size > 0
    }

    /// Pages fetched so far.
    pub fn pages(&self) -> usize {
        self.pages
    }

    /// Fetch the next page; `None` once the sequence is exhausted.
    ///
    /// A failed page ends the sequence and is returned as an error.
    #[instrument(skip(self), fields(base = %self.base, page = self.pages + 1))]
    pub async fn next_page(&mut self) -> SyncResult<Option<Vec<Entry>>> {
        let cookie = match std::mem::replace(&mut self.state, State::Done) {
            State::Done => return Ok(None),
            State::NotStarted => None,
            State::Continue(cookie) => Some(cookie),
        };

        let result = if self.is_paged() {
            self.client
                .search_page(
                    &self.base,
                    self.scope,
                    &self.filter,
                    &self.attributes,
                    self.page_size,
                    cookie,
                )
                .await
                .map(|page| {
                    if let Some(next) = page.cookie.filter(|c| !c.is_empty()) {
                        self.state = State::Continue(next);
                    }
                    page.entries
                })
        } else {
            self.client
                .search(&self.base, self.scope, &self.filter, &self.attributes)
                .await
        };

        match result {
            Ok(entries) => {
                self.pages += 1;
                debug!(
                    count = entries.len(),
                    more = self.state != State::Done,
                    "Source page fetched"
                );
                Ok(Some(entries))
            }
            Err(e) => {
                error!(error = %e.diagnostic(), pages = self.pages, "Source search failed");
                Err(SyncError::search(
                    format!(
                        "search below {} failed after {} page(s)",
                        self.base, self.pages
                    ),
                    e,
                ))
            }
        }
    }
}

impl std::fmt::Debug for PagedSearchDriver<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PagedSearchDriver")
            .field("directory", &self.client.name())
            .field("base", &self.base)
            .field("filter", &self.filter.to_ldap())
            .field("page_size", &self.page_size)
            .field("pages", &self.pages)
            .finish()
    }
}
