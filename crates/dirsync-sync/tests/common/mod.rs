//! Shared fixtures for the sync integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once};

use dirsync_connector::error::{ConnectorError, ConnectorResult};
use dirsync_connector::operation::{DestEntry, Entry, Filter, Scope, SearchPage};
use dirsync_connector::traits::{DirectoryClient, KeyValueStore};
use dirsync_sync::{MemoryStore, SyncConfig, Synchronizer};

static INIT: Once = Once::new();

/// Route engine logs to the test writer once per binary.
pub fn init_test_logging() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter("dirsync_sync=debug")
            .with_test_writer()
            .try_init();
    });
}

// =============================================================================
// Mock directory
// =============================================================================

/// In-memory directory with call counters and failure switches.
///
/// Searches evaluate the structured filter; raw fragments always match.
pub struct MockDirectory {
    name: String,
    entries: Mutex<Vec<Entry>>,
    root: Mutex<HashMap<String, String>>,
    applied: Mutex<Vec<DestEntry>>,
    filters: Mutex<Vec<String>>,
    fail_bind: AtomicBool,
    fail_page: AtomicUsize,
    fail_apply: Mutex<Option<String>>,
    bind_calls: AtomicUsize,
    search_calls: AtomicUsize,
    page_calls: AtomicUsize,
    apply_calls: AtomicUsize,
}

impl MockDirectory {
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            entries: Mutex::new(Vec::new()),
            root: Mutex::new(HashMap::new()),
            applied: Mutex::new(Vec::new()),
            filters: Mutex::new(Vec::new()),
            fail_bind: AtomicBool::new(false),
            fail_page: AtomicUsize::new(0),
            fail_apply: Mutex::new(None),
            bind_calls: AtomicUsize::new(0),
            search_calls: AtomicUsize::new(0),
            page_calls: AtomicUsize::new(0),
            apply_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_entry(self, entry: Entry) -> Self {
        self.entries.lock().unwrap().push(entry);
        self
    }

    pub fn with_root(self, attribute: &str, value: &str) -> Self {
        self.root
            .lock()
            .unwrap()
            .insert(attribute.to_string(), value.to_string());
        self
    }

    pub fn with_bind_error(self) -> Self {
        self.fail_bind.store(true, Ordering::SeqCst);
        self
    }

    /// Fail the `n`th page request (1-based).
    pub fn with_page_error(self, n: usize) -> Self {
        self.fail_page.store(n, Ordering::SeqCst);
        self
    }

    /// Reject writes to `dn`.
    pub fn with_apply_error(self, dn: &str) -> Self {
        *self.fail_apply.lock().unwrap() = Some(dn.to_lowercase());
        self
    }

    pub fn entry(&self, dn: &str) -> Option<Entry> {
        self.entries
            .lock()
            .unwrap()
            .iter()
            .find(|e| e.dn().eq_ignore_ascii_case(dn))
            .cloned()
    }

    pub fn entry_count(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn applied(&self) -> Vec<DestEntry> {
        self.applied.lock().unwrap().clone()
    }

    pub fn filters(&self) -> Vec<String> {
        self.filters.lock().unwrap().clone()
    }

    pub fn bind_count(&self) -> usize {
        self.bind_calls.load(Ordering::SeqCst)
    }

    pub fn search_count(&self) -> usize {
        self.search_calls.load(Ordering::SeqCst)
    }

    pub fn page_count(&self) -> usize {
        self.page_calls.load(Ordering::SeqCst)
    }

    pub fn apply_count(&self) -> usize {
        self.apply_calls.load(Ordering::SeqCst)
    }

    fn matching(&self, base: &str, scope: Scope, filter: &Filter) -> Vec<Entry> {
        let base = base.to_lowercase();
        self.entries
            .lock()
            .unwrap()
            .iter()
            .filter(|e| {
                let dn = e.dn().to_lowercase();
                match scope {
                    Scope::Base => dn == base,
                    Scope::OneLevel | Scope::Subtree => {
                        base.is_empty() || dn == base || dn.ends_with(&format!(",{base}"))
                    }
                }
            })
            .filter(|e| filter_matches(filter, e))
            .cloned()
            .collect()
    }
}

fn filter_matches(filter: &Filter, entry: &Entry) -> bool {
    match filter {
        Filter::Equals { attribute, value } => entry
            .get(attribute)
            .iter()
            .any(|v| v.eq_ignore_ascii_case(value)),
        Filter::GreaterThanOrEquals { attribute, value } => {
            compare(entry, attribute, value, |a, b| a >= b)
        }
        Filter::Present { attribute } => entry.has_value(attribute),
        Filter::And { filters } => filters.iter().all(|f| filter_matches(f, entry)),
        Filter::Not { filter } => !filter_matches(filter, entry),
        Filter::Raw { .. } => true,
    }
}

fn compare(entry: &Entry, attribute: &str, value: &str, op: fn(u64, u64) -> bool) -> bool {
    let Ok(wanted) = value.parse::<u64>() else {
        return false;
    };
    entry
        .get(attribute)
        .iter()
        .filter_map(|v| v.parse::<u64>().ok())
        .any(|v| op(v, wanted))
}

#[async_trait]
impl DirectoryClient for MockDirectory {
    fn name(&self) -> &str {
        &self.name
    }

    async fn bind(&self) -> ConnectorResult<()> {
        self.bind_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_bind.load(Ordering::SeqCst) {
            return Err(ConnectorError::AuthenticationFailed);
        }
        Ok(())
    }

    async fn search(
        &self,
        base: &str,
        scope: Scope,
        filter: &Filter,
        _attributes: &[String],
    ) -> ConnectorResult<Vec<Entry>> {
        self.search_calls.fetch_add(1, Ordering::SeqCst);
        self.filters.lock().unwrap().push(filter.to_ldap());
        let found = self.matching(base, scope, filter);
        if scope == Scope::Base && found.is_empty() {
            return Err(ConnectorError::ObjectNotFound {
                identifier: base.to_string(),
            });
        }
        Ok(found)
    }

    async fn search_page(
        &self,
        base: &str,
        scope: Scope,
        filter: &Filter,
        _attributes: &[String],
        page_size: u32,
        cookie: Option<Vec<u8>>,
    ) -> ConnectorResult<SearchPage> {
        let call = self.page_calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.filters.lock().unwrap().push(filter.to_ldap());
        if self.fail_page.load(Ordering::SeqCst) == call {
            return Err(ConnectorError::connection_failed("connection reset by peer"));
        }

        let offset = cookie
            .and_then(|c| String::from_utf8(c).ok())
            .and_then(|c| c.parse::<usize>().ok())
            .unwrap_or(0);
        let all = self.matching(base, scope, filter);
        let end = (offset + page_size as usize).min(all.len());
        let next = (end < all.len()).then(|| end.to_string().into_bytes());
        Ok(SearchPage::new(all[offset..end].to_vec(), next))
    }

    async fn apply(&self, entry: &DestEntry) -> ConnectorResult<()> {
        self.apply_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_apply.lock().unwrap().as_deref() == Some(entry.dn().to_lowercase().as_str()) {
            return Err(ConnectorError::protocol(
                65,
                "objectClassViolation",
                Some("missing required attribute".to_string()),
            ));
        }

        self.applied.lock().unwrap().push(entry.clone());
        let mut entries = self.entries.lock().unwrap();
        let position = entries
            .iter()
            .position(|e| e.dn().eq_ignore_ascii_case(entry.dn()));
        match (entry.is_new(), position) {
            (true, Some(_)) => Err(ConnectorError::ObjectAlreadyExists {
                identifier: entry.dn().to_string(),
            }),
            (true, None) => {
                entries.push(entry.resulting_entry());
                Ok(())
            }
            (false, Some(index)) => {
                entries[index] = entry.resulting_entry();
                Ok(())
            }
            (false, None) => Err(ConnectorError::ObjectNotFound {
                identifier: entry.dn().to_string(),
            }),
        }
    }

    async fn read_root_attribute(&self, attribute: &str) -> ConnectorResult<Option<String>> {
        Ok(self.root.lock().unwrap().get(attribute).cloned())
    }
}

// =============================================================================
// Fixtures
// =============================================================================

pub const SOURCE_BASE: &str = "DC=corp,DC=local";
pub const PEOPLE: &str = "ou=people,dc=example,dc=org";
pub const GROUPS: &str = "ou=groups,dc=example,dc=org";
pub const LISTS: &str = "ou=lists,dc=example,dc=org";
pub const ALIASES: &str = "ou=aliases,dc=example,dc=org";

pub const CONFIG: &str = r#"
source:
  host: ad.corp.local
  base_dn: "DC=corp,DC=local"
  bind_dn: "CN=sync,OU=Service,DC=corp,DC=local"
  bind_password: source-secret
  page_size: 2
destination:
  host: ldap.example.org
  base_dn: dc=example,dc=org
  bind_dn: cn=admin,dc=example,dc=org
  bind_password: destination-secret
  page_size: 0
mail_domain: example.org
blacklist:
  - "CN=svc-"
users:
  source_object_class: user
  source_base: "OU=Staff,DC=corp,DC=local"
  base_dn: ou=people,dc=example,dc=org
  object_classes: [top, person, organizationalPerson, inetOrgPerson, posixAccount]
  rdn_attribute: uid
  lookup: { source: sAMAccountName, destination: uid }
  mappings:
    - { source: sAMAccountName, target: uid }
    - { source: displayName, target: cn }
    - { source: sn, target: sn }
    - { source: givenName, target: givenName }
    - { source: mail, target: mail }
  defaults:
    - { attribute: gidNumber, values: ["100"] }
  home_directory: /home/{login}
  login_shell: /bin/bash
groups:
  source_object_class: group
  source_base: "OU=Groups,DC=corp,DC=local"
  base_dn: ou=groups,dc=example,dc=org
  object_classes: [top, posixGroup]
  rdn_attribute: cn
  lookup: { source: sAMAccountName, destination: cn }
  mappings:
    - { source: sAMAccountName, target: cn }
    - { source: description, target: description }
  members:
    target_attribute: memberUid
lists:
  source_object_class: group
  source_base: "OU=Lists,DC=corp,DC=local"
  base_dn: ou=lists,dc=example,dc=org
  object_classes: [top, mailGroup]
  rdn_attribute: cn
  lookup: { source: sAMAccountName, destination: cn }
  mappings:
    - { source: sAMAccountName, target: cn }
  mail_attribute: mail
  nickname_attribute: mailNickname
  members:
    target_attribute: mgrpRFC822MailMember
    value_kind: address
    mode: unverified
"#;

pub const ALIAS_SECTION: &str = r#"
deployment: mail_hosting
aliases:
  base_dn: ou=aliases,dc=example,dc=org
  object_classes: [top, mailAlias]
  mapping_name_attribute: mail
  mapping_value_attribute: mailRoutingAddress
  mailhost_attribute: mailHost
  mailhost: mx.example.org
"#;

pub fn config() -> SyncConfig {
    SyncConfig::from_yaml(CONFIG).unwrap()
}

pub fn config_with(extra: &str) -> SyncConfig {
    SyncConfig::from_yaml(&format!("{CONFIG}{extra}")).unwrap()
}

/// A source user below `OU=Staff`.
pub fn user(login: &str, display: &str, change: u64) -> Entry {
    let (given, sn) = display.split_once(' ').unwrap_or((display, display));
    Entry::new(format!("CN={display},OU=Staff,{SOURCE_BASE}"))
        .with("objectClass", ["top", "person", "organizationalPerson", "user"])
        .with("sAMAccountName", [login])
        .with("displayName", [display])
        .with("givenName", [given])
        .with("sn", [sn])
        .with("uSNChanged", [change.to_string()])
}

/// A source group below `OU=Groups`.
pub fn group(name: &str, members: &[&str], change: u64) -> Entry {
    Entry::new(format!("CN={name},OU=Groups,{SOURCE_BASE}"))
        .with("objectClass", ["top", "group"])
        .with("sAMAccountName", [name])
        .with("member", members.iter().copied())
        .with("uSNChanged", [change.to_string()])
}

/// An account already present on the destination.
pub fn destination_user(login: &str, uid_number: u64) -> Entry {
    Entry::new(format!("uid={login},{PEOPLE}"))
        .with("objectClass", ["top", "posixAccount"])
        .with("uid", [login])
        .with("uidNumber", [uid_number.to_string()])
}

pub struct Harness {
    pub source: Arc<MockDirectory>,
    pub destination: Arc<MockDirectory>,
    pub store: Arc<MemoryStore>,
    pub sync: Synchronizer,
}

pub fn harness(
    config: SyncConfig,
    source: MockDirectory,
    destination: MockDirectory,
    store: MemoryStore,
) -> Harness {
    init_test_logging();
    let source = Arc::new(source);
    let destination = Arc::new(destination);
    let store = Arc::new(store);
    let sync = Synchronizer::new(
        config,
        Arc::clone(&source) as Arc<dyn DirectoryClient>,
        Arc::clone(&destination) as Arc<dyn DirectoryClient>,
        Arc::clone(&store) as Arc<dyn KeyValueStore>,
    )
    .unwrap();
    Harness {
        source,
        destination,
        store,
        sync,
    }
}
