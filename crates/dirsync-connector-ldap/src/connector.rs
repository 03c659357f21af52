//! LDAP directory client
//!
//! Implements [`DirectoryClient`] for LDAP and Active Directory over `ldap3`.

use async_trait::async_trait;
use base64::Engine as _;
use ldap3::controls::{Control, ControlType, PagedResults, RawControl};
use ldap3::{Ldap, LdapConnAsync, LdapConnSettings, LdapResult, Mod, SearchEntry};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};

use dirsync_connector::error::{ConnectorError, ConnectorResult};
use dirsync_connector::operation::{AttributeOp, DestEntry, Entry, Filter, Scope, SearchPage};
use dirsync_connector::sid::SecurityIdentifier;
use dirsync_connector::traits::DirectoryClient;

use crate::config::LdapConfig;

/// Binary attribute decoded into its textual security identifier form.
const OBJECT_SID: &str = "objectSid";

/// LDAP result codes the client distinguishes.
const RC_SUCCESS: u32 = 0;
const RC_NO_SUCH_OBJECT: u32 = 32;
const RC_INVALID_CREDENTIALS: u32 = 49;
const RC_ALREADY_EXISTS: u32 = 68;

/// A source or destination directory reached over LDAP.
pub struct LdapDirectory {
    /// Configuration.
    config: LdapConfig,

    /// Display name for logs.
    display_name: String,

    /// Bound connection, established by [`DirectoryClient::bind`] or lazily.
    connection: Arc<RwLock<Option<Ldap>>>,
}

impl LdapDirectory {
    /// Create a directory client; nothing is contacted until the first call.
    pub fn new(name: impl Into<String>, config: LdapConfig) -> ConnectorResult<Self> {
        config.validate()?;

        Ok(Self {
            display_name: name.into(),
            config,
            connection: Arc::new(RwLock::new(None)),
        })
    }

    /// Configuration of this directory.
    pub fn config(&self) -> &LdapConfig {
        &self.config
    }

    async fn get_connection(&self) -> ConnectorResult<Ldap> {
        {
            let guard = self.connection.read().await;
            if let Some(ref conn) = *guard {
                return Ok(conn.clone());
            }
        }

        let conn = self.connect_and_bind().await?;
        *self.connection.write().await = Some(conn.clone());
        Ok(conn)
    }

    async fn connect_and_bind(&self) -> ConnectorResult<Ldap> {
        let url = self.config.url();
        debug!(directory = %self.display_name, url = %url, "Connecting to LDAP server");

        let settings = LdapConnSettings::new()
            .set_conn_timeout(self.config.connection.connection_timeout())
            .set_starttls(self.config.use_starttls)
            .set_no_tls_verify(!self.config.tls.verify_certificate);

        let (conn, mut ldap) = LdapConnAsync::with_settings(settings, &url)
            .await
            .map_err(|e| {
                ConnectorError::connection_failed_with_source(
                    format!("failed to connect to LDAP server at {url}"),
                    e,
                )
            })?;

        let directory = self.display_name.clone();
        tokio::spawn(async move {
            if let Err(e) = conn.drive().await {
                warn!(directory = %directory, error = %e, "LDAP connection driver error");
            }
        });

        let bind_dn = &self.config.bind_dn;
        let bind_password = self.config.bind_password.as_deref().unwrap_or("");

        debug!(bind_dn = %bind_dn, "Performing LDAP bind");

        let result = ldap
            .simple_bind(bind_dn, bind_password)
            .await
            .map_err(|e| {
                ConnectorError::connection_failed_with_source(
                    format!("LDAP bind failed for {bind_dn}"),
                    e,
                )
            })?;

        if result.rc == RC_INVALID_CREDENTIALS {
            return Err(ConnectorError::AuthenticationFailed);
        }
        check_result(result, bind_dn)?;

        info!(directory = %self.display_name, host = %self.config.host, "LDAP bind succeeded");

        Ok(ldap)
    }

    fn operation_timeout(&self) -> std::time::Duration {
        self.config.connection.operation_timeout()
    }
}

/// Map an LDAP result to a connector error, keeping the server diagnostic.
fn check_result(result: LdapResult, dn: &str) -> ConnectorResult<LdapResult> {
    match result.rc {
        RC_SUCCESS => Ok(result),
        RC_ALREADY_EXISTS => Err(ConnectorError::ObjectAlreadyExists {
            identifier: dn.to_string(),
        }),
        RC_NO_SUCH_OBJECT if !dn.is_empty() => Err(ConnectorError::ObjectNotFound {
            identifier: dn.to_string(),
        }),
        rc => {
            let mut detail = Vec::new();
            if !result.text.is_empty() {
                detail.push(result.text.clone());
            }
            if !result.matched.is_empty() {
                detail.push(format!("matched {}", result.matched));
            }
            Err(ConnectorError::protocol(
                rc,
                result_code_name(rc),
                (!detail.is_empty()).then(|| detail.join("; ")),
            ))
        }
    }
}

fn result_code_name(rc: u32) -> &'static str {
    match rc {
        1 => "operationsError",
        2 => "protocolError",
        3 => "timeLimitExceeded",
        4 => "sizeLimitExceeded",
        10 => "referral",
        16 => "noSuchAttribute",
        19 => "constraintViolation",
        20 => "attributeOrValueExists",
        21 => "invalidAttributeSyntax",
        32 => "noSuchObject",
        34 => "invalidDNSyntax",
        50 => "insufficientAccessRights",
        51 => "busy",
        52 => "unavailable",
        53 => "unwillingToPerform",
        64 => "namingViolation",
        65 => "objectClassViolation",
        80 => "other",
        _ => "unexpected result",
    }
}

fn ldap_scope(scope: Scope) -> ldap3::Scope {
    match scope {
        Scope::Base => ldap3::Scope::Base,
        Scope::OneLevel => ldap3::Scope::OneLevel,
        Scope::Subtree => ldap3::Scope::Subtree,
    }
}

fn requested_attributes(attributes: &[String]) -> Vec<&str> {
    if attributes.is_empty() {
        vec!["*"]
    } else {
        attributes.iter().map(String::as_str).collect()
    }
}

/// Convert a raw search entry, surfacing binary values as strings.
fn search_entry_to_entry(entry: SearchEntry) -> Entry {
    let mut converted = Entry::new(entry.dn);

    for (name, values) in entry.attrs {
        converted.set(name, values);
    }

    for (name, values) in entry.bin_attrs {
        let values = decode_binary_values(&name, values);
        converted.set(name, values);
    }

    converted
}

fn decode_binary_values(name: &str, values: Vec<Vec<u8>>) -> Vec<String> {
    let is_sid = name.eq_ignore_ascii_case(OBJECT_SID);
    values
        .into_iter()
        .map(|raw| {
            if is_sid {
                match SecurityIdentifier::from_bytes(&raw) {
                    Ok(sid) => return sid.to_string(),
                    Err(e) => warn!(attribute = %name, error = %e, "Undecodable security identifier"),
                }
            }
            base64::engine::general_purpose::STANDARD.encode(raw)
        })
        .collect()
}

fn paged_cookie(result: &LdapResult) -> Option<Vec<u8>> {
    result.ctrls.iter().find_map(|ctrl| match ctrl {
        Control(Some(ControlType::PagedResults), raw) => {
            Some(raw.parse::<PagedResults>().cookie)
        }
        _ => None,
    })
}

fn value_set(values: &[String]) -> HashSet<&str> {
    values.iter().map(String::as_str).collect()
}

#[async_trait]
impl DirectoryClient for LdapDirectory {
    fn name(&self) -> &str {
        &self.display_name
    }

    #[instrument(skip(self), fields(directory = %self.display_name))]
    async fn bind(&self) -> ConnectorResult<()> {
        let conn = self.connect_and_bind().await?;
        let previous = self.connection.write().await.replace(conn);
        if let Some(mut old) = previous {
            let _ = old.unbind().await;
        }
        Ok(())
    }

    #[instrument(skip(self, attributes), fields(directory = %self.display_name, filter = %filter))]
    async fn search(
        &self,
        base: &str,
        scope: Scope,
        filter: &Filter,
        attributes: &[String],
    ) -> ConnectorResult<Vec<Entry>> {
        let mut ldap = self.get_connection().await?;
        let ldap_filter = filter.to_ldap();

        let result = ldap
            .with_timeout(self.operation_timeout())
            .search(base, ldap_scope(scope), &ldap_filter, requested_attributes(attributes))
            .await
            .map_err(|e| ConnectorError::operation_failed_with_source("LDAP search failed", e))?;

        let ldap3::SearchResult(entries, status) = result;
        check_result(status, base)?;

        let entries: Vec<Entry> = entries
            .into_iter()
            .map(SearchEntry::construct)
            .map(search_entry_to_entry)
            .collect();

        debug!(base = %base, count = entries.len(), "LDAP search completed");
        Ok(entries)
    }

    #[instrument(skip(self, attributes, cookie), fields(directory = %self.display_name, filter = %filter))]
    async fn search_page(
        &self,
        base: &str,
        scope: Scope,
        filter: &Filter,
        attributes: &[String],
        page_size: u32,
        cookie: Option<Vec<u8>>,
    ) -> ConnectorResult<SearchPage> {
        let mut ldap = self.get_connection().await?;
        let ldap_filter = filter.to_ldap();

        let control: RawControl = PagedResults {
            size: i32::try_from(page_size).unwrap_or(i32::MAX),
            cookie: cookie.unwrap_or_default(),
        }
        .into();

        let result = ldap
            .with_controls(vec![control])
            .with_timeout(self.operation_timeout())
            .search(base, ldap_scope(scope), &ldap_filter, requested_attributes(attributes))
            .await
            .map_err(|e| {
                ConnectorError::operation_failed_with_source("LDAP paged search failed", e)
            })?;

        let ldap3::SearchResult(entries, status) = result;
        let status = check_result(status, base)?;
        let next_cookie = paged_cookie(&status).filter(|c| !c.is_empty());

        let entries: Vec<Entry> = entries
            .into_iter()
            .map(SearchEntry::construct)
            .map(search_entry_to_entry)
            .collect();

        debug!(
            base = %base,
            count = entries.len(),
            more = next_cookie.is_some(),
            "LDAP search page received"
        );

        Ok(SearchPage::new(entries, next_cookie))
    }

    #[instrument(skip(self, entry), fields(directory = %self.display_name, dn = %entry.dn()))]
    async fn apply(&self, entry: &DestEntry) -> ConnectorResult<()> {
        if entry.is_noop() {
            debug!("No pending changes");
            return Ok(());
        }

        let mut ldap = self.get_connection().await?;
        let dn = entry.dn();

        let written = if entry.is_new() {
            let attrs: Vec<(&str, HashSet<&str>)> = entry
                .ops()
                .iter()
                .map(|op| (op.name(), value_set(op.values())))
                .collect();
            ldap.with_timeout(self.operation_timeout())
                .add(dn, attrs)
                .await
        } else {
            let mods: Vec<Mod<&str>> = entry
                .ops()
                .iter()
                .map(|op| match op {
                    AttributeOp::Add { name, values } => Mod::Add(name.as_str(), value_set(values)),
                    AttributeOp::Replace { name, values } => {
                        Mod::Replace(name.as_str(), value_set(values))
                    }
                })
                .collect();
            ldap.with_timeout(self.operation_timeout())
                .modify(dn, mods)
                .await
        };
        let result = written.map_err(|e| {
            ConnectorError::operation_failed_with_source(format!("LDAP write failed for {dn}"), e)
        })?;

        check_result(result, dn)?;

        info!(
            operation = if entry.is_new() { "add" } else { "modify" },
            changes = entry.ops().len(),
            "LDAP entry written"
        );
        Ok(())
    }

    #[instrument(skip(self), fields(directory = %self.display_name))]
    async fn read_root_attribute(&self, attribute: &str) -> ConnectorResult<Option<String>> {
        let mut ldap = self.get_connection().await?;

        let result = ldap
            .with_timeout(self.operation_timeout())
            .search("", ldap3::Scope::Base, "(objectClass=*)", vec![attribute])
            .await
            .map_err(|e| {
                ConnectorError::operation_failed_with_source("root DSE read failed", e)
            })?;

        let ldap3::SearchResult(entries, status) = result;
        check_result(status, "")?;

        let value = entries
            .into_iter()
            .next()
            .map(SearchEntry::construct)
            .map(search_entry_to_entry)
            .and_then(|entry| entry.first(attribute).map(str::to_string));

        debug!(attribute = %attribute, found = value.is_some(), "Root DSE attribute read");
        Ok(value)
    }
}

impl std::fmt::Debug for LdapDirectory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LdapDirectory")
            .field("display_name", &self.display_name)
            .field("config", &self.config)
            .finish()
    }
}
