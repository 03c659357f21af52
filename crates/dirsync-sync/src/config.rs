//! Sync configuration.
//!
//! One YAML document describes both directories, the deployment profile and
//! one section per entry type. Everything is validated once at load time.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use dirsync_connector_ldap::LdapConfig;

use crate::error::{SyncError, SyncResult};

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Directory records are read from.
    pub source: LdapConfig,

    /// Directory records are written to.
    pub destination: LdapConfig,

    /// Deployment profile variant.
    #[serde(default)]
    pub deployment: Deployment,

    /// Mail domain for synthesized and rewritten addresses.
    #[serde(default)]
    pub mail_domain: Option<String>,

    /// Whether the source exposes change sequence numbers.
    #[serde(default = "default_true")]
    pub incremental: bool,

    /// Per-entry change number attribute on the source.
    #[serde(default = "default_change_attribute")]
    pub change_attribute: String,

    /// Root DSE attribute holding the live high-water value.
    #[serde(default = "default_watermark_attribute")]
    pub watermark_attribute: String,

    /// Extra deny patterns, matched against source DNs.
    #[serde(default)]
    pub blacklist: Vec<String>,

    /// Numeric identifier allocation.
    #[serde(default)]
    pub identifiers: IdentifierConfig,

    /// Users section.
    #[serde(default)]
    pub users: Option<EntryConfig>,

    /// Groups section.
    #[serde(default)]
    pub groups: Option<EntryConfig>,

    /// Mailing lists section.
    #[serde(default)]
    pub lists: Option<EntryConfig>,

    /// Mail aliases section.
    #[serde(default)]
    pub aliases: Option<AliasConfig>,

    /// Location of the persisted watermark and counter state.
    #[serde(default = "default_state_file")]
    pub state_file: PathBuf,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_true() -> bool {
    true
}

fn default_change_attribute() -> String {
    "uSNChanged".to_string()
}

fn default_watermark_attribute() -> String {
    "highestCommittedUSN".to_string()
}

fn default_state_file() -> PathBuf {
    PathBuf::from("dirsync-state.json")
}

/// Deployment variant selecting the attribute-mapping strategy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Deployment {
    /// Posix accounts, groups and lists.
    #[default]
    Standard,
    /// Standard plus mail-domain rewrite and alias synchronisation.
    MailHosting,
}

/// Configuration of one entry type (users, groups or lists).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntryConfig {
    /// Source search base; defaults to the source base DN.
    #[serde(default)]
    pub source_base: Option<String>,

    /// Source object class selecting records of this type.
    pub source_object_class: String,

    /// Destination container for this type.
    pub base_dn: String,

    /// Object classes written on creation.
    #[serde(default)]
    pub object_classes: Vec<String>,

    /// Destination RDN attribute.
    pub rdn_attribute: String,

    /// Attribute pair used to find the destination counterpart.
    pub lookup: LookupConfig,

    /// Source to destination attribute mapping, in write order.
    #[serde(default)]
    pub mappings: Vec<AttributeMapping>,

    /// Raw LDAP filter fragments; matching source records are excluded.
    #[serde(default)]
    pub exclude_filters: Vec<String>,

    /// Fixed default values.
    #[serde(default)]
    pub defaults: Vec<DefaultValue>,

    /// Home directory template with a `{login}` placeholder (users).
    #[serde(default)]
    pub home_directory: Option<String>,

    /// Login shell (users).
    #[serde(default)]
    pub login_shell: Option<String>,

    /// Membership resolution (groups and lists).
    #[serde(default)]
    pub members: Option<MemberConfig>,

    /// Source attribute holding the canonical mail address.
    #[serde(default)]
    pub mail_attribute: Option<String>,

    /// Source attribute holding the mail nickname (lists).
    #[serde(default)]
    pub nickname_attribute: Option<String>,
}

/// Attribute pair used to find a destination record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LookupConfig {
    /// Source attribute whose value is the key.
    pub source: String,
    /// Destination attribute searched for that key.
    pub destination: String,
}

/// One source to destination attribute mapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeMapping {
    pub source: String,
    pub target: String,
}

impl AttributeMapping {
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
        }
    }
}

/// A fixed value for a computed attribute.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultValue {
    pub attribute: String,
    pub values: Vec<String>,
    #[serde(default = "default_true")]
    pub on_create: bool,
    #[serde(default)]
    pub on_update: bool,
}

/// Membership resolution settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemberConfig {
    /// Source attribute listing member references.
    #[serde(default = "default_member_attribute")]
    pub source_attribute: String,

    /// Destination attribute receiving resolved members.
    pub target_attribute: String,

    /// What each resolved member is written as.
    #[serde(default)]
    pub value_kind: MemberValueKind,

    /// Whether members must exist on the destination.
    #[serde(default)]
    pub mode: MemberMode,
}

fn default_member_attribute() -> String {
    "member".to_string()
}

/// Representation of a resolved member.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemberValueKind {
    /// Destination login identifier (`memberUid` style).
    #[default]
    Login,
    /// Destination distinguished name (`member` style).
    Dn,
    /// Mail address (lists).
    Address,
}

/// Member resolution mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemberMode {
    /// Keep only members present on the destination.
    #[default]
    Verified,
    /// Keep source identifiers without a destination check.
    Unverified,
}

/// Alias records written on address-domain changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AliasConfig {
    pub base_dn: String,
    #[serde(default)]
    pub object_classes: Vec<String>,
    /// RDN attribute; defaults to the mapping name attribute.
    #[serde(default)]
    pub rdn_attribute: Option<String>,
    pub mapping_name_attribute: String,
    pub mapping_value_attribute: String,
    #[serde(default)]
    pub mailhost_attribute: Option<String>,
    #[serde(default)]
    pub mailhost: Option<String>,
    #[serde(default)]
    pub home_directory_attribute: Option<String>,
    #[serde(default)]
    pub home_directory: Option<String>,
}

impl AliasConfig {
    pub fn rdn_attribute(&self) -> &str {
        self.rdn_attribute
            .as_deref()
            .unwrap_or(&self.mapping_name_attribute)
    }
}

/// Numeric identifier allocation policy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentifierPolicy {
    /// Persisted maintenance counter, random fallback.
    #[default]
    Counter,
    /// Base offset plus entries created in this run.
    Offset,
    /// Relative identifier of the source security identifier plus an offset.
    Sid,
}

/// Identifier allocation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentifierConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default)]
    pub policy: IdentifierPolicy,

    #[serde(default = "default_user_id_attribute")]
    pub user_attribute: String,

    #[serde(default = "default_group_id_attribute")]
    pub group_attribute: String,

    /// Lower bound of the random fallback range.
    #[serde(default = "default_random_min")]
    pub random_min: u64,

    /// Upper bound (inclusive) of the random fallback range.
    #[serde(default = "default_random_max")]
    pub random_max: u64,

    /// Base of offset mode.
    #[serde(default = "default_base_offset")]
    pub base_offset: u64,

    /// Added to the relative identifier in sid mode.
    #[serde(default = "default_base_offset")]
    pub sid_offset: u64,

    /// Source attribute holding the security identifier.
    #[serde(default = "default_sid_attribute")]
    pub sid_attribute: String,

    /// Candidates tried before giving up on a conflict-free id.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

fn default_user_id_attribute() -> String {
    "uidNumber".to_string()
}

fn default_group_id_attribute() -> String {
    "gidNumber".to_string()
}

fn default_random_min() -> u64 {
    10_000
}

fn default_random_max() -> u64 {
    60_000
}

fn default_base_offset() -> u64 {
    10_000
}

fn default_sid_attribute() -> String {
    "objectSid".to_string()
}

fn default_max_attempts() -> u32 {
    16
}

impl Default for IdentifierConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            policy: IdentifierPolicy::default(),
            user_attribute: default_user_id_attribute(),
            group_attribute: default_group_id_attribute(),
            random_min: default_random_min(),
            random_max: default_random_max(),
            base_offset: default_base_offset(),
            sid_offset: default_base_offset(),
            sid_attribute: default_sid_attribute(),
            max_attempts: default_max_attempts(),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Logging settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Level or `EnvFilter` directive; overridden by `RUST_LOG`.
    #[serde(default)]
    pub level: Option<String>,

    #[serde(default)]
    pub format: LogFormat,
}

impl SyncConfig {
    /// Load configuration from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> SyncResult<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            SyncError::configuration(format!(
                "Failed to read config file {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;

        Self::from_yaml(&content)
    }

    /// Parse and validate configuration from a YAML string.
    pub fn from_yaml(content: &str) -> SyncResult<Self> {
        let config: Self = serde_yaml::from_str(content)
            .map_err(|e| SyncError::configuration(format!("Failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate cross-field constraints.
    pub fn validate(&self) -> SyncResult<()> {
        self.source
            .validate()
            .map_err(|e| SyncError::configuration(format!("source: {e}")))?;
        self.destination
            .validate()
            .map_err(|e| SyncError::configuration(format!("destination: {e}")))?;

        for (name, section) in [
            ("users", &self.users),
            ("groups", &self.groups),
            ("lists", &self.lists),
        ] {
            if let Some(section) = section {
                section.validate(name)?;
            }
        }

        let has_members = [&self.groups, &self.lists]
            .into_iter()
            .flatten()
            .any(|s| s.members.is_some());
        if has_members && self.users.is_none() {
            return Err(SyncError::configuration(
                "member resolution requires a users section",
            ));
        }

        let needs_domain = self.lists.is_some() || self.deployment == Deployment::MailHosting;
        if needs_domain && self.mail_domain.as_deref().map_or(true, str::is_empty) {
            return Err(SyncError::configuration(
                "mail_domain is required for lists and the mail_hosting deployment",
            ));
        }

        if let Some(aliases) = &self.aliases {
            if aliases.base_dn.is_empty()
                || aliases.mapping_name_attribute.is_empty()
                || aliases.mapping_value_attribute.is_empty()
            {
                return Err(SyncError::configuration(
                    "aliases: base_dn, mapping_name_attribute and mapping_value_attribute are required",
                ));
            }
        }

        let ids = &self.identifiers;
        if ids.random_min > ids.random_max {
            return Err(SyncError::configuration(
                "identifiers: random_min must not exceed random_max",
            ));
        }
        if ids.max_attempts == 0 {
            return Err(SyncError::configuration(
                "identifiers: max_attempts must be at least 1",
            ));
        }

        for pattern in &self.blacklist {
            regex::Regex::new(pattern).map_err(|e| {
                SyncError::configuration(format!("blacklist pattern '{pattern}': {e}"))
            })?;
        }

        if self.incremental && self.change_attribute.is_empty() {
            return Err(SyncError::configuration(
                "change_attribute is required in incremental mode",
            ));
        }

        Ok(())
    }

    /// Source search base for a section.
    pub fn source_base<'a>(&'a self, section: &'a EntryConfig) -> &'a str {
        section
            .source_base
            .as_deref()
            .unwrap_or(&self.source.base_dn)
    }
}

impl EntryConfig {
    fn validate(&self, name: &str) -> SyncResult<()> {
        let required = [
            ("source_object_class", &self.source_object_class),
            ("base_dn", &self.base_dn),
            ("rdn_attribute", &self.rdn_attribute),
            ("lookup.source", &self.lookup.source),
            ("lookup.destination", &self.lookup.destination),
        ];
        for (field, value) in required {
            if value.is_empty() {
                return Err(SyncError::configuration(format!(
                    "{name}: {field} is required"
                )));
            }
        }

        if let Some(template) = &self.home_directory {
            if !template.contains("{login}") {
                return Err(SyncError::configuration(format!(
                    "{name}: home_directory must contain the {{login}} placeholder"
                )));
            }
        }

        Ok(())
    }

    /// Destination attribute a source attribute is mapped to, if any.
    pub fn target_of(&self, source: &str) -> Option<&str> {
        self.mappings
            .iter()
            .find(|m| m.source.eq_ignore_ascii_case(source))
            .map(|m| m.target.as_str())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) const SAMPLE: &str = r#"
source:
  host: dc1.corp.local
  base_dn: DC=corp,DC=local
  bind_dn: CN=sync,OU=Service,DC=corp,DC=local
  bind_password: secret
  page_size: 200
destination:
  host: ldap.example.org
  base_dn: dc=example,dc=org
  bind_dn: cn=admin,dc=example,dc=org
  bind_password: secret
  page_size: 0
mail_domain: example.org
blacklist:
  - "CN=svc-"
users:
  source_object_class: user
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

    #[test]
    fn test_parse_sample() {
        let config = SyncConfig::from_yaml(SAMPLE).unwrap();
        assert_eq!(config.deployment, Deployment::Standard);
        assert!(config.incremental);
        assert_eq!(config.change_attribute, "uSNChanged");
        assert_eq!(config.watermark_attribute, "highestCommittedUSN");
        assert_eq!(config.source.page_size, 200);
        assert_eq!(config.identifiers.policy, IdentifierPolicy::Counter);
        assert_eq!(config.identifiers.max_attempts, 16);

        let users = config.users.as_ref().unwrap();
        assert_eq!(users.mappings.len(), 5);
        assert_eq!(users.target_of("displayname"), Some("cn"));
        assert!(users.defaults[0].on_create);
        assert!(!users.defaults[0].on_update);
        assert_eq!(config.source_base(users), "DC=corp,DC=local");

        let lists = config.lists.as_ref().unwrap();
        let members = lists.members.as_ref().unwrap();
        assert_eq!(members.source_attribute, "member");
        assert_eq!(members.value_kind, MemberValueKind::Address);
        assert_eq!(members.mode, MemberMode::Unverified);
    }

    #[test]
    fn test_lists_require_mail_domain() {
        let yaml = SAMPLE.replace("mail_domain: example.org\n", "");
        let err = SyncConfig::from_yaml(&yaml).unwrap_err();
        assert!(err.to_string().contains("mail_domain"));
    }

    #[test]
    fn test_invalid_blacklist_pattern_rejected() {
        let yaml = SAMPLE.replace("\"CN=svc-\"", "\"CN=(unclosed\"");
        assert!(SyncConfig::from_yaml(&yaml).is_err());
    }

    #[test]
    fn test_home_directory_needs_placeholder() {
        let yaml = SAMPLE.replace("/home/{login}", "/home/static");
        assert!(SyncConfig::from_yaml(&yaml).is_err());
    }

    #[test]
    fn test_members_require_users() {
        let mut config = SyncConfig::from_yaml(SAMPLE).unwrap();
        config.users = None;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_debug_redacts_passwords() {
        let config = SyncConfig::from_yaml(SAMPLE).unwrap();
        assert!(!format!("{config:?}").contains("secret"));
    }
}
