//! Attribute-mapping profiles.
//!
//! One [`AttributeMappingProfile`] per [`EntryKind`] describes how a source
//! record becomes a destination record: the plain attribute mapping, the
//! object classes and naming attributes, the ordered computed-attribute hooks
//! and the optional identifier and membership slots. Profiles are produced by
//! a [`ProfileStrategy`] chosen from the deployment setting.

pub mod hooks;
pub mod strategy;

use serde::{Deserialize, Serialize};

use dirsync_connector::operation::Entry;

use crate::config::{AttributeMapping, MemberConfig};
use crate::error::SyncError;

pub use hooks::{
    AttributeHook, ConstantHook, HomeDirectoryHook, MailAddressHook, MailDomainRewriteHook,
};
pub use strategy::{strategy_for, MailHostingProfile, ProfileStrategy, StandardProfile};

/// Kind of record being synchronised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    User,
    Group,
    List,
    Alias,
}

impl EntryKind {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryKind::User => "user",
            EntryKind::Group => "group",
            EntryKind::List => "list",
            EntryKind::Alias => "alias",
        }
    }
}

impl std::fmt::Display for EntryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for EntryKind {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "user" | "users" => Ok(EntryKind::User),
            "group" | "groups" => Ok(EntryKind::Group),
            "list" | "lists" => Ok(EntryKind::List),
            "alias" | "aliases" => Ok(EntryKind::Alias),
            _ => Err(SyncError::InvalidTarget(s.to_string())),
        }
    }
}

/// Where user accounts live on both sides, for member resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserLocator {
    pub source_base: String,
    pub source_login_attribute: String,
    pub source_mail_attribute: String,
    pub destination_base: String,
    pub destination_login_attribute: String,
    pub destination_mail_attribute: String,
    pub destination_rdn_attribute: String,
}

/// Membership slot of a group or list profile.
#[derive(Debug, Clone)]
pub struct MembershipSlot {
    pub config: MemberConfig,
    pub users: UserLocator,
}

/// Source and destination attributes watched for address-domain changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressTrigger {
    pub source_attribute: String,
    pub target_attribute: String,
}

/// Lookup key: a source value searched for on the destination.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LookupKey {
    pub source: String,
    pub destination: String,
}

/// Mapping policy for one entry kind.
pub struct AttributeMappingProfile {
    pub kind: EntryKind,
    pub source_base: String,
    pub source_object_class: String,
    pub base_dn: String,
    pub object_classes: Vec<String>,
    pub rdn_attribute: String,
    pub lookup: LookupKey,
    pub mappings: Vec<AttributeMapping>,
    pub exclude_filters: Vec<String>,
    pub hooks: Vec<Box<dyn AttributeHook>>,
    pub identifier: Option<String>,
    pub members: Option<MembershipSlot>,
    pub address_trigger: Option<AddressTrigger>,
}

impl AttributeMappingProfile {
    /// Empty profile writing below `base_dn` named by `rdn_attribute`.
    pub fn new(kind: EntryKind, base_dn: impl Into<String>, rdn_attribute: impl Into<String>) -> Self {
        Self {
            kind,
            source_base: String::new(),
            source_object_class: String::new(),
            base_dn: base_dn.into(),
            object_classes: Vec::new(),
            rdn_attribute: rdn_attribute.into(),
            lookup: LookupKey::default(),
            mappings: Vec::new(),
            exclude_filters: Vec::new(),
            hooks: Vec::new(),
            identifier: None,
            members: None,
            address_trigger: None,
        }
    }

    #[must_use]
    pub fn with_source(mut self, base: impl Into<String>, object_class: impl Into<String>) -> Self {
        self.source_base = base.into();
        self.source_object_class = object_class.into();
        self
    }

    #[must_use]
    pub fn with_lookup(mut self, source: impl Into<String>, destination: impl Into<String>) -> Self {
        self.lookup = LookupKey {
            source: source.into(),
            destination: destination.into(),
        };
        self
    }

    #[must_use]
    pub fn with_object_classes<I, S>(mut self, classes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.object_classes = classes.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_mapping(mut self, source: impl Into<String>, target: impl Into<String>) -> Self {
        self.mappings.push(AttributeMapping::new(source, target));
        self
    }

    /// Append a hook; a later hook for the same target wins.
    #[must_use]
    pub fn with_hook(mut self, hook: impl AttributeHook + 'static) -> Self {
        self.hooks.push(Box::new(hook));
        self
    }

    #[must_use]
    pub fn with_identifier(mut self, attribute: impl Into<String>) -> Self {
        self.identifier = Some(attribute.into());
        self
    }

    #[must_use]
    pub fn with_members(mut self, slot: MembershipSlot) -> Self {
        self.members = Some(slot);
        self
    }

    #[must_use]
    pub fn with_address_trigger(mut self, trigger: AddressTrigger) -> Self {
        self.address_trigger = Some(trigger);
        self
    }

    /// The lookup key value of a source record.
    pub fn login<'e>(&self, source: &'e Entry) -> Option<&'e str> {
        source.first(&self.lookup.source)
    }

    /// Whether a destination attribute is produced by a hook or slot rather
    /// than copied from the source.
    pub fn is_computed(&self, target: &str) -> bool {
        self.hooks
            .iter()
            .any(|h| h.target().eq_ignore_ascii_case(target))
            || self
                .identifier
                .as_deref()
                .is_some_and(|a| a.eq_ignore_ascii_case(target))
            || self
                .members
                .as_ref()
                .is_some_and(|m| m.config.target_attribute.eq_ignore_ascii_case(target))
    }
}

impl std::fmt::Debug for AttributeMappingProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let hooks: Vec<String> = self
            .hooks
            .iter()
            .map(|h| format!("{}:{}", h.name(), h.target()))
            .collect();
        f.debug_struct("AttributeMappingProfile")
            .field("kind", &self.kind)
            .field("base_dn", &self.base_dn)
            .field("rdn_attribute", &self.rdn_attribute)
            .field("lookup", &self.lookup)
            .field("mappings", &self.mappings)
            .field("hooks", &hooks)
            .field("identifier", &self.identifier)
            .field("members", &self.members)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_kind_parse() {
        assert_eq!("users".parse::<EntryKind>().unwrap(), EntryKind::User);
        assert_eq!("Group".parse::<EntryKind>().unwrap(), EntryKind::Group);
        assert!("computer".parse::<EntryKind>().is_err());
    }

    #[test]
    fn test_computed_targets() {
        let profile = AttributeMappingProfile::new(EntryKind::User, "ou=people", "uid")
            .with_lookup("sAMAccountName", "uid")
            .with_mapping("mail", "mail")
            .with_hook(HomeDirectoryHook::new("homeDirectory", "/home/{login}"))
            .with_identifier("uidNumber");

        assert!(profile.is_computed("homedirectory"));
        assert!(profile.is_computed("uidNumber"));
        assert!(!profile.is_computed("mail"));
    }
}
