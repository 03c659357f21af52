//! Connector operation types
//!
//! Directory entries, pending attribute operations, search filters and
//! pagination pages exchanged between the engine and its collaborators.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::transform::escape_filter_value;

/// A directory entry: a distinguished name plus a multi-valued attribute bag.
///
/// Attribute names are matched ASCII case-insensitively, as LDAP does.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    dn: String,
    attributes: BTreeMap<String, Vec<String>>,
}

impl Entry {
    /// Create an empty entry with the given DN.
    pub fn new(dn: impl Into<String>) -> Self {
        Self {
            dn: dn.into(),
            attributes: BTreeMap::new(),
        }
    }

    /// Set an attribute, replacing any value stored under a differently-cased name.
    pub fn set<I, S>(&mut self, name: impl Into<String>, values: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let name = name.into();
        if let Some(existing) = self.find_key(&name).map(str::to_string) {
            self.attributes.remove(&existing);
        }
        self.attributes
            .insert(name, values.into_iter().map(Into::into).collect());
    }

    /// Set an attribute using builder pattern.
    pub fn with<I, S>(mut self, name: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.set(name, values);
        self
    }

    /// Distinguished name.
    pub fn dn(&self) -> &str {
        &self.dn
    }

    /// All values of an attribute (empty slice when absent).
    pub fn get(&self, name: &str) -> &[String] {
        self.find_key(name)
            .and_then(|key| self.attributes.get(key))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// First non-empty value of an attribute.
    pub fn first(&self, name: &str) -> Option<&str> {
        self.get(name)
            .iter()
            .map(String::as_str)
            .find(|v| !v.is_empty())
    }

    /// Whether the attribute carries at least one non-empty value.
    pub fn has_value(&self, name: &str) -> bool {
        self.first(name).is_some()
    }

    /// Iterate over all attributes in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.attributes
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    /// Number of attributes.
    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    /// Whether the entry has no attributes.
    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }

    fn find_key(&self, name: &str) -> Option<&str> {
        self.attributes
            .keys()
            .find(|k| k.eq_ignore_ascii_case(name))
            .map(String::as_str)
    }
}

/// A pending change recorded on a [`DestEntry`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum AttributeOp {
    /// Add values to an attribute that has none yet.
    Add { name: String, values: Vec<String> },
    /// Replace every value of an attribute.
    Replace { name: String, values: Vec<String> },
}

impl AttributeOp {
    /// Attribute the operation targets.
    pub fn name(&self) -> &str {
        match self {
            AttributeOp::Add { name, .. } | AttributeOp::Replace { name, .. } => name,
        }
    }

    /// Values carried by the operation.
    pub fn values(&self) -> &[String] {
        match self {
            AttributeOp::Add { values, .. } | AttributeOp::Replace { values, .. } => values,
        }
    }
}

/// A destination record being reconciled.
///
/// Holds the snapshot of the existing destination entry (empty on the create
/// path) and the ordered list of pending operations the destination client
/// applies as a single add or modify.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DestEntry {
    dn: String,
    is_new: bool,
    existing: Entry,
    ops: Vec<AttributeOp>,
}

impl DestEntry {
    /// Start a record that does not exist on the destination yet.
    pub fn create(dn: impl Into<String>) -> Self {
        let dn = dn.into();
        Self {
            existing: Entry::new(dn.clone()),
            dn,
            is_new: true,
            ops: Vec::new(),
        }
    }

    /// Start a record for an entry already present on the destination.
    pub fn update(existing: Entry) -> Self {
        Self {
            dn: existing.dn().to_string(),
            is_new: false,
            existing,
            ops: Vec::new(),
        }
    }

    /// Record the desired values of an attribute.
    ///
    /// Empty value lists are ignored. On an existing entry, an attribute that
    /// already holds the same values records nothing, one holding other values
    /// records a replace and one without values records an add. Returns whether
    /// an operation is pending for the attribute afterwards.
    pub fn set(&mut self, name: impl Into<String>, values: Vec<String>) -> bool {
        let name = name.into();
        let values: Vec<String> = values.into_iter().filter(|v| !v.is_empty()).collect();
        if values.is_empty() {
            return false;
        }

        self.ops.retain(|op| !op.name().eq_ignore_ascii_case(&name));

        let current = self.existing.get(&name);
        if !self.is_new && same_values(current, &values) {
            return false;
        }

        let op = if self.existing.has_value(&name) {
            AttributeOp::Replace { name, values }
        } else {
            AttributeOp::Add { name, values }
        };
        self.ops.push(op);
        true
    }

    /// Distinguished name.
    pub fn dn(&self) -> &str {
        &self.dn
    }

    /// Whether this record is created (add) rather than modified.
    pub fn is_new(&self) -> bool {
        self.is_new
    }

    /// Snapshot of the destination entry before reconciliation.
    pub fn existing(&self) -> &Entry {
        &self.existing
    }

    /// Pending operations in the order they were recorded.
    pub fn ops(&self) -> &[AttributeOp] {
        &self.ops
    }

    /// Whether no operation is pending.
    pub fn is_noop(&self) -> bool {
        self.ops.is_empty()
    }

    /// Whether an operation is pending for the attribute.
    pub fn is_pending(&self, name: &str) -> bool {
        self.ops.iter().any(|op| op.name().eq_ignore_ascii_case(name))
    }

    /// Value of an attribute once pending operations are applied.
    pub fn current(&self, name: &str) -> &[String] {
        self.ops
            .iter()
            .find(|op| op.name().eq_ignore_ascii_case(name))
            .map(AttributeOp::values)
            .unwrap_or_else(|| self.existing.get(name))
    }

    /// The resulting attribute set once pending operations are applied.
    pub fn resulting_entry(&self) -> Entry {
        let mut entry = self.existing.clone();
        for op in &self.ops {
            entry.set(op.name().to_string(), op.values().to_vec());
        }
        entry
    }
}

fn same_values(current: &[String], desired: &[String]) -> bool {
    if current.len() != desired.len() {
        return false;
    }
    let mut a: Vec<&String> = current.iter().collect();
    let mut b: Vec<&String> = desired.iter().collect();
    a.sort();
    b.sort();
    a == b
}

/// Search scope.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    /// The base entry only.
    Base,
    /// Direct children of the base.
    OneLevel,
    /// The base and its whole subtree.
    #[default]
    Subtree,
}

/// Filter for search operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Filter {
    /// Match objects where attribute equals value.
    Equals { attribute: String, value: String },

    /// Match objects where attribute is greater than or equal to value.
    GreaterThanOrEquals { attribute: String, value: String },

    /// Match objects where attribute exists (has any value).
    Present { attribute: String },

    /// Logical AND of multiple filters.
    And { filters: Vec<Filter> },

    /// Logical NOT of a filter.
    Not { filter: Box<Filter> },

    /// A filter fragment in LDAP string syntax, passed through untouched.
    Raw { filter: String },
}

impl Filter {
    /// Create an equals filter.
    pub fn eq(attribute: impl Into<String>, value: impl Into<String>) -> Self {
        Filter::Equals {
            attribute: attribute.into(),
            value: value.into(),
        }
    }

    /// Create a greater-or-equal filter.
    pub fn ge(attribute: impl Into<String>, value: impl Into<String>) -> Self {
        Filter::GreaterThanOrEquals {
            attribute: attribute.into(),
            value: value.into(),
        }
    }

    /// Create a present (attribute exists) filter.
    pub fn present(attribute: impl Into<String>) -> Self {
        Filter::Present {
            attribute: attribute.into(),
        }
    }

    /// Create a raw filter fragment.
    ///
    /// Fragments without surrounding parentheses are wrapped.
    pub fn raw(filter: impl Into<String>) -> Self {
        let filter = filter.into();
        let trimmed = filter.trim();
        let filter = if trimmed.starts_with('(') {
            trimmed.to_string()
        } else {
            format!("({trimmed})")
        };
        Filter::Raw { filter }
    }

    /// Create an AND filter.
    pub fn and(filters: Vec<Filter>) -> Self {
        Filter::And { filters }
    }

    /// Create a NOT filter (negation).
    pub fn negate(filter: Filter) -> Self {
        Filter::Not {
            filter: Box::new(filter),
        }
    }

    /// Combine this filter with another using AND.
    pub fn and_with(self, other: Filter) -> Self {
        match self {
            Filter::And { mut filters } => {
                filters.push(other);
                Filter::And { filters }
            }
            _ => Filter::And {
                filters: vec![self, other],
            },
        }
    }

    /// Render as an RFC 4515 filter string.
    ///
    /// Assertion values are escaped; raw fragments are emitted as given.
    pub fn to_ldap(&self) -> String {
        match self {
            Filter::And { filters } => {
                let inner: Vec<String> = filters.iter().map(Filter::to_ldap).collect();
                format!("(&{})", inner.join(""))
            }
            Filter::Not { filter } => format!("(!{})", filter.to_ldap()),
            Filter::Equals { attribute, value } => {
                format!("({}={})", attribute, escape_filter_value(value))
            }
            Filter::GreaterThanOrEquals { attribute, value } => {
                format!("({}>={})", attribute, escape_filter_value(value))
            }
            Filter::Present { attribute } => format!("({attribute}=*)"),
            Filter::Raw { filter } => filter.clone(),
        }
    }
}

impl std::fmt::Display for Filter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_ldap())
    }
}

/// One page of a paginated search.
#[derive(Debug, Clone, Default)]
pub struct SearchPage {
    /// Entries returned on this page.
    pub entries: Vec<Entry>,
    /// Continuation cookie; `None` or empty when this is the last page.
    pub cookie: Option<Vec<u8>>,
}

impl SearchPage {
    /// Create a page.
    pub fn new(entries: Vec<Entry>, cookie: Option<Vec<u8>>) -> Self {
        Self { entries, cookie }
    }

    /// Whether the server signalled that no further page follows.
    pub fn is_last(&self) -> bool {
        self.cookie.as_ref().map_or(true, Vec::is_empty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_case_insensitive_lookup() {
        let entry = Entry::new("CN=John Doe,OU=Users,DC=corp,DC=local")
            .with("sAMAccountName", ["jdoe"])
            .with("mail", ["jdoe@corp.local"]);

        assert_eq!(entry.first("samaccountname"), Some("jdoe"));
        assert_eq!(entry.get("MAIL"), ["jdoe@corp.local".to_string()]);
        assert!(!entry.has_value("givenName"));
    }

    #[test]
    fn test_entry_set_replaces_differently_cased_name() {
        let mut entry = Entry::new("uid=jdoe").with("Mail", ["a@x"]);
        entry.set("mail", ["b@x"]);
        assert_eq!(entry.len(), 1);
        assert_eq!(entry.first("MAIL"), Some("b@x"));
    }

    #[test]
    fn test_first_skips_empty_values() {
        let entry = Entry::new("cn=x").with("mail", ["", "x@y"]);
        assert_eq!(entry.first("mail"), Some("x@y"));
        let empty = Entry::new("cn=x").with("mail", [""]);
        assert!(!empty.has_value("mail"));
    }

    #[test]
    fn test_dest_entry_create_records_adds() {
        let mut dest = DestEntry::create("uid=jdoe,ou=people,dc=example,dc=org");
        assert!(dest.set("uid", vec!["jdoe".into()]));
        assert!(dest.set("cn", vec!["John Doe".into()]));
        assert!(!dest.set("description", vec![]));

        assert!(dest.is_new());
        assert_eq!(dest.ops().len(), 2);
        assert!(matches!(dest.ops()[0], AttributeOp::Add { .. }));
    }

    #[test]
    fn test_dest_entry_update_add_replace_and_noop() {
        let existing = Entry::new("uid=jdoe,ou=people,dc=example,dc=org")
            .with("cn", ["John Doe"])
            .with("mail", ["jdoe@old.org"]);
        let mut dest = DestEntry::update(existing);

        assert!(!dest.set("cn", vec!["John Doe".into()]));
        assert!(dest.set("mail", vec!["jdoe@example.org".into()]));
        assert!(dest.set("sn", vec!["Doe".into()]));

        assert_eq!(
            dest.ops(),
            &[
                AttributeOp::Replace {
                    name: "mail".into(),
                    values: vec!["jdoe@example.org".into()]
                },
                AttributeOp::Add {
                    name: "sn".into(),
                    values: vec!["Doe".into()]
                },
            ]
        );
        assert_eq!(dest.current("mail"), ["jdoe@example.org".to_string()]);
        assert_eq!(dest.current("cn"), ["John Doe".to_string()]);
        assert!(dest.is_pending("Mail"));
        assert!(!dest.is_pending("cn"));
    }

    #[test]
    fn test_dest_entry_multi_value_order_insensitive() {
        let existing = Entry::new("cn=staff").with("memberUid", ["a", "b"]);
        let mut dest = DestEntry::update(existing);
        assert!(!dest.set("memberUid", vec!["b".into(), "a".into()]));
        assert!(dest.is_noop());
    }

    #[test]
    fn test_dest_entry_set_twice_keeps_last() {
        let mut dest = DestEntry::create("cn=x");
        dest.set("mail", vec!["a@x".into()]);
        dest.set("mail", vec!["b@x".into()]);
        assert_eq!(dest.ops().len(), 1);
        assert_eq!(dest.resulting_entry().first("mail"), Some("b@x"));
    }

    #[test]
    fn test_filter_to_ldap() {
        let filter = Filter::eq("objectClass", "user")
            .and_with(Filter::ge("uSNChanged", "10"))
            .and_with(Filter::negate(Filter::eq("isCriticalSystemObject", "TRUE")));

        assert_eq!(
            filter.to_ldap(),
            "(&(objectClass=user)(uSNChanged>=10)(!(isCriticalSystemObject=TRUE)))"
        );
    }

    #[test]
    fn test_filter_escapes_values() {
        let filter = Filter::eq("cn", "a*(b)");
        assert_eq!(filter.to_ldap(), "(cn=a\\2a\\28b\\29)");
    }

    #[test]
    fn test_raw_filter_wrapped() {
        assert_eq!(Filter::raw("mail=*").to_ldap(), "(mail=*)");
        assert_eq!(Filter::raw("(!(cn=test*))").to_ldap(), "(!(cn=test*))");
    }

    #[test]
    fn test_search_page_last() {
        assert!(SearchPage::new(vec![], None).is_last());
        assert!(SearchPage::new(vec![], Some(vec![])).is_last());
        assert!(!SearchPage::new(vec![], Some(vec![1, 2])).is_last());
    }
}
