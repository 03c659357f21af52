//! Source search filter construction.

use dirsync_connector::operation::Filter;

use crate::profile::{AttributeMappingProfile, EntryKind};

/// `sAMAccountType` of interdomain trust accounts.
const TRUST_ACCOUNT_TYPE: &str = "805306370";

/// Builds the source filter for a target type.
#[derive(Debug, Clone)]
pub struct FilterBuilder {
    incremental: bool,
    change_attribute: String,
}

impl FilterBuilder {
    pub fn new(incremental: bool, change_attribute: impl Into<String>) -> Self {
        Self {
            incremental,
            change_attribute: change_attribute.into(),
        }
    }

    /// Filter selecting source records of the profile's kind changed at or
    /// after `watermark`.
    ///
    /// Without change numbers this is a plain object-class match.
    pub fn build(&self, profile: &AttributeMappingProfile, watermark: u64) -> Filter {
        let class = Filter::eq("objectClass", &profile.source_object_class);
        if !self.incremental {
            return class;
        }

        let mut filter = class
            .and_with(Filter::ge(&self.change_attribute, watermark.to_string()))
            .and_with(Filter::negate(Filter::eq(
                "sAMAccountType",
                TRUST_ACCOUNT_TYPE,
            )))
            .and_with(Filter::negate(Filter::eq("isCriticalSystemObject", "TRUE")));

        if profile.kind == EntryKind::User {
            filter = filter.and_with(Filter::negate(Filter::eq("objectClass", "computer")));
        }

        for fragment in &profile.exclude_filters {
            filter = filter.and_with(Filter::negate(Filter::raw(fragment)));
        }

        filter
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(kind: EntryKind, class: &str) -> AttributeMappingProfile {
        AttributeMappingProfile::new(kind, "ou=x,dc=example,dc=org", "cn")
            .with_source("DC=corp,DC=local", class)
    }

    #[test]
    fn test_incremental_user_filter() {
        let builder = FilterBuilder::new(true, "uSNChanged");
        let filter = builder.build(&profile(EntryKind::User, "user"), 10);
        assert_eq!(
            filter.to_ldap(),
            "(&(objectClass=user)(uSNChanged>=10)(!(sAMAccountType=805306370))\
             (!(isCriticalSystemObject=TRUE))(!(objectClass=computer)))"
        );
    }

    #[test]
    fn test_group_filter_has_no_computer_clause() {
        let builder = FilterBuilder::new(true, "changeNumber");
        let filter = builder.build(&profile(EntryKind::Group, "group"), 0).to_ldap();
        assert!(filter.contains("(changeNumber>=0)"));
        assert!(!filter.contains("computer"));
    }

    #[test]
    fn test_exclude_fragments_are_negated() {
        let mut p = profile(EntryKind::Group, "group");
        p.exclude_filters = vec!["cn=Test*".to_string()];
        let filter = FilterBuilder::new(true, "uSNChanged").build(&p, 5).to_ldap();
        assert!(filter.ends_with("(!(cn=Test*)))"));
    }

    #[test]
    fn test_non_incremental_is_plain_class_match() {
        let builder = FilterBuilder::new(false, "uSNChanged");
        let filter = builder.build(&profile(EntryKind::User, "user"), 42);
        assert_eq!(filter.to_ldap(), "(objectClass=user)");
    }
}
