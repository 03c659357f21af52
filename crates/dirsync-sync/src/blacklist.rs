//! DN deny list.
//!
//! Patterns are regular expressions matched from the start of the DN,
//! case-sensitively. Any single hit excludes the record.

use regex::Regex;
use tracing::debug;

use crate::error::{SyncError, SyncResult};

/// Built-in administrative and system accounts.
///
/// The bare `$` matches only an empty DN; `[^,]*\$,` matches machine
/// accounts whose RDN ends in `$`.
pub const BUILTIN_PATTERNS: &[&str] = &[
    "CN=Administrator,",
    "CN=Guest,",
    "CN=krbtgt,",
    "CN=DefaultAccount,",
    "CN=WDAGUtilityAccount,",
    "CN=SUPPORT_388945a0,",
    "CN=IUSR_",
    "CN=IWAM_",
    "CN=TsInternetUser,",
    "CN=HelpServicesGroup,",
    "CN=Domain Admins,",
    "CN=Domain Users,",
    "CN=Domain Guests,",
    "CN=Domain Computers,",
    "CN=Domain Controllers,",
    "CN=Read-only Domain Controllers,",
    "CN=Enterprise Admins,",
    "CN=Schema Admins,",
    "CN=Cert Publishers,",
    "CN=Group Policy Creator Owners,",
    "CN=RAS and IAS Servers,",
    "CN=DnsAdmins,",
    "CN=DnsUpdateProxy,",
    "CN=Exchange",
    "CN=SystemMailbox",
    "CN=HealthMailbox",
    "$",
    r"[^,]*\$,",
];

/// Compiled deny list.
#[derive(Debug, Clone)]
pub struct BlacklistFilter {
    patterns: Vec<(String, Regex)>,
}

impl BlacklistFilter {
    /// Built-in patterns plus `extra`, compiled once.
    pub fn new<S: AsRef<str>>(extra: &[S]) -> SyncResult<Self> {
        let mut patterns = Vec::with_capacity(BUILTIN_PATTERNS.len() + extra.len());
        for pattern in BUILTIN_PATTERNS
            .iter()
            .copied()
            .chain(extra.iter().map(AsRef::as_ref))
        {
            let regex = Regex::new(&format!("^(?:{pattern})")).map_err(|e| {
                SyncError::configuration(format!("invalid blacklist pattern '{pattern}': {e}"))
            })?;
            patterns.push((pattern.to_string(), regex));
        }
        Ok(Self { patterns })
    }

    /// First pattern matching `dn`.
    pub fn matching_pattern(&self, dn: &str) -> Option<&str> {
        self.patterns
            .iter()
            .find(|(_, regex)| regex.is_match(dn))
            .map(|(pattern, _)| pattern.as_str())
    }

    /// Whether `dn` is denied.
    pub fn is_blacklisted(&self, dn: &str) -> bool {
        match self.matching_pattern(dn) {
            Some(pattern) => {
                debug!(dn = %dn, pattern = %pattern, "DN blacklisted");
                true
            }
            None => false,
        }
    }

    /// Number of compiled patterns.
    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn builtin() -> BlacklistFilter {
        BlacklistFilter::new::<&str>(&[]).unwrap()
    }

    #[test]
    fn test_builtin_accounts() {
        let filter = builtin();
        assert!(filter.is_blacklisted("CN=Administrator,CN=Users,DC=corp,DC=local"));
        assert!(filter.is_blacklisted("CN=krbtgt,CN=Users,DC=corp,DC=local"));
        assert!(filter.is_blacklisted("CN=IUSR_WEB01,CN=Users,DC=corp,DC=local"));
        assert!(!filter.is_blacklisted("CN=John Doe,OU=Staff,DC=corp,DC=local"));
    }

    #[test]
    fn test_prefix_anchored_and_case_sensitive() {
        let filter = builtin();
        assert!(!filter.is_blacklisted("OU=x,CN=Administrator,DC=corp,DC=local"));
        assert!(!filter.is_blacklisted("cn=administrator,cn=users,dc=corp,dc=local"));
        assert!(!filter.is_blacklisted("CN=Administrators Team,OU=Staff,DC=corp,DC=local"));
    }

    #[test]
    fn test_bare_dollar_only_matches_empty_dn() {
        let filter = builtin();
        assert_eq!(filter.matching_pattern(""), Some("$"));
        assert!(!filter.is_blacklisted("CN=Price$list,OU=Staff,DC=corp,DC=local"));
    }

    #[test]
    fn test_machine_accounts() {
        let filter = builtin();
        assert_eq!(
            filter.matching_pattern("CN=WS042$,OU=Workstations,DC=corp,DC=local"),
            Some(r"[^,]*\$,")
        );
    }

    #[test]
    fn test_extra_patterns() {
        let filter = BlacklistFilter::new(&["CN=svc-", "CN=test[0-9]+,"]).unwrap();
        assert_eq!(filter.len(), BUILTIN_PATTERNS.len() + 2);
        assert!(filter.is_blacklisted("CN=svc-backup,OU=Service,DC=corp,DC=local"));
        assert!(filter.is_blacklisted("CN=test12,OU=Staff,DC=corp,DC=local"));
        assert!(!filter.is_blacklisted("CN=tester,OU=Staff,DC=corp,DC=local"));
    }

    #[test]
    fn test_invalid_pattern_rejected() {
        assert!(BlacklistFilter::new(&["CN=(broken"]).is_err());
    }
}
