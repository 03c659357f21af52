//! Computed-attribute hooks.
//!
//! A hook derives one destination attribute from the source record and the
//! profile. Hooks are pure: the same input always yields the same value.

use dirsync_connector::operation::Entry;
use dirsync_connector::transform::transliterate;

use super::AttributeMappingProfile;

/// A named computed attribute.
pub trait AttributeHook: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Destination attribute the hook produces.
    fn target(&self) -> &str;

    /// Compute the values, or `None` when the hook has nothing to contribute.
    fn compute(&self, source: &Entry, profile: &AttributeMappingProfile) -> Option<Vec<String>>;

    /// Whether the hook runs when the destination record is created.
    fn applies_on_create(&self) -> bool {
        true
    }

    /// Whether the hook runs when the destination record already exists.
    fn applies_on_update(&self) -> bool {
        true
    }
}

/// Fixed values (quota, mailhost, vacation flags, login shell, list defaults).
#[derive(Debug, Clone)]
pub struct ConstantHook {
    target: String,
    values: Vec<String>,
    on_create: bool,
    on_update: bool,
}

impl ConstantHook {
    /// Constant applied on both paths.
    pub fn new(target: impl Into<String>, values: Vec<String>) -> Self {
        Self {
            target: target.into(),
            values,
            on_create: true,
            on_update: true,
        }
    }

    /// Restrict to the create and/or update path.
    #[must_use]
    pub fn on(mut self, on_create: bool, on_update: bool) -> Self {
        self.on_create = on_create;
        self.on_update = on_update;
        self
    }
}

impl AttributeHook for ConstantHook {
    fn name(&self) -> &str {
        "constant"
    }

    fn target(&self) -> &str {
        &self.target
    }

    fn compute(&self, _source: &Entry, _profile: &AttributeMappingProfile) -> Option<Vec<String>> {
        (!self.values.is_empty()).then(|| self.values.clone())
    }

    fn applies_on_create(&self) -> bool {
        self.on_create
    }

    fn applies_on_update(&self) -> bool {
        self.on_update
    }
}

/// Home directory from a `{login}` template.
#[derive(Debug, Clone)]
pub struct HomeDirectoryHook {
    target: String,
    template: String,
}

impl HomeDirectoryHook {
    pub fn new(target: impl Into<String>, template: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            template: template.into(),
        }
    }
}

impl AttributeHook for HomeDirectoryHook {
    fn name(&self) -> &str {
        "home_directory"
    }

    fn target(&self) -> &str {
        &self.target
    }

    fn compute(&self, source: &Entry, profile: &AttributeMappingProfile) -> Option<Vec<String>> {
        let login = transliterate(profile.login(source)?);
        if login.is_empty() {
            return None;
        }
        Some(vec![self.template.replace("{login}", &login)])
    }
}

/// Canonical address, falling back to `nickname@domain` then `login@domain`.
#[derive(Debug, Clone)]
pub struct MailAddressHook {
    target: String,
    address_attribute: String,
    nickname_attribute: Option<String>,
    domain: String,
}

impl MailAddressHook {
    pub fn new(
        target: impl Into<String>,
        address_attribute: impl Into<String>,
        nickname_attribute: Option<String>,
        domain: impl Into<String>,
    ) -> Self {
        Self {
            target: target.into(),
            address_attribute: address_attribute.into(),
            nickname_attribute,
            domain: domain.into(),
        }
    }
}

impl AttributeHook for MailAddressHook {
    fn name(&self) -> &str {
        "mail_address"
    }

    fn target(&self) -> &str {
        &self.target
    }

    fn compute(&self, source: &Entry, profile: &AttributeMappingProfile) -> Option<Vec<String>> {
        let address = if let Some(address) = source.first(&self.address_attribute) {
            address.to_string()
        } else if let Some(nickname) = self
            .nickname_attribute
            .as_deref()
            .and_then(|attr| source.first(attr))
        {
            format!("{nickname}@{}", self.domain)
        } else {
            format!("{}@{}", profile.login(source)?, self.domain)
        };

        let address = transliterate(&address);
        (!address.starts_with('@')).then(|| vec![address])
    }
}

/// Rewrites the canonical address into the configured mail domain.
#[derive(Debug, Clone)]
pub struct MailDomainRewriteHook {
    target: String,
    address_attribute: String,
    domain: String,
}

impl MailDomainRewriteHook {
    pub fn new(
        target: impl Into<String>,
        address_attribute: impl Into<String>,
        domain: impl Into<String>,
    ) -> Self {
        Self {
            target: target.into(),
            address_attribute: address_attribute.into(),
            domain: domain.into(),
        }
    }
}

/// Replace the domain part of an address.
pub fn rewrite_domain(address: &str, domain: &str) -> Option<String> {
    let (local, _) = address.rsplit_once('@')?;
    (!local.is_empty()).then(|| format!("{local}@{domain}"))
}

/// Domain part of an address, lowercased.
pub fn domain_of(address: &str) -> Option<String> {
    address
        .rsplit_once('@')
        .map(|(_, domain)| domain.to_ascii_lowercase())
}

impl AttributeHook for MailDomainRewriteHook {
    fn name(&self) -> &str {
        "mail_domain_rewrite"
    }

    fn target(&self) -> &str {
        &self.target
    }

    fn compute(&self, source: &Entry, _profile: &AttributeMappingProfile) -> Option<Vec<String>> {
        let address = source.first(&self.address_attribute)?;
        rewrite_domain(&transliterate(address), &self.domain).map(|a| vec![a])
    }
}
