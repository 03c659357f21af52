//! Deployment strategies.
//!
//! Each deployment variant builds the profiles for every entry kind once,
//! at configuration-load time.

use crate::config::{AliasConfig, Deployment, EntryConfig, SyncConfig};
use crate::error::{SyncError, SyncResult};

use super::{
    AddressTrigger, AttributeMappingProfile, ConstantHook, EntryKind, HomeDirectoryHook,
    MailAddressHook, MailDomainRewriteHook, MembershipSlot, UserLocator,
};

const HOME_DIRECTORY: &str = "homeDirectory";
const LOGIN_SHELL: &str = "loginShell";
const DEFAULT_MAIL_ATTRIBUTE: &str = "mail";

/// Builds attribute-mapping profiles for one deployment variant.
pub trait ProfileStrategy: Send + Sync {
    /// Strategy name used in logs.
    fn name(&self) -> &'static str;

    /// Build the profile for `kind`.
    fn profile(&self, kind: EntryKind, config: &SyncConfig) -> SyncResult<AttributeMappingProfile>;

    /// Whether address-domain changes produce alias records.
    fn syncs_aliases(&self) -> bool {
        false
    }
}

/// Select the strategy for a deployment.
pub fn strategy_for(deployment: Deployment) -> Box<dyn ProfileStrategy> {
    match deployment {
        Deployment::Standard => Box::new(StandardProfile),
        Deployment::MailHosting => Box::new(MailHostingProfile),
    }
}

fn section<'a>(config: &'a SyncConfig, kind: EntryKind) -> SyncResult<&'a EntryConfig> {
    let section = match kind {
        EntryKind::User => config.users.as_ref(),
        EntryKind::Group => config.groups.as_ref(),
        EntryKind::List => config.lists.as_ref(),
        EntryKind::Alias => None,
    };
    section.ok_or_else(|| SyncError::configuration(format!("no {kind} section configured")))
}

fn mail_domain(config: &SyncConfig) -> SyncResult<&str> {
    config
        .mail_domain
        .as_deref()
        .filter(|d| !d.is_empty())
        .ok_or_else(|| SyncError::configuration("mail_domain is not configured"))
}

/// Mail attribute of a section on the source, and its destination name.
fn mail_attributes(section: &EntryConfig) -> (String, String) {
    let source = section
        .mail_attribute
        .clone()
        .unwrap_or_else(|| DEFAULT_MAIL_ATTRIBUTE.to_string());
    let target = section.target_of(&source).unwrap_or(&source).to_string();
    (source, target)
}

fn user_locator(config: &SyncConfig) -> SyncResult<UserLocator> {
    let users = section(config, EntryKind::User)?;
    let (source_mail, destination_mail) = mail_attributes(users);
    Ok(UserLocator {
        source_base: config.source_base(users).to_string(),
        source_login_attribute: users.lookup.source.clone(),
        source_mail_attribute: source_mail,
        destination_base: users.base_dn.clone(),
        destination_login_attribute: users.lookup.destination.clone(),
        destination_mail_attribute: destination_mail,
        destination_rdn_attribute: users.rdn_attribute.clone(),
    })
}

/// Profile skeleton shared by every strategy: mapping table, naming and
/// configured default values.
fn base_profile(kind: EntryKind, config: &SyncConfig) -> SyncResult<AttributeMappingProfile> {
    let section = section(config, kind)?;

    let mut profile = AttributeMappingProfile::new(kind, &section.base_dn, &section.rdn_attribute)
        .with_source(config.source_base(section), &section.source_object_class)
        .with_lookup(&section.lookup.source, &section.lookup.destination)
        .with_object_classes(section.object_classes.iter().cloned());
    profile.mappings = section.mappings.clone();
    profile.exclude_filters = section.exclude_filters.clone();

    for default in &section.defaults {
        profile = profile.with_hook(
            ConstantHook::new(&default.attribute, default.values.clone())
                .on(default.on_create, default.on_update),
        );
    }

    if let Some(members) = &section.members {
        profile = profile.with_members(MembershipSlot {
            config: members.clone(),
            users: user_locator(config)?,
        });
    }

    Ok(profile)
}

fn alias_profile(aliases: &AliasConfig) -> AttributeMappingProfile {
    let mut profile =
        AttributeMappingProfile::new(EntryKind::Alias, &aliases.base_dn, aliases.rdn_attribute())
            .with_lookup(&aliases.mapping_name_attribute, &aliases.mapping_name_attribute)
            .with_object_classes(aliases.object_classes.iter().cloned())
            .with_mapping(&aliases.mapping_name_attribute, &aliases.mapping_name_attribute)
            .with_mapping(&aliases.mapping_value_attribute, &aliases.mapping_value_attribute);

    if let (Some(attribute), Some(value)) = (&aliases.mailhost_attribute, &aliases.mailhost) {
        profile = profile.with_hook(ConstantHook::new(attribute, vec![value.clone()]));
    }
    if let (Some(attribute), Some(value)) =
        (&aliases.home_directory_attribute, &aliases.home_directory)
    {
        profile = profile.with_hook(ConstantHook::new(attribute, vec![value.clone()]));
    }
    profile
}

/// Posix users and groups, mail lists with synthesized addresses.
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardProfile;

impl ProfileStrategy for StandardProfile {
    fn name(&self) -> &'static str {
        "standard"
    }

    fn profile(&self, kind: EntryKind, config: &SyncConfig) -> SyncResult<AttributeMappingProfile> {
        if kind == EntryKind::Alias {
            let aliases = config
                .aliases
                .as_ref()
                .ok_or_else(|| SyncError::configuration("no alias section configured"))?;
            return Ok(alias_profile(aliases));
        }

        let section = section(config, kind)?;
        let mut profile = base_profile(kind, config)?;
        let ids = &config.identifiers;

        match kind {
            EntryKind::User => {
                if ids.enabled {
                    profile = profile.with_identifier(&ids.user_attribute);
                }
                if let Some(template) = &section.home_directory {
                    profile = profile.with_hook(HomeDirectoryHook::new(HOME_DIRECTORY, template));
                }
                if let Some(shell) = &section.login_shell {
                    profile = profile.with_hook(ConstantHook::new(LOGIN_SHELL, vec![shell.clone()]));
                }
            }
            EntryKind::Group => {
                if ids.enabled {
                    profile = profile.with_identifier(&ids.group_attribute);
                }
            }
            EntryKind::List => {
                let (source, target) = mail_attributes(section);
                profile = profile.with_hook(MailAddressHook::new(
                    target,
                    source,
                    section.nickname_attribute.clone(),
                    mail_domain(config)?,
                ));
            }
            EntryKind::Alias => {}
        }

        Ok(profile)
    }
}

/// Standard plus mail-domain rewrite of user addresses and alias records.
#[derive(Debug, Clone, Copy, Default)]
pub struct MailHostingProfile;

impl ProfileStrategy for MailHostingProfile {
    fn name(&self) -> &'static str {
        "mail_hosting"
    }

    fn profile(&self, kind: EntryKind, config: &SyncConfig) -> SyncResult<AttributeMappingProfile> {
        let mut profile = StandardProfile.profile(kind, config)?;

        if kind == EntryKind::User {
            let section = section(config, kind)?;
            let (source, target) = mail_attributes(section);
            profile = profile
                .with_hook(MailDomainRewriteHook::new(&target, &source, mail_domain(config)?))
                .with_address_trigger(AddressTrigger {
                    source_attribute: source,
                    target_attribute: target,
                });
        }

        Ok(profile)
    }

    fn syncs_aliases(&self) -> bool {
        true
    }
}
