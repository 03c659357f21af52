//! # LDAP Directory Client
//!
//! LDAP/Active Directory implementation of the dirsync directory collaborator.
//!
//! ## Features
//!
//! - LDAP v3 simple bind over plain, LDAPS or STARTTLS connections
//! - Plain and paged (RFC 2696 cookie) searches
//! - Add/modify from a reconciled [`DestEntry`](dirsync_connector::operation::DestEntry)
//! - Root DSE reads for change-sequence metadata
//! - `objectSid` surfaced as `S-1-...` text, other binary values as base64
//!
//! ## Example
//!
//! ```ignore
//! use dirsync_connector::prelude::*;
//! use dirsync_connector_ldap::{LdapConfig, LdapDirectory};
//!
//! let config = LdapConfig::new(
//!     "dc1.corp.local",
//!     "dc=corp,dc=local",
//!     "cn=sync,ou=service,dc=corp,dc=local",
//! )
//! .with_password("secret")
//! .with_ssl();
//!
//! let source = LdapDirectory::new("source", config)?;
//! source.bind().await?;
//! let usn = source.read_root_attribute("highestCommittedUSN").await?;
//! ```

pub mod config;
pub mod connector;

pub use config::LdapConfig;
pub use connector::LdapDirectory;
