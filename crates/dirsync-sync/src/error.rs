//! Sync error types.

use dirsync_connector::error::ConnectorError;
use thiserror::Error;

/// Errors that can occur during synchronization.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Directory or store collaborator error.
    #[error("Connector error: {0}")]
    Connector(#[from] ConnectorError),

    /// Configuration error.
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Bind against a directory failed.
    #[error("Bind to {directory} failed: {source}")]
    Bind {
        directory: String,
        #[source]
        source: ConnectorError,
    },

    /// The live high-water value could not be read from source metadata.
    #[error("Metadata error: attribute '{attribute}' - {message}")]
    Metadata { attribute: String, message: String },

    /// Persisted store content is unusable.
    #[error("Store error: {message}")]
    Store { message: String },

    /// A search page failed; pagination was aborted.
    #[error("Search error: {message}")]
    Search {
        message: String,
        #[source]
        source: Option<ConnectorError>,
    },

    /// No numeric identifier could be allocated.
    #[error("Allocation error: attribute '{attribute}' - {message}")]
    Allocation { attribute: String, message: String },

    /// An alias record could not be reconciled.
    #[error("Alias error: {address} - {message}")]
    Alias { address: String, message: String },

    /// Unknown sync target.
    #[error("Invalid target: {0}")]
    InvalidTarget(String),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_yaml::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SyncError {
    /// Create a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a bind error.
    pub fn bind(directory: impl Into<String>, source: ConnectorError) -> Self {
        Self::Bind {
            directory: directory.into(),
            source,
        }
    }

    /// Create a metadata error.
    pub fn metadata(attribute: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Metadata {
            attribute: attribute.into(),
            message: message.into(),
        }
    }

    /// Create a store error.
    pub fn store(message: impl Into<String>) -> Self {
        Self::Store {
            message: message.into(),
        }
    }

    /// Create a search error from a failed page.
    pub fn search(message: impl Into<String>, source: ConnectorError) -> Self {
        Self::Search {
            message: message.into(),
            source: Some(source),
        }
    }

    /// Create an allocation error.
    pub fn allocation(attribute: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Allocation {
            attribute: attribute.into(),
            message: message.into(),
        }
    }

    /// Create an alias error.
    pub fn alias(address: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Alias {
            address: address.into(),
            message: message.into(),
        }
    }

    /// Whether the error stops a whole run rather than a single entry.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Bind { .. }
                | Self::Metadata { .. }
                | Self::Search { .. }
                | Self::Configuration { .. }
                | Self::Store { .. }
                | Self::InvalidTarget(_)
                | Self::Io(_)
                | Self::Serialization(_)
        ) || matches!(self, Self::Connector(ConnectorError::StoreUnavailable { .. }))
    }

    /// Full diagnostic text, including server detail for protocol errors.
    pub fn diagnostic(&self) -> String {
        match self {
            Self::Connector(e) => e.diagnostic(),
            Self::Search {
                message,
                source: Some(e),
            } => format!("{message}: {}", e.diagnostic()),
            other => other.to_string(),
        }
    }
}

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(SyncError::bind("source", ConnectorError::AuthenticationFailed).is_fatal());
        assert!(SyncError::metadata("highestCommittedUSN", "missing").is_fatal());
        assert!(SyncError::search("page 3", ConnectorError::protocol(4, "sizeLimitExceeded", None)).is_fatal());
        assert!(SyncError::from(ConnectorError::store_unavailable("locked")).is_fatal());

        assert!(!SyncError::allocation("uidNumber", "exhausted").is_fatal());
        assert!(!SyncError::from(ConnectorError::protocol(65, "objectClassViolation", None)).is_fatal());
    }

    #[test]
    fn test_diagnostic_carries_protocol_detail() {
        let err = SyncError::from(ConnectorError::protocol(
            19,
            "constraintViolation",
            Some("uidNumber already in use".to_string()),
        ));
        assert!(err.diagnostic().contains("uidNumber already in use"));
    }
}
