//! Error taxonomy for the store bootstrap.
//!
//! Every failure is surfaced to the caller. Nothing here is retried
//! automatically: a retry is a new bootstrap on the next launch.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BootstrapError {
    /// The running OS has no known application-data convention.
    #[error("Unsupported platform: {0}")]
    UnsupportedPlatform(String),

    /// The OS credential store could not be read or written.
    #[error("Credential store unavailable: {0}")]
    CredentialStoreUnavailable(String),

    /// Wrong or missing key for an existing database file.
    #[error("Cannot unlock store {}: {reason}", path.display())]
    StoreUnlockFailed { path: PathBuf, reason: String },

    /// Schema script failed; the partial database was rolled back and removed.
    #[error("Schema creation failed: {0}")]
    SchemaCreationFailed(#[source] rusqlite::Error),

    #[error("Cannot determine home directory")]
    NoHomeDirectory,

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
}

impl BootstrapError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether the caller may continue in a degraded mode.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::CredentialStoreUnavailable(_))
    }
}

pub type Result<T> = std::result::Result<T, BootstrapError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_credential_store_is_recoverable() {
        assert!(BootstrapError::CredentialStoreUnavailable("locked".into()).is_recoverable());
        assert!(!BootstrapError::UnsupportedPlatform("plan9".into()).is_recoverable());
        assert!(!BootstrapError::StoreUnlockFailed {
            path: PathBuf::from("/tmp/x.db"),
            reason: "file is not a database".into(),
        }
        .is_recoverable());
    }

    #[test]
    fn test_unlock_message_names_file() {
        let err = BootstrapError::StoreUnlockFailed {
            path: PathBuf::from("/data/finvault.db"),
            reason: "file is not a database".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("/data/finvault.db"));
        assert!(msg.contains("file is not a database"));
    }
}
