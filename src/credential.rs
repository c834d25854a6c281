//! Database password handling.
//!
//! The password is a random 64-hex-character token kept in the OS keychain
//! under `(<app name>, "db_password")`. It is generated once and never
//! rotated: a stored entry is always returned as-is.

use crate::error::{BootstrapError, Result};
use rand::{rngs::OsRng, RngCore};
use std::collections::HashMap;
use std::fmt;
use std::sync::Mutex;
use tracing::{info, warn};
use zeroize::Zeroizing;

/// Keyring account name for the database password.
pub const DB_PASSWORD_KEY: &str = "db_password";

/// Random bytes per generated secret (hex-encoded to twice as many chars).
pub const SECRET_BYTES: usize = 32;

/// Database passphrase. Zeroized on drop, redacted in `Debug`.
#[derive(Clone)]
pub struct Secret(Zeroizing<String>);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(Zeroizing::new(value.into()))
    }

    /// Fresh secret from the OS CSPRNG.
    pub fn generate() -> Self {
        let mut bytes = Zeroizing::new([0u8; SECRET_BYTES]);
        OsRng.fill_bytes(&mut bytes[..]);
        Self::new(hex::encode(&bytes[..]))
    }

    pub fn expose(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(<redacted>)")
    }
}

impl PartialEq for Secret {
    fn eq(&self, other: &Self) -> bool {
        self.expose() == other.expose()
    }
}

impl Eq for Secret {}

/// Where the secret in a [`Credential`] came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialOrigin {
    /// Read from the credential store.
    Stored,
    /// Generated now and saved to the credential store.
    Generated,
    /// Generated now but the store rejected it. The operator must keep it.
    Unpersisted { reason: String },
    /// Provided by the operator; the store was not consulted.
    Supplied,
}

#[derive(Debug, Clone)]
pub struct Credential {
    pub secret: Secret,
    pub origin: CredentialOrigin,
}

impl Credential {
    /// Whether the secret exists only in this process.
    pub fn needs_operator_copy(&self) -> bool {
        matches!(self.origin, CredentialOrigin::Unpersisted { .. })
    }
}

/// Secure storage for the database password.
pub trait CredentialStore: Send + Sync {
    /// Backend name for logs
    fn name(&self) -> &'static str;

    /// Look up an entry. `Ok(None)` means the store works but has no entry.
    fn get(&self, service: &str, account: &str) -> Result<Option<Secret>>;

    fn set(&self, service: &str, account: &str, secret: &Secret) -> Result<()>;
}

/// OS keychain (macOS Keychain, Windows Credential Manager, Linux keyutils/Secret Service).
#[derive(Debug, Default, Clone, Copy)]
pub struct KeyringStore;

impl KeyringStore {
    pub fn new() -> Self {
        Self
    }

    fn entry(service: &str, account: &str) -> Result<keyring::Entry> {
        keyring::Entry::new(service, account)
            .map_err(|e| BootstrapError::CredentialStoreUnavailable(format!("keyring init: {e}")))
    }
}

impl CredentialStore for KeyringStore {
    fn name(&self) -> &'static str {
        "keyring"
    }

    fn get(&self, service: &str, account: &str) -> Result<Option<Secret>> {
        match Self::entry(service, account)?.get_password() {
            Ok(password) => Ok(Some(Secret::new(password))),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(BootstrapError::CredentialStoreUnavailable(format!(
                "load {account}: {e}"
            ))),
        }
    }

    fn set(&self, service: &str, account: &str, secret: &Secret) -> Result<()> {
        Self::entry(service, account)?
            .set_password(secret.expose())
            .map_err(|e| {
                BootstrapError::CredentialStoreUnavailable(format!("store {account}: {e}"))
            })
    }
}

/// Process-local store for tests and hosts without a keychain.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<(String, String), String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl CredentialStore for MemoryStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn get(&self, service: &str, account: &str) -> Result<Option<Secret>> {
        let entries = self
            .entries
            .lock()
            .map_err(|e| BootstrapError::CredentialStoreUnavailable(e.to_string()))?;
        Ok(entries
            .get(&(service.to_string(), account.to_string()))
            .map(|v| Secret::new(v.as_str())))
    }

    fn set(&self, service: &str, account: &str, secret: &Secret) -> Result<()> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|e| BootstrapError::CredentialStoreUnavailable(e.to_string()))?;
        entries.insert(
            (service.to_string(), account.to_string()),
            secret.expose().to_string(),
        );
        Ok(())
    }
}

/// Read the stored password without generating one.
pub fn lookup_credential(store: &dyn CredentialStore, app_name: &str) -> Result<Option<Secret>> {
    store.get(app_name, DB_PASSWORD_KEY)
}

/// Return the stored password, generating and storing one on first use.
///
/// Store failures do not abort: the generated secret is returned with
/// [`CredentialOrigin::Unpersisted`] so the caller can show it to the operator.
pub fn ensure_credential(store: &dyn CredentialStore, app_name: &str) -> Credential {
    let lookup_error = match lookup_credential(store, app_name) {
        Ok(Some(secret)) => {
            return Credential {
                secret,
                origin: CredentialOrigin::Stored,
            }
        }
        Ok(None) => None,
        Err(e) => Some(e),
    };

    let secret = Secret::generate();
    let stored = match lookup_error {
        Some(e) => Err(e),
        None => store.set(app_name, DB_PASSWORD_KEY, &secret),
    };

    match stored {
        Ok(()) => {
            info!(
                "[Credential] Generated database password in {} store",
                store.name()
            );
            Credential {
                secret,
                origin: CredentialOrigin::Generated,
            }
        }
        Err(e) => {
            warn!(
                "[Credential] {} store unavailable, password must be kept by the operator: {}",
                store.name(),
                e
            );
            Credential {
                secret,
                origin: CredentialOrigin::Unpersisted {
                    reason: e.to_string(),
                },
            }
        }
    }
}
