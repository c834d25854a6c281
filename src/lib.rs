//! finvault - encrypted local store for the personal finance app.
//!
//! Provides:
//! - Per-OS application folder resolution
//! - A random database password kept in the OS keychain
//! - A SQLCipher database created with the full schema on first run and reused afterwards
//! - An owned store handle with explicit commit/close
//!
//! UI and data-access code are callers of the open [`EncryptedStore`].

pub mod bootstrap;
pub mod config;
pub mod console;
pub mod credential;
pub mod error;
pub mod platform;
pub mod schema;
pub mod store;

// Re-export main types
pub use bootstrap::{BootstrapState, Bootstrapped, Bootstrapper, DatabaseOutcome, InstallStatus};
pub use config::Config;
pub use credential::{
    ensure_credential, Credential, CredentialOrigin, CredentialStore, KeyringStore, MemoryStore,
    Secret,
};
pub use error::{BootstrapError, Result};
pub use platform::{DataRoots, InstallTarget, Platform};
pub use store::EncryptedStore;
