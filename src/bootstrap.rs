//! Bootstrapper - first-run setup and reuse of the encrypted database.
//!
//! Sequence:
//! `Uninitialized -> FolderReady -> CredentialReady -> {SchemaCreated | ExistingReused} -> Open -> Closed`
//!
//! The database file is the idempotency signal. When it exists, the stored
//! credential is authoritative and nothing is generated or written. When it
//! does not, a credential is ensured first and the file is built in a
//! staging file that is only moved into place once the schema committed.

use crate::config::Config;
use crate::credential::{
    self, lookup_credential, Credential, CredentialOrigin, CredentialStore, Secret,
};
use crate::error::{BootstrapError, Result};
use crate::platform::{ensure_folder, DataRoots, InstallTarget, Platform};
use crate::schema;
use crate::store::{apply_key, EncryptedStore};
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Bootstrap progress. Only moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BootstrapState {
    Uninitialized,
    FolderReady,
    CredentialReady,
    SchemaCreated,
    ExistingReused,
    Open,
    Closed,
}

/// What `ensure_database` did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DatabaseOutcome {
    /// New file with the full schema.
    Created,
    /// File already present; left untouched.
    Reused,
}

/// Result of a full bootstrap.
pub struct Bootstrapped {
    pub store: EncryptedStore,
    pub credential: Credential,
    pub outcome: DatabaseOutcome,
}

/// Read-only view of an installation, for status reporting.
#[derive(Debug, Clone, Serialize)]
pub struct InstallStatus {
    pub platform: Platform,
    pub app_folder: PathBuf,
    pub db_path: PathBuf,
    pub db_exists: bool,
    pub db_size: Option<u64>,
    pub db_modified: Option<DateTime<Utc>>,
    /// `None` when the credential store could not be queried.
    pub credential_present: Option<bool>,
}

pub struct Bootstrapper {
    target: InstallTarget,
    roots: DataRoots,
    folder_override: Option<PathBuf>,
    credentials: Box<dyn CredentialStore>,
    supplied_secret: Option<Secret>,
    schema_script: &'static str,
    app_folder: Option<PathBuf>,
    state: BootstrapState,
}

impl Bootstrapper {
    pub fn new(
        target: InstallTarget,
        roots: DataRoots,
        credentials: Box<dyn CredentialStore>,
    ) -> Self {
        Self {
            target,
            roots,
            folder_override: None,
            credentials,
            supplied_secret: None,
            schema_script: schema::SCHEMA_SQL,
            app_folder: None,
            state: BootstrapState::Uninitialized,
        }
    }

    /// Bootstrapper for the running platform, using the config's names and folder override.
    pub fn from_config(config: &Config, credentials: Box<dyn CredentialStore>) -> Result<Self> {
        let platform = Platform::detect()?;
        let roots = DataRoots::from_env()?;
        let mut bootstrapper = Self::new(config.install_target(platform), roots, credentials);
        bootstrapper.folder_override = config.data_dir.clone();
        Ok(bootstrapper)
    }

    /// Use `folder` instead of the platform data folder.
    pub fn with_app_folder(mut self, folder: impl Into<PathBuf>) -> Self {
        self.folder_override = Some(folder.into());
        self
    }

    /// Use an operator-provided secret for an existing database; the
    /// credential store is not consulted. Ignored on a fresh install.
    pub fn with_secret(mut self, secret: Secret) -> Self {
        self.supplied_secret = Some(secret);
        self
    }

    #[cfg(test)]
    fn with_schema_script(mut self, script: &'static str) -> Self {
        self.schema_script = script;
        self
    }

    pub fn state(&self) -> BootstrapState {
        self.state
    }

    pub fn target(&self) -> &InstallTarget {
        &self.target
    }

    fn advance(&mut self, next: BootstrapState) {
        if next > self.state {
            debug!("[Bootstrap] {:?} -> {:?}", self.state, next);
            self.state = next;
        }
    }

    fn app_folder_path(&self) -> PathBuf {
        self.folder_override
            .clone()
            .unwrap_or_else(|| self.target.app_folder(&self.roots))
    }

    /// Per-OS data folder for the app, created if absent.
    pub fn resolve_app_folder(&mut self) -> Result<PathBuf> {
        if let Some(folder) = &self.app_folder {
            return Ok(folder.clone());
        }

        let folder = self.app_folder_path();
        ensure_folder(&folder)?;
        info!("[Bootstrap] App folder: {}", folder.display());

        self.app_folder = Some(folder.clone());
        self.advance(BootstrapState::FolderReady);
        Ok(folder)
    }

    /// Path of the database file inside the app folder.
    pub fn db_path(&mut self) -> Result<PathBuf> {
        let folder = self.resolve_app_folder()?;
        Ok(self.target.db_path(&folder))
    }

    /// Secret for the database.
    ///
    /// With no database file yet, the stored secret is returned or a new one
    /// generated (falling back to an unpersisted secret when the store
    /// rejects it). With an existing file, only a stored secret is accepted:
    /// a missing entry fails with `StoreUnlockFailed` and nothing is written.
    /// A supplied secret only unlocks an existing file.
    pub fn ensure_credential(&mut self) -> Result<Credential> {
        let db_path = self.db_path()?;
        let exists = db_path.exists();

        if !exists && self.supplied_secret.is_some() {
            warn!(
                "[Bootstrap] No database at {}, ignoring supplied secret",
                db_path.display()
            );
        }

        let credential = if !exists {
            credential::ensure_credential(self.credentials.as_ref(), &self.target.app_name)
        } else if let Some(secret) = &self.supplied_secret {
            Credential {
                secret: secret.clone(),
                origin: CredentialOrigin::Supplied,
            }
        } else {
            match lookup_credential(self.credentials.as_ref(), &self.target.app_name)? {
                Some(secret) => Credential {
                    secret,
                    origin: CredentialOrigin::Stored,
                },
                None => {
                    return Err(BootstrapError::StoreUnlockFailed {
                        path: db_path,
                        reason: format!(
                            "no '{}' entry for '{}' in the {} store",
                            credential::DB_PASSWORD_KEY,
                            self.target.app_name,
                            self.credentials.name()
                        ),
                    })
                }
            }
        };

        self.advance(BootstrapState::CredentialReady);
        Ok(credential)
    }

    /// Create the database with the full schema if the file does not exist.
    ///
    /// An existing file is never opened or modified here.
    pub fn ensure_database(&mut self, secret: &Secret) -> Result<DatabaseOutcome> {
        let db_path = self.db_path()?;
        if db_path.exists() {
            info!("[Bootstrap] Reusing existing database {}", db_path.display());
            self.advance(BootstrapState::ExistingReused);
            return Ok(DatabaseOutcome::Reused);
        }

        let staging = staging_path(&db_path);
        if staging.exists() {
            warn!("[Bootstrap] Removing stale {}", staging.display());
            remove_staging(&staging)?;
        }

        if let Err(e) = build_database(&staging, secret, self.schema_script) {
            if let Err(cleanup) = remove_staging(&staging) {
                warn!("[Bootstrap] Cannot remove {}: {}", staging.display(), cleanup);
            }
            return Err(e);
        }

        // Another instance may have won the race while we were building.
        if db_path.exists() {
            warn!(
                "[Bootstrap] {} appeared during creation, keeping it",
                db_path.display()
            );
            remove_staging(&staging)?;
            self.advance(BootstrapState::ExistingReused);
            return Ok(DatabaseOutcome::Reused);
        }

        std::fs::rename(&staging, &db_path).map_err(|e| BootstrapError::io(&db_path, e))?;
        info!("[Bootstrap] Created database {}", db_path.display());
        self.advance(BootstrapState::SchemaCreated);
        Ok(DatabaseOutcome::Created)
    }

    /// Open the database with `secret`.
    pub fn open(&mut self, secret: &Secret) -> Result<EncryptedStore> {
        let db_path = self.db_path()?;
        let store = EncryptedStore::open(&db_path, secret)?;
        self.advance(BootstrapState::Open);
        Ok(store)
    }

    /// Commit and close a store opened by this bootstrapper.
    pub fn close(&mut self, store: EncryptedStore) -> Result<()> {
        store.close()?;
        self.advance(BootstrapState::Closed);
        Ok(())
    }

    /// Full sequence: folder, credential, database, open.
    pub fn run(&mut self) -> Result<Bootstrapped> {
        self.resolve_app_folder()?;
        let credential = self.ensure_credential()?;
        let outcome = self.ensure_database(&credential.secret)?;
        let store = self.open(&credential.secret)?;

        Ok(Bootstrapped {
            store,
            credential,
            outcome,
        })
    }

    /// Describe the installation without creating or writing anything.
    pub fn inspect(&self) -> InstallStatus {
        let app_folder = self.app_folder_path();
        let db_path = self.target.db_path(&app_folder);
        let metadata = std::fs::metadata(&db_path).ok();

        let credential_present = if self.supplied_secret.is_some() && metadata.is_some() {
            Some(true)
        } else {
            match lookup_credential(self.credentials.as_ref(), &self.target.app_name) {
                Ok(secret) => Some(secret.is_some()),
                Err(e) => {
                    warn!("[Bootstrap] Cannot query credential store: {}", e);
                    None
                }
            }
        };

        InstallStatus {
            platform: self.target.platform,
            db_exists: metadata.is_some(),
            db_size: metadata.as_ref().map(|m| m.len()),
            db_modified: metadata
                .as_ref()
                .and_then(|m| m.modified().ok())
                .map(DateTime::<Utc>::from),
            app_folder,
            db_path,
            credential_present,
        }
    }
}

/// Sibling file the new database is built in: `.<name>.partial`.
fn staging_path(db_path: &Path) -> PathBuf {
    let name = db_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    db_path.with_file_name(format!(".{}.partial", name))
}

fn remove_staging(staging: &Path) -> Result<()> {
    std::fs::remove_file(staging).map_err(|e| BootstrapError::io(staging, e))?;
    let journal = staging.with_file_name(format!(
        "{}-journal",
        staging
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    ));
    if journal.exists() {
        std::fs::remove_file(&journal).map_err(|e| BootstrapError::io(&journal, e))?;
    }
    Ok(())
}

fn build_database(path: &Path, secret: &Secret, script: &str) -> Result<()> {
    let mut conn = Connection::open(path)?;
    apply_key(&conn, secret)?;
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    schema::apply_script(&mut conn, script)?;
    info!("[Schema] Created {} tables", schema::TABLES.len());
    conn.close().map_err(|(_, e)| BootstrapError::Database(e))?;
    Ok(())
}
