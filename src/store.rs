//! EncryptedStore - the single SQLCipher connection of a process.
//!
//! The handle is owned by whoever bootstrapped it and passed to the code
//! that needs it. `close` always commits pending work first.

use crate::credential::Secret;
use crate::error::{BootstrapError, Result};
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Open encrypted database handle.
pub struct EncryptedStore {
    conn: Connection,
    path: PathBuf,
}

/// Apply the SQLCipher key to a fresh connection. Must be the first statement.
pub(crate) fn apply_key(conn: &Connection, secret: &Secret) -> rusqlite::Result<()> {
    conn.pragma_update(None, "key", secret.expose())
}

impl EncryptedStore {
    /// Open an existing encrypted database with `secret`.
    ///
    /// The key is checked by reading `sqlite_master`; a wrong key fails with
    /// [`BootstrapError::StoreUnlockFailed`] before anything is written.
    pub fn open(path: &Path, secret: &Secret) -> Result<Self> {
        if !path.exists() {
            return Err(BootstrapError::StoreUnlockFailed {
                path: path.to_path_buf(),
                reason: "database file does not exist".to_string(),
            });
        }

        let unlock_failed = |e: rusqlite::Error| BootstrapError::StoreUnlockFailed {
            path: path.to_path_buf(),
            reason: e.to_string(),
        };

        let conn = Connection::open(path).map_err(unlock_failed)?;
        apply_key(&conn, secret).map_err(unlock_failed)?;
        conn.query_row("SELECT COUNT(*) FROM sqlite_master", [], |row| {
            row.get::<_, i64>(0)
        })
        .map_err(unlock_failed)?;

        conn.execute_batch("PRAGMA foreign_keys = ON;")?;

        info!("[Store] Opened {}", path.display());
        Ok(Self {
            conn,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Underlying connection for parameterized queries.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Whether a transaction is open.
    pub fn in_transaction(&self) -> bool {
        !self.conn.is_autocommit()
    }

    /// Start a unit of work that lasts until `commit`, `rollback` or `close`.
    pub fn begin(&self) -> Result<()> {
        if !self.in_transaction() {
            self.conn.execute_batch("BEGIN DEFERRED")?;
            debug!("[Store] Transaction started");
        }
        Ok(())
    }

    /// Commit pending work. No-op when nothing is pending.
    pub fn commit(&self) -> Result<()> {
        if self.in_transaction() {
            self.conn.execute_batch("COMMIT")?;
            debug!("[Store] Committed");
        }
        Ok(())
    }

    /// Discard pending work.
    pub fn rollback(&self) -> Result<()> {
        if self.in_transaction() {
            self.conn.execute_batch("ROLLBACK")?;
            debug!("[Store] Rolled back");
        }
        Ok(())
    }

    /// Names of the user tables, sorted.
    pub fn table_names(&self) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT name FROM sqlite_master
             WHERE type = 'table' AND name NOT LIKE 'sqlite_%'
             ORDER BY name",
        )?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(names)
    }

    /// Commit pending work and release the connection.
    pub fn close(self) -> Result<()> {
        self.commit()?;
        let path = self.path;
        self.conn.close().map_err(|(_, e)| BootstrapError::Database(e))?;
        info!("[Store] Closed {}", path.display());
        Ok(())
    }
}
