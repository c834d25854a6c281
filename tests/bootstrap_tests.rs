//! Integration tests for the store bootstrap.
//!
//! Covers first-run creation, reuse across restarts, wrong-key handling and
//! the pinned foreign-key delete behaviour of every table pair.

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use finvault::credential::{CredentialStore, MemoryStore, Secret};
use finvault::schema::{self, OnDelete, FOREIGN_KEYS, TABLES};
use finvault::{
    BootstrapError, Bootstrapper, CredentialOrigin, DataRoots, DatabaseOutcome, EncryptedStore,
    InstallTarget, Platform,
};
use rusqlite::params;
use tempfile::TempDir;

/// Credential store that survives "process restarts" within one test.
struct Keychain(Arc<MemoryStore>);

impl CredentialStore for Keychain {
    fn name(&self) -> &'static str {
        "test-keychain"
    }

    fn get(&self, service: &str, account: &str) -> finvault::Result<Option<Secret>> {
        self.0.get(service, account)
    }

    fn set(&self, service: &str, account: &str, secret: &Secret) -> finvault::Result<()> {
        self.0.set(service, account, secret)
    }
}

fn launch(home: &Path, keychain: &Arc<MemoryStore>) -> Bootstrapper {
    Bootstrapper::new(
        InstallTarget::new(Platform::Linux, "finvault", "finvault.db"),
        DataRoots::with_home(home),
        Box::new(Keychain(keychain.clone())),
    )
}

fn fresh_store() -> Result<(TempDir, EncryptedStore)> {
    let home = TempDir::new()?;
    let keychain = Arc::new(MemoryStore::new());
    let boot = launch(home.path(), &keychain).run()?;
    Ok((home, boot.store))
}

// ===========================================================================
// Folder resolution
// ===========================================================================

mod folders {
    use super::*;

    #[test]
    fn test_windows_and_macos_folders() -> Result<()> {
        let home = TempDir::new()?;
        let cases = [
            (
                Platform::Windows,
                home.path().join("AppData").join("Roaming").join("finvault"),
            ),
            (
                Platform::MacOs,
                home.path()
                    .join("Library")
                    .join("Application Support")
                    .join("finvault"),
            ),
        ];

        for (platform, expected) in cases {
            let mut bootstrapper = Bootstrapper::new(
                InstallTarget::new(platform, "finvault", "finvault.db"),
                DataRoots::with_home(home.path()),
                Box::new(MemoryStore::new()),
            );
            let folder = bootstrapper.resolve_app_folder()?;
            assert_eq!(folder, expected, "{}", platform);
            assert!(folder.is_dir(), "{} folder not created", platform);
        }
        Ok(())
    }

    #[test]
    fn test_unknown_os_is_unsupported() {
        let err = Platform::from_os("haiku").unwrap_err();
        assert!(matches!(err, BootstrapError::UnsupportedPlatform(_)));
    }
}

// ===========================================================================
// Credential
// ===========================================================================

mod credential {
    use super::*;

    #[test]
    fn test_ensure_credential_twice_returns_same_secret() -> Result<()> {
        let home = TempDir::new()?;
        let keychain = Arc::new(MemoryStore::new());
        let mut bootstrapper = launch(home.path(), &keychain);

        let first = bootstrapper.ensure_credential()?;
        let second = bootstrapper.ensure_credential()?;
        assert_eq!(first.secret, second.secret);
        assert_eq!(first.origin, CredentialOrigin::Generated);
        assert_eq!(second.origin, CredentialOrigin::Stored);
        assert_eq!(keychain.len(), 1);
        Ok(())
    }
}

// ===========================================================================
// Database creation and reuse
// ===========================================================================

mod database {
    use super::*;

    #[test]
    fn test_creates_file_with_all_tables() -> Result<()> {
        let (_home, store) = fresh_store()?;
        for table in TABLES {
            let count: i64 = store.connection().query_row(
                &format!("SELECT COUNT(*) FROM {}", table),
                [],
                |row| row.get(0),
            )?;
            assert_eq!(count, 0, "{} should be empty", table);
        }
        store.close()?;
        Ok(())
    }

    #[test]
    fn test_second_ensure_database_does_not_write() -> Result<()> {
        let home = TempDir::new()?;
        let keychain = Arc::new(MemoryStore::new());
        let mut bootstrapper = launch(home.path(), &keychain);

        let credential = bootstrapper.ensure_credential()?;
        assert_eq!(
            bootstrapper.ensure_database(&credential.secret)?,
            DatabaseOutcome::Created
        );

        let db_path = bootstrapper.db_path()?;
        let bytes_before = std::fs::read(&db_path)?;
        let modified_before = std::fs::metadata(&db_path)?.modified()?;

        assert_eq!(
            bootstrapper.ensure_database(&credential.secret)?,
            DatabaseOutcome::Reused
        );
        // A wrong secret must not matter either: the file is not opened.
        assert_eq!(
            bootstrapper.ensure_database(&Secret::generate())?,
            DatabaseOutcome::Reused
        );

        assert_eq!(std::fs::read(&db_path)?, bytes_before);
        assert_eq!(std::fs::metadata(&db_path)?.modified()?, modified_before);
        Ok(())
    }

    #[test]
    fn test_file_is_encrypted() -> Result<()> {
        let (_home, store) = fresh_store()?;
        let path = store.path().to_path_buf();
        store.close()?;

        let header = std::fs::read(&path)?;
        assert!(!header.starts_with(b"SQLite format 3"));

        // Plain SQLite cannot read it without the key.
        let plain = rusqlite::Connection::open(&path)?;
        assert!(plain
            .query_row("SELECT COUNT(*) FROM sqlite_master", [], |row| row
                .get::<_, i64>(0))
            .is_err());
        Ok(())
    }

    #[test]
    fn test_wrong_secret_fails_and_leaves_file_unmodified() -> Result<()> {
        let (_home, store) = fresh_store()?;
        let path = store.path().to_path_buf();
        store.close()?;

        let bytes_before = std::fs::read(&path)?;
        let err = EncryptedStore::open(&path, &Secret::generate())
            .err()
            .expect("wrong secret must not unlock");
        assert!(matches!(err, BootstrapError::StoreUnlockFailed { .. }));
        assert_eq!(std::fs::read(&path)?, bytes_before);
        Ok(())
    }

    #[test]
    fn test_fresh_install_then_restart() -> Result<()> {
        let home = TempDir::new()?;
        let keychain = Arc::new(MemoryStore::new());

        // First launch on a clean machine
        let mut first = launch(home.path(), &keychain);
        let boot = first.run()?;
        let token = boot.credential.secret.clone();
        assert_eq!(token.expose().len(), 64);
        assert!(token.expose().chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(boot.outcome, DatabaseOutcome::Created);
        assert_eq!(boot.store.table_names()?.len(), TABLES.len());
        first.close(boot.store)?;

        // Restart
        let mut second = launch(home.path(), &keychain);
        let boot = second.run()?;
        assert_eq!(boot.credential.secret, token);
        assert_eq!(boot.credential.origin, CredentialOrigin::Stored);
        assert_eq!(boot.outcome, DatabaseOutcome::Reused);
        second.close(boot.store)?;
        Ok(())
    }

    #[test]
    fn test_data_survives_restart() -> Result<()> {
        let home = TempDir::new()?;
        let keychain = Arc::new(MemoryStore::new());

        let boot = launch(home.path(), &keychain).run()?;
        boot.store.begin()?;
        boot.store.connection().execute(
            "INSERT INTO users (username, password_hash) VALUES (?1, ?2)",
            params!["alex", "argon2-hash"],
        )?;
        boot.store.close()?;

        let boot = launch(home.path(), &keychain).run()?;
        let name: String = boot.store.connection().query_row(
            "SELECT username FROM users",
            [],
            |row| row.get(0),
        )?;
        assert_eq!(name, "alex");
        boot.store.close()?;
        Ok(())
    }
}

// ===========================================================================
// Foreign-key delete policy
// ===========================================================================

mod foreign_keys {
    use super::*;
    use rusqlite::Connection;

    fn count(conn: &Connection, table: &str) -> Result<i64> {
        Ok(conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| {
            row.get(0)
        })?)
    }

    /// One user with a budget, account, vendor, transaction, alert, report and audit entry.
    fn seed(conn: &Connection) -> Result<()> {
        conn.execute(
            "INSERT INTO users (userID, username, password_hash) VALUES (1, 'sam', 'h')",
            [],
        )?;
        conn.execute(
            "INSERT INTO budget (budget_id, the_user, budget_name, total_amount)
             VALUES (1, 1, 'Household', 2500.0)",
            [],
        )?;
        conn.execute(
            "INSERT INTO budget_accounts (budget_accounts_id, budget_id, account_name, allocated_amount)
             VALUES (1, 1, 'Groceries', 600.0)",
            [],
        )?;
        conn.execute(
            "INSERT INTO vendor (vendor_id, vendor_name) VALUES (1, 'Corner Grocery')",
            [],
        )?;
        conn.execute(
            "INSERT INTO transactions (budget_accounts_id, vendor_id, amount, description)
             VALUES (1, 1, 42.10, 'weekly shop')",
            [],
        )?;
        conn.execute(
            "INSERT INTO alerts (the_user, budget_id, alert_type, threshold, message)
             VALUES (1, 1, 'overspend', 0.9, 'Groceries at 90%')",
            [],
        )?;
        conn.execute(
            "INSERT INTO report (the_user, report_name) VALUES (1, 'March')",
            [],
        )?;
        Ok(())
    }

    fn is_constraint_violation(err: &rusqlite::Error) -> bool {
        matches!(
            err.sqlite_error_code(),
            Some(rusqlite::ErrorCode::ConstraintViolation)
        )
    }

    #[test]
    fn test_pinned_policy_is_declared() -> Result<()> {
        let (_home, store) = fresh_store()?;
        let conn = store.connection();

        for key in FOREIGN_KEYS {
            let declared = schema::declared_foreign_keys(conn, key.table)?;
            assert!(
                declared.contains(&(
                    key.column.to_string(),
                    key.parent.to_string(),
                    key.on_delete.as_sql().to_string()
                )),
                "{}.{} -> {} not declared as {:?}",
                key.table,
                key.column,
                key.parent,
                key.on_delete
            );
        }
        Ok(())
    }

    #[test]
    fn test_foreign_keys_enforced() -> Result<()> {
        let (_home, store) = fresh_store()?;
        let err = store
            .connection()
            .execute(
                "INSERT INTO budget (the_user, budget_name) VALUES (99, 'orphan')",
                [],
            )
            .unwrap_err();
        assert!(is_constraint_violation(&err));
        Ok(())
    }

    #[test]
    fn test_user_with_budget_cascades() -> Result<()> {
        let (_home, store) = fresh_store()?;
        let conn = store.connection();
        conn.execute(
            "INSERT INTO users (userID, username, password_hash) VALUES (1, 'sam', 'h')",
            [],
        )?;
        conn.execute(
            "INSERT INTO budget (the_user, budget_name) VALUES (1, 'Household')",
            [],
        )?;

        conn.execute("DELETE FROM users WHERE userID = 1", [])?;
        assert_eq!(count(conn, "budget")?, 0);
        Ok(())
    }

    #[test]
    fn test_user_delete_cascades_through_budget_tree() -> Result<()> {
        let (_home, store) = fresh_store()?;
        let conn = store.connection();
        seed(conn)?;

        conn.execute("DELETE FROM users WHERE userID = 1", [])?;

        // users -> budget -> budget_accounts -> transactions, plus alerts and report
        for table in ["budget", "budget_accounts", "transactions", "alerts", "report"] {
            assert_eq!(count(conn, table)?, 0, "{} not cascaded", table);
        }
        // vendor is not owned by a user
        assert_eq!(count(conn, "vendor")?, 1);
        Ok(())
    }

    #[test]
    fn test_budget_delete_cascades_to_alerts() -> Result<()> {
        let (_home, store) = fresh_store()?;
        let conn = store.connection();
        seed(conn)?;

        conn.execute("DELETE FROM budget WHERE budget_id = 1", [])?;
        assert_eq!(count(conn, "alerts")?, 0);
        assert_eq!(count(conn, "budget_accounts")?, 0);
        assert_eq!(count(conn, "report")?, 1);
        Ok(())
    }

    #[test]
    fn test_referenced_vendor_cannot_be_deleted() -> Result<()> {
        let (_home, store) = fresh_store()?;
        let conn = store.connection();
        seed(conn)?;

        let err = conn
            .execute("DELETE FROM vendor WHERE vendor_id = 1", [])
            .unwrap_err();
        assert!(is_constraint_violation(&err));
        assert_eq!(count(conn, "transactions")?, 1);
        Ok(())
    }

    #[test]
    fn test_user_with_audit_entries_cannot_be_deleted() -> Result<()> {
        let (_home, store) = fresh_store()?;
        let conn = store.connection();
        seed(conn)?;
        conn.execute(
            "INSERT INTO audit_log (the_user, action, table_name, record_id)
             VALUES (1, 'login', 'users', 1)",
            [],
        )?;

        let err = conn
            .execute("DELETE FROM users WHERE userID = 1", [])
            .unwrap_err();
        assert!(is_constraint_violation(&err));
        assert_eq!(count(conn, "users")?, 1);
        assert_eq!(count(conn, "budget")?, 1);
        Ok(())
    }

    #[test]
    fn test_policy_split() {
        let cascades = FOREIGN_KEYS
            .iter()
            .filter(|k| k.on_delete == OnDelete::Cascade)
            .count();
        let restricted = FOREIGN_KEYS
            .iter()
            .filter(|k| k.on_delete == OnDelete::NoAction)
            .count();
        assert_eq!(cascades, 6);
        assert_eq!(restricted, 2);
    }
}
