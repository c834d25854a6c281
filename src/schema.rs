//! Fixed relational schema for the finance database.
//!
//! Created once, in a single transaction, when the database file is new.
//! Foreign-key delete behaviour is pinned in [`FOREIGN_KEYS`] and checked
//! against the live schema in tests.

use crate::error::{BootstrapError, Result};
use rusqlite::Connection;
use tracing::info;

/// All tables, in creation order.
pub const TABLES: [&str; 8] = [
    "users",
    "budget",
    "budget_accounts",
    "vendor",
    "alerts",
    "report",
    "transactions",
    "audit_log",
];

/// Declared `ON DELETE` action of a foreign key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnDelete {
    /// Dependent rows are deleted with the parent.
    Cascade,
    /// Deleting a referenced parent fails with a constraint violation.
    NoAction,
}

impl OnDelete {
    /// Spelling used by `PRAGMA foreign_key_list`.
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Cascade => "CASCADE",
            Self::NoAction => "NO ACTION",
        }
    }
}

/// One declared foreign key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForeignKey {
    pub table: &'static str,
    pub column: &'static str,
    pub parent: &'static str,
    pub parent_column: &'static str,
    pub on_delete: OnDelete,
}

const fn fk(
    table: &'static str,
    column: &'static str,
    parent: &'static str,
    parent_column: &'static str,
    on_delete: OnDelete,
) -> ForeignKey {
    ForeignKey {
        table,
        column,
        parent,
        parent_column,
        on_delete,
    }
}

/// Canonical foreign-key policy. Must match [`SCHEMA_SQL`].
pub const FOREIGN_KEYS: [ForeignKey; 8] = [
    fk("budget", "the_user", "users", "userID", OnDelete::Cascade),
    fk("budget_accounts", "budget_id", "budget", "budget_id", OnDelete::Cascade),
    fk("alerts", "the_user", "users", "userID", OnDelete::Cascade),
    fk("alerts", "budget_id", "budget", "budget_id", OnDelete::Cascade),
    fk("report", "the_user", "users", "userID", OnDelete::Cascade),
    fk(
        "transactions",
        "budget_accounts_id",
        "budget_accounts",
        "budget_accounts_id",
        OnDelete::Cascade,
    ),
    fk("transactions", "vendor_id", "vendor", "vendor_id", OnDelete::NoAction),
    fk("audit_log", "the_user", "users", "userID", OnDelete::NoAction),
];

/// Schema creation script.
pub const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    userID          INTEGER PRIMARY KEY AUTOINCREMENT,
    username        TEXT NOT NULL UNIQUE,
    password_hash   TEXT NOT NULL,
    first_name      TEXT,
    last_name       TEXT,
    email           TEXT,
    created_at      TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS budget (
    budget_id       INTEGER PRIMARY KEY AUTOINCREMENT,
    the_user        INTEGER NOT NULL REFERENCES users(userID) ON DELETE CASCADE,
    budget_name     TEXT NOT NULL,
    total_amount    REAL NOT NULL DEFAULT 0,
    start_date      TEXT,
    end_date        TEXT,
    created_at      TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS budget_accounts (
    budget_accounts_id  INTEGER PRIMARY KEY AUTOINCREMENT,
    budget_id           INTEGER NOT NULL REFERENCES budget(budget_id) ON DELETE CASCADE,
    account_name        TEXT NOT NULL,
    account_type        TEXT NOT NULL DEFAULT 'expense',
    allocated_amount    REAL NOT NULL DEFAULT 0,
    balance             REAL NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS vendor (
    vendor_id       INTEGER PRIMARY KEY AUTOINCREMENT,
    vendor_name     TEXT NOT NULL UNIQUE,
    category        TEXT,
    phone           TEXT,
    website         TEXT
);

CREATE TABLE IF NOT EXISTS alerts (
    alert_id        INTEGER PRIMARY KEY AUTOINCREMENT,
    the_user        INTEGER NOT NULL REFERENCES users(userID) ON DELETE CASCADE,
    budget_id       INTEGER REFERENCES budget(budget_id) ON DELETE CASCADE,
    alert_type      TEXT NOT NULL,
    threshold       REAL,
    message         TEXT NOT NULL,
    is_read         INTEGER NOT NULL DEFAULT 0,
    created_at      TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS report (
    report_id       INTEGER PRIMARY KEY AUTOINCREMENT,
    the_user        INTEGER NOT NULL REFERENCES users(userID) ON DELETE CASCADE,
    report_name     TEXT NOT NULL,
    period_start    TEXT,
    period_end      TEXT,
    content         TEXT,
    generated_at    TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS transactions (
    transaction_id      INTEGER PRIMARY KEY AUTOINCREMENT,
    budget_accounts_id  INTEGER NOT NULL REFERENCES budget_accounts(budget_accounts_id) ON DELETE CASCADE,
    vendor_id           INTEGER REFERENCES vendor(vendor_id),
    amount              REAL NOT NULL,
    description         TEXT,
    transaction_date    TEXT NOT NULL DEFAULT (date('now'))
);

CREATE TABLE IF NOT EXISTS audit_log (
    log_id          INTEGER PRIMARY KEY AUTOINCREMENT,
    the_user        INTEGER REFERENCES users(userID),
    action          TEXT NOT NULL,
    table_name      TEXT,
    record_id       INTEGER,
    details         TEXT,
    logged_at       TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_budget_user ON budget(the_user);
CREATE INDEX IF NOT EXISTS idx_budget_accounts_budget ON budget_accounts(budget_id);
CREATE INDEX IF NOT EXISTS idx_alerts_user ON alerts(the_user);
CREATE INDEX IF NOT EXISTS idx_alerts_budget ON alerts(budget_id);
CREATE INDEX IF NOT EXISTS idx_report_user ON report(the_user);
CREATE INDEX IF NOT EXISTS idx_transactions_account ON transactions(budget_accounts_id);
CREATE INDEX IF NOT EXISTS idx_transactions_vendor ON transactions(vendor_id);
CREATE INDEX IF NOT EXISTS idx_audit_log_user ON audit_log(the_user);
"#;

/// Run [`SCHEMA_SQL`] in one transaction. Nothing is committed on error.
pub fn create_schema(conn: &mut Connection) -> Result<()> {
    apply_script(conn, SCHEMA_SQL)?;
    info!("[Schema] Created {} tables", TABLES.len());
    Ok(())
}

pub(crate) fn apply_script(conn: &mut Connection, script: &str) -> Result<()> {
    let tx = conn
        .transaction()
        .map_err(BootstrapError::SchemaCreationFailed)?;
    tx.execute_batch(script)
        .map_err(BootstrapError::SchemaCreationFailed)?;
    tx.commit().map_err(BootstrapError::SchemaCreationFailed)
}

/// Foreign-key delete policy for `table` as declared in the live database.
pub fn declared_foreign_keys(
    conn: &Connection,
    table: &str,
) -> Result<Vec<(String, String, String)>> {
    let mut stmt = conn.prepare(
        "SELECT \"from\", \"table\", on_delete FROM pragma_foreign_key_list(?1)",
    )?;
    let rows = stmt.query_map([table], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
        ))
    })?;

    let mut keys = Vec::new();
    for row in rows {
        keys.push(row?);
    }
    Ok(keys)
}
