//! Interactive ad-hoc SQL console for inspecting the database.
//!
//! Reads one statement per line until `exit`, `quit` or `.q` (or EOF).
//! Errors are printed and the session continues. Committing is left to
//! the caller.

use crate::store::EncryptedStore;
use anyhow::Result;
use rusqlite::types::ValueRef;
use rusqlite::Connection;
use std::io::{BufRead, Write};

/// Inputs that end the session.
pub const EXIT_COMMANDS: [&str; 3] = ["exit", "quit", ".q"];

const PROMPT: &str = "sql> ";

/// Outcome of one statement.
#[derive(Debug, Clone, PartialEq)]
pub enum StatementOutput {
    Rows {
        columns: Vec<String>,
        rows: Vec<Vec<String>>,
    },
    Affected(usize),
}

/// Counts for a finished session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConsoleSummary {
    pub executed: usize,
    pub failed: usize,
}

pub fn is_exit_command(line: &str) -> bool {
    EXIT_COMMANDS.contains(&line.trim().to_ascii_lowercase().as_str())
}

/// Run a single statement. Statements without result columns report the affected rows.
pub fn execute_statement(conn: &Connection, sql: &str) -> rusqlite::Result<StatementOutput> {
    let mut stmt = conn.prepare(sql)?;
    if stmt.column_count() == 0 {
        let affected = stmt.execute([])?;
        return Ok(StatementOutput::Affected(affected));
    }

    let columns: Vec<String> = stmt
        .column_names()
        .into_iter()
        .map(String::from)
        .collect();

    let mut rows = Vec::new();
    let mut cursor = stmt.query([])?;
    while let Some(row) = cursor.next()? {
        let mut values = Vec::with_capacity(columns.len());
        for idx in 0..columns.len() {
            values.push(format_value(row.get_ref(idx)?));
        }
        rows.push(values);
    }

    Ok(StatementOutput::Rows { columns, rows })
}

fn format_value(value: ValueRef<'_>) -> String {
    match value {
        ValueRef::Null => "NULL".to_string(),
        ValueRef::Integer(i) => i.to_string(),
        ValueRef::Real(f) => f.to_string(),
        ValueRef::Text(t) => String::from_utf8_lossy(t).into_owned(),
        ValueRef::Blob(b) => format!("<{} bytes>", b.len()),
    }
}

fn print_output<W: Write>(out: &mut W, output: &StatementOutput) -> Result<()> {
    match output {
        StatementOutput::Rows { columns, rows } => {
            writeln!(out, "{}", columns.join(" | "))?;
            for row in rows {
                writeln!(out, "{}", row.join(" | "))?;
            }
            writeln!(out, "({} rows)", rows.len())?;
        }
        StatementOutput::Affected(n) => writeln!(out, "OK, {} row(s) affected", n)?,
    }
    Ok(())
}

/// Read-eval-print loop over `input`, writing results to `out`.
pub fn run_console<R: BufRead, W: Write>(
    conn: &Connection,
    mut input: R,
    out: &mut W,
) -> Result<ConsoleSummary> {
    let mut summary = ConsoleSummary::default();
    let mut line = String::new();

    loop {
        write!(out, "{}", PROMPT)?;
        out.flush()?;

        line.clear();
        if input.read_line(&mut line)? == 0 {
            writeln!(out)?;
            break;
        }

        let sql = line.trim();
        if sql.is_empty() {
            continue;
        }
        if is_exit_command(sql) {
            break;
        }

        match execute_statement(conn, sql) {
            Ok(output) => {
                summary.executed += 1;
                print_output(out, &output)?;
            }
            Err(e) => {
                summary.failed += 1;
                writeln!(out, "Error: {}", e)?;
            }
        }
    }

    Ok(summary)
}

/// Run a console session inside a transaction on `store`.
///
/// On success the transaction is left open for the caller to commit or roll
/// back. If the session itself fails (input or output error), the
/// transaction is rolled back before the error is returned.
pub fn run_session<R: BufRead, W: Write>(
    store: &EncryptedStore,
    input: R,
    out: &mut W,
) -> Result<ConsoleSummary> {
    store.begin()?;
    match run_console(store.connection(), input, out) {
        Ok(summary) => Ok(summary),
        Err(e) => {
            store.rollback()?;
            Err(e.context("Console session aborted, changes discarded"))
        }
    }
}
