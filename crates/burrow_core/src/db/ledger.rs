//! Durable record of applied migrations.
//!
//! # Responsibility
//! - Bootstrap the reserved migration tracking table.
//! - Read and append applied-migration rows.
//!
//! # Invariants
//! - `record_applied` must run inside the same transaction as the migration
//!   body it records.
//! - Ledger rows are append-only; the core never mutates or deletes them.

use rusqlite::{params, Connection, Row};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Reserved name of the migration tracking table. Stable across versions;
/// caller schemas must not use it.
pub const MIGRATION_TABLE: &str = "burrow_migration";

/// One successfully applied migration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Migration name; primary key and the ordering contract.
    pub name: String,
    /// Commit wall-clock time in Unix epoch milliseconds. Audit only; order
    /// is always derived from `name`.
    pub applied_at_ms: i64,
}

/// Ledger view over one live connection.
///
/// A [`rusqlite::Transaction`] derefs to [`Connection`], so a view built from
/// a transaction reads and writes inside that transaction.
pub struct MigrationLedger<'conn> {
    conn: &'conn Connection,
}

impl<'conn> MigrationLedger<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    /// Creates the tracking table when absent. Idempotent.
    pub fn ensure_table(&self) -> rusqlite::Result<()> {
        self.conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {MIGRATION_TABLE} (
                name TEXT PRIMARY KEY NOT NULL,
                applied_at_ms INTEGER NOT NULL
            );"
        ))
    }

    /// Returns all recorded migration names.
    pub fn applied_names(&self) -> rusqlite::Result<BTreeSet<String>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT name FROM {MIGRATION_TABLE};"))?;
        let mut rows = stmt.query([])?;
        let mut names = BTreeSet::new();

        while let Some(row) = rows.next()? {
            names.insert(row.get(0)?);
        }

        Ok(names)
    }

    /// Returns the full audit history, name-ascending.
    pub fn entries(&self) -> rusqlite::Result<Vec<LedgerEntry>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT name, applied_at_ms FROM {MIGRATION_TABLE} ORDER BY name ASC;"
        ))?;
        let mut rows = stmt.query([])?;
        let mut entries = Vec::new();

        while let Some(row) = rows.next()? {
            entries.push(parse_entry_row(row)?);
        }

        Ok(entries)
    }

    /// Appends one applied row.
    pub fn record_applied(&self, name: &str, applied_at_ms: i64) -> rusqlite::Result<()> {
        self.conn.execute(
            &format!("INSERT INTO {MIGRATION_TABLE} (name, applied_at_ms) VALUES (?1, ?2);"),
            params![name, applied_at_ms],
        )?;
        Ok(())
    }
}

fn parse_entry_row(row: &Row<'_>) -> rusqlite::Result<LedgerEntry> {
    Ok(LedgerEntry {
        name: row.get(0)?,
        applied_at_ms: row.get(1)?,
    })
}

#[cfg(test)]
mod tests {
    use super::MigrationLedger;
    use rusqlite::Connection;

    #[test]
    fn ensure_table_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        let ledger = MigrationLedger::new(&conn);

        ledger.ensure_table().unwrap();
        ledger.ensure_table().unwrap();

        assert!(ledger.applied_names().unwrap().is_empty());
    }

    #[test]
    fn records_and_reads_entries_in_name_order() {
        let conn = Connection::open_in_memory().unwrap();
        let ledger = MigrationLedger::new(&conn);
        ledger.ensure_table().unwrap();

        ledger.record_applied("0002_posts", 2_000).unwrap();
        ledger.record_applied("0001_users", 1_000).unwrap();

        let names = ledger.applied_names().unwrap();
        assert!(names.contains("0001_users"));
        assert!(names.contains("0002_posts"));

        let entries = ledger.entries().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].name, "0001_users");
        assert_eq!(entries[0].applied_at_ms, 1_000);
        assert_eq!(entries[1].name, "0002_posts");
    }

    #[test]
    fn duplicate_name_violates_primary_key() {
        let conn = Connection::open_in_memory().unwrap();
        let ledger = MigrationLedger::new(&conn);
        ledger.ensure_table().unwrap();

        ledger.record_applied("0001_users", 1_000).unwrap();
        let err = ledger.record_applied("0001_users", 2_000).unwrap_err();
        assert!(err.to_string().contains("UNIQUE"));
    }
}
