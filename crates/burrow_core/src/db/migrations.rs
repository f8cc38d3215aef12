//! Named schema migrations and the apply loop.
//!
//! # Responsibility
//! - Model caller-defined migrations with forward and reverse steps.
//! - Apply the pending subset in name-lexical order, one transaction each.
//!
//! # Invariants
//! - A migration's body and its ledger row commit atomically or not at all.
//! - Application order is a pure function of migration names, never of the
//!   caller's list order.
//! - The first failure ends the run; later pending migrations are untouched.

use crate::db::ledger::MigrationLedger;
use log::{error, info};
use rusqlite::{Connection, Transaction, TransactionBehavior};
use std::collections::BTreeSet;
use std::error::Error;
use std::fmt::{Debug, Display, Formatter};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

/// Boxed migration step body. Steps see the enclosing transaction only and
/// must not commit or roll back themselves.
pub type StepFn = Box<dyn Fn(&Transaction<'_>) -> Result<(), StepError> + Send + Sync>;

/// One named unit of schema or data change.
///
/// The name is the identity: it keys the ledger row and defines application
/// order under lexical sort. A zero-padded sequence prefix (`0001_users`)
/// keeps that order intentional.
pub struct Migration {
    name: String,
    up: StepFn,
    down: Option<StepFn>,
}

impl Migration {
    /// Creates a migration with a forward step only.
    pub fn new<F>(name: impl Into<String>, up: F) -> Self
    where
        F: Fn(&Transaction<'_>) -> Result<(), StepError> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            up: Box::new(up),
            down: None,
        }
    }

    /// Attaches a reverse step. Kept for external tooling; the core never
    /// runs it.
    pub fn with_down<F>(mut self, down: F) -> Self
    where
        F: Fn(&Transaction<'_>) -> Result<(), StepError> + Send + Sync + 'static,
    {
        self.down = Some(Box::new(down));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// True when a reverse step was provided.
    pub fn has_down(&self) -> bool {
        self.down.is_some()
    }

    fn run_up(&self, tx: &Transaction<'_>) -> Result<(), StepError> {
        (self.up)(tx)
    }
}

impl Debug for Migration {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Migration")
            .field("name", &self.name)
            .field("has_down", &self.down.is_some())
            .finish()
    }
}

/// Failure raised by a migration step body.
#[derive(Debug)]
pub enum StepError {
    /// Engine-level failure from the step's SQL.
    Sqlite(rusqlite::Error),
    /// Non-engine failure described by the step itself.
    Failed(String),
}

impl StepError {
    /// Builds a non-engine step failure.
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

impl Display for StepError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqlite(err) => write!(f, "{err}"),
            Self::Failed(message) => write!(f, "{message}"),
        }
    }
}

impl Error for StepError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Sqlite(err) => Some(err),
            Self::Failed(_) => None,
        }
    }
}

impl From<rusqlite::Error> for StepError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}

pub type MigrationResult<T> = Result<T, MigrationError>;

/// Migration run failures.
#[derive(Debug)]
pub enum MigrationError {
    /// Two list entries share one name; nothing was applied.
    DuplicateName(String),
    /// The tracking table could not be created or read.
    Ledger(rusqlite::Error),
    /// A specific migration's body, ledger row, or commit failed.
    Step { name: String, source: StepError },
}

impl MigrationError {
    /// Name of the offending migration, when one is known.
    pub fn failed_name(&self) -> Option<&str> {
        match self {
            Self::DuplicateName(name) => Some(name),
            Self::Ledger(_) => None,
            Self::Step { name, .. } => Some(name),
        }
    }
}

impl Display for MigrationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DuplicateName(name) => {
                write!(f, "migration name appears twice in the list: {name}")
            }
            Self::Ledger(err) => write!(f, "migration ledger is unavailable: {err}"),
            Self::Step { name, source } => write!(f, "migration {name} failed: {source}"),
        }
    }
}

impl Error for MigrationError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::DuplicateName(_) => None,
            Self::Ledger(err) => Some(err),
            Self::Step { source, .. } => Some(source),
        }
    }
}

/// Applies every pending migration on the connection.
///
/// # Contract
/// - Pending = names absent from the ledger, applied in name-lexical order
///   regardless of list order.
/// - Each migration runs in its own IMMEDIATE transaction together with its
///   ledger row.
/// - Returns the names applied by this call, in commit order. A list fully
///   contained in the ledger is a no-op.
///
/// # Errors
/// - [`MigrationError::DuplicateName`] before anything runs.
/// - [`MigrationError::Ledger`] when the tracking table cannot be prepared
///   or read.
/// - [`MigrationError::Step`] for the first failing migration; earlier
///   commits stay recorded, later pending migrations are not attempted, and
///   nothing is retried.
pub fn run_migrations(
    conn: &mut Connection,
    migrations: &[Migration],
) -> MigrationResult<Vec<String>> {
    let started_at = Instant::now();
    info!(
        "event=migration_run module=migrations status=start total={}",
        migrations.len()
    );

    let pending = pending_in_order(conn, migrations)?;
    let pending_count = pending.len();

    let mut applied = Vec::with_capacity(pending_count);
    for migration in pending {
        if let Err(err) = apply_one(conn, migration) {
            error!(
                "event=migration_run module=migrations status=error failed={} applied={} duration_ms={} error={}",
                migration.name(),
                applied.len(),
                started_at.elapsed().as_millis(),
                err
            );
            return Err(err);
        }
        applied.push(migration.name().to_string());
    }

    info!(
        "event=migration_run module=migrations status=ok total={} pending={} applied={} duration_ms={}",
        migrations.len(),
        pending_count,
        applied.len(),
        started_at.elapsed().as_millis()
    );
    Ok(applied)
}

/// Computes the pending subset in application order.
fn pending_in_order<'m>(
    conn: &Connection,
    migrations: &'m [Migration],
) -> MigrationResult<Vec<&'m Migration>> {
    let ledger = MigrationLedger::new(conn);
    ledger.ensure_table().map_err(MigrationError::Ledger)?;
    let applied = ledger.applied_names().map_err(MigrationError::Ledger)?;

    let mut seen = BTreeSet::new();
    for migration in migrations {
        if !seen.insert(migration.name()) {
            return Err(MigrationError::DuplicateName(migration.name().to_string()));
        }
    }

    let mut pending: Vec<&Migration> = migrations
        .iter()
        .filter(|migration| !applied.contains(migration.name()))
        .collect();
    pending.sort_by(|a, b| a.name().cmp(b.name()));

    Ok(pending)
}

/// Runs one migration and its ledger row inside a single transaction.
fn apply_one(conn: &mut Connection, migration: &Migration) -> MigrationResult<()> {
    let started_at = Instant::now();

    let tx = conn
        .transaction_with_behavior(TransactionBehavior::Immediate)
        .map_err(|err| step_failure(migration, err.into()))?;

    migration
        .run_up(&tx)
        .map_err(|err| step_failure(migration, err))?;
    MigrationLedger::new(&tx)
        .record_applied(migration.name(), now_epoch_ms())
        .map_err(|err| step_failure(migration, err.into()))?;
    tx.commit()
        .map_err(|err| step_failure(migration, err.into()))?;

    info!(
        "event=migration_apply module=migrations name={} status=ok duration_ms={}",
        migration.name(),
        started_at.elapsed().as_millis()
    );
    Ok(())
}

fn step_failure(migration: &Migration, source: StepError) -> MigrationError {
    MigrationError::Step {
        name: migration.name().to_string(),
        source,
    }
}

fn now_epoch_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.as_millis() as i64)
}

#[cfg(test)]
mod tests {
    use super::{run_migrations, Migration, MigrationError, StepError};
    use rusqlite::Connection;

    #[test]
    fn rejects_duplicate_names_without_applying_anything() {
        let mut conn = Connection::open_in_memory().unwrap();
        let migrations = vec![noop_migration("0001_seed"), noop_migration("0001_seed")];

        let err = run_migrations(&mut conn, &migrations).unwrap_err();
        assert!(matches!(err, MigrationError::DuplicateName(name) if name == "0001_seed"));

        let seeded: i64 = conn
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE name = 'seed');",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(seeded, 0);
    }

    #[test]
    fn returns_applied_names_in_commit_order() {
        let mut conn = Connection::open_in_memory().unwrap();
        let migrations = vec![noop_migration("0002_b"), noop_migration("0001_a")];

        let applied = run_migrations(&mut conn, &migrations).unwrap();
        assert_eq!(applied, vec!["0001_a".to_string(), "0002_b".to_string()]);

        let again = run_migrations(&mut conn, &migrations).unwrap();
        assert!(again.is_empty());
    }

    #[test]
    fn migration_debug_shows_name_not_closures() {
        let migration = noop_migration("0001_seed").with_down(|_tx| Ok(()));
        let rendered = format!("{migration:?}");
        assert!(rendered.contains("0001_seed"));
        assert!(rendered.contains("has_down: true"));
        assert!(migration.has_down());
    }

    #[test]
    fn step_error_display_keeps_custom_message() {
        let err = StepError::failed("backfill rejected");
        assert_eq!(err.to_string(), "backfill rejected");
    }

    fn noop_migration(name: &str) -> Migration {
        Migration::new(name, |tx| {
            tx.execute_batch("CREATE TABLE IF NOT EXISTS seed (id INTEGER PRIMARY KEY);")?;
            Ok(())
        })
    }
}
