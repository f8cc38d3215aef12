//! Database initialization facade.
//!
//! # Responsibility
//! - Compose path resolution, connection open, and migration application
//!   into one operation.
//! - Hand the caller an exclusively owned connection handle.
//!
//! # Invariants
//! - Stage failures propagate unchanged; no stage is retried.
//! - The handle's connection is never closed internally.

use crate::db::layer::{effective_layers, CasingOptions, ConnectionLayer};
use crate::db::ledger::{LedgerEntry, MigrationLedger};
use crate::db::migrations::{run_migrations, Migration, MigrationError};
use crate::db::{open_connection, EngineOptions, OpenError};
use crate::paths::{resolve_db_location, DbLocation, PathError};
use log::{error, info};
use rusqlite::Connection;
use std::error::Error;
use std::fmt::{Debug, Display, Formatter};
use std::path::{Path, PathBuf};
use std::time::Instant;

pub type InitResult<T> = Result<T, InitError>;

/// Initialization failures, one variant per stage.
#[derive(Debug)]
pub enum InitError {
    Path(PathError),
    Open(OpenError),
    Migration(MigrationError),
}

impl Display for InitError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Path(err) => write!(f, "{err}"),
            Self::Open(err) => write!(f, "{err}"),
            Self::Migration(err) => write!(f, "{err}"),
        }
    }
}

impl Error for InitError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Path(err) => Some(err),
            Self::Open(err) => Some(err),
            Self::Migration(err) => Some(err),
        }
    }
}

impl From<PathError> for InitError {
    fn from(value: PathError) -> Self {
        Self::Path(value)
    }
}

impl From<OpenError> for InitError {
    fn from(value: OpenError) -> Self {
        Self::Open(value)
    }
}

impl From<MigrationError> for InitError {
    fn from(value: MigrationError) -> Self {
        Self::Migration(value)
    }
}

/// Configuration for [`initialize`].
///
/// Only the two names are required; every other field has a documented
/// default and can be set directly after [`InitOptions::new`].
pub struct InitOptions {
    /// Application identity used to derive the OS data directory.
    pub application_name: String,
    /// Database file name; the `.sqlite` suffix is optional.
    pub database_name: String,
    /// Complete explicit database file path; disables name-based resolution
    /// and is never combined with `database_name`.
    pub path: Option<PathBuf>,
    /// Migrations bringing the schema up to date. May be empty.
    pub migrations: Vec<Migration>,
    /// Engine open options.
    pub engine: EngineOptions,
    /// Options for the canonical casing layer.
    pub casing: CasingOptions,
    /// Caller connection layers. Casing layers in here are dropped in favor
    /// of the canonical one.
    pub layers: Vec<Box<dyn ConnectionLayer>>,
}

impl InitOptions {
    pub fn new(application_name: impl Into<String>, database_name: impl Into<String>) -> Self {
        Self {
            application_name: application_name.into(),
            database_name: database_name.into(),
            path: None,
            migrations: Vec::new(),
            engine: EngineOptions::default(),
            casing: CasingOptions::default(),
            layers: Vec::new(),
        }
    }
}

impl Debug for InitOptions {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InitOptions")
            .field("application_name", &self.application_name)
            .field("database_name", &self.database_name)
            .field("path", &self.path)
            .field("migrations", &self.migrations)
            .field("engine", &self.engine)
            .field("casing", &self.casing)
            .field("layers", &self.layers.len())
            .finish()
    }
}

/// Open database session returned by [`initialize`].
///
/// The caller owns it exclusively; the core never closes or replaces the
/// connection behind the caller's back.
pub struct DatabaseHandle {
    conn: Connection,
    location: DbLocation,
    layers: Vec<Box<dyn ConnectionLayer>>,
}

impl DatabaseHandle {
    /// Borrows the live connection.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Mutably borrows the live connection; transactions need this.
    pub fn connection_mut(&mut self) -> &mut Connection {
        &mut self.conn
    }

    /// Path of the open database file.
    pub fn file_path(&self) -> &Path {
        &self.location.file_path
    }

    /// Resolved location backing this handle.
    pub fn location(&self) -> &DbLocation {
        &self.location
    }

    /// Names of the installed layers, in install order.
    pub fn layer_names(&self) -> Vec<&'static str> {
        self.layers.iter().map(|layer| layer.name()).collect()
    }

    /// Reads the migration audit history, name-ascending.
    pub fn applied_migrations(&self) -> rusqlite::Result<Vec<LedgerEntry>> {
        MigrationLedger::new(&self.conn).entries()
    }

    /// Closes the connection explicitly.
    pub fn close(self) -> Result<(), rusqlite::Error> {
        self.conn.close().map_err(|(_conn, err)| err)
    }
}

impl Debug for DatabaseHandle {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseHandle")
            .field("file_path", &self.location.file_path)
            .field("layers", &self.layer_names())
            .finish()
    }
}

/// Opens (creating if needed) the database and applies pending migrations.
///
/// # Contract
/// - Stages run resolve -> open -> migrate; the first failure aborts the
///   rest and surfaces unchanged in the matching [`InitError`] variant.
/// - The returned handle stays open until the caller drops or closes it.
///
/// # Side effects
/// - May create the data directory and the database file.
/// - Emits `db_init` logging events with duration and status.
pub fn initialize(options: InitOptions) -> InitResult<DatabaseHandle> {
    let started_at = Instant::now();
    info!(
        "event=db_init module=init status=start app={} db={} migrations={}",
        options.application_name,
        options.database_name,
        options.migrations.len()
    );

    match initialize_stages(options) {
        Ok((handle, applied)) => {
            info!(
                "event=db_init module=init status=ok applied={} duration_ms={}",
                applied,
                started_at.elapsed().as_millis()
            );
            Ok(handle)
        }
        Err(err) => {
            error!(
                "event=db_init module=init status=error duration_ms={} error={}",
                started_at.elapsed().as_millis(),
                err
            );
            Err(err)
        }
    }
}

fn initialize_stages(options: InitOptions) -> InitResult<(DatabaseHandle, usize)> {
    let location = resolve_db_location(
        &options.application_name,
        &options.database_name,
        options.path.as_deref(),
    )?;

    let layers = effective_layers(options.layers, options.casing);
    let mut conn = open_connection(&location, &options.engine, &layers)?;
    let applied = run_migrations(&mut conn, &options.migrations)?;

    let handle = DatabaseHandle {
        conn,
        location,
        layers,
    };
    Ok((handle, applied.len()))
}
