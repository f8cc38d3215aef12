//! Connection bootstrap for resolved database locations.
//!
//! # Responsibility
//! - Create the database's data directory when missing.
//! - Open the file with caller engine options and configure pragmas.
//! - Install the effective connection-layer list.
//!
//! # Invariants
//! - Engine open failures surface verbatim with their native code.
//! - Returned connections have every requested layer installed.

use crate::db::layer::ConnectionLayer;
use crate::paths::DbLocation;
use log::{debug, error, info};
use rusqlite::{Connection, OpenFlags};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::io;
use std::path::PathBuf;
use std::time::{Duration, Instant};

/// Engine-level open options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineOptions {
    /// Open without write access.
    pub read_only: bool,
    /// Create the database file when absent.
    pub create_if_missing: bool,
    /// Lock wait budget before the engine reports `SQLITE_BUSY`.
    pub busy_timeout: Duration,
    /// Enforce foreign keys on this connection.
    pub foreign_keys: bool,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            read_only: false,
            create_if_missing: true,
            busy_timeout: Duration::from_secs(5),
            foreign_keys: true,
        }
    }
}

pub type OpenResult<T> = Result<T, OpenError>;

/// Connection open failures.
#[derive(Debug)]
pub enum OpenError {
    /// The data directory could not be created.
    CreateDir { dir: PathBuf, source: io::Error },
    /// The engine refused to open the file; carries the native error code.
    Engine(rusqlite::Error),
    /// A connection layer failed to install.
    Layer {
        layer: &'static str,
        source: rusqlite::Error,
    },
}

impl Display for OpenError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CreateDir { dir, source } => write!(
                f,
                "cannot create database directory `{}`: {source}",
                dir.display()
            ),
            Self::Engine(err) => write!(f, "{err}"),
            Self::Layer { layer, source } => {
                write!(f, "connection layer `{layer}` failed to install: {source}")
            }
        }
    }
}

impl Error for OpenError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::CreateDir { source, .. } => Some(source),
            Self::Engine(err) => Some(err),
            Self::Layer { source, .. } => Some(source),
        }
    }
}

impl From<rusqlite::Error> for OpenError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Engine(value)
    }
}

/// Opens the database file at a resolved location.
///
/// # Side effects
/// - Creates `location.data_dir` recursively when missing.
/// - Emits `db_open` logging events with duration and status.
///
/// # Errors
/// - [`OpenError::CreateDir`] when the data directory cannot be created.
/// - [`OpenError::Engine`] verbatim engine refusal, e.g. `SQLITE_CANTOPEN`
///   when the file path names an existing directory.
/// - [`OpenError::Layer`] when a connection layer fails to install.
pub fn open_connection(
    location: &DbLocation,
    engine: &EngineOptions,
    layers: &[Box<dyn ConnectionLayer>],
) -> OpenResult<Connection> {
    let started_at = Instant::now();
    info!(
        "event=db_open module=db status=start read_only={} create_if_missing={}",
        engine.read_only, engine.create_if_missing
    );

    if let Err(err) = std::fs::create_dir_all(&location.data_dir) {
        error!(
            "event=db_open module=db status=error duration_ms={} error_code=create_dir_failed error={}",
            started_at.elapsed().as_millis(),
            err
        );
        return Err(OpenError::CreateDir {
            dir: location.data_dir.clone(),
            source: err,
        });
    }

    let conn = match Connection::open_with_flags(&location.file_path, open_flags(engine)) {
        Ok(conn) => conn,
        Err(err) => {
            error!(
                "event=db_open module=db status=error duration_ms={} error_code=db_open_failed error={}",
                started_at.elapsed().as_millis(),
                err
            );
            return Err(OpenError::Engine(err));
        }
    };

    match bootstrap_connection(&conn, engine, layers) {
        Ok(()) => {
            info!(
                "event=db_open module=db status=ok layers={} duration_ms={}",
                layers.len(),
                started_at.elapsed().as_millis()
            );
            Ok(conn)
        }
        Err(err) => {
            error!(
                "event=db_open module=db status=error duration_ms={} error_code=db_bootstrap_failed error={}",
                started_at.elapsed().as_millis(),
                err
            );
            Err(err)
        }
    }
}

fn open_flags(engine: &EngineOptions) -> OpenFlags {
    let mut flags = OpenFlags::SQLITE_OPEN_URI | OpenFlags::SQLITE_OPEN_NO_MUTEX;
    if engine.read_only {
        flags |= OpenFlags::SQLITE_OPEN_READ_ONLY;
    } else {
        flags |= OpenFlags::SQLITE_OPEN_READ_WRITE;
        if engine.create_if_missing {
            flags |= OpenFlags::SQLITE_OPEN_CREATE;
        }
    }
    flags
}

fn bootstrap_connection(
    conn: &Connection,
    engine: &EngineOptions,
    layers: &[Box<dyn ConnectionLayer>],
) -> OpenResult<()> {
    if engine.foreign_keys {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    }
    conn.busy_timeout(engine.busy_timeout)?;

    for layer in layers {
        layer.install(conn).map_err(|err| OpenError::Layer {
            layer: layer.name(),
            source: err,
        })?;
        debug!(
            "event=layer_install module=db layer={} status=ok",
            layer.name()
        );
    }

    Ok(())
}
