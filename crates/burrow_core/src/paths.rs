//! Database file location resolution.
//!
//! # Responsibility
//! - Map an application/database name pair to an on-disk database path.
//! - Honor caller-supplied explicit paths verbatim.
//!
//! # Invariants
//! - Resolution performs no filesystem I/O.
//! - Derived file names carry exactly one `.sqlite` suffix.
//! - An explicit path is never combined with the database name.

use directories::ProjectDirs;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

/// Suffix enforced on derived database file names.
const DB_FILE_SUFFIX: &str = ".sqlite";

pub type PathResult<T> = Result<T, PathError>;

/// Location resolution errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathError {
    EmptyApplicationName,
    EmptyDatabaseName,
    DataDirUnavailable { application: String },
    NoParentDirectory { path: PathBuf },
}

impl Display for PathError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyApplicationName => write!(f, "application name must not be blank"),
            Self::EmptyDatabaseName => write!(f, "database name must not be blank"),
            Self::DataDirUnavailable { application } => write!(
                f,
                "no data directory is available for application `{application}`"
            ),
            Self::NoParentDirectory { path } => write!(
                f,
                "explicit database path `{}` has no parent directory",
                path.display()
            ),
        }
    }
}

impl Error for PathError {}

/// Resolved on-disk location for one database file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbLocation {
    /// Full path of the database file itself.
    pub file_path: PathBuf,
    /// Directory that must exist before the file can be opened.
    pub data_dir: PathBuf,
}

/// Resolves where a named database lives on disk.
///
/// # Contract
/// - `explicit_path` is taken verbatim as the file path and the database
///   name is never appended to it; its parent component becomes the data
///   directory (`.` for a bare file name).
/// - Without an explicit path, the file lives in the OS data directory for
///   `application_name`, named `database_name` normalized to exactly one
///   `.sqlite` suffix. Repeated resolution of the resolved name is stable.
///
/// # Errors
/// - Blank `application_name` or `database_name`.
/// - No per-user data directory in the current environment.
/// - An explicit path with no parent component (e.g. a bare root).
pub fn resolve_db_location(
    application_name: &str,
    database_name: &str,
    explicit_path: Option<&Path>,
) -> PathResult<DbLocation> {
    let application = application_name.trim();
    if application.is_empty() {
        return Err(PathError::EmptyApplicationName);
    }
    if database_name.trim().is_empty() {
        return Err(PathError::EmptyDatabaseName);
    }

    if let Some(path) = explicit_path {
        let data_dir = match path.parent() {
            Some(parent) if parent.as_os_str().is_empty() => PathBuf::from("."),
            Some(parent) => parent.to_path_buf(),
            None => {
                return Err(PathError::NoParentDirectory {
                    path: path.to_path_buf(),
                })
            }
        };
        return Ok(DbLocation {
            file_path: path.to_path_buf(),
            data_dir,
        });
    }

    let project_dirs = ProjectDirs::from("", "", application).ok_or_else(|| {
        PathError::DataDirUnavailable {
            application: application.to_string(),
        }
    })?;
    let data_dir = project_dirs.data_dir().to_path_buf();
    let file_path = data_dir.join(normalized_file_name(database_name.trim()));

    Ok(DbLocation {
        file_path,
        data_dir,
    })
}

/// Returns `name` carrying exactly one database file suffix.
fn normalized_file_name(name: &str) -> String {
    let stem = name.trim_end_matches(DB_FILE_SUFFIX);
    format!("{stem}{DB_FILE_SUFFIX}")
}
