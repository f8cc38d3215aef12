//! Embedded SQLite initialization with named, ledger-tracked migrations.
//!
//! The crate resolves where a named database lives on disk, opens or creates
//! it, and applies the caller's pending migrations in name-lexical order
//! before handing back an exclusively owned [`DatabaseHandle`].

pub mod db;
pub mod init;
pub mod logging;
pub mod paths;

pub use db::layer::{CamelCaseLayer, CasingOptions, ConnectionLayer};
pub use db::ledger::{LedgerEntry, MigrationLedger, MIGRATION_TABLE};
pub use db::migrations::{
    run_migrations, Migration, MigrationError, MigrationResult, StepError, StepFn,
};
pub use db::{open_connection, EngineOptions, OpenError, OpenResult};
pub use init::{initialize, DatabaseHandle, InitError, InitOptions, InitResult};
pub use logging::{default_log_level, init_logging, logging_status};
pub use paths::{resolve_db_location, DbLocation, PathError, PathResult};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::core_version;

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
