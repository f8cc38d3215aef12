//! SQLite bootstrap, connection layers, and named schema migrations.
//!
//! # Responsibility
//! - Open and configure connections for resolved database locations.
//! - Track applied migrations in the ledger and apply pending ones.
//!
//! # Invariants
//! - The migration ledger exists before any caller migration runs.
//! - Connections returned to callers have every pending migration applied or
//!   the failure reported; there is no silent middle ground.

pub mod layer;
pub mod ledger;
pub mod migrations;
mod open;

pub use open::{open_connection, EngineOptions, OpenError, OpenResult};
