//! `burrow-codegen`: typed data-access bindings from a migrated database.
//!
//! # Responsibility
//! - Parse the codegen flag surface and report usage errors.
//! - Initialize the target database, introspect it, and write bindings.
//!
//! # Invariants
//! - The database is opened through the normal initialization path with an
//!   empty migration list; codegen never alters the schema.
//! - Any failure prints to stderr and exits with status 1.

use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;

mod codegen;

/// Generates typed Rust bindings for every table in a burrow database.
#[derive(Parser, Debug)]
#[command(name = "burrow-codegen", version, about)]
struct Cli {
    /// Database name; must match what the application passes at init time.
    #[arg(long = "databaseName")]
    database_name: String,

    /// Application name; must match what the application passes at init time.
    #[arg(long = "applicationName")]
    application_name: String,

    /// File the generated bindings are written to.
    #[arg(long = "outFile")]
    out_file: PathBuf,

    /// Explicit database file path, bypassing name-based resolution.
    #[arg(long = "path")]
    path: Option<PathBuf>,
}

fn main() -> ExitCode {
    init_stderr_logging();
    let cli = Cli::parse();

    match codegen::run(&codegen::CodegenRequest {
        application_name: cli.application_name,
        database_name: cli.database_name,
        out_file: cli.out_file,
        path: cli.path,
    }) {
        Ok(summary) => {
            println!(
                "generated bindings for {} table(s) to {}",
                summary.table_count,
                summary.out_file.display()
            );
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("generation failed: {err}");
            ExitCode::from(1)
        }
    }
}

/// Boots a stderr logger honoring `RUST_LOG`, quiet by default.
fn init_stderr_logging() {
    // A second init attempt in the same process is harmless; ignore it.
    let _ = flexi_logger::Logger::try_with_env_or_str("warn")
        .map(|logger| logger.log_to_stderr().start());
}
