//! Schema introspection and bindings rendering.
//!
//! # Responsibility
//! - Read the finished schema of an initialized database.
//! - Map declared column types to Rust types by SQLite affinity.
//! - Render one plain struct per table and write the bindings file.
//!
//! # Invariants
//! - The migration ledger table never appears in generated output.
//! - Generated field names are valid Rust identifiers; the storage column
//!   name is noted wherever sanitization changed it.

use burrow_core::{initialize, CamelCaseLayer, InitError, InitOptions, MIGRATION_TABLE};
use log::info;
use once_cell::sync::Lazy;
use regex::Regex;
use rusqlite::Connection;
use std::error::Error;
use std::fmt::{Display, Formatter, Write as _};
use std::io;
use std::path::PathBuf;
use std::time::Instant;

static IDENT_SANITIZE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^A-Za-z0-9_]").expect("valid identifier regex"));

/// What to generate bindings for.
#[derive(Debug, Clone)]
pub struct CodegenRequest {
    pub application_name: String,
    pub database_name: String,
    pub out_file: PathBuf,
    /// Explicit database file path forwarded to initialization.
    pub path: Option<PathBuf>,
}

/// What a successful run produced.
#[derive(Debug, Clone)]
pub struct CodegenSummary {
    pub table_count: usize,
    pub out_file: PathBuf,
}

/// Codegen failures.
#[derive(Debug)]
pub enum CodegenError {
    /// The database could not be initialized.
    Init(InitError),
    /// Schema introspection queries failed.
    Introspect(rusqlite::Error),
    /// The bindings file could not be written.
    Write { path: PathBuf, source: io::Error },
}

impl Display for CodegenError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Init(err) => write!(f, "database initialization failed: {err}"),
            Self::Introspect(err) => write!(f, "schema introspection failed: {err}"),
            Self::Write { path, source } => {
                write!(f, "cannot write bindings to `{}`: {source}", path.display())
            }
        }
    }
}

impl Error for CodegenError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Init(err) => Some(err),
            Self::Introspect(err) => Some(err),
            Self::Write { source, .. } => Some(source),
        }
    }
}

impl From<InitError> for CodegenError {
    fn from(value: InitError) -> Self {
        Self::Init(value)
    }
}

impl From<rusqlite::Error> for CodegenError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Introspect(value)
    }
}

/// One caller-visible table.
#[derive(Debug, Clone)]
struct TableInfo {
    name: String,
    columns: Vec<ColumnInfo>,
}

/// One column as reported by `pragma_table_info`.
#[derive(Debug, Clone)]
struct ColumnInfo {
    name: String,
    declared_type: String,
    not_null: bool,
    primary_key: bool,
}

/// Generates the bindings file for one database.
///
/// The database is opened through the normal initialization path with an
/// empty migration list, so introspection sees exactly the schema already
/// applied; codegen never runs migrations of its own.
pub fn run(request: &CodegenRequest) -> Result<CodegenSummary, CodegenError> {
    let started_at = Instant::now();

    let mut options = InitOptions::new(
        request.application_name.clone(),
        request.database_name.clone(),
    );
    options.path = request.path.clone();
    let handle = initialize(options)?;

    let tables = read_schema(handle.connection())?;
    let rendered = render_bindings(&tables);

    std::fs::write(&request.out_file, rendered).map_err(|source| CodegenError::Write {
        path: request.out_file.clone(),
        source,
    })?;

    info!(
        "event=codegen module=codegen status=ok tables={} out_file={} duration_ms={}",
        tables.len(),
        request.out_file.display(),
        started_at.elapsed().as_millis()
    );
    Ok(CodegenSummary {
        table_count: tables.len(),
        out_file: request.out_file.clone(),
    })
}

/// Reads every caller table and its columns, name-ascending.
fn read_schema(conn: &Connection) -> Result<Vec<TableInfo>, CodegenError> {
    let mut stmt = conn.prepare(
        "SELECT name FROM sqlite_master
         WHERE type = 'table' AND name NOT LIKE 'sqlite_%' AND name <> ?1
         ORDER BY name ASC;",
    )?;
    let mut rows = stmt.query([MIGRATION_TABLE])?;
    let mut names: Vec<String> = Vec::new();
    while let Some(row) = rows.next()? {
        names.push(row.get(0)?);
    }

    let mut tables = Vec::with_capacity(names.len());
    for name in names {
        let columns = read_columns(conn, &name)?;
        tables.push(TableInfo { name, columns });
    }
    Ok(tables)
}

fn read_columns(conn: &Connection, table: &str) -> Result<Vec<ColumnInfo>, CodegenError> {
    let mut stmt = conn.prepare(
        "SELECT name, type, \"notnull\", pk FROM pragma_table_info(?1) ORDER BY cid ASC;",
    )?;
    let mut rows = stmt.query([table])?;
    let mut columns = Vec::new();
    while let Some(row) = rows.next()? {
        columns.push(ColumnInfo {
            name: row.get(0)?,
            declared_type: row.get(1)?,
            not_null: row.get::<_, i64>(2)? != 0,
            primary_key: row.get::<_, i64>(3)? != 0,
        });
    }
    Ok(columns)
}

fn render_bindings(tables: &[TableInfo]) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "// Generated by burrow-codegen v{}. Do not edit by hand;",
        burrow_core::core_version()
    );
    let _ = writeln!(
        out,
        "// the migration list that produced this schema is the source of truth."
    );

    for table in tables {
        let _ = writeln!(out);
        let _ = writeln!(out, "/// Row of the `{}` table.", table.name);
        let _ = writeln!(out, "#[derive(Debug, Clone)]");
        let _ = writeln!(out, "pub struct {} {{", struct_ident(&table.name));
        for column in &table.columns {
            let field = field_ident(&column.name);
            if field != column.name {
                let _ = writeln!(out, "    // storage column: {}", column.name);
            }
            let _ = writeln!(out, "    pub {}: {},", field, field_type(column));
        }
        let _ = writeln!(out, "}}");
    }
    out
}

/// Rust type for one column, by SQLite type affinity.
fn field_type(column: &ColumnInfo) -> String {
    let base = affinity_type(&column.declared_type);
    // An INTEGER PRIMARY KEY is a rowid alias and can never hold NULL.
    let rowid_alias = column.primary_key && base == "i64";
    if column.not_null || rowid_alias {
        base.to_string()
    } else {
        format!("Option<{base}>")
    }
}

/// Applies SQLite's declared-type affinity rules, in rule order.
fn affinity_type(declared: &str) -> &'static str {
    let upper = declared.trim().to_ascii_uppercase();
    if upper.contains("INT") {
        "i64"
    } else if upper.contains("CHAR") || upper.contains("CLOB") || upper.contains("TEXT") {
        "String"
    } else if upper.is_empty() || upper.contains("BLOB") {
        "Vec<u8>"
    } else if upper.contains("REAL") || upper.contains("FLOA") || upper.contains("DOUB") {
        "f64"
    } else {
        "f64"
    }
}

/// PascalCase struct name for a storage-side table name.
fn struct_ident(table_name: &str) -> String {
    let camel = CamelCaseLayer::default().app_ident(&field_ident(table_name));
    let mut chars = camel.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => camel,
    }
}

/// Valid Rust field identifier for a storage column name.
fn field_ident(column_name: &str) -> String {
    let sanitized = IDENT_SANITIZE_RE.replace_all(column_name, "_").into_owned();
    if sanitized.chars().next().is_some_and(|ch| ch.is_ascii_digit()) {
        format!("_{sanitized}")
    } else {
        sanitized
    }
}
