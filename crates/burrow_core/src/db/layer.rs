//! Connection layers and identifier-casing translation.
//!
//! # Responsibility
//! - Define the layer seam applied to every freshly opened connection.
//! - Guarantee exactly one casing-translation layer per connection.
//!
//! # Invariants
//! - [`effective_layers`] output ends with exactly one layer whose
//!   `is_casing_layer()` is true; caller-supplied casing layers are dropped.
//! - Casing translation is pure and deterministic.

use log::debug;
use rusqlite::functions::{Context, FunctionFlags};
use rusqlite::Connection;

/// Hook applied to a live connection at open time.
///
/// Layers may set pragmas, register collations, or register SQL functions.
/// They run in install order, caller layers first.
pub trait ConnectionLayer: Send + Sync {
    /// Stable layer id used in logs.
    fn name(&self) -> &'static str;

    /// Capability tag; at most one casing layer survives layer selection.
    fn is_casing_layer(&self) -> bool {
        false
    }

    /// Applies the layer to the connection.
    fn install(&self, conn: &Connection) -> rusqlite::Result<()>;
}

/// Options for the canonical casing layer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CasingOptions {
    /// Separate digit groups when deriving storage names
    /// (`v2Meta` -> `v_2_meta` instead of `v2_meta`).
    pub underscore_before_digits: bool,
}

/// Canonical camelCase/snake_case translation layer.
///
/// Application-side identifiers are camelCase, storage-side identifiers are
/// snake_case. Installing the layer registers the deterministic scalar SQL
/// functions `app_ident(text)` and `storage_ident(text)` so the mapping is
/// also available inside queries.
#[derive(Debug, Clone, Copy, Default)]
pub struct CamelCaseLayer {
    options: CasingOptions,
}

impl CamelCaseLayer {
    pub fn new(options: CasingOptions) -> Self {
        Self { options }
    }

    /// Maps a storage-side identifier to its application-side spelling.
    pub fn app_ident(&self, storage_ident: &str) -> String {
        to_app_ident(storage_ident)
    }

    /// Maps an application-side identifier to its storage-side spelling.
    pub fn storage_ident(&self, app_ident: &str) -> String {
        to_storage_ident(app_ident, self.options)
    }
}

impl ConnectionLayer for CamelCaseLayer {
    fn name(&self) -> &'static str {
        "camel_case"
    }

    fn is_casing_layer(&self) -> bool {
        true
    }

    fn install(&self, conn: &Connection) -> rusqlite::Result<()> {
        let flags = FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC;
        let options = self.options;

        conn.create_scalar_function("app_ident", 1, flags, |ctx: &Context<'_>| {
            let value: String = ctx.get(0)?;
            Ok(to_app_ident(&value))
        })?;
        conn.create_scalar_function("storage_ident", 1, flags, move |ctx: &Context<'_>| {
            let value: String = ctx.get(0)?;
            Ok(to_storage_ident(&value, options))
        })?;
        Ok(())
    }
}

/// Selects the layers actually installed on a new connection.
///
/// Caller casing layers are filtered out by capability tag and the canonical
/// layer is appended last, so exactly one casing translation is ever active.
pub(crate) fn effective_layers(
    caller_layers: Vec<Box<dyn ConnectionLayer>>,
    casing: CasingOptions,
) -> Vec<Box<dyn ConnectionLayer>> {
    let mut layers: Vec<Box<dyn ConnectionLayer>> = Vec::with_capacity(caller_layers.len() + 1);
    for layer in caller_layers {
        if layer.is_casing_layer() {
            debug!(
                "event=layer_drop module=layer layer={} reason=duplicate_casing_layer",
                layer.name()
            );
            continue;
        }
        layers.push(layer);
    }
    layers.push(Box::new(CamelCaseLayer::new(casing)));
    layers
}

fn to_app_ident(storage_ident: &str) -> String {
    let mut out = String::with_capacity(storage_ident.len());
    let mut upper_next = false;
    for ch in storage_ident.chars() {
        if ch == '_' {
            upper_next = true;
            continue;
        }
        if upper_next {
            out.extend(ch.to_uppercase());
            upper_next = false;
        } else {
            out.push(ch);
        }
    }
    out
}

fn to_storage_ident(app_ident: &str, options: CasingOptions) -> String {
    let mut out = String::with_capacity(app_ident.len() + 4);
    let mut prev: Option<char> = None;
    for ch in app_ident.chars() {
        if ch.is_ascii_uppercase() {
            if prev.is_some_and(|p| p.is_ascii_lowercase() || p.is_ascii_digit()) {
                out.push('_');
            }
            out.push(ch.to_ascii_lowercase());
        } else if ch.is_ascii_digit()
            && options.underscore_before_digits
            && prev.is_some_and(|p| p.is_ascii_alphabetic())
        {
            out.push('_');
            out.push(ch);
        } else {
            out.push(ch);
        }
        prev = Some(ch);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::{effective_layers, CamelCaseLayer, CasingOptions, ConnectionLayer};
    use rusqlite::Connection;

    struct FakeCasingLayer;

    impl ConnectionLayer for FakeCasingLayer {
        fn name(&self) -> &'static str {
            "fake_casing"
        }

        fn is_casing_layer(&self) -> bool {
            true
        }

        fn install(&self, _conn: &Connection) -> rusqlite::Result<()> {
            Ok(())
        }
    }

    struct StrictLikeLayer;

    impl ConnectionLayer for StrictLikeLayer {
        fn name(&self) -> &'static str {
            "strict_like"
        }

        fn install(&self, conn: &Connection) -> rusqlite::Result<()> {
            conn.execute_batch("PRAGMA case_sensitive_like = ON;")
        }
    }

    #[test]
    fn keeps_exactly_one_casing_layer_in_last_position() {
        let caller_layers: Vec<Box<dyn ConnectionLayer>> = vec![
            Box::new(FakeCasingLayer),
            Box::new(StrictLikeLayer),
            Box::new(CamelCaseLayer::default()),
        ];

        let layers = effective_layers(caller_layers, CasingOptions::default());
        let names: Vec<&str> = layers.iter().map(|layer| layer.name()).collect();

        assert_eq!(names, vec!["strict_like", "camel_case"]);
        assert_eq!(
            layers
                .iter()
                .filter(|layer| layer.is_casing_layer())
                .count(),
            1
        );
    }

    #[test]
    fn appends_canonical_layer_when_caller_supplies_none() {
        let layers = effective_layers(Vec::new(), CasingOptions::default());
        assert_eq!(layers.len(), 1);
        assert!(layers[0].is_casing_layer());
    }

    #[test]
    fn translates_between_app_and_storage_identifiers() {
        let layer = CamelCaseLayer::default();

        assert_eq!(layer.app_ident("user_id"), "userId");
        assert_eq!(layer.app_ident("first_name"), "firstName");
        assert_eq!(layer.storage_ident("userId"), "user_id");
        assert_eq!(layer.storage_ident("alreadylower"), "alreadylower");
        assert_eq!(layer.app_ident(layer.storage_ident("userId").as_str()), "userId");
    }

    #[test]
    fn underscore_before_digits_changes_storage_spelling() {
        let plain = CamelCaseLayer::default();
        let spaced = CamelCaseLayer::new(CasingOptions {
            underscore_before_digits: true,
        });

        assert_eq!(plain.storage_ident("v2Meta"), "v2_meta");
        assert_eq!(spaced.storage_ident("v2Meta"), "v_2_meta");
    }

    #[test]
    fn install_registers_sql_translation_functions() {
        let conn = Connection::open_in_memory().unwrap();
        CamelCaseLayer::default().install(&conn).unwrap();

        let camel: String = conn
            .query_row("SELECT app_ident('applied_at_ms');", [], |row| row.get(0))
            .unwrap();
        assert_eq!(camel, "appliedAtMs");

        let snake: String = conn
            .query_row("SELECT storage_ident('appliedAtMs');", [], |row| row.get(0))
            .unwrap();
        assert_eq!(snake, "applied_at_ms");
    }
}
