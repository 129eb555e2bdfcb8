//! Manifest generation
//!
//! The manifest is the machine-readable half of the output: a list of
//! (defining file, symbol, role) tuples the host build layer uses to
//! establish compile and link dependencies between the runner and the files
//! containing the referenced tests and fixtures.

use serde_json::{Value, json};

use crate::model::Registry;
use crate::version::QUIPU_VERSION;

use super::{GenerateError, referenced_symbols};

/// Generate the manifest for a finished registry.
///
/// Lists exactly one entry per distinct defining symbol referenced by any
/// test or fixture, in the same fixed order the runner's extern block uses.
pub fn generate_manifest(registry: &Registry, runner_file: &str) -> Result<Value, GenerateError> {
    if registry.has_errors() {
        return Err(GenerateError::UnresolvedErrors(registry.errors.len()));
    }

    let mut symbols = Vec::new();
    for id in referenced_symbols(registry) {
        let symbol = registry.symbols.get(id);
        let Some(decl) = &symbol.decl else { continue };
        symbols.push(json!({
            "file": decl.file,
            "symbol": symbol.name,
            "role": symbol.role.as_str(),
        }));
    }

    Ok(json!({
        "generator": "quipu",
        "version": QUIPU_VERSION,
        "runner": runner_file,
        "symbols": symbols,
    }))
}
