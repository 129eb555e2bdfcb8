//! Backend for the quipu generator
//!
//! Consumes a finished, error-free [`Registry`](crate::model::Registry) and
//! deterministically emits the runner C source plus the manifest the host
//! build layer uses to wire up compilation. Iteration order is fixed to
//! first-seen group order and first-seen test order within a group, so
//! identical registry content always yields byte-identical output.
//!
//! ## Modules
//!
//! - `emitter` - indentation-aware C source buffer
//! - `runner` - runner source generation
//! - `manifest` - manifest JSON generation
//! - `project` - output directory writing (render first, write last)

pub mod emitter;
pub mod manifest;
pub mod project;
pub mod runner;

use thiserror::Error;

use crate::model::{Registry, Role, SymbolId};

pub use project::RunnerProject;

/// Errors that occur while emitting generated output
#[derive(Debug, Error)]
pub enum GenerateError {
    #[error("registry contains {0} unresolved error(s); refusing to generate")]
    UnresolvedErrors(usize),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("manifest serialization failed: {0}")]
    Json(#[from] serde_json::Error),
}

/// Every defining symbol referenced by any test or fixture, deduplicated,
/// in a fixed order: test symbols and their effective fixtures in registry
/// order, then group-level fixture slots, then remaining declared fixtures.
///
/// Shared by the extern block of the emitted runner and by the manifest,
/// which must list exactly one entry per distinct symbol.
pub(crate) fn referenced_symbols(registry: &Registry) -> Vec<SymbolId> {
    fn push(id: SymbolId, seen: &mut [bool], out: &mut Vec<SymbolId>) {
        if !seen[id] {
            seen[id] = true;
            out.push(id);
        }
    }

    let mut seen = vec![false; registry.symbols.len()];
    let mut out = Vec::new();

    for group in &registry.groups {
        for &tid in &group.tests {
            let test = &registry.tests[tid];
            push(test.symbol, &mut seen, &mut out);
            if let Some(id) = test.effective_setup {
                push(id, &mut seen, &mut out);
            }
            if let Some(id) = test.effective_teardown {
                push(id, &mut seen, &mut out);
            }
        }
    }
    for group in &registry.groups {
        for slot in [&group.setup, &group.teardown] {
            if let Some(fixture) = slot {
                if let Some(id) = registry.symbols.lookup(&fixture.name) {
                    push(id, &mut seen, &mut out);
                }
            }
        }
    }
    for (id, symbol) in registry.symbols.iter() {
        if symbol.role != Role::Unknown {
            push(id, &mut seen, &mut out);
        }
    }

    out
}
