//! Resolved test-topology model
//!
//! The [`Registry`] is the fully resolved output of the model builder:
//! groups in first-seen order, tests in first-seen order within their group,
//! a by-name symbol table, and every error collected along the way. Once
//! built it is immutable and owned by the runner generator.

pub mod builder;

pub use builder::ModelBuilder;

use std::collections::HashMap;

use crate::frontend::diagnostics::GenError;
use crate::frontend::scanner::ReturnKind;

pub use crate::frontend::directive::DEFAULT_TIMEOUT_SECS;

pub type SymbolId = usize;
pub type GroupId = usize;
pub type TestId = usize;

// ============================================================================
// SYMBOL ROLES
// ============================================================================

/// Role of a named callback.
///
/// A bare directive only *declares* a symbol, so `Unknown` exists until some
/// referrer assigns a concrete role. Roles form a small lattice: `Unknown`
/// tightens to any concrete role, equal concrete roles are a no-op, and
/// differing concrete roles conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Unknown,
    Test,
    Setup,
    Teardown,
}

impl Role {
    /// Tighten `self` with `other`. Returns the merged role, or the
    /// conflicting pair when both are concrete and differ.
    pub fn merge(self, other: Role) -> Result<Role, (Role, Role)> {
        match (self, other) {
            (Role::Unknown, r) => Ok(r),
            (r, Role::Unknown) => Ok(r),
            (a, b) if a == b => Ok(a),
            (a, b) => Err((a, b)),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Unknown => "unknown",
            Role::Test => "test",
            Role::Setup => "setup",
            Role::Teardown => "teardown",
        }
    }

    /// The declaration shape this role requires
    pub fn required_shape(&self) -> &'static str {
        match self {
            Role::Test => "void <name>(void **state)",
            _ => "int <name>(void **state)",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// SYMBOLS
// ============================================================================

/// Where a symbol is physically defined
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolDecl {
    pub file: String,
    pub line: usize,
    pub return_kind: ReturnKind,
    pub params: String,
}

impl SymbolDecl {
    /// Textual shape check for the single state-handle parameter
    pub fn has_state_param(&self) -> bool {
        let p = self.params.trim();
        !p.contains(',') && p.contains("**")
    }
}

/// A named callback the generator knows about
#[derive(Debug, Clone)]
pub struct Symbol {
    pub name: String,
    pub role: Role,
    /// Definition site, once one has been scanned; the first definition wins
    pub decl: Option<SymbolDecl>,
}

/// Symbol table with stable insertion order
#[derive(Debug, Default)]
pub struct SymbolTable {
    symbols: Vec<Symbol>,
    by_name: HashMap<String, SymbolId>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get or create the symbol with this name
    pub fn intern(&mut self, name: &str) -> SymbolId {
        if let Some(&id) = self.by_name.get(name) {
            return id;
        }
        let id = self.symbols.len();
        self.symbols.push(Symbol {
            name: name.to_string(),
            role: Role::Unknown,
            decl: None,
        });
        self.by_name.insert(name.to_string(), id);
        id
    }

    /// Record a physical definition; earlier definitions win
    pub fn declare(&mut self, name: &str, decl: SymbolDecl) -> SymbolId {
        let id = self.intern(name);
        if self.symbols[id].decl.is_none() {
            self.symbols[id].decl = Some(decl);
        }
        id
    }

    pub fn lookup(&self, name: &str) -> Option<SymbolId> {
        self.by_name.get(name).copied()
    }

    pub fn get(&self, id: SymbolId) -> &Symbol {
        &self.symbols[id]
    }

    pub fn get_mut(&mut self, id: SymbolId) -> &mut Symbol {
        &mut self.symbols[id]
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    /// Symbols in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (SymbolId, &Symbol)> {
        self.symbols.iter().enumerate()
    }
}

// ============================================================================
// GROUPS AND TESTS
// ============================================================================

/// A group-level fixture slot, with the location of the directive that set
/// it (for error reporting when the reference does not resolve)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixtureRef {
    pub name: String,
    pub file: String,
    pub line: usize,
}

/// Attributes explicitly present on one group directive.
///
/// A group redefinition is merged as a patch: only the slots the new
/// definition supplies replace the existing ones, so fixtures set earlier
/// stick across redefinitions.
#[derive(Debug, Clone, Default)]
pub struct GroupPatch {
    pub setup: Option<FixtureRef>,
    pub teardown: Option<FixtureRef>,
}

/// A named, ordered collection of tests with optional default fixtures
#[derive(Debug, Clone)]
pub struct Group {
    pub name: String,
    pub tests: Vec<TestId>,
    pub setup: Option<FixtureRef>,
    pub teardown: Option<FixtureRef>,
}

impl Group {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            tests: Vec::new(),
            setup: None,
            teardown: None,
        }
    }

    /// Merge one redefinition into this group (sticky slots)
    pub fn apply(&mut self, patch: GroupPatch) {
        if let Some(setup) = patch.setup {
            self.setup = Some(setup);
        }
        if let Some(teardown) = patch.teardown {
            self.teardown = Some(teardown);
        }
    }
}

/// A single registered test
#[derive(Debug, Clone)]
pub struct Test {
    pub name: String,
    pub group: GroupId,
    pub symbol: SymbolId,
    /// Per-test fixture overrides, when given
    pub setup: Option<String>,
    pub teardown: Option<String>,
    /// Fixtures the runner will actually use: the override when present,
    /// otherwise the owning group's sticky slot at resolution time
    pub effective_setup: Option<SymbolId>,
    pub effective_teardown: Option<SymbolId>,
    pub disabled: bool,
    pub timeout: u64,
    pub file: String,
    pub line: usize,
}

// ============================================================================
// REGISTRY
// ============================================================================

/// The fully resolved model of all groups, tests and fixtures
#[derive(Debug, Default)]
pub struct Registry {
    pub groups: Vec<Group>,
    group_index: HashMap<String, GroupId>,
    pub tests: Vec<Test>,
    test_index: HashMap<String, TestId>,
    pub symbols: SymbolTable,
    pub errors: Vec<GenError>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve or create the group with this name. Groups come into
    /// existence the first time they are referenced as a destination, which
    /// fixes their position in the emitted runner.
    pub fn ensure_group(&mut self, name: &str) -> GroupId {
        if let Some(&id) = self.group_index.get(name) {
            return id;
        }
        let id = self.groups.len();
        self.groups.push(Group::new(name));
        self.group_index.insert(name.to_string(), id);
        id
    }

    pub fn find_group(&self, name: &str) -> Option<GroupId> {
        self.group_index.get(name).copied()
    }

    pub fn find_test(&self, name: &str) -> Option<TestId> {
        self.test_index.get(name).copied()
    }

    /// Register a test under its globally unique name. Returns `None` and
    /// leaves the registry unchanged when the name is already taken.
    pub fn add_test(&mut self, test: Test) -> Option<TestId> {
        if self.test_index.contains_key(&test.name) {
            return None;
        }
        let id = self.tests.len();
        self.test_index.insert(test.name.clone(), id);
        self.groups[test.group].tests.push(id);
        self.tests.push(test);
        Some(id)
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}
