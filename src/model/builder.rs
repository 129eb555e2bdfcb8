//! Two-phase model builder
//!
//! Walks each file's directive stream in physical order, tracking the
//! file's current default group and merging everything into one shared
//! [`Registry`]. Names may be used before they are defined (including in a
//! later file), so building runs in two phases:
//!
//! 1. collect: register declarations and directives, create groups and
//!    tests, record every symbol use tentatively
//! 2. resolve: after all files are consumed, check that every used symbol
//!    is defined somewhere and matches the shape its role requires, and
//!    compute each test's effective fixtures from the final group state
//!
//! Only this stage is order-sensitive, and only in the documented ways: the
//! current default group follows each file's own physical order, and files
//! are consumed strictly in the order they were supplied.

use crate::frontend::diagnostics::GenError;
use crate::frontend::directive::{self, Directive, DirectiveKind};
use crate::frontend::scanner::{ReturnKind, ScannedDirective, ScannedFile};

use super::{
    DEFAULT_TIMEOUT_SECS, FixtureRef, GroupPatch, Registry, Role, SymbolDecl, SymbolId, Test,
};

/// One recorded use of a symbol in some role; checked in phase two
#[derive(Debug, Clone)]
struct SymbolUse {
    id: SymbolId,
    role: Role,
    file: String,
    line: usize,
}

/// Builds a [`Registry`] from scanned files
#[derive(Debug, Default)]
pub struct ModelBuilder {
    registry: Registry,
    uses: Vec<SymbolUse>,
}

/// Build a registry from scanned files, in the order given
pub fn build(files: &[ScannedFile]) -> Registry {
    let mut builder = ModelBuilder::new();
    for file in files {
        builder.add_file(file);
    }
    builder.finish()
}

impl ModelBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume one file's scan results (phase one)
    #[tracing::instrument(skip_all, fields(file = %file.path, directives = file.directives.len()))]
    pub fn add_file(&mut self, file: &ScannedFile) {
        for decl in &file.decls {
            self.registry.symbols.declare(
                &decl.name,
                SymbolDecl {
                    file: file.path.clone(),
                    line: decl.line,
                    return_kind: decl.return_kind.clone(),
                    params: decl.params.clone(),
                },
            );
        }

        let mut current_group = file.default_group.clone();

        for scanned in &file.directives {
            let parsed = directive::parse_directive(&scanned.comment, &file.path);
            let d = match parsed {
                Ok(d) => d,
                Err(err) => {
                    self.registry.errors.push(err);
                    continue;
                }
            };

            match d.kind {
                DirectiveKind::Group => self.handle_group(&d, file, &mut current_group),
                DirectiveKind::Test => self.handle_test(&d, scanned, file, &current_group),
                DirectiveKind::Setup => self.handle_fixture(&d, scanned, file, Role::Setup),
                DirectiveKind::Teardown => {
                    self.handle_fixture(&d, scanned, file, Role::Teardown)
                }
                DirectiveKind::Bare => self.handle_bare(&d, scanned, file, &current_group),
            }
        }
    }

    /// Finish building: resolve all outstanding references and compute
    /// effective fixtures (phase two)
    pub fn finish(mut self) -> Registry {
        self.resolve_uses();
        self.resolve_effective_fixtures();
        tracing::debug!(
            groups = self.registry.groups.len(),
            tests = self.registry.tests.len(),
            errors = self.registry.errors.len(),
            "registry built"
        );
        self.registry
    }

    // ========================================================================
    // Phase one: directive handling
    // ========================================================================

    fn handle_group(&mut self, d: &Directive, file: &ScannedFile, current_group: &mut String) {
        let Some(name) = &d.name else { return };
        let gid = self.registry.ensure_group(name);

        let patch = GroupPatch {
            setup: d.setup.as_ref().map(|fixture| {
                FixtureRef {
                    name: fixture.clone(),
                    file: file.path.clone(),
                    line: d.line,
                }
            }),
            teardown: d.teardown.as_ref().map(|fixture| {
                FixtureRef {
                    name: fixture.clone(),
                    file: file.path.clone(),
                    line: d.line,
                }
            }),
        };
        if let Some(fixture) = &d.setup {
            self.use_symbol(fixture, Role::Setup, &file.path, d.line);
        }
        if let Some(fixture) = &d.teardown {
            self.use_symbol(fixture, Role::Teardown, &file.path, d.line);
        }
        self.registry.groups[gid].apply(patch);

        *current_group = name.clone();
    }

    /// A completely bare directive binds by context: a test-shaped
    /// declaration becomes a test, a fixture-shaped one is only declared
    /// (its role is assigned by whoever references it). Bare directives
    /// carrying a name or attributes are unkeyed test directives.
    fn handle_bare(
        &mut self,
        d: &Directive,
        scanned: &ScannedDirective,
        file: &ScannedFile,
        current_group: &str,
    ) {
        if d.name.is_some() || d.has_attrs() {
            self.handle_test(d, scanned, file, current_group);
            return;
        }

        let Some(decl) = &scanned.following else {
            self.registry.errors.push(GenError::orphan(
                "directive has no associated declaration and no explicit name".to_string(),
                &file.path,
                d.line,
            ));
            return;
        };

        match decl.return_kind {
            ReturnKind::Void => self.handle_test(d, scanned, file, current_group),
            // Declaration only; the symbol was already registered from the
            // file's declaration list
            ReturnKind::Int => {}
            ReturnKind::Other(_) => {
                self.registry.errors.push(
                    GenError::signature_mismatch(
                        format!(
                            "declaration `{}` following a bare directive is neither test- nor fixture-shaped",
                            decl.name
                        ),
                        &file.path,
                        d.line,
                    )
                    .with_note(format!(
                        "found `{} {}({})`",
                        decl.return_kind, decl.name, decl.params
                    )),
                );
            }
        }
    }

    fn handle_test(
        &mut self,
        d: &Directive,
        scanned: &ScannedDirective,
        file: &ScannedFile,
        current_group: &str,
    ) {
        // An explicit name always names the defining symbol; a following
        // declaration either matches it or belongs to a later directive
        // (explicitly named tests are not required to be followed by a
        // declaration at all). Without a name the following declaration is
        // the target.
        let (symbol_name, test_name) = match (&d.name, &scanned.following) {
            (Some(name), _) => (name.clone(), name.clone()),
            (None, Some(decl)) => (decl.name.clone(), decl.name.clone()),
            (None, None) => {
                self.registry.errors.push(GenError::orphan(
                    "test directive has no associated declaration and no explicit name".to_string(),
                    &file.path,
                    d.line,
                ));
                return;
            }
        };

        let group_name = d.group.as_deref().unwrap_or(current_group);
        let gid = self.registry.ensure_group(group_name);

        let symbol = self.use_symbol(&symbol_name, Role::Test, &file.path, d.line);
        if let Some(fixture) = &d.setup {
            self.use_symbol(fixture, Role::Setup, &file.path, d.line);
        }
        if let Some(fixture) = &d.teardown {
            self.use_symbol(fixture, Role::Teardown, &file.path, d.line);
        }

        if let Some(previous) = self.registry.find_test(&test_name) {
            let prev = &self.registry.tests[previous];
            let err = GenError::duplicate_name(
                format!("a test named `{}` is already registered", test_name),
                &file.path,
                d.line,
            )
            .with_note(format!("first registered at {}:{}", prev.file, prev.line));
            self.registry.errors.push(err);
            return;
        }

        let _ = self.registry.add_test(Test {
            name: test_name,
            group: gid,
            symbol,
            setup: d.setup.clone(),
            teardown: d.teardown.clone(),
            effective_setup: None,
            effective_teardown: None,
            disabled: d.disabled.unwrap_or(false),
            timeout: d.timeout.unwrap_or(DEFAULT_TIMEOUT_SECS),
            file: file.path.clone(),
            line: d.line,
        });
    }

    fn handle_fixture(
        &mut self,
        d: &Directive,
        scanned: &ScannedDirective,
        file: &ScannedFile,
        role: Role,
    ) {
        let symbol_name = match (&d.name, &scanned.following) {
            (Some(name), _) => name.clone(),
            (None, Some(decl)) => decl.name.clone(),
            (None, None) => {
                self.registry.errors.push(GenError::orphan(
                    format!(
                        "{} directive has no associated declaration and no explicit name",
                        role
                    ),
                    &file.path,
                    d.line,
                ));
                return;
            }
        };
        self.use_symbol(&symbol_name, role, &file.path, d.line);
    }

    /// Intern a symbol, tighten its role, and record the use for phase-two
    /// resolution
    fn use_symbol(&mut self, name: &str, role: Role, file: &str, line: usize) -> SymbolId {
        let id = self.registry.symbols.intern(name);
        let symbol = self.registry.symbols.get_mut(id);
        match symbol.role.merge(role) {
            Ok(merged) => symbol.role = merged,
            Err((existing, wanted)) => {
                self.registry.errors.push(GenError::role_conflict(
                    format!(
                        "`{}` is already used as a {}, cannot also be a {}",
                        name, existing, wanted
                    ),
                    file,
                    line,
                ));
            }
        }
        self.uses.push(SymbolUse {
            id,
            role,
            file: file.to_string(),
            line,
        });
        id
    }

    // ========================================================================
    // Phase two: resolution
    // ========================================================================

    fn resolve_uses(&mut self) {
        let mut errors = Vec::new();
        for u in &self.uses {
            let symbol = self.registry.symbols.get(u.id);
            let Some(decl) = &symbol.decl else {
                errors.push(GenError::unknown_symbol(
                    format!("`{}` is never defined in any input file", symbol.name),
                    u.file.clone(),
                    u.line,
                ));
                continue;
            };
            let shape_ok = match u.role {
                Role::Test => decl.return_kind == ReturnKind::Void && decl.has_state_param(),
                Role::Setup | Role::Teardown => {
                    decl.return_kind == ReturnKind::Int && decl.has_state_param()
                }
                Role::Unknown => true,
            };
            if !shape_ok {
                errors.push(
                    GenError::signature_mismatch(
                        format!(
                            "`{}` is used as a {} but is declared as `{} {}({})`",
                            symbol.name, u.role, decl.return_kind, symbol.name, decl.params
                        ),
                        u.file.clone(),
                        u.line,
                    )
                    .with_note(format!("a {} must have the shape `{}`", u.role, u.role.required_shape()))
                    .with_note(format!("declared at {}:{}", decl.file, decl.line)),
                );
            }
        }
        self.registry.errors.extend(errors);
    }

    /// Fixtures fall back to the owning group's sticky slot as it stands
    /// now, after all files are consumed, not as it stood when the test was
    /// declared
    fn resolve_effective_fixtures(&mut self) {
        for i in 0..self.registry.tests.len() {
            let gid = self.registry.tests[i].group;
            let group_setup = self.registry.groups[gid].setup.as_ref().map(|f| f.name.clone());
            let group_teardown = self.registry.groups[gid]
                .teardown
                .as_ref()
                .map(|f| f.name.clone());

            let test = &self.registry.tests[i];
            let setup_name = test.setup.clone().or(group_setup);
            let teardown_name = test.teardown.clone().or(group_teardown);
            let effective_setup = setup_name.and_then(|n| self.registry.symbols.lookup(&n));
            let effective_teardown = teardown_name.and_then(|n| self.registry.symbols.lookup(&n));

            let test = &mut self.registry.tests[i];
            test.effective_setup = effective_setup;
            test.effective_teardown = effective_teardown;
        }
    }
}
