//! Integration tests for the quipu pipeline

use std::fs;
use std::path::Path;

use quipu::frontend::scanner::scan_source;
use quipu::model::{Registry, builder};

/// Helper to run scanner + builder over in-memory sources
fn build_registry(sources: &[(&str, &str)]) -> Registry {
    let scanned: Vec<_> = sources
        .iter()
        .map(|(path, source)| scan_source(path, source))
        .collect();
    builder::build(&scanned)
}

fn group_tests<'a>(registry: &'a Registry, group: &str) -> Vec<&'a str> {
    let gid = registry.find_group(group).unwrap();
    registry.groups[gid]
        .tests
        .iter()
        .map(|&tid| registry.tests[tid].name.as_str())
        .collect()
}

/// Test that all valid fixtures build without errors
#[test]
fn test_valid_fixtures() {
    let fixtures_dir = Path::new("tests/fixtures/valid");
    for entry in fs::read_dir(fixtures_dir).unwrap() {
        let entry = entry.unwrap();
        let path = entry.path();
        if path.extension().map(|e| e == "c").unwrap_or(false) {
            let source = fs::read_to_string(&path).unwrap();
            let registry = build_registry(&[(&path.to_string_lossy(), &source)]);
            assert!(
                !registry.has_errors(),
                "Expected {} to build cleanly, got errors: {:?}",
                path.display(),
                registry.errors
            );
        }
    }
}

/// Test that invalid fixtures produce errors
#[test]
fn test_invalid_fixtures() {
    let fixtures_dir = Path::new("tests/fixtures/invalid");
    for entry in fs::read_dir(fixtures_dir).unwrap() {
        let entry = entry.unwrap();
        let path = entry.path();
        if path.extension().map(|e| e == "c").unwrap_or(false) {
            let source = fs::read_to_string(&path).unwrap();
            let registry = build_registry(&[(&path.to_string_lossy(), &source)]);
            assert!(
                registry.has_errors(),
                "Expected {} to produce errors, but it built cleanly",
                path.display()
            );
        }
    }
}

/// The worked example the directive language is designed around: group
/// definitions in sequence `foo`, `bar`, `foo`, a bare test, a test routed
/// with `group:baz`, and an explicit reference to an earlier plain function.
#[test]
fn test_canonical_resolution() {
    let source = "\
/*!quipu group foo */
/*!quipu group bar */
/*!quipu group foo */

void foobar(void **state)
{
  (void)state;
}

/*!quipu */
void foobaz(void **state)
{
  (void)state;
}

/*!quipu group:baz */
void barbaz(void **state)
{
  (void)state;
}

/*!quipu test foobar */
";
    let registry = build_registry(&[("example.c", source)]);
    assert!(!registry.has_errors(), "{:?}", registry.errors);

    assert_eq!(group_tests(&registry, "foo"), vec!["foobaz", "foobar"]);
    assert_eq!(group_tests(&registry, "baz"), vec!["barbaz"]);
    assert_eq!(group_tests(&registry, "bar"), Vec::<&str>::new());

    // Groups appear in first-seen order
    let names: Vec<&str> = registry.groups.iter().map(|g| g.name.as_str()).collect();
    assert_eq!(names, vec!["foo", "bar", "baz"]);
}

/// Group-level fixtures apply to every fixture-less test of the group
#[test]
fn test_group_fixtures_apply_to_tests() {
    let source = "\
/*!quipu group foo setup:setup_foo teardown:teardown_foo */

/*!quipu */
int setup_foo(void **state) { (void)state; return 0; }

/*!quipu */
int teardown_foo(void **state) { (void)state; return 0; }

/*!quipu */
void t1(void **state) { (void)state; }

/*!quipu */
void t2(void **state) { (void)state; }
";
    let registry = build_registry(&[("example.c", source)]);
    assert!(!registry.has_errors(), "{:?}", registry.errors);

    let setup = registry.symbols.lookup("setup_foo");
    let teardown = registry.symbols.lookup("teardown_foo");
    for test in &registry.tests {
        assert_eq!(test.effective_setup, setup, "test {}", test.name);
        assert_eq!(test.effective_teardown, teardown, "test {}", test.name);
    }
}

/// Per-test fixtures override group defaults regardless of stickiness
#[test]
fn test_per_test_fixtures_override_group() {
    let source = "\
/*!quipu group foo setup:setup_foo teardown:teardown_foo */

int setup_foo(void **state) { (void)state; return 0; }
int teardown_foo(void **state) { (void)state; return 0; }
int setup_bar(void **state) { (void)state; return 0; }
int teardown_bar(void **state) { (void)state; return 0; }

/*!quipu setup:setup_bar teardown:teardown_bar */
void test_bar(void **state) { (void)state; }

/*!quipu setup:setup_bar teardown:teardown_bar */
void test_baz(void **state) { (void)state; }
";
    let registry = build_registry(&[("example.c", source)]);
    assert!(!registry.has_errors(), "{:?}", registry.errors);

    let setup_bar = registry.symbols.lookup("setup_bar");
    let teardown_bar = registry.symbols.lookup("teardown_bar");
    for test in &registry.tests {
        assert_eq!(test.effective_setup, setup_bar, "test {}", test.name);
        assert_eq!(test.effective_teardown, teardown_bar, "test {}", test.name);
    }
}

/// Groups span files: tests from a second file land in a group defined by
/// the first, and fixtures may be defined in another file entirely
#[test]
fn test_groups_and_fixtures_span_files() {
    let registry = build_registry(&[
        (
            "alpha.c",
            "/*!quipu group shared setup:common_setup */\n\
             /*!quipu */\nvoid a1(void **state) { (void)state; }\n",
        ),
        (
            "beta.c",
            "/*!quipu group shared */\n\
             /*!quipu */\nvoid b1(void **state) { (void)state; }\n\
             /*!quipu */\nint common_setup(void **state) { (void)state; return 0; }\n",
        ),
    ]);
    assert!(!registry.has_errors(), "{:?}", registry.errors);
    assert_eq!(group_tests(&registry, "shared"), vec!["a1", "b1"]);

    let setup = registry.symbols.lookup("common_setup");
    for test in &registry.tests {
        assert_eq!(test.effective_setup, setup);
    }
}

/// The default group is per file, derived from the file stem
#[test]
fn test_default_group_is_per_file() {
    let registry = build_registry(&[
        ("first.c", "/*!quipu */\nvoid t1(void **state) { (void)state; }\n"),
        ("second.c", "/*!quipu */\nvoid t2(void **state) { (void)state; }\n"),
    ]);
    assert!(!registry.has_errors(), "{:?}", registry.errors);
    assert_eq!(group_tests(&registry, "first"), vec!["t1"]);
    assert_eq!(group_tests(&registry, "second"), vec!["t2"]);
}

/// A group directive in one file does not leak into the next file's default
#[test]
fn test_current_default_group_does_not_leak_across_files() {
    let registry = build_registry(&[
        (
            "alpha.c",
            "/*!quipu group custom */\n/*!quipu */\nvoid a1(void **state) { (void)state; }\n",
        ),
        ("beta.c", "/*!quipu */\nvoid b1(void **state) { (void)state; }\n"),
    ]);
    assert!(!registry.has_errors(), "{:?}", registry.errors);
    assert_eq!(group_tests(&registry, "custom"), vec!["a1"]);
    assert_eq!(group_tests(&registry, "beta"), vec!["b1"]);
}

/// All problems are reported in one run, not just the first
#[test]
fn test_all_errors_reported_in_one_run() {
    let registry = build_registry(&[(
        "broken.c",
        "/*!quipu test missing_one */\n\
         /*!quipu test missing_two */\n\
         /*!quipu bogus:value */\n\
         /*!quipu */\nint lonely = 4;\n",
    )]);
    assert_eq!(registry.errors.len(), 4);
}

/// Error kinds specific to end-to-end scenarios
mod error_scenarios {
    use super::*;
    use quipu::diagnostics::ErrorKind;

    #[test]
    fn duplicate_test_name_across_groups_is_rejected() {
        let registry = build_registry(&[(
            "dup.c",
            "/*!quipu group one */\n\
             /*!quipu */\nvoid same_name(void **state) { (void)state; }\n\
             /*!quipu group two */\n\
             /*!quipu test same_name */\n",
        )]);
        assert!(
            registry
                .errors
                .iter()
                .any(|e| e.kind == ErrorKind::DuplicateName)
        );
    }

    #[test]
    fn signature_mismatch_names_both_sites() {
        let registry = build_registry(&[(
            "sig.c",
            "/*!quipu test t */\nint t(void **state) { (void)state; return 0; }\n",
        )]);
        let err = registry
            .errors
            .iter()
            .find(|e| e.kind == ErrorKind::SignatureMismatch)
            .unwrap();
        assert!(err.message.contains("`t`"));
        assert!(err.notes.iter().any(|n| n.contains("sig.c:2")));
    }

    #[test]
    fn unknown_symbol_error_points_at_the_reference() {
        let registry = build_registry(&[("missing.c", "\n\n/*!quipu test nowhere */\n")]);
        let err = &registry.errors[0];
        assert_eq!(err.kind, ErrorKind::UnknownSymbol);
        assert_eq!(err.file, "missing.c");
        assert_eq!(err.line, 3);
    }
}

/// Generation over the full valid fixture, exercising the whole pipeline
mod generation {
    use super::*;
    use quipu::{generate_manifest, generate_runner};

    fn example_registry() -> Registry {
        let path = "tests/fixtures/valid/example.c";
        let source = fs::read_to_string(path).unwrap();
        build_registry(&[("example.c", &source)])
    }

    #[test]
    fn runner_contains_every_test_in_order() {
        let registry = example_registry();
        let src = generate_runner(&registry).unwrap();

        let positions: Vec<usize> = ["\"foobaz\"", "\"foobar\"", "\"test_bar\"", "\"test_baz\"", "\"test_slow\""]
            .iter()
            .map(|needle| src.find(*needle).unwrap())
            .collect();
        let mut sorted = positions.clone();
        sorted.sort_unstable();
        assert_eq!(positions, sorted, "tests must appear in registry order");
    }

    #[test]
    fn empty_groups_still_appear() {
        let registry = example_registry();
        let src = generate_runner(&registry).unwrap();
        assert!(src.contains("{ \"bar\", NULL, 0 },"));
    }

    #[test]
    fn disabled_flag_reaches_the_runner_table() {
        let registry = example_registry();
        let src = generate_runner(&registry).unwrap();
        assert!(src.contains("{ \"test_slow\", test_slow, setup_foo, teardown_foo, 1, 30 },"));
    }

    #[test]
    fn manifest_lists_each_defining_symbol_once() {
        let registry = example_registry();
        let manifest = generate_manifest(&registry, "runner.c").unwrap();

        let symbols = manifest["symbols"].as_array().unwrap();
        let mut names: Vec<&str> = symbols
            .iter()
            .map(|s| s["symbol"].as_str().unwrap())
            .collect();
        let total = names.len();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), total, "manifest must not duplicate symbols");

        assert_eq!(
            names,
            vec![
                "barbaz",
                "foobar",
                "foobaz",
                "setup_bar",
                "setup_foo",
                "teardown_bar",
                "teardown_foo",
                "test_bar",
                "test_baz",
                "test_slow",
            ]
        );
    }

    #[test]
    fn generation_is_deterministic_across_runs() {
        let first = generate_runner(&example_registry()).unwrap();
        let second = generate_runner(&example_registry()).unwrap();
        assert_eq!(first, second);

        let m1 = generate_manifest(&example_registry(), "runner.c").unwrap();
        let m2 = generate_manifest(&example_registry(), "runner.c").unwrap();
        assert_eq!(m1, m2);
    }

    #[test]
    fn generation_refuses_broken_registries() {
        let registry = build_registry(&[("broken.c", "/*!quipu test missing */\n")]);
        assert!(generate_runner(&registry).is_err());
        assert!(generate_manifest(&registry, "runner.c").is_err());
    }
}
