//! Runner source generation
//!
//! Emits a self-contained POSIX C program that runs the registered tests:
//! each enabled test is forked with an `alarm` armed to its timeout, so a
//! hung or crashing test never takes the runner down, and death by
//! `SIGALRM` is reported as a distinct timeout outcome. Disabled tests are
//! reported as skipped without forking.
//!
//! The emitted program consists of extern declarations for every referenced
//! callback, static group/test tables in registry order, and a fixed driver
//! appended verbatim.

use crate::model::{Registry, Role};
use crate::version::QUIPU_VERSION;

use super::emitter::CEmitter;
use super::{GenerateError, referenced_symbols};

/// Generate the runner C source for a finished registry.
///
/// Refuses to run when the registry carries unresolved errors; no partial
/// output exists in that case.
#[tracing::instrument(skip_all, fields(groups = registry.groups.len(), tests = registry.tests.len()))]
pub fn generate_runner(registry: &Registry) -> Result<String, GenerateError> {
    if registry.has_errors() {
        return Err(GenerateError::UnresolvedErrors(registry.errors.len()));
    }

    let mut e = CEmitter::new();
    emit_header(&mut e);
    emit_externs(&mut e, registry);
    emit_tables(&mut e, registry);
    e.write(DRIVER);
    Ok(e.finish())
}

fn emit_header(e: &mut CEmitter) {
    e.line(&format!(
        "/* Test runner generated by quipu {}. Do not edit.",
        QUIPU_VERSION
    ));
    e.line(" *");
    e.line(" * Exit status is the number of failed, errored, or timed out tests,");
    e.line(" * capped at 254; 255 signals an unknown group or test name on the");
    e.line(" * command line.");
    e.line(" */");
    e.blank_line();
    e.line("#include <stddef.h>");
    e.line("#include <stdio.h>");
    e.line("#include <stdlib.h>");
    e.line("#include <string.h>");
    e.line("#include <signal.h>");
    e.line("#include <unistd.h>");
    e.line("#include <sys/types.h>");
    e.line("#include <sys/wait.h>");
    e.blank_line();
}

fn emit_externs(e: &mut CEmitter, registry: &Registry) {
    for id in referenced_symbols(registry) {
        let symbol = registry.symbols.get(id);
        match symbol.role {
            Role::Test => e.line(&format!("extern void {}(void **state);", symbol.name)),
            _ => e.line(&format!("extern int {}(void **state);", symbol.name)),
        }
    }
    e.blank_line();
}

fn emit_tables(e: &mut CEmitter, registry: &Registry) {
    e.line("typedef void (*qp_test_fn)(void **state);");
    e.line("typedef int (*qp_fixture_fn)(void **state);");
    e.blank_line();
    e.block("struct qp_test", "};", |e| {
        e.line("const char *name;");
        e.line("qp_test_fn fn;");
        e.line("qp_fixture_fn setup;");
        e.line("qp_fixture_fn teardown;");
        e.line("int disabled;");
        e.line("unsigned timeout;");
    });
    e.blank_line();
    e.block("struct qp_group", "};", |e| {
        e.line("const char *name;");
        e.line("const struct qp_test *tests;");
        e.line("size_t ntests;");
    });
    e.blank_line();

    for group in &registry.groups {
        if group.tests.is_empty() {
            continue;
        }
        e.block(
            &format!("static const struct qp_test qp_tests_{}[] =", group.name),
            "};",
            |e| {
                for &tid in &group.tests {
                    let test = &registry.tests[tid];
                    let fixture = |id: Option<usize>| match id {
                        Some(id) => registry.symbols.get(id).name.clone(),
                        None => "NULL".to_string(),
                    };
                    e.line(&format!(
                        "{{ \"{}\", {}, {}, {}, {}, {} }},",
                        test.name,
                        registry.symbols.get(test.symbol).name,
                        fixture(test.effective_setup),
                        fixture(test.effective_teardown),
                        i32::from(test.disabled),
                        test.timeout,
                    ));
                }
            },
        );
        e.blank_line();
    }

    e.block("static const struct qp_group qp_groups[] =", "};", |e| {
        if registry.groups.is_empty() {
            e.line("{ NULL, NULL, 0 },");
        }
        for group in &registry.groups {
            if group.tests.is_empty() {
                e.line(&format!("{{ \"{}\", NULL, 0 }},", group.name));
            } else {
                e.line(&format!(
                    "{{ \"{}\", qp_tests_{}, {} }},",
                    group.name,
                    group.name,
                    group.tests.len()
                ));
            }
        }
    });
    e.blank_line();
    e.line(&format!(
        "static const size_t qp_ngroups = {};",
        registry.groups.len()
    ));
    e.blank_line();
}

/// The fixed part of every emitted runner.
///
/// Child exit protocol: 0 is a pass, 64 a fixture failure, anything else a
/// test failure; death by SIGALRM is a timeout. Teardown runs only when
/// setup did not fail, and runs via an atexit hook so a test body that
/// reports failure through exit() still gets its teardown.
const DRIVER: &str = r#"enum qp_outcome {
  QP_PASSED,
  QP_FAILED,
  QP_ERRORED,
  QP_TIMED_OUT,
  QP_SKIPPED
};

#define QP_CHILD_PASS 0
#define QP_CHILD_FIXTURE 64

static qp_fixture_fn qp_active_teardown = NULL;
static void **qp_active_state = NULL;

static void qp_teardown_hook(void)
{
  qp_fixture_fn fn = qp_active_teardown;

  qp_active_teardown = NULL;
  if (fn != NULL && fn(qp_active_state) != 0)
    _exit(QP_CHILD_FIXTURE);
}

static void qp_child(const struct qp_test *t)
{
  static void *state = NULL;

  alarm(t->timeout);
  if (t->setup != NULL && t->setup(&state) != 0)
    _exit(QP_CHILD_FIXTURE);
  if (t->teardown != NULL) {
    qp_active_teardown = t->teardown;
    qp_active_state = &state;
    atexit(qp_teardown_hook);
  }
  t->fn(&state);
  exit(QP_CHILD_PASS);
}

static enum qp_outcome qp_run_test(const struct qp_test *t)
{
  pid_t pid;
  int status;

  pid = fork();
  if (pid < 0) {
    perror("fork");
    return QP_ERRORED;
  }
  if (pid == 0)
    qp_child(t);
  if (waitpid(pid, &status, 0) < 0) {
    perror("waitpid");
    return QP_ERRORED;
  }
  if (WIFSIGNALED(status))
    return WTERMSIG(status) == SIGALRM ? QP_TIMED_OUT : QP_FAILED;
  if (WIFEXITED(status)) {
    if (WEXITSTATUS(status) == QP_CHILD_PASS)
      return QP_PASSED;
    return WEXITSTATUS(status) == QP_CHILD_FIXTURE ? QP_ERRORED : QP_FAILED;
  }
  return QP_ERRORED;
}

static int qp_arg_matches(const char *name, int argc, char **argv)
{
  int i;

  for (i = 1; i < argc; i++) {
    if (strcmp(argv[i], name) == 0)
      return 1;
  }
  return 0;
}

static const char *qp_outcome_tag(enum qp_outcome outcome)
{
  switch (outcome) {
  case QP_PASSED:    return "      OK";
  case QP_FAILED:    return "  FAILED";
  case QP_ERRORED:   return "   ERROR";
  case QP_TIMED_OUT: return " TIMEOUT";
  default:           return " SKIPPED";
  }
}

int main(int argc, char **argv)
{
  size_t g, t;
  int i;
  unsigned counts[5] = { 0, 0, 0, 0, 0 };
  unsigned bad;

  for (i = 1; i < argc; i++) {
    int known = 0;

    for (g = 0; g < qp_ngroups && !known; g++) {
      if (strcmp(argv[i], qp_groups[g].name) == 0)
        known = 1;
      for (t = 0; t < qp_groups[g].ntests && !known; t++) {
        if (strcmp(argv[i], qp_groups[g].tests[t].name) == 0)
          known = 1;
      }
    }
    if (!known) {
      fprintf(stderr, "unknown group or test: %s\n", argv[i]);
      return 255;
    }
  }

  for (g = 0; g < qp_ngroups; g++) {
    const struct qp_group *group = &qp_groups[g];
    int group_selected = argc <= 1 || qp_arg_matches(group->name, argc, argv);

    for (t = 0; t < group->ntests; t++) {
      const struct qp_test *test = &group->tests[t];
      enum qp_outcome outcome;

      if (!group_selected && !qp_arg_matches(test->name, argc, argv))
        continue;
      printf("[ RUN      ] %s.%s\n", group->name, test->name);
      outcome = test->disabled ? QP_SKIPPED : qp_run_test(test);
      printf("[ %s ] %s.%s\n", qp_outcome_tag(outcome), group->name, test->name);
      counts[outcome]++;
    }
  }

  printf("passed: %u, failed: %u, errored: %u, timed out: %u, skipped: %u\n",
         counts[QP_PASSED], counts[QP_FAILED], counts[QP_ERRORED],
         counts[QP_TIMED_OUT], counts[QP_SKIPPED]);

  bad = counts[QP_FAILED] + counts[QP_ERRORED] + counts[QP_TIMED_OUT];
  return bad > 254 ? 254 : (int)bad;
}
"#;
