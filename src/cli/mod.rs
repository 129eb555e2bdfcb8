//! CLI module for the quipu generator
//!
//! ## Commands
//!
//! - `generate <files...>` - emit the runner source and manifest
//! - `check <files...>` - validate directives without emitting anything
//!
//! ## Debug flags
//!
//! - `--scan <file>` - dump scanned directives and declarations
//! - `--directives <file>` - dump parsed directives
//!
//! ## Design
//!
//! The CLI uses clap for argument parsing with derive macros.
//! Command functions return `CliResult<T>` instead of calling
//! `process::exit`. Only the top-level `run()` function handles errors and
//! exits.

// Enforce explicit error handling - no panicking in production code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

pub mod commands;

use std::fmt;
use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};

use crate::version::QUIPU_VERSION;

// ============================================================================
// CLI Error handling
// ============================================================================

/// Exit code for CLI operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitCode(pub i32);

impl ExitCode {
    pub const SUCCESS: ExitCode = ExitCode(0);
    pub const FAILURE: ExitCode = ExitCode(1);
}

/// Error type for CLI operations.
///
/// Contains a user-facing message and an exit code. The CLI entry point
/// catches these errors, prints the message, and exits with the code.
#[derive(Debug)]
pub struct CliError {
    /// User-facing error message (already formatted for display)
    pub message: String,
    /// Exit code to return to the shell
    pub exit_code: ExitCode,
}

impl CliError {
    /// Create a new CLI error with a message and exit code.
    pub fn new(message: impl Into<String>, exit_code: ExitCode) -> Self {
        Self {
            message: message.into(),
            exit_code,
        }
    }

    /// Create a failure error (exit code 1).
    pub fn failure(message: impl Into<String>) -> Self {
        Self::new(message, ExitCode::FAILURE)
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

/// Result type for CLI operations.
pub type CliResult<T> = Result<T, CliError>;

// ============================================================================
// Clap CLI definition
// ============================================================================

/// Annotation-driven test runner generator for C unit tests
#[derive(Parser, Debug)]
#[command(name = "quipu")]
#[command(version = QUIPU_VERSION)]
#[command(about = "Annotation-driven test runner generator for C unit tests", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    // Debug/development flags
    /// Dump scanned directives and declarations (debug)
    #[arg(long = "scan", value_name = "FILE")]
    pub scan_file: Option<PathBuf>,

    /// Dump parsed directives (debug)
    #[arg(long = "directives", value_name = "FILE")]
    pub directives_file: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Generate the runner source and manifest
    Generate {
        /// Annotated source files, in the order the host build lists them
        #[arg(value_name = "FILES", required = true)]
        files: Vec<PathBuf>,
        /// Output directory
        #[arg(
            short = 'o',
            long = "output-dir",
            value_name = "DIR",
            default_value = "quipu_output"
        )]
        output_dir: PathBuf,
        /// Base name of the emitted runner source
        #[arg(long = "runner-name", value_name = "NAME", default_value = "runner")]
        runner_name: String,
    },

    /// Validate directives without generating anything
    Check {
        /// Annotated source files, in the order the host build lists them
        #[arg(value_name = "FILES", required = true)]
        files: Vec<PathBuf>,
    },
}

// ============================================================================
// CLI entry point
// ============================================================================

/// Main CLI entry point.
///
/// This is the only place where `process::exit` is called. All command
/// implementations return `CliResult` and errors are handled here.
pub fn run() {
    let cli = Cli::parse();

    match execute(cli) {
        Ok(exit_code) => {
            if exit_code.0 != 0 {
                process::exit(exit_code.0);
            }
        }
        Err(e) => {
            if !e.message.is_empty() {
                eprintln!("{}", e.message);
            }
            process::exit(e.exit_code.0);
        }
    }
}

/// Execute the CLI command and return result.
fn execute(cli: Cli) -> CliResult<ExitCode> {
    // Handle debug flags first
    if let Some(file) = cli.scan_file {
        return commands::dump_scan(&file);
    }
    if let Some(file) = cli.directives_file {
        return commands::dump_directives(&file);
    }

    match cli.command {
        Some(Command::Generate {
            files,
            output_dir,
            runner_name,
        }) => commands::generate(&files, &output_dir, &runner_name),
        Some(Command::Check { files }) => commands::check(&files),
        None => Err(CliError::failure(
            "no command given; try `quipu generate <files...>` or `quipu --help`",
        )),
    }
}
