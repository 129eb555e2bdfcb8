//! CLI command implementations
//!
//! All command functions return `CliResult<ExitCode>` instead of calling
//! `process::exit`. Error handling and exits happen in the top-level
//! `run()`.

use std::fs;
use std::path::{Path, PathBuf};

use crate::backend::RunnerProject;
use crate::frontend::scanner::{self, ScannedFile};
use crate::frontend::{diagnostics, directive};
use crate::model::{ModelBuilder, Registry};

use super::{CliError, CliResult, ExitCode};

/// One input file with its content kept around for error rendering
struct LoadedFile {
    source: String,
    scanned: ScannedFile,
}

/// Read and scan every input file, in the order given
fn load_files(files: &[PathBuf]) -> CliResult<Vec<LoadedFile>> {
    let mut loaded = Vec::with_capacity(files.len());
    for path in files {
        let display = path.to_string_lossy().to_string();
        let source = fs::read_to_string(path)
            .map_err(|e| CliError::failure(format!("error reading '{}': {}", display, e)))?;
        let scanned = scanner::scan_source(&display, &source);
        loaded.push(LoadedFile { source, scanned });
    }
    Ok(loaded)
}

/// Build the registry; on any collected error, render all of them with
/// source context and fail
fn build_registry(files: &[PathBuf]) -> CliResult<Registry> {
    let loaded = load_files(files)?;

    let mut builder = ModelBuilder::new();
    for file in &loaded {
        builder.add_file(&file.scanned);
    }
    let registry = builder.finish();

    if registry.has_errors() {
        let mut message = String::new();
        for error in &registry.errors {
            let source = loaded
                .iter()
                .find(|f| f.scanned.path == error.file)
                .map(|f| f.source.as_str())
                .unwrap_or("");
            message.push_str(&diagnostics::format_error(source, error));
            message.push('\n');
        }
        message.push_str(&format!(
            "{} error(s); no output written",
            registry.errors.len()
        ));
        return Err(CliError::failure(message));
    }

    Ok(registry)
}

/// `quipu generate` - emit runner source and manifest
pub fn generate(files: &[PathBuf], output_dir: &Path, runner_name: &str) -> CliResult<ExitCode> {
    let registry = build_registry(files)?;

    let project = RunnerProject::new(output_dir, runner_name);
    project
        .generate(&registry)
        .map_err(|e| CliError::failure(format!("error writing output: {}", e)))?;

    println!(
        "generated {} ({} group(s), {} test(s)) and {}",
        project.runner_file().display(),
        registry.groups.len(),
        registry.tests.len(),
        project.manifest_file().display(),
    );
    Ok(ExitCode::SUCCESS)
}

/// `quipu check` - validate only
pub fn check(files: &[PathBuf]) -> CliResult<ExitCode> {
    let registry = build_registry(files)?;
    println!(
        "ok: {} group(s), {} test(s), {} symbol(s)",
        registry.groups.len(),
        registry.tests.len(),
        registry.symbols.len(),
    );
    Ok(ExitCode::SUCCESS)
}

/// `quipu --scan` - dump the scanner's view of one file (debug)
pub fn dump_scan(path: &Path) -> CliResult<ExitCode> {
    let loaded = load_files(std::slice::from_ref(&path.to_path_buf()))?;
    let file = &loaded[0].scanned;

    println!("default group: {}", file.default_group);
    for directive in &file.directives {
        match &directive.following {
            Some(decl) => println!(
                "{:>4}: directive `{}` -> {} {}({})",
                directive.comment.line,
                directive.comment.text.trim(),
                decl.return_kind,
                decl.name,
                decl.params
            ),
            None => println!(
                "{:>4}: directive `{}` -> no following declaration",
                directive.comment.line,
                directive.comment.text.trim()
            ),
        }
    }
    for decl in &file.decls {
        println!(
            "{:>4}: decl {} {}({})",
            decl.line, decl.return_kind, decl.name, decl.params
        );
    }
    Ok(ExitCode::SUCCESS)
}

/// `quipu --directives` - dump parsed directives of one file (debug)
pub fn dump_directives(path: &Path) -> CliResult<ExitCode> {
    let loaded = load_files(std::slice::from_ref(&path.to_path_buf()))?;
    let file = &loaded[0];

    let mut failed = false;
    for scanned in &file.scanned.directives {
        match directive::parse_directive(&scanned.comment, &file.scanned.path) {
            Ok(d) => println!("{:>4}: {:?}", d.line, d),
            Err(e) => {
                failed = true;
                eprint!("{}", diagnostics::format_error(&file.source, &e));
            }
        }
    }
    if failed {
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}
