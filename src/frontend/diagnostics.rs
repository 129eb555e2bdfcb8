//! Diagnostics and error reporting for quipu
//!
//! All pipeline stages report problems as [`GenError`] values collected into
//! the registry, so a single run surfaces every problem instead of stopping
//! at the first one.

/// A generation-time error with location information
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenError {
    pub message: String,
    /// Path of the input file the error was found in
    pub file: String,
    /// 1-based line number of the offending directive or declaration
    pub line: usize,
    pub kind: ErrorKind,
    pub notes: Vec<String>,
}

impl GenError {
    pub fn new(kind: ErrorKind, message: String, file: impl Into<String>, line: usize) -> Self {
        Self {
            message,
            file: file.into(),
            line,
            kind,
            notes: Vec::new(),
        }
    }

    pub fn syntax(message: String, file: impl Into<String>, line: usize) -> Self {
        Self::new(ErrorKind::DirectiveSyntax, message, file, line)
    }

    pub fn unknown_symbol(message: String, file: impl Into<String>, line: usize) -> Self {
        Self::new(ErrorKind::UnknownSymbol, message, file, line)
    }

    pub fn signature_mismatch(message: String, file: impl Into<String>, line: usize) -> Self {
        Self::new(ErrorKind::SignatureMismatch, message, file, line)
    }

    pub fn role_conflict(message: String, file: impl Into<String>, line: usize) -> Self {
        Self::new(ErrorKind::RoleConflict, message, file, line)
    }

    pub fn duplicate_name(message: String, file: impl Into<String>, line: usize) -> Self {
        Self::new(ErrorKind::DuplicateName, message, file, line)
    }

    pub fn orphan(message: String, file: impl Into<String>, line: usize) -> Self {
        Self::new(ErrorKind::OrphanDirective, message, file, line)
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }
}

/// Classification of generation errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed directive comment text
    DirectiveSyntax,
    /// An explicit name never resolves to a defined symbol in the input set
    UnknownSymbol,
    /// A symbol used as test or fixture does not match the required shape
    SignatureMismatch,
    /// A symbol was assigned two incompatible roles by different directives
    RoleConflict,
    /// Two groups or two tests share a name
    DuplicateName,
    /// A directive with no following declaration and no explicit name
    OrphanDirective,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::DirectiveSyntax => write!(f, "directive syntax error"),
            ErrorKind::UnknownSymbol => write!(f, "unresolved reference"),
            ErrorKind::SignatureMismatch => write!(f, "signature mismatch"),
            ErrorKind::RoleConflict => write!(f, "role conflict"),
            ErrorKind::DuplicateName => write!(f, "duplicate name"),
            ErrorKind::OrphanDirective => write!(f, "orphan directive"),
        }
    }
}

/// Format an error with source context as a string
///
/// `source` is the content of the file the error points into; callers that
/// process multiple files keep the sources around until reporting is done.
pub fn format_error(source: &str, error: &GenError) -> String {
    let mut out = String::new();

    out.push_str(&format!("{}: {}\n", error.kind, error.message));
    out.push_str(&format!("  --> {}:{}\n", error.file, error.line));

    if let Some(line_text) = source.lines().nth(error.line.saturating_sub(1)) {
        let line_num_width = format!("{}", error.line).len();
        out.push_str(&format!("  {:>width$} |\n", "", width = line_num_width));
        out.push_str(&format!(
            "  {:>width$} | {}\n",
            error.line,
            line_text,
            width = line_num_width
        ));
        out.push_str(&format!("  {:>width$} |\n", "", width = line_num_width));
    }

    for note in &error.notes {
        out.push_str(&format!("  = note: {}\n", note));
    }

    out
}

/// Print an error with source context to stderr, with color
pub fn print_error(source: &str, error: &GenError) {
    let red = "\x1b[31m";
    let cyan = "\x1b[36m";
    let bold = "\x1b[1m";
    let reset = "\x1b[0m";

    eprintln!(
        "{bold}{red}{kind}{reset}{bold}: {message}{reset}",
        kind = error.kind,
        message = error.message,
    );
    eprintln!(
        "  {cyan}-->{reset} {file}:{line}",
        file = error.file,
        line = error.line,
    );

    if let Some(line_text) = source.lines().nth(error.line.saturating_sub(1)) {
        let line_num_width = format!("{}", error.line).len();
        eprintln!("  {cyan}{:>width$} |{reset}", "", width = line_num_width);
        eprintln!(
            "  {cyan}{:>width$} |{reset} {}",
            error.line,
            line_text,
            width = line_num_width
        );
        eprintln!("  {cyan}{:>width$} |{reset}", "", width = line_num_width);
    }

    for note in &error.notes {
        eprintln!("  {cyan}= note:{reset} {}", note);
    }

    eprintln!();
}
