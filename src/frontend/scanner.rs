//! Scanner for annotated C source files
//!
//! Locates directive comments (`/*!quipu ... */`) and top-level function
//! declarations, and pairs each directive with the declaration that
//! physically follows it. The scanner is pure per file and never errors:
//! anything it cannot recognize simply yields no following symbol and is
//! diagnosed later by the model builder.
//!
//! Declaration recognition is textual shape matching (return-kind tokens,
//! a name, a parenthesized parameter list) with no preprocessing and no type
//! checking. That approximation is a deliberate property of the directive
//! language, which is designed to be readable without a C front end.

use std::path::Path;

// ============================================================================
// SCANNED TYPES
// ============================================================================

/// The comment marker that makes a block comment a directive comment.
///
/// A comment qualifies iff it opens with `/*!quipu` followed by whitespace
/// or the comment end.
pub const DIRECTIVE_MARKER: &str = "quipu";

/// Return kind of a scanned declaration, as written in the source
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReturnKind {
    Void,
    Int,
    Other(String),
}

impl std::fmt::Display for ReturnKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReturnKind::Void => write!(f, "void"),
            ReturnKind::Int => write!(f, "int"),
            ReturnKind::Other(s) => write!(f, "{}", s),
        }
    }
}

/// A top-level function declaration recognized by shape
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionDecl {
    pub name: String,
    pub return_kind: ReturnKind,
    /// Parameter list text with whitespace collapsed, e.g. `void **state`
    pub params: String,
    /// 1-based line the declaration starts on
    pub line: usize,
}

/// A raw directive comment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawComment {
    /// 1-based line the comment opens on
    pub line: usize,
    /// 1-based line the comment closes on
    pub end_line: usize,
    /// Full comment body between `/*` and `*/`, including the marker
    pub text: String,
}

/// A directive comment paired with the declaration that follows it, if any
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedDirective {
    pub comment: RawComment,
    pub following: Option<FunctionDecl>,
}

/// Everything the scanner recovered from one input file
#[derive(Debug, Clone)]
pub struct ScannedFile {
    pub path: String,
    /// Group that directives without an explicit group attach to until a
    /// `group` directive supersedes it; derived from the file stem
    pub default_group: String,
    pub directives: Vec<ScannedDirective>,
    /// Every top-level declaration, annotated or not, in physical order
    pub decls: Vec<FunctionDecl>,
}

/// Check whether a string is a plain C identifier
pub fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Derive the file's default group name from its stem, transformed into a
/// C identifier (non-alphanumeric characters become `_`, a leading digit is
/// prefixed with `_`).
pub fn default_group_name(path: &str) -> String {
    let stem = Path::new(path)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("tests");
    make_c_identifier(stem)
}

fn make_c_identifier(s: &str) -> String {
    let mut out = String::new();
    for c in s.chars() {
        if out.is_empty() && c.is_ascii_digit() {
            out.push('_');
        }
        if c.is_ascii_alphanumeric() || c == '_' {
            out.push(c);
        } else {
            out.push('_');
        }
    }
    if out.is_empty() {
        out.push('_');
    }
    out
}

// ============================================================================
// SCANNER STATE
// ============================================================================

/// Physical-order events recovered from the source text. `Code` marks a
/// top-level construct that is not a recognizable declaration; it breaks the
/// directive-to-declaration pairing.
#[derive(Debug, Clone)]
enum Event {
    Directive(RawComment),
    Decl(FunctionDecl),
    Code,
}

/// Scanner for one annotated C source file.
///
/// Walks the text once, tracking comments, string and character literals,
/// and brace depth so that only top-level constructs are considered.
struct Scanner<'a> {
    chars: std::iter::Peekable<std::str::CharIndices<'a>>,
    line: usize,
    brace_depth: usize,
    /// Statement text accumulated at brace depth 0 since the last boundary
    stmt: String,
    stmt_line: Option<usize>,
    events: Vec<Event>,
}

impl<'a> Scanner<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            chars: source.char_indices().peekable(),
            line: 1,
            brace_depth: 0,
            stmt: String::new(),
            stmt_line: None,
            events: Vec::new(),
        }
    }

    fn peek(&mut self) -> Option<char> {
        self.chars.peek().map(|(_, c)| *c)
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.chars.next().map(|(_, c)| c);
        if c == Some('\n') {
            self.line += 1;
        }
        c
    }

    fn scan(mut self) -> Vec<Event> {
        while let Some(c) = self.advance() {
            match c {
                '/' if self.peek() == Some('*') => {
                    self.advance();
                    self.block_comment();
                }
                '/' if self.peek() == Some('/') => {
                    self.advance();
                    self.skip_to_eol();
                }
                '"' | '\'' => self.literal(c),
                '#' if self.brace_depth == 0 => self.preprocessor_line(),
                '{' => {
                    if self.brace_depth == 0 {
                        self.end_statement();
                    }
                    self.brace_depth += 1;
                }
                '}' => {
                    self.brace_depth = self.brace_depth.saturating_sub(1);
                    if self.brace_depth == 0 {
                        self.stmt.clear();
                        self.stmt_line = None;
                    }
                }
                ';' if self.brace_depth == 0 => self.end_statement(),
                _ => {
                    if self.brace_depth == 0 {
                        if self.stmt_line.is_none() && !c.is_whitespace() {
                            self.stmt_line = Some(self.line);
                        }
                        self.stmt.push(c);
                    }
                }
            }
        }
        // Trailing text with no terminator is not a declaration
        self.end_statement();
        self.events
    }

    /// Consume a block comment (the `/*` is already consumed) and record a
    /// directive event if it carries the marker and sits at top level.
    fn block_comment(&mut self) {
        let start_line = self.line;
        let mut text = String::new();
        while let Some(c) = self.advance() {
            if c == '*' && self.peek() == Some('/') {
                self.advance();
                break;
            }
            text.push(c);
        }
        if self.brace_depth == 0 {
            if is_directive_body(&text) {
                self.events.push(Event::Directive(RawComment {
                    line: start_line,
                    end_line: self.line,
                    text,
                }));
            }
            // A comment may sit mid-statement; keep the tokens separated
            self.stmt.push(' ');
        }
    }

    fn skip_to_eol(&mut self) {
        while let Some(c) = self.peek() {
            if c == '\n' {
                break;
            }
            self.advance();
        }
        if self.brace_depth == 0 {
            self.stmt.push(' ');
        }
    }

    /// Consume a string or character literal, honoring backslash escapes.
    /// At top level the literal text stays part of the current statement so
    /// that initializers are classified as plain code.
    fn literal(&mut self, quote: char) {
        if self.brace_depth == 0 {
            self.stmt.push(quote);
        }
        while let Some(c) = self.advance() {
            if self.brace_depth == 0 {
                self.stmt.push(c);
            }
            if c == '\\' {
                if let Some(next) = self.advance() {
                    if self.brace_depth == 0 {
                        self.stmt.push(next);
                    }
                }
            } else if c == quote {
                break;
            }
        }
    }

    /// Consume a preprocessor line, honoring backslash continuations.
    /// Preprocessor lines are not declarations, so they break pairing.
    fn preprocessor_line(&mut self) {
        loop {
            let mut continued = false;
            while let Some(c) = self.advance() {
                if c == '\\' && self.peek() == Some('\n') {
                    continued = true;
                } else if c == '\n' {
                    break;
                } else if !c.is_whitespace() {
                    continued = false;
                }
            }
            if !continued {
                break;
            }
        }
        self.events.push(Event::Code);
    }

    /// Classify the accumulated top-level statement and reset the buffer
    fn end_statement(&mut self) {
        let line = self.stmt_line.take().unwrap_or(self.line);
        let stmt = std::mem::take(&mut self.stmt);
        if stmt.trim().is_empty() {
            return;
        }
        match parse_decl(&stmt, line) {
            Some(decl) => self.events.push(Event::Decl(decl)),
            None => self.events.push(Event::Code),
        }
    }
}

fn is_directive_body(text: &str) -> bool {
    match text.strip_prefix('!').and_then(|t| t.strip_prefix(DIRECTIVE_MARKER)) {
        Some(rest) => rest.is_empty() || rest.starts_with(char::is_whitespace),
        None => false,
    }
}

// ============================================================================
// DECLARATION SHAPE MATCHING
// ============================================================================

/// Words that cannot be a function name; filters out struct definitions,
/// typedefs, and similar constructs that still contain parentheses.
const TYPE_KEYWORDS: &[&str] = &[
    "void", "int", "char", "long", "short", "float", "double", "unsigned", "signed", "struct",
    "union", "enum", "const", "volatile", "typedef", "static", "inline", "extern", "register",
    "return", "sizeof", "if", "while", "for", "switch", "do",
];

/// Storage-class words stripped before the return kind is read
const QUALIFIERS: &[&str] = &["static", "inline", "extern"];

/// Try to read `return-kind name ( params )` out of one top-level statement
fn parse_decl(stmt: &str, line: usize) -> Option<FunctionDecl> {
    let open = stmt.find('(')?;

    // Matching close paren for the parameter list
    let bytes = stmt.as_bytes();
    let mut depth = 0usize;
    let mut close = None;
    let mut i = open;
    while i < bytes.len() {
        match bytes[i] {
            b'(' => depth += 1,
            b')' => {
                depth -= 1;
                if depth == 0 {
                    close = Some(i);
                    break;
                }
            }
            _ => {}
        }
        i += 1;
    }
    let close = close?;
    let params = stmt[open + 1..close]
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");

    // Head is everything before the parameter list: return tokens + name.
    // Stars may be glued to either side, so space them out first.
    let head = stmt[..open].replace('*', " * ");
    let mut toks: Vec<&str> = head.split_whitespace().collect();

    let name = toks.pop()?;
    if !is_identifier(name) || TYPE_KEYWORDS.contains(&name) {
        return None;
    }
    if toks.is_empty() || toks.first() == Some(&"typedef") {
        return None;
    }

    let ret: Vec<&str> = toks
        .iter()
        .copied()
        .filter(|t| !QUALIFIERS.contains(t))
        .collect();
    if ret.is_empty() || !ret.iter().all(|t| *t == "*" || is_identifier(t)) {
        return None;
    }

    let ret_str = ret.join(" ");
    let return_kind = match ret_str.as_str() {
        "void" => ReturnKind::Void,
        "int" => ReturnKind::Int,
        _ => ReturnKind::Other(ret_str),
    };

    Some(FunctionDecl {
        name: name.to_string(),
        return_kind,
        params,
        line,
    })
}

// ============================================================================
// ENTRY POINT
// ============================================================================

/// Scan one source file's text.
///
/// Produces the file's directive comments (each paired with the declaration
/// that physically follows it, skipping blank lines and other comments) and
/// every top-level declaration. Order is physical order. This stage never
/// errors.
#[tracing::instrument(skip_all, fields(file = %path, source_len = source.len()))]
pub fn scan_source(path: &str, source: &str) -> ScannedFile {
    let events = Scanner::new(source).scan();

    let mut directives = Vec::new();
    let mut decls = Vec::new();
    for (i, event) in events.iter().enumerate() {
        match event {
            Event::Decl(decl) => decls.push(decl.clone()),
            Event::Code => {}
            Event::Directive(comment) => {
                // The following symbol is the next declaration, looking past
                // other directive comments but stopping at any other code.
                let mut following = None;
                for next in &events[i + 1..] {
                    match next {
                        Event::Directive(_) => continue,
                        Event::Decl(decl) => {
                            following = Some(decl.clone());
                            break;
                        }
                        Event::Code => break,
                    }
                }
                directives.push(ScannedDirective {
                    comment: comment.clone(),
                    following,
                });
            }
        }
    }

    tracing::debug!(
        directives = directives.len(),
        decls = decls.len(),
        "scanned file"
    );

    ScannedFile {
        path: path.to_string(),
        default_group: default_group_name(path),
        directives,
        decls,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scan(source: &str) -> ScannedFile {
        scan_source("example.c", source)
    }

    #[test]
    fn recognizes_directive_comments_only() {
        let file = scan("/* plain */\n/*!quipu group foo */\n/*!quipux not ours */\n");
        assert_eq!(file.directives.len(), 1);
        assert_eq!(file.directives[0].comment.text, "!quipu group foo ");
        assert_eq!(file.directives[0].comment.line, 2);
    }

    #[test]
    fn pairs_directive_with_following_function() {
        let file = scan("/*!quipu */\nvoid foobaz(void **state)\n{\n}\n");
        let d = &file.directives[0];
        let decl = d.following.as_ref().unwrap();
        assert_eq!(decl.name, "foobaz");
        assert_eq!(decl.return_kind, ReturnKind::Void);
        assert_eq!(decl.params, "void **state");
        assert_eq!(decl.line, 2);
    }

    #[test]
    fn pairing_skips_blank_lines_and_plain_comments() {
        let file = scan("/*!quipu */\n\n/* explains the test */\n\nint setup_foo(void **state) { return 0; }\n");
        let decl = file.directives[0].following.as_ref().unwrap();
        assert_eq!(decl.name, "setup_foo");
        assert_eq!(decl.return_kind, ReturnKind::Int);
    }

    #[test]
    fn pairing_continues_past_other_directives() {
        let file = scan("/*!quipu group foo */\n/*!quipu */\nvoid t(void **state) {}\n");
        assert_eq!(file.directives.len(), 2);
        assert_eq!(file.directives[0].following.as_ref().unwrap().name, "t");
        assert_eq!(file.directives[1].following.as_ref().unwrap().name, "t");
    }

    #[test]
    fn non_declaration_code_breaks_pairing() {
        let file = scan("/*!quipu */\nint counter = 5;\nvoid t(void **state) {}\n");
        assert!(file.directives[0].following.is_none());
    }

    #[test]
    fn preprocessor_lines_break_pairing() {
        let file = scan("/*!quipu */\n#include <stdio.h>\nvoid t(void **state) {}\n");
        assert!(file.directives[0].following.is_none());
    }

    #[test]
    fn collects_unannotated_declarations() {
        let source = "void foobar(void **state)\n{\n  (void)state;\n}\n\n/*!quipu */\nvoid foobaz(void **state) {}\n";
        let file = scan(source);
        let names: Vec<&str> = file.decls.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["foobar", "foobaz"]);
    }

    #[test]
    fn ignores_directives_inside_function_bodies() {
        let file = scan("void t(void **state)\n{\n  /*!quipu group nope */\n}\n");
        assert!(file.directives.is_empty());
    }

    #[test]
    fn ignores_braces_inside_strings() {
        let file = scan("void t(void **state)\n{\n  puts(\"{\");\n}\n/*!quipu */\nvoid u(void **state) {}\n");
        assert_eq!(file.directives.len(), 1);
        assert_eq!(file.directives[0].following.as_ref().unwrap().name, "u");
    }

    #[test]
    fn prototype_counts_as_declaration() {
        let file = scan("/*!quipu */\nvoid t(void **state);\n");
        assert_eq!(file.directives[0].following.as_ref().unwrap().name, "t");
    }

    #[test]
    fn struct_definitions_are_not_declarations() {
        let file = scan("struct point { int x; int y; };\n");
        assert!(file.decls.is_empty());
    }

    #[test]
    fn typedefs_are_not_declarations() {
        let file = scan("typedef void (*callback)(void **state);\n");
        assert!(file.decls.is_empty());
    }

    #[test]
    fn static_qualifier_is_stripped_from_return_kind() {
        let file = scan("static int helper(void **state) { return 0; }\n");
        assert_eq!(file.decls[0].return_kind, ReturnKind::Int);
    }

    #[test]
    fn pointer_returns_are_other() {
        let file = scan("char *message(void **state);\n");
        assert_eq!(file.decls[0].name, "message");
        assert_eq!(file.decls[0].return_kind, ReturnKind::Other("char *".to_string()));
    }

    #[test]
    fn default_group_is_derived_from_file_stem() {
        assert_eq!(default_group_name("path/to/example.c"), "example");
        assert_eq!(default_group_name("my-tests.c"), "my_tests");
        assert_eq!(default_group_name("1st.c"), "_1st");
    }

    #[test]
    fn directive_without_following_declaration() {
        let file = scan("/*!quipu test foobar */\n");
        assert!(file.directives[0].following.is_none());
    }
}
