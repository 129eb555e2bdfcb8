//! Directive grammar for quipu annotation comments
//!
//! Parses one raw comment's text into a structured [`Directive`]. The
//! grammar is flat: an optional kind keyword (`group`, `test`, `setup`,
//! `teardown`), an optional explicit name, then `key:value` attributes or
//! the bare `disabled` flag, all whitespace separated.
//!
//! The parser is stateless; what a directive *means* (which group is
//! current, which declaration it binds to) is decided by the model builder.

use crate::frontend::diagnostics::GenError;
use crate::frontend::scanner::{DIRECTIVE_MARKER, RawComment, is_identifier};

/// Kind keyword of a directive. `Bare` covers directives with no keyword;
/// their role is inferred from context by the model builder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectiveKind {
    Bare,
    Group,
    Test,
    Setup,
    Teardown,
}

impl DirectiveKind {
    fn from_keyword(word: &str) -> Option<Self> {
        match word {
            "group" => Some(DirectiveKind::Group),
            "test" => Some(DirectiveKind::Test),
            "setup" => Some(DirectiveKind::Setup),
            "teardown" => Some(DirectiveKind::Teardown),
            _ => None,
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            DirectiveKind::Bare => "bare",
            DirectiveKind::Group => "group",
            DirectiveKind::Test => "test",
            DirectiveKind::Setup => "setup",
            DirectiveKind::Teardown => "teardown",
        }
    }
}

/// Default timeout for tests that do not set `timeout:<seconds>`
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// A structured directive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directive {
    pub kind: DirectiveKind,
    /// Explicit name, when given
    pub name: Option<String>,
    /// `group:<name>` attribute; attaches a test without changing the
    /// current default group
    pub group: Option<String>,
    /// `setup:<name>` attribute
    pub setup: Option<String>,
    /// `teardown:<name>` attribute
    pub teardown: Option<String>,
    /// `disabled[:<bool>]` attribute
    pub disabled: Option<bool>,
    /// `timeout:<seconds>` attribute
    pub timeout: Option<u64>,
    /// 1-based line of the directive comment
    pub line: usize,
}

impl Directive {
    /// True if any attribute was given. A directive with no kind, no name
    /// and no attributes is "completely bare" and binds purely by context.
    pub fn has_attrs(&self) -> bool {
        self.group.is_some()
            || self.setup.is_some()
            || self.teardown.is_some()
            || self.disabled.is_some()
            || self.timeout.is_some()
    }
}

/// Parse one directive comment into a [`Directive`].
///
/// `comment.text` still carries the marker; the caller does not need to
/// strip it.
pub fn parse_directive(comment: &RawComment, file: &str) -> Result<Directive, GenError> {
    let line = comment.line;
    let body = comment
        .text
        .strip_prefix('!')
        .and_then(|t| t.strip_prefix(DIRECTIVE_MARKER))
        .unwrap_or(&comment.text);

    let mut directive = Directive {
        kind: DirectiveKind::Bare,
        name: None,
        group: None,
        setup: None,
        teardown: None,
        disabled: None,
        timeout: None,
        line,
    };

    let mut tokens = body.split_whitespace().peekable();

    if let Some(&word) = tokens.peek() {
        if let Some(kind) = DirectiveKind::from_keyword(word) {
            directive.kind = kind;
            tokens.next();
        }
    }

    if let Some(&word) = tokens.peek() {
        if !word.contains(':') && word != "disabled" {
            if !is_identifier(word) {
                return Err(GenError::syntax(
                    format!("`{}` is not a valid identifier", word),
                    file,
                    line,
                ));
            }
            directive.name = Some(word.to_string());
            tokens.next();
        }
    }

    for token in tokens {
        parse_attribute(&mut directive, token, file)?;
    }

    check_compatibility(&directive, file)?;
    Ok(directive)
}

fn parse_attribute(directive: &mut Directive, token: &str, file: &str) -> Result<(), GenError> {
    let line = directive.line;

    // `disabled` may appear as a bare flag
    let (key, value) = match token.split_once(':') {
        Some((k, v)) => (k, Some(v)),
        None if token == "disabled" => ("disabled", None),
        None => {
            return Err(GenError::syntax(
                format!("unexpected token `{}`", token),
                file,
                line,
            ));
        }
    };

    match key {
        "group" | "setup" | "teardown" => {
            let value = value.unwrap_or("");
            if !is_identifier(value) {
                return Err(GenError::syntax(
                    format!("attribute `{}` requires an identifier value, got `{}`", key, value),
                    file,
                    line,
                ));
            }
            let slot = match key {
                "group" => &mut directive.group,
                "setup" => &mut directive.setup,
                _ => &mut directive.teardown,
            };
            if slot.is_some() {
                return Err(GenError::syntax(
                    format!("attribute `{}` given more than once", key),
                    file,
                    line,
                ));
            }
            *slot = Some(value.to_string());
        }
        "disabled" => {
            if directive.disabled.is_some() {
                return Err(GenError::syntax(
                    "attribute `disabled` given more than once".to_string(),
                    file,
                    line,
                ));
            }
            directive.disabled = Some(match value {
                None | Some("true") => true,
                Some("false") => false,
                Some(other) => {
                    return Err(GenError::syntax(
                        format!("attribute `disabled` requires `true` or `false`, got `{}`", other),
                        file,
                        line,
                    ));
                }
            });
        }
        "timeout" => {
            if directive.timeout.is_some() {
                return Err(GenError::syntax(
                    "attribute `timeout` given more than once".to_string(),
                    file,
                    line,
                ));
            }
            let value = value.unwrap_or("");
            match value.parse::<u64>() {
                Ok(secs) if secs > 0 => directive.timeout = Some(secs),
                _ => {
                    return Err(GenError::syntax(
                        format!(
                            "attribute `timeout` requires a positive integer number of seconds, got `{}`",
                            value
                        ),
                        file,
                        line,
                    ));
                }
            }
        }
        other => {
            return Err(GenError::syntax(
                format!("unknown attribute `{}`", other),
                file,
                line,
            ));
        }
    }

    Ok(())
}

/// Reject attribute combinations the directive kind does not accept
fn check_compatibility(directive: &Directive, file: &str) -> Result<(), GenError> {
    let line = directive.line;
    match directive.kind {
        DirectiveKind::Group => {
            if directive.name.is_none() {
                return Err(GenError::syntax(
                    "group directive requires a name".to_string(),
                    file,
                    line,
                ));
            }
            let incompatible = [
                ("group", directive.group.is_some()),
                ("disabled", directive.disabled.is_some()),
                ("timeout", directive.timeout.is_some()),
            ];
            for (key, present) in incompatible {
                if present {
                    return Err(GenError::syntax(
                        format!("attribute `{}` is not valid on a group directive", key),
                        file,
                        line,
                    ));
                }
            }
        }
        DirectiveKind::Setup | DirectiveKind::Teardown => {
            if directive.has_attrs() {
                return Err(GenError::syntax(
                    format!(
                        "attributes are not valid on a {} directive",
                        directive.kind.as_str()
                    ),
                    file,
                    line,
                ));
            }
        }
        DirectiveKind::Test | DirectiveKind::Bare => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> Result<Directive, GenError> {
        let comment = RawComment {
            line: 1,
            end_line: 1,
            text: format!("!quipu {}", text),
        };
        parse_directive(&comment, "example.c")
    }

    #[test]
    fn completely_bare() {
        let d = parse("").unwrap();
        assert_eq!(d.kind, DirectiveKind::Bare);
        assert!(d.name.is_none());
        assert!(!d.has_attrs());
    }

    #[test]
    fn group_with_name() {
        let d = parse("group foo").unwrap();
        assert_eq!(d.kind, DirectiveKind::Group);
        assert_eq!(d.name.as_deref(), Some("foo"));
    }

    #[test]
    fn group_with_fixtures() {
        let d = parse("group foo setup:setup_foo teardown:teardown_foo").unwrap();
        assert_eq!(d.setup.as_deref(), Some("setup_foo"));
        assert_eq!(d.teardown.as_deref(), Some("teardown_foo"));
    }

    #[test]
    fn group_requires_name() {
        assert!(parse("group").is_err());
        assert!(parse("group setup:x").is_err());
    }

    #[test]
    fn test_with_explicit_name() {
        let d = parse("test foobar").unwrap();
        assert_eq!(d.kind, DirectiveKind::Test);
        assert_eq!(d.name.as_deref(), Some("foobar"));
    }

    #[test]
    fn group_attribute_form() {
        let d = parse("group:baz").unwrap();
        assert_eq!(d.kind, DirectiveKind::Bare);
        assert_eq!(d.group.as_deref(), Some("baz"));
        assert!(d.name.is_none());
    }

    #[test]
    fn setup_kind_with_name() {
        let d = parse("setup setup_bar").unwrap();
        assert_eq!(d.kind, DirectiveKind::Setup);
        assert_eq!(d.name.as_deref(), Some("setup_bar"));
    }

    #[test]
    fn per_test_options() {
        let d = parse("setup:sb teardown:tb disabled:true timeout:30").unwrap();
        assert_eq!(d.setup.as_deref(), Some("sb"));
        assert_eq!(d.teardown.as_deref(), Some("tb"));
        assert_eq!(d.disabled, Some(true));
        assert_eq!(d.timeout, Some(30));
    }

    #[test]
    fn disabled_bare_flag() {
        let d = parse("disabled").unwrap();
        assert_eq!(d.disabled, Some(true));
    }

    #[test]
    fn disabled_false() {
        let d = parse("disabled:false").unwrap();
        assert_eq!(d.disabled, Some(false));
    }

    #[test]
    fn rejects_unknown_attribute() {
        assert!(parse("colour:red").is_err());
    }

    #[test]
    fn rejects_malformed_disabled() {
        assert!(parse("disabled:maybe").is_err());
    }

    #[test]
    fn rejects_bad_timeout() {
        assert!(parse("timeout:0").is_err());
        assert!(parse("timeout:-3").is_err());
        assert!(parse("timeout:soon").is_err());
    }

    #[test]
    fn rejects_attrs_on_fixture_kinds() {
        assert!(parse("setup name teardown:x").is_err());
        assert!(parse("teardown name disabled").is_err());
    }

    #[test]
    fn rejects_timeout_on_group() {
        assert!(parse("group foo timeout:5").is_err());
    }

    #[test]
    fn rejects_duplicate_attribute() {
        assert!(parse("setup:a setup:b").is_err());
    }

    #[test]
    fn rejects_stray_tokens() {
        assert!(parse("test foo bar").is_err());
        assert!(parse("gr@up foo").is_err());
    }
}
