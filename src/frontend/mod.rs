//! Frontend for the quipu generator
//!
//! The frontend recovers structure from annotated C sources in two pure,
//! stateless stages:
//!
//! - `scanner` - locates directive comments and top-level declarations and
//!   pairs each directive with the declaration that follows it
//! - `directive` - parses one directive comment's text into a structured
//!   [`directive::Directive`]
//!
//! `diagnostics` holds the shared error type and source-context rendering.
//! Everything stateful (current default group, symbol resolution, fixture
//! stickiness) lives in the model builder, not here.

pub mod diagnostics;
pub mod directive;
pub mod scanner;

pub use diagnostics::{ErrorKind, GenError};
pub use directive::{Directive, DirectiveKind};
pub use scanner::{FunctionDecl, RawComment, ReturnKind, ScannedDirective, ScannedFile};
