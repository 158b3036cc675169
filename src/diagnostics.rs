//! Error taxonomy and `file:line:` + caret rendering.
//!
//! Every error the lexer/parser/codegen can raise on *user* input is a
//! [`CompileError`] value, propagated with `?`. Nothing in this crate calls
//! `std::process::exit` or prints to stderr directly — that's the driver's
//! job (`src/bin/mcc.rs`), which is the only place the process actually
//! terminates. Internal-invariant violations (the kind that indicate a bug
//! in this compiler, not in the user's C) are `panic!`/`debug_assert!`
//! instead, since recovering from them would just print a confusing
//! assembly dump.

use std::fmt;
use std::io;
use thiserror::Error;

use crate::span::Span;

/// A single compiler diagnostic: a taxonomy bucket, a message, and the
/// source location it's anchored to.
#[derive(Debug, Error)]
#[error("{kind}: {message}")]
pub struct CompileError {
  pub kind: ErrorKind,
  pub message: String,
  pub span: Span,
}

/// The four error buckets from the error-handling design: lexical,
/// syntactic, semantic, and internal. Internal mostly covers invariant
/// violations that elsewhere just `panic!`, but I/O failures surfacing
/// through a `Write` sink during codegen are a legitimate, non-panicking
/// case, so this variant is reachable in practice too.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
  Lexical,
  Syntactic,
  Semantic,
  Internal,
}

impl ErrorKind {
  /// Short code tag for grouping in tests and for a stable
  /// `--error-format` story, e.g. `mcc --error-format=short`.
  #[must_use]
  pub fn code(self) -> &'static str {
    match self {
      ErrorKind::Lexical => "E0001",
      ErrorKind::Syntactic => "E0101",
      ErrorKind::Semantic => "E0201",
      ErrorKind::Internal => "E0901",
    }
  }
}

impl fmt::Display for ErrorKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(match self {
      ErrorKind::Lexical => "lexical error",
      ErrorKind::Syntactic => "syntax error",
      ErrorKind::Semantic => "semantic error",
      ErrorKind::Internal => "internal error",
    })
  }
}

impl CompileError {
  #[must_use]
  pub fn lexical(span: Span, message: impl Into<String>) -> Self {
    CompileError { kind: ErrorKind::Lexical, message: message.into(), span }
  }
  #[must_use]
  pub fn syntactic(span: Span, message: impl Into<String>) -> Self {
    CompileError { kind: ErrorKind::Syntactic, message: message.into(), span }
  }
  #[must_use]
  pub fn semantic(span: Span, message: impl Into<String>) -> Self {
    CompileError { kind: ErrorKind::Semantic, message: message.into(), span }
  }
  #[must_use]
  pub fn internal(span: Span, message: impl Into<String>) -> Self {
    CompileError { kind: ErrorKind::Internal, message: message.into(), span }
  }

  /// The stable `E0NNN` tag for this error's bucket.
  #[must_use]
  pub fn code(&self) -> &'static str {
    self.kind.code()
  }

  /// Render as `filename:line: [E0NNN] <message>` followed by the offending
  /// source line and a caret under the exact column, matching the original
  /// `verror_at`/`error_tok` behavior: a prefix, the full line, blank
  /// padding up to the column (prefix width included), then `^ <message>`.
  #[must_use]
  pub fn render(&self, filename: &str, src: &[u8]) -> String {
    let prefix = format!("{filename}:{}: ", self.span.line);
    let line = String::from_utf8_lossy(self.span.line_text(src));
    let pad = " ".repeat(prefix.len() + self.span.col as usize);
    format!("{prefix}{line}\n{pad}^ [{}] {}\n", self.code(), self.message)
  }
}

/// Writing generated assembly to its sink can fail (a full disk, a closed
/// pipe); surface that as an internal diagnostic instead of threading a
/// second error type through `codegen.rs`.
impl From<io::Error> for CompileError {
  fn from(err: io::Error) -> Self {
    CompileError { kind: ErrorKind::Internal, message: err.to_string(), span: Span::default() }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn each_taxonomy_bucket_has_its_own_stable_code() {
    assert_eq!(ErrorKind::Lexical.code(), "E0001");
    assert_eq!(ErrorKind::Syntactic.code(), "E0101");
    assert_eq!(ErrorKind::Semantic.code(), "E0201");
    assert_eq!(ErrorKind::Internal.code(), "E0901");
  }

  #[test]
  fn render_includes_the_error_code() {
    let err = CompileError::semantic(Span::default(), "bad");
    let rendered = err.render("t.c", b"x\n\0");
    assert!(rendered.contains("[E0201]"));
  }
}
