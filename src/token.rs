//! Tokens: the output of the lexer and the input cursor for the parser.

use std::rc::Rc;

use crate::span::Span;
use crate::types::Type;

/// The classification of a single token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
  Ident,
  Punct,
  Keyword,
  Num,
  Str,
  Eof,
}

/// The reserved words that get re-tagged from `Ident` to `Keyword` in a
/// second lexer pass, matching `convert_keywords`.
pub const KEYWORDS: &[&str] =
  &["return", "if", "else", "for", "while", "int", "sizeof", "char"];

/// A single token. Tokens reference bytes of the original source buffer for
/// their spelling (`span.start..span.start+span.len`) rather than copying
/// them, except string literals, whose decoded payload is materially
/// different from the raw spelling (escapes are resolved) and so is stored
/// separately in `str_val`.
#[derive(Debug, Clone)]
pub struct Token {
  pub kind: TokenKind,
  pub span: Span,
  /// Value of a `TK_NUM` token.
  pub val: i64,
  /// Decoded payload of a `TK_STR` token (includes the trailing NUL byte).
  pub str_val: Vec<u8>,
  /// Type attached to a `TK_STR` token: `array of char` sized `len + 1`.
  pub str_ty: Option<Rc<Type>>,
}

impl Token {
  #[must_use]
  pub fn new(kind: TokenKind, span: Span) -> Self {
    Token { kind, span, val: 0, str_val: Vec::new(), str_ty: None }
  }

  /// The raw spelling of this token in `src`.
  #[must_use]
  pub fn text<'a>(&self, src: &'a [u8]) -> &'a [u8] {
    &src[self.span.start..self.span.start + self.span.len]
  }

  /// True if this token's spelling equals `s` exactly (the whole token, not
  /// a prefix) — the Rust analogue of `equal(tok, str)`.
  #[must_use]
  pub fn is(&self, src: &[u8], s: &str) -> bool { self.text(src) == s.as_bytes() }
}
