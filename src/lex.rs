//! Lexer: byte stream to token list.
//!
//! `tokenize` is a straight transcription of the segmentation priority
//! order from the component design: comments, whitespace, numbers, string
//! literals, identifiers, punctuators, in that order, with keyword
//! re-tagging as a second pass at the end.

use crate::diagnostics::CompileError;
use crate::span::Span;
use crate::token::{Token, TokenKind, KEYWORDS};
use crate::types::array_of;
use crate::types::ty_char;

/// Tokenize `src`, a NUL-terminated buffer (the caller is expected to have
/// appended `\n\0`, per the external-interface contract). The returned
/// vector always ends with exactly one `Eof` token.
pub fn tokenize(src: &[u8]) -> Result<Vec<Token>, CompileError> {
  let mut out = Vec::new();
  let mut p = 0usize;

  while p < src.len() && src[p] != 0 {
    let c = src[p];

    // 1. Line comment.
    if c == b'/' && src.get(p + 1) == Some(&b'/') {
      while p < src.len() && src[p] != b'\n' {
        p += 1;
      }
      continue;
    }

    // 2. Block comment.
    if c == b'/' && src.get(p + 1) == Some(&b'*') {
      let start = p;
      p += 2;
      loop {
        if p + 1 >= src.len() || src[p] == 0 {
          let span = Span::compute(src, start, 2);
          return Err(CompileError::lexical(span, "unterminated block comment"));
        }
        if src[p] == b'*' && src[p + 1] == b'/' {
          p += 2;
          break;
        }
        p += 1;
      }
      continue;
    }

    // 3. Whitespace.
    if c.is_ascii_whitespace() {
      p += 1;
      continue;
    }

    // 4. Numeric literal.
    if c.is_ascii_digit() {
      let start = p;
      let mut val: i64 = 0;
      while p < src.len() && src[p].is_ascii_digit() {
        val = val * 10 + i64::from(src[p] - b'0');
        p += 1;
      }
      let span = Span::compute(src, start, p - start);
      let mut tok = Token::new(TokenKind::Num, span);
      tok.val = val;
      out.push(tok);
      continue;
    }

    // 5. String literal.
    if c == b'"' {
      let (tok, new_p) = read_string_literal(src, p)?;
      out.push(tok);
      p = new_p;
      continue;
    }

    // 6. Identifier.
    if is_ident1(c) {
      let start = p;
      p += 1;
      while p < src.len() && is_ident2(src[p]) {
        p += 1;
      }
      let span = Span::compute(src, start, p - start);
      out.push(Token::new(TokenKind::Ident, span));
      continue;
    }

    // 7. Punctuator.
    if let Some(len) = read_punct(src, p) {
      let span = Span::compute(src, p, len);
      out.push(Token::new(TokenKind::Punct, span));
      p += len;
      continue;
    }

    // 8. Otherwise: invalid token.
    let span = Span::compute(src, p, 1);
    return Err(CompileError::lexical(span, "invalid token"));
  }

  out.push(Token::new(TokenKind::Eof, Span::compute(src, p, 0)));
  convert_keywords(&mut out, src);
  Ok(out)
}

fn is_ident1(c: u8) -> bool { c.is_ascii_alphabetic() || c == b'_' }
fn is_ident2(c: u8) -> bool { is_ident1(c) || c.is_ascii_digit() }

/// Multi-byte operators take precedence over their single-byte prefixes.
fn read_punct(src: &[u8], p: usize) -> Option<usize> {
  for op in ["==", "!=", "<=", ">="] {
    if src[p..].starts_with(op.as_bytes()) {
      return Some(2);
    }
  }
  if src[p].is_ascii_punctuation() { Some(1) } else { None }
}

fn from_hex(c: u8) -> u32 {
  match c {
    b'0'..=b'9' => u32::from(c - b'0'),
    b'a'..=b'f' => u32::from(c - b'a') + 10,
    b'A'..=b'F' => u32::from(c - b'A') + 10,
    _ => unreachable!("caller checked is_ascii_hexdigit"),
  }
}

/// Decode one escape sequence starting just after the backslash at `p`.
/// Returns the decoded byte and the position just past the sequence.
fn read_escaped_char(src: &[u8], p: usize) -> Result<(u8, usize), CompileError> {
  let c = src[p];
  if (b'0'..=b'7').contains(&c) {
    let mut val = u32::from(c - b'0');
    let mut q = p + 1;
    for _ in 0..2 {
      if q < src.len() && (b'0'..=b'7').contains(&src[q]) {
        val = (val << 3) + u32::from(src[q] - b'0');
        q += 1;
      } else {
        break;
      }
    }
    return Ok((val as u8, q));
  }
  if c == b'x' {
    let mut q = p + 1;
    if q >= src.len() || !src[q].is_ascii_hexdigit() {
      let span = Span::compute(src, p, 1);
      return Err(CompileError::lexical(span, "invalid hex escape sequence"));
    }
    let mut val: u32 = 0;
    while q < src.len() && src[q].is_ascii_hexdigit() {
      val = (val << 4) + from_hex(src[q]);
      q += 1;
    }
    return Ok((val as u8, q));
  }
  let decoded = match c {
    b'a' => 0x07, b'b' => 0x08, b't' => b'\t', b'n' => b'\n',
    b'v' => 0x0b, b'f' => 0x0c, b'r' => b'\r', b'e' => 0x1b,
    other => other,
  };
  Ok((decoded, p + 1))
}

/// Find the closing `"` of a string literal starting at `start` (the index
/// of the opening quote). `\` escapes the next byte unconditionally, even
/// a literal `"` or `\`.
fn string_literal_end(src: &[u8], start: usize) -> Result<usize, CompileError> {
  let mut p = start + 1;
  loop {
    if p >= src.len() || src[p] == 0 || src[p] == b'\n' {
      let span = Span::compute(src, start, 1);
      return Err(CompileError::lexical(span, "unclosed string literal"));
    }
    if src[p] == b'"' {
      return Ok(p);
    }
    if src[p] == b'\\' {
      p += 1;
    }
    p += 1;
  }
}

fn read_string_literal(src: &[u8], start: usize) -> Result<(Token, usize), CompileError> {
  let end = string_literal_end(src, start)?;
  let mut buf = Vec::new();
  let mut p = start + 1;
  while p < end {
    if src[p] == b'\\' {
      let (byte, next) = read_escaped_char(src, p + 1)?;
      buf.push(byte);
      p = next;
    } else {
      buf.push(src[p]);
      p += 1;
    }
  }
  buf.push(0);
  let span = Span::compute(src, start, end + 1 - start);
  let mut tok = Token::new(TokenKind::Str, span);
  let len = buf.len();
  tok.str_ty = Some(array_of(ty_char(), len));
  tok.str_val = buf;
  Ok((tok, end + 1))
}

fn convert_keywords(toks: &mut [Token], src: &[u8]) {
  for tok in toks.iter_mut() {
    if tok.kind != TokenKind::Ident {
      continue;
    }
    let text = tok.text(src);
    if KEYWORDS.iter().any(|kw| kw.as_bytes() == text) {
      tok.kind = TokenKind::Keyword;
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn lex(src: &str) -> Vec<Token> {
    let mut buf = src.as_bytes().to_vec();
    if !buf.ends_with(b"\n") {
      buf.push(b'\n');
    }
    buf.push(0);
    tokenize(&buf).expect("tokenize should succeed")
  }

  #[test]
  fn round_trips_spelling() {
    let buf = b"int x123 = 42;\0".to_vec();
    let toks = tokenize(&buf).unwrap();
    let spellings: Vec<&[u8]> = toks.iter().map(|t| t.text(&buf)).collect();
    assert_eq!(spellings[0], b"int");
    assert_eq!(spellings[1], b"x123");
    assert_eq!(spellings[2], b"=");
    assert_eq!(spellings[3], b"42");
    assert_eq!(spellings[4], b";");
    assert_eq!(toks.last().unwrap().kind, TokenKind::Eof);
  }

  #[test]
  fn keywords_are_retagged() {
    let toks = lex("return if else for while int sizeof char foo");
    for t in &toks[..8] {
      assert_eq!(t.kind, TokenKind::Keyword);
    }
    assert_eq!(toks[8].kind, TokenKind::Ident);
  }

  #[test]
  fn multi_byte_punctuators_win() {
    let toks = lex("a == b != c <= d >= e");
    let ops: Vec<usize> = toks.iter().filter(|t| t.kind == TokenKind::Punct).map(|t| t.span.len).collect();
    assert_eq!(ops, vec![2, 2, 2, 2]);
  }

  #[test]
  fn string_literal_decodes_escapes() {
    let buf = b"\"a\\nb\\x41\\101\"\0".to_vec();
    let toks = tokenize(&buf).unwrap();
    assert_eq!(toks[0].kind, TokenKind::Str);
    assert_eq!(toks[0].str_val, vec![b'a', b'\n', b'b', b'A', b'A', 0]);
  }

  #[test]
  fn unterminated_string_is_an_error() {
    let buf = b"\"abc\0".to_vec();
    assert!(tokenize(&buf).is_err());
  }

  #[test]
  fn line_and_block_comments_are_skipped() {
    let toks = lex("// comment\nint /* inline */ x;");
    let kinds: Vec<_> = toks.iter().map(|t| t.kind).collect();
    assert_eq!(kinds, vec![
      TokenKind::Keyword, TokenKind::Ident, TokenKind::Punct, TokenKind::Eof,
    ]);
  }
}
