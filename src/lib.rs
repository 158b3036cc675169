//! A from-scratch compiler for a small subset of C, targeting textual
//! x86-64 assembly in GAS's Intel-syntax dialect.
//!
//! The pipeline is the classic three-stage one: [`lex::tokenize`] segments
//! the source into a flat token list, [`parse::ParseCtx::parse`] builds a
//! typed AST and a global symbol table from it (type elaboration happens
//! inline, at every node's construction, rather than as a separate pass),
//! and [`codegen::CodegenCtx::generate`] walks the typed AST and the
//! symbol table to emit assembly text. [`compile`] wires the three stages
//! together and is the only entry point most callers need.

pub mod ast;
pub mod codegen;
pub mod diagnostics;
pub mod lex;
pub mod parse;
pub mod span;
pub mod token;
pub mod types;

pub use diagnostics::{CompileError, ErrorKind};
pub use span::Span;

use codegen::CodegenCtx;
use parse::ParseCtx;

/// Compile one translation unit to assembly text.
///
/// `source` must already be NUL-terminated (the lexer's end-of-buffer
/// sentinel); appending a trailing `\n` first, as `src/bin/mcc.rs` does,
/// keeps the last line's diagnostics well-formed even when the input
/// doesn't end in a newline. `filename` is used only for diagnostic
/// rendering, not opened by this function.
pub fn compile(source: &[u8], filename: &str) -> Result<String, CompileError> {
  let toks = tracing::info_span!("tokenize", filename).in_scope(|| lex::tokenize(source))?;

  let mut ctx = ParseCtx::new(source, toks);
  tracing::info_span!("parse", filename).in_scope(|| ctx.parse())?;

  let mut out = Vec::new();
  tracing::info_span!("codegen", filename).in_scope(|| {
    CodegenCtx::new(&mut out).generate(&ctx.globals)
  })?;

  Ok(String::from_utf8(out).expect("generated assembly is always valid UTF-8"))
}

#[cfg(test)]
mod tests {
  use super::*;

  fn compile_ok(src: &str) -> String {
    let mut buf = src.as_bytes().to_vec();
    buf.push(b'\n');
    buf.push(0);
    compile(&buf, "test.c").expect("should compile")
  }

  #[test]
  fn compiles_a_trivial_program() {
    let asm = compile_ok("int main() { return 42; }");
    assert!(asm.contains("main:"));
    assert!(asm.contains("mov rax, 42"));
  }

  #[test]
  fn reports_a_lexical_error_with_a_span() {
    let buf = b"int main() { return \x01; }\n\0".to_vec();
    let err = compile(&buf, "test.c").unwrap_err();
    assert_eq!(err.kind, ErrorKind::Lexical);
  }

  #[test]
  fn reports_a_syntax_error_on_missing_semicolon() {
    let buf = b"int main() { return 0 }\n\0".to_vec();
    let err = compile(&buf, "test.c").unwrap_err();
    assert_eq!(err.kind, ErrorKind::Syntactic);
  }

  #[test]
  fn reports_a_semantic_error_on_assignment_to_a_non_lvalue() {
    let buf = b"int main() { 1 = 2; return 0; }\n\0".to_vec();
    let err = compile(&buf, "test.c").unwrap_err();
    assert_eq!(err.kind, ErrorKind::Semantic);
  }

  #[test]
  fn reports_a_semantic_error_on_undefined_variable() {
    let buf = b"int main() { return x; }\n\0".to_vec();
    let err = compile(&buf, "test.c").unwrap_err();
    assert_eq!(err.kind, ErrorKind::Semantic);
    let rendered = err.render("test.c", &buf);
    assert!(rendered.contains("test.c:1:"));
    assert!(rendered.contains('^'));
  }

  #[test]
  fn compiles_pointers_arrays_and_function_calls() {
    let asm = compile_ok(
      "int add(int a, int b) { return a + b; }\n\
       int main() { int arr[3]; arr[0] = 1; int *p = arr; return add(*p, arr[0]); }",
    );
    assert!(asm.contains("call add"));
  }
}
