//! Code generator: typed AST to x86-64 assembly text.
//!
//! Follows the component design exactly: a single evaluation register
//! (`rax`), a runtime stack for intermediate operands, and a `depth`
//! counter that must return to zero after every statement. Every emitting
//! method writes directly to the `impl Write` sink handed to [`generate`];
//! nothing is buffered in memory first.

use std::cell::RefCell;
use std::io::{self, Write};
use std::rc::Rc;

use crate::ast::{Node, NodeKind, Obj};
use crate::diagnostics::CompileError;
use crate::types::Type;

const FUNCTION_ALIGN: i32 = 16;

fn align_to(n: i32, align: i32) -> i32 { (n + align - 1) / align * align }

const ARG_REG64: [&str; 6] = ["rdi", "rsi", "rdx", "rcx", "r8", "r9"];
const ARG_REG8: [&str; 6] = ["dil", "sil", "dl", "cl", "r8b", "r9b"];

/// Per-compilation codegen state: the label-id and depth counters that the
/// source keeps as file-scope `static`s, here scoped to one `CodegenCtx`
/// instance instead (see the port's mutable-globals decision in DESIGN.md).
pub struct CodegenCtx<'w, W: Write> {
  out: &'w mut W,
  depth: i64,
  label_id: u32,
  current_fn: String,
}

impl<'w, W: Write> CodegenCtx<'w, W> {
  #[must_use]
  pub fn new(out: &'w mut W) -> Self {
    CodegenCtx { out, depth: 0, label_id: 1, current_fn: String::new() }
  }

  fn emit(&mut self, args: std::fmt::Arguments<'_>) -> io::Result<()> {
    self.out.write_fmt(args)?;
    self.out.write_all(b"\n")
  }

  fn push(&mut self) -> io::Result<()> {
    self.depth += 1;
    self.emit(format_args!("  push rax"))
  }

  fn pop(&mut self, reg: &str) -> io::Result<()> {
    self.depth -= 1;
    self.emit(format_args!("  pop {reg}"))
  }

  fn count(&mut self) -> u32 {
    let id = self.label_id;
    self.label_id += 1;
    id
  }

  /// Generate the address of an lvalue into `rax`.
  fn gen_addr(&mut self, node: &Node) -> Result<(), CompileError> {
    match node.kind {
      NodeKind::Var => {
        let var = node.var.as_ref().expect("Var node always has a binding");
        let var = var.borrow();
        if var.is_local {
          Ok(self.emit(format_args!("  lea rax, [rbp-{}]", var.offset))?)
        } else {
          Ok(self.emit(format_args!("  lea rax, {}[rip]", var.name))?)
        }
      }
      NodeKind::Deref => self.gen_expr(node.lhs.as_ref().expect("Deref node always has lhs")),
      _ => Err(CompileError::semantic(node.tok.span, "not an lvalue")),
    }
  }

  /// Load the value addressed by `rax` according to `ty`, leaving the
  /// result in `rax`. Arrays decay: the address already in `rax` IS the
  /// value, so nothing is emitted.
  fn load(&mut self, ty: &Type) -> Result<(), CompileError> {
    if matches!(ty, Type::Array(..)) {
      return Ok(());
    }
    if ty.size() == 1 {
      Ok(self.emit(format_args!("  movsx rax, BYTE PTR [rax]"))?)
    } else {
      Ok(self.emit(format_args!("  mov rax, [rax]"))?)
    }
  }

  /// Store `rax` into the address on top of the runtime stack, popped into
  /// `rdi`.
  fn store(&mut self, ty: &Type) -> Result<(), CompileError> {
    self.pop("rdi")?;
    if ty.size() == 1 {
      Ok(self.emit(format_args!("  mov [rdi], al"))?)
    } else {
      Ok(self.emit(format_args!("  mov [rdi], rax"))?)
    }
  }

  fn gen_expr(&mut self, node: &Node) -> Result<(), CompileError> {
    match node.kind {
      NodeKind::Num => return Ok(self.emit(format_args!("  mov rax, {}", node.val))?),
      NodeKind::Neg => {
        self.gen_expr(node.lhs.as_ref().expect("Neg has lhs"))?;
        return Ok(self.emit(format_args!("  neg rax"))?);
      }
      NodeKind::Var | NodeKind::Deref => {
        self.gen_addr(node)?;
        return self.load(node.ty.as_ref().expect("typed node"));
      }
      NodeKind::Addr => return self.gen_addr(node.lhs.as_ref().expect("Addr has lhs")),
      NodeKind::Assign => {
        self.gen_addr(node.lhs.as_ref().expect("Assign has lhs"))?;
        self.push()?;
        self.gen_expr(node.rhs.as_ref().expect("Assign has rhs"))?;
        return self.store(node.ty.as_ref().expect("typed node"));
      }
      NodeKind::Funcall => return self.gen_funcall(node),
      NodeKind::Add | NodeKind::Sub | NodeKind::Mul | NodeKind::Div
      | NodeKind::Eq | NodeKind::Ne | NodeKind::Lt | NodeKind::Le => {}
      other @ (NodeKind::Return | NodeKind::If | NodeKind::For | NodeKind::Block | NodeKind::ExprStmt) =>
        unreachable!("not an expression kind: {other:?}"),
    }

    let rhs = node.rhs.as_ref().expect("binary node has rhs");
    let lhs = node.lhs.as_ref().expect("binary node has lhs");
    self.gen_expr(rhs)?;
    self.push()?;
    self.gen_expr(lhs)?;
    self.pop("rdi")?;

    Ok(match node.kind {
      NodeKind::Add => self.emit(format_args!("  add rax, rdi"))?,
      NodeKind::Sub => self.emit(format_args!("  sub rax, rdi"))?,
      NodeKind::Mul => self.emit(format_args!("  imul rax, rdi"))?,
      NodeKind::Div => {
        self.emit(format_args!("  cqo"))?;
        self.emit(format_args!("  idiv rdi"))?
      }
      NodeKind::Eq | NodeKind::Ne | NodeKind::Lt | NodeKind::Le => {
        self.emit(format_args!("  cmp rax, rdi"))?;
        let set = match node.kind {
          NodeKind::Eq => "sete", NodeKind::Ne => "setne",
          NodeKind::Lt => "setl", NodeKind::Le => "setle",
          _ => unreachable!(),
        };
        self.emit(format_args!("  {set} al"))?;
        self.emit(format_args!("  movzb rax, al"))?
      }
      _ => unreachable!("unhandled binary node kind {:?}", node.kind),
    })
  }

  /// Evaluate each argument left to right, pushing it onto the runtime
  /// stack, then pop them off (last pushed first) into the calling
  /// convention's argument registers in reverse index order. Net effect:
  /// `argreg64[i]` ends up holding `args[i]`.
  fn gen_funcall(&mut self, node: &Node) -> Result<(), CompileError> {
    for arg in &node.args {
      self.gen_expr(arg)?;
      self.push()?;
    }
    for i in (0..node.args.len()).rev() {
      self.pop(ARG_REG64[i])?;
    }
    self.emit(format_args!("  mov rax, 0"))?;
    Ok(self.emit(format_args!("  call {}", node.funcname))?)
  }

  /// Generate a statement. Asserts `depth == 0` on exit: every `push` at
  /// the expression level must be matched by a `pop` before the enclosing
  /// statement ends.
  fn gen_stmt(&mut self, node: &Node) -> Result<(), CompileError> {
    match node.kind {
      NodeKind::If => {
        let c = self.count();
        self.gen_expr(node.cond.as_ref().expect("If has cond"))?;
        self.emit(format_args!("  cmp rax, 0"))?;
        self.emit(format_args!("  je .L.else.{c}"))?;
        self.gen_stmt(node.then.as_ref().expect("If has then"))?;
        self.emit(format_args!("  jmp .L.end.{c}"))?;
        self.emit(format_args!(".L.else.{c}:"))?;
        if let Some(els) = &node.els {
          self.gen_stmt(els)?;
        }
        self.emit(format_args!(".L.end.{c}:"))?;
      }
      NodeKind::For => {
        let c = self.count();
        if let Some(init) = &node.init {
          self.gen_stmt(init)?;
        }
        self.emit(format_args!(".L.begin.{c}:"))?;
        if let Some(cond) = &node.cond {
          self.gen_expr(cond)?;
          self.emit(format_args!("  cmp rax, 0"))?;
          self.emit(format_args!("  je .L.end.{c}"))?;
        }
        self.gen_stmt(node.then.as_ref().expect("For has then"))?;
        if let Some(inc) = &node.inc {
          self.gen_expr(inc)?;
        }
        self.emit(format_args!("  jmp .L.begin.{c}"))?;
        self.emit(format_args!(".L.end.{c}:"))?;
      }
      NodeKind::Block => {
        let mut cur = node.body.as_deref();
        while let Some(n) = cur {
          self.gen_stmt(n)?;
          cur = n.next.as_deref();
        }
      }
      NodeKind::Return => {
        self.gen_expr(node.lhs.as_ref().expect("Return has lhs"))?;
        self.emit(format_args!("  jmp .L.return.{}", self.current_fn))?;
      }
      NodeKind::ExprStmt => {
        self.gen_expr(node.lhs.as_ref().expect("ExprStmt has lhs"))?;
      }
      other => unreachable!("not a statement kind: {other:?}"),
    }
    debug_assert_eq!(self.depth, 0, "push/pop imbalance after statement");
    Ok(())
  }

  /// Assign a frame offset to every local (iterating `fn.locals` in the
  /// order the parser accumulated them) and round the total up to 16
  /// bytes.
  fn assign_lvar_offsets(func: &Obj) -> i32 {
    let mut offset = 0;
    for local in &func.locals {
      let mut l = local.borrow_mut();
      offset += l.ty.size() as i32;
      l.offset = offset;
    }
    align_to(offset, FUNCTION_ALIGN)
  }

  fn gen_function(&mut self, func: &Rc<RefCell<Obj>>) -> Result<(), CompileError> {
    let stack_size = Self::assign_lvar_offsets(&func.borrow());
    func.borrow_mut().stack_size = stack_size;

    let f = func.borrow();
    let name = f.name.clone();
    let params_desc: Vec<(i32, usize, usize)> = f.params.iter().enumerate()
      .map(|(i, p)| { let p = p.borrow(); (p.offset, p.ty.size(), i) })
      .collect();

    self.current_fn.clone_from(&name);
    self.emit(format_args!(".globl {name}"))?;
    self.emit(format_args!(".text"))?;
    self.emit(format_args!("{name}:"))?;

    self.emit(format_args!("  push rbp"))?;
    self.emit(format_args!("  mov rbp, rsp"))?;
    self.emit(format_args!("  sub rsp, {stack_size}"))?;

    for (offset, size, i) in params_desc {
      if size == 1 {
        self.emit(format_args!("  mov [rbp-{offset}], {}", ARG_REG8[i]))?;
      } else {
        self.emit(format_args!("  mov [rbp-{offset}], {}", ARG_REG64[i]))?;
      }
    }

    let body = f.body.as_ref().expect("function object always has a body");
    self.gen_stmt(body)?;
    debug_assert_eq!(self.depth, 0, "push/pop imbalance at end of function body");
    drop(f);

    self.emit(format_args!(".L.return.{name}:"))?;
    self.emit(format_args!("  mov rsp, rbp"))?;
    self.emit(format_args!("  pop rbp"))?;
    Ok(self.emit(format_args!("  ret"))?)
  }

  fn gen_data(&mut self, global: &Obj) -> Result<(), CompileError> {
    self.emit(format_args!(".data"))?;
    self.emit(format_args!(".globl {}", global.name))?;
    self.emit(format_args!("{}:", global.name))?;
    if let Some(data) = &global.init_data {
      for &byte in data {
        self.emit(format_args!("  .byte {byte}"))?;
      }
    } else {
      self.emit(format_args!("  .zero {}", global.ty.size()))?;
    }
    Ok(())
  }

  /// Emit the whole program: header, then each global's data, then each
  /// function's code, in the order the parser produced them.
  pub fn generate(&mut self, globals: &[Rc<RefCell<Obj>>]) -> Result<(), CompileError> {
    self.emit(format_args!(".intel_syntax noprefix"))?;
    for g in globals {
      if !g.borrow().is_function {
        self.gen_data(&g.borrow())?;
      }
    }
    for g in globals {
      if g.borrow().is_function {
        self.gen_function(g)?;
      }
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::diagnostics::{CompileError, ErrorKind};
  use crate::lex::tokenize;
  use crate::parse::ParseCtx;

  fn codegen(src: &str) -> Result<String, CompileError> {
    let mut buf = src.as_bytes().to_vec();
    buf.push(b'\n');
    buf.push(0);
    let toks = tokenize(&buf)?;
    let mut ctx = ParseCtx::new(&buf, toks);
    ctx.parse()?;
    let mut out = Vec::new();
    CodegenCtx::new(&mut out).generate(&ctx.globals)?;
    Ok(String::from_utf8(out).expect("assembly text is always ASCII"))
  }

  #[test]
  fn emits_intel_syntax_header() {
    let asm = codegen("int main() { return 0; }").unwrap();
    assert!(asm.starts_with(".intel_syntax noprefix\n"));
  }

  #[test]
  fn function_prologue_reserves_aligned_frame() {
    let asm = codegen("int main() { int a; int b; return 0; }").unwrap();
    assert!(asm.contains("sub rsp, 16"));
  }

  #[test]
  fn return_jumps_to_the_function_epilogue_label() {
    let asm = codegen("int main() { return 1; }").unwrap();
    assert!(asm.contains(".L.return.main:"));
    assert!(asm.contains("jmp .L.return.main"));
  }

  #[test]
  fn global_data_section_precedes_function_text() {
    let asm = codegen("int g; int main() { return g; }").unwrap();
    let data_pos = asm.find(".data").unwrap();
    let text_pos = asm.find(".text").unwrap();
    assert!(data_pos < text_pos);
  }

  #[test]
  fn string_literal_emits_byte_directives() {
    let asm = codegen("int main() { char *p = \"hi\"; return 0; }").unwrap();
    assert!(asm.contains(".byte 104"));
    assert!(asm.contains(".byte 105"));
    assert!(asm.contains(".byte 0"));
  }

  #[test]
  fn assigning_to_a_non_lvalue_is_a_semantic_error_not_a_panic() {
    let err = codegen("int main() { 1 = 2; return 0; }").unwrap_err();
    assert_eq!(err.kind, ErrorKind::Semantic);
    assert_eq!(err.message, "not an lvalue");
  }

  #[test]
  fn taking_the_address_of_a_non_lvalue_is_a_semantic_error() {
    let err = codegen("int main() { return *&1; }").unwrap_err();
    assert_eq!(err.kind, ErrorKind::Semantic);
  }
}
