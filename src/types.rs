//! The C type system: kinds, sizes, constructors, and the `add_type`
//! propagation pass over the AST.

use std::rc::Rc;

use crate::ast::{Node, NodeKind};
use crate::diagnostics::CompileError;

/// A C type. `Int` and `Char` are the only kinds with no `base`; `Ptr` and
/// `Array` always carry one (their element/pointee type). `Func` carries a
/// return type and an ordered parameter list, populated by the parser as it
/// walks a declarator's parameter list.
#[derive(Debug, Clone)]
pub enum Type {
  Int,
  Char,
  Ptr(Rc<Type>),
  Array(Rc<Type>, usize),
  Func { return_ty: Rc<Type>, params: Vec<Rc<Type>> },
}

impl Type {
  /// Storage size in bytes. Function types have no storage size; callers
  /// that need `size` on a function type have a bug, so this panics rather
  /// than returning a sentinel (mirroring the `ty->size` access discipline
  /// in the original, where `TY_FUNC` values never flow into `sizeof`).
  #[must_use]
  pub fn size(&self) -> usize {
    match self {
      Type::Int => 8,
      Type::Char => 1,
      Type::Ptr(_) => 8,
      Type::Array(base, len) => base.size() * len,
      Type::Func { .. } => panic!("function type has no size"),
    }
  }

  /// The element/pointee type, for types for which indexing/dereferencing
  /// make sense. This is `is_pointer_like` from the spec: both pointers and
  /// arrays satisfy it, which is exactly why `a[i]` can desugar through the
  /// same `+`-scaling logic as raw pointer arithmetic.
  #[must_use]
  pub fn base(&self) -> Option<&Rc<Type>> {
    match self {
      Type::Ptr(b) | Type::Array(b, _) => Some(b),
      _ => None,
    }
  }

  #[must_use]
  pub fn is_integer(&self) -> bool { matches!(self, Type::Int | Type::Char) }

  #[must_use]
  pub fn is_func(&self) -> bool { matches!(self, Type::Func { .. }) }
}

/// `int`, allocated once per compilation and cheaply cloned via `Rc`.
#[must_use]
pub fn ty_int() -> Rc<Type> { Rc::new(Type::Int) }

/// `char`, allocated once per compilation and cheaply cloned via `Rc`.
#[must_use]
pub fn ty_char() -> Rc<Type> { Rc::new(Type::Char) }

#[must_use]
pub fn pointer_to(base: Rc<Type>) -> Rc<Type> { Rc::new(Type::Ptr(base)) }

#[must_use]
pub fn array_of(base: Rc<Type>, len: usize) -> Rc<Type> { Rc::new(Type::Array(base, len)) }

#[must_use]
pub fn func_type(return_ty: Rc<Type>, params: Vec<Rc<Type>>) -> Rc<Type> {
  Rc::new(Type::Func { return_ty, params })
}

/// Annotate `node` and its subtrees with a [`Type`], bottom-up. Idempotent:
/// a node that already has a type is left alone, matching `add_type`'s
/// `if (!node || node->ty) return;` guard — this lets the parser call it
/// eagerly from every `new_binary`/`new_unary`/`new_num`/`new_var_node`
/// constructor without worrying about double work.
pub fn add_type(node: &mut Node) -> Result<(), CompileError> {
  if node.ty.is_some() {
    return Ok(());
  }
  if let Some(lhs) = node.lhs.as_deref_mut() {
    add_type(lhs)?;
  }
  if let Some(rhs) = node.rhs.as_deref_mut() {
    add_type(rhs)?;
  }
  if let Some(cond) = node.cond.as_deref_mut() {
    add_type(cond)?;
  }
  if let Some(then) = node.then.as_deref_mut() {
    add_type(then)?;
  }
  if let Some(els) = node.els.as_deref_mut() {
    add_type(els)?;
  }
  if let Some(init) = node.init.as_deref_mut() {
    add_type(init)?;
  }
  if let Some(inc) = node.inc.as_deref_mut() {
    add_type(inc)?;
  }
  let mut stmt = node.body.as_deref_mut();
  while let Some(n) = stmt {
    add_type(n)?;
    stmt = n.next.as_deref_mut();
  }
  for arg in &mut node.args {
    add_type(arg)?;
  }

  node.ty = Some(match &node.kind {
    NodeKind::Add | NodeKind::Sub | NodeKind::Mul | NodeKind::Div | NodeKind::Neg | NodeKind::Assign =>
      node.lhs.as_ref().expect("binary/unary node missing lhs").ty.clone().expect("lhs untyped"),
    NodeKind::Eq | NodeKind::Ne | NodeKind::Lt | NodeKind::Le | NodeKind::Num | NodeKind::Funcall =>
      ty_int(),
    NodeKind::Var => node.var.as_ref().expect("var node missing binding").borrow().ty.clone(),
    NodeKind::Addr => {
      let lhs_ty = node.lhs.as_ref().expect("addr node missing lhs").ty.clone().expect("lhs untyped");
      match &*lhs_ty {
        // &array decays to a pointer to the element type, so &a and a
        // index identically — this is the "array/pointer unification".
        Type::Array(base, _) => pointer_to(base.clone()),
        _ => pointer_to(lhs_ty),
      }
    }
    NodeKind::Deref => {
      let lhs_ty = node.lhs.as_ref().expect("deref node missing lhs").ty.clone().expect("lhs untyped");
      match lhs_ty.base() {
        Some(base) => base.clone(),
        None => return Err(CompileError::semantic(node.tok.span, "invalid pointer dereference")),
      }
    }
    NodeKind::Return | NodeKind::If | NodeKind::For | NodeKind::Block | NodeKind::ExprStmt => return Ok(()),
  });
  Ok(())
}
