//! Recursive-descent parser and semantic elaborator: tokens to typed AST
//! plus the global symbol table.
//!
//! `ParseCtx` holds everything the source threads through file-scope
//! `static`s (`locals`, `globals`, the scope stack, the anonymous-global
//! counter) as explicit fields, per the port's mutable-globals decision.
//! Productions advance an internal cursor rather than threading a `(rest,
//! consumed)` pair through every call, which is what a one-token-lookahead
//! recursive descent parser looks like once you have a real cursor type
//! instead of a hand-rolled linked list.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::ast::{Node, NodeKind, Obj};
use crate::diagnostics::CompileError;
use crate::token::{Token, TokenKind};
use crate::types::{add_type, array_of, func_type, pointer_to, ty_char, ty_int, Type};

type PResult<T> = Result<T, CompileError>;

struct Scope {
  vars: HashMap<String, Rc<RefCell<Obj>>>,
}

pub struct ParseCtx<'s> {
  src: &'s [u8],
  toks: Vec<Token>,
  pos: usize,
  scopes: Vec<Scope>,
  locals: Vec<Rc<RefCell<Obj>>>,
  pub globals: Vec<Rc<RefCell<Obj>>>,
  anon_id: u32,
}

impl<'s> ParseCtx<'s> {
  #[must_use]
  pub fn new(src: &'s [u8], toks: Vec<Token>) -> Self {
    ParseCtx {
      src, toks, pos: 0,
      scopes: vec![Scope { vars: HashMap::new() }],
      locals: Vec::new(), globals: Vec::new(), anon_id: 0,
    }
  }

  // --- token cursor -------------------------------------------------

  fn cur(&self) -> &Token { &self.toks[self.pos] }

  fn at_eof(&self) -> bool { self.cur().kind == TokenKind::Eof }

  fn is(&self, s: &str) -> bool { self.cur().is(self.src, s) }

  fn bump(&mut self) -> Token {
    let tok = self.toks[self.pos].clone();
    if self.pos + 1 < self.toks.len() {
      self.pos += 1;
    }
    tok
  }

  /// `skip`: consume a token that must equal `s`, or raise `expected 'X'`.
  fn skip(&mut self, s: &str) -> PResult<Token> {
    if !self.is(s) {
      return Err(CompileError::syntactic(self.cur().span, format!("expected '{s}'")));
    }
    Ok(self.bump())
  }

  /// `consume`: consume a token equal to `s` if present, reporting whether it was.
  fn consume(&mut self, s: &str) -> bool {
    if self.is(s) {
      self.bump();
      true
    } else {
      false
    }
  }

  fn get_ident(&mut self) -> PResult<(String, Token)> {
    if self.cur().kind != TokenKind::Ident {
      return Err(CompileError::syntactic(self.cur().span, "expected an identifier"));
    }
    let tok = self.bump();
    Ok((String::from_utf8_lossy(tok.text(self.src)).into_owned(), tok))
  }

  fn get_number(&mut self) -> PResult<i64> {
    if self.cur().kind != TokenKind::Num {
      return Err(CompileError::syntactic(self.cur().span, "expected a number"));
    }
    Ok(self.bump().val)
  }

  // --- scopes and object creation ------------------------------------

  fn enter_scope(&mut self) { self.scopes.push(Scope { vars: HashMap::new() }); }
  fn leave_scope(&mut self) { self.scopes.pop(); }

  fn find_var(&self, name: &str) -> Option<Rc<RefCell<Obj>>> {
    self.scopes.iter().rev().find_map(|sc| sc.vars.get(name).cloned())
  }

  fn push_scope(&mut self, name: String, obj: Rc<RefCell<Obj>>) {
    self.scopes.last_mut().expect("global scope always present").vars.insert(name, obj);
  }

  fn new_var(&mut self, name: String, ty: Rc<Type>) -> Rc<RefCell<Obj>> {
    let obj = Rc::new(RefCell::new(Obj::new(name.clone(), ty)));
    self.push_scope(name, obj.clone());
    obj
  }

  fn new_lvar(&mut self, name: String, ty: Rc<Type>) -> Rc<RefCell<Obj>> {
    let obj = self.new_var(name, ty);
    obj.borrow_mut().is_local = true;
    self.locals.push(obj.clone());
    obj
  }

  fn new_gvar(&mut self, name: String, ty: Rc<Type>) -> Rc<RefCell<Obj>> {
    let obj = self.new_var(name, ty);
    self.globals.push(obj.clone());
    obj
  }

  fn new_unique_name(&mut self) -> String {
    let name = format!(".L..{}", self.anon_id);
    self.anon_id += 1;
    name
  }

  fn new_anon_gvar(&mut self, ty: Rc<Type>) -> Rc<RefCell<Obj>> {
    let name = self.new_unique_name();
    self.new_gvar(name, ty)
  }

  fn new_string_literal(&mut self, data: Vec<u8>, ty: Rc<Type>) -> Rc<RefCell<Obj>> {
    let obj = self.new_anon_gvar(ty);
    obj.borrow_mut().init_data = Some(data);
    obj
  }

  // --- node construction helpers (call add_type eagerly, like the source) --

  fn new_node(&self, kind: NodeKind, tok: Token) -> Node { Node::new(kind, tok) }

  fn new_binary(&self, kind: NodeKind, lhs: Node, rhs: Node, tok: Token) -> PResult<Node> {
    let mut node = self.new_node(kind, tok);
    node.lhs = Some(Box::new(lhs));
    node.rhs = Some(Box::new(rhs));
    add_type(&mut node)?;
    Ok(node)
  }

  fn new_unary(&self, kind: NodeKind, operand: Node, tok: Token) -> PResult<Node> {
    let mut node = self.new_node(kind, tok);
    node.lhs = Some(Box::new(operand));
    add_type(&mut node)?;
    Ok(node)
  }

  fn new_num(&self, val: i64, tok: Token) -> Node {
    let mut node = self.new_node(NodeKind::Num, tok);
    node.val = val;
    add_type(&mut node).expect("Num nodes always type-check");
    node
  }

  fn new_var_node(&self, var: Rc<RefCell<Obj>>, tok: Token) -> Node {
    let mut node = self.new_node(NodeKind::Var, tok);
    node.var = Some(var);
    add_type(&mut node).expect("Var nodes always type-check");
    node
  }

  // --- declspec / declarator chain ------------------------------------

  /// `declspec = "char" | "int"`
  fn declspec(&mut self) -> PResult<Rc<Type>> {
    if self.consume("char") {
      return Ok(ty_char());
    }
    self.skip("int")?;
    Ok(ty_int())
  }

  /// `func-params = (param ("," param)*)? ")"`, entered just after the `(`.
  /// Returns the function type plus the identifying token of each
  /// parameter, in declaration order (used by `create_param_lvars`).
  fn func_params(&mut self, return_ty: Rc<Type>) -> PResult<(Rc<Type>, Vec<Token>)> {
    let mut params = Vec::new();
    let mut param_names = Vec::new();
    let mut first = true;
    while !self.is(")") {
      if !first {
        self.skip(",")?;
      }
      first = false;
      let basety = self.declspec()?;
      let (ty, tok, _) = self.declarator(basety)?;
      params.push(ty);
      param_names.push(tok);
    }
    self.skip(")")?;
    Ok((func_type(return_ty, params), param_names))
  }

  /// `type-suffix = "(" func-params | "[" NUM "]" type-suffix | e`
  fn type_suffix(&mut self, ty: Rc<Type>) -> PResult<(Rc<Type>, Vec<Token>)> {
    if self.consume("(") {
      return self.func_params(ty);
    }
    if self.consume("[") {
      let sz = self.get_number()?;
      self.skip("]")?;
      let (inner, param_names) = self.type_suffix(ty)?;
      return Ok((array_of(inner, usize::try_from(sz).unwrap_or(0)), param_names));
    }
    Ok((ty, Vec::new()))
  }

  /// `declarator = "*"* IDENT type-suffix`. Returns the fully built type,
  /// the identifying token (the declarator's bound name, mirroring
  /// `ty->name` in the source), and — for a function declarator — the
  /// name token of each parameter.
  fn declarator(&mut self, basety: Rc<Type>) -> PResult<(Rc<Type>, Token, Vec<Token>)> {
    let mut ty = basety;
    while self.consume("*") {
      ty = pointer_to(ty);
    }
    if self.cur().kind != TokenKind::Ident {
      return Err(CompileError::syntactic(self.cur().span, "expected a variable name"));
    }
    let name_tok = self.bump();
    let (ty, param_names) = self.type_suffix(ty)?;
    Ok((ty, name_tok, param_names))
  }

  fn is_typename(&self) -> bool { self.is("char") || self.is("int") }

  // --- declarations and statements -------------------------------------

  /// `declaration = declspec (declarator ("=" assign)? ("," ...)*)? ";"`
  fn declaration(&mut self) -> PResult<Node> {
    let basety = self.declspec()?;
    let head_tok = self.cur().clone();
    let mut stmts = Vec::new();
    let mut first = true;
    while !self.is(";") {
      if !first {
        self.skip(",")?;
      }
      first = false;
      let (ty, name_tok, _) = self.declarator(basety.clone())?;
      let name = String::from_utf8_lossy(name_tok.text(self.src)).into_owned();
      let var = self.new_lvar(name, ty);
      if !self.consume("=") {
        continue;
      }
      let lhs = self.new_var_node(var, name_tok.clone());
      let rhs = self.assign()?;
      let assign_tok = name_tok;
      let binary = self.new_binary(NodeKind::Assign, lhs, rhs, assign_tok.clone())?;
      let mut stmt = self.new_node(NodeKind::ExprStmt, assign_tok);
      stmt.lhs = Some(Box::new(binary));
      stmts.push(stmt);
    }
    self.skip(";")?;
    Ok(block_of(stmts, head_tok))
  }

  /// `stmt = "return" expr ";" | "if" ... | "for" ... | "while" ... | "{" compound-stmt | expr-stmt`
  fn stmt(&mut self) -> PResult<Node> {
    if self.is("return") {
      let tok = self.bump();
      let mut node = self.new_node(NodeKind::Return, tok);
      node.lhs = Some(Box::new(self.expr()?));
      self.skip(";")?;
      return Ok(node);
    }

    if self.is("if") {
      let tok = self.bump();
      self.skip("(")?;
      let cond = self.expr()?;
      self.skip(")")?;
      let then = self.stmt()?;
      let mut node = self.new_node(NodeKind::If, tok);
      node.cond = Some(Box::new(cond));
      node.then = Some(Box::new(then));
      if self.consume("else") {
        node.els = Some(Box::new(self.stmt()?));
      }
      return Ok(node);
    }

    if self.is("for") {
      let tok = self.bump();
      self.skip("(")?;
      let init = self.expr_stmt()?;
      let cond = if !self.is(";") { Some(self.expr()?) } else { None };
      self.skip(";")?;
      let inc = if !self.is(")") { Some(self.expr()?) } else { None };
      self.skip(")")?;
      let then = self.stmt()?;
      let mut node = self.new_node(NodeKind::For, tok);
      node.init = Some(Box::new(init));
      node.cond = cond.map(Box::new);
      node.inc = inc.map(Box::new);
      node.then = Some(Box::new(then));
      return Ok(node);
    }

    if self.is("while") {
      let tok = self.bump();
      self.skip("(")?;
      let cond = self.expr()?;
      self.skip(")")?;
      let then = self.stmt()?;
      let mut node = self.new_node(NodeKind::For, tok);
      node.cond = Some(Box::new(cond));
      node.then = Some(Box::new(then));
      return Ok(node);
    }

    if self.is("{") {
      self.bump();
      return self.compound_stmt();
    }

    self.expr_stmt()
  }

  /// `compound-stmt = (declaration | stmt)* "}"`, entered just after the `{`.
  fn compound_stmt(&mut self) -> PResult<Node> {
    let head_tok = self.cur().clone();
    self.enter_scope();
    let mut stmts = Vec::new();
    while !self.is("}") {
      if self.is_typename() {
        stmts.push(self.declaration()?);
      } else {
        stmts.push(self.stmt()?);
      }
    }
    self.leave_scope();
    self.skip("}")?;
    Ok(block_of(stmts, head_tok))
  }

  /// `expr-stmt = ";" | expr ";"`
  fn expr_stmt(&mut self) -> PResult<Node> {
    if self.is(";") {
      let tok = self.bump();
      return Ok(self.new_node(NodeKind::Block, tok));
    }
    let tok = self.cur().clone();
    let mut node = self.new_node(NodeKind::ExprStmt, tok);
    node.lhs = Some(Box::new(self.expr()?));
    self.skip(";")?;
    Ok(node)
  }

  // --- expressions ------------------------------------------------------

  fn expr(&mut self) -> PResult<Node> { self.assign() }

  /// `assign = equality ("=" assign)?`, right-associative.
  fn assign(&mut self) -> PResult<Node> {
    let node = self.equality()?;
    if self.is("=") {
      let tok = self.bump();
      let rhs = self.assign()?;
      return self.new_binary(NodeKind::Assign, node, rhs, tok);
    }
    Ok(node)
  }

  /// `equality = relational (("==" | "!=") relational)*`
  fn equality(&mut self) -> PResult<Node> {
    let mut node = self.relational()?;
    loop {
      if self.is("==") {
        let tok = self.bump();
        let rhs = self.relational()?;
        node = self.new_binary(NodeKind::Eq, node, rhs, tok)?;
      } else if self.is("!=") {
        let tok = self.bump();
        let rhs = self.relational()?;
        node = self.new_binary(NodeKind::Ne, node, rhs, tok)?;
      } else {
        return Ok(node);
      }
    }
  }

  /// `relational = add (("<" | "<=" | ">" | ">=") add)*`; `>`/`>=` swap
  /// operands so only `Lt`/`Le` ever need codegen support.
  fn relational(&mut self) -> PResult<Node> {
    let mut node = self.add()?;
    loop {
      if self.is("<") {
        let tok = self.bump();
        let rhs = self.add()?;
        node = self.new_binary(NodeKind::Lt, node, rhs, tok)?;
      } else if self.is("<=") {
        let tok = self.bump();
        let rhs = self.add()?;
        node = self.new_binary(NodeKind::Le, node, rhs, tok)?;
      } else if self.is(">") {
        let tok = self.bump();
        let rhs = self.add()?;
        node = self.new_binary(NodeKind::Lt, rhs, node, tok)?;
      } else if self.is(">=") {
        let tok = self.bump();
        let rhs = self.add()?;
        node = self.new_binary(NodeKind::Le, rhs, node, tok)?;
      } else {
        return Ok(node);
      }
    }
  }

  /// `ptr + int`/`int + ptr` scale the integer side by the pointee size;
  /// `ptr + ptr` is a hard error.
  fn new_add(&self, lhs: Node, rhs: Node, tok: Token) -> PResult<Node> {
    let lty = lhs.ty.clone().expect("lhs typed");
    let rty = rhs.ty.clone().expect("rhs typed");

    if lty.is_integer() && rty.is_integer() {
      return self.new_binary(NodeKind::Add, lhs, rhs, tok);
    }
    if lty.base().is_some() && rty.base().is_some() {
      return Err(CompileError::semantic(tok.span, "invalid operands"));
    }
    let (ptr, int) = if lty.base().is_none() && rty.base().is_some() { (rhs, lhs) } else { (lhs, rhs) };
    let scale = ptr.ty.as_ref().expect("typed").base().expect("pointer-like").size();
    let scaled_rhs = self.new_binary(NodeKind::Mul, int, self.new_num(scale as i64, tok.clone()), tok.clone())?;
    self.new_binary(NodeKind::Add, ptr, scaled_rhs, tok)
  }

  /// `ptr - int` scales; `ptr - ptr` computes an element-count difference.
  fn new_sub(&self, lhs: Node, rhs: Node, tok: Token) -> PResult<Node> {
    let lty = lhs.ty.clone().expect("lhs typed");
    let rty = rhs.ty.clone().expect("rhs typed");

    if lty.is_integer() && rty.is_integer() {
      return self.new_binary(NodeKind::Sub, lhs, rhs, tok);
    }
    if let Some(base) = lty.base() {
      if rty.is_integer() {
        let scale = base.size();
        let scaled_rhs = self.new_binary(NodeKind::Mul, rhs, self.new_num(scale as i64, tok.clone()), tok.clone())?;
        return self.new_binary(NodeKind::Sub, lhs, scaled_rhs, tok);
      }
      if rty.base().is_some() {
        let scale = base.size();
        let mut diff = self.new_binary(NodeKind::Sub, lhs, rhs, tok.clone())?;
        diff.ty = Some(ty_int());
        return self.new_binary(NodeKind::Div, diff, self.new_num(scale as i64, tok.clone()), tok);
      }
    }
    Err(CompileError::semantic(tok.span, "invalid operands"))
  }

  /// `add = mul (("+" | "-") mul)*`
  fn add(&mut self) -> PResult<Node> {
    let mut node = self.mul()?;
    loop {
      if self.is("+") {
        let tok = self.bump();
        let rhs = self.mul()?;
        node = self.new_add(node, rhs, tok)?;
      } else if self.is("-") {
        let tok = self.bump();
        let rhs = self.mul()?;
        node = self.new_sub(node, rhs, tok)?;
      } else {
        return Ok(node);
      }
    }
  }

  /// `mul = unary (("*" | "/") unary)*`. Loops until neither operator
  /// matches — an earlier snapshot of this production had a missing
  /// `continue` that made it stop after one iteration; this port always
  /// keeps consuming.
  fn mul(&mut self) -> PResult<Node> {
    let mut node = self.unary()?;
    loop {
      if self.is("*") {
        let tok = self.bump();
        let rhs = self.unary()?;
        node = self.new_binary(NodeKind::Mul, node, rhs, tok)?;
      } else if self.is("/") {
        let tok = self.bump();
        let rhs = self.unary()?;
        node = self.new_binary(NodeKind::Div, node, rhs, tok)?;
      } else {
        return Ok(node);
      }
    }
  }

  /// `unary = ("+" | "-" | "*" | "&") unary | postfix`
  fn unary(&mut self) -> PResult<Node> {
    if self.is("+") {
      self.bump();
      return self.unary();
    }
    if self.is("-") {
      let tok = self.bump();
      let operand = self.unary()?;
      return self.new_unary(NodeKind::Neg, operand, tok);
    }
    if self.is("&") {
      let tok = self.bump();
      let operand = self.unary()?;
      return self.new_unary(NodeKind::Addr, operand, tok);
    }
    if self.is("*") {
      let tok = self.bump();
      let operand = self.unary()?;
      return self.new_unary(NodeKind::Deref, operand, tok);
    }
    self.postfix()
  }

  /// `postfix = primary ("[" expr "]")*`; `x[y]` desugars to `*(x + y)`.
  fn postfix(&mut self) -> PResult<Node> {
    let mut node = self.primary()?;
    while self.is("[") {
      let tok = self.bump();
      let idx = self.expr()?;
      self.skip("]")?;
      let sum = self.new_add(node, idx, tok.clone())?;
      node = self.new_unary(NodeKind::Deref, sum, tok)?;
    }
    Ok(node)
  }

  /// `funcall = IDENT "(" (assign ("," assign)*)? ")"`, entered at the IDENT.
  fn funcall(&mut self) -> PResult<Node> {
    let start = self.bump(); // ident
    self.skip("(")?;
    let mut args = Vec::new();
    let mut first = true;
    while !self.is(")") {
      if !first {
        self.skip(",")?;
      }
      first = false;
      args.push(self.assign()?);
    }
    self.skip(")")?;
    let mut node = self.new_node(NodeKind::Funcall, start.clone());
    node.funcname = String::from_utf8_lossy(start.text(self.src)).into_owned();
    node.args = args;
    add_type(&mut node)?;
    Ok(node)
  }

  /// `primary = "(" expr ")" | "sizeof" unary | IDENT funcall? | STRING | NUM`
  fn primary(&mut self) -> PResult<Node> {
    if self.is("(") {
      self.bump();
      let node = self.expr()?;
      self.skip(")")?;
      return Ok(node);
    }

    if self.is("sizeof") {
      let tok = self.bump();
      let operand = self.unary()?;
      let size = operand.ty.expect("unary operand is typed").size();
      return Ok(self.new_num(size as i64, tok));
    }

    if self.cur().kind == TokenKind::Ident {
      if self.toks.get(self.pos + 1).is_some_and(|t| t.is(self.src, "(")) {
        return self.funcall();
      }
      let tok = self.cur().clone();
      let name = String::from_utf8_lossy(tok.text(self.src)).into_owned();
      let var = self.find_var(&name)
        .ok_or_else(|| CompileError::semantic(tok.span, "undefined variable"))?;
      self.bump();
      return Ok(self.new_var_node(var, tok));
    }

    if self.cur().kind == TokenKind::Str {
      let tok = self.bump();
      let ty = tok.str_ty.clone().expect("string token always has a type");
      let var = self.new_string_literal(tok.str_val.clone(), ty);
      return Ok(self.new_var_node(var, tok));
    }

    if self.cur().kind == TokenKind::Num {
      let tok = self.bump();
      return Ok(self.new_num(tok.val, tok));
    }

    Err(CompileError::syntactic(self.cur().span, "expected an expression"))
  }

  // --- top level: functions and globals ---------------------------------

  /// Walks a parameter type list and creates a local for each, in
  /// declaration order, so `fn_obj.params[i]` is always the i-th declared
  /// parameter — which is what the prologue's `argreg64[i]` indexing and a
  /// call site's left-to-right argument evaluation both assume.
  fn create_param_lvars(&mut self, params: &[Rc<Type>], name_toks: &[Token]) {
    for (ty, tok) in params.iter().zip(name_toks) {
      let name = String::from_utf8_lossy(tok.text(self.src)).into_owned();
      self.new_lvar(name, ty.clone());
    }
  }

  /// Speculatively parses a declarator from a saved cursor position to
  /// decide whether `tok` begins a function definition, without consuming
  /// any tokens observable by the subsequent real parse.
  fn is_function(&mut self) -> bool {
    if self.is(";") {
      return false;
    }
    let saved = self.pos;
    // A fresh sentinel base type for the lookahead, matching `Type dummy = {}`
    // in the source but without ever reading an uninitialized value: the
    // lookahead only inspects the resulting `ty.kind` tag.
    let dummy = ty_int();
    let result = self.declarator(dummy).map(|(ty, ..)| ty.is_func());
    self.pos = saved;
    result.unwrap_or(false)
  }

  fn function(&mut self, basety: Rc<Type>) -> PResult<()> {
    let (ty, name_tok, param_name_toks) = self.declarator(basety)?;
    let Type::Func { params, .. } = &*ty else {
      unreachable!("is_function guaranteed a Func type")
    };
    let params = params.clone();
    let name = String::from_utf8_lossy(name_tok.text(self.src)).into_owned();

    let fn_obj = self.new_gvar(name, ty.clone());
    fn_obj.borrow_mut().is_function = true;

    self.locals.clear();
    self.enter_scope();
    self.create_param_lvars(&params, &param_name_toks);
    fn_obj.borrow_mut().params = self.locals.clone();

    self.skip("{")?;
    let body = self.compound_stmt()?;
    {
      let mut f = fn_obj.borrow_mut();
      f.body = Some(Box::new(body));
      f.locals = std::mem::take(&mut self.locals);
    }
    self.leave_scope();
    Ok(())
  }

  fn global_variable(&mut self, basety: Rc<Type>) -> PResult<()> {
    let mut first = true;
    while !self.consume(";") {
      if !first {
        self.skip(",")?;
      }
      first = false;
      let (ty, name_tok, _) = self.declarator(basety.clone())?;
      let name = String::from_utf8_lossy(name_tok.text(self.src)).into_owned();
      self.new_gvar(name, ty);
    }
    Ok(())
  }

  /// `program = (function_def | global_decl)*`
  pub fn parse(&mut self) -> PResult<()> {
    while !self.at_eof() {
      let basety = self.declspec()?;
      if self.is_function() {
        self.function(basety)?;
      } else {
        self.global_variable(basety)?;
      }
    }
    Ok(())
  }
}

fn block_of(stmts: Vec<Node>, tok: Token) -> Node {
  let mut node = Node::new(NodeKind::Block, tok);
  let mut iter = stmts.into_iter().rev();
  let mut next = iter.next().map(Box::new);
  for mut n in iter {
    n.next = next;
    next = Some(Box::new(n));
  }
  node.body = next;
  node
}
