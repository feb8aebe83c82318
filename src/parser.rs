//! Parser.
//!
//! Pratt-style precedence climbing over three parselet tables (statements,
//! expressions, types), each entry carrying an optional prefix function, an
//! optional infix function and a precedence. The parser is also the
//! coordination center of the front-end: it drives the scanner, builds the
//! AST, resolves names through the scope stack and package definitions,
//! resolves and canonicalizes types, registers methods per receiver type,
//! and narrows optional-typed bindings in `if` conditions.
//!
//! On an error that would leave construction ambiguous the parser reports,
//! fast-forwards to the next synchronizing token (usually `;`), and returns
//! a bad node; it never unwinds, so a single invocation can report many
//! problems.

use std::collections::HashMap;

use crate::ast::{
    Ast, Expr, ExprFlags, ExprId, ExprKind, LocalKind, NodeRef, Stmt, StmtId, StmtKind,
};
use crate::diag::{InputId, SrcLoc, SrcRange};
use crate::intern::Symbol;
use crate::scanner::{parse_float_lit, Scanner};
use crate::session::Session;
use crate::token::Tok;
use crate::types::{self, StructField, TypeId, TypeKind};
use crate::universe;

// =============================================================================
// Precedence
// =============================================================================

/// Binding powers, weakest to strongest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum Prec {
    Comma,
    Assign,
    LogicalOr,
    LogicalAnd,
    BitOr,
    BitXor,
    BitAnd,
    Equal,
    Compare,
    Shift,
    Add,
    Mul,
    UnaryPrefix,
    UnaryPostfix,
    Member,
}

pub const PREC_LOWEST: Prec = Prec::Comma;

impl Prec {
    /// Next-stronger level; used as the right-hand floor of left-associative
    /// infix operators.
    const fn succ(self) -> Prec {
        match self {
            Prec::Comma => Prec::Assign,
            Prec::Assign => Prec::LogicalOr,
            Prec::LogicalOr => Prec::LogicalAnd,
            Prec::LogicalAnd => Prec::BitOr,
            Prec::BitOr => Prec::BitXor,
            Prec::BitXor => Prec::BitAnd,
            Prec::BitAnd => Prec::Equal,
            Prec::Equal => Prec::Compare,
            Prec::Compare => Prec::Shift,
            Prec::Shift => Prec::Add,
            Prec::Add => Prec::Mul,
            Prec::Mul => Prec::UnaryPrefix,
            Prec::UnaryPrefix => Prec::UnaryPostfix,
            Prec::UnaryPostfix => Prec::Member,
            Prec::Member => Prec::Member,
        }
    }
}

const fn is_assign_op(op: Tok) -> bool {
    matches!(
        op,
        Tok::Assign
            | Tok::AddAssign
            | Tok::SubAssign
            | Tok::MulAssign
            | Tok::DivAssign
            | Tok::ModAssign
            | Tok::ShlAssign
            | Tok::ShrAssign
            | Tok::AndAssign
            | Tok::OrAssign
            | Tok::XorAssign
    )
}

// =============================================================================
// Parselet tables
// =============================================================================

type PrefixStmt = fn(&mut Parser<'_, '_>) -> StmtId;
type InfixStmt = fn(&mut Parser<'_, '_>, Prec, StmtId) -> StmtId;
type PrefixExpr = fn(&mut Parser<'_, '_>, ExprFlags) -> ExprId;
type InfixExpr = fn(&mut Parser<'_, '_>, Prec, ExprId, ExprFlags) -> ExprId;
type PrefixType = fn(&mut Parser<'_, '_>) -> TypeId;
type InfixType = fn(&mut Parser<'_, '_>, Prec, TypeId) -> TypeId;

#[derive(Clone, Copy)]
struct StmtParselet {
    prefix: Option<PrefixStmt>,
    infix: Option<InfixStmt>,
    prec: Prec,
}

#[derive(Clone, Copy)]
struct ExprParselet {
    prefix: Option<PrefixExpr>,
    infix: Option<InfixExpr>,
    prec: Prec,
}

#[derive(Clone, Copy)]
struct TypeParselet {
    prefix: Option<PrefixType>,
    infix: Option<InfixType>,
    prec: Prec,
}

static STMT_PARSETAB: [StmtParselet; Tok::COUNT] = {
    const D: StmtParselet = StmtParselet {
        prefix: None,
        infix: None,
        prec: Prec::Comma,
    };
    let mut t = [D; Tok::COUNT];
    t[Tok::KwFun as usize].prefix = Some(stmt_fun);
    t[Tok::KwType as usize].prefix = Some(stmt_typedef);
    t
};

static EXPR_PARSETAB: [ExprParselet; Tok::COUNT] = {
    const D: ExprParselet = ExprParselet {
        prefix: None,
        infix: None,
        prec: Prec::Comma,
    };
    let mut t = [D; Tok::COUNT];

    const fn infix(f: InfixExpr, prec: Prec) -> ExprParselet {
        ExprParselet {
            prefix: None,
            infix: Some(f),
            prec,
        }
    }

    // infix ops, weakest to strongest
    t[Tok::Assign as usize] = infix(expr_infix_op, Prec::Assign);
    t[Tok::MulAssign as usize] = infix(expr_infix_op, Prec::Assign);
    t[Tok::DivAssign as usize] = infix(expr_infix_op, Prec::Assign);
    t[Tok::ModAssign as usize] = infix(expr_infix_op, Prec::Assign);
    t[Tok::AddAssign as usize] = infix(expr_infix_op, Prec::Assign);
    t[Tok::SubAssign as usize] = infix(expr_infix_op, Prec::Assign);
    t[Tok::ShlAssign as usize] = infix(expr_infix_op, Prec::Assign);
    t[Tok::ShrAssign as usize] = infix(expr_infix_op, Prec::Assign);
    t[Tok::AndAssign as usize] = infix(expr_infix_op, Prec::Assign);
    t[Tok::XorAssign as usize] = infix(expr_infix_op, Prec::Assign);
    t[Tok::OrAssign as usize] = infix(expr_infix_op, Prec::Assign);
    t[Tok::PipePipe as usize] = infix(expr_cmp_op, Prec::LogicalOr);
    t[Tok::AmpAmp as usize] = infix(expr_cmp_op, Prec::LogicalAnd);
    t[Tok::Pipe as usize] = infix(expr_infix_op, Prec::BitOr);
    t[Tok::Caret as usize] = infix(expr_infix_op, Prec::BitXor);
    t[Tok::EqEq as usize] = infix(expr_cmp_op, Prec::Equal);
    t[Tok::NotEq as usize] = infix(expr_cmp_op, Prec::Equal);
    t[Tok::Lt as usize] = infix(expr_cmp_op, Prec::Compare);
    t[Tok::Gt as usize] = infix(expr_cmp_op, Prec::Compare);
    t[Tok::LtEq as usize] = infix(expr_cmp_op, Prec::Compare);
    t[Tok::GtEq as usize] = infix(expr_cmp_op, Prec::Compare);
    t[Tok::Shl as usize] = infix(expr_infix_op, Prec::Shift);
    t[Tok::Shr as usize] = infix(expr_infix_op, Prec::Shift);
    t[Tok::Slash as usize] = infix(expr_infix_op, Prec::Mul);
    t[Tok::Percent as usize] = infix(expr_infix_op, Prec::Mul);

    // tokens with both prefix and infix roles
    t[Tok::Amp as usize] = ExprParselet {
        prefix: Some(expr_ref),
        infix: Some(expr_infix_op),
        prec: Prec::BitAnd,
    };
    t[Tok::Plus as usize] = ExprParselet {
        prefix: Some(expr_prefix_op),
        infix: Some(expr_infix_op),
        prec: Prec::Add,
    };
    t[Tok::Minus as usize] = ExprParselet {
        prefix: Some(expr_prefix_op),
        infix: Some(expr_infix_op),
        prec: Prec::Add,
    };
    t[Tok::Star as usize] = ExprParselet {
        prefix: Some(expr_deref),
        infix: Some(expr_infix_op),
        prec: Prec::Mul,
    };
    t[Tok::PlusPlus as usize] = ExprParselet {
        prefix: Some(expr_prefix_op),
        infix: Some(expr_postfix_op),
        prec: Prec::UnaryPrefix,
    };
    t[Tok::MinusMinus as usize] = ExprParselet {
        prefix: Some(expr_prefix_op),
        infix: Some(expr_postfix_op),
        prec: Prec::UnaryPrefix,
    };
    t[Tok::Bang as usize].prefix = Some(expr_prefix_op);
    t[Tok::Tilde as usize].prefix = Some(expr_prefix_op);
    t[Tok::KwMut as usize].prefix = Some(expr_mut);
    t[Tok::LParen as usize] = ExprParselet {
        prefix: Some(expr_group),
        infix: Some(expr_postfix_call),
        prec: Prec::UnaryPostfix,
    };

    // postfix subscript
    t[Tok::LBrack as usize] = infix(expr_postfix_subscript, Prec::UnaryPostfix);

    // member access
    t[Tok::Dot as usize] = ExprParselet {
        prefix: Some(expr_dotmember),
        infix: Some(expr_postfix_member),
        prec: Prec::Member,
    };

    // keywords & identifiers
    t[Tok::Ident as usize].prefix = Some(expr_id);
    t[Tok::KwFun as usize].prefix = Some(expr_fun);
    t[Tok::KwLet as usize].prefix = Some(expr_var);
    t[Tok::KwVar as usize].prefix = Some(expr_var);
    t[Tok::KwIf as usize].prefix = Some(expr_if);
    t[Tok::KwFor as usize].prefix = Some(expr_for);
    t[Tok::KwReturn as usize].prefix = Some(expr_return);

    // constant literals
    t[Tok::IntLit as usize].prefix = Some(expr_intlit);
    t[Tok::FloatLit as usize].prefix = Some(expr_floatlit);

    // block
    t[Tok::LBrace as usize].prefix = Some(expr_block);

    t
};

static TYPE_PARSETAB: [TypeParselet; Tok::COUNT] = {
    const D: TypeParselet = TypeParselet {
        prefix: None,
        infix: None,
        prec: Prec::Comma,
    };
    let mut t = [D; Tok::COUNT];
    t[Tok::Ident as usize].prefix = Some(type_id);
    t[Tok::LBrace as usize].prefix = Some(type_struct);
    t[Tok::KwFun as usize].prefix = Some(type_fun);
    t[Tok::Star as usize].prefix = Some(type_ptr);
    t[Tok::Amp as usize].prefix = Some(type_ref);
    t[Tok::KwMut as usize].prefix = Some(type_mut);
    t[Tok::Question as usize].prefix = Some(type_optional);
    t
};

// =============================================================================
// Parser state
// =============================================================================

/// Method tables: receiver type → name → method function node.
pub type MethodMap = HashMap<TypeId, HashMap<Symbol, ExprId>>;

/// Result of parsing one input.
#[derive(Debug)]
pub struct ParseOutput {
    pub ast: Ast,
    /// Per-compilation method tables, in textual registration order per
    /// receiver.
    pub methods: MethodMap,
    /// Package-wide name map of top-level definitions.
    pub pkgdefs: HashMap<Symbol, NodeRef>,
}

pub struct Parser<'t, 'sess> {
    sess: &'sess mut Session,
    scanner: Scanner<'t>,
    ast: Ast,

    scope: crate::scope::ScopeStack,
    pkgdefs: HashMap<Symbol, NodeRef>,
    universe: HashMap<Symbol, NodeRef>,
    methodmap: MethodMap,

    typectx: TypeId,
    typectx_stack: Vec<TypeId>,
    dotctx: Option<ExprId>,
    dotctx_stack: Vec<Option<ExprId>>,
}

/// Parses one registered input into a unit.
pub fn parse_input(sess: &mut Session, input: InputId) -> ParseOutput {
    let text = sess.input(input).text.clone();
    Parser::new(sess, input, &text).run()
}

impl<'t, 'sess> Parser<'t, 'sess> {
    pub fn new(sess: &'sess mut Session, input: InputId, text: &'t str) -> Self {
        let mut ast = Ast::new();
        let universe = universe::seed(&mut sess.interner, &mut ast);
        Self {
            scanner: Scanner::new(input, text),
            sess,
            ast,
            scope: crate::scope::ScopeStack::new(),
            pkgdefs: HashMap::new(),
            universe,
            methodmap: MethodMap::new(),
            typectx: types::VOID,
            typectx_stack: Vec::new(),
            dotctx: None,
            dotctx_stack: Vec::new(),
        }
    }

    /// Parses the whole input: a sequence of semicolon-terminated top-level
    /// statements. The scope stack is empty on entry and on return.
    pub fn run(mut self) -> ParseOutput {
        debug_assert!(self.scope.is_empty());
        self.next();

        self.enter_scope();
        while self.currtok() != Tok::Eof {
            let s = stmt(&mut self, PREC_LOWEST);
            self.ast.unit.push(s);
            if !self.expect_token(Tok::Semi, "") {
                self.fastforward_semi();
            } else {
                self.next();
            }
        }
        self.leave_scope();
        debug_assert!(self.scope.is_empty());
        debug_assert!(self.typectx_stack.is_empty());
        debug_assert!(self.dotctx_stack.is_empty());

        ParseOutput {
            ast: self.ast,
            methods: self.methodmap,
            pkgdefs: self.pkgdefs,
        }
    }

    // --- scanner plumbing ---

    #[inline]
    fn currtok(&self) -> Tok {
        self.scanner.tok
    }

    #[inline]
    fn currloc(&self) -> SrcLoc {
        self.scanner.loc
    }

    #[inline]
    fn next(&mut self) {
        self.scanner.next(self.sess);
    }

    // --- diagnostics ---

    fn node_srcrange(&self, id: ExprId) -> SrcRange {
        let e = &self.ast[id];
        let mut r = SrcRange::at(e.loc);
        match &e.kind {
            ExprKind::IntLit { value } => {
                r.end.col = r.focus.col + value.checked_ilog10().unwrap_or(0) + 1;
            }
            ExprKind::Id { name, .. } => {
                r.end.col = r.focus.col + self.sess.interner.resolve(*name).len() as u32;
            }
            _ => {}
        }
        r
    }

    /// Errors are suppressed once the scanner has been exhausted or force
    /// terminated, so a fatal error does not cascade.
    fn at_end(&self) -> bool {
        self.currtok() == Tok::Eof
            && (self.scanner.is_terminated() || self.scanner.span.start >= self.input_len())
    }

    fn input_len(&self) -> usize {
        self.sess.input(InputId(self.scanner.loc.input)).text.len()
    }

    fn error_at(&self, range: SrcRange, msg: String) {
        if self.at_end() {
            return;
        }
        self.sess.error(range, msg);
    }

    fn error_here(&self, msg: String) {
        self.error_at(SrcRange::at(self.currloc()), msg);
    }

    fn error_node(&self, id: ExprId, msg: String) {
        self.error_at(self.node_srcrange(id), msg);
    }

    fn warning_node(&self, id: ExprId, msg: String) {
        self.sess.warning(self.node_srcrange(id), msg);
    }

    fn unexpected(&mut self, errmsg: &str) {
        let tokstr = self.currtok().describe();
        let sep = if errmsg.is_empty() { "" } else { " " };
        self.error_here(format!("unexpected {tokstr}{sep}{errmsg}"));
    }

    fn expect_fail(&mut self, expect: Tok, errmsg: &str) {
        let want = expect.describe();
        let got = self.currtok().describe();
        let sep = if errmsg.is_empty() { "" } else { " " };
        self.error_here(format!("expected {want}{sep}{errmsg}, got {got}"));
    }

    fn expect_token(&mut self, expect: Tok, errmsg: &str) -> bool {
        let ok = self.currtok() == expect;
        if !ok {
            self.expect_fail(expect, errmsg);
        }
        ok
    }

    fn expect(&mut self, expect: Tok, errmsg: &str) -> bool {
        let ok = self.expect_token(expect, errmsg);
        self.next();
        ok
    }

    /// Like `expect` but resynchronizes on failure: fast-forwards to the
    /// expected token or a semicolon and consumes the token if found.
    fn expect2(&mut self, tok: Tok, errmsg: &str) -> bool {
        if self.currtok() == tok {
            self.next();
            return true;
        }
        self.unexpected(errmsg);
        self.fastforward(&[tok, Tok::Semi]);
        if self.currtok() == tok {
            self.next();
        }
        false
    }

    /// Advances until one of `stoplist` (or EOF) is the current token; the
    /// stop token is left current.
    fn fastforward(&mut self, stoplist: &[Tok]) {
        while self.currtok() != Tok::Eof {
            if stoplist.contains(&self.currtok()) {
                return;
            }
            self.next();
        }
    }

    fn fastforward_semi(&mut self) {
        self.fastforward(&[Tok::Semi]);
    }

    // --- node construction ---

    fn mkexpr(&mut self, kind: ExprKind, fl: ExprFlags) -> ExprId {
        self.ast.alloc_expr(Expr {
            kind,
            loc: self.currloc(),
            flags: fl,
            ty: types::VOID,
            nrefs: 0,
        })
    }

    fn mkbad(&mut self) -> ExprId {
        self.mkexpr(ExprKind::Bad, ExprFlags::NONE)
    }

    fn mkbad_stmt(&mut self) -> StmtId {
        let loc = self.currloc();
        self.ast.alloc_stmt(Stmt {
            kind: StmtKind::Bad,
            loc,
        })
    }

    // --- scopes and name resolution ---

    fn enter_scope(&mut self) {
        self.scope.push();
    }

    fn leave_scope(&mut self) {
        self.scope.pop();
    }

    /// Looks `name` up through the scope stack, then the package
    /// definitions, then the builtin universe. Bumps the reference counter
    /// of the resolved node.
    fn lookup(&mut self, name: Symbol) -> Option<NodeRef> {
        let n = self
            .scope
            .lookup(name, u32::MAX)
            .or_else(|| self.pkgdefs.get(&name).copied())
            .or_else(|| self.universe.get(&name).copied())?;
        match n {
            NodeRef::Expr(id) => self.ast[id].nrefs += 1,
            NodeRef::Type(t) => {
                if !self.sess.types.is_prim(t) {
                    self.sess.types.node_mut(t).nrefs += 1;
                }
            }
            NodeRef::Stmt(_) => {}
        }
        Some(n)
    }

    /// Defines `name`, rejecting duplicates in the innermost scope and, at
    /// the top level, in the package map.
    fn define(&mut self, name: Symbol, n: NodeRef) {
        if name == self.sess.syms.blank {
            return;
        }

        let mut existing = self.scope.lookup(name, 0);

        if existing.is_none() {
            self.scope.define(name, n);
            if self.scope.is_toplevel() {
                match self.pkgdefs.get(&name) {
                    Some(&prev) => existing = Some(prev),
                    None => {
                        self.pkgdefs.insert(name, n);
                    }
                }
            }
        }

        if let Some(prev) = existing {
            let msg = format!("redefinition of \"{}\"", self.sess.interner.resolve(name));
            match n.as_expr() {
                Some(id) => self.error_node(id, msg),
                None => self.error_here(msg),
            }
            if let Some(prev_id) = prev.as_expr() {
                if self.ast[prev_id].loc.line != 0 {
                    self.warning_node(prev_id, "previously defined here".to_string());
                }
            }
        }
    }

    /// Defines without duplicate checking; newest binding shadows within the
    /// same scope. Used for optional narrowing and typedef name rebinding.
    fn define_replace(&mut self, name: Symbol, n: NodeRef) {
        debug_assert!(name != self.sess.syms.blank);
        self.scope.define(name, n);
        if self.scope.is_toplevel() {
            self.pkgdefs.insert(name, n);
        }
    }

    // --- context stacks ---

    fn typectx_push(&mut self, t: TypeId) {
        self.typectx_stack.push(self.typectx);
        self.typectx = t;
    }

    fn typectx_pop(&mut self) {
        self.typectx = self
            .typectx_stack
            .pop()
            .expect("typectx stack underflow");
    }

    fn dotctx_push(&mut self, n: Option<ExprId>) {
        self.dotctx_stack.push(self.dotctx);
        self.dotctx = n;
    }

    fn dotctx_pop(&mut self) {
        self.dotctx = self
            .dotctx_stack
            .pop()
            .expect("dotctx stack underflow");
    }

    // --- formatting ---

    fn fmt_type(&self, t: TypeId) -> String {
        self.sess.types.fmt_type(&self.sess.interner, t)
    }

    fn fmt_expr(&self, id: ExprId) -> String {
        self.ast.fmt_expr(&self.sess.interner, id)
    }

    fn check_types_compat(&mut self, x: TypeId, y: TypeId, origin: Option<ExprId>) -> bool {
        let sess = &mut *self.sess;
        if sess.types.iscompat(&mut sess.interner, x, y) {
            return true;
        }
        let xs = self.fmt_type(x);
        let ys = self.fmt_type(y);
        let msg = format!("incompatible types, {xs} and {ys}");
        match origin {
            Some(id) => self.error_node(id, msg),
            None => self.error_here(msg),
        }
        false
    }
}

// =============================================================================
// Pratt drivers
// =============================================================================

fn stmt(p: &mut Parser<'_, '_>, prec: Prec) -> StmtId {
    let parselet = &STMT_PARSETAB[p.currtok() as usize];
    let Some(prefix) = parselet.prefix else {
        // not a declaration; fall back to an expression statement
        if EXPR_PARSETAB[p.currtok() as usize].prefix.is_some() {
            let loc = p.currloc();
            let e = expr(p, prec, ExprFlags::NONE);
            return p.ast.alloc_stmt(Stmt {
                kind: StmtKind::Expr(e),
                loc,
            });
        }
        p.unexpected("where a statement is expected");
        p.fastforward_semi();
        return p.mkbad_stmt();
    };
    let mut n = prefix(p);
    loop {
        let parselet = &STMT_PARSETAB[p.currtok() as usize];
        match parselet.infix {
            Some(infix) if parselet.prec >= prec => n = infix(p, parselet.prec, n),
            _ => return n,
        }
    }
}

fn expr(p: &mut Parser<'_, '_>, prec: Prec, fl: ExprFlags) -> ExprId {
    let parselet = &EXPR_PARSETAB[p.currtok() as usize];
    let Some(prefix) = parselet.prefix else {
        p.unexpected("where an expression is expected");
        p.fastforward_semi();
        return p.mkbad();
    };
    let mut n = prefix(p, fl);
    loop {
        let parselet = &EXPR_PARSETAB[p.currtok() as usize];
        match parselet.infix {
            Some(infix) if parselet.prec >= prec => n = infix(p, parselet.prec, n, fl),
            _ => return n,
        }
    }
}

fn type_(p: &mut Parser<'_, '_>, prec: Prec) -> TypeId {
    let parselet = &TYPE_PARSETAB[p.currtok() as usize];
    let Some(prefix) = parselet.prefix else {
        p.unexpected("where a type is expected");
        p.fastforward_semi();
        return types::VOID;
    };
    let mut t = prefix(p);
    loop {
        let parselet = &TYPE_PARSETAB[p.currtok() as usize];
        match parselet.infix {
            Some(infix) if parselet.prec >= prec => t = infix(p, parselet.prec, t),
            _ => return t,
        }
    }
}

// =============================================================================
// Types
// =============================================================================

fn named_type(p: &mut Parser<'_, '_>, name: Symbol, origin: Option<ExprId>) -> TypeId {
    let ns = p.sess.interner.resolve(name).to_string();
    match p.lookup(name) {
        None => {
            let msg = format!("unknown type \"{ns}\"");
            match origin {
                Some(id) => p.error_node(id, msg),
                None => p.error_here(msg),
            }
        }
        Some(NodeRef::Type(t)) => return t,
        Some(_) => {
            let msg = format!("{ns} is not a type");
            match origin {
                Some(id) => p.error_node(id, msg),
                None => p.error_here(msg),
            }
        }
    }
    types::VOID
}

fn type_id(p: &mut Parser<'_, '_>) -> TypeId {
    let t = named_type(p, p.scanner.sym, None);
    p.next();
    t
}

// ptr_type = "*" type
fn type_ptr(p: &mut Parser<'_, '_>) -> TypeId {
    p.next();
    let elem = type_(p, Prec::UnaryPrefix);
    p.sess.types.mk_ptr(elem)
}

fn type_ref1(p: &mut Parser<'_, '_>, is_mut: bool) -> TypeId {
    p.next();
    let elem = type_(p, Prec::UnaryPrefix);
    p.sess.types.mk_ref(elem, is_mut)
}

// ref_type = "&" type
fn type_ref(p: &mut Parser<'_, '_>) -> TypeId {
    type_ref1(p, false)
}

// mut_type = "mut" ref_type
fn type_mut(p: &mut Parser<'_, '_>) -> TypeId {
    p.next();
    if p.currtok() != Tok::Amp {
        p.unexpected("expecting '&'");
        return types::VOID;
    }
    type_ref1(p, true)
}

// optional_type = "?" type
fn type_optional(p: &mut Parser<'_, '_>) -> TypeId {
    p.next();
    let elem = type_(p, Prec::UnaryPrefix);
    p.sess.types.mk_optional(elem)
}

// struct body: field groups and method definitions, semicolon separated
fn type_struct(p: &mut Parser<'_, '_>) -> TypeId {
    let st = p.sess.types.mk_struct();
    p.next();
    let mut has_init = false;
    while p.currtok() != Tok::RBrace {
        if p.currtok() == Tok::KwFun {
            let f = fun(p, ExprFlags::NONE, Some(st), true);
            if let TypeKind::Struct { methods, .. } = &mut p.sess.types.node_mut(st).kind {
                methods.push(f);
            }
        } else {
            has_init |= struct_fieldset(p, st);
        }
        if p.currtok() != Tok::Semi {
            break;
        }
        p.next();
    }
    p.expect(Tok::RBrace, "to end struct");
    if let TypeKind::Struct {
        has_init: hi_slot, ..
    } = &mut p.sess.types.node_mut(st).kind
    {
        *hi_slot = has_init;
    }
    p.sess.types.finalize_struct_layout(st);
    st
}

// field group = id ("," id)* type ("=" expr ("," expr)*)?
fn struct_fieldset(p: &mut Parser<'_, '_>, st: TypeId) -> bool {
    let mut group: Vec<ExprId> = Vec::new();
    loop {
        let name = p.scanner.sym;
        let f = p.mkexpr(
            ExprKind::Local {
                kind: LocalKind::Field,
                name,
                init: None,
                is_this: false,
            },
            ExprFlags::NONE,
        );
        p.expect(Tok::Ident, "");

        let ns = p.sess.interner.resolve(name).to_string();
        if p.sess.types.struct_field(st, name).is_some() {
            p.error_here(format!("duplicate field {ns}"));
        } else if p
            .methodmap
            .get(&st)
            .is_some_and(|mm| mm.contains_key(&name))
        {
            p.error_here(format!("field {ns} conflicts with method of same name"));
        }

        if let TypeKind::Struct { fields, .. } = &mut p.sess.types.node_mut(st).kind {
            fields.push(StructField {
                name,
                ty: types::VOID,
                expr: f,
            });
        }
        group.push(f);
        if p.currtok() != Tok::Comma {
            break;
        }
        p.next();
    }

    let t = type_(p, Prec::Member);
    for &f in &group {
        p.ast[f].ty = t;
        let name = match p.ast[f].kind {
            ExprKind::Local { name, .. } => name,
            _ => unreachable!(),
        };
        if let TypeKind::Struct { fields, .. } = &mut p.sess.types.node_mut(st).kind {
            if let Some(sf) = fields.iter_mut().find(|sf| sf.name == name && sf.expr == f) {
                sf.ty = t;
            }
        }
    }

    if p.currtok() != Tok::Assign {
        return false;
    }
    p.next();

    let mut i = 0usize;
    loop {
        if i == group.len() {
            p.error_here("excess field initializer".to_string());
            expr(p, Prec::Comma, ExprFlags::RVALUE);
            break;
        }
        let f = group[i];
        i += 1;
        let fty = p.ast[f].ty;
        p.typectx_push(fty);
        let init = expr(p, Prec::Comma, ExprFlags::RVALUE);
        p.typectx_pop();
        if let ExprKind::Local { init: slot, .. } = &mut p.ast[f].kind {
            *slot = Some(init);
        }
        let ity = p.ast[init].ty;
        let sess = &mut *p.sess;
        if !sess.types.iscompat(&mut sess.interner, fty, ity) {
            let got = p.fmt_type(ity);
            let expect = p.fmt_type(fty);
            p.error_node(
                init,
                format!("field initializer of type {got} where type {expect} is expected"),
            );
        }
        if p.currtok() != Tok::Comma {
            break;
        }
        p.next();
    }
    if i < group.len() {
        p.error_here("missing field initializer".to_string());
    }
    true
}

// function type in type position, e.g. "fun (int) int"
fn type_fun(p: &mut Parser<'_, '_>) -> TypeId {
    let f = p.mkexpr(
        ExprKind::Fun {
            name: None,
            params: Vec::new(),
            body: None,
            methodof: None,
        },
        ExprFlags::NONE,
    );
    p.next();
    fun_prototype(p, f, None, false);
    p.ast[f].ty
}

// =============================================================================
// Statements
// =============================================================================

// typedef = "type" id type
fn stmt_typedef(p: &mut Parser<'_, '_>) -> StmtId {
    let loc = p.currloc();
    p.next();
    let name = p.scanner.sym;
    let nameok = p.expect(Tok::Ident, "");

    let sid = p.ast.alloc_stmt(Stmt {
        kind: StmtKind::Typedef {
            name,
            ty: types::VOID,
        },
        loc,
    });
    if nameok {
        p.define(name, NodeRef::Stmt(sid));
    }

    let t = type_(p, Prec::Comma);
    if let StmtKind::Typedef { ty, .. } = &mut p.ast[sid].kind {
        *ty = t;
    }
    if nameok {
        // rebind the name to the resolved type so later lookups see the type
        p.scope.define(name, NodeRef::Type(t));
    }
    if let TypeKind::Struct { name: sn, .. } = &mut p.sess.types.node_mut(t).kind {
        *sn = Some(name);
    }
    sid
}

fn stmt_fun(p: &mut Parser<'_, '_>) -> StmtId {
    let loc = p.currloc();
    let f = fun(p, ExprFlags::NONE, None, true);
    p.ast.alloc_stmt(Stmt {
        kind: StmtKind::Fun(f),
        loc,
    })
}

// =============================================================================
// Identifiers and bindings
// =============================================================================

fn resolve_id(p: &mut Parser<'_, '_>, id: ExprId) {
    let name = match p.ast[id].kind {
        ExprKind::Id { name, .. } => name,
        _ => unreachable!(),
    };
    match p.lookup(name) {
        None => {
            let ns = p.sess.interner.resolve(name).to_string();
            p.error_node(id, format!("undeclared identifier \"{ns}\""));
        }
        Some(r @ NodeRef::Expr(target)) => {
            p.ast[id].ty = p.ast[target].ty;
            if let ExprKind::Id { target: slot, .. } = &mut p.ast[id].kind {
                *slot = Some(r);
            }
        }
        Some(r @ NodeRef::Type(t)) => {
            p.ast[id].ty = t;
            if let ExprKind::Id { target: slot, .. } = &mut p.ast[id].kind {
                *slot = Some(r);
            }
        }
        Some(r) => {
            let ns = p.sess.interner.resolve(name).to_string();
            let kind = p.ast.describe_ref(r);
            p.error_node(id, format!("cannot use {kind} \"{ns}\" as an expression"));
        }
    }
}

fn expr_id(p: &mut Parser<'_, '_>, fl: ExprFlags) -> ExprId {
    let n = p.mkexpr(
        ExprKind::Id {
            name: p.scanner.sym,
            target: None,
        },
        fl,
    );
    p.next();
    resolve_id(p, n);
    n
}

// var = ("let" | "var") id ( "=" expr | type ("=" expr)? )
fn expr_var(p: &mut Parser<'_, '_>, fl: ExprFlags) -> ExprId {
    let kind = if p.currtok() == Tok::KwLet {
        LocalKind::Let
    } else {
        LocalKind::Var
    };
    let loc = p.currloc();
    p.next();
    if p.currtok() != Tok::Ident {
        p.unexpected("expecting identifier");
        return p.mkbad();
    }
    let name = p.scanner.sym;
    let n = p.ast.alloc_expr(Expr {
        kind: ExprKind::Local {
            kind,
            name,
            init: None,
            is_this: false,
        },
        loc,
        flags: fl,
        ty: types::VOID,
        nrefs: 0,
    });
    p.next();

    let mut ok = true;
    let mut init: Option<ExprId> = None;
    if p.currtok() == Tok::Assign {
        p.next();
        p.typectx_push(types::VOID);
        let e = expr(p, Prec::Assign, fl | ExprFlags::RVALUE);
        p.typectx_pop();
        init = Some(e);
        p.ast[n].ty = p.ast[e].ty;
    } else {
        let t = type_(p, PREC_LOWEST);
        p.ast[n].ty = t;
        if p.currtok() == Tok::Assign {
            p.next();
            p.typectx_push(t);
            let e = expr(p, Prec::Assign, fl | ExprFlags::RVALUE);
            p.typectx_pop();
            init = Some(e);
            let ity = p.ast[e].ty;
            ok = p.check_types_compat(t, ity, Some(e));
        }
    }
    if let ExprKind::Local { init: slot, .. } = &mut p.ast[n].kind {
        *slot = init;
    }

    p.define(name, NodeRef::Expr(n));

    if init.is_none() && ok {
        if kind == LocalKind::Let {
            p.error_here("missing value for let binding, expecting '='".to_string());
        } else if matches!(p.sess.types.kind(p.ast[n].ty), TypeKind::Ref { .. }) {
            p.error_here("missing initial value for reference variable, expecting '='".to_string());
        }
    }

    n
}

// =============================================================================
// Blocks
// =============================================================================

fn clear_rvalue(p: &mut Parser<'_, '_>, id: ExprId) {
    p.ast[id].flags = p.ast[id].flags.without(ExprFlags::RVALUE);
    match p.ast[id].kind.clone() {
        ExprKind::If {
            then_block,
            else_block,
            ..
        } => {
            clear_rvalue(p, then_block);
            if let Some(eb) = else_block {
                clear_rvalue(p, eb);
            }
        }
        ExprKind::Block { children } => {
            for c in children {
                clear_rvalue(p, c);
            }
        }
        _ => {}
    }
}

// block = "{" (expr ";")* "}"
// The final expression carries the block's value in r-value position; all
// other children are demoted to statement context.
fn block(p: &mut Parser<'_, '_>, fl: ExprFlags) -> ExprId {
    let n = p.mkexpr(
        ExprKind::Block {
            children: Vec::new(),
        },
        fl,
    );
    p.next();

    let isrvalue = fl.has(ExprFlags::RVALUE);
    let fl = fl.without(ExprFlags::RVALUE);
    let mut children: Vec<ExprId> = Vec::new();
    let mut exit_expr_index = 0usize;
    let mut reported_unreachable = false;

    if p.currtok() != Tok::RBrace && p.currtok() != Tok::Eof {
        loop {
            let cn = expr(p, PREC_LOWEST, fl);
            children.push(cn);

            if p.ast[n].flags.has(ExprFlags::EXITS) {
                if !reported_unreachable {
                    reported_unreachable = true;
                    p.warning_node(cn, "unreachable code".to_string());
                }
            } else if matches!(p.ast[cn].kind, ExprKind::Return { .. }) {
                exit_expr_index = children.len() - 1;
                p.ast[n].flags = p.ast[n].flags.with(ExprFlags::EXITS);
            }

            if p.currtok() != Tok::Semi {
                break;
            }
            p.next(); // consume ";"

            if p.currtok() == Tok::RBrace || p.currtok() == Tok::Eof {
                break;
            }

            clear_rvalue(p, cn);
        }
    }

    p.expect2(Tok::RBrace, ", expected '}' or ';'");

    if !children.is_empty() {
        let mut index = children.len() - 1;
        if p.ast[n].flags.has(ExprFlags::EXITS) {
            index = exit_expr_index;
        }
        // the value expression carries the block's value (and type) when
        // the block is an r-value; otherwise it is demoted like the rest
        if isrvalue {
            p.ast[children[index]].flags = p.ast[children[index]].flags.with(ExprFlags::RVALUE);
        } else {
            clear_rvalue(p, children[index]);
        }
        p.ast[n].ty = p.ast[children[index]].ty;
    }

    if let ExprKind::Block { children: slot } = &mut p.ast[n].kind {
        *slot = children;
    }
    n
}

/// A `{ ... }` block, or a single expression wrapped in a block.
fn any_as_block(p: &mut Parser<'_, '_>, fl: ExprFlags) -> ExprId {
    if p.currtok() == Tok::LBrace {
        return block(p, fl);
    }
    let n = p.mkexpr(
        ExprKind::Block {
            children: Vec::new(),
        },
        fl,
    );
    let cn = expr(p, Prec::Comma, fl);
    p.ast[n].ty = p.ast[cn].ty;
    if let ExprKind::Block { children } = &mut p.ast[n].kind {
        children.push(cn);
    }
    n
}

fn expr_block(p: &mut Parser<'_, '_>, fl: ExprFlags) -> ExprId {
    p.enter_scope();
    let n = block(p, fl);
    p.leave_scope();
    n
}

// =============================================================================
// if / for / return
// =============================================================================

/// Validates an `if` condition and, for an optional-typed condition,
/// narrows: the referenced binding is cloned with the optional's element
/// type into the current (condition) scope, so references inside the
/// branches see the narrowed type. Returns the shadow binding whose
/// reference count is folded back into the original after the branches.
fn check_if_cond(p: &mut Parser<'_, '_>, cond: ExprId) -> Option<ExprId> {
    let cond_ty = p.ast[cond].ty;
    if cond_ty == types::BOOL {
        return None;
    }

    let TypeKind::Optional { elem } = *p.sess.types.kind(cond_ty) else {
        p.error_node(cond, "conditional is not a boolean".to_string());
        return None;
    };

    match p.ast[cond].kind.clone() {
        ExprKind::Id { name, target } => {
            // e.g. "if x { ... }"
            let Some(NodeRef::Expr(target)) = target else {
                p.error_node(cond, "conditional is not an expression".to_string());
                return None;
            };

            let ref2 = p.ast.clone_expr(target);
            p.ast[ref2].flags = p.ast[ref2].flags.with(ExprFlags::SHADOWS_OPTIONAL);
            p.ast[ref2].ty = elem;
            p.ast[ref2].nrefs = 0;
            p.define_replace(name, NodeRef::Expr(ref2));

            Some(ref2)
        }
        ExprKind::Local { .. } => {
            // e.g. "if let x = expr { ... }"
            p.ast[cond].ty = elem;
            p.ast[cond].flags = p.ast[cond].flags.with(ExprFlags::OPTIONAL);
            None
        }
        _ => None,
    }
}

fn expr_if(p: &mut Parser<'_, '_>, fl: ExprFlags) -> ExprId {
    let loc = p.currloc();
    p.next();

    // "cond" scope holds narrowed bindings for both branches
    p.enter_scope();

    let cond = expr(p, Prec::Comma, fl | ExprFlags::RVALUE);
    let narrowed = check_if_cond(p, cond);

    p.enter_scope();
    let then_block = any_as_block(p, fl);
    p.leave_scope();

    let mut else_block = None;
    if p.currtok() == Tok::KwElse {
        p.next();
        p.enter_scope();
        else_block = Some(any_as_block(p, fl));
        p.leave_scope();
    }

    p.leave_scope();

    // the if expression takes its value from the then branch
    let ty = p.ast[then_block].ty;
    let n = p.ast.alloc_expr(Expr {
        kind: ExprKind::If {
            cond,
            then_block,
            else_block,
        },
        loc,
        flags: fl,
        ty,
        nrefs: 0,
    });

    if let Some(nb) = narrowed {
        // fold the shadow's use count back into the original binding
        let mut dst = cond;
        while let ExprKind::Id {
            target: Some(NodeRef::Expr(t)),
            ..
        } = p.ast[dst].kind
        {
            dst = t;
        }
        p.ast[dst].nrefs += p.ast[nb].nrefs;
    }

    n
}

// for       = "for" ( for_head | "(" for_head ")" ) expr
// for_head  = expr | expr? ";" expr ";" expr?
fn expr_for(p: &mut Parser<'_, '_>, fl: ExprFlags) -> ExprId {
    let loc = p.currloc();
    p.next();
    let paren = p.currtok() == Tok::LParen;
    if paren {
        p.next();
    }

    let mut start = None;
    let mut end = None;
    let cond;
    if p.currtok() == Tok::Semi {
        // "for ; i < 4; i++"
        p.next();
        cond = expr(p, Prec::Comma, fl);
        p.expect(Tok::Semi, "");
        end = Some(expr(p, Prec::Comma, fl));
    } else {
        // "for i < 4"
        let first = expr(p, Prec::Comma, fl);
        if p.currtok() == Tok::Semi {
            // "for i = 0; i < 4; i++"
            p.next();
            start = Some(first);
            cond = expr(p, Prec::Comma, fl);
            p.expect(Tok::Semi, "");
            end = Some(expr(p, Prec::Comma, fl));
        } else {
            cond = first;
        }
    }
    if paren {
        p.expect(Tok::RParen, "");
    }
    let body = expr(p, Prec::Comma, fl);

    p.ast.alloc_expr(Expr {
        kind: ExprKind::For {
            start,
            cond,
            end,
            body,
        },
        loc,
        flags: fl,
        ty: types::VOID,
        nrefs: 0,
    })
}

// return = "return" expr?
fn expr_return(p: &mut Parser<'_, '_>, fl: ExprFlags) -> ExprId {
    let n = p.mkexpr(ExprKind::Return { value: None }, fl);
    p.next();
    if p.currtok() == Tok::Semi || p.currtok() == Tok::RBrace {
        return n;
    }
    let v = expr(p, Prec::Comma, fl | ExprFlags::RVALUE);
    p.ast[n].ty = p.ast[v].ty;
    if let ExprKind::Return { value } = &mut p.ast[n].kind {
        *value = Some(v);
    }
    n
}

// =============================================================================
// Literals
// =============================================================================

/// Picks the type of an integer literal from the type context. A specific
/// integer context fit-checks against that type's range, widened by one
/// when a unary minus prefix is present; any other context defaults to the
/// native int when the value fits, then i64, then u64.
fn select_int_type(p: &mut Parser<'_, '_>, n: ExprId, value: u64, isneg: bool) -> TypeId {
    let ctx = p.typectx;
    let unsigned = p.sess.types.node(ctx).is_unsigned;
    let neg1 = isneg as u64;

    let (maxval, ty) = match *p.sess.types.kind(ctx) {
        TypeKind::I8 | TypeKind::U8 => (
            if unsigned { 0xff } else { 0x7f + neg1 },
            ctx,
        ),
        TypeKind::I16 | TypeKind::U16 => (
            if unsigned { 0xffff } else { 0x7fff + neg1 },
            ctx,
        ),
        TypeKind::I32 | TypeKind::U32 => (
            if unsigned {
                0xffff_ffff
            } else {
                0x7fff_ffff + neg1
            },
            ctx,
        ),
        TypeKind::I64 | TypeKind::U64 => (
            if unsigned {
                u64::MAX
            } else {
                0x7fff_ffff_ffff_ffff + neg1
            },
            ctx,
        ),
        _ => {
            // any other context: native int, else i64 (u64 when non-negative
            // and too large for i64)
            let intbits = p.sess.types.target.intsize * 8;
            let int_signed_max = (1u64 << (intbits - 1)) - 1;
            if isneg {
                if value <= int_signed_max + 1 {
                    return types::INT;
                }
                if value <= 0x8000_0000_0000_0000 {
                    return types::I64;
                }
                (0x8000_0000_0000_0000, types::I64)
            } else {
                if value <= int_signed_max {
                    return types::INT;
                }
                if value <= i64::MAX as u64 {
                    return types::I64;
                }
                (u64::MAX, types::U64)
            }
        }
    };

    if value > maxval {
        let ts = p.fmt_type(ty);
        let lit = p.scanner.lit().to_string();
        let sign = if isneg { "-" } else { "" };
        p.error_node(n, format!("integer constant {sign}{lit} overflows {ts}"));
    }
    ty
}

fn intlit(p: &mut Parser<'_, '_>, fl: ExprFlags, isneg: bool) -> ExprId {
    let value = p.scanner.int_val;
    let n = p.mkexpr(ExprKind::IntLit { value }, fl);
    p.ast[n].ty = select_int_type(p, n, value, isneg);
    p.next();
    n
}

fn floatlit(p: &mut Parser<'_, '_>, fl: ExprFlags, isneg: bool) -> ExprId {
    let n = p.mkexpr(ExprKind::FloatLit { value: 0.0 }, fl);

    // the scanner leaves a '+' in the literal buffer's sign slot
    let mut lit = p.scanner.float_lit.clone();
    if isneg {
        lit.replace_range(0..1, "-");
    }

    if p.typectx == types::F32 {
        p.ast[n].ty = types::F32;
        match parse_float_lit(&lit).map(|v| v as f32) {
            None => p.error_node(n, "invalid floating-point constant".to_string()),
            Some(v) if v.is_infinite() => {
                p.error_node(n, "32-bit floating-point constant too large".to_string());
            }
            Some(v) => {
                if let ExprKind::FloatLit { value } = &mut p.ast[n].kind {
                    *value = v as f64;
                }
            }
        }
    } else {
        p.ast[n].ty = types::F64;
        match parse_float_lit(&lit) {
            None => p.error_node(n, "invalid floating-point constant".to_string()),
            Some(v) if v.is_infinite() => {
                p.error_node(n, "64-bit floating-point constant too large".to_string());
            }
            Some(v) => {
                if let ExprKind::FloatLit { value } = &mut p.ast[n].kind {
                    *value = v;
                }
            }
        }
    }

    p.next();
    n
}

fn expr_intlit(p: &mut Parser<'_, '_>, fl: ExprFlags) -> ExprId {
    intlit(p, fl, false)
}

fn expr_floatlit(p: &mut Parser<'_, '_>, fl: ExprFlags) -> ExprId {
    floatlit(p, fl, false)
}

// =============================================================================
// Operators
// =============================================================================

fn expr_prefix_op(p: &mut Parser<'_, '_>, fl: ExprFlags) -> ExprId {
    let op = p.currtok();
    let loc = p.currloc();
    p.next();
    let fl2 = fl | ExprFlags::RVALUE;
    let operand = match p.currtok() {
        // negative number constants bind to the literal
        Tok::IntLit => intlit(p, fl2, op == Tok::Minus),
        Tok::FloatLit => floatlit(p, fl2, op == Tok::Minus),
        _ => expr(p, Prec::UnaryPrefix, fl2),
    };
    let ty = p.ast[operand].ty;
    p.ast.alloc_expr(Expr {
        kind: ExprKind::Prefix { op, expr: operand },
        loc,
        flags: fl,
        ty,
        nrefs: 0,
    })
}

fn expr_infix_op(p: &mut Parser<'_, '_>, prec: Prec, left: ExprId, fl: ExprFlags) -> ExprId {
    let op = p.currtok();
    let loc = p.currloc();
    p.next();

    p.ast[left].flags = p.ast[left].flags.with(ExprFlags::RVALUE);
    let lty = p.ast[left].ty;

    // assignment is right-associative; everything else binds left
    let rhs_floor = if is_assign_op(op) { prec } else { prec.succ() };

    p.typectx_push(lty);
    let right = expr(p, rhs_floor, fl | ExprFlags::RVALUE);
    p.typectx_pop();

    p.ast.alloc_expr(Expr {
        kind: ExprKind::Binop { op, left, right },
        loc,
        flags: fl,
        ty: lty,
        nrefs: 0,
    })
}

fn expr_cmp_op(p: &mut Parser<'_, '_>, prec: Prec, left: ExprId, fl: ExprFlags) -> ExprId {
    let n = expr_infix_op(p, prec, left, fl);
    p.ast[n].ty = types::BOOL;
    n
}

// postfix_op = expr ("++" | "--")
fn expr_postfix_op(p: &mut Parser<'_, '_>, _prec: Prec, left: ExprId, fl: ExprFlags) -> ExprId {
    let op = p.currtok();
    let loc = p.currloc();
    p.next();
    let ty = p.ast[left].ty;
    p.ast.alloc_expr(Expr {
        kind: ExprKind::Postfix { op, expr: left },
        loc,
        flags: fl,
        ty,
        nrefs: 0,
    })
}

// deref_expr = "*" expr
fn expr_deref(p: &mut Parser<'_, '_>, fl: ExprFlags) -> ExprId {
    let loc = p.currloc();
    p.next();
    let operand = expr(p, Prec::UnaryPrefix, fl);
    let oty = p.ast[operand].ty;

    let n = p.ast.alloc_expr(Expr {
        kind: ExprKind::Deref { expr: operand },
        loc,
        flags: fl,
        ty: types::VOID,
        nrefs: 0,
    });

    match *p.sess.types.kind(oty) {
        TypeKind::Ref { elem, .. } => p.ast[n].ty = elem,
        _ => {
            let ts = p.fmt_type(oty);
            p.error_node(n, format!("dereferencing non-reference value of type {ts}"));
        }
    }
    n
}

/// True when the expression denotes storage a reference can point at.
fn expr_isstorage(p: &Parser<'_, '_>, id: ExprId) -> bool {
    match &p.ast[id].kind {
        ExprKind::Id { target, .. } => match target {
            Some(NodeRef::Expr(t)) => expr_isstorage(p, *t),
            _ => false,
        },
        ExprKind::Member { .. }
        | ExprKind::Local { .. }
        | ExprKind::Fun { .. }
        | ExprKind::Deref { .. } => true,
        _ => false,
    }
}

/// True when the expression denotes something that can be mutated.
fn expr_ismut(p: &Parser<'_, '_>, id: ExprId) -> bool {
    match &p.ast[id].kind {
        ExprKind::Id { target, .. } => match target {
            Some(NodeRef::Expr(t)) => expr_ismut(p, *t),
            _ => false,
        },
        ExprKind::Member { recv, target, .. } => {
            let recv_mut = expr_ismut(p, *recv);
            match target {
                Some(NodeRef::Expr(t)) => recv_mut && expr_ismut(p, *t),
                _ => recv_mut,
            }
        }
        ExprKind::Local { kind, .. } => {
            matches!(kind, LocalKind::Var | LocalKind::Param)
        }
        _ => false,
    }
}

// ref_expr = "&" location | "mut" "&" location
fn expr_ref1(p: &mut Parser<'_, '_>, is_mut: bool, fl: ExprFlags) -> ExprId {
    let op = p.currtok();
    let loc = p.currloc();
    p.next();
    let operand = expr(p, Prec::UnaryPrefix, fl | ExprFlags::RVALUE);
    let oty = p.ast[operand].ty;

    let n = p.ast.alloc_expr(Expr {
        kind: ExprKind::Prefix { op, expr: operand },
        loc,
        flags: fl,
        ty: types::VOID,
        nrefs: 0,
    });

    if matches!(p.sess.types.kind(oty), TypeKind::Ref { .. }) {
        let ts = p.fmt_type(oty);
        p.error_node(n, format!("referencing reference type {ts}"));
    } else if !expr_isstorage(p, operand) {
        let ts = p.fmt_type(oty);
        p.error_node(n, format!("referencing ephemeral value of type {ts}"));
    } else if is_mut && !expr_ismut(p, operand) {
        let s = p.fmt_expr(operand);
        let kind = match &p.ast[operand].kind {
            ExprKind::Id {
                target: Some(r), ..
            } => p.ast.describe_ref(*r),
            other => other.describe(),
        };
        p.error_node(n, format!("mutable reference to immutable {kind} {s}"));
    }

    let t = p.sess.types.mk_ref(oty, is_mut);
    p.ast[n].ty = t;
    n
}

fn expr_ref(p: &mut Parser<'_, '_>, fl: ExprFlags) -> ExprId {
    expr_ref1(p, false, fl)
}

// mut_expr = "mut" ref_expr
fn expr_mut(p: &mut Parser<'_, '_>, fl: ExprFlags) -> ExprId {
    p.next();
    if p.currtok() != Tok::Amp {
        p.unexpected("expecting '&'");
        return p.mkbad();
    }
    expr_ref1(p, true, fl)
}

// group = "(" expr ")"
fn expr_group(p: &mut Parser<'_, '_>, fl: ExprFlags) -> ExprId {
    p.next();
    let n = expr(p, Prec::Comma, fl);
    p.expect(Tok::RParen, "");
    n
}

// =============================================================================
// Calls
// =============================================================================

// named_param_or_id = id ":" expr | id
fn named_param_or_id(p: &mut Parser<'_, '_>, fl: ExprFlags) -> ExprId {
    debug_assert_eq!(p.currtok(), Tok::Ident);
    let name = p.scanner.sym;
    let loc = p.currloc();
    p.next();
    if p.currtok() == Tok::Colon {
        p.next();
        let init = expr(p, Prec::Comma, fl);
        let ty = p.ast[init].ty;
        p.ast.alloc_expr(Expr {
            kind: ExprKind::Local {
                kind: LocalKind::Param,
                name,
                init: Some(init),
                is_this: false,
            },
            loc,
            flags: fl,
            ty,
            nrefs: 0,
        })
    } else {
        let n = p.ast.alloc_expr(Expr {
            kind: ExprKind::Id { name, target: None },
            loc,
            flags: fl,
            ty: types::VOID,
            nrefs: 0,
        });
        resolve_id(p, n);
        n
    }
}

/// Parameter types used as type context for call arguments. For a function
/// callee the `this` parameter is skipped; for a struct (constructor call)
/// the field types apply.
fn callee_param_types(p: &Parser<'_, '_>, left: ExprId, recvtype: TypeId) -> Vec<TypeId> {
    match p.sess.types.kind(recvtype) {
        TypeKind::Fun { params, .. } => {
            let mut tys = params.clone();
            // a method's funtype carries the receiver as its first parameter
            let callee_fun = match p.ast[left].kind {
                ExprKind::Id {
                    target: Some(NodeRef::Expr(t)),
                    ..
                } => Some(t),
                ExprKind::Fun { .. } => Some(left),
                _ => None,
            };
            if let Some(f) = callee_fun {
                if let ExprKind::Fun { params: pexprs, .. } = &p.ast[f].kind {
                    if let Some(&p0) = pexprs.first() {
                        if matches!(p.ast[p0].kind, ExprKind::Local { is_this: true, .. })
                            && !tys.is_empty()
                        {
                            tys.remove(0);
                        }
                    }
                }
            }
            tys
        }
        TypeKind::Struct { fields, .. } => fields.iter().map(|f| f.ty).collect(),
        _ => Vec::new(),
    }
}

// args = arg (("," | ";") arg)* ("," | ";")?
// arg  = expr | id ":" expr
fn call_args(
    p: &mut Parser<'_, '_>,
    args: &mut Vec<ExprId>,
    param_tys: &[TypeId],
    fl: ExprFlags,
) {
    p.typectx_push(types::VOID);

    let mut paramidx = 0usize;
    loop {
        let t = param_tys.get(paramidx).copied().unwrap_or(types::VOID);
        paramidx += 1;
        p.typectx_push(t);

        let arg = if p.currtok() == Tok::Ident {
            named_param_or_id(p, fl)
        } else {
            expr(p, Prec::Comma, fl)
        };

        p.typectx_pop();
        args.push(arg);

        if p.currtok() != Tok::Semi && p.currtok() != Tok::Comma {
            break;
        }
        p.next();
        if p.currtok() == Tok::RParen {
            break;
        }
    }

    p.typectx_pop();
}

// call = expr "(" args? ")"
fn expr_postfix_call(p: &mut Parser<'_, '_>, _prec: Prec, left: ExprId, fl: ExprFlags) -> ExprId {
    let loc = p.currloc();
    p.next();
    p.ast[left].flags = p.ast[left].flags.with(ExprFlags::RVALUE);

    let left_ty = p.ast[left].ty;
    let callee_type = match p.ast[left].kind {
        ExprKind::Id {
            target: Some(NodeRef::Type(t)),
            ..
        } => Some(t),
        _ => None,
    };

    let n = p.ast.alloc_expr(Expr {
        kind: ExprKind::Call {
            recv: left,
            args: Vec::new(),
        },
        loc,
        flags: fl,
        ty: types::VOID,
        nrefs: 0,
    });

    let recvtype;
    if let Some(t) = callee_type {
        // type call: cast or constructor
        p.ast[n].ty = t;
        recvtype = t;
    } else if let TypeKind::Fun { result, .. } = *p.sess.types.kind(left_ty) {
        p.ast[n].ty = result;
        recvtype = left_ty;
    } else if left_ty == types::VOID {
        // unresolved callee (member access, bad node); resolution of the
        // call target is deferred to semantic analysis
        recvtype = types::VOID;
    } else {
        let what = self_fmt(p, left_ty);
        p.error_node(n, format!("calling {what}; expected function or type"));
        recvtype = types::VOID;
    }

    let mut args = Vec::new();
    if p.currtok() != Tok::RParen {
        let param_tys = callee_param_types(p, left, recvtype);
        call_args(p, &mut args, &param_tys, fl);
    }
    p.expect(Tok::RParen, "to end function call");

    // eliminate casts to the same type, e.g. "i8(x)" where x: i8
    if callee_type.is_some() && args.len() == 1 {
        let aty = p.ast[args[0]].ty;
        let nty = p.ast[n].ty;
        let sess = &mut *p.sess;
        if sess.types.iscompat(&mut sess.interner, aty, nty) {
            return args[0];
        }
    }

    if let ExprKind::Call { args: slot, .. } = &mut p.ast[n].kind {
        *slot = args;
    }
    n
}

fn self_fmt(p: &Parser<'_, '_>, t: TypeId) -> String {
    p.sess.types.fmt_type(&p.sess.interner, t)
}

// subscript = expr "[" ... "]": parsed but not supported by the type
// system yet; reports and yields a bad node.
fn expr_postfix_subscript(
    p: &mut Parser<'_, '_>,
    _prec: Prec,
    _left: ExprId,
    _fl: ExprFlags,
) -> ExprId {
    let n = p.mkbad();
    p.error_here("subscript expressions are not supported yet".to_string());
    p.next();
    p.fastforward(&[Tok::RBrack, Tok::Semi]);
    if p.currtok() == Tok::RBrack {
        p.next();
    }
    n
}

// member = expr "." id
fn expr_postfix_member(p: &mut Parser<'_, '_>, _prec: Prec, left: ExprId, fl: ExprFlags) -> ExprId {
    let loc = p.currloc();
    p.next();
    p.ast[left].flags = p.ast[left].flags.with(ExprFlags::RVALUE);
    let name = p.scanner.sym;
    let n = p.ast.alloc_expr(Expr {
        kind: ExprKind::Member {
            recv: left,
            name,
            target: None,
        },
        loc,
        flags: fl,
        ty: types::VOID,
        nrefs: 0,
    });
    p.expect(Tok::Ident, "");
    n
}

// dotmember = "." id, the leading-dot shorthand for the current receiver
fn expr_dotmember(p: &mut Parser<'_, '_>, fl: ExprFlags) -> ExprId {
    let Some(dotctx) = p.dotctx else {
        p.error_here("\".\" shorthand outside of context".to_string());
        let n = p.mkbad();
        p.fastforward_semi();
        return n;
    };
    expr_postfix_member(p, Prec::Member, dotctx, fl)
}

// =============================================================================
// Functions and methods
// =============================================================================

/// Receiver passing mode: small immutable receivers (primitives, structs
/// with align ≤ pointer size and size ≤ 2× pointer size) go by value,
/// everything else by reference.
fn this_param_type(p: &mut Parser<'_, '_>, recvt: TypeId, is_mut: bool) -> TypeId {
    if !is_mut {
        if p.sess.types.is_prim(recvt) {
            return recvt;
        }
        if let TypeKind::Struct { .. } = p.sess.types.kind(recvt) {
            let node = p.sess.types.node(recvt);
            let ptrsize = p.sess.types.target.ptrsize;
            if node.align <= ptrsize && node.size <= ptrsize * 2 {
                return recvt;
            }
        }
    }
    p.sess.types.mk_ref(recvt, is_mut)
}

fn this_param(p: &mut Parser<'_, '_>, methodof: Option<TypeId>, param: ExprId, is_mut: bool) {
    let Some(recvt) = methodof else {
        p.ast[param].ty = types::VOID;
        p.ast[param].nrefs = 1; // silence unused-parameter analysis
        p.error_node(
            param,
            "\"this\" parameter of non-method function".to_string(),
        );
        return;
    };
    if let ExprKind::Local { is_this, .. } = &mut p.ast[param].kind {
        *is_this = true;
    }
    p.ast[param].ty = this_param_type(p, recvt, is_mut);
}

// params = "(" param (sep param)* sep? ")"
// param  = id type? | type
// sep    = "," | ";"
//
// e.g.  (T)  (x T)  (x, y T)  (T1, T2, T3)
//
// Returns (params, has_named_params).
fn fun_params(p: &mut Parser<'_, '_>, methodof: Option<TypeId>) -> (Vec<ExprId>, bool) {
    let mut params: Vec<ExprId> = Vec::new();
    let mut is_nametype = false; // at least one param has "name type" form

    // typeq holds parameters of a typed group whose type is still pending,
    // e.g. "x" and "y" while parsing "x, y int"; it also holds what might
    // turn out to be types in the type-only form "T1, T2".
    let mut typeq: Vec<ExprId> = Vec::new();
    let mut typed = Vec::new(); // parallel to params: explicit type seen

    while p.currtok() != Tok::Eof {
        let param = p.mkexpr(
            ExprKind::Local {
                kind: LocalKind::Param,
                name: p.sess.syms.blank,
                init: None,
                is_this: false,
            },
            ExprFlags::NONE,
        );
        params.push(param);
        typed.push(false);

        let mut this_ismut = false;
        if p.currtok() == Tok::KwMut && params.len() == 1 {
            let this_sym = p.sess.syms.this_;
            if p.scanner.lookahead_is_ident(p.sess, this_sym) {
                this_ismut = true;
                p.next();
            }
        }

        if p.currtok() == Tok::Ident {
            // could be a parameter name or a type; assume name for now
            let name = p.scanner.sym;
            let loc = p.currloc();
            if let ExprKind::Local { name: slot, .. } = &mut p.ast[param].kind {
                *slot = name;
            }
            p.ast[param].loc = loc;
            p.next();

            if name == p.sess.syms.this_ && params.len() == 1 {
                is_nametype = true;
                this_param(p, methodof, param, this_ismut);
                *typed.last_mut().unwrap() = true;
            } else {
                match p.currtok() {
                    Tok::RParen | Tok::Comma | Tok::Semi => {
                        // just a name, e.g. "x" in "(x, y T)"
                        typeq.push(param);
                    }
                    _ => {
                        // type follows the name, e.g. "int" in "x int"
                        let t = type_(p, PREC_LOWEST);
                        p.ast[param].ty = t;
                        *typed.last_mut().unwrap() = true;
                        is_nametype = true;
                        // cascade the type to the pending group
                        for &prev in &typeq {
                            p.ast[prev].ty = t;
                            let idx = params.iter().position(|&q| q == prev).unwrap();
                            typed[idx] = true;
                        }
                        typeq.clear();
                    }
                }
            }
        } else {
            // definitely a type
            let t = type_(p, PREC_LOWEST);
            p.ast[param].ty = t;
            *typed.last_mut().unwrap() = true;
        }

        match p.currtok() {
            Tok::Comma | Tok::Semi => {
                p.next();
                if p.currtok() == Tok::RParen {
                    break; // trailing separator
                }
            }
            Tok::RParen => break,
            _ => {
                p.unexpected("expecting ',' ';' or ')'");
                p.fastforward(&[Tok::RParen, Tok::Semi]);
                break;
            }
        }
    }

    if is_nametype {
        // name-and-type form: every group must end with a type,
        // e.g. "(x, y int, z)" is missing one
        if !typeq.is_empty() {
            p.error_here("expecting type".to_string());
            for (i, &param) in params.iter().enumerate() {
                if !typed[i] {
                    p.ast[param].ty = types::VOID;
                }
            }
        }
    } else {
        // type-only form, e.g. "(T, T, Y)": names were actually types
        let blank = p.sess.syms.blank;
        for (i, &param) in params.iter().enumerate() {
            if typed[i] {
                continue;
            }
            let name = match p.ast[param].kind {
                ExprKind::Local { name, .. } => name,
                _ => unreachable!(),
            };
            let t = named_type(p, name, Some(param));
            p.ast[param].ty = t;
            if let ExprKind::Local { name: slot, .. } = &mut p.ast[param].kind {
                *slot = blank;
            }
        }
    }

    (params, is_nametype)
}

/// Maintains the receiver's method table. Duplicate methods and collisions
/// with a same-named field report with a reference to the prior definition.
fn add_method(p: &mut Parser<'_, '_>, f: ExprId, name_loc: SrcLoc) {
    let (name, methodof) = match &p.ast[f].kind {
        ExprKind::Fun {
            name: Some(n),
            methodof: Some(m),
            ..
        } => (*n, *m),
        _ => return,
    };
    debug_assert!(name != p.sess.syms.blank);

    let existing_method = p.methodmap.get(&methodof).and_then(|mm| mm.get(&name)).copied();
    let existing = existing_method.or_else(|| {
        p.sess
            .types
            .struct_field(methodof, name)
            .map(|sf| sf.expr)
    });

    if let Some(existing) = existing {
        let ns = p.sess.interner.resolve(name).to_string();
        let ts = p.fmt_type(methodof);
        let range = SrcRange::at(name_loc);
        if matches!(p.ast[existing].kind, ExprKind::Fun { .. }) {
            p.error_at(range, format!("duplicate method \"{ns}\" for type {ts}"));
        } else {
            let what = p.ast[existing].kind.describe();
            p.error_at(
                range,
                format!("duplicate member \"{ns}\" for type {ts}, conflicts with {what}"),
            );
        }
        if p.ast[existing].loc.line != 0 {
            p.warning_node(existing, "previously defined here".to_string());
        }
        return;
    }

    p.methodmap.entry(methodof).or_default().insert(name, f);
}

/// Parses a function's name, which may be a method name of the form
/// `Recv.name` or a plain name inside a struct (type context).
fn fun_name(p: &mut Parser<'_, '_>, f: ExprId, recv: Option<TypeId>) {
    let name = p.scanner.sym;
    let mut name_loc = p.currloc();
    if let ExprKind::Fun { name: slot, .. } = &mut p.ast[f].kind {
        *slot = Some(name);
    }
    p.next();

    let methodof;
    if let Some(recv) = recv {
        // defined inside a type context, e.g. "type Foo { fun bar() {} }"
        methodof = recv;
    } else {
        if p.currtok() != Tok::Dot {
            return; // plain function name
        }
        p.next();

        // resolve the receiver, e.g. "Foo" in "fun Foo.bar()"
        let ns = p.sess.interner.resolve(name).to_string();
        match p.lookup(name) {
            None => {
                p.error_at(
                    SrcRange::at(name_loc),
                    format!("undeclared identifier \"{ns}\""),
                );
                return;
            }
            Some(NodeRef::Type(t)) => methodof = t,
            Some(_) => {
                p.error_at(SrcRange::at(name_loc), format!("{ns} is not a type"));
                return;
            }
        }

        // method name, e.g. "bar" in "Foo.bar"
        let mname = p.scanner.sym;
        name_loc = p.currloc();
        if let ExprKind::Fun { name: slot, .. } = &mut p.ast[f].kind {
            *slot = Some(mname);
        }
        if !p.expect(Tok::Ident, "after '.'") {
            return;
        }
    }

    if let ExprKind::Fun { methodof: slot, .. } = &mut p.ast[f].kind {
        *slot = Some(methodof);
    }
    add_method(p, f, name_loc);
}

/// Parses name, parameters and result type and resolves the canonical
/// function type. Returns (has_named_params, prototype_ok).
fn fun_prototype(
    p: &mut Parser<'_, '_>,
    f: ExprId,
    methodof: Option<TypeId>,
    requirename: bool,
) -> (bool, bool) {
    if p.currtok() == Tok::Ident {
        fun_name(p, f, methodof);
    } else if requirename {
        p.error_here("missing function name".to_string());
    }

    let mut has_named_params = false;
    if !p.expect(Tok::LParen, "for parameters") {
        p.fastforward(&[Tok::LBrace, Tok::Semi]);
        return (has_named_params, false);
    }
    let fun_methodof = match p.ast[f].kind {
        ExprKind::Fun { methodof, .. } => methodof,
        _ => None,
    };
    let mut params = Vec::new();
    if p.currtok() != Tok::RParen {
        let (ps, named) = fun_params(p, fun_methodof);
        params = ps;
        has_named_params = named;
    }
    p.expect(Tok::RParen, "to end parameters");

    // result type; "fun foo() {}" means "fun foo() void {}"
    let mut result = types::VOID;
    if p.currtok() != Tok::LBrace {
        result = type_(p, Prec::Member);
    }

    let param_tys: Vec<TypeId> = params.iter().map(|&q| p.ast[q].ty).collect();
    let sess = &mut *p.sess;
    let ft = sess.types.funtype(&mut sess.interner, param_tys, result);
    p.ast[f].ty = ft;
    if let ExprKind::Fun { params: slot, .. } = &mut p.ast[f].kind {
        *slot = params;
    }

    (has_named_params, true)
}

fn fun_body(p: &mut Parser<'_, '_>, f: ExprId, mut fl: ExprFlags) {
    let (params, ft) = match &p.ast[f].kind {
        ExprKind::Fun { params, .. } => (params.clone(), p.ast[f].ty),
        _ => unreachable!(),
    };
    let has_this = params
        .first()
        .is_some_and(|&p0| matches!(p.ast[p0].kind, ExprKind::Local { is_this: true, .. }));
    if has_this {
        p.dotctx_push(Some(params[0]));
    }

    let result = match *p.sess.types.kind(ft) {
        TypeKind::Fun { result, .. } => result,
        _ => types::VOID,
    };

    fl = fl.with(ExprFlags::RVALUE);
    if result == types::VOID {
        fl = fl.without(ExprFlags::RVALUE);
    }

    p.typectx_push(result);
    p.enter_scope();

    let body = any_as_block(p, fl);

    // a function body block is never an expression itself, even when it
    // carries an implicit return value
    p.ast[body].flags = p.ast[body].flags.without(ExprFlags::RVALUE);
    if let ExprKind::Fun { body: slot, .. } = &mut p.ast[f].kind {
        *slot = Some(body);
    }

    p.leave_scope();
    p.typectx_pop();

    if has_this {
        p.dotctx_pop();
    }
}

// fundef = "fun" name? "(" params? ")" result? ( ";" | body )
fn fun(p: &mut Parser<'_, '_>, fl: ExprFlags, methodof: Option<TypeId>, requirename: bool) -> ExprId {
    let n = p.mkexpr(
        ExprKind::Fun {
            name: None,
            params: Vec::new(),
            body: None,
            methodof,
        },
        fl,
    );
    p.next();
    let (has_named_params, proto_ok) = fun_prototype(p, n, methodof, requirename);

    // define a named non-method function before its body so it can recurse
    let (name, is_method) = match &p.ast[n].kind {
        ExprKind::Fun { name, methodof, .. } => (*name, methodof.is_some()),
        _ => unreachable!(),
    };
    if let Some(name) = name {
        if proto_ok && !is_method {
            p.define(name, NodeRef::Expr(n));
        }
    }

    // named parameters go into the function scope
    let params = match &p.ast[n].kind {
        ExprKind::Fun { params, .. } => params.clone(),
        _ => unreachable!(),
    };
    if has_named_params {
        p.enter_scope();
        for &param in &params {
            let pname = match p.ast[param].kind {
                ExprKind::Local { name, .. } => name,
                _ => unreachable!(),
            };
            p.define(pname, NodeRef::Expr(param));
        }
    }

    if p.currtok() != Tok::Semi {
        if !has_named_params && !params.is_empty() {
            p.error_here("function without named arguments can't have a body".to_string());
        }
        fun_body(p, n, fl);
    }

    if has_named_params {
        p.leave_scope();
    }

    n
}

fn expr_fun(p: &mut Parser<'_, '_>, fl: ExprFlags) -> ExprId {
    fun(p, fl, None, false)
}
