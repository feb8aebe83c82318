//! Arena-allocated abstract syntax tree.
//!
//! All nodes live in typed arenas owned by [`Ast`]; cross references are
//! plain `u32` ids. Nodes share a common prefix (kind, location, flags) by
//! embedding rather than virtual dispatch; expression nodes additionally
//! carry a resolved type and a use-site reference counter.

use core::marker::PhantomData;
use core::ops::{Index, IndexMut};

use crate::diag::SrcLoc;
use crate::intern::{Interner, Symbol};
use crate::token::Tok;
use crate::types::TypeId;

/// Type-safe identifier for arena-allocated nodes.
#[derive(Debug)]
#[repr(transparent)]
pub struct Id<T> {
    raw: u32,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for Id<T> {
    #[inline]
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Id<T> {}

impl<T> PartialEq for Id<T> {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl<T> Eq for Id<T> {}

impl<T> core::hash::Hash for Id<T> {
    #[inline]
    fn hash<H: core::hash::Hasher>(&self, state: &mut H) {
        self.raw.hash(state);
    }
}

impl<T> Id<T> {
    #[inline]
    pub const fn from_raw(raw: u32) -> Self {
        Self {
            raw,
            _marker: PhantomData,
        }
    }

    #[inline]
    pub const fn to_usize(self) -> usize {
        self.raw as usize
    }

    #[inline]
    pub const fn raw(self) -> u32 {
        self.raw
    }
}

pub type ExprId = Id<Expr>;
pub type StmtId = Id<Stmt>;

/// Handle to any node a name can resolve to.
///
/// Packs into a single word for the scope stack: low two bits are the
/// category tag, the rest is the arena index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeRef {
    Expr(ExprId),
    Stmt(StmtId),
    Type(TypeId),
}

impl NodeRef {
    const TAG_EXPR: u64 = 0;
    const TAG_STMT: u64 = 1;
    const TAG_TYPE: u64 = 2;

    #[inline]
    pub fn to_bits(self) -> u64 {
        match self {
            NodeRef::Expr(id) => ((id.raw() as u64) << 2) | Self::TAG_EXPR,
            NodeRef::Stmt(id) => ((id.raw() as u64) << 2) | Self::TAG_STMT,
            NodeRef::Type(id) => ((id.as_u32() as u64) << 2) | Self::TAG_TYPE,
        }
    }

    #[inline]
    pub fn from_bits(bits: u64) -> Self {
        let idx = (bits >> 2) as u32;
        match bits & 3 {
            Self::TAG_EXPR => NodeRef::Expr(ExprId::from_raw(idx)),
            Self::TAG_STMT => NodeRef::Stmt(StmtId::from_raw(idx)),
            Self::TAG_TYPE => NodeRef::Type(TypeId::from_raw(idx)),
            _ => unreachable!("invalid NodeRef tag"),
        }
    }

    #[inline]
    pub fn as_expr(self) -> Option<ExprId> {
        match self {
            NodeRef::Expr(id) => Some(id),
            _ => None,
        }
    }

    #[inline]
    pub fn as_type(self) -> Option<TypeId> {
        match self {
            NodeRef::Type(id) => Some(id),
            _ => None,
        }
    }
}

/// Expression flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(transparent)]
pub struct ExprFlags(u8);

impl ExprFlags {
    /// The expression's value is used.
    pub const RVALUE: ExprFlags = ExprFlags(1 << 0);
    /// Control flow exits through this expression (e.g. contains `return`).
    pub const EXITS: ExprFlags = ExprFlags(1 << 1);
    /// Binding holds a narrowed optional (`if let`-style condition).
    pub const OPTIONAL: ExprFlags = ExprFlags(1 << 2);
    /// Binding shadows an optional-typed binding with its element type.
    pub const SHADOWS_OPTIONAL: ExprFlags = ExprFlags(1 << 3);

    pub const NONE: ExprFlags = ExprFlags(0);

    #[inline]
    pub const fn has(self, f: ExprFlags) -> bool {
        self.0 & f.0 != 0
    }

    #[inline]
    pub const fn with(self, f: ExprFlags) -> ExprFlags {
        ExprFlags(self.0 | f.0)
    }

    #[inline]
    pub const fn without(self, f: ExprFlags) -> ExprFlags {
        ExprFlags(self.0 & !f.0)
    }
}

impl std::ops::BitOr for ExprFlags {
    type Output = ExprFlags;
    #[inline]
    fn bitor(self, rhs: ExprFlags) -> ExprFlags {
        self.with(rhs)
    }
}

/// Kind of a local binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalKind {
    Let,
    Var,
    Param,
    Field,
}

impl LocalKind {
    pub const fn describe(self) -> &'static str {
        match self {
            LocalKind::Let => "let",
            LocalKind::Var => "var",
            LocalKind::Param => "parameter",
            LocalKind::Field => "field",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    /// Placeholder produced on parse errors.
    Bad,
    /// Identifier use; `target` is the resolved binding.
    Id {
        name: Symbol,
        target: Option<NodeRef>,
    },
    IntLit {
        value: u64,
    },
    FloatLit {
        value: f64,
    },
    BoolLit {
        value: bool,
    },
    /// `let`/`var` bindings, parameters and struct fields.
    Local {
        kind: LocalKind,
        name: Symbol,
        init: Option<ExprId>,
        is_this: bool,
    },
    /// Function definition or literal; `ty` holds the canonical funtype.
    Fun {
        name: Option<Symbol>,
        params: Vec<ExprId>,
        body: Option<ExprId>,
        methodof: Option<TypeId>,
    },
    Block {
        children: Vec<ExprId>,
    },
    If {
        cond: ExprId,
        then_block: ExprId,
        else_block: Option<ExprId>,
    },
    For {
        start: Option<ExprId>,
        cond: ExprId,
        end: Option<ExprId>,
        body: ExprId,
    },
    Return {
        value: Option<ExprId>,
    },
    Prefix {
        op: Tok,
        expr: ExprId,
    },
    Postfix {
        op: Tok,
        expr: ExprId,
    },
    Deref {
        expr: ExprId,
    },
    Binop {
        op: Tok,
        left: ExprId,
        right: ExprId,
    },
    Call {
        recv: ExprId,
        args: Vec<ExprId>,
    },
    Member {
        recv: ExprId,
        name: Symbol,
        target: Option<NodeRef>,
    },
}

impl ExprKind {
    pub const fn describe(&self) -> &'static str {
        match self {
            ExprKind::Bad => "bad expression",
            ExprKind::Id { .. } => "identifier",
            ExprKind::IntLit { .. } => "integer constant",
            ExprKind::FloatLit { .. } => "floating-point constant",
            ExprKind::BoolLit { .. } => "boolean constant",
            ExprKind::Local { kind, .. } => kind.describe(),
            ExprKind::Fun { .. } => "function",
            ExprKind::Block { .. } => "block",
            ExprKind::If { .. } => "if expression",
            ExprKind::For { .. } => "for loop",
            ExprKind::Return { .. } => "return",
            ExprKind::Prefix { .. } | ExprKind::Postfix { .. } => "operation",
            ExprKind::Deref { .. } => "dereference",
            ExprKind::Binop { .. } => "operation",
            ExprKind::Call { .. } => "call",
            ExprKind::Member { .. } => "member access",
        }
    }
}

/// Expression node. `ty` is never "absent": unresolved expressions point at
/// the void type.
#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub loc: SrcLoc,
    pub flags: ExprFlags,
    pub ty: TypeId,
    pub nrefs: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    Bad,
    /// `type Name T`
    Typedef { name: Symbol, ty: TypeId },
    /// Named top-level function definition.
    Fun(ExprId),
    /// Top-level expression statement.
    Expr(ExprId),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
    pub kind: StmtKind,
    pub loc: SrcLoc,
}

/// Per-compilation AST arena. Discarding it frees every node at once.
#[derive(Debug, Default)]
pub struct Ast {
    pub exprs: Vec<Expr>,
    pub stmts: Vec<Stmt>,
    /// Top-level statements of the unit, in source order.
    pub unit: Vec<StmtId>,
}

impl Ast {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn alloc_expr(&mut self, expr: Expr) -> ExprId {
        let id = ExprId::from_raw(self.exprs.len() as u32);
        self.exprs.push(expr);
        id
    }

    #[inline]
    pub fn alloc_stmt(&mut self, stmt: Stmt) -> StmtId {
        let id = StmtId::from_raw(self.stmts.len() as u32);
        self.stmts.push(stmt);
        id
    }

    /// Shallow-clones a node; used when optional narrowing shadows a
    /// binding with its element type.
    pub fn clone_expr(&mut self, id: ExprId) -> ExprId {
        let copy = self.exprs[id.to_usize()].clone();
        self.alloc_expr(copy)
    }

    /// Short printable form of an expression for diagnostics.
    pub fn fmt_expr(&self, interner: &Interner, id: ExprId) -> String {
        let e = &self[id];
        match &e.kind {
            ExprKind::Id { name, .. } => interner.resolve(*name).to_string(),
            ExprKind::Local { name, .. } => interner.resolve(*name).to_string(),
            ExprKind::Fun { name: Some(n), .. } => interner.resolve(*n).to_string(),
            ExprKind::Fun { name: None, .. } => "function".to_string(),
            ExprKind::IntLit { value } => value.to_string(),
            ExprKind::FloatLit { value } => value.to_string(),
            ExprKind::BoolLit { value } => value.to_string(),
            ExprKind::Member { name, .. } => format!(".{}", interner.resolve(*name)),
            ExprKind::Binop { op, left, right } => format!(
                "{} {} {}",
                self.fmt_expr(interner, *left),
                op.spelling(),
                self.fmt_expr(interner, *right)
            ),
            other => other.describe().to_string(),
        }
    }

    /// Binding kind for "mutable reference to immutable let x" style text.
    pub fn describe_ref(&self, r: NodeRef) -> &'static str {
        match r {
            NodeRef::Expr(id) => self[id].kind.describe(),
            NodeRef::Stmt(id) => match self[id].kind {
                StmtKind::Typedef { .. } => "type definition",
                StmtKind::Fun(_) => "function",
                StmtKind::Expr(_) => "expression",
                StmtKind::Bad => "bad statement",
            },
            NodeRef::Type(_) => "type",
        }
    }
}

impl Index<ExprId> for Ast {
    type Output = Expr;
    #[inline]
    fn index(&self, id: ExprId) -> &Expr {
        &self.exprs[id.to_usize()]
    }
}

impl IndexMut<ExprId> for Ast {
    #[inline]
    fn index_mut(&mut self, id: ExprId) -> &mut Expr {
        &mut self.exprs[id.to_usize()]
    }
}

impl Index<StmtId> for Ast {
    type Output = Stmt;
    #[inline]
    fn index(&self, id: StmtId) -> &Stmt {
        &self.stmts[id.to_usize()]
    }
}

impl IndexMut<StmtId> for Ast {
    #[inline]
    fn index_mut(&mut self, id: StmtId) -> &mut Stmt {
        &mut self.stmts[id.to_usize()]
    }
}
