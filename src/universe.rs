//! The universe: outermost builtin scope.
//!
//! Seeded as the parent of the package scope. Contains the primitive type
//! names and the boolean constants; looked up only after the scope stack and
//! the package definitions miss.

use std::collections::HashMap;

use crate::ast::{Ast, Expr, ExprFlags, ExprKind, NodeRef};
use crate::diag::SrcLoc;
use crate::intern::{Interner, Symbol};
use crate::types;

/// Builds the universe map for one compilation. The `true`/`false` constant
/// nodes are allocated in the compilation's arena.
pub fn seed(interner: &mut Interner, ast: &mut Ast) -> HashMap<Symbol, NodeRef> {
    let mut map = HashMap::with_capacity(16);

    let type_entries: [(&str, types::TypeId); 14] = [
        ("void", types::VOID),
        ("bool", types::BOOL),
        ("int", types::INT),
        ("uint", types::UINT),
        ("i8", types::I8),
        ("i16", types::I16),
        ("i32", types::I32),
        ("i64", types::I64),
        ("u8", types::U8),
        ("u16", types::U16),
        ("u32", types::U32),
        ("u64", types::U64),
        ("f32", types::F32),
        ("f64", types::F64),
    ];
    for (name, ty) in type_entries {
        map.insert(interner.intern(name), NodeRef::Type(ty));
    }

    for (name, value) in [("true", true), ("false", false)] {
        let id = ast.alloc_expr(Expr {
            kind: ExprKind::BoolLit { value },
            loc: SrcLoc::default(),
            flags: ExprFlags::NONE,
            ty: types::BOOL,
            nrefs: 0,
        });
        map.insert(interner.intern(name), NodeRef::Expr(id));
    }

    map
}
