//! Structural type identity.
//!
//! Every non-primitive type is canonicalized through a printable textual
//! fingerprint: a prefix byte per kind, hex `;`-terminated counts for
//! variable-length fields, and child encodings in order. When a child
//! already carries a tid, its tid bytes are spliced in directly: tids are
//! canonical by construction, so re-encoding the child is unnecessary.
//!
//! The fingerprint is interned as a symbol, stored on the type node, and
//! registered in the session's typeid → type map (first entry wins). Two
//! structural types share a tid iff their encodings are byte-equal.

use crate::intern::{Interner, Symbol};
use crate::types::{prefix_byte, TypeId, TypeKind, TypeStore};

use std::fmt::Write as _;

fn write_u32(buf: &mut String, v: u32) {
    let _ = write!(buf, "{v:X};");
}

fn write_u64(buf: &mut String, v: u64) {
    let _ = write!(buf, "{v:X};");
}

impl TypeStore {
    /// Returns the type's tid, computing and registering it if unset.
    pub fn typeid(&mut self, interner: &mut Interner, t: TypeId) -> Symbol {
        if let Some(tid) = self.node(t).tid {
            return tid;
        }
        let mut buf = String::with_capacity(64);
        self.append(interner, &mut buf, t);
        self.node(t).tid.expect("typeid encoding left tid unset")
    }

    /// Returns the canonical node for `t`'s fingerprint. The caller is
    /// expected to discard `t` in favor of the returned node when they
    /// differ.
    pub fn canonicalize(&mut self, interner: &mut Interner, t: TypeId) -> TypeId {
        let tid = self.typeid(interner, t);
        self.typeid_map.get(&tid).copied().unwrap_or(t)
    }

    fn append(&mut self, interner: &mut Interner, buf: &mut String, t: TypeId) {
        if self.is_prim(t) {
            buf.push(prefix_byte(self.kind(t)) as char);
            return;
        }
        if let Some(tid) = self.node(t).tid {
            buf.push_str(interner.resolve(tid));
            return;
        }

        let bufstart = buf.len();
        let kind = self.kind(t).clone();
        buf.push(prefix_byte(&kind) as char);

        match kind {
            TypeKind::Array { len, elem } => {
                write_u64(buf, len);
                self.append(interner, buf, elem);
            }
            TypeKind::Fun { params, result } => {
                write_u32(buf, params.len() as u32);
                for p in params {
                    self.append(interner, buf, p);
                }
                self.append(interner, buf, result);
            }
            TypeKind::Ptr { elem }
            | TypeKind::Ref { elem, .. }
            | TypeKind::Slice { elem, .. }
            | TypeKind::Optional { elem } => {
                self.append(interner, buf, elem);
            }
            TypeKind::Struct { fields, .. } => {
                write_u32(buf, fields.len() as u32);
                for f in fields {
                    self.append(interner, buf, f.ty);
                }
            }
            TypeKind::Alias { name, .. } => {
                let s = interner.resolve(name).to_string();
                write_u32(buf, s.len() as u32);
                buf.push_str(&s);
            }
            _ => unreachable!("primitive handled above"),
        }

        let tid = interner.intern(&buf[bufstart..]);
        self.node_mut(t).tid = Some(tid);
        self.typeid_map.entry(tid).or_insert(t);
    }

    /// Fingerprint of a function type without building a node. Depends only
    /// on the parameter tids and the result tid.
    pub fn funtype_tid(
        &mut self,
        interner: &mut Interner,
        params: &[TypeId],
        result: TypeId,
    ) -> Symbol {
        let mut buf = String::with_capacity(64);
        buf.push(prefix_byte(&TypeKind::Fun {
            params: Vec::new(),
            result,
        }) as char);
        write_u32(&mut buf, params.len() as u32);
        for &p in params {
            self.append(interner, &mut buf, p);
        }
        self.append(interner, &mut buf, result);
        interner.intern(&buf)
    }

    /// Builds or reuses the canonical function type for the signature, so
    /// function-type identity can be tested by id equality afterwards.
    pub fn funtype(
        &mut self,
        interner: &mut Interner,
        params: Vec<TypeId>,
        result: TypeId,
    ) -> TypeId {
        let tid = self.funtype_tid(interner, &params, result);
        if let Some(&existing) = self.typeid_map.get(&tid) {
            return existing;
        }
        let ft = self.mk_fun(params, result);
        self.node_mut(ft).tid = Some(tid);
        self.typeid_map.insert(tid, ft);
        ft
    }
}
