//! Symbol interning.
//!
//! Symbols are immutable byte strings stored once and referenced by id.
//! Handle equality implies byte equality, so names compare as `u32`s
//! everywhere else in the front-end.

use smallvec::SmallVec;
use std::collections::HashMap;
use std::hash::{BuildHasher, BuildHasherDefault, Hasher, RandomState};

/// Interned string symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct Symbol(u32);

impl Symbol {
    #[inline]
    pub const fn from_raw(v: u32) -> Self {
        Self(v)
    }

    #[inline]
    pub const fn as_u32(self) -> u32 {
        self.0
    }
}

/// Identity hasher for u64 values (symbol hash buckets).
#[derive(Default)]
struct U64IdentityHasher(u64);

impl Hasher for U64IdentityHasher {
    fn write(&mut self, _b: &[u8]) {
        unreachable!("U64IdentityHasher only supports write_u64")
    }

    #[inline]
    fn write_u64(&mut self, i: u64) {
        self.0 = i;
    }

    #[inline]
    fn finish(&self) -> u64 {
        self.0
    }
}

type U64IdentityBuild = BuildHasherDefault<U64IdentityHasher>;

/// Symbols the front-end needs by identity, interned at session startup.
#[derive(Debug, Clone, Copy)]
pub struct Syms {
    /// The blank identifier `_`.
    pub blank: Symbol,
    /// The method receiver name `this`.
    pub this_: Symbol,
    /// The builtin alias name `str`.
    pub str_: Symbol,
}

/// String interner.
///
/// Strings are stored once; lookup goes through hash buckets keyed by a
/// precomputed hash so re-interning an existing string is a single probe.
#[derive(Debug, Default)]
pub struct Interner {
    strings: Vec<Box<str>>,
    buckets: HashMap<u64, SmallVec<[Symbol; 1]>, U64IdentityBuild>,
    state: RandomState,
}

impl Interner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Interns the reserved symbols and returns their handles.
    pub fn seed(&mut self) -> Syms {
        Syms {
            blank: self.intern("_"),
            this_: self.intern("this"),
            str_: self.intern("str"),
        }
    }

    #[inline]
    pub fn reserve(&mut self, additional: usize) {
        self.strings.reserve(additional);
        self.buckets.reserve(additional);
    }

    #[inline(always)]
    fn hash_str(&self, s: &str) -> u64 {
        self.state.hash_one(s)
    }

    /// Interns a string, returning the existing symbol if already present.
    pub fn intern(&mut self, s: &str) -> Symbol {
        let h = self.hash_str(s);
        let entry = self.buckets.entry(h).or_default();

        for &sym in entry.iter() {
            if self.strings[sym.0 as usize].as_ref() == s {
                return sym;
            }
        }

        let sym = Symbol(self.strings.len() as u32);
        self.strings.push(s.into());
        entry.push(sym);
        sym
    }

    /// Resolves a symbol back to its string.
    ///
    /// # Panics
    /// Panics if the symbol was not issued by this interner.
    #[inline]
    pub fn resolve(&self, sym: Symbol) -> &str {
        self.strings
            .get(sym.0 as usize)
            .expect("invalid symbol")
            .as_ref()
    }

    /// Number of distinct interned strings.
    #[inline]
    pub fn len(&self) -> usize {
        self.strings.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }
}
