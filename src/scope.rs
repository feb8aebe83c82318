//! Lexical scope stack.
//!
//! A single contiguous stack of words tracks identifiers during parsing.
//! Linear search beats chained hash maps here because of cache locality and
//! because:
//!
//! 1. most identifiers reference a binding defined nearby, and
//! 2. most bindings are short-lived locals, so unwinding an entire scope is
//!    a single index assignment and the memory is reused by the next scope.
//!
//! `base` is the offset of the current scope's base slot. The word at
//! `words[base]` holds the parent scope's base index. Keys and values are
//! interleaved with the saved base slots.

use crate::ast::NodeRef;
use crate::intern::Symbol;

#[derive(Debug, Default)]
pub struct ScopeStack {
    words: Vec<u64>,
    base: u32,
}

impl ScopeStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.words.clear();
        self.base = 0;
    }

    #[inline]
    pub fn len(&self) -> u32 {
        self.words.len() as u32
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// True when the current scope is the outermost user scope.
    #[inline]
    pub fn is_toplevel(&self) -> bool {
        self.base == 0
    }

    /// Opens a new scope: saves the current base and rebases on it.
    pub fn push(&mut self) {
        let saved = self.base as u64;
        self.base = self.words.len() as u32;
        self.words.push(saved);
    }

    /// Closes the current scope, discarding its bindings and restoring the
    /// parent base saved by the matching `push`.
    pub fn pop(&mut self) {
        debug_assert!(!self.words.is_empty(), "pop on empty scope stack");
        let base = self.base as usize;
        let saved = self.words[base];
        self.words.truncate(base);
        self.base = saved as u32;
    }

    /// Adds a binding to the current scope. Key and value are entered in
    /// "reverse" order, which simplifies lookup.
    pub fn define(&mut self, key: Symbol, value: NodeRef) {
        self.words.push(value.to_bits());
        self.words.push(key.as_u32() as u64);
    }

    /// Scans from the top of the stack toward the root for `key`, stepping
    /// across saved-base slots for up to `maxdepth` enclosing scopes.
    /// `maxdepth == 0` restricts the search to the innermost scope, which is
    /// how same-scope duplicates are detected before defining.
    pub fn lookup(&self, key: Symbol, mut maxdepth: u32) -> Option<NodeRef> {
        let key_bits = key.as_u32() as u64;
        let mut i = self.words.len() as u32;
        let mut base = self.base;
        while i > 1 {
            i -= 1;
            if i == base {
                if maxdepth == 0 {
                    break;
                }
                maxdepth -= 1;
                base = self.words[i as usize] as u32;
            } else {
                let k = self.words[i as usize];
                i -= 1;
                if k == key_bits {
                    return Some(NodeRef::from_bits(self.words[i as usize]));
                }
            }
        }
        None
    }
}
