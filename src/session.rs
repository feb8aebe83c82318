//! Compilation session.
//!
//! Owns everything that outlives a single parse: the symbol interner, the
//! type store and canonical typeid map, the diagnostics channel, registered
//! inputs, and the target description. The environment knobs (root/cache
//! directory, verbosity) are carried for the driver's benefit and have no
//! effect on parsing.

use std::path::PathBuf;

use crate::diag::{DiagHandler, Diagnostic, Diagnostics, InputId, Severity, SrcRange};
use crate::intern::{Interner, Syms};
use crate::types::{Target, TypeStore};

/// A registered source input.
#[derive(Debug)]
pub struct Input {
    pub name: String,
    pub text: String,
}

pub struct Session {
    pub target: Target,
    pub interner: Interner,
    pub syms: Syms,
    pub types: TypeStore,
    pub diags: Diagnostics,
    pub inputs: Vec<Input>,

    // environment; ignored by the front-end core
    pub root_dir: PathBuf,
    pub cache_dir: PathBuf,
    pub verbose: bool,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("target", &self.target)
            .field("inputs", &self.inputs.len())
            .field("diags", &self.diags)
            .finish()
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new(Target::default())
    }
}

impl Session {
    pub fn new(target: Target) -> Self {
        let mut interner = Interner::new();
        interner.reserve(64);
        let syms = interner.seed();
        let types = TypeStore::new(target, &mut interner, &syms);
        Self {
            target,
            interner,
            syms,
            types,
            diags: Diagnostics::new(),
            inputs: Vec::new(),
            root_dir: PathBuf::new(),
            cache_dir: PathBuf::new(),
            verbose: false,
        }
    }

    pub fn with_handler(target: Target, handler: DiagHandler) -> Self {
        Self {
            diags: Diagnostics::with_handler(handler),
            ..Self::new(target)
        }
    }

    /// Registers a source input; the returned id appears in source
    /// locations.
    pub fn add_input(&mut self, name: impl Into<String>, text: impl Into<String>) -> InputId {
        let id = InputId(self.inputs.len() as u32);
        self.inputs.push(Input {
            name: name.into(),
            text: text.into(),
        });
        id
    }

    #[inline]
    pub fn input(&self, id: InputId) -> &Input {
        &self.inputs[id.0 as usize]
    }

    pub fn error(&self, range: SrcRange, message: String) {
        self.diags.report(Severity::Error, range, message);
    }

    pub fn warning(&self, range: SrcRange, message: String) {
        self.diags.report(Severity::Warning, range, message);
    }

    /// Snapshot of accumulated diagnostics.
    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        self.diags.snapshot()
    }
}
