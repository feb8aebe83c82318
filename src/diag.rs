//! Diagnostics channel.
//!
//! Reports carry a source range and a severity and never unwind; the parser
//! keeps going after reporting so one invocation can surface many problems.
//! The buffer is guarded by a reader-writer lock so accumulated reports can
//! be read while parsing continues to append.

use std::sync::RwLock;
use thiserror::Error;

/// Identifies a registered source input within a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct InputId(pub u32);

/// Source position: input handle + 1-based line and column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SrcLoc {
    pub input: u32,
    pub line: u32,
    pub col: u32,
}

impl SrcLoc {
    pub const fn new(input: InputId, line: u32, col: u32) -> Self {
        Self {
            input: input.0,
            line,
            col,
        }
    }
}

/// Source range with a focus point (the position diagnostics point at).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SrcRange {
    pub start: SrcLoc,
    pub focus: SrcLoc,
    pub end: SrcLoc,
}

impl SrcRange {
    /// Range collapsed onto a single focus position.
    pub const fn at(focus: SrcLoc) -> Self {
        Self {
            start: focus,
            focus,
            end: focus,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
    Info,
}

/// A single report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub range: SrcRange,
    pub message: String,
}

/// Lexical error kinds reported by the scanner.
#[derive(Debug, Error, Clone, PartialEq, Eq, Default)]
pub enum LexErrorKind {
    #[default]
    #[error("invalid token")]
    InvalidToken,
    #[error("invalid numeric literal")]
    InvalidNumber,
    #[error("invalid UTF-8 sequence")]
    InvalidUtf8,
    #[error("unterminated block comment")]
    UnterminatedComment,
}

/// Handler invoked once per report, in emission order.
pub type DiagHandler = Box<dyn Fn(&Diagnostic) + Send + Sync>;

/// Buffered diagnostics stream.
pub struct Diagnostics {
    buf: RwLock<Vec<Diagnostic>>,
    handler: Option<DiagHandler>,
    errcount: RwLock<u32>,
}

impl std::fmt::Debug for Diagnostics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Diagnostics")
            .field("len", &self.buf.read().unwrap().len())
            .field("errcount", &self.error_count())
            .finish()
    }
}

impl Default for Diagnostics {
    fn default() -> Self {
        Self::new()
    }
}

impl Diagnostics {
    pub fn new() -> Self {
        Self {
            buf: RwLock::new(Vec::new()),
            handler: None,
            errcount: RwLock::new(0),
        }
    }

    pub fn with_handler(handler: DiagHandler) -> Self {
        Self {
            handler: Some(handler),
            ..Self::new()
        }
    }

    /// Appends a report and invokes the handler.
    pub fn report(&self, severity: Severity, range: SrcRange, message: String) {
        let d = Diagnostic {
            severity,
            range,
            message,
        };
        if severity == Severity::Error {
            *self.errcount.write().unwrap() += 1;
        }
        if let Some(h) = &self.handler {
            h(&d);
        }
        self.buf.write().unwrap().push(d);
    }

    /// Number of error-severity reports so far.
    pub fn error_count(&self) -> u32 {
        *self.errcount.read().unwrap()
    }

    /// Snapshot of all reports in emission order.
    pub fn snapshot(&self) -> Vec<Diagnostic> {
        self.buf.read().unwrap().clone()
    }

    /// Drains and returns all reports.
    pub fn take(&self) -> Vec<Diagnostic> {
        *self.errcount.write().unwrap() = 0;
        std::mem::take(&mut *self.buf.write().unwrap())
    }
}
