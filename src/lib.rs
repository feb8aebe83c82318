//! Luma front-end: scanner, Pratt parser, scope stack, type store.
//!
//! - The scanner streams tokens with Go-style automatic semicolon insertion
//!   (Logos raw lexer + hand-written wrapper).
//! - The parser is a Pratt parser over three parselet tables (statements,
//!   expressions, types) that resolves names and types while building the
//!   AST, registers methods per receiver type, and narrows optional-typed
//!   `if` conditions.
//! - Structural types are deduplicated through a printable type-identity
//!   fingerprint; canonical types compare by id.
//!
//! Diagnostics accumulate on the [`session::Session`]; the parser never
//! unwinds, so one invocation reports as many problems as it can find.

pub mod ast;
pub mod diag;
pub mod intern;
pub mod parser;
pub mod scanner;
pub mod scope;
pub mod session;
pub mod token;
pub mod typeid;
pub mod types;
pub mod universe;

pub use parser::{parse_input, ParseOutput};
pub use scanner::Scanner;
pub use session::Session;

/// Parses one source text with a fresh session on the default target.
///
/// Returns the session (diagnostics, interner, type store) together with the
/// parse output (AST arena, unit, method tables, package definitions).
pub fn parse_source(name: &str, text: &str) -> (Session, ParseOutput) {
    let mut sess = Session::default();
    let input = sess.add_input(name, text);
    let out = parse_input(&mut sess, input);
    (sess, out)
}
