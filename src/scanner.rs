//! Scanner.
//!
//! A logos-derived raw lexer does the byte-level work; the [`Scanner`]
//! wrapper streams one token at a time, tracks line/column positions,
//! decodes numeric literals, interns identifiers, and implements automatic
//! semicolon insertion: when at least one newline was skipped since a token
//! that arms insertion, a synthetic semicolon is emitted before the next
//! real token (and at end of input).
//!
//! Unrecoverable errors (unexpected input characters, unterminated block
//! comments) are reported and terminate the scanner: the cursor jumps to
//! end of input so every subsequent `next()` yields EOF and the parser's
//! loops unwind.

use logos::{Lexer as LogosLexer, Logos};
use std::ops::Range;

use crate::diag::{InputId, LexErrorKind, Severity, SrcLoc, SrcRange};
use crate::intern::Symbol;
use crate::session::Session;
use crate::token::Tok;

#[inline(always)]
const fn lower_ascii(b: u8) -> u8 {
    if b >= b'A' && b <= b'Z' {
        b + 32
    } else {
        b
    }
}

#[inline(always)]
const fn is_dec_digit(b: u8) -> bool {
    b >= b'0' && b <= b'9'
}

#[inline(always)]
const fn is_hex_digit(b: u8) -> bool {
    let c = lower_ascii(b);
    is_dec_digit(c) || (c >= b'a' && c <= b'f')
}

// =============================================================================
// Block comment scanner (manual)
// =============================================================================

// The terminator search starts after the opening "/*", so the opener's '*'
// can never close the comment: "/*/" is still open, "/**/" is closed.
#[inline]
fn lex_block_comment(lex: &mut LogosLexer<'_, RawTok>) -> Result<(), LexErrorKind> {
    let rem = lex.remainder().as_bytes();
    match rem.windows(2).position(|w| w == b"*/") {
        Some(pos) => {
            lex.bump(pos + 2);
            Ok(())
        }
        None => {
            lex.bump(rem.len());
            Err(LexErrorKind::UnterminatedComment)
        }
    }
}

// =============================================================================
// Number scanning (maximal munch)
// =============================================================================

// The regex matches one digit (or ".<digit>"); this callback grows the match
// to the full numeric token. Validation and value decoding happen in the
// wrapper so diagnostics carry source positions.
#[inline]
fn lex_number(lex: &mut LogosLexer<'_, RawTok>) -> Result<(), LexErrorKind> {
    let src = lex.source().as_bytes();
    let start = lex.span().start;
    let mut i = start;
    let n = src.len();

    let mut base: u8 = 10;

    // integer part
    if src[i] != b'.' {
        if src[i] == b'0' {
            i += 1;
            if i < n {
                match lower_ascii(src[i]) {
                    b'x' => {
                        base = 16;
                        i += 1;
                    }
                    b'o' => {
                        base = 8;
                        i += 1;
                    }
                    b'b' => {
                        base = 2;
                        i += 1;
                    }
                    _ => {}
                }
            }
        } else {
            i += 1;
        }

        if base == 16 {
            while i < n && (is_hex_digit(src[i]) || src[i] == b'_') {
                i += 1;
            }
        } else {
            while i < n && (is_dec_digit(src[i]) || src[i] == b'_') {
                i += 1;
            }
        }
    }

    // fraction
    if i < n && src[i] == b'.' {
        // do not steal '.' from '..' / '...'
        if !(i + 1 < n && src[i + 1] == b'.') {
            i += 1;
            if base == 16 {
                while i < n && (is_hex_digit(src[i]) || src[i] == b'_') {
                    i += 1;
                }
            } else {
                while i < n && (is_dec_digit(src[i]) || src[i] == b'_') {
                    i += 1;
                }
            }
        }
    }

    // exponent: e for decimal, p for hex
    if i < n {
        let e = lower_ascii(src[i]);
        if (e == b'e' && base <= 10) || (e == b'p' && base == 16) {
            i += 1;
            if i < n && (src[i] == b'+' || src[i] == b'-') {
                i += 1;
            }
            while i < n && (is_dec_digit(src[i]) || src[i] == b'_') {
                i += 1;
            }
        }
    }

    let already = lex.span().end;
    if i > already {
        lex.bump(i - already);
    }
    Ok(())
}

// =============================================================================
// Raw token definition
// =============================================================================

#[derive(Logos, Debug, Clone, Copy, PartialEq, Eq)]
#[logos(error = LexErrorKind)]
#[logos(skip r"[\t\x0C\f\v ]+")]
#[rustfmt::skip]
enum RawTok {
    // Trivia. Newlines stay visible to the wrapper for semicolon insertion
    // and line tracking.
    #[regex(r"\r\n|\n|\r")] Newline,
    #[regex(r"//[^\n\r]*", logos::skip)] _LineComment,
    #[token("/*", lex_block_comment)] BlockComment,

    // Keywords (before Ident)
    #[token("fun")] KwFun,
    #[token("let")] KwLet,
    #[token("var")] KwVar,
    #[token("type")] KwType,
    #[token("if")] KwIf,
    #[token("else")] KwElse,
    #[token("for")] KwFor,
    #[token("return")] KwReturn,
    #[token("mut")] KwMut,

    #[regex(r"[_\p{XID_Start}][_\p{XID_Continue}]*")] Ident,

    // Numbers: start with a digit or ".<digit>", grown in the callback
    #[regex(r"[0-9]|\.[0-9]", lex_number)] Number,

    // Operators (multi-char first)
    #[token("...")] Ellipsis,
    #[token("..")] DotDot,
    #[token("<<=")] ShlAssign,
    #[token(">>=")] ShrAssign,
    #[token("+=")] AddAssign,
    #[token("-=")] SubAssign,
    #[token("*=")] MulAssign,
    #[token("/=")] DivAssign,
    #[token("%=")] ModAssign,
    #[token("&=")] AndAssign,
    #[token("|=")] OrAssign,
    #[token("^=")] XorAssign,
    #[token("<<")] Shl,
    #[token(">>")] Shr,
    #[token("&&")] AmpAmp,
    #[token("||")] PipePipe,
    #[token("==")] EqEq,
    #[token("!=")] NotEq,
    #[token("<=")] LtEq,
    #[token(">=")] GtEq,
    #[token("++")] PlusPlus,
    #[token("--")] MinusMinus,
    #[token("=")] Assign,
    #[token("+")] Plus,
    #[token("-")] Minus,
    #[token("*")] Star,
    #[token("/")] Slash,
    #[token("%")] Percent,
    #[token("&")] Amp,
    #[token("|")] Pipe,
    #[token("^")] Caret,
    #[token("~")] Tilde,
    #[token("!")] Bang,
    #[token("<")] Lt,
    #[token(">")] Gt,
    #[token("?")] Question,
    #[token("#")] Hash,

    // Delimiters
    #[token("(")] LParen,
    #[token(")")] RParen,
    #[token("[")] LBrack,
    #[token("]")] RBrack,
    #[token("{")] LBrace,
    #[token("}")] RBrace,
    #[token(",")] Comma,
    #[token(";")] Semi,
    #[token(":")] Colon,
    #[token(".")] Dot,

    // Catch-all (low priority to avoid ambiguity with the above)
    #[regex(r".", priority = 0)] Error,
}

impl RawTok {
    #[rustfmt::skip]
    const fn to_tok(self) -> Tok {
        match self {
            RawTok::KwFun => Tok::KwFun,
            RawTok::KwLet => Tok::KwLet,
            RawTok::KwVar => Tok::KwVar,
            RawTok::KwType => Tok::KwType,
            RawTok::KwIf => Tok::KwIf,
            RawTok::KwElse => Tok::KwElse,
            RawTok::KwFor => Tok::KwFor,
            RawTok::KwReturn => Tok::KwReturn,
            RawTok::KwMut => Tok::KwMut,
            RawTok::Ident => Tok::Ident,
            RawTok::Number => Tok::IntLit, // refined by the wrapper
            RawTok::Ellipsis => Tok::Ellipsis,
            RawTok::DotDot => Tok::DotDot,
            RawTok::ShlAssign => Tok::ShlAssign,
            RawTok::ShrAssign => Tok::ShrAssign,
            RawTok::AddAssign => Tok::AddAssign,
            RawTok::SubAssign => Tok::SubAssign,
            RawTok::MulAssign => Tok::MulAssign,
            RawTok::DivAssign => Tok::DivAssign,
            RawTok::ModAssign => Tok::ModAssign,
            RawTok::AndAssign => Tok::AndAssign,
            RawTok::OrAssign => Tok::OrAssign,
            RawTok::XorAssign => Tok::XorAssign,
            RawTok::Shl => Tok::Shl,
            RawTok::Shr => Tok::Shr,
            RawTok::AmpAmp => Tok::AmpAmp,
            RawTok::PipePipe => Tok::PipePipe,
            RawTok::EqEq => Tok::EqEq,
            RawTok::NotEq => Tok::NotEq,
            RawTok::LtEq => Tok::LtEq,
            RawTok::GtEq => Tok::GtEq,
            RawTok::PlusPlus => Tok::PlusPlus,
            RawTok::MinusMinus => Tok::MinusMinus,
            RawTok::Assign => Tok::Assign,
            RawTok::Plus => Tok::Plus,
            RawTok::Minus => Tok::Minus,
            RawTok::Star => Tok::Star,
            RawTok::Slash => Tok::Slash,
            RawTok::Percent => Tok::Percent,
            RawTok::Amp => Tok::Amp,
            RawTok::Pipe => Tok::Pipe,
            RawTok::Caret => Tok::Caret,
            RawTok::Tilde => Tok::Tilde,
            RawTok::Bang => Tok::Bang,
            RawTok::Lt => Tok::Lt,
            RawTok::Gt => Tok::Gt,
            RawTok::Question => Tok::Question,
            RawTok::Hash => Tok::Hash,
            RawTok::LParen => Tok::LParen,
            RawTok::RParen => Tok::RParen,
            RawTok::LBrack => Tok::LBrack,
            RawTok::RBrack => Tok::RBrack,
            RawTok::LBrace => Tok::LBrace,
            RawTok::RBrace => Tok::RBrace,
            RawTok::Comma => Tok::Comma,
            RawTok::Semi => Tok::Semi,
            RawTok::Colon => Tok::Colon,
            RawTok::Dot => Tok::Dot,
            RawTok::Newline | RawTok::_LineComment | RawTok::BlockComment | RawTok::Error => {
                Tok::Eof // trivia and errors never reach to_tok
            }
        }
    }
}

/// Tokens that arm semicolon insertion at the next newline.
const fn arms_insert_semi(t: Tok) -> bool {
    matches!(
        t,
        Tok::Ident
            | Tok::IntLit
            | Tok::FloatLit
            | Tok::RParen
            | Tok::RBrack
            | Tok::RBrace
            | Tok::KwReturn
            | Tok::PlusPlus
            | Tok::MinusMinus
    )
}

// =============================================================================
// Scanner
// =============================================================================

/// Snapshot of the current-token fields, used for one-token lookahead.
#[derive(Debug, Clone)]
struct TokState {
    tok: Tok,
    loc: SrcLoc,
    span: Range<usize>,
    sym: Symbol,
    int_val: u64,
    float_lit: String,
}

pub struct Scanner<'s> {
    logos: LogosLexer<'s, RawTok>,
    src: &'s str,
    input: InputId,

    lineno: u32,
    linestart: usize,
    insert_semi: bool,
    terminated: bool,

    // line/column just past the previously emitted token, for the position
    // of inserted semicolons
    prev_line: u32,
    prev_end_col: u32,

    // current token
    pub tok: Tok,
    pub loc: SrcLoc,
    pub span: Range<usize>,
    /// Interned symbol of the current identifier.
    pub sym: Symbol,
    /// Decoded value of the current integer literal.
    pub int_val: u64,
    /// Normalized lexeme of the current float literal: sign slot, optional
    /// `0x`, digit separators stripped.
    pub float_lit: String,

    lookahead: Option<TokState>,
}

impl<'s> Scanner<'s> {
    pub fn new(input: InputId, src: &'s str) -> Self {
        Self {
            logos: RawTok::lexer(src),
            src,
            input,
            lineno: 1,
            linestart: 0,
            insert_semi: false,
            terminated: false,
            prev_line: 1,
            prev_end_col: 1,
            tok: Tok::Eof,
            loc: SrcLoc::new(input, 1, 1),
            span: 0..0,
            sym: Symbol::from_raw(0),
            int_val: 0,
            float_lit: String::new(),
            lookahead: None,
        }
    }

    /// Raw lexeme of the current token.
    #[inline]
    pub fn lit(&self) -> &'s str {
        &self.src[self.span.clone()]
    }

    #[inline]
    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    /// Reports an error at the current token and terminates the scanner.
    fn fatal(&mut self, sess: &Session, loc: SrcLoc, message: String) {
        sess.diags
            .report(Severity::Error, SrcRange::at(loc), message);
        self.stop();
    }

    /// Moves the cursor to end of input; subsequent `next()` yields EOF.
    pub fn stop(&mut self) {
        self.terminated = true;
        self.lookahead = None;
        self.tok = Tok::Eof;
    }

    fn save_current(&self) -> TokState {
        TokState {
            tok: self.tok,
            loc: self.loc,
            span: self.span.clone(),
            sym: self.sym,
            int_val: self.int_val,
            float_lit: self.float_lit.clone(),
        }
    }

    fn apply(&mut self, st: TokState) {
        self.tok = st.tok;
        self.loc = st.loc;
        self.span = st.span;
        self.sym = st.sym;
        self.int_val = st.int_val;
        self.float_lit = st.float_lit;
    }

    /// Advances to the next token.
    pub fn next(&mut self, sess: &mut Session) {
        if let Some(st) = self.lookahead.take() {
            self.apply(st);
            return;
        }
        self.scan(sess);
    }

    /// True if the token after the current one is the identifier `sym`.
    /// Scans at most one token ahead; the result is buffered.
    pub fn lookahead_is_ident(&mut self, sess: &mut Session, sym: Symbol) -> bool {
        if self.lookahead.is_none() {
            let cur = self.save_current();
            self.scan(sess);
            self.lookahead = Some(self.save_current());
            self.apply(cur);
        }
        let st = self.lookahead.as_ref().unwrap();
        st.tok == Tok::Ident && st.sym == sym
    }

    fn set_loc(&mut self, span: &Range<usize>) {
        self.loc = SrcLoc::new(
            self.input,
            self.lineno,
            (span.start - self.linestart) as u32 + 1,
        );
    }

    fn finish_token(&mut self, tok: Tok, span: Range<usize>) {
        self.set_loc(&span);
        self.prev_line = self.lineno;
        self.prev_end_col = (span.end - self.linestart) as u32 + 1;
        self.insert_semi = arms_insert_semi(tok);
        self.tok = tok;
        self.span = span;
    }

    /// Emits an implicit semicolon positioned just past the arming token.
    fn emit_implicit_semi(&mut self, at: usize) {
        self.insert_semi = false;
        self.tok = Tok::Semi;
        self.loc = SrcLoc::new(self.input, self.prev_line, self.prev_end_col);
        self.span = at..at;
    }

    fn scan(&mut self, sess: &mut Session) {
        loop {
            if self.terminated {
                self.tok = Tok::Eof;
                return;
            }

            let Some(result) = self.logos.next() else {
                // end of input
                let end = self.src.len();
                if self.insert_semi {
                    self.emit_implicit_semi(end);
                    return;
                }
                self.tok = Tok::Eof;
                self.span = end..end;
                self.loc = SrcLoc::new(
                    self.input,
                    self.lineno,
                    (end - self.linestart) as u32 + 1,
                );
                return;
            };

            let span = self.logos.span();

            match result {
                Err(kind) => {
                    self.set_loc(&span);
                    let loc = self.loc;
                    self.fatal(sess, loc, kind.to_string());
                    return;
                }
                Ok(RawTok::Newline) => {
                    let semi = self.insert_semi;
                    self.lineno += 1;
                    self.linestart = span.end;
                    if semi {
                        self.emit_implicit_semi(span.start);
                        return;
                    }
                }
                Ok(RawTok::BlockComment) => {
                    let slice = &self.src[span.clone()];
                    let bytes = slice.as_bytes();
                    let mut nl_count = 0u32;
                    let mut last_nl = None;
                    for (i, &b) in bytes.iter().enumerate() {
                        if b == b'\n' {
                            nl_count += 1;
                            last_nl = Some(i);
                        }
                    }
                    if let Some(off) = last_nl {
                        self.lineno += nl_count;
                        self.linestart = span.start + off + 1;
                        if self.insert_semi {
                            self.emit_implicit_semi(span.start);
                            return;
                        }
                    }
                }
                Ok(RawTok::Error) => {
                    self.set_loc(&span);
                    let c = self.src[span.clone()].chars().next().unwrap_or('\u{FFFD}');
                    let loc = self.loc;
                    self.fatal(
                        sess,
                        loc,
                        format!("unexpected input character {c:?}"),
                    );
                    return;
                }
                Ok(RawTok::Ident) => {
                    let slice = &self.src[span.clone()];
                    if !validate_identifier(slice) {
                        self.set_loc(&span);
                        let loc = self.loc;
                        self.fatal(sess, loc, LexErrorKind::InvalidUtf8.to_string());
                        return;
                    }
                    self.sym = sess.interner.intern(slice);
                    self.finish_token(Tok::Ident, span);
                    return;
                }
                Ok(RawTok::Number) => {
                    self.decode_number(sess, span);
                    return;
                }
                Ok(raw) => {
                    self.finish_token(raw.to_tok(), span);
                    return;
                }
            }
        }
    }

    /// Classifies and decodes a numeric token. Numeric problems (digit out
    /// of base range, overflow, trailing separator) are reported but do not
    /// terminate the scanner: the token is consumed and parsing continues.
    fn decode_number(&mut self, sess: &mut Session, span: Range<usize>) {
        let slice = &self.src[span.clone()];
        let b = slice.as_bytes();
        self.set_loc(&span);
        let loc = self.loc;

        let (base, body_start): (u8, usize) = if b[0] == b'0' && b.len() > 1 {
            match lower_ascii(b[1]) {
                b'x' => (16, 2),
                b'o' => (8, 2),
                b'b' => (2, 2),
                _ => (10, 0),
            }
        } else {
            (10, 0)
        };
        let body = &b[body_start..];

        let has_dot = body.contains(&b'.');
        let has_exp = match base {
            16 => body.iter().any(|&c| c == b'p' || c == b'P'),
            10 => body.iter().any(|&c| c == b'e' || c == b'E'),
            _ => false,
        };

        if (base == 2 || base == 8) && has_dot {
            sess.diags.report(
                Severity::Error,
                SrcRange::at(loc),
                format!("invalid base-{base} integer literal"),
            );
            self.int_val = 0;
            self.finish_token(Tok::IntLit, span);
            return;
        }

        if has_dot || has_exp {
            // normalize into the literal buffer: sign slot first, digit
            // separators stripped, 0x prefix preserved
            self.float_lit.clear();
            self.float_lit.push('+');
            for c in slice.chars() {
                if c != '_' {
                    self.float_lit.push(c);
                }
            }
            self.finish_token(Tok::FloatLit, span);
            return;
        }

        // integer: base-dependent accumulator with overflow detection
        let cutoff = u64::MAX / base as u64;
        let cutlim = u64::MAX % base as u64;
        let mut acc: u64 = 0;
        let mut overflow = false;
        let mut last_was_sep = false;
        let mut reported_digit = false;

        for &c in body {
            let d = match c {
                b'0'..=b'9' => c - b'0',
                b'a'..=b'z' => c - b'a' + 10,
                b'A'..=b'Z' => c - b'A' + 10,
                b'_' => {
                    last_was_sep = true;
                    continue;
                }
                _ => continue,
            };
            last_was_sep = false;
            if d >= base {
                if !reported_digit {
                    reported_digit = true;
                    sess.diags.report(
                        Severity::Error,
                        SrcRange::at(loc),
                        format!("invalid base-{base} integer literal"),
                    );
                }
                continue;
            }
            if overflow || acc > cutoff || (acc == cutoff && d as u64 > cutlim) {
                overflow = true;
            } else {
                acc = acc * base as u64 + d as u64;
            }
        }

        if overflow {
            sess.diags.report(
                Severity::Error,
                SrcRange::at(loc),
                "integer literal too large".to_string(),
            );
        }
        if last_was_sep {
            sess.diags.report(
                Severity::Error,
                SrcRange::at(loc),
                "trailing \"_\" after integer literal".to_string(),
            );
        }

        self.int_val = acc;
        self.finish_token(Tok::IntLit, span);
    }
}

fn validate_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    if first != '_' && !unicode_ident::is_xid_start(first) {
        return false;
    }
    chars.all(|c| c == '_' || unicode_ident::is_xid_continue(c))
}

// =============================================================================
// Float literal parsing
// =============================================================================

/// Parses a normalized float literal (as produced in `float_lit`,
/// sign-prefixed, separators stripped). Hex floats use a binary exponent:
/// `0x1.8p3` is 1.5 × 2³.
pub fn parse_float_lit(s: &str) -> Option<f64> {
    let (neg, rest) = match s.as_bytes().first() {
        Some(b'-') => (true, &s[1..]),
        Some(b'+') => (false, &s[1..]),
        _ => (false, s),
    };

    let v = if rest.len() > 2 && (rest.starts_with("0x") || rest.starts_with("0X")) {
        parse_hex_float(&rest[2..])?
    } else {
        rest.parse::<f64>().ok()?
    };

    Some(if neg { -v } else { v })
}

fn parse_hex_float(s: &str) -> Option<f64> {
    let b = s.as_bytes();
    let mut i = 0;
    let mut mant: f64 = 0.0;
    let mut any = false;

    while i < b.len() && is_hex_digit(b[i]) {
        mant = mant * 16.0 + hex_val(b[i]) as f64;
        any = true;
        i += 1;
    }
    if i < b.len() && b[i] == b'.' {
        i += 1;
        let mut scale = 1.0 / 16.0;
        while i < b.len() && is_hex_digit(b[i]) {
            mant += hex_val(b[i]) as f64 * scale;
            scale /= 16.0;
            any = true;
            i += 1;
        }
    }
    if !any {
        return None;
    }

    let mut exp: i32 = 0;
    if i < b.len() && (b[i] == b'p' || b[i] == b'P') {
        i += 1;
        let mut negexp = false;
        if i < b.len() && (b[i] == b'+' || b[i] == b'-') {
            negexp = b[i] == b'-';
            i += 1;
        }
        let mut e: i32 = 0;
        let mut digits = false;
        while i < b.len() && is_dec_digit(b[i]) {
            e = e.saturating_mul(10).saturating_add((b[i] - b'0') as i32);
            digits = true;
            i += 1;
        }
        if !digits {
            return None;
        }
        exp = if negexp { -e } else { e };
    }
    if i != b.len() {
        return None;
    }

    Some(mant * 2f64.powi(exp))
}

#[inline(always)]
const fn hex_val(b: u8) -> u8 {
    let c = lower_ascii(b);
    if c >= b'a' {
        c - b'a' + 10
    } else {
        c - b'0'
    }
}
