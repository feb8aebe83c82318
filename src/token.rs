//! Closed token enumeration.
//!
//! `Tok` is fieldless so it can index the parselet tables directly; payload
//! data for the current token (lexeme, integer value, interned symbol) lives
//! on the [`Scanner`](crate::scanner::Scanner).

/// Token tag. The discriminant is used as an index into lookup tables.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tok {
    Eof = 0,
    /// Explicit `;` or an implicit semicolon inserted at a newline.
    Semi,

    Ident,
    IntLit,
    FloatLit,

    // Keywords
    KwFun,
    KwLet,
    KwVar,
    KwType,
    KwIf,
    KwElse,
    KwFor,
    KwReturn,
    KwMut,

    // Delimiters
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBrack,
    RBrack,
    Comma,
    Colon,
    Dot,
    DotDot,
    Ellipsis,

    // Operators
    Assign,
    AddAssign,
    SubAssign,
    MulAssign,
    DivAssign,
    ModAssign,
    ShlAssign,
    ShrAssign,
    AndAssign,
    OrAssign,
    XorAssign,
    EqEq,
    NotEq,
    Lt,
    Gt,
    LtEq,
    GtEq,
    Shl,
    Shr,
    Plus,
    PlusPlus,
    Minus,
    MinusMinus,
    Star,
    Slash,
    Percent,
    Amp,
    AmpAmp,
    Pipe,
    PipePipe,
    Caret,
    Tilde,
    Bang,
    Question,
    Hash,
}

impl Tok {
    /// Number of token tags; sizes the parselet tables.
    pub const COUNT: usize = Tok::Hash as usize + 1;

    /// Human-readable description used in "unexpected X" diagnostics.
    pub const fn describe(self) -> &'static str {
        match self {
            Tok::Eof => "end of input",
            Tok::Semi => "semicolon",
            Tok::Ident => "identifier",
            Tok::IntLit => "integer literal",
            Tok::FloatLit => "floating-point literal",
            Tok::KwFun => "keyword \"fun\"",
            Tok::KwLet => "keyword \"let\"",
            Tok::KwVar => "keyword \"var\"",
            Tok::KwType => "keyword \"type\"",
            Tok::KwIf => "keyword \"if\"",
            Tok::KwElse => "keyword \"else\"",
            Tok::KwFor => "keyword \"for\"",
            Tok::KwReturn => "keyword \"return\"",
            Tok::KwMut => "keyword \"mut\"",
            Tok::LParen => "'('",
            Tok::RParen => "')'",
            Tok::LBrace => "'{'",
            Tok::RBrace => "'}'",
            Tok::LBrack => "'['",
            Tok::RBrack => "']'",
            Tok::Comma => "','",
            Tok::Colon => "':'",
            Tok::Dot => "'.'",
            Tok::DotDot => "'..'",
            Tok::Ellipsis => "'...'",
            Tok::Assign => "'='",
            Tok::AddAssign => "'+='",
            Tok::SubAssign => "'-='",
            Tok::MulAssign => "'*='",
            Tok::DivAssign => "'/='",
            Tok::ModAssign => "'%='",
            Tok::ShlAssign => "'<<='",
            Tok::ShrAssign => "'>>='",
            Tok::AndAssign => "'&='",
            Tok::OrAssign => "'|='",
            Tok::XorAssign => "'^='",
            Tok::EqEq => "'=='",
            Tok::NotEq => "'!='",
            Tok::Lt => "'<'",
            Tok::Gt => "'>'",
            Tok::LtEq => "'<='",
            Tok::GtEq => "'>='",
            Tok::Shl => "'<<'",
            Tok::Shr => "'>>'",
            Tok::Plus => "'+'",
            Tok::PlusPlus => "'++'",
            Tok::Minus => "'-'",
            Tok::MinusMinus => "'--'",
            Tok::Star => "'*'",
            Tok::Slash => "'/'",
            Tok::Percent => "'%'",
            Tok::Amp => "'&'",
            Tok::AmpAmp => "'&&'",
            Tok::Pipe => "'|'",
            Tok::PipePipe => "'||'",
            Tok::Caret => "'^'",
            Tok::Tilde => "'~'",
            Tok::Bang => "'!'",
            Tok::Question => "'?'",
            Tok::Hash => "'#'",
        }
    }

    /// Operator spelling for AST formatting ("+" in "x + y").
    pub const fn spelling(self) -> &'static str {
        match self {
            Tok::Semi => ";",
            Tok::Assign => "=",
            Tok::AddAssign => "+=",
            Tok::SubAssign => "-=",
            Tok::MulAssign => "*=",
            Tok::DivAssign => "/=",
            Tok::ModAssign => "%=",
            Tok::ShlAssign => "<<=",
            Tok::ShrAssign => ">>=",
            Tok::AndAssign => "&=",
            Tok::OrAssign => "|=",
            Tok::XorAssign => "^=",
            Tok::EqEq => "==",
            Tok::NotEq => "!=",
            Tok::Lt => "<",
            Tok::Gt => ">",
            Tok::LtEq => "<=",
            Tok::GtEq => ">=",
            Tok::Shl => "<<",
            Tok::Shr => ">>",
            Tok::Plus => "+",
            Tok::PlusPlus => "++",
            Tok::Minus => "-",
            Tok::MinusMinus => "--",
            Tok::Star => "*",
            Tok::Slash => "/",
            Tok::Percent => "%",
            Tok::Amp => "&",
            Tok::AmpAmp => "&&",
            Tok::Pipe => "|",
            Tok::PipePipe => "||",
            Tok::Caret => "^",
            Tok::Tilde => "~",
            Tok::Bang => "!",
            Tok::Question => "?",
            _ => "?",
        }
    }
}

impl std::fmt::Display for Tok {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.describe())
    }
}
