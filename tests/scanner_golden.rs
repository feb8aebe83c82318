// tests/scanner_golden.rs: golden token streams, comments, termination
use luma_parser::token::Tok;
use luma_parser::{Scanner, Session};

fn lex_kinds(input: &str) -> (Vec<Tok>, u32) {
    let mut sess = Session::default();
    let id = sess.add_input("test.lm", input);
    let mut sc = Scanner::new(id, input);
    let mut kinds = Vec::new();
    loop {
        sc.next(&mut sess);
        if sc.tok == Tok::Eof {
            break;
        }
        kinds.push(sc.tok);
    }
    (kinds, sess.diags.error_count())
}

#[test]
fn keywords_and_identifiers() {
    let (ks, errs) = lex_kinds("fun let var type if else for return mut funny lettuce");
    assert_eq!(
        ks,
        vec![
            Tok::KwFun,
            Tok::KwLet,
            Tok::KwVar,
            Tok::KwType,
            Tok::KwIf,
            Tok::KwElse,
            Tok::KwFor,
            Tok::KwReturn,
            Tok::KwMut,
            Tok::Ident,
            Tok::Ident,
            Tok::Semi,
        ]
    );
    assert_eq!(errs, 0);
}

#[test]
fn this_and_blank_are_identifiers() {
    let (ks, _) = lex_kinds("this _");
    assert_eq!(ks, vec![Tok::Ident, Tok::Ident, Tok::Semi]);
}

#[test]
fn multi_char_operators_win() {
    let (ks, _) = lex_kinds("a <<= b >> c <= d == e != f && g || h");
    assert_eq!(
        ks,
        vec![
            Tok::Ident,
            Tok::ShlAssign,
            Tok::Ident,
            Tok::Shr,
            Tok::Ident,
            Tok::LtEq,
            Tok::Ident,
            Tok::EqEq,
            Tok::Ident,
            Tok::NotEq,
            Tok::Ident,
            Tok::AmpAmp,
            Tok::Ident,
            Tok::PipePipe,
            Tok::Ident,
            Tok::Semi,
        ]
    );
}

#[test]
fn punctuation_stream() {
    let (ks, _) = lex_kinds("( ) { } [ ] , : . ? ~ #");
    assert_eq!(
        ks,
        vec![
            Tok::LParen,
            Tok::RParen,
            Tok::LBrace,
            Tok::RBrace,
            Tok::LBrack,
            Tok::RBrack,
            Tok::Comma,
            Tok::Colon,
            Tok::Dot,
            Tok::Question,
            Tok::Tilde,
            Tok::Hash,
        ]
    );
}

#[test]
fn dots_and_ellipsis() {
    let (ks, _) = lex_kinds(". .. ...");
    assert_eq!(ks, vec![Tok::Dot, Tok::DotDot, Tok::Ellipsis]);
}

#[test]
fn unicode_identifiers() {
    let (ks, errs) = lex_kinds("пример 数据 café");
    assert_eq!(ks, vec![Tok::Ident, Tok::Ident, Tok::Ident, Tok::Semi]);
    assert_eq!(errs, 0);
}

#[test]
fn line_and_block_comments_are_trivia() {
    let (ks, errs) = lex_kinds("a /* one */ b // two");
    assert_eq!(ks, vec![Tok::Ident, Tok::Ident, Tok::Semi]);
    assert_eq!(errs, 0);
}

#[test]
fn slash_star_slash_is_not_a_closed_comment() {
    // "/*/ */" opens at "/*" and closes only at the final "*/"
    let (ks, errs) = lex_kinds("a /*/ */ b");
    assert_eq!(ks, vec![Tok::Ident, Tok::Ident, Tok::Semi]);
    assert_eq!(errs, 0);

    // "/* */" is complete and what follows lexes normally
    let (ks, errs) = lex_kinds("a /* */ b");
    assert_eq!(ks, vec![Tok::Ident, Tok::Ident, Tok::Semi]);
    assert_eq!(errs, 0);
}

#[test]
fn unterminated_comment_terminates_scanner() {
    let (ks, errs) = lex_kinds("a /* never closed\nb c d");
    // "a" then the arming-EOF behavior never happens: the error is fatal
    assert_eq!(ks, vec![Tok::Ident]);
    assert_eq!(errs, 1);
}

#[test]
fn unexpected_byte_terminates_scanner() {
    let (ks, errs) = lex_kinds("a $ b");
    assert_eq!(ks, vec![Tok::Ident]);
    assert_eq!(errs, 1);
}

#[test]
fn scanner_stays_at_eof_after_fatal() {
    let input = "a $";
    let mut sess = Session::default();
    let id = sess.add_input("test.lm", input);
    let mut sc = Scanner::new(id, input);
    sc.next(&mut sess); // a
    sc.next(&mut sess); // fatal
    assert_eq!(sc.tok, Tok::Eof);
    assert!(sc.is_terminated());
    for _ in 0..4 {
        sc.next(&mut sess);
        assert_eq!(sc.tok, Tok::Eof);
    }
}

#[test]
fn positions_are_one_based_lines_and_columns() {
    let input = "ab\n  cd";
    let mut sess = Session::default();
    let id = sess.add_input("test.lm", input);
    let mut sc = Scanner::new(id, input);
    sc.next(&mut sess);
    assert_eq!((sc.loc.line, sc.loc.col), (1, 1));
    sc.next(&mut sess); // implicit semi
    sc.next(&mut sess); // cd
    assert_eq!((sc.loc.line, sc.loc.col), (2, 3));
}
