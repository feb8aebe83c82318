// tests/scanner_props.rs: lexer robustness properties
use luma_parser::token::Tok;
use luma_parser::{Scanner, Session};
use proptest::prelude::*;

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 256,
        .. ProptestConfig::default()
    })]
    #[test]
    fn never_panics_and_progresses(s in ".*") {
        let mut sess = Session::default();
        let id = sess.add_input("prop.lm", s.clone());
        let mut sc = Scanner::new(id, &s);

        let mut last_real_end = 0usize;
        let max_steps = s.len().saturating_mul(4) + 64;
        let mut steps = 0usize;

        loop {
            sc.next(&mut sess);
            if sc.tok == Tok::Eof {
                break;
            }
            let (start, end) = (sc.span.start, sc.span.end);

            // spans must be in bounds
            prop_assert!(start <= end, "start>end ({start},{end}) input={s:?}");
            prop_assert!(end <= s.len(), "end out of bounds ({start},{end}) input={s:?}");

            let injected_semi = sc.tok == Tok::Semi && start == end;

            // real tokens may not move backwards
            if !injected_semi {
                prop_assert!(
                    start >= last_real_end,
                    "token moved backwards: start={start} last_end={last_real_end} input={s:?}"
                );
                last_real_end = end;
            }

            steps += 1;
            prop_assert!(
                steps <= max_steps,
                "too many steps (possible hang): {steps} input={s:?}"
            );
        }

        // after EOF the scanner stays at EOF
        sc.next(&mut sess);
        prop_assert!(sc.tok == Tok::Eof);
    }

    #[test]
    fn parser_never_panics(s in ".*") {
        let (_sess, out) = luma_parser::parse_source("prop.lm", &s);
        // the unit exists even for garbage input
        let _ = out.ast.unit.len();
    }
}
