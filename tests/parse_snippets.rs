// tests/parse_snippets.rs: end-to-end parses with shape assertions
use luma_parser::ast::{ExprFlags, ExprId, ExprKind, LocalKind, NodeRef, StmtId, StmtKind};
use luma_parser::diag::Severity;
use luma_parser::token::Tok;
use luma_parser::types::{self, TypeKind};
use luma_parser::{parse_source, ParseOutput, Session};

fn parse_ok(src: &str) -> (Session, ParseOutput) {
    let (sess, out) = parse_source("test.lm", src);
    let errs: Vec<_> = sess
        .diagnostics()
        .into_iter()
        .filter(|d| d.severity == Severity::Error)
        .collect();
    assert!(errs.is_empty(), "unexpected errors: {errs:#?}\nsource: {src}");
    (sess, out)
}

fn unit_stmt(out: &ParseOutput, i: usize) -> StmtId {
    out.ast.unit[i]
}

fn stmt_fun(out: &ParseOutput, i: usize) -> ExprId {
    match out.ast[unit_stmt(out, i)].kind {
        StmtKind::Fun(f) => f,
        ref other => panic!("stmt {i} is not a function: {other:?}"),
    }
}

fn stmt_expr(out: &ParseOutput, i: usize) -> ExprId {
    match out.ast[unit_stmt(out, i)].kind {
        StmtKind::Expr(e) => e,
        ref other => panic!("stmt {i} is not an expression: {other:?}"),
    }
}

#[test]
fn function_with_typed_param_group() {
    // fun add(x, y int) int { x + y }
    let (sess, out) = parse_ok("fun add(x, y int) int { x + y }");
    assert_eq!(out.ast.unit.len(), 1);

    let f = stmt_fun(&out, 0);
    let ExprKind::Fun {
        name: Some(name),
        ref params,
        body: Some(body),
        methodof: None,
    } = out.ast[f].kind
    else {
        panic!("expected function node");
    };
    assert_eq!(sess.interner.resolve(name), "add");

    // two parameters, both int
    assert_eq!(params.len(), 2);
    for &param in params {
        assert_eq!(out.ast[param].ty, types::INT);
        assert!(matches!(
            out.ast[param].kind,
            ExprKind::Local {
                kind: LocalKind::Param,
                ..
            }
        ));
    }

    // canonical function type (int, int) -> int
    match sess.types.kind(out.ast[f].ty) {
        TypeKind::Fun {
            params: ptys,
            result,
        } => {
            assert_eq!(ptys, &vec![types::INT, types::INT]);
            assert_eq!(*result, types::INT);
        }
        other => panic!("expected funtype, got {other:?}"),
    }

    // body: a block whose sole child is a binop over the two parameters;
    // the block's r-value flag is clear, the binop's is set
    assert!(!out.ast[body].flags.has(ExprFlags::RVALUE));
    let ExprKind::Block { ref children } = out.ast[body].kind else {
        panic!("expected block body");
    };
    assert_eq!(children.len(), 1);
    let binop = children[0];
    assert!(out.ast[binop].flags.has(ExprFlags::RVALUE));
    let ExprKind::Binop { op, left, right } = out.ast[binop].kind else {
        panic!("expected binop");
    };
    assert_eq!(op, Tok::Plus);
    assert_eq!(out.ast[binop].ty, types::INT);
    for (side, param) in [(left, params[0]), (right, params[1])] {
        let ExprKind::Id { target, .. } = out.ast[side].kind else {
            panic!("expected id reference");
        };
        assert_eq!(target, Some(NodeRef::Expr(param)));
        assert_eq!(out.ast[side].ty, types::INT);
    }
    // each parameter was referenced once
    assert_eq!(out.ast[params[0]].nrefs, 1);
    assert_eq!(out.ast[params[1]].nrefs, 1);
}

#[test]
fn struct_typedef_with_method() {
    // type Point { x, y int \n fun len(this) int { 0 } }
    let (mut sess, out) = parse_ok("type Point { x, y int\n fun len(this) int { 0 } }");

    let StmtKind::Typedef { name, ty: st } = out.ast[unit_stmt(&out, 0)].kind else {
        panic!("expected typedef");
    };
    assert_eq!(sess.interner.resolve(name), "Point");

    let TypeKind::Struct {
        name: sname,
        ref fields,
        ref methods,
        ..
    } = *sess.types.kind(st)
    else {
        panic!("expected struct type");
    };
    assert_eq!(sname, Some(name));
    assert_eq!(fields.len(), 2);
    assert_eq!(sess.interner.resolve(fields[0].name), "x");
    assert_eq!(sess.interner.resolve(fields[1].name), "y");
    assert_eq!(fields[0].ty, types::INT);
    assert_eq!(fields[1].ty, types::INT);
    assert_eq!(methods.len(), 1);

    // the method is registered under its receiver and takes `this`
    let len_sym = sess.interner.intern("len");
    let m = out.methods[&st][&len_sym];
    let ExprKind::Fun {
        ref params,
        methodof: Some(recv),
        ..
    } = out.ast[m].kind
    else {
        panic!("expected method node");
    };
    assert_eq!(recv, st);
    assert!(matches!(
        out.ast[params[0]].kind,
        ExprKind::Local { is_this: true, .. }
    ));

    // no field is named like the method
    assert!(fields.iter().all(|f| f.name != len_sym));

    // two 8-byte ints on the default target
    let node = sess.types.node(st);
    assert_eq!((node.size, node.align), (16, 8));
}

#[test]
fn optional_condition_narrows_binding() {
    // let p ?int = 3; if p { p } else { 0 }
    let (sess, out) = parse_ok("let p ?int = 3; if p { p } else { 0 }");
    assert_eq!(out.ast.unit.len(), 2);

    let p = stmt_expr(&out, 0);
    let ExprKind::Local {
        kind: LocalKind::Let,
        ..
    } = out.ast[p].kind
    else {
        panic!("expected let binding");
    };
    // ?int
    let TypeKind::Optional { elem } = *sess.types.kind(out.ast[p].ty) else {
        panic!("expected optional type");
    };
    assert_eq!(elem, types::INT);

    let ifx = stmt_expr(&out, 1);
    let ExprKind::If {
        cond,
        then_block,
        else_block: Some(else_block),
    } = out.ast[ifx].kind
    else {
        panic!("expected if with else");
    };

    // the condition still has the optional type
    assert!(sess.types.is_optional(out.ast[cond].ty));

    // inside the then branch, the reference resolves to a shadow with the
    // narrowed element type
    let ExprKind::Block { ref children } = out.ast[then_block].kind else {
        panic!("expected block");
    };
    let inner = children[0];
    assert_eq!(out.ast[inner].ty, types::INT);
    let ExprKind::Id {
        target: Some(NodeRef::Expr(shadow)),
        ..
    } = out.ast[inner].kind
    else {
        panic!("expected resolved id");
    };
    assert_ne!(shadow, p, "then-branch must see the shadow, not the original");
    assert!(out.ast[shadow].flags.has(ExprFlags::SHADOWS_OPTIONAL));
    assert_eq!(out.ast[shadow].ty, types::INT);

    // else branch sees int 0; the if expression's type is int
    let ExprKind::Block { ref children } = out.ast[else_block].kind else {
        panic!("expected block");
    };
    assert_eq!(out.ast[children[0]].ty, types::INT);
    assert_eq!(out.ast[ifx].ty, types::INT);

    // the shadow's uses fold back into the original binding
    assert!(out.ast[p].nrefs >= 2);
}

#[test]
fn redefinition_reports_and_references_prior() {
    // two diagnostics: the redefinition error and a note at the first
    let (sess, out) = parse_source("test.lm", "fun f() { return }\nfun f() {}");
    let diags = sess.diagnostics();
    assert_eq!(diags.len(), 2, "{diags:#?}");
    assert_eq!(diags[0].severity, Severity::Error);
    assert!(diags[0].message.contains("redefinition of \"f\""));
    assert_eq!(diags[1].severity, Severity::Warning);
    assert!(diags[1].message.contains("previously defined here"));
    assert_eq!(diags[1].range.focus.line, 1);
    // both functions still appear in the unit
    assert_eq!(out.ast.unit.len(), 2);
}

#[test]
fn u64_max_literal_in_binop() {
    // 0xFFFFFFFFFFFFFFFF + 1: 2^64-1 fits u64; the binop is built
    let (_sess, out) = parse_ok("0xFFFFFFFFFFFFFFFF + 1");
    let e = stmt_expr(&out, 0);
    let ExprKind::Binop { op, left, .. } = out.ast[e].kind else {
        panic!("expected binop");
    };
    assert_eq!(op, Tok::Plus);
    assert_eq!(out.ast[left].ty, types::U64);
    let ExprKind::IntLit { value } = out.ast[left].kind else {
        panic!("expected int literal");
    };
    assert_eq!(value, u64::MAX);
}

#[test]
fn overflowing_literal_still_yields_typed_binop() {
    // 2^64 overflows: one diagnostic, but the tree still holds a binop
    // whose left literal carries a type
    let (sess, out) = parse_source("test.lm", "0x10000000000000000 + 1");
    assert_eq!(sess.diags.error_count(), 1);
    assert!(sess.diagnostics()[0]
        .message
        .contains("integer literal too large"));
    let e = stmt_expr(&out, 0);
    let ExprKind::Binop { left, .. } = out.ast[e].kind else {
        panic!("expected binop");
    };
    assert!(matches!(out.ast[left].kind, ExprKind::IntLit { .. }));
    assert_ne!(out.ast[left].ty, types::VOID);
}

#[test]
fn mutable_ref_to_let_reports_but_builds_node() {
    let (sess, out) = parse_source("test.lm", "let x int = 3; mut &x");
    let diags = sess.diagnostics();
    assert!(
        diags
            .iter()
            .any(|d| d.message.contains("mutable reference to immutable let x")),
        "{diags:#?}"
    );
    // the reference expression exists anyway, with a mutable ref type
    let e = stmt_expr(&out, 1);
    let ExprKind::Prefix { op, .. } = out.ast[e].kind else {
        panic!("expected reference expression");
    };
    assert_eq!(op, Tok::Amp);
    match sess.types.kind(out.ast[e].ty) {
        TypeKind::Ref { elem, is_mut } => {
            assert_eq!(*elem, types::INT);
            assert!(is_mut);
        }
        other => panic!("expected ref type, got {other:?}"),
    }
}

#[test]
fn negative_literal_boundaries() {
    // -(2^63) fits a 64-bit signed int
    let (sess, _out) = parse_ok("let a = -9223372036854775808");
    assert_eq!(sess.diags.error_count(), 0);

    // -(2^63 + 1) overflows i64 and must report
    let (sess, _out) = parse_source("test.lm", "let b = -9223372036854775809");
    assert_eq!(sess.diags.error_count(), 1);
    assert!(sess.diagnostics()[0].message.contains("overflows"));
}

#[test]
fn literal_fit_check_uses_type_context() {
    let (sess, _) = parse_source("test.lm", "let a i8 = 127");
    assert_eq!(sess.diags.error_count(), 0);

    let (sess, _) = parse_source("test.lm", "let a i8 = 128");
    assert_eq!(sess.diags.error_count(), 1);
    assert!(sess.diagnostics()[0]
        .message
        .contains("integer constant 128 overflows i8"));

    // unary minus widens the signed range by one
    let (sess, _) = parse_source("test.lm", "let a i8 = -128");
    assert_eq!(sess.diags.error_count(), 0);

    let (sess, _) = parse_source("test.lm", "let a u8 = 255");
    assert_eq!(sess.diags.error_count(), 0);
    let (sess, _) = parse_source("test.lm", "let a u8 = 256");
    assert_eq!(sess.diags.error_count(), 1);
}

#[test]
fn float_literals_follow_context() {
    let (_sess, out) = parse_ok("let a f32 = 1.5");
    let a = stmt_expr(&out, 0);
    let ExprKind::Local { init: Some(e), .. } = out.ast[a].kind else {
        panic!();
    };
    assert_eq!(out.ast[e].ty, types::F32);

    let (_sess, out) = parse_ok("let b = 2.5");
    let b = stmt_expr(&out, 0);
    let ExprKind::Local { init: Some(e), .. } = out.ast[b].kind else {
        panic!();
    };
    assert_eq!(out.ast[e].ty, types::F64);
    let ExprKind::FloatLit { value } = out.ast[e].kind else {
        panic!();
    };
    assert_eq!(value, 2.5);
}

#[test]
fn function_types_share_one_canonical_node() {
    let (_sess, out) = parse_ok("fun a(x int) int { x }\nfun b(y int) int { y }");
    let fa = stmt_fun(&out, 0);
    let fb = stmt_fun(&out, 1);
    assert_eq!(out.ast[fa].ty, out.ast[fb].ty);
}

#[test]
fn method_on_named_receiver_and_dot_shorthand() {
    let src = "type P { x int }\nfun P.get(this) int { .x }";
    let (mut sess, out) = parse_ok(src);
    let StmtKind::Typedef { ty: st, .. } = out.ast[unit_stmt(&out, 0)].kind else {
        panic!();
    };
    let get = sess.interner.intern("get");
    assert!(out.methods[&st].contains_key(&get));
}

#[test]
fn large_receiver_passes_this_by_reference() {
    let src = "type Big { a, b, c int }\nfun Big.m(this) int { 0 }\nfun Big.n(mut this) int { 0 }";
    let (mut sess, out) = parse_ok(src);
    let StmtKind::Typedef { ty: st, .. } = out.ast[unit_stmt(&out, 0)].kind else {
        panic!();
    };
    let m = out.methods[&st][&sess.interner.intern("m")];
    let n = out.methods[&st][&sess.interner.intern("n")];
    for (f, want_mut) in [(m, false), (n, true)] {
        let ExprKind::Fun { ref params, .. } = out.ast[f].kind else {
            panic!();
        };
        match sess.types.kind(out.ast[params[0]].ty) {
            TypeKind::Ref { elem, is_mut } => {
                assert_eq!(*elem, st);
                assert_eq!(*is_mut, want_mut);
            }
            other => panic!("expected by-reference this, got {other:?}"),
        }
    }
}

#[test]
fn small_receiver_passes_this_by_value() {
    let src = "type Tiny { a int }\nfun Tiny.m(this) int { .a }";
    let (mut sess, out) = parse_ok(src);
    let StmtKind::Typedef { ty: st, .. } = out.ast[unit_stmt(&out, 0)].kind else {
        panic!();
    };
    let m = out.methods[&st][&sess.interner.intern("m")];
    let ExprKind::Fun { ref params, .. } = out.ast[m].kind else {
        panic!();
    };
    assert_eq!(out.ast[params[0]].ty, st);
}

#[test]
fn return_marks_block_as_exiting() {
    let (_sess, out) = parse_ok("fun f() int { return 3 }");
    let f = stmt_fun(&out, 0);
    let ExprKind::Fun {
        body: Some(body), ..
    } = out.ast[f].kind
    else {
        panic!();
    };
    assert!(out.ast[body].flags.has(ExprFlags::EXITS));
}

#[test]
fn for_loop_forms() {
    let (_sess, out) = parse_ok("fun f(n int) int {\n var i int = 0\n for ; i < n; i++ { i }\n i\n}");
    let f = stmt_fun(&out, 0);
    let ExprKind::Fun {
        body: Some(body), ..
    } = out.ast[f].kind
    else {
        panic!();
    };
    let ExprKind::Block { ref children } = out.ast[body].kind else {
        panic!();
    };
    assert!(matches!(out.ast[children[1]].kind, ExprKind::For { .. }));
}

#[test]
fn typedef_to_funtype() {
    let (sess, out) = parse_ok("type Handler fun (int) int");
    let StmtKind::Typedef { ty, .. } = out.ast[unit_stmt(&out, 0)].kind else {
        panic!();
    };
    assert!(matches!(sess.types.kind(ty), TypeKind::Fun { .. }));
}

#[test]
fn named_call_arguments() {
    let (_sess, out) = parse_ok("fun f(x int) int { x }\nf(x: 3)");
    let call = stmt_expr(&out, 1);
    let ExprKind::Call { ref args, .. } = out.ast[call].kind else {
        panic!("expected call");
    };
    assert_eq!(args.len(), 1);
    assert!(matches!(
        out.ast[args[0]].kind,
        ExprKind::Local {
            kind: LocalKind::Param,
            init: Some(_),
            ..
        }
    ));
    assert_eq!(out.ast[call].ty, types::INT);
}

#[test]
fn cast_of_same_type_collapses() {
    let (_sess, out) = parse_ok("let x int = 3; int(x)");
    // int(x) where x: int collapses to x
    let e = stmt_expr(&out, 1);
    assert!(matches!(out.ast[e].kind, ExprKind::Id { .. }));
    assert_eq!(out.ast[e].ty, types::INT);
}

#[test]
fn scope_stack_balances_across_parse() {
    // deeply nested blocks and ifs parse cleanly
    let src = "fun f(x bool) int {\n if x {\n  { { 1 } }\n } else {\n  { 2 }\n }\n}";
    parse_ok(src);
}
