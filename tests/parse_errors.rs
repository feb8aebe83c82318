// tests/parse_errors.rs: error reporting and recovery
use luma_parser::diag::Severity;
use luma_parser::parse_source;

fn errors(src: &str) -> Vec<String> {
    let (sess, _out) = parse_source("test.lm", src);
    sess.diagnostics()
        .into_iter()
        .filter(|d| d.severity == Severity::Error)
        .map(|d| d.message)
        .collect()
}

fn warnings(src: &str) -> Vec<String> {
    let (sess, _out) = parse_source("test.lm", src);
    sess.diagnostics()
        .into_iter()
        .filter(|d| d.severity == Severity::Warning)
        .map(|d| d.message)
        .collect()
}

fn assert_reports(src: &str, needle: &str) {
    let errs = errors(src);
    assert!(
        errs.iter().any(|m| m.contains(needle)),
        "wanted {needle:?} in {errs:#?}\nsource: {src}"
    );
}

#[test]
fn undeclared_identifier() {
    assert_reports("foo", "undeclared identifier \"foo\"");
}

#[test]
fn unknown_type_in_binding() {
    assert_reports("let x Foo = 3", "unknown type \"Foo\"");
}

#[test]
fn value_used_as_type() {
    assert_reports("let a = 3; let b a = 4", "a is not a type");
}

#[test]
fn type_used_as_expression_reports_nothing_but_call_does() {
    // a bare type reference is a valid id-expression (it may be called);
    // calling a plain value is not
    assert_reports("let a = 3; a(1)", "expected function or type");
}

#[test]
fn non_boolean_condition() {
    assert_reports("if 3 { 4 }", "conditional is not a boolean");
}

#[test]
fn boolean_condition_is_fine() {
    assert!(errors("if true { 4 }").is_empty());
}

#[test]
fn deref_of_non_reference() {
    assert_reports("let x int = 3; *x", "dereferencing non-reference value of type int");
}

#[test]
fn ref_of_reference_type() {
    assert_reports(
        "var v int = 1; let r = &v; &r",
        "referencing reference type &int",
    );
}

#[test]
fn ref_of_ephemeral_value() {
    assert_reports("&3", "referencing ephemeral value of type int");
}

#[test]
fn mutable_ref_requires_mutable_binding() {
    assert_reports("let x int = 3; mut &x", "mutable reference to immutable let x");
    assert!(errors("var x int = 3; mut &x").is_empty());
}

#[test]
fn missing_let_value() {
    assert_reports("let x int", "missing value for let binding");
}

#[test]
fn reference_var_needs_initializer() {
    assert_reports("var r &int", "missing initial value for reference variable");
}

#[test]
fn duplicate_field() {
    assert_reports("type T { x int\nx int }", "duplicate field x");
}

#[test]
fn field_conflicts_with_method() {
    assert_reports(
        "type T { fun a() int { 0 }\nx, a int }",
        "field a conflicts with method of same name",
    );
}

#[test]
fn method_conflicts_with_field() {
    assert_reports(
        "type T { a int\nfun a() int { 0 } }",
        "conflicts with field",
    );
}

#[test]
fn duplicate_method() {
    let src = "type T { fun a() int { 0 }\nfun a() int { 1 } }";
    assert_reports(src, "duplicate method \"a\"");
    assert!(warnings(src)
        .iter()
        .any(|m| m.contains("previously defined here")));
}

#[test]
fn this_outside_method() {
    assert_reports("fun f(this) int { 0 }", "\"this\" parameter of non-method function");
}

#[test]
fn mixed_parameter_forms() {
    assert_reports("fun f(x, y int, z) { }", "expecting type");
}

#[test]
fn unnamed_params_with_body() {
    assert_reports(
        "fun f(int) { 3 }",
        "function without named arguments can't have a body",
    );
}

#[test]
fn unnamed_params_without_body_are_fine() {
    assert!(errors("fun f(int) int;").is_empty());
}

#[test]
fn dot_shorthand_outside_context() {
    assert_reports(".x", "\".\" shorthand outside of context");
}

#[test]
fn subscript_is_rejected() {
    assert_reports("let a int = 3; a[0]", "subscript expressions are not supported yet");
}

#[test]
fn incompatible_initializer() {
    assert_reports("let a bool = 3", "incompatible types");
}

#[test]
fn unreachable_code_is_a_warning_not_an_error() {
    let src = "fun f() int { return 3\n4 }";
    assert!(errors(src).is_empty());
    assert!(warnings(src).iter().any(|m| m.contains("unreachable code")));
}

#[test]
fn unreachable_reported_once() {
    let src = "fun f() int { return 3\n4\n5\n6 }";
    let w = warnings(src);
    assert_eq!(
        w.iter().filter(|m| m.contains("unreachable code")).count(),
        1
    );
}

#[test]
fn statement_position_recovery() {
    // a syntax error fast-forwards to the next semicolon and parsing
    // continues: both errors are reported in one invocation
    let src = "let x Foo = 1\nlet y Bar = 2";
    let errs = errors(src);
    assert!(errs.iter().any(|m| m.contains("unknown type \"Foo\"")));
    assert!(errs.iter().any(|m| m.contains("unknown type \"Bar\"")));
}

#[test]
fn missing_paren_in_prototype_recovers() {
    let errs = errors("fun f x int { 3 }\nfun g() int { 4 }");
    assert!(!errs.is_empty());
    // the second function still parses cleanly
    assert!(!errs.iter().any(|m| m.contains("\"g\"")));
}

#[test]
fn error_count_is_tracked_on_the_session() {
    let (sess, _) = parse_source("test.lm", "foo; bar");
    assert_eq!(sess.diags.error_count(), 2);
}

#[test]
fn redefinition_in_inner_scope_is_allowed() {
    // shadowing across scopes is fine; duplicates within one scope are not
    assert!(errors("fun f(x int) int { let x int = 3; x }").is_empty());
    assert_reports(
        "fun f() { let x int = 1; let x int = 2 }",
        "redefinition of \"x\"",
    );
}
