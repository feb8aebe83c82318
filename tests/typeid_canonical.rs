// tests/typeid_canonical.rs: structural type identity
use luma_parser::types::{self, TypeKind};
use luma_parser::Session;

fn tid_str(sess: &mut Session, t: types::TypeId) -> String {
    let sym = sess.types.typeid(&mut sess.interner, t);
    sess.interner.resolve(sym).to_string()
}

#[test]
fn primitive_tids_are_single_bytes() {
    let mut sess = Session::default();
    for (t, expect) in [
        (types::VOID, "v"),
        (types::BOOL, "b"),
        (types::INT, "i"),
        (types::UINT, "u"),
        (types::I8, "s"),
        (types::I16, "w"),
        (types::I32, "l"),
        (types::I64, "q"),
        (types::U8, "S"),
        (types::U16, "W"),
        (types::U32, "L"),
        (types::U64, "Q"),
        (types::F32, "f"),
        (types::F64, "d"),
    ] {
        assert_eq!(tid_str(&mut sess, t), expect);
    }
}

#[test]
fn wrapper_encodings() {
    let mut sess = Session::default();
    let p = sess.types.mk_ptr(types::INT);
    let r = sess.types.mk_ref(types::BOOL, false);
    let m = sess.types.mk_ref(types::BOOL, true);
    let o = sess.types.mk_optional(types::I64);
    assert_eq!(tid_str(&mut sess, p), "pi");
    assert_eq!(tid_str(&mut sess, r), "rb");
    assert_eq!(tid_str(&mut sess, m), "Rb");
    assert_eq!(tid_str(&mut sess, o), "oq");
}

#[test]
fn array_encoding_uses_hex_length() {
    let mut sess = Session::default();
    let a = sess.types.mk_array(3, types::U8);
    assert_eq!(tid_str(&mut sess, a), "a3;S");
    let big = sess.types.mk_array(255, types::U8);
    assert_eq!(tid_str(&mut sess, big), "aFF;S");
}

#[test]
fn alias_encoding_carries_the_name() {
    let mut sess = Session::default();
    let str_alias = sess.types.str_alias;
    assert_eq!(tid_str(&mut sess, str_alias), "A3;str");
    // the builtin slice behind it
    let u8s = sess.types.u8_slice;
    assert_eq!(tid_str(&mut sess, u8s), "eS");
}

#[test]
fn child_tid_is_spliced_in() {
    let mut sess = Session::default();
    let r = sess.types.mk_ref(types::INT, false);
    assert_eq!(tid_str(&mut sess, r), "ri");
    // the optional's encoding reuses the child's computed tid bytes
    let o = sess.types.mk_optional(r);
    assert_eq!(tid_str(&mut sess, o), "ori");
}

#[test]
fn equal_structure_means_equal_tid() {
    let mut sess = Session::default();
    let a = sess.types.mk_optional(types::INT);
    let b = sess.types.mk_optional(types::INT);
    assert_ne!(a, b, "distinct nodes before canonicalization");
    let ta = tid_str(&mut sess, a);
    let tb = tid_str(&mut sess, b);
    assert_eq!(ta, tb);

    let c = sess.types.mk_optional(types::UINT);
    let tc = tid_str(&mut sess, c);
    assert_ne!(ta, tc);
}

#[test]
fn canonicalize_returns_first_registered_node() {
    let mut sess = Session::default();
    let a = sess.types.mk_optional(types::INT);
    let _ = tid_str(&mut sess, a);
    let b = sess.types.mk_optional(types::INT);
    let sess = &mut sess;
    let canon = sess.types.canonicalize(&mut sess.interner, b);
    assert_eq!(canon, a);
}

#[test]
fn typeid_is_idempotent() {
    let mut sess = Session::default();
    let a = sess.types.mk_ptr(types::F64);
    let t1 = tid_str(&mut sess, a);
    let t2 = tid_str(&mut sess, a);
    assert_eq!(t1, t2);
}

#[test]
fn funtype_identity_is_node_identity() {
    let mut sess = Session::default();
    let sess = &mut sess;
    let f1 = sess
        .types
        .funtype(&mut sess.interner, vec![types::INT, types::INT], types::INT);
    let f2 = sess
        .types
        .funtype(&mut sess.interner, vec![types::INT, types::INT], types::INT);
    assert_eq!(f1, f2, "same signature must reuse the canonical node");

    let f3 = sess
        .types
        .funtype(&mut sess.interner, vec![types::INT], types::INT);
    assert_ne!(f1, f3);
}

#[test]
fn funtype_fingerprint_depends_only_on_param_and_result_tids() {
    let mut sess = Session::default();
    let sess = &mut sess;
    let tid = sess
        .types
        .funtype_tid(&mut sess.interner, &[types::INT, types::INT], types::INT);
    assert_eq!(sess.interner.resolve(tid), "F2;iii");

    let none = sess.types.funtype_tid(&mut sess.interner, &[], types::VOID);
    assert_eq!(sess.interner.resolve(none), "F0;v");
}

#[test]
fn funtype_tid_matches_encoder() {
    let mut sess = Session::default();
    let sess = &mut sess;
    let ft = sess
        .types
        .funtype(&mut sess.interner, vec![types::BOOL], types::F32);
    let via_ctor = sess.types.node(ft).tid.unwrap();
    let via_fp = sess
        .types
        .funtype_tid(&mut sess.interner, &[types::BOOL], types::F32);
    assert_eq!(via_ctor, via_fp);
}

#[test]
fn struct_encoding_counts_fields() {
    use luma_parser::ast::ExprId;
    use luma_parser::types::StructField;

    let mut sess = Session::default();
    let st = sess.types.mk_struct();
    let x = sess.interner.intern("x");
    let y = sess.interner.intern("y");
    if let TypeKind::Struct { fields, .. } = &mut sess.types.node_mut(st).kind {
        fields.push(StructField {
            name: x,
            ty: types::INT,
            expr: ExprId::from_raw(0),
        });
        fields.push(StructField {
            name: y,
            ty: types::INT,
            expr: ExprId::from_raw(1),
        });
    }
    assert_eq!(tid_str(&mut sess, st), "t2;ii");
}

#[test]
fn compat_accepts_element_into_optional() {
    let mut sess = Session::default();
    let o = sess.types.mk_optional(types::INT);
    let sess = &mut sess;
    assert!(sess.types.iscompat(&mut sess.interner, o, types::INT));
    assert!(!sess.types.iscompat(&mut sess.interner, types::INT, o));
    assert!(sess
        .types
        .iscompat(&mut sess.interner, types::INT, types::INT));
}
