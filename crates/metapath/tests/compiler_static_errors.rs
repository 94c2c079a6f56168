use std::sync::Arc;

use metapath::{ErrorCode, LexicalName, StaticContext, compile, compile_default};
use rstest::rstest;

fn code(text: &str) -> ErrorCode {
    compile_default(text).expect_err(text).code()
}

#[rstest]
#[case("**")]
#[case("1 +")]
#[case("(1, 2")]
#[case("a[")]
#[case("'unterminated")]
#[case("")]
fn grammar_violations_are_mpst0003(#[case] text: &str) {
    assert_eq!(code(text), ErrorCode::INVALID_PATH_GRAMMAR);
}

#[rstest]
fn cast_to_any_atomic_has_its_own_code() {
    assert_eq!(code("'a' cast as meta:any-atomic-type"), ErrorCode::CAST_ANY_ATOMIC);
    assert_eq!(code("'a' castable as any-atomic-type"), ErrorCode::CAST_ANY_ATOMIC);
}

#[rstest]
#[case("'a' cast as meta:no-such-type")]
#[case("'a' castable as nothing")]
fn unknown_cast_targets_are_mpst0052(#[case] text: &str) {
    assert_eq!(code(text), ErrorCode::CAST_UNKNOWN_TYPE);
}

#[rstest]
fn unknown_sequence_type_is_mpst0051() {
    assert_eq!(code("1 instance of meta:unknown"), ErrorCode::UNKNOWN_TYPE);
}

#[rstest]
#[case("no-such-function()")]
#[case("count()")]
#[case("count(1, 2)")]
#[case("concat('a')")]
fn unresolved_functions_are_mpst0017(#[case] text: &str) {
    assert_eq!(code(text), ErrorCode::NO_FUNCTION_MATCH);
}

#[rstest]
fn undeclared_variable_is_mpst0008() {
    assert_eq!(code("$missing + 1"), ErrorCode::NOT_DEFINED);
}

#[rstest]
fn variable_scope_ends_with_the_binding_expression() {
    assert!(compile_default("let $x := 1 return $x").is_ok());
    assert_eq!(code("(let $x := 1 return $x) + $x"), ErrorCode::NOT_DEFINED);
}

#[rstest]
#[case("nope:a")]
#[case("nope:*")]
#[case("flag(nope:id)")]
#[case("nope:f()")]
fn unbound_prefixes_are_mpst0081(#[case] text: &str) {
    assert_eq!(code(text), ErrorCode::PREFIX_NOT_EXPANDABLE);
}

#[rstest]
fn static_errors_report_as_static() {
    let err = compile_default("**").unwrap_err();
    assert!(err.is_static());
    assert!(std::error::Error::source(&err).is_some());
}

#[rstest]
fn declared_variables_and_prefixes_compile() {
    let ctx = Arc::new(
        StaticContext::builder()
            .with_namespace("o", "http://csrc.nist.gov/ns/oscal/1.0")
            .with_variable(LexicalName::Local("limit".into()))
            .build(),
    );
    assert!(compile("o:catalog/o:metadata[count(o:title) le $limit]", &ctx).is_ok());
}
