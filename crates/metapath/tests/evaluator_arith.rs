use metapath::model::simple::SimpleNode;
use metapath::{DynamicContext, ErrorCode, Item, Sequence, compile_default};
use rstest::rstest;

fn eval(text: &str) -> metapath::Result<Sequence<SimpleNode>> {
    let ctx = DynamicContext::<SimpleNode>::default();
    compile_default(text)?.evaluate(None, &ctx)
}

fn single(text: &str) -> String {
    let out = eval(text).unwrap_or_else(|e| panic!("{text}: {e}"));
    assert_eq!(out.len(), 1, "{text}");
    out.first().and_then(Item::as_atomic).map(ToString::to_string).unwrap_or_default()
}

fn type_of(text: &str) -> String {
    let out = eval(text).unwrap();
    out.first().and_then(Item::as_atomic).map(|a| a.atomic_type().to_string()).unwrap_or_default()
}

#[rstest]
#[case("10 idiv 3", "3")]
#[case("3 idiv -2", "-1")]
#[case("-3 idiv 2", "-1")]
#[case("-3 idiv -2", "1")]
#[case("5 mod 3", "2")]
#[case("6 mod -2", "0")]
#[case("-5 mod 3", "-2")]
#[case("4.5 mod 1.2", "0.9")]
fn integer_division_and_modulus(#[case] text: &str, #[case] expected: &str) {
    assert_eq!(single(text), expected);
}

#[rstest]
#[case("1 + 2", "3", "meta:integer")]
#[case("1 + 2.5", "3.5", "meta:decimal")]
#[case("7 div 2", "3.5", "meta:decimal")]
#[case("6 div 3", "2", "meta:decimal")]
#[case("2 * 3 - 1", "5", "meta:integer")]
#[case("1.5e1", "15", "meta:decimal")]
#[case("--3", "3", "meta:integer")]
#[case("+4", "4", "meta:integer")]
fn numeric_results_and_types(#[case] text: &str, #[case] value: &str, #[case] ty: &str) {
    assert_eq!(single(text), value);
    assert_eq!(type_of(text), ty);
}

#[rstest]
#[case("1 div 0")]
#[case("1 idiv 0")]
#[case("1 mod 0")]
#[case("1.5 div 0.0")]
fn division_by_zero_is_foar0001(#[case] text: &str) {
    assert_eq!(eval(text).unwrap_err().code(), ErrorCode::FOAR0001);
}

#[rstest]
fn integer_overflow_is_foar0002() {
    assert_eq!(eval("9223372036854775807 + 1").unwrap_err().code(), ErrorCode::FOAR0002);
}

#[rstest]
fn empty_operand_gives_empty_result() {
    assert!(eval("() + 1").unwrap().is_empty());
    assert!(eval("-()").unwrap().is_empty());
}

#[rstest]
fn non_numeric_operands_are_type_errors() {
    assert_eq!(eval("'a' + 1").unwrap_err().code(), ErrorCode::INVALID_TYPE);
    assert_eq!(eval("(1, 2) + 1").unwrap_err().code(), ErrorCode::INVALID_TYPE);
}

#[rstest]
#[case("('2024-01-31' cast as meta:date) + ('P1M' cast as meta:year-month-duration)", "2024-02-29")]
#[case("('2024-03-01' cast as meta:date) - ('2024-02-01' cast as meta:date)", "P29D")]
#[case("('PT2H' cast as meta:day-time-duration) * 1.5", "PT3H")]
#[case("('P1Y' cast as meta:year-month-duration) + ('P2M' cast as meta:year-month-duration)", "P1Y2M")]
fn temporal_arithmetic(#[case] text: &str, #[case] expected: &str) {
    assert_eq!(single(text), expected);
}

#[rstest]
#[case("1 to 3", 3)]
#[case("3 to 1", 0)]
#[case("() to 3", 0)]
#[case("5 to 5", 1)]
fn ranges(#[case] text: &str, #[case] len: usize) {
    assert_eq!(eval(text).unwrap().len(), len);
}
