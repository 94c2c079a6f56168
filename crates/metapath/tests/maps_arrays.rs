use metapath::model::simple::SimpleNode;
use metapath::{DynamicContext, ErrorCode, Item, Sequence, compile_default};
use rstest::rstest;

fn eval(text: &str) -> metapath::Result<Sequence<SimpleNode>> {
    let ctx = DynamicContext::<SimpleNode>::default();
    compile_default(text)?.evaluate(None, &ctx)
}

fn strings(text: &str) -> Vec<String> {
    eval(text).unwrap_or_else(|e| panic!("{text}: {e}")).iter().map(|i| i.string_value().unwrap()).collect()
}

#[rstest]
#[case("map:size(map { 'a': 1, 'b': 2 })", &["2"])]
#[case("map:size(map {})", &["0"])]
#[case("map:keys(map { 'b': 1, 'a': 2 })", &["b", "a"])]
#[case("map:get(map { 'a': (1, 2) }, 'a')", &["1", "2"])]
#[case("map:get(map { 'a': 1 }, 'z')", &[])]
#[case("map:get(map { 1: 'one' }, 1.0)", &["one"])]
#[case("map:contains(map { 'a': () }, 'a')", &["true"])]
#[case("map:contains(map { 'a': 1 }, 'b')", &["false"])]
#[case("map:size(map { 'a': 1, 'a': 2 })", &["1"])]
#[case("map:get(map { 'a': 1, 'a': 2 }, 'a')", &["2"])]
fn map_functions(#[case] text: &str, #[case] expected: &[&str]) {
    assert_eq!(strings(text), expected);
}

#[rstest]
#[case("array:size([1, (2, 3), ()])", &["3"])]
#[case("array:size(array { 1, (2, 3), () })", &["3"])]
#[case("array:size([])", &["0"])]
#[case("array:get([1, (2, 3)], 2)", &["2", "3"])]
#[case("array:get(array { 'a', 'b' }, 1)", &["a"])]
#[case("data([1, (2, 3)])", &["1", "2", "3"])]
#[case("count([1, 2])", &["1"])]
fn array_functions(#[case] text: &str, #[case] expected: &[&str]) {
    assert_eq!(strings(text), expected);
}

#[rstest]
#[case("array:get([1, 2], 3)")]
#[case("array:get([1, 2], 0)")]
#[case("array:get([], 1)")]
fn out_of_bounds_array_access(#[case] text: &str) {
    assert_eq!(eval(text).unwrap_err().code(), ErrorCode::FOAY0001);
}

#[rstest]
fn constructors_yield_single_items() {
    let out = eval("map { 'a': 1 }, [1, 2]").unwrap();
    assert!(matches!(out.items(), [Item::Map(_), Item::Array(_)]));
}

#[rstest]
fn maps_cannot_be_atomized() {
    assert_eq!(eval("data(map { 'a': 1 })").unwrap_err().code(), ErrorCode::FOTY0013);
    assert_eq!(eval("map { (1, 2): 'x' }").unwrap_err().code(), ErrorCode::INVALID_TYPE);
}

#[rstest]
fn accessors_check_their_argument_kind() {
    assert_eq!(eval("map:size([1])").unwrap_err().code(), ErrorCode::INVALID_TYPE);
    assert_eq!(eval("array:size(map {})").unwrap_err().code(), ErrorCode::INVALID_TYPE);
}
