use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use metapath::engine::functions::default_function_registry;
use metapath::model::simple::SimpleNode;
use metapath::{
    AtomicValue, DynamicContext, DynamicContextBuilder, ErrorCode, LexicalName, Sequence, StaticContext, compile,
    compile_default,
};
use rstest::rstest;

fn eval(text: &str) -> metapath::Result<Sequence<SimpleNode>> {
    let ctx = DynamicContext::<SimpleNode>::default();
    compile_default(text)?.evaluate(None, &ctx)
}

fn strings(text: &str) -> Vec<String> {
    eval(text).unwrap_or_else(|e| panic!("{text}: {e}")).iter().map(|i| i.string_value().unwrap()).collect()
}

#[rstest]
#[case("if (1 = 1) then 'yes' else 'no'", &["yes"])]
#[case("if (()) then 'yes' else 'no'", &["no"])]
#[case("if ('') then 'yes' else 'no'", &["no"])]
#[case("for $x in (1, 2, 3) return $x * 2", &["2", "4", "6"])]
#[case("for $x in (1, 2), $y in (10, 20) return $x + $y", &["11", "21", "12", "22"])]
#[case("for $x in () return 1", &[])]
#[case("let $x := 5, $y := $x + 1 return $x * $y", &["30"])]
#[case("let $x := 1 return let $x := 2 return $x", &["2"])]
#[case("let $x := 1 return ((let $x := 2 return $x), $x)", &["2", "1"])]
#[case("some $x in (1, 2, 3) satisfies $x > 2", &["true"])]
#[case("every $x in (1, 2, 3) satisfies $x > 2", &["false"])]
#[case("some $x in () satisfies true()", &["false"])]
#[case("every $x in () satisfies false()", &["true"])]
#[case("some $x in (1, 2), $y in (2, 3) satisfies $x = $y", &["true"])]
#[case("1 = 1 and 2 = 3", &["false"])]
#[case("1 = 2 or 'x'", &["true"])]
#[case("'a' || 1 || ()", &["a1"])]
#[case("(1, (2, 3), ())", &["1", "2", "3"])]
fn control_expressions(#[case] text: &str, #[case] expected: &[&str]) {
    assert_eq!(strings(text), expected);
}

#[rstest]
fn ebv_of_multiple_atomics_is_an_error() {
    let err = eval("if ((1, 2)) then 1 else 2").unwrap_err();
    assert_eq!(err.code(), ErrorCode::FORG0006);
}

/// A context with `probe()` that counts its calls and returns `true`.
fn counting_context(calls: Arc<AtomicUsize>) -> (Arc<StaticContext>, DynamicContext<SimpleNode>) {
    let static_ctx = Arc::new(
        StaticContext::builder()
            .with_namespace("t", "urn:test")
            .with_function_signature(LexicalName::Prefixed { prefix: "t".into(), local: "probe".into() }, 0, Some(0))
            .build(),
    );
    let mut registry = default_function_registry::<SimpleNode>(static_ctx.names());
    registry.register_fn(static_ctx.names().intern("urn:test", "probe"), 0, move |_, _| {
        calls.fetch_add(1, Ordering::SeqCst);
        Ok(Sequence::from_bool(true))
    });
    let dyn_ctx = DynamicContextBuilder::new(Arc::clone(&static_ctx)).with_functions(Arc::new(registry)).build();
    (static_ctx, dyn_ctx)
}

#[rstest]
#[case("false() and t:probe()", 0)]
#[case("true() or t:probe()", 0)]
#[case("true() and t:probe()", 1)]
#[case("if (true()) then 1 else t:probe()", 0)]
#[case("some $x in (1, 2, 3) satisfies t:probe()", 1)]
#[case("every $x in (1, 2, 3) satisfies t:probe()", 3)]
#[case("for $x in (1, 2) return t:probe()", 2)]
fn operands_are_evaluated_only_when_needed(#[case] text: &str, #[case] expected_calls: usize) {
    let calls = Arc::new(AtomicUsize::new(0));
    let (static_ctx, dyn_ctx) = counting_context(Arc::clone(&calls));
    compile(text, &static_ctx).unwrap().evaluate(None, &dyn_ctx).unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), expected_calls, "{text}");
}

#[rstest]
fn custom_function_without_implementation_fails_at_runtime() {
    let static_ctx = Arc::new(
        StaticContext::builder()
            .with_namespace("t", "urn:test")
            .with_function_signature(LexicalName::Prefixed { prefix: "t".into(), local: "missing".into() }, 1, Some(1))
            .build(),
    );
    let expr = compile("t:missing(1)", &static_ctx).unwrap();
    let dyn_ctx = DynamicContextBuilder::<SimpleNode>::new(Arc::clone(&static_ctx)).build();
    assert!(expr.evaluate(None, &dyn_ctx).is_err());
}

#[rstest]
fn evaluation_is_repeatable() {
    let expr = compile_default("for $x in 1 to 5 return $x * $x").unwrap();
    let ctx = DynamicContext::<SimpleNode>::default();
    let first = expr.evaluate(None, &ctx).unwrap();
    for _ in 0..3 {
        assert_eq!(expr.evaluate(None, &ctx).unwrap(), first);
    }
    assert_eq!(first.items().last().and_then(|i| i.as_atomic()), Some(&AtomicValue::Integer(25)));
}

#[rstest]
fn compiled_expressions_are_shareable_across_threads() {
    let expr = Arc::new(compile_default("sum(1 to 100)").unwrap());
    let handles: Vec<_> = (0..4)
        .map(|_| {
            let expr = Arc::clone(&expr);
            std::thread::spawn(move || {
                let ctx = DynamicContext::<SimpleNode>::default();
                expr.evaluate(None, &ctx).map(|s| s.first().and_then(|i| i.as_atomic()).cloned())
            })
        })
        .collect();
    for handle in handles {
        assert_eq!(handle.join().unwrap().unwrap(), Some(AtomicValue::Integer(5050)));
    }
}
