use std::sync::Arc;

use chrono::FixedOffset;
use metapath::model::simple::{SimpleNode, assembly, document, field};
use metapath::{
    AtomicType, AtomicValue, DynamicContext, DynamicContextBuilder, ErrorCode, Item, LexicalName, NameCache, Sequence,
    StaticContext, compile,
};
use rstest::rstest;

fn local(name: &str) -> LexicalName {
    LexicalName::Local(name.to_string())
}

fn prefixed(prefix: &str, name: &str) -> LexicalName {
    LexicalName::Prefixed { prefix: prefix.to_string(), local: name.to_string() }
}

fn first_string(seq: &Sequence<SimpleNode>) -> String {
    seq.first().map(|i| i.string_value().unwrap()).unwrap_or_default()
}

#[rstest]
fn external_variables_are_visible() {
    let static_ctx = Arc::new(
        StaticContext::builder()
            .with_namespace("v", "urn:vars")
            .with_variable(local("limit"))
            .with_variable(prefixed("v", "scale"))
            .build(),
    );
    let dyn_ctx = DynamicContextBuilder::<SimpleNode>::new(Arc::clone(&static_ctx))
        .with_variable(local("limit"), AtomicValue::Integer(2))
        .with_variable(prefixed("v", "scale"), Sequence::from(vec![Item::Atomic(AtomicValue::Integer(10)), Item::Atomic(AtomicValue::Integer(20))]))
        .build();
    let out = compile("for $s in $v:scale return $s * $limit", &static_ctx).unwrap().evaluate(None, &dyn_ctx).unwrap();
    assert_eq!(out.iter().map(|i| i.string_value().unwrap()).collect::<Vec<_>>(), ["20", "40"]);
}

#[rstest]
fn bound_variables_shadow_external_ones() {
    let static_ctx = Arc::new(StaticContext::builder().with_variable(local("x")).build());
    let dyn_ctx = DynamicContextBuilder::<SimpleNode>::new(Arc::clone(&static_ctx))
        .with_variable(local("x"), AtomicValue::Integer(1))
        .build();
    let out = compile("(let $x := 2 return $x), $x", &static_ctx).unwrap().evaluate(None, &dyn_ctx).unwrap();
    assert_eq!(out.len(), 2);
    assert_eq!(first_string(&out), "2");
    assert_eq!(out.items()[1].string_value().unwrap(), "1");
}

#[rstest]
fn declared_but_unsupplied_variable_fails_at_runtime() {
    let static_ctx = Arc::new(StaticContext::builder().with_variable(local("x")).build());
    let dyn_ctx = DynamicContextBuilder::<SimpleNode>::new(Arc::clone(&static_ctx)).build();
    let err = compile("$x", &static_ctx).unwrap().evaluate(None, &dyn_ctx).unwrap_err();
    assert_eq!(err.code(), ErrorCode::NOT_DEFINED);
}

#[rstest]
fn default_variable_namespace_applies_to_bare_names() {
    let static_ctx = Arc::new(
        StaticContext::builder()
            .with_namespace("v", "urn:vars")
            .with_default_variable_namespace("urn:vars")
            .with_variable(local("x"))
            .build(),
    );
    let dyn_ctx = DynamicContextBuilder::<SimpleNode>::new(Arc::clone(&static_ctx))
        .with_variable(prefixed("v", "x"), AtomicValue::string("ok"))
        .build();
    let out = compile("$x || $v:x || $Q{urn:vars}x", &static_ctx).unwrap().evaluate(None, &dyn_ctx).unwrap();
    assert_eq!(first_string(&out), "okokok");
}

#[rstest]
fn try_build_surfaces_unbound_prefixes() {
    let err = StaticContext::builder().with_variable(prefixed("nope", "x")).try_build().unwrap_err();
    assert_eq!(err.code(), ErrorCode::PREFIX_NOT_EXPANDABLE);

    let err = DynamicContextBuilder::<SimpleNode>::default()
        .with_variable(prefixed("nope", "x"), AtomicValue::Integer(1))
        .try_build()
        .err()
        .map(|e| e.code());
    assert_eq!(err, Some(ErrorCode::PREFIX_NOT_EXPANDABLE));

    assert!(DynamicContextBuilder::<SimpleNode>::default().with_variable(local("x"), AtomicValue::Integer(1)).try_build().is_ok());
}

#[rstest]
#[case(0, true)]
#[case(2, false)]
fn implicit_timezone_applies_to_zoneless_values(#[case] offset_hours: i32, #[case] expected: bool) {
    let static_ctx = Arc::new(StaticContext::default());
    let offset = FixedOffset::east_opt(offset_hours * 3600).unwrap();
    let dyn_ctx = DynamicContextBuilder::<SimpleNode>::new(Arc::clone(&static_ctx)).with_implicit_timezone(offset).build();
    assert_eq!(dyn_ctx.implicit_timezone(), offset);
    let text = "('2024-01-01T00:00:00' cast as meta:date-time) eq ('2024-01-01T02:00:00+02:00' cast as meta:date-time)";
    let out = compile(text, &static_ctx).unwrap().evaluate(None, &dyn_ctx).unwrap();
    assert_eq!(out, Sequence::from_bool(expected));
}

fn namespaced_doc() -> SimpleNode {
    document()
        .child(assembly("catalog").namespace("urn:model").child(field("title", "T").namespace("urn:model")))
        .build()
}

#[rstest]
fn default_model_namespace_drives_name_tests() {
    let doc = namespaced_doc();
    let plain = Arc::new(StaticContext::default());
    let model = Arc::new(StaticContext::builder().with_default_model_namespace("urn:model").build());
    let prefixed_ctx = Arc::new(StaticContext::builder().with_namespace("m", "urn:model").build());
    let dyn_ctx = DynamicContext::<SimpleNode>::default();
    let count = |text: &str, ctx: &Arc<StaticContext>| {
        compile(text, ctx).unwrap().evaluate(Some(Item::Node(doc.clone())), &dyn_ctx).unwrap().len()
    };
    assert_eq!(count("catalog/title", &plain), 0);
    assert_eq!(count("catalog/title", &model), 1);
    assert_eq!(count("m:catalog/m:title", &prefixed_ctx), 1);
    assert_eq!(count("m:*/m:*", &prefixed_ctx), 1);
    assert_eq!(count("Q{urn:model}catalog", &plain), 1);
    assert_eq!(count("Q{urn:model}*", &plain), 1);
}

#[rstest]
fn extra_atomic_type_names_resolve() {
    let static_ctx = Arc::new(StaticContext::builder().with_atomic_type(local("text"), AtomicType::String).build());
    let dyn_ctx = DynamicContext::<SimpleNode>::default();
    let out = compile("(1 cast as text) instance of meta:string", &static_ctx).unwrap().evaluate(None, &dyn_ctx).unwrap();
    assert_eq!(out, Sequence::from_bool(true));
}

#[rstest]
fn function_library_can_be_removed_or_moved() {
    let bare = Arc::new(StaticContext::builder().without_builtin_functions().build());
    assert_eq!(compile("count(1)", &bare).unwrap_err().code(), ErrorCode::NO_FUNCTION_MATCH);

    let moved = Arc::new(StaticContext::builder().with_default_function_namespace("urn:none").build());
    assert_eq!(compile("count(1)", &moved).unwrap_err().code(), ErrorCode::NO_FUNCTION_MATCH);
    assert!(compile("fn:count(1)", &moved).is_ok());
}

#[rstest]
fn private_name_cache_still_matches_nodes() {
    let cache = Arc::new(NameCache::new());
    let static_ctx = Arc::new(StaticContext::builder().with_name_cache(Arc::clone(&cache)).build());
    let doc = document().child(assembly("catalog")).build();
    let dyn_ctx = DynamicContextBuilder::<SimpleNode>::new(Arc::clone(&static_ctx)).build();
    let out = compile("count(catalog)", &static_ctx).unwrap().evaluate(Some(Item::Node(doc)), &dyn_ctx).unwrap();
    assert_eq!(first_string(&out), "1");
    assert!(cache.lookup("", "catalog").is_some());
}

#[rstest]
fn base_uri_is_exposed() {
    let base = url::Url::parse("https://example.org/catalogs/").unwrap();
    let ctx = StaticContext::builder().with_base_uri(base.clone()).build();
    assert_eq!(ctx.base_uri(), Some(&base));
    assert!(StaticContext::default().base_uri().is_none());
}

#[rstest]
fn expressions_compiled_with_a_private_cache_run_in_any_context() {
    let static_ctx = Arc::new(
        StaticContext::builder().with_name_cache(Arc::new(NameCache::new())).with_variable(local("n")).build(),
    );
    let expr = compile("count((1, 2)) + $n", &static_ctx).unwrap();
    let dyn_ctx = DynamicContextBuilder::<SimpleNode>::default().with_variable(local("n"), AtomicValue::Integer(10)).build();
    assert!(!Arc::ptr_eq(dyn_ctx.static_context().names(), static_ctx.names()));
    assert_eq!(first_string(&expr.evaluate(None, &dyn_ctx).unwrap()), "12");
    let out = compile("count((1, 2))", &static_ctx).unwrap().evaluate(None, &DynamicContext::default()).unwrap();
    assert_eq!(first_string(&out), "2");
}

#[rstest]
fn doc_resolves_against_the_compiled_base_uri() {
    let static_ctx =
        Arc::new(StaticContext::builder().with_base_uri(url::Url::parse("file:///data/catalogs/").unwrap()).build());
    let loader: Arc<dyn metapath::engine::runtime::DocumentLoader<SimpleNode>> =
        Arc::new(|uri: &url::Url| -> metapath::Result<SimpleNode> {
            assert_eq!(uri.as_str(), "file:///data/catalogs/cat.json");
            Ok(document().child(assembly("catalog")).build())
        });
    let dyn_ctx = DynamicContextBuilder::<SimpleNode>::default().with_document_loader(loader).build();
    assert!(dyn_ctx.static_context().base_uri().is_none());
    let out = compile("count(doc('cat.json')/catalog)", &static_ctx).unwrap().evaluate(None, &dyn_ctx).unwrap();
    assert_eq!(first_string(&out), "1");
}
