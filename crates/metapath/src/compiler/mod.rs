//! Compilation: parse, resolve names against a [`StaticContext`] and build
//! the immutable [`cst::Expr`] tree.
use std::str::FromStr;
use std::sync::{Arc, OnceLock};

use rust_decimal::Decimal;
use tracing::debug;

use crate::engine::error::{Error, ErrorCode, Result};
use crate::engine::evaluator::{ResultKind, ResultValue};
use crate::engine::runtime::{DynamicContext, Focus, NameKind, StaticContext};
use crate::model::NodeItem;
use crate::names::{LexicalName, QName};
use crate::parser::{ast, parse_metapath};
use crate::types::{AtomicType, ItemType, KindTest, NameTest, SequenceType};
use crate::xdm::{AtomicValue, Item, Sequence};

pub mod cst;
pub mod printer;

static DEFAULT_STATIC_CONTEXT: OnceLock<Arc<StaticContext>> = OnceLock::new();

fn default_static_ctx() -> &'static Arc<StaticContext> {
    DEFAULT_STATIC_CONTEXT.get_or_init(|| Arc::new(StaticContext::default()))
}

/// A compiled expression, ready to be evaluated any number of times and from
/// any number of threads.
#[derive(Debug, Clone)]
pub struct CompiledExpression {
    expr: Arc<cst::Expr>,
    static_ctx: Arc<StaticContext>,
    source: Arc<str>,
}

impl CompiledExpression {
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn expr(&self) -> &cst::Expr {
        &self.expr
    }

    pub fn static_context(&self) -> &Arc<StaticContext> {
        &self.static_ctx
    }

    pub fn static_result_type(&self) -> ItemType {
        self.expr.static_result_type()
    }

    /// Evaluate with `context_item` as the initial focus, if any. Names,
    /// the base URI and function lookup come from the static context this
    /// expression was compiled against, whatever static context `ctx` was
    /// built with.
    pub fn evaluate<N: NodeItem>(&self, context_item: Option<Item<N>>, ctx: &DynamicContext<N>) -> Result<Sequence<N>> {
        let ctx = ctx.for_static_context(&self.static_ctx);
        let focus = context_item.map(Focus::singleton);
        self.expr.evaluate(&ctx, focus.as_ref())
    }

    /// Evaluate and coerce the result to `kind`.
    pub fn evaluate_as<N: NodeItem>(
        &self,
        context_item: Option<Item<N>>,
        kind: ResultKind,
        ctx: &DynamicContext<N>,
    ) -> Result<ResultValue<N>> {
        let result = self.evaluate(context_item, ctx)?;
        kind.coerce(result)
    }
}

/// Compile against the default static context.
pub fn compile_default(text: &str) -> Result<CompiledExpression> {
    compile(text, default_static_ctx())
}

/// Compile `text`. All static errors surface here; nothing is deferred to
/// evaluation.
pub fn compile(text: &str, static_ctx: &Arc<StaticContext>) -> Result<CompiledExpression> {
    debug!(expression = text, "compiling metapath");
    let ast = parse_metapath(text).map_err(|e| {
        Error::from_code(ErrorCode::INVALID_PATH_GRAMMAR, format!("unable to parse '{text}': {e}"))
            .with_source(Some(Arc::new(e) as Arc<dyn std::error::Error + Send + Sync>))
    })?;
    let mut compiler = Compiler { static_ctx, source: text, scope: Vec::new() };
    let expr = compiler.lower(&ast)?;
    debug!(expression = text, result_type = %expr.static_result_type(), "compiled metapath");
    Ok(CompiledExpression { expr: Arc::new(expr), static_ctx: Arc::clone(static_ctx), source: Arc::from(text) })
}

struct Compiler<'a> {
    static_ctx: &'a StaticContext,
    source: &'a str,
    /// Variables bound by enclosing `for`, `let` and quantified expressions.
    scope: Vec<QName>,
}

impl Compiler<'_> {
    fn text(&self, span: ast::Span) -> Arc<str> {
        Arc::from(span.slice(self.source))
    }

    fn lower_all(&mut self, exprs: &[ast::Expr]) -> Result<Vec<cst::Expr>> {
        exprs.iter().map(|e| self.lower(e)).collect()
    }

    fn lower_boxed(&mut self, expr: &ast::Expr) -> Result<Box<cst::Expr>> {
        self.lower(expr).map(Box::new)
    }

    fn lower(&mut self, expr: &ast::Expr) -> Result<cst::Expr> {
        use ast::ExprKind as A;
        use cst::ExprKind as C;
        let text = self.text(expr.span);
        let kind = match &expr.kind {
            A::Literal(lit) => C::Literal(lower_literal(lit)?),
            A::Sequence(items) => C::Sequence(self.lower_all(items)?),
            A::ContextItem => C::ContextItem,
            A::Root => C::Root,
            A::RootedPath { separator, relative } => {
                C::RootedPath { separator: *separator, relative: self.lower_boxed(relative)? }
            }
            A::Path { separator, left, right } => {
                C::Path { separator: *separator, left: self.lower_boxed(left)?, right: self.lower_boxed(right)? }
            }
            A::Step { axis, test, predicates } => {
                C::Step { axis: *axis, test: self.lower_node_test(test)?, predicates: self.lower_all(predicates)? }
            }
            A::Filter { base, predicates } => {
                C::Filter { base: self.lower_boxed(base)?, predicates: self.lower_all(predicates)? }
            }
            A::VariableRef(name) => C::VariableRef(self.resolve_variable(name)?),
            A::FunctionCall { name, args } => {
                let qname = self.static_ctx.resolve_name(name, NameKind::Function)?;
                self.static_ctx.function_signatures().check(&qname, args.len()).map_err(|e| e.into_error(args.len()))?;
                C::FunctionCall { name: qname, args: self.lower_all(args)? }
            }
            A::And(items) => C::And(self.lower_all(items)?),
            A::Or(items) => C::Or(self.lower_all(items)?),
            A::If { condition, then_branch, else_branch } => C::If {
                condition: self.lower_boxed(condition)?,
                then_branch: self.lower_boxed(then_branch)?,
                else_branch: self.lower_boxed(else_branch)?,
            },
            A::ValueComparison { op, left, right } => {
                C::ValueComparison { op: *op, left: self.lower_boxed(left)?, right: self.lower_boxed(right)? }
            }
            A::GeneralComparison { op, left, right } => {
                C::GeneralComparison { op: *op, left: self.lower_boxed(left)?, right: self.lower_boxed(right)? }
            }
            A::Arithmetic { op, left, right } => {
                C::Arithmetic { op: *op, left: self.lower_boxed(left)?, right: self.lower_boxed(right)? }
            }
            A::Negate(e) => C::Negate(self.lower_boxed(e)?),
            A::UnaryPlus(e) => C::UnaryPlus(self.lower_boxed(e)?),
            A::Range { start, end } => C::Range { start: self.lower_boxed(start)?, end: self.lower_boxed(end)? },
            A::StringConcat(items) => C::StringConcat(self.lower_all(items)?),
            A::SetOperation { op, left, right } => {
                C::SetOperation { op: *op, left: self.lower_boxed(left)?, right: self.lower_boxed(right)? }
            }
            A::InstanceOf { operand, ty } => {
                C::InstanceOf { operand: self.lower_boxed(operand)?, ty: self.lower_sequence_type(ty)? }
            }
            A::Treat { operand, ty } => C::Treat { operand: self.lower_boxed(operand)?, ty: self.lower_sequence_type(ty)? },
            A::Cast { operand, target } => C::Cast {
                operand: self.lower_boxed(operand)?,
                target: self.cast_target(target)?,
                allow_empty: target.optional,
            },
            A::Castable { operand, target } => C::Castable {
                operand: self.lower_boxed(operand)?,
                target: self.cast_target(target)?,
                allow_empty: target.optional,
            },
            A::Let { bindings, body } => return self.lower_bindings(bindings, body, text, true),
            A::For { bindings, body } => return self.lower_bindings(bindings, body, text, false),
            A::Quantified { quantifier, bindings, satisfies } => {
                let depth = self.scope.len();
                let mut lowered = Vec::with_capacity(bindings.len());
                for (name, domain) in bindings {
                    let domain = self.lower(domain)?;
                    let qname = self.static_ctx.resolve_name(name, NameKind::Variable)?;
                    self.scope.push(qname.clone());
                    lowered.push((qname, domain));
                }
                let satisfies = self.lower_boxed(satisfies)?;
                self.scope.truncate(depth);
                C::Quantified { quantifier: *quantifier, bindings: lowered, satisfies }
            }
            A::MapConstructor(entries) => {
                let mut lowered = Vec::with_capacity(entries.len());
                for (key, value) in entries {
                    lowered.push((self.lower(key)?, self.lower(value)?));
                }
                C::MapConstructor(lowered)
            }
            A::SquareArray(members) => C::SquareArray(self.lower_all(members)?),
            A::CurlyArray(body) => match body {
                Some(body) => C::CurlyArray(self.lower_boxed(body)?),
                None => C::CurlyArray(Box::new(cst::Expr::new(C::Sequence(Vec::new()), text.clone()))),
            },
        };
        Ok(cst::Expr::new(kind, text))
    }

    /// `let $a := x, $b := y return z` becomes `let $a := x return let $b := y return z`.
    fn lower_bindings(
        &mut self,
        bindings: &[(LexicalName, ast::Expr)],
        body: &ast::Expr,
        text: Arc<str>,
        is_let: bool,
    ) -> Result<cst::Expr> {
        let depth = self.scope.len();
        let mut lowered = Vec::with_capacity(bindings.len());
        for (name, value) in bindings {
            let value = self.lower(value)?;
            let qname = self.static_ctx.resolve_name(name, NameKind::Variable)?;
            self.scope.push(qname.clone());
            lowered.push((qname, value));
        }
        let mut expr = self.lower(body)?;
        self.scope.truncate(depth);
        for (variable, value) in lowered.into_iter().rev() {
            let (value, body) = (Box::new(value), Box::new(expr));
            let kind = if is_let {
                cst::ExprKind::Let { variable, value, body }
            } else {
                cst::ExprKind::For { variable, domain: value, body }
            };
            expr = cst::Expr::new(kind, text.clone());
        }
        Ok(expr)
    }

    fn resolve_variable(&self, name: &LexicalName) -> Result<QName> {
        let qname = self.static_ctx.resolve_name(name, NameKind::Variable)?;
        if self.scope.contains(&qname) || self.static_ctx.is_variable_declared(&qname) {
            return Ok(qname);
        }
        Err(Error::from_code(ErrorCode::NOT_DEFINED, format!("variable ${name} is not defined")))
    }

    fn lower_name_test(&self, test: &ast::NameTest) -> Result<NameTest> {
        Ok(match test {
            ast::NameTest::Any => NameTest::Any,
            ast::NameTest::Name(name) => NameTest::Name(self.static_ctx.resolve_name(name, NameKind::Model)?),
            ast::NameTest::Prefix(prefix) => NameTest::Namespace(self.static_ctx.resolve_prefix(prefix)?.to_string()),
            ast::NameTest::Namespace(uri) => NameTest::Namespace(uri.clone()),
            ast::NameTest::LocalName(local) => NameTest::LocalName(local.clone()),
        })
    }

    fn lower_kind_test(&self, test: &ast::KindTest) -> Result<KindTest> {
        let name = match &test.name {
            Some(name) => self.lower_name_test(name)?,
            None => NameTest::Any,
        };
        let type_name = test.type_name.as_ref().map(|t| self.static_ctx.resolve_name(t, NameKind::Type)).transpose()?;
        Ok(KindTest { kind: test.kind, name, type_name })
    }

    fn lower_node_test(&self, test: &ast::NodeTest) -> Result<cst::NodeTest> {
        Ok(match test {
            ast::NodeTest::Name(name) => cst::NodeTest::Name(self.lower_name_test(name)?),
            ast::NodeTest::Kind(kind) => cst::NodeTest::Kind(self.lower_kind_test(kind)?),
        })
    }

    fn atomic_type(&self, name: &LexicalName, code: ErrorCode) -> Result<AtomicType> {
        let qname = self.static_ctx.resolve_name(name, NameKind::Type)?;
        self.static_ctx
            .lookup_atomic_type(&qname)
            .ok_or_else(|| Error::from_code(code, format!("unknown atomic type {name}")))
    }

    fn cast_target(&self, target: &ast::SingleType) -> Result<AtomicType> {
        let ty = self.atomic_type(&target.name, ErrorCode::CAST_UNKNOWN_TYPE)?;
        if ty == AtomicType::AnyAtomic {
            return Err(Error::from_code(
                ErrorCode::CAST_ANY_ATOMIC,
                format!("cannot cast to the abstract type {}", target.name),
            ));
        }
        Ok(ty)
    }

    fn lower_item_type(&self, item: &ast::ItemType) -> Result<ItemType> {
        Ok(match item {
            ast::ItemType::AnyItem => ItemType::AnyItem,
            ast::ItemType::Atomic(name) => ItemType::Atomic(self.atomic_type(name, ErrorCode::UNKNOWN_TYPE)?),
            ast::ItemType::Kind(test) => ItemType::Kind(self.lower_kind_test(test)?),
            ast::ItemType::Map(None) => ItemType::Map(None),
            ast::ItemType::Map(Some((key, value))) => ItemType::Map(Some((
                self.atomic_type(key, ErrorCode::UNKNOWN_TYPE)?,
                Box::new(self.lower_sequence_type(value)?),
            ))),
            ast::ItemType::Array(None) => ItemType::Array(None),
            ast::ItemType::Array(Some(member)) => ItemType::Array(Some(Box::new(self.lower_sequence_type(member)?))),
        })
    }

    fn lower_sequence_type(&self, ty: &ast::SequenceType) -> Result<SequenceType> {
        match ty {
            ast::SequenceType::Empty => Ok(SequenceType::empty()),
            ast::SequenceType::Typed { item, occurrence } => {
                Ok(SequenceType::new(self.lower_item_type(item)?, *occurrence))
            }
        }
    }
}

fn lower_literal(lit: &ast::Literal) -> Result<AtomicValue> {
    let overflow = |s: &str| Error::from_code(ErrorCode::FOAR0002, format!("numeric literal {s} is out of range"));
    match lit {
        ast::Literal::String(s) => Ok(AtomicValue::String(s.clone())),
        ast::Literal::Integer(s) => match s.parse::<i64>() {
            Ok(i) => Ok(AtomicValue::Integer(i)),
            Err(_) => Decimal::from_str(s).map(AtomicValue::Decimal).map_err(|_| overflow(s)),
        },
        ast::Literal::Decimal(s) => Decimal::from_str(s).map(AtomicValue::Decimal).map_err(|_| overflow(s)),
        ast::Literal::Double(s) => Decimal::from_scientific(s).map(AtomicValue::Decimal).map_err(|_| overflow(s)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::names::NameCache;
    use rstest::rstest;

    fn ctx() -> Arc<StaticContext> {
        Arc::new(
            StaticContext::builder()
                .with_name_cache(Arc::new(NameCache::new()))
                .with_namespace("ex", "urn:example")
                .build(),
        )
    }

    fn code_of(text: &str) -> ErrorCode {
        compile(text, &ctx()).map(|_| ()).unwrap_err().code()
    }

    #[rstest]
    #[case("**", ErrorCode::INVALID_PATH_GRAMMAR)]
    #[case("'a' cast as meta:any-atomic-type", ErrorCode::CAST_ANY_ATOMIC)]
    #[case("'a' cast as meta:no-such-type", ErrorCode::CAST_UNKNOWN_TYPE)]
    #[case("'a' cast as nope:string", ErrorCode::PREFIX_NOT_EXPANDABLE)]
    #[case("$undeclared", ErrorCode::NOT_DEFINED)]
    #[case("fn:no-such-function()", ErrorCode::NO_FUNCTION_MATCH)]
    #[case("count(1, 2)", ErrorCode::NO_FUNCTION_MATCH)]
    #[case("1 instance of meta:bogus", ErrorCode::UNKNOWN_TYPE)]
    #[case("nope:*", ErrorCode::PREFIX_NOT_EXPANDABLE)]
    fn static_errors(#[case] text: &str, #[case] expected: ErrorCode) {
        assert_eq!(code_of(text), expected);
    }

    #[rstest]
    fn static_errors_are_static() {
        let err = compile("'a' cast as meta:bogus", &ctx()).unwrap_err();
        assert!(err.is_static());
    }

    #[rstest]
    fn bare_type_names_use_the_metapath_namespace() {
        let compiled = compile("'1' cast as integer", &ctx()).unwrap();
        assert!(matches!(compiled.expr().kind, cst::ExprKind::Cast { target: AtomicType::Integer, .. }));
    }

    #[rstest]
    fn bound_variables_are_in_scope() {
        assert!(compile("let $x := 1 return $x", &ctx()).is_ok());
        assert!(compile("for $x in (1, 2), $y in $x return $y", &ctx()).is_ok());
        assert_eq!(code_of("(let $x := 1 return $x) + $x"), ErrorCode::NOT_DEFINED);
    }

    #[rstest]
    fn multiple_let_bindings_nest() {
        let compiled = compile("let $a := 1, $b := 2 return $b", &ctx()).unwrap();
        let cst::ExprKind::Let { body, .. } = &compiled.expr().kind else { panic!() };
        assert!(matches!(body.kind, cst::ExprKind::Let { .. }));
    }

    #[rstest]
    fn declared_variables_compile() {
        let sc = Arc::new(StaticContext::builder().with_variable(LexicalName::Local("input".into())).build());
        assert!(compile("$input", &sc).is_ok());
    }

    #[rstest]
    #[case("1", AtomicValue::Integer(1))]
    #[case("99999999999999999999", AtomicValue::Decimal(Decimal::from_str("99999999999999999999").unwrap()))]
    #[case("1.5e2", AtomicValue::Decimal(Decimal::from(150)))]
    #[case("'x'", AtomicValue::String("x".into()))]
    fn literals_are_typed(#[case] text: &str, #[case] expected: AtomicValue) {
        let compiled = compile(text, &ctx()).unwrap();
        assert_eq!(compiled.expr().kind, cst::ExprKind::Literal(expected));
    }

    #[rstest]
    fn prefix_wildcard_resolves_to_namespace() {
        let compiled = compile("ex:*", &ctx()).unwrap();
        let cst::ExprKind::Step { test: cst::NodeTest::Name(NameTest::Namespace(uri)), .. } = &compiled.expr().kind
        else {
            panic!()
        };
        assert_eq!(uri, "urn:example");
    }

    #[rstest]
    fn subexpressions_keep_their_text() {
        let compiled = compile("1 + (2 * 3)", &ctx()).unwrap();
        let cst::ExprKind::Arithmetic { right, .. } = &compiled.expr().kind else { panic!() };
        assert_eq!(&*right.text, "2 * 3");
        assert_eq!(compiled.source(), "1 + (2 * 3)");
    }

    #[rstest]
    #[case("1 + 2.5", "meta:numeric")]
    #[case("-(1 * 2)", "meta:numeric")]
    #[case("('2024-01-01' cast as meta:date) + ('P1D' cast as meta:day-time-duration)", "item()")]
    #[case("-('PT1H' cast as meta:day-time-duration)", "item()")]
    #[case("$x - 1", "item()")]
    #[case("a | b", "node()")]
    #[case("a union (b/c)", "node()")]
    #[case("(1, 2) union (3)", "item()")]
    #[case("a intersect (1, 2)", "item()")]
    fn static_result_types_bound_the_value(#[case] text: &str, #[case] expected: &str) {
        let sc = Arc::new(StaticContext::builder().with_variable(LexicalName::Local("x".into())).build());
        assert_eq!(compile(text, &sc).unwrap().static_result_type().to_string(), expected);
    }
}
