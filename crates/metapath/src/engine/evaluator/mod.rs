//! Tree-walking evaluation of compiled expressions.
//!
//! Evaluation is a pure function of the node, the dynamic context and the
//! focus. Subexpressions that short-circuiting or conditionals skip are never
//! evaluated.
use rust_decimal::Decimal;
use smallvec::SmallVec;
use tracing::{debug, trace};

use crate::compiler::cst::{Expr, ExprKind, Quantifier};
use crate::engine::error::{Error, ErrorCode, Result};
use crate::engine::runtime::{CallCtx, DynamicContext, Features, Focus};
use crate::model::NodeItem;
use crate::names::QName;
use crate::types::AtomicType;
use crate::xdm::{ArrayItem, AtomicValue, Item, MapItem, Sequence};

mod arithmetic;
mod comparison;
mod path;
mod set_ops;
mod type_ops;

pub(crate) use arithmetic::numeric_operand;
pub use arithmetic::{arithmetic, negate};
pub use comparison::{compare_atomic, general_compare, value_compare};

impl Expr {
    /// Evaluate this expression. `focus` is the context item with its
    /// position, absent at the top level when no context item was given.
    pub fn evaluate<N: NodeItem>(&self, ctx: &DynamicContext<N>, focus: Option<&Focus<N>>) -> Result<Sequence<N>> {
        use ExprKind as K;
        match &self.kind {
            K::Literal(value) => Ok(Sequence::singleton(value.clone())),
            K::Sequence(items) => {
                let parts = items.iter().map(|e| e.evaluate(ctx, focus)).collect::<Result<Vec<_>>>()?;
                Ok(Sequence::flatten(parts))
            }
            K::ContextItem => Ok(Sequence::singleton(require_focus(focus)?.item.clone())),
            K::Root => path::root(focus).map(|root| Sequence::singleton(Item::Node(root))),
            K::RootedPath { separator, relative } => path::rooted_path(ctx, focus, *separator, relative),
            K::Path { separator, left, right } => path::path(ctx, focus, *separator, left, right),
            K::Step { axis, test, predicates } => path::step(ctx, focus, *axis, test, predicates),
            K::Filter { base, predicates } => {
                let base = base.evaluate(ctx, focus)?;
                apply_predicates(ctx, base.into_items(), predicates).map(Sequence::from)
            }
            K::VariableRef(name) => variable(ctx, name),
            K::FunctionCall { name, args } => call_function(ctx, focus, name, args),
            K::And(items) => {
                for item in items {
                    if !effective_boolean_value(&item.evaluate(ctx, focus)?)? {
                        return Ok(Sequence::from_bool(false));
                    }
                }
                Ok(Sequence::from_bool(true))
            }
            K::Or(items) => {
                for item in items {
                    if effective_boolean_value(&item.evaluate(ctx, focus)?)? {
                        return Ok(Sequence::from_bool(true));
                    }
                }
                Ok(Sequence::from_bool(false))
            }
            K::If { condition, then_branch, else_branch } => {
                if effective_boolean_value(&condition.evaluate(ctx, focus)?)? {
                    then_branch.evaluate(ctx, focus)
                } else {
                    else_branch.evaluate(ctx, focus)
                }
            }
            K::ValueComparison { op, left, right } => {
                let (l, r) = (left.evaluate(ctx, focus)?, right.evaluate(ctx, focus)?);
                value_compare(*op, &l, &r, ctx.implicit_timezone())
            }
            K::GeneralComparison { op, left, right } => {
                let (l, r) = (left.evaluate(ctx, focus)?, right.evaluate(ctx, focus)?);
                general_compare(*op, &l, &r, ctx.implicit_timezone()).map(Sequence::from_bool)
            }
            K::Arithmetic { op, left, right } => {
                let l = left.evaluate(ctx, focus)?.atomize_singleton()?;
                let r = right.evaluate(ctx, focus)?.atomize_singleton()?;
                match (l, r) {
                    (Some(l), Some(r)) => arithmetic(*op, &l, &r, ctx.implicit_timezone()).map(Sequence::singleton),
                    _ => Ok(Sequence::empty()),
                }
            }
            K::Negate(operand) => match operand.evaluate(ctx, focus)?.atomize_singleton()? {
                Some(value) => negate(&value).map(Sequence::singleton),
                None => Ok(Sequence::empty()),
            },
            K::UnaryPlus(operand) => match operand.evaluate(ctx, focus)?.atomize_singleton()? {
                Some(value) => arithmetic::numeric_operand(&value).map(Sequence::singleton),
                None => Ok(Sequence::empty()),
            },
            K::Range { start, end } => range(ctx, focus, start, end),
            K::StringConcat(items) => {
                let mut out = String::new();
                for item in items {
                    if let Some(value) = item.evaluate(ctx, focus)?.atomize_singleton()? {
                        out.push_str(&value.to_string());
                    }
                }
                Ok(Sequence::singleton(AtomicValue::String(out)))
            }
            K::SetOperation { op, left, right } => {
                let (l, r) = (left.evaluate(ctx, focus)?, right.evaluate(ctx, focus)?);
                set_ops::apply(*op, l, r)
            }
            K::InstanceOf { operand, ty } => {
                let value = operand.evaluate(ctx, focus)?;
                Ok(Sequence::from_bool(ty.matches(&value)))
            }
            K::Treat { operand, ty } => type_ops::treat(operand.evaluate(ctx, focus)?, ty),
            K::Cast { operand, target, allow_empty } => {
                type_ops::cast(&operand.evaluate(ctx, focus)?, *target, *allow_empty)
            }
            K::Castable { operand, target, allow_empty } => {
                let value = operand.evaluate(ctx, focus)?;
                type_ops::castable(&value, *target, *allow_empty).map(Sequence::from_bool)
            }
            K::Let { variable, value, body } => {
                let value = value.evaluate(ctx, focus)?;
                body.evaluate(&ctx.bind_variable(variable.clone(), value), focus)
            }
            K::For { variable, domain, body } => {
                let domain = domain.evaluate(ctx, focus)?;
                let mut parts = Vec::with_capacity(domain.len());
                for item in domain {
                    let scope = ctx.bind_variable(variable.clone(), Sequence::singleton(item));
                    parts.push(body.evaluate(&scope, focus)?);
                }
                Ok(Sequence::flatten(parts))
            }
            K::Quantified { quantifier, bindings, satisfies } => {
                quantify(ctx, focus, *quantifier, bindings, satisfies).map(Sequence::from_bool)
            }
            K::MapConstructor(entries) => {
                let mut out = Vec::with_capacity(entries.len());
                for (key, value) in entries {
                    let key = key
                        .evaluate(ctx, focus)?
                        .atomize_singleton()?
                        .ok_or_else(|| Error::type_error("a map key must be a single atomic value"))?;
                    out.push((key, value.evaluate(ctx, focus)?));
                }
                Ok(Sequence::singleton(Item::Map(MapItem::from_entries(out))))
            }
            K::SquareArray(members) => {
                let members = members.iter().map(|m| m.evaluate(ctx, focus)).collect::<Result<Vec<_>>>()?;
                Ok(Sequence::singleton(Item::Array(ArrayItem::new(members))))
            }
            K::CurlyArray(body) => {
                let members = body.evaluate(ctx, focus)?.into_iter().map(Sequence::from).collect();
                Ok(Sequence::singleton(Item::Array(ArrayItem::new(members))))
            }
        }
    }
}

pub(crate) fn require_focus<N>(focus: Option<&Focus<N>>) -> Result<&Focus<N>> {
    focus.ok_or_else(|| Error::from_code(ErrorCode::CONTEXT_ABSENT, "the context item is absent"))
}

fn variable<N: NodeItem>(ctx: &DynamicContext<N>, name: &QName) -> Result<Sequence<N>> {
    ctx.variable(name)
        .cloned()
        .ok_or_else(|| Error::from_code(ErrorCode::NOT_DEFINED, format!("no value is bound to variable ${name}")))
}

/// Effective boolean value.
///
/// Empty is false, a sequence starting with a node is true, and a single
/// boolean, string or number follows its value. Anything else is FORG0006.
pub fn effective_boolean_value<N: NodeItem>(seq: &Sequence<N>) -> Result<bool> {
    let invalid = |what: &str| Error::from_code(ErrorCode::FORG0006, format!("no effective boolean value for {what}"));
    match seq.items() {
        [] => Ok(false),
        [Item::Node(_), ..] => Ok(true),
        [Item::Atomic(value)] => match value {
            AtomicValue::Boolean(b) => Ok(*b),
            v if v.as_string_or_uri().is_some() => Ok(v.as_string_or_uri().is_some_and(|s| !s.is_empty())),
            v => match v.as_decimal() {
                Some(d) => Ok(!d.is_zero()),
                None => Err(invalid(&format!("a value of type {}", v.atomic_type()))),
            },
        },
        [Item::Map(_) | Item::Array(_)] => Err(invalid("a function item")),
        items => Err(invalid(&format!("a sequence of {} items", items.len()))),
    }
}

/// Keep the items satisfying every predicate, in order.
///
/// Positions come from the base sequence and stay fixed across all
/// predicates of one filter. A literal integer predicate selects by
/// position; any other predicate is evaluated with the item as focus and
/// reduced to its effective boolean value.
pub(crate) fn apply_predicates<N: NodeItem>(
    ctx: &DynamicContext<N>,
    items: Vec<Item<N>>,
    predicates: &[Expr],
) -> Result<Vec<Item<N>>> {
    if predicates.is_empty() {
        return Ok(items);
    }
    if !ctx.features().contains(Features::EVALUATE_PREDICATES) {
        debug!(predicates = predicates.len(), "predicate evaluation is disabled, passing items through");
        return Ok(items);
    }
    let size = items.len();
    let mut kept = Vec::with_capacity(size);
    'items: for (index, item) in items.into_iter().enumerate() {
        let focus = Focus::new(item, index + 1, size);
        for predicate in predicates {
            let matched = match &predicate.kind {
                ExprKind::Literal(AtomicValue::Integer(wanted)) => {
                    usize::try_from(*wanted).is_ok_and(|w| w == focus.position)
                }
                _ => effective_boolean_value(&predicate.evaluate(ctx, Some(&focus))?)?,
            };
            if !matched {
                continue 'items;
            }
        }
        kept.push(focus.item);
    }
    Ok(kept)
}

fn call_function<N: NodeItem>(
    ctx: &DynamicContext<N>,
    focus: Option<&Focus<N>>,
    name: &QName,
    args: &[Expr],
) -> Result<Sequence<N>> {
    let func = ctx.functions().resolve(name, args.len()).map_err(|e| e.into_error(args.len()))?;
    let values = args.iter().map(|a| a.evaluate(ctx, focus)).collect::<Result<SmallVec<[Sequence<N>; 4]>>>()?;
    trace!(function = %name, arity = args.len(), "calling function");
    let call = CallCtx { dyn_ctx: ctx, static_ctx: ctx.static_context(), focus };
    func(&call, values.as_slice())
}

fn range<N: NodeItem>(ctx: &DynamicContext<N>, focus: Option<&Focus<N>>, start: &Expr, end: &Expr) -> Result<Sequence<N>> {
    let bound = |e: &Expr| -> Result<Option<i64>> {
        let Some(value) = e.evaluate(ctx, focus)?.atomize_singleton()? else {
            return Ok(None);
        };
        let value = match value {
            AtomicValue::UntypedAtomic(_) => AtomicType::Integer.cast(&value)?,
            other => other,
        };
        value
            .as_integer()
            .map(Some)
            .ok_or_else(|| Error::type_error(format!("range bound {value} is not an integer")))
    };
    match (bound(start)?, bound(end)?) {
        (Some(from), Some(to)) if from <= to => Ok((from..=to).map(|i| Item::Atomic(AtomicValue::Integer(i))).collect()),
        _ => Ok(Sequence::empty()),
    }
}

fn quantify<N: NodeItem>(
    ctx: &DynamicContext<N>,
    focus: Option<&Focus<N>>,
    quantifier: Quantifier,
    bindings: &[(QName, Expr)],
    satisfies: &Expr,
) -> Result<bool> {
    let Some(((name, domain), rest)) = bindings.split_first() else {
        return effective_boolean_value(&satisfies.evaluate(ctx, focus)?);
    };
    for item in domain.evaluate(ctx, focus)? {
        let scope = ctx.bind_variable(name.clone(), Sequence::singleton(item));
        let holds = quantify(&scope, focus, quantifier, rest, satisfies)?;
        match quantifier {
            Quantifier::Some if holds => return Ok(true),
            Quantifier::Every if !holds => return Ok(false),
            _ => {}
        }
    }
    Ok(quantifier == Quantifier::Every)
}

/// Shape requested from [`CompiledExpression::evaluate_as`](crate::compiler::CompiledExpression::evaluate_as).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultKind {
    /// At most one item.
    Item,
    /// At most one node.
    Node,
    /// Effective boolean value.
    Boolean,
    /// String value of the first item, `""` when empty.
    String,
    /// First item cast to decimal, absent when empty.
    Number,
    Sequence,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ResultValue<N> {
    Item(Option<Item<N>>),
    Node(Option<N>),
    Boolean(bool),
    String(String),
    Number(Option<Decimal>),
    Sequence(Sequence<N>),
}

impl ResultKind {
    pub fn coerce<N: NodeItem>(self, result: Sequence<N>) -> Result<ResultValue<N>> {
        match self {
            ResultKind::Item => result.into_singleton().map(ResultValue::Item),
            ResultKind::Node => match result.into_singleton()? {
                None => Ok(ResultValue::Node(None)),
                Some(Item::Node(n)) => Ok(ResultValue::Node(Some(n))),
                Some(_) => Err(Error::type_error("expected a node")),
            },
            ResultKind::Boolean => effective_boolean_value(&result).map(ResultValue::Boolean),
            ResultKind::String => match result.first() {
                None => Ok(ResultValue::String(String::new())),
                Some(item) => item.string_value().map(ResultValue::String),
            },
            ResultKind::Number => {
                let Some(first) = result.into_items().into_iter().next() else {
                    return Ok(ResultValue::Number(None));
                };
                let mut atoms = Vec::with_capacity(1);
                first.atomize_into(&mut atoms)?;
                match atoms.first() {
                    None => Ok(ResultValue::Number(None)),
                    Some(value) => {
                        let number = AtomicType::Decimal.cast(value)?;
                        Ok(ResultValue::Number(number.as_decimal()))
                    }
                }
            }
            ResultKind::Sequence => Ok(ResultValue::Sequence(result)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::simple::SimpleNode;
    use rstest::rstest;

    fn seq(values: Vec<AtomicValue>) -> Sequence<SimpleNode> {
        values.into_iter().map(Item::Atomic).collect()
    }

    #[rstest]
    #[case(vec![], false)]
    #[case(vec![AtomicValue::Boolean(true)], true)]
    #[case(vec![AtomicValue::string("")], false)]
    #[case(vec![AtomicValue::string("x")], true)]
    #[case(vec![AtomicValue::Integer(0)], false)]
    #[case(vec![AtomicValue::Decimal(Decimal::new(5, 1))], true)]
    #[case(vec![AtomicValue::untyped("")], false)]
    fn ebv_table(#[case] values: Vec<AtomicValue>, #[case] expected: bool) {
        assert_eq!(effective_boolean_value(&seq(values)).unwrap(), expected);
    }

    #[rstest]
    fn ebv_rejects_multiple_atomics() {
        let err = effective_boolean_value(&seq(vec![1.into(), 2.into()])).unwrap_err();
        assert_eq!(err.code(), ErrorCode::FORG0006);
    }

    #[rstest]
    fn ebv_of_node_sequence_is_true() {
        let doc = crate::model::simple::document().child(crate::model::simple::assembly("a")).build();
        let nodes: Sequence<SimpleNode> = vec![Item::Node(doc.clone()), Item::Node(doc)].into();
        assert!(effective_boolean_value(&nodes).unwrap());
    }

    #[rstest]
    fn coerce_number_and_string() {
        let result = seq(vec![AtomicValue::string("42"), AtomicValue::string("x")]);
        assert_eq!(ResultKind::Number.coerce(result.clone()).unwrap(), ResultValue::Number(Some(Decimal::from(42))));
        assert_eq!(ResultKind::String.coerce(result).unwrap(), ResultValue::String("42".into()));
        assert_eq!(ResultKind::Number.coerce(seq(vec![])).unwrap(), ResultValue::Number(None));
    }

    #[rstest]
    fn coerce_item_requires_singleton() {
        let err = ResultKind::Item.coerce(seq(vec![1.into(), 2.into()])).unwrap_err();
        assert_eq!(err.code(), ErrorCode::INVALID_TYPE);
    }
}
