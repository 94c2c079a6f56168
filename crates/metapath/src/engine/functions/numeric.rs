use rust_decimal::Decimal;

use crate::compiler::cst::ArithmeticOp;
use crate::engine::error::{Error, ErrorCode, Result};
use crate::engine::evaluator::{arithmetic, numeric_operand};
use crate::engine::runtime::CallCtx;
use crate::model::NodeItem;
use crate::xdm::{AtomicValue, Sequence};

fn overflow() -> Error {
    Error::from_code(ErrorCode::FOAR0002, "numeric overflow")
}

/// Apply a rounding rule to an optional numeric argument. Integers pass
/// through `on_integer`, everything else goes through decimals.
fn map_numeric<N: NodeItem>(
    arg: &Sequence<N>,
    on_integer: impl Fn(i64) -> Option<i64>,
    on_decimal: impl Fn(Decimal) -> Option<Decimal>,
) -> Result<Sequence<N>> {
    let Some(value) = arg.atomize_singleton()? else {
        return Ok(Sequence::empty());
    };
    let result = match numeric_operand(&value)? {
        AtomicValue::Decimal(d) => AtomicValue::Decimal(on_decimal(d).ok_or_else(overflow)?),
        other => match other.as_integer() {
            Some(i) => AtomicValue::Integer(on_integer(i).ok_or_else(overflow)?),
            None => return Err(Error::type_error(format!("expected a number, got {}", other.atomic_type()))),
        },
    };
    Ok(Sequence::singleton(result))
}

pub(super) fn abs_fn<N: NodeItem>(_ctx: &CallCtx<N>, args: &[Sequence<N>]) -> Result<Sequence<N>> {
    map_numeric(&args[0], i64::checked_abs, |d| Some(d.abs()))
}

pub(super) fn ceiling_fn<N: NodeItem>(_ctx: &CallCtx<N>, args: &[Sequence<N>]) -> Result<Sequence<N>> {
    map_numeric(&args[0], Some, |d| Some(d.ceil()))
}

pub(super) fn floor_fn<N: NodeItem>(_ctx: &CallCtx<N>, args: &[Sequence<N>]) -> Result<Sequence<N>> {
    map_numeric(&args[0], Some, |d| Some(d.floor()))
}

/// Halves round towards positive infinity: `round(2.5)` is 3, `round(-2.5)` is -2.
pub(super) fn round_fn<N: NodeItem>(_ctx: &CallCtx<N>, args: &[Sequence<N>]) -> Result<Sequence<N>> {
    map_numeric(&args[0], Some, |d| d.checked_add(Decimal::new(5, 1)).map(|h| h.floor()))
}

/// Sum of the atomized argument. The empty sum is the second argument, or
/// integer zero.
pub(super) fn sum_fn<N: NodeItem>(ctx: &CallCtx<N>, args: &[Sequence<N>]) -> Result<Sequence<N>> {
    let values = args[0].atomize()?;
    let mut iter = values.into_iter();
    let Some(first) = iter.next() else {
        return match args.get(1) {
            Some(zero) => Ok(zero.clone()),
            None => Ok(Sequence::singleton(AtomicValue::Integer(0))),
        };
    };
    let tz = ctx.dyn_ctx.implicit_timezone();
    let mut total = match first {
        AtomicValue::UntypedAtomic(_) => numeric_operand(&first)?,
        other => other,
    };
    for value in iter {
        total = arithmetic(ArithmeticOp::Add, &total, &value, tz)?;
    }
    Ok(Sequence::singleton(total))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::runtime::DynamicContext;
    use crate::model::simple::SimpleNode;
    use rstest::rstest;

    fn call(
        f: fn(&CallCtx<SimpleNode>, &[Sequence<SimpleNode>]) -> Result<Sequence<SimpleNode>>,
        value: AtomicValue,
    ) -> Result<Sequence<SimpleNode>> {
        let dctx = DynamicContext::<SimpleNode>::default();
        let ctx = CallCtx { dyn_ctx: &dctx, static_ctx: dctx.static_context(), focus: None };
        f(&ctx, &[Sequence::singleton(value)])
    }

    fn dec(s: &str) -> AtomicValue {
        AtomicValue::Decimal(s.parse().unwrap())
    }

    #[rstest]
    #[case(dec("2.5"), dec("3"))]
    #[case(dec("-2.5"), dec("-2"))]
    #[case(dec("2.4"), dec("2"))]
    #[case(AtomicValue::Integer(7), AtomicValue::Integer(7))]
    fn round_half_up(#[case] input: AtomicValue, #[case] expected: AtomicValue) {
        assert_eq!(call(round_fn, input).unwrap(), Sequence::singleton(expected));
    }

    #[rstest]
    fn abs_keeps_integer_type_and_detects_overflow() {
        assert_eq!(call(abs_fn, AtomicValue::Integer(-4)).unwrap(), Sequence::singleton(AtomicValue::Integer(4)));
        assert_eq!(call(abs_fn, AtomicValue::Integer(i64::MIN)).unwrap_err().code(), ErrorCode::FOAR0002);
    }

    #[rstest]
    fn ceiling_and_floor_of_decimals() {
        assert_eq!(call(ceiling_fn, dec("1.2")).unwrap(), Sequence::singleton(dec("2")));
        assert_eq!(call(floor_fn, dec("-1.2")).unwrap(), Sequence::singleton(dec("-2")));
    }
}
