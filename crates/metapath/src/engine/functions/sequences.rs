use super::common::{arg_or_context, boolean, integer};
use crate::compiler::cst::ComparisonOp;
use crate::engine::error::{Error, ErrorCode, Result};
use crate::engine::evaluator::compare_atomic;
use crate::engine::runtime::CallCtx;
use crate::model::NodeItem;
use crate::xdm::{AtomicValue, Item, Sequence};

pub(super) fn count_fn<N: NodeItem>(_ctx: &CallCtx<N>, args: &[Sequence<N>]) -> Result<Sequence<N>> {
    integer(args[0].len())
}

pub(super) fn empty_fn<N: NodeItem>(_ctx: &CallCtx<N>, args: &[Sequence<N>]) -> Result<Sequence<N>> {
    boolean(args[0].is_empty())
}

pub(super) fn exists_fn<N: NodeItem>(_ctx: &CallCtx<N>, args: &[Sequence<N>]) -> Result<Sequence<N>> {
    boolean(!args[0].is_empty())
}

pub(super) fn head_fn<N: NodeItem>(_ctx: &CallCtx<N>, args: &[Sequence<N>]) -> Result<Sequence<N>> {
    Ok(args[0].first().cloned().map(Sequence::from).unwrap_or_default())
}

pub(super) fn tail_fn<N: NodeItem>(_ctx: &CallCtx<N>, args: &[Sequence<N>]) -> Result<Sequence<N>> {
    Ok(args[0].iter().skip(1).cloned().collect())
}

pub(super) fn data_fn<N: NodeItem>(ctx: &CallCtx<N>, args: &[Sequence<N>]) -> Result<Sequence<N>> {
    let value = arg_or_context(ctx, args)?;
    Ok(value.atomize()?.into_iter().map(Item::Atomic).collect())
}

/// First occurrence wins. Values of types that cannot be compared are
/// distinct from each other.
pub(super) fn distinct_values_fn<N: NodeItem>(ctx: &CallCtx<N>, args: &[Sequence<N>]) -> Result<Sequence<N>> {
    let tz = ctx.dyn_ctx.implicit_timezone();
    let mut seen: Vec<AtomicValue> = Vec::new();
    for value in args[0].atomize()? {
        let duplicate = seen.iter().any(|s| compare_atomic(ComparisonOp::Eq, s, &value, tz).unwrap_or(false));
        if !duplicate {
            seen.push(value);
        }
    }
    Ok(seen.into_iter().map(Item::Atomic).collect())
}

pub(super) fn exactly_one_fn<N: NodeItem>(_ctx: &CallCtx<N>, args: &[Sequence<N>]) -> Result<Sequence<N>> {
    if args[0].len() != 1 {
        return Err(Error::from_code(
            ErrorCode::FORG0005,
            format!("exactly-one requires a sequence of length 1, got {}", args[0].len()),
        ));
    }
    Ok(args[0].clone())
}

pub(super) fn zero_or_one_fn<N: NodeItem>(_ctx: &CallCtx<N>, args: &[Sequence<N>]) -> Result<Sequence<N>> {
    if args[0].len() > 1 {
        return Err(Error::from_code(ErrorCode::FORG0003, "zero-or-one requires at most one item"));
    }
    Ok(args[0].clone())
}

pub(super) fn one_or_more_fn<N: NodeItem>(_ctx: &CallCtx<N>, args: &[Sequence<N>]) -> Result<Sequence<N>> {
    if args[0].is_empty() {
        return Err(Error::from_code(ErrorCode::FORG0004, "one-or-more requires at least one item"));
    }
    Ok(args[0].clone())
}
