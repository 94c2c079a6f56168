use super::common::boolean;
use crate::engine::error::Result;
use crate::engine::evaluator::effective_boolean_value;
use crate::engine::runtime::CallCtx;
use crate::model::NodeItem;
use crate::xdm::Sequence;

pub(super) fn fn_true<N: NodeItem>(_ctx: &CallCtx<N>, _args: &[Sequence<N>]) -> Result<Sequence<N>> {
    boolean(true)
}

pub(super) fn fn_false<N: NodeItem>(_ctx: &CallCtx<N>, _args: &[Sequence<N>]) -> Result<Sequence<N>> {
    boolean(false)
}

pub(super) fn fn_not<N: NodeItem>(_ctx: &CallCtx<N>, args: &[Sequence<N>]) -> Result<Sequence<N>> {
    boolean(!effective_boolean_value(&args[0])?)
}

pub(super) fn fn_boolean<N: NodeItem>(_ctx: &CallCtx<N>, args: &[Sequence<N>]) -> Result<Sequence<N>> {
    boolean(effective_boolean_value(&args[0])?)
}
