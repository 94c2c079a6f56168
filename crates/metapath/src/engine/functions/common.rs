use crate::engine::error::{Error, Result};
use crate::engine::runtime::CallCtx;
use crate::model::NodeItem;
use crate::xdm::{AtomicValue, Item, Sequence};

/// The explicit argument, or the context item for the zero-argument form.
pub(super) fn arg_or_context<N: NodeItem>(ctx: &CallCtx<N>, args: &[Sequence<N>]) -> Result<Sequence<N>> {
    match args.first() {
        Some(arg) => Ok(arg.clone()),
        None => Ok(Sequence::singleton(ctx.require_focus()?.item.clone())),
    }
}

/// String value of an optional single item; empty gives `""`.
pub(super) fn string_value<N: NodeItem>(seq: &Sequence<N>) -> Result<String> {
    match seq.singleton_item()? {
        None => Ok(String::new()),
        Some(item) => item.string_value(),
    }
}

/// Atomized string argument; empty gives `""`.
pub(super) fn string_arg<N: NodeItem>(seq: &Sequence<N>) -> Result<String> {
    Ok(seq.atomize_singleton()?.map(|v| v.to_string()).unwrap_or_default())
}

pub(super) fn single_atomic<N: NodeItem>(seq: &Sequence<N>, what: &str) -> Result<AtomicValue> {
    seq.atomize_singleton()?.ok_or_else(|| Error::type_error(format!("{what} must not be empty")))
}

pub(super) fn optional_node<N: NodeItem>(seq: &Sequence<N>) -> Result<Option<&N>> {
    match seq.singleton_item()? {
        None => Ok(None),
        Some(Item::Node(node)) => Ok(Some(node)),
        Some(_) => Err(Error::type_error("expected a node")),
    }
}

pub(super) fn boolean<N>(b: bool) -> Result<Sequence<N>> {
    Ok(Sequence::from_bool(b))
}

pub(super) fn string<N>(s: impl Into<String>) -> Result<Sequence<N>> {
    Ok(Sequence::singleton(AtomicValue::String(s.into())))
}

pub(super) fn integer<N>(i: usize) -> Result<Sequence<N>> {
    let value = i64::try_from(i).map_err(|_| Error::type_error("count exceeds the integer range"))?;
    Ok(Sequence::singleton(AtomicValue::Integer(value)))
}
