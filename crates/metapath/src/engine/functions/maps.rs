//! `map:*` and `array:*` accessors.
use super::common::{boolean, integer, single_atomic};
use crate::engine::error::{Error, ErrorCode, Result};
use crate::engine::runtime::CallCtx;
use crate::model::NodeItem;
use crate::xdm::{ArrayItem, Item, MapItem, Sequence};

fn single_map<N>(seq: &Sequence<N>) -> Result<&MapItem<N>> {
    match seq.items() {
        [Item::Map(map)] => Ok(map),
        _ => Err(Error::type_error("expected a single map")),
    }
}

fn single_array<N>(seq: &Sequence<N>) -> Result<&ArrayItem<N>> {
    match seq.items() {
        [Item::Array(array)] => Ok(array),
        _ => Err(Error::type_error("expected a single array")),
    }
}

pub(super) fn map_size_fn<N: NodeItem>(_ctx: &CallCtx<N>, args: &[Sequence<N>]) -> Result<Sequence<N>> {
    integer(single_map(&args[0])?.size())
}

pub(super) fn map_keys_fn<N: NodeItem>(_ctx: &CallCtx<N>, args: &[Sequence<N>]) -> Result<Sequence<N>> {
    Ok(single_map(&args[0])?.keys().cloned().map(Item::Atomic).collect())
}

pub(super) fn map_get_fn<N: NodeItem>(_ctx: &CallCtx<N>, args: &[Sequence<N>]) -> Result<Sequence<N>> {
    let map = single_map(&args[0])?;
    let key = single_atomic(&args[1], "a map key")?;
    Ok(map.get(&key).cloned().unwrap_or_default())
}

pub(super) fn map_contains_fn<N: NodeItem>(_ctx: &CallCtx<N>, args: &[Sequence<N>]) -> Result<Sequence<N>> {
    let map = single_map(&args[0])?;
    let key = single_atomic(&args[1], "a map key")?;
    boolean(map.contains(&key))
}

pub(super) fn array_size_fn<N: NodeItem>(_ctx: &CallCtx<N>, args: &[Sequence<N>]) -> Result<Sequence<N>> {
    integer(single_array(&args[0])?.size())
}

pub(super) fn array_get_fn<N: NodeItem>(_ctx: &CallCtx<N>, args: &[Sequence<N>]) -> Result<Sequence<N>> {
    let array = single_array(&args[0])?;
    let index = single_atomic(&args[1], "an array index")?;
    let position = index
        .as_integer()
        .ok_or_else(|| Error::type_error(format!("array index must be an integer, got {}", index.atomic_type())))?;
    usize::try_from(position).ok().and_then(|p| array.get(p)).cloned().ok_or_else(|| {
        Error::from_code(ErrorCode::FOAY0001, format!("array index {position} is out of bounds for size {}", array.size()))
    })
}
