use url::Url;

use super::common::{arg_or_context, integer, optional_node, string, string_arg};
use crate::engine::error::{Error, ErrorCode, Result};
use crate::engine::runtime::CallCtx;
use crate::model::NodeItem;
use crate::xdm::{Item, Sequence};

pub(super) fn position_fn<N: NodeItem>(ctx: &CallCtx<N>, _args: &[Sequence<N>]) -> Result<Sequence<N>> {
    integer(ctx.require_focus()?.position)
}

pub(super) fn last_fn<N: NodeItem>(ctx: &CallCtx<N>, _args: &[Sequence<N>]) -> Result<Sequence<N>> {
    integer(ctx.require_focus()?.size)
}

pub(super) fn local_name_fn<N: NodeItem>(ctx: &CallCtx<N>, args: &[Sequence<N>]) -> Result<Sequence<N>> {
    let target = arg_or_context(ctx, args)?;
    let local = optional_node(&target)?.and_then(NodeItem::name).map(|q| q.local_name().to_string());
    string(local.unwrap_or_default())
}

pub(super) fn root_fn<N: NodeItem>(ctx: &CallCtx<N>, args: &[Sequence<N>]) -> Result<Sequence<N>> {
    let target = arg_or_context(ctx, args)?;
    Ok(optional_node(&target)?.map(|n| Sequence::singleton(Item::Node(n.root()))).unwrap_or_default())
}

/// Relative references resolve against the static base URI.
pub(super) fn doc_fn<N: NodeItem>(ctx: &CallCtx<N>, args: &[Sequence<N>]) -> Result<Sequence<N>> {
    if args[0].is_empty() {
        return Ok(Sequence::empty());
    }
    let reference = string_arg(&args[0])?;
    let resolved = match ctx.static_ctx.base_uri() {
        Some(base) => base.join(&reference),
        None => Url::parse(&reference),
    };
    let uri = resolved.map_err(|e| {
        Error::from_code(ErrorCode::FODC0002, format!("'{reference}' is not a valid document URI: {e}"))
    })?;
    let doc = ctx.dyn_ctx.load_document(&uri)?;
    Ok(Sequence::singleton(Item::Node(doc)))
}
