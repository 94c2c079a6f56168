//! Path expressions and axis steps.
use core::cmp::Ordering;

use crate::compiler::cst::{Axis, Expr, NodeTest, PathSeparator};
use crate::engine::error::{Error, ErrorCode, Result};
use crate::engine::runtime::{DynamicContext, Focus};
use crate::model::{NodeItem, NodeKind};
use crate::xdm::{Item, Sequence};

use super::{apply_predicates, require_focus};

fn context_node<N: NodeItem>(focus: Option<&Focus<N>>) -> Result<&N> {
    match &require_focus(focus)?.item {
        Item::Node(node) => Ok(node),
        other => Err(Error::from_code(
            ErrorCode::MPTY0020,
            format!("an axis step needs a node as context item, got {}", describe(other)),
        )),
    }
}

fn describe<N>(item: &Item<N>) -> String {
    match item {
        Item::Node(_) => "a node".to_string(),
        Item::Atomic(value) => format!("a value of type {}", value.atomic_type()),
        Item::Map(_) => "a map".to_string(),
        Item::Array(_) => "an array".to_string(),
    }
}

pub(super) fn root<N: NodeItem>(focus: Option<&Focus<N>>) -> Result<N> {
    context_node(focus).map(NodeItem::root)
}

/// Sort nodes into document order and drop duplicates.
pub(super) fn doc_order_distinct<N: NodeItem>(mut nodes: Vec<N>) -> Result<Vec<N>> {
    let mut sorted = true;
    for pair in nodes.windows(2) {
        if pair[0].compare_document_order(&pair[1])? != Ordering::Less {
            sorted = false;
            break;
        }
    }
    if sorted {
        return Ok(nodes);
    }
    let mut failure = None;
    nodes.sort_by(|a, b| {
        a.compare_document_order(b).unwrap_or_else(|e| {
            failure.get_or_insert(e);
            Ordering::Equal
        })
    });
    if let Some(e) = failure {
        return Err(e);
    }
    nodes.dedup();
    Ok(nodes)
}

fn descendants<N: NodeItem>(node: &N, out: &mut Vec<N>) {
    for child in node.children() {
        out.push(child.clone());
        descendants(&child, out);
    }
}

/// Nodes on `axis` from `node`, nearest first for reverse axes.
fn axis_nodes<N: NodeItem>(node: &N, axis: Axis) -> Vec<N> {
    match axis {
        Axis::Child => node.children(),
        Axis::Flag => node.flags(),
        Axis::SelfAxis => vec![node.clone()],
        Axis::Descendant | Axis::DescendantOrSelf => {
            let mut out = Vec::new();
            if axis == Axis::DescendantOrSelf {
                out.push(node.clone());
            }
            descendants(node, &mut out);
            out
        }
        Axis::Parent => node.parent().into_iter().collect(),
        Axis::Ancestor | Axis::AncestorOrSelf => {
            let mut out = Vec::new();
            if axis == Axis::AncestorOrSelf {
                out.push(node.clone());
            }
            let mut current = node.parent();
            while let Some(parent) = current {
                current = parent.parent();
                out.push(parent);
            }
            out
        }
    }
}

/// Name tests select flags on the flag axis and assemblies or fields
/// everywhere else.
fn is_principal(axis: Axis, kind: NodeKind) -> bool {
    match axis {
        Axis::Flag => kind == NodeKind::Flag,
        _ => matches!(kind, NodeKind::Assembly | NodeKind::Field),
    }
}

fn node_test_matches<N: NodeItem>(node: &N, axis: Axis, test: &NodeTest) -> bool {
    match test {
        NodeTest::Kind(kind) => kind.matches(node),
        NodeTest::Name(name) => is_principal(axis, node.kind()) && name.matches(node.name().as_ref()),
    }
}

pub(super) fn step<N: NodeItem>(
    ctx: &DynamicContext<N>,
    focus: Option<&Focus<N>>,
    axis: Axis,
    test: &NodeTest,
    predicates: &[Expr],
) -> Result<Sequence<N>> {
    let node = context_node(focus)?;
    let candidates = axis_nodes(node, axis)
        .into_iter()
        .filter(|n| node_test_matches(n, axis, test))
        .map(Item::Node)
        .collect();
    let mut selected = apply_predicates(ctx, candidates, predicates)?;
    if axis.is_reverse() {
        selected.reverse();
    }
    Ok(Sequence::from(selected))
}

/// Results of the right-hand side of a path: nodes come back in document
/// order without duplicates, values in evaluation order, and a mix is an
/// error.
fn combine<N: NodeItem>(items: Vec<Item<N>>) -> Result<Sequence<N>> {
    let node_count = items.iter().filter(|i| i.is_node()).count();
    if node_count == 0 {
        return Ok(Sequence::from(items));
    }
    if node_count != items.len() {
        return Err(Error::from_code(ErrorCode::MPTY0018, "a path step returned both nodes and non-node items"));
    }
    let nodes = items.into_iter().filter_map(|i| match i {
        Item::Node(n) => Some(n),
        _ => None,
    });
    let ordered = doc_order_distinct(nodes.collect())?;
    Ok(ordered.into_iter().map(Item::Node).collect())
}

fn expand_descendants<N: NodeItem>(nodes: Vec<N>) -> Result<Vec<N>> {
    let mut out = Vec::new();
    for node in &nodes {
        out.extend(axis_nodes(node, Axis::DescendantOrSelf));
    }
    doc_order_distinct(out)
}

fn apply_relative<N: NodeItem>(ctx: &DynamicContext<N>, nodes: Vec<N>, right: &Expr) -> Result<Sequence<N>> {
    let size = nodes.len();
    let mut results = Vec::new();
    for (index, node) in nodes.into_iter().enumerate() {
        let focus = Focus::new(Item::Node(node), index + 1, size);
        results.extend(right.evaluate(ctx, Some(&focus))?);
    }
    combine(results)
}

pub(super) fn path<N: NodeItem>(
    ctx: &DynamicContext<N>,
    focus: Option<&Focus<N>>,
    separator: PathSeparator,
    left: &Expr,
    right: &Expr,
) -> Result<Sequence<N>> {
    let mut nodes = Vec::new();
    for item in left.evaluate(ctx, focus)? {
        match item {
            Item::Node(node) => nodes.push(node),
            other => {
                return Err(Error::from_code(
                    ErrorCode::MPTY0019,
                    format!("the left side of '/' must select nodes, got {}", describe(&other)),
                ));
            }
        }
    }
    let nodes = match separator {
        PathSeparator::Child => doc_order_distinct(nodes)?,
        PathSeparator::Descendant => expand_descendants(nodes)?,
    };
    apply_relative(ctx, nodes, right)
}

pub(super) fn rooted_path<N: NodeItem>(
    ctx: &DynamicContext<N>,
    focus: Option<&Focus<N>>,
    separator: PathSeparator,
    relative: &Expr,
) -> Result<Sequence<N>> {
    let start = vec![root(focus)?];
    let nodes = match separator {
        PathSeparator::Child => start,
        PathSeparator::Descendant => expand_descendants(start)?,
    };
    apply_relative(ctx, nodes, relative)
}
