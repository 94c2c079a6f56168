use crate::compiler::cst::SetOp;
use crate::engine::error::{ErrorCode, Result};
use crate::model::NodeItem;
use crate::xdm::{Item, Sequence};

use super::path::doc_order_distinct;

fn all_nodes<N>(items: &[Item<N>]) -> Option<Vec<N>>
where
    N: Clone,
{
    items.iter().map(|i| i.as_node().cloned()).collect()
}

/// `union`, `intersect` and `except`.
///
/// Node operands from one tree give a duplicate-free result in document
/// order. Anything else falls back to item equality, keeping the order of
/// the left operand followed by new items from the right.
pub(super) fn apply<N: NodeItem>(op: SetOp, left: Sequence<N>, right: Sequence<N>) -> Result<Sequence<N>> {
    let (left, right) = (left.into_items(), right.into_items());
    if let (Some(l), Some(r)) = (all_nodes(&left), all_nodes(&right)) {
        match by_document_order(op, l, r) {
            Ok(nodes) => return Ok(nodes.into_iter().map(Item::Node).collect()),
            Err(e) if e.code() == ErrorCode::FOER0000 => {}
            Err(e) => return Err(e),
        }
    }
    Ok(Sequence::from(by_equality(op, left, right)))
}

fn by_document_order<N: NodeItem>(op: SetOp, left: Vec<N>, right: Vec<N>) -> Result<Vec<N>> {
    match op {
        SetOp::Union => doc_order_distinct(left.into_iter().chain(right).collect()),
        SetOp::Intersect => {
            let left = doc_order_distinct(left)?;
            Ok(left.into_iter().filter(|n| right.contains(n)).collect())
        }
        SetOp::Except => {
            let left = doc_order_distinct(left)?;
            Ok(left.into_iter().filter(|n| !right.contains(n)).collect())
        }
    }
}

fn by_equality<N: PartialEq>(op: SetOp, left: Vec<Item<N>>, right: Vec<Item<N>>) -> Vec<Item<N>> {
    let mut out: Vec<Item<N>> = Vec::with_capacity(left.len());
    match op {
        SetOp::Union => {
            for item in left.into_iter().chain(right) {
                if !out.contains(&item) {
                    out.push(item);
                }
            }
        }
        SetOp::Intersect => {
            for item in left {
                if right.contains(&item) && !out.contains(&item) {
                    out.push(item);
                }
            }
        }
        SetOp::Except => out.extend(left.into_iter().filter(|item| !right.contains(item))),
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::simple::{SimpleNode, assembly, document};
    use crate::xdm::AtomicValue;
    use rstest::rstest;

    fn atoms(values: &[i64]) -> Sequence<SimpleNode> {
        values.iter().map(|v| Item::Atomic(AtomicValue::Integer(*v))).collect()
    }

    #[rstest]
    #[case(SetOp::Union, &[1, 2, 2], &[3, 1], &[1, 2, 3])]
    #[case(SetOp::Intersect, &[1, 2, 3], &[3, 1], &[1, 3])]
    #[case(SetOp::Except, &[1, 2, 3, 2], &[3], &[1, 2, 2])]
    fn value_sets_keep_left_order(
        #[case] op: SetOp,
        #[case] left: &[i64],
        #[case] right: &[i64],
        #[case] expected: &[i64],
    ) {
        assert_eq!(apply(op, atoms(left), atoms(right)).unwrap(), atoms(expected));
    }

    #[rstest]
    fn node_union_is_in_document_order() {
        let doc = document().child(assembly("a")).child(assembly("b")).build();
        let children = doc.children();
        let (a, b) = (children[0].clone(), children[1].clone());
        let left: Sequence<SimpleNode> = vec![Item::Node(b.clone())].into();
        let right: Sequence<SimpleNode> = vec![Item::Node(a.clone()), Item::Node(b.clone())].into();
        let result = apply(SetOp::Union, left, right).unwrap();
        assert_eq!(result.into_items(), vec![Item::Node(a), Item::Node(b)]);
    }

    #[rstest]
    fn union_keeps_nodes_from_separate_trees() {
        let first = document().child(assembly("a")).build();
        let second = document().child(assembly("a")).build();
        let left: Sequence<SimpleNode> = vec![Item::Node(second.clone())].into();
        let right: Sequence<SimpleNode> = vec![Item::Node(first.clone())].into();
        let result = apply(SetOp::Union, left, right).unwrap();
        assert_eq!(result.len(), 2);
    }
}
