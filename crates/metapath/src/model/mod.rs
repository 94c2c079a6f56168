//! Node trees queried by Metapath.
//!
//! The engine does not own node storage. A model layer implements
//! [`NodeItem`] for its node handle type; [`simple`] provides an in-memory
//! implementation for tests and prototypes.
use core::cmp::Ordering;

use crate::engine::error::{Error, ErrorCode, Result};
use crate::names::QName;
use crate::xdm::AtomicValue;

pub mod simple;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Document,
    Assembly,
    Field,
    Flag,
}

/// Capabilities the engine needs from a node handle.
///
/// Handles are cheap to clone and compare equal iff they denote the same
/// node.
pub trait NodeItem: Clone + Eq + core::fmt::Debug + Send + Sync + 'static {
    fn kind(&self) -> NodeKind;

    /// Instance name. Documents have none.
    fn name(&self) -> Option<QName>;

    /// Type name used by `field(N, T)` style kind tests.
    fn type_name(&self) -> Option<QName> {
        None
    }

    /// Atomized value. Fields and flags have one; assemblies and documents
    /// return `None`.
    fn typed_value(&self) -> Option<AtomicValue>;

    fn string_value(&self) -> String;

    fn parent(&self) -> Option<Self>;

    /// Model children (assemblies and fields) in document order.
    fn children(&self) -> Vec<Self>;

    fn flags(&self) -> Vec<Self>;

    fn base_uri(&self) -> Option<String> {
        None
    }

    /// Optional total-order key; when both nodes provide one it decides
    /// document order directly.
    fn doc_order_key(&self) -> Option<u64> {
        None
    }

    fn compare_document_order(&self, other: &Self) -> Result<Ordering> {
        if let (Some(a), Some(b)) = (self.doc_order_key(), other.doc_order_key()) {
            return Ok(a.cmp(&b));
        }
        try_compare_by_ancestry(self, other)
    }

    fn root(&self) -> Self {
        let mut current = self.clone();
        while let Some(parent) = current.parent() {
            current = parent;
        }
        current
    }
}

/// Document order from ancestry alone: ancestors precede descendants, flags
/// precede model children, siblings keep their parent's order.
pub fn try_compare_by_ancestry<N: NodeItem>(a: &N, b: &N) -> Result<Ordering> {
    if a == b {
        return Ok(Ordering::Equal);
    }
    fn path_to_root<N: NodeItem>(node: &N) -> Vec<N> {
        let mut path = vec![node.clone()];
        let mut current = node.clone();
        while let Some(parent) = current.parent() {
            path.push(parent.clone());
            current = parent;
        }
        path.reverse();
        path
    }
    let pa = path_to_root(a);
    let pb = path_to_root(b);
    let common = pa.iter().zip(pb.iter()).take_while(|(x, y)| x == y).count();
    if common == 0 {
        return Err(Error::from_code(
            ErrorCode::FOER0000,
            "nodes from different trees have no document order",
        ));
    }
    if common == pa.len() || common == pb.len() {
        return Ok(pa.len().cmp(&pb.len()));
    }
    let parent = &pa[common - 1];
    let (x, y) = (&pa[common], &pb[common]);
    let siblings: Vec<N> = parent.flags().into_iter().chain(parent.children()).collect();
    let ix = siblings.iter().position(|s| s == x);
    let iy = siblings.iter().position(|s| s == y);
    match (ix, iy) {
        (Some(ix), Some(iy)) => Ok(ix.cmp(&iy)),
        _ => Err(Error::from_code(ErrorCode::FOER0000, "node is not among its parent's children")),
    }
}
