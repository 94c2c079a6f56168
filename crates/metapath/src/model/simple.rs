//! In-memory node tree for tests and quick prototypes.
//!
//! ```
//! use metapath::model::simple::{assembly, document, field, flag};
//! use metapath::model::NodeItem;
//!
//! let doc = document()
//!     .child(
//!         assembly("catalog")
//!             .flag(flag("id", "c1"))
//!             .child(field("title", "Sample"))
//!             .child(assembly("group").child(field("count", 3))),
//!     )
//!     .build();
//! let catalog = doc.children()[0].clone();
//! assert_eq!(catalog.name().unwrap().local_name(), "catalog");
//! assert_eq!(catalog.flags().len(), 1);
//! assert_eq!(catalog.string_value(), "Sample3");
//! ```
//!
//! Nodes are immutable once built. Parent links are weak; keep the root
//! alive while navigating.
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use crate::consts::NS_METAPATH;
use crate::model::{NodeItem, NodeKind};
use crate::names::{NameCache, QName};
use crate::xdm::AtomicValue;

static NEXT_TREE: AtomicU64 = AtomicU64::new(1);

struct Inner {
    kind: NodeKind,
    name: Option<QName>,
    type_name: Option<QName>,
    value: Option<AtomicValue>,
    base_uri: Option<String>,
    parent: Weak<Inner>,
    flags: Vec<SimpleNode>,
    children: Vec<SimpleNode>,
    order: u64,
}

/// Arc-backed node handle. Equality is identity.
#[derive(Clone)]
pub struct SimpleNode(Arc<Inner>);

impl PartialEq for SimpleNode {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for SimpleNode {}

impl std::hash::Hash for SimpleNode {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        Arc::as_ptr(&self.0).hash(state);
    }
}

impl fmt::Debug for SimpleNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimpleNode")
            .field("kind", &self.0.kind)
            .field("name", &self.0.name)
            .field("value", &self.0.value)
            .field("flags", &self.0.flags.len())
            .field("children", &self.0.children.len())
            .finish()
    }
}

impl NodeItem for SimpleNode {
    fn kind(&self) -> NodeKind {
        self.0.kind
    }

    fn name(&self) -> Option<QName> {
        self.0.name.clone()
    }

    fn type_name(&self) -> Option<QName> {
        self.0.type_name.clone()
    }

    fn typed_value(&self) -> Option<AtomicValue> {
        self.0.value.clone()
    }

    fn string_value(&self) -> String {
        match self.0.kind {
            NodeKind::Field | NodeKind::Flag => self.0.value.as_ref().map(ToString::to_string).unwrap_or_default(),
            NodeKind::Assembly | NodeKind::Document => {
                fn collect(node: &SimpleNode, out: &mut String) {
                    for child in &node.0.children {
                        match child.0.kind {
                            NodeKind::Field => {
                                if let Some(v) = &child.0.value {
                                    out.push_str(&v.to_string());
                                }
                            }
                            _ => collect(child, out),
                        }
                    }
                }
                let mut out = String::new();
                collect(self, &mut out);
                out
            }
        }
    }

    fn parent(&self) -> Option<Self> {
        self.0.parent.upgrade().map(SimpleNode)
    }

    fn children(&self) -> Vec<Self> {
        self.0.children.clone()
    }

    fn flags(&self) -> Vec<Self> {
        self.0.flags.clone()
    }

    fn base_uri(&self) -> Option<String> {
        match &self.0.base_uri {
            Some(uri) => Some(uri.clone()),
            None => self.parent().and_then(|p| p.base_uri()),
        }
    }

    fn doc_order_key(&self) -> Option<u64> {
        Some(self.0.order)
    }
}

#[derive(Debug, Clone)]
pub struct SimpleNodeBuilder {
    kind: NodeKind,
    namespace: String,
    local: String,
    value: Option<AtomicValue>,
    base_uri: Option<String>,
    flags: Vec<SimpleNodeBuilder>,
    children: Vec<SimpleNodeBuilder>,
}

impl SimpleNodeBuilder {
    fn new(kind: NodeKind, local: &str, value: Option<AtomicValue>) -> Self {
        Self {
            kind,
            namespace: String::new(),
            local: local.to_string(),
            value,
            base_uri: None,
            flags: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Place this node's name in `namespace`.
    pub fn namespace(mut self, namespace: &str) -> Self {
        self.namespace = namespace.to_string();
        self
    }

    pub fn child(mut self, child: SimpleNodeBuilder) -> Self {
        debug_assert!(matches!(child.kind, NodeKind::Assembly | NodeKind::Field));
        self.children.push(child);
        self
    }

    pub fn children(mut self, children: impl IntoIterator<Item = SimpleNodeBuilder>) -> Self {
        self.children.extend(children);
        self
    }

    pub fn flag(mut self, flag: SimpleNodeBuilder) -> Self {
        debug_assert!(flag.kind == NodeKind::Flag);
        self.flags.push(flag);
        self
    }

    pub fn base_uri(mut self, uri: &str) -> Self {
        self.base_uri = Some(uri.to_string());
        self
    }

    pub fn build(self) -> SimpleNode {
        self.build_with_cache(&NameCache::global())
    }

    /// Build, interning names into `cache`.
    pub fn build_with_cache(self, cache: &NameCache) -> SimpleNode {
        let tree = NEXT_TREE.fetch_add(1, Ordering::Relaxed);
        let mut ctx = BuildCtx { cache, next: tree << 32 };
        build_node(self, Weak::new(), &mut ctx)
    }
}

struct BuildCtx<'a> {
    cache: &'a NameCache,
    next: u64,
}

fn build_node(builder: SimpleNodeBuilder, parent: Weak<Inner>, ctx: &mut BuildCtx<'_>) -> SimpleNode {
    let order = ctx.next;
    ctx.next += 1;
    let name = match builder.kind {
        NodeKind::Document => None,
        _ => Some(ctx.cache.intern(&builder.namespace, &builder.local)),
    };
    let type_name =
        builder.value.as_ref().map(|v| ctx.cache.intern(NS_METAPATH, v.atomic_type().local_name()));
    SimpleNode(Arc::new_cyclic(|me| {
        let flags = builder.flags.into_iter().map(|f| build_node(f, me.clone(), ctx)).collect();
        let children = builder.children.into_iter().map(|c| build_node(c, me.clone(), ctx)).collect();
        Inner {
            kind: builder.kind,
            name,
            type_name,
            value: builder.value,
            base_uri: builder.base_uri,
            parent,
            flags,
            children,
            order,
        }
    }))
}

pub fn document() -> SimpleNodeBuilder {
    SimpleNodeBuilder::new(NodeKind::Document, "", None)
}

pub fn assembly(name: &str) -> SimpleNodeBuilder {
    SimpleNodeBuilder::new(NodeKind::Assembly, name, None)
}

pub fn field(name: &str, value: impl Into<AtomicValue>) -> SimpleNodeBuilder {
    SimpleNodeBuilder::new(NodeKind::Field, name, Some(value.into()))
}

pub fn flag(name: &str, value: impl Into<AtomicValue>) -> SimpleNodeBuilder {
    SimpleNodeBuilder::new(NodeKind::Flag, name, Some(value.into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn sample() -> SimpleNode {
        document()
            .child(
                assembly("root")
                    .flag(flag("id", "r"))
                    .child(field("a", "x"))
                    .child(assembly("b").child(field("c", 1))),
            )
            .build()
    }

    #[rstest]
    fn parents_are_linked() {
        let doc = sample();
        let root = doc.children()[0].clone();
        let b = root.children()[1].clone();
        let c = b.children()[0].clone();
        assert_eq!(c.parent().unwrap(), b);
        assert_eq!(c.root(), doc);
        assert_eq!(root.flags()[0].parent().unwrap(), root);
    }

    #[rstest]
    fn document_order_is_preorder_with_flags_first() {
        let doc = sample();
        let root = doc.children()[0].clone();
        let id = root.flags()[0].clone();
        let a = root.children()[0].clone();
        assert_eq!(root.compare_document_order(&id).unwrap(), core::cmp::Ordering::Less);
        assert_eq!(id.compare_document_order(&a).unwrap(), core::cmp::Ordering::Less);
        assert_eq!(crate::model::try_compare_by_ancestry(&id, &a).unwrap(), core::cmp::Ordering::Less);
    }

    #[rstest]
    fn field_type_name_follows_value() {
        let doc = sample();
        let c = doc.children()[0].children()[1].children()[0].clone();
        assert_eq!(c.type_name().unwrap().local_name(), "integer");
        assert_eq!(c.typed_value(), Some(AtomicValue::Integer(1)));
    }

    #[rstest]
    fn trees_do_not_compare_by_ancestry() {
        let one = sample();
        let two = sample();
        assert!(crate::model::try_compare_by_ancestry(&one, &two).is_err());
    }
}
