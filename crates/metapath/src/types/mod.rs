//! Item types, sequence types and atomic data types.
//!
//! [`SequenceType::matches`] and [`ItemType::matches`] never fail; they only
//! answer whether a value conforms.
use core::fmt;

use crate::model::{NodeItem, NodeKind};
use crate::names::QName;
use crate::xdm::{Item, Sequence};

mod atomic;
mod cast;
pub mod temporal;

pub use atomic::{AtomicType, AtomicTypeRegistry};
pub use cast::CastError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Occurrence {
    Empty,
    ZeroOrOne,
    One,
    ZeroOrMore,
    OneOrMore,
}

impl Occurrence {
    pub fn allows(self, count: usize) -> bool {
        match self {
            Occurrence::Empty => count == 0,
            Occurrence::ZeroOrOne => count <= 1,
            Occurrence::One => count == 1,
            Occurrence::ZeroOrMore => true,
            Occurrence::OneOrMore => count >= 1,
        }
    }

    /// Occurrence for a trailing `?`, `*` or `+`; none means exactly one.
    pub fn from_indicator(indicator: Option<char>) -> Self {
        match indicator {
            Some('?') => Occurrence::ZeroOrOne,
            Some('*') => Occurrence::ZeroOrMore,
            Some('+') => Occurrence::OneOrMore,
            _ => Occurrence::One,
        }
    }

    pub fn indicator(self) -> &'static str {
        match self {
            Occurrence::Empty | Occurrence::One => "",
            Occurrence::ZeroOrOne => "?",
            Occurrence::ZeroOrMore => "*",
            Occurrence::OneOrMore => "+",
        }
    }
}

/// Which node kinds a kind test accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeTestKind {
    AnyNode,
    Document,
    Assembly,
    Field,
    Flag,
}

impl NodeTestKind {
    pub fn accepts(self, kind: NodeKind) -> bool {
        match self {
            NodeTestKind::AnyNode => true,
            NodeTestKind::Document => kind == NodeKind::Document,
            NodeTestKind::Assembly => kind == NodeKind::Assembly,
            NodeTestKind::Field => kind == NodeKind::Field,
            NodeTestKind::Flag => kind == NodeKind::Flag,
        }
    }

    fn keyword(self) -> &'static str {
        match self {
            NodeTestKind::AnyNode => "node",
            NodeTestKind::Document => "document-node",
            NodeTestKind::Assembly => "assembly",
            NodeTestKind::Field => "field",
            NodeTestKind::Flag => "flag",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NameTest {
    /// `*`
    Any,
    Name(QName),
    /// `prefix:*` or `Q{uri}*`
    Namespace(String),
    /// `*:local`
    LocalName(String),
}

impl NameTest {
    pub fn matches(&self, name: Option<&QName>) -> bool {
        match (self, name) {
            (NameTest::Any, _) => true,
            (_, None) => false,
            (NameTest::Name(expected), Some(actual)) => expected.same_name(actual),
            (NameTest::Namespace(uri), Some(actual)) => actual.namespace_uri() == uri,
            (NameTest::LocalName(local), Some(actual)) => actual.local_name() == local,
        }
    }
}

impl fmt::Display for NameTest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NameTest::Any => f.write_str("*"),
            NameTest::Name(q) => write!(f, "{q}"),
            NameTest::Namespace(uri) => write!(f, "Q{{{uri}}}*"),
            NameTest::LocalName(local) => write!(f, "*:{local}"),
        }
    }
}

/// Node shape test: kind plus optional instance and type name constraints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KindTest {
    pub kind: NodeTestKind,
    pub name: NameTest,
    pub type_name: Option<QName>,
}

impl KindTest {
    pub fn any(kind: NodeTestKind) -> Self {
        Self { kind, name: NameTest::Any, type_name: None }
    }

    pub fn matches<N: NodeItem>(&self, node: &N) -> bool {
        if !self.kind.accepts(node.kind()) {
            return false;
        }
        if !matches!(self.name, NameTest::Any) && !self.name.matches(node.name().as_ref()) {
            return false;
        }
        match &self.type_name {
            None => true,
            Some(expected) => node.type_name().is_some_and(|actual| expected.same_name(&actual)),
        }
    }
}

impl fmt::Display for KindTest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.kind.keyword())?;
        match (&self.name, &self.type_name) {
            (NameTest::Any, None) => {}
            (name, None) => write!(f, "{name}")?,
            (name, Some(ty)) => write!(f, "{name}, {ty}")?,
        }
        f.write_str(")")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemType {
    /// `item()`
    AnyItem,
    Atomic(AtomicType),
    Kind(KindTest),
    /// `map(*)` when `None`.
    Map(Option<(AtomicType, Box<SequenceType>)>),
    /// `array(*)` when `None`.
    Array(Option<Box<SequenceType>>),
}

impl ItemType {
    pub fn matches<N: NodeItem>(&self, item: &Item<N>) -> bool {
        match (self, item) {
            (ItemType::AnyItem, _) => true,
            (ItemType::Atomic(ty), Item::Atomic(value)) => value.atomic_type().derives_from(*ty),
            (ItemType::Kind(test), Item::Node(node)) => test.matches(node),
            (ItemType::Map(None), Item::Map(_)) => true,
            (ItemType::Map(Some((key, value))), Item::Map(map)) => {
                map.entries().all(|(k, v)| k.atomic_type().derives_from(*key) && value.matches(v))
            }
            (ItemType::Array(None), Item::Array(_)) => true,
            (ItemType::Array(Some(member)), Item::Array(array)) => array.members().iter().all(|m| member.matches(m)),
            _ => false,
        }
    }
}

impl fmt::Display for ItemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemType::AnyItem => f.write_str("item()"),
            ItemType::Atomic(ty) => write!(f, "{ty}"),
            ItemType::Kind(test) => write!(f, "{test}"),
            ItemType::Map(None) => f.write_str("map(*)"),
            ItemType::Map(Some((k, v))) => write!(f, "map({k}, {v})"),
            ItemType::Array(None) => f.write_str("array(*)"),
            ItemType::Array(Some(m)) => write!(f, "array({m})"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequenceType {
    pub item: ItemType,
    pub occurrence: Occurrence,
}

impl SequenceType {
    pub fn new(item: ItemType, occurrence: Occurrence) -> Self {
        Self { item, occurrence }
    }

    /// `empty-sequence()`
    pub fn empty() -> Self {
        Self { item: ItemType::AnyItem, occurrence: Occurrence::Empty }
    }

    pub fn matches<N: NodeItem>(&self, sequence: &Sequence<N>) -> bool {
        self.occurrence.allows(sequence.len()) && sequence.iter().all(|item| self.item.matches(item))
    }
}

impl fmt::Display for SequenceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.occurrence == Occurrence::Empty {
            return f.write_str("empty-sequence()");
        }
        write!(f, "{}{}", self.item, self.occurrence.indicator())
    }
}
