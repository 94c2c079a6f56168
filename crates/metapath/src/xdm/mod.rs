//! Item and sequence model.
//!
//! A [`Sequence`] is an ordered, possibly empty list of [`Item`]s. Sequences
//! never nest: building one from other sequences flattens them.
use std::sync::Arc;

use indexmap::IndexMap;
use rust_decimal::Decimal;

use crate::engine::error::{Error, ErrorCode, Result};
use crate::model::NodeItem;

mod atomic;

pub use atomic::AtomicValue;

#[derive(Debug, Clone, PartialEq)]
pub enum Item<N> {
    Node(N),
    Atomic(AtomicValue),
    Map(MapItem<N>),
    Array(ArrayItem<N>),
}

impl<N> Item<N> {
    pub fn as_atomic(&self) -> Option<&AtomicValue> {
        match self {
            Item::Atomic(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_node(&self) -> Option<&N> {
        match self {
            Item::Node(n) => Some(n),
            _ => None,
        }
    }

    pub fn is_node(&self) -> bool {
        matches!(self, Item::Node(_))
    }
}

impl<N: NodeItem> Item<N> {
    /// Append the atomized value(s) of this item to `out`.
    pub fn atomize_into(&self, out: &mut Vec<AtomicValue>) -> Result<()> {
        match self {
            Item::Atomic(a) => out.push(a.clone()),
            Item::Node(n) => match n.typed_value() {
                Some(v) => out.push(v),
                None => {
                    return Err(Error::from_code(
                        ErrorCode::FOTY0012,
                        format!("{:?} node has no typed value", n.kind()),
                    ));
                }
            },
            Item::Array(a) => {
                for member in a.members() {
                    for item in member {
                        item.atomize_into(out)?;
                    }
                }
            }
            Item::Map(_) => {
                return Err(Error::from_code(ErrorCode::FOTY0013, "a map cannot be atomized"));
            }
        }
        Ok(())
    }

    /// String value: canonical lexical form for atomics, string value for nodes.
    pub fn string_value(&self) -> Result<String> {
        match self {
            Item::Atomic(a) => Ok(a.to_string()),
            Item::Node(n) => Ok(n.string_value()),
            Item::Map(_) | Item::Array(_) => {
                Err(Error::from_code(ErrorCode::FOTY0013, "a function item has no string value"))
            }
        }
    }
}

impl<N> From<AtomicValue> for Item<N> {
    fn from(a: AtomicValue) -> Self {
        Item::Atomic(a)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Sequence<N>(Vec<Item<N>>);

impl<N> Default for Sequence<N> {
    fn default() -> Self {
        Self(Vec::new())
    }
}

impl<N> Sequence<N> {
    pub fn empty() -> Self {
        Self(Vec::new())
    }

    pub fn singleton(item: impl Into<Item<N>>) -> Self {
        Self(vec![item.into()])
    }

    pub fn from_bool(b: bool) -> Self {
        Self::singleton(AtomicValue::Boolean(b))
    }

    /// Concatenate sequences; nesting is not preserved.
    pub fn flatten(parts: impl IntoIterator<Item = Sequence<N>>) -> Self {
        let mut out = Vec::new();
        for part in parts {
            out.extend(part.0);
        }
        Self(out)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn items(&self) -> &[Item<N>] {
        &self.0
    }

    pub fn into_items(self) -> Vec<Item<N>> {
        self.0
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Item<N>> {
        self.0.iter()
    }

    pub fn first(&self) -> Option<&Item<N>> {
        self.0.first()
    }

    pub fn push(&mut self, item: Item<N>) {
        self.0.push(item);
    }

    /// The single item, `None` when empty, a type error when longer.
    pub fn singleton_item(&self) -> Result<Option<&Item<N>>> {
        match self.0.as_slice() {
            [] => Ok(None),
            [one] => Ok(Some(one)),
            more => Err(Error::type_error(format!("expected at most one item, got {}", more.len()))),
        }
    }

    pub fn into_singleton(self) -> Result<Option<Item<N>>> {
        if self.0.len() > 1 {
            return Err(Error::type_error(format!("expected at most one item, got {}", self.0.len())));
        }
        Ok(self.0.into_iter().next())
    }
}

impl<N: NodeItem> Sequence<N> {
    pub fn atomize(&self) -> Result<Vec<AtomicValue>> {
        let mut out = Vec::with_capacity(self.0.len());
        for item in &self.0 {
            item.atomize_into(&mut out)?;
        }
        Ok(out)
    }

    /// Atomize and require at most one value.
    pub fn atomize_singleton(&self) -> Result<Option<AtomicValue>> {
        let mut values = self.atomize()?;
        match values.len() {
            0 => Ok(None),
            1 => Ok(values.pop()),
            n => Err(Error::type_error(format!("expected at most one atomic value, got {n}"))),
        }
    }

    pub fn nodes(&self) -> impl Iterator<Item = &N> {
        self.0.iter().filter_map(Item::as_node)
    }
}

impl<N> From<Vec<Item<N>>> for Sequence<N> {
    fn from(items: Vec<Item<N>>) -> Self {
        Self(items)
    }
}

impl<N> From<Item<N>> for Sequence<N> {
    fn from(item: Item<N>) -> Self {
        Self(vec![item])
    }
}

impl<N> From<AtomicValue> for Sequence<N> {
    fn from(a: AtomicValue) -> Self {
        Self::singleton(a)
    }
}

impl<N> FromIterator<Item<N>> for Sequence<N> {
    fn from_iter<T: IntoIterator<Item = Item<N>>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<N> IntoIterator for Sequence<N> {
    type Item = Item<N>;
    type IntoIter = std::vec::IntoIter<Item<N>>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a, N> IntoIterator for &'a Sequence<N> {
    type Item = &'a Item<N>;
    type IntoIter = std::slice::Iter<'a, Item<N>>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Key identity for map entries: numeric keys compare by value, string-like
/// keys by lexical form.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MapKey {
    String(String),
    Numeric(Decimal),
    Other(AtomicValue),
}

impl From<&AtomicValue> for MapKey {
    fn from(value: &AtomicValue) -> Self {
        if let Some(d) = value.as_decimal() {
            return MapKey::Numeric(d.normalize());
        }
        if let Some(s) = value.as_string_or_uri() {
            return MapKey::String(s.to_string());
        }
        MapKey::Other(value.clone())
    }
}

/// Immutable map item; updates return a new map.
#[derive(Debug, Clone, PartialEq)]
pub struct MapItem<N> {
    entries: Arc<IndexMap<MapKey, (AtomicValue, Sequence<N>)>>,
}

impl<N> Default for MapItem<N> {
    fn default() -> Self {
        Self { entries: Arc::new(IndexMap::new()) }
    }
}

impl<N: Clone> MapItem<N> {
    /// Build from entries; a later duplicate key replaces the earlier value.
    pub fn from_entries(entries: impl IntoIterator<Item = (AtomicValue, Sequence<N>)>) -> Self {
        let mut map = IndexMap::new();
        for (key, value) in entries {
            map.insert(MapKey::from(&key), (key, value));
        }
        Self { entries: Arc::new(map) }
    }

    pub fn put(&self, key: AtomicValue, value: Sequence<N>) -> Self {
        let mut map = (*self.entries).clone();
        map.insert(MapKey::from(&key), (key, value));
        Self { entries: Arc::new(map) }
    }

    pub fn get(&self, key: &AtomicValue) -> Option<&Sequence<N>> {
        self.entries.get(&MapKey::from(key)).map(|(_, v)| v)
    }

    pub fn contains(&self, key: &AtomicValue) -> bool {
        self.entries.contains_key(&MapKey::from(key))
    }

    pub fn keys(&self) -> impl Iterator<Item = &AtomicValue> {
        self.entries.values().map(|(k, _)| k)
    }

    pub fn entries(&self) -> impl Iterator<Item = (&AtomicValue, &Sequence<N>)> {
        self.entries.values().map(|(k, v)| (k, v))
    }

    pub fn size(&self) -> usize {
        self.entries.len()
    }
}

/// Immutable array item with 1-based member access.
#[derive(Debug, Clone, PartialEq)]
pub struct ArrayItem<N> {
    members: Arc<Vec<Sequence<N>>>,
}

impl<N> Default for ArrayItem<N> {
    fn default() -> Self {
        Self { members: Arc::new(Vec::new()) }
    }
}

impl<N> ArrayItem<N> {
    pub fn new(members: Vec<Sequence<N>>) -> Self {
        Self { members: Arc::new(members) }
    }

    pub fn members(&self) -> &[Sequence<N>] {
        &self.members
    }

    pub fn size(&self) -> usize {
        self.members.len()
    }

    pub fn get(&self, position: usize) -> Option<&Sequence<N>> {
        position.checked_sub(1).and_then(|i| self.members.get(i))
    }
}
