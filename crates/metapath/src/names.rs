//! Interning tables for namespaces and qualified names.
//!
//! A [`NameCache`] assigns every namespace URI and every `(namespace, local)`
//! pair a small index at first use. Indices are handed out in increasing
//! order and never reused, so a [`QName`] handle can be compared and hashed
//! by index alone.
//!
//! ```
//! use metapath::names::NameCache;
//!
//! let cache = NameCache::new();
//! let a = cache.intern("http://x", "a");
//! assert_eq!(a, cache.intern("http://x", "a"));
//! assert_ne!(a.index(), cache.intern("http://x", "b").index());
//! assert_eq!(cache.qname_by_index(a.index()), Some(a));
//! ```
//!
//! Most callers use the process-wide instance returned by
//! [`NameCache::global`]; tests and embedders that want isolation construct
//! their own and hand it to the static context.
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use compact_str::CompactString;

static NEXT_CACHE_ID: AtomicUsize = AtomicUsize::new(0);
static GLOBAL_CACHE: OnceLock<Arc<NameCache>> = OnceLock::new();

/// Index of an interned namespace URI. Index 0 is always "no namespace".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NamespaceId(usize);

impl NamespaceId {
    pub const NONE: NamespaceId = NamespaceId(0);

    pub fn index(self) -> usize {
        self.0
    }
}

struct QNameRecord {
    cache_id: usize,
    index: usize,
    namespace: NamespaceId,
    namespace_uri: Arc<str>,
    local: CompactString,
}

/// Interned qualified name.
///
/// Equality and hashing use the cache identity plus the name's index, so two
/// handles from the same cache are equal iff they name the same
/// `(namespace, local)` pair. Handles from different caches never compare
/// equal; use [`QName::same_name`] to compare across caches.
#[derive(Clone)]
pub struct QName(Arc<QNameRecord>);

impl QName {
    pub fn index(&self) -> usize {
        self.0.index
    }

    pub fn namespace_id(&self) -> NamespaceId {
        self.0.namespace
    }

    /// Namespace URI, empty when the name is in no namespace.
    pub fn namespace_uri(&self) -> &str {
        &self.0.namespace_uri
    }

    pub fn has_namespace(&self) -> bool {
        self.0.namespace != NamespaceId::NONE
    }

    pub fn local_name(&self) -> &str {
        &self.0.local
    }

    /// Compare by namespace URI and local name, regardless of which cache
    /// produced either handle.
    pub fn same_name(&self, other: &QName) -> bool {
        if self.0.cache_id == other.0.cache_id {
            return self.0.index == other.0.index;
        }
        self.local_name() == other.local_name() && self.namespace_uri() == other.namespace_uri()
    }

    /// URI-qualified form `Q{ns}local`.
    pub fn eqname(&self) -> String {
        format!("Q{{{}}}{}", self.namespace_uri(), self.local_name())
    }
}

impl PartialEq for QName {
    fn eq(&self, other: &Self) -> bool {
        self.0.cache_id == other.0.cache_id && self.0.index == other.0.index
    }
}

impl Eq for QName {}

impl Hash for QName {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.cache_id.hash(state);
        self.0.index.hash(state);
    }
}

impl fmt::Display for QName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.has_namespace() {
            write!(f, "Q{{{}}}{}", self.namespace_uri(), self.local_name())
        } else {
            f.write_str(self.local_name())
        }
    }
}

impl fmt::Debug for QName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "QName({self} #{})", self.0.index)
    }
}

/// A name as written in query text, before namespace resolution.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LexicalName {
    /// `local`
    Local(String),
    /// `prefix:local`
    Prefixed { prefix: String, local: String },
    /// `Q{namespace}local`
    UriQualified { namespace: String, local: String },
}

impl LexicalName {
    pub fn local_name(&self) -> &str {
        match self {
            LexicalName::Local(local)
            | LexicalName::Prefixed { local, .. }
            | LexicalName::UriQualified { local, .. } => local,
        }
    }
}

impl fmt::Display for LexicalName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LexicalName::Local(local) => f.write_str(local),
            LexicalName::Prefixed { prefix, local } => write!(f, "{prefix}:{local}"),
            LexicalName::UriQualified { namespace, local } => write!(f, "Q{{{namespace}}}{local}"),
        }
    }
}

#[derive(Default)]
struct Tables {
    namespaces: Vec<Arc<str>>,
    namespace_ids: HashMap<Arc<str>, NamespaceId>,
    qnames: Vec<QName>,
    qname_ids: HashMap<(NamespaceId, CompactString), usize>,
}

/// Append-only namespace and qualified-name tables.
///
/// Interning takes the write lock only when a new entry is allocated;
/// repeated lookups of known names share the read lock.
pub struct NameCache {
    id: usize,
    tables: RwLock<Tables>,
}

impl Default for NameCache {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for NameCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tables = self.read();
        f.debug_struct("NameCache")
            .field("id", &self.id)
            .field("namespaces", &tables.namespaces.len())
            .field("qnames", &tables.qnames.len())
            .finish()
    }
}

impl NameCache {
    pub fn new() -> Self {
        let mut tables = Tables::default();
        let none: Arc<str> = Arc::from("");
        tables.namespaces.push(none.clone());
        tables.namespace_ids.insert(none, NamespaceId::NONE);
        Self { id: NEXT_CACHE_ID.fetch_add(1, Ordering::Relaxed), tables: RwLock::new(tables) }
    }

    /// The process-wide cache, created on first use.
    pub fn global() -> Arc<NameCache> {
        GLOBAL_CACHE.get_or_init(|| Arc::new(NameCache::new())).clone()
    }

    // Entries are only ever appended, so a poisoned lock still guards
    // consistent tables.
    fn read(&self) -> RwLockReadGuard<'_, Tables> {
        self.tables.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Tables> {
        self.tables.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn intern_namespace(&self, uri: &str) -> NamespaceId {
        if let Some(id) = self.read().namespace_ids.get(uri) {
            return *id;
        }
        let mut tables = self.write();
        Self::intern_namespace_locked(&mut tables, uri).0
    }

    fn intern_namespace_locked(tables: &mut Tables, uri: &str) -> (NamespaceId, Arc<str>) {
        if let Some(id) = tables.namespace_ids.get(uri) {
            return (*id, tables.namespaces[id.0].clone());
        }
        let id = NamespaceId(tables.namespaces.len());
        let shared: Arc<str> = Arc::from(uri);
        tables.namespaces.push(shared.clone());
        tables.namespace_ids.insert(shared.clone(), id);
        (id, shared)
    }

    pub fn namespace_id(&self, uri: &str) -> Option<NamespaceId> {
        self.read().namespace_ids.get(uri).copied()
    }

    pub fn namespace_by_index(&self, id: NamespaceId) -> Option<Arc<str>> {
        self.read().namespaces.get(id.0).cloned()
    }

    /// Intern `(namespace, local)`. An empty namespace means "no namespace".
    pub fn intern(&self, namespace: &str, local: &str) -> QName {
        if let Some(found) = self.lookup(namespace, local) {
            return found;
        }
        let mut tables = self.write();
        let (ns, ns_uri) = Self::intern_namespace_locked(&mut tables, namespace);
        let key = (ns, CompactString::new(local));
        if let Some(index) = tables.qname_ids.get(&key) {
            return tables.qnames[*index].clone();
        }
        let index = tables.qnames.len();
        let name = QName(Arc::new(QNameRecord {
            cache_id: self.id,
            index,
            namespace: ns,
            namespace_uri: ns_uri,
            local: key.1.clone(),
        }));
        tables.qnames.push(name.clone());
        tables.qname_ids.insert(key, index);
        name
    }

    /// Intern a name in no namespace.
    pub fn intern_local(&self, local: &str) -> QName {
        self.intern("", local)
    }

    /// Find an already interned name without allocating a new entry.
    pub fn lookup(&self, namespace: &str, local: &str) -> Option<QName> {
        let tables = self.read();
        let ns = *tables.namespace_ids.get(namespace)?;
        let index = *tables.qname_ids.get(&(ns, CompactString::new(local)))?;
        tables.qnames.get(index).cloned()
    }

    pub fn qname_by_index(&self, index: usize) -> Option<QName> {
        self.read().qnames.get(index).cloned()
    }

    pub fn namespace_count(&self) -> usize {
        self.read().namespaces.len()
    }

    pub fn qname_count(&self) -> usize {
        self.read().qnames.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::collections::HashSet;

    #[rstest]
    fn interning_is_idempotent() {
        let cache = NameCache::new();
        let a1 = cache.intern("http://x", "a");
        let a2 = cache.intern("http://x", "a");
        assert_eq!(a1, a2);
        assert_eq!(a1.index(), a2.index());
        assert!(Arc::ptr_eq(&a1.0, &a2.0));
    }

    #[rstest]
    fn distinct_names_get_distinct_indices() {
        let cache = NameCache::new();
        let a = cache.intern("http://x", "a");
        let b = cache.intern("http://x", "b");
        let other_ns = cache.intern("http://y", "a");
        assert_ne!(a.index(), b.index());
        assert_ne!(a, other_ns);
        assert_eq!(a.namespace_id(), b.namespace_id());
        assert!(b.index() > a.index());
    }

    #[rstest]
    fn reverse_lookup_by_index() {
        let cache = NameCache::new();
        let a = cache.intern("urn:one", "thing");
        assert_eq!(cache.qname_by_index(a.index()).as_ref(), Some(&a));
        assert_eq!(cache.namespace_by_index(a.namespace_id()).as_deref(), Some("urn:one"));
        assert!(cache.qname_by_index(999).is_none());
    }

    #[rstest]
    fn indices_are_table_positions() {
        let cache = NameCache::new();
        for i in 0..1000 {
            let name = cache.intern("urn:many", &format!("n{i}"));
            assert_eq!(name.index(), i);
            assert_eq!(cache.qname_count(), i + 1);
        }
        let ns = cache.intern_namespace("urn:second");
        assert_eq!(ns.index(), cache.namespace_count() - 1);
    }

    #[rstest]
    fn empty_namespace_is_index_zero() {
        let cache = NameCache::new();
        let local = cache.intern_local("title");
        assert_eq!(local.namespace_id(), NamespaceId::NONE);
        assert!(!local.has_namespace());
        assert_eq!(local.to_string(), "title");
        assert_eq!(cache.intern_namespace(""), NamespaceId::NONE);
    }

    #[rstest]
    fn caches_are_independent() {
        let first = NameCache::new();
        let second = NameCache::new();
        let a = first.intern("http://x", "a");
        let b = second.intern("http://x", "a");
        assert_ne!(a, b);
        assert!(a.same_name(&b));
        assert_eq!(second.lookup("http://x", "zzz"), None);
    }

    #[rstest]
    fn global_cache_is_shared() {
        let a = NameCache::global().intern("urn:global-test", "x");
        let b = NameCache::global().intern("urn:global-test", "x");
        assert_eq!(a, b);
    }

    #[rstest]
    fn concurrent_interning_hands_out_one_index_per_name() {
        let cache = NameCache::new();
        let results: Vec<Vec<usize>> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    scope.spawn(|| {
                        (0..200).map(|i| cache.intern("urn:t", &format!("n{i}")).index()).collect()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });
        for other in &results[1..] {
            assert_eq!(&results[0], other);
        }
        let unique: HashSet<usize> = results[0].iter().copied().collect();
        assert_eq!(unique.len(), 200);
        assert_eq!(cache.qname_count(), 200);
    }
}
