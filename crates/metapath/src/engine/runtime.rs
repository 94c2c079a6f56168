use core::fmt;
use std::borrow::Cow;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, PoisonError, RwLock};

use bitflags::bitflags;
use chrono::{FixedOffset, Offset};
use tracing::{debug, trace};
use url::Url;

use crate::consts::{NS_METAPATH, NS_METAPATH_FUNCTIONS, WELL_KNOWN_NAMESPACES};
use crate::engine::error::{Error, ErrorCode, Result};
use crate::model::NodeItem;
use crate::names::{LexicalName, NameCache, QName};
use crate::types::{AtomicType, AtomicTypeRegistry};
use crate::xdm::{Item, Sequence};

pub type Arity = usize;

/// Which default namespace applies to an unprefixed name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameKind {
    Function,
    /// Assembly, field and flag names.
    Model,
    Variable,
    Type,
}

/// Error type returned by function resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    Unknown(QName),
    /// The name exists but no overload accepts the arity.
    WrongArity { name: QName, available: Vec<(Arity, Option<Arity>)> },
}

impl fmt::Display for ResolveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolveError::Unknown(name) => write!(f, "unknown function {name}"),
            ResolveError::WrongArity { name, available } => {
                let arities: Vec<String> = available
                    .iter()
                    .map(|(min, max)| match max {
                        Some(max) if max == min => min.to_string(),
                        Some(max) => format!("{min}-{max}"),
                        None => format!("{min}+"),
                    })
                    .collect();
                write!(f, "function {name} accepts {} argument(s)", arities.join(" or "))
            }
        }
    }
}

impl ResolveError {
    pub fn into_error(self, arity: Arity) -> Error {
        Error::from_code(ErrorCode::NO_FUNCTION_MATCH, format!("{self}, called with {arity}"))
    }
}

fn arity_matches(min: Arity, max: Option<Arity>, arity: Arity) -> bool {
    arity >= min && max.is_none_or(|m| arity <= m)
}

/// Higher minimum first, then the smaller bound, so the most specific
/// overload is found first.
fn overload_order(a: (Arity, Option<Arity>), b: (Arity, Option<Arity>)) -> core::cmp::Ordering {
    use core::cmp::Ordering;
    b.0.cmp(&a.0).then_with(|| match (a.1, b.1) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    })
}

/// Function names and arities known at compile time.
#[derive(Debug, Clone, Default)]
pub struct FunctionSignatures {
    by_name: HashMap<QName, Vec<(Arity, Option<Arity>)>>,
}

impl FunctionSignatures {
    pub fn declare(&mut self, name: QName, min_arity: Arity, max_arity: Option<Arity>) {
        let ranges = self.by_name.entry(name).or_default();
        ranges.push((min_arity, max_arity));
        ranges.sort_by(|a, b| overload_order(*a, *b));
    }

    pub fn check(&self, name: &QName, arity: Arity) -> std::result::Result<(), ResolveError> {
        match self.by_name.get(name) {
            None => Err(ResolveError::Unknown(name.clone())),
            Some(ranges) if ranges.iter().any(|(min, max)| arity_matches(*min, *max, arity)) => Ok(()),
            Some(ranges) => Err(ResolveError::WrongArity { name: name.clone(), available: ranges.clone() }),
        }
    }

    pub fn names(&self) -> impl Iterator<Item = &QName> {
        self.by_name.keys()
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}

/// Compile-time configuration, built once with [`StaticContextBuilder`] and
/// shared read-only by every expression compiled against it.
#[derive(Debug, Clone)]
pub struct StaticContext {
    names: Arc<NameCache>,
    base_uri: Option<Url>,
    namespaces: HashMap<String, String>,
    default_function_namespace: String,
    default_model_namespace: Option<String>,
    default_variable_namespace: Option<String>,
    atomic_types: AtomicTypeRegistry,
    functions: FunctionSignatures,
    variables: HashSet<QName>,
}

impl Default for StaticContext {
    fn default() -> Self {
        StaticContextBuilder::new().build()
    }
}

impl StaticContext {
    pub fn builder() -> StaticContextBuilder {
        StaticContextBuilder::new()
    }

    pub fn names(&self) -> &Arc<NameCache> {
        &self.names
    }

    pub fn base_uri(&self) -> Option<&Url> {
        self.base_uri.as_ref()
    }

    pub fn namespace_for_prefix(&self, prefix: &str) -> Option<&str> {
        self.namespaces.get(prefix).map(String::as_str)
    }

    pub fn default_function_namespace(&self) -> &str {
        &self.default_function_namespace
    }

    pub fn default_model_namespace(&self) -> Option<&str> {
        self.default_model_namespace.as_deref()
    }

    /// Resolve a lexical name. A prefix goes through the namespace table, a
    /// `Q{..}` namespace is taken verbatim and a bare name takes the default
    /// namespace for `kind` (none for model names unless configured).
    pub fn resolve_name(&self, name: &LexicalName, kind: NameKind) -> Result<QName> {
        match name {
            LexicalName::Prefixed { prefix, local } => {
                let ns = self.resolve_prefix(prefix)?;
                Ok(self.names.intern(ns, local))
            }
            LexicalName::UriQualified { namespace, local } => Ok(self.names.intern(namespace, local)),
            LexicalName::Local(local) => {
                let ns = match kind {
                    NameKind::Function => Some(self.default_function_namespace.as_str()),
                    NameKind::Model => self.default_model_namespace.as_deref(),
                    NameKind::Variable => self.default_variable_namespace.as_deref(),
                    NameKind::Type => Some(NS_METAPATH),
                };
                Ok(self.names.intern(ns.unwrap_or(""), local))
            }
        }
    }

    /// Namespace URI bound to `prefix`, MPST0081 otherwise.
    pub fn resolve_prefix(&self, prefix: &str) -> Result<&str> {
        self.namespace_for_prefix(prefix).ok_or_else(|| {
            Error::from_code(ErrorCode::PREFIX_NOT_EXPANDABLE, format!("namespace prefix '{prefix}' is not bound"))
        })
    }

    pub fn lookup_atomic_type(&self, name: &QName) -> Option<AtomicType> {
        self.atomic_types.lookup(name)
    }

    pub fn function_signatures(&self) -> &FunctionSignatures {
        &self.functions
    }

    /// Whether a variable is supplied from outside the expression.
    pub fn is_variable_declared(&self, name: &QName) -> bool {
        self.variables.contains(name)
    }
}

/// Builder for [`StaticContext`]. Starts from the well-known prefix
/// bindings, the built-in atomic types and the built-in function library.
pub struct StaticContextBuilder {
    names: Arc<NameCache>,
    base_uri: Option<Url>,
    namespaces: HashMap<String, String>,
    default_function_namespace: String,
    default_model_namespace: Option<String>,
    default_variable_namespace: Option<String>,
    atomic_types: Vec<(LexicalName, AtomicType)>,
    functions: Vec<(LexicalName, Arity, Option<Arity>)>,
    variables: Vec<LexicalName>,
    builtin_functions: bool,
}

impl Default for StaticContextBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl StaticContextBuilder {
    pub fn new() -> Self {
        Self {
            names: NameCache::global(),
            base_uri: None,
            namespaces: WELL_KNOWN_NAMESPACES.iter().map(|(p, u)| ((*p).to_string(), (*u).to_string())).collect(),
            default_function_namespace: NS_METAPATH_FUNCTIONS.to_string(),
            default_model_namespace: None,
            default_variable_namespace: None,
            atomic_types: Vec::new(),
            functions: Vec::new(),
            variables: Vec::new(),
            builtin_functions: true,
        }
    }

    /// Intern names into `cache` instead of the process-wide cache.
    pub fn with_name_cache(mut self, cache: Arc<NameCache>) -> Self {
        self.names = cache;
        self
    }

    pub fn with_base_uri(mut self, uri: Url) -> Self {
        self.base_uri = Some(uri);
        self
    }

    pub fn with_namespace(mut self, prefix: impl Into<String>, uri: impl Into<String>) -> Self {
        self.namespaces.insert(prefix.into(), uri.into());
        self
    }

    pub fn with_default_function_namespace(mut self, uri: impl Into<String>) -> Self {
        self.default_function_namespace = uri.into();
        self
    }

    pub fn with_default_model_namespace(mut self, uri: impl Into<String>) -> Self {
        self.default_model_namespace = Some(uri.into());
        self
    }

    pub fn with_default_variable_namespace(mut self, uri: impl Into<String>) -> Self {
        self.default_variable_namespace = Some(uri.into());
        self
    }

    /// Register an additional name for an atomic type. Unprefixed names land
    /// in the `meta` namespace.
    pub fn with_atomic_type(mut self, name: LexicalName, ty: AtomicType) -> Self {
        self.atomic_types.push((name, ty));
        self
    }

    /// Declare a function implemented outside the built-in library. The
    /// implementation goes into the [`FunctionRegistry`] of the dynamic
    /// context under the same name.
    pub fn with_function_signature(mut self, name: LexicalName, min_arity: Arity, max_arity: Option<Arity>) -> Self {
        self.functions.push((name, min_arity, max_arity));
        self
    }

    /// Declare a variable the dynamic context will supply.
    pub fn with_variable(mut self, name: LexicalName) -> Self {
        self.variables.push(name);
        self
    }

    pub fn without_builtin_functions(mut self) -> Self {
        self.builtin_functions = false;
        self
    }

    /// Finish the context; fails with MPST0081 when a registered name uses
    /// an unbound prefix.
    pub fn try_build(self) -> Result<StaticContext> {
        match self.finish() {
            (ctx, None) => Ok(ctx),
            (_, Some(err)) => Err(err),
        }
    }

    /// Like [`try_build`](Self::try_build) but skips registrations whose
    /// names do not resolve.
    pub fn build(self) -> StaticContext {
        let (ctx, _) = self.finish();
        ctx
    }

    fn finish(self) -> (StaticContext, Option<Error>) {
        let functions = if self.builtin_functions {
            crate::engine::functions::builtin_signatures(&self.names)
        } else {
            FunctionSignatures::default()
        };
        let mut ctx = StaticContext {
            atomic_types: AtomicTypeRegistry::builtin(&self.names),
            functions,
            names: self.names,
            base_uri: self.base_uri,
            namespaces: self.namespaces,
            default_function_namespace: self.default_function_namespace,
            default_model_namespace: self.default_model_namespace,
            default_variable_namespace: self.default_variable_namespace,
            variables: HashSet::new(),
        };
        let mut first_error = None;
        let mut resolve = |ctx: &StaticContext, name: &LexicalName, kind| match ctx.resolve_name(name, kind) {
            Ok(q) => Some(q),
            Err(e) => {
                first_error.get_or_insert(e);
                None
            }
        };
        for (name, ty) in &self.atomic_types {
            if let Some(q) = resolve(&ctx, name, NameKind::Type) {
                ctx.atomic_types.register(q, *ty);
            }
        }
        for (name, min, max) in &self.functions {
            if let Some(q) = resolve(&ctx, name, NameKind::Function) {
                ctx.functions.declare(q, *min, *max);
            }
        }
        for name in &self.variables {
            if let Some(q) = resolve(&ctx, name, NameKind::Variable) {
                ctx.variables.insert(q);
            }
        }
        (ctx, first_error)
    }
}

/// Inner focus of an evaluation: the context item with its 1-based position
/// and the size of the sequence it came from.
#[derive(Debug, Clone)]
pub struct Focus<N> {
    pub item: Item<N>,
    pub position: usize,
    pub size: usize,
}

impl<N> Focus<N> {
    pub fn new(item: Item<N>, position: usize, size: usize) -> Self {
        Self { item, position, size }
    }

    pub fn singleton(item: Item<N>) -> Self {
        Self::new(item, 1, 1)
    }
}

pub struct CallCtx<'a, N> {
    pub dyn_ctx: &'a DynamicContext<N>,
    pub static_ctx: &'a StaticContext,
    pub focus: Option<&'a Focus<N>>,
}

impl<N> CallCtx<'_, N> {
    /// The focus, MPDY0002 when absent.
    pub fn require_focus(&self) -> Result<&Focus<N>> {
        self.focus.ok_or_else(|| {
            Error::from_code(ErrorCode::CONTEXT_ABSENT, "function requires a context item but none is set")
        })
    }
}

pub type FunctionImpl<N> = Arc<dyn Fn(&CallCtx<N>, &[Sequence<N>]) -> Result<Sequence<N>> + Send + Sync>;

pub type FunctionOverload<N> = (Arity, Option<Arity>, FunctionImpl<N>);
pub type FunctionOverloads<N> = Vec<FunctionOverload<N>>;

/// Function implementations by name, each with one or more arity ranges.
pub struct FunctionRegistry<N> {
    fns: HashMap<QName, FunctionOverloads<N>>,
}

impl<N> Default for FunctionRegistry<N> {
    fn default() -> Self {
        Self { fns: HashMap::new() }
    }
}

impl<N> FunctionRegistry<N> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: QName, arity: Arity, func: FunctionImpl<N>) {
        self.register_range(name, arity, Some(arity), func);
    }

    pub fn register_fn<F>(&mut self, name: QName, arity: Arity, f: F)
    where
        F: 'static + Send + Sync + Fn(&CallCtx<N>, &[Sequence<N>]) -> Result<Sequence<N>>,
    {
        self.register(name, arity, Arc::new(f));
    }

    /// Register with an arity range; `None` as maximum makes it variadic.
    pub fn register_range(&mut self, name: QName, min_arity: Arity, max_arity: Option<Arity>, func: FunctionImpl<N>) {
        let overloads = self.fns.entry(name).or_default();
        overloads.push((min_arity, max_arity, func));
        overloads.sort_by(|a, b| overload_order((a.0, a.1), (b.0, b.1)));
    }

    pub fn register_variadic(&mut self, name: QName, min_arity: Arity, func: FunctionImpl<N>) {
        self.register_range(name, min_arity, None, func);
    }

    pub fn resolve(&self, name: &QName, arity: Arity) -> std::result::Result<&FunctionImpl<N>, ResolveError> {
        let Some(candidates) = self.fns.get(name) else {
            return Err(ResolveError::Unknown(name.clone()));
        };
        candidates.iter().find(|(min, max, _)| arity_matches(*min, *max, arity)).map(|(_, _, f)| f).ok_or_else(|| {
            ResolveError::WrongArity {
                name: name.clone(),
                available: candidates.iter().map(|(min, max, _)| (*min, *max)).collect(),
            }
        })
    }

    pub fn contains(&self, name: &QName) -> bool {
        self.fns.contains_key(name)
    }

    /// The same implementations, keyed by names interned in `names`.
    pub fn reinterned(&self, names: &NameCache) -> Self {
        let fns = self.fns.iter().map(|(name, overloads)| (reintern(names, name), overloads.clone())).collect();
        Self { fns }
    }

    pub fn len(&self) -> usize {
        self.fns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fns.is_empty()
    }
}

fn reintern(names: &NameCache, name: &QName) -> QName {
    names.intern(name.namespace_uri(), name.local_name())
}

/// Resolves `doc()` URIs to document nodes.
pub trait DocumentLoader<N>: Send + Sync {
    fn load(&self, uri: &Url) -> Result<N>;
}

impl<N, F> DocumentLoader<N> for F
where
    F: Fn(&Url) -> Result<N> + Send + Sync,
{
    fn load(&self, uri: &Url) -> Result<N> {
        self(uri)
    }
}

bitflags! {
    /// Optional evaluation behaviors.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Features: u32 {
        /// Apply predicates. When off, `E[P]` yields `E` unfiltered.
        const EVALUATE_PREDICATES = 1;
    }
}

impl Default for Features {
    fn default() -> Self {
        Features::EVALUATE_PREDICATES
    }
}

struct Binding<N> {
    name: QName,
    value: Sequence<N>,
    next: Option<Arc<Binding<N>>>,
}

/// Per-evaluation state. Cloning is cheap; [`bind_variable`] returns a
/// sub-context whose bindings are invisible to the parent.
///
/// [`bind_variable`]: DynamicContext::bind_variable
pub struct DynamicContext<N> {
    static_ctx: Arc<StaticContext>,
    variables: Arc<HashMap<QName, Sequence<N>>>,
    scope: Option<Arc<Binding<N>>>,
    functions: Arc<FunctionRegistry<N>>,
    document_loader: Option<Arc<dyn DocumentLoader<N>>>,
    documents: Arc<RwLock<HashMap<Url, N>>>,
    features: Features,
    implicit_timezone: FixedOffset,
}

impl<N> Clone for DynamicContext<N> {
    fn clone(&self) -> Self {
        Self {
            static_ctx: Arc::clone(&self.static_ctx),
            variables: Arc::clone(&self.variables),
            scope: self.scope.clone(),
            functions: Arc::clone(&self.functions),
            document_loader: self.document_loader.clone(),
            documents: Arc::clone(&self.documents),
            features: self.features,
            implicit_timezone: self.implicit_timezone,
        }
    }
}

impl<N: NodeItem> Default for DynamicContext<N> {
    fn default() -> Self {
        DynamicContextBuilder::default().build()
    }
}

impl<N: NodeItem> DynamicContext<N> {
    pub fn builder(static_ctx: Arc<StaticContext>) -> DynamicContextBuilder<N> {
        DynamicContextBuilder::new(static_ctx)
    }

    pub fn static_context(&self) -> &Arc<StaticContext> {
        &self.static_ctx
    }

    pub fn functions(&self) -> &FunctionRegistry<N> {
        &self.functions
    }

    pub fn features(&self) -> Features {
        self.features
    }

    pub fn implicit_timezone(&self) -> FixedOffset {
        self.implicit_timezone
    }

    /// A derived context sharing everything with this one. Bindings added to
    /// it never reach the parent.
    pub fn sub_context(&self) -> Self {
        self.clone()
    }

    /// Sub-context with `name` bound to `value`, shadowing any outer binding.
    pub fn bind_variable(&self, name: QName, value: Sequence<N>) -> Self {
        let mut sub = self.clone();
        sub.scope = Some(Arc::new(Binding { name, value, next: self.scope.clone() }));
        sub
    }

    /// Innermost binding first, then externally supplied values.
    pub fn variable(&self, name: &QName) -> Option<&Sequence<N>> {
        let mut current = self.scope.as_deref();
        while let Some(binding) = current {
            if binding.name == *name {
                return Some(&binding.value);
            }
            current = binding.next.as_deref();
        }
        self.variables.get(name)
    }

    /// This context as seen by an expression compiled against `static_ctx`.
    /// Variables and functions are re-keyed when `static_ctx` interns names
    /// into a different cache than this context's static context.
    pub fn for_static_context(&self, static_ctx: &Arc<StaticContext>) -> Cow<'_, Self> {
        if Arc::ptr_eq(&self.static_ctx, static_ctx) {
            return Cow::Borrowed(self);
        }
        let mut ctx = self.clone();
        ctx.static_ctx = Arc::clone(static_ctx);
        let names = static_ctx.names();
        if !Arc::ptr_eq(self.static_ctx.names(), names) {
            debug!(variables = self.variables.len(), functions = self.functions.len(), "re-keying dynamic context names");
            ctx.variables =
                Arc::new(self.variables.iter().map(|(name, value)| (reintern(names, name), value.clone())).collect());
            let mut bindings = Vec::new();
            let mut current = self.scope.as_deref();
            while let Some(binding) = current {
                bindings.push(binding);
                current = binding.next.as_deref();
            }
            ctx.scope = bindings.into_iter().rev().fold(None, |next, binding| {
                Some(Arc::new(Binding { name: reintern(names, &binding.name), value: binding.value.clone(), next }))
            });
            ctx.functions = Arc::new(self.functions.reinterned(names));
        }
        Cow::Owned(ctx)
    }

    /// Load a document through the configured loader. Each URI is loaded at
    /// most once per context and its clones.
    pub fn load_document(&self, uri: &Url) -> Result<N> {
        if let Some(doc) = self.documents.read().unwrap_or_else(PoisonError::into_inner).get(uri) {
            return Ok(doc.clone());
        }
        let loader = self.document_loader.as_ref().ok_or_else(|| {
            Error::from_code(ErrorCode::FODC0002, format!("no document loader is configured to load '{uri}'"))
        })?;
        trace!(%uri, "loading document");
        let doc = loader.load(uri).map_err(|e| {
            Error::from_code(ErrorCode::FODC0002, format!("unable to load document '{uri}'"))
                .with_source(Some(Arc::new(e) as Arc<dyn std::error::Error + Send + Sync>))
        })?;
        self.documents.write().unwrap_or_else(PoisonError::into_inner).insert(uri.clone(), doc.clone());
        Ok(doc)
    }
}

pub struct DynamicContextBuilder<N> {
    static_ctx: Arc<StaticContext>,
    variables: Vec<(LexicalName, Sequence<N>)>,
    functions: Option<Arc<FunctionRegistry<N>>>,
    document_loader: Option<Arc<dyn DocumentLoader<N>>>,
    features: Features,
    implicit_timezone: FixedOffset,
}

impl<N: NodeItem> Default for DynamicContextBuilder<N> {
    fn default() -> Self {
        Self::new(Arc::new(StaticContext::default()))
    }
}

impl<N: NodeItem> DynamicContextBuilder<N> {
    pub fn new(static_ctx: Arc<StaticContext>) -> Self {
        Self {
            static_ctx,
            variables: Vec::new(),
            functions: None,
            document_loader: None,
            features: Features::default(),
            implicit_timezone: chrono::Utc.fix(),
        }
    }

    /// Supply an external variable. Unprefixed names take the default
    /// variable namespace.
    pub fn with_variable(mut self, name: LexicalName, value: impl Into<Sequence<N>>) -> Self {
        self.variables.push((name, value.into()));
        self
    }

    /// Replace the built-in function library. Start from
    /// [`default_function_registry`](crate::engine::functions::default_function_registry)
    /// to extend it instead.
    pub fn with_functions(mut self, registry: Arc<FunctionRegistry<N>>) -> Self {
        self.functions = Some(registry);
        self
    }

    pub fn with_document_loader(mut self, loader: Arc<dyn DocumentLoader<N>>) -> Self {
        self.document_loader = Some(loader);
        self
    }

    pub fn with_features(mut self, features: Features) -> Self {
        self.features = features;
        self
    }

    pub fn with_implicit_timezone(mut self, offset: FixedOffset) -> Self {
        self.implicit_timezone = offset;
        self
    }

    /// Variables whose prefix does not resolve are skipped; use
    /// [`try_build`](Self::try_build) to surface them.
    pub fn build(self) -> DynamicContext<N> {
        let (ctx, _) = self.finish();
        ctx
    }

    pub fn try_build(self) -> Result<DynamicContext<N>> {
        match self.finish() {
            (ctx, None) => Ok(ctx),
            (_, Some(err)) => Err(err),
        }
    }

    fn finish(self) -> (DynamicContext<N>, Option<Error>) {
        let mut first_error = None;
        let mut variables = HashMap::with_capacity(self.variables.len());
        for (name, value) in self.variables {
            match self.static_ctx.resolve_name(&name, NameKind::Variable) {
                Ok(q) => {
                    variables.insert(q, value);
                }
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }
        let functions = match self.functions {
            Some(f) => f,
            None => Arc::new(crate::engine::functions::default_function_registry(self.static_ctx.names())),
        };
        let ctx = DynamicContext {
            static_ctx: self.static_ctx,
            variables: Arc::new(variables),
            scope: None,
            functions,
            document_loader: self.document_loader,
            documents: Arc::new(RwLock::new(HashMap::new())),
            features: self.features,
            implicit_timezone: self.implicit_timezone,
        };
        (ctx, first_error)
    }
}
