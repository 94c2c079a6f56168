//! Well-known namespaces and prefixes.

/// Namespace of the Metaschema data types (`meta:string`, `meta:integer`, ...).
pub const NS_METAPATH: &str = "http://csrc.nist.gov/ns/metaschema/metapath";
/// Core function library, the default function namespace.
pub const NS_METAPATH_FUNCTIONS: &str = "http://csrc.nist.gov/ns/metaschema/metapath-functions";
pub const NS_METAPATH_FUNCTIONS_MAP: &str = "http://csrc.nist.gov/ns/metaschema/metapath-functions/map";
pub const NS_METAPATH_FUNCTIONS_ARRAY: &str = "http://csrc.nist.gov/ns/metaschema/metapath-functions/array";

pub const PREFIX_METAPATH: &str = "meta";
pub const PREFIX_METAPATH_FUNCTIONS: &str = "mp";
pub const PREFIX_FUNCTIONS: &str = "fn";
pub const PREFIX_MAP: &str = "map";
pub const PREFIX_ARRAY: &str = "array";

/// Prefix bindings every static context starts with.
pub const WELL_KNOWN_NAMESPACES: &[(&str, &str)] = &[
    (PREFIX_METAPATH, NS_METAPATH),
    (PREFIX_METAPATH_FUNCTIONS, NS_METAPATH_FUNCTIONS),
    (PREFIX_FUNCTIONS, NS_METAPATH_FUNCTIONS),
    (PREFIX_MAP, NS_METAPATH_FUNCTIONS_MAP),
    (PREFIX_ARRAY, NS_METAPATH_FUNCTIONS_ARRAY),
];
