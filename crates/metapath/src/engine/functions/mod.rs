//! Built-in function library.
//!
//! Signatures and implementations are registered from one table so the
//! compile-time arity check and the runtime registry cannot drift apart.
use std::sync::Arc;

use crate::consts::{NS_METAPATH_FUNCTIONS, NS_METAPATH_FUNCTIONS_ARRAY, NS_METAPATH_FUNCTIONS_MAP};
use crate::engine::runtime::{FunctionRegistry, FunctionSignatures};
use crate::model::NodeItem;
use crate::model::simple::SimpleNode;
use crate::names::NameCache;

pub mod boolean;
mod common;
pub mod maps;
pub mod nodes;
pub mod numeric;
pub mod sequences;
pub mod strings;

fn register_default_functions<N: NodeItem>(
    names: &NameCache,
    reg: Option<&mut FunctionRegistry<N>>,
    sigs: Option<&mut FunctionSignatures>,
) {
    let mut reg = reg;
    let mut sigs = sigs;
    macro_rules! reg_ns_range {
        ($ns:expr, $local:expr, $min:expr, $max:expr, $func:expr $(,)?) => {{
            let name = names.intern($ns, $local);
            if let Some(s) = sigs.as_mut() {
                s.declare(name.clone(), $min, $max);
            }
            if let Some(r) = reg.as_mut() {
                r.register_range(name, $min, $max, Arc::new($func));
            }
        }};
    }
    macro_rules! reg_fn {
        ($local:expr, $arity:expr, $func:expr $(,)?) => {
            reg_ns_range!(NS_METAPATH_FUNCTIONS, $local, $arity, Some($arity), $func)
        };
        ($local:expr, $min:expr, $max:expr, $func:expr $(,)?) => {
            reg_ns_range!(NS_METAPATH_FUNCTIONS, $local, $min, $max, $func)
        };
    }

    // ===== Booleans =====
    reg_fn!("true", 0, boolean::fn_true::<N>);
    reg_fn!("false", 0, boolean::fn_false::<N>);
    reg_fn!("not", 1, boolean::fn_not::<N>);
    reg_fn!("boolean", 1, boolean::fn_boolean::<N>);

    // ===== Sequences =====
    reg_fn!("count", 1, sequences::count_fn::<N>);
    reg_fn!("empty", 1, sequences::empty_fn::<N>);
    reg_fn!("exists", 1, sequences::exists_fn::<N>);
    reg_fn!("head", 1, sequences::head_fn::<N>);
    reg_fn!("tail", 1, sequences::tail_fn::<N>);
    reg_fn!("data", 0, Some(1), sequences::data_fn::<N>);
    reg_fn!("distinct-values", 1, sequences::distinct_values_fn::<N>);
    reg_fn!("exactly-one", 1, sequences::exactly_one_fn::<N>);
    reg_fn!("zero-or-one", 1, sequences::zero_or_one_fn::<N>);
    reg_fn!("one-or-more", 1, sequences::one_or_more_fn::<N>);

    // ===== Strings =====
    reg_fn!("string", 0, Some(1), strings::string_fn::<N>);
    reg_fn!("string-length", 0, Some(1), strings::string_length_fn::<N>);
    reg_fn!("concat", 2, None, strings::concat_fn::<N>);
    reg_fn!("string-join", 1, Some(2), strings::string_join_fn::<N>);
    reg_fn!("starts-with", 2, strings::starts_with_fn::<N>);
    reg_fn!("ends-with", 2, strings::ends_with_fn::<N>);
    reg_fn!("contains", 2, strings::contains_fn::<N>);
    reg_fn!("upper-case", 1, strings::upper_case_fn::<N>);
    reg_fn!("lower-case", 1, strings::lower_case_fn::<N>);
    reg_fn!("normalize-space", 0, Some(1), strings::normalize_space_fn::<N>);
    reg_fn!("matches", 2, Some(3), strings::matches_fn::<N>);

    // ===== Numeric =====
    reg_fn!("abs", 1, numeric::abs_fn::<N>);
    reg_fn!("ceiling", 1, numeric::ceiling_fn::<N>);
    reg_fn!("floor", 1, numeric::floor_fn::<N>);
    reg_fn!("round", 1, numeric::round_fn::<N>);
    reg_fn!("sum", 1, Some(2), numeric::sum_fn::<N>);

    // ===== Focus and nodes =====
    reg_fn!("position", 0, nodes::position_fn::<N>);
    reg_fn!("last", 0, nodes::last_fn::<N>);
    reg_fn!("local-name", 0, Some(1), nodes::local_name_fn::<N>);
    reg_fn!("root", 0, Some(1), nodes::root_fn::<N>);
    reg_fn!("doc", 1, nodes::doc_fn::<N>);

    // ===== Maps and arrays =====
    reg_ns_range!(NS_METAPATH_FUNCTIONS_MAP, "size", 1, Some(1), maps::map_size_fn::<N>);
    reg_ns_range!(NS_METAPATH_FUNCTIONS_MAP, "keys", 1, Some(1), maps::map_keys_fn::<N>);
    reg_ns_range!(NS_METAPATH_FUNCTIONS_MAP, "get", 2, Some(2), maps::map_get_fn::<N>);
    reg_ns_range!(NS_METAPATH_FUNCTIONS_MAP, "contains", 2, Some(2), maps::map_contains_fn::<N>);
    reg_ns_range!(NS_METAPATH_FUNCTIONS_ARRAY, "size", 1, Some(1), maps::array_size_fn::<N>);
    reg_ns_range!(NS_METAPATH_FUNCTIONS_ARRAY, "get", 2, Some(2), maps::array_get_fn::<N>);
}

/// Implementations of the built-in functions, names interned into `names`.
pub fn default_function_registry<N: NodeItem>(names: &NameCache) -> FunctionRegistry<N> {
    let mut reg = FunctionRegistry::new();
    register_default_functions(names, Some(&mut reg), None);
    reg
}

/// Name and arity table matching [`default_function_registry`].
pub fn builtin_signatures(names: &NameCache) -> FunctionSignatures {
    let mut sigs = FunctionSignatures::default();
    register_default_functions::<SimpleNode>(names, None, Some(&mut sigs));
    sigs
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn every_signature_has_an_implementation() {
        let names = NameCache::new();
        let sigs = builtin_signatures(&names);
        let reg = default_function_registry::<SimpleNode>(&names);
        assert_eq!(sigs.len(), reg.len());
        for name in sigs.names() {
            assert!(reg.contains(name), "{name} has no implementation");
        }
    }

    #[rstest]
    #[case(NS_METAPATH_FUNCTIONS, "concat", 7)]
    #[case(NS_METAPATH_FUNCTIONS, "data", 0)]
    #[case(NS_METAPATH_FUNCTIONS_MAP, "get", 2)]
    #[case(NS_METAPATH_FUNCTIONS_ARRAY, "size", 1)]
    fn arities_resolve(#[case] ns: &str, #[case] local: &str, #[case] arity: usize) {
        let names = NameCache::new();
        let reg = default_function_registry::<SimpleNode>(&names);
        assert!(reg.resolve(&names.intern(ns, local), arity).is_ok());
    }

    #[rstest]
    fn wrong_arity_is_rejected() {
        let names = NameCache::new();
        let sigs = builtin_signatures(&names);
        assert!(sigs.check(&names.intern(NS_METAPATH_FUNCTIONS, "concat"), 1).is_err());
        assert!(sigs.check(&names.intern(NS_METAPATH_FUNCTIONS, "not"), 2).is_err());
    }
}
