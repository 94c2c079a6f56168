//! `treat as`, `cast as` and `castable as`.
use crate::engine::error::{Error, ErrorCode, Result};
use crate::model::NodeItem;
use crate::types::{AtomicType, SequenceType};
use crate::xdm::{AtomicValue, Sequence};

pub(super) fn treat<N: NodeItem>(value: Sequence<N>, ty: &SequenceType) -> Result<Sequence<N>> {
    if ty.matches(&value) {
        Ok(value)
    } else {
        Err(Error::from_code(
            ErrorCode::TREAT_MISMATCH,
            format!("a sequence of {} items does not match {ty}", value.len()),
        ))
    }
}

/// Atomize to a single value and cast it. `Ok(None)` only when the operand
/// is empty and `allow_empty` is set.
fn cast_operand<N: NodeItem>(value: &Sequence<N>, target: AtomicType, allow_empty: bool) -> Result<Option<AtomicValue>> {
    match value.atomize_singleton()? {
        Some(atom) => Ok(Some(target.cast(&atom)?)),
        None if allow_empty => Ok(None),
        None => Err(Error::type_error(format!("an empty sequence cannot be cast to {target}"))),
    }
}

pub(super) fn cast<N: NodeItem>(value: &Sequence<N>, target: AtomicType, allow_empty: bool) -> Result<Sequence<N>> {
    Ok(cast_operand(value, target, allow_empty)?.map(Sequence::singleton).unwrap_or_default())
}

/// Error codes that mean the operand cannot be cast, as opposed to the
/// evaluation itself failing.
const NOT_CASTABLE: [ErrorCode; 4] = [ErrorCode::FORG0001, ErrorCode::INVALID_TYPE, ErrorCode::FOTY0012, ErrorCode::FOTY0013];

/// `false` when the cast would raise one of [`NOT_CASTABLE`]: an invalid
/// value, a wrong cardinality, or an operand without a typed value. Any other
/// error propagates.
pub(super) fn castable<N: NodeItem>(value: &Sequence<N>, target: AtomicType, allow_empty: bool) -> Result<bool> {
    match cast_operand(value, target, allow_empty) {
        Ok(_) => Ok(true),
        Err(e) if NOT_CASTABLE.contains(&e.code()) => Ok(false),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::simple::{SimpleNode, assembly, document};
    use crate::types::{ItemType, Occurrence};
    use crate::xdm::Item;
    use rstest::rstest;

    fn one(value: AtomicValue) -> Sequence<SimpleNode> {
        Sequence::singleton(value)
    }

    #[rstest]
    fn cast_parses_untyped_values() {
        let result = cast(&one(AtomicValue::untyped("12")), AtomicType::Integer, false).unwrap();
        assert_eq!(result, one(AtomicValue::Integer(12)));
    }

    #[rstest]
    fn cast_of_empty_depends_on_marker() {
        assert!(cast::<SimpleNode>(&Sequence::empty(), AtomicType::Integer, true).unwrap().is_empty());
        let err = cast::<SimpleNode>(&Sequence::empty(), AtomicType::Integer, false).unwrap_err();
        assert_eq!(err.code(), ErrorCode::INVALID_TYPE);
    }

    #[rstest]
    fn invalid_lexical_form_is_forg0001() {
        let err = cast(&one(AtomicValue::string("abc")), AtomicType::Integer, false).unwrap_err();
        assert_eq!(err.code(), ErrorCode::FORG0001);
    }

    #[rstest]
    #[case(one(AtomicValue::string("1")), true)]
    #[case(one(AtomicValue::string("x")), false)]
    #[case(vec![Item::Atomic(1.into()), Item::Atomic(2.into())].into(), false)]
    #[case(Sequence::empty(), false)]
    fn castable_never_raises(#[case] value: Sequence<SimpleNode>, #[case] expected: bool) {
        assert_eq!(castable(&value, AtomicType::Integer, false).unwrap(), expected);
    }

    #[rstest]
    fn castable_is_false_for_untypeable_nodes() {
        let doc = document().child(assembly("a")).build();
        let value: Sequence<SimpleNode> = Sequence::singleton(Item::Node(doc.children()[0].clone()));
        assert!(!castable(&value, AtomicType::String, false).unwrap());
    }

    #[rstest]
    fn castable_is_false_for_maps() {
        let map = crate::xdm::MapItem::<SimpleNode>::default();
        let value: Sequence<SimpleNode> = Sequence::singleton(Item::Map(map));
        assert!(!castable(&value, AtomicType::String, false).unwrap());
    }

    #[rstest]
    fn treat_checks_the_sequence_type() {
        let ty = SequenceType::new(ItemType::Atomic(AtomicType::Integer), Occurrence::One);
        assert!(treat(one(AtomicValue::Integer(3)), &ty).is_ok());
        let err = treat(one(AtomicValue::string("3")), &ty).unwrap_err();
        assert_eq!(err.code(), ErrorCode::TREAT_MISMATCH);
    }
}
