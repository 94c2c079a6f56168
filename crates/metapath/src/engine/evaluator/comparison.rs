use core::cmp::Ordering;

use chrono::{FixedOffset, NaiveDateTime};

use crate::compiler::cst::ComparisonOp;
use crate::engine::error::{Error, Result};
use crate::model::NodeItem;
use crate::types::AtomicType;
use crate::types::temporal::to_utc;
use crate::xdm::{AtomicValue, Sequence};

enum Relation {
    Ordered(Ordering),
    /// Equality only; these types have no order.
    Unordered(bool),
}

fn date_time_parts(value: &AtomicValue) -> Option<(NaiveDateTime, Option<FixedOffset>)> {
    match value {
        AtomicValue::DateTime { value, tz } => Some((*value, *tz)),
        AtomicValue::DateTimeWithTimezone { value, tz } => Some((*value, Some(*tz))),
        _ => None,
    }
}

fn date_parts(value: &AtomicValue) -> Option<(NaiveDateTime, Option<FixedOffset>)> {
    match value {
        AtomicValue::Date { date, tz } => Some((date.and_time(chrono::NaiveTime::MIN), *tz)),
        AtomicValue::DateWithTimezone { date, tz } => Some((date.and_time(chrono::NaiveTime::MIN), Some(*tz))),
        _ => None,
    }
}

fn relate(a: &AtomicValue, b: &AtomicValue, implicit: FixedOffset) -> Result<Relation> {
    use AtomicValue as V;
    if let (Some(x), Some(y)) = (a.as_string_or_uri(), b.as_string_or_uri()) {
        return Ok(Relation::Ordered(x.cmp(y)));
    }
    if let (Some(x), Some(y)) = (a.as_decimal(), b.as_decimal()) {
        return Ok(Relation::Ordered(x.cmp(&y)));
    }
    let instants = date_time_parts(a)
        .zip(date_time_parts(b))
        .or_else(|| date_parts(a).zip(date_parts(b)));
    if let Some(((x, tx), (y, ty))) = instants {
        return Ok(Relation::Ordered(to_utc(x, tx, implicit).cmp(&to_utc(y, ty, implicit))));
    }
    match (a, b) {
        (V::Boolean(x), V::Boolean(y)) => Ok(Relation::Ordered(x.cmp(y))),
        (V::DayTimeDuration(x), V::DayTimeDuration(y)) => Ok(Relation::Ordered(x.cmp(y))),
        (V::YearMonthDuration(x), V::YearMonthDuration(y)) => Ok(Relation::Ordered(x.cmp(y))),
        (V::IpV4Address(x), V::IpV4Address(y)) => Ok(Relation::Ordered(x.cmp(y))),
        (V::IpV6Address(x), V::IpV6Address(y)) => Ok(Relation::Ordered(x.cmp(y))),
        (V::Uuid(x), V::Uuid(y)) => Ok(Relation::Unordered(x == y)),
        (V::Base64(x), V::Base64(y)) => Ok(Relation::Unordered(x == y)),
        _ => Err(incomparable(a, b)),
    }
}

fn incomparable(a: &AtomicValue, b: &AtomicValue) -> Error {
    Error::type_error(format!("cannot compare {} with {}", a.atomic_type(), b.atomic_type()))
}

/// Compare two atomic values. Numeric types promote to decimal and string
/// types (untyped atomic included) compare by code point. Dates and
/// date-times without a timezone take `implicit`.
pub fn compare_atomic(op: ComparisonOp, a: &AtomicValue, b: &AtomicValue, implicit: FixedOffset) -> Result<bool> {
    match relate(a, b, implicit)? {
        Relation::Ordered(ord) => Ok(match op {
            ComparisonOp::Eq => ord == Ordering::Equal,
            ComparisonOp::Ne => ord != Ordering::Equal,
            ComparisonOp::Lt => ord == Ordering::Less,
            ComparisonOp::Le => ord != Ordering::Greater,
            ComparisonOp::Gt => ord == Ordering::Greater,
            ComparisonOp::Ge => ord != Ordering::Less,
        }),
        Relation::Unordered(equal) => match op {
            ComparisonOp::Eq => Ok(equal),
            ComparisonOp::Ne => Ok(!equal),
            _ => Err(incomparable(a, b)),
        },
    }
}

/// `eq`, `ne`, ... : one value per side, empty when either side is empty.
pub fn value_compare<N: NodeItem>(
    op: ComparisonOp,
    left: &Sequence<N>,
    right: &Sequence<N>,
    implicit: FixedOffset,
) -> Result<Sequence<N>> {
    let (Some(a), Some(b)) = (left.atomize_singleton()?, right.atomize_singleton()?) else {
        return Ok(Sequence::empty());
    };
    compare_atomic(op, &a, &b, implicit).map(Sequence::from_bool)
}

/// Untyped operands of a general comparison take the type of the other side:
/// decimal against numbers, string against strings.
fn promote_untyped(value: &AtomicValue, other: &AtomicValue) -> Result<AtomicValue> {
    if !matches!(value, AtomicValue::UntypedAtomic(_)) || other.as_string_or_uri().is_some() {
        return Ok(value.clone());
    }
    let target = if other.is_numeric() { AtomicType::Decimal } else { other.atomic_type() };
    Ok(target.cast(value)?)
}

/// `=`, `!=`, ... : true when some pair of atomized values satisfies the
/// operator, false when either side is empty.
pub fn general_compare<N: NodeItem>(
    op: ComparisonOp,
    left: &Sequence<N>,
    right: &Sequence<N>,
    implicit: FixedOffset,
) -> Result<bool> {
    let lhs = left.atomize()?;
    let rhs = right.atomize()?;
    for a in &lhs {
        for b in &rhs {
            let (pa, pb) = (promote_untyped(a, b)?, promote_untyped(b, a)?);
            if compare_atomic(op, &pa, &pb, implicit)? {
                return Ok(true);
            }
        }
    }
    Ok(false)
}
