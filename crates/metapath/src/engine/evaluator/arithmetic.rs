//! Numeric, duration and date/time arithmetic.
//!
//! Integer operands stay integers except under `div`, which yields a decimal.
//! `idiv` truncates toward zero and `mod` takes the sign of the dividend.
use chrono::{FixedOffset, Months, NaiveDateTime, NaiveTime, TimeDelta};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;

use crate::compiler::cst::ArithmeticOp;
use crate::engine::error::{Error, ErrorCode, Result};
use crate::types::AtomicType;
use crate::types::temporal::to_utc;
use crate::xdm::AtomicValue;

fn overflow() -> Error {
    Error::from_code(ErrorCode::FOAR0002, "numeric overflow")
}

fn division_by_zero() -> Error {
    Error::from_code(ErrorCode::FOAR0001, "division by zero")
}

fn undefined(op: ArithmeticOp, a: &AtomicValue, b: &AtomicValue) -> Error {
    Error::type_error(format!(
        "operator '{}' is not defined for {} and {}",
        op.symbol(),
        a.atomic_type(),
        b.atomic_type()
    ))
}

/// Numeric value of an arithmetic operand; untyped values are cast.
pub(crate) fn numeric_operand(value: &AtomicValue) -> Result<AtomicValue> {
    match value {
        AtomicValue::UntypedAtomic(_) => Ok(AtomicType::Numeric.cast(value)?),
        v if v.is_numeric() => Ok(v.clone()),
        v => Err(Error::type_error(format!("expected a numeric value, got {}", v.atomic_type()))),
    }
}

pub fn negate(value: &AtomicValue) -> Result<AtomicValue> {
    match value {
        AtomicValue::DayTimeDuration(d) => Ok(AtomicValue::DayTimeDuration(-*d)),
        AtomicValue::YearMonthDuration(m) => m.checked_neg().map(AtomicValue::YearMonthDuration).ok_or_else(overflow),
        other => match numeric_operand(other)? {
            AtomicValue::Decimal(d) => Ok(AtomicValue::Decimal(-d)),
            n => {
                let i = n.as_integer().ok_or_else(overflow)?;
                i.checked_neg().map(AtomicValue::Integer).ok_or_else(overflow)
            }
        },
    }
}

pub fn arithmetic(op: ArithmeticOp, a: &AtomicValue, b: &AtomicValue, implicit: FixedOffset) -> Result<AtomicValue> {
    let promote = |v: &AtomicValue| match v {
        AtomicValue::UntypedAtomic(_) => numeric_operand(v),
        other => Ok(other.clone()),
    };
    let (a, b) = (promote(a)?, promote(b)?);
    if a.is_numeric() && b.is_numeric() {
        return match (a.as_integer(), b.as_integer()) {
            (Some(x), Some(y)) => integer_op(op, x, y),
            _ => decimal_op(op, a.as_decimal().ok_or_else(overflow)?, b.as_decimal().ok_or_else(overflow)?),
        };
    }
    temporal_op(op, &a, &b, implicit).unwrap_or_else(|| Err(undefined(op, &a, &b)))
}

fn integer_op(op: ArithmeticOp, x: i64, y: i64) -> Result<AtomicValue> {
    let checked = match op {
        ArithmeticOp::Add => x.checked_add(y),
        ArithmeticOp::Subtract => x.checked_sub(y),
        ArithmeticOp::Multiply => x.checked_mul(y),
        ArithmeticOp::Divide => return decimal_op(op, Decimal::from(x), Decimal::from(y)),
        ArithmeticOp::IntegerDivide | ArithmeticOp::Modulo if y == 0 => return Err(division_by_zero()),
        ArithmeticOp::IntegerDivide => x.checked_div(y),
        ArithmeticOp::Modulo => x.checked_rem(y),
    };
    checked.map(AtomicValue::Integer).ok_or_else(overflow)
}

fn decimal_op(op: ArithmeticOp, x: Decimal, y: Decimal) -> Result<AtomicValue> {
    if y.is_zero() && matches!(op, ArithmeticOp::Divide | ArithmeticOp::IntegerDivide | ArithmeticOp::Modulo) {
        return Err(division_by_zero());
    }
    let checked = match op {
        ArithmeticOp::Add => x.checked_add(y),
        ArithmeticOp::Subtract => x.checked_sub(y),
        ArithmeticOp::Multiply => x.checked_mul(y),
        ArithmeticOp::Divide => x.checked_div(y),
        ArithmeticOp::Modulo => x.checked_rem(y),
        ArithmeticOp::IntegerDivide => {
            let quotient = x.checked_div(y).ok_or_else(overflow)?;
            return quotient.trunc().to_i64().map(AtomicValue::Integer).ok_or_else(overflow);
        }
    };
    checked.map(AtomicValue::Decimal).ok_or_else(overflow)
}

fn delta_seconds(d: TimeDelta) -> Decimal {
    Decimal::from(d.num_seconds()) + Decimal::new(i64::from(d.subsec_nanos()), 9)
}

fn seconds_delta(seconds: Decimal) -> Option<TimeDelta> {
    let whole = seconds.trunc();
    let nanos = ((seconds - whole) * Decimal::from(1_000_000_000)).round().to_i64()?;
    TimeDelta::try_seconds(whole.to_i64()?)?.checked_add(&TimeDelta::nanoseconds(nanos))
}

/// Date or date-time value as a local date-time, its timezone and its type.
fn instant(value: &AtomicValue) -> Option<(NaiveDateTime, Option<FixedOffset>, AtomicType)> {
    match value {
        AtomicValue::Date { date, tz } => Some((date.and_time(NaiveTime::MIN), *tz, AtomicType::Date)),
        AtomicValue::DateWithTimezone { date, tz } => {
            Some((date.and_time(NaiveTime::MIN), Some(*tz), AtomicType::DateWithTimezone))
        }
        AtomicValue::DateTime { value, tz } => Some((*value, *tz, AtomicType::DateTime)),
        AtomicValue::DateTimeWithTimezone { value, tz } => Some((*value, Some(*tz), AtomicType::DateTimeWithTimezone)),
        _ => None,
    }
}

fn rebuild(ty: AtomicType, value: NaiveDateTime, tz: Option<FixedOffset>) -> AtomicValue {
    match (ty, tz) {
        (AtomicType::DateWithTimezone, Some(tz)) => AtomicValue::DateWithTimezone { date: value.date(), tz },
        (AtomicType::Date | AtomicType::DateWithTimezone, tz) => AtomicValue::Date { date: value.date(), tz },
        (AtomicType::DateTimeWithTimezone, Some(tz)) => AtomicValue::DateTimeWithTimezone { value, tz },
        (_, tz) => AtomicValue::DateTime { value, tz },
    }
}

fn add_months(value: NaiveDateTime, months: i32) -> Option<NaiveDateTime> {
    let magnitude = Months::new(months.unsigned_abs());
    if months < 0 { value.checked_sub_months(magnitude) } else { value.checked_add_months(magnitude) }
}

fn scale_months(months: i32, factor: Decimal, divide: bool) -> Result<AtomicValue> {
    let months = Decimal::from(months);
    let scaled = if divide {
        if factor.is_zero() {
            return Err(division_by_zero());
        }
        months.checked_div(factor)
    } else {
        months.checked_mul(factor)
    };
    scaled.and_then(|m| m.round().to_i32()).map(AtomicValue::YearMonthDuration).ok_or_else(overflow)
}

fn scale_delta(d: TimeDelta, factor: Decimal, divide: bool) -> Result<AtomicValue> {
    let seconds = delta_seconds(d);
    let scaled = if divide {
        if factor.is_zero() {
            return Err(division_by_zero());
        }
        seconds.checked_div(factor)
    } else {
        seconds.checked_mul(factor)
    };
    scaled.and_then(seconds_delta).map(AtomicValue::DayTimeDuration).ok_or_else(overflow)
}

fn ratio(x: Decimal, y: Decimal) -> Result<AtomicValue> {
    if y.is_zero() {
        return Err(division_by_zero());
    }
    x.checked_div(y).map(AtomicValue::Decimal).ok_or_else(overflow)
}

/// Duration and date/time operators; `None` when the operand types do not
/// combine under `op`.
fn temporal_op(op: ArithmeticOp, a: &AtomicValue, b: &AtomicValue, implicit: FixedOffset) -> Option<Result<AtomicValue>> {
    use AtomicValue as V;
    use ArithmeticOp as Op;
    let result = match (op, a, b) {
        (Op::Add, V::DayTimeDuration(x), V::DayTimeDuration(y)) => {
            x.checked_add(y).map(V::DayTimeDuration).ok_or_else(overflow)
        }
        (Op::Subtract, V::DayTimeDuration(x), V::DayTimeDuration(y)) => {
            x.checked_sub(y).map(V::DayTimeDuration).ok_or_else(overflow)
        }
        (Op::Divide, V::DayTimeDuration(x), V::DayTimeDuration(y)) => ratio(delta_seconds(*x), delta_seconds(*y)),
        (Op::Add, V::YearMonthDuration(x), V::YearMonthDuration(y)) => {
            x.checked_add(*y).map(V::YearMonthDuration).ok_or_else(overflow)
        }
        (Op::Subtract, V::YearMonthDuration(x), V::YearMonthDuration(y)) => {
            x.checked_sub(*y).map(V::YearMonthDuration).ok_or_else(overflow)
        }
        (Op::Divide, V::YearMonthDuration(x), V::YearMonthDuration(y)) => ratio(Decimal::from(*x), Decimal::from(*y)),
        (Op::Multiply | Op::Divide, V::DayTimeDuration(d), n) if n.is_numeric() => {
            scale_delta(*d, n.as_decimal()?, op == Op::Divide)
        }
        (Op::Multiply, n, V::DayTimeDuration(d)) if n.is_numeric() => scale_delta(*d, n.as_decimal()?, false),
        (Op::Multiply | Op::Divide, V::YearMonthDuration(m), n) if n.is_numeric() => {
            scale_months(*m, n.as_decimal()?, op == Op::Divide)
        }
        (Op::Multiply, n, V::YearMonthDuration(m)) if n.is_numeric() => scale_months(*m, n.as_decimal()?, false),
        (Op::Add | Op::Subtract, t, V::DayTimeDuration(d)) | (Op::Add, V::DayTimeDuration(d), t) => {
            let (value, tz, ty) = instant(t)?;
            let delta = if matches!(b, V::DayTimeDuration(_)) && op == Op::Subtract { -*d } else { *d };
            value.checked_add_signed(delta).map(|v| rebuild(ty, v, tz)).ok_or_else(overflow)
        }
        (Op::Add | Op::Subtract, t, V::YearMonthDuration(m)) | (Op::Add, V::YearMonthDuration(m), t) => {
            let (value, tz, ty) = instant(t)?;
            let months = if matches!(b, V::YearMonthDuration(_)) && op == Op::Subtract { m.checked_neg()? } else { *m };
            add_months(value, months).map(|v| rebuild(ty, v, tz)).ok_or_else(overflow)
        }
        (Op::Subtract, x, y) => {
            let (xv, xtz, xt) = instant(x)?;
            let (yv, ytz, yt) = instant(y)?;
            let both_dates = xt.derives_from(AtomicType::Date) && yt.derives_from(AtomicType::Date);
            let both_date_times = xt.derives_from(AtomicType::DateTime) && yt.derives_from(AtomicType::DateTime);
            if !(both_dates || both_date_times) {
                return None;
            }
            Ok(V::DayTimeDuration(to_utc(xv, xtz, implicit) - to_utc(yv, ytz, implicit)))
        }
        _ => return None,
    };
    Some(result)
}
