//! The casting primitive.
//!
//! [`AtomicType::cast`] returns a `Result` whose error side is a plain
//! [`CastError`]. `cast as` converts that into a dynamic error; `castable as`
//! maps it to `false`.
use std::net::{Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

use base64::Engine as _;
use chrono::NaiveTime;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;

use crate::engine::error::{Error, ErrorCode};
use crate::types::AtomicType;
use crate::types::temporal;
use crate::xdm::AtomicValue;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("cannot cast '{value}' to {target}: {reason}")]
pub struct CastError {
    pub target: AtomicType,
    pub value: String,
    pub reason: String,
}

impl From<CastError> for Error {
    fn from(e: CastError) -> Self {
        Error::from_code(ErrorCode::FORG0001, e.to_string())
    }
}

fn fail(target: AtomicType, value: &AtomicValue, reason: &str) -> CastError {
    CastError { target, value: value.to_string(), reason: reason.to_string() }
}

fn fail_lexical(target: AtomicType, lexical: &str) -> CastError {
    CastError { target, value: lexical.to_string(), reason: "invalid lexical form".to_string() }
}

impl AtomicType {
    /// Convert `value` to this type.
    pub fn cast(self, value: &AtomicValue) -> Result<AtomicValue, CastError> {
        use AtomicType as T;
        if value.atomic_type() == self || self == T::AnyAtomic {
            return Ok(value.clone());
        }
        match self {
            T::AnyAtomic => Ok(value.clone()),
            T::UntypedAtomic => Ok(AtomicValue::UntypedAtomic(value.to_string())),
            T::String => Ok(AtomicValue::String(value.to_string())),
            T::Boolean => cast_boolean(value),
            T::Numeric => {
                if value.is_numeric() {
                    Ok(value.clone())
                } else {
                    T::Integer.cast(value).or_else(|_| T::Decimal.cast(value)).map_err(|_| fail(self, value, "not numeric"))
                }
            }
            T::Decimal => cast_decimal(value),
            T::Integer | T::NonNegativeInteger | T::PositiveInteger => cast_integer(self, value),
            T::Date | T::DateWithTimezone => cast_date(self, value),
            T::DateTime | T::DateTimeWithTimezone => cast_date_time(self, value),
            _ if self.derives_from(T::String) => self.parse(&value.to_string()),
            _ => match lexical_source(value) {
                Some(lexical) => self.parse(lexical),
                None => Err(fail(self, value, "source type is not castable to target")),
            },
        }
    }

    /// Parse a lexical form into a value of this type.
    pub fn parse(self, lexical: &str) -> Result<AtomicValue, CastError> {
        use AtomicType as T;
        let trimmed = lexical.trim();
        let invalid = || fail_lexical(self, lexical);
        match self {
            T::AnyAtomic | T::UntypedAtomic => Ok(AtomicValue::UntypedAtomic(lexical.to_string())),
            T::String => Ok(AtomicValue::String(lexical.to_string())),
            T::MarkupLine => Ok(AtomicValue::MarkupLine(lexical.to_string())),
            T::MarkupMultiline => Ok(AtomicValue::MarkupMultiline(lexical.to_string())),
            T::Token => is_token(trimmed).then(|| AtomicValue::Token(trimmed.to_string())).ok_or_else(invalid),
            T::NcName => is_token(trimmed).then(|| AtomicValue::NcName(trimmed.to_string())).ok_or_else(invalid),
            T::EmailAddress => is_email(trimmed)
                .then(|| AtomicValue::EmailAddress(trimmed.to_string()))
                .ok_or_else(invalid),
            T::Hostname => (!trimmed.is_empty() && !trimmed.contains(char::is_whitespace))
                .then(|| AtomicValue::Hostname(trimmed.to_string()))
                .ok_or_else(invalid),
            T::Uri => url::Url::parse(trimmed)
                .map(|_| AtomicValue::Uri(trimmed.to_string()))
                .map_err(|_| invalid()),
            T::UriReference => (!trimmed.contains(char::is_whitespace))
                .then(|| AtomicValue::UriReference(trimmed.to_string()))
                .ok_or_else(invalid),
            T::Boolean => Ok(AtomicValue::Boolean(matches!(trimmed, "true" | "1"))),
            T::Numeric => T::Integer.parse(lexical).or_else(|_| T::Decimal.parse(lexical)).map_err(|_| invalid()),
            T::Decimal => parse_decimal(trimmed).map(AtomicValue::Decimal).ok_or_else(invalid),
            T::Integer | T::NonNegativeInteger | T::PositiveInteger => {
                let i = parse_integer(trimmed).ok_or_else(invalid)?;
                constrain_integer(self, i).ok_or_else(invalid)
            }
            T::Date | T::DateWithTimezone => {
                let (date, tz) = temporal::parse_date(trimmed).ok_or_else(invalid)?;
                cast_date(self, &AtomicValue::Date { date, tz })
            }
            T::DateTime | T::DateTimeWithTimezone => {
                let (value, tz) = temporal::parse_date_time(trimmed).ok_or_else(invalid)?;
                cast_date_time(self, &AtomicValue::DateTime { value, tz })
            }
            T::DayTimeDuration => {
                temporal::parse_day_time_duration(trimmed).map(AtomicValue::DayTimeDuration).ok_or_else(invalid)
            }
            T::YearMonthDuration => temporal::parse_year_month_duration(trimmed)
                .map(AtomicValue::YearMonthDuration)
                .ok_or_else(invalid),
            T::Uuid => uuid::Uuid::parse_str(trimmed).map(AtomicValue::Uuid).map_err(|_| invalid()),
            T::Base64 => {
                let compact: String = trimmed.chars().filter(|c| !c.is_whitespace()).collect();
                base64::engine::general_purpose::STANDARD
                    .decode(compact.as_bytes())
                    .map(AtomicValue::Base64)
                    .map_err(|_| invalid())
            }
            T::IpV4Address => Ipv4Addr::from_str(trimmed).map(AtomicValue::IpV4Address).map_err(|_| invalid()),
            T::IpV6Address => Ipv6Addr::from_str(trimmed).map(AtomicValue::IpV6Address).map_err(|_| invalid()),
        }
    }
}

/// Lexical form usable as cast input: string-like and URI values.
fn lexical_source(value: &AtomicValue) -> Option<&str> {
    value.as_string_or_uri()
}

fn cast_boolean(value: &AtomicValue) -> Result<AtomicValue, CastError> {
    if let Some(d) = value.as_decimal() {
        return Ok(AtomicValue::Boolean(!d.is_zero()));
    }
    match value {
        AtomicValue::Boolean(b) => Ok(AtomicValue::Boolean(*b)),
        other => match other.as_str() {
            Some(s) => AtomicType::Boolean.parse(s),
            None => Err(fail(AtomicType::Boolean, value, "source type is not castable to boolean")),
        },
    }
}

fn cast_decimal(value: &AtomicValue) -> Result<AtomicValue, CastError> {
    if let Some(d) = value.as_decimal() {
        return Ok(AtomicValue::Decimal(d));
    }
    match value {
        AtomicValue::Boolean(b) => Ok(AtomicValue::Decimal(if *b { Decimal::ONE } else { Decimal::ZERO })),
        other => match other.as_str() {
            Some(s) => AtomicType::Decimal.parse(s),
            None => Err(fail(AtomicType::Decimal, value, "source type is not castable to decimal")),
        },
    }
}

fn cast_integer(target: AtomicType, value: &AtomicValue) -> Result<AtomicValue, CastError> {
    let i = match value {
        AtomicValue::Boolean(b) => i64::from(*b),
        AtomicValue::Decimal(d) => d.trunc().to_i64().ok_or_else(|| fail(target, value, "integer overflow"))?,
        other => match (other.as_integer(), other.as_str()) {
            (Some(i), _) => i,
            (None, Some(s)) => return target.parse(s),
            (None, None) => return Err(fail(target, value, "source type is not castable to integer")),
        },
    };
    constrain_integer(target, i).ok_or_else(|| fail(target, value, "value out of range"))
}

fn constrain_integer(target: AtomicType, i: i64) -> Option<AtomicValue> {
    match target {
        AtomicType::NonNegativeInteger => (i >= 0).then_some(AtomicValue::NonNegativeInteger(i)),
        AtomicType::PositiveInteger => (i > 0).then_some(AtomicValue::PositiveInteger(i)),
        _ => Some(AtomicValue::Integer(i)),
    }
}

fn cast_date(target: AtomicType, value: &AtomicValue) -> Result<AtomicValue, CastError> {
    let (date, tz) = match value {
        AtomicValue::Date { date, tz } => (*date, *tz),
        AtomicValue::DateWithTimezone { date, tz } => (*date, Some(*tz)),
        AtomicValue::DateTime { value: dt, tz } => (dt.date(), *tz),
        AtomicValue::DateTimeWithTimezone { value: dt, tz } => (dt.date(), Some(*tz)),
        other => match other.as_str() {
            Some(s) => return target.parse(s),
            None => return Err(fail(target, value, "source type is not castable to a date")),
        },
    };
    match (target, tz) {
        (AtomicType::DateWithTimezone, Some(tz)) => Ok(AtomicValue::DateWithTimezone { date, tz }),
        (AtomicType::DateWithTimezone, None) => Err(fail(target, value, "a timezone is required")),
        _ => Ok(AtomicValue::Date { date, tz }),
    }
}

fn cast_date_time(target: AtomicType, value: &AtomicValue) -> Result<AtomicValue, CastError> {
    let (dt, tz) = match value {
        AtomicValue::DateTime { value, tz } => (*value, *tz),
        AtomicValue::DateTimeWithTimezone { value, tz } => (*value, Some(*tz)),
        AtomicValue::Date { date, tz } => (date.and_time(NaiveTime::MIN), *tz),
        AtomicValue::DateWithTimezone { date, tz } => (date.and_time(NaiveTime::MIN), Some(*tz)),
        other => match other.as_str() {
            Some(s) => return target.parse(s),
            None => return Err(fail(target, value, "source type is not castable to a date-time")),
        },
    };
    match (target, tz) {
        (AtomicType::DateTimeWithTimezone, Some(tz)) => Ok(AtomicValue::DateTimeWithTimezone { value: dt, tz }),
        (AtomicType::DateTimeWithTimezone, None) => Err(fail(target, value, "a timezone is required")),
        _ => Ok(AtomicValue::DateTime { value: dt, tz }),
    }
}

fn parse_integer(s: &str) -> Option<i64> {
    let digits = s.strip_prefix(['+', '-']).unwrap_or(s);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}

fn parse_decimal(s: &str) -> Option<Decimal> {
    let body = s.strip_prefix(['+', '-']).unwrap_or(s);
    let (mantissa, exponent) = match body.find(['e', 'E']) {
        Some(idx) => (&body[..idx], Some(&body[idx + 1..])),
        None => (body, None),
    };
    let (whole, frac) = mantissa.split_once('.').unwrap_or((mantissa, ""));
    let digits_ok = |p: &str| p.bytes().all(|b| b.is_ascii_digit());
    if (whole.is_empty() && frac.is_empty()) || !digits_ok(whole) || !digits_ok(frac) {
        return None;
    }
    let sign = if s.starts_with('-') { "-" } else { "" };
    let whole = if whole.is_empty() { "0" } else { whole };
    let normalized = if frac.is_empty() { format!("{sign}{whole}") } else { format!("{sign}{whole}.{frac}") };
    match exponent {
        None => Decimal::from_str(&normalized).ok(),
        Some(exp) => {
            let exp_digits = exp.strip_prefix(['+', '-']).unwrap_or(exp);
            if exp_digits.is_empty() || !digits_ok(exp_digits) {
                return None;
            }
            let exp = exp.strip_prefix('+').unwrap_or(exp);
            Decimal::from_scientific(&format!("{normalized}e{exp}")).ok()
        }
    }
}

fn is_token(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || matches!(c, '.' | '-' | '_'))
}

fn is_email(s: &str) -> bool {
    match s.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty() && !domain.is_empty() && !s.contains(char::is_whitespace)
        }
        None => false,
    }
}
