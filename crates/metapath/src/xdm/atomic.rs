use core::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};

use base64::Engine as _;
use chrono::{FixedOffset, NaiveDate, NaiveDateTime, TimeDelta};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::types::AtomicType;
use crate::types::temporal;

/// A typed atomic value, one variant per Metaschema data type.
///
/// String-derived types keep their lexical form; the other variants hold the
/// parsed value and render their canonical lexical form through `Display`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AtomicValue {
    UntypedAtomic(String),
    String(String),
    Token(String),
    NcName(String),
    EmailAddress(String),
    Hostname(String),
    MarkupLine(String),
    MarkupMultiline(String),
    Uri(String),
    UriReference(String),
    Boolean(bool),
    Integer(i64),
    NonNegativeInteger(i64),
    PositiveInteger(i64),
    Decimal(Decimal),
    Date {
        date: NaiveDate,
        tz: Option<FixedOffset>,
    },
    DateWithTimezone {
        date: NaiveDate,
        tz: FixedOffset,
    },
    DateTime {
        value: NaiveDateTime,
        tz: Option<FixedOffset>,
    },
    DateTimeWithTimezone {
        value: NaiveDateTime,
        tz: FixedOffset,
    },
    DayTimeDuration(TimeDelta),
    /// Total months.
    YearMonthDuration(i32),
    Uuid(Uuid),
    Base64(Vec<u8>),
    IpV4Address(Ipv4Addr),
    IpV6Address(Ipv6Addr),
}

impl AtomicValue {
    pub fn atomic_type(&self) -> AtomicType {
        match self {
            AtomicValue::UntypedAtomic(_) => AtomicType::UntypedAtomic,
            AtomicValue::String(_) => AtomicType::String,
            AtomicValue::Token(_) => AtomicType::Token,
            AtomicValue::NcName(_) => AtomicType::NcName,
            AtomicValue::EmailAddress(_) => AtomicType::EmailAddress,
            AtomicValue::Hostname(_) => AtomicType::Hostname,
            AtomicValue::MarkupLine(_) => AtomicType::MarkupLine,
            AtomicValue::MarkupMultiline(_) => AtomicType::MarkupMultiline,
            AtomicValue::Uri(_) => AtomicType::Uri,
            AtomicValue::UriReference(_) => AtomicType::UriReference,
            AtomicValue::Boolean(_) => AtomicType::Boolean,
            AtomicValue::Integer(_) => AtomicType::Integer,
            AtomicValue::NonNegativeInteger(_) => AtomicType::NonNegativeInteger,
            AtomicValue::PositiveInteger(_) => AtomicType::PositiveInteger,
            AtomicValue::Decimal(_) => AtomicType::Decimal,
            AtomicValue::Date { .. } => AtomicType::Date,
            AtomicValue::DateWithTimezone { .. } => AtomicType::DateWithTimezone,
            AtomicValue::DateTime { .. } => AtomicType::DateTime,
            AtomicValue::DateTimeWithTimezone { .. } => AtomicType::DateTimeWithTimezone,
            AtomicValue::DayTimeDuration(_) => AtomicType::DayTimeDuration,
            AtomicValue::YearMonthDuration(_) => AtomicType::YearMonthDuration,
            AtomicValue::Uuid(_) => AtomicType::Uuid,
            AtomicValue::Base64(_) => AtomicType::Base64,
            AtomicValue::IpV4Address(_) => AtomicType::IpV4Address,
            AtomicValue::IpV6Address(_) => AtomicType::IpV6Address,
        }
    }

    /// Borrow the lexical form of string-like values (string family and
    /// untyped atomic).
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AtomicValue::UntypedAtomic(s)
            | AtomicValue::String(s)
            | AtomicValue::Token(s)
            | AtomicValue::NcName(s)
            | AtomicValue::EmailAddress(s)
            | AtomicValue::Hostname(s)
            | AtomicValue::MarkupLine(s)
            | AtomicValue::MarkupMultiline(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_string_like(&self) -> bool {
        self.as_str().is_some()
    }

    /// URI values compare and promote like strings.
    pub fn as_string_or_uri(&self) -> Option<&str> {
        match self {
            AtomicValue::Uri(s) | AtomicValue::UriReference(s) => Some(s),
            other => other.as_str(),
        }
    }

    pub fn is_numeric(&self) -> bool {
        self.as_decimal().is_some()
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            AtomicValue::Integer(i) | AtomicValue::NonNegativeInteger(i) | AtomicValue::PositiveInteger(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_decimal(&self) -> Option<Decimal> {
        match self {
            AtomicValue::Decimal(d) => Some(*d),
            other => other.as_integer().map(Decimal::from),
        }
    }

    pub fn string(s: impl Into<String>) -> Self {
        AtomicValue::String(s.into())
    }

    pub fn untyped(s: impl Into<String>) -> Self {
        AtomicValue::UntypedAtomic(s.into())
    }
}

impl fmt::Display for AtomicValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AtomicValue::UntypedAtomic(s)
            | AtomicValue::String(s)
            | AtomicValue::Token(s)
            | AtomicValue::NcName(s)
            | AtomicValue::EmailAddress(s)
            | AtomicValue::Hostname(s)
            | AtomicValue::MarkupLine(s)
            | AtomicValue::MarkupMultiline(s)
            | AtomicValue::Uri(s)
            | AtomicValue::UriReference(s) => f.write_str(s),
            AtomicValue::Boolean(b) => write!(f, "{b}"),
            AtomicValue::Integer(i) | AtomicValue::NonNegativeInteger(i) | AtomicValue::PositiveInteger(i) => {
                write!(f, "{i}")
            }
            AtomicValue::Decimal(d) => {
                let n = d.normalize();
                if n.is_zero() { f.write_str("0") } else { write!(f, "{n}") }
            }
            AtomicValue::Date { date, tz } => f.write_str(&temporal::format_date(*date, *tz)),
            AtomicValue::DateWithTimezone { date, tz } => f.write_str(&temporal::format_date(*date, Some(*tz))),
            AtomicValue::DateTime { value, tz } => f.write_str(&temporal::format_date_time(*value, *tz)),
            AtomicValue::DateTimeWithTimezone { value, tz } => {
                f.write_str(&temporal::format_date_time(*value, Some(*tz)))
            }
            AtomicValue::DayTimeDuration(d) => f.write_str(&temporal::format_day_time_duration(*d)),
            AtomicValue::YearMonthDuration(m) => f.write_str(&temporal::format_year_month_duration(*m)),
            AtomicValue::Uuid(u) => write!(f, "{}", u.hyphenated()),
            AtomicValue::Base64(bytes) => f.write_str(&base64::engine::general_purpose::STANDARD.encode(bytes)),
            AtomicValue::IpV4Address(ip) => write!(f, "{ip}"),
            AtomicValue::IpV6Address(ip) => write!(f, "{ip}"),
        }
    }
}

impl From<&str> for AtomicValue {
    fn from(s: &str) -> Self {
        AtomicValue::String(s.to_string())
    }
}

impl From<String> for AtomicValue {
    fn from(s: String) -> Self {
        AtomicValue::String(s)
    }
}

impl From<bool> for AtomicValue {
    fn from(b: bool) -> Self {
        AtomicValue::Boolean(b)
    }
}

impl From<i64> for AtomicValue {
    fn from(i: i64) -> Self {
        AtomicValue::Integer(i)
    }
}

impl From<i32> for AtomicValue {
    fn from(i: i32) -> Self {
        AtomicValue::Integer(i64::from(i))
    }
}

impl From<Decimal> for AtomicValue {
    fn from(d: Decimal) -> Self {
        AtomicValue::Decimal(d)
    }
}

impl From<Uuid> for AtomicValue {
    fn from(u: Uuid) -> Self {
        AtomicValue::Uuid(u)
    }
}
