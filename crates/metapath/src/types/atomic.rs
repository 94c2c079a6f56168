use core::fmt;
use std::collections::HashMap;

use crate::consts::NS_METAPATH;
use crate::names::{NameCache, QName};

/// The Metaschema atomic data types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AtomicType {
    AnyAtomic,
    UntypedAtomic,
    String,
    Token,
    NcName,
    EmailAddress,
    Hostname,
    MarkupLine,
    MarkupMultiline,
    Uri,
    UriReference,
    Boolean,
    /// Union of the decimal and integer types.
    Numeric,
    Decimal,
    Integer,
    NonNegativeInteger,
    PositiveInteger,
    Date,
    DateWithTimezone,
    DateTime,
    DateTimeWithTimezone,
    DayTimeDuration,
    YearMonthDuration,
    Uuid,
    Base64,
    IpV4Address,
    IpV6Address,
}

impl AtomicType {
    pub const ALL: &'static [AtomicType] = &[
        AtomicType::AnyAtomic,
        AtomicType::UntypedAtomic,
        AtomicType::String,
        AtomicType::Token,
        AtomicType::NcName,
        AtomicType::EmailAddress,
        AtomicType::Hostname,
        AtomicType::MarkupLine,
        AtomicType::MarkupMultiline,
        AtomicType::Uri,
        AtomicType::UriReference,
        AtomicType::Boolean,
        AtomicType::Numeric,
        AtomicType::Decimal,
        AtomicType::Integer,
        AtomicType::NonNegativeInteger,
        AtomicType::PositiveInteger,
        AtomicType::Date,
        AtomicType::DateWithTimezone,
        AtomicType::DateTime,
        AtomicType::DateTimeWithTimezone,
        AtomicType::DayTimeDuration,
        AtomicType::YearMonthDuration,
        AtomicType::Uuid,
        AtomicType::Base64,
        AtomicType::IpV4Address,
        AtomicType::IpV6Address,
    ];

    pub fn local_name(self) -> &'static str {
        match self {
            AtomicType::AnyAtomic => "any-atomic-type",
            AtomicType::UntypedAtomic => "untyped-atomic",
            AtomicType::String => "string",
            AtomicType::Token => "token",
            AtomicType::NcName => "ncname",
            AtomicType::EmailAddress => "email-address",
            AtomicType::Hostname => "hostname",
            AtomicType::MarkupLine => "markup-line",
            AtomicType::MarkupMultiline => "markup-multiline",
            AtomicType::Uri => "uri",
            AtomicType::UriReference => "uri-reference",
            AtomicType::Boolean => "boolean",
            AtomicType::Numeric => "numeric",
            AtomicType::Decimal => "decimal",
            AtomicType::Integer => "integer",
            AtomicType::NonNegativeInteger => "non-negative-integer",
            AtomicType::PositiveInteger => "positive-integer",
            AtomicType::Date => "date",
            AtomicType::DateWithTimezone => "date-with-timezone",
            AtomicType::DateTime => "date-time",
            AtomicType::DateTimeWithTimezone => "date-time-with-timezone",
            AtomicType::DayTimeDuration => "day-time-duration",
            AtomicType::YearMonthDuration => "year-month-duration",
            AtomicType::Uuid => "uuid",
            AtomicType::Base64 => "base64",
            AtomicType::IpV4Address => "ip-v4-address",
            AtomicType::IpV6Address => "ip-v6-address",
        }
    }

    /// Immediate supertype; `None` only for any-atomic-type.
    pub fn parent(self) -> Option<AtomicType> {
        use AtomicType as T;
        match self {
            T::AnyAtomic => None,
            T::Token | T::EmailAddress | T::Hostname | T::MarkupLine | T::MarkupMultiline => Some(T::String),
            T::NcName => Some(T::Token),
            T::Uri => Some(T::UriReference),
            T::Decimal => Some(T::Numeric),
            T::Integer => Some(T::Decimal),
            T::NonNegativeInteger => Some(T::Integer),
            T::PositiveInteger => Some(T::NonNegativeInteger),
            T::DateWithTimezone => Some(T::Date),
            T::DateTimeWithTimezone => Some(T::DateTime),
            _ => Some(T::AnyAtomic),
        }
    }

    /// True when `self` is `other` or one of its subtypes.
    pub fn derives_from(self, other: AtomicType) -> bool {
        let mut current = Some(self);
        while let Some(t) = current {
            if t == other {
                return true;
            }
            current = t.parent();
        }
        false
    }

    /// Abstract types have no values of their own.
    pub fn is_abstract(self) -> bool {
        matches!(self, AtomicType::AnyAtomic | AtomicType::Numeric)
    }
}

impl fmt::Display for AtomicType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "meta:{}", self.local_name())
    }
}

/// Atomic types by qualified name.
#[derive(Debug, Clone, Default)]
pub struct AtomicTypeRegistry {
    by_name: HashMap<QName, AtomicType>,
}

impl AtomicTypeRegistry {
    /// All built-in types under the `meta` namespace.
    pub fn builtin(cache: &NameCache) -> Self {
        let mut registry = Self::default();
        for ty in AtomicType::ALL {
            registry.register(cache.intern(NS_METAPATH, ty.local_name()), *ty);
        }
        registry
    }

    /// Register `name` as an alias for `ty`. A later registration for the
    /// same name wins.
    pub fn register(&mut self, name: QName, ty: AtomicType) {
        self.by_name.insert(name, ty);
    }

    pub fn lookup(&self, name: &QName) -> Option<AtomicType> {
        self.by_name.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(AtomicType::PositiveInteger, AtomicType::Numeric, true)]
    #[case(AtomicType::Integer, AtomicType::Decimal, true)]
    #[case(AtomicType::Decimal, AtomicType::Integer, false)]
    #[case(AtomicType::NcName, AtomicType::String, true)]
    #[case(AtomicType::Uri, AtomicType::String, false)]
    #[case(AtomicType::DateTimeWithTimezone, AtomicType::AnyAtomic, true)]
    fn derivation(#[case] sub: AtomicType, #[case] sup: AtomicType, #[case] expected: bool) {
        assert_eq!(sub.derives_from(sup), expected);
    }

    #[rstest]
    fn builtin_registry_covers_every_type() {
        let cache = NameCache::new();
        let registry = AtomicTypeRegistry::builtin(&cache);
        assert_eq!(registry.len(), AtomicType::ALL.len());
        let name = cache.intern(NS_METAPATH, "date-time");
        assert_eq!(registry.lookup(&name), Some(AtomicType::DateTime));
        assert_eq!(registry.lookup(&cache.intern("urn:other", "date-time")), None);
    }
}
