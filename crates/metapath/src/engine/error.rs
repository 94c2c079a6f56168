use std::fmt;
use std::sync::Arc;

/// Error codes raised by compilation and evaluation.
///
/// `MPST*` codes are static (compile-time) errors, `MPTY*` type errors,
/// `MPDY*` dynamic errors and `FO*` function/operator errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    MPST0003, // grammar violation
    MPST0008, // unbound variable
    MPST0017, // no function with this name and arity
    MPST0051, // unknown type in a sequence type
    MPST0052, // unknown cast target
    MPST0080, // cast target is any-atomic-type
    MPST0081, // prefix not bound
    MPDY0002, // context item absent
    MPDY0050, // treat as mismatch
    MPTY0004, // operand type / cardinality
    MPTY0018, // path yields nodes and atomics
    MPTY0019, // path operand is not a node
    MPTY0020, // axis step context is not a node
    FOAR0001, // divide by zero
    FOAR0002, // numeric overflow
    FODC0002, // document could not be loaded
    FOER0000, // unidentified error
    FORG0001, // invalid value for cast
    FORG0003, // zero-or-one violated
    FORG0004, // one-or-more violated
    FORG0005, // exactly-one violated
    FORG0006, // invalid argument type
    FORX0002, // invalid regular expression
    FOTY0012, // node has no typed value
    FOTY0013, // function item atomized
    FOAY0001, // array index out of bounds
}

impl ErrorCode {
    pub const INVALID_PATH_GRAMMAR: ErrorCode = ErrorCode::MPST0003;
    pub const NOT_DEFINED: ErrorCode = ErrorCode::MPST0008;
    pub const NO_FUNCTION_MATCH: ErrorCode = ErrorCode::MPST0017;
    pub const UNKNOWN_TYPE: ErrorCode = ErrorCode::MPST0051;
    pub const CAST_UNKNOWN_TYPE: ErrorCode = ErrorCode::MPST0052;
    pub const CAST_ANY_ATOMIC: ErrorCode = ErrorCode::MPST0080;
    pub const PREFIX_NOT_EXPANDABLE: ErrorCode = ErrorCode::MPST0081;
    pub const CONTEXT_ABSENT: ErrorCode = ErrorCode::MPDY0002;
    pub const TREAT_MISMATCH: ErrorCode = ErrorCode::MPDY0050;
    pub const INVALID_TYPE: ErrorCode = ErrorCode::MPTY0004;

    /// Canonical code string, e.g. `MPST0081`.
    pub fn qname(&self) -> &'static str {
        match self {
            ErrorCode::MPST0003 => "MPST0003",
            ErrorCode::MPST0008 => "MPST0008",
            ErrorCode::MPST0017 => "MPST0017",
            ErrorCode::MPST0051 => "MPST0051",
            ErrorCode::MPST0052 => "MPST0052",
            ErrorCode::MPST0080 => "MPST0080",
            ErrorCode::MPST0081 => "MPST0081",
            ErrorCode::MPDY0002 => "MPDY0002",
            ErrorCode::MPDY0050 => "MPDY0050",
            ErrorCode::MPTY0004 => "MPTY0004",
            ErrorCode::MPTY0018 => "MPTY0018",
            ErrorCode::MPTY0019 => "MPTY0019",
            ErrorCode::MPTY0020 => "MPTY0020",
            ErrorCode::FOAR0001 => "FOAR0001",
            ErrorCode::FOAR0002 => "FOAR0002",
            ErrorCode::FODC0002 => "FODC0002",
            ErrorCode::FOER0000 => "FOER0000",
            ErrorCode::FORG0001 => "FORG0001",
            ErrorCode::FORG0003 => "FORG0003",
            ErrorCode::FORG0004 => "FORG0004",
            ErrorCode::FORG0005 => "FORG0005",
            ErrorCode::FORG0006 => "FORG0006",
            ErrorCode::FORX0002 => "FORX0002",
            ErrorCode::FOTY0012 => "FOTY0012",
            ErrorCode::FOTY0013 => "FOTY0013",
            ErrorCode::FOAY0001 => "FOAY0001",
        }
    }

    /// Parse a code string back into the enum. Unknown strings map to
    /// [`ErrorCode::FOER0000`].
    pub fn from_code(s: &str) -> Self {
        match s {
            "MPST0003" => ErrorCode::MPST0003,
            "MPST0008" => ErrorCode::MPST0008,
            "MPST0017" => ErrorCode::MPST0017,
            "MPST0051" => ErrorCode::MPST0051,
            "MPST0052" => ErrorCode::MPST0052,
            "MPST0080" => ErrorCode::MPST0080,
            "MPST0081" => ErrorCode::MPST0081,
            "MPDY0002" => ErrorCode::MPDY0002,
            "MPDY0050" => ErrorCode::MPDY0050,
            "MPTY0004" => ErrorCode::MPTY0004,
            "MPTY0018" => ErrorCode::MPTY0018,
            "MPTY0019" => ErrorCode::MPTY0019,
            "MPTY0020" => ErrorCode::MPTY0020,
            "FOAR0001" => ErrorCode::FOAR0001,
            "FOAR0002" => ErrorCode::FOAR0002,
            "FODC0002" => ErrorCode::FODC0002,
            "FORG0001" => ErrorCode::FORG0001,
            "FORG0003" => ErrorCode::FORG0003,
            "FORG0004" => ErrorCode::FORG0004,
            "FORG0005" => ErrorCode::FORG0005,
            "FORG0006" => ErrorCode::FORG0006,
            "FORX0002" => ErrorCode::FORX0002,
            "FOTY0012" => ErrorCode::FOTY0012,
            "FOTY0013" => ErrorCode::FOTY0013,
            "FOAY0001" => ErrorCode::FOAY0001,
            _ => ErrorCode::FOER0000,
        }
    }

    /// Static errors abort compilation.
    pub fn is_static(&self) -> bool {
        self.qname().starts_with("MPST")
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.qname())
    }
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("error: {message} ({code})")]
pub struct Error {
    pub code: ErrorCode,
    pub message: String,
    #[source]
    pub source: Option<Arc<dyn std::error::Error + Send + Sync>>,
}

impl Error {
    pub fn from_code(code: ErrorCode, msg: impl Into<String>) -> Self {
        Self { code, message: msg.into(), source: None }
    }

    /// Compose an error with a source cause.
    pub fn with_source(mut self, source: impl Into<Option<Arc<dyn std::error::Error + Send + Sync>>>) -> Self {
        self.source = source.into();
        self
    }

    pub fn code(&self) -> ErrorCode {
        self.code
    }

    pub fn is_static(&self) -> bool {
        self.code.is_static()
    }

    pub(crate) fn type_error(msg: impl Into<String>) -> Self {
        Self::from_code(ErrorCode::MPTY0004, msg)
    }
}

impl From<fancy_regex::Error> for Error {
    fn from(e: fancy_regex::Error) -> Self {
        Error::from_code(ErrorCode::FORX0002, format!("invalid regular expression: {e}"))
            .with_source(Some(Arc::new(e) as Arc<dyn std::error::Error + Send + Sync>))
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(ErrorCode::INVALID_PATH_GRAMMAR, "MPST0003")]
    #[case(ErrorCode::PREFIX_NOT_EXPANDABLE, "MPST0081")]
    #[case(ErrorCode::CAST_UNKNOWN_TYPE, "MPST0052")]
    #[case(ErrorCode::CAST_ANY_ATOMIC, "MPST0080")]
    #[case(ErrorCode::FORG0001, "FORG0001")]
    fn code_strings_round_trip(#[case] code: ErrorCode, #[case] text: &str) {
        assert_eq!(code.qname(), text);
        assert_eq!(ErrorCode::from_code(text), code);
    }

    #[rstest]
    fn static_tier_is_derived_from_code() {
        assert!(Error::from_code(ErrorCode::MPST0081, "x").is_static());
        assert!(!Error::from_code(ErrorCode::MPTY0004, "x").is_static());
    }

    #[rstest]
    fn display_includes_code() {
        let e = Error::from_code(ErrorCode::FOAR0001, "division by zero");
        assert_eq!(e.to_string(), "error: division by zero (FOAR0001)");
    }
}
