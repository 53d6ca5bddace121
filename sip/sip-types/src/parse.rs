//! Parse errors shared by all parsers in this crate

use bytesstr::BytesStr;

/// Error returned by every parser in this crate.
///
/// Each variant carries the input (or the relevant slice of it) that caused
/// the failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("uri contains no scheme delimiter: {0:?}")]
    MissingColon(BytesStr),

    #[error("unsupported uri scheme {0:?}")]
    UnsupportedScheme(BytesStr),

    #[error("expected sip or sips scheme, got {0:?}")]
    UnknownScheme(BytesStr),

    #[error("invalid port: {0:?}")]
    BadPort(BytesStr),

    #[error("sip uri is missing a host: {0:?}")]
    MissingHost(BytesStr),

    #[error("expected parameters to begin with {expected:?}: {input:?}")]
    ExpectedStart { expected: char, input: BytesStr },

    #[error("parameter key must not be empty: {0:?}")]
    EmptyKey(BytesStr),

    #[error("unexpected '=' outside of a parameter key: {0:?}")]
    UnexpectedEquals(BytesStr),

    #[error("separator without a preceding parameter key: {0:?}")]
    UnexpectedSeparator(BytesStr),

    #[error("misplaced '\"' in parameters: {0:?}")]
    BadQuote(BytesStr),

    #[error("parameters end inside a quoted value: {0:?}")]
    UnclosedQuote(BytesStr),

    #[error("parameter key {0:?} has no value")]
    SingletonForbidden(BytesStr),

    #[error("input left over after parsing uri: {0:?}")]
    TrailingInput(BytesStr),
}

/// Linear whitespace as defined by the SIP ABNF
pub(crate) fn is_lws(c: char) -> bool {
    matches!(c, ' ' | '\t')
}
