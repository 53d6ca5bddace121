//! URI types and their parsers

use crate::parse::ParseError;
use bytes::Bytes;
use bytesstr::BytesStr;
use memchr::memchr;
use std::fmt;
use std::str::FromStr;

pub mod params;
mod sip;

pub use sip::{SipUri, UserInfo};

/// Any URI accepted in a SIP message.
///
/// The wildcard URI `*` is only valid in a few places (like a Contact
/// header of an unregister request) and only produced by this generic
/// entry point, never by [`SipUri::parse`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Uri {
    Sip(SipUri),
    Wildcard,
}

impl Uri {
    /// Parse any supported URI from `i`, which must be a slice of `src`.
    ///
    /// Leading and trailing linear whitespace is ignored.
    pub fn parse(src: &Bytes, i: &str) -> Result<Self, ParseError> {
        let i = i.trim_matches([' ', '\t']);

        if i == "*" {
            return Ok(Uri::Wildcard);
        }

        let Some(colon) = memchr(b':', i.as_bytes()) else {
            return Err(ParseError::MissingColon(BytesStr::from_parse(src, i)));
        };

        let scheme = &i[..colon];

        if scheme.eq_ignore_ascii_case("sip") || scheme.eq_ignore_ascii_case("sips") {
            SipUri::parse(src, i).map(Uri::Sip)
        } else {
            Err(ParseError::UnsupportedScheme(BytesStr::from_parse(
                src, scheme,
            )))
        }
    }

    pub fn sip(&self) -> Option<&SipUri> {
        match self {
            Uri::Sip(uri) => Some(uri),
            Uri::Wildcard => None,
        }
    }
}

impl FromStr for Uri {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let src = BytesStr::from(s);
        Self::parse(src.as_ref(), &src)
    }
}

impl fmt::Display for Uri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Uri::Sip(uri) => uri.fmt(f),
            Uri::Wildcard => f.write_str("*"),
        }
    }
}
