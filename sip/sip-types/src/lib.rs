//! SIP wire types: URIs, the generic parameter grammar and the raw
//! message representation moved around by the transport layer.
//!
//! All parsers are pure and synchronous. They borrow from the input
//! buffer where possible ([`bytesstr::BytesStr`]), so parsed values are
//! cheap to clone and keep around.

mod host;
mod parse;

pub mod msg;
pub mod uri;

pub use host::HostPort;
pub use parse::ParseError;
