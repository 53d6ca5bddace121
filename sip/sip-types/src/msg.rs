//! Raw SIP message as exchanged with the transport layer.
//!
//! Header values and the leading line are kept uninterpreted, their
//! parsing and validation is the message layer's job.

use bytes::{Bytes, BytesMut};
use bytesstr::BytesStr;
use std::fmt;

/// A single raw header line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub name: BytesStr,
    pub value: BytesStr,
}

/// Raw headers in wire order. Lookup is case insensitive, duplicates are
/// kept as received.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    headers: Vec<Header>,
}

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push<N, V>(&mut self, name: N, value: V)
    where
        N: Into<BytesStr>,
        V: Into<BytesStr>,
    {
        self.headers.push(Header {
            name: name.into(),
            value: value.into(),
        });
    }

    /// First value of the header `name`
    pub fn get(&self, name: &str) -> Option<&BytesStr> {
        self.headers
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case(name))
            .map(|h| &h.value)
    }

    pub fn get_all<'s>(&'s self, name: &'s str) -> impl Iterator<Item = &'s BytesStr> + 's {
        self.headers
            .iter()
            .filter(move |h| h.name.eq_ignore_ascii_case(name))
            .map(|h| &h.value)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Header> {
        self.headers.iter()
    }

    pub fn len(&self) -> usize {
        self.headers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }
}

/// A SIP request or response: leading line, raw headers and body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SipMessage {
    pub line: BytesStr,
    pub headers: Headers,
    pub body: Bytes,
}

impl SipMessage {
    pub fn new(line: impl Into<BytesStr>, headers: Headers, body: Bytes) -> Self {
        Self {
            line: line.into(),
            headers,
            body,
        }
    }

    /// Serialize to wire format
    pub fn to_bytes(&self) -> Bytes {
        let headers_len: usize = self
            .headers
            .iter()
            .map(|h| h.name.len() + h.value.len() + 4)
            .sum();

        let mut out =
            BytesMut::with_capacity(self.line.len() + headers_len + self.body.len() + 4);

        out.extend_from_slice(self.line.as_bytes());
        out.extend_from_slice(b"\r\n");

        for header in self.headers.iter() {
            out.extend_from_slice(header.name.as_bytes());
            out.extend_from_slice(b": ");
            out.extend_from_slice(header.value.as_bytes());
            out.extend_from_slice(b"\r\n");
        }

        out.extend_from_slice(b"\r\n");
        out.extend_from_slice(&self.body);

        out.freeze()
    }
}

impl fmt::Display for SipMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.line)
    }
}
