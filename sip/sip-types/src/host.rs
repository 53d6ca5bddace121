//! [HostPort] as found in SIP URIs

use crate::parse::ParseError;
use bytes::Bytes;
use bytesstr::BytesStr;
use std::fmt;
use std::net::{SocketAddr, SocketAddrV4, SocketAddrV6};
use std::str::FromStr;

/// Host paired with an optional port.
///
/// The host is kept as an opaque string. IPv6 reference literals (`[...]`)
/// are not supported, the input is always split at the first `:`.
#[derive(Debug, Clone, Hash, PartialEq, Eq)]
pub struct HostPort {
    pub host: BytesStr,
    pub port: Option<u16>,
}

impl HostPort {
    /// Creates a new host-port from a hostname without a port
    pub fn host_name<S: Into<BytesStr>>(name: S) -> HostPort {
        HostPort {
            host: name.into(),
            port: None,
        }
    }

    /// Parse a host-port from `i`, which must be a slice of `src`.
    ///
    /// An empty host is accepted here; SIP URIs reject it upstream.
    pub fn parse(src: &Bytes, i: &str) -> Result<Self, ParseError> {
        match memchr::memchr(b':', i.as_bytes()) {
            None => Ok(HostPort {
                host: BytesStr::from_parse(src, i),
                port: None,
            }),
            Some(colon) => Ok(HostPort {
                host: BytesStr::from_parse(src, &i[..colon]),
                port: Some(parse_port(src, &i[colon + 1..])?),
            }),
        }
    }
}

// unsigned decimal only, `str::parse` alone would accept a leading sign
fn parse_port(src: &Bytes, i: &str) -> Result<u16, ParseError> {
    if i.is_empty() || !i.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ParseError::BadPort(BytesStr::from_parse(src, i)));
    }

    i.parse()
        .map_err(|_| ParseError::BadPort(BytesStr::from_parse(src, i)))
}

impl FromStr for HostPort {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let src = BytesStr::from(s);
        Self::parse(src.as_ref(), &src)
    }
}

impl From<SocketAddrV4> for HostPort {
    fn from(addr: SocketAddrV4) -> Self {
        HostPort {
            host: addr.ip().to_string().into(),
            port: Some(addr.port()),
        }
    }
}

impl From<SocketAddrV6> for HostPort {
    fn from(addr: SocketAddrV6) -> Self {
        HostPort {
            host: addr.ip().to_string().into(),
            port: Some(addr.port()),
        }
    }
}

impl From<SocketAddr> for HostPort {
    fn from(addr: SocketAddr) -> Self {
        match addr {
            SocketAddr::V4(addr) => addr.into(),
            SocketAddr::V6(addr) => addr.into(),
        }
    }
}

impl fmt::Display for HostPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.host)?;

        if let Some(port) = self.port {
            write!(f, ":{port}")?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[track_caller]
    fn expect_host(i: &'static str, host: &str, port: Option<u16>) {
        let got = HostPort::from_str(i).unwrap();
        assert_eq!(got.host, host);
        assert_eq!(got.port, port);
    }

    #[test]
    fn host_only() {
        expect_host("example.org", "example.org", None);
        expect_host("127.0.0.1", "127.0.0.1", None);
        expect_host(
            "very.long.hostname.example.org.",
            "very.long.hostname.example.org.",
            None,
        );
    }

    #[test]
    fn host_and_port() {
        expect_host("example.org:5060", "example.org", Some(5060));
        expect_host("127.0.0.1:0", "127.0.0.1", Some(0));
        expect_host("example.org:65535", "example.org", Some(65535));
    }

    #[test]
    fn empty_host_is_accepted_here() {
        expect_host("", "", None);
        expect_host(":5060", "", Some(5060));
    }

    #[test]
    fn invalid_port() {
        for i in [
            "example.org:",
            "example.org:port",
            "example.org:65536",
            "example.org:+5060",
            "example.org:50 60",
        ] {
            assert!(
                matches!(HostPort::from_str(i), Err(ParseError::BadPort(_))),
                "{i:?} should have a bad port"
            );
        }
    }

    #[test]
    fn splits_at_first_colon() {
        // no ipv6 reference support, everything past the first colon is a port
        assert!(matches!(
            HostPort::from_str("[2001:db8::1]:5060"),
            Err(ParseError::BadPort(_))
        ));
    }

    #[test]
    fn print() {
        let hp = HostPort {
            host: "example.org".into(),
            port: Some(5060),
        };

        assert_eq!(hp.to_string(), "example.org:5060");
        assert_eq!(
            HostPort::host_name("example.org").to_string(),
            "example.org"
        );
    }
}
