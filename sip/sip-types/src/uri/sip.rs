use crate::host::HostPort;
use crate::parse::ParseError;
use crate::uri::params::{HeaderParams, Param, UriParams};
use bytes::Bytes;
use bytesstr::BytesStr;
use memchr::{memchr, memchr2};
use std::fmt;
use std::str::FromStr;

/// The user-info part of a [`SipUri`].
///
/// A password can only exist together with a user, a present but empty
/// user (`sip:@example.org`) is distinct from no user at all.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserInfo {
    None,
    User(BytesStr),
    UserPassword(BytesStr, BytesStr),
}

impl UserInfo {
    pub fn user(&self) -> Option<&BytesStr> {
        match self {
            UserInfo::None => None,
            UserInfo::User(user) => Some(user),
            UserInfo::UserPassword(user, _) => Some(user),
        }
    }

    pub fn password(&self) -> Option<&BytesStr> {
        match self {
            UserInfo::UserPassword(_, password) => Some(password),
            _ => None,
        }
    }
}

/// A `sip:` or `sips:` URI
#[derive(Clone, PartialEq, Eq)]
pub struct SipUri {
    /// `sips:` scheme
    pub sips: bool,

    pub user_info: UserInfo,
    pub host_port: HostPort,

    pub uri_params: UriParams,
    pub headers: HeaderParams,
}

impl SipUri {
    pub fn new(host_port: HostPort) -> Self {
        SipUri {
            sips: false,
            user_info: UserInfo::None,
            host_port,
            uri_params: UriParams::new(),
            headers: HeaderParams::new(),
        }
    }

    pub fn sips(mut self, sips: bool) -> Self {
        self.sips = sips;
        self
    }

    pub fn set_user(&mut self, user: BytesStr) {
        match &mut self.user_info {
            UserInfo::None => self.user_info = UserInfo::User(user),
            UserInfo::User(old) => *old = user,
            UserInfo::UserPassword(old, _) => *old = user,
        }
    }

    pub fn with_user(mut self, user: BytesStr) -> Self {
        self.set_user(user);
        self
    }

    pub fn with_uri_param(mut self, param: Param) -> Self {
        self.uri_params.set(param);
        self
    }

    pub fn with_header(mut self, param: Param) -> Self {
        self.headers.set(param);
        self
    }

    /// URI comparison disregarding parameters and headers
    pub fn compare(&self, other: &Self) -> bool {
        self.sips == other.sips
            && self.user_info == other.user_info
            && self.host_port == other.host_port
    }

    /// Parse a SIP URI from `i`, which must be a slice of `src`
    pub fn parse(src: &Bytes, i: &str) -> Result<Self, ParseError> {
        let (sips, rest) = parse_scheme(src, i)?;

        // The user-info only exists if an `@` shows up before the
        // uri-params and headers sections.
        let (user_info, rest) = parse_user_info(src, rest);

        // Host and port run up to the first `;` or `?`, whichever comes first
        let host_end = memchr2(b';', b'?', rest.as_bytes()).unwrap_or(rest.len());
        let host_port = HostPort::parse(src, &rest[..host_end])?;

        if host_port.host.is_empty() {
            return Err(ParseError::MissingHost(BytesStr::from_parse(src, i)));
        }

        let mut rest = &rest[host_end..];

        let uri_params = if rest.starts_with(';') {
            let (uri_params, consumed) = UriParams::parse(src, rest)?;
            rest = &rest[consumed..];
            uri_params
        } else {
            UriParams::new()
        };

        let (headers, consumed) = HeaderParams::parse(src, rest)?;
        rest = &rest[consumed..];

        if !rest.is_empty() {
            return Err(ParseError::TrailingInput(BytesStr::from_parse(src, rest)));
        }

        Ok(SipUri {
            sips,
            user_info,
            host_port,
            uri_params,
            headers,
        })
    }
}

fn parse_scheme<'i>(src: &Bytes, i: &'i str) -> Result<(bool, &'i str), ParseError> {
    if i.len() >= 4 && i[..4].eq_ignore_ascii_case("sip:") {
        return Ok((false, &i[4..]));
    }

    if i.len() >= 5 && i[..5].eq_ignore_ascii_case("sips:") {
        return Ok((true, &i[5..]));
    }

    match memchr(b':', i.as_bytes()) {
        Some(colon) => Err(ParseError::UnknownScheme(BytesStr::from_parse(
            src,
            &i[..colon],
        ))),
        None => Err(ParseError::MissingColon(BytesStr::from_parse(src, i))),
    }
}

fn parse_user_info<'i>(src: &Bytes, i: &'i str) -> (UserInfo, &'i str) {
    let section_end = memchr2(b';', b'?', i.as_bytes()).unwrap_or(i.len());

    let Some(at) = memchr(b'@', &i.as_bytes()[..section_end]) else {
        return (UserInfo::None, i);
    };

    let user_info = &i[..at];
    let rest = &i[at + 1..];

    // only the first `:` inside the user-info splits user and password
    match memchr(b':', user_info.as_bytes()) {
        Some(colon) => (
            UserInfo::UserPassword(
                BytesStr::from_parse(src, &user_info[..colon]),
                BytesStr::from_parse(src, &user_info[colon + 1..]),
            ),
            rest,
        ),
        None => (UserInfo::User(BytesStr::from_parse(src, user_info)), rest),
    }
}

impl FromStr for SipUri {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let src = BytesStr::from(s);
        Self::parse(src.as_ref(), &src)
    }
}

impl fmt::Debug for SipUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl fmt::Display for SipUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.sips {
            f.write_str("sips:")?;
        } else {
            f.write_str("sip:")?;
        }

        match &self.user_info {
            UserInfo::None => {}
            UserInfo::User(user) => write!(f, "{user}@")?,
            UserInfo::UserPassword(user, password) => write!(f, "{user}:{password}@")?,
        }

        write!(f, "{}{}{}", self.host_port, self.uri_params, self.headers)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn parse(i: &'static str) -> SipUri {
        SipUri::from_str(i).unwrap()
    }

    #[test]
    fn host_only() {
        let uri = parse("sip:example.com");

        assert!(!uri.sips);
        assert_eq!(uri.user_info, UserInfo::None);
        assert_eq!(uri.host_port.host, "example.com");
        assert_eq!(uri.host_port.port, None);
        assert!(uri.uri_params.is_empty());
        assert!(uri.headers.is_empty());
    }

    #[test]
    fn user_and_host() {
        let uri = parse("sip:bob@example.com");

        assert_eq!(uri.user_info.user().unwrap(), "bob");
        assert_eq!(uri.user_info.password(), None);
        assert_eq!(uri.host_port.host, "example.com");
    }

    #[test]
    fn sips_with_password_and_port() {
        let uri = parse("sips:bob:Hunter2@example.com:5060");

        assert!(uri.sips);
        assert_eq!(uri.user_info.user().unwrap(), "bob");
        assert_eq!(uri.user_info.password().unwrap(), "Hunter2");
        assert_eq!(uri.host_port.host, "example.com");
        assert_eq!(uri.host_port.port, Some(5060));
    }

    #[test]
    fn scheme_is_case_insensitive() {
        assert!(!parse("SIP:example.com").sips);
        assert!(parse("SIPS:example.com").sips);
    }

    #[test]
    fn params_and_headers() {
        let uri = parse("sip:bob@example.com:5;foo;baz=bar?foo=bar");

        assert_eq!(uri.host_port.port, Some(5));
        assert_eq!(uri.uri_params.get("foo").unwrap().value, None);
        assert_eq!(uri.uri_params.get_val("baz").unwrap(), "bar");
        assert_eq!(uri.headers.get_val("foo").unwrap(), "bar");
    }

    #[test]
    fn headers_without_params() {
        let uri = parse("sip:example.com?subject=urgent");

        assert!(uri.uri_params.is_empty());
        assert_eq!(uri.headers.get_val("subject").unwrap(), "urgent");
    }

    #[test]
    fn header_singletons_are_rejected() {
        assert!(matches!(
            SipUri::from_str("sip:bob@example.com:5?foo"),
            Err(ParseError::SingletonForbidden(_))
        ));
    }

    #[test]
    fn empty_user_and_password_are_present() {
        let uri = parse("sip:@example.com");
        assert_eq!(uri.user_info, UserInfo::User(BytesStr::from_static("")));

        let uri = parse("sip:bob:@example.com");
        assert_eq!(uri.user_info.password().unwrap(), "");
    }

    #[test]
    fn colon_after_at_is_the_port() {
        let uri = parse("sip:bob@example.com:5060");

        assert_eq!(uri.user_info, UserInfo::User(BytesStr::from_static("bob")));
        assert_eq!(uri.host_port.port, Some(5060));
    }

    #[test]
    fn at_in_headers_is_no_user_info() {
        let uri = parse("sip:example.com?reply=bob@example.org");

        assert_eq!(uri.user_info, UserInfo::None);
        assert_eq!(uri.headers.get_val("reply").unwrap(), "bob@example.org");
    }

    #[test]
    fn missing_host() {
        assert!(matches!(
            SipUri::from_str("sip:"),
            Err(ParseError::MissingHost(_))
        ));
        assert!(matches!(
            SipUri::from_str("sip:bob@"),
            Err(ParseError::MissingHost(_))
        ));
        assert!(matches!(
            SipUri::from_str("sip:;lr"),
            Err(ParseError::MissingHost(_))
        ));
    }

    #[test]
    fn scheme_errors() {
        assert!(matches!(
            SipUri::from_str("http://example.com"),
            Err(ParseError::UnknownScheme(_))
        ));
        assert!(matches!(
            SipUri::from_str("example.com"),
            Err(ParseError::MissingColon(_))
        ));
    }

    #[test]
    fn bad_port() {
        assert!(matches!(
            SipUri::from_str("sip:example.com:port"),
            Err(ParseError::BadPort(_))
        ));
        assert!(matches!(
            SipUri::from_str("sip:example.com:70000"),
            Err(ParseError::BadPort(_))
        ));
    }

    #[track_caller]
    fn assert_round_trip(i: &'static str) {
        let uri = parse(i);
        let printed = uri.to_string();
        let reparsed = SipUri::from_str(&printed).unwrap();

        assert_eq!(uri, reparsed, "{i:?} did not round trip via {printed:?}");
    }

    #[test]
    fn round_trip() {
        assert_round_trip("sip:example.com");
        assert_round_trip("sips:bob:Hunter2@example.com:5060");
        assert_round_trip("sip:bob@example.com;transport=tcp;lr");
        assert_round_trip("sip:bob@example.com:5;foo;baz=bar?foo=bar");
        assert_round_trip("sip:bob@example.com;foo=\"bar;baz\"");
        assert_round_trip("sip:bob@example.com;empty=");
        assert_round_trip("sip:@example.com");
        assert_round_trip("sip:bob:@example.com?a=b&c=d");
    }

    #[test]
    fn print_canonical() {
        let uri = SipUri::new(HostPort {
            host: "example.com".into(),
            port: Some(5061),
        })
        .sips(true)
        .with_user("alice".into())
        .with_uri_param(Param::value("transport", "tls"))
        .with_uri_param(Param::name("lr"))
        .with_header(Param::value("subject", "call"));

        assert_eq!(
            uri.to_string(),
            "sips:alice@example.com:5061;transport=tls;lr?subject=call"
        );
    }

    #[test]
    fn compare_ignores_params() {
        let a = parse("sip:bob@example.com;transport=tcp");
        let b = parse("sip:bob@example.com;transport=udp?x=y");

        assert!(a.compare(&b));
        assert_ne!(a, b);
    }
}
