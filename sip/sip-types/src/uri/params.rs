//! Generic `key=value` parameter lists and their parser.
//!
//! The same scanner handles URI parameters (`;a;b=c`), URI headers
//! (`?a=b&c=d`) and any other delimiter configuration via [`ParamSyntax`].

use crate::parse::{ParseError, is_lws};
use bytes::Bytes;
use bytesstr::BytesStr;
use std::fmt;
use std::marker::PhantomData;

/// Delimiter and policy configuration for [`parse_params`].
#[derive(Debug, Clone, Copy)]
pub struct ParamSyntax {
    /// Required leading delimiter. `None` starts parsing immediately.
    pub start: Option<char>,
    /// Separator between successive parameters.
    pub sep: char,
    /// Terminator which stops the scan without being consumed.
    /// `None` runs to the end of input.
    pub end: Option<char>,
    /// Allow values (never keys) to be wrapped in `"…"`. Quotes are
    /// stripped and `sep`/`end` inside them are literal.
    pub quote_values: bool,
    /// Allow a key to appear without `=value`.
    pub allow_singletons: bool,
}

impl ParamSyntax {
    fn must_quote(&self, value: &str) -> bool {
        if !self.quote_values {
            return false;
        }

        value.chars().any(|c| {
            c == self.sep || Some(c) == self.end || c == '=' || c == '"' || is_lws(c)
        })
    }
}

/// Compile time parameter flavor, selects delimiters and print behavior
/// of a [`Params`] list.
pub trait ParamsSpec {
    const SYNTAX: ParamSyntax;
}

/// URI parameters (`;transport=tcp;lr`), singletons allowed
pub enum UriParamsSpec {}

impl ParamsSpec for UriParamsSpec {
    const SYNTAX: ParamSyntax = ParamSyntax {
        start: Some(';'),
        sep: ';',
        end: Some('?'),
        quote_values: true,
        allow_singletons: true,
    };
}

/// URI headers (`?subject=urgent&priority=high`), singletons forbidden
pub enum HeaderParamsSpec {}

impl ParamsSpec for HeaderParamsSpec {
    const SYNTAX: ParamSyntax = ParamSyntax {
        start: Some('?'),
        sep: '&',
        end: None,
        quote_values: true,
        allow_singletons: false,
    };
}

pub type UriParams = Params<UriParamsSpec>;
pub type HeaderParams = Params<HeaderParamsSpec>;

/// A single parameter `name[=(value|"value")]`.
///
/// `value` is three-valued: `None` means the key appeared without `=`,
/// `Some("")` means `key=` with an empty value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Param {
    pub name: BytesStr,
    pub value: Option<BytesStr>,
}

impl Param {
    #[inline]
    pub fn name<N>(name: N) -> Param
    where
        N: Into<BytesStr>,
    {
        Param {
            name: name.into(),
            value: None,
        }
    }

    #[inline]
    pub fn value<N, V>(name: N, value: V) -> Param
    where
        N: Into<BytesStr>,
        V: Into<BytesStr>,
    {
        Param {
            name: name.into(),
            value: Some(value.into()),
        }
    }

    fn write(&self, f: &mut fmt::Formatter<'_>, syntax: &ParamSyntax) -> fmt::Result {
        match &self.value {
            None => f.write_str(&self.name),
            Some(value) if syntax.must_quote(value) => {
                write!(f, "{}=\"{}\"", self.name, value)
            }
            Some(value) => write!(f, "{}={}", self.name, value),
        }
    }
}

/// A list of parameters with unique keys.
pub struct Params<S> {
    params: Vec<Param>,
    marker: PhantomData<S>,
}

impl<S> Clone for Params<S> {
    fn clone(&self) -> Self {
        Self {
            params: self.params.clone(),
            marker: PhantomData,
        }
    }
}

impl<S> Default for Params<S> {
    fn default() -> Self {
        Params {
            params: Vec::new(),
            marker: PhantomData,
        }
    }
}

impl<S> Params<S> {
    pub fn new() -> Params<S> {
        Params::default()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.params.len()
    }

    #[inline]
    pub fn get<N>(&self, name: N) -> Option<&Param>
    where
        N: AsRef<str>,
    {
        self.params.iter().find(|p| p.name == name.as_ref())
    }

    #[inline]
    pub fn get_val<N>(&self, name: N) -> Option<&BytesStr>
    where
        N: AsRef<str>,
    {
        self.get(name).and_then(|p| p.value.as_ref())
    }

    #[inline]
    pub fn contains<N>(&self, name: N) -> bool
    where
        N: AsRef<str>,
    {
        self.get(name).is_some()
    }

    /// Insert a parameter, replacing the value of an existing key
    pub fn set(&mut self, param: Param) {
        if let Some(existing) = self.params.iter_mut().find(|p| p.name == param.name) {
            existing.value = param.value;
        } else {
            self.params.push(param);
        }
    }

    #[inline]
    pub fn with(mut self, param: Param) -> Self {
        self.set(param);
        self
    }

    /// Remove a parameter by name
    pub fn take<N>(&mut self, name: N) -> Option<Param>
    where
        N: AsRef<str>,
    {
        let pos = self.params.iter().position(|p| p.name == name.as_ref())?;

        Some(self.params.remove(pos))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Param> {
        self.params.iter()
    }
}

impl<S: ParamsSpec> Params<S> {
    /// Parse a parameter list from `i`, which must be a slice of `src`.
    ///
    /// Returns the list and the number of bytes consumed; the flavor's
    /// terminator is never consumed.
    pub fn parse(src: &Bytes, i: &str) -> Result<(Self, usize), ParseError> {
        let (params, consumed) = parse_params(src, i, S::SYNTAX)?;

        Ok((
            Params {
                params,
                marker: PhantomData,
            },
            consumed,
        ))
    }
}

impl<S: ParamsSpec> fmt::Debug for Params<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(&self.params).finish()
    }
}

impl<S: ParamsSpec> fmt::Display for Params<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, param) in self.params.iter().enumerate() {
            let delim = if idx == 0 { S::SYNTAX.start } else { Some(S::SYNTAX.sep) };

            if let Some(delim) = delim {
                write!(f, "{delim}")?;
            }

            param.write(f, &S::SYNTAX)?;
        }

        Ok(())
    }
}

/// Keys are unique, insertion order is irrelevant
impl<S> PartialEq for Params<S> {
    fn eq(&self, other: &Self) -> bool {
        self.params.len() == other.params.len()
            && self
                .params
                .iter()
                .all(|p| other.params.iter().any(|o| o == p))
    }
}

impl<S> Eq for Params<S> {}

// ==== scanner ====

enum State {
    /// waiting for the start delimiter
    Start,
    Key,
    Value,
    /// inside a quoted value
    Quoted,
    /// directly behind the closing quote
    QuotedEnd,
}

/// Which delimiter opened the parameter currently being scanned,
/// used to pick the error kind when its key turns out empty
enum Opened {
    Nothing,
    StartDelim,
    Separator,
}

/// Token accumulator. Stays a slice of the input until whitespace
/// discarding forces an owned buffer.
#[derive(Default)]
struct Token {
    range: Option<(usize, usize)>,
    owned: Option<String>,
}

impl Token {
    fn is_empty(&self) -> bool {
        self.owned.is_none() && self.range.is_none()
    }

    fn push(&mut self, i: &str, idx: usize, c: char) {
        if let Some(owned) = &mut self.owned {
            owned.push(c);
            return;
        }

        match self.range {
            None => self.range = Some((idx, idx + c.len_utf8())),
            Some((start, end)) if end == idx => self.range = Some((start, idx + c.len_utf8())),
            Some((start, end)) => {
                let mut owned = String::with_capacity(end - start + c.len_utf8());
                owned.push_str(&i[start..end]);
                owned.push(c);
                self.owned = Some(owned);
            }
        }
    }

    fn take(&mut self, src: &Bytes, i: &str) -> BytesStr {
        match (self.owned.take(), self.range.take()) {
            (Some(owned), _) => BytesStr::from(owned),
            (None, Some((start, end))) => BytesStr::from_parse(src, &i[start..end]),
            (None, None) => BytesStr::from_static(""),
        }
    }
}

fn set_param(params: &mut Vec<Param>, name: BytesStr, value: Option<BytesStr>) {
    if let Some(existing) = params.iter_mut().find(|p| p.name == name) {
        existing.value = value;
    } else {
        params.push(Param { name, value });
    }
}

/// Single pass scan of a `key=value` list according to `syntax`.
///
/// `i` must be a slice of `src`. Returns the parameters and the number of
/// bytes consumed; a terminator is scanned up to but not across. Unquoted
/// linear whitespace outside of quotes is discarded everywhere.
pub fn parse_params(
    src: &Bytes,
    i: &str,
    syntax: ParamSyntax,
) -> Result<(Vec<Param>, usize), ParseError> {
    let ctx = || BytesStr::from_parse(src, i);

    let mut params = Vec::new();
    let mut key = Token::default();
    let mut value = Token::default();

    let mut state = match syntax.start {
        Some(_) => State::Start,
        None => State::Key,
    };
    let mut opened = Opened::Nothing;

    for (idx, c) in i.char_indices() {
        match state {
            State::Start => {
                if Some(c) == syntax.start {
                    state = State::Key;
                    opened = Opened::StartDelim;
                } else if is_lws(c) {
                    continue;
                } else {
                    return Err(ParseError::ExpectedStart {
                        // checked above, the state requires a start delimiter
                        expected: syntax.start.unwrap_or_default(),
                        input: ctx(),
                    });
                }
            }
            State::Key => {
                if Some(c) == syntax.end {
                    flush_trailing_key(&mut params, &mut key, &syntax, &opened, src, i)?;
                    return Ok((params, idx));
                } else if c == syntax.sep {
                    if key.is_empty() {
                        return Err(ParseError::UnexpectedSeparator(ctx()));
                    }
                    flush_key(&mut params, &mut key, &syntax, src, i)?;
                    opened = Opened::Separator;
                } else if c == '=' {
                    if key.is_empty() {
                        return Err(ParseError::EmptyKey(ctx()));
                    }
                    state = State::Value;
                } else if c == '"' && syntax.quote_values {
                    // quotes may only wrap values
                    return Err(ParseError::BadQuote(ctx()));
                } else if is_lws(c) {
                    continue;
                } else {
                    key.push(i, idx, c);
                }
            }
            State::Value => {
                if Some(c) == syntax.end {
                    let name = key.take(src, i);
                    set_param(&mut params, name, Some(value.take(src, i)));
                    return Ok((params, idx));
                } else if c == syntax.sep {
                    let name = key.take(src, i);
                    set_param(&mut params, name, Some(value.take(src, i)));
                    state = State::Key;
                    opened = Opened::Separator;
                } else if c == '=' {
                    return Err(ParseError::UnexpectedEquals(ctx()));
                } else if c == '"' && syntax.quote_values {
                    if !value.is_empty() {
                        return Err(ParseError::BadQuote(ctx()));
                    }
                    state = State::Quoted;
                } else if is_lws(c) {
                    continue;
                } else {
                    value.push(i, idx, c);
                }
            }
            State::Quoted => {
                if c == '"' {
                    state = State::QuotedEnd;
                } else {
                    value.push(i, idx, c);
                }
            }
            State::QuotedEnd => {
                // a closing quote is only valid directly before a
                // separator, the terminator or the end of input
                if Some(c) == syntax.end {
                    let name = key.take(src, i);
                    set_param(&mut params, name, Some(value.take(src, i)));
                    return Ok((params, idx));
                } else if c == syntax.sep {
                    let name = key.take(src, i);
                    set_param(&mut params, name, Some(value.take(src, i)));
                    state = State::Key;
                    opened = Opened::Separator;
                } else {
                    return Err(ParseError::BadQuote(ctx()));
                }
            }
        }
    }

    match state {
        State::Start => {}
        State::Key => flush_trailing_key(&mut params, &mut key, &syntax, &opened, src, i)?,
        State::Value | State::QuotedEnd => {
            let name = key.take(src, i);
            set_param(&mut params, name, Some(value.take(src, i)));
        }
        State::Quoted => return Err(ParseError::UnclosedQuote(ctx())),
    }

    Ok((params, i.len()))
}

fn flush_key(
    params: &mut Vec<Param>,
    key: &mut Token,
    syntax: &ParamSyntax,
    src: &Bytes,
    i: &str,
) -> Result<(), ParseError> {
    let name = key.take(src, i);

    if !syntax.allow_singletons {
        return Err(ParseError::SingletonForbidden(name));
    }

    set_param(params, name, None);

    Ok(())
}

/// Flush a pending key at the terminator or the end of input. An empty key
/// is only legal when no delimiter promised another parameter.
fn flush_trailing_key(
    params: &mut Vec<Param>,
    key: &mut Token,
    syntax: &ParamSyntax,
    opened: &Opened,
    src: &Bytes,
    i: &str,
) -> Result<(), ParseError> {
    if key.is_empty() {
        return match opened {
            Opened::Nothing => Ok(()),
            Opened::StartDelim => Err(ParseError::EmptyKey(BytesStr::from_parse(src, i))),
            Opened::Separator => Err(ParseError::UnexpectedSeparator(BytesStr::from_parse(src, i))),
        };
    }

    flush_key(params, key, syntax, src, i)
}

#[cfg(test)]
mod test {
    use super::*;

    fn uri_params(i: &'static str) -> Result<(UriParams, usize), ParseError> {
        let src = BytesStr::from_static(i);
        UriParams::parse(src.as_ref(), &src)
    }

    fn headers(i: &'static str) -> Result<(HeaderParams, usize), ParseError> {
        let src = BytesStr::from_static(i);
        HeaderParams::parse(src.as_ref(), &src)
    }

    #[test]
    fn singleton_and_value() {
        let (params, consumed) = uri_params(";some_single_key;some_key=with_value").unwrap();

        assert_eq!(consumed, 36);
        assert_eq!(params.get("some_single_key").unwrap().value, None);
        assert_eq!(params.get_val("some_key").unwrap(), "with_value");
    }

    #[test]
    fn empty_input() {
        let (params, consumed) = uri_params("").unwrap();
        assert!(params.is_empty());
        assert_eq!(consumed, 0);
    }

    #[test]
    fn absent_and_empty_values_are_distinct() {
        let (params, _) = uri_params(";a;b=;c=\"\"").unwrap();

        assert_eq!(params.get("a").unwrap().value, None);
        assert_eq!(params.get("b").unwrap().value, Some(BytesStr::from_static("")));
        assert_eq!(params.get("c").unwrap().value, Some(BytesStr::from_static("")));
    }

    #[test]
    fn quoted_value_keeps_separator() {
        let src = BytesStr::from_static(";foo=\"bar;baz\";a=b");
        let (params, consumed) = UriParams::parse(src.as_ref(), &src).unwrap();

        assert_eq!(consumed, 18);
        assert_eq!(params.get_val("foo").unwrap(), "bar;baz");
        assert_eq!(params.get_val("a").unwrap(), "b");
    }

    #[test]
    fn terminator_is_not_consumed() {
        let (params, consumed) = uri_params(";a=b?h=v").unwrap();

        assert_eq!(consumed, 4);
        assert_eq!(params.get_val("a").unwrap(), "b");
    }

    #[test]
    fn lws_is_discarded() {
        let (params, _) = uri_params("; foo = bar ;f az=b").unwrap();

        assert_eq!(params.get_val("foo").unwrap(), "bar");
        assert_eq!(params.get_val("faz").unwrap(), "b");
    }

    #[test]
    fn lws_inside_quotes_is_kept() {
        let (params, _) = uri_params(";subject=\"hello world\"").unwrap();

        assert_eq!(params.get_val("subject").unwrap(), "hello world");
    }

    #[test]
    fn headers_forbid_singletons() {
        assert!(matches!(
            headers("?foo"),
            Err(ParseError::SingletonForbidden(_))
        ));
        assert!(matches!(
            headers("?a=b&foo&c=d"),
            Err(ParseError::SingletonForbidden(_))
        ));

        let (params, _) = headers("?a=b&c=d").unwrap();
        assert_eq!(params.get_val("a").unwrap(), "b");
        assert_eq!(params.get_val("c").unwrap(), "d");
    }

    #[test]
    fn custom_syntax_singleton_error() {
        let syntax = ParamSyntax {
            start: Some('$'),
            sep: ',',
            end: None,
            quote_values: false,
            allow_singletons: false,
        };

        let src = BytesStr::from_static("$foo,baz,a=b");
        assert!(matches!(
            parse_params(src.as_ref(), &src, syntax),
            Err(ParseError::SingletonForbidden(_))
        ));
    }

    #[test]
    fn quotes_are_literal_when_quoting_is_off() {
        let syntax = ParamSyntax {
            start: Some('$'),
            sep: ',',
            end: None,
            quote_values: false,
            allow_singletons: true,
        };

        let src = BytesStr::from_static("$a=\"b,c\"");
        let (params, consumed) = parse_params(src.as_ref(), &src, syntax).unwrap();

        assert_eq!(consumed, 8);
        assert_eq!(params[0].name, "a");
        assert_eq!(params[0].value.as_ref().unwrap(), "\"b");
        assert_eq!(params[1].name, "c\"");
        assert_eq!(params[1].value, None);
    }

    #[test]
    fn grammar_violations() {
        assert!(matches!(uri_params(";=bar"), Err(ParseError::EmptyKey(_))));
        assert!(matches!(uri_params(";"), Err(ParseError::EmptyKey(_))));
        assert!(matches!(
            uri_params(";;"),
            Err(ParseError::UnexpectedSeparator(_))
        ));
        assert!(matches!(
            uri_params(";foo;"),
            Err(ParseError::UnexpectedSeparator(_))
        ));
        assert!(matches!(
            uri_params(";a=b=c"),
            Err(ParseError::UnexpectedEquals(_))
        ));
        assert!(matches!(
            uri_params("foo=bar"),
            Err(ParseError::ExpectedStart { expected: ';', .. })
        ));
    }

    #[test]
    fn quote_violations() {
        // quote after the value already started
        assert!(matches!(uri_params(";a=b\"c\""), Err(ParseError::BadQuote(_))));
        // closing quote must be directly before sep, end or eof
        assert!(matches!(uri_params(";a=\"b\"c"), Err(ParseError::BadQuote(_))));
        // quotes never wrap keys
        assert!(matches!(uri_params(";\"a\"=b"), Err(ParseError::BadQuote(_))));
        assert!(matches!(
            uri_params(";a=\"bc"),
            Err(ParseError::UnclosedQuote(_))
        ));
    }

    #[test]
    fn duplicate_keys_are_replaced() {
        let (params, _) = uri_params(";a=1;a=2").unwrap();

        assert_eq!(params.len(), 1);
        assert_eq!(params.get_val("a").unwrap(), "2");
    }

    #[test]
    fn equality_ignores_order() {
        let (a, _) = uri_params(";x=1;y").unwrap();
        let (b, _) = uri_params(";y;x=1").unwrap();
        let (c, _) = uri_params(";y;x=2").unwrap();

        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn print_quotes_when_needed() {
        let params = UriParams::new()
            .with(Param::name("lr"))
            .with(Param::value("subject", "a;b"))
            .with(Param::value("plain", "x"));

        let printed = params.to_string();
        assert_eq!(printed, ";lr;subject=\"a;b\";plain=x");

        let src = BytesStr::from(printed);
        let (reparsed, _) = UriParams::parse(src.as_ref(), &src).unwrap();
        assert_eq!(reparsed, params);
    }

    #[test]
    fn set_take_api() {
        let mut params = UriParams::new();
        params.set(Param::value("transport", "udp"));
        params.set(Param::value("transport", "tcp"));

        assert_eq!(params.len(), 1);
        assert_eq!(params.get_val("transport").unwrap(), "tcp");

        let taken = params.take("transport").unwrap();
        assert_eq!(taken.value.unwrap(), "tcp");
        assert!(params.is_empty());
    }
}
