use std::mem;

use bytes::BytesMut;
use thiserror::Error;
use tracing::{debug, trace};

use crate::http::chunked::{ChunkedDecoder, Decode};
use crate::http::request::{Method, Request, Version, keep_alive_for};

/// Methods whose requests may carry a body.
///
/// `Content-Length` and `Transfer-Encoding` are only consulted for these
/// methods. Every other request is bodiless regardless of its headers.
pub const BODY_METHODS: [Method; 3] = [Method::POST, Method::PUT, Method::DELETE];

/// Grammar violations and limit breaches found while parsing a request.
///
/// Every variant is terminal for the message; the connection is expected to
/// be dropped without a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("invalid method token")]
    InvalidMethod,
    #[error("invalid request target")]
    InvalidUrl,
    #[error("invalid protocol version")]
    InvalidVersion,
    #[error("invalid header line")]
    InvalidHeader,
    #[error("invalid Content-Length")]
    InvalidContentLength,
    #[error("invalid chunked encoding")]
    InvalidChunk,
    #[error("request head exceeds the configured limit")]
    HeaderTooLarge,
    #[error("request body exceeds the configured limit")]
    BodyTooLarge,
}

impl ParseError {
    /// True for grammar violations, false for limit breaches.
    pub fn is_malformed(&self) -> bool {
        !matches!(self, ParseError::HeaderTooLarge | ParseError::BodyTooLarge)
    }
}

/// Progress reported by [`RequestParser::feed`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// All input was consumed; the message is not finished.
    NeedMoreData,
    /// The message finished after `consumed` bytes of the last input.
    Complete { consumed: usize },
}

/// Lifecycle of the message currently held by a parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    InProgress,
    Complete,
    Failed(ParseError),
}

/// Size limits applied while parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParserLimits {
    /// Maximum bytes in the request line plus header block.
    pub max_head_size: usize,
    /// Maximum bytes of decoded body.
    pub max_body_size: usize,
}

impl Default for ParserLimits {
    fn default() -> Self {
        Self {
            max_head_size: 64 * 1024,
            max_body_size: 16 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    MethodStart,
    Method,
    UrlStart,
    Url,
    // index into "HTTP/"
    VersionLiteral(usize),
    MajorStart,
    Major,
    MinorStart,
    Minor,
    VersionLf,
    HeaderLineStart,
    HeaderName,
    HeaderValueStart,
    HeaderValue,
    HeaderFold,
    HeaderLf,
    HeadEndLf,
    Body { remaining: usize },
    Chunked,
    Done,
}

const VERSION_PREFIX: &[u8] = b"HTTP/";

/// Incremental HTTP/1.x request parser.
///
/// Bytes may arrive in fragments of any size, down to a single byte; the
/// resulting request does not depend on how the input was split. One parser
/// serves a whole keep-alive connection: call [`clear`](Self::clear) after a
/// message completes to start on the next one.
#[derive(Debug)]
pub struct RequestParser {
    limits: ParserLimits,
    state: State,
    phase: Phase,
    head_size: usize,

    method: Vec<u8>,
    url: Vec<u8>,
    version: Version,
    header_name: Vec<u8>,
    header_value: Vec<u8>,
    body: BytesMut,
    chunked: ChunkedDecoder,

    request: Request,
}

impl Default for RequestParser {
    fn default() -> Self {
        Self::new(ParserLimits::default())
    }
}

impl RequestParser {
    pub fn new(limits: ParserLimits) -> Self {
        Self {
            limits,
            state: State::MethodStart,
            phase: Phase::Idle,
            head_size: 0,

            method: Vec::new(),
            url: Vec::new(),
            version: Version::new(0, 0),
            header_name: Vec::new(),
            header_value: Vec::new(),
            body: BytesMut::new(),
            chunked: ChunkedDecoder::new(),

            request: Request::default(),
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// The parsed request, available once the message is complete.
    pub fn request(&self) -> Option<&Request> {
        match self.phase {
            Phase::Complete => Some(&self.request),
            _ => None,
        }
    }

    /// Resets the parser for the next message on the same connection.
    pub fn clear(&mut self) {
        self.state = State::MethodStart;
        self.phase = Phase::Idle;
        self.head_size = 0;

        self.method.clear();
        self.url.clear();
        self.version = Version::new(0, 0);
        self.header_name.clear();
        self.header_value.clear();
        self.body.clear();
        self.chunked.reset();

        self.request.headers.clear();
        self.request.body.clear();
        self.request.url.clear();
        self.request.method_token.clear();
        self.request.keep_alive = false;
    }

    /// Consumes bytes into the parser.
    ///
    /// A terminal parser consumes nothing and reports its terminal result
    /// again until it is cleared.
    pub fn feed(&mut self, data: &[u8]) -> Result<Status, ParseError> {
        match self.phase {
            Phase::Complete => return Ok(Status::Complete { consumed: 0 }),
            Phase::Failed(error) => return Err(error),
            Phase::Idle if data.is_empty() => return Ok(Status::NeedMoreData),
            Phase::Idle | Phase::InProgress => {}
        }

        self.phase = Phase::InProgress;

        match self.advance(data) {
            Ok(Some(consumed)) => {
                self.finish();
                Ok(Status::Complete { consumed })
            }
            Ok(None) => Ok(Status::NeedMoreData),
            Err(error) => {
                debug!(%error, "rejecting request");
                self.phase = Phase::Failed(error);
                Err(error)
            }
        }
    }

    /// Runs the state machine over `data`, returning the consumed length if
    /// the message completed.
    fn advance(&mut self, data: &[u8]) -> Result<Option<usize>, ParseError> {
        let mut i = 0;

        while i < data.len() {
            match self.state {
                State::Body { remaining } => {
                    let take = remaining.min(data.len() - i);
                    self.body.extend_from_slice(&data[i..i + take]);
                    i += take;

                    if remaining == take {
                        self.state = State::Done;
                        return Ok(Some(i));
                    }
                    self.state = State::Body {
                        remaining: remaining - take,
                    };
                    continue;
                }
                State::Chunked => {
                    let max_body = self.limits.max_body_size;
                    return match self.chunked.feed(&data[i..], &mut self.body, max_body)? {
                        Decode::NeedMoreData => Ok(None),
                        Decode::Complete { consumed } => {
                            self.state = State::Done;
                            Ok(Some(i + consumed))
                        }
                    };
                }
                _ => {}
            }

            let byte = data[i];
            i += 1;

            self.head_size += 1;
            if self.head_size > self.limits.max_head_size {
                return Err(ParseError::HeaderTooLarge);
            }

            if self.step(byte)? {
                return Ok(Some(i));
            }
        }

        Ok(None)
    }

    /// Handles one byte of the request line or header block.
    ///
    /// Returns true when the message is complete.
    fn step(&mut self, byte: u8) -> Result<bool, ParseError> {
        match self.state {
            State::MethodStart => {
                if !is_token(byte) {
                    return Err(ParseError::InvalidMethod);
                }
                self.method.push(byte);
                self.state = State::Method;
            }
            State::Method => match byte {
                b' ' => self.state = State::UrlStart,
                b if is_token(b) => self.method.push(b),
                _ => return Err(ParseError::InvalidMethod),
            },
            State::UrlStart => {
                if byte == b' ' || is_control(byte) {
                    return Err(ParseError::InvalidUrl);
                }
                self.url.push(byte);
                self.state = State::Url;
            }
            State::Url => match byte {
                b' ' => self.state = State::VersionLiteral(0),
                b'\r' => {
                    // No version: an HTTP/0.9 simple request, which has
                    // neither headers nor body.
                    self.version = Version::HTTP_09;
                    self.state = State::Done;
                    return Ok(true);
                }
                b if is_control(b) => return Err(ParseError::InvalidUrl),
                b => self.url.push(b),
            },
            State::VersionLiteral(index) => {
                if byte != VERSION_PREFIX[index] {
                    return Err(ParseError::InvalidVersion);
                }
                self.state = if index + 1 == VERSION_PREFIX.len() {
                    State::MajorStart
                } else {
                    State::VersionLiteral(index + 1)
                };
            }
            State::MajorStart => {
                self.version.major = digit(byte)?;
                self.state = State::Major;
            }
            State::Major => match byte {
                b'.' => self.state = State::MinorStart,
                b => self.version.major = push_digit(self.version.major, b)?,
            },
            State::MinorStart => {
                self.version.minor = digit(byte)?;
                self.state = State::Minor;
            }
            State::Minor => match byte {
                b'\r' => self.state = State::VersionLf,
                b => self.version.minor = push_digit(self.version.minor, b)?,
            },
            State::VersionLf => match byte {
                b'\n' => self.state = State::HeaderLineStart,
                _ => return Err(ParseError::InvalidVersion),
            },
            State::HeaderLineStart => match byte {
                b'\r' => {
                    self.commit_header();
                    self.state = State::HeadEndLf;
                }
                b' ' | b'\t' if !self.header_name.is_empty() => self.state = State::HeaderFold,
                b if is_token(b) => {
                    self.commit_header();
                    self.header_name.push(b);
                    self.state = State::HeaderName;
                }
                _ => return Err(ParseError::InvalidHeader),
            },
            State::HeaderName => match byte {
                b':' => self.state = State::HeaderValueStart,
                b if is_token(b) => self.header_name.push(b),
                _ => return Err(ParseError::InvalidHeader),
            },
            State::HeaderValueStart => match byte {
                b' ' | b'\t' => {}
                b'\r' => self.state = State::HeaderLf,
                b if is_control(b) => return Err(ParseError::InvalidHeader),
                b => {
                    self.header_value.push(b);
                    self.state = State::HeaderValue;
                }
            },
            State::HeaderValue => match byte {
                b'\r' => self.state = State::HeaderLf,
                b'\t' => self.header_value.push(b'\t'),
                b if is_control(b) => return Err(ParseError::InvalidHeader),
                b => self.header_value.push(b),
            },
            State::HeaderFold => match byte {
                b' ' | b'\t' => {}
                b'\r' => self.state = State::HeaderLf,
                b if is_control(b) => return Err(ParseError::InvalidHeader),
                b => {
                    trim_trailing_whitespace(&mut self.header_value);
                    if !self.header_value.is_empty() {
                        self.header_value.push(b' ');
                    }
                    self.header_value.push(b);
                    self.state = State::HeaderValue;
                }
            },
            State::HeaderLf => match byte {
                b'\n' => self.state = State::HeaderLineStart,
                _ => return Err(ParseError::InvalidHeader),
            },
            State::HeadEndLf => match byte {
                b'\n' => return self.begin_body(),
                _ => return Err(ParseError::InvalidHeader),
            },
            State::Body { .. } | State::Chunked | State::Done => {
                // Body bytes never reach the head state machine.
                return Err(ParseError::InvalidHeader);
            }
        }

        Ok(false)
    }

    /// Moves the pending header into the table; later duplicates replace it.
    fn commit_header(&mut self) {
        if self.header_name.is_empty() {
            return;
        }

        trim_trailing_whitespace(&mut self.header_value);
        let name = String::from_utf8_lossy(&self.header_name).into_owned();
        let value = String::from_utf8_lossy(&self.header_value).into_owned();
        trace!(%name, %value, "header");

        self.request.headers.insert(name, value);
        self.header_name.clear();
        self.header_value.clear();
    }

    /// Decides how the body is framed once the header block has ended.
    ///
    /// Returns true if the message has no body and is therefore complete.
    fn begin_body(&mut self) -> Result<bool, ParseError> {
        self.request.keep_alive = keep_alive_for(self.version, &self.request.headers);

        let method = Method::from_token(&self.method);
        if !BODY_METHODS.contains(&method) {
            self.state = State::Done;
            return Ok(true);
        }

        let chunked = self
            .request
            .headers
            .get("Transfer-Encoding")
            .is_some_and(|value| value.trim().eq_ignore_ascii_case("chunked"));
        if chunked {
            self.state = State::Chunked;
            return Ok(false);
        }

        let length = match self.request.headers.get("Content-Length") {
            Some(value) => parse_content_length(value)?,
            None => 0,
        };
        if length == 0 {
            self.state = State::Done;
            return Ok(true);
        }

        if length > self.limits.max_body_size as u64 {
            return Err(ParseError::BodyTooLarge);
        }
        let remaining = length as usize;
        self.body.reserve(remaining);
        self.state = State::Body { remaining };

        Ok(false)
    }

    fn finish(&mut self) {
        self.phase = Phase::Complete;

        self.request.method = Method::from_token(&self.method);
        self.request.method_token = String::from_utf8_lossy(&self.method).into_owned();
        self.request.url = String::from_utf8_lossy(&self.url).into_owned();
        self.request.version = self.version;
        self.request.body = mem::take(&mut self.body).freeze();

        if self.version == Version::HTTP_09 {
            self.request.keep_alive = false;
        }

        debug!(
            method = %self.request.method_token,
            url = %self.request.url,
            version = %self.request.version,
            body = self.request.body.len(),
            "request complete"
        );
    }
}

fn parse_content_length(value: &str) -> Result<u64, ParseError> {
    let value = value.trim();
    if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ParseError::InvalidContentLength);
    }
    value.parse().map_err(|_| ParseError::InvalidContentLength)
}

fn digit(byte: u8) -> Result<u8, ParseError> {
    if byte.is_ascii_digit() {
        Ok(byte - b'0')
    } else {
        Err(ParseError::InvalidVersion)
    }
}

fn push_digit(value: u8, byte: u8) -> Result<u8, ParseError> {
    value
        .checked_mul(10)
        .and_then(|v| v.checked_add(digit(byte).ok()?))
        .ok_or(ParseError::InvalidVersion)
}

fn trim_trailing_whitespace(value: &mut Vec<u8>) {
    while matches!(value.last(), Some(b' ' | b'\t')) {
        value.pop();
    }
}

/// Control bytes: 0-31 and DEL.
pub(crate) fn is_control(byte: u8) -> bool {
    byte < 32 || byte == 127
}

fn is_special(byte: u8) -> bool {
    matches!(
        byte,
        b'(' | b')'
            | b'<'
            | b'>'
            | b'@'
            | b','
            | b';'
            | b':'
            | b'\\'
            | b'"'
            | b'/'
            | b'['
            | b']'
            | b'?'
            | b'='
            | b'{'
            | b'}'
            | b' '
            | b'\t'
    )
}

/// Bytes allowed in method tokens and header names.
pub(crate) fn is_token(byte: u8) -> bool {
    byte.is_ascii() && !is_control(byte) && !is_special(byte)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(input: &[u8]) -> Result<(Request, usize), ParseError> {
        let mut parser = RequestParser::default();
        match parser.feed(input)? {
            Status::Complete { consumed } => Ok((parser.request().cloned().unwrap(), consumed)),
            Status::NeedMoreData => panic!("request incomplete"),
        }
    }

    #[test]
    fn parse_simple_get() {
        let req = b"GET / HTTP/1.1\r\nHost: example.com\r\n\r\n";

        let (parsed, consumed) = parse(req).unwrap();

        assert_eq!(parsed.url, "/");
        assert_eq!(parsed.header("Host"), Some("example.com"));
        assert_eq!(consumed, req.len());
    }

    #[test]
    fn last_header_is_committed_at_blank_line() {
        let (parsed, _) = parse(b"GET / HTTP/1.1\r\nA: 1\r\nB: 2\r\n\r\n").unwrap();

        assert_eq!(parsed.headers.len(), 2);
        assert_eq!(parsed.header("b"), Some("2"));
    }

    #[test]
    fn continuation_line_extends_previous_value() {
        let (parsed, _) = parse(b"GET / HTTP/1.1\r\nX-Long: one\r\n  two\r\n\tthree\r\n\r\n").unwrap();

        assert_eq!(parsed.header("x-long"), Some("one two three"));
        assert_eq!(parsed.headers.len(), 1);
    }

    #[test]
    fn continuation_before_any_header_is_rejected() {
        let mut parser = RequestParser::default();
        let result = parser.feed(b"GET / HTTP/1.1\r\n folded\r\n\r\n");

        assert_eq!(result, Err(ParseError::InvalidHeader));
    }

    #[test]
    fn value_whitespace_is_trimmed() {
        let (parsed, _) = parse(b"GET / HTTP/1.1\r\nHost:   x  \r\nEmpty:\r\n\r\n").unwrap();

        assert_eq!(parsed.header("host"), Some("x"));
        assert_eq!(parsed.header("empty"), Some(""));
    }

    #[test]
    fn http_09_completes_at_carriage_return() {
        let (parsed, consumed) = parse(b"GET /index.html\r\n").unwrap();

        assert_eq!(parsed.version, Version::HTTP_09);
        assert_eq!(parsed.url, "/index.html");
        assert!(parsed.headers.is_empty());
        assert!(!parsed.keep_alive);
        assert_eq!(consumed, 16);
    }

    #[test]
    fn multi_digit_version() {
        let (parsed, _) = parse(b"GET / HTTP/10.23\r\n\r\n").unwrap();
        assert_eq!(parsed.version, Version::new(10, 23));
        assert!(parsed.keep_alive);
    }

    #[test]
    fn version_errors() {
        for input in [
            &b"GET / HTTX/1.1\r\n\r\n"[..],
            b"GET / HTTP/.1\r\n\r\n",
            b"GET / HTTP/1.\r\n\r\n",
            b"GET / HTTP/1.1\r\r\n",
            b"GET / HTTP/1x1\r\n\r\n",
            b"GET / HTTP/999.1\r\n\r\n",
        ] {
            let mut parser = RequestParser::default();
            assert_eq!(parser.feed(input), Err(ParseError::InvalidVersion), "{input:?}");
        }
    }

    #[test]
    fn bare_line_feed_is_rejected() {
        let mut parser = RequestParser::default();
        let result = parser.feed(b"GET / HTTP/1.1\r\nHost: x\n\r\n");

        assert_eq!(result, Err(ParseError::InvalidHeader));
    }

    #[test]
    fn content_length_ignored_for_get() {
        let req = b"GET / HTTP/1.1\r\nContent-Length: 5\r\n\r\nhello";
        let (parsed, consumed) = parse(req).unwrap();

        assert!(parsed.body.is_empty());
        assert_eq!(consumed, req.len() - 5);
    }

    #[test]
    fn delete_reads_body() {
        let (parsed, _) = parse(b"DELETE /x HTTP/1.1\r\nContent-Length: 3\r\n\r\n{ }").unwrap();
        assert_eq!(&parsed.body[..], b"{ }");
    }

    #[test]
    fn invalid_content_length() {
        let mut parser = RequestParser::default();
        let result = parser.feed(b"POST / HTTP/1.1\r\nContent-Length: 1x\r\n\r\n");

        assert_eq!(result, Err(ParseError::InvalidContentLength));
    }

    #[test]
    fn chunked_body_through_parser() {
        let req = b"PUT /x HTTP/1.1\r\nTransfer-Encoding: Chunked\r\n\r\n4\r\nWiki\r\n5;x=y\r\npedia\r\n0\r\n\r\n";
        let (parsed, consumed) = parse(req).unwrap();

        assert_eq!(&parsed.body[..], b"Wikipedia");
        assert_eq!(consumed, req.len());
    }

    #[test]
    fn failed_parser_stays_failed_until_cleared() {
        let mut parser = RequestParser::default();
        assert!(parser.feed(b"G(ET / HTTP/1.1\r\n").is_err());
        assert_eq!(parser.phase(), Phase::Failed(ParseError::InvalidMethod));
        assert_eq!(parser.feed(b"GET / HTTP/1.1\r\n\r\n"), Err(ParseError::InvalidMethod));

        parser.clear();
        assert_eq!(parser.phase(), Phase::Idle);
        assert!(parser.feed(b"GET / HTTP/1.1\r\n\r\n").is_ok());
        assert_eq!(parser.phase(), Phase::Complete);
    }

    #[test]
    fn complete_parser_consumes_nothing() {
        let mut parser = RequestParser::default();
        parser.feed(b"GET / HTTP/1.1\r\n\r\n").unwrap();

        assert_eq!(parser.feed(b"GET /next HTTP/1.1\r\n\r\n"), Ok(Status::Complete { consumed: 0 }));
        assert_eq!(parser.request().unwrap().url, "/");
    }

    #[test]
    fn request_hidden_while_in_progress() {
        let mut parser = RequestParser::default();
        assert_eq!(parser.feed(b"GET / HT"), Ok(Status::NeedMoreData));
        assert_eq!(parser.phase(), Phase::InProgress);
        assert!(parser.request().is_none());
    }

    #[test]
    fn head_limit() {
        let limits = ParserLimits {
            max_head_size: 16,
            ..ParserLimits::default()
        };
        let mut parser = RequestParser::new(limits);

        let result = parser.feed(b"GET /a-very-long-path HTTP/1.1\r\n\r\n");
        assert_eq!(result, Err(ParseError::HeaderTooLarge));
        assert!(!ParseError::HeaderTooLarge.is_malformed());
    }

    #[test]
    fn body_limit() {
        let limits = ParserLimits {
            max_body_size: 4,
            ..ParserLimits::default()
        };
        let mut parser = RequestParser::new(limits);

        let result = parser.feed(b"POST / HTTP/1.1\r\nContent-Length: 5\r\n\r\n");
        assert_eq!(result, Err(ParseError::BodyTooLarge));
    }

    #[test]
    fn token_class() {
        assert!(is_token(b'G'));
        assert!(is_token(b'-'));
        assert!(!is_token(b':'));
        assert!(!is_token(b'\x01'));
        assert!(!is_token(0x7f));
        assert!(!is_token(0xc3));
    }
}
