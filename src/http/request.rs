use std::borrow::Cow;
use std::fmt;

use bytes::Bytes;
use url::Url;

use crate::http::headers::HeaderMap;

/// HTTP request methods.
///
/// Only the four methods the router can distinguish get their own variant.
/// Any other syntactically valid method token parses as `OTHER`; the token
/// itself is kept on [`Request::method_token`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Method {
    /// GET - Retrieve a resource
    #[default]
    GET,
    /// PUT - Replace a resource
    PUT,
    /// DELETE - Delete a resource
    DELETE,
    /// POST - Create or submit data
    POST,
    /// Any other method token
    OTHER,
}

impl Method {
    /// Maps a method token to a `Method`.
    ///
    /// Matching is case-sensitive, as method tokens are.
    ///
    /// ```
    /// # use wicket::http::request::Method;
    /// assert_eq!(Method::from_token(b"GET"), Method::GET);
    /// assert_eq!(Method::from_token(b"get"), Method::OTHER);
    /// ```
    pub fn from_token(token: &[u8]) -> Self {
        match token {
            b"GET" => Method::GET,
            b"PUT" => Method::PUT,
            b"DELETE" => Method::DELETE,
            b"POST" => Method::POST,
            _ => Method::OTHER,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Method::GET => "GET",
            Method::PUT => "PUT",
            Method::DELETE => "DELETE",
            Method::POST => "POST",
            Method::OTHER => "OTHER",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// HTTP protocol version as `(major, minor)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version {
    pub major: u8,
    pub minor: u8,
}

impl Version {
    pub const HTTP_09: Version = Version::new(0, 9);
    pub const HTTP_10: Version = Version::new(1, 0);
    pub const HTTP_11: Version = Version::new(1, 1);

    pub const fn new(major: u8, minor: u8) -> Self {
        Self { major, minor }
    }
}

impl Default for Version {
    fn default() -> Self {
        Version::HTTP_11
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HTTP/{}.{}", self.major, self.minor)
    }
}

/// A fully parsed HTTP request.
///
/// Produced by [`RequestParser`](crate::http::parser::RequestParser) once a
/// message is complete. The body is always materialized.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Request {
    /// The HTTP method (GET, POST, etc.)
    pub method: Method,
    /// The method token exactly as received
    pub method_token: String,
    /// The raw request target (e.g., "/items/42?full=1")
    pub url: String,
    /// Protocol version from the request line
    pub version: Version,
    /// Request headers, case-insensitive, last value wins
    pub headers: HeaderMap,
    /// Request body, empty for bodiless requests
    pub body: Bytes,
    /// Whether the connection should stay open after the response
    pub keep_alive: bool,
}

/// Builder for constructing Request objects.
pub struct RequestBuilder {
    method: Option<Method>,
    url: Option<String>,
    version: Version,
    headers: HeaderMap,
    body: Bytes,
    keep_alive: Option<bool>,
}

impl RequestBuilder {
    pub fn new() -> Self {
        Self {
            method: None,
            url: None,
            version: Version::HTTP_11,
            headers: HeaderMap::new(),
            body: Bytes::new(),
            keep_alive: None,
        }
    }

    pub fn method(mut self, method: Method) -> Self {
        self.method = Some(method);
        self
    }

    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn version(mut self, version: Version) -> Self {
        self.version = version;
        self
    }

    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key, value);
        self
    }

    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn keep_alive(mut self, keep_alive: bool) -> Self {
        self.keep_alive = Some(keep_alive);
        self
    }

    pub fn build(self) -> Result<Request, &'static str> {
        let method = self.method.ok_or("method missing")?;
        let keep_alive = self
            .keep_alive
            .unwrap_or_else(|| keep_alive_for(self.version, &self.headers));

        Ok(Request {
            method,
            method_token: method.as_str().to_string(),
            url: self.url.ok_or("url missing")?,
            version: self.version,
            headers: self.headers,
            body: self.body,
            keep_alive,
        })
    }
}

impl Default for RequestBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Derives the keep-alive flag from the `Connection` header and version.
///
/// An explicit `Connection` header decides on its own: only `Keep-Alive`
/// (any case) keeps the connection. Without it, HTTP/1.1 and later default
/// to keeping the connection open.
pub(crate) fn keep_alive_for(version: Version, headers: &HeaderMap) -> bool {
    match headers.get("Connection") {
        Some(value) => value.eq_ignore_ascii_case("keep-alive"),
        None => version >= Version::HTTP_11,
    }
}

impl Request {
    /// Retrieves a header value by name, ignoring case.
    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers.get(key)
    }

    /// Retrieves the Content-Length header value and parses it as a usize.
    ///
    /// Returns 0 if the header is missing or not a valid number.
    pub fn content_length(&self) -> usize {
        self.header("Content-Length")
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(0)
    }

    /// Percent-decoded path component of the request target.
    ///
    /// Handles both origin-form (`/a/b?c`) and absolute-form
    /// (`http://host/a/b?c`) targets. Dot segments are removed before
    /// decoding; `+` is left alone since it only means space in queries.
    pub fn path(&self) -> String {
        let encoded = match self.parsed_url() {
            Some(url) => url.path().to_string(),
            None => self
                .url
                .split(['?', '#'])
                .next()
                .unwrap_or_default()
                .to_string(),
        };

        percent_decode(&encoded).into_owned()
    }

    /// Query component of the request target, without the leading `?`.
    pub fn query(&self) -> Option<String> {
        match self.parsed_url() {
            Some(url) => url.query().map(str::to_string),
            None => self
                .url
                .split_once('?')
                .map(|(_, query)| query.split('#').next().unwrap_or_default().to_string()),
        }
    }

    fn parsed_url(&self) -> Option<Url> {
        let base = Url::parse("http://localhost/").ok()?;
        base.join(&self.url).ok()
    }
}

/// Decodes `%XX` escapes. Malformed escapes are kept as they are and
/// invalid UTF-8 is replaced.
fn percent_decode(s: &str) -> Cow<'_, str> {
    if !s.contains('%') {
        return Cow::Borrowed(s);
    }

    let bytes = s.as_bytes();
    let mut decoded = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            if let (Some(hi), Some(lo)) = (hex_digit(bytes[i + 1]), hex_digit(bytes[i + 2])) {
                decoded.push(hi << 4 | lo);
                i += 3;
                continue;
            }
        }

        decoded.push(bytes[i]);
        i += 1;
    }

    Cow::Owned(String::from_utf8_lossy(&decoded).into_owned())
}

fn hex_digit(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_strips_query() {
        let request = RequestBuilder::new()
            .method(Method::GET)
            .url("/items/42?full=1")
            .build()
            .unwrap();

        assert_eq!(request.path(), "/items/42");
        assert_eq!(request.query().as_deref(), Some("full=1"));
    }

    #[test]
    fn path_of_absolute_form_target() {
        let request = RequestBuilder::new()
            .method(Method::GET)
            .url("http://example.com/api?x=y")
            .build()
            .unwrap();

        assert_eq!(request.path(), "/api");
    }

    #[test]
    fn keep_alive_defaults_by_version() {
        let headers = HeaderMap::new();
        assert!(keep_alive_for(Version::HTTP_11, &headers));
        assert!(!keep_alive_for(Version::HTTP_10, &headers));
        assert!(!keep_alive_for(Version::HTTP_09, &headers));
    }

    #[test]
    fn connection_header_overrides_version() {
        let mut headers = HeaderMap::new();
        headers.insert("connection", "close");
        assert!(!keep_alive_for(Version::HTTP_11, &headers));

        headers.insert("Connection", "KEEP-ALIVE");
        assert!(keep_alive_for(Version::HTTP_10, &headers));
    }
}
