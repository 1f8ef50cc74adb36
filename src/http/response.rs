use std::fmt;

use bytes::Bytes;

use crate::http::headers::HeaderList;
use crate::http::mime;
use crate::http::writer::{ResponseWriter, StreamSource};

/// Status codes the writer knows a reason phrase for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusCode {
    Continue,
    Ok,
    Created,
    Accepted,
    NoContent,
    BadRequest,
    Forbidden,
    NotFound,
    MethodNotAllowed,
    InternalServerError,
    BadGateway,
}

impl StatusCode {
    pub fn as_u16(&self) -> u16 {
        match self {
            StatusCode::Continue => 100,
            StatusCode::Ok => 200,
            StatusCode::Created => 201,
            StatusCode::Accepted => 202,
            StatusCode::NoContent => 204,
            StatusCode::BadRequest => 400,
            StatusCode::Forbidden => 403,
            StatusCode::NotFound => 404,
            StatusCode::MethodNotAllowed => 405,
            StatusCode::InternalServerError => 500,
            StatusCode::BadGateway => 502,
        }
    }

    pub fn from_u16(code: u16) -> Option<Self> {
        let status = match code {
            100 => StatusCode::Continue,
            200 => StatusCode::Ok,
            201 => StatusCode::Created,
            202 => StatusCode::Accepted,
            204 => StatusCode::NoContent,
            400 => StatusCode::BadRequest,
            403 => StatusCode::Forbidden,
            404 => StatusCode::NotFound,
            405 => StatusCode::MethodNotAllowed,
            500 => StatusCode::InternalServerError,
            502 => StatusCode::BadGateway,
            _ => return None,
        };
        Some(status)
    }

    /// Reason phrase written after the code on the status line.
    ///
    /// ```
    /// # use wicket::http::response::StatusCode;
    /// assert_eq!(StatusCode::NoContent.reason_phrase(), "No Content");
    /// assert_eq!(StatusCode::BadGateway.to_string(), "502 Bad Gateway");
    /// ```
    pub fn reason_phrase(&self) -> &'static str {
        match self {
            StatusCode::Continue => "Continue",
            StatusCode::Ok => "OK",
            StatusCode::Created => "Created",
            StatusCode::Accepted => "Accepted",
            StatusCode::NoContent => "No Content",
            StatusCode::BadRequest => "Bad Request",
            StatusCode::Forbidden => "Forbidden",
            StatusCode::NotFound => "Not Found",
            StatusCode::MethodNotAllowed => "Method Not Allowed",
            StatusCode::InternalServerError => "Internal Server Error",
            StatusCode::BadGateway => "Bad Gateway",
        }
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.as_u16(), self.reason_phrase())
    }
}

/// Response payload: an in-memory buffer or a source streamed after the head.
#[derive(Debug)]
pub enum Body {
    Bytes(Bytes),
    Stream(StreamSource),
}

impl Default for Body {
    fn default() -> Self {
        Body::Bytes(Bytes::new())
    }
}

/// An HTTP response value, consumed by [`Response::write`].
#[derive(Debug)]
pub struct Response {
    pub status: StatusCode,
    /// Headers in insertion order; duplicates are kept
    pub headers: HeaderList,
    pub body: Body,
}

/// Fluent construction of a [`Response`].
///
/// ```
/// # use wicket::http::response::{ResponseBuilder, StatusCode};
/// let response = ResponseBuilder::new(StatusCode::Created)
///     .header("Location", "/api/7")
///     .body("7")
///     .build();
/// assert!(response.has_header("location"));
/// ```
pub struct ResponseBuilder {
    status: StatusCode,
    headers: HeaderList,
    body: Body,
}

impl ResponseBuilder {
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: HeaderList::new(),
            body: Body::default(),
        }
    }

    /// Appends a header; an existing header with the same name is kept.
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.add(key, value);
        self
    }

    /// Replaces every header named `key`.
    pub fn set_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.set(key, value);
        self
    }

    /// Sets an in-memory body.
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Body::Bytes(body.into());
        self
    }

    /// Streams the body from `source` when the response is written.
    pub fn stream(mut self, source: StreamSource) -> Self {
        self.body = Body::Stream(source);
        self
    }

    pub fn build(self) -> Response {
        Response {
            status: self.status,
            headers: self.headers,
            body: self.body,
        }
    }
}

impl Response {
    /// Creates a 200 OK response, guessing the content type from the body.
    pub fn ok(body: impl Into<Bytes>) -> Self {
        let body = body.into();
        ResponseBuilder::new(StatusCode::Ok)
            .header(mime::CONTENT_TYPE, mime::infer(&body))
            .body(body)
            .build()
    }

    /// Creates a response with an explicit content type.
    pub fn typed(content_type: &str, body: impl Into<Bytes>, status: StatusCode) -> Self {
        ResponseBuilder::new(status)
            .header(mime::CONTENT_TYPE, content_type)
            .body(body)
            .build()
    }

    /// Creates a compact JSON response.
    pub fn json(value: &serde_json::Value, status: StatusCode) -> Self {
        Self::typed(mime::APPLICATION_JSON, value.to_string(), status)
    }

    pub fn html(body: impl Into<Bytes>) -> Self {
        Self::typed(mime::TEXT_HTML, body, StatusCode::Ok)
    }

    /// Creates a bodiless response carrying the empty-body content type.
    pub fn empty(status: StatusCode) -> Self {
        Self::typed(mime::APPLICATION_X_EMPTY, Bytes::new(), status)
    }

    pub fn not_found() -> Self {
        Self::empty(StatusCode::NotFound)
    }

    pub fn internal_error() -> Self {
        Self::empty(StatusCode::InternalServerError)
    }

    pub fn has_header(&self, name: &str) -> bool {
        self.headers.contains(name)
    }

    /// Writes the response through `writer`.
    ///
    /// `Content-Length` is derived from the body unless already set. Nothing
    /// is written if the transport has gone away.
    pub fn write(self, writer: &mut ResponseWriter) {
        if !writer.is_open() {
            return;
        }

        match self.body {
            Body::Bytes(body) => {
                writer.write_status_line(self.status);
                for (name, value) in self.headers.iter() {
                    writer.write_header(name, value);
                }
                if !self.headers.contains(mime::CONTENT_LENGTH) {
                    writer.write_header(mime::CONTENT_LENGTH, &body.len().to_string());
                }
                writer.write_body(&body);
            }
            Body::Stream(source) => writer.write_stream(source, self.headers, self.status),
        }
    }
}
