use std::fmt;
use std::fs::File;
use std::io;
use std::path::PathBuf;

use bytes::{BufMut, Bytes, BytesMut};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, warn};

use crate::http::copier::{DEFAULT_BUFFER_SIZE, StreamingCopier};
use crate::http::headers::HeaderList;
use crate::http::mime;
use crate::http::request::Version;
use crate::http::response::StatusCode;

/// Boxed source handed to the streaming copier.
pub type BoxedSource = Box<dyn AsyncRead + Send + Unpin>;

/// A body that is streamed to the client instead of held in memory.
pub enum StreamSource {
    /// A file, opened read-only by the writer.
    ///
    /// The open and `metadata` calls block. Handlers run inline on the
    /// connection task, which on a `current_thread` runtime stalls every
    /// other connection for that long, so paths should be on local disk. A
    /// handler that cannot promise that should open the file itself and pass
    /// a [`StreamSource::Reader`].
    Path(PathBuf),
    /// An already open reader. `len` is `None` for sources of unknown length.
    Reader { reader: BoxedSource, len: Option<u64> },
}

impl StreamSource {
    pub fn path(path: impl Into<PathBuf>) -> Self {
        StreamSource::Path(path.into())
    }

    pub fn reader(reader: impl AsyncRead + Send + Unpin + 'static, len: Option<u64>) -> Self {
        StreamSource::Reader {
            reader: Box::new(reader),
            len,
        }
    }

    fn open(self) -> Result<(BoxedSource, Option<u64>), BodyError> {
        match self {
            StreamSource::Path(path) => {
                let file = File::open(&path).map_err(|source| BodyError::Open {
                    path: path.clone(),
                    source,
                })?;
                let metadata = file.metadata().map_err(|source| BodyError::Open {
                    path: path.clone(),
                    source,
                })?;
                if !metadata.is_file() {
                    return Err(BodyError::NotReadable(path));
                }

                let file = tokio::fs::File::from_std(file);
                Ok((Box::new(file), Some(metadata.len())))
            }
            StreamSource::Reader { reader, len } => Ok((reader, len)),
        }
    }
}

impl fmt::Debug for StreamSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamSource::Path(path) => f.debug_tuple("Path").field(path).finish(),
            StreamSource::Reader { len, .. } => {
                f.debug_struct("Reader").field("len", len).finish_non_exhaustive()
            }
        }
    }
}

/// Failure to prepare a streamed body.
#[derive(Debug, Error)]
pub enum BodyError {
    #[error("could not open {}: {source}", path.display())]
    Open { path: PathBuf, source: io::Error },
    #[error("{} is not a readable file", .0.display())]
    NotReadable(PathBuf),
}

/// Frames responses for one connection.
///
/// Handlers run synchronously, so every write lands in an outbound buffer
/// that the connection flushes once the handler returns. A streamed body is
/// kept as a pending [`StreamingCopier`] which the connection drives after
/// the buffered head has been flushed.
pub struct ResponseWriter {
    buffer: BytesMut,
    open: bool,
    body_started: bool,
    close_after: bool,
    copy_buffer_size: usize,
    transfer: Option<StreamingCopier<BoxedSource>>,
}

impl Default for ResponseWriter {
    fn default() -> Self {
        Self::new(DEFAULT_BUFFER_SIZE)
    }
}

impl ResponseWriter {
    pub fn new(copy_buffer_size: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(1024),
            open: true,
            body_started: false,
            close_after: false,
            copy_buffer_size,
            transfer: None,
        }
    }

    /// Whether the underlying transport can still be written to.
    pub fn is_open(&self) -> bool {
        self.open
    }

    /// Marks the transport as gone; later writes are dropped.
    pub fn set_closed(&mut self) {
        self.open = false;
    }

    /// True if the response requires the connection to close afterwards.
    pub fn close_requested(&self) -> bool {
        self.close_after
    }

    /// Bytes framed so far and not yet flushed.
    pub fn pending(&self) -> &[u8] {
        &self.buffer
    }

    /// Takes the framed bytes, leaving the buffer empty.
    pub fn take_output(&mut self) -> Bytes {
        self.buffer.split().freeze()
    }

    /// Takes the streamed body transfer handed over by the last response.
    pub fn take_transfer(&mut self) -> Option<StreamingCopier<BoxedSource>> {
        self.transfer.take()
    }

    /// Prepares for the next response on the same connection.
    pub fn reset(&mut self) {
        self.body_started = false;
        self.close_after = false;
        self.transfer = None;
    }

    /// Writes buffered output to `stream`.
    pub async fn flush_to<W>(&mut self, stream: &mut W) -> anyhow::Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        let mut written = 0;

        while written < self.buffer.len() {
            let n = match stream.write(&self.buffer[written..]).await {
                Ok(n) => n,
                Err(error) => {
                    self.open = false;
                    return Err(error.into());
                }
            };

            if n == 0 {
                self.open = false;
                return Err(anyhow::anyhow!("connection closed while writing"));
            }

            written += n;
        }

        stream.flush().await?;
        self.buffer.clear();
        Ok(())
    }

    fn put(&mut self, data: &[u8]) {
        if self.open {
            self.buffer.put_slice(data);
        }
    }

    pub fn write_status_line(&mut self, status: StatusCode) {
        self.write_status_line_with_version(status, Version::HTTP_11);
    }

    /// Emits `HTTP/{major}.{minor} {code} {reason}`.
    pub fn write_status_line_with_version(&mut self, status: StatusCode, version: Version) {
        let line = format!("{} {}\r\n", version, status);
        self.put(line.as_bytes());
    }

    /// Emits one header line as given; no validation or case folding.
    pub fn write_header(&mut self, name: &str, value: &str) {
        self.put(name.as_bytes());
        self.put(b": ");
        self.put(value.as_bytes());
        self.put(b"\r\n");
    }

    pub fn write_headers<N, V>(&mut self, headers: impl IntoIterator<Item = (N, V)>)
    where
        N: AsRef<str>,
        V: AsRef<str>,
    {
        for (name, value) in headers {
            self.write_header(name.as_ref(), value.as_ref());
        }
    }

    /// Writes body bytes, ending the header block on the first call.
    pub fn write_body(&mut self, body: &[u8]) {
        if !self.body_started {
            self.put(b"\r\n");
            self.body_started = true;
        }

        self.put(body);
    }

    /// Writes a complete response with an in-memory body.
    ///
    /// `Content-Length` is computed from `data` unless `headers` sets it.
    pub fn write<N, V>(
        &mut self,
        data: &[u8],
        headers: impl IntoIterator<Item = (N, V)>,
        status: StatusCode,
    ) where
        N: Into<String>,
        V: Into<String>,
    {
        if !self.guard_open() {
            return;
        }

        let headers: HeaderList = headers.into_iter().collect();

        self.write_status_line(status);
        self.write_headers(headers.iter());
        if !headers.contains(mime::CONTENT_LENGTH) {
            self.write_header(mime::CONTENT_LENGTH, &data.len().to_string());
        }
        self.write_body(data);
    }

    /// Writes a complete response with the given content type.
    pub fn write_typed(&mut self, data: &[u8], content_type: &str, status: StatusCode) {
        self.write(data, [(mime::CONTENT_TYPE, content_type)], status);
    }

    /// Writes a complete response, guessing the content type from `data`.
    pub fn write_inferred(&mut self, data: &[u8], status: StatusCode) {
        self.write_typed(data, mime::infer(data), status);
    }

    /// Writes a JSON document with `application/json` and its length.
    pub fn write_json<N, V>(
        &mut self,
        document: &serde_json::Value,
        headers: impl IntoIterator<Item = (N, V)>,
        status: StatusCode,
    ) where
        N: Into<String>,
        V: Into<String>,
    {
        let json = match serde_json::to_vec(document) {
            Ok(json) => json,
            Err(error) => {
                warn!(%error, "500: could not encode JSON document");
                self.write_status(StatusCode::InternalServerError);
                return;
            }
        };

        let mut list: HeaderList = headers.into_iter().collect();
        list.set(mime::CONTENT_TYPE, mime::APPLICATION_JSON);
        self.write(&json, list, status);
    }

    /// Writes the head of a response whose body is streamed from `source`.
    ///
    /// A source that cannot be opened is answered with a 500 before any
    /// status line is written. The source's own length is the only
    /// `Content-Length` sent, and the transfer stops after that many bytes;
    /// a source that ends sooner fails the transfer. For unknown lengths the
    /// connection closes after the transfer so the body end is still
    /// detectable.
    ///
    /// Opening a [`StreamSource::Path`] makes blocking `open` and `metadata`
    /// calls on the calling thread.
    pub fn write_stream<N, V>(
        &mut self,
        source: StreamSource,
        headers: impl IntoIterator<Item = (N, V)>,
        status: StatusCode,
    ) where
        N: Into<String>,
        V: Into<String>,
    {
        let (reader, len) = match source.open() {
            Ok(opened) => opened,
            Err(error) => {
                debug!(%error, "500: could not open body source");
                self.write_status(StatusCode::InternalServerError);
                return;
            }
        };

        if !self.guard_open() {
            return;
        }

        let mut headers: HeaderList = headers.into_iter().collect();
        headers.remove(mime::CONTENT_LENGTH);

        self.write_status_line(status);
        match len {
            Some(len) => self.write_header(mime::CONTENT_LENGTH, &len.to_string()),
            None => {
                self.write_header("Connection", "close");
                self.close_after = true;
            }
        }
        self.write_headers(headers.iter());
        self.write_body(&[]);

        self.transfer = match len {
            Some(0) => {
                debug!("no more data available");
                None
            }
            Some(len) => {
                let bounded: BoxedSource = Box::new(reader.take(len));
                Some(StreamingCopier::with_length(bounded, self.copy_buffer_size, len))
            }
            None => Some(StreamingCopier::new(reader, self.copy_buffer_size)),
        };
    }

    /// Streams `source` with the given content type.
    pub fn write_stream_typed(&mut self, source: StreamSource, content_type: &str, status: StatusCode) {
        self.write_stream(source, [(mime::CONTENT_TYPE, content_type)], status);
    }

    /// Writes a bodiless response with the given headers.
    pub fn write_headers_only<N, V>(
        &mut self,
        headers: impl IntoIterator<Item = (N, V)>,
        status: StatusCode,
    ) where
        N: Into<String>,
        V: Into<String>,
    {
        let mut list: HeaderList = headers.into_iter().collect();
        if !list.contains(mime::CONTENT_TYPE) {
            list.add(mime::CONTENT_TYPE, mime::APPLICATION_X_EMPTY);
        }
        self.write(&[], list, status);
    }

    /// Writes a bodiless response with only a status.
    pub fn write_status(&mut self, status: StatusCode) {
        self.write_typed(&[], mime::APPLICATION_X_EMPTY, status);
    }

    fn guard_open(&self) -> bool {
        if !self.open {
            warn!("cannot write response, the connection has been closed");
        }
        self.open
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::copier::CopyState;

    fn output(writer: &mut ResponseWriter) -> String {
        String::from_utf8(writer.take_output().to_vec()).unwrap()
    }

    #[test]
    fn status_line_format() {
        let mut writer = ResponseWriter::default();
        writer.write_status_line_with_version(StatusCode::BadGateway, Version::HTTP_10);

        assert_eq!(output(&mut writer), "HTTP/1.0 502 Bad Gateway\r\n");
    }

    #[test]
    fn blank_line_written_once() {
        let mut writer = ResponseWriter::default();
        writer.write_status_line(StatusCode::Ok);
        writer.write_header("X-A", "1");
        writer.write_body(b"ab");
        writer.write_body(b"cd");

        assert_eq!(output(&mut writer), "HTTP/1.1 200 OK\r\nX-A: 1\r\n\r\nabcd");
    }

    #[test]
    fn headers_written_in_call_order_with_duplicates() {
        let mut writer = ResponseWriter::default();
        writer.write_headers([("b", "2"), ("a", "1"), ("b", "3")]);

        assert_eq!(output(&mut writer), "b: 2\r\na: 1\r\nb: 3\r\n");
    }

    #[test]
    fn explicit_content_length_is_not_duplicated() {
        let mut writer = ResponseWriter::default();
        writer.write(b"abc", [("content-length", "3")], StatusCode::Ok);

        let text = output(&mut writer);
        assert_eq!(text.matches("ength: 3").count(), 1);
    }

    #[test]
    fn closed_writer_emits_nothing() {
        let mut writer = ResponseWriter::default();
        writer.set_closed();
        writer.write_typed(b"hello", mime::TEXT_PLAIN, StatusCode::Ok);
        writer.write_status_line(StatusCode::Ok);

        assert!(writer.pending().is_empty());
    }

    #[test]
    fn missing_file_becomes_500() {
        let mut writer = ResponseWriter::default();
        writer.write_stream_typed(
            StreamSource::path("/definitely/not/here.bin"),
            mime::APPLICATION_OCTET_STREAM,
            StatusCode::Ok,
        );

        let text = output(&mut writer);
        assert!(text.starts_with("HTTP/1.1 500 Internal Server Error\r\n"));
        assert!(text.contains("Content-Type: application/x-empty\r\n"));
        assert!(text.ends_with("Content-Length: 0\r\n\r\n"));
        assert!(writer.take_transfer().is_none());
    }

    #[test]
    fn directory_is_not_a_readable_source() {
        let mut writer = ResponseWriter::default();
        writer.write_stream_typed(
            StreamSource::path(std::env::temp_dir()),
            mime::APPLICATION_OCTET_STREAM,
            StatusCode::Ok,
        );

        assert!(output(&mut writer).starts_with("HTTP/1.1 500 "));
    }

    #[test]
    fn unknown_length_stream_requests_close() {
        let mut writer = ResponseWriter::default();
        let source = StreamSource::reader(&b"streamed"[..], None);
        writer.write_stream_typed(source, mime::TEXT_PLAIN, StatusCode::Ok);

        let text = output(&mut writer);
        assert!(!text.contains("Content-Length"));
        assert!(text.contains("Connection: close\r\n"));
        assert!(text.ends_with("\r\n\r\n"));
        assert!(writer.close_requested());
        assert!(writer.take_transfer().is_some());
    }

    #[test]
    fn stream_length_replaces_caller_content_length() {
        let mut writer = ResponseWriter::default();
        writer.write_stream(
            StreamSource::reader(&b"abcd"[..], Some(4)),
            [("content-length", "99"), ("X-Tag", "t")],
            StatusCode::Ok,
        );

        let text = output(&mut writer);
        assert_eq!(text.to_ascii_lowercase().matches("content-length").count(), 1);
        assert!(text.contains("Content-Length: 4\r\n"));
        assert!(text.contains("X-Tag: t\r\n"));
    }

    #[tokio::test]
    async fn known_length_transfer_stops_at_length() {
        let mut writer = ResponseWriter::default();
        writer.write_stream_typed(
            StreamSource::reader(&b"abcXYZ"[..], Some(3)),
            mime::TEXT_PLAIN,
            StatusCode::Ok,
        );

        let mut transfer = writer.take_transfer().unwrap();
        let mut sink = Vec::new();
        assert_eq!(transfer.run(&mut sink).await, CopyState::Finished);
        assert_eq!(sink, b"abc");
    }

    #[test]
    fn empty_known_length_stream_has_no_transfer() {
        let mut writer = ResponseWriter::default();
        writer.write_stream(StreamSource::reader(&b""[..], Some(0)), HeaderList::new(), StatusCode::Ok);

        assert!(output(&mut writer).contains("Content-Length: 0\r\n"));
        assert!(writer.take_transfer().is_none());
    }
}
