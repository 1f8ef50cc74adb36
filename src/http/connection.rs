use std::sync::Arc;

use anyhow::Context;
use bytes::{Buf, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, trace};

use crate::config::ServerConfig;
use crate::http::copier::CopyState;
use crate::http::parser::{RequestParser, Status};
use crate::http::response::StatusCode;
use crate::http::writer::ResponseWriter;
use crate::router::Router;

/// One client connection: parses requests, dispatches them and writes the
/// responses back, in arrival order.
pub struct Connection<T> {
    stream: T,
    router: Arc<Router>,
    parser: RequestParser,
    writer: ResponseWriter,
    // bytes read but not yet consumed by the parser
    pending: BytesMut,
    scratch: Box<[u8]>,
    state: ConnectionState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Reading,
    Dispatching,
    Writing { keep_alive: bool },
    Closed,
}

impl<T> Connection<T>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: T, router: Arc<Router>, config: &ServerConfig) -> Self {
        Self {
            stream,
            router,
            parser: RequestParser::new(config.limits()),
            writer: ResponseWriter::new(config.copy_buffer_size),
            pending: BytesMut::with_capacity(config.read_buffer_size),
            scratch: vec![0; config.read_buffer_size.max(1)].into_boxed_slice(),
            state: ConnectionState::Reading,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub async fn run(&mut self) -> anyhow::Result<()> {
        loop {
            match self.state {
                ConnectionState::Reading => {
                    self.state = if self.read_request().await? {
                        ConnectionState::Dispatching
                    } else {
                        ConnectionState::Closed
                    };
                }

                ConnectionState::Dispatching => {
                    let keep_alive = self.dispatch();
                    self.state = ConnectionState::Writing { keep_alive };
                }

                ConnectionState::Writing { keep_alive } => {
                    let reusable = self.write_response().await?;

                    if keep_alive && reusable {
                        self.parser.clear();
                        self.writer.reset();
                        self.state = ConnectionState::Reading;
                    } else {
                        self.state = ConnectionState::Closed;
                    }
                }

                ConnectionState::Closed => {
                    if let Err(error) = self.stream.shutdown().await {
                        trace!(%error, "shutdown after close");
                    }
                    break;
                }
            }
        }

        Ok(())
    }

    /// Feeds the parser until a request completes.
    ///
    /// Returns `false` if the peer went away or sent a malformed request;
    /// either way the connection is closed without a response.
    async fn read_request(&mut self) -> anyhow::Result<bool> {
        loop {
            if !self.pending.is_empty() {
                match self.parser.feed(&self.pending) {
                    Ok(Status::Complete { consumed }) => {
                        self.pending.advance(consumed);
                        return Ok(true);
                    }
                    Ok(Status::NeedMoreData) => self.pending.clear(),
                    Err(error) => {
                        debug!(%error, "closing connection on bad request");
                        return Ok(false);
                    }
                }
            }

            let n = self
                .stream
                .read(&mut self.scratch)
                .await
                .context("failed to read from client")?;

            if n == 0 {
                trace!("client closed connection");
                return Ok(false);
            }

            self.pending.extend_from_slice(&self.scratch[..n]);
        }
    }

    /// Runs the matching handler, answering 404 when nothing matched.
    fn dispatch(&mut self) -> bool {
        let Some(request) = self.parser.request() else {
            return false;
        };

        if !self.router.handle_request(request, &mut self.writer) {
            self.writer.write_status(StatusCode::NotFound);
        }

        request.keep_alive
    }

    /// Flushes the framed response and drives any streamed body.
    ///
    /// Returns whether the connection may serve another request.
    async fn write_response(&mut self) -> anyhow::Result<bool> {
        self.writer
            .flush_to(&mut self.stream)
            .await
            .context("failed to write response")?;

        if let Some(mut transfer) = self.writer.take_transfer() {
            if transfer.run(&mut self.stream).await == CopyState::Failed {
                return Ok(false);
            }
            debug!(bytes = transfer.bytes_copied(), "stream body sent");
        }

        Ok(!self.writer.close_requested())
    }
}
