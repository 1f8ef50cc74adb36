//! Bounded-buffer pump from a readable source to a writable sink.
//!
//! The buffer is refilled only once it has been fully drained, so the sink's
//! write rate decides how fast the source is read. A read or write error ends
//! the transfer for good; there is no retry.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{trace, warn};

pub const DEFAULT_BUFFER_SIZE: usize = 512;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyState {
    Running,
    /// The source is exhausted and every byte reached the sink.
    Finished,
    /// A read or write failed; the transfer will not make progress again.
    Failed,
}

/// Streams a source into a sink through a fixed-capacity buffer.
///
/// The copier owns the source; the sink is borrowed for each call so the
/// connection keeps ownership of its transport. Dropping the copier releases
/// the source.
pub struct StreamingCopier<R> {
    source: R,
    buffer: Box<[u8]>,
    begin: usize,
    end: usize,
    state: CopyState,
    copied: u64,
    expected: Option<u64>,
}

impl<R> StreamingCopier<R>
where
    R: AsyncRead + Unpin,
{
    pub fn new(source: R, capacity: usize) -> Self {
        Self {
            source,
            buffer: vec![0; capacity.max(1)].into_boxed_slice(),
            begin: 0,
            end: 0,
            state: CopyState::Running,
            copied: 0,
            expected: None,
        }
    }

    /// Like [`new`](Self::new), for a source that promised `len` bytes.
    ///
    /// Running out before `len` bytes have been copied fails the transfer.
    /// The copier does not cut the source off at `len`; wrap it with
    /// [`AsyncReadExt::take`] for that.
    pub fn with_length(source: R, capacity: usize, len: u64) -> Self {
        Self {
            expected: Some(len),
            ..Self::new(source, capacity)
        }
    }

    pub fn state(&self) -> CopyState {
        self.state
    }

    /// Bytes that reached the sink so far.
    pub fn bytes_copied(&self) -> u64 {
        self.copied
    }

    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }

    fn is_empty(&self) -> bool {
        debug_assert!(self.begin <= self.end);
        self.begin == self.end
    }

    /// Performs one unit of work: a refill when the buffer is empty, a drain
    /// otherwise.
    pub async fn step<W>(&mut self, sink: &mut W) -> CopyState
    where
        W: AsyncWrite + Unpin,
    {
        if self.state != CopyState::Running {
            return self.state;
        }

        if self.is_empty() {
            self.refill(sink).await;
        } else {
            self.drain(sink).await;
        }

        self.state
    }

    /// Steps until the transfer finishes or fails.
    pub async fn run<W>(&mut self, sink: &mut W) -> CopyState
    where
        W: AsyncWrite + Unpin,
    {
        while self.step(sink).await == CopyState::Running {}
        self.state
    }

    async fn refill<W>(&mut self, sink: &mut W)
    where
        W: AsyncWrite + Unpin,
    {
        match self.source.read(&mut self.buffer).await {
            Ok(0) => {
                // Source exhausted with nothing buffered
                if let Some(expected) = self.expected.filter(|&len| self.copied < len) {
                    warn!(expected, copied = self.copied, "stream body ended early");
                    self.state = CopyState::Failed;
                    return;
                }
                if let Err(error) = sink.flush().await {
                    warn!(%error, "error flushing stream body");
                    self.state = CopyState::Failed;
                    return;
                }
                trace!(bytes = self.copied, "stream body finished");
                self.state = CopyState::Finished;
            }
            Ok(n) => {
                self.begin = 0;
                self.end = n;
            }
            Err(error) => {
                warn!(%error, "error reading chunk");
                self.state = CopyState::Failed;
            }
        }
    }

    async fn drain<W>(&mut self, sink: &mut W)
    where
        W: AsyncWrite + Unpin,
    {
        match sink.write(&self.buffer[self.begin..self.end]).await {
            Ok(0) => {
                warn!("sink closed while writing chunk");
                self.state = CopyState::Failed;
            }
            Ok(n) => {
                self.begin += n;
                self.copied += n as u64;
            }
            Err(error) => {
                warn!(%error, "error writing chunk");
                self.state = CopyState::Failed;
            }
        }
    }
}
