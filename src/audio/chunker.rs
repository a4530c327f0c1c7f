//! Fixed-size re-chunking of a variable-length byte stream
//!
//! The upstream model emits audio deltas of arbitrary length while the
//! hardware client expects binary frames of exactly one size. [`FrameChunker`]
//! sits between the two: writes of any length go in, chunks of the configured
//! size come out, and `flush` releases the residual tail when a response ends.

use tokio::sync::{mpsc, Mutex};

use crate::{Error, Result};

/// Re-chunks arbitrary-length byte writes into fixed-size frames
///
/// Emission on the output channel is synchronous: a slow consumer
/// backpressures `write`, bounding memory during upstream bursts. The
/// internal buffer is mutex-guarded so `flush` may be called from a task
/// other than the writer.
pub struct FrameChunker {
    chunk_size: usize,
    buffer: Mutex<Vec<u8>>,
    tx: mpsc::Sender<Vec<u8>>,
}

impl FrameChunker {
    /// Create a chunker emitting `chunk_size`-byte frames
    ///
    /// `queue` bounds the output channel; once full, writers wait.
    #[must_use]
    pub fn new(chunk_size: usize, queue: usize) -> (Self, mpsc::Receiver<Vec<u8>>) {
        let (tx, rx) = mpsc::channel(queue.max(1));
        (
            Self {
                chunk_size,
                buffer: Mutex::new(Vec::new()),
                tx,
            },
            rx,
        )
    }

    /// Append bytes, emitting every complete chunk that forms
    ///
    /// After this returns, the residual buffer is shorter than the chunk
    /// size.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Cancelled`] when the output receiver is gone.
    pub async fn write(&self, data: &[u8]) -> Result<()> {
        let mut buffer = self.buffer.lock().await;
        buffer.extend_from_slice(data);

        while buffer.len() >= self.chunk_size {
            let chunk: Vec<u8> = buffer.drain(..self.chunk_size).collect();
            self.tx.send(chunk).await.map_err(|_| Error::Cancelled)?;
        }

        Ok(())
    }

    /// Emit the residual bytes (possibly none) and reset the buffer
    ///
    /// # Errors
    ///
    /// Returns [`Error::Cancelled`] when the output receiver is gone.
    pub async fn flush(&self) -> Result<()> {
        let mut buffer = self.buffer.lock().await;
        let residual = std::mem::take(&mut *buffer);
        self.tx.send(residual).await.map_err(|_| Error::Cancelled)?;
        Ok(())
    }
}
