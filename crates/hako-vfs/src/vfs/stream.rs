//! Open streams.
//!
//! `open` on a backend hands back a boxed [`AsyncStream`]: a random-access
//! byte channel bound to one path for its lifetime. The stream belongs to
//! the call chain that opened it until [`AsyncStream::close`] runs.

use async_trait::async_trait;

use super::error::VfsResult;

/// Buffer size used when draining or copying streams.
pub const DEFAULT_BUFFER_SIZE: usize = 64 * 1024;

/// Random-access byte stream returned by `Vfs::open`.
///
/// Reads and writes happen at [`position`](AsyncStream::position) and
/// advance it. Operations on one stream are applied in the order issued.
#[async_trait]
pub trait AsyncStream: Send {
    /// Read up to `buf.len()` bytes. Returns 0 at end of stream.
    async fn read(&mut self, buf: &mut [u8]) -> VfsResult<usize>;

    /// Write all of `data`.
    async fn write(&mut self, data: &[u8]) -> VfsResult<()>;

    /// Current position.
    fn position(&self) -> u64;

    /// Move to an absolute position.
    async fn seek(&mut self, position: u64) -> VfsResult<()>;

    /// Current length of the underlying file.
    async fn length(&mut self) -> VfsResult<u64>;

    /// Truncate or extend the underlying file.
    async fn set_length(&mut self, length: u64) -> VfsResult<()>;

    /// Flush and release the stream. Further use is an error.
    async fn close(&mut self) -> VfsResult<()>;

    /// Read from the current position to the end.
    async fn read_all(&mut self) -> VfsResult<Vec<u8>> {
        let mut out = Vec::new();
        let mut buf = vec![0u8; DEFAULT_BUFFER_SIZE];
        loop {
            let n = self.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            out.extend_from_slice(&buf[..n]);
        }
        Ok(out)
    }

    /// Pump everything left in this stream into `target`.
    ///
    /// Returns the number of bytes transferred. Only one buffer is held at
    /// a time.
    async fn copy_to(&mut self, target: &mut dyn AsyncStream) -> VfsResult<u64> {
        let mut buf = vec![0u8; DEFAULT_BUFFER_SIZE];
        let mut copied = 0u64;
        loop {
            let n = self.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            target.write(&buf[..n]).await?;
            copied += n as u64;
        }
        Ok(copied)
    }
}

/// Close `stream`, then hand back `result`.
///
/// The close runs whether or not `result` is an error. When both fail, the
/// body's error wins.
pub async fn close_after<T>(mut stream: Box<dyn AsyncStream>, result: VfsResult<T>) -> VfsResult<T> {
    let closed = stream.close().await;
    match (result, closed) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(e)) => Err(e),
        (Err(e), Ok(())) => Err(e),
        (Err(e), Err(close_err)) => {
            tracing::debug!(error = %close_err, "stream close failed after body error");
            Err(e)
        }
    }
}
