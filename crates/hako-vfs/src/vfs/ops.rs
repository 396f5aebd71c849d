//! Backend contract.
//!
//! [`Vfs`] is the one interface a storage provider implements to plug into
//! the core, and the one interface the core calls a backend through.
//! Everything a [`VfsFile`](super::VfsFile) does is built from these
//! operations.

use async_trait::async_trait;
use futures::stream::BoxStream;

use super::error::{VfsError, VfsResult};
use super::process::VfsProcessHandler;
use super::stream::{close_after, AsyncStream};
use super::types::{DirEntry, OpenMode, VfsStat};
use super::watch::{WatchCallback, WatchHandle};

/// Lazy, one-level directory listing.
pub type DirStream = BoxStream<'static, VfsResult<DirEntry>>;

/// Core VFS operations trait.
///
/// Paths are `/`-separated strings relative to the backend's root; a leading
/// `/` is ignored. Implementations must tolerate concurrent calls from
/// independent tasks.
///
/// Only `open`, `stat`, `delete`, `mkdir`, `rename` and `list` are required.
/// Chunked I/O and resizing default to stream operations; `watch` and
/// `exec` default to [`VfsError::Unsupported`].
#[async_trait]
pub trait Vfs: Send + Sync {
    // ========================================================================
    // Identity
    // ========================================================================

    /// Short human-readable description, used when formatting handles.
    fn describe(&self) -> String;

    /// Base of this backend in host terms, `""` for purely virtual backends.
    fn absolute_path(&self) -> String {
        String::new()
    }

    /// Returns true if this filesystem is read-only.
    fn read_only(&self) -> bool {
        false
    }

    // ========================================================================
    // Streams and metadata
    // ========================================================================

    /// Open a stream on `path`.
    ///
    /// `OpenMode::Read` on a missing file fails with `NotFound`.
    async fn open(&self, path: &str, mode: OpenMode) -> VfsResult<Box<dyn AsyncStream>>;

    /// Metadata snapshot. A missing path yields `exists == false`, not an error.
    async fn stat(&self, path: &str) -> VfsResult<VfsStat>;

    /// Read up to `size` bytes starting at `offset`.
    ///
    /// Returns fewer bytes if EOF is reached.
    async fn read_chunk(&self, path: &str, offset: u64, size: usize) -> VfsResult<Vec<u8>> {
        let mut stream = self.open(path, OpenMode::Read).await?;
        let result = async {
            stream.seek(offset).await?;
            let mut buf = vec![0u8; size];
            let mut filled = 0;
            while filled < size {
                let n = stream.read(&mut buf[filled..]).await?;
                if n == 0 {
                    break;
                }
                filled += n;
            }
            buf.truncate(filled);
            Ok(buf)
        }
        .await;
        close_after(stream, result).await
    }

    /// Write `data` at `offset`.
    ///
    /// With `resize` the file is created if missing and grows as needed
    /// (gaps are zero-filled). Without it the file must exist and bytes past
    /// its current end are dropped.
    async fn write_chunk(&self, path: &str, data: &[u8], offset: u64, resize: bool) -> VfsResult<()> {
        let mode = if resize { OpenMode::Create } else { OpenMode::Write };
        let mut stream = self.open(path, mode).await?;
        let result = async {
            let data = if resize {
                data
            } else {
                let room = stream.length().await?.saturating_sub(offset);
                &data[..data.len().min(room as usize)]
            };
            if data.is_empty() {
                return Ok(());
            }
            stream.seek(offset).await?;
            stream.write(data).await
        }
        .await;
        close_after(stream, result).await
    }

    /// Truncate or extend a file.
    async fn set_size(&self, path: &str, size: u64) -> VfsResult<()> {
        let mut stream = self.open(path, OpenMode::Write).await?;
        let result = stream.set_length(size).await;
        close_after(stream, result).await
    }

    // ========================================================================
    // Tree
    // ========================================================================

    /// Remove a file or an empty directory.
    async fn delete(&self, path: &str) -> VfsResult<()>;

    /// Create one directory. The parent must exist; an existing directory
    /// is not an error.
    async fn mkdir(&self, path: &str) -> VfsResult<()>;

    /// Rename a file or directory.
    async fn rename(&self, from: &str, to: &str) -> VfsResult<()>;

    /// List the direct children of a directory.
    async fn list(&self, path: &str) -> VfsResult<DirStream>;

    // ========================================================================
    // Optional capabilities
    // ========================================================================

    /// Deliver create/modify/delete events under `path` until the handle
    /// is closed.
    async fn watch(&self, path: &str, handler: WatchCallback) -> VfsResult<WatchHandle> {
        let _ = (path, handler);
        Err(VfsError::Unsupported("watch"))
    }

    /// Run a process with working directory `path`, streaming its output
    /// into `handler`. Returns the exit code.
    async fn exec(
        &self,
        path: &str,
        cmd_and_args: &[String],
        handler: &mut dyn VfsProcessHandler,
    ) -> VfsResult<i32> {
        let _ = (path, cmd_and_args, handler);
        Err(VfsError::Unsupported("exec"))
    }

    /// Release native resources held by the backend.
    async fn close(&self) -> VfsResult<()> {
        Ok(())
    }
}
