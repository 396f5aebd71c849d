//! Virtual Filesystem abstraction.
//!
//! Key components:
//!
//! - [`Vfs`] - Backend contract every storage provider implements
//! - [`VfsFile`] - `(backend, path)` handle with the high-level operations
//! - [`JailVfs`] - Decorator confining a backend to a subtree
//! - [`MountTable`] - Routes operations to backends based on path
//! - [`MemoryBackend`] - In-memory filesystem (for scratch space, testing)
//! - [`LocalBackend`] - Local filesystem access
//!
//! ## Design Decisions
//!
//! - **String paths**: VFS paths are `/`-separated strings resolved
//!   lexically by [`crate::path`], never host paths.
//! - **Streams are owned**: `open` hands back a boxed [`AsyncStream`] that
//!   the caller must close; [`close_after`] and [`VfsFile::open_use`] make
//!   that hold on error paths too.
//! - **Lazy listings**: backends yield [`DirEntry`] streams; the handle turns
//!   them into child handles on its own backend, so a jail stays a jail.
//! - **Longest-prefix routing**: MountTable routes to the most specific
//!   mount point that matches.

pub mod backends;
mod error;
mod file;
mod jail;
mod mount;
mod ops;
mod process;
mod stream;
mod types;
mod watch;

pub use backends::{LocalBackend, MemoryBackend, DEFAULT_POLL_INTERVAL};
pub use error::{VfsError, VfsResult};
pub use file::{CopyNotify, VfsFile};
pub use jail::{JailPolicy, JailVfs};
pub use mount::{MountInfo, MountTable};
pub use ops::{DirStream, Vfs};
pub use process::{CaptureOutput, DiscardOutput, PassthruOutput, VfsProcessHandler};
pub use stream::{close_after, AsyncStream, DEFAULT_BUFFER_SIZE};
pub use types::{DirEntry, FileChangeKind, FileType, OpenFlags, OpenMode, VfsFileEvent, VfsStat};
pub use watch::{WatchCallback, WatchHandle};
