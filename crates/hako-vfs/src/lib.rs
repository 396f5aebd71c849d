//! # hako-vfs
//!
//! Asynchronous virtual filesystem.
//!
//! One logical interface ([`Vfs`]) over heterogeneous storage, with
//! [`VfsFile`] handles layered on top:
//! - Local disk and in-memory backends, a mount table, and a jail
//!   decorator that confines any backend to a subtree
//! - Lazy one-level and recursive listings
//! - Stream-to-stream and whole-tree copies
//! - Process execution with streamed stdout/stderr
//! - Change watching
//!
//! [`AsyncCache`] is an orthogonal single-flight memoizer for values that
//! must be computed at most once per key.

pub mod cache;
pub mod config;
pub mod path;
pub mod provider;
pub mod vfs;

pub use cache::{AsyncCache, CacheError};
pub use config::{ConfigError, VfsConfig};
pub use provider::{ConfiguredLocalProvider, DefaultLocalProvider, LocalVfsProvider};
pub use vfs::{
    backends::{LocalBackend, MemoryBackend},
    AsyncStream, CaptureOutput, DirEntry, DiscardOutput, FileChangeKind, FileType, JailPolicy,
    JailVfs, MountTable, OpenMode, PassthruOutput, Vfs, VfsError, VfsFile, VfsFileEvent,
    VfsProcessHandler, VfsResult, VfsStat, WatchHandle,
};
