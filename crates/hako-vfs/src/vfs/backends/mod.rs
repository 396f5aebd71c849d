//! VFS backends.
//!
//! Backends implement [`Vfs`](super::Vfs) for different storage types.

mod local;
mod memory;

pub use local::{LocalBackend, DEFAULT_POLL_INTERVAL};
pub use memory::MemoryBackend;
