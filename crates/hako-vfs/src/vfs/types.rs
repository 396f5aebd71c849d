//! Core VFS types.
//!
//! Snapshots and payloads exchanged across the backend contract. All of them
//! are plain values; none holds a backend resource.

use serde::{Deserialize, Serialize};
use std::time::SystemTime;

/// File type enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileType {
    /// Regular file.
    File,
    /// Directory.
    Directory,
    /// Symbolic link.
    Symlink,
}

impl FileType {
    /// Returns true if this is a regular file.
    pub fn is_file(&self) -> bool {
        matches!(self, FileType::File)
    }

    /// Returns true if this is a directory.
    pub fn is_dir(&self) -> bool {
        matches!(self, FileType::Directory)
    }

    /// Returns true if this is a symbolic link.
    pub fn is_symlink(&self) -> bool {
        matches!(self, FileType::Symlink)
    }
}

/// Immutable metadata snapshot returned by `stat`.
///
/// A missing path is reported as `exists == false`, not as an error.
/// Snapshots are never refreshed; staleness is the caller's problem.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VfsStat {
    /// Whether the entry exists.
    pub exists: bool,
    /// Size in bytes (0 for directories and missing entries).
    pub size: u64,
    /// File type. Meaningless when `exists` is false.
    pub kind: FileType,
    /// Unix permissions (e.g., 0o644).
    pub perm: u32,
    /// Last modification time.
    pub mtime: SystemTime,
    /// Last access time (optional).
    pub atime: Option<SystemTime>,
    /// Creation time (optional).
    pub ctime: Option<SystemTime>,
    /// User ID (optional, for local fs).
    pub uid: Option<u32>,
    /// Group ID (optional, for local fs).
    pub gid: Option<u32>,
}

impl VfsStat {
    /// Snapshot for a new file.
    pub fn file(size: u64, perm: u32) -> Self {
        let now = SystemTime::now();
        Self {
            exists: true,
            size,
            kind: FileType::File,
            perm,
            mtime: now,
            atime: Some(now),
            ctime: Some(now),
            uid: None,
            gid: None,
        }
    }

    /// Snapshot for a new directory.
    pub fn directory(perm: u32) -> Self {
        Self {
            size: 0,
            kind: FileType::Directory,
            ..Self::file(0, perm)
        }
    }

    /// Snapshot for a path with nothing behind it.
    pub fn missing() -> Self {
        Self {
            exists: false,
            size: 0,
            kind: FileType::File,
            perm: 0,
            mtime: SystemTime::UNIX_EPOCH,
            atime: None,
            ctime: None,
            uid: None,
            gid: None,
        }
    }

    /// Returns true if this is an existing regular file.
    pub fn is_file(&self) -> bool {
        self.exists && self.kind.is_file()
    }

    /// Returns true if this is an existing directory.
    pub fn is_directory(&self) -> bool {
        self.exists && self.kind.is_dir()
    }

    /// Returns true if this is an existing symbolic link.
    pub fn is_symlink(&self) -> bool {
        self.exists && self.kind.is_symlink()
    }
}

/// Directory entry yielded by a backend listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirEntry {
    /// Entry name (not full path).
    pub name: String,
    /// Entry type.
    pub kind: FileType,
}

impl DirEntry {
    /// Create a new directory entry.
    pub fn new(name: impl Into<String>, kind: FileType) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }

    /// Create a file entry.
    pub fn file(name: impl Into<String>) -> Self {
        Self::new(name, FileType::File)
    }

    /// Create a directory entry.
    pub fn directory(name: impl Into<String>) -> Self {
        Self::new(name, FileType::Directory)
    }
}

/// How a stream is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OpenMode {
    /// Read an existing file.
    Read,
    /// Read and write an existing file.
    Write,
    /// Write at the end of a file, creating it if missing.
    Append,
    /// Read and write, creating the file if missing.
    Create,
    /// Create a new file; fails if it exists.
    CreateNew,
    /// Create the file if missing and truncate it to zero length.
    CreateOrTruncate,
}

impl OpenMode {
    /// Expand into individual open flags.
    pub fn flags(self) -> OpenFlags {
        match self {
            OpenMode::Read => OpenFlags::default(),
            OpenMode::Write => OpenFlags {
                write: true,
                ..Default::default()
            },
            OpenMode::Append => OpenFlags {
                write: true,
                append: true,
                create: true,
                ..Default::default()
            },
            OpenMode::Create => OpenFlags {
                write: true,
                create: true,
                ..Default::default()
            },
            OpenMode::CreateNew => OpenFlags {
                write: true,
                create: true,
                exclusive: true,
                ..Default::default()
            },
            OpenMode::CreateOrTruncate => OpenFlags {
                write: true,
                create: true,
                truncate: true,
                ..Default::default()
            },
        }
    }

    /// Returns true if the mode permits writing.
    pub fn is_write(self) -> bool {
        self.flags().write
    }
}

/// Open file flags. Every open stream can read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OpenFlags {
    /// Write access requested.
    pub write: bool,
    /// Append mode.
    pub append: bool,
    /// Create if not exists.
    pub create: bool,
    /// Truncate on open.
    pub truncate: bool,
    /// Exclusive create (fail if exists).
    pub exclusive: bool,
}

/// Kind of change delivered to a watch handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileChangeKind {
    /// Entry was created.
    Created,
    /// Entry was modified.
    Modified,
    /// Entry was deleted.
    Deleted,
}

/// Change event delivered to a watch handler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VfsFileEvent {
    /// Path of the changed entry, in the watched backend's coordinates.
    pub path: String,
    /// Kind of change.
    pub kind: FileChangeKind,
}

impl VfsFileEvent {
    pub fn new(path: impl Into<String>, kind: FileChangeKind) -> Self {
        Self {
            path: path.into(),
            kind,
        }
    }
}
