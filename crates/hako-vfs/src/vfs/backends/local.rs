//! Local filesystem backend.
//!
//! Maps VFS paths onto a host directory with `tokio::fs`, watches it with
//! `notify`, and runs processes in it.

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::io::{self, SeekFrom};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio::sync::mpsc;

use crate::path;
use crate::vfs::error::{VfsError, VfsResult};
use crate::vfs::ops::{DirStream, Vfs};
use crate::vfs::process::{run_process, VfsProcessHandler};
use crate::vfs::stream::AsyncStream;
use crate::vfs::types::{DirEntry, FileChangeKind, FileType, OpenMode, VfsFileEvent, VfsStat};
use crate::vfs::watch::{pump_events, WatchCallback, WatchHandle, EVENT_CHANNEL_CAPACITY};

/// Default poll interval for platforms where `notify` falls back to polling.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Local filesystem backend.
///
/// All operations are relative to `root`. For example, if `root` is
/// `/home/amy/project`, then `open("src/main.rs")` opens
/// `/home/amy/project/src/main.rs`.
///
/// Paths are resolved lexically: `..` never climbs above `root`. Symlinks
/// inside `root` are followed; wrap the backend in a jail when the root
/// itself must be a hard boundary.
#[derive(Debug, Clone)]
pub struct LocalBackend {
    root: PathBuf,
    read_only: bool,
    poll_interval: Duration,
}

impl LocalBackend {
    /// Create a new local filesystem rooted at the given path.
    ///
    /// The root is canonicalized at construction time to handle symlinks
    /// (e.g. macOS `/tmp` → `/private/tmp`), so watch events can be mapped
    /// back onto VFS paths.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root: PathBuf = root.into();
        let root = root.canonicalize().unwrap_or(root);
        Self {
            root,
            read_only: false,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Create a read-only local filesystem.
    pub fn read_only(root: impl Into<PathBuf>) -> Self {
        Self {
            read_only: true,
            ..Self::new(root)
        }
    }

    /// Set whether this filesystem is read-only.
    pub fn set_read_only(&mut self, read_only: bool) {
        self.read_only = read_only;
    }

    /// Poll interval handed to the watcher.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Get the root path.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Host path for a VFS path.
    pub fn resolve(&self, path: &str) -> PathBuf {
        let rel = path::relative(path);
        if rel.is_empty() {
            self.root.clone()
        } else {
            self.root.join(rel)
        }
    }

    /// Map a host path reported by the watcher back to a VFS path.
    fn unresolve(&self, host: &Path) -> Option<String> {
        let rel = host.strip_prefix(&self.root).ok()?;
        let segments: Vec<_> = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        Some(segments.join("/"))
    }

    /// Check if write operations are allowed.
    fn check_writable(&self) -> VfsResult<()> {
        if self.read_only {
            Err(VfsError::ReadOnly)
        } else {
            Ok(())
        }
    }

    /// Convert std::fs::Metadata to VfsStat.
    fn metadata_to_stat(meta: &std::fs::Metadata) -> VfsStat {
        let kind = if meta.is_dir() {
            FileType::Directory
        } else if meta.file_type().is_symlink() {
            FileType::Symlink
        } else {
            FileType::File
        };

        let (perm, uid, gid) = unix_owner(meta);
        VfsStat {
            exists: true,
            size: if kind.is_dir() { 0 } else { meta.len() },
            kind,
            perm,
            mtime: meta.modified().unwrap_or(std::time::SystemTime::UNIX_EPOCH),
            atime: meta.accessed().ok(),
            ctime: meta.created().ok(),
            uid,
            gid,
        }
    }
}

#[cfg(unix)]
fn unix_owner(meta: &std::fs::Metadata) -> (u32, Option<u32>, Option<u32>) {
    use std::os::unix::fs::{MetadataExt, PermissionsExt};
    (meta.permissions().mode(), Some(meta.uid()), Some(meta.gid()))
}

#[cfg(not(unix))]
fn unix_owner(meta: &std::fs::Metadata) -> (u32, Option<u32>, Option<u32>) {
    let perm = if meta.permissions().readonly() { 0o444 } else { 0o644 };
    (perm, None, None)
}

fn entry_kind(file_type: std::fs::FileType) -> FileType {
    if file_type.is_dir() {
        FileType::Directory
    } else if file_type.is_symlink() {
        FileType::Symlink
    } else {
        FileType::File
    }
}

fn change_kind(kind: &EventKind) -> Option<FileChangeKind> {
    match kind {
        EventKind::Create(_) => Some(FileChangeKind::Created),
        EventKind::Modify(_) => Some(FileChangeKind::Modified),
        EventKind::Remove(_) => Some(FileChangeKind::Deleted),
        _ => None,
    }
}

#[async_trait]
impl Vfs for LocalBackend {
    fn describe(&self) -> String {
        format!("LocalVfs({})", self.root.display())
    }

    fn absolute_path(&self) -> String {
        self.root.to_string_lossy().into_owned()
    }

    fn read_only(&self) -> bool {
        self.read_only
    }

    async fn open(&self, path: &str, mode: OpenMode) -> VfsResult<Box<dyn AsyncStream>> {
        let flags = mode.flags();
        if flags.write {
            self.check_writable()?;
        }
        let full_path = self.resolve(path);
        tracing::debug!(path = %full_path.display(), ?mode, "open");

        if let Ok(meta) = fs::metadata(&full_path).await {
            if meta.is_dir() {
                return Err(VfsError::is_a_directory(path));
            }
        }

        let file = fs::OpenOptions::new()
            .read(true)
            .write(flags.write && !flags.append)
            .append(flags.append)
            .create(flags.create && !flags.exclusive)
            .create_new(flags.exclusive)
            .truncate(flags.truncate)
            .open(&full_path)
            .await
            .map_err(|e| match e.kind() {
                io::ErrorKind::NotFound => VfsError::not_found(path),
                io::ErrorKind::AlreadyExists => VfsError::already_exists(path),
                _ => VfsError::from(e),
            })?;

        let mut stream = LocalStream {
            file: Some(file),
            path: path.to_string(),
            position: 0,
            append: flags.append,
        };
        if flags.append {
            stream.position = stream.length().await?;
        }
        Ok(Box::new(stream))
    }

    async fn stat(&self, path: &str) -> VfsResult<VfsStat> {
        let full_path = self.resolve(path);
        match fs::metadata(&full_path).await {
            Ok(meta) => Ok(Self::metadata_to_stat(&meta)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                // A dangling symlink still exists as an entry.
                match fs::symlink_metadata(&full_path).await {
                    Ok(meta) => Ok(Self::metadata_to_stat(&meta)),
                    Err(_) => Ok(VfsStat::missing()),
                }
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, path: &str) -> VfsResult<()> {
        self.check_writable()?;
        let full_path = self.resolve(path);
        if full_path == self.root {
            return Err(VfsError::permission_denied("cannot remove root"));
        }
        tracing::debug!(path = %full_path.display(), "delete");

        let meta = fs::symlink_metadata(&full_path)
            .await
            .map_err(|e| match e.kind() {
                io::ErrorKind::NotFound => VfsError::not_found(path),
                _ => VfsError::from(e),
            })?;
        let result = if meta.is_dir() {
            fs::remove_dir(&full_path).await
        } else {
            fs::remove_file(&full_path).await
        };

        result.map_err(|e| match e.kind() {
            io::ErrorKind::DirectoryNotEmpty => VfsError::directory_not_empty(path),
            _ => VfsError::from(e),
        })
    }

    async fn mkdir(&self, path: &str) -> VfsResult<()> {
        self.check_writable()?;
        let full_path = self.resolve(path);
        tracing::debug!(path = %full_path.display(), "mkdir");

        match fs::create_dir(&full_path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                if fs::metadata(&full_path).await?.is_dir() {
                    Ok(())
                } else {
                    Err(VfsError::already_exists(path))
                }
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn rename(&self, from: &str, to: &str) -> VfsResult<()> {
        self.check_writable()?;
        let from_path = self.resolve(from);
        let to_path = self.resolve(to);
        tracing::debug!(from = %from_path.display(), to = %to_path.display(), "rename");

        fs::rename(&from_path, &to_path)
            .await
            .map_err(VfsError::from)
    }

    async fn list(&self, path: &str) -> VfsResult<DirStream> {
        let full_path = self.resolve(path);
        let dir = fs::read_dir(&full_path).await.map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => VfsError::not_found(path),
            io::ErrorKind::NotADirectory => VfsError::not_a_directory(path),
            _ => VfsError::from(e),
        })?;

        let entries = stream::unfold(Some(dir), |state| async move {
            let mut dir = state?;
            match dir.next_entry().await {
                Ok(Some(entry)) => {
                    let name = entry.file_name().to_string_lossy().into_owned();
                    match entry.file_type().await {
                        Ok(ft) => Some((Ok(DirEntry::new(name, entry_kind(ft))), Some(dir))),
                        Err(e) => Some((Err(VfsError::from(e)), None)),
                    }
                }
                Ok(None) => None,
                Err(e) => Some((Err(VfsError::from(e)), None)),
            }
        });

        Ok(entries.boxed())
    }

    async fn watch(&self, path: &str, handler: WatchCallback) -> VfsResult<WatchHandle> {
        let target = self.resolve(path);
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let backend = self.clone();

        let mut watcher = RecommendedWatcher::new(
            move |result: Result<Event, notify::Error>| {
                let event = match result {
                    Ok(event) => event,
                    Err(e) => {
                        tracing::warn!(error = %e, "watch error");
                        return;
                    }
                };
                let Some(kind) = change_kind(&event.kind) else {
                    return;
                };
                for host in &event.paths {
                    if let Some(path) = backend.unresolve(host) {
                        // Non-blocking; a full channel drops the event.
                        let _ = tx.try_send(VfsFileEvent::new(path, kind));
                    }
                }
            },
            notify::Config::default().with_poll_interval(self.poll_interval),
        )
        .map_err(|e| VfsError::other(format!("failed to create watcher: {e}")))?;

        watcher
            .watch(&target, RecursiveMode::Recursive)
            .map_err(|e| VfsError::other(format!("failed to watch {}: {e}", target.display())))?;

        tracing::info!(path = %target.display(), "watching local path");
        Ok(pump_events(rx, handler).with_source(watcher))
    }

    async fn exec(
        &self,
        path: &str,
        cmd_and_args: &[String],
        handler: &mut dyn VfsProcessHandler,
    ) -> VfsResult<i32> {
        let cwd = self.resolve(path);
        run_process(&cwd, cmd_and_args, handler).await
    }
}

/// Stream over one host file.
struct LocalStream {
    file: Option<fs::File>,
    path: String,
    position: u64,
    append: bool,
}

impl LocalStream {
    fn file(&mut self) -> VfsResult<&mut fs::File> {
        self.file
            .as_mut()
            .ok_or_else(|| VfsError::other(format!("stream closed: {}", self.path)))
    }
}

#[async_trait]
impl AsyncStream for LocalStream {
    async fn read(&mut self, buf: &mut [u8]) -> VfsResult<usize> {
        let n = self.file()?.read(buf).await?;
        self.position += n as u64;
        Ok(n)
    }

    async fn write(&mut self, data: &[u8]) -> VfsResult<()> {
        let append = self.append;
        let file = self.file()?;
        file.write_all(data).await?;
        if append {
            file.flush().await?;
            self.position = file.stream_position().await?;
        } else {
            self.position += data.len() as u64;
        }
        Ok(())
    }

    fn position(&self) -> u64 {
        self.position
    }

    async fn seek(&mut self, position: u64) -> VfsResult<()> {
        self.file()?.seek(SeekFrom::Start(position)).await?;
        self.position = position;
        Ok(())
    }

    async fn length(&mut self) -> VfsResult<u64> {
        let file = self.file()?;
        file.flush().await?;
        Ok(file.metadata().await?.len())
    }

    async fn set_length(&mut self, length: u64) -> VfsResult<()> {
        let file = self.file()?;
        file.flush().await?;
        file.set_len(length).await?;
        Ok(())
    }

    async fn close(&mut self) -> VfsResult<()> {
        let mut file = self
            .file
            .take()
            .ok_or_else(|| VfsError::other(format!("stream closed: {}", self.path)))?;
        file.flush().await?;
        Ok(())
    }
}
