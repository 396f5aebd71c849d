//! In-memory filesystem backend.
//!
//! Used for scratch space and testing. All data is ephemeral.

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::io;
use std::sync::Arc;
use std::time::SystemTime;
use tokio::sync::{broadcast, mpsc};

use crate::path;
use crate::vfs::error::{VfsError, VfsResult};
use crate::vfs::ops::{DirStream, Vfs};
use crate::vfs::stream::AsyncStream;
use crate::vfs::types::{DirEntry, FileChangeKind, OpenMode, VfsFileEvent, VfsStat};
use crate::vfs::watch::{pump_events, WatchCallback, WatchHandle, EVENT_CHANNEL_CAPACITY};

/// File contents plus metadata. Shared between the tree and open streams, so
/// a stream keeps working on its file across a rename.
#[derive(Debug)]
struct FileNode {
    data: Vec<u8>,
    attr: VfsStat,
}

impl FileNode {
    fn stat(&self) -> VfsStat {
        VfsStat {
            size: self.data.len() as u64,
            ..self.attr.clone()
        }
    }

    fn touch(&mut self) {
        self.attr.mtime = SystemTime::now();
    }
}

/// Entry in the memory filesystem.
#[derive(Debug, Clone)]
enum Entry {
    File(Arc<RwLock<FileNode>>),
    Directory { attr: VfsStat },
}

type Tree = BTreeMap<String, Entry>;

/// In-memory filesystem backend.
///
/// Entries are keyed by their normalized relative path; `""` is the root,
/// which always exists. Every mutation is broadcast to active watchers.
#[derive(Debug)]
pub struct MemoryBackend {
    entries: RwLock<Tree>,
    events: broadcast::Sender<VfsFileEvent>,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    /// Create a new empty in-memory filesystem.
    pub fn new() -> Self {
        let mut entries = BTreeMap::new();
        entries.insert(
            String::new(),
            Entry::Directory {
                attr: VfsStat::directory(0o755),
            },
        );
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            entries: RwLock::new(entries),
            events,
        }
    }

    fn emit(&self, path: &str, kind: FileChangeKind) {
        // No receivers is the common case.
        let _ = self.events.send(VfsFileEvent::new(path, kind));
    }

    /// The parent of `key` must exist and be a directory.
    fn check_parent(entries: &Tree, key: &str) -> VfsResult<()> {
        let parent = path::folder(key);
        match entries.get(parent) {
            Some(Entry::Directory { .. }) => Ok(()),
            Some(Entry::File(_)) => Err(VfsError::not_a_directory(parent)),
            None => Err(VfsError::not_found(parent)),
        }
    }

    fn has_children(entries: &Tree, key: &str) -> bool {
        let prefix = format!("{key}/");
        entries
            .range(prefix.clone()..)
            .next()
            .is_some_and(|(k, _)| k.starts_with(&prefix))
    }

    fn is_child_of(dir: &str, key: &str) -> bool {
        !key.is_empty() && path::folder(key) == dir
    }
}

#[async_trait]
impl Vfs for MemoryBackend {
    fn describe(&self) -> String {
        "MemoryVfs".to_string()
    }

    async fn open(&self, path: &str, mode: OpenMode) -> VfsResult<Box<dyn AsyncStream>> {
        let key = path::relative(path);
        let flags = mode.flags();

        let (node, created) = {
            let mut entries = self.entries.write();
            match entries.get(&key) {
                Some(Entry::Directory { .. }) => return Err(VfsError::is_a_directory(key)),
                Some(Entry::File(node)) => {
                    if flags.exclusive {
                        return Err(VfsError::already_exists(key));
                    }
                    if flags.truncate {
                        let mut file = node.write();
                        file.data.clear();
                        file.touch();
                    }
                    (node.clone(), false)
                }
                None => {
                    if !flags.create {
                        return Err(VfsError::not_found(key));
                    }
                    Self::check_parent(&entries, &key)?;
                    let node = Arc::new(RwLock::new(FileNode {
                        data: Vec::new(),
                        attr: VfsStat::file(0, 0o644),
                    }));
                    entries.insert(key.clone(), Entry::File(node.clone()));
                    (node, true)
                }
            }
        };

        if created {
            self.emit(&key, FileChangeKind::Created);
        }

        let position = if flags.append { node.read().data.len() as u64 } else { 0 };
        Ok(Box::new(MemoryStream {
            node,
            path: key,
            position,
            writable: flags.write,
            append: flags.append,
            closed: false,
            events: self.events.clone(),
        }))
    }

    async fn stat(&self, path: &str) -> VfsResult<VfsStat> {
        let key = path::relative(path);
        let entries = self.entries.read();
        Ok(match entries.get(&key) {
            Some(Entry::File(node)) => node.read().stat(),
            Some(Entry::Directory { attr }) => attr.clone(),
            None => VfsStat::missing(),
        })
    }

    async fn read_chunk(&self, path: &str, offset: u64, size: usize) -> VfsResult<Vec<u8>> {
        let key = path::relative(path);
        let entries = self.entries.read();
        match entries.get(&key) {
            Some(Entry::File(node)) => {
                let file = node.read();
                let start = (offset as usize).min(file.data.len());
                let end = start.saturating_add(size).min(file.data.len());
                Ok(file.data[start..end].to_vec())
            }
            Some(Entry::Directory { .. }) => Err(VfsError::is_a_directory(key)),
            None => Err(VfsError::not_found(key)),
        }
    }

    async fn delete(&self, path: &str) -> VfsResult<()> {
        let key = path::relative(path);
        if key.is_empty() {
            return Err(VfsError::permission_denied("cannot remove root"));
        }

        {
            let mut entries = self.entries.write();
            match entries.get(&key) {
                Some(Entry::Directory { .. }) if Self::has_children(&entries, &key) => {
                    return Err(VfsError::directory_not_empty(key));
                }
                Some(_) => {
                    entries.remove(&key);
                }
                None => return Err(VfsError::not_found(key)),
            }
        }

        self.emit(&key, FileChangeKind::Deleted);
        Ok(())
    }

    async fn mkdir(&self, path: &str) -> VfsResult<()> {
        let key = path::relative(path);

        {
            let mut entries = self.entries.write();
            match entries.get(&key) {
                Some(Entry::Directory { .. }) => return Ok(()),
                Some(Entry::File(_)) => return Err(VfsError::already_exists(key)),
                None => {}
            }
            Self::check_parent(&entries, &key)?;
            entries.insert(
                key.clone(),
                Entry::Directory {
                    attr: VfsStat::directory(0o755),
                },
            );
        }

        self.emit(&key, FileChangeKind::Created);
        Ok(())
    }

    async fn rename(&self, from: &str, to: &str) -> VfsResult<()> {
        let from_key = path::relative(from);
        let to_key = path::relative(to);
        if from_key.is_empty() || to_key.is_empty() {
            return Err(VfsError::permission_denied("cannot rename root"));
        }
        if from_key == to_key {
            return Ok(());
        }
        if to_key.starts_with(&format!("{from_key}/")) {
            return Err(VfsError::invalid_path(format!(
                "cannot move {from_key} into itself"
            )));
        }

        {
            let mut entries = self.entries.write();
            if !entries.contains_key(&from_key) {
                return Err(VfsError::not_found(from_key));
            }
            Self::check_parent(&entries, &to_key)?;
            if let Some(Entry::Directory { .. }) = entries.get(&to_key) {
                return Err(VfsError::already_exists(to_key));
            }

            let prefix = format!("{from_key}/");
            let moved: Vec<String> = entries
                .range(from_key.clone()..)
                .map(|(k, _)| k)
                .take_while(|k| k.starts_with(&from_key))
                .filter(|k| **k == from_key || k.starts_with(&prefix))
                .cloned()
                .collect();

            for old in moved {
                if let Some(entry) = entries.remove(&old) {
                    let new = format!("{to_key}{}", &old[from_key.len()..]);
                    entries.insert(new, entry);
                }
            }
        }

        self.emit(&from_key, FileChangeKind::Deleted);
        self.emit(&to_key, FileChangeKind::Created);
        Ok(())
    }

    async fn list(&self, path: &str) -> VfsResult<DirStream> {
        let key = path::relative(path);
        let entries = self.entries.read();

        match entries.get(&key) {
            Some(Entry::Directory { .. }) => {}
            Some(Entry::File(_)) => return Err(VfsError::not_a_directory(key)),
            None => return Err(VfsError::not_found(key)),
        }

        let children: Vec<VfsResult<DirEntry>> = entries
            .iter()
            .filter(|(k, _)| Self::is_child_of(&key, k))
            .map(|(k, entry)| {
                let name = path::basename(k);
                Ok(match entry {
                    Entry::File(_) => DirEntry::file(name),
                    Entry::Directory { .. } => DirEntry::directory(name),
                })
            })
            .collect();

        Ok(stream::iter(children).boxed())
    }

    async fn watch(&self, path: &str, handler: WatchCallback) -> VfsResult<WatchHandle> {
        let prefix = path::relative(path);
        let mut events = self.events.subscribe();
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = tx.closed() => break,
                    event = events.recv() => match event {
                        Ok(event) => {
                            if is_under(&prefix, &event.path) && tx.send(event).await.is_err() {
                                break;
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            tracing::warn!(skipped, "memory watcher lagged, events dropped");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                }
            }
        });

        Ok(pump_events(rx, handler))
    }
}

/// Returns true if `path` is `prefix` or lies below it.
fn is_under(prefix: &str, path: &str) -> bool {
    prefix.is_empty()
        || path == prefix
        || path
            .strip_prefix(prefix)
            .is_some_and(|rest| rest.starts_with('/'))
}

/// Resize file contents, zero-filling growth. Sizes that cannot be
/// allocated are an I/O error rather than an abort.
fn resize_data(data: &mut Vec<u8>, length: u64, path: &str) -> VfsResult<()> {
    let length = usize::try_from(length).map_err(|_| too_large(path, length))?;
    if let Some(extra) = length.checked_sub(data.len()) {
        data.try_reserve_exact(extra)
            .map_err(|_| too_large(path, length as u64))?;
    }
    data.resize(length, 0);
    Ok(())
}

fn too_large(path: &str, length: u64) -> VfsError {
    VfsError::Io(io::Error::new(
        io::ErrorKind::OutOfMemory,
        format!("{path}: cannot hold {length} bytes in memory"),
    ))
}

/// Stream over one in-memory file.
struct MemoryStream {
    node: Arc<RwLock<FileNode>>,
    path: String,
    position: u64,
    writable: bool,
    append: bool,
    closed: bool,
    events: broadcast::Sender<VfsFileEvent>,
}

impl MemoryStream {
    fn check_open(&self) -> VfsResult<()> {
        if self.closed {
            Err(VfsError::other(format!("stream closed: {}", self.path)))
        } else {
            Ok(())
        }
    }

    fn check_writable(&self) -> VfsResult<()> {
        self.check_open()?;
        if self.writable {
            Ok(())
        } else {
            Err(VfsError::permission_denied(format!(
                "{} was opened read-only",
                self.path
            )))
        }
    }

    fn modified(&self) {
        let _ = self
            .events
            .send(VfsFileEvent::new(self.path.clone(), FileChangeKind::Modified));
    }
}

#[async_trait]
impl AsyncStream for MemoryStream {
    async fn read(&mut self, buf: &mut [u8]) -> VfsResult<usize> {
        self.check_open()?;
        let file = self.node.read();
        let start = (self.position as usize).min(file.data.len());
        let n = buf.len().min(file.data.len() - start);
        buf[..n].copy_from_slice(&file.data[start..start + n]);
        drop(file);
        self.position += n as u64;
        Ok(n)
    }

    async fn write(&mut self, data: &[u8]) -> VfsResult<()> {
        self.check_writable()?;
        {
            let mut file = self.node.write();
            if self.append {
                self.position = file.data.len() as u64;
            }
            let end = self
                .position
                .checked_add(data.len() as u64)
                .ok_or_else(|| too_large(&self.path, u64::MAX))?;
            if end > file.data.len() as u64 {
                resize_data(&mut file.data, end, &self.path)?;
            }
            // end fits in memory now
            let end = end as usize;
            file.data[end - data.len()..end].copy_from_slice(data);
            file.touch();
        }
        self.position += data.len() as u64;
        self.modified();
        Ok(())
    }

    fn position(&self) -> u64 {
        self.position
    }

    async fn seek(&mut self, position: u64) -> VfsResult<()> {
        self.check_open()?;
        self.position = position;
        Ok(())
    }

    async fn length(&mut self) -> VfsResult<u64> {
        self.check_open()?;
        Ok(self.node.read().data.len() as u64)
    }

    async fn set_length(&mut self, length: u64) -> VfsResult<()> {
        self.check_writable()?;
        {
            let mut file = self.node.write();
            resize_data(&mut file.data, length, &self.path)?;
            file.touch();
        }
        self.modified();
        Ok(())
    }

    async fn close(&mut self) -> VfsResult<()> {
        self.check_open()?;
        self.closed = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::TryStreamExt;

    async fn names(fs: &MemoryBackend, path: &str) -> Vec<String> {
        let entries: Vec<DirEntry> = fs.list(path).await.unwrap().try_collect().await.unwrap();
        entries.into_iter().map(|e| e.name).collect()
    }

    #[tokio::test]
    async fn test_create_and_read() {
        let fs = MemoryBackend::new();
        fs.write_chunk("test.txt", b"hello world", 0, true).await.unwrap();

        let data = fs.read_chunk("test.txt", 0, 100).await.unwrap();
        assert_eq!(data, b"hello world");
    }

    #[tokio::test]
    async fn test_partial_read() {
        let fs = MemoryBackend::new();
        fs.write_chunk("test.txt", b"hello world", 0, true).await.unwrap();

        let data = fs.read_chunk("test.txt", 6, 5).await.unwrap();
        assert_eq!(data, b"world");
    }

    #[tokio::test]
    async fn test_write_without_resize_is_clipped() {
        let fs = MemoryBackend::new();
        fs.write_chunk("f", b"abcd", 0, true).await.unwrap();
        fs.write_chunk("f", b"XYZW", 2, false).await.unwrap();
        assert_eq!(fs.read_chunk("f", 0, 100).await.unwrap(), b"abXY");

        let missing = fs.write_chunk("nope", b"x", 0, false).await;
        assert!(matches!(missing, Err(VfsError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_write_past_end_zero_fills() {
        let fs = MemoryBackend::new();
        fs.write_chunk("f", b"ab", 4, true).await.unwrap();
        assert_eq!(fs.read_chunk("f", 0, 100).await.unwrap(), b"\0\0\0\0ab");
    }

    #[tokio::test]
    async fn test_mkdir_and_list() {
        let fs = MemoryBackend::new();
        fs.mkdir("subdir").await.unwrap();
        fs.write_chunk("subdir/file.txt", b"", 0, true).await.unwrap();
        fs.write_chunk("root.txt", b"", 0, true).await.unwrap();

        assert_eq!(names(&fs, "").await, vec!["root.txt", "subdir"]);
        assert_eq!(names(&fs, "/subdir").await, vec!["file.txt"]);
    }

    #[tokio::test]
    async fn test_mkdir_needs_parent() {
        let fs = MemoryBackend::new();
        let result = fs.mkdir("a/b").await;
        assert!(matches!(result, Err(VfsError::NotFound(_))));

        fs.mkdir("a").await.unwrap();
        fs.mkdir("a").await.unwrap();
        fs.mkdir("a/b").await.unwrap();
        assert!(fs.stat("a/b").await.unwrap().is_directory());
    }

    #[tokio::test]
    async fn test_delete() {
        let fs = MemoryBackend::new();
        fs.write_chunk("test.txt", b"x", 0, true).await.unwrap();
        assert!(fs.stat("test.txt").await.unwrap().exists);

        fs.delete("test.txt").await.unwrap();
        assert!(!fs.stat("test.txt").await.unwrap().exists);
    }

    #[tokio::test]
    async fn test_delete_not_empty() {
        let fs = MemoryBackend::new();
        fs.mkdir("nonempty").await.unwrap();
        fs.write_chunk("nonempty/file.txt", b"", 0, true).await.unwrap();

        let result = fs.delete("nonempty").await;
        assert!(matches!(result, Err(VfsError::DirectoryNotEmpty(_))));

        fs.delete("nonempty/file.txt").await.unwrap();
        fs.delete("nonempty").await.unwrap();
    }

    #[tokio::test]
    async fn test_rename() {
        let fs = MemoryBackend::new();
        fs.write_chunk("old.txt", b"content", 0, true).await.unwrap();

        fs.rename("old.txt", "new.txt").await.unwrap();

        assert!(!fs.stat("old.txt").await.unwrap().exists);
        assert_eq!(fs.read_chunk("new.txt", 0, 100).await.unwrap(), b"content");
    }

    #[tokio::test]
    async fn test_rename_directory_moves_children() {
        let fs = MemoryBackend::new();
        fs.mkdir("a").await.unwrap();
        fs.mkdir("a/b").await.unwrap();
        fs.write_chunk("a/b/c.txt", b"deep", 0, true).await.unwrap();
        fs.write_chunk("ab.txt", b"sibling", 0, true).await.unwrap();

        fs.rename("a", "z").await.unwrap();

        assert_eq!(fs.read_chunk("z/b/c.txt", 0, 10).await.unwrap(), b"deep");
        assert!(!fs.stat("a").await.unwrap().exists);
        assert_eq!(fs.read_chunk("ab.txt", 0, 10).await.unwrap(), b"sibling");
    }

    #[tokio::test]
    async fn test_set_size() {
        let fs = MemoryBackend::new();
        fs.write_chunk("test.txt", b"hello world", 0, true).await.unwrap();

        fs.set_size("test.txt", 5).await.unwrap();
        assert_eq!(fs.read_chunk("test.txt", 0, 100).await.unwrap(), b"hello");

        fs.set_size("test.txt", 7).await.unwrap();
        assert_eq!(fs.stat("test.txt").await.unwrap().size, 7);
    }

    #[tokio::test]
    async fn test_huge_offsets_are_errors() {
        let fs = MemoryBackend::new();
        fs.write_chunk("f", b"keep", 0, true).await.unwrap();

        let write = fs.write_chunk("f", b"x", u64::MAX, true).await;
        assert!(matches!(write, Err(VfsError::Io(_))), "{write:?}");
        let grow = fs.set_size("f", u64::MAX).await;
        assert!(matches!(grow, Err(VfsError::Io(_))), "{grow:?}");

        assert_eq!(fs.read_chunk("f", 0, 100).await.unwrap(), b"keep");
        // clipped writes never grow the file
        fs.write_chunk("f", b"x", u64::MAX, false).await.unwrap();
        assert_eq!(fs.stat("f").await.unwrap().size, 4);
    }

    #[tokio::test]
    async fn test_open_modes() {
        let fs = MemoryBackend::new();
        assert!(matches!(
            fs.open("f", OpenMode::Read).await,
            Err(VfsError::NotFound(_))
        ));

        let mut s = fs.open("f", OpenMode::CreateNew).await.unwrap();
        s.write(b"one").await.unwrap();
        s.close().await.unwrap();
        assert!(matches!(
            fs.open("f", OpenMode::CreateNew).await,
            Err(VfsError::AlreadyExists(_))
        ));

        let mut s = fs.open("f", OpenMode::Append).await.unwrap();
        s.write(b"two").await.unwrap();
        s.close().await.unwrap();
        assert_eq!(fs.read_chunk("f", 0, 100).await.unwrap(), b"onetwo");

        let mut s = fs.open("f", OpenMode::Read).await.unwrap();
        assert!(s.write(b"x").await.is_err());
        s.close().await.unwrap();
        assert!(s.read(&mut [0u8; 4]).await.is_err());

        let s = fs.open("f", OpenMode::CreateOrTruncate).await.unwrap();
        drop(s);
        assert_eq!(fs.stat("f").await.unwrap().size, 0);
    }

    #[tokio::test]
    async fn test_path_normalization() {
        let fs = MemoryBackend::new();
        fs.mkdir("a").await.unwrap();
        fs.mkdir("a/b").await.unwrap();
        fs.write_chunk("/a/b/c.txt", b"", 0, true).await.unwrap();

        assert!(fs.stat("a/b/c.txt").await.unwrap().exists);
        assert!(fs.stat("/a/b/c.txt").await.unwrap().exists);
        assert!(fs.stat("a/./b/c.txt").await.unwrap().exists);
        assert!(fs.stat("a/b/../b/c.txt").await.unwrap().exists);
    }

    #[tokio::test]
    async fn test_exec_unsupported() {
        let fs = MemoryBackend::new();
        let mut out = crate::vfs::process::DiscardOutput;
        let result = fs.exec("", &["ls".to_string()], &mut out).await;
        assert!(matches!(result, Err(VfsError::Unsupported("exec"))));
    }

    #[test]
    fn test_is_under() {
        assert!(is_under("", "a/b"));
        assert!(is_under("a", "a"));
        assert!(is_under("a", "a/b"));
        assert!(!is_under("a", "ab"));
    }
}
