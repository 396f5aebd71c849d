//! VFS mount table with longest-prefix routing.
//!
//! Routes filesystem operations to the appropriate backend based on path.

use async_trait::async_trait;
use futures::stream::{self, StreamExt, TryStreamExt};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::path;
use super::error::{VfsError, VfsResult};
use super::ops::{DirStream, Vfs};
use super::process::VfsProcessHandler;
use super::stream::AsyncStream;
use super::types::{DirEntry, OpenMode, VfsFileEvent, VfsStat};
use super::watch::{WatchCallback, WatchHandle};

/// Information about a mount point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountInfo {
    /// The mount path (e.g., "/mnt/project").
    pub path: String,
    /// Whether this mount is read-only.
    pub read_only: bool,
}

/// Routes filesystem operations to mounted backends.
///
/// Mount points are matched by longest prefix. For example, if `/mnt` and
/// `/mnt/project` are both mounted, a path like `/mnt/project/src/main.rs`
/// will be routed to the `/mnt/project` mount.
pub struct MountTable {
    /// Mount points, keyed by normalized path.
    mounts: RwLock<BTreeMap<String, Arc<dyn Vfs>>>,
}

impl std::fmt::Debug for MountTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MountTable")
            .field("mounts", &"<locked>")
            .finish()
    }
}

impl Default for MountTable {
    fn default() -> Self {
        Self::new()
    }
}

impl MountTable {
    /// Create a new empty mount table.
    pub fn new() -> Self {
        Self {
            mounts: RwLock::new(BTreeMap::new()),
        }
    }

    /// Mount a filesystem at the given path, replacing any existing mount.
    pub async fn mount(&self, at: &str, fs: impl Vfs + 'static) {
        self.mount_arc(at, Arc::new(fs)).await;
    }

    /// Mount a filesystem (already wrapped in Arc) at the given path.
    pub async fn mount_arc(&self, at: &str, fs: Arc<dyn Vfs>) {
        let at = Self::normalize_mount_path(at);
        tracing::info!(mount = %at, backend = %fs.describe(), "mounted");
        self.mounts.write().await.insert(at, fs);
    }

    /// Unmount the filesystem at the given path.
    ///
    /// Returns `true` if a mount was removed, `false` if nothing was mounted there.
    pub async fn unmount(&self, at: &str) -> bool {
        let at = Self::normalize_mount_path(at);
        self.mounts.write().await.remove(&at).is_some()
    }

    /// List all current mounts.
    pub async fn list_mounts(&self) -> Vec<MountInfo> {
        let mounts = self.mounts.read().await;
        mounts
            .iter()
            .map(|(path, fs)| MountInfo {
                path: path.clone(),
                read_only: fs.read_only(),
            })
            .collect()
    }

    /// Normalize a mount path: leading `/`, no trailing slash.
    fn normalize_mount_path(at: &str) -> String {
        format!("/{}", path::relative(at))
    }

    /// Find the mount point for a given path.
    ///
    /// Returns the mount, its path, and the path relative to that mount.
    async fn find_mount(&self, target: &str) -> VfsResult<(Arc<dyn Vfs>, String, String)> {
        let normalized = Self::normalize_mount_path(target);
        let mounts = self.mounts.read().await;

        let best = mounts
            .iter()
            .filter(|(mount_path, _)| {
                mount_path.as_str() == "/"
                    || normalized == **mount_path
                    || normalized.starts_with(&format!("{mount_path}/"))
            })
            .max_by_key(|(mount_path, _)| mount_path.len());

        match best {
            Some((mount_path, fs)) => {
                let relative = normalized[mount_path.len()..].trim_start_matches('/');
                Ok((Arc::clone(fs), mount_path.clone(), relative.to_string()))
            }
            None => Err(VfsError::no_mount_point(target)),
        }
    }

    async fn is_mount_point(&self, target: &str) -> bool {
        let normalized = Self::normalize_mount_path(target);
        normalized == "/" || self.mounts.read().await.contains_key(&normalized)
    }

    /// List the root directory, synthesizing entries from mount points.
    async fn list_root(&self) -> VfsResult<Vec<DirEntry>> {
        let mounts = self.mounts.read().await;
        let mut entries = Vec::new();
        let mut seen_names = HashSet::new();

        for (mount_path, fs) in mounts.iter() {
            if mount_path == "/" {
                // Root mount: list its contents directly
                let root_entries: Vec<DirEntry> = fs.list("").await?.try_collect().await?;
                for entry in root_entries {
                    if seen_names.insert(entry.name.clone()) {
                        entries.push(entry);
                    }
                }
            } else {
                // Non-root mount: extract first path component
                let first = mount_path
                    .trim_start_matches('/')
                    .split('/')
                    .next()
                    .unwrap_or("");
                if !first.is_empty() && seen_names.insert(first.to_string()) {
                    entries.push(DirEntry::directory(first));
                }
            }
        }

        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }
}

#[async_trait]
impl Vfs for MountTable {
    fn describe(&self) -> String {
        "MountTable".to_string()
    }

    async fn open(&self, path: &str, mode: OpenMode) -> VfsResult<Box<dyn AsyncStream>> {
        let (fs, _, relative) = self.find_mount(path).await?;
        fs.open(&relative, mode).await
    }

    async fn stat(&self, path: &str) -> VfsResult<VfsStat> {
        if self.is_mount_point(path).await {
            return Ok(VfsStat::directory(0o755));
        }
        let (fs, _, relative) = self.find_mount(path).await?;
        fs.stat(&relative).await
    }

    async fn read_chunk(&self, path: &str, offset: u64, size: usize) -> VfsResult<Vec<u8>> {
        let (fs, _, relative) = self.find_mount(path).await?;
        fs.read_chunk(&relative, offset, size).await
    }

    async fn write_chunk(&self, path: &str, data: &[u8], offset: u64, resize: bool) -> VfsResult<()> {
        let (fs, _, relative) = self.find_mount(path).await?;
        fs.write_chunk(&relative, data, offset, resize).await
    }

    async fn set_size(&self, path: &str, size: u64) -> VfsResult<()> {
        let (fs, _, relative) = self.find_mount(path).await?;
        fs.set_size(&relative, size).await
    }

    async fn delete(&self, path: &str) -> VfsResult<()> {
        let (fs, _, relative) = self.find_mount(path).await?;
        fs.delete(&relative).await
    }

    async fn mkdir(&self, path: &str) -> VfsResult<()> {
        let (fs, _, relative) = self.find_mount(path).await?;
        fs.mkdir(&relative).await
    }

    async fn rename(&self, from: &str, to: &str) -> VfsResult<()> {
        // Both paths must be in the same mount
        let (from_fs, from_mount, from_relative) = self.find_mount(from).await?;
        let (_, to_mount, to_relative) = self.find_mount(to).await?;

        if from_mount != to_mount {
            return Err(VfsError::CrossDeviceLink);
        }

        from_fs.rename(&from_relative, &to_relative).await
    }

    async fn list(&self, path: &str) -> VfsResult<DirStream> {
        if path::relative(path).is_empty() {
            let entries = self.list_root().await?;
            return Ok(stream::iter(entries.into_iter().map(Ok)).boxed());
        }

        let (fs, _, relative) = self.find_mount(path).await?;
        fs.list(&relative).await
    }

    async fn watch(&self, path: &str, handler: WatchCallback) -> VfsResult<WatchHandle> {
        let (fs, mount_path, relative) = self.find_mount(path).await?;
        let prefix = path::relative(&mount_path);
        let translated: WatchCallback = Arc::new(move |event: VfsFileEvent| {
            let path = path::light_combine(&prefix, &event.path);
            handler(VfsFileEvent::new(path, event.kind));
        });
        fs.watch(&relative, translated).await
    }

    async fn exec(
        &self,
        path: &str,
        cmd_and_args: &[String],
        handler: &mut dyn VfsProcessHandler,
    ) -> VfsResult<i32> {
        let (fs, _, relative) = self.find_mount(path).await?;
        fs.exec(&relative, cmd_and_args, handler).await
    }

    async fn close(&self) -> VfsResult<()> {
        let mounts: Vec<Arc<dyn Vfs>> = self.mounts.read().await.values().cloned().collect();
        for fs in mounts {
            fs.close().await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vfs::backends::MemoryBackend;

    async fn memory_with(name: &str, data: &[u8]) -> MemoryBackend {
        let fs = MemoryBackend::new();
        fs.write_chunk(name, data, 0, true).await.unwrap();
        fs
    }

    async fn names(table: &MountTable, at: &str) -> Vec<String> {
        let entries: Vec<DirEntry> = table.list(at).await.unwrap().try_collect().await.unwrap();
        entries.into_iter().map(|e| e.name).collect()
    }

    #[tokio::test]
    async fn test_basic_mount() {
        let table = MountTable::new();
        table.mount("/scratch", memory_with("test.txt", b"hello").await).await;

        let data = table.read_chunk("/scratch/test.txt", 0, 100).await.unwrap();
        assert_eq!(data, b"hello");
    }

    #[tokio::test]
    async fn test_multiple_mounts() {
        let table = MountTable::new();
        table.mount("/scratch", memory_with("a.txt", b"scratch").await).await;
        table.mount("/data", memory_with("b.txt", b"data").await).await;

        assert_eq!(
            table.read_chunk("/scratch/a.txt", 0, 100).await.unwrap(),
            b"scratch"
        );
        assert_eq!(table.read_chunk("/data/b.txt", 0, 100).await.unwrap(), b"data");
    }

    #[tokio::test]
    async fn test_nested_mount() {
        let table = MountTable::new();
        table.mount("/mnt", memory_with("outer.txt", b"outer").await).await;
        table
            .mount("/mnt/project", memory_with("inner.txt", b"inner").await)
            .await;

        // /mnt/outer.txt should come from outer mount
        assert_eq!(
            table.read_chunk("/mnt/outer.txt", 0, 100).await.unwrap(),
            b"outer"
        );

        // /mnt/project/inner.txt should come from inner mount
        assert_eq!(
            table.read_chunk("mnt/project/inner.txt", 0, 100).await.unwrap(),
            b"inner"
        );

        // the prefix must match a whole segment
        assert!(table.read_chunk("/mnt/projectx/inner.txt", 0, 100).await.is_err());
    }

    #[tokio::test]
    async fn test_list_root() {
        let table = MountTable::new();
        table.mount("/scratch", MemoryBackend::new()).await;
        table.mount("/mnt/a", MemoryBackend::new()).await;
        table.mount("/mnt/b", MemoryBackend::new()).await;

        assert_eq!(names(&table, "/").await, vec!["mnt", "scratch"]);
    }

    #[tokio::test]
    async fn test_list_root_merges_root_mount() {
        let table = MountTable::new();
        table.mount("/", memory_with("at-root.txt", b"").await).await;
        table.mount("/scratch", MemoryBackend::new()).await;

        assert_eq!(names(&table, "").await, vec!["at-root.txt", "scratch"]);
    }

    #[tokio::test]
    async fn test_unmount() {
        let table = MountTable::new();
        table.mount("/scratch", memory_with("test.txt", b"data").await).await;

        assert!(table.read_chunk("/scratch/test.txt", 0, 100).await.is_ok());
        assert!(table.unmount("/scratch/").await);
        assert!(!table.unmount("/scratch").await);

        let result = table.read_chunk("/scratch/test.txt", 0, 100).await;
        assert!(matches!(result, Err(VfsError::NoMountPoint(_))));
    }

    #[tokio::test]
    async fn test_list_mounts() {
        let table = MountTable::new();
        table.mount("/scratch", MemoryBackend::new()).await;
        table.mount("data", MemoryBackend::new()).await;

        let paths: Vec<_> = table.list_mounts().await.into_iter().map(|m| m.path).collect();
        assert_eq!(paths, vec!["/data", "/scratch"]);
    }

    #[tokio::test]
    async fn test_root_mount() {
        let table = MountTable::new();
        table.mount("/", memory_with("at-root.txt", b"root file").await).await;

        let data = table.read_chunk("/at-root.txt", 0, 100).await.unwrap();
        assert_eq!(data, b"root file");
    }

    #[tokio::test]
    async fn test_write_through_table() {
        let table = MountTable::new();
        table.mount("/scratch", MemoryBackend::new()).await;

        table
            .write_chunk("/scratch/new.txt", b"created", 0, true)
            .await
            .unwrap();

        let data = table.read_chunk("/scratch/new.txt", 0, 100).await.unwrap();
        assert_eq!(data, b"created");
    }

    #[tokio::test]
    async fn test_stat_mount_point_and_root() {
        let table = MountTable::new();
        table.mount("/scratch", MemoryBackend::new()).await;

        assert!(table.stat("/scratch").await.unwrap().is_directory());
        assert!(table.stat("/").await.unwrap().is_directory());
    }

    #[tokio::test]
    async fn test_cross_mount_rename_fails() {
        let table = MountTable::new();
        table.mount("/a", memory_with("file.txt", b"x").await).await;
        table.mount("/b", MemoryBackend::new()).await;

        let result = table.rename("/a/file.txt", "/b/file.txt").await;
        assert!(matches!(result, Err(VfsError::CrossDeviceLink)));

        table.rename("/a/file.txt", "/a/moved.txt").await.unwrap();
        assert!(table.stat("/a/moved.txt").await.unwrap().exists);
    }
}
