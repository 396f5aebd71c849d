//! File handles.
//!
//! A [`VfsFile`] is a `(backend, path)` pair. It holds no other state: every
//! operation is composed from the backend's [`Vfs`] calls, so the same
//! handle code works unchanged on local disk, in memory, or inside a jail.

use std::fmt;
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};

use crate::path;
use super::error::{VfsError, VfsResult};
use super::jail::{JailPolicy, JailVfs};
use super::ops::{DirStream, Vfs};
use super::process::{CaptureOutput, PassthruOutput, VfsProcessHandler};
use super::stream::{close_after, AsyncStream};
use super::types::{OpenMode, VfsFileEvent, VfsStat};
use super::watch::WatchHandle;

/// Callback for [`VfsFile::copy_to_tree`], invoked with `(src, dst)` before
/// each node is copied.
pub type CopyNotify<'a> = dyn FnMut(&VfsFile, &VfsFile) + Send + 'a;

/// Handle to a path on a backend.
///
/// Cheap to clone. Two handles are equal when they share the same backend
/// instance and their paths normalize to the same location.
#[derive(Clone)]
pub struct VfsFile {
    vfs: Arc<dyn Vfs>,
    path: String,
}

impl VfsFile {
    pub fn new(vfs: Arc<dyn Vfs>, path: impl Into<String>) -> Self {
        Self {
            vfs,
            path: path.into(),
        }
    }

    /// Backend this handle delegates to.
    pub fn vfs(&self) -> &Arc<dyn Vfs> {
        &self.vfs
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    // ========================================================================
    // Naming
    // ========================================================================

    /// Handle for `relative` resolved against this path. Touches no storage.
    pub fn get(&self, relative: &str) -> VfsFile {
        VfsFile::new(self.vfs.clone(), path::combine(&self.path, relative))
    }

    /// Child named `name`, joined without normalization.
    fn child(&self, name: &str) -> VfsFile {
        VfsFile::new(self.vfs.clone(), path::light_combine(&self.path, name))
    }

    pub fn basename(&self) -> &str {
        path::basename(&self.path)
    }

    pub fn extension(&self) -> &str {
        path::extension(&self.path)
    }

    pub fn basename_without_extension(&self) -> &str {
        path::PathInfo::new(&self.path).basename_without_extension()
    }

    pub fn full_name_without_extension(&self) -> &str {
        path::PathInfo::new(&self.path).full_name_without_extension()
    }

    /// Sibling with the extension replaced. An empty `ext` removes it.
    pub fn with_extension(&self, ext: &str) -> VfsFile {
        let stem = self.full_name_without_extension();
        let path = if ext.is_empty() {
            stem.to_string()
        } else {
            format!("{stem}.{ext}")
        };
        VfsFile::new(self.vfs.clone(), path)
    }

    /// Sibling with `.ext` appended to the full name.
    pub fn append_extension(&self, ext: &str) -> VfsFile {
        VfsFile::new(self.vfs.clone(), format!("{}.{ext}", self.path))
    }

    /// Host-level location: the backend's absolute path joined with this path.
    pub fn absolute_path(&self) -> String {
        path::light_combine(&self.vfs.absolute_path(), &self.path)
    }

    pub fn parent(&self) -> VfsFile {
        let normalized = path::normalize(&self.path);
        VfsFile::new(self.vfs.clone(), path::folder(&normalized).to_string())
    }

    /// Root of this handle's backend.
    pub fn root(&self) -> VfsFile {
        VfsFile::new(self.vfs.clone(), "")
    }

    // ========================================================================
    // Streams
    // ========================================================================

    pub async fn open(&self, mode: OpenMode) -> VfsResult<Box<dyn AsyncStream>> {
        self.vfs.open(&self.path, mode).await
    }

    /// Open a stream, run `body` on it, and close it on every exit path.
    ///
    /// ```ignore
    /// let head = file
    ///     .open_use(OpenMode::Read, |s| Box::pin(async move {
    ///         let mut buf = vec![0u8; 16];
    ///         let n = s.read(&mut buf).await?;
    ///         buf.truncate(n);
    ///         Ok(buf)
    ///     }))
    ///     .await?;
    /// ```
    pub async fn open_use<T, F>(&self, mode: OpenMode, body: F) -> VfsResult<T>
    where
        F: for<'s> FnOnce(&'s mut (dyn AsyncStream + 'static)) -> BoxFuture<'s, VfsResult<T>>,
    {
        let mut stream = self.open(mode).await?;
        let result = body(stream.as_mut()).await;
        close_after(stream, result).await
    }

    /// Whole contents.
    pub async fn read(&self) -> VfsResult<Vec<u8>> {
        self.open_use(OpenMode::Read, |s| s.read_all()).await
    }

    pub async fn read_string(&self) -> VfsResult<String> {
        let bytes = self.read().await?;
        String::from_utf8(bytes).map_err(|e| {
            VfsError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e))
        })
    }

    /// Replace the contents with `data`, creating the file if needed.
    pub async fn write(&self, data: &[u8]) -> VfsResult<()> {
        let mut stream = self.open(OpenMode::CreateOrTruncate).await?;
        let result = stream.write(data).await;
        close_after(stream, result).await
    }

    pub async fn write_string(&self, text: &str) -> VfsResult<()> {
        self.write(text.as_bytes()).await
    }

    /// Replace the contents with everything left in `src`.
    pub async fn write_stream(&self, src: &mut dyn AsyncStream) -> VfsResult<u64> {
        let mut stream = self.open(OpenMode::CreateOrTruncate).await?;
        let result = src.copy_to(stream.as_mut()).await;
        close_after(stream, result).await
    }

    /// Replace the contents with those of `src`.
    pub async fn write_file(&self, src: &VfsFile) -> VfsResult<u64> {
        src.copy_to(self).await
    }

    /// Stream this file into `target`. Returns the number of bytes copied.
    pub async fn copy_to(&self, target: &VfsFile) -> VfsResult<u64> {
        let mut src = self.open(OpenMode::Read).await?;
        let mut dst = match target.open(OpenMode::CreateOrTruncate).await {
            Ok(dst) => dst,
            Err(e) => return close_after(src, Err(e)).await,
        };
        let result = src.copy_to(dst.as_mut()).await;
        let result = close_after(dst, result).await;
        close_after(src, result).await
    }

    /// Copy this file or directory tree onto `target`, depth-first.
    ///
    /// `notify` sees every `(src, dst)` pair before it is acted on.
    /// Directories are created before their children. Nothing is rolled
    /// back on failure.
    pub fn copy_to_tree<'a>(
        &'a self,
        target: &'a VfsFile,
        notify: &'a mut CopyNotify<'_>,
    ) -> BoxFuture<'a, VfsResult<()>> {
        async move {
            notify(self, target);
            if self.is_directory().await {
                if !target.exists().await {
                    target.mkdir().await?;
                }
                let mut children = self.list().await?;
                while let Some(child) = children.try_next().await? {
                    let dst = target.get(child.basename());
                    child.copy_to_tree(&dst, &mut *notify).await?;
                }
                Ok(())
            } else {
                self.copy_to(target).await.map(|_| ())
            }
        }
        .boxed()
    }

    // ========================================================================
    // Chunks and metadata
    // ========================================================================

    pub async fn read_chunk(&self, offset: u64, size: usize) -> VfsResult<Vec<u8>> {
        self.vfs.read_chunk(&self.path, offset, size).await
    }

    pub async fn write_chunk(&self, data: &[u8], offset: u64, resize: bool) -> VfsResult<()> {
        self.vfs.write_chunk(&self.path, data, offset, resize).await
    }

    pub async fn stat(&self) -> VfsResult<VfsStat> {
        self.vfs.stat(&self.path).await
    }

    pub async fn size(&self) -> VfsResult<u64> {
        Ok(self.stat().await?.size)
    }

    /// False when the path is missing or `stat` fails.
    pub async fn exists(&self) -> bool {
        self.stat().await.map(|s| s.exists).unwrap_or(false)
    }

    /// False when the path is not a directory or `stat` fails.
    pub async fn is_directory(&self) -> bool {
        self.stat().await.map(|s| s.is_directory()).unwrap_or(false)
    }

    pub async fn set_size(&self, size: u64) -> VfsResult<()> {
        self.vfs.set_size(&self.path, size).await
    }

    // ========================================================================
    // Tree
    // ========================================================================

    pub async fn delete(&self) -> VfsResult<()> {
        self.vfs.delete(&self.path).await
    }

    pub async fn mkdir(&self) -> VfsResult<()> {
        self.vfs.mkdir(&self.path).await
    }

    /// Create every missing directory on the way to this path, top-down.
    pub async fn mkdirs(&self) -> VfsResult<()> {
        let mut current = String::new();
        for segment in path::relative(&self.path).split('/').filter(|s| !s.is_empty()) {
            current = path::light_combine(&current, segment);
            let is_dir = self
                .vfs
                .stat(&current)
                .await
                .map(|s| s.is_directory())
                .unwrap_or(false);
            if !is_dir {
                self.vfs.mkdir(&current).await?;
            }
        }
        Ok(())
    }

    /// Create the parent chain, then hand back this handle.
    pub async fn ensure_parents(&self) -> VfsResult<&Self> {
        self.parent().mkdirs().await?;
        Ok(self)
    }

    /// Rename to `dst_path` on the same backend and return the new handle.
    pub async fn rename_to(&self, dst_path: &str) -> VfsResult<VfsFile> {
        self.vfs.rename(&self.path, dst_path).await?;
        Ok(VfsFile::new(self.vfs.clone(), dst_path))
    }

    /// Direct children, bound to this handle's backend.
    pub async fn list(&self) -> VfsResult<BoxStream<'static, VfsResult<VfsFile>>> {
        let dir = self.clone();
        let entries = self.vfs.list(&self.path).await?;
        Ok(entries
            .map(move |entry| entry.map(|entry| dir.child(&entry.name)))
            .boxed())
    }

    /// Every descendant, pre-order, depth-first.
    ///
    /// Entries rejected by `filter` are neither yielded nor descended into.
    /// The walk is lazy: each item pulled lists at most one directory. A
    /// listing error is yielded once and ends the walk.
    pub fn list_recursive<F>(&self, filter: F) -> BoxStream<'static, VfsResult<VfsFile>>
    where
        F: Fn(&VfsFile) -> bool + Send + Sync + 'static,
    {
        let walk = Walk {
            stack: Vec::new(),
            pending: Some(self.clone()),
            filter: Arc::new(filter),
        };
        stream::unfold(walk, Walk::advance).boxed()
    }

    /// Deliver change events under this path until the handle is closed.
    pub async fn watch<H>(&self, handler: H) -> VfsResult<WatchHandle>
    where
        H: Fn(VfsFileEvent) + Send + Sync + 'static,
    {
        self.vfs.watch(&self.path, Arc::new(handler)).await
    }

    // ========================================================================
    // Processes
    // ========================================================================

    /// Run a process with this path as working directory.
    pub async fn exec(
        &self,
        cmd_and_args: &[String],
        handler: &mut dyn VfsProcessHandler,
    ) -> VfsResult<i32> {
        self.vfs.exec(&self.path, cmd_and_args, handler).await
    }

    /// Run a process and return its combined output.
    ///
    /// A non-zero exit fails with [`VfsError::Process`].
    pub async fn exec_to_string(&self, cmd_and_args: &[String]) -> VfsResult<String> {
        let mut capture = CaptureOutput::new();
        let code = self.exec(cmd_and_args, &mut capture).await?;
        let output = capture.into_string();
        if code != 0 {
            return Err(VfsError::process(code, output));
        }
        Ok(output)
    }

    /// Run a process with its output forwarded to ours. Returns the exit code.
    pub async fn passthru(&self, cmd_and_args: &[String]) -> VfsResult<i32> {
        self.exec(cmd_and_args, &mut PassthruOutput).await
    }

    // ========================================================================
    // Jails
    // ========================================================================

    /// Handle to the root of a jail confined to this path.
    pub fn jail(&self) -> VfsFile {
        self.jail_with(JailPolicy::default())
    }

    pub fn jail_with(&self, policy: JailPolicy) -> VfsFile {
        let jail = JailVfs::new(self.vfs.clone(), &self.path).with_policy(policy);
        VfsFile::new(Arc::new(jail), "")
    }
}

/// State of a [`VfsFile::list_recursive`] walk.
struct Walk {
    /// Open listings, innermost last.
    stack: Vec<(VfsFile, DirStream)>,
    /// Directory yielded last time, listed on the next pull.
    pending: Option<VfsFile>,
    filter: Arc<dyn Fn(&VfsFile) -> bool + Send + Sync>,
}

impl Walk {
    async fn advance(mut self) -> Option<(VfsResult<VfsFile>, Walk)> {
        loop {
            if let Some(dir) = self.pending.take() {
                match dir.vfs.list(&dir.path).await {
                    Ok(entries) => self.stack.push((dir, entries)),
                    Err(e) => return Some((Err(e), self.abort())),
                }
            }

            let (dir, entries) = self.stack.last_mut()?;
            match entries.next().await {
                None => {
                    self.stack.pop();
                }
                Some(Err(e)) => return Some((Err(e), self.abort())),
                Some(Ok(entry)) => {
                    let child = dir.child(&entry.name);
                    if !(self.filter)(&child) {
                        continue;
                    }
                    if entry.kind.is_dir() {
                        self.pending = Some(child.clone());
                    }
                    return Some((Ok(child), self));
                }
            }
        }
    }

    fn abort(mut self) -> Walk {
        self.stack.clear();
        self.pending = None;
        self
    }
}

impl fmt::Display for VfsFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.vfs.describe(), self.path)
    }
}

impl fmt::Debug for VfsFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VfsFile")
            .field("vfs", &self.vfs.describe())
            .field("path", &self.path)
            .finish()
    }
}

impl PartialEq for VfsFile {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::addr_eq(Arc::as_ptr(&self.vfs), Arc::as_ptr(&other.vfs))
            && path::relative(&self.path) == path::relative(&other.path)
    }
}

impl Eq for VfsFile {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vfs::backends::MemoryBackend;

    fn memory_root() -> VfsFile {
        VfsFile::new(Arc::new(MemoryBackend::new()), "")
    }

    #[test]
    fn test_naming() {
        let root = memory_root();
        let f = root.get("docs/readme.txt");
        assert_eq!(f.path(), "docs/readme.txt");
        assert_eq!(f.basename(), "readme.txt");
        assert_eq!(f.extension(), "txt");
        assert_eq!(f.basename_without_extension(), "readme");
        assert_eq!(f.full_name_without_extension(), "docs/readme");
        assert_eq!(f.with_extension("md").path(), "docs/readme.md");
        assert_eq!(f.with_extension("").path(), "docs/readme");
        assert_eq!(f.append_extension("bak").path(), "docs/readme.txt.bak");
        assert_eq!(f.parent().path(), "docs");
        assert_eq!(f.root().path(), "");
        assert_eq!(f.get("../other").path(), "docs/other");
    }

    #[test]
    fn test_equality() {
        let root = memory_root();
        assert_eq!(root.get("a/b"), root.get("/a/./b"));
        assert_ne!(root.get("a"), root.get("b"));
        assert_ne!(root.get("a"), memory_root().get("a"));
    }

    #[test]
    fn test_display() {
        let f = memory_root().get("x.txt");
        assert_eq!(f.to_string(), "MemoryVfs[x.txt]");
    }

    #[tokio::test]
    async fn test_round_trip_string() {
        let f = memory_root().get("hello.txt");
        f.write_string("hello").await.unwrap();
        assert_eq!(f.read_string().await.unwrap(), "hello");
        assert_eq!(f.size().await.unwrap(), 5);
    }

    #[tokio::test]
    async fn test_open_use_closes_on_error() {
        let f = memory_root().get("missing");
        let result = f
            .open_use(OpenMode::Read, |s| s.read_all())
            .await;
        assert!(matches!(result, Err(VfsError::NotFound(_))));

        let f = memory_root().get("present");
        f.write(b"abc").await.unwrap();
        let result: VfsResult<()> = f
            .open_use(OpenMode::Read, |_| {
                Box::pin(async { Err(VfsError::other("body failed")) })
            })
            .await;
        assert!(matches!(result, Err(VfsError::Other(msg)) if msg == "body failed"));
    }

    #[tokio::test]
    async fn test_exists_swallows_errors() {
        let f = memory_root().get("nope");
        assert!(!f.exists().await);
        assert!(!f.is_directory().await);
        assert!(memory_root().is_directory().await);
    }

    #[tokio::test]
    async fn test_mkdirs_and_ensure_parents() {
        let root = memory_root();
        root.get("a/b/c").mkdirs().await.unwrap();
        assert!(root.get("a/b/c").is_directory().await);

        let f = root.get("x/y/z.txt");
        f.ensure_parents().await.unwrap().write(b"z").await.unwrap();
        assert_eq!(f.read().await.unwrap(), b"z");
    }

    #[tokio::test]
    async fn test_rename_to() {
        let root = memory_root();
        let f = root.get("old.txt");
        f.write(b"data").await.unwrap();

        let moved = f.rename_to("new.txt").await.unwrap();
        assert!(!f.exists().await);
        assert_eq!(moved.read().await.unwrap(), b"data");
    }

    #[tokio::test]
    async fn test_jail_children_stay_jailed() {
        let root = memory_root();
        root.get("box/inner").mkdirs().await.unwrap();
        root.get("outside.txt").write(b"no").await.unwrap();

        let jailed = root.get("box").jail();
        let children: Vec<VfsFile> = jailed.list().await.unwrap().try_collect().await.unwrap();
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].path(), "inner");

        let escaped = children[0].get("../../outside.txt");
        assert!(!escaped.exists().await);
        escaped.write(b"yes").await.unwrap();
        assert_eq!(root.get("outside.txt").read().await.unwrap(), b"no");
        assert_eq!(root.get("box/outside.txt").read().await.unwrap(), b"yes");
    }
}
