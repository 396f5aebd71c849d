//! Path-containment decorator.
//!
//! [`JailVfs`] wraps one inner backend and a root path inside it. Every call
//! has its path normalized, checked against the root and rewritten to
//! `root/<path>` before it reaches the inner backend, so the inner backend
//! never sees a location outside the jailed subtree.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::path;
use super::error::{VfsError, VfsResult};
use super::ops::{DirStream, Vfs};
use super::process::VfsProcessHandler;
use super::stream::AsyncStream;
use super::types::{OpenMode, VfsFileEvent, VfsStat};
use super::watch::{WatchCallback, WatchHandle};

/// What a jail does with a path whose `..` segments climb above its root.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JailPolicy {
    /// Drop the escaping segments and continue at the root.
    #[default]
    Clamp,
    /// Fail the call with [`VfsError::PathEscapesRoot`].
    Reject,
}

impl FromStr for JailPolicy {
    type Err = VfsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "clamp" => Ok(JailPolicy::Clamp),
            "reject" => Ok(JailPolicy::Reject),
            other => Err(VfsError::other(format!("unknown jail policy: {other}"))),
        }
    }
}

impl fmt::Display for JailPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JailPolicy::Clamp => f.write_str("clamp"),
            JailPolicy::Reject => f.write_str("reject"),
        }
    }
}

/// Backend decorator confining every path to `root` inside `inner`.
pub struct JailVfs {
    inner: Arc<dyn Vfs>,
    root: String,
    policy: JailPolicy,
}

impl fmt::Debug for JailVfs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JailVfs")
            .field("inner", &self.inner.describe())
            .field("root", &self.root)
            .field("policy", &self.policy)
            .finish()
    }
}

impl JailVfs {
    /// Jail `inner` at `root` with the default [`JailPolicy::Clamp`].
    pub fn new(inner: Arc<dyn Vfs>, root: &str) -> Self {
        Self {
            inner,
            root: path::relative(root),
            policy: JailPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: JailPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Root of the jail in the inner backend's coordinates.
    pub fn root(&self) -> &str {
        &self.root
    }

    pub fn policy(&self) -> JailPolicy {
        self.policy
    }

    pub fn inner(&self) -> &Arc<dyn Vfs> {
        &self.inner
    }

    /// Rewrite a jail-relative path into the inner backend's coordinates.
    ///
    /// The result is always `root` or a descendant of it.
    pub fn resolve(&self, path: &str) -> VfsResult<String> {
        let checked = path::normalize_checked(path);
        if checked.escaped() {
            match self.policy {
                JailPolicy::Clamp => {
                    tracing::debug!(path = %path, root = %self.root, "clamped jail escape");
                }
                JailPolicy::Reject => {
                    tracing::warn!(path = %path, root = %self.root, "rejected jail escape");
                    return Err(VfsError::path_escapes_root(path));
                }
            }
        }

        let rel = checked.path.trim_start_matches('/');
        Ok(path::light_combine(&self.root, rel))
    }

    /// Map an inner path back into jail coordinates, `None` when it lies
    /// outside the jail.
    fn unresolve(root: &str, inner_path: &str) -> Option<String> {
        let inner_path = inner_path.trim_start_matches('/');
        if root.is_empty() {
            return Some(inner_path.to_string());
        }
        if inner_path == root {
            return Some(String::new());
        }
        inner_path
            .strip_prefix(root)
            .and_then(|rest| rest.strip_prefix('/'))
            .map(str::to_string)
    }
}

#[async_trait]
impl Vfs for JailVfs {
    fn describe(&self) -> String {
        format!("JailVfs({}, {})", self.inner.describe(), self.root)
    }

    fn absolute_path(&self) -> String {
        path::light_combine(&self.inner.absolute_path(), &self.root)
    }

    fn read_only(&self) -> bool {
        self.inner.read_only()
    }

    async fn open(&self, path: &str, mode: OpenMode) -> VfsResult<Box<dyn AsyncStream>> {
        self.inner.open(&self.resolve(path)?, mode).await
    }

    async fn stat(&self, path: &str) -> VfsResult<VfsStat> {
        self.inner.stat(&self.resolve(path)?).await
    }

    async fn read_chunk(&self, path: &str, offset: u64, size: usize) -> VfsResult<Vec<u8>> {
        self.inner.read_chunk(&self.resolve(path)?, offset, size).await
    }

    async fn write_chunk(&self, path: &str, data: &[u8], offset: u64, resize: bool) -> VfsResult<()> {
        self.inner
            .write_chunk(&self.resolve(path)?, data, offset, resize)
            .await
    }

    async fn set_size(&self, path: &str, size: u64) -> VfsResult<()> {
        self.inner.set_size(&self.resolve(path)?, size).await
    }

    async fn delete(&self, path: &str) -> VfsResult<()> {
        self.inner.delete(&self.resolve(path)?).await
    }

    async fn mkdir(&self, path: &str) -> VfsResult<()> {
        self.inner.mkdir(&self.resolve(path)?).await
    }

    async fn rename(&self, from: &str, to: &str) -> VfsResult<()> {
        let from = self.resolve(from)?;
        let to = self.resolve(to)?;
        self.inner.rename(&from, &to).await
    }

    async fn list(&self, path: &str) -> VfsResult<DirStream> {
        self.inner.list(&self.resolve(path)?).await
    }

    async fn watch(&self, path: &str, handler: WatchCallback) -> VfsResult<WatchHandle> {
        let root = self.root.clone();
        let translated: WatchCallback = Arc::new(move |event: VfsFileEvent| {
            if let Some(path) = JailVfs::unresolve(&root, &event.path) {
                handler(VfsFileEvent::new(path, event.kind));
            }
        });
        self.inner.watch(&self.resolve(path)?, translated).await
    }

    async fn exec(
        &self,
        path: &str,
        cmd_and_args: &[String],
        handler: &mut dyn VfsProcessHandler,
    ) -> VfsResult<i32> {
        self.inner
            .exec(&self.resolve(path)?, cmd_and_args, handler)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vfs::backends::MemoryBackend;

    fn jail(root: &str) -> JailVfs {
        JailVfs::new(Arc::new(MemoryBackend::new()), root)
    }

    #[test]
    fn test_resolve_stays_under_root() {
        let j = jail("/sandbox");
        assert_eq!(j.resolve("a/b").unwrap(), "sandbox/a/b");
        assert_eq!(j.resolve("/a/b").unwrap(), "sandbox/a/b");
        assert_eq!(j.resolve("").unwrap(), "sandbox");
        assert_eq!(j.resolve("../../etc/passwd").unwrap(), "sandbox/etc/passwd");
        assert_eq!(j.resolve("a/../../..").unwrap(), "sandbox");
    }

    #[test]
    fn test_reject_policy() {
        let j = jail("sandbox").with_policy(JailPolicy::Reject);
        assert_eq!(j.resolve("a/../b").unwrap(), "sandbox/b");
        assert!(matches!(
            j.resolve("../x"),
            Err(VfsError::PathEscapesRoot(_))
        ));
    }

    #[test]
    fn test_unresolve() {
        assert_eq!(JailVfs::unresolve("s", "s/a/b"), Some("a/b".to_string()));
        assert_eq!(JailVfs::unresolve("s", "s"), Some(String::new()));
        assert_eq!(JailVfs::unresolve("s", "sx/a"), None);
        assert_eq!(JailVfs::unresolve("", "a"), Some("a".to_string()));
    }

    #[test]
    fn test_policy_parse() {
        assert_eq!("Reject".parse::<JailPolicy>().unwrap(), JailPolicy::Reject);
        assert_eq!("clamp".parse::<JailPolicy>().unwrap(), JailPolicy::Clamp);
        assert!("loose".parse::<JailPolicy>().is_err());
        assert_eq!(JailPolicy::default(), JailPolicy::Clamp);
    }

    #[tokio::test]
    async fn test_jail_over_memory() {
        let inner: Arc<dyn Vfs> = Arc::new(MemoryBackend::new());
        inner.mkdir("sandbox").await.unwrap();
        inner.write_chunk("secret", b"top", 0, true).await.unwrap();

        let j = JailVfs::new(inner.clone(), "sandbox");
        j.write_chunk("../secret", b"safe", 0, true).await.unwrap();

        assert_eq!(inner.read_chunk("secret", 0, 10).await.unwrap(), b"top");
        assert_eq!(
            inner.read_chunk("sandbox/secret", 0, 10).await.unwrap(),
            b"safe"
        );
    }
}
