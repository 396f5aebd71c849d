//! Entry points onto the host filesystem.
//!
//! A [`LocalVfsProvider`] supplies the local backend plus the folders behind
//! `cache()` and `external_storage()`. Providers are plain values passed to
//! whoever needs them.

use std::sync::Arc;

use crate::config::VfsConfig;
use crate::vfs::{JailPolicy, LocalBackend, Vfs, VfsFile};

fn temp_dir_string() -> String {
    std::env::temp_dir().to_string_lossy().into_owned()
}

/// Source of local filesystem handles.
///
/// Only [`root`](LocalVfsProvider::root) is required. Folders are paths on
/// the root backend; `None` means the host temp dir.
pub trait LocalVfsProvider: Send + Sync {
    /// Backend for the whole local filesystem. Must return the same
    /// instance on every call so handles compare equal.
    fn root(&self) -> Arc<dyn Vfs>;

    fn cache_folder(&self) -> Option<String> {
        None
    }

    fn external_storage_folder(&self) -> Option<String> {
        None
    }

    /// Policy for jails this provider hands out.
    fn jail_policy(&self) -> JailPolicy {
        JailPolicy::default()
    }

    /// Handle to the local root.
    fn local(&self) -> VfsFile {
        VfsFile::new(self.root(), "")
    }

    /// Handle to `base` on the local filesystem.
    fn local_at(&self, base: &str) -> VfsFile {
        self.local().get(base)
    }

    /// Handle to the host temp dir.
    fn temp(&self) -> VfsFile {
        self.local_at(&temp_dir_string())
    }

    /// Jailed handle rooted at `base`.
    fn jailed_local(&self, base: &str) -> VfsFile {
        self.local_at(base).jail_with(self.jail_policy())
    }

    /// Jailed handle on the cache folder.
    fn cache(&self) -> VfsFile {
        match self.cache_folder() {
            Some(folder) => self.jailed_local(&folder),
            None => self.temp().jail_with(self.jail_policy()),
        }
    }

    /// Jailed handle on the external storage folder.
    fn external_storage(&self) -> VfsFile {
        match self.external_storage_folder() {
            Some(folder) => self.jailed_local(&folder),
            None => self.temp().jail_with(self.jail_policy()),
        }
    }
}

/// Provider over `/` with the host temp dir for both folders.
#[derive(Clone)]
pub struct DefaultLocalProvider {
    root: Arc<dyn Vfs>,
}

impl Default for DefaultLocalProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl DefaultLocalProvider {
    pub fn new() -> Self {
        Self {
            root: Arc::new(LocalBackend::new("/")),
        }
    }
}

impl LocalVfsProvider for DefaultLocalProvider {
    fn root(&self) -> Arc<dyn Vfs> {
        self.root.clone()
    }
}

/// Provider whose root, folders and jail policy come from a [`VfsConfig`].
///
/// The host temp dir gets its own backend, since it usually lies outside
/// `local_root`.
#[derive(Clone)]
pub struct ConfiguredLocalProvider {
    config: VfsConfig,
    root: Arc<dyn Vfs>,
    temp_root: Arc<dyn Vfs>,
}

impl ConfiguredLocalProvider {
    pub fn new(config: VfsConfig) -> Self {
        let backend = LocalBackend::new(config.local_root_path())
            .with_poll_interval(config.watch_poll_interval());
        let temp = LocalBackend::new(std::env::temp_dir())
            .with_poll_interval(config.watch_poll_interval());
        Self {
            config,
            root: Arc::new(backend),
            temp_root: Arc::new(temp),
        }
    }

    pub fn config(&self) -> &VfsConfig {
        &self.config
    }
}

impl LocalVfsProvider for ConfiguredLocalProvider {
    fn root(&self) -> Arc<dyn Vfs> {
        self.root.clone()
    }

    fn cache_folder(&self) -> Option<String> {
        let path = self.config.cache_folder_path()?;
        Some(path.to_string_lossy().into_owned())
    }

    fn external_storage_folder(&self) -> Option<String> {
        let path = self.config.external_storage_folder_path()?;
        Some(path.to_string_lossy().into_owned())
    }

    fn temp(&self) -> VfsFile {
        VfsFile::new(self.temp_root.clone(), "")
    }

    fn jail_policy(&self) -> JailPolicy {
        self.config.jail_policy
    }
}
