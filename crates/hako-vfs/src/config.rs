//! VFS configuration.
//!
//! Loaded from `~/.config/hako/config.toml` by default:
//!
//! ```toml
//! local_root = "/"
//! cache_folder = "~/.cache/hako"
//! jail_policy = "reject"
//! watch_poll_interval_ms = 250
//! ```
//!
//! Every key is optional. `HAKO_CACHE_DIR`, `HAKO_EXTERNAL_STORAGE_DIR` and
//! `HAKO_JAIL_POLICY` override the file when [`VfsConfig::apply_env`] runs.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::vfs::{JailPolicy, DEFAULT_POLL_INTERVAL};

pub const ENV_CACHE_DIR: &str = "HAKO_CACHE_DIR";
pub const ENV_EXTERNAL_STORAGE_DIR: &str = "HAKO_EXTERNAL_STORAGE_DIR";
pub const ENV_JAIL_POLICY: &str = "HAKO_JAIL_POLICY";

/// Errors from loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to render config: {0}")]
    Render(#[from] toml::ser::Error),

    #[error("invalid {key}: {value}")]
    InvalidValue { key: &'static str, value: String },
}

/// Configuration for the local provider and the backends it builds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VfsConfig {
    /// Host directory mapped to the VFS root of `local()`.
    pub local_root: String,
    /// Folder behind `cache()`, as a path under `local_root`. Host temp dir
    /// when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_folder: Option<String>,
    /// Folder behind `external_storage()`, as a path under `local_root`.
    /// Host temp dir when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_storage_folder: Option<String>,
    /// Policy for jails created by the provider.
    pub jail_policy: JailPolicy,
    /// Poll interval for watchers on platforms without native events.
    pub watch_poll_interval_ms: u64,
}

impl Default for VfsConfig {
    fn default() -> Self {
        Self {
            local_root: "/".to_string(),
            cache_folder: None,
            external_storage_folder: None,
            jail_policy: JailPolicy::default(),
            watch_poll_interval_ms: DEFAULT_POLL_INTERVAL.as_millis() as u64,
        }
    }
}

impl VfsConfig {
    /// Parse a TOML document. Missing keys take their defaults.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Load from a file. `~` in `path` is expanded.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = path.as_ref().to_string_lossy();
        let path: PathBuf = shellexpand::tilde(&raw).as_ref().into();
        let text = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;
        let config = Self::from_toml_str(&text)?;
        tracing::debug!(path = %path.display(), "loaded vfs config");
        Ok(config)
    }

    /// Default config file location (`~/.config/hako/config.toml`).
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("hako").join("config.toml"))
    }

    /// Load the default file, or defaults when it doesn't exist.
    ///
    /// A file that exists but fails to parse is an error.
    pub fn load_or_default() -> Result<Self, ConfigError> {
        match Self::default_path() {
            Some(path) if path.exists() => Self::load(path),
            Some(path) => {
                tracing::debug!(path = %path.display(), "no config file, using defaults");
                Ok(Self::default())
            }
            None => Ok(Self::default()),
        }
    }

    /// Apply `HAKO_*` overrides from the process environment.
    pub fn apply_env(self) -> Result<Self, ConfigError> {
        self.apply_env_from(|key| std::env::var(key).ok())
    }

    /// Apply `HAKO_*` overrides using `lookup` as the environment.
    pub fn apply_env_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        if let Some(dir) = lookup(ENV_CACHE_DIR) {
            self.cache_folder = Some(dir);
        }
        if let Some(dir) = lookup(ENV_EXTERNAL_STORAGE_DIR) {
            self.external_storage_folder = Some(dir);
        }
        if let Some(policy) = lookup(ENV_JAIL_POLICY) {
            self.jail_policy = policy.parse().map_err(|_| ConfigError::InvalidValue {
                key: ENV_JAIL_POLICY,
                value: policy,
            })?;
        }
        Ok(self)
    }

    pub fn with_local_root(mut self, root: impl Into<String>) -> Self {
        self.local_root = root.into();
        self
    }

    pub fn with_cache_folder(mut self, folder: impl Into<String>) -> Self {
        self.cache_folder = Some(folder.into());
        self
    }

    pub fn with_external_storage_folder(mut self, folder: impl Into<String>) -> Self {
        self.external_storage_folder = Some(folder.into());
        self
    }

    pub fn with_jail_policy(mut self, policy: JailPolicy) -> Self {
        self.jail_policy = policy;
        self
    }

    pub fn with_watch_poll_interval(mut self, interval: Duration) -> Self {
        self.watch_poll_interval_ms = interval.as_millis() as u64;
        self
    }

    /// Host root with `~` expanded.
    pub fn local_root_path(&self) -> PathBuf {
        expand(&self.local_root)
    }

    /// Cache folder with `~` expanded. `None` means the host temp dir.
    pub fn cache_folder_path(&self) -> Option<PathBuf> {
        self.cache_folder.as_deref().map(expand)
    }

    /// External storage folder with `~` expanded. `None` means the host
    /// temp dir.
    pub fn external_storage_folder_path(&self) -> Option<PathBuf> {
        self.external_storage_folder.as_deref().map(expand)
    }

    pub fn watch_poll_interval(&self) -> Duration {
        Duration::from_millis(self.watch_poll_interval_ms)
    }
}

fn expand(path: &str) -> PathBuf {
    shellexpand::tilde(path).as_ref().into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_for_missing_keys() {
        let config = VfsConfig::from_toml_str("").unwrap();
        assert_eq!(config, VfsConfig::default());
        assert_eq!(config.local_root, "/");
        assert_eq!(config.jail_policy, JailPolicy::Clamp);
        assert_eq!(config.watch_poll_interval(), Duration::from_millis(500));
        assert_eq!(config.cache_folder_path(), None);
    }

    #[test]
    fn test_parse_full() {
        let config = VfsConfig::from_toml_str(
            r#"
            local_root = "/srv"
            cache_folder = "/var/cache/hako"
            external_storage_folder = "/mnt/sd"
            jail_policy = "reject"
            watch_poll_interval_ms = 250
            "#,
        )
        .unwrap();

        assert_eq!(config.local_root_path(), PathBuf::from("/srv"));
        assert_eq!(config.cache_folder_path(), Some(PathBuf::from("/var/cache/hako")));
        assert_eq!(config.external_storage_folder_path(), Some(PathBuf::from("/mnt/sd")));
        assert_eq!(config.jail_policy, JailPolicy::Reject);
        assert_eq!(config.watch_poll_interval_ms, 250);
    }

    #[test]
    fn test_malformed_is_error() {
        assert!(VfsConfig::from_toml_str("jail_policy = \"sideways\"").is_err());
        assert!(VfsConfig::from_toml_str("local_root = [").is_err());
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            (ENV_CACHE_DIR, "/tmp/c"),
            (ENV_JAIL_POLICY, "REJECT"),
        ]
        .into_iter()
        .collect();

        let config = VfsConfig::default()
            .apply_env_from(|k| env.get(k).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.cache_folder.as_deref(), Some("/tmp/c"));
        assert_eq!(config.external_storage_folder, None);
        assert_eq!(config.jail_policy, JailPolicy::Reject);

        let bad = VfsConfig::default().apply_env_from(|k| {
            (k == ENV_JAIL_POLICY).then(|| "maybe".to_string())
        });
        assert!(matches!(bad, Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn test_builder_and_round_trip() {
        let config = VfsConfig::default()
            .with_local_root("/data")
            .with_cache_folder("/c")
            .with_jail_policy(JailPolicy::Reject)
            .with_watch_poll_interval(Duration::from_secs(2));

        let text = config.to_toml_string().unwrap();
        assert_eq!(VfsConfig::from_toml_str(&text).unwrap(), config);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "local_root = \"/opt\"\n").unwrap();

        let config = VfsConfig::load(&path).unwrap();
        assert_eq!(config.local_root, "/opt");

        let missing = VfsConfig::load(dir.path().join("nope.toml"));
        assert!(matches!(missing, Err(ConfigError::Read { .. })));
    }
}
