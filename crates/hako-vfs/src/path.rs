//! Path utility for VFS paths.
//!
//! VFS paths are plain strings separated by `/` (a `\` is accepted and
//! treated the same). They are never host paths: `.` and `..` are resolved
//! lexically, and nothing here touches storage.
//!
//! A path with or without a leading `/` addresses the same entry of a
//! backend; backends strip the leading slash before resolving.

/// Result of lexical normalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Normalized {
    /// Normalized path. Absolute inputs keep their leading `/`.
    pub path: String,
    /// Number of `..` segments that tried to climb above the first segment
    /// and were dropped.
    pub escaped: usize,
}

impl Normalized {
    /// Returns true if any `..` segment was clamped.
    pub fn escaped(&self) -> bool {
        self.escaped > 0
    }
}

/// Normalize a path and report how many `..` segments were clamped.
pub fn normalize_checked(path: &str) -> Normalized {
    let absolute = path.starts_with('/') || path.starts_with('\\');
    let mut segments: Vec<&str> = Vec::new();
    let mut escaped = 0;

    for segment in path.split(['/', '\\']) {
        match segment {
            "" | "." => {}
            ".." => {
                if segments.pop().is_none() {
                    escaped += 1;
                }
            }
            s => segments.push(s),
        }
    }

    let joined = segments.join("/");
    let path = if absolute { format!("/{joined}") } else { joined };
    Normalized { path, escaped }
}

/// Normalize a path: collapse separators, resolve `.` and `..`.
///
/// `..` segments that would climb above the start are dropped, so the
/// result never begins with `..`.
pub fn normalize(path: &str) -> String {
    normalize_checked(path).path
}

/// Normalized path without its leading `/`.
///
/// This is the form backends key entries by, and the form two handles are
/// compared in.
pub fn relative(path: &str) -> String {
    let normalized = normalize(path);
    match normalized.strip_prefix('/') {
        Some(rest) => rest.to_string(),
        None => normalized,
    }
}

/// Returns true if `path` is absolute (`/x`, `\x` or a drive prefix like `C:`).
pub fn is_absolute(path: &str) -> bool {
    let bytes = path.as_bytes();
    matches!(bytes.first(), Some(b'/') | Some(b'\\'))
        || (bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':')
}

/// Combine `base` with `access` and normalize.
///
/// An absolute `access` replaces `base` entirely.
pub fn combine(base: &str, access: &str) -> String {
    if is_absolute(access) || base.is_empty() {
        normalize(access)
    } else {
        normalize(&format!("{base}/{access}"))
    }
}

/// Join two paths with exactly one `/` between them, without normalizing.
pub fn light_combine(base: &str, access: &str) -> String {
    if base.is_empty() {
        return access.to_string();
    }
    if access.is_empty() {
        return base.to_string();
    }
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        access.trim_start_matches('/')
    )
}

/// Decomposition of a path into folder, basename and extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PathInfo<'a> {
    path: &'a str,
}

impl<'a> PathInfo<'a> {
    pub fn new(path: &'a str) -> Self {
        Self { path }
    }

    /// Everything before the last `/`, or `""` when there is none.
    pub fn folder(&self) -> &'a str {
        match self.path.rfind('/') {
            Some(idx) => &self.path[..idx],
            None => "",
        }
    }

    /// Everything after the last `/`.
    pub fn basename(&self) -> &'a str {
        match self.path.rfind('/') {
            Some(idx) => &self.path[idx + 1..],
            None => self.path,
        }
    }

    /// Extension of the basename without the dot, `""` when there is none.
    ///
    /// A leading dot (`.bashrc`) does not start an extension.
    pub fn extension(&self) -> &'a str {
        let basename = self.basename();
        match basename.rfind('.') {
            Some(idx) if idx > 0 => &basename[idx + 1..],
            _ => "",
        }
    }

    pub fn basename_without_extension(&self) -> &'a str {
        let basename = self.basename();
        let ext = self.extension();
        if ext.is_empty() {
            basename
        } else {
            &basename[..basename.len() - ext.len() - 1]
        }
    }

    /// The whole path with the extension (and its dot) removed.
    pub fn full_name_without_extension(&self) -> &'a str {
        let ext = self.extension();
        if ext.is_empty() {
            self.path
        } else {
            &self.path[..self.path.len() - ext.len() - 1]
        }
    }
}

pub fn folder(path: &str) -> &str {
    PathInfo::new(path).folder()
}

pub fn basename(path: &str) -> &str {
    PathInfo::new(path).basename()
}

pub fn extension(path: &str) -> &str {
    PathInfo::new(path).extension()
}
