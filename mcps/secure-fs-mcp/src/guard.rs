//! Directory guard: confines every path to the configured allowed roots
//!
//! Roots are canonicalized once and stored with a trailing separator, so a
//! byte-prefix test cannot confuse `/tmp/foo` with `/tmp/foobar`. Candidates
//! are checked after symlink resolution, never on their textual form alone.

use std::ffi::{OsStr, OsString};
use std::io;
use std::path::{Component, Path, PathBuf, MAIN_SEPARATOR_STR};

use crate::types::{FsError, FsResult};

/// Dangling symlinks followed by hand before giving up
const MAX_SYMLINK_HOPS: usize = 40;

#[derive(Debug, Clone)]
struct AllowedRoot {
    /// Canonical path, as shown to clients
    path: PathBuf,
    /// Canonical path with a trailing separator, used for prefix checks
    prefix: OsString,
}

/// The immutable set of directories the server may touch
#[derive(Debug, Clone)]
pub struct DirectoryGuard {
    roots: Vec<AllowedRoot>,
    home_dir: Option<PathBuf>,
}

impl DirectoryGuard {
    /// Normalize `roots` into a guard. Every root must exist and be a directory.
    pub fn new<S: AsRef<str>>(roots: &[S]) -> FsResult<Self> {
        let home_dir = dirs::home_dir();
        let mut normalized: Vec<AllowedRoot> = Vec::with_capacity(roots.len());

        for root in roots {
            let root = Self::normalize(root.as_ref(), home_dir.as_deref())?;
            // Two spellings of one physical directory collapse to one entry
            if normalized.iter().all(|r| r.prefix != root.prefix) {
                normalized.push(root);
            }
        }

        if normalized.is_empty() {
            return Err(FsError::ConfigError(
                "At least one allowed directory is required".to_string(),
            ));
        }

        Ok(Self {
            roots: normalized,
            home_dir,
        })
    }

    /// Canonical absolute form of a configured root, plus its separator-terminated prefix
    fn normalize(root: &str, home_dir: Option<&Path>) -> FsResult<AllowedRoot> {
        let expanded = expand_tilde(root, home_dir)
            .ok_or_else(|| FsError::ConfigError(format!("Cannot expand {}", root)))?;
        let absolute = absolute_clean(&expanded)
            .map_err(|e| FsError::ConfigError(format!("Allowed directory {}: {}", root, e)))?;
        let canonical = absolute
            .canonicalize()
            .map_err(|e| FsError::ConfigError(format!("Allowed directory {}: {}", root, e)))?;

        if !canonical.is_dir() {
            return Err(FsError::ConfigError(format!(
                "Allowed directory {} is not a directory",
                root
            )));
        }

        let prefix = with_trailing_separator(&canonical);
        Ok(AllowedRoot {
            path: canonical,
            prefix,
        })
    }

    /// Whether `candidate`, made absolute and lexically cleaned, sits under a root.
    ///
    /// Does not touch the filesystem; [`validate_path`](Self::validate_path)
    /// applies this to the symlink-resolved path.
    pub fn is_within_allowed(&self, candidate: &Path) -> bool {
        match absolute_clean(candidate) {
            Ok(absolute) => self.contains(&absolute),
            Err(_) => false,
        }
    }

    fn contains(&self, absolute: &Path) -> bool {
        let prefixed = with_trailing_separator(absolute);
        let prefixed = prefixed.as_encoded_bytes();
        self.roots
            .iter()
            .any(|root| prefixed.starts_with(root.prefix.as_encoded_bytes()))
    }

    /// Resolve `candidate` to its real location and confirm it is inside a root.
    ///
    /// Paths that do not exist yet (write destinations) are accepted when their
    /// nearest existing ancestor resolves inside a root; the returned path is
    /// that real ancestor joined with the missing components.
    pub fn validate_path(&self, candidate: &str) -> FsResult<PathBuf> {
        if candidate.is_empty() {
            return Err(FsError::InvalidPath("Path is empty".to_string()));
        }
        // Nothing below can carry an interior NUL
        if candidate.contains('\0') {
            return Err(FsError::InvalidPath("Path contains null byte".to_string()));
        }

        let expanded = expand_tilde(candidate, self.home_dir.as_deref()).ok_or_else(|| {
            FsError::InvalidPath(format!("Cannot expand ~ in {}", candidate))
        })?;
        let absolute =
            absolute_clean(&expanded).map_err(|source| resolution_error(candidate, source))?;

        self.resolve(&absolute, candidate, 0)
    }

    fn resolve(&self, absolute: &Path, candidate: &str, hops: usize) -> FsResult<PathBuf> {
        match absolute.canonicalize() {
            Ok(real) => {
                self.ensure_allowed(&real, candidate)?;
                Ok(real)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                self.resolve_missing(absolute, candidate, hops)
            }
            Err(source) => Err(resolution_error(candidate, source)),
        }
    }

    fn resolve_missing(&self, absolute: &Path, candidate: &str, hops: usize) -> FsResult<PathBuf> {
        let mut existing = absolute.to_path_buf();
        let mut missing: Vec<OsString> = Vec::new();

        // Walk up to the deepest entry that exists (possibly a dangling link)
        loop {
            match std::fs::symlink_metadata(&existing) {
                Ok(_) => break,
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    let Some(name) = existing.file_name().map(OsStr::to_os_string) else {
                        return Err(resolution_error(candidate, e));
                    };
                    missing.push(name);
                    existing.pop();
                }
                Err(source) => return Err(resolution_error(candidate, source)),
            }
        }
        let tail: PathBuf = missing.iter().rev().collect();

        match existing.canonicalize() {
            Ok(real) => {
                self.ensure_allowed(&real, candidate)?;
                Ok(real.join(tail))
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                // `existing` is a symlink to something missing: follow it, or a
                // link inside a root could create files outside every root.
                if hops >= MAX_SYMLINK_HOPS {
                    return Err(resolution_error(
                        candidate,
                        io::Error::other("too many levels of symbolic links"),
                    ));
                }
                let target =
                    std::fs::read_link(&existing).map_err(|s| resolution_error(candidate, s))?;
                let parent = match existing.parent() {
                    Some(parent) => parent
                        .canonicalize()
                        .map_err(|s| resolution_error(candidate, s))?,
                    None => PathBuf::from(MAIN_SEPARATOR_STR),
                };
                let next = lexical_clean(&parent.join(target)).join(tail);
                self.resolve(&next, candidate, hops + 1)
            }
            Err(source) => Err(resolution_error(candidate, source)),
        }
    }

    fn ensure_allowed(&self, real: &Path, candidate: &str) -> FsResult<()> {
        if self.contains(real) {
            return Ok(());
        }
        tracing::warn!(path = %candidate, "Rejected path outside allowed directories");
        Err(FsError::PathOutsideAllowedDirectories(candidate.to_string()))
    }

    /// Allowed roots for display
    pub fn allowed_directories(&self) -> Vec<String> {
        self.roots
            .iter()
            .map(|r| r.path.display().to_string())
            .collect()
    }

    /// Whether a resolved path is one of the roots themselves
    pub fn is_root(&self, real: &Path) -> bool {
        self.roots.iter().any(|r| r.path == real)
    }

    /// First configured root, the default receive destination
    pub fn default_root(&self) -> &Path {
        // `new` refuses an empty root list
        &self.roots[0].path
    }
}

fn resolution_error(candidate: &str, source: io::Error) -> FsError {
    FsError::PathResolution {
        path: candidate.to_string(),
        source,
    }
}

/// Expand a leading `~` or `~/`; `None` when no home directory is known
fn expand_tilde(path: &str, home_dir: Option<&Path>) -> Option<PathBuf> {
    if let Some(stripped) = path.strip_prefix("~/") {
        home_dir.map(|home| home.join(stripped))
    } else if path == "~" {
        home_dir.map(Path::to_path_buf)
    } else {
        Some(PathBuf::from(path))
    }
}

/// Absolute path against the current directory, with `.` and `..` removed
fn absolute_clean(path: &Path) -> io::Result<PathBuf> {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()?.join(path)
    };
    Ok(lexical_clean(&absolute))
}

fn lexical_clean(path: &Path) -> PathBuf {
    let mut cleaned = PathBuf::new();
    for component in path.components() {
        match component {
            Component::ParentDir => {
                // Popping the root is a no-op, so `/..` stays `/`
                cleaned.pop();
            }
            Component::CurDir => {}
            other => cleaned.push(other.as_os_str()),
        }
    }
    cleaned
}

fn with_trailing_separator(path: &Path) -> OsString {
    let mut s = path.as_os_str().to_os_string();
    if !s.as_encoded_bytes().ends_with(MAIN_SEPARATOR_STR.as_bytes()) {
        s.push(MAIN_SEPARATOR_STR);
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn path_str(path: &Path) -> String {
        path.display().to_string()
    }

    /// Temp dir with `data/` inside, returned canonicalized
    fn sandbox() -> (TempDir, PathBuf) {
        let tmp = TempDir::new().unwrap();
        let base = tmp.path().canonicalize().unwrap();
        fs::create_dir(base.join("data")).unwrap();
        (tmp, base)
    }

    #[test]
    fn test_sibling_with_shared_prefix_is_rejected() {
        let (_tmp, base) = sandbox();
        fs::create_dir(base.join("foo")).unwrap();
        fs::create_dir(base.join("foobar")).unwrap();
        fs::write(base.join("foobar/secret.txt"), "s").unwrap();

        let guard = DirectoryGuard::new(&[path_str(&base.join("foo"))]).unwrap();

        assert!(!guard.is_within_allowed(&base.join("foobar/secret.txt")));
        assert!(guard.is_within_allowed(&base.join("foo")));
        assert!(guard.is_within_allowed(&base.join("foo/nested/file.txt")));

        let err = guard
            .validate_path(&path_str(&base.join("foobar/secret.txt")))
            .unwrap_err();
        assert!(matches!(err, FsError::PathOutsideAllowedDirectories(_)));
    }

    #[test]
    fn test_parent_traversal_is_rejected() {
        let (_tmp, base) = sandbox();
        fs::create_dir(base.join("etc")).unwrap();
        fs::write(base.join("etc/passwd"), "root").unwrap();
        let guard = DirectoryGuard::new(&[path_str(&base.join("data"))]).unwrap();

        let candidate = format!("{}/data/../etc/passwd", base.display());
        let err = guard.validate_path(&candidate).unwrap_err();
        assert!(matches!(err, FsError::PathOutsideAllowedDirectories(_)));
        assert!(!guard.is_within_allowed(Path::new(&candidate)));
    }

    #[test]
    fn test_rejection_message_does_not_leak_resolved_path() {
        let (_tmp, base) = sandbox();
        let guard = DirectoryGuard::new(&[path_str(&base.join("data"))]).unwrap();

        let candidate = format!("{}/data/../elsewhere", base.display());
        let message = guard.validate_path(&candidate).unwrap_err().to_string();
        assert!(message.contains(&candidate));
        assert!(!message.contains(&format!("{}/elsewhere", base.display())));
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_escape_is_rejected() {
        let (_tmp, base) = sandbox();
        fs::create_dir(base.join("etc")).unwrap();
        fs::write(base.join("etc/passwd"), "root").unwrap();
        std::os::unix::fs::symlink(base.join("etc"), base.join("data/evil")).unwrap();

        let guard = DirectoryGuard::new(&[path_str(&base.join("data"))]).unwrap();
        let err = guard
            .validate_path(&path_str(&base.join("data/evil/passwd")))
            .unwrap_err();
        assert!(matches!(err, FsError::PathOutsideAllowedDirectories(_)));

        // Creating a new file through the link is just as forbidden
        let err = guard
            .validate_path(&path_str(&base.join("data/evil/new.txt")))
            .unwrap_err();
        assert!(matches!(err, FsError::PathOutsideAllowedDirectories(_)));
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_inside_root_resolves_to_target() {
        let (_tmp, base) = sandbox();
        fs::create_dir(base.join("data/real")).unwrap();
        fs::write(base.join("data/real/file.txt"), "x").unwrap();
        std::os::unix::fs::symlink(base.join("data/real"), base.join("data/alias")).unwrap();

        let guard = DirectoryGuard::new(&[path_str(&base.join("data"))]).unwrap();
        let resolved = guard
            .validate_path(&path_str(&base.join("data/alias/file.txt")))
            .unwrap();
        assert_eq!(resolved, base.join("data/real/file.txt"));
    }

    #[cfg(unix)]
    #[test]
    fn test_dangling_symlink_to_outside_is_rejected() {
        let (_tmp, base) = sandbox();
        std::os::unix::fs::symlink(base.join("outside/new.txt"), base.join("data/drop")).unwrap();

        let guard = DirectoryGuard::new(&[path_str(&base.join("data"))]).unwrap();
        let err = guard
            .validate_path(&path_str(&base.join("data/drop")))
            .unwrap_err();
        assert!(matches!(err, FsError::PathOutsideAllowedDirectories(_)));
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_loop_is_resolution_error() {
        let (_tmp, base) = sandbox();
        std::os::unix::fs::symlink(base.join("data/b"), base.join("data/a")).unwrap();
        std::os::unix::fs::symlink(base.join("data/a"), base.join("data/b")).unwrap();

        let guard = DirectoryGuard::new(&[path_str(&base.join("data"))]).unwrap();
        let err = guard
            .validate_path(&path_str(&base.join("data/a")))
            .unwrap_err();
        assert!(matches!(err, FsError::PathResolution { .. }));
    }

    #[test]
    fn test_missing_destination_validates_nearest_ancestor() {
        let (_tmp, base) = sandbox();
        let guard = DirectoryGuard::new(&[path_str(&base.join("data"))]).unwrap();

        let resolved = guard
            .validate_path(&path_str(&base.join("data/new/dir/file.txt")))
            .unwrap();
        assert_eq!(resolved, base.join("data/new/dir/file.txt"));
    }

    #[test]
    fn test_roots_are_normalized_and_deduplicated() {
        let (_tmp, base) = sandbox();
        let data = base.join("data");
        let guard = DirectoryGuard::new(&[
            path_str(&data),
            format!("{}/", data.display()),
            format!("{}/./../data", data.display()),
        ])
        .unwrap();

        assert_eq!(guard.allowed_directories(), vec![path_str(&data)]);
        assert_eq!(guard.default_root(), data.as_path());
    }

    #[test]
    fn test_missing_root_is_config_error() {
        let (_tmp, base) = sandbox();
        let err = DirectoryGuard::new(&[path_str(&base.join("nope"))]).unwrap_err();
        assert!(matches!(err, FsError::ConfigError(_)));

        let empty: [&str; 0] = [];
        assert!(matches!(
            DirectoryGuard::new(&empty).unwrap_err(),
            FsError::ConfigError(_)
        ));
    }

    #[test]
    fn test_null_byte_is_invalid_path() {
        let (_tmp, base) = sandbox();
        let guard = DirectoryGuard::new(&[path_str(&base.join("data"))]).unwrap();
        let err = guard.validate_path("data\0/x").unwrap_err();
        assert!(matches!(err, FsError::InvalidPath(_)));
    }

    #[cfg(unix)]
    #[test]
    fn test_filesystem_root_allows_everything() {
        let guard = DirectoryGuard::new(&["/"]).unwrap();
        assert!(guard.is_within_allowed(Path::new("/etc/hostname")));
        assert!(guard.is_within_allowed(Path::new("/")));
    }
}
