//! Backend-native paths.
//!
//! A [`DfsPath`] is the value the backend traits take: an optional scheme
//! and authority (`hdfs://namenode:9000`, `file:`) followed by a
//! slash-separated path. Paths are plain values and are rebuilt from the
//! caller's string on every call.

use std::fmt;
use std::str::FromStr;

use crate::error::{FsError, FsResult};

/// Separator between path segments.
pub const SEPARATOR: char = '/';

/// A path as understood by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DfsPath {
    scheme: Option<String>,
    authority: Option<String>,
    path: String,
}

impl DfsPath {
    /// Parse a caller-supplied path string.
    ///
    /// Accepted forms are `scheme://authority/path`, `scheme:/path` and bare
    /// absolute or relative paths. Repeated slashes collapse and a trailing
    /// slash is dropped. The empty string is rejected.
    pub fn new(s: &str) -> FsResult<Self> {
        if s.is_empty() {
            return Err(FsError::invalid_argument("empty path"));
        }

        if let Some((scheme, rest)) = s.split_once("://") {
            if is_scheme(scheme) {
                let (authority, path) = match rest.find(SEPARATOR) {
                    Some(idx) => (&rest[..idx], &rest[idx..]),
                    None => (rest, "/"),
                };
                return Ok(Self {
                    scheme: Some(scheme.to_string()),
                    authority: (!authority.is_empty()).then(|| authority.to_string()),
                    path: normalize(path),
                });
            }
        }

        if let Some((scheme, rest)) = s.split_once(':') {
            if is_scheme(scheme) && rest.starts_with(SEPARATOR) {
                return Ok(Self {
                    scheme: Some(scheme.to_string()),
                    authority: None,
                    path: normalize(rest),
                });
            }
        }

        Ok(Self {
            scheme: None,
            authority: None,
            path: normalize(s),
        })
    }

    /// The root directory with no scheme or authority.
    pub fn root() -> Self {
        Self {
            scheme: None,
            authority: None,
            path: SEPARATOR.to_string(),
        }
    }

    pub fn scheme(&self) -> Option<&str> {
        self.scheme.as_deref()
    }

    pub fn authority(&self) -> Option<&str> {
        self.authority.as_deref()
    }

    /// The path component, without scheme or authority.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn is_absolute(&self) -> bool {
        self.path.starts_with(SEPARATOR)
    }

    pub fn is_root(&self) -> bool {
        self.path.len() == 1 && self.is_absolute()
    }

    /// Number of segments; the root has depth 0.
    pub fn depth(&self) -> usize {
        self.segments().count()
    }

    /// Iterate over the non-empty segments of the path.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.path.split(SEPARATOR).filter(|s| !s.is_empty())
    }

    /// The final segment, or the empty string for the root.
    pub fn name(&self) -> &str {
        self.segments().last().unwrap_or("")
    }

    /// The parent path, keeping scheme and authority.
    ///
    /// `None` for the root and for single-segment relative paths.
    pub fn parent(&self) -> Option<DfsPath> {
        if self.is_root() {
            return None;
        }
        let idx = self.path.rfind(SEPARATOR)?;
        let parent = if idx == 0 {
            SEPARATOR.to_string()
        } else {
            self.path[..idx].to_string()
        };
        Some(Self {
            scheme: self.scheme.clone(),
            authority: self.authority.clone(),
            path: parent,
        })
    }

    /// Append a child segment (or relative path).
    pub fn join(&self, child: &str) -> DfsPath {
        let child = child.trim_start_matches(SEPARATOR);
        let path = if child.is_empty() {
            self.path.clone()
        } else if self.path.ends_with(SEPARATOR) {
            normalize(&format!("{}{}", self.path, child))
        } else {
            normalize(&format!("{}{}{}", self.path, SEPARATOR, child))
        };
        Self {
            scheme: self.scheme.clone(),
            authority: self.authority.clone(),
            path,
        }
    }

    /// Resolve a relative path against `cwd`; absolute paths keep their
    /// own path component. Scheme and authority are dropped.
    pub fn absolute_against(&self, cwd: &DfsPath) -> DfsPath {
        if self.is_absolute() {
            return Self {
                scheme: None,
                authority: None,
                path: self.path.clone(),
            };
        }
        let mut resolved = cwd.join(&self.path);
        resolved.scheme = None;
        resolved.authority = None;
        resolved
    }

    /// Qualify this path with a scheme and authority.
    pub fn qualified(&self, scheme: &str, authority: Option<&str>) -> DfsPath {
        Self {
            scheme: Some(scheme.to_string()),
            authority: authority.filter(|a| !a.is_empty()).map(str::to_string),
            path: self.path.clone(),
        }
    }

    /// Whether `self` is `other` or lies underneath it (path component only).
    pub fn starts_with(&self, other: &DfsPath) -> bool {
        let mine: Vec<_> = self.segments().collect();
        let theirs: Vec<_> = other.segments().collect();
        self.is_absolute() == other.is_absolute() && mine.starts_with(&theirs)
    }
}

impl fmt::Display for DfsPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.scheme, &self.authority) {
            (Some(scheme), Some(authority)) => write!(f, "{scheme}://{authority}{}", self.path),
            (Some(scheme), None) => write!(f, "{scheme}:{}", self.path),
            _ => f.write_str(&self.path),
        }
    }
}

impl FromStr for DfsPath {
    type Err = FsError;

    fn from_str(s: &str) -> FsResult<Self> {
        Self::new(s)
    }
}

fn is_scheme(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
}

fn normalize(path: &str) -> String {
    let absolute = path.starts_with(SEPARATOR);
    let joined = path
        .split(SEPARATOR)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("/");
    if absolute {
        format!("/{joined}")
    } else if joined.is_empty() {
        ".".to_string()
    } else {
        joined
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_path_rejected() {
        assert!(matches!(DfsPath::new(""), Err(FsError::InvalidArgument(_))));
    }

    #[test]
    fn test_non_empty_paths_accepted() {
        for s in ["/", "a", "/a/b", "file:/tmp/x", "hdfs://nn:9000/user", "x//y/", "."] {
            assert!(DfsPath::new(s).is_ok(), "{s}");
        }
    }

    #[test]
    fn test_full_uri() {
        let p = DfsPath::new("hdfs://nn:9000/user/alice/").unwrap();
        assert_eq!(p.scheme(), Some("hdfs"));
        assert_eq!(p.authority(), Some("nn:9000"));
        assert_eq!(p.path(), "/user/alice");
        assert_eq!(p.to_string(), "hdfs://nn:9000/user/alice");
    }

    #[test]
    fn test_scheme_without_authority() {
        let p = DfsPath::new("file:/tmp//data").unwrap();
        assert_eq!(p.scheme(), Some("file"));
        assert_eq!(p.authority(), None);
        assert_eq!(p.to_string(), "file:/tmp/data");

        let p = DfsPath::new("file:///tmp").unwrap();
        assert_eq!(p.authority(), None);
        assert_eq!(p.path(), "/tmp");
    }

    #[test]
    fn test_depth_and_name() {
        assert_eq!(DfsPath::new("/").unwrap().depth(), 0);
        assert_eq!(DfsPath::new("/a/b").unwrap().depth(), 2);
        assert_eq!(DfsPath::new("a/b/c").unwrap().depth(), 3);
        assert_eq!(DfsPath::new("/a/b").unwrap().name(), "b");
        assert_eq!(DfsPath::new("/").unwrap().name(), "");
    }

    #[test]
    fn test_parent() {
        assert!(DfsPath::root().parent().is_none());
        assert!(DfsPath::new("a").unwrap().parent().is_none());
        assert!(DfsPath::new("/a").unwrap().parent().unwrap().is_root());

        let p = DfsPath::new("hdfs://nn/a/b").unwrap().parent().unwrap();
        assert_eq!(p.to_string(), "hdfs://nn/a");
        assert_eq!(p.name(), "a");
    }

    #[test]
    fn test_join_and_resolve() {
        let cwd = DfsPath::new("/user/alice").unwrap();
        assert_eq!(cwd.join("data/x").path(), "/user/alice/data/x");
        assert_eq!(DfsPath::root().join("x").path(), "/x");

        let rel = DfsPath::new("logs").unwrap();
        assert_eq!(rel.absolute_against(&cwd).path(), "/user/alice/logs");

        let abs = DfsPath::new("hdfs://nn/tmp").unwrap();
        assert_eq!(abs.absolute_against(&cwd).to_string(), "/tmp");
    }

    #[test]
    fn test_starts_with() {
        let a = DfsPath::new("/a").unwrap();
        assert!(DfsPath::new("/a/b").unwrap().starts_with(&a));
        assert!(a.starts_with(&a));
        assert!(!DfsPath::new("/ab").unwrap().starts_with(&a));
    }
}
