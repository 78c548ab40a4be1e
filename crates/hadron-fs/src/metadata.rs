//! Path metadata records.
//!
//! [`normalize`] turns a backend [`FileStatus`] into a [`PathInfo`], the
//! fixed-key record that `get_path_info` and `list_directory` return.

use serde::{Deserialize, Serialize};

use crate::backend::{Connection, FileStatus};
use crate::error::{FsError, FsResult};
use crate::path::DfsPath;

/// Kind of entry a path names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum PathKind {
    File,
    Directory,
}

impl PathKind {
    /// Returns true if this is a regular file.
    pub fn is_file(&self) -> bool {
        matches!(self, PathKind::File)
    }

    /// Returns true if this is a directory.
    pub fn is_dir(&self) -> bool {
        matches!(self, PathKind::Directory)
    }
}

/// Canonical metadata for one path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathInfo {
    /// Fully qualified path string.
    pub name: String,
    pub kind: PathKind,
    pub group: String,
    pub owner: String,
    /// Permission bits, e.g. `0o644`.
    pub permissions: u32,
    pub replication: u16,
    pub block_size: u64,
    pub size: u64,
    /// Milliseconds since the Unix epoch.
    pub last_mod: i64,
    /// Milliseconds since the Unix epoch.
    pub last_access: i64,
    /// Canonical path string from the status record.
    pub path: String,
    pub fs_uri: String,
    /// Number of path segments.
    pub depth: usize,
    pub absolute: bool,
    /// Name of the parent segment; absent when the parent is the root.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
}

impl PathInfo {
    /// Returns true if this is a regular file.
    pub fn is_file(&self) -> bool {
        self.kind.is_file()
    }

    /// Returns true if this is a directory.
    pub fn is_dir(&self) -> bool {
        self.kind.is_dir()
    }
}

/// Build the metadata record for `path`.
///
/// When `status` is `None` it is fetched first, and the status's own
/// (qualified) path is used from then on. Any failure of that fetch is
/// reported as [`FsError::NotFound`], whatever the backend said.
///
/// `kind` always comes from a live directory check rather than from the
/// status record.
pub fn normalize(
    conn: &dyn Connection,
    path: &DfsPath,
    status: Option<FileStatus>,
) -> FsResult<PathInfo> {
    let (path, status) = match status {
        Some(status) => (path.clone(), status),
        None => {
            let status = conn.status(path).map_err(|e| {
                tracing::debug!(path = %path, error = %e, "status fetch failed");
                FsError::not_found(path.to_string())
            })?;
            (status.path.clone(), status)
        }
    };

    let kind = if conn.is_directory(&path)? {
        PathKind::Directory
    } else {
        PathKind::File
    };

    let parent = path
        .parent()
        .filter(|p| !p.is_root())
        .map(|p| p.name().to_string());

    Ok(PathInfo {
        name: path.to_string(),
        kind,
        group: status.group,
        owner: status.owner,
        permissions: status.permission,
        replication: status.replication,
        block_size: conn.block_size(&path)?,
        size: status.length,
        last_mod: status.modification_time,
        last_access: status.access_time,
        path: status.path.to_string(),
        fs_uri: conn.uri(),
        depth: path.depth(),
        absolute: path.is_absolute(),
        parent,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::Connector;
    use crate::backends::MemoryConnector;
    use crate::config::Configuration;

    fn conn() -> Box<dyn Connection> {
        let connector = MemoryConnector::new();
        let conn = connector
            .get("hdfs://nn:9000", &Configuration::new(), Some("alice"))
            .unwrap();
        conn.mkdirs(&DfsPath::new("/data/logs").unwrap()).unwrap();
        let mut out = conn
            .create(&DfsPath::new("/data/a.txt").unwrap(), true, 4096, 3, 1024)
            .unwrap();
        out.write(&[1, 2, 3]).unwrap();
        out.close().unwrap();
        conn
    }

    #[test]
    fn test_file_record() {
        let conn = conn();
        let info = normalize(conn.as_ref(), &DfsPath::new("/data/a.txt").unwrap(), None).unwrap();
        assert_eq!(info.kind, PathKind::File);
        assert_eq!(info.name, "hdfs://nn:9000/data/a.txt");
        assert_eq!(info.path, "hdfs://nn:9000/data/a.txt");
        assert_eq!(info.fs_uri, "hdfs://nn:9000");
        assert_eq!(info.size, 3);
        assert_eq!(info.replication, 3);
        assert_eq!(info.block_size, 1024);
        assert_eq!(info.owner, "alice");
        assert_eq!(info.depth, 2);
        assert!(info.absolute);
        assert_eq!(info.parent.as_deref(), Some("data"));
    }

    #[test]
    fn test_directory_record() {
        let conn = conn();
        let info = normalize(conn.as_ref(), &DfsPath::new("/data").unwrap(), None).unwrap();
        assert!(info.is_dir());
        assert_eq!(info.depth, 1);
        // Parent is the root, so it is left out.
        assert!(info.parent.is_none());
    }

    #[test]
    fn test_missing_path_is_not_found() {
        let conn = conn();
        let result = normalize(conn.as_ref(), &DfsPath::new("/nope").unwrap(), None);
        assert!(matches!(result, Err(FsError::NotFound(_))));
    }

    #[test]
    fn test_serialized_keys() {
        let conn = conn();
        let info = normalize(conn.as_ref(), &DfsPath::new("/data/a.txt").unwrap(), None).unwrap();
        let value = serde_json::to_value(&info).unwrap();
        assert_eq!(value["kind"], "file");
        for key in [
            "name", "kind", "group", "owner", "permissions", "replication", "block_size",
            "size", "last_mod", "last_access", "path", "fs_uri", "depth", "absolute", "parent",
        ] {
            assert!(value.get(key).is_some(), "missing {key}");
        }
    }
}
