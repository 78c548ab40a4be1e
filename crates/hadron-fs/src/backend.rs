//! Backend capability traits.
//!
//! The filesystem and file handles never talk to a concrete backend. They
//! are given a [`Connector`] at connect time and from then on only use the
//! [`Connection`], [`InputStream`] and [`OutputStream`] it hands out.
//!
//! Backend calls fail with [`BackendError`], which carries only a message;
//! the handles translate it into an [`FsError`](crate::FsError) kind that
//! depends on which operation failed.

use thiserror::Error;

use crate::config::Configuration;
use crate::marshal::RawBuffer;
use crate::path::DfsPath;

/// A failure raised by a backend call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct BackendError {
    message: String,
}

impl BackendError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<std::io::Error> for BackendError {
    fn from(e: std::io::Error) -> Self {
        Self::new(e.to_string())
    }
}

/// Result type for backend calls.
pub type BackendResult<T> = Result<T, BackendError>;

/// Status record the backend returns for a path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileStatus {
    /// Fully qualified path of the entry.
    pub path: DfsPath,
    /// Length in bytes (0 for directories).
    pub length: u64,
    pub is_dir: bool,
    pub replication: u16,
    pub block_size: u64,
    /// Milliseconds since the Unix epoch.
    pub modification_time: i64,
    /// Milliseconds since the Unix epoch.
    pub access_time: i64,
    /// Permission bits, e.g. `0o644`.
    pub permission: u32,
    pub owner: String,
    pub group: String,
}

/// Hosts serving one block of a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockLocation {
    /// Host names, in the backend's preference order.
    pub hosts: Vec<String>,
    /// `host:port` transfer addresses, same order as `hosts`.
    pub names: Vec<String>,
    /// Offset of the block within the file.
    pub offset: u64,
    pub length: u64,
}

/// A readable backend stream.
pub trait InputStream: Send {
    /// Read up to `buf.len()` elements at the current position.
    ///
    /// Returns `None` at end of stream.
    fn read(&mut self, buf: &mut RawBuffer) -> BackendResult<Option<usize>>;

    /// Read up to `len` elements at `position` into `buf[offset..]` without
    /// moving the stream position. Returns `None` at end of stream.
    fn read_at(
        &mut self,
        position: u64,
        buf: &mut RawBuffer,
        offset: usize,
        len: usize,
    ) -> BackendResult<Option<usize>>;

    fn seek(&mut self, position: u64) -> BackendResult<()>;

    fn pos(&self) -> BackendResult<u64>;

    /// Elements readable without blocking.
    fn available(&self) -> BackendResult<u64>;

    fn close(&mut self) -> BackendResult<()>;
}

/// A writable backend stream. Writes are sequential.
pub trait OutputStream: Send {
    fn write(&mut self, data: &[i8]) -> BackendResult<()>;

    fn pos(&self) -> BackendResult<u64>;

    fn flush(&mut self) -> BackendResult<()>;

    fn close(&mut self) -> BackendResult<()>;
}

/// An open connection to one backend filesystem.
pub trait Connection: Send + Sync {
    /// URI of the filesystem, e.g. `hdfs://namenode:9000`.
    fn uri(&self) -> String;

    /// Identity string; two handles are equal when these match.
    fn identity(&self) -> String;

    fn status(&self, path: &DfsPath) -> BackendResult<FileStatus>;

    fn exists(&self, path: &DfsPath) -> BackendResult<bool>;

    fn is_directory(&self, path: &DfsPath) -> BackendResult<bool>;

    fn open(&self, path: &DfsPath, buffer_size: usize) -> BackendResult<Box<dyn InputStream>>;

    fn create(
        &self,
        path: &DfsPath,
        overwrite: bool,
        buffer_size: usize,
        replication: u16,
        block_size: u64,
    ) -> BackendResult<Box<dyn OutputStream>>;

    fn append(&self, path: &DfsPath) -> BackendResult<Box<dyn OutputStream>>;

    fn mkdirs(&self, path: &DfsPath) -> BackendResult<bool>;

    fn delete(&self, path: &DfsPath, recursive: bool) -> BackendResult<bool>;

    fn rename(&self, from: &DfsPath, to: &DfsPath) -> BackendResult<bool>;

    fn set_owner(&self, path: &DfsPath, user: &str, group: &str) -> BackendResult<()>;

    fn set_permission(&self, path: &DfsPath, mode: u32) -> BackendResult<()>;

    fn set_replication(&self, path: &DfsPath, replication: u16) -> BackendResult<bool>;

    /// Set modification and access times; `-1` leaves a time unchanged.
    fn set_times(&self, path: &DfsPath, mtime: i64, atime: i64) -> BackendResult<()>;

    fn set_working_directory(&self, path: &DfsPath) -> BackendResult<()>;

    fn working_directory(&self) -> BackendResult<DfsPath>;

    fn raw_capacity(&self) -> BackendResult<u64>;

    fn raw_used(&self) -> BackendResult<u64>;

    fn default_block_size(&self) -> BackendResult<u64>;

    /// Default block size for files created at `path`.
    fn default_block_size_for(&self, _path: &DfsPath) -> BackendResult<u64> {
        self.default_block_size()
    }

    fn block_size(&self, path: &DfsPath) -> BackendResult<u64>;

    fn block_locations(
        &self,
        status: &FileStatus,
        start: u64,
        len: u64,
    ) -> BackendResult<Vec<BlockLocation>>;

    fn list_status(&self, path: &DfsPath) -> BackendResult<Vec<FileStatus>>;

    fn close(&self) -> BackendResult<()>;
}

/// Resolves filesystem URIs to connections.
pub trait Connector: Send + Sync {
    /// The local filesystem.
    fn local(&self, conf: &Configuration) -> BackendResult<Box<dyn Connection>>;

    /// URI of the default filesystem.
    fn default_uri(&self, conf: &Configuration) -> BackendResult<String> {
        Ok(conf.default_fs().to_string())
    }

    /// Connect to `uri`, acting as `user` when given.
    fn get(
        &self,
        uri: &str,
        conf: &Configuration,
        user: Option<&str>,
    ) -> BackendResult<Box<dyn Connection>>;
}

/// `(offset, length)` of every block of a `file_len` byte file that
/// overlaps `[start, start + len)`.
pub fn overlapping_blocks(file_len: u64, block_size: u64, start: u64, len: u64) -> Vec<(u64, u64)> {
    if block_size == 0 || len == 0 || start >= file_len {
        return Vec::new();
    }
    let end = start.saturating_add(len).min(file_len);
    let mut blocks = Vec::new();
    let mut offset = (start / block_size) * block_size;
    while offset < end {
        let block_len = block_size.min(file_len - offset);
        blocks.push((offset, block_len));
        offset += block_size;
    }
    blocks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overlapping_blocks() {
        // 250 bytes in 100 byte blocks: [0,100) [100,200) [200,250)
        assert_eq!(overlapping_blocks(250, 100, 0, 250).len(), 3);
        assert_eq!(overlapping_blocks(250, 100, 150, 10), vec![(100, 100)]);
        assert_eq!(overlapping_blocks(250, 100, 199, 2), vec![(100, 100), (200, 50)]);
        assert_eq!(overlapping_blocks(250, 100, 0, u64::MAX).last(), Some(&(200, 50)));
    }

    #[test]
    fn test_overlapping_blocks_empty() {
        assert!(overlapping_blocks(0, 100, 0, 10).is_empty());
        assert!(overlapping_blocks(250, 100, 300, 10).is_empty());
        assert!(overlapping_blocks(250, 100, 10, 0).is_empty());
    }

    #[test]
    fn test_backend_error_from_io() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "boom");
        let err: BackendError = io.into();
        assert_eq!(err.message(), "boom");
    }
}
