//! The filesystem handle.
//!
//! [`FileSystem`] owns one backend [`Connection`] and the
//! [`Configuration`] it was opened with. Every operation takes caller path
//! strings, rebuilds a [`DfsPath`] from them, and translates backend
//! failures into [`FsError`] kinds.

use std::fmt;

use crate::backend::{BackendError, Connection, Connector};
use crate::config::{Configuration, ConnectParams};
use crate::copy::copy_between;
use crate::error::{FsError, FsResult};
use crate::file::{FileHandle, DEFAULT_READ_CHUNK_SIZE};
use crate::flags::{wants_exclusive_create, OpenFlags, StreamMode};
use crate::metadata::{normalize, PathInfo};
use crate::path::DfsPath;

/// Scheme used when connecting to an explicit `host:port`.
pub const CLUSTER_SCHEME: &str = "hdfs";

/// Host name that selects the configured default filesystem.
pub const DEFAULT_HOST: &str = "default";

/// Stream parameters for [`FileSystem::open_file`].
///
/// Zero leaves `buffer_size`, `replication` and `block_size` unset so they
/// are taken from the configuration or the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenParams {
    pub buffer_size: usize,
    pub replication: u16,
    pub block_size: u64,
    /// Bytes read by `read(-1)` on the resulting handle.
    pub read_chunk_size: usize,
}

impl Default for OpenParams {
    fn default() -> Self {
        Self {
            buffer_size: 0,
            replication: 0,
            block_size: 0,
            read_chunk_size: DEFAULT_READ_CHUNK_SIZE,
        }
    }
}

impl OpenParams {
    pub fn with_buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size;
        self
    }

    pub fn with_replication(mut self, replication: u16) -> Self {
        self.replication = replication;
        self
    }

    pub fn with_block_size(mut self, block_size: u64) -> Self {
        self.block_size = block_size;
        self
    }

    pub fn with_read_chunk_size(mut self, read_chunk_size: usize) -> Self {
        self.read_chunk_size = read_chunk_size;
        self
    }
}

/// A connected filesystem.
pub struct FileSystem {
    params: ConnectParams,
    conf: Configuration,
    conn: Box<dyn Connection>,
}

impl fmt::Debug for FileSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileSystem")
            .field("params", &self.params)
            .field("uri", &self.conn.uri())
            .finish()
    }
}

/// Two handles are equal when they hold the same backend connection identity.
impl PartialEq for FileSystem {
    fn eq(&self, other: &Self) -> bool {
        self.conn.identity() == other.conn.identity()
    }
}

impl FileSystem {
    /// Connect to the filesystem named by `params`.
    ///
    /// An empty host selects the local filesystem whatever the port. The
    /// host `"default"` with port 0 selects the configured default
    /// filesystem. Anything else connects to `hdfs://host:port`.
    pub fn connect(
        params: ConnectParams,
        conf: Configuration,
        connector: &dyn Connector,
    ) -> FsResult<Self> {
        let user = params.user.as_deref();
        let conn = if params.host.is_empty() {
            connector.local(&conf).map_err(connection_error)?
        } else if params.host == DEFAULT_HOST && params.port == 0 {
            let uri = connector.default_uri(&conf).map_err(connection_error)?;
            connector.get(&uri, &conf, user).map_err(connection_error)?
        } else {
            let uri = format!("{CLUSTER_SCHEME}://{}:{}", params.host, params.port);
            connector.get(&uri, &conf, user).map_err(connection_error)?
        };

        tracing::info!(
            host = %params.host,
            port = params.port,
            user = ?params.user,
            uri = %conn.uri(),
            "connected"
        );
        Ok(Self { params, conf, conn })
    }

    /// Close the backend connection.
    pub fn close(self) -> FsResult<()> {
        tracing::info!(uri = %self.conn.uri(), "closing filesystem");
        self.conn.close()?;
        Ok(())
    }

    pub fn get_host(&self) -> &str {
        &self.params.host
    }

    pub fn get_port(&self) -> u16 {
        self.params.port
    }

    pub fn get_user(&self) -> Option<&str> {
        self.params.user.as_deref()
    }

    pub fn configuration(&self) -> &Configuration {
        &self.conf
    }

    /// URI of the connected filesystem.
    pub fn uri(&self) -> String {
        self.conn.uri()
    }

    pub fn chmod(&self, path: &str, mode: u32) -> FsResult<()> {
        let path = DfsPath::new(path)?;
        self.conn.set_permission(&path, mode)?;
        Ok(())
    }

    /// Change owner and group. An empty `user` or `group` keeps the path's
    /// current value; both empty is an error.
    pub fn chown(&self, path: &str, user: &str, group: &str) -> FsResult<()> {
        if user.is_empty() && group.is_empty() {
            return Err(FsError::invalid_argument("chown: both user and group are empty"));
        }
        let path = DfsPath::new(path)?;
        let (user, group) = if user.is_empty() || group.is_empty() {
            let current = self
                .conn
                .status(&path)
                .map_err(|_| FsError::not_found(path.to_string()))?;
            let user = if user.is_empty() { current.owner } else { user.to_string() };
            let group = if group.is_empty() { current.group } else { group.to_string() };
            (user, group)
        } else {
            (user.to_string(), group.to_string())
        };
        self.conn.set_owner(&path, &user, &group)?;
        Ok(())
    }

    pub fn exists(&self, path: &str) -> FsResult<bool> {
        Ok(self.conn.exists(&DfsPath::new(path)?)?)
    }

    /// Raw capacity of the filesystem in bytes.
    pub fn get_capacity(&self) -> FsResult<u64> {
        Ok(self.conn.raw_capacity()?)
    }

    /// Raw bytes used on the filesystem.
    pub fn get_used(&self) -> FsResult<u64> {
        Ok(self.conn.raw_used()?)
    }

    pub fn get_default_block_size(&self) -> FsResult<u64> {
        Ok(self.conn.default_block_size()?)
    }

    pub fn get_working_directory(&self) -> FsResult<String> {
        Ok(self.conn.working_directory()?.to_string())
    }

    pub fn set_working_directory(&self, path: &str) -> FsResult<()> {
        self.conn.set_working_directory(&DfsPath::new(path)?)?;
        Ok(())
    }

    /// Copy `from` on this filesystem to `to_path` on `to_fs`.
    pub fn copy(&self, from: &str, to_fs: &FileSystem, to_path: &str) -> FsResult<()> {
        self.transfer(from, to_fs, to_path, false)
    }

    /// Copy, then delete the source.
    pub fn move_to(&self, from: &str, to_fs: &FileSystem, to_path: &str) -> FsResult<()> {
        self.transfer(from, to_fs, to_path, true)
    }

    fn transfer(&self, from: &str, to_fs: &FileSystem, to_path: &str, delete_source: bool) -> FsResult<()> {
        let from = DfsPath::new(from)?;
        let to_path = DfsPath::new(to_path)?;
        copy_between(
            self.conn.as_ref(),
            &from,
            to_fs.conn.as_ref(),
            &to_path,
            delete_source,
            &self.conf,
        )?;
        Ok(())
    }

    /// Create a directory and any missing parents.
    pub fn create_directory(&self, path: &str) -> FsResult<bool> {
        Ok(self.conn.mkdirs(&DfsPath::new(path)?)?)
    }

    pub fn delete(&self, path: &str, recursive: bool) -> FsResult<bool> {
        Ok(self.conn.delete(&DfsPath::new(path)?, recursive)?)
    }

    pub fn delete_recursive(&self, path: &str) -> FsResult<bool> {
        self.delete(path, true)
    }

    pub fn rename(&self, from: &str, to: &str) -> FsResult<bool> {
        Ok(self.conn.rename(&DfsPath::new(from)?, &DfsPath::new(to)?)?)
    }

    pub fn set_replication(&self, path: &str, replication: u16) -> FsResult<bool> {
        Ok(self.conn.set_replication(&DfsPath::new(path)?, replication)?)
    }

    /// Set modification and access times in epoch milliseconds; `-1`
    /// leaves a time unchanged.
    pub fn utime(&self, path: &str, mtime: i64, atime: i64) -> FsResult<()> {
        self.conn.set_times(&DfsPath::new(path)?, mtime, atime)?;
        Ok(())
    }

    /// Metadata for every direct child of `path`.
    ///
    /// Records are built from the statuses the listing returned; no fresh
    /// status fetch is made per child.
    pub fn list_directory(&self, path: &str) -> FsResult<Vec<PathInfo>> {
        let path = DfsPath::new(path)?;
        if !self.conn.exists(&path)? {
            return Err(FsError::not_found(path.to_string()));
        }
        self.conn
            .list_status(&path)?
            .into_iter()
            .map(|status| {
                let child = status.path.clone();
                normalize(self.conn.as_ref(), &child, Some(status))
            })
            .collect()
    }

    /// Metadata for `path`, always from a fresh status fetch.
    pub fn get_path_info(&self, path: &str) -> FsResult<PathInfo> {
        normalize(self.conn.as_ref(), &DfsPath::new(path)?, None)
    }

    /// Hosts holding each block that overlaps `[start, start + length)`.
    pub fn get_hosts(&self, path: &str, start: u64, length: u64) -> FsResult<Vec<Vec<String>>> {
        let path = DfsPath::new(path)?;
        let status = self
            .conn
            .status(&path)
            .map_err(|_| FsError::not_found(path.to_string()))?;
        let blocks = self.conn.block_locations(&status, start, length)?;
        Ok(blocks.into_iter().map(|block| block.hosts).collect())
    }

    /// Open `path` for reading or writing according to `flags`.
    ///
    /// Read-write and unknown access modes are rejected. `O_CREAT|O_EXCL`
    /// is only warned about: creation always overwrites.
    pub fn open_file(&self, path: &str, flags: OpenFlags, params: OpenParams) -> FsResult<FileHandle> {
        let dfs_path = DfsPath::new(path)?;
        let mode = StreamMode::decide(flags)?;

        if wants_exclusive_create(flags) {
            tracing::warn!(path, "exclusive create is not enforced; an existing file will be replaced");
        }

        let buffer_size = match params.buffer_size {
            0 => self.conf.buffer_size().max(1) as usize,
            n => n,
        };
        let replication = match params.replication {
            0 if mode.uses_replication() => self.conf.replication().clamp(1, u16::MAX as i64) as u16,
            n => n,
        };

        tracing::debug!(path, %flags, %mode, buffer_size, replication, "opening file");
        let handle = match mode {
            StreamMode::Read => {
                let stream = self.conn.open(&dfs_path, buffer_size).map_err(open_error)?;
                FileHandle::input(path, flags, stream, params.read_chunk_size)
            }
            StreamMode::Append => {
                let stream = self.conn.append(&dfs_path).map_err(open_error)?;
                FileHandle::output(path, flags, stream)
            }
            StreamMode::Create => {
                let block_size = match params.block_size {
                    0 => self.conn.default_block_size_for(&dfs_path).map_err(open_error)?,
                    n => n,
                };
                let stream = self
                    .conn
                    .create(&dfs_path, true, buffer_size, replication, block_size)
                    .map_err(open_error)?;
                FileHandle::output(path, flags, stream)
            }
        };
        Ok(handle)
    }
}

fn connection_error(e: BackendError) -> FsError {
    FsError::connection(e.message())
}

fn open_error(e: BackendError) -> FsError {
    FsError::backend_io(e.message())
}
