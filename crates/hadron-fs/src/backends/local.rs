//! Local filesystem backend.
//!
//! Serves `file:` URIs from the machine's own disk. There is one "block"
//! per file, replication is always 1 and every block lives on
//! `localhost`. Owner and group are reported as numeric uid/gid strings.

use parking_lot::RwLock;
use std::fs::{self, File, FileTimes, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::os::unix::fs::{FileExt, MetadataExt, PermissionsExt};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, UNIX_EPOCH};

use crate::backend::{
    BackendError, BackendResult, BlockLocation, Connection, Connector, FileStatus, InputStream,
    OutputStream,
};
use crate::config::Configuration;
use crate::marshal::{fill_signed, to_unsigned, RawBuffer};
use crate::path::DfsPath;

/// Scheme served by this backend.
pub const LOCAL_SCHEME: &str = "file";
/// Property holding the block size reported for local files.
pub const LOCAL_BLOCKSIZE_PROPERTY: &str = "fs.local.block.size";
/// Block size reported when [`LOCAL_BLOCKSIZE_PROPERTY`] is unset.
pub const DEFAULT_LOCAL_BLOCK_SIZE: u64 = 32 * 1024 * 1024;

const LOCALHOST: &str = "localhost";
const LOCAL_TRANSFER_PORT: u16 = 50010;

/// Connects to the local filesystem only.
#[derive(Debug, Default, Clone)]
pub struct LocalConnector;

impl LocalConnector {
    pub fn new() -> Self {
        Self
    }
}

impl Connector for LocalConnector {
    fn local(&self, conf: &Configuration) -> BackendResult<Box<dyn Connection>> {
        Ok(Box::new(LocalConnection::new(conf, None)?))
    }

    fn get(
        &self,
        uri: &str,
        conf: &Configuration,
        user: Option<&str>,
    ) -> BackendResult<Box<dyn Connection>> {
        let parsed = DfsPath::new(uri).map_err(|e| BackendError::new(e.to_string()))?;
        match parsed.scheme() {
            Some(LOCAL_SCHEME) => Ok(Box::new(LocalConnection::new(conf, user)?)),
            Some(scheme) => Err(BackendError::new(format!("No FileSystem for scheme: {scheme}"))),
            None => Err(BackendError::new(format!("no scheme in URI {uri}"))),
        }
    }
}

/// A connection to the local filesystem.
#[derive(Debug)]
pub struct LocalConnection {
    user: String,
    block_size: u64,
    cwd: RwLock<DfsPath>,
    closed: AtomicBool,
}

impl LocalConnection {
    /// Connect with the working directory set to the process cwd.
    pub fn new(conf: &Configuration, user: Option<&str>) -> BackendResult<Self> {
        let cwd = std::env::current_dir()?;
        let cwd = DfsPath::new(&cwd.to_string_lossy()).map_err(|e| BackendError::new(e.to_string()))?;
        let block_size = conf.get_int(LOCAL_BLOCKSIZE_PROPERTY, DEFAULT_LOCAL_BLOCK_SIZE as i64);
        Ok(Self {
            user: user.map(str::to_string).unwrap_or_else(whoami::username),
            block_size: block_size.max(1) as u64,
            cwd: RwLock::new(cwd),
            closed: AtomicBool::new(false),
        })
    }

    fn check(&self) -> BackendResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(BackendError::new("Filesystem closed"));
        }
        Ok(())
    }

    /// Absolute local path for `path`, rejecting non-`file:` paths.
    fn resolve(&self, path: &DfsPath) -> BackendResult<DfsPath> {
        let foreign = path.scheme().is_some_and(|s| s != LOCAL_SCHEME) || path.authority().is_some();
        if foreign {
            return Err(BackendError::new(format!(
                "Wrong FS: {path}, expected: file:///"
            )));
        }
        Ok(path.absolute_against(&self.cwd.read()))
    }

    fn local_path(&self, path: &DfsPath) -> BackendResult<(DfsPath, PathBuf)> {
        let resolved = self.resolve(path)?;
        let local = PathBuf::from(resolved.path());
        Ok((resolved, local))
    }

    /// Statistics of the mount holding the working directory.
    fn statvfs(&self) -> BackendResult<rustix::fs::StatVfs> {
        let cwd = PathBuf::from(self.cwd.read().path());
        rustix::fs::statvfs(&cwd).map_err(|e| BackendError::from(std::io::Error::from(e)))
    }

    fn status_of(&self, path: &DfsPath, meta: &fs::Metadata) -> FileStatus {
        FileStatus {
            path: path.qualified(LOCAL_SCHEME, None),
            length: if meta.is_dir() { 0 } else { meta.len() },
            is_dir: meta.is_dir(),
            replication: 1,
            block_size: self.block_size,
            modification_time: meta.mtime() * 1000 + meta.mtime_nsec() / 1_000_000,
            access_time: meta.atime() * 1000 + meta.atime_nsec() / 1_000_000,
            permission: meta.permissions().mode() & 0o7777,
            owner: meta.uid().to_string(),
            group: meta.gid().to_string(),
        }
    }
}

fn millis_to_time(ms: i64) -> std::time::SystemTime {
    UNIX_EPOCH + Duration::from_millis(ms as u64)
}

impl Connection for LocalConnection {
    fn uri(&self) -> String {
        "file:///".to_string()
    }

    fn identity(&self) -> String {
        format!("LocalFileSystem[ugi={}]", self.user)
    }

    fn status(&self, path: &DfsPath) -> BackendResult<FileStatus> {
        self.check()?;
        let (resolved, local) = self.local_path(path)?;
        let meta = fs::metadata(&local)?;
        Ok(self.status_of(&resolved, &meta))
    }

    fn exists(&self, path: &DfsPath) -> BackendResult<bool> {
        self.check()?;
        let (_, local) = self.local_path(path)?;
        Ok(local.try_exists()?)
    }

    fn is_directory(&self, path: &DfsPath) -> BackendResult<bool> {
        self.check()?;
        let (_, local) = self.local_path(path)?;
        Ok(local.is_dir())
    }

    fn open(&self, path: &DfsPath, _buffer_size: usize) -> BackendResult<Box<dyn InputStream>> {
        self.check()?;
        let (_, local) = self.local_path(path)?;
        if local.is_dir() {
            return Err(BackendError::new(format!("{} is a directory", local.display())));
        }
        let file = File::open(&local)?;
        Ok(Box::new(LocalInputStream { file: Some(file) }))
    }

    fn create(
        &self,
        path: &DfsPath,
        overwrite: bool,
        _buffer_size: usize,
        _replication: u16,
        _block_size: u64,
    ) -> BackendResult<Box<dyn OutputStream>> {
        self.check()?;
        let (_, local) = self.local_path(path)?;
        if local.is_dir() {
            return Err(BackendError::new(format!("{} is a directory", local.display())));
        }
        if !overwrite && local.try_exists()? {
            return Err(BackendError::new(format!("File already exists: {}", local.display())));
        }
        if let Some(parent) = local.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&local)?;
        Ok(Box::new(LocalOutputStream {
            file: Some(file),
            pos: 0,
        }))
    }

    fn append(&self, path: &DfsPath) -> BackendResult<Box<dyn OutputStream>> {
        self.check()?;
        let (_, local) = self.local_path(path)?;
        let file = OpenOptions::new().append(true).open(&local)?;
        let pos = file.metadata()?.len();
        Ok(Box::new(LocalOutputStream {
            file: Some(file),
            pos,
        }))
    }

    fn mkdirs(&self, path: &DfsPath) -> BackendResult<bool> {
        self.check()?;
        let (_, local) = self.local_path(path)?;
        fs::create_dir_all(&local)?;
        Ok(true)
    }

    fn delete(&self, path: &DfsPath, recursive: bool) -> BackendResult<bool> {
        self.check()?;
        let (_, local) = self.local_path(path)?;
        let meta = match fs::symlink_metadata(&local) {
            Ok(meta) => meta,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(e.into()),
        };
        if !meta.is_dir() {
            fs::remove_file(&local)?;
        } else if recursive {
            fs::remove_dir_all(&local)?;
        } else {
            fs::remove_dir(&local)?;
        }
        Ok(true)
    }

    fn rename(&self, from: &DfsPath, to: &DfsPath) -> BackendResult<bool> {
        self.check()?;
        let (src_path, src) = self.local_path(from)?;
        let (_, mut dst) = self.local_path(to)?;
        if dst.is_dir() {
            dst.push(src_path.name());
        }
        if !src.try_exists()? || dst.try_exists()? {
            return Ok(false);
        }
        match fs::rename(&src, &dst) {
            Ok(()) => Ok(true),
            Err(e) => {
                tracing::debug!(from = %src.display(), to = %dst.display(), error = %e, "local rename failed");
                Ok(false)
            }
        }
    }

    fn set_owner(&self, path: &DfsPath, user: &str, group: &str) -> BackendResult<()> {
        self.check()?;
        let (_, local) = self.local_path(path)?;
        let uid = user
            .parse::<u32>()
            .map_err(|_| BackendError::new(format!("local owner must be a numeric uid: {user}")))?;
        let gid = group
            .parse::<u32>()
            .map_err(|_| BackendError::new(format!("local group must be a numeric gid: {group}")))?;
        std::os::unix::fs::chown(&local, Some(uid), Some(gid))?;
        Ok(())
    }

    fn set_permission(&self, path: &DfsPath, mode: u32) -> BackendResult<()> {
        self.check()?;
        let (_, local) = self.local_path(path)?;
        fs::set_permissions(&local, fs::Permissions::from_mode(mode & 0o7777))?;
        Ok(())
    }

    fn set_replication(&self, path: &DfsPath, _replication: u16) -> BackendResult<bool> {
        self.check()?;
        let (_, local) = self.local_path(path)?;
        fs::metadata(&local)?;
        Ok(true)
    }

    fn set_times(&self, path: &DfsPath, mtime: i64, atime: i64) -> BackendResult<()> {
        self.check()?;
        let (_, local) = self.local_path(path)?;
        let mut times = FileTimes::new();
        if mtime >= 0 {
            times = times.set_modified(millis_to_time(mtime));
        }
        if atime >= 0 {
            times = times.set_accessed(millis_to_time(atime));
        }
        File::open(&local)?.set_times(times)?;
        Ok(())
    }

    fn set_working_directory(&self, path: &DfsPath) -> BackendResult<()> {
        self.check()?;
        let resolved = self.resolve(path)?;
        *self.cwd.write() = resolved;
        Ok(())
    }

    fn working_directory(&self) -> BackendResult<DfsPath> {
        self.check()?;
        Ok(self.cwd.read().qualified(LOCAL_SCHEME, None))
    }

    fn raw_capacity(&self) -> BackendResult<u64> {
        self.check()?;
        let stat = self.statvfs()?;
        Ok(stat.f_blocks * stat.f_frsize)
    }

    fn raw_used(&self) -> BackendResult<u64> {
        self.check()?;
        let stat = self.statvfs()?;
        Ok(stat.f_blocks.saturating_sub(stat.f_bfree) * stat.f_frsize)
    }

    fn default_block_size(&self) -> BackendResult<u64> {
        self.check()?;
        Ok(self.block_size)
    }

    fn block_size(&self, path: &DfsPath) -> BackendResult<u64> {
        Ok(self.status(path)?.block_size)
    }

    fn block_locations(
        &self,
        status: &FileStatus,
        start: u64,
        _len: u64,
    ) -> BackendResult<Vec<BlockLocation>> {
        self.check()?;
        if status.is_dir || status.length <= start {
            return Ok(Vec::new());
        }
        // The whole file is one block on this host.
        Ok(vec![BlockLocation {
            hosts: vec![LOCALHOST.to_string()],
            names: vec![format!("{LOCALHOST}:{LOCAL_TRANSFER_PORT}")],
            offset: 0,
            length: status.length,
        }])
    }

    fn list_status(&self, path: &DfsPath) -> BackendResult<Vec<FileStatus>> {
        self.check()?;
        let (resolved, local) = self.local_path(path)?;
        let meta = fs::metadata(&local)?;
        if !meta.is_dir() {
            return Ok(vec![self.status_of(&resolved, &meta)]);
        }

        let mut statuses = Vec::new();
        for entry in fs::read_dir(&local)? {
            let entry = entry?;
            let child = resolved.join(&entry.file_name().to_string_lossy());
            // Entries can vanish between readdir and stat.
            match fs::metadata(entry.path()) {
                Ok(meta) => statuses.push(self.status_of(&child, &meta)),
                Err(e) => tracing::debug!(path = %child, error = %e, "skipping entry"),
            }
        }
        statuses.sort_by(|a, b| a.path.path().cmp(b.path.path()));
        Ok(statuses)
    }

    fn close(&self) -> BackendResult<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Err(BackendError::new("Filesystem closed"));
        }
        Ok(())
    }
}

/// Reader over a local file.
#[derive(Debug)]
pub struct LocalInputStream {
    file: Option<File>,
}

impl LocalInputStream {
    fn file(&self) -> BackendResult<&File> {
        self.file
            .as_ref()
            .ok_or_else(|| BackendError::new("Stream is closed!"))
    }
}

impl InputStream for LocalInputStream {
    fn read(&mut self, buf: &mut RawBuffer) -> BackendResult<Option<usize>> {
        let mut file = self.file()?;
        let remaining = file.metadata()?.len().saturating_sub(file.stream_position()?);
        let want = buf.len().min(usize::try_from(remaining).unwrap_or(usize::MAX));
        if want == 0 && !buf.is_empty() {
            return Ok(None);
        }
        let mut bytes = vec![0u8; want];
        let n = file.read(&mut bytes)?;
        if n == 0 && !buf.is_empty() {
            return Ok(None);
        }
        Ok(Some(fill_signed(&bytes[..n], buf.as_mut_slice())))
    }

    fn read_at(
        &mut self,
        position: u64,
        buf: &mut RawBuffer,
        offset: usize,
        len: usize,
    ) -> BackendResult<Option<usize>> {
        let file = self.file()?;
        let end = offset
            .checked_add(len)
            .filter(|end| *end <= buf.len())
            .ok_or_else(|| BackendError::new("read range exceeds buffer"))?;
        let remaining = file.metadata()?.len().saturating_sub(position);
        let want = len.min(usize::try_from(remaining).unwrap_or(usize::MAX));
        if want == 0 && len > 0 {
            return Ok(None);
        }
        let mut bytes = vec![0u8; want];
        let n = file.read_at(&mut bytes, position)?;
        if n == 0 && len > 0 {
            return Ok(None);
        }
        Ok(Some(fill_signed(&bytes[..n], &mut buf.as_mut_slice()[offset..end])))
    }

    fn seek(&mut self, position: u64) -> BackendResult<()> {
        let mut file = self.file()?;
        file.seek(SeekFrom::Start(position))?;
        Ok(())
    }

    fn pos(&self) -> BackendResult<u64> {
        let mut file = self.file()?;
        Ok(file.stream_position()?)
    }

    fn available(&self) -> BackendResult<u64> {
        let mut file = self.file()?;
        let len = file.metadata()?.len();
        Ok(len.saturating_sub(file.stream_position()?))
    }

    fn close(&mut self) -> BackendResult<()> {
        self.file = None;
        Ok(())
    }
}

/// Writer over a local file.
#[derive(Debug)]
pub struct LocalOutputStream {
    file: Option<File>,
    pos: u64,
}

impl LocalOutputStream {
    fn file(&mut self) -> BackendResult<&mut File> {
        self.file
            .as_mut()
            .ok_or_else(|| BackendError::new("Stream is closed!"))
    }
}

impl OutputStream for LocalOutputStream {
    fn write(&mut self, data: &[i8]) -> BackendResult<()> {
        let bytes: Vec<u8> = data.iter().map(|b| to_unsigned(*b)).collect();
        self.file()?.write_all(&bytes)?;
        self.pos += bytes.len() as u64;
        Ok(())
    }

    fn pos(&self) -> BackendResult<u64> {
        match self.file {
            Some(_) => Ok(self.pos),
            None => Err(BackendError::new("Stream is closed!")),
        }
    }

    fn flush(&mut self) -> BackendResult<()> {
        self.file()?.flush()?;
        Ok(())
    }

    fn close(&mut self) -> BackendResult<()> {
        let file = self
            .file
            .take()
            .ok_or_else(|| BackendError::new("Stream is closed!"))?;
        file.sync_data()?;
        Ok(())
    }
}
