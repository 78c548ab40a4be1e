//! In-memory cluster backend.
//!
//! Simulates a block-oriented distributed filesystem: files carry an owner,
//! group, replication factor and block size, writers hold a single-writer
//! lease, and block locations are spread round-robin over a configurable
//! set of datanode hosts. Used for tests, demos, and as the reference
//! implementation of the backend traits.

use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::backend::{
    overlapping_blocks, BackendError, BackendResult, BlockLocation, Connection, Connector,
    FileStatus, InputStream, OutputStream,
};
use crate::config::{Configuration, BLOCKSIZE_PROPERTY};
use crate::marshal::{fill_signed, RawBuffer};
use crate::path::DfsPath;

/// Block size for clusters created without `dfs.blocksize`.
pub const DEFAULT_BLOCK_SIZE: u64 = 128 * 1024 * 1024;
/// Raw capacity of a new cluster.
pub const DEFAULT_CAPACITY: u64 = 1 << 40;
/// Port reported in block location transfer addresses.
pub const DATANODE_PORT: u16 = 50010;

const SUPERUSER: &str = "hdfs";
const SUPERGROUP: &str = "supergroup";
const FILE_PERMISSION: u32 = 0o644;
const DIR_PERMISSION: u32 = 0o755;

pub(crate) fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

#[derive(Debug, Clone)]
struct Meta {
    owner: String,
    group: String,
    permission: u32,
    replication: u16,
    block_size: u64,
    mtime: i64,
    atime: i64,
}

/// Entry in the cluster namespace.
#[derive(Debug, Clone)]
enum Entry {
    File { data: Vec<u8>, meta: Meta },
    Directory { meta: Meta },
}

impl Entry {
    fn meta(&self) -> &Meta {
        match self {
            Entry::File { meta, .. } => meta,
            Entry::Directory { meta } => meta,
        }
    }

    fn meta_mut(&mut self) -> &mut Meta {
        match self {
            Entry::File { meta, .. } => meta,
            Entry::Directory { meta } => meta,
        }
    }

    fn is_dir(&self) -> bool {
        matches!(self, Entry::Directory { .. })
    }

    fn len(&self) -> u64 {
        match self {
            Entry::File { data, .. } => data.len() as u64,
            Entry::Directory { .. } => 0,
        }
    }
}

#[derive(Debug, Default)]
struct Namespace {
    /// Keyed by absolute path, e.g. `/user/alice/data.csv`.
    entries: BTreeMap<String, Entry>,
    /// Paths with an open writer.
    leases: HashSet<String>,
}

impl Namespace {
    fn children<'a>(&'a self, dir: &'a str) -> impl Iterator<Item = (&'a String, &'a Entry)> + 'a {
        self.entries
            .iter()
            .filter(move |(key, _)| parent_key(key).as_deref() == Some(dir))
    }

    /// Keys of `root` and everything beneath it.
    fn subtree(&self, root: &str) -> Vec<String> {
        let prefix = if root == "/" {
            "/".to_string()
        } else {
            format!("{root}/")
        };
        self.entries
            .keys()
            .filter(|k| k.as_str() == root || k.starts_with(&prefix))
            .cloned()
            .collect()
    }
}

fn parent_key(key: &str) -> Option<String> {
    if key == "/" {
        return None;
    }
    match key.rfind('/') {
        Some(0) => Some("/".to_string()),
        Some(idx) => Some(key[..idx].to_string()),
        None => None,
    }
}

fn ancestors(key: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = parent_key(key);
    while let Some(p) = current {
        current = parent_key(&p);
        out.push(p);
    }
    out.reverse();
    out
}

/// One simulated filesystem, shared by every connection to its URI.
#[derive(Debug)]
pub struct MemoryCluster {
    scheme: String,
    authority: Option<String>,
    datanodes: Vec<String>,
    capacity: u64,
    default_block_size: u64,
    namespace: RwLock<Namespace>,
    fault: RwLock<Option<String>>,
    reachable: AtomicBool,
}

impl MemoryCluster {
    /// Create an empty cluster answering at `uri`.
    pub fn new(uri: &str) -> BackendResult<Self> {
        let parsed = DfsPath::new(uri).map_err(|e| BackendError::new(e.to_string()))?;
        let scheme = parsed
            .scheme()
            .ok_or_else(|| BackendError::new(format!("no scheme in URI {uri}")))?;
        Ok(Self::from_parts(scheme, parsed.authority()))
    }

    fn from_parts(scheme: &str, authority: Option<&str>) -> Self {
        let mut entries = BTreeMap::new();
        // Root directory always exists
        entries.insert(
            "/".to_string(),
            Entry::Directory {
                meta: Meta {
                    owner: SUPERUSER.to_string(),
                    group: SUPERGROUP.to_string(),
                    permission: DIR_PERMISSION,
                    replication: 0,
                    block_size: 0,
                    mtime: now_millis(),
                    atime: 0,
                },
            },
        );

        Self {
            scheme: scheme.to_string(),
            authority: authority.map(str::to_string),
            datanodes: vec!["localhost".to_string()],
            capacity: DEFAULT_CAPACITY,
            default_block_size: DEFAULT_BLOCK_SIZE,
            namespace: RwLock::new(Namespace {
                entries,
                leases: HashSet::new(),
            }),
            fault: RwLock::new(None),
            reachable: AtomicBool::new(true),
        }
    }

    /// Set the datanode hosts blocks are placed on.
    pub fn with_datanodes<S: Into<String>>(mut self, hosts: impl IntoIterator<Item = S>) -> Self {
        self.datanodes = hosts.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_capacity(mut self, capacity: u64) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn with_default_block_size(mut self, block_size: u64) -> Self {
        self.default_block_size = block_size;
        self
    }

    /// The cluster URI, e.g. `hdfs://nn:9000` or `file:///`.
    pub fn uri(&self) -> String {
        match &self.authority {
            Some(authority) => format!("{}://{}", self.scheme, authority),
            None => format!("{}:///", self.scheme),
        }
    }

    pub fn datanodes(&self) -> &[String] {
        &self.datanodes
    }

    /// Make every subsequent backend call fail with `message`, or clear the
    /// fault with `None`.
    pub fn set_fault(&self, message: Option<&str>) {
        *self.fault.write() = message.map(str::to_string);
    }

    /// Refuse new connections while `false`.
    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    /// Number of files and directories, root included.
    pub fn entry_count(&self) -> usize {
        self.namespace.read().entries.len()
    }

    fn check_fault(&self) -> BackendResult<()> {
        match self.fault.read().as_ref() {
            Some(msg) => Err(BackendError::new(msg.clone())),
            None => Ok(()),
        }
    }

    fn qualify(&self, key: &str) -> DfsPath {
        DfsPath::root()
            .join(key)
            .qualified(&self.scheme, self.authority.as_deref())
    }

    fn status_of(&self, key: &str, entry: &Entry) -> FileStatus {
        let meta = entry.meta();
        FileStatus {
            path: self.qualify(key),
            length: entry.len(),
            is_dir: entry.is_dir(),
            replication: meta.replication,
            block_size: meta.block_size,
            modification_time: meta.mtime,
            access_time: meta.atime,
            permission: meta.permission,
            owner: meta.owner.clone(),
            group: meta.group.clone(),
        }
    }

    fn place_block(&self, index: u64, replication: u16) -> Vec<String> {
        if self.datanodes.is_empty() {
            return Vec::new();
        }
        let n = self.datanodes.len();
        let count = usize::from(replication.max(1)).min(n);
        (0..count)
            .map(|k| self.datanodes[(index as usize + k) % n].clone())
            .collect()
    }
}

/// Resolves URIs to [`MemoryCluster`]s.
///
/// By default an unknown URI creates a fresh cluster on first use; a
/// [`strict`](Self::strict) connector only knows clusters added with
/// [`add_cluster`](Self::add_cluster).
#[derive(Debug)]
pub struct MemoryConnector {
    clusters: Mutex<HashMap<String, Arc<MemoryCluster>>>,
    local: Arc<MemoryCluster>,
    auto_create: bool,
}

impl Default for MemoryConnector {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryConnector {
    pub fn new() -> Self {
        Self {
            clusters: Mutex::new(HashMap::new()),
            local: Arc::new(MemoryCluster::from_parts("file", None)),
            auto_create: true,
        }
    }

    /// A connector that refuses URIs it has no cluster for.
    pub fn strict() -> Self {
        Self {
            auto_create: false,
            ..Self::new()
        }
    }

    /// Register a cluster under its own URI.
    pub fn add_cluster(&self, cluster: MemoryCluster) -> Arc<MemoryCluster> {
        let cluster = Arc::new(cluster);
        self.clusters.lock().insert(cluster.uri(), cluster.clone());
        cluster
    }

    /// The cluster registered for `uri`, if any.
    pub fn cluster(&self, uri: &str) -> Option<Arc<MemoryCluster>> {
        let key = MemoryCluster::new(uri).ok()?.uri();
        self.clusters.lock().get(&key).cloned()
    }

    /// The cluster standing in for the local filesystem.
    pub fn local_cluster(&self) -> Arc<MemoryCluster> {
        self.local.clone()
    }

    fn connect(&self, cluster: Arc<MemoryCluster>, user: Option<&str>) -> BackendResult<Box<dyn Connection>> {
        if !cluster.reachable.load(Ordering::SeqCst) {
            return Err(BackendError::new(format!(
                "Call to {} failed on connection exception: Connection refused",
                cluster.uri()
            )));
        }
        let user = user
            .map(str::to_string)
            .unwrap_or_else(whoami::username);
        Ok(Box::new(MemoryConnection::new(cluster, user)))
    }
}

impl Connector for MemoryConnector {
    fn local(&self, _conf: &Configuration) -> BackendResult<Box<dyn Connection>> {
        self.connect(self.local.clone(), None)
    }

    fn get(
        &self,
        uri: &str,
        conf: &Configuration,
        user: Option<&str>,
    ) -> BackendResult<Box<dyn Connection>> {
        let candidate = MemoryCluster::new(uri)?;
        if candidate.scheme == "file" {
            return self.connect(self.local.clone(), user);
        }
        if candidate.authority.is_none() {
            return Err(BackendError::new(format!("no authority in URI {uri}")));
        }

        let key = candidate.uri();
        let cluster = {
            let mut clusters = self.clusters.lock();
            match clusters.get(&key) {
                Some(c) => c.clone(),
                None if self.auto_create => {
                    let block_size = conf.get_int(BLOCKSIZE_PROPERTY, DEFAULT_BLOCK_SIZE as i64);
                    let cluster = Arc::new(candidate.with_default_block_size(block_size.max(1) as u64));
                    tracing::debug!(uri = %key, "created in-memory cluster");
                    clusters.insert(key.clone(), cluster.clone());
                    cluster
                }
                None => {
                    return Err(BackendError::new(format!("unknown host in URI {uri}")));
                }
            }
        };
        self.connect(cluster, user)
    }
}

/// A connection to a [`MemoryCluster`] acting as one user.
#[derive(Debug)]
pub struct MemoryConnection {
    cluster: Arc<MemoryCluster>,
    user: String,
    cwd: RwLock<DfsPath>,
    closed: AtomicBool,
}

impl MemoryConnection {
    fn new(cluster: Arc<MemoryCluster>, user: String) -> Self {
        let cwd = DfsPath::root().join("user").join(&user);
        Self {
            cluster,
            user,
            cwd: RwLock::new(cwd),
            closed: AtomicBool::new(false),
        }
    }

    pub fn cluster(&self) -> &Arc<MemoryCluster> {
        &self.cluster
    }

    fn check(&self) -> BackendResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(BackendError::new("Filesystem closed"));
        }
        self.cluster.check_fault()
    }

    /// Absolute namespace key for `path`, rejecting paths of another filesystem.
    fn resolve(&self, path: &DfsPath) -> BackendResult<String> {
        let wrong_scheme = path.scheme().is_some_and(|s| s != self.cluster.scheme);
        let wrong_authority = path
            .authority()
            .is_some_and(|a| Some(a) != self.cluster.authority.as_deref());
        if wrong_scheme || wrong_authority {
            return Err(BackendError::new(format!(
                "Wrong FS: {path}, expected: {}",
                self.cluster.uri()
            )));
        }
        Ok(path.absolute_against(&self.cwd.read()).path().to_string())
    }

    fn not_found(key: &str) -> BackendError {
        BackendError::new(format!("File does not exist: {key}"))
    }

    fn new_meta(&self, group: String, permission: u32, replication: u16, block_size: u64) -> Meta {
        let now = now_millis();
        Meta {
            owner: self.user.clone(),
            group,
            permission,
            replication,
            block_size,
            mtime: now,
            atime: now,
        }
    }

    /// Create missing directories up to and including `key`.
    fn mkdirs_locked(&self, ns: &mut Namespace, key: &str) -> BackendResult<()> {
        let mut chain = ancestors(key);
        chain.push(key.to_string());
        let mut group = SUPERGROUP.to_string();
        for dir in chain {
            match ns.entries.get(&dir) {
                Some(Entry::Directory { meta }) => group = meta.group.clone(),
                Some(Entry::File { .. }) => {
                    return Err(BackendError::new(format!(
                        "Parent path is not a directory: {dir}"
                    )));
                }
                None => {
                    let meta = self.new_meta(group.clone(), DIR_PERMISSION, 0, 0);
                    ns.entries.insert(dir, Entry::Directory { meta });
                }
            }
        }
        Ok(())
    }
}

impl Connection for MemoryConnection {
    fn uri(&self) -> String {
        self.cluster.uri()
    }

    fn identity(&self) -> String {
        format!("MemoryFileSystem[uri={}, ugi={}]", self.cluster.uri(), self.user)
    }

    fn status(&self, path: &DfsPath) -> BackendResult<FileStatus> {
        self.check()?;
        let key = self.resolve(path)?;
        let ns = self.cluster.namespace.read();
        let entry = ns.entries.get(&key).ok_or_else(|| Self::not_found(&key))?;
        Ok(self.cluster.status_of(&key, entry))
    }

    fn exists(&self, path: &DfsPath) -> BackendResult<bool> {
        self.check()?;
        let key = self.resolve(path)?;
        Ok(self.cluster.namespace.read().entries.contains_key(&key))
    }

    fn is_directory(&self, path: &DfsPath) -> BackendResult<bool> {
        self.check()?;
        let key = self.resolve(path)?;
        Ok(self
            .cluster
            .namespace
            .read()
            .entries
            .get(&key)
            .is_some_and(Entry::is_dir))
    }

    fn open(&self, path: &DfsPath, _buffer_size: usize) -> BackendResult<Box<dyn InputStream>> {
        self.check()?;
        let key = self.resolve(path)?;
        let mut ns = self.cluster.namespace.write();
        match ns.entries.get_mut(&key) {
            Some(Entry::File { meta, .. }) => {
                meta.atime = now_millis();
            }
            Some(Entry::Directory { .. }) => {
                return Err(BackendError::new(format!("Path is not a file: {key}")));
            }
            None => return Err(Self::not_found(&key)),
        }
        Ok(Box::new(MemoryInputStream {
            cluster: self.cluster.clone(),
            key,
            pos: 0,
            closed: false,
        }))
    }

    fn create(
        &self,
        path: &DfsPath,
        overwrite: bool,
        _buffer_size: usize,
        replication: u16,
        block_size: u64,
    ) -> BackendResult<Box<dyn OutputStream>> {
        self.check()?;
        let key = self.resolve(path)?;
        if block_size == 0 {
            return Err(BackendError::new("block size must be positive"));
        }

        let mut ns = self.cluster.namespace.write();
        if ns.leases.contains(&key) {
            return Err(BackendError::new(format!(
                "Failed to create file {key}: already being created by another client"
            )));
        }
        match ns.entries.get(&key) {
            Some(Entry::Directory { .. }) => {
                return Err(BackendError::new(format!("{key} already exists as a directory")));
            }
            Some(Entry::File { .. }) if !overwrite => {
                return Err(BackendError::new(format!("File already exists: {key}")));
            }
            _ => {}
        }

        let parent = parent_key(&key).ok_or_else(|| BackendError::new("cannot create root"))?;
        self.mkdirs_locked(&mut ns, &parent)?;
        let group = ns
            .entries
            .get(&parent)
            .map(|e| e.meta().group.clone())
            .unwrap_or_else(|| SUPERGROUP.to_string());
        let meta = self.new_meta(group, FILE_PERMISSION, replication, block_size);
        ns.entries.insert(
            key.clone(),
            Entry::File {
                data: Vec::new(),
                meta,
            },
        );
        ns.leases.insert(key.clone());
        tracing::trace!(path = %key, replication, block_size, "memory create");

        Ok(Box::new(MemoryOutputStream {
            cluster: self.cluster.clone(),
            key,
            pending: Vec::new(),
            committed: 0,
            closed: false,
        }))
    }

    fn append(&self, path: &DfsPath) -> BackendResult<Box<dyn OutputStream>> {
        self.check()?;
        let key = self.resolve(path)?;
        let mut ns = self.cluster.namespace.write();
        let committed = match ns.entries.get(&key) {
            Some(Entry::File { data, .. }) => data.len() as u64,
            Some(Entry::Directory { .. }) => {
                return Err(BackendError::new(format!("Cannot append to directory {key}")));
            }
            None => return Err(Self::not_found(&key)),
        };
        if !ns.leases.insert(key.clone()) {
            return Err(BackendError::new(format!(
                "Failed to append to {key}: lease held by another client"
            )));
        }
        Ok(Box::new(MemoryOutputStream {
            cluster: self.cluster.clone(),
            key,
            pending: Vec::new(),
            committed,
            closed: false,
        }))
    }

    fn mkdirs(&self, path: &DfsPath) -> BackendResult<bool> {
        self.check()?;
        let key = self.resolve(path)?;
        let mut ns = self.cluster.namespace.write();
        self.mkdirs_locked(&mut ns, &key)?;
        Ok(true)
    }

    fn delete(&self, path: &DfsPath, recursive: bool) -> BackendResult<bool> {
        self.check()?;
        let key = self.resolve(path)?;
        if key == "/" {
            return Err(BackendError::new("cannot delete the root directory"));
        }
        let mut ns = self.cluster.namespace.write();
        let Some(entry) = ns.entries.get(&key) else {
            return Ok(false);
        };
        if entry.is_dir() && !recursive && ns.children(&key).next().is_some() {
            return Err(BackendError::new(format!("{key} is non empty")));
        }
        for k in ns.subtree(&key) {
            ns.entries.remove(&k);
            ns.leases.remove(&k);
        }
        Ok(true)
    }

    fn rename(&self, from: &DfsPath, to: &DfsPath) -> BackendResult<bool> {
        self.check()?;
        let src = self.resolve(from)?;
        let mut dst = self.resolve(to)?;
        let mut ns = self.cluster.namespace.write();

        if src == "/" || !ns.entries.contains_key(&src) {
            return Ok(false);
        }
        if ns.entries.get(&dst).is_some_and(Entry::is_dir) {
            let name = DfsPath::root().join(&src).name().to_string();
            dst = DfsPath::root().join(&dst).join(&name).path().to_string();
        }
        if ns.entries.contains_key(&dst) || dst == src || dst.starts_with(&format!("{src}/")) {
            return Ok(false);
        }
        match parent_key(&dst).and_then(|p| ns.entries.get(&p)) {
            Some(Entry::Directory { .. }) => {}
            _ => return Ok(false),
        }

        for old in ns.subtree(&src) {
            if let Some(entry) = ns.entries.remove(&old) {
                let new_key = format!("{dst}{}", &old[src.len()..]);
                ns.entries.insert(new_key, entry);
            }
        }
        Ok(true)
    }

    fn set_owner(&self, path: &DfsPath, user: &str, group: &str) -> BackendResult<()> {
        self.check()?;
        let key = self.resolve(path)?;
        let mut ns = self.cluster.namespace.write();
        let meta = ns
            .entries
            .get_mut(&key)
            .ok_or_else(|| Self::not_found(&key))?
            .meta_mut();
        meta.owner = user.to_string();
        meta.group = group.to_string();
        Ok(())
    }

    fn set_permission(&self, path: &DfsPath, mode: u32) -> BackendResult<()> {
        self.check()?;
        let key = self.resolve(path)?;
        let mut ns = self.cluster.namespace.write();
        let meta = ns
            .entries
            .get_mut(&key)
            .ok_or_else(|| Self::not_found(&key))?
            .meta_mut();
        meta.permission = mode & 0o7777;
        Ok(())
    }

    fn set_replication(&self, path: &DfsPath, replication: u16) -> BackendResult<bool> {
        self.check()?;
        let key = self.resolve(path)?;
        let mut ns = self.cluster.namespace.write();
        match ns.entries.get_mut(&key) {
            Some(Entry::File { meta, .. }) => {
                meta.replication = replication;
                Ok(true)
            }
            Some(Entry::Directory { .. }) => Ok(false),
            None => Err(Self::not_found(&key)),
        }
    }

    fn set_times(&self, path: &DfsPath, mtime: i64, atime: i64) -> BackendResult<()> {
        self.check()?;
        let key = self.resolve(path)?;
        let mut ns = self.cluster.namespace.write();
        let meta = ns
            .entries
            .get_mut(&key)
            .ok_or_else(|| Self::not_found(&key))?
            .meta_mut();
        if mtime >= 0 {
            meta.mtime = mtime;
        }
        if atime >= 0 {
            meta.atime = atime;
        }
        Ok(())
    }

    fn set_working_directory(&self, path: &DfsPath) -> BackendResult<()> {
        self.check()?;
        let key = self.resolve(path)?;
        *self.cwd.write() = DfsPath::root().join(&key);
        Ok(())
    }

    fn working_directory(&self) -> BackendResult<DfsPath> {
        self.check()?;
        let cwd = self.cwd.read().clone();
        Ok(cwd.qualified(&self.cluster.scheme, self.cluster.authority.as_deref()))
    }

    fn raw_capacity(&self) -> BackendResult<u64> {
        self.check()?;
        Ok(self.cluster.capacity)
    }

    fn raw_used(&self) -> BackendResult<u64> {
        self.check()?;
        let ns = self.cluster.namespace.read();
        Ok(ns
            .entries
            .values()
            .map(|e| e.len() * u64::from(e.meta().replication))
            .sum())
    }

    fn default_block_size(&self) -> BackendResult<u64> {
        self.check()?;
        Ok(self.cluster.default_block_size)
    }

    fn block_size(&self, path: &DfsPath) -> BackendResult<u64> {
        self.check()?;
        let key = self.resolve(path)?;
        let ns = self.cluster.namespace.read();
        let entry = ns.entries.get(&key).ok_or_else(|| Self::not_found(&key))?;
        Ok(entry.meta().block_size)
    }

    fn block_locations(
        &self,
        status: &FileStatus,
        start: u64,
        len: u64,
    ) -> BackendResult<Vec<BlockLocation>> {
        self.check()?;
        if status.is_dir {
            return Ok(Vec::new());
        }
        Ok(overlapping_blocks(status.length, status.block_size, start, len)
            .into_iter()
            .map(|(offset, length)| {
                let hosts = self
                    .cluster
                    .place_block(offset / status.block_size, status.replication);
                let names = hosts
                    .iter()
                    .map(|h| format!("{h}:{DATANODE_PORT}"))
                    .collect();
                BlockLocation {
                    hosts,
                    names,
                    offset,
                    length,
                }
            })
            .collect())
    }

    fn list_status(&self, path: &DfsPath) -> BackendResult<Vec<FileStatus>> {
        self.check()?;
        let key = self.resolve(path)?;
        let ns = self.cluster.namespace.read();
        match ns.entries.get(&key) {
            Some(entry @ Entry::File { .. }) => Ok(vec![self.cluster.status_of(&key, entry)]),
            Some(Entry::Directory { .. }) => Ok(ns
                .children(&key)
                .map(|(k, e)| self.cluster.status_of(k, e))
                .collect()),
            None => Err(Self::not_found(&key)),
        }
    }

    fn close(&self) -> BackendResult<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Err(BackendError::new("Filesystem closed"));
        }
        Ok(())
    }
}

/// Reader over one file of a [`MemoryCluster`].
#[derive(Debug)]
pub struct MemoryInputStream {
    cluster: Arc<MemoryCluster>,
    key: String,
    pos: u64,
    closed: bool,
}

impl MemoryInputStream {
    fn check(&self) -> BackendResult<()> {
        if self.closed {
            return Err(BackendError::new("Stream is closed!"));
        }
        self.cluster.check_fault()
    }

    /// Copy file bytes at `position` into `dst`; `None` at or past EOF.
    fn copy_from(&self, position: u64, dst: &mut [i8]) -> BackendResult<Option<usize>> {
        let ns = self.cluster.namespace.read();
        let data = match ns.entries.get(&self.key) {
            Some(Entry::File { data, .. }) => data,
            _ => return Err(MemoryConnection::not_found(&self.key)),
        };
        let len = data.len() as u64;
        if position >= len {
            return Ok(if dst.is_empty() { Some(0) } else { None });
        }
        let start = position as usize;
        Ok(Some(fill_signed(&data[start..], dst)))
    }

    fn file_len(&self) -> BackendResult<u64> {
        let ns = self.cluster.namespace.read();
        ns.entries
            .get(&self.key)
            .map(Entry::len)
            .ok_or_else(|| MemoryConnection::not_found(&self.key))
    }
}

impl InputStream for MemoryInputStream {
    fn read(&mut self, buf: &mut RawBuffer) -> BackendResult<Option<usize>> {
        self.check()?;
        let n = self.copy_from(self.pos, buf.as_mut_slice())?;
        if let Some(n) = n {
            self.pos += n as u64;
        }
        Ok(n)
    }

    fn read_at(
        &mut self,
        position: u64,
        buf: &mut RawBuffer,
        offset: usize,
        len: usize,
    ) -> BackendResult<Option<usize>> {
        self.check()?;
        let end = offset
            .checked_add(len)
            .filter(|end| *end <= buf.len())
            .ok_or_else(|| BackendError::new("read range exceeds buffer"))?;
        self.copy_from(position, &mut buf.as_mut_slice()[offset..end])
    }

    fn seek(&mut self, position: u64) -> BackendResult<()> {
        self.check()?;
        if position > self.file_len()? {
            return Err(BackendError::new("Cannot seek after EOF"));
        }
        self.pos = position;
        Ok(())
    }

    fn pos(&self) -> BackendResult<u64> {
        self.check()?;
        Ok(self.pos)
    }

    fn available(&self) -> BackendResult<u64> {
        self.check()?;
        Ok(self.file_len()?.saturating_sub(self.pos))
    }

    fn close(&mut self) -> BackendResult<()> {
        self.closed = true;
        Ok(())
    }
}

/// Writer holding the lease on one file of a [`MemoryCluster`].
///
/// Bytes become visible to readers on `flush` or `close`.
#[derive(Debug)]
pub struct MemoryOutputStream {
    cluster: Arc<MemoryCluster>,
    key: String,
    pending: Vec<u8>,
    committed: u64,
    closed: bool,
}

impl MemoryOutputStream {
    fn check(&self) -> BackendResult<()> {
        if self.closed {
            return Err(BackendError::new("Stream is closed!"));
        }
        self.cluster.check_fault()
    }

    fn commit(&mut self) -> BackendResult<()> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let mut ns = self.cluster.namespace.write();
        match ns.entries.get_mut(&self.key) {
            Some(Entry::File { data, meta }) => {
                data.extend_from_slice(&self.pending);
                meta.mtime = now_millis();
            }
            _ => {
                return Err(BackendError::new(format!(
                    "No lease on {}: file does not exist",
                    self.key
                )));
            }
        }
        self.committed += self.pending.len() as u64;
        self.pending.clear();
        Ok(())
    }

    fn release(&mut self) {
        self.closed = true;
        self.cluster.namespace.write().leases.remove(&self.key);
    }
}

impl OutputStream for MemoryOutputStream {
    fn write(&mut self, data: &[i8]) -> BackendResult<()> {
        self.check()?;
        self.pending.extend(data.iter().map(|b| *b as u8));
        Ok(())
    }

    fn pos(&self) -> BackendResult<u64> {
        self.check()?;
        Ok(self.committed + self.pending.len() as u64)
    }

    fn flush(&mut self) -> BackendResult<()> {
        self.check()?;
        self.commit()
    }

    fn close(&mut self) -> BackendResult<()> {
        self.check()?;
        let result = self.commit();
        self.release();
        result
    }
}

impl Drop for MemoryOutputStream {
    fn drop(&mut self) {
        if !self.closed {
            self.release();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connect(connector: &MemoryConnector, user: &str) -> Box<dyn Connection> {
        connector
            .get("hdfs://nn:9000", &Configuration::new(), Some(user))
            .unwrap()
    }

    fn path(s: &str) -> DfsPath {
        DfsPath::new(s).unwrap()
    }

    fn write_file(conn: &dyn Connection, p: &str, bytes: &[u8]) {
        let mut out = conn.create(&path(p), true, 4096, 2, 4).unwrap();
        out.write(&crate::marshal::to_signed(bytes)).unwrap();
        out.close().unwrap();
    }

    #[test]
    fn test_create_and_read() {
        let connector = MemoryConnector::new();
        let conn = connect(&connector, "alice");
        write_file(conn.as_ref(), "/a.txt", b"hello world");

        let mut input = conn.open(&path("/a.txt"), 4096).unwrap();
        let mut buf = RawBuffer::allocate(64);
        assert_eq!(input.read(&mut buf).unwrap(), Some(11));
        assert_eq!(input.read(&mut buf).unwrap(), None);
    }

    #[test]
    fn test_connections_share_state() {
        let connector = MemoryConnector::new();
        let a = connect(&connector, "alice");
        let b = connect(&connector, "bob");
        write_file(a.as_ref(), "/shared", b"x");
        assert!(b.exists(&path("/shared")).unwrap());
        assert_eq!(b.status(&path("/shared")).unwrap().owner, "alice");
    }

    #[test]
    fn test_single_writer_lease() {
        let connector = MemoryConnector::new();
        let conn = connect(&connector, "alice");
        let _out = conn.create(&path("/locked"), true, 4096, 1, 1024).unwrap();
        assert!(conn.create(&path("/locked"), true, 4096, 1, 1024).is_err());
        assert!(conn.append(&path("/locked")).is_err());
        drop(_out);
        assert!(conn.append(&path("/locked")).is_ok());
    }

    #[test]
    fn test_no_overwrite() {
        let connector = MemoryConnector::new();
        let conn = connect(&connector, "alice");
        write_file(conn.as_ref(), "/f", b"1");
        assert!(conn.create(&path("/f"), false, 4096, 1, 1024).is_err());
    }

    #[test]
    fn test_data_visible_after_flush() {
        let connector = MemoryConnector::new();
        let conn = connect(&connector, "alice");
        let mut out = conn.create(&path("/f"), true, 4096, 1, 1024).unwrap();
        out.write(&[1, 2]).unwrap();
        assert_eq!(conn.status(&path("/f")).unwrap().length, 0);
        out.flush().unwrap();
        assert_eq!(conn.status(&path("/f")).unwrap().length, 2);
        assert_eq!(out.pos().unwrap(), 2);
    }

    #[test]
    fn test_block_placement_round_robin() {
        let connector = MemoryConnector::new();
        connector.add_cluster(
            MemoryCluster::new("hdfs://nn:9000")
                .unwrap()
                .with_datanodes(["dn1", "dn2", "dn3"]),
        );
        let conn = connect(&connector, "alice");
        write_file(conn.as_ref(), "/blocks", b"0123456789");

        let status = conn.status(&path("/blocks")).unwrap();
        let locations = conn.block_locations(&status, 0, 10).unwrap();
        assert_eq!(locations.len(), 3);
        assert_eq!(locations[0].hosts, vec!["dn1", "dn2"]);
        assert_eq!(locations[1].hosts, vec!["dn2", "dn3"]);
        assert_eq!(locations[2].hosts, vec!["dn3", "dn1"]);
        assert_eq!(locations[2].length, 2);
        assert_eq!(locations[0].names[0], "dn1:50010");
    }

    #[test]
    fn test_delete_non_empty_requires_recursive() {
        let connector = MemoryConnector::new();
        let conn = connect(&connector, "alice");
        write_file(conn.as_ref(), "/d/f", b"x");
        assert!(conn.delete(&path("/d"), false).is_err());
        assert!(conn.delete(&path("/d"), true).unwrap());
        assert!(!conn.exists(&path("/d/f")).unwrap());
        assert!(!conn.delete(&path("/d"), true).unwrap());
    }

    #[test]
    fn test_rename_into_directory() {
        let connector = MemoryConnector::new();
        let conn = connect(&connector, "alice");
        write_file(conn.as_ref(), "/src/f", b"x");
        conn.mkdirs(&path("/dst")).unwrap();
        assert!(conn.rename(&path("/src"), &path("/dst")).unwrap());
        assert!(conn.exists(&path("/dst/src/f")).unwrap());
        assert!(!conn.exists(&path("/src")).unwrap());
        // Missing source
        assert!(!conn.rename(&path("/src"), &path("/other")).unwrap());
    }

    #[test]
    fn test_wrong_fs_rejected() {
        let connector = MemoryConnector::new();
        let conn = connect(&connector, "alice");
        let err = conn.exists(&path("hdfs://other:9000/x")).unwrap_err();
        assert!(err.message().contains("Wrong FS"));
        assert!(conn.exists(&path("hdfs://nn:9000/")).unwrap());
    }

    #[test]
    fn test_working_directory() {
        let connector = MemoryConnector::new();
        let conn = connect(&connector, "alice");
        assert_eq!(
            conn.working_directory().unwrap().to_string(),
            "hdfs://nn:9000/user/alice"
        );
        write_file(conn.as_ref(), "rel.txt", b"x");
        assert!(conn.exists(&path("/user/alice/rel.txt")).unwrap());
    }

    #[test]
    fn test_fault_injection() {
        let connector = MemoryConnector::new();
        let conn = connect(&connector, "alice");
        let cluster = connector.cluster("hdfs://nn:9000").unwrap();
        cluster.set_fault(Some("disk failure"));
        assert_eq!(conn.exists(&path("/")).unwrap_err().message(), "disk failure");
        cluster.set_fault(None);
        assert!(conn.exists(&path("/")).unwrap());
    }

    #[test]
    fn test_strict_connector() {
        let connector = MemoryConnector::strict();
        assert!(connector
            .get("hdfs://nowhere:1", &Configuration::new(), None)
            .is_err());
        connector.add_cluster(MemoryCluster::new("hdfs://known:1").unwrap());
        assert!(connector
            .get("hdfs://known:1", &Configuration::new(), None)
            .is_ok());
    }

    #[test]
    fn test_unreachable_cluster() {
        let connector = MemoryConnector::new();
        let cluster = connector.add_cluster(MemoryCluster::new("hdfs://down:1").unwrap());
        cluster.set_reachable(false);
        let err = connector
            .get("hdfs://down:1", &Configuration::new(), None)
            .err().unwrap();
        assert!(err.message().contains("Connection refused"));
    }

    #[test]
    fn test_closed_connection() {
        let connector = MemoryConnector::new();
        let conn = connect(&connector, "alice");
        conn.close().unwrap();
        assert_eq!(conn.exists(&path("/")).unwrap_err().message(), "Filesystem closed");
    }
}
