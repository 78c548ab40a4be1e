//! Client configuration.
//!
//! A [`Configuration`] is a flat map of named properties, the same shape
//! the backend's own configuration has. Only a handful of properties are
//! read by this crate; the rest are carried through to backends.
//!
//! Files are TOML with quoted dotted keys:
//!
//! ```toml
//! "io.file.buffer.size" = 65536
//! "dfs.replication" = 3
//! "fs.defaultFS" = "hdfs://namenode:9000"
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::error::{FsError, FsResult};

/// I/O buffer size for opened streams.
pub const BUFFER_SIZE_PROPERTY: &str = "io.file.buffer.size";
/// Default block size; also the buffer-size fallback.
pub const BLOCKSIZE_PROPERTY: &str = "dfs.blocksize";
/// Default replication for newly created files.
pub const REPLICATION_PROPERTY: &str = "dfs.replication";
/// URI used when connecting to the `"default"` host.
pub const DEFAULT_FS_PROPERTY: &str = "fs.defaultFS";

/// Buffer size used when neither buffer property is set.
pub const DEFAULT_BUFFER_SIZE: i64 = 4096;
/// Replication used when [`REPLICATION_PROPERTY`] is unset.
pub const DEFAULT_REPLICATION: i64 = 1;
/// Default filesystem URI when [`DEFAULT_FS_PROPERTY`] is unset.
pub const DEFAULT_FS_URI: &str = "file:///";

/// Property values as they appear in a TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum PropertyValue {
    Int(i64),
    Bool(bool),
    Str(String),
}

impl PropertyValue {
    fn into_string(self) -> String {
        match self {
            PropertyValue::Int(i) => i.to_string(),
            PropertyValue::Bool(b) => b.to_string(),
            PropertyValue::Str(s) => s,
        }
    }
}

/// Named configuration properties.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Configuration {
    properties: BTreeMap<String, String>,
}

impl Configuration {
    /// An empty configuration; every lookup falls back to its default.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse properties from a TOML document.
    pub fn from_toml_str(text: &str) -> FsResult<Self> {
        let raw: BTreeMap<String, PropertyValue> = toml::from_str(text)
            .map_err(|e| FsError::invalid_argument(format!("configuration parse error: {e}")))?;
        let properties = raw
            .into_iter()
            .map(|(k, v)| (k, v.into_string()))
            .collect();
        Ok(Self { properties })
    }

    /// Load properties from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> FsResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            FsError::backend_io(format!("cannot read {}: {e}", path.display()))
        })?;
        let conf = Self::from_toml_str(&text)?;
        tracing::debug!(path = %path.display(), properties = conf.len(), "loaded configuration");
        Ok(conf)
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.properties.get(name).map(String::as_str)
    }

    /// Integer value of `name`, or `default` if unset or not an integer.
    pub fn get_int(&self, name: &str, default: i64) -> i64 {
        match self.get(name) {
            Some(v) => v.trim().parse().unwrap_or_else(|_| {
                tracing::warn!(property = name, value = v, "ignoring non-integer property");
                default
            }),
            None => default,
        }
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl ToString) {
        self.properties.insert(name.into(), value.to_string());
    }

    /// Builder-style [`set`](Self::set).
    pub fn with(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        self.set(name, value);
        self
    }

    pub fn len(&self) -> usize {
        self.properties.len()
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }

    /// Buffer size for a new stream: `io.file.buffer.size`, then
    /// `dfs.blocksize`, then 4096.
    pub fn buffer_size(&self) -> i64 {
        let fallback = self.get_int(BLOCKSIZE_PROPERTY, DEFAULT_BUFFER_SIZE);
        self.get_int(BUFFER_SIZE_PROPERTY, fallback)
    }

    /// Replication for newly created files.
    pub fn replication(&self) -> i64 {
        self.get_int(REPLICATION_PROPERTY, DEFAULT_REPLICATION)
    }

    /// URI of the default filesystem.
    pub fn default_fs(&self) -> &str {
        self.get(DEFAULT_FS_PROPERTY).unwrap_or(DEFAULT_FS_URI)
    }
}

/// Parameters identifying which backend to connect to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectParams {
    /// Empty for the local filesystem, `"default"` for the configured
    /// default filesystem, otherwise a namenode host.
    pub host: String,
    pub port: u16,
    /// Acting user for impersonation.
    pub user: Option<String>,
    /// Carried for callers; not used when connecting.
    pub groups: Vec<String>,
}

impl ConnectParams {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Default::default()
        }
    }

    /// The local filesystem.
    pub fn local() -> Self {
        Self::default()
    }

    /// The configured default filesystem.
    pub fn default_fs() -> Self {
        Self::new("default", 0)
    }

    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    pub fn with_groups(mut self, groups: Vec<String>) -> Self {
        self.groups = groups;
        self
    }
}
