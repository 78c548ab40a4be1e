//! # hadron-fs
//!
//! POSIX-style file access over a block-oriented distributed filesystem.
//!
//! The backend only offers single-writer create-or-append streams, explicit
//! block size and replication, and exceptions instead of return codes. This
//! crate maps `O_*` open flags, buffered output, chunked and positional
//! reads, and metadata records onto it.
//!
//! - [`FileSystem`] - connection lifecycle, paths, metadata, listings
//! - [`FileHandle`] - one open stream, tagged INPUT or OUTPUT
//! - [`Connector`] / [`Connection`] - the backend seam
//! - [`backends`] - local disk and an in-memory cluster
//!
//! ```no_run
//! use hadron_fs::{Configuration, ConnectParams, FileSystem, LocalConnector, OpenFlags, OpenParams};
//!
//! let fs = FileSystem::connect(ConnectParams::local(), Configuration::new(), &LocalConnector::new())?;
//! let mut f = fs.open_file("/tmp/hello.txt", OpenFlags::WRONLY, OpenParams::default())?;
//! f.write(b"hello")?;
//! f.close()?;
//! fs.close()?;
//! # Ok::<(), hadron_fs::FsError>(())
//! ```

pub mod backend;
pub mod backends;
mod chunk;
pub mod config;
mod copy;
mod error;
mod file;
pub mod flags;
mod fs;
pub mod marshal;
pub mod metadata;
pub mod path;

pub use backend::{
    BackendError, BackendResult, BlockLocation, Connection, Connector, FileStatus, InputStream,
    OutputStream,
};
#[cfg(unix)]
pub use backends::{LocalConnection, LocalConnector};
pub use backends::{MemoryCluster, MemoryConnection, MemoryConnector};
pub use chunk::Chunk;
pub use config::{Configuration, ConnectParams};
pub use copy::copy_between;
pub use error::{FsError, FsResult};
pub use file::{FileHandle, DEFAULT_READ_CHUNK_SIZE};
pub use flags::{OpenFlags, StreamMode, StreamType};
pub use fs::{FileSystem, OpenParams, CLUSTER_SCHEME, DEFAULT_HOST};
pub use metadata::{PathInfo, PathKind};
pub use path::DfsPath;
