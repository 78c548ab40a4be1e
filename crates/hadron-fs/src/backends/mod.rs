//! Filesystem backends.
//!
//! Backends implement [`Connector`](crate::Connector) and the traits it
//! hands out for different storage types.

#[cfg(unix)]
mod local;
mod memory;

#[cfg(unix)]
pub use local::{LocalConnection, LocalConnector, LOCAL_SCHEME};
pub use memory::{MemoryCluster, MemoryConnection, MemoryConnector};
