//! Error types for the filesystem and file handles.
//!
//! Backend calls fail with [`BackendError`]; every public operation
//! translates those into one of the [`FsError`] kinds before returning.

use std::io;
use thiserror::Error;

use crate::backend::BackendError;

/// Error type for filesystem and file handle operations.
#[derive(Debug, Error)]
pub enum FsError {
    /// The backend could not be resolved or reached.
    #[error("connection error: {0}")]
    Connection(String),

    /// Empty path, negative length, unsupported open mode, missing owner/group.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Status fetch failed, or a listed directory does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Wrong stream type for the operation, or the stream is closed.
    #[error("invalid stream state: {0}")]
    StreamState(String),

    /// A backend call failed during open, read, write, flush or close.
    #[error("backend I/O error: {0}")]
    BackendIo(String),
}

impl FsError {
    /// Create a Connection error.
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    /// Create an InvalidArgument error.
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// Create a NotFound error.
    pub fn not_found(path: impl Into<String>) -> Self {
        Self::NotFound(path.into())
    }

    /// Create a StreamState error.
    pub fn stream_state(msg: impl Into<String>) -> Self {
        Self::StreamState(msg.into())
    }

    /// Create a BackendIo error.
    pub fn backend_io(msg: impl Into<String>) -> Self {
        Self::BackendIo(msg.into())
    }
}

/// Backend failures surface as I/O errors carrying the backend's message.
impl From<BackendError> for FsError {
    fn from(e: BackendError) -> Self {
        Self::BackendIo(e.message().to_string())
    }
}

/// Convert FsError to std::io::Error for compatibility.
impl From<FsError> for io::Error {
    fn from(e: FsError) -> Self {
        match e {
            FsError::Connection(msg) => io::Error::new(io::ErrorKind::NotConnected, msg),
            FsError::InvalidArgument(msg) => io::Error::new(io::ErrorKind::InvalidInput, msg),
            FsError::NotFound(msg) => io::Error::new(io::ErrorKind::NotFound, msg),
            FsError::StreamState(msg) => io::Error::other(msg),
            FsError::BackendIo(msg) => io::Error::other(msg),
        }
    }
}

/// Result type for filesystem and file handle operations.
pub type FsResult<T> = Result<T, FsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_error_becomes_backend_io() {
        let err: FsError = BackendError::new("datanode unreachable").into();
        match err {
            FsError::BackendIo(msg) => assert_eq!(msg, "datanode unreachable"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_io_error_kinds() {
        let e: io::Error = FsError::not_found("/missing").into();
        assert_eq!(e.kind(), io::ErrorKind::NotFound);

        let e: io::Error = FsError::invalid_argument("empty path").into();
        assert_eq!(e.kind(), io::ErrorKind::InvalidInput);

        let e: io::Error = FsError::connection("no route").into();
        assert_eq!(e.kind(), io::ErrorKind::NotConnected);
    }

    #[test]
    fn test_display() {
        assert_eq!(
            FsError::stream_state("handle is closed").to_string(),
            "invalid stream state: handle is closed"
        );
    }
}
