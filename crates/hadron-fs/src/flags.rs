//! POSIX open flags and the stream-mode decision table.
//!
//! The backend only knows three ways to get a stream: open for reading,
//! append to an existing file, or create (always overwriting). Every
//! `O_*` combination callers pass is mapped onto one of those here, once,
//! before any backend call is made.

use std::fmt;
use std::ops::BitOr;

use crate::error::{FsError, FsResult};

/// Mask selecting the access-mode bits of an `OpenFlags` value.
pub const O_ACCMODE: i32 = libc::O_RDONLY | libc::O_WRONLY | libc::O_RDWR;

/// A raw `open(2)`-style flags bitmask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct OpenFlags(i32);

impl OpenFlags {
    pub const RDONLY: OpenFlags = OpenFlags(libc::O_RDONLY);
    pub const WRONLY: OpenFlags = OpenFlags(libc::O_WRONLY);
    pub const RDWR: OpenFlags = OpenFlags(libc::O_RDWR);
    pub const CREAT: OpenFlags = OpenFlags(libc::O_CREAT);
    pub const EXCL: OpenFlags = OpenFlags(libc::O_EXCL);
    pub const TRUNC: OpenFlags = OpenFlags(libc::O_TRUNC);
    pub const APPEND: OpenFlags = OpenFlags(libc::O_APPEND);

    pub fn from_bits(bits: i32) -> Self {
        Self(bits)
    }

    pub fn bits(&self) -> i32 {
        self.0
    }

    /// True if every bit of `other` is set in `self`.
    pub fn contains(&self, other: OpenFlags) -> bool {
        self.0 & other.0 == other.0
    }

    /// The access-mode bits, `flags & O_ACCMODE`.
    pub fn accmode(&self) -> i32 {
        self.0 & O_ACCMODE
    }

    /// Parse a stdio style mode string (`"r"`, `"w"`, `"a"`).
    ///
    /// `"w"` maps to `O_WRONLY|O_CREAT|O_TRUNC` and `"a"` to
    /// `O_WRONLY|O_CREAT|O_APPEND`. A `b` suffix is ignored; `+` is rejected
    /// because the backend has no duplex streams.
    pub fn from_mode_str(mode: &str) -> FsResult<Self> {
        let base = mode.trim_end_matches('b');
        match base {
            "r" => Ok(Self::RDONLY),
            "w" => Ok(Self::WRONLY | Self::CREAT | Self::TRUNC),
            "a" => Ok(Self::WRONLY | Self::CREAT | Self::APPEND),
            _ => Err(FsError::invalid_argument(format!("unsupported mode {mode:?}"))),
        }
    }
}

impl BitOr for OpenFlags {
    type Output = OpenFlags;

    fn bitor(self, rhs: OpenFlags) -> OpenFlags {
        OpenFlags(self.0 | rhs.0)
    }
}

impl From<i32> for OpenFlags {
    fn from(bits: i32) -> Self {
        Self(bits)
    }
}

impl fmt::Display for OpenFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#o}", self.0)
    }
}

/// Which kind of backend stream an open resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum StreamMode {
    /// `O_RDONLY`: an input stream.
    Read,
    /// `O_WRONLY|O_APPEND`: an output stream positioned at end of file.
    Append,
    /// `O_WRONLY` without append: create, overwriting any existing file.
    Create,
}

/// The stream type tag a file handle carries for its whole life.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "UPPERCASE")]
pub enum StreamType {
    Input,
    Output,
}

impl StreamMode {
    /// Decide the stream mode for `flags`.
    ///
    /// | accmode  | append | create | result            |
    /// |----------|--------|--------|-------------------|
    /// | RDONLY   | any    | any    | `Read`            |
    /// | WRONLY   | yes    | any    | `Append`          |
    /// | WRONLY   | no     | any    | `Create`          |
    /// | RDWR     | any    | any    | `InvalidArgument` |
    /// | other    | any    | any    | `InvalidArgument` |
    pub fn decide(flags: OpenFlags) -> FsResult<StreamMode> {
        let accmode = flags.accmode();
        let append = flags.contains(OpenFlags::APPEND);
        match (accmode, append) {
            (libc::O_RDONLY, _) => Ok(StreamMode::Read),
            (libc::O_WRONLY, true) => Ok(StreamMode::Append),
            (libc::O_WRONLY, false) => Ok(StreamMode::Create),
            (libc::O_RDWR, _) => Err(FsError::invalid_argument(
                "cannot open a file in O_RDWR mode",
            )),
            (other, _) => Err(FsError::invalid_argument(format!(
                "cannot open a file in mode {other}"
            ))),
        }
    }

    pub fn stream_type(&self) -> StreamType {
        match self {
            StreamMode::Read => StreamType::Input,
            StreamMode::Append | StreamMode::Create => StreamType::Output,
        }
    }

    /// Replication and block size only matter when creating.
    pub fn uses_replication(&self) -> bool {
        matches!(self, StreamMode::Create)
    }
}

/// True when the caller asked for an exclusive create, which the backend
/// cannot enforce atomically.
pub fn wants_exclusive_create(flags: OpenFlags) -> bool {
    flags.contains(OpenFlags::CREAT) && flags.contains(OpenFlags::EXCL)
}
