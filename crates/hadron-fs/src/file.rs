//! File handles.
//!
//! A [`FileHandle`] owns exactly one backend stream and is tagged INPUT or
//! OUTPUT for its whole life. Output handles write through a `BufWriter`
//! over the raw backend stream; input handles read straight from it.
//!
//! Every byte that comes back from the backend goes through
//! [`marshal::copy_unsigned`], whichever read variant asked for it.

use std::fmt;
use std::io::{self, BufWriter, Write};

use crate::backend::{InputStream, OutputStream};
use crate::chunk::Chunk;
use crate::error::{FsError, FsResult};
use crate::flags::{OpenFlags, StreamType};
use crate::marshal::{self, RawBuffer};

/// Read size used when a read asks for `-1` bytes.
pub const DEFAULT_READ_CHUNK_SIZE: usize = 16384;

/// Capacity of the output buffering wrapper.
const OUTPUT_BUFFER_CAPACITY: usize = 8192;

/// `io::Write` adapter that hands caller bytes to a backend output stream.
struct BackendWriter {
    inner: Box<dyn OutputStream>,
}

impl Write for BackendWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner
            .write(&marshal::to_signed(buf))
            .map_err(io::Error::other)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush().map_err(io::Error::other)
    }
}

enum Stream {
    Input(Box<dyn InputStream>),
    Output(BufWriter<BackendWriter>),
}

/// An open file on a backend filesystem.
pub struct FileHandle {
    path: String,
    mode: OpenFlags,
    stream_type: StreamType,
    stream: Option<Stream>,
    read_chunk_size: usize,
}

impl fmt::Debug for FileHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileHandle")
            .field("path", &self.path)
            .field("mode", &self.mode)
            .field("stream_type", &self.stream_type)
            .field("closed", &self.stream.is_none())
            .finish()
    }
}

impl FileHandle {
    pub(crate) fn input(
        path: impl Into<String>,
        mode: OpenFlags,
        stream: Box<dyn InputStream>,
        read_chunk_size: usize,
    ) -> Self {
        Self {
            path: path.into(),
            mode,
            stream_type: StreamType::Input,
            stream: Some(Stream::Input(stream)),
            read_chunk_size,
        }
    }

    pub(crate) fn output(path: impl Into<String>, mode: OpenFlags, stream: Box<dyn OutputStream>) -> Self {
        let writer = BufWriter::with_capacity(OUTPUT_BUFFER_CAPACITY, BackendWriter { inner: stream });
        Self {
            path: path.into(),
            mode,
            stream_type: StreamType::Output,
            stream: Some(Stream::Output(writer)),
            read_chunk_size: DEFAULT_READ_CHUNK_SIZE,
        }
    }

    /// Path the handle was opened with.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The open flags recorded at construction.
    pub fn get_mode(&self) -> OpenFlags {
        self.mode
    }

    pub fn stream_type(&self) -> StreamType {
        self.stream_type
    }

    pub fn read_chunk_size(&self) -> usize {
        self.read_chunk_size
    }

    pub fn is_closed(&self) -> bool {
        self.stream.is_none()
    }

    fn reader(&mut self) -> FsResult<&mut Box<dyn InputStream>> {
        match self.stream.as_mut() {
            Some(Stream::Input(stream)) => Ok(stream),
            Some(Stream::Output(_)) => Err(FsError::stream_state(format!(
                "{} is not open for reading",
                self.path
            ))),
            None => Err(closed(&self.path)),
        }
    }

    fn writer(&mut self) -> FsResult<&mut BufWriter<BackendWriter>> {
        match self.stream.as_mut() {
            Some(Stream::Output(writer)) => Ok(writer),
            Some(Stream::Input(_)) => Err(FsError::stream_state(format!(
                "{} is not open for writing",
                self.path
            ))),
            None => Err(closed(&self.path)),
        }
    }

    /// Bytes readable without blocking, or `-1` for a closed or output handle.
    pub fn available(&self) -> FsResult<i64> {
        match &self.stream {
            Some(Stream::Input(stream)) => Ok(stream.available()? as i64),
            _ => Ok(-1),
        }
    }

    /// Flush any buffered output and close the backend stream.
    ///
    /// The handle is unusable afterwards, including when closing fails.
    pub fn close(&mut self) -> FsResult<()> {
        let stream = self.stream.take().ok_or_else(|| closed(&self.path))?;
        tracing::debug!(path = %self.path, stream_type = %self.stream_type, "closing file");
        match stream {
            Stream::Input(mut stream) => stream.close()?,
            Stream::Output(writer) => match writer.into_inner() {
                Ok(mut raw) => raw.inner.close()?,
                Err(e) => {
                    let message = e.error().to_string();
                    let (mut raw, _) = e.into_inner().into_parts();
                    if let Err(close_err) = raw.inner.close() {
                        tracing::debug!(path = %self.path, error = %close_err, "close after failed flush");
                    }
                    return Err(FsError::backend_io(message));
                }
            },
        }
        Ok(())
    }

    /// Write `data`, returning the number of bytes accepted.
    pub fn write(&mut self, data: &[u8]) -> FsResult<usize> {
        self.write_impl(data, data.len() as i64)
    }

    /// Write the valid bytes of `chunk`.
    pub fn write_chunk(&mut self, chunk: &Chunk) -> FsResult<usize> {
        self.write_impl(chunk.data(), chunk.filled() as i64)
    }

    fn write_impl(&mut self, data: &[u8], length: i64) -> FsResult<usize> {
        let writer = self.writer()?;
        if length < 0 {
            return Err(FsError::invalid_argument(format!("negative write length {length}")));
        }
        let length = (length as usize).min(data.len());
        if length == 0 {
            return Ok(0);
        }
        writer
            .write_all(&data[..length])
            .map_err(|e| FsError::backend_io(e.to_string()))?;
        Ok(length)
    }

    /// Current position. For output handles this counts bytes still held
    /// in the write buffer.
    pub fn tell(&self) -> FsResult<u64> {
        match &self.stream {
            Some(Stream::Input(stream)) => Ok(stream.pos()?),
            Some(Stream::Output(writer)) => {
                let pos = writer.get_ref().inner.pos()?;
                Ok(pos + writer.buffer().len() as u64)
            }
            None => Err(closed(&self.path)),
        }
    }

    /// Move an input handle to the absolute offset `position`.
    pub fn seek(&mut self, position: u64) -> FsResult<()> {
        self.reader()?.seek(position)?;
        Ok(())
    }

    /// Issue one backend read of up to `length` bytes.
    ///
    /// `-1` reads [`read_chunk_size`](Self::read_chunk_size) bytes. The
    /// result is empty at end of stream.
    pub fn read(&mut self, length: i64) -> FsResult<Vec<u8>> {
        let chunk_size = self.read_chunk_size;
        let stream = self.reader()?;
        let length = resolve_length(length, chunk_size)?;
        let mut raw = read_buffer(length)?;
        match stream.read(&mut raw)? {
            Some(n) => Ok(marshal::to_bytes(&raw, n)),
            None => Ok(Vec::new()),
        }
    }

    /// Fill `chunk` from the current position; returns the count (0 at EOF).
    pub fn read_chunk(&mut self, chunk: &mut Chunk) -> FsResult<usize> {
        let n = self.read_into(None, chunk.buffer_mut())?;
        chunk.set_filled(n);
        Ok(n)
    }

    /// Read up to `length` bytes at `position` without moving the stream.
    pub fn pread(&mut self, position: u64, length: i64) -> FsResult<Vec<u8>> {
        let chunk_size = self.read_chunk_size;
        let stream = self.reader()?;
        let length = resolve_length(length, chunk_size)?;
        let mut raw = read_buffer(length)?;
        match stream.read_at(position, &mut raw, 0, length)? {
            Some(n) => Ok(marshal::to_bytes(&raw, n)),
            None => Ok(Vec::new()),
        }
    }

    /// Fill `chunk` from `position` without moving the stream.
    pub fn pread_chunk(&mut self, position: u64, chunk: &mut Chunk) -> FsResult<usize> {
        let n = self.read_into(Some(position), chunk.buffer_mut())?;
        chunk.set_filled(n);
        Ok(n)
    }

    /// Push buffered output to the backend and flush it.
    pub fn flush(&mut self) -> FsResult<()> {
        self.writer()?
            .flush()
            .map_err(|e| FsError::backend_io(e.to_string()))
    }

    /// One backend read of `dst.len()` bytes, sequential or positional.
    fn read_into(&mut self, position: Option<u64>, dst: &mut [u8]) -> FsResult<usize> {
        let stream = self.reader()?;
        let mut raw = read_buffer(dst.len())?;
        let count = match position {
            Some(position) => stream.read_at(position, &mut raw, 0, dst.len())?,
            None => stream.read(&mut raw)?,
        };
        Ok(count.map_or(0, |n| marshal::copy_unsigned(&raw, n, dst)))
    }
}

/// `-1` means the handle's read chunk size; other negatives are rejected.
fn resolve_length(length: i64, chunk_size: usize) -> FsResult<usize> {
    match length {
        -1 => Ok(chunk_size),
        n if n < 0 => Err(FsError::invalid_argument(format!("negative read length {n}"))),
        n => Ok(n as usize),
    }
}

fn read_buffer(length: usize) -> FsResult<RawBuffer> {
    RawBuffer::try_allocate(length)
        .map_err(|e| FsError::backend_io(format!("cannot allocate {length} byte read buffer: {e}")))
}

fn closed(path: &str) -> FsError {
    FsError::stream_state(format!("I/O operation on closed file {path}"))
}

impl io::Read for FileHandle {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Ok(self.read_into(None, buf)?)
    }
}

impl io::Write for FileHandle {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Ok(FileHandle::write(self, buf)?)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(FileHandle::flush(self)?)
    }
}

impl Drop for FileHandle {
    fn drop(&mut self) {
        if self.stream.is_some() {
            if let Err(e) = self.close() {
                tracing::warn!(path = %self.path, error = %e, "failed to close file on drop");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{Connection, Connector};
    use crate::backends::MemoryConnector;
    use crate::config::Configuration;
    use crate::path::DfsPath;

    fn conn() -> Box<dyn Connection> {
        MemoryConnector::new()
            .get("hdfs://nn:9000", &Configuration::new(), Some("alice"))
            .unwrap()
    }

    fn path(s: &str) -> DfsPath {
        DfsPath::new(s).unwrap()
    }

    fn writer(conn: &dyn Connection, p: &str) -> FileHandle {
        let stream = conn.create(&path(p), true, 4096, 1, 1024).unwrap();
        FileHandle::output(p, OpenFlags::WRONLY, stream)
    }

    fn reader(conn: &dyn Connection, p: &str) -> FileHandle {
        let stream = conn.open(&path(p), 4096).unwrap();
        FileHandle::input(p, OpenFlags::RDONLY, stream, 4)
    }

    fn put(conn: &dyn Connection, p: &str, data: &[u8]) {
        let mut f = writer(conn, p);
        f.write(data).unwrap();
        f.close().unwrap();
    }

    #[test]
    fn test_write_returns_length() {
        let conn = conn();
        let mut f = writer(conn.as_ref(), "/a");
        assert_eq!(f.write(b"hello").unwrap(), 5);
        assert_eq!(f.write(b"").unwrap(), 0);
        assert_eq!(f.write_chunk(&Chunk::from(b"!!".to_vec())).unwrap(), 2);
        f.close().unwrap();
    }

    #[test]
    fn test_negative_write_length() {
        let conn = conn();
        let mut f = writer(conn.as_ref(), "/a");
        let result = f.write_impl(b"abc", -1);
        assert!(matches!(result, Err(FsError::InvalidArgument(_))));
    }

    #[test]
    fn test_tell_counts_buffered_bytes() {
        let conn = conn();
        let mut f = writer(conn.as_ref(), "/a");
        f.write(b"12345").unwrap();
        assert_eq!(f.tell().unwrap(), 5);
        f.flush().unwrap();
        assert_eq!(f.tell().unwrap(), 5);
    }

    #[test]
    fn test_output_wrong_type() {
        let conn = conn();
        let mut f = writer(conn.as_ref(), "/a");
        assert!(matches!(f.read(1), Err(FsError::StreamState(_))));
        assert!(matches!(f.seek(0), Err(FsError::StreamState(_))));
        assert!(matches!(f.pread(0, 1), Err(FsError::StreamState(_))));
        assert_eq!(f.available().unwrap(), -1);
        assert_eq!(f.stream_type(), StreamType::Output);
    }

    #[test]
    fn test_input_wrong_type() {
        let conn = conn();
        put(conn.as_ref(), "/a", b"x");
        let mut f = reader(conn.as_ref(), "/a");
        assert!(matches!(f.write(b"y"), Err(FsError::StreamState(_))));
        assert!(matches!(f.flush(), Err(FsError::StreamState(_))));
        assert_eq!(f.stream_type(), StreamType::Input);
    }

    #[test]
    fn test_read_default_chunk_size() {
        let conn = conn();
        put(conn.as_ref(), "/a", b"abcdefgh");
        let mut f = reader(conn.as_ref(), "/a");
        assert_eq!(f.read(-1).unwrap(), b"abcd");
        assert_eq!(f.available().unwrap(), 4);
        assert!(matches!(f.read(-2), Err(FsError::InvalidArgument(_))));
    }

    #[test]
    fn test_read_at_eof_is_empty() {
        let conn = conn();
        put(conn.as_ref(), "/a", b"ab");
        let mut f = reader(conn.as_ref(), "/a");
        assert_eq!(f.read(10).unwrap(), b"ab");
        assert!(f.read(10).unwrap().is_empty());
        let mut chunk = Chunk::with_capacity(4);
        assert_eq!(f.read_chunk(&mut chunk).unwrap(), 0);
        assert!(chunk.is_empty());
    }

    #[test]
    fn test_oversized_read_is_an_error() {
        let conn = conn();
        put(conn.as_ref(), "/small", b"abc");
        let mut f = reader(conn.as_ref(), "/small");
        assert!(matches!(f.read(i64::MAX), Err(FsError::BackendIo(_))));
        assert!(matches!(f.pread(0, i64::MAX), Err(FsError::BackendIo(_))));
        // The handle stays usable.
        assert_eq!(f.read(3).unwrap(), b"abc");
    }

    #[test]
    fn test_high_bytes_round_trip() {
        let conn = conn();
        let data: Vec<u8> = (0..=255).collect();
        put(conn.as_ref(), "/bin", &data);
        let mut f = reader(conn.as_ref(), "/bin");
        assert_eq!(f.read(512).unwrap(), data);
        assert_eq!(f.pread(250, 10).unwrap(), vec![250, 251, 252, 253, 254, 255]);
    }

    #[test]
    fn test_chunk_reuse() {
        let conn = conn();
        put(conn.as_ref(), "/a", b"0123456789");
        let mut f = reader(conn.as_ref(), "/a");
        let mut chunk = Chunk::with_capacity(4);
        let mut collected = Vec::new();
        while f.read_chunk(&mut chunk).unwrap() > 0 {
            collected.extend_from_slice(chunk.data());
        }
        assert_eq!(collected, b"0123456789");
        assert_eq!(chunk.capacity(), 4);
    }

    #[test]
    fn test_pread_keeps_position() {
        let conn = conn();
        put(conn.as_ref(), "/a", b"0123456789");
        let mut f = reader(conn.as_ref(), "/a");
        f.seek(3).unwrap();
        assert_eq!(f.pread(7, -1).unwrap(), b"789");
        let mut chunk = Chunk::with_capacity(2);
        assert_eq!(f.pread_chunk(0, &mut chunk).unwrap(), 2);
        assert_eq!(chunk.data(), b"01");
        assert_eq!(f.tell().unwrap(), 3);
    }

    #[test]
    fn test_closed_handle() {
        let conn = conn();
        put(conn.as_ref(), "/a", b"ab");
        let mut f = reader(conn.as_ref(), "/a");
        f.close().unwrap();
        assert!(f.is_closed());
        assert!(matches!(f.close(), Err(FsError::StreamState(_))));
        assert!(matches!(f.tell(), Err(FsError::StreamState(_))));
        assert!(matches!(f.read(1), Err(FsError::StreamState(_))));
        assert_eq!(f.available().unwrap(), -1);
    }

    #[test]
    fn test_drop_commits_output() {
        let conn = conn();
        {
            let mut f = writer(conn.as_ref(), "/dropped");
            f.write(b"kept").unwrap();
        }
        assert_eq!(conn.status(&path("/dropped")).unwrap().length, 4);
    }

    #[test]
    fn test_io_traits() {
        use std::io::{Read, Write};

        let conn = conn();
        let mut f = writer(conn.as_ref(), "/io");
        f.write_all(b"through io").unwrap();
        Write::flush(&mut f).unwrap();
        f.close().unwrap();

        let mut f = reader(conn.as_ref(), "/io");
        let mut text = String::new();
        f.read_to_string(&mut text).unwrap();
        assert_eq!(text, "through io");
    }
}
