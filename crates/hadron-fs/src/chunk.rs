//! Reusable caller-owned byte buffers.

/// A fixed-capacity byte buffer passed by `&mut` into the chunk read and
/// write variants of [`FileHandle`](crate::FileHandle).
///
/// Reads fill it from the front and record how many bytes are valid;
/// writes consume the valid bytes. The allocation is kept across calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    data: Vec<u8>,
    filled: usize,
}

impl Chunk {
    /// A zeroed chunk of `capacity` bytes with nothing valid yet.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: vec![0; capacity],
            filled: 0,
        }
    }

    /// Size of the underlying buffer; the request size for chunk reads.
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Number of valid bytes.
    pub fn filled(&self) -> usize {
        self.filled
    }

    pub fn is_empty(&self) -> bool {
        self.filled == 0
    }

    /// The valid bytes.
    pub fn data(&self) -> &[u8] {
        &self.data[..self.filled]
    }

    /// The whole buffer, for callers filling it themselves before a write.
    pub fn buffer_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Mark the first `n` bytes valid, clamped to the capacity.
    pub fn set_filled(&mut self, n: usize) {
        self.filled = n.min(self.data.len());
    }

    pub fn clear(&mut self) {
        self.filled = 0;
    }

    /// The valid bytes, dropping the rest of the buffer.
    pub fn into_inner(mut self) -> Vec<u8> {
        self.data.truncate(self.filled);
        self.data
    }
}

impl From<Vec<u8>> for Chunk {
    /// A chunk whose whole buffer is valid.
    fn from(data: Vec<u8>) -> Self {
        let filled = data.len();
        Self { data, filled }
    }
}

impl From<&[u8]> for Chunk {
    fn from(data: &[u8]) -> Self {
        Self::from(data.to_vec())
    }
}

impl AsRef<[u8]> for Chunk {
    fn as_ref(&self) -> &[u8] {
        self.data()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_chunk_is_empty() {
        let chunk = Chunk::with_capacity(8);
        assert_eq!(chunk.capacity(), 8);
        assert!(chunk.is_empty());
        assert!(chunk.data().is_empty());
    }

    #[test]
    fn test_fill_and_clear() {
        let mut chunk = Chunk::with_capacity(4);
        chunk.buffer_mut()[..2].copy_from_slice(b"hi");
        chunk.set_filled(2);
        assert_eq!(chunk.data(), b"hi");

        chunk.set_filled(100);
        assert_eq!(chunk.filled(), 4);

        chunk.clear();
        assert_eq!(chunk.capacity(), 4);
        assert!(chunk.is_empty());
    }

    #[test]
    fn test_from_vec() {
        let chunk = Chunk::from(b"abc".to_vec());
        assert_eq!(chunk.filled(), 3);
        assert_eq!(chunk.into_inner(), b"abc");
    }
}
