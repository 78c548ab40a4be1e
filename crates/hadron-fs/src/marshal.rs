//! Byte marshaling across the backend buffer boundary.
//!
//! Backend streams exchange signed bytes (`i8`), the element type of the
//! backend runtime's byte arrays. Callers see `u8`. Every transfer in
//! either direction goes through the helpers here.

use std::collections::TryReserveError;

/// A fixed-size backend byte buffer, allocated per read call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawBuffer {
    data: Vec<i8>,
}

impl RawBuffer {
    /// Allocate a zeroed buffer of `len` elements.
    pub fn allocate(len: usize) -> Self {
        Self { data: vec![0; len] }
    }

    /// Allocate a zeroed buffer of `len` elements, failing instead of
    /// aborting when the memory is not available.
    pub fn try_allocate(len: usize) -> Result<Self, TryReserveError> {
        let mut data = Vec::new();
        data.try_reserve_exact(len)?;
        data.resize(len, 0);
        Ok(Self { data })
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_slice(&self) -> &[i8] {
        &self.data
    }

    /// Mutable view for backends to fill.
    pub fn as_mut_slice(&mut self) -> &mut [i8] {
        &mut self.data
    }
}

/// Map one backend element into the 0..=255 range.
#[inline]
pub fn to_unsigned(b: i8) -> u8 {
    b as u8
}

/// Copy the first `count` elements of `raw` into `dst` as unsigned bytes.
///
/// `count` is clamped to both lengths; the number copied is returned.
pub fn copy_unsigned(raw: &RawBuffer, count: usize, dst: &mut [u8]) -> usize {
    let n = count.min(raw.len()).min(dst.len());
    for (out, b) in dst[..n].iter_mut().zip(raw.as_slice()) {
        *out = to_unsigned(*b);
    }
    n
}

/// The first `count` elements of `raw` as an owned unsigned byte vector.
pub fn to_bytes(raw: &RawBuffer, count: usize) -> Vec<u8> {
    let mut out = vec![0u8; count.min(raw.len())];
    copy_unsigned(raw, count, &mut out);
    out
}

/// Caller bytes as backend elements.
pub fn to_signed(data: &[u8]) -> Vec<i8> {
    data.iter().map(|b| *b as i8).collect()
}

/// Backend-side conversion for stores that keep plain bytes.
pub fn fill_signed(src: &[u8], dst: &mut [i8]) -> usize {
    let n = src.len().min(dst.len());
    for (out, b) in dst[..n].iter_mut().zip(src) {
        *out = *b as i8;
    }
    n
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_high_bytes_survive() {
        let mut raw = RawBuffer::allocate(4);
        raw.as_mut_slice().copy_from_slice(&[-1, -128, 0, 127]);
        assert_eq!(to_bytes(&raw, 4), vec![255, 128, 0, 127]);
    }

    #[test]
    fn test_full_byte_range() {
        let all: Vec<u8> = (0..=255).collect();
        let mut raw = RawBuffer::allocate(all.len());
        assert_eq!(fill_signed(&all, raw.as_mut_slice()), 256);
        assert_eq!(to_bytes(&raw, 256), all);
        assert_eq!(to_signed(&all), raw.as_slice());
    }

    #[test]
    fn test_try_allocate() {
        assert_eq!(RawBuffer::try_allocate(16).unwrap().len(), 16);
        assert!(RawBuffer::try_allocate(usize::MAX).is_err());
    }

    #[test]
    fn test_count_is_clamped() {
        let raw = RawBuffer::allocate(3);
        assert_eq!(to_bytes(&raw, 10).len(), 3);

        let mut small = [0u8; 2];
        assert_eq!(copy_unsigned(&raw, 3, &mut small), 2);
    }
}
