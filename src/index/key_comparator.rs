use std::cmp::Ordering;

/// Fixed-size index key. The supported widths are 4, 8, 16, 32 and 64
/// bytes; comparison semantics come from the tree's [`KeyComparator`], not
/// from the bytes themselves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GenericKey<const N: usize> {
    bytes: [u8; N],
}

impl<const N: usize> GenericKey<N> {
    pub fn new(bytes: [u8; N]) -> Self {
        Self { bytes }
    }

    pub fn from_slice(slice: &[u8]) -> Self {
        let mut bytes = [0u8; N];
        bytes.copy_from_slice(&slice[..N]);
        Self { bytes }
    }

    /// Builds a key holding a little-endian u32 in its first four bytes,
    /// the encoding [`UInt32Comparator`] orders by.
    pub fn from_u32(value: u32) -> Self {
        assert!(N >= 4);
        let mut bytes = [0u8; N];
        bytes[..4].copy_from_slice(&value.to_le_bytes());
        Self { bytes }
    }

    pub fn to_u32(&self) -> u32 {
        assert!(N >= 4);
        u32::from_le_bytes(self.bytes[..4].try_into().unwrap())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn as_array(&self) -> [u8; N] {
        self.bytes
    }
}

/// Total ordering over raw key bytes. Every ordering decision the tree
/// makes (insert position, search target, separator choice) goes through
/// one of these.
pub trait KeyComparator: Send + Sync {
    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering;
}

/// Orders keys by the little-endian u32 in their first four bytes.
#[derive(Debug, Clone, Copy, Default)]
pub struct UInt32Comparator;

impl KeyComparator for UInt32Comparator {
    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
        let a_val = u32::from_le_bytes(a[..4].try_into().unwrap());
        let b_val = u32::from_le_bytes(b[..4].try_into().unwrap());
        a_val.cmp(&b_val)
    }
}

/// Orders keys lexicographically by their raw bytes.
#[derive(Debug, Clone, Copy, Default)]
pub struct BytewiseComparator;

impl KeyComparator for BytewiseComparator {
    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
        a.cmp(b)
    }
}
