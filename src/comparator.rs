//! Key comparison capability.
//!
//! The tree core never assumes a key type; it only asks a comparator whether
//! one fixed-size byte record orders before another, or equals it. This
//! mirrors the capability-object pattern rather than reaching for a trait
//! object: most trees use the same comparator for their whole lifetime, so a
//! plain generic parameter avoids a vtable indirection on every key touch.

/// Orders and equates fixed-size key records.
///
/// Implementors receive the tree's `rec_size` on every call so a single
/// comparator can be reused across trees with different record sizes if it
/// is stateless (as `ByteComparator` is).
pub trait Comparator {
    /// Returns true if `lhs` orders strictly before `rhs`.
    fn less(&self, lhs: &[u8], rhs: &[u8], rec_size: usize) -> bool;

    /// Returns true if `lhs` and `rhs` are the same key.
    fn equal(&self, lhs: &[u8], rhs: &[u8], rec_size: usize) -> bool {
        !self.less(lhs, rhs, rec_size) && !self.less(rhs, lhs, rec_size)
    }
}

/// Default comparator: plain unsigned byte-lexicographic order over the
/// first `rec_size` bytes of each slice.
#[derive(Debug, Clone, Copy, Default)]
pub struct ByteComparator;

impl Comparator for ByteComparator {
    fn less(&self, lhs: &[u8], rhs: &[u8], rec_size: usize) -> bool {
        lhs[..rec_size] < rhs[..rec_size]
    }

    fn equal(&self, lhs: &[u8], rhs: &[u8], rec_size: usize) -> bool {
        lhs[..rec_size] == rhs[..rec_size]
    }
}

/// Compares fixed-size records as little-endian signed integers. Useful when
/// `rec_size` is 4 or 8 and keys are meant to sort numerically rather than
/// lexicographically.
#[derive(Debug, Clone, Copy, Default)]
pub struct I64Comparator;

impl I64Comparator {
    fn decode(bytes: &[u8]) -> i64 {
        let mut buf = [0u8; 8];
        let n = bytes.len().min(8);
        buf[..n].copy_from_slice(&bytes[..n]);
        i64::from_le_bytes(buf)
    }
}

impl Comparator for I64Comparator {
    fn less(&self, lhs: &[u8], rhs: &[u8], rec_size: usize) -> bool {
        Self::decode(&lhs[..rec_size]) < Self::decode(&rhs[..rec_size])
    }

    fn equal(&self, lhs: &[u8], rhs: &[u8], rec_size: usize) -> bool {
        Self::decode(&lhs[..rec_size]) == Self::decode(&rhs[..rec_size])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn byte_comparator_orders_lexicographically() {
        let c = ByteComparator;
        assert!(c.less(&[1, 2], &[1, 3], 2));
        assert!(!c.less(&[1, 3], &[1, 2], 2));
        assert!(c.equal(&[5, 5], &[5, 5], 2));
    }

    #[test]
    fn i64_comparator_orders_numerically() {
        let c = I64Comparator;
        let a = (-1i64).to_le_bytes();
        let b = 1i64.to_le_bytes();
        // Byte-lexicographic order would put -1 (0xFF..) after 1; numeric
        // order must put it before.
        assert!(c.less(&a, &b, 8));
    }
}
