//! Fixed-size page codec.
//!
//! A page holds an info word, a dense array of fixed-size key slots, and a
//! cursor array of child page numbers (meaningful only on internal pages).
//! Layout, all little-endian, no padding:
//!
//! ```text
//! offset 0                         : info word (2 bytes)
//!                                     bit 15      = leaf flag
//!                                     bits 0..=14 = live key count
//! offset 2                         : key slots, rec_size bytes each, max_keys of them
//! offset 2 + rec_size*max_keys     : cursor slots, 4 bytes each (u32 page number, 0 = absent),
//!                                     max_keys + 1 of them
//! ```
//!
//! `max_keys` is fixed for the whole file: it is the largest key count any
//! node of any kind the tree's variant admits can hold (the root of a B*-tree
//! is the usual maximum), so every page on disk has the same size regardless
//! of how many keys it currently holds.

use crate::error::{Result, TreeError};

const LEAF_MASK: u16 = 0x8000;
const COUNT_MASK: u16 = 0x7FFF;
/// Largest key count representable in the 15-bit count field, matching the
/// historical `MAX_KEYS_NUM` ceiling of the on-disk format.
pub const MAX_KEYS_NUM: usize = 32767;

/// An owned, fixed-size page buffer with typed accessors. Never retains a
/// reference into another page; callers pass `&mut PageBuf` around rather
/// than handing out sub-slices that could outlive a later read of another
/// page into the same storage.
#[derive(Debug, Clone)]
pub struct PageBuf {
    data: Vec<u8>,
    max_keys: usize,
    rec_size: usize,
}

impl PageBuf {
    /// Computes the fixed on-disk page size for a tree with the given
    /// per-page key capacity and record size.
    pub fn page_size(max_keys: usize, rec_size: usize) -> usize {
        2 + rec_size * max_keys + 4 * (max_keys + 1)
    }

    /// A fresh, zeroed page (leaf, zero keys, all cursors null).
    pub fn new(max_keys: usize, rec_size: usize) -> Self {
        Self {
            data: vec![0u8; Self::page_size(max_keys, rec_size)],
            max_keys,
            rec_size,
        }
    }

    /// Wraps a byte buffer read from disk, validating only its length.
    pub fn from_bytes(data: Vec<u8>, max_keys: usize, rec_size: usize) -> Result<Self> {
        let expected = Self::page_size(max_keys, rec_size);
        if data.len() != expected {
            return Err(TreeError::corruption(format!(
                "page buffer has {} bytes, expected {}",
                data.len(),
                expected
            )));
        }
        let page = Self {
            data,
            max_keys,
            rec_size,
        };
        if page.keys_count() > max_keys {
            return Err(TreeError::corruption(format!(
                "page claims {} keys, capacity is {}",
                page.keys_count(),
                max_keys
            )));
        }
        Ok(page)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    pub fn max_keys(&self) -> usize {
        self.max_keys
    }

    pub fn rec_size(&self) -> usize {
        self.rec_size
    }

    fn info_word(&self) -> u16 {
        u16::from_le_bytes([self.data[0], self.data[1]])
    }

    fn set_info_word(&mut self, word: u16) {
        self.data[0..2].copy_from_slice(&word.to_le_bytes());
    }

    pub fn is_leaf(&self) -> bool {
        self.info_word() & LEAF_MASK != 0
    }

    pub fn set_leaf(&mut self, leaf: bool) {
        let word = self.info_word();
        let word = if leaf {
            word | LEAF_MASK
        } else {
            word & !LEAF_MASK
        };
        self.set_info_word(word);
    }

    pub fn keys_count(&self) -> usize {
        (self.info_word() & COUNT_MASK) as usize
    }

    pub fn set_keys_count(&mut self, count: usize) {
        debug_assert!(count <= self.max_keys && count <= MAX_KEYS_NUM);
        let leaf_bit = self.info_word() & LEAF_MASK;
        self.set_info_word(leaf_bit | (count as u16 & COUNT_MASK));
    }

    fn key_offset(&self, i: usize) -> usize {
        2 + i * self.rec_size
    }

    fn cursors_offset(&self) -> usize {
        2 + self.rec_size * self.max_keys
    }

    fn cursor_offset(&self, i: usize) -> usize {
        self.cursors_offset() + i * 4
    }

    pub fn key(&self, i: usize) -> &[u8] {
        let ofs = self.key_offset(i);
        &self.data[ofs..ofs + self.rec_size]
    }

    pub fn set_key(&mut self, i: usize, key: &[u8]) {
        debug_assert_eq!(key.len(), self.rec_size);
        let ofs = self.key_offset(i);
        self.data[ofs..ofs + self.rec_size].copy_from_slice(key);
    }

    pub fn cursor(&self, i: usize) -> u32 {
        let ofs = self.cursor_offset(i);
        u32::from_le_bytes(self.data[ofs..ofs + 4].try_into().unwrap())
    }

    pub fn set_cursor(&mut self, i: usize, page_num: u32) {
        let ofs = self.cursor_offset(i);
        self.data[ofs..ofs + 4].copy_from_slice(&page_num.to_le_bytes());
    }

    /// Shifts keys `[from, keys_count())` one slot to the right, opening a
    /// gap at `from` for an insertion. Caller must bump `keys_count` after.
    pub fn open_key_gap(&mut self, from: usize) {
        let count = self.keys_count();
        for i in (from..count).rev() {
            let (src, dst) = (self.key_offset(i), self.key_offset(i + 1));
            self.data.copy_within(src..src + self.rec_size, dst);
        }
    }

    /// Shifts keys `[from+1, keys_count())` one slot to the left, closing the
    /// gap left by removing the key at `from`. Caller must decrement
    /// `keys_count` after.
    pub fn close_key_gap(&mut self, from: usize) {
        let count = self.keys_count();
        for i in from + 1..count {
            let (src, dst) = (self.key_offset(i), self.key_offset(i - 1));
            self.data.copy_within(src..src + self.rec_size, dst);
        }
    }

    /// Shifts cursors `[from, keys_count()+1)` one slot to the right.
    pub fn open_cursor_gap(&mut self, from: usize) {
        let count = self.keys_count();
        for i in (from..=count).rev() {
            if i == from {
                break;
            }
            let v = self.cursor(i - 1);
            self.set_cursor(i, v);
        }
    }

    /// Shifts cursors `[from+1, keys_count()+1)` one slot to the left.
    pub fn close_cursor_gap(&mut self, from: usize) {
        let count = self.keys_count();
        for i in from + 1..=count {
            let v = self.cursor(i);
            self.set_cursor(i - 1, v);
        }
    }

    /// Copies `count` keys starting at `src_idx` in `src` into `self`
    /// starting at `dst_idx`.
    pub fn copy_keys_from(&mut self, dst_idx: usize, src: &PageBuf, src_idx: usize, count: usize) {
        for i in 0..count {
            let k = src.key(src_idx + i).to_vec();
            self.set_key(dst_idx + i, &k);
        }
    }

    /// Copies `count` cursors starting at `src_idx` in `src` into `self`
    /// starting at `dst_idx`.
    pub fn copy_cursors_from(
        &mut self,
        dst_idx: usize,
        src: &PageBuf,
        src_idx: usize,
        count: usize,
    ) {
        for i in 0..count {
            self.set_cursor(dst_idx + i, src.cursor(src_idx + i));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_info_word() {
        let mut p = PageBuf::new(4, 8);
        assert!(!p.is_leaf());
        assert_eq!(p.keys_count(), 0);
        p.set_leaf(true);
        p.set_keys_count(3);
        assert!(p.is_leaf());
        assert_eq!(p.keys_count(), 3);
    }

    #[test]
    fn keys_and_cursors_round_trip() {
        let mut p = PageBuf::new(3, 4);
        p.set_key(0, b"abcd");
        p.set_key(1, b"efgh");
        p.set_cursor(0, 7);
        p.set_cursor(1, 9);
        assert_eq!(p.key(0), b"abcd");
        assert_eq!(p.key(1), b"efgh");
        assert_eq!(p.cursor(0), 7);
        assert_eq!(p.cursor(1), 9);
    }

    #[test]
    fn open_and_close_key_gap() {
        let mut p = PageBuf::new(4, 4);
        p.set_key(0, b"aaaa");
        p.set_key(1, b"cccc");
        p.set_keys_count(2);
        p.open_key_gap(1);
        p.set_key(1, b"bbbb");
        p.set_keys_count(3);
        assert_eq!(p.key(0), b"aaaa");
        assert_eq!(p.key(1), b"bbbb");
        assert_eq!(p.key(2), b"cccc");

        p.close_key_gap(0);
        p.set_keys_count(2);
        assert_eq!(p.key(0), b"bbbb");
        assert_eq!(p.key(1), b"cccc");
    }

    #[test]
    fn page_size_matches_formula() {
        assert_eq!(PageBuf::page_size(5, 8), 2 + 8 * 5 + 4 * 6);
    }

    #[test]
    fn from_bytes_rejects_wrong_length() {
        let bytes = vec![0u8; 10];
        assert!(PageBuf::from_bytes(bytes, 4, 8).is_err());
    }
}
