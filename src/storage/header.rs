//! File header: the first 16 bytes of a tree file.
//!
//! ```text
//! offset 0   size 4   sign           0x19979AAA, identifies the file format
//! offset 4   size 2   order          the tree's order parameter
//! offset 6   size 2   rec_size       bytes per fixed-size key record
//! offset 8   size 4   last_page_num  number of pages currently in the page area
//! offset 12  size 4   root_page_num  page number of the root, 0 if the tree is empty
//! ```
//!
//! No checksum field: the format predates per-header integrity hashing and a
//! mismatched `sign` is already a strong corruption signal on its own.

use crate::error::{Result, TreeError};

pub const VALID_SIGN: u32 = 0x19979AAA;
pub const HEADER_SIZE: usize = 16;
pub const FIRST_PAGE_OFS: u64 = HEADER_SIZE as u64;

#[derive(Debug, Clone, Copy)]
pub struct FileHeader {
    pub sign: u32,
    pub order: u16,
    pub rec_size: u16,
    pub last_page_num: u32,
    pub root_page_num: u32,
}

impl FileHeader {
    pub fn new(order: u16, rec_size: u16) -> Self {
        Self {
            sign: VALID_SIGN,
            order,
            rec_size,
            last_page_num: 0,
            root_page_num: 0,
        }
    }

    pub fn read(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(TreeError::corruption("file too short to contain a header"));
        }
        let sign = u32::from_le_bytes(bytes[0..4].try_into().unwrap());
        if sign != VALID_SIGN {
            return Err(TreeError::corruption(format!(
                "bad file signature: 0x{sign:08X}"
            )));
        }
        let order = u16::from_le_bytes(bytes[4..6].try_into().unwrap());
        if order < 1 {
            return Err(TreeError::corruption("header order must be at least 1"));
        }
        let rec_size = u16::from_le_bytes(bytes[6..8].try_into().unwrap());
        if rec_size == 0 {
            return Err(TreeError::corruption("header rec_size must be non-zero"));
        }
        let last_page_num = u32::from_le_bytes(bytes[8..12].try_into().unwrap());
        let root_page_num = u32::from_le_bytes(bytes[12..16].try_into().unwrap());
        Ok(Self {
            sign,
            order,
            rec_size,
            last_page_num,
            root_page_num,
        })
    }

    pub fn write(&self, bytes: &mut [u8]) {
        bytes[0..4].copy_from_slice(&self.sign.to_le_bytes());
        bytes[4..6].copy_from_slice(&self.order.to_le_bytes());
        bytes[6..8].copy_from_slice(&self.rec_size.to_le_bytes());
        bytes[8..12].copy_from_slice(&self.last_page_num.to_le_bytes());
        bytes[12..16].copy_from_slice(&self.root_page_num.to_le_bytes());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_round_trips() {
        let h = FileHeader {
            sign: VALID_SIGN,
            order: 4,
            rec_size: 8,
            last_page_num: 12,
            root_page_num: 3,
        };
        let mut buf = [0u8; HEADER_SIZE];
        h.write(&mut buf);
        let h2 = FileHeader::read(&buf).unwrap();
        assert_eq!(h2.order, 4);
        assert_eq!(h2.rec_size, 8);
        assert_eq!(h2.last_page_num, 12);
        assert_eq!(h2.root_page_num, 3);
    }

    #[test]
    fn rejects_bad_sign() {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0..4].copy_from_slice(&0u32.to_le_bytes());
        assert!(FileHeader::read(&buf).is_err());
    }

    #[test]
    fn rejects_zero_order() {
        let h = FileHeader::new(0, 8);
        let mut buf = [0u8; HEADER_SIZE];
        h.write(&mut buf);
        assert!(FileHeader::read(&buf).is_err());
    }

    #[test]
    fn rejects_zero_rec_size() {
        let h = FileHeader::new(4, 0);
        let mut buf = [0u8; HEADER_SIZE];
        h.write(&mut buf);
        assert!(FileHeader::read(&buf).is_err());
    }
}
