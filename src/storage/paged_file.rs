//! The paged file: owns the OS file handle and turns page numbers into byte
//! offsets, the header into typed fields, and the trailing free-page area
//! into an allocator. Knows nothing about keys, comparators or tree shape —
//! that is the tree core's job.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use tracing::{debug, trace};

use crate::error::{Result, TreeError};
use crate::page::PageBuf;
use crate::storage::freelist;
use crate::storage::header::{FileHeader, FIRST_PAGE_OFS, HEADER_SIZE};

/// 0 is reserved to mean "no page" everywhere a cursor or root pointer is
/// stored; real page numbers start at 1.
pub const NULL_PAGE: u32 = 0;

pub struct PagedFile {
    file: File,
    header: FileHeader,
    max_keys: usize,
    page_size: usize,
    disk_operations_count: u64,
}

impl PagedFile {
    /// Creates a brand-new, empty tree file. Fails if `path` already exists.
    pub fn create(path: &Path, order: u16, rec_size: u16, max_keys: usize) -> Result<Self> {
        if rec_size == 0 {
            return Err(TreeError::argument("rec_size must be non-zero"));
        }
        if order < 2 {
            return Err(TreeError::argument("order must be at least 2"));
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(path)?;
        let header = FileHeader::new(order, rec_size);
        let page_size = PageBuf::page_size(max_keys, rec_size as usize);
        let mut pf = Self {
            file,
            header,
            max_keys,
            page_size,
            disk_operations_count: 0,
        };
        pf.write_header()?;
        // Fresh file: free area sits right after the (empty) page array, at
        // the header boundary, with a zero counter.
        freelist::write_counter(&mut pf.file, FIRST_PAGE_OFS, 0)?;
        pf.file.flush()?;
        debug!("created tree file {:?} order={} rec_size={}", path, order, rec_size);
        Ok(pf)
    }

    /// Reads just the header of an existing tree file, without knowing (or
    /// needing) the per-page key capacity a full `open` requires. Lets a
    /// caller learn `order` before it can compute `max_keys` from the tree
    /// variant it intends to open the file as.
    pub fn peek_header(path: &Path) -> Result<FileHeader> {
        let mut file = OpenOptions::new().read(true).open(path)?;
        let mut header_bytes = [0u8; HEADER_SIZE];
        file.seek(SeekFrom::Start(0))?;
        file.read_exact(&mut header_bytes)?;
        FileHeader::read(&header_bytes)
    }

    /// Opens an existing tree file. `max_keys` must be recomputed by the
    /// caller from the header's `order`/`rec_size` and the tree variant in
    /// use, since it is not itself stored on disk.
    pub fn open(path: &Path, max_keys: usize) -> Result<Self> {
        let mut file = OpenOptions::new().read(true).write(true).open(path)?;
        let mut header_bytes = [0u8; HEADER_SIZE];
        file.seek(SeekFrom::Start(0))?;
        file.read_exact(&mut header_bytes)?;
        let header = FileHeader::read(&header_bytes)?;
        let page_size = PageBuf::page_size(max_keys, header.rec_size as usize);
        debug!("opened tree file {:?} order={} rec_size={} last_page_num={} root_page_num={}",
            path, header.order, header.rec_size, header.last_page_num, header.root_page_num);
        Ok(Self {
            file,
            header,
            max_keys,
            page_size,
            disk_operations_count: 0,
        })
    }

    pub fn order(&self) -> u16 {
        self.header.order
    }

    pub fn rec_size(&self) -> u16 {
        self.header.rec_size
    }

    pub fn max_keys(&self) -> usize {
        self.max_keys
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn last_page_num(&self) -> u32 {
        self.header.last_page_num
    }

    pub fn root_page_num(&self) -> u32 {
        self.header.root_page_num
    }

    pub fn disk_operations_count(&self) -> u64 {
        self.disk_operations_count
    }

    pub fn reset_disk_operations_count(&mut self) {
        self.disk_operations_count = 0;
    }

    pub fn set_root_page_num(&mut self, page_num: u32) -> Result<()> {
        self.header.root_page_num = page_num;
        self.write_header()
    }

    fn write_header(&mut self) -> Result<()> {
        let mut bytes = [0u8; HEADER_SIZE];
        self.header.write(&mut bytes);
        self.file.seek(SeekFrom::Start(0))?;
        self.file.write_all(&bytes)?;
        Ok(())
    }

    fn page_offset(&self, page_num: u32) -> Result<u64> {
        if page_num == NULL_PAGE || page_num > self.header.last_page_num {
            return Err(TreeError::corruption(format!(
                "page number {page_num} out of range (last_page_num={})",
                self.header.last_page_num
            )));
        }
        Ok(FIRST_PAGE_OFS + (page_num as u64 - 1) * self.page_size as u64)
    }

    pub fn read_page(&mut self, page_num: u32) -> Result<PageBuf> {
        let ofs = self.page_offset(page_num)?;
        let mut buf = vec![0u8; self.page_size];
        self.file.seek(SeekFrom::Start(ofs))?;
        self.file.read_exact(&mut buf)?;
        self.disk_operations_count += 1;
        trace!("read page {page_num}");
        PageBuf::from_bytes(buf, self.max_keys, self.header.rec_size as usize)
    }

    pub fn write_page(&mut self, page_num: u32, page: &PageBuf) -> Result<()> {
        let ofs = if page_num == self.header.last_page_num + 1 {
            // Allowed only while allocating a brand-new page, one past the
            // current page area.
            FIRST_PAGE_OFS + (page_num as u64 - 1) * self.page_size as u64
        } else {
            self.page_offset(page_num)?
        };
        self.file.seek(SeekFrom::Start(ofs))?;
        self.file.write_all(page.as_bytes())?;
        self.disk_operations_count += 1;
        trace!("wrote page {page_num}");
        Ok(())
    }

    /// Allocates a page: reuses a freed page if the free stack is non-empty,
    /// otherwise appends a fresh one to the end of the page area.
    pub fn alloc_page(&mut self) -> Result<(u32, PageBuf)> {
        let area_ofs = freelist::free_area_offset(self.header.last_page_num, self.page_size);
        if let Some(num) = freelist::pop(&mut self.file, area_ofs)? {
            self.disk_operations_count += 1;
            let page = PageBuf::new(self.max_keys, self.header.rec_size as usize);
            self.write_page(num, &page)?;
            return Ok((num, page));
        }
        let num = self.header.last_page_num + 1;
        let page = PageBuf::new(self.max_keys, self.header.rec_size as usize);
        self.write_page(num, &page)?;
        self.header.last_page_num = num;
        self.write_header()?;
        // The free stack's counter was 0 right before this append (else the
        // pop branch above would have fired), so relocating it is just
        // writing a fresh zero at the new, now-correct offset.
        let new_area_ofs = freelist::free_area_offset(self.header.last_page_num, self.page_size);
        freelist::write_counter(&mut self.file, new_area_ofs, 0)?;
        trace!("allocated new page {num}");
        Ok((num, page))
    }

    /// Returns `page_num` to the free-page stack for reuse.
    pub fn free_page(&mut self, page_num: u32) -> Result<()> {
        if page_num == NULL_PAGE || page_num > self.header.last_page_num {
            return Err(TreeError::misuse(format!(
                "cannot free page {page_num}: out of range (last_page_num={})",
                self.header.last_page_num
            )));
        }
        let area_ofs = freelist::free_area_offset(self.header.last_page_num, self.page_size);
        freelist::push(&mut self.file, area_ofs, page_num)?;
        self.disk_operations_count += 1;
        trace!("freed page {page_num}");
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.file.flush()?;
        Ok(())
    }

    /// Returns every page number currently sitting on the free-page stack.
    /// Diagnostic only; the tree core never needs the full stack, only
    /// `alloc_page`/`free_page`'s top-of-stack access.
    pub fn free_page_numbers(&mut self) -> Result<Vec<u32>> {
        let area_ofs = freelist::free_area_offset(self.header.last_page_num, self.page_size);
        let counter = freelist::read_counter(&mut self.file, area_ofs)?;
        let mut out = Vec::with_capacity(counter as usize);
        for i in 0..counter {
            self.file.seek(SeekFrom::Start(area_ofs + 4 + i as u64 * 4))?;
            let mut buf = [0u8; 4];
            self.file.read_exact(&mut buf)?;
            out.push(u32::from_le_bytes(buf));
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn create_then_open_round_trips_header() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("t.bt");
        {
            let mut pf = PagedFile::create(&path, 4, 8, 7).unwrap();
            pf.set_root_page_num(0).unwrap();
            pf.flush().unwrap();
        }
        let pf = PagedFile::open(&path, 7).unwrap();
        assert_eq!(pf.order(), 4);
        assert_eq!(pf.rec_size(), 8);
        assert_eq!(pf.last_page_num(), 0);
        assert_eq!(pf.root_page_num(), 0);
    }

    #[test]
    fn alloc_write_read_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("t.bt");
        let mut pf = PagedFile::create(&path, 4, 4, 7).unwrap();
        let (num, mut page) = pf.alloc_page().unwrap();
        assert_eq!(num, 1);
        page.set_leaf(true);
        page.set_key(0, b"abcd");
        page.set_keys_count(1);
        pf.write_page(num, &page).unwrap();
        let read_back = pf.read_page(num).unwrap();
        assert!(read_back.is_leaf());
        assert_eq!(read_back.key(0), b"abcd");
    }

    #[test]
    fn free_then_alloc_reuses_page() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("t.bt");
        let mut pf = PagedFile::create(&path, 4, 4, 7).unwrap();
        let (num1, _) = pf.alloc_page().unwrap();
        let (num2, _) = pf.alloc_page().unwrap();
        pf.free_page(num1).unwrap();
        let (num3, _) = pf.alloc_page().unwrap();
        assert_eq!(num3, num1);
        assert_eq!(pf.last_page_num(), 2);
        let _ = num2;
    }

    #[test]
    fn free_page_rejects_out_of_range_page_num() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("t.bt");
        let mut pf = PagedFile::create(&path, 4, 4, 7).unwrap();
        let (num, _) = pf.alloc_page().unwrap();
        assert!(pf.free_page(num + 1).is_err());
        assert!(pf.free_page(NULL_PAGE).is_err());
        assert!(pf.free_page(num).is_ok());
    }
}
