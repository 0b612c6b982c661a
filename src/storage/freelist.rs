//! In-file free-page stack.
//!
//! Lives immediately after the page area, at an offset that moves forward by
//! one page size every time the page area grows. The stack is a LIFO: a
//! 4-byte counter followed by that many 4-byte page numbers, the last one
//! pushed being the first one popped.
//!
//! ```text
//! offset F       size 4            counter: number of free pages on the stack
//! offset F + 4   size counter * 4  free page numbers, oldest first
//! ```
//!
//! `alloc_page` in [`super::paged_file::PagedFile`] only appends a fresh page
//! (growing the page area, and so moving this area) when the stack is empty,
//! so the counter at the old offset is always 0 right before a relocation —
//! there is never a non-empty stack to physically move, only a fresh
//! zero-counter to write at the new offset.

use std::io::{Read, Seek, SeekFrom, Write};

use crate::error::Result;
use crate::storage::header::FIRST_PAGE_OFS;

pub fn free_area_offset(last_page_num: u32, page_size: usize) -> u64 {
    FIRST_PAGE_OFS + last_page_num as u64 * page_size as u64
}

pub fn read_counter<F: Read + Seek>(file: &mut F, ofs: u64) -> Result<u32> {
    file.seek(SeekFrom::Start(ofs))?;
    let mut buf = [0u8; 4];
    match file.read_exact(&mut buf) {
        Ok(()) => Ok(u32::from_le_bytes(buf)),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Ok(0),
        Err(e) => Err(e.into()),
    }
}

pub fn write_counter<F: Write + Seek>(file: &mut F, ofs: u64, counter: u32) -> Result<()> {
    file.seek(SeekFrom::Start(ofs))?;
    file.write_all(&counter.to_le_bytes())?;
    Ok(())
}

/// Pushes `page_num` onto the stack at `ofs`, bumping and rewriting the
/// counter.
pub fn push<F: Read + Write + Seek>(file: &mut F, ofs: u64, page_num: u32) -> Result<()> {
    let counter = read_counter(file, ofs)?;
    file.seek(SeekFrom::Start(ofs + 4 + counter as u64 * 4))?;
    file.write_all(&page_num.to_le_bytes())?;
    write_counter(file, ofs, counter + 1)?;
    Ok(())
}

/// Pops the most-recently-pushed page number, if any, rewriting the counter.
pub fn pop<F: Read + Write + Seek>(file: &mut F, ofs: u64) -> Result<Option<u32>> {
    let counter = read_counter(file, ofs)?;
    if counter == 0 {
        return Ok(None);
    }
    file.seek(SeekFrom::Start(ofs + 4 + (counter as u64 - 1) * 4))?;
    let mut buf = [0u8; 4];
    file.read_exact(&mut buf)?;
    write_counter(file, ofs, counter - 1)?;
    Ok(Some(u32::from_le_bytes(buf)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn push_then_pop_is_lifo() {
        let mut buf = Cursor::new(vec![0u8; 64]);
        push(&mut buf, 0, 5).unwrap();
        push(&mut buf, 0, 9).unwrap();
        assert_eq!(pop(&mut buf, 0).unwrap(), Some(9));
        assert_eq!(pop(&mut buf, 0).unwrap(), Some(5));
        assert_eq!(pop(&mut buf, 0).unwrap(), None);
    }

    #[test]
    fn free_area_offset_tracks_last_page_num() {
        assert_eq!(free_area_offset(0, 100), FIRST_PAGE_OFS);
        assert_eq!(free_area_offset(3, 100), FIRST_PAGE_OFS + 300);
    }
}
