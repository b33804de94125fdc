//! Page header structure.
//!
//! The header occupies the first 20 bytes of every page. Fields are packed
//! with no padding and stored big-endian.

use crate::types::{PageId, PageType, SLOT_SIZE, PAGE_SIZE};

/// Size of the fixed page header
pub const HEADER_SIZE: usize = 20;

const SLOT_CNT: usize = 0;
const USED_PTR: usize = 2;
const FREE_SPACE: usize = 4;
const TYPE: usize = 6;
const PREV_PAGE: usize = 8;
const NEXT_PAGE: usize = 12;
const CUR_PAGE: usize = 16;

/// Page header structure
///
/// Layout (20 bytes):
/// ```text
/// Offset  Size  Description
/// 0       2     Number of slot table entries (live and empty)
/// 2       2     Offset of the first byte of the node area
/// 4       2     Bytes available for new nodes and new slots
/// 6       2     Page type tag
/// 8       4     Previous page in the chain (INVALID if none)
/// 12      4     Next page in the chain (INVALID if none)
/// 16      4     This page's own ID
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageHeader {
    pub slot_cnt: u16,
    pub used_ptr: u16,
    pub free_space: u16,
    pub page_type: u16,
    pub prev_page: PageId,
    pub next_page: PageId,
    pub cur_page: PageId,
}

impl PageHeader {
    /// Header of a freshly initialized, unlinked page
    pub fn new(page_id: PageId) -> Self {
        Self {
            slot_cnt: 0,
            used_ptr: PAGE_SIZE as u16,
            free_space: (PAGE_SIZE - HEADER_SIZE) as u16,
            page_type: PageType::Unknown as u16,
            prev_page: PageId::INVALID,
            next_page: PageId::INVALID,
            cur_page: page_id,
        }
    }

    /// Read a page header from bytes
    pub fn read(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < HEADER_SIZE {
            return None;
        }

        Some(Self {
            slot_cnt: read_u16(bytes, SLOT_CNT),
            used_ptr: read_u16(bytes, USED_PTR),
            free_space: read_u16(bytes, FREE_SPACE),
            page_type: read_u16(bytes, TYPE),
            prev_page: PageId::read_at(bytes, PREV_PAGE),
            next_page: PageId::read_at(bytes, NEXT_PAGE),
            cur_page: PageId::read_at(bytes, CUR_PAGE),
        })
    }

    /// Write this header to bytes
    pub fn write(&self, bytes: &mut [u8]) {
        write_u16(bytes, SLOT_CNT, self.slot_cnt);
        write_u16(bytes, USED_PTR, self.used_ptr);
        write_u16(bytes, FREE_SPACE, self.free_space);
        write_u16(bytes, TYPE, self.page_type);
        self.prev_page.write_at(bytes, PREV_PAGE);
        self.next_page.write_at(bytes, NEXT_PAGE);
        self.cur_page.write_at(bytes, CUR_PAGE);
    }

    /// Calculate the end of the slot table
    pub fn slot_table_end(&self) -> usize {
        HEADER_SIZE + self.slot_cnt as usize * SLOT_SIZE
    }
}

/// Byte offset of a slot table entry
pub(crate) fn slot_position(slot_no: usize) -> usize {
    HEADER_SIZE + slot_no * SLOT_SIZE
}

/// Read a (length, offset) slot table entry
pub(crate) fn read_slot(bytes: &[u8], slot_no: usize) -> (i16, u16) {
    let pos = slot_position(slot_no);
    (read_u16(bytes, pos) as i16, read_u16(bytes, pos + 2))
}

/// Write a (length, offset) slot table entry
pub(crate) fn write_slot(bytes: &mut [u8], slot_no: usize, length: i16, offset: u16) {
    let pos = slot_position(slot_no);
    write_u16(bytes, pos, length as u16);
    write_u16(bytes, pos + 2, offset);
}

fn read_u16(bytes: &[u8], offset: usize) -> u16 {
    u16::from_be_bytes([bytes[offset], bytes[offset + 1]])
}

fn write_u16(bytes: &mut [u8], offset: usize, value: u16) {
    bytes[offset..offset + 2].copy_from_slice(&value.to_be_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EMPTY_SLOT;

    #[test]
    fn test_header_roundtrip() {
        let header = PageHeader {
            slot_cnt: 5,
            used_ptr: 700,
            free_space: 280,
            page_type: PageType::Directory as u16,
            prev_page: PageId::new(3),
            next_page: PageId::INVALID,
            cur_page: PageId::new(9),
        };

        let mut bytes = [0u8; HEADER_SIZE];
        header.write(&mut bytes);

        assert_eq!(PageHeader::read(&bytes), Some(header));
    }

    #[test]
    fn test_field_offsets() {
        let mut header = PageHeader::new(PageId::new(0x0102_0304));
        header.slot_cnt = 0x0A0B;
        header.prev_page = PageId::new(0x1122_3344);

        let mut bytes = [0u8; HEADER_SIZE];
        header.write(&mut bytes);

        assert_eq!(&bytes[0..2], &[0x0A, 0x0B]);
        assert_eq!(&bytes[2..4], &(PAGE_SIZE as u16).to_be_bytes());
        assert_eq!(&bytes[8..12], &[0x11, 0x22, 0x33, 0x44]);
        assert_eq!(&bytes[12..16], &[0xFF; 4]);
        assert_eq!(&bytes[16..20], &[0x01, 0x02, 0x03, 0x04]);
    }

    #[test]
    fn test_free_space() {
        let header = PageHeader::new(PageId::new(1));
        assert_eq!(header.free_space as usize, PAGE_SIZE - HEADER_SIZE);
        assert_eq!(header.slot_table_end(), HEADER_SIZE);
    }

    #[test]
    fn test_empty_slot_encoding() {
        let mut bytes = [0u8; HEADER_SIZE + 2 * SLOT_SIZE];
        write_slot(&mut bytes, 1, EMPTY_SLOT, 0);
        assert_eq!(&bytes[24..26], &[0xFF, 0xFF]);
        assert_eq!(read_slot(&bytes, 1), (EMPTY_SLOT, 0));
    }

    #[test]
    fn test_short_buffer() {
        assert!(PageHeader::read(&[0u8; 10]).is_none());
    }
}
