//! Common types used throughout the storage engine.

mod nid;
mod page_id;

pub use nid::Nid;
pub use page_id::PageId;

/// Page size in bytes (1KB)
pub const PAGE_SIZE: usize = 1024;

/// Size of one slot table entry: length (2 bytes) + offset (2 bytes)
pub const SLOT_SIZE: usize = 4;

/// Slot length marking a deleted, reusable slot
pub const EMPTY_SLOT: i16 = -1;

/// Largest node that fits on a freshly initialized page
pub const MAX_NODE_SIZE: usize = PAGE_SIZE - crate::page::HEADER_SIZE - SLOT_SIZE;

/// Page types stored in the header `type` field
///
/// The engine itself treats the tag as opaque; heap files use it to tell
/// directory pages from data pages in dumps.
#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageType {
    /// Not initialized by a heap file
    Unknown = 0,
    /// Directory page holding `DataPageInfo` nodes
    Directory = 1,
    /// Data page holding client nodes
    Data = 2,
}

impl PageType {
    /// Convert from the raw header value
    pub fn from_raw(raw: u16) -> Self {
        match raw {
            1 => Self::Directory,
            2 => Self::Data,
            _ => Self::Unknown,
        }
    }

    /// Short name used in dumps
    pub fn name(self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Directory => "directory",
            Self::Data => "data",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_type_conversions() {
        assert_eq!(PageType::from_raw(1), PageType::Directory);
        assert_eq!(PageType::from_raw(2), PageType::Data);
        assert_eq!(PageType::from_raw(0xFFFF), PageType::Unknown);
        assert_eq!(PageType::Data as u16, 2);
    }

    #[test]
    fn test_max_node_size() {
        assert_eq!(MAX_NODE_SIZE, 1000);
    }
}
