//! Page identifier type.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique identifier for a page in the store file.
///
/// Page IDs are 0-indexed. Page 0 is reserved for the file header, so heap
/// file pages start from page 1.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct PageId(pub u32);

impl PageId {
    /// Invalid page ID, used to terminate page chains
    pub const INVALID: PageId = PageId(u32::MAX);

    /// Page ID for the file header (page 0)
    pub const HEADER: PageId = PageId(0);

    /// Create a new page ID
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Get the raw page ID value
    pub const fn value(self) -> u32 {
        self.0
    }

    /// Check if this is a valid page ID
    pub const fn is_valid(self) -> bool {
        self.0 != u32::MAX
    }

    /// Calculate the byte offset of this page in the file
    pub const fn file_offset(self, page_size: usize) -> u64 {
        self.0 as u64 * page_size as u64
    }

    /// Read a big-endian page ID at `offset`
    pub fn read_at(bytes: &[u8], offset: usize) -> Self {
        Self(u32::from_be_bytes([
            bytes[offset],
            bytes[offset + 1],
            bytes[offset + 2],
            bytes[offset + 3],
        ]))
    }

    /// Write this page ID big-endian at `offset`
    pub fn write_at(self, bytes: &mut [u8], offset: usize) {
        bytes[offset..offset + 4].copy_from_slice(&self.0.to_be_bytes());
    }
}

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == Self::INVALID {
            write!(f, "INVALID")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

impl From<u32> for PageId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

impl From<PageId> for u32 {
    fn from(id: PageId) -> Self {
        id.0
    }
}
