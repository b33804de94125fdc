//! Directory entries describing one data page each.

use crate::error::{Result, StorageError};
use crate::page::SlottedPage;
use crate::types::PageId;
use serde::Serialize;

/// Directory-page record: data page ID, live node count, available space
///
/// Wire layout, big-endian:
/// ```text
/// Offset  Size  Field
/// 0       4     page_id
/// 4       4     node_count
/// 8       4     avail_space
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DataPageInfo {
    pub page_id: PageId,
    pub node_count: u32,
    pub avail_space: u32,
}

impl DataPageInfo {
    /// Encoded size in bytes
    pub const SIZE: usize = 12;

    /// Describe a data page as it currently stands
    pub fn describe(page: &SlottedPage) -> Self {
        Self {
            page_id: page.page_id(),
            node_count: page.live_count() as u32,
            avail_space: page.available_space() as u32,
        }
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != Self::SIZE {
            return Err(StorageError::corruption(format!(
                "directory entry is {} bytes, expected {}",
                bytes.len(),
                Self::SIZE
            )));
        }
        Ok(Self {
            page_id: PageId::read_at(bytes, 0),
            node_count: u32::from_be_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]),
            avail_space: u32::from_be_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]),
        })
    }

    /// Encode into an existing directory node
    pub fn write_to(&self, bytes: &mut [u8]) -> Result<()> {
        if bytes.len() != Self::SIZE {
            return Err(StorageError::corruption(format!(
                "directory entry is {} bytes, expected {}",
                bytes.len(),
                Self::SIZE
            )));
        }
        self.page_id.write_at(bytes, 0);
        bytes[4..8].copy_from_slice(&self.node_count.to_be_bytes());
        bytes[8..12].copy_from_slice(&self.avail_space.to_be_bytes());
        Ok(())
    }

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut bytes = [0u8; Self::SIZE];
        self.page_id.write_at(&mut bytes, 0);
        bytes[4..8].copy_from_slice(&self.node_count.to_be_bytes());
        bytes[8..12].copy_from_slice(&self.avail_space.to_be_bytes());
        bytes
    }
}
