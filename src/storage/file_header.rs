//! Store file header.
//!
//! The first page (page 0) of the store file contains metadata about the
//! file and the catalog of heap files stored in it.

use crate::error::{Result, StorageError};
use crate::types::{PageId, PAGE_SIZE};
use std::collections::BTreeMap;

/// Magic bytes to identify a valid store file
pub const MAGIC: &[u8; 16] = b"NodeHeapStore01\0";

/// File header size (uses first page)
pub const FILE_HEADER_SIZE: usize = PAGE_SIZE;

/// Offset of the first catalog entry
const CATALOG_START: usize = 30;

/// The checksum occupies the last 4 bytes of the header page
const CHECKSUM_OFFSET: usize = FILE_HEADER_SIZE - 4;

/// Longest heap file name the catalog can hold
pub const MAX_FILE_NAME: usize = u8::MAX as usize;

/// Store file header
///
/// Layout:
/// ```text
/// Offset  Size  Description
/// 0       16    Magic string "NodeHeapStore01\0"
/// 16      4     Page size (currently always 1024)
/// 20      4     Total page count
/// 24      4     Free page count
/// 28      2     Catalog entry count
/// 30      ...   Catalog entries: name_len (1), name, first directory page (4)
/// 1020    4     Checksum of bytes 0..1020 (CRC32)
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileHeader {
    /// Page size in bytes
    pub page_size: u32,
    /// Total number of pages in the file (including header page)
    pub page_count: u32,
    /// Number of free pages
    pub free_page_count: u32,
    /// Heap file name -> first directory page
    pub catalog: BTreeMap<String, PageId>,
}

impl FileHeader {
    /// Create a new file header for an empty store
    pub fn new() -> Self {
        Self {
            page_size: PAGE_SIZE as u32,
            page_count: 1, // Just the header page initially
            free_page_count: 0,
            catalog: BTreeMap::new(),
        }
    }

    /// Read a file header from bytes
    pub fn read(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < FILE_HEADER_SIZE {
            return Err(StorageError::invalid_db("header too short"));
        }

        // Check magic
        if &bytes[0..16] != MAGIC {
            return Err(StorageError::invalid_db("invalid magic bytes"));
        }

        // Verify checksum
        let stored_checksum = read_u32(bytes, CHECKSUM_OFFSET);
        let computed_checksum = crc32fast::hash(&bytes[..CHECKSUM_OFFSET]);
        if stored_checksum != computed_checksum {
            return Err(StorageError::corruption("header checksum mismatch"));
        }

        let page_size = read_u32(bytes, 16);
        if page_size != PAGE_SIZE as u32 {
            return Err(StorageError::invalid_db(format!(
                "unsupported page size: {} (expected {})",
                page_size, PAGE_SIZE
            )));
        }

        let page_count = read_u32(bytes, 20);
        let free_page_count = read_u32(bytes, 24);
        let entry_count = u16::from_be_bytes([bytes[28], bytes[29]]);

        let mut catalog = BTreeMap::new();
        let mut offset = CATALOG_START;
        for _ in 0..entry_count {
            let name_len = bytes[offset] as usize;
            offset += 1;
            if offset + name_len + 4 > CHECKSUM_OFFSET {
                return Err(StorageError::corruption("catalog entry overruns header page"));
            }
            let name = std::str::from_utf8(&bytes[offset..offset + name_len])
                .map_err(|_| StorageError::corruption("catalog name is not UTF-8"))?
                .to_string();
            offset += name_len;
            let root = PageId::read_at(bytes, offset);
            offset += 4;
            catalog.insert(name, root);
        }

        Ok(Self {
            page_size,
            page_count,
            free_page_count,
            catalog,
        })
    }

    /// Write this header to bytes
    pub fn write(&self, bytes: &mut [u8]) {
        // Clear the page first
        bytes[..FILE_HEADER_SIZE].fill(0);

        // Magic
        bytes[0..16].copy_from_slice(MAGIC);

        // Fields
        bytes[16..20].copy_from_slice(&self.page_size.to_be_bytes());
        bytes[20..24].copy_from_slice(&self.page_count.to_be_bytes());
        bytes[24..28].copy_from_slice(&self.free_page_count.to_be_bytes());
        bytes[28..30].copy_from_slice(&(self.catalog.len() as u16).to_be_bytes());

        let mut offset = CATALOG_START;
        for (name, root) in &self.catalog {
            bytes[offset] = name.len() as u8;
            offset += 1;
            bytes[offset..offset + name.len()].copy_from_slice(name.as_bytes());
            offset += name.len();
            root.write_at(bytes, offset);
            offset += 4;
        }

        // Checksum
        let checksum = crc32fast::hash(&bytes[..CHECKSUM_OFFSET]);
        bytes[CHECKSUM_OFFSET..FILE_HEADER_SIZE].copy_from_slice(&checksum.to_be_bytes());
    }

    /// Allocate a new page ID
    pub fn allocate_page(&mut self) -> PageId {
        let page_id = PageId::new(self.page_count);
        self.page_count += 1;
        page_id
    }

    /// Bytes the catalog occupies when encoded
    fn catalog_size(&self) -> usize {
        self.catalog.keys().map(|name| 1 + name.len() + 4).sum()
    }

    /// Look up a heap file's first directory page
    pub fn lookup(&self, name: &str) -> Option<PageId> {
        self.catalog.get(name).copied()
    }

    /// Add a catalog entry
    pub fn register(&mut self, name: &str, root: PageId) -> Result<()> {
        if name.is_empty() || name.len() > MAX_FILE_NAME {
            return Err(StorageError::invalid_operation(format!(
                "file name must be 1..={} bytes, got {}",
                MAX_FILE_NAME,
                name.len()
            )));
        }
        if self.catalog.contains_key(name) {
            return Err(StorageError::invalid_operation(format!(
                "file {:?} already exists",
                name
            )));
        }
        if CATALOG_START + self.catalog_size() + 1 + name.len() + 4 > CHECKSUM_OFFSET {
            return Err(StorageError::CatalogFull(name.to_string()));
        }
        self.catalog.insert(name.to_string(), root);
        Ok(())
    }

    /// Remove a catalog entry
    pub fn unregister(&mut self, name: &str) -> Result<()> {
        self.catalog
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| StorageError::invalid_operation(format!("no file named {:?}", name)))
    }
}

impl Default for FileHeader {
    fn default() -> Self {
        Self::new()
    }
}

fn read_u32(bytes: &[u8], offset: usize) -> u32 {
    u32::from_be_bytes([
        bytes[offset],
        bytes[offset + 1],
        bytes[offset + 2],
        bytes[offset + 3],
    ])
}
