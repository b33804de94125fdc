//! Disk manager implementation.
//!
//! The disk manager is responsible for reading and writing pages to the
//! store file and for keeping the file catalog in the header page. It sits
//! behind a trait so the rest of the system can run over the in-memory
//! implementation in tests.

use crate::error::{Result, StorageError};
use crate::page::PageBuf;
use crate::storage::{FileCatalog, FileHeader, FreeList};
use crate::types::{PageId, PAGE_SIZE};
use parking_lot::RwLock;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;
use tracing::{debug, trace};

/// Trait for disk I/O operations
pub trait DiskManager: FileCatalog {
    /// Read a page from disk
    fn read_page(&self, page_id: PageId) -> Result<PageBuf>;

    /// Write a page to disk
    fn write_page(&self, page_id: PageId, data: &[u8]) -> Result<()>;

    /// Allocate a new page
    fn allocate_page(&self) -> Result<PageId>;

    /// Deallocate a page (add to free list)
    fn deallocate_page(&self, page_id: PageId) -> Result<()>;

    /// Sync all data to disk
    fn sync(&self) -> Result<()>;

    /// Get a copy of the file header
    fn header(&self) -> FileHeader;
}

/// Reject the header page and pages past the end of the file
pub(crate) fn check_data_page(header: &FileHeader, page_id: PageId) -> Result<()> {
    if page_id == PageId::HEADER {
        return Err(StorageError::invalid_operation(
            "cannot access header page directly",
        ));
    }
    if page_id.value() >= header.page_count {
        return Err(StorageError::PageNotFound(page_id));
    }
    Ok(())
}

/// File-based disk manager implementation
pub struct DiskManagerImpl {
    /// The store file
    file: RwLock<File>,
    /// The file header (cached)
    header: RwLock<FileHeader>,
    /// Free list for page reuse
    free_list: RwLock<FreeList>,
    /// Whether to sync on each write
    sync_on_write: bool,
}

impl DiskManagerImpl {
    /// Open or create a store file
    pub fn open(path: &Path, sync_on_write: bool) -> Result<Self> {
        let exists = path.exists();

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        let header = if exists && file.metadata()?.len() >= PAGE_SIZE as u64 {
            // Read existing header
            let mut file_ref = &file;
            let mut buf = vec![0u8; PAGE_SIZE];
            file_ref.read_exact(&mut buf)?;
            let mut header = FileHeader::read(&buf)?;
            // The free list is not persisted.
            header.free_page_count = 0;
            debug!(path = %path.display(), pages = header.page_count, files = header.catalog.len(), "opened store file");
            header
        } else {
            // Create new store
            let header = FileHeader::new();
            let mut buf = vec![0u8; PAGE_SIZE];
            header.write(&mut buf);

            let mut file_ref = &file;
            file_ref.seek(SeekFrom::Start(0))?;
            file_ref.write_all(&buf)?;
            file_ref.sync_all()?;

            debug!(path = %path.display(), "created store file");
            header
        };

        Ok(Self {
            file: RwLock::new(file),
            header: RwLock::new(header),
            free_list: RwLock::new(FreeList::new()),
            sync_on_write,
        })
    }

    /// Flush the header to disk
    fn flush_header(&self) -> Result<()> {
        let header = self.header.read();
        let mut buf = vec![0u8; PAGE_SIZE];
        header.write(&mut buf);

        let mut file = self.file.write();
        file.seek(SeekFrom::Start(0))?;
        file.write_all(&buf)?;

        if self.sync_on_write {
            file.sync_data()?;
        }

        Ok(())
    }
}

impl FileCatalog for DiskManagerImpl {
    fn lookup_file_root(&self, name: &str) -> Result<Option<PageId>> {
        Ok(self.header.read().lookup(name))
    }

    fn register_file_root(&self, name: &str, root: PageId) -> Result<()> {
        self.header.write().register(name, root)?;
        self.flush_header()
    }

    fn unregister_file_root(&self, name: &str) -> Result<()> {
        self.header.write().unregister(name)?;
        self.flush_header()
    }

    fn file_names(&self) -> Vec<String> {
        self.header.read().catalog.keys().cloned().collect()
    }
}

impl DiskManager for DiskManagerImpl {
    fn read_page(&self, page_id: PageId) -> Result<PageBuf> {
        check_data_page(&self.header.read(), page_id)?;

        let offset = page_id.file_offset(PAGE_SIZE);
        let mut buf = vec![0u8; PAGE_SIZE];

        let mut file = self.file.write();
        file.seek(SeekFrom::Start(offset))?;
        file.read_exact(&mut buf)?;

        Ok(PageBuf::from_bytes(&buf))
    }

    fn write_page(&self, page_id: PageId, data: &[u8]) -> Result<()> {
        check_data_page(&self.header.read(), page_id)?;

        if data.len() != PAGE_SIZE {
            return Err(StorageError::invalid_operation(format!(
                "page data must be {} bytes, got {}",
                PAGE_SIZE,
                data.len()
            )));
        }

        let offset = page_id.file_offset(PAGE_SIZE);

        let mut file = self.file.write();
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(data)?;

        if self.sync_on_write {
            file.sync_data()?;
        }

        Ok(())
    }

    fn allocate_page(&self) -> Result<PageId> {
        // First try the free list
        {
            let mut free_list = self.free_list.write();
            if let Some(page_id) = free_list.pop() {
                self.header.write().free_page_count = free_list.len() as u32;
                trace!(%page_id, "reused free page");
                return Ok(page_id);
            }
        }

        // Allocate a new page
        let page_id = {
            let mut header = self.header.write();
            header.allocate_page()
        };

        // Extend the file
        let offset = page_id.file_offset(PAGE_SIZE);
        let zeros = vec![0u8; PAGE_SIZE];

        let mut file = self.file.write();
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(&zeros)?;

        // Update header on disk
        drop(file);
        self.flush_header()?;

        trace!(%page_id, "extended store file");
        Ok(page_id)
    }

    fn deallocate_page(&self, page_id: PageId) -> Result<()> {
        check_data_page(&self.header.read(), page_id)?;

        let mut free_list = self.free_list.write();
        if !free_list.push(page_id) {
            return Err(StorageError::invalid_operation(format!(
                "page {} is already free",
                page_id
            )));
        }

        self.header.write().free_page_count = free_list.len() as u32;
        drop(free_list);

        self.flush_header()
    }

    fn sync(&self) -> Result<()> {
        self.flush_header()?;
        let file = self.file.write();
        file.sync_all()?;
        Ok(())
    }

    fn header(&self) -> FileHeader {
        self.header.read().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_create_new_store() -> Result<()> {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.db");

        let dm = DiskManagerImpl::open(&path, false)?;
        let header = dm.header();

        assert_eq!(header.page_count, 1);
        assert!(header.catalog.is_empty());
        assert_eq!(header.page_size, PAGE_SIZE as u32);

        Ok(())
    }

    #[test]
    fn test_allocate_and_write_page() -> Result<()> {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.db");

        let dm = DiskManagerImpl::open(&path, false)?;

        let page_id = dm.allocate_page()?;
        assert_eq!(page_id, PageId::new(1));

        let mut data = vec![0u8; PAGE_SIZE];
        data[0..5].copy_from_slice(b"hello");
        dm.write_page(page_id, &data)?;

        let read_data = dm.read_page(page_id)?;
        assert_eq!(&read_data[0..5], b"hello");

        assert!(matches!(
            dm.read_page(PageId::new(9)),
            Err(StorageError::PageNotFound(_))
        ));
        assert!(dm.read_page(PageId::HEADER).is_err());

        Ok(())
    }

    #[test]
    fn test_reopen_keeps_pages_and_catalog() -> Result<()> {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.db");

        // Create and write
        {
            let dm = DiskManagerImpl::open(&path, true)?;
            let page_id = dm.allocate_page()?;
            let mut data = vec![0u8; PAGE_SIZE];
            data[0..4].copy_from_slice(b"test");
            dm.write_page(page_id, &data)?;
            dm.register_file_root("nodes", page_id)?;
        }

        // Reopen and verify
        {
            let dm = DiskManagerImpl::open(&path, false)?;
            let header = dm.header();
            assert_eq!(header.page_count, 2);
            assert_eq!(dm.lookup_file_root("nodes")?, Some(PageId::new(1)));
            assert_eq!(dm.file_names(), vec!["nodes".to_string()]);

            let read_data = dm.read_page(PageId::new(1))?;
            assert_eq!(&read_data[0..4], b"test");
        }

        Ok(())
    }

    #[test]
    fn test_free_list() -> Result<()> {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.db");

        let dm = DiskManagerImpl::open(&path, false)?;

        let p1 = dm.allocate_page()?;
        let p2 = dm.allocate_page()?;
        let p3 = dm.allocate_page()?;

        assert_eq!(p1, PageId::new(1));
        assert_eq!(p2, PageId::new(2));
        assert_eq!(p3, PageId::new(3));

        // Deallocate p2
        dm.deallocate_page(p2)?;
        assert_eq!(dm.header().free_page_count, 1);
        assert!(dm.deallocate_page(p2).is_err());

        // Next allocation should reuse p2
        let p4 = dm.allocate_page()?;
        assert_eq!(p4, PageId::new(2));
        assert_eq!(dm.header().free_page_count, 0);

        Ok(())
    }

    #[test]
    fn test_unregister_file() -> Result<()> {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.db");

        let dm = DiskManagerImpl::open(&path, false)?;
        dm.register_file_root("edges", PageId::new(4))?;
        assert!(dm.register_file_root("edges", PageId::new(5)).is_err());
        dm.unregister_file_root("edges")?;
        assert_eq!(dm.lookup_file_root("edges")?, None);
        assert!(dm.unregister_file_root("edges").is_err());

        Ok(())
    }
}
