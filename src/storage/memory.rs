//! In-memory disk manager.
//!
//! Holds every page in a `Vec`. Used by tests and by `Config::in_memory()`.

use crate::error::{Result, StorageError};
use crate::page::PageBuf;
use crate::storage::disk_manager::check_data_page;
use crate::storage::{DiskManager, FileCatalog, FileHeader, FreeList};
use crate::types::{PageId, PAGE_SIZE};
use parking_lot::{Mutex, RwLock};

/// Disk manager that never touches the filesystem
pub struct MemDiskManager {
    /// Page images; index 0 stands in for the header page and stays unused
    pages: RwLock<Vec<PageBuf>>,
    header: RwLock<FileHeader>,
    free_list: Mutex<FreeList>,
}

impl MemDiskManager {
    pub fn new() -> Self {
        Self {
            pages: RwLock::new(vec![PageBuf::new()]),
            header: RwLock::new(FileHeader::new()),
            free_list: Mutex::new(FreeList::new()),
        }
    }
}

impl Default for MemDiskManager {
    fn default() -> Self {
        Self::new()
    }
}

impl FileCatalog for MemDiskManager {
    fn lookup_file_root(&self, name: &str) -> Result<Option<PageId>> {
        Ok(self.header.read().lookup(name))
    }

    fn register_file_root(&self, name: &str, root: PageId) -> Result<()> {
        self.header.write().register(name, root)
    }

    fn unregister_file_root(&self, name: &str) -> Result<()> {
        self.header.write().unregister(name)
    }

    fn file_names(&self) -> Vec<String> {
        self.header.read().catalog.keys().cloned().collect()
    }
}

impl DiskManager for MemDiskManager {
    fn read_page(&self, page_id: PageId) -> Result<PageBuf> {
        check_data_page(&self.header.read(), page_id)?;
        self.pages
            .read()
            .get(page_id.value() as usize)
            .cloned()
            .ok_or(StorageError::PageNotFound(page_id))
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
        let mut pages = self.pages.write();
        let slot = pages
            .get_mut(page_id.value() as usize)
            .ok_or(StorageError::PageNotFound(page_id))?;
        slot.as_bytes_mut().copy_from_slice(data);
        Ok(())
    }

    fn allocate_page(&self) -> Result<PageId> {
        let mut free_list = self.free_list.lock();
        if let Some(page_id) = free_list.pop() {
            self.header.write().free_page_count = free_list.len() as u32;
            return Ok(page_id);
        }
        drop(free_list);

        let page_id = self.header.write().allocate_page();
        self.pages.write().push(PageBuf::new());
        Ok(page_id)
    }

    fn deallocate_page(&self, page_id: PageId) -> Result<()> {
        check_data_page(&self.header.read(), page_id)?;
        let mut free_list = self.free_list.lock();
        if !free_list.push(page_id) {
            return Err(StorageError::invalid_operation(format!(
                "page {} is already free",
                page_id
            )));
        }
        self.header.write().free_page_count = free_list.len() as u32;
        Ok(())
    }

    fn sync(&self) -> Result<()> {
        Ok(())
    }

    fn header(&self) -> FileHeader {
        self.header.read().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocate_write_read() -> Result<()> {
        let dm = MemDiskManager::new();
        let page_id = dm.allocate_page()?;
        assert_eq!(page_id, PageId::new(1));

        let mut data = vec![0u8; PAGE_SIZE];
        data[10] = 7;
        dm.write_page(page_id, &data)?;
        assert_eq!(dm.read_page(page_id)?[10], 7);

        assert!(dm.write_page(page_id, &[0u8; 3]).is_err());
        assert!(matches!(
            dm.read_page(PageId::new(2)),
            Err(StorageError::PageNotFound(_))
        ));
        Ok(())
    }

    #[test]
    fn test_reuse_freed_page() -> Result<()> {
        let dm = MemDiskManager::new();
        let a = dm.allocate_page()?;
        let b = dm.allocate_page()?;
        dm.deallocate_page(a)?;
        assert!(dm.deallocate_page(a).is_err());
        assert!(dm.deallocate_page(PageId::HEADER).is_err());

        assert_eq!(dm.allocate_page()?, a);
        assert_eq!(dm.allocate_page()?, PageId::new(b.value() + 1));
        assert_eq!(dm.header().page_count, 4);
        Ok(())
    }

    #[test]
    fn test_catalog() -> Result<()> {
        let dm = MemDiskManager::new();
        dm.register_file_root("b", PageId::new(2))?;
        dm.register_file_root("a", PageId::new(1))?;
        assert_eq!(dm.file_names(), vec!["a".to_string(), "b".to_string()]);
        assert_eq!(dm.lookup_file_root("b")?, Some(PageId::new(2)));
        dm.unregister_file_root("b")?;
        assert_eq!(dm.lookup_file_root("b")?, None);
        Ok(())
    }
}
