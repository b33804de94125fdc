//! Buffer pool implementation.
//!
//! The buffer pool manages a fixed number of in-memory page frames,
//! caching pages read from disk and writing dirty pages back.
//!
//! Every fetch pins the frame; the returned guard unpins it on drop. Only
//! unpinned frames are eligible for eviction.

use crate::buffer::lru::LruList;
use crate::error::{Result, StorageError};
use crate::page::SlottedPage;
use crate::storage::{DiskManager, FileCatalog};
use crate::types::PageId;
use parking_lot::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use tracing::trace;

/// Trait for buffer pool operations
pub trait BufferPool: FileCatalog {
    /// Fetch and pin a page for reading
    fn fetch_page(&self, page_id: PageId) -> Result<PageGuard<'_>>;

    /// Fetch and pin a page for writing
    fn fetch_page_mut(&self, page_id: PageId) -> Result<PageGuardMut<'_>>;

    /// Allocate a new page, initialized as an empty slotted page, and pin it
    fn new_page(&self) -> Result<(PageId, PageGuardMut<'_>)>;

    /// Flush a specific page to disk
    fn flush_page(&self, page_id: PageId) -> Result<()>;

    /// Flush all dirty pages to disk
    fn flush_all(&self) -> Result<()>;

    /// Deallocate a page. Fails if the page is still pinned.
    fn free_page(&self, page_id: PageId) -> Result<()>;

    /// Current pin count of a page; zero if it is not cached
    fn pin_count(&self, page_id: PageId) -> u32;

    /// Get the total number of pages in the store file
    fn page_count(&self) -> usize;

    /// Get the buffer pool capacity
    fn capacity(&self) -> usize;
}

/// A frame in the buffer pool
struct BufferFrame {
    page: RwLock<SlottedPage>,
    /// Set when a write view of the page is taken
    dirty: AtomicBool,
    /// Number of live guards
    pin_count: AtomicU32,
}

impl BufferFrame {
    fn pinned(page: SlottedPage, dirty: bool) -> Self {
        Self {
            page: RwLock::new(page),
            dirty: AtomicBool::new(dirty),
            pin_count: AtomicU32::new(1),
        }
    }

    fn pin(&self) {
        self.pin_count.fetch_add(1, Ordering::AcqRel);
    }

    fn unpin(&self) {
        let _ = self
            .pin_count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
    }

    fn pins(&self) -> u32 {
        self.pin_count.load(Ordering::Acquire)
    }
}

/// Buffer pool implementation
pub struct BufferPoolImpl {
    /// The disk manager for I/O
    disk_manager: Arc<dyn DiskManager>,
    /// Cached frames indexed by page ID
    frames: RwLock<HashMap<PageId, Arc<BufferFrame>>>,
    /// Replacement order
    lru: Mutex<LruList>,
    /// Maximum number of frames
    capacity: usize,
}

impl BufferPoolImpl {
    /// Create a new buffer pool
    pub fn new(disk_manager: Arc<dyn DiskManager>, capacity: usize) -> Self {
        Self {
            disk_manager,
            frames: RwLock::new(HashMap::with_capacity(capacity)),
            lru: Mutex::new(LruList::new(capacity)),
            capacity,
        }
    }

    /// Number of pages currently cached
    pub fn cached_pages(&self) -> usize {
        self.frames.read().len()
    }

    /// Number of cached pages with unflushed changes
    pub fn dirty_pages(&self) -> usize {
        self.frames
            .read()
            .values()
            .filter(|frame| frame.dirty.load(Ordering::Acquire))
            .count()
    }

    /// Pin the frame for a page, loading it from disk if needed
    fn pin(&self, page_id: PageId) -> Result<Arc<BufferFrame>> {
        let cached = self.frames.read().get(&page_id).cloned();
        if let Some(frame) = cached {
            frame.pin();
            self.lru.lock().touch(page_id);
            return Ok(frame);
        }

        let buf = self.disk_manager.read_page(page_id)?;
        let page = SlottedPage::from_bytes(buf.as_bytes())?;
        self.make_room()?;
        Ok(self.install(page_id, page, false))
    }

    fn install(&self, page_id: PageId, page: SlottedPage, dirty: bool) -> Arc<BufferFrame> {
        let frame = Arc::new(BufferFrame::pinned(page, dirty));
        self.frames.write().insert(page_id, Arc::clone(&frame));
        self.lru.lock().touch(page_id);
        frame
    }

    /// Evict one unpinned frame if the pool is full
    fn make_room(&self) -> Result<()> {
        if self.frames.read().len() < self.capacity {
            return Ok(());
        }

        let mut lru = self.lru.lock();
        for _ in 0..lru.len() {
            let Some(victim) = lru.pop_lru() else {
                break;
            };
            let frame = self.frames.read().get(&victim).cloned();
            let Some(frame) = frame else {
                continue;
            };
            if frame.pins() > 0 {
                lru.touch(victim);
                continue;
            }
            if let Err(e) = self.write_back(victim, &frame) {
                lru.touch(victim);
                return Err(e);
            }
            self.frames.write().remove(&victim);
            trace!(page_id = %victim, "evicted page");
            return Ok(());
        }

        Err(StorageError::BufferPoolExhausted)
    }

    fn write_back(&self, page_id: PageId, frame: &BufferFrame) -> Result<()> {
        if frame.dirty.swap(false, Ordering::AcqRel) {
            let page = frame.page.read();
            if let Err(e) = self.disk_manager.write_page(page_id, page.as_bytes()) {
                frame.dirty.store(true, Ordering::Release);
                return Err(e);
            }
        }
        Ok(())
    }

    fn release(&self, page_id: PageId, frame: &BufferFrame) {
        frame.unpin();
        self.lru.lock().touch(page_id);
    }
}

impl FileCatalog for BufferPoolImpl {
    fn lookup_file_root(&self, name: &str) -> Result<Option<PageId>> {
        self.disk_manager.lookup_file_root(name)
    }

    fn register_file_root(&self, name: &str, root: PageId) -> Result<()> {
        self.disk_manager.register_file_root(name, root)
    }

    fn unregister_file_root(&self, name: &str) -> Result<()> {
        self.disk_manager.unregister_file_root(name)
    }

    fn file_names(&self) -> Vec<String> {
        self.disk_manager.file_names()
    }
}

impl BufferPool for BufferPoolImpl {
    fn fetch_page(&self, page_id: PageId) -> Result<PageGuard<'_>> {
        let frame = self.pin(page_id)?;
        Ok(PageGuard {
            page_id,
            frame,
            pool: self,
        })
    }

    fn fetch_page_mut(&self, page_id: PageId) -> Result<PageGuardMut<'_>> {
        let frame = self.pin(page_id)?;
        Ok(PageGuardMut {
            page_id,
            frame,
            pool: self,
        })
    }

    fn new_page(&self) -> Result<(PageId, PageGuardMut<'_>)> {
        self.make_room()?;
        let page_id = self.disk_manager.allocate_page()?;
        let frame = self.install(page_id, SlottedPage::new(page_id), true);
        trace!(%page_id, "allocated page");

        Ok((
            page_id,
            PageGuardMut {
                page_id,
                frame,
                pool: self,
            },
        ))
    }

    fn flush_page(&self, page_id: PageId) -> Result<()> {
        let frame = self.frames.read().get(&page_id).cloned();
        match frame {
            Some(frame) => self.write_back(page_id, &frame),
            None => Ok(()),
        }
    }

    fn flush_all(&self) -> Result<()> {
        let frames: Vec<_> = self
            .frames
            .read()
            .iter()
            .map(|(&page_id, frame)| (page_id, Arc::clone(frame)))
            .collect();
        for (page_id, frame) in frames {
            self.write_back(page_id, &frame)?;
        }
        self.disk_manager.sync()
    }

    fn free_page(&self, page_id: PageId) -> Result<()> {
        {
            let mut frames = self.frames.write();
            if let Some(frame) = frames.get(&page_id) {
                if frame.pins() > 0 {
                    return Err(StorageError::PagePinned(page_id));
                }
            }
            frames.remove(&page_id);
        }
        self.lru.lock().remove(page_id);

        self.disk_manager.deallocate_page(page_id)
    }

    fn pin_count(&self, page_id: PageId) -> u32 {
        self.frames
            .read()
            .get(&page_id)
            .map_or(0, |frame| frame.pins())
    }

    fn page_count(&self) -> usize {
        self.disk_manager.header().page_count as usize
    }

    fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Read view of a pinned page
pub type PageRef<'a> = RwLockReadGuard<'a, SlottedPage>;

/// Write view of a pinned page
pub type PageRefMut<'a> = RwLockWriteGuard<'a, SlottedPage>;

/// RAII guard for read access to a page
pub struct PageGuard<'a> {
    page_id: PageId,
    frame: Arc<BufferFrame>,
    pool: &'a BufferPoolImpl,
}

impl<'a> PageGuard<'a> {
    /// Get the page ID
    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    /// Get a read lock on the page
    pub fn read(&self) -> PageRef<'_> {
        self.frame.page.read()
    }
}

impl<'a> Drop for PageGuard<'a> {
    fn drop(&mut self) {
        self.pool.release(self.page_id, &self.frame);
    }
}

/// RAII guard for write access to a page
///
/// Holding this guard does not by itself mark the page dirty; taking a
/// [`PageGuardMut::write`] view does.
pub struct PageGuardMut<'a> {
    page_id: PageId,
    frame: Arc<BufferFrame>,
    pool: &'a BufferPoolImpl,
}

impl<'a> PageGuardMut<'a> {
    /// Get the page ID
    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    /// Get a write lock on the page and mark it dirty
    pub fn write(&self) -> PageRefMut<'_> {
        let guard = self.frame.page.write();
        self.frame.dirty.store(true, Ordering::Release);
        guard
    }

    /// Get a read lock on the page
    pub fn read(&self) -> PageRef<'_> {
        self.frame.page.read()
    }
}

impl<'a> Drop for PageGuardMut<'a> {
    fn drop(&mut self) {
        self.pool.release(self.page_id, &self.frame);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{DiskManagerImpl, MemDiskManager};
    use tempfile::tempdir;

    fn mem_pool(capacity: usize) -> BufferPoolImpl {
        BufferPoolImpl::new(Arc::new(MemDiskManager::new()), capacity)
    }

    #[test]
    fn test_new_page_is_initialized() -> Result<()> {
        let pool = mem_pool(4);
        let (page_id, guard) = pool.new_page()?;
        assert_eq!(page_id, PageId::new(1));

        let page = guard.read();
        assert_eq!(page.page_id(), page_id);
        assert_eq!(page.slot_count(), 0);
        assert!(!page.prev_page().is_valid());
        assert!(!page.next_page().is_valid());
        Ok(())
    }

    #[test]
    fn test_guards_pin_and_unpin() -> Result<()> {
        let pool = mem_pool(4);
        let page_id = {
            let (page_id, _guard) = pool.new_page()?;
            assert_eq!(pool.pin_count(page_id), 1);
            page_id
        };
        assert_eq!(pool.pin_count(page_id), 0);

        let a = pool.fetch_page(page_id)?;
        let b = pool.fetch_page(page_id)?;
        assert_eq!(pool.pin_count(page_id), 2);
        drop(a);
        drop(b);
        assert_eq!(pool.pin_count(page_id), 0);
        Ok(())
    }

    #[test]
    fn test_eviction_writes_back_dirty_pages() -> Result<()> {
        let pool = mem_pool(2);

        let mut ids = Vec::new();
        for i in 0..5u8 {
            let (page_id, guard) = pool.new_page()?;
            let nid = guard.write().insert_node(&[i; 8]);
            assert!(nid.is_some());
            ids.push(page_id);
        }
        assert_eq!(pool.cached_pages(), 2);

        for (i, &page_id) in ids.iter().enumerate() {
            let guard = pool.fetch_page(page_id)?;
            let page = guard.read();
            let nid = page.first_node().unwrap();
            assert_eq!(page.node(nid)?, &[i as u8; 8]);
        }
        Ok(())
    }

    #[test]
    fn test_exhausted_when_all_pinned() -> Result<()> {
        let pool = mem_pool(2);
        let (_a, _ga) = pool.new_page()?;
        let (_b, _gb) = pool.new_page()?;

        assert!(matches!(
            pool.new_page(),
            Err(StorageError::BufferPoolExhausted)
        ));
        Ok(())
    }

    #[test]
    fn test_dirty_only_after_write_view() -> Result<()> {
        let pool = mem_pool(4);
        let page_id = {
            let (page_id, _guard) = pool.new_page()?;
            page_id
        };
        pool.flush_all()?;
        assert_eq!(pool.dirty_pages(), 0);

        {
            let guard = pool.fetch_page_mut(page_id)?;
            let _ = guard.read().slot_count();
        }
        assert_eq!(pool.dirty_pages(), 0);

        {
            let guard = pool.fetch_page_mut(page_id)?;
            guard.write().set_next_page(PageId::new(7));
        }
        assert_eq!(pool.dirty_pages(), 1);
        pool.flush_page(page_id)?;
        assert_eq!(pool.dirty_pages(), 0);
        Ok(())
    }

    #[test]
    fn test_free_pinned_page_fails() -> Result<()> {
        let pool = mem_pool(4);
        let (page_id, guard) = pool.new_page()?;
        assert!(matches!(
            pool.free_page(page_id),
            Err(StorageError::PagePinned(_))
        ));
        drop(guard);

        pool.free_page(page_id)?;
        assert_eq!(pool.cached_pages(), 0);

        // The freed page is handed out again.
        let (reused, _guard) = pool.new_page()?;
        assert_eq!(reused, page_id);
        Ok(())
    }

    #[test]
    fn test_flush_and_reopen_file() -> Result<()> {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.db");

        let page_id = {
            let dm = Arc::new(DiskManagerImpl::open(&path, false)?);
            let pool = BufferPoolImpl::new(dm, 10);
            let (page_id, guard) = pool.new_page()?;
            let nid = guard.write().insert_node(b"hello");
            assert!(nid.is_some());
            drop(guard);
            pool.register_file_root("nodes", page_id)?;
            pool.flush_all()?;
            page_id
        };

        let dm = Arc::new(DiskManagerImpl::open(&path, false)?);
        let pool = BufferPoolImpl::new(dm, 10);
        assert_eq!(pool.lookup_file_root("nodes")?, Some(page_id));
        let guard = pool.fetch_page(page_id)?;
        let page = guard.read();
        let nid = page.first_node().unwrap();
        assert_eq!(page.node(nid)?, b"hello");
        Ok(())
    }
}
