//! # NodeHeap Storage Engine
//!
//! A disk-page-oriented store for variable-length binary records ("nodes"),
//! used as the node and edge store beneath a small graph query engine.
//!
//! ## Architecture
//!
//! The storage engine is composed of modular, swappable components:
//!
//! - **Page Layer** (`page`): Slotted page format with a compacting slot table
//! - **Storage Layer** (`storage`): Disk I/O, the store file header and its file catalog
//! - **Buffer Pool** (`buffer`): LRU page cache with pin counts and dirty tracking
//! - **Heap Layer** (`heap`): Directory-based heap files and sequential scans
//!
//! ## Usage
//!
//! ```rust,ignore
//! use nodeheap::{Config, NodeStore};
//!
//! let store = NodeStore::open(Config::new("graph.db"))?;
//! let mut nodes = store.open_heap_file("nodes")?;
//!
//! let nid = nodes.insert_node(b"alice")?;
//! assert_eq!(nodes.get_node(nid)?, Some(b"alice".to_vec()));
//!
//! for item in nodes.open_scan()? {
//!     let (nid, bytes) = item?;
//!     println!("{} -> {:?}", nid, bytes);
//! }
//!
//! store.flush()?;
//! ```

pub mod buffer;
pub mod error;
pub mod heap;
pub mod page;
pub mod storage;
pub mod types;

pub use error::{Result, StorageError};
pub use types::{Nid, PageId, MAX_NODE_SIZE, PAGE_SIZE};

// Re-export main public API
pub use buffer::{BufferPool, BufferPoolImpl};
pub use heap::{DataPageInfo, HeapFile, LabelField, Scan};
pub use storage::{DiskManager, DiskManagerImpl, FileCatalog, MemDiskManager};

use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, warn};

/// Smallest pool that can run every heap file operation
///
/// An operation pins at most a directory page and one other page at once.
pub const MIN_BUFFER_POOL_SIZE: usize = 2;

/// Store configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the store file; `None` keeps every page in memory
    pub path: Option<PathBuf>,
    /// Buffer pool size in number of pages (default: 64)
    pub buffer_pool_size: usize,
    /// Whether to sync writes immediately (default: false for performance)
    pub sync_on_write: bool,
}

impl Config {
    /// Create a new configuration for a store file with default settings
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            path: Some(path.into()),
            buffer_pool_size: 64,
            sync_on_write: false,
        }
    }

    /// Configuration for a store that lives only in memory
    pub fn in_memory() -> Self {
        Self {
            path: None,
            buffer_pool_size: 64,
            sync_on_write: false,
        }
    }

    /// Set buffer pool size
    pub fn buffer_pool_size(mut self, size: usize) -> Self {
        self.buffer_pool_size = size;
        self
    }

    /// Enable sync on write for durability
    pub fn sync_on_write(mut self, enabled: bool) -> Self {
        self.sync_on_write = enabled;
        self
    }
}

/// Handle to an open store
///
/// Owns the buffer pool every heap file of the store shares. Heap files
/// hold their own reference to the pool, so they may outlive this handle.
pub struct NodeStore {
    buffer_pool: Arc<BufferPoolImpl>,
    config: Config,
}

impl NodeStore {
    /// Open or create a store
    pub fn open(config: Config) -> Result<Self> {
        if config.buffer_pool_size < MIN_BUFFER_POOL_SIZE {
            return Err(StorageError::invalid_operation(format!(
                "buffer pool needs at least {} frames, got {}",
                MIN_BUFFER_POOL_SIZE, config.buffer_pool_size
            )));
        }

        let disk_manager: Arc<dyn DiskManager> = match &config.path {
            Some(path) => Arc::new(DiskManagerImpl::open(path, config.sync_on_write)?),
            None => Arc::new(MemDiskManager::new()),
        };
        let buffer_pool = Arc::new(BufferPoolImpl::new(
            disk_manager,
            config.buffer_pool_size,
        ));
        debug!(path = ?config.path, frames = config.buffer_pool_size, "opened node store");

        Ok(Self {
            buffer_pool,
            config,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The buffer pool shared by this store's heap files
    pub fn buffer_pool(&self) -> &Arc<BufferPoolImpl> {
        &self.buffer_pool
    }

    /// Open a heap file by name, creating it if needed
    pub fn open_heap_file(&self, name: &str) -> Result<HeapFile> {
        HeapFile::open(Arc::clone(&self.buffer_pool), Some(name))
    }

    /// Create an anonymous heap file, deleted when dropped
    pub fn create_temp_heap_file(&self) -> Result<HeapFile> {
        HeapFile::open(Arc::clone(&self.buffer_pool), None)
    }

    /// Delete a named heap file and all of its pages
    ///
    /// Returns `false` if no such file exists.
    pub fn drop_heap_file(&self, name: &str) -> Result<bool> {
        if self.buffer_pool.lookup_file_root(name)?.is_none() {
            return Ok(false);
        }
        let mut file = self.open_heap_file(name)?;
        file.delete_file()?;
        Ok(true)
    }

    /// Names of all heap files in the store
    pub fn file_names(&self) -> Vec<String> {
        self.buffer_pool.file_names()
    }

    /// Flush all dirty pages to disk
    pub fn flush(&self) -> Result<()> {
        self.buffer_pool.flush_all()
    }

    /// Get statistics about the store
    pub fn stats(&self) -> StoreStats {
        StoreStats {
            page_count: self.buffer_pool.page_count(),
            buffer_pool_size: self.buffer_pool.capacity(),
            cached_pages: self.buffer_pool.cached_pages(),
            dirty_pages: self.buffer_pool.dirty_pages(),
            file_count: self.buffer_pool.file_names().len(),
        }
    }
}

impl Drop for NodeStore {
    fn drop(&mut self) {
        if let Err(e) = self.buffer_pool.flush_all() {
            warn!(error = %e, "failed to flush node store on close");
        }
    }
}

/// Store statistics
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreStats {
    /// Total number of pages in the store file, including the header page
    pub page_count: usize,
    /// Buffer pool capacity
    pub buffer_pool_size: usize,
    /// Pages currently held in the buffer pool
    pub cached_pages: usize,
    /// Cached pages not yet written back
    pub dirty_pages: usize,
    /// Number of heap files
    pub file_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_basic_operations() -> Result<()> {
        let store = NodeStore::open(Config::in_memory())?;
        let mut nodes = store.open_heap_file("nodes")?;

        let nid = nodes.insert_node(b"value1")?;
        assert_eq!(nodes.get_node(nid)?, Some(b"value1".to_vec()));

        assert!(nodes.update_node(nid, b"value2")?);
        assert_eq!(nodes.get_node(nid)?, Some(b"value2".to_vec()));

        assert!(nodes.delete_node(nid)?);
        assert_eq!(nodes.get_node(nid)?, None);
        assert!(!nodes.delete_node(nid)?);

        Ok(())
    }

    #[test]
    fn test_persistence_across_reopen() -> Result<()> {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.db");

        let (a, b) = {
            let store = NodeStore::open(Config::new(&path).buffer_pool_size(4))?;
            let mut nodes = store.open_heap_file("nodes")?;
            let mut edges = store.open_heap_file("edges")?;
            let a = nodes.insert_node(b"alice")?;
            let b = edges.insert_node(b"alice->bob")?;
            for i in 0..100u32 {
                nodes.insert_node(&i.to_be_bytes())?;
            }
            store.flush()?;
            (a, b)
        };

        let store = NodeStore::open(Config::new(&path))?;
        assert_eq!(store.file_names(), vec!["edges".to_string(), "nodes".to_string()]);
        let nodes = store.open_heap_file("nodes")?;
        let edges = store.open_heap_file("edges")?;
        assert_eq!(nodes.get_node(a)?, Some(b"alice".to_vec()));
        assert_eq!(edges.get_node(b)?, Some(b"alice->bob".to_vec()));
        assert_eq!(nodes.node_count()?, 101);
        Ok(())
    }

    #[test]
    fn test_drop_flushes() -> Result<()> {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.db");

        let nid = {
            let store = NodeStore::open(Config::new(&path))?;
            let mut nodes = store.open_heap_file("nodes")?;
            nodes.insert_node(b"kept")?
        };

        let store = NodeStore::open(Config::new(&path))?;
        let nodes = store.open_heap_file("nodes")?;
        assert_eq!(nodes.get_node(nid)?, Some(b"kept".to_vec()));
        Ok(())
    }

    #[test]
    fn test_temp_and_drop_files() -> Result<()> {
        let store = NodeStore::open(Config::in_memory())?;
        {
            let mut temp = store.create_temp_heap_file()?;
            temp.insert_node(b"scratch")?;
            assert_eq!(store.file_names().len(), 1);
        }
        assert!(store.file_names().is_empty());

        store.open_heap_file("gone")?.insert_node(b"x")?;
        assert!(store.drop_heap_file("gone")?);
        assert!(!store.drop_heap_file("gone")?);
        assert!(store.file_names().is_empty());
        Ok(())
    }

    #[test]
    fn test_stats_and_pool_floor() -> Result<()> {
        assert!(NodeStore::open(Config::in_memory().buffer_pool_size(1)).is_err());

        let store = NodeStore::open(Config::in_memory().buffer_pool_size(8))?;
        let mut nodes = store.open_heap_file("nodes")?;
        nodes.insert_node(b"x")?;

        let stats = store.stats();
        assert_eq!(stats.buffer_pool_size, 8);
        assert_eq!(stats.page_count, 3);
        assert_eq!(stats.file_count, 1);
        assert_eq!(stats.cached_pages, 2);
        Ok(())
    }
}
