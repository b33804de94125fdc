//! Storage layer: disk I/O and page management.
//!
//! This module provides abstractions for reading and writing pages to disk,
//! the store file format with its file catalog, and tracking free pages.

mod catalog;
mod disk_manager;
mod file_header;
mod freelist;
mod memory;

pub use catalog::FileCatalog;
pub use disk_manager::{DiskManager, DiskManagerImpl};
pub use file_header::{FileHeader, MAX_FILE_NAME};
pub use freelist::FreeList;
pub use memory::MemDiskManager;
