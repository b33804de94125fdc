//! File catalog: maps heap file names to their first directory page.

use crate::error::Result;
use crate::types::PageId;

/// Name-to-root mapping for whole heap files
pub trait FileCatalog: Send + Sync {
    /// Look up the first directory page of a named file
    fn lookup_file_root(&self, name: &str) -> Result<Option<PageId>>;

    /// Register a new file. Fails if the name is already taken.
    fn register_file_root(&self, name: &str, root: PageId) -> Result<()>;

    /// Remove a file's entry. Fails if the name is unknown.
    fn unregister_file_root(&self, name: &str) -> Result<()>;

    /// Names of all registered files, in sorted order
    fn file_names(&self) -> Vec<String>;
}
