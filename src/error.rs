//! Error types for the storage engine.

use thiserror::Error;
use crate::types::PageId;

/// Result type alias for storage operations
pub type Result<T> = std::result::Result<T, StorageError>;

/// Errors that can occur in the storage engine
#[derive(Error, Debug)]
pub enum StorageError {
    /// I/O error from the underlying file system
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Requested page was not found
    #[error("Page {0} not found")]
    PageNotFound(PageId),

    /// Slot index out of range, or the slot is empty
    #[error("Invalid slot number {slot_no} on page {page_id}")]
    InvalidSlotNumber { page_id: PageId, slot_no: u16 },

    /// Node cannot fit even on a freshly allocated page
    #[error("No space available: node of {needed} bytes (max: {max})")]
    NoSpaceAvailable { needed: usize, max: usize },

    /// In-place update would change the node length
    #[error("Invalid update: node is {expected} bytes, replacement is {actual}")]
    InvalidUpdate { expected: usize, actual: usize },

    /// Heap file was already deleted
    #[error("Heap file {0:?} already deleted")]
    FileAlreadyDeleted(String),

    /// Buffer pool has no available frames
    #[error("Buffer pool exhausted: no available frames")]
    BufferPoolExhausted,

    /// Page cannot be freed while it is pinned
    #[error("Page {0} is still pinned")]
    PagePinned(PageId),

    /// File catalog in the header page has no room for another entry
    #[error("File catalog full: cannot register {0:?}")]
    CatalogFull(String),

    /// Buffer or disk layer failed underneath a heap file operation
    #[error("{op} failed: {source}")]
    Collaborator {
        op: &'static str,
        #[source]
        source: Box<StorageError>,
    },

    /// Data corruption detected (e.g., checksum mismatch)
    #[error("Corruption detected: {0}")]
    Corruption(String),

    /// Invalid page format or type
    #[error("Invalid page: {0}")]
    InvalidPage(String),

    /// Invalid operation for the current state
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    /// Store file is corrupted or has invalid format
    #[error("Invalid database file: {0}")]
    InvalidDatabaseFile(String),
}

impl StorageError {
    /// Create a corruption error with a message
    pub fn corruption(msg: impl Into<String>) -> Self {
        Self::Corruption(msg.into())
    }

    /// Create an invalid page error
    pub fn invalid_page(msg: impl Into<String>) -> Self {
        Self::InvalidPage(msg.into())
    }

    /// Create an invalid operation error
    pub fn invalid_operation(msg: impl Into<String>) -> Self {
        Self::InvalidOperation(msg.into())
    }

    /// Create an invalid database file error
    pub fn invalid_db(msg: impl Into<String>) -> Self {
        Self::InvalidDatabaseFile(msg.into())
    }

    /// Wrap a buffer/disk failure with the operation that hit it
    pub fn collaborator(op: &'static str, source: StorageError) -> Self {
        Self::Collaborator {
            op,
            source: Box::new(source),
        }
    }

    /// Strip `Collaborator` wrappers down to the originating error
    pub fn root_cause(&self) -> &StorageError {
        match self {
            Self::Collaborator { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

/// Attach heap-file context to collaborator results
pub(crate) trait ResultExt<T> {
    fn context(self, op: &'static str) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, op: &'static str) -> Result<T> {
        self.map_err(|e| StorageError::collaborator(op, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collaborator_message_names_operation() {
        let err = StorageError::collaborator("insert_node: pin data page", StorageError::BufferPoolExhausted);
        assert_eq!(
            err.to_string(),
            "insert_node: pin data page failed: Buffer pool exhausted: no available frames"
        );
        assert!(matches!(err.root_cause(), StorageError::BufferPoolExhausted));
    }
}
