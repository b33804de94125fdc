//! Free list management.
//!
//! Tracks deallocated pages so new allocations reuse them before growing the
//! file. The list lives in memory only; pages freed in an earlier session are
//! not reclaimed after reopening.

use crate::types::PageId;
use std::collections::{HashSet, VecDeque};

/// Manages free pages for reuse
#[derive(Debug, Default)]
pub struct FreeList {
    /// Queue of free page IDs, oldest first
    pages: VecDeque<PageId>,
    /// Membership index to catch double frees
    members: HashSet<PageId>,
}

impl FreeList {
    /// Create a new empty free list
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a page to the free list
    ///
    /// Returns `false` if the page was already free.
    pub fn push(&mut self, page_id: PageId) -> bool {
        if !self.members.insert(page_id) {
            return false;
        }
        self.pages.push_back(page_id);
        true
    }

    /// Take a free page, if one is available
    pub fn pop(&mut self) -> Option<PageId> {
        let page_id = self.pages.pop_front()?;
        self.members.remove(&page_id);
        Some(page_id)
    }

    /// Check whether a page is currently free
    pub fn contains(&self, page_id: PageId) -> bool {
        self.members.contains(&page_id)
    }

    /// Get the number of free pages
    pub fn len(&self) -> usize {
        self.pages.len()
    }

    /// Check if the free list is empty
    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_freelist_operations() {
        let mut fl = FreeList::new();
        assert!(fl.is_empty());
        assert_eq!(fl.pop(), None);

        assert!(fl.push(PageId::new(5)));
        assert!(fl.push(PageId::new(10)));
        assert_eq!(fl.len(), 2);
        assert!(fl.contains(PageId::new(10)));

        assert_eq!(fl.pop(), Some(PageId::new(5)));
        assert_eq!(fl.pop(), Some(PageId::new(10)));
        assert_eq!(fl.pop(), None);
        assert!(!fl.contains(PageId::new(10)));
    }

    #[test]
    fn test_double_free_rejected() {
        let mut fl = FreeList::new();
        assert!(fl.push(PageId::new(3)));
        assert!(!fl.push(PageId::new(3)));
        assert_eq!(fl.len(), 1);
    }
}
