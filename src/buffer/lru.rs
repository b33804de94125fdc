//! LRU (Least Recently Used) replacement order for buffer frames.

use crate::types::PageId;
use std::collections::HashMap;

/// Recency order over cached pages
///
/// An intrusive doubly-linked list stored in a `Vec`, indexed by a map from
/// page ID to node position. All operations are O(1).
pub struct LruList {
    index: HashMap<PageId, usize>,
    nodes: Vec<Node>,
    /// Most recently used
    head: Option<usize>,
    /// Least recently used
    tail: Option<usize>,
    vacant: Vec<usize>,
}

#[derive(Clone, Copy)]
struct Node {
    page_id: PageId,
    prev: Option<usize>,
    next: Option<usize>,
}

impl LruList {
    pub fn new(capacity: usize) -> Self {
        Self {
            index: HashMap::with_capacity(capacity),
            nodes: Vec::with_capacity(capacity),
            head: None,
            tail: None,
            vacant: Vec::new(),
        }
    }

    /// Mark a page as most recently used, adding it if absent
    pub fn touch(&mut self, page_id: PageId) {
        match self.index.get(&page_id) {
            Some(&pos) if self.head == Some(pos) => {}
            Some(&pos) => {
                self.unlink(pos);
                self.push_front(pos);
            }
            None => {
                let node = Node {
                    page_id,
                    prev: None,
                    next: None,
                };
                let pos = match self.vacant.pop() {
                    Some(pos) => {
                        self.nodes[pos] = node;
                        pos
                    }
                    None => {
                        self.nodes.push(node);
                        self.nodes.len() - 1
                    }
                };
                self.index.insert(page_id, pos);
                self.push_front(pos);
            }
        }
    }

    /// Forget a page
    pub fn remove(&mut self, page_id: PageId) {
        if let Some(pos) = self.index.remove(&page_id) {
            self.unlink(pos);
            self.vacant.push(pos);
        }
    }

    /// The least recently used page, if any
    pub fn peek_lru(&self) -> Option<PageId> {
        self.tail.map(|pos| self.nodes[pos].page_id)
    }

    /// Remove and return the least recently used page
    pub fn pop_lru(&mut self) -> Option<PageId> {
        let page_id = self.peek_lru()?;
        self.remove(page_id);
        Some(page_id)
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    #[cfg(test)]
    fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    fn push_front(&mut self, pos: usize) {
        self.nodes[pos].prev = None;
        self.nodes[pos].next = self.head;
        if let Some(old_head) = self.head {
            self.nodes[old_head].prev = Some(pos);
        }
        self.head = Some(pos);
        if self.tail.is_none() {
            self.tail = Some(pos);
        }
    }

    fn unlink(&mut self, pos: usize) {
        let Node { prev, next, .. } = self.nodes[pos];
        match prev {
            Some(prev) => self.nodes[prev].next = next,
            None => self.head = next,
        }
        match next {
            Some(next) => self.nodes[next].prev = prev,
            None => self.tail = prev,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(n: u32) -> PageId {
        PageId::new(n)
    }

    #[test]
    fn test_touch_reorders() {
        let mut lru = LruList::new(3);
        lru.touch(p(1));
        lru.touch(p(2));
        lru.touch(p(3));
        assert_eq!(lru.peek_lru(), Some(p(1)));

        lru.touch(p(1));
        assert_eq!(lru.peek_lru(), Some(p(2)));
        assert_eq!(lru.pop_lru(), Some(p(2)));
        assert_eq!(lru.pop_lru(), Some(p(3)));
        assert_eq!(lru.pop_lru(), Some(p(1)));
        assert!(lru.is_empty());
    }

    #[test]
    fn test_remove_middle_and_reuse_position() {
        let mut lru = LruList::new(3);
        lru.touch(p(1));
        lru.touch(p(2));
        lru.touch(p(3));

        lru.remove(p(2));
        assert_eq!(lru.len(), 2);

        lru.touch(p(4));
        assert_eq!(lru.len(), 3);
        assert_eq!(lru.pop_lru(), Some(p(1)));
        assert_eq!(lru.pop_lru(), Some(p(3)));
        assert_eq!(lru.pop_lru(), Some(p(4)));
    }

    #[test]
    fn test_empty() {
        let mut lru = LruList::new(0);
        assert_eq!(lru.peek_lru(), None);
        assert_eq!(lru.pop_lru(), None);
        lru.remove(p(9));
        assert_eq!(lru.len(), 0);
    }
}
