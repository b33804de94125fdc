//! Node identifier type.

use crate::types::PageId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Address of a node: the page holding it and its slot on that page.
///
/// A `Nid` stays valid while its slot is allocated to the same node.
/// Deleting other nodes does not renumber slots, but compacting the slot
/// directory of a page does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Nid {
    /// Page holding the node
    pub page_id: PageId,
    /// Slot number on that page
    pub slot_no: u16,
}

impl Nid {
    /// Create a new node identifier
    pub const fn new(page_id: PageId, slot_no: u16) -> Self {
        Self { page_id, slot_no }
    }
}

impl fmt::Display for Nid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.page_id, self.slot_no)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nid_ordering_follows_page_then_slot() {
        let a = Nid::new(PageId::new(1), 9);
        let b = Nid::new(PageId::new(2), 0);
        let c = Nid::new(PageId::new(2), 1);
        assert!(a < b);
        assert!(b < c);
    }

    #[test]
    fn test_nid_display() {
        assert_eq!(Nid::new(PageId::new(7), 3).to_string(), "(7, 3)");
    }
}
