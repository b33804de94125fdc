//! Slotted page implementation.
//!
//! A slotted page uses the following layout:
//! ```text
//! ┌────────────────────────────────────────────────────┐
//! │                 Page Header (20 B)                  │
//! ├────────────────────────────────────────────────────┤
//! │                    Slot Table                       │
//! │  [len0,off0][len1,off1][len2,off2]...  →           │
//! ├────────────────────────────────────────────────────┤
//! │                                                    │
//! │                   Free Space                        │
//! │                                                    │
//! ├────────────────────────────────────────────────────┤
//! │                    Node Area                        │
//! │      ←  [node2][node1][node0]                      │
//! └────────────────────────────────────────────────────┘
//! ```
//!
//! The node area is always contiguous: deleting a node shifts the nodes
//! stored before it to close the hole. The slot table is never compacted
//! implicitly; empty slots are reused by later inserts, and
//! [`SlottedPage::compact_slot_dir`] squeezes them out on request.
//!
//! Invariant: `free_space == used_ptr - slot_table_end`.

use crate::error::{Result, StorageError};
use crate::page::header::{read_slot, write_slot};
use crate::page::{PageBuf, PageHeader};
use crate::types::{Nid, PageId, PageType, EMPTY_SLOT, SLOT_SIZE};
use serde::Serialize;

/// A slotted page storing variable-length nodes
pub struct SlottedPage {
    /// The raw page data
    data: PageBuf,
    /// Cached header (kept in sync with data)
    header: PageHeader,
}

/// Structured view of a page's header and slot table
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageDump {
    pub page_id: PageId,
    pub page_type: &'static str,
    pub prev_page: PageId,
    pub next_page: PageId,
    pub slot_count: u16,
    pub used_ptr: u16,
    pub free_space: u16,
    pub slots: Vec<SlotDump>,
}

/// One slot table entry in a [`PageDump`]
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotDump {
    pub slot_no: u16,
    pub length: i16,
    pub offset: u16,
}

fn is_live(length: i16) -> bool {
    length >= 0
}

impl SlottedPage {
    /// Create a new empty page with the given ID
    pub fn new(page_id: PageId) -> Self {
        let mut page = Self {
            data: PageBuf::new(),
            header: PageHeader::new(page_id),
        };
        page.sync_header();
        page
    }

    /// Reset this page to an empty, unlinked page with the given ID
    pub fn init(&mut self, page_id: PageId) {
        self.data = PageBuf::new();
        self.header = PageHeader::new(page_id);
        self.sync_header();
    }

    /// Load a page from raw bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let data = PageBuf::from_bytes(bytes);
        let header = PageHeader::read(&data)
            .ok_or_else(|| StorageError::invalid_page("invalid page header"))?;
        Ok(Self { data, header })
    }

    /// Get the raw bytes of this page
    pub fn as_bytes(&self) -> &[u8] {
        self.data.as_bytes()
    }

    /// Get the page header
    pub fn header(&self) -> &PageHeader {
        &self.header
    }

    /// This page's own ID
    pub fn page_id(&self) -> PageId {
        self.header.cur_page
    }

    pub fn prev_page(&self) -> PageId {
        self.header.prev_page
    }

    pub fn set_prev_page(&mut self, page_id: PageId) {
        self.header.prev_page = page_id;
        self.sync_header();
    }

    pub fn next_page(&self) -> PageId {
        self.header.next_page
    }

    pub fn set_next_page(&mut self, page_id: PageId) {
        self.header.next_page = page_id;
        self.sync_header();
    }

    pub fn page_type(&self) -> PageType {
        PageType::from_raw(self.header.page_type)
    }

    pub fn set_page_type(&mut self, page_type: PageType) {
        self.header.page_type = page_type as u16;
        self.sync_header();
    }

    /// Number of slot table entries, including empty ones
    pub fn slot_count(&self) -> usize {
        self.header.slot_cnt as usize
    }

    /// Number of live nodes on this page
    pub fn live_count(&self) -> usize {
        (0..self.slot_count())
            .filter(|&i| is_live(self.slot(i).0))
            .count()
    }

    /// Raw free space counter: bytes left for new nodes and new slots
    pub fn free_space(&self) -> usize {
        self.header.free_space as usize
    }

    /// Space available for a new node, keeping room for one more slot entry
    ///
    /// An insert of exactly this many bytes always succeeds.
    pub fn available_space(&self) -> usize {
        self.free_space().saturating_sub(SLOT_SIZE)
    }

    /// True if every slot is empty
    pub fn is_empty(&self) -> bool {
        (0..self.slot_count()).all(|i| !is_live(self.slot(i).0))
    }

    /// Get the (length, offset) pair of a slot
    fn slot(&self, slot_no: usize) -> (i16, u16) {
        read_slot(&self.data, slot_no)
    }

    /// Insert a node, returning its ID, or `None` if the page lacks space
    ///
    /// The first empty slot is reused if there is one; otherwise a new slot
    /// is appended. The space check always reserves a new slot entry.
    #[must_use]
    pub fn insert_node(&mut self, node: &[u8]) -> Option<Nid> {
        let rec_len = node.len();
        let space_needed = rec_len + SLOT_SIZE;
        if space_needed > self.free_space() {
            return None;
        }

        let slot_cnt = self.slot_count();
        let slot_no = (0..slot_cnt)
            .find(|&i| self.slot(i).0 == EMPTY_SLOT)
            .unwrap_or(slot_cnt);

        if slot_no == slot_cnt {
            self.header.free_space -= space_needed as u16;
            self.header.slot_cnt += 1;
        } else {
            self.header.free_space -= rec_len as u16;
        }

        self.header.used_ptr -= rec_len as u16;
        let used_ptr = self.header.used_ptr;
        write_slot(&mut self.data, slot_no, rec_len as i16, used_ptr);

        let start = used_ptr as usize;
        self.data[start..start + rec_len].copy_from_slice(node);
        self.sync_header();

        Some(Nid::new(self.header.cur_page, slot_no as u16))
    }

    /// Resolve a node ID to its (offset, length) on this page
    fn locate(&self, nid: Nid) -> Result<(usize, usize)> {
        let slot_no = nid.slot_no as usize;
        if nid.page_id == self.header.cur_page && slot_no < self.slot_count() {
            let (length, offset) = self.slot(slot_no);
            if is_live(length) {
                let (offset, length) = (offset as usize, length as usize);
                if offset + length > self.data.len() {
                    return Err(StorageError::corruption(format!(
                        "slot {} on page {} points past the page end",
                        slot_no, nid.page_id
                    )));
                }
                return Ok((offset, length));
            }
        }

        Err(StorageError::InvalidSlotNumber {
            page_id: nid.page_id,
            slot_no: nid.slot_no,
        })
    }

    /// Delete a node, closing the hole it leaves in the node area
    ///
    /// The freed slot is marked empty. Other nodes keep their slot numbers.
    pub fn delete_node(&mut self, nid: Nid) -> Result<()> {
        let (offset, rec_len) = self.locate(nid)?;
        let used_ptr = self.header.used_ptr as usize;

        if rec_len > 0 {
            if offset < used_ptr {
                return Err(StorageError::corruption(format!(
                    "node {} lies outside the node area",
                    nid
                )));
            }

            // Shift everything stored before the node right by its length.
            self.data.copy_within(used_ptr..offset, used_ptr + rec_len);
            self.data[used_ptr..used_ptr + rec_len].fill(0);

            for i in 0..self.slot_count() {
                let (length, slot_offset) = self.slot(i);
                if is_live(length) && (slot_offset as usize) < offset {
                    write_slot(&mut self.data, i, length, slot_offset + rec_len as u16);
                }
            }

            self.header.used_ptr += rec_len as u16;
            self.header.free_space += rec_len as u16;
        }

        write_slot(&mut self.data, nid.slot_no as usize, EMPTY_SLOT, 0);
        self.sync_header();
        Ok(())
    }

    /// Copy out the node with the given ID
    pub fn get_node(&self, nid: Nid) -> Result<Vec<u8>> {
        Ok(self.node(nid)?.to_vec())
    }

    /// Borrow the node with the given ID in place
    pub fn node(&self, nid: Nid) -> Result<&[u8]> {
        let (offset, length) = self.locate(nid)?;
        Ok(&self.data[offset..offset + length])
    }

    /// Mutably borrow the node with the given ID in place
    pub fn node_mut(&mut self, nid: Nid) -> Result<&mut [u8]> {
        let (offset, length) = self.locate(nid)?;
        Ok(&mut self.data[offset..offset + length])
    }

    /// ID of the first live node, or `None` if the page holds none
    pub fn first_node(&self) -> Option<Nid> {
        self.next_live_slot(0)
    }

    /// ID of the next live node after `current`, or `None` at the end
    pub fn next_node(&self, current: Nid) -> Option<Nid> {
        self.next_live_slot(current.slot_no as usize + 1)
    }

    fn next_live_slot(&self, from: usize) -> Option<Nid> {
        (from..self.slot_count())
            .find(|&i| is_live(self.slot(i).0))
            .map(|i| Nid::new(self.header.cur_page, i as u16))
    }

    /// Iterate over the IDs of all live nodes in slot order
    pub fn nids(&self) -> impl Iterator<Item = Nid> + '_ {
        std::iter::successors(self.first_node(), move |nid| self.next_node(*nid))
    }

    /// Squeeze empty entries out of the slot table
    ///
    /// Live slots keep their relative order but are renumbered, so node IDs
    /// issued for this page before compaction must not be reused after it.
    pub fn compact_slot_dir(&mut self) {
        let slot_cnt = self.slot_count();
        let mut next_free = 0;

        for i in 0..slot_cnt {
            let (length, offset) = self.slot(i);
            if !is_live(length) {
                continue;
            }
            if i != next_free {
                write_slot(&mut self.data, next_free, length, offset);
                write_slot(&mut self.data, i, EMPTY_SLOT, 0);
            }
            next_free += 1;
        }

        if next_free < slot_cnt {
            self.header.free_space += (SLOT_SIZE * (slot_cnt - next_free)) as u16;
            self.header.slot_cnt = next_free as u16;
            self.sync_header();
        }
    }

    /// Structured dump of the header and slot table
    pub fn dump(&self) -> PageDump {
        PageDump {
            page_id: self.header.cur_page,
            page_type: self.page_type().name(),
            prev_page: self.header.prev_page,
            next_page: self.header.next_page,
            slot_count: self.header.slot_cnt,
            used_ptr: self.header.used_ptr,
            free_space: self.header.free_space,
            slots: (0..self.slot_count())
                .map(|i| {
                    let (length, offset) = self.slot(i);
                    SlotDump {
                        slot_no: i as u16,
                        length,
                        offset,
                    }
                })
                .collect(),
        }
    }

    /// Sync the header to the raw page data
    fn sync_header(&mut self) {
        self.header.write(&mut self.data);
    }
}

impl Clone for SlottedPage {
    fn clone(&self) -> Self {
        Self {
            data: self.data.clone(),
            header: self.header,
        }
    }
}
