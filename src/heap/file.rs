//! Directory-based heap file.
//!
//! A heap file is a doubly linked chain of directory pages. Each directory
//! page is a slotted page whose nodes are [`DataPageInfo`] entries, one per
//! data page. Data pages are slotted pages holding client nodes.
//!
//! ```text
//!  dir 0 <-> dir 1 <-> ... <-> dir n
//!    |         |
//!  [info]    [info]   -> data page
//!  [info]    [info]   -> data page
//! ```
//!
//! The first directory page is registered in the file catalog under the
//! heap file's name and lives as long as the file. Other directory pages are
//! linked in when the last one fills up and spliced out once they hold no
//! entries. A data page is freed when its last node is deleted.
//!
//! Locating a node by [`Nid`] walks the directory chain linearly.

use crate::buffer::{BufferPool, BufferPoolImpl, PageGuardMut};
use crate::error::{Result, ResultExt, StorageError};
use crate::heap::{DataPageInfo, LabelField, Scan};
use crate::page::{PageDump, SlottedPage};
use crate::storage::FileCatalog;
use crate::types::{Nid, PageId, PageType, MAX_NODE_SIZE};
use serde::Serialize;
use std::collections::HashSet;
use std::hash::Hash;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, trace, warn};

static TEMP_FILE_COUNTER: AtomicUsize = AtomicUsize::new(0);

/// One directory page and its entries, for inspection
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectoryPageDump {
    pub page_id: PageId,
    pub prev_page: PageId,
    pub next_page: PageId,
    pub available_space: usize,
    pub entries: Vec<DataPageInfo>,
}

/// A pinned data page together with the directory entry that describes it
struct Located<'a> {
    dir: PageGuardMut<'a>,
    entry: Nid,
    data: PageGuardMut<'a>,
}

/// Iterate the `(directory nid, entry)` pairs of a directory page
pub(crate) fn dir_entries(
    dir: &SlottedPage,
) -> impl Iterator<Item = Result<(Nid, DataPageInfo)>> + '_ {
    dir.nids()
        .map(move |nid| Ok((nid, DataPageInfo::from_bytes(dir.node(nid)?)?)))
}

/// A heap file of variable-length nodes
pub struct HeapFile {
    pool: Arc<BufferPoolImpl>,
    name: String,
    first_dir_page: PageId,
    temporary: bool,
    deleted: bool,
}

impl HeapFile {
    /// Open the named heap file, creating it if the catalog has no entry
    ///
    /// With no name, a temporary file is created under a generated name. It
    /// is deleted when the handle is dropped.
    pub fn open(pool: Arc<BufferPoolImpl>, name: Option<&str>) -> Result<Self> {
        let (name, temporary) = match name {
            Some(name) => (name.to_string(), false),
            None => (Self::temp_name(&pool)?, true),
        };

        if let Some(root) = pool
            .lookup_file_root(&name)
            .context("open: look up file root")?
        {
            {
                let guard = pool
                    .fetch_page(root)
                    .context("open: pin first directory page")?;
                let page_type = guard.read().page_type();
                if page_type != PageType::Directory {
                    return Err(StorageError::invalid_page(format!(
                        "root page {} of {:?} is a {} page",
                        root,
                        name,
                        page_type.name()
                    )));
                }
            }
            debug!(file = %name, %root, "opened heap file");
            return Ok(Self {
                pool,
                name,
                first_dir_page: root,
                temporary,
                deleted: false,
            });
        }

        let root = {
            let (root, guard) = pool
                .new_page()
                .context("open: allocate first directory page")?;
            guard.write().set_page_type(PageType::Directory);
            root
        };
        if let Err(e) = pool.register_file_root(&name, root) {
            if let Err(free_err) = pool.free_page(root) {
                warn!(%root, error = %free_err, "failed to release unregistered directory page");
            }
            return Err(StorageError::collaborator("open: register file root", e));
        }
        debug!(file = %name, %root, temporary, "created heap file");

        Ok(Self {
            pool,
            name,
            first_dir_page: root,
            temporary,
            deleted: false,
        })
    }

    /// Generate a catalog name for a temporary file
    fn temp_name(pool: &BufferPoolImpl) -> Result<String> {
        let user = std::env::var("USER")
            .or_else(|_| std::env::var("USERNAME"))
            .unwrap_or_else(|_| "anonymous".to_string());
        loop {
            let n = TEMP_FILE_COUNTER.fetch_add(1, Ordering::Relaxed);
            let name = format!("tempHeapFile{}{}", user, n);
            if pool
                .lookup_file_root(&name)
                .context("open: look up file root")?
                .is_none()
            {
                return Ok(name);
            }
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn first_dir_page(&self) -> PageId {
        self.first_dir_page
    }

    pub fn is_temporary(&self) -> bool {
        self.temporary
    }

    pub(crate) fn pool(&self) -> &BufferPoolImpl {
        &self.pool
    }

    pub(crate) fn check_live(&self) -> Result<()> {
        if self.deleted {
            return Err(StorageError::FileAlreadyDeleted(self.name.clone()));
        }
        Ok(())
    }

    /// Insert a node and return its ID
    ///
    /// Walks the directory chain for the first data page with enough room.
    /// New data pages and directory pages are added as needed.
    pub fn insert_node(&mut self, node: &[u8]) -> Result<Nid> {
        self.check_live()?;
        if node.len() > MAX_NODE_SIZE {
            return Err(StorageError::NoSpaceAvailable {
                needed: node.len(),
                max: MAX_NODE_SIZE,
            });
        }

        let mut dir_id = self.first_dir_page;
        loop {
            let dir = self
                .pool
                .fetch_page_mut(dir_id)
                .context("insert_node: pin directory page")?;

            let fit = {
                let page = dir.read();
                let mut fit = None;
                for entry in dir_entries(&page) {
                    let (entry_nid, info) = entry?;
                    if info.avail_space as usize >= node.len() {
                        fit = Some((entry_nid, info));
                        break;
                    }
                }
                fit
            };

            if let Some((entry_nid, info)) = fit {
                let data = self
                    .pool
                    .fetch_page_mut(info.page_id)
                    .context("insert_node: pin data page")?;
                let (nid, updated) = {
                    let mut page = data.write();
                    let nid = page.insert_node(node).ok_or_else(|| {
                        StorageError::corruption(format!(
                            "data page {} has less room than its directory entry records",
                            info.page_id
                        ))
                    })?;
                    (nid, DataPageInfo::describe(&page))
                };
                updated.write_to(dir.write().node_mut(entry_nid)?)?;
                trace!(%nid, len = node.len(), "inserted node");
                return Ok(nid);
            }

            let (has_room, next) = {
                let page = dir.read();
                (
                    page.available_space() >= DataPageInfo::SIZE,
                    page.next_page(),
                )
            };

            if has_room {
                // Add a data page to this directory page, then search it again.
                let info = {
                    let (_, data) = self
                        .pool
                        .new_page()
                        .context("insert_node: allocate data page")?;
                    let mut page = data.write();
                    page.set_page_type(PageType::Data);
                    DataPageInfo::describe(&page)
                };
                let entry = dir.write().insert_node(&info.to_bytes());
                if entry.is_none() {
                    return Err(StorageError::corruption(format!(
                        "directory page {} rejected an entry it had room for",
                        dir_id
                    )));
                }
                debug!(file = %self.name, data_page = %info.page_id, dir_page = %dir_id, "added data page");
                continue;
            }

            if next.is_valid() {
                dir_id = next;
                continue;
            }

            let new_dir_id = {
                let (new_dir_id, new_dir) = self
                    .pool
                    .new_page()
                    .context("insert_node: allocate directory page")?;
                let mut page = new_dir.write();
                page.set_page_type(PageType::Directory);
                page.set_prev_page(dir_id);
                new_dir_id
            };
            dir.write().set_next_page(new_dir_id);
            debug!(file = %self.name, dir_page = %new_dir_id, prev = %dir_id, "linked directory page");
            dir_id = new_dir_id;
        }
    }

    /// Delete a node. Returns `false` if no data page of this file holds it.
    pub fn delete_node(&mut self, nid: Nid) -> Result<bool> {
        self.check_live()?;
        let Some(Located { dir, entry, data }) = self.find_data_page(nid)? else {
            return Ok(false);
        };

        let updated = {
            let mut page = data.write();
            page.delete_node(nid)?;
            DataPageInfo::describe(&page)
        };
        trace!(%nid, "deleted node");

        if updated.node_count > 0 {
            updated.write_to(dir.write().node_mut(entry)?)?;
            return Ok(true);
        }

        // Last node gone: drop the directory entry, then the data page. A
        // failed free leaves an unreferenced empty page, never a stale entry.
        drop(data);
        let (dir_id, empty, prev, next) = {
            let mut page = dir.write();
            page.delete_node(entry)?;
            (page.page_id(), page.is_empty(), page.prev_page(), page.next_page())
        };
        drop(dir);

        if empty && dir_id != self.first_dir_page {
            self.unlink_dir_page(dir_id, prev, next)?;
        }
        self.pool
            .free_page(nid.page_id)
            .context("delete_node: free data page")?;
        debug!(file = %self.name, data_page = %nid.page_id, dir_page = %dir_id, "freed data page");
        Ok(true)
    }

    /// Splice an empty directory page out of the chain and free it
    fn unlink_dir_page(&self, dir_id: PageId, prev: PageId, next: PageId) -> Result<()> {
        {
            let prev_guard = self
                .pool
                .fetch_page_mut(prev)
                .context("delete_node: pin previous directory page")?;
            prev_guard.write().set_next_page(next);
        }
        if next.is_valid() {
            let next_guard = self
                .pool
                .fetch_page_mut(next)
                .context("delete_node: pin next directory page")?;
            next_guard.write().set_prev_page(prev);
        }
        self.pool
            .free_page(dir_id)
            .context("delete_node: free directory page")?;
        debug!(file = %self.name, dir_page = %dir_id, %prev, %next, "unlinked directory page");
        Ok(())
    }

    /// Overwrite a node in place. The replacement must have the same length.
    ///
    /// Returns `false` if no data page of this file holds the node.
    pub fn update_node(&mut self, nid: Nid, node: &[u8]) -> Result<bool> {
        self.check_live()?;
        let Some(Located { data, .. }) = self.find_data_page(nid)? else {
            return Ok(false);
        };

        let expected = data.read().node(nid)?.len();
        if expected != node.len() {
            return Err(StorageError::InvalidUpdate {
                expected,
                actual: node.len(),
            });
        }
        data.write().node_mut(nid)?.copy_from_slice(node);
        trace!(%nid, "updated node");
        Ok(true)
    }

    /// Copy out a node, or `None` if no data page of this file holds it
    pub fn get_node(&self, nid: Nid) -> Result<Option<Vec<u8>>> {
        self.check_live()?;
        match self.find_data_page(nid)? {
            Some(Located { data, .. }) => Ok(Some(data.read().get_node(nid)?)),
            None => Ok(None),
        }
    }

    /// Walk the directory chain for the data page a node lives on
    ///
    /// Only the matching data page is pinned. Directory pages are pinned one
    /// at a time and released as the walk moves on.
    fn find_data_page(&self, nid: Nid) -> Result<Option<Located<'_>>> {
        let mut dir_id = self.first_dir_page;
        while dir_id.is_valid() {
            let dir = self
                .pool
                .fetch_page_mut(dir_id)
                .context("find_data_page: pin directory page")?;

            let (found, next) = {
                let page = dir.read();
                let mut found = None;
                for entry in dir_entries(&page) {
                    let (entry_nid, info) = entry?;
                    if info.page_id == nid.page_id {
                        found = Some(entry_nid);
                        break;
                    }
                }
                (found, page.next_page())
            };

            if let Some(entry) = found {
                let data = self
                    .pool
                    .fetch_page_mut(nid.page_id)
                    .context("find_data_page: pin data page")?;
                return Ok(Some(Located { dir, entry, data }));
            }
            dir_id = next;
        }
        Ok(None)
    }

    /// Visit each directory page in chain order, pinning one at a time
    fn for_each_dir_page<F>(&self, op: &'static str, mut visit: F) -> Result<()>
    where
        F: FnMut(&SlottedPage) -> Result<()>,
    {
        let mut dir_id = self.first_dir_page;
        while dir_id.is_valid() {
            let guard = self.pool.fetch_page(dir_id).context(op)?;
            let page = guard.read();
            visit(&*page)?;
            dir_id = page.next_page();
        }
        Ok(())
    }

    /// Total live nodes, summed over every directory entry
    pub fn node_count(&self) -> Result<usize> {
        self.check_live()?;
        let mut count = 0usize;
        self.for_each_dir_page("node_count: pin directory page", |page| {
            for entry in dir_entries(page) {
                count += entry?.1.node_count as usize;
            }
            Ok(())
        })?;
        Ok(count)
    }

    /// Number of distinct labels across all live nodes
    pub fn label_count(&self, field: LabelField) -> Result<usize> {
        self.label_count_by(|node| field.extract(node).map(<[u8]>::to_vec))
    }

    /// Number of distinct keys produced by `label_of` across all live nodes
    ///
    /// Nodes for which `label_of` returns `None` are not counted.
    pub fn label_count_by<K, F>(&self, mut label_of: F) -> Result<usize>
    where
        K: Eq + Hash,
        F: FnMut(&[u8]) -> Option<K>,
    {
        let mut seen = HashSet::new();
        for item in self.open_scan()? {
            let (_, node) = item?;
            if let Some(label) = label_of(&node) {
                seen.insert(label);
            }
        }
        Ok(seen.len())
    }

    /// Sequential scan over every live node
    pub fn open_scan(&self) -> Result<Scan<'_>> {
        Scan::new(self)
    }

    /// IDs of the directory pages in chain order
    pub fn directory_pages(&self) -> Result<Vec<PageId>> {
        self.check_live()?;
        let mut pages = Vec::new();
        self.for_each_dir_page("directory_pages: pin directory page", |page| {
            pages.push(page.page_id());
            Ok(())
        })?;
        Ok(pages)
    }

    /// IDs of the data pages in directory order
    pub fn data_pages(&self) -> Result<Vec<PageId>> {
        self.check_live()?;
        let mut pages = Vec::new();
        self.for_each_dir_page("data_pages: pin directory page", |page| {
            for entry in dir_entries(page) {
                pages.push(entry?.1.page_id);
            }
            Ok(())
        })?;
        Ok(pages)
    }

    /// The directory chain with every entry, for inspection
    pub fn directory_dump(&self) -> Result<Vec<DirectoryPageDump>> {
        self.check_live()?;
        let mut dump = Vec::new();
        self.for_each_dir_page("directory_dump: pin directory page", |page| {
            let entries = dir_entries(page)
                .map(|entry| entry.map(|(_, info)| info))
                .collect::<Result<Vec<_>>>()?;
            dump.push(DirectoryPageDump {
                page_id: page.page_id(),
                prev_page: page.prev_page(),
                next_page: page.next_page(),
                available_space: page.available_space(),
                entries,
            });
            Ok(())
        })?;
        Ok(dump)
    }

    /// Header and slot table of one page of this file
    pub fn page_dump(&self, page_id: PageId) -> Result<PageDump> {
        self.check_live()?;
        let owned = self.directory_pages()?.contains(&page_id)
            || self.data_pages()?.contains(&page_id);
        if !owned {
            return Err(StorageError::invalid_operation(format!(
                "page {} does not belong to {:?}",
                page_id, self.name
            )));
        }
        let guard = self
            .pool
            .fetch_page(page_id)
            .context("page_dump: pin page")?;
        let dump = guard.read().dump();
        Ok(dump)
    }

    /// Free every page of this file and remove it from the catalog
    pub fn delete_file(&mut self) -> Result<()> {
        self.check_live()?;

        let dir_pages = self.directory_pages()?;
        let data_pages = self.data_pages()?;

        // Nothing is freed unless every page can be.
        if let Some(&pinned) = data_pages
            .iter()
            .chain(&dir_pages)
            .find(|&&p| self.pool.pin_count(p) > 0)
        {
            return Err(StorageError::collaborator(
                "delete_file: free page",
                StorageError::PagePinned(pinned),
            ));
        }

        self.pool
            .unregister_file_root(&self.name)
            .context("delete_file: unregister file root")?;
        self.deleted = true;

        // The file is gone from the catalog; free what we can and report
        // the first failure.
        let mut first_err = None;
        for (&page_id, op) in data_pages
            .iter()
            .map(|p| (p, "delete_file: free data page"))
            .chain(dir_pages.iter().map(|p| (p, "delete_file: free directory page")))
        {
            if let Err(e) = self.pool.free_page(page_id).context(op) {
                warn!(file = %self.name, page = %page_id, error = %e, "failed to free page");
                first_err.get_or_insert(e);
            }
        }
        if let Some(e) = first_err {
            return Err(e);
        }

        debug!(
            file = %self.name,
            data_pages = data_pages.len(),
            dir_pages = dir_pages.len(),
            "deleted heap file"
        );
        Ok(())
    }
}

impl Drop for HeapFile {
    fn drop(&mut self) {
        if self.temporary && !self.deleted {
            if let Err(e) = self.delete_file() {
                warn!(file = %self.name, error = %e, "failed to delete temporary heap file");
            }
        }
    }
}

impl std::fmt::Debug for HeapFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HeapFile")
            .field("name", &self.name)
            .field("first_dir_page", &self.first_dir_page)
            .field("temporary", &self.temporary)
            .field("deleted", &self.deleted)
            .finish()
    }
}
