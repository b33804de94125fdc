//! Sequential scan over a heap file.

use crate::buffer::{BufferPool, PageGuard};
use crate::error::{Result, ResultExt};
use crate::heap::{DataPageInfo, HeapFile};
use crate::types::Nid;

/// Iterator over every live node of a heap file, in directory order
///
/// Holds at most one directory page and one data page pinned at a time.
/// The file cannot be modified while a scan is open.
pub struct Scan<'a> {
    file: &'a HeapFile,
    dir: Option<PageGuard<'a>>,
    /// Last directory entry visited on `dir`
    entry: Option<Nid>,
    data: Option<PageGuard<'a>>,
    /// Last node returned from `data`
    last: Option<Nid>,
    done: bool,
}

impl<'a> Scan<'a> {
    pub(crate) fn new(file: &'a HeapFile) -> Result<Self> {
        file.check_live()?;
        let dir = file
            .pool()
            .fetch_page(file.first_dir_page())
            .context("scan: pin directory page")?;
        Ok(Self {
            file,
            dir: Some(dir),
            entry: None,
            data: None,
            last: None,
            done: false,
        })
    }

    fn advance(&mut self) -> Result<Option<(Nid, Vec<u8>)>> {
        let file = self.file;
        loop {
            if let Some(data) = &self.data {
                let page = data.read();
                let next = match self.last {
                    None => page.first_node(),
                    Some(nid) => page.next_node(nid),
                };
                if let Some(nid) = next {
                    let node = page.get_node(nid)?;
                    self.last = Some(nid);
                    return Ok(Some((nid, node)));
                }
            }
            self.data = None;
            self.last = None;

            let Some(dir) = &self.dir else {
                return Ok(None);
            };
            let (next_entry, next_dir) = {
                let page = dir.read();
                let next_entry = match self.entry {
                    None => page.first_node(),
                    Some(nid) => page.next_node(nid),
                };
                let next_entry = match next_entry {
                    Some(nid) => Some((nid, DataPageInfo::from_bytes(page.node(nid)?)?)),
                    None => None,
                };
                (next_entry, page.next_page())
            };

            match next_entry {
                Some((entry_nid, info)) => {
                    self.entry = Some(entry_nid);
                    self.data = Some(
                        file.pool()
                            .fetch_page(info.page_id)
                            .context("scan: pin data page")?,
                    );
                }
                None => {
                    self.dir = None;
                    self.entry = None;
                    if next_dir.is_valid() {
                        self.dir = Some(
                            file.pool()
                                .fetch_page(next_dir)
                                .context("scan: pin directory page")?,
                        );
                    }
                }
            }
        }
    }
}

impl<'a> Iterator for Scan<'a> {
    type Item = Result<(Nid, Vec<u8>)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.advance() {
            Ok(Some(item)) => Some(Ok(item)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                self.data = None;
                self.dir = None;
                Some(Err(e))
            }
        }
    }
}
