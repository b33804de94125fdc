//! Heap files: unordered collections of nodes spread over many pages.
//!
//! Built on the slotted page format, with a chain of directory pages
//! indexing the data pages and the free space left on each.

mod file;
mod label;
mod page_info;
mod scan;

pub use file::{DirectoryPageDump, HeapFile};
pub use label::LabelField;
pub use page_info::DataPageInfo;
pub use scan::Scan;
