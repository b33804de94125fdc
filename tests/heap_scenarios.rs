//! End-to-end heap file scenarios over file-backed and in-memory stores.

use nodeheap::{
    BufferPool, Config, HeapFile, Nid, NodeStore, Result, StorageError, MAX_NODE_SIZE,
};
use tempfile::tempdir;

fn fixed_node(i: usize, len: usize) -> Vec<u8> {
    let mut node = format!("{:06}", i).into_bytes();
    node.resize(len, b'#');
    node
}

fn assert_no_pins(store: &NodeStore, file: &HeapFile) -> Result<()> {
    let pool = store.buffer_pool();
    for page in file.directory_pages()?.into_iter().chain(file.data_pages()?) {
        assert_eq!(pool.pin_count(page), 0, "page {} still pinned", page);
    }
    Ok(())
}

fn insert_all(file: &mut HeapFile, count: usize, len: usize) -> Result<Vec<Nid>> {
    (0..count).map(|i| file.insert_node(&fixed_node(i, len))).collect()
}

#[test]
fn five_hundred_fixed_nodes_then_delete_all() -> Result<()> {
    let dir = tempdir().unwrap();
    let store = NodeStore::open(Config::new(dir.path().join("graph.db")).buffer_pool_size(16))?;
    let mut file = store.open_heap_file("nodes")?;

    let nids = insert_all(&mut file, 500, 50)?;
    assert_eq!(file.node_count()?, 500);
    assert!(file.data_pages()?.len() > 1);

    for (i, nid) in nids.iter().enumerate() {
        assert_eq!(file.get_node(*nid)?, Some(fixed_node(i, 50)));
    }

    let sum: u32 = file
        .directory_dump()?
        .iter()
        .flat_map(|d| d.entries.iter())
        .map(|e| e.node_count)
        .sum();
    assert_eq!(sum, 500);

    for nid in nids {
        assert!(file.delete_node(nid)?);
    }
    let dump = file.directory_dump()?;
    assert_eq!(dump.len(), 1);
    assert_eq!(dump[0].page_id, file.first_dir_page());
    assert!(dump[0].entries.is_empty());
    assert_eq!(file.node_count()?, 0);
    assert_no_pins(&store, &file)?;
    Ok(())
}

#[test]
fn directory_chain_grows_and_shrinks_back() -> Result<()> {
    let store = NodeStore::open(Config::in_memory().buffer_pool_size(16))?;
    let mut file = store.open_heap_file("nodes")?;

    let nids = insert_all(&mut file, 1500, 50)?;
    let dirs = file.directory_pages()?;
    assert!(dirs.len() >= 2, "expected a second directory page");
    assert_eq!(file.node_count()?, 1500);

    let dump = file.directory_dump()?;
    for pair in dump.windows(2) {
        assert_eq!(pair[0].next_page, pair[1].page_id);
        assert_eq!(pair[1].prev_page, pair[0].page_id);
    }

    // Delete newest first so trailing directory pages empty out one by one.
    for nid in nids.into_iter().rev() {
        assert!(file.delete_node(nid)?);
    }
    assert_eq!(file.directory_pages()?, vec![dirs[0]]);
    let dump = file.directory_dump()?;
    assert!(dump[0].entries.is_empty());
    assert!(!dump[0].next_page.is_valid());
    assert_no_pins(&store, &file)?;
    Ok(())
}

#[test]
fn exact_fit_then_spill_to_new_page() -> Result<()> {
    let store = NodeStore::open(Config::in_memory())?;
    let mut file = store.open_heap_file("nodes")?;

    let first = file.insert_node(&fixed_node(0, 200))?;
    let avail = file.directory_dump()?[0].entries[0].avail_space as usize;

    let exact = file.insert_node(&fixed_node(1, avail))?;
    assert_eq!(exact.page_id, first.page_id);

    let spill = file.insert_node(&fixed_node(2, 1))?;
    assert_ne!(spill.page_id, first.page_id);
    assert_eq!(file.data_pages()?.len(), 2);

    let too_big = file.insert_node(&vec![0u8; MAX_NODE_SIZE + 1]);
    assert!(matches!(too_big, Err(StorageError::NoSpaceAvailable { .. })));
    assert_eq!(file.node_count()?, 3);
    assert_no_pins(&store, &file)?;
    Ok(())
}

#[test]
fn update_with_different_length_is_rejected() -> Result<()> {
    let store = NodeStore::open(Config::in_memory())?;
    let mut file = store.open_heap_file("nodes")?;
    let nid = file.insert_node(b"person:alice")?;

    let err = file.update_node(nid, b"person:bob").unwrap_err();
    assert!(matches!(err, StorageError::InvalidUpdate { .. }));
    assert_eq!(file.get_node(nid)?, Some(b"person:alice".to_vec()));
    assert_no_pins(&store, &file)?;

    assert!(file.update_node(nid, b"person:carol")?);
    assert_eq!(file.get_node(nid)?, Some(b"person:carol".to_vec()));
    Ok(())
}

#[test]
fn files_survive_reopen() -> Result<()> {
    let dir = tempdir().unwrap();
    let path = dir.path().join("graph.db");

    let (kept, removed) = {
        let store = NodeStore::open(Config::new(&path).buffer_pool_size(4))?;
        let mut file = store.open_heap_file("edges")?;
        let nids = insert_all(&mut file, 300, 40)?;
        let (kept, removed) = nids.split_at(150);
        for nid in removed {
            assert!(file.delete_node(*nid)?);
        }
        store.flush()?;
        (kept.to_vec(), removed.to_vec())
    };

    let store = NodeStore::open(Config::new(&path))?;
    let file = store.open_heap_file("edges")?;
    assert_eq!(file.node_count()?, kept.len());
    for (i, nid) in kept.iter().enumerate() {
        assert_eq!(file.get_node(*nid)?, Some(fixed_node(i, 40)));
    }
    let scanned = file.open_scan()?.count();
    assert_eq!(scanned, kept.len());
    for nid in removed {
        // Either the page is gone or the slot is empty.
        assert!(!matches!(file.get_node(nid), Ok(Some(_))));
    }
    Ok(())
}
