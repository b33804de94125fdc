//! Simple CLI for poking at a node store.
//!
//! Usage:
//!   nodeheap_cli <store_path> insert <file> <text>
//!   nodeheap_cli <store_path> get <file> <page> <slot>
//!   nodeheap_cli <store_path> update <file> <page> <slot> <text>
//!   nodeheap_cli <store_path> delete <file> <page> <slot>
//!   nodeheap_cli <store_path> scan <file>
//!   nodeheap_cli <store_path> count <file>
//!   nodeheap_cli <store_path> labels <file> <offset> <len>
//!   nodeheap_cli <store_path> dump <file> [page]
//!   nodeheap_cli <store_path> bulk_insert <file> <count> <size>
//!   nodeheap_cli <store_path> drop <file>
//!   nodeheap_cli <store_path> files
//!   nodeheap_cli <store_path> stats
//!
//! Set `RUST_LOG=nodeheap=debug` to trace page allocation and directory changes.

use nodeheap::{Config, HeapFile, LabelField, Nid, NodeStore, PageId};
use serde::Serialize;
use std::env;
use std::process::exit;
use tracing_subscriber::EnvFilter;

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("nodeheap=warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn usage() -> ! {
    eprintln!("Usage: nodeheap_cli <store_path> <command> [args...]");
    eprintln!("Commands:");
    eprintln!("  insert <file> <text>                - Insert a node, print its NID");
    eprintln!("  get <file> <page> <slot>            - Print a node");
    eprintln!("  update <file> <page> <slot> <text>  - Overwrite a node of the same length");
    eprintln!("  delete <file> <page> <slot>         - Delete a node");
    eprintln!("  scan <file>                         - Print every node");
    eprintln!("  count <file>                        - Count live nodes");
    eprintln!("  labels <file> <offset> <len>        - Count distinct labels");
    eprintln!("  dump <file> [page]                  - Directory chain or one page as JSON");
    eprintln!("  bulk_insert <file> <count> <size>   - Insert count nodes of size bytes");
    eprintln!("  drop <file>                         - Delete a heap file");
    eprintln!("  files                               - List heap files");
    eprintln!("  stats                               - Show store statistics");
    exit(1);
}

fn fail(msg: impl std::fmt::Display) -> ! {
    eprintln!("ERROR: {}", msg);
    exit(1);
}

fn arg<'a>(args: &'a [String], i: usize) -> &'a str {
    match args.get(i) {
        Some(s) => s.as_str(),
        None => usage(),
    }
}

fn num<T: std::str::FromStr>(args: &[String], i: usize, what: &str) -> T {
    match arg(args, i).parse() {
        Ok(n) => n,
        Err(_) => fail(format!("invalid {}: {}", what, arg(args, i))),
    }
}

fn nid_arg(args: &[String], i: usize) -> Nid {
    Nid::new(PageId::new(num(args, i, "page")), num(args, i + 1, "slot"))
}

fn open_file(store: &NodeStore, name: &str) -> HeapFile {
    match store.open_heap_file(name) {
        Ok(file) => file,
        Err(e) => fail(format!("failed to open heap file {:?}: {}", name, e)),
    }
}

fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{}", json),
        Err(e) => fail(e),
    }
}

fn main() {
    init_logging();
    let args: Vec<String> = env::args().collect();

    if args.len() < 3 {
        usage();
    }

    let store_path = &args[1];
    let command = &args[2];

    let store = match NodeStore::open(Config::new(store_path)) {
        Ok(store) => store,
        Err(e) => fail(format!("failed to open store: {}", e)),
    };

    match command.as_str() {
        "insert" => {
            let mut file = open_file(&store, arg(&args, 3));
            match file.insert_node(arg(&args, 4).as_bytes()) {
                Ok(nid) => println!("{} {}", nid.page_id, nid.slot_no),
                Err(e) => fail(e),
            }
        }

        "get" => {
            let file = open_file(&store, arg(&args, 3));
            match file.get_node(nid_arg(&args, 4)) {
                Ok(Some(node)) => match String::from_utf8(node) {
                    Ok(s) => println!("{}", s),
                    Err(_) => println!("<binary data>"),
                },
                Ok(None) => println!("NOT_FOUND"),
                Err(e) => fail(e),
            }
        }

        "update" => {
            let mut file = open_file(&store, arg(&args, 3));
            match file.update_node(nid_arg(&args, 4), arg(&args, 6).as_bytes()) {
                Ok(true) => println!("UPDATED"),
                Ok(false) => println!("NOT_FOUND"),
                Err(e) => fail(e),
            }
        }

        "delete" => {
            let mut file = open_file(&store, arg(&args, 3));
            match file.delete_node(nid_arg(&args, 4)) {
                Ok(true) => println!("DELETED"),
                Ok(false) => println!("NOT_FOUND"),
                Err(e) => fail(e),
            }
        }

        "scan" => {
            let file = open_file(&store, arg(&args, 3));
            let scan = match file.open_scan() {
                Ok(scan) => scan,
                Err(e) => fail(e),
            };
            let mut count = 0;
            for item in scan {
                match item {
                    Ok((nid, node)) => {
                        println!("{} -> {}", nid, String::from_utf8_lossy(&node));
                        count += 1;
                    }
                    Err(e) => fail(e),
                }
            }
            println!("COUNT: {}", count);
        }

        "count" => {
            let file = open_file(&store, arg(&args, 3));
            match file.node_count() {
                Ok(n) => println!("{}", n),
                Err(e) => fail(e),
            }
        }

        "labels" => {
            let file = open_file(&store, arg(&args, 3));
            let field = LabelField::new(num(&args, 4, "offset"), num(&args, 5, "len"));
            match file.label_count(field) {
                Ok(n) => println!("{}", n),
                Err(e) => fail(e),
            }
        }

        "dump" => {
            let file = open_file(&store, arg(&args, 3));
            if args.len() > 4 {
                match file.page_dump(PageId::new(num(&args, 4, "page"))) {
                    Ok(dump) => print_json(&dump),
                    Err(e) => fail(e),
                }
            } else {
                match file.directory_dump() {
                    Ok(dump) => print_json(&dump),
                    Err(e) => fail(e),
                }
            }
        }

        "bulk_insert" => {
            let mut file = open_file(&store, arg(&args, 3));
            let count: usize = num(&args, 4, "count");
            let size: usize = num(&args, 5, "size");

            let start = std::time::Instant::now();
            for i in 0..count {
                let mut node = format!("node_{:08}", i).into_bytes();
                node.resize(size, b'.');
                if let Err(e) = file.insert_node(&node) {
                    fail(format!("at {}: {}", i, e));
                }
            }
            let elapsed = start.elapsed();

            if let Err(e) = store.flush() {
                fail(format!("flushing: {}", e));
            }

            let ops_per_sec = count as f64 / elapsed.as_secs_f64();
            println!("INSERTED: {}", count);
            println!("TIME_MS: {}", elapsed.as_millis());
            println!("OPS_PER_SEC: {:.0}", ops_per_sec);
        }

        "drop" => match store.drop_heap_file(arg(&args, 3)) {
            Ok(true) => println!("DROPPED"),
            Ok(false) => println!("NOT_FOUND"),
            Err(e) => fail(e),
        },

        "files" => {
            for name in store.file_names() {
                println!("{}", name);
            }
        }

        "stats" => print_json(&store.stats()),

        _ => {
            eprintln!("Unknown command: {}", command);
            usage();
        }
    }

    // Ensure data is persisted
    if let Err(e) = store.flush() {
        eprintln!("Warning: Failed to flush: {}", e);
    }
}
