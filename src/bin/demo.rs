// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Walks through opening a store, writing and reading a handful of keys, deleting one,
//! and forcing a compaction pass, printing the store's stats along the way.

use bitlog::{Config, Store};
use std::path::Path;

fn main() -> bitlog::Result<()> {
    let dir = Path::new("demo_data");
    if dir.try_exists()? {
        std::fs::remove_dir_all(dir)?;
    }

    let store = Store::open(dir, Config::new())?;

    for key in ["a", "b", "c", "d", "e"] {
        store.put(key.as_bytes(), key.repeat(10).as_bytes())?;
    }

    for key in ["a", "b", "c", "d", "e"] {
        let value = store.get(key.as_bytes())?;
        println!("{key} -> {value:?}");
    }

    store.delete(b"c")?;
    println!("after delete, c -> {:?}", store.get(b"c")?);

    // Overwrite "a" enough times to push the garbage ratio over the compaction
    // threshold, then force a pass instead of waiting on the watchdog.
    for i in 0..20 {
        store.put(b"a", format!("a{i}").as_bytes())?;
    }

    let report = store.compact_now()?;
    println!(
        "compacted: {} segments scanned, {} rewritten, {} skipped, {} bytes reclaimed",
        report.segments_scanned, report.records_rewritten, report.records_skipped, report.bytes_reclaimed
    );

    println!("{:#?}", store.stats());

    store.close();

    Ok(())
}
