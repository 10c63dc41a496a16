// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! An embedded, durable, single-node key-value store built on the Bitcask
//! log-structured model.
//!
//! All writes are appended to a segmented, write-ahead log; an in-memory index maps
//! each key to the byte location of its most recent value. A background watchdog
//! reclaims space occupied by superseded or deleted records once the fraction of
//! garbage on disk crosses a configurable threshold.
//!
//! Use this store when:
//! - you want durable point reads/writes for small-to-medium values without running a
//!   separate database process
//! - your workload tolerates the store owning its directory outright (no external
//!   writers to the same files)
//! - you do not need range scans, secondary indexes, transactions spanning multiple
//!   keys, multi-node replication, or encryption at rest
//!
//! # Example usage
//!
//! ```
//! use bitlog::{Config, Store};
//!
//! # fn main() -> bitlog::Result<()> {
//! # let dir = tempfile::tempdir()?;
//! let store = Store::open(dir.path(), Config::new())?;
//!
//! store.put(b"hello", b"world")?;
//! assert_eq!(store.get(b"hello")?.as_deref(), Some(b"world".as_slice()));
//!
//! store.delete(b"hello")?;
//! assert_eq!(store.get(b"hello")?, None);
//! #
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![deny(clippy::all, missing_docs, clippy::cargo)]
#![deny(clippy::unwrap_used)]
#![warn(clippy::pedantic, clippy::nursery)]
#![warn(clippy::expect_used)]
#![allow(clippy::missing_const_for_fn)]
#![warn(clippy::multiple_crate_versions)]

mod coding;
mod compaction;
mod config;
mod error;
mod id;
mod index;
mod record;
mod segment;
mod stats;
mod store;

pub use {
    config::Config,
    error::{Error, Result},
    stats::{CompactionReport, StoreStats},
    store::Store,
};

#[doc(hidden)]
pub use {
    id::SegmentId,
    index::{Index, IndexEntry},
    record::{Record, RecordBody},
    segment::{SegmentManager, SegmentReader},
};
