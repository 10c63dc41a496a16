// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::{
    coding::Decode,
    compaction,
    config::Config,
    index::{Index, IndexEntry},
    record::{Record, RecordBody},
    segment::{self, SegmentManager, SegmentReader},
    stats::{CompactionReport, StoreStats},
    Error, Result,
};
use std::{
    path::{Path, PathBuf},
    sync::{Arc, Condvar, Mutex, RwLock},
    thread::JoinHandle,
};

/// Signals the background watchdog thread to stop, and lets it be woken early instead
/// of waiting out a full tick.
pub(crate) struct Shutdown {
    pub(crate) requested: Mutex<bool>,
    pub(crate) cond: Condvar,
}

impl Shutdown {
    fn new() -> Self {
        Self {
            requested: Mutex::new(false),
            cond: Condvar::new(),
        }
    }

    pub(crate) fn signal(&self) {
        *self.requested.lock().expect("lock poisoned") = true;
        self.cond.notify_all();
    }

    pub(crate) fn is_requested(&self) -> bool {
        *self.requested.lock().expect("lock poisoned")
    }

    /// Sleeps for up to `timeout`, waking early if `signal` is called. Returns `true`
    /// if shutdown was requested.
    pub(crate) fn wait(&self, timeout: std::time::Duration) -> bool {
        let guard = self.requested.lock().expect("lock poisoned");
        let (guard, _) = self
            .cond
            .wait_timeout_while(guard, timeout, |requested| !*requested)
            .expect("lock poisoned");
        *guard
    }
}

/// Combined, single-lock-guarded state: the index and its byte counters, plus the
/// `compacting` gate that allows at most one compaction to run at a time.
pub(crate) struct State {
    pub(crate) index: Index,
    pub(crate) compacting: bool,
}

pub(crate) struct StoreInner {
    pub(crate) dir: PathBuf,
    pub(crate) config: Config,
    pub(crate) segments: SegmentManager,
    pub(crate) state: RwLock<State>,
    pub(crate) shutdown: Arc<Shutdown>,
    watchdog: Mutex<Option<JoinHandle<()>>>,
}

/// An embedded, durable, single-node key-value store backed by a segmented,
/// append-only write-ahead log.
///
/// Cloning a `Store` is cheap and shares the same underlying state (it is an
/// `Arc` handle), the way a value log handle is shared across threads.
#[derive(Clone)]
pub struct Store(Arc<StoreInner>);

impl Store {
    /// Opens the store rooted at `dir`, creating it if it does not exist, and replaying
    /// any existing segments to rebuild the in-memory index.
    ///
    /// # Errors
    ///
    /// Returns `Err` if the directory cannot be created or read, or if the segment
    /// manager cannot open its active segment.
    pub fn open(dir: impl AsRef<Path>, config: Config) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        let (segments, existing_ids) = SegmentManager::open(&dir, config.max_segment_size)?;

        // A crash or failed compaction can leave `wal-compact.tmp` behind: it was never
        // renamed into place, so it holds no live data and is safe to discard.
        if let Err(e) = std::fs::remove_file(segments.compaction_tmp_path()) {
            if e.kind() != std::io::ErrorKind::NotFound {
                log::warn!("failed to remove leftover compaction temp file: {e}");
            }
        }

        let mut index = Index::new();
        for segment_id in existing_ids {
            replay_segment(&segments, segment_id, &mut index)?;
        }

        log::info!(
            "opened store at {dir:?}: {} live keys, {} total bytes, {} live bytes",
            index.key_count(),
            index.total_bytes(),
            index.live_bytes()
        );

        let inner = Arc::new(StoreInner {
            dir,
            config: config.clone(),
            segments,
            state: RwLock::new(State {
                index,
                compacting: false,
            }),
            shutdown: Arc::new(Shutdown::new()),
            watchdog: Mutex::new(None),
        });

        if config.watchdog_enabled {
            let handle = compaction::spawn_watchdog(Arc::clone(&inner));
            *inner.watchdog.lock().expect("lock poisoned") = Some(handle);
        }

        Ok(Self(inner))
    }

    /// Writes `value` for `key`, superseding any previous value or tombstone.
    ///
    /// # Errors
    ///
    /// Returns `Err` on any I/O failure appending the record.
    pub fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        let record = Record::value(key.to_vec(), value.to_vec());
        let size = record.framed_len() as u64;

        let mut state = self.0.state.write().expect("lock poisoned");
        let (segment_id, offset) = self.0.segments.append(&record)?;

        state.index.account_total(size);
        state.index.set(
            key.to_vec().into_boxed_slice(),
            IndexEntry::Live {
                segment_id,
                offset,
                size,
            },
        );

        Ok(())
    }

    /// Marks `key` as deleted. A subsequent `get` returns not-found, and compaction
    /// eventually reclaims the space occupied by the superseded value and the
    /// tombstone itself.
    ///
    /// # Errors
    ///
    /// Returns `Err` on any I/O failure appending the tombstone record.
    pub fn delete(&self, key: &[u8]) -> Result<()> {
        let record = Record::tombstone(key.to_vec());
        let size = record.framed_len() as u64;

        let mut state = self.0.state.write().expect("lock poisoned");
        self.0.segments.append(&record)?;

        // Per the store's tombstone-accounting policy, the tombstone's own bytes count
        // toward total_bytes only, never live_bytes, so compaction reclaims them.
        state.index.account_total(size);
        state
            .index
            .set(key.to_vec().into_boxed_slice(), IndexEntry::Tombstone);

        Ok(())
    }

    /// Looks up `key`, returning its current value if one is live.
    ///
    /// # Errors
    ///
    /// Returns `Err` if the segment file is missing, the record is corrupt, or the
    /// decoded record's key does not match `key` (an index/segment inconsistency).
    pub fn get(&self, key: &[u8]) -> Result<Option<Box<[u8]>>> {
        let entry = {
            let state = self.0.state.read().expect("lock poisoned");
            state.index.get(key)
        };

        let Some((segment_id, offset)) = entry.and_then(|e| e.location()) else {
            return Ok(None);
        };

        let mut file = std::fs::File::open(self.0.segments.path(segment_id))?;
        use std::io::{Seek, SeekFrom};
        file.seek(SeekFrom::Start(offset))?;

        let record = Record::decode_from(&mut file)?;
        if &*record.key != key {
            return Err(Error::Corrupt);
        }

        match record.body {
            RecordBody::Value(v) => Ok(Some(v)),
            RecordBody::Tombstone => Ok(None),
        }
    }

    /// Forces a compaction pass immediately, bypassing the garbage-ratio check (the
    /// single-compaction-at-a-time gate still applies).
    ///
    /// # Errors
    ///
    /// Returns `Err` if the compaction's I/O fails.
    pub fn compact_now(&self) -> Result<CompactionReport> {
        compaction::run(&self.0)
    }

    /// Returns a snapshot of the store's size and liveness accounting.
    pub fn stats(&self) -> StoreStats {
        let state = self.0.state.read().expect("lock poisoned");
        StoreStats {
            total_bytes: state.index.total_bytes(),
            live_bytes: state.index.live_bytes(),
            garbage_ratio: state.index.garbage_ratio(),
            segment_count: count_segments(&self.0.dir),
            active_segment_id: self.0.segments.active_id(),
            key_count: state.index.key_count(),
        }
    }

    /// Signals the background compaction watchdog to stop and waits for it to finish
    /// (an in-flight compaction is allowed to run to completion or to its own abort
    /// path before this returns).
    pub fn close(self) {
        self.0.shutdown.signal();
        if let Some(handle) = self.0.watchdog.lock().expect("lock poisoned").take() {
            let _ = handle.join();
        }
    }
}

fn count_segments(dir: &Path) -> usize {
    std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(std::result::Result::ok)
                .filter(|e| segment::parse_file_name(&e.file_name().to_string_lossy()).is_some())
                .count()
        })
        .unwrap_or(0)
}

fn replay_segment(
    segments: &SegmentManager,
    segment_id: u64,
    index: &mut Index,
) -> Result<()> {
    let reader = SegmentReader::new(segments.path(segment_id), segment_id)?;

    for scanned in reader {
        let size = scanned.record.framed_len() as u64;
        index.account_total(size);

        match scanned.record.body {
            RecordBody::Value(_) => {
                index.set(
                    scanned.record.key,
                    IndexEntry::Live {
                        segment_id,
                        offset: scanned.offset,
                        size,
                    },
                );
            }
            RecordBody::Tombstone => {
                index.set(scanned.record.key, IndexEntry::Tombstone);
            }
        }
    }

    Ok(())
}
