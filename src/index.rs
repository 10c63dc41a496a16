// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::id::SegmentId;
use std::collections::HashMap;

/// Where a key's current value lives on disk, or a record that it was deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexEntry {
    Live {
        segment_id: SegmentId,
        offset: u64,
        size: u64,
    },
    Tombstone,
}

impl IndexEntry {
    pub fn size(&self) -> u64 {
        match self {
            Self::Live { size, .. } => *size,
            Self::Tombstone => 0,
        }
    }

    pub fn is_live(&self) -> bool {
        matches!(self, Self::Live { .. })
    }

    pub fn location(&self) -> Option<(SegmentId, u64)> {
        match self {
            Self::Live {
                segment_id, offset, ..
            } => Some((*segment_id, *offset)),
            Self::Tombstone => None,
        }
    }
}

/// In-memory key → location map plus the byte counters that drive compaction's
/// garbage-ratio trigger.
///
/// Mirrors a segment registry's bookkeeping role, but scoped to single keys rather
/// than whole segments: `total_bytes` is every framed byte ever appended and not yet
/// purged by compaction, `live_bytes` is the subset still reachable through a live
/// index entry.
#[derive(Default)]
pub struct Index {
    entries: HashMap<Box<[u8]>, IndexEntry>,
    total_bytes: u64,
    live_bytes: u64,
}

impl Index {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &[u8]) -> Option<IndexEntry> {
        self.entries.get(key).copied()
    }

    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    pub fn live_bytes(&self) -> u64 {
        self.live_bytes
    }

    pub fn key_count(&self) -> usize {
        self.entries.values().filter(|e| e.is_live()).count()
    }

    /// Adds `size` bytes that were appended to disk but are not (yet) reflected in
    /// `live_bytes` — used during replay and for tombstones.
    pub fn account_total(&mut self, size: u64) {
        self.total_bytes += size;
    }

    /// Inserts or overwrites the entry for `key`, adjusting `live_bytes` by the
    /// difference between the outgoing and incoming entry's sizes. Returns the entry
    /// that was replaced, if any.
    pub fn set(&mut self, key: Box<[u8]>, entry: IndexEntry) -> Option<IndexEntry> {
        if entry.is_live() {
            self.live_bytes += entry.size();
        }
        let previous = self.entries.insert(key, entry);
        if let Some(prev) = previous {
            if prev.is_live() {
                self.live_bytes -= prev.size();
            }
        }
        previous
    }

    /// Repoints an existing live entry's location without altering byte accounting,
    /// used by compaction when a surviving record is rewritten to a new segment.
    pub fn relocate(&mut self, key: &[u8], segment_id: SegmentId, offset: u64) {
        if let Some(entry) = self.entries.get_mut(key) {
            if let IndexEntry::Live {
                segment_id: sid,
                offset: off,
                ..
            } = entry
            {
                *sid = segment_id;
                *off = offset;
            }
        }
    }

    /// Sets `total_bytes` equal to `live_bytes`, as happens once compaction has
    /// rewritten every live record and deleted every stale segment.
    pub fn reset_total_to_live(&mut self) {
        self.total_bytes = self.live_bytes;
    }

    pub fn garbage_ratio(&self) -> f64 {
        if self.total_bytes == 0 {
            return 0.0;
        }
        (self.total_bytes - self.live_bytes) as f64 / self.total_bytes as f64
    }
}
