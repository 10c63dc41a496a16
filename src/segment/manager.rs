// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use super::{file_name, parse_file_name};
use crate::{
    coding::Encode,
    id::{IdGenerator, SegmentId},
    record::Record,
    Result,
};
use std::{
    fs::{File, OpenOptions},
    io::{BufWriter, Write},
    path::{Path, PathBuf},
    sync::Mutex,
};

struct ActiveSegment {
    id: SegmentId,
    file: BufWriter<File>,
    size: u64,
}

/// Owns the set of segment files living in a store directory: which one is currently
/// active (append target), how to name and locate any segment by ID, and when to roll
/// over to a fresh one.
///
/// Appends and rotations are serialized under a single mutex so that the pair
/// `(segment_id, offset)` returned by [`SegmentManager::append`] is always consistent
/// with what actually landed on disk.
pub struct SegmentManager {
    dir: PathBuf,
    ids: IdGenerator,
    max_size: u64,
    active: Mutex<ActiveSegment>,
}

impl SegmentManager {
    /// Opens (creating if necessary) the segment manager for `dir`, scanning existing
    /// segment files to resume the ID counter and opening a fresh active segment.
    ///
    /// Returns the manager together with the sorted list of segment IDs that already
    /// existed on disk, so the caller can replay them in order.
    pub fn open(dir: impl Into<PathBuf>, max_size: u64) -> Result<(Self, Vec<SegmentId>)> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;

        let mut existing = Vec::new();
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            let Some(id) = parse_file_name(&entry.file_name().to_string_lossy()) else {
                continue;
            };
            existing.push(id);
        }
        existing.sort_unstable();

        let next_id = existing.last().map_or(1, |id| id + 1);
        let ids = IdGenerator::new(next_id);
        let active_id = ids.next();

        log::debug!("opening segment manager at {dir:?}, active segment {active_id}, {} existing segments", existing.len());

        let active = open_active(&dir, active_id)?;

        Ok((
            Self {
                dir,
                ids,
                max_size,
                active: Mutex::new(active),
            },
            existing,
        ))
    }

    /// Returns the deterministic path for a segment ID, whether or not it currently exists.
    pub fn path(&self, id: SegmentId) -> PathBuf {
        self.dir.join(file_name(id))
    }

    /// Path to the temporary file a compaction pass writes its shadow segment to.
    pub fn compaction_tmp_path(&self) -> PathBuf {
        self.dir.join(super::COMPACTION_TMP_NAME)
    }

    /// The directory this manager is rooted at.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// ID of the segment currently receiving appends.
    pub fn active_id(&self) -> SegmentId {
        self.active.lock().expect("lock poisoned").id
    }

    /// Hands out the next segment ID without creating a file for it, e.g. so the
    /// compactor can name its shadow segment's eventual destination ahead of time.
    pub fn reserve_id(&self) -> SegmentId {
        self.ids.next()
    }

    /// Appends one record to the active segment, fsyncing before returning, and rotates
    /// to a fresh segment if the active segment has grown past `max_size`.
    ///
    /// Returns the `(segment_id, offset)` the record was written at; this always names
    /// the segment active *before* any rotation triggered by this call.
    pub fn append(&self, record: &Record) -> Result<(SegmentId, u64)> {
        let mut active = self.active.lock().expect("lock poisoned");

        let offset = active.size;
        let id = active.id;

        record.encode_into(&mut active.file)?;
        active.file.flush()?;
        active.file.get_ref().sync_all()?;

        active.size += record.framed_len() as u64;

        if active.size >= self.max_size {
            self.rotate_locked(&mut active)?;
        }

        Ok((id, offset))
    }

    /// Explicitly rotates to a fresh active segment, returning its ID.
    ///
    /// Used by the compactor to freeze every existing segment before scanning them.
    pub fn rotate(&self) -> Result<SegmentId> {
        let mut active = self.active.lock().expect("lock poisoned");
        self.rotate_locked(&mut active)
    }

    fn rotate_locked(&self, active: &mut ActiveSegment) -> Result<SegmentId> {
        let new_id = self.ids.next();
        log::debug!("rotating segment {} -> {new_id}", active.id);
        *active = open_active(&self.dir, new_id)?;
        Ok(new_id)
    }
}

fn open_active(dir: &Path, id: SegmentId) -> Result<ActiveSegment> {
    let path = dir.join(file_name(id));
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)?;
    let size = file.metadata()?.len();

    Ok(ActiveSegment {
        id,
        file: BufWriter::new(file),
        size,
    })
}
