// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::{
    coding::Encode,
    id::SegmentId,
    segment::{self, SegmentReader},
    stats::CompactionReport,
    store::StoreInner,
    Result,
};
use std::{
    fs::File,
    io::{BufWriter, Write},
    sync::Arc,
    thread::JoinHandle,
};

/// Spawns the background watchdog thread: wakes every `compaction_check_interval`,
/// triggers a compaction pass once the garbage ratio crosses the configured
/// threshold, and exits once `shutdown` is signalled.
///
/// Mirrors a segment-store's GC loop: a dedicated OS thread parked on a timed sleep
/// rather than any async runtime, woken early only by shutdown.
pub(crate) fn spawn_watchdog(inner: Arc<StoreInner>) -> JoinHandle<()> {
    std::thread::spawn(move || {
        log::debug!("compaction watchdog started");

        loop {
            let shutdown_requested = inner.shutdown.wait(inner.config.compaction_check_interval);
            if shutdown_requested {
                break;
            }

            match maybe_compact(&inner) {
                Ok(Some(report)) => {
                    log::info!(
                        "scheduled compaction finished: {} segments scanned, {} rewritten, {} skipped, {} bytes reclaimed",
                        report.segments_scanned,
                        report.records_rewritten,
                        report.records_skipped,
                        report.bytes_reclaimed
                    );
                }
                Ok(None) => {}
                Err(e) => log::warn!("scheduled compaction failed: {e}"),
            }
        }

        log::debug!("compaction watchdog stopped");
    })
}

/// Evaluates the garbage-ratio trigger and runs a compaction pass if it is met.
/// Returns `Ok(None)` if compaction was not triggered (ratio below threshold, no
/// data yet, or a compaction is already running).
fn maybe_compact(inner: &Arc<StoreInner>) -> Result<Option<CompactionReport>> {
    {
        let state = inner.state.read().expect("lock poisoned");
        if state.compacting {
            return Ok(None);
        }
        if state.index.total_bytes() == 0 {
            return Ok(None);
        }
        if state.index.garbage_ratio() < inner.config.compaction_garbage_ratio {
            return Ok(None);
        }
    }

    run(inner).map(Some)
}

/// Runs one compaction pass unconditionally, honoring only the single-compaction gate.
/// Used both by the scheduled watchdog and by [`crate::Store::compact_now`].
pub(crate) fn run(inner: &Arc<StoreInner>) -> Result<CompactionReport> {
    {
        let mut state = inner.state.write().expect("lock poisoned");
        if state.compacting {
            return Ok(CompactionReport::default());
        }
        state.compacting = true;
    }

    let result = run_locked(inner);

    {
        let mut state = inner.state.write().expect("lock poisoned");
        state.compacting = false;
        if result.is_ok() {
            state.index.reset_total_to_live();
        }
    }

    result
}

/// A record that survived the scan's index peek, not yet applied to the index:
/// its original `(segment_id, offset)` (re-checked at apply time, since a put/delete
/// may have superseded it between the peek and the publish) and its new offset in
/// the published shadow segment.
struct PendingRelocation {
    key: Box<[u8]>,
    original_segment_id: SegmentId,
    original_offset: u64,
    new_offset: u64,
}

fn run_locked(inner: &Arc<StoreInner>) -> Result<CompactionReport> {
    // 1. Freeze: every segment id <= frozen_upto is now immutable. The shadow output
    // claims the next id, and new writes are rotated onto the id after that, so no
    // two (segment_id, offset) pairs ever collide.
    let frozen_upto = inner.segments.active_id();
    let shadow_id = inner.segments.reserve_id();
    inner.segments.rotate()?;

    log::info!("compaction starting: freezing segments up to id {frozen_upto}, output segment {shadow_id}");

    let frozen_segments = list_frozen_segments(&inner.dir, frozen_upto)?;
    let tmp_path = inner.segments.compaction_tmp_path();

    match scan_and_publish(inner, &frozen_segments, shadow_id, &tmp_path) {
        Ok((mut report, relocations)) => {
            apply_relocations_and_finalize(inner, &frozen_segments, shadow_id, relocations, &mut report);
            Ok(report)
        }
        Err(e) => {
            // Per §4.3.5: abort leaves the index and counters untouched. Nothing has
            // been applied to the index yet (relocations are only accumulated, never
            // written, until after a successful publish), so unlinking the temp file
            // is the only cleanup needed.
            if let Err(remove_err) = std::fs::remove_file(&tmp_path) {
                if remove_err.kind() != std::io::ErrorKind::NotFound {
                    log::warn!(
                        "failed to remove aborted compaction temp file {tmp_path:?}: {remove_err}"
                    );
                }
            }
            log::warn!("compaction aborted: {e}");
            Err(e)
        }
    }
}

/// Scans every frozen segment, copying records the index still points at into the
/// shadow segment, then fsyncs and atomically renames it into place as `shadow_id`'s
/// final segment file. Does not touch the index: surviving records are only
/// accumulated as [`PendingRelocation`]s, applied by the caller once publish has
/// succeeded.
fn scan_and_publish(
    inner: &Arc<StoreInner>,
    frozen_segments: &[SegmentId],
    shadow_id: SegmentId,
    tmp_path: &std::path::Path,
) -> Result<(CompactionReport, Vec<PendingRelocation>)> {
    let mut shadow = BufWriter::new(File::create(tmp_path)?);
    let mut shadow_offset: u64 = 0;

    let mut report = CompactionReport {
        segments_scanned: frozen_segments.len(),
        ..Default::default()
    };
    let mut relocations = Vec::new();

    for segment_id in frozen_segments {
        let reader = SegmentReader::new(inner.segments.path(*segment_id), *segment_id)?;

        for scanned in reader {
            let key = scanned.record.key.clone();

            let still_current = {
                let state = inner.state.read().expect("lock poisoned");
                state
                    .index
                    .get(&key)
                    .and_then(|e| e.location())
                    .is_some_and(|loc| loc == (*segment_id, scanned.offset))
            };

            if !still_current {
                report.records_skipped += 1;
                continue;
            }

            scanned.record.encode_into(&mut shadow)?;
            let new_offset = shadow_offset;
            shadow_offset += scanned.record.framed_len() as u64;

            relocations.push(PendingRelocation {
                key,
                original_segment_id: *segment_id,
                original_offset: scanned.offset,
                new_offset,
            });
        }
    }

    // Publish: fsync then atomically rename into place. Until this succeeds, the
    // index has not been touched, so any error here can abort cleanly.
    shadow.flush()?;
    shadow.get_ref().sync_all()?;
    drop(shadow);
    std::fs::rename(tmp_path, inner.segments.path(shadow_id))?;

    Ok((report, relocations))
}

/// Applies pending relocations to the index under a single exclusive lock, re-checking
/// each one since a put/delete may have superseded it between the scan's peek and this
/// publish-complete point, then deletes the now-redundant frozen segments.
fn apply_relocations_and_finalize(
    inner: &Arc<StoreInner>,
    frozen_segments: &[SegmentId],
    shadow_id: SegmentId,
    relocations: Vec<PendingRelocation>,
    report: &mut CompactionReport,
) {
    let bytes_before = {
        let mut state = inner.state.write().expect("lock poisoned");
        for relocation in relocations {
            let still_current = state
                .index
                .get(&relocation.key)
                .and_then(|e| e.location())
                .is_some_and(|loc| loc == (relocation.original_segment_id, relocation.original_offset));

            if still_current {
                state
                    .index
                    .relocate(&relocation.key, shadow_id, relocation.new_offset);
                report.records_rewritten += 1;
            } else {
                // Superseded between the peek above and this write: the copy just
                // appended to the shadow segment is harmless dead weight, reclaimed
                // by a future compaction.
                report.records_skipped += 1;
            }
        }
        state.index.total_bytes()
    };

    // Delete every segment whose live content has now been folded into the
    // published output (every segment we scanned).
    for segment_id in frozen_segments {
        let path = inner.segments.path(*segment_id);
        if let Err(e) = std::fs::remove_file(&path) {
            log::warn!("failed to remove compacted segment {path:?}: {e}");
        }
    }

    let bytes_after = {
        let state = inner.state.read().expect("lock poisoned");
        state.index.live_bytes()
    };
    report.bytes_reclaimed = bytes_before.saturating_sub(bytes_after);

    log::info!(
        "compaction finished: {} segments removed, {} records rewritten, {} bytes reclaimed",
        frozen_segments.len(),
        report.records_rewritten,
        report.bytes_reclaimed
    );
}

fn list_frozen_segments(dir: &std::path::Path, frozen_upto: SegmentId) -> Result<Vec<SegmentId>> {
    let mut ids = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let Some(id) = segment::parse_file_name(&entry.file_name().to_string_lossy()) else {
            continue;
        };
        if id <= frozen_upto {
            ids.push(id);
        }
    }
    ids.sort_unstable();
    Ok(ids)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Config, Store};
    use test_log::test;

    #[test]
    fn forced_compaction_reclaims_superseded_writes() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let store = Store::open(dir.path(), Config::new().without_watchdog())?;

        for i in 0..50 {
            store.put(b"k", format!("v{i}").as_bytes())?;
        }

        let before = store.stats();
        assert!(before.garbage_ratio > 0.5);

        let report = store.compact_now()?;
        assert!(report.records_rewritten >= 1);

        let after = store.stats();
        assert_eq!(after.total_bytes, after.live_bytes);
        assert_eq!(store.get(b"k")?.as_deref(), Some(b"v49".as_slice()));

        Ok(())
    }

    #[test]
    fn compaction_is_idempotent() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let store = Store::open(dir.path(), Config::new().without_watchdog())?;

        for i in 0..20 {
            store.put(b"k", format!("v{i}").as_bytes())?;
        }

        store.compact_now()?;
        let after_first = store.stats();

        let second = store.compact_now()?;
        let after_second = store.stats();

        assert_eq!(second.records_rewritten, 1);
        assert_eq!(after_first.live_bytes, after_second.live_bytes);
        assert_eq!(after_first.total_bytes, after_second.total_bytes);

        Ok(())
    }

    #[test]
    fn aborted_publish_leaves_old_segment_and_index_untouched() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let store = Store::open(dir.path(), Config::new().without_watchdog())?;

        for i in 0..20 {
            store.put(b"k", format!("v{i}").as_bytes())?;
        }
        let before = store.stats();

        // A fresh store's first compaction always freezes segment 1 and reserves
        // segment 2 as the shadow's destination. Occupying that destination with a
        // directory makes `scan_and_publish`'s final `rename` fail, forcing the abort
        // path without needing to inject a fault into the I/O itself.
        std::fs::create_dir(dir.path().join("wal-000002.log"))?;

        let result = store.compact_now();
        assert!(result.is_err());

        // The index is untouched: the key is still readable from its original segment.
        let after = store.stats();
        assert_eq!(before.total_bytes, after.total_bytes);
        assert_eq!(before.live_bytes, after.live_bytes);
        assert_eq!(store.get(b"k")?.as_deref(), Some(b"v19".as_slice()));

        // The temp file was unlinked rather than left as an orphan.
        assert!(!dir.path().join(crate::segment::COMPACTION_TMP_NAME).exists());

        Ok(())
    }
}
