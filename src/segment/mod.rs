// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

pub mod manager;
pub mod reader;

pub use manager::SegmentManager;
pub use reader::SegmentReader;

use crate::id::SegmentId;

/// Formats a segment's on-disk file name from its ID.
///
/// Segment files are named `wal-NNNNNN.log`, zero-padded to 6 digits; IDs beyond
/// `999_999` simply widen the numeric part rather than truncating.
pub(crate) fn file_name(id: SegmentId) -> String {
    format!("wal-{id:06}.log")
}

/// Name of the temporary file a compaction writes its output to before the
/// atomic rename that publishes it as `wal-NNNNNN.log`.
pub(crate) const COMPACTION_TMP_NAME: &str = "wal-compact.tmp";

/// Parses a directory entry's file name as a segment ID, recognizing only
/// `wal-NNNNNN.log`. Notably, this rejects `wal-compact.tmp` (no `.log` suffix), the
/// one other file the store ever places in a store directory, so callers that list
/// segments never need a second, separate exclusion for it.
pub(crate) fn parse_file_name(name: &str) -> Option<SegmentId> {
    let digits = name.strip_prefix("wal-")?.strip_suffix(".log")?;
    digits.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_name_is_zero_padded() {
        assert_eq!(file_name(1), "wal-000001.log");
        assert_eq!(file_name(0), "wal-000000.log");
    }

    #[test]
    fn file_name_widens_past_six_digits() {
        assert_eq!(file_name(1_000_000), "wal-1000000.log");
    }

    #[test]
    fn parse_file_name_roundtrips_through_file_name() {
        assert_eq!(parse_file_name(&file_name(42)), Some(42));
    }

    #[test]
    fn parse_file_name_rejects_the_compaction_temp_file() {
        assert_eq!(parse_file_name(COMPACTION_TMP_NAME), None);
    }

    #[test]
    fn parse_file_name_rejects_unrelated_names() {
        assert_eq!(parse_file_name("README.md"), None);
        assert_eq!(parse_file_name("wal-abc.log"), None);
    }
}
