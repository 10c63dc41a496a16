// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::{
    coding::{Decode, DecodeError},
    id::SegmentId,
    record::Record,
};
use std::{
    fs::File,
    io::{BufRead, BufReader},
    path::Path,
};

/// One entry yielded by [`SegmentReader`]: the decoded record together with the byte
/// offset (from the start of the file) its header began at.
pub struct ScannedRecord {
    pub record: Record,
    pub offset: u64,
}

/// Sequentially decodes every record in one segment file, in append order.
///
/// Used both by [`crate::Store::open`]'s replay and by the compactor's scan of frozen
/// segments. A `Corrupt` or `Truncated` record ends iteration (returns `None`) rather
/// than propagating an error: per the store's recovery policy, a torn tail is a benign
/// sign that the process died mid-append, not a fault to report.
pub struct SegmentReader {
    pub segment_id: SegmentId,
    inner: BufReader<File>,
    offset: u64,
    done: bool,
}

impl SegmentReader {
    pub fn new(path: impl AsRef<Path>, segment_id: SegmentId) -> std::io::Result<Self> {
        let file = File::open(path)?;
        Ok(Self {
            segment_id,
            inner: BufReader::new(file),
            offset: 0,
            done: false,
        })
    }

    /// True once a clean end-of-file or a torn tail has been observed.
    pub fn is_done(&self) -> bool {
        self.done
    }
}

impl Iterator for SegmentReader {
    type Item = ScannedRecord;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        // `fill_buf` without consuming lets us tell "nothing left at all" (clean EOF)
        // apart from "a record started but was cut short" (truncation) below.
        match self.inner.fill_buf() {
            Ok(buf) if buf.is_empty() => {
                self.done = true;
                return None;
            }
            Ok(_) => {}
            Err(_) => {
                self.done = true;
                return None;
            }
        }

        let start_offset = self.offset;

        match Record::decode_from(&mut self.inner) {
            Ok(record) => {
                self.offset = start_offset + record.framed_len() as u64;
                Some(ScannedRecord {
                    record,
                    offset: start_offset,
                })
            }
            Err(DecodeError::Truncated) => {
                self.done = true;
                log::debug!(
                    "segment {} truncated at offset {start_offset}, stopping replay",
                    self.segment_id
                );
                None
            }
            Err(DecodeError::ChecksumMismatch) => {
                self.done = true;
                log::warn!(
                    "segment {} corrupt record at offset {start_offset}, stopping replay",
                    self.segment_id
                );
                None
            }
            Err(_) => {
                self.done = true;
                None
            }
        }
    }
}
