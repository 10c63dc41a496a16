// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::coding::{Decode, DecodeError, Encode, EncodeError};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Read, Write};

/// Size of a record's fixed header: `key_len` (4) + `value_len` (4) + `crc32` (4).
pub const HEADER_LEN: usize = 12;

/// Sentinel written into the `value_len` field to mark a record as a tombstone.
const TOMBSTONE_VALUE_LEN: i32 = -1;

/// One framed entry in a segment file: a key together with either a value or a tombstone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub key: Box<[u8]>,
    pub body: RecordBody,
}

/// A record's payload: either a live value, or a tombstone recording a deletion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordBody {
    Value(Box<[u8]>),
    Tombstone,
}

impl Record {
    pub fn value(key: impl Into<Box<[u8]>>, value: impl Into<Box<[u8]>>) -> Self {
        Self {
            key: key.into(),
            body: RecordBody::Value(value.into()),
        }
    }

    pub fn tombstone(key: impl Into<Box<[u8]>>) -> Self {
        Self {
            key: key.into(),
            body: RecordBody::Tombstone,
        }
    }

    pub fn is_tombstone(&self) -> bool {
        matches!(self.body, RecordBody::Tombstone)
    }

    /// Total on-disk size of this record once framed: header + key + value.
    pub fn framed_len(&self) -> usize {
        let value_len = match &self.body {
            RecordBody::Value(v) => v.len(),
            RecordBody::Tombstone => 0,
        };
        HEADER_LEN + self.key.len() + value_len
    }

    fn checksum(&self) -> u32 {
        let mut hasher = crc32fast::Hasher::new();

        let key_len = u32::try_from(self.key.len()).unwrap_or(u32::MAX);
        let value_len: i32 = match &self.body {
            RecordBody::Value(v) => i32::try_from(v.len()).unwrap_or(i32::MAX),
            RecordBody::Tombstone => TOMBSTONE_VALUE_LEN,
        };

        hasher.update(&key_len.to_le_bytes());
        hasher.update(&value_len.to_le_bytes());
        hasher.update(&self.key);
        if let RecordBody::Value(v) = &self.body {
            hasher.update(v);
        }

        hasher.finalize()
    }
}

impl Encode for Record {
    fn encode_into<W: Write>(&self, writer: &mut W) -> Result<(), EncodeError> {
        let key_len = u32::try_from(self.key.len()).unwrap_or(u32::MAX);
        let value_len: i32 = match &self.body {
            RecordBody::Value(v) => i32::try_from(v.len()).unwrap_or(i32::MAX),
            RecordBody::Tombstone => TOMBSTONE_VALUE_LEN,
        };

        writer.write_u32::<LittleEndian>(key_len)?;
        writer.write_i32::<LittleEndian>(value_len)?;
        writer.write_u32::<LittleEndian>(self.checksum())?;
        writer.write_all(&self.key)?;
        if let RecordBody::Value(v) = &self.body {
            writer.write_all(v)?;
        }

        Ok(())
    }
}

impl Decode for Record {
    fn decode_from<R: Read>(reader: &mut R) -> Result<Self, DecodeError> {
        let key_len = reader.read_u32::<LittleEndian>()?;
        let value_len = reader.read_i32::<LittleEndian>()?;
        let stored_crc = reader.read_u32::<LittleEndian>()?;

        let mut key = vec![0u8; key_len as usize];
        reader.read_exact(&mut key)?;

        let body = if value_len == TOMBSTONE_VALUE_LEN {
            RecordBody::Tombstone
        } else if value_len < 0 {
            return Err(DecodeError::InvalidHeader);
        } else {
            let mut value = vec![0u8; value_len as usize];
            reader.read_exact(&mut value)?;
            RecordBody::Value(value.into_boxed_slice())
        };

        let record = Record {
            key: key.into_boxed_slice(),
            body,
        };

        if record.checksum() != stored_crc {
            return Err(DecodeError::ChecksumMismatch);
        }

        Ok(record)
    }
}
