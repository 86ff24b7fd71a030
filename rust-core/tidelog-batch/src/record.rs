// SPDX-License-Identifier: PMPL-1.0-or-later
//
// TideLog Record Batches - Individual records
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// A record is the smallest addressable log entry. Records never live on
// their own on disk; they are always decoded out of the body of a batch.
// Decoding is lazy: `RecordIter` walks the batch body one record at a time
// and hands out key/value payloads as zero-copy `Bytes` slices.

use bytes::{Buf, Bytes};

use crate::batch::{MAGIC_V0, MAGIC_V2, NO_TIMESTAMP};
use crate::error::{BatchError, BatchResult};

/// Fixed bytes per magic-2 record before the key/value payloads
/// (offset delta + timestamp delta + key length + value length).
pub const RECORD_OVERHEAD_V2: usize = 4 + 8 + 4 + 4;

/// A single decoded log record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// Absolute log offset of this record.
    pub offset: i64,
    /// Record timestamp in Unix milliseconds, or [`NO_TIMESTAMP`].
    pub timestamp: i64,
    /// Optional record key.
    pub key: Option<Bytes>,
    /// Optional record value.
    pub value: Option<Bytes>,
}

impl Record {
    /// The record's absolute offset.
    pub fn offset(&self) -> i64 {
        self.offset
    }

    /// The record's timestamp.
    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    /// Encoded size of the key/value payload section (length prefixes included).
    pub(crate) fn payload_size(&self) -> usize {
        8 + self.key.as_ref().map_or(0, Bytes::len) + self.value.as_ref().map_or(0, Bytes::len)
    }
}

/// Lazy iterator over the records inside one batch body.
///
/// Yields `Err` once on malformed input and then stops.
#[derive(Debug, Clone)]
pub struct RecordIter {
    body: Bytes,
    cursor: usize,
    remaining: u32,
    magic: u8,
    base_offset: i64,
    base_timestamp: i64,
    failed: bool,
}

impl RecordIter {
    /// Iterator over `count` magic-2 records encoded back to back in `body`.
    pub(crate) fn v2(body: Bytes, count: u32, base_offset: i64, base_timestamp: i64) -> Self {
        Self {
            body,
            cursor: 0,
            remaining: count,
            magic: MAGIC_V2,
            base_offset,
            base_timestamp,
            failed: false,
        }
    }

    /// Iterator over the single record of a legacy (magic 0/1) batch.
    pub(crate) fn legacy(body: Bytes, magic: u8, offset: i64, timestamp: i64) -> Self {
        let timestamp = if magic == MAGIC_V0 { NO_TIMESTAMP } else { timestamp };
        Self {
            body,
            cursor: 0,
            remaining: 1,
            magic,
            base_offset: offset,
            base_timestamp: timestamp,
            failed: false,
        }
    }

    /// An iterator that yields nothing.
    pub fn empty() -> Self {
        Self::v2(Bytes::new(), 0, 0, NO_TIMESTAMP)
    }

    fn decode_next(&mut self) -> BatchResult<Record> {
        let mut buf = &self.body[self.cursor..];

        let (offset, timestamp) = if self.magic == MAGIC_V2 {
            if buf.remaining() < 12 {
                return Err(BatchError::UnexpectedEof(self.cursor));
            }
            let offset_delta = buf.get_i32();
            let timestamp_delta = buf.get_i64();
            (
                self.base_offset.wrapping_add(i64::from(offset_delta)),
                self.base_timestamp.wrapping_add(timestamp_delta),
            )
        } else {
            (self.base_offset, self.base_timestamp)
        };

        let consumed = self.body.len() - self.cursor - buf.remaining();
        let mut position = self.cursor + consumed;
        let key = self.read_payload(&mut position)?;
        let value = self.read_payload(&mut position)?;
        self.cursor = position;

        Ok(Record {
            offset,
            timestamp,
            key,
            value,
        })
    }

    /// Read one length-prefixed payload starting at `position`; -1 means null.
    fn read_payload(&self, position: &mut usize) -> BatchResult<Option<Bytes>> {
        let mut buf = &self.body[*position..];
        if buf.remaining() < 4 {
            return Err(BatchError::UnexpectedEof(*position));
        }
        let length = buf.get_i32();
        *position += 4;
        if length == -1 {
            return Ok(None);
        }
        if length < 0 {
            return Err(BatchError::corrupt(
                0,
                format!("negative payload length {length} at byte {}", *position - 4),
            ));
        }
        let length = length as usize;
        if buf.remaining() < length {
            return Err(BatchError::UnexpectedEof(*position));
        }
        let payload = self.body.slice(*position..*position + length);
        *position += length;
        Ok(Some(payload))
    }
}

impl Iterator for RecordIter {
    type Item = BatchResult<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        match self.decode_next() {
            Ok(record) => Some(Ok(record)),
            Err(error) => {
                self.failed = true;
                Some(Err(error))
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        if self.failed {
            (0, Some(0))
        } else {
            (0, Some(self.remaining as usize))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::{BufMut, BytesMut};

    fn encode_v2_record(buf: &mut BytesMut, offset_delta: i32, ts_delta: i64, key: Option<&[u8]>, value: &[u8]) {
        buf.put_i32(offset_delta);
        buf.put_i64(ts_delta);
        match key {
            Some(key) => {
                buf.put_i32(key.len() as i32);
                buf.put_slice(key);
            }
            None => buf.put_i32(-1),
        }
        buf.put_i32(value.len() as i32);
        buf.put_slice(value);
    }

    #[test]
    fn test_v2_records_apply_deltas() {
        let mut body = BytesMut::new();
        encode_v2_record(&mut body, 0, 0, Some(b"k0"), b"v0");
        encode_v2_record(&mut body, 1, 15, None, b"v1");

        let records: Vec<Record> = RecordIter::v2(body.freeze(), 2, 100, 1_000)
            .collect::<BatchResult<_>>()
            .unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].offset, 100);
        assert_eq!(records[0].timestamp, 1_000);
        assert_eq!(records[0].key.as_deref(), Some(&b"k0"[..]));
        assert_eq!(records[1].offset, 101);
        assert_eq!(records[1].timestamp, 1_015);
        assert_eq!(records[1].key, None);
        assert_eq!(records[1].value.as_deref(), Some(&b"v1"[..]));
    }

    #[test]
    fn test_legacy_v0_has_no_timestamp() {
        let mut body = BytesMut::new();
        body.put_i32(-1);
        body.put_i32(3);
        body.put_slice(b"abc");

        let record = RecordIter::legacy(body.freeze(), MAGIC_V0, 7, 12345)
            .next()
            .unwrap()
            .unwrap();
        assert_eq!(record.offset, 7);
        assert_eq!(record.timestamp, NO_TIMESTAMP);
    }

    #[test]
    fn test_truncated_body_yields_one_error_then_stops() {
        let mut body = BytesMut::new();
        body.put_i32(0);
        body.put_i64(0);
        body.put_i32(10); // key claims 10 bytes, none follow

        let mut iter = RecordIter::v2(body.freeze(), 3, 0, 0);
        assert!(matches!(iter.next(), Some(Err(BatchError::UnexpectedEof(_)))));
        assert!(iter.next().is_none());
    }

    #[test]
    fn test_empty_iterator() {
        assert_eq!(RecordIter::empty().count(), 0);
    }
}
