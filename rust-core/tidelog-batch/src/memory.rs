// SPDX-License-Identifier: PMPL-1.0-or-later
//
// TideLog Record Batches - In-memory record buffers
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// `MemoryRecords` is an immutable buffer of zero or more encoded batches,
// ready to be appended to a segment file in one write. `MemoryRecordsBuilder`
// assembles such a buffer from individual key/value records.

use std::io::Write;

use bytes::{Bytes, BytesMut};
use chrono::Utc;
use tracing::trace;

use crate::batch::{
    encode_legacy, encode_v2, BatchHeader, BatchView, HEADER_SIZE_UP_TO_MAGIC, MAGIC_V2,
};
use crate::error::{BatchError, BatchResult};
use crate::record::Record;

// ---------------------------------------------------------------------------
// MemoryRecords
// ---------------------------------------------------------------------------

/// An immutable in-memory sequence of encoded batches.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryRecords {
    buffer: Bytes,
}

impl MemoryRecords {
    /// Wrap an already-encoded buffer. The contents are not validated here;
    /// iterating [`MemoryRecords::batches`] reports malformed batches.
    pub fn readable(buffer: Bytes) -> Self {
        Self { buffer }
    }

    /// A buffer holding no batches.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Total encoded size in bytes.
    pub fn size_in_bytes(&self) -> usize {
        self.buffer.len()
    }

    /// Whether the buffer holds no bytes.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// The raw encoded bytes.
    pub fn buffer(&self) -> &Bytes {
        &self.buffer
    }

    /// Iterate the batches in this buffer, front to back.
    pub fn batches(&self) -> MemoryBatches {
        MemoryBatches {
            buffer: self.buffer.clone(),
            position: 0,
            failed: false,
        }
    }

    /// Write every buffered byte to `out`, returning the number written.
    pub fn write_fully_to<W: Write + ?Sized>(&self, out: &mut W) -> std::io::Result<usize> {
        out.write_all(&self.buffer)?;
        trace!(bytes = self.buffer.len(), "Wrote memory records");
        Ok(self.buffer.len())
    }
}

/// Iterator over the batches of a [`MemoryRecords`] buffer.
///
/// Trailing bytes too short to hold a batch header, or a final batch cut
/// short, end the iteration silently. A malformed header yields one error.
#[derive(Debug, Clone)]
pub struct MemoryBatches {
    buffer: Bytes,
    position: usize,
    failed: bool,
}

impl Iterator for MemoryBatches {
    type Item = BatchResult<BatchView>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.buffer.len() - self.position < HEADER_SIZE_UP_TO_MAGIC {
            return None;
        }

        let rest = self.buffer.slice(self.position..);
        match BatchHeader::parse_at(&rest, self.position as u64) {
            Ok(header) if header.size_in_bytes() > rest.len() => None,
            Ok(header) => {
                let size = header.size_in_bytes();
                self.position += size;
                Some(BatchView::new(rest))
            }
            Err(BatchError::UnexpectedEof(_)) => None,
            Err(error) => {
                self.failed = true;
                Some(Err(error))
            }
        }
    }
}

// ---------------------------------------------------------------------------
// MemoryRecordsBuilder
// ---------------------------------------------------------------------------

/// Builds a [`MemoryRecords`] buffer with sequentially assigned offsets.
///
/// Magic 2 produces a single batch; magic 0 and 1 produce one legacy batch
/// per record.
#[derive(Debug, Clone)]
pub struct MemoryRecordsBuilder {
    magic: u8,
    base_offset: i64,
    records: Vec<Record>,
}

impl MemoryRecordsBuilder {
    /// Start a builder whose first record gets `base_offset`.
    pub fn new(magic: u8, base_offset: i64) -> BatchResult<Self> {
        if magic > MAGIC_V2 {
            return Err(BatchError::UnsupportedMagic(magic));
        }
        Ok(Self {
            magic,
            base_offset,
            records: Vec::new(),
        })
    }

    /// The offset the next appended record will receive.
    pub fn next_offset(&self) -> i64 {
        self.base_offset + self.records.len() as i64
    }

    /// Number of records appended so far.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether no record has been appended.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Append a record with an explicit timestamp.
    pub fn append(
        &mut self,
        timestamp: i64,
        key: Option<Bytes>,
        value: Option<Bytes>,
    ) -> &mut Self {
        let offset = self.next_offset();
        self.records.push(Record {
            offset,
            timestamp,
            key,
            value,
        });
        self
    }

    /// Append a record stamped with the current wall-clock time.
    pub fn append_now(&mut self, key: Option<Bytes>, value: Option<Bytes>) -> &mut Self {
        let now = Utc::now().timestamp_millis();
        self.append(now, key, value)
    }

    /// Encode everything appended so far.
    pub fn build(&self) -> MemoryRecords {
        if self.records.is_empty() {
            return MemoryRecords::empty();
        }

        let mut buf = BytesMut::new();
        if self.magic == MAGIC_V2 {
            encode_v2(&mut buf, self.base_offset, &self.records);
        } else {
            for record in &self.records {
                encode_legacy(&mut buf, self.magic, record);
            }
        }
        MemoryRecords::readable(buf.freeze())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::{RecordBatch, MAGIC_V1, NO_TIMESTAMP};

    fn value(text: &'static str) -> Option<Bytes> {
        Some(Bytes::from_static(text.as_bytes()))
    }

    #[test]
    fn test_builder_v2_single_batch() {
        let mut builder = MemoryRecordsBuilder::new(MAGIC_V2, 5).unwrap();
        builder
            .append(100, None, value("a"))
            .append(200, value("k"), value("b"));
        assert_eq!(builder.next_offset(), 7);

        let records = builder.build();
        let batches: Vec<BatchView> = records.batches().map(Result::unwrap).collect();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].base_offset(), 5);
        assert_eq!(batches[0].last_offset(), 6);
        assert_eq!(batches[0].max_timestamp(), 200);
        assert_eq!(batches[0].size_in_bytes(), records.size_in_bytes());
    }

    #[test]
    fn test_builder_legacy_one_batch_per_record() {
        let mut builder = MemoryRecordsBuilder::new(MAGIC_V1, 0).unwrap();
        for i in 0..3 {
            builder.append(i * 10, None, value("v"));
        }
        let offsets: Vec<i64> = builder
            .build()
            .batches()
            .map(|b| b.unwrap().last_offset())
            .collect();
        assert_eq!(offsets, vec![0, 1, 2]);
    }

    #[test]
    fn test_builder_rejects_unknown_magic() {
        assert!(matches!(
            MemoryRecordsBuilder::new(9, 0),
            Err(BatchError::UnsupportedMagic(9))
        ));
    }

    #[test]
    fn test_empty_builder_builds_empty_records() {
        let builder = MemoryRecordsBuilder::new(MAGIC_V2, 0).unwrap();
        let records = builder.build();
        assert!(records.is_empty());
        assert_eq!(records.batches().count(), 0);
    }

    #[test]
    fn test_append_now_uses_wall_clock() {
        let before = Utc::now().timestamp_millis();
        let mut builder = MemoryRecordsBuilder::new(MAGIC_V2, 0).unwrap();
        builder.append_now(None, value("x"));
        let batch = builder.build().batches().next().unwrap().unwrap();
        assert!(batch.max_timestamp() >= before);
        assert_ne!(batch.max_timestamp(), NO_TIMESTAMP);
    }

    #[test]
    fn test_write_fully_to_returns_byte_count() {
        let mut builder = MemoryRecordsBuilder::new(MAGIC_V2, 0).unwrap();
        builder.append(1, None, value("hello"));
        let records = builder.build();

        let mut sink = Vec::new();
        let written = records.write_fully_to(&mut sink).unwrap();
        assert_eq!(written, records.size_in_bytes());
        assert_eq!(&sink[..], &records.buffer()[..]);
    }

    #[test]
    fn test_truncated_tail_ends_iteration() {
        let mut builder = MemoryRecordsBuilder::new(MAGIC_V1, 0).unwrap();
        builder.append(1, None, value("one")).append(2, None, value("two"));
        let full = builder.build();
        let cut = MemoryRecords::readable(full.buffer().slice(..full.size_in_bytes() - 2));
        assert_eq!(cut.batches().count(), 1);
    }
}
