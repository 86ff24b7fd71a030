// SPDX-License-Identifier: PMPL-1.0-or-later
//
// TideLog Record Batches - Batch format
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Defines the self-describing, variable-length batch format stored in log
// segments, the `RecordBatch` trait implemented by every batch source, and
// the encoders used by the record builder and the down-converter.
//
// Every batch starts with the log overhead shared by all format versions
// (all integers big-endian):
//   [8 bytes: base_offset (i64)]
//   [4 bytes: batch_length (i32)]   -- bytes following this field
//   [1 byte:  magic]                -- format version 0, 1 or 2
//   [4 bytes: crc32 (u32)]          -- CRC32 of every byte after this field
//
// Magic 2 continues with:
//   [4 bytes: last_offset_delta (i32)]
//   [8 bytes: first_timestamp (i64)]
//   [8 bytes: max_timestamp (i64)]
//   [4 bytes: record_count (i32)]
//   records: [offset_delta i32][timestamp_delta i64][key][value] ...
//
// Legacy magic 0/1 batches carry exactly one record:
//   [8 bytes: timestamp (i64)]      -- magic 1 only
//   [key][value]
//
// Keys and values are `[length i32][bytes]`, with length -1 meaning null.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{BatchError, BatchResult};
use crate::record::{Record, RecordIter};

/// Legacy format without timestamps.
pub const MAGIC_V0: u8 = 0;
/// Legacy format with a per-record timestamp.
pub const MAGIC_V1: u8 = 1;
/// Current multi-record batch format.
pub const MAGIC_V2: u8 = 2;
/// Format written by default.
pub const CURRENT_MAGIC: u8 = MAGIC_V2;

/// Timestamp value meaning "no timestamp available".
pub const NO_TIMESTAMP: i64 = -1;

/// Size of the base offset field.
pub const OFFSET_LENGTH: usize = 8;
/// Position of the batch length field.
pub const LENGTH_OFFSET: usize = OFFSET_LENGTH;
/// Size of the base offset + batch length prefix.
pub const LOG_OVERHEAD: usize = 12;
/// Position of the magic byte.
pub const MAGIC_OFFSET: usize = LOG_OVERHEAD;
/// Bytes needed to learn a batch's length and format version.
pub const HEADER_SIZE_UP_TO_MAGIC: usize = MAGIC_OFFSET + 1;

const CRC_OFFSET: usize = HEADER_SIZE_UP_TO_MAGIC;
const CRC_LENGTH: usize = 4;
const BODY_OFFSET: usize = CRC_OFFSET + CRC_LENGTH;

const LAST_OFFSET_DELTA_OFFSET: usize = BODY_OFFSET;
const FIRST_TIMESTAMP_OFFSET: usize = LAST_OFFSET_DELTA_OFFSET + 4;
const MAX_TIMESTAMP_OFFSET: usize = FIRST_TIMESTAMP_OFFSET + 8;
const RECORD_COUNT_OFFSET: usize = MAX_TIMESTAMP_OFFSET + 8;

/// Full header size of a magic-2 batch; also the largest header of any version.
pub const BATCH_OVERHEAD_V2: usize = RECORD_COUNT_OFFSET + 4;

/// Smallest legal `batch_length` of a magic-0 batch (crc, magic, null key, null value).
pub const RECORD_OVERHEAD_V0: usize = CRC_LENGTH + 1 + 4 + 4;
/// Smallest legal `batch_length` of a magic-1 batch (adds the timestamp).
pub const RECORD_OVERHEAD_V1: usize = RECORD_OVERHEAD_V0 + 8;

/// Any `batch_length` below this value is corrupt regardless of magic.
pub const MIN_BATCH_LENGTH: usize = RECORD_OVERHEAD_V0;

/// Number of header bytes (log overhead included) for a given magic.
pub fn header_size(magic: u8) -> usize {
    match magic {
        MAGIC_V0 => BODY_OFFSET,
        MAGIC_V1 => BODY_OFFSET + 8,
        _ => BATCH_OVERHEAD_V2,
    }
}

fn min_batch_length(magic: u8) -> usize {
    match magic {
        MAGIC_V0 => RECORD_OVERHEAD_V0,
        MAGIC_V1 => RECORD_OVERHEAD_V1,
        _ => BATCH_OVERHEAD_V2 - LOG_OVERHEAD,
    }
}

fn be_i64(bytes: &[u8], at: usize) -> i64 {
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&bytes[at..at + 8]);
    i64::from_be_bytes(raw)
}

fn be_i32(bytes: &[u8], at: usize) -> i32 {
    let mut raw = [0u8; 4];
    raw.copy_from_slice(&bytes[at..at + 4]);
    i32::from_be_bytes(raw)
}

fn be_u32(bytes: &[u8], at: usize) -> u32 {
    be_i32(bytes, at) as u32
}

// ---------------------------------------------------------------------------
// BatchHeader
// ---------------------------------------------------------------------------

/// The fixed-size metadata at the front of every batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchHeader {
    /// Offset of the first record in the batch.
    pub base_offset: i64,
    /// Bytes following the length field.
    pub batch_length: u32,
    /// Format version.
    pub magic: u8,
    /// Stored CRC32 of the batch body.
    pub crc: u32,
    /// Offset of the last record in the batch.
    pub last_offset: i64,
    /// Timestamp of the first record, or [`NO_TIMESTAMP`].
    pub first_timestamp: i64,
    /// Largest record timestamp in the batch, or [`NO_TIMESTAMP`].
    pub max_timestamp: i64,
    /// Number of records in the batch.
    pub record_count: u32,
}

impl BatchHeader {
    /// Parse a header from the front of `bytes`.
    ///
    /// `bytes` must hold at least [`header_size`] bytes for the batch's magic;
    /// it may hold more (the rest of the batch is ignored).
    pub fn parse(bytes: &[u8]) -> BatchResult<Self> {
        Self::parse_at(bytes, 0)
    }

    /// Like [`BatchHeader::parse`], reporting `position` in corruption errors.
    pub fn parse_at(bytes: &[u8], position: u64) -> BatchResult<Self> {
        if bytes.len() < HEADER_SIZE_UP_TO_MAGIC {
            return Err(BatchError::UnexpectedEof(bytes.len()));
        }

        let base_offset = be_i64(bytes, 0);
        let batch_length = be_i32(bytes, LENGTH_OFFSET);
        if batch_length < MIN_BATCH_LENGTH as i32 {
            return Err(BatchError::corrupt(
                position,
                format!("batch length {batch_length} is below minimum {MIN_BATCH_LENGTH}"),
            ));
        }
        let batch_length = batch_length as u32;

        let magic = bytes[MAGIC_OFFSET];
        if magic > MAGIC_V2 {
            return Err(BatchError::UnsupportedMagic(magic));
        }
        if (batch_length as usize) < min_batch_length(magic) {
            return Err(BatchError::corrupt(
                position,
                format!(
                    "batch length {batch_length} is below minimum {} for magic {magic}",
                    min_batch_length(magic)
                ),
            ));
        }

        let needed = header_size(magic);
        if bytes.len() < needed {
            return Err(BatchError::UnexpectedEof(bytes.len()));
        }
        let crc = be_u32(bytes, CRC_OFFSET);

        let header = match magic {
            MAGIC_V2 => {
                let last_offset_delta = be_i32(bytes, LAST_OFFSET_DELTA_OFFSET);
                let record_count = be_i32(bytes, RECORD_COUNT_OFFSET);
                if last_offset_delta < 0 || record_count < 0 {
                    return Err(BatchError::corrupt(
                        position,
                        format!(
                            "negative last offset delta {last_offset_delta} or record count {record_count}"
                        ),
                    ));
                }
                Self {
                    base_offset,
                    batch_length,
                    magic,
                    crc,
                    last_offset: base_offset.wrapping_add(i64::from(last_offset_delta)),
                    first_timestamp: be_i64(bytes, FIRST_TIMESTAMP_OFFSET),
                    max_timestamp: be_i64(bytes, MAX_TIMESTAMP_OFFSET),
                    record_count: record_count as u32,
                }
            }
            MAGIC_V1 => {
                let timestamp = be_i64(bytes, BODY_OFFSET);
                Self {
                    base_offset,
                    batch_length,
                    magic,
                    crc,
                    last_offset: base_offset,
                    first_timestamp: timestamp,
                    max_timestamp: timestamp,
                    record_count: 1,
                }
            }
            _ => Self {
                base_offset,
                batch_length,
                magic,
                crc,
                last_offset: base_offset,
                first_timestamp: NO_TIMESTAMP,
                max_timestamp: NO_TIMESTAMP,
                record_count: 1,
            },
        };

        Ok(header)
    }

    /// Total bytes occupied by the batch, log overhead included.
    pub fn size_in_bytes(&self) -> usize {
        LOG_OVERHEAD + self.batch_length as usize
    }
}

// ---------------------------------------------------------------------------
// RecordBatch
// ---------------------------------------------------------------------------

/// A batch of records, whatever it is backed by.
///
/// Implemented by the in-memory [`BatchView`] and by file-backed batches that
/// only read their header until records are requested.
pub trait RecordBatch {
    /// Offset of the first record.
    fn base_offset(&self) -> i64;

    /// Offset of the last record.
    fn last_offset(&self) -> i64;

    /// Format version of the batch.
    fn magic(&self) -> u8;

    /// Largest timestamp of any record, or [`NO_TIMESTAMP`].
    fn max_timestamp(&self) -> i64;

    /// Total encoded size, log overhead included.
    fn size_in_bytes(&self) -> usize;

    /// Iterate the records of this batch.
    fn records(&self) -> BatchResult<RecordIter>;

    /// The complete encoded batch.
    fn raw_bytes(&self) -> BatchResult<Bytes>;
}

// ---------------------------------------------------------------------------
// BatchView
// ---------------------------------------------------------------------------

/// One complete batch held in memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchView {
    header: BatchHeader,
    bytes: Bytes,
}

impl BatchView {
    /// Wrap the batch at the front of `bytes`.
    ///
    /// Bytes beyond the batch's declared size are not part of the view.
    pub fn new(bytes: Bytes) -> BatchResult<Self> {
        let header = BatchHeader::parse(&bytes)?;
        let size = header.size_in_bytes();
        if bytes.len() < size {
            return Err(BatchError::UnexpectedEof(bytes.len()));
        }
        Ok(Self {
            header,
            bytes: bytes.slice(..size),
        })
    }

    /// The parsed header.
    pub fn header(&self) -> &BatchHeader {
        &self.header
    }

    /// The encoded batch bytes.
    pub fn bytes(&self) -> &Bytes {
        &self.bytes
    }

    /// Number of records declared by the header.
    pub fn record_count(&self) -> u32 {
        self.header.record_count
    }

    /// CRC32 computed over the batch body.
    pub fn compute_crc(&self) -> u32 {
        crc32fast::hash(&self.bytes[BODY_OFFSET..])
    }

    /// Whether the stored CRC matches the body.
    pub fn is_valid(&self) -> bool {
        self.compute_crc() == self.header.crc
    }

    /// Fail with [`BatchError::CrcMismatch`] unless the CRC matches.
    pub fn ensure_valid(&self) -> BatchResult<()> {
        let computed = self.compute_crc();
        if computed != self.header.crc {
            return Err(BatchError::CrcMismatch {
                base_offset: self.header.base_offset,
                stored: self.header.crc,
                computed,
            });
        }
        Ok(())
    }
}

impl RecordBatch for BatchView {
    fn base_offset(&self) -> i64 {
        self.header.base_offset
    }

    fn last_offset(&self) -> i64 {
        self.header.last_offset
    }

    fn magic(&self) -> u8 {
        self.header.magic
    }

    fn max_timestamp(&self) -> i64 {
        self.header.max_timestamp
    }

    fn size_in_bytes(&self) -> usize {
        self.header.size_in_bytes()
    }

    fn records(&self) -> BatchResult<RecordIter> {
        let body = self.bytes.slice(header_size(self.header.magic)..);
        let iter = match self.header.magic {
            MAGIC_V2 => RecordIter::v2(
                body,
                self.header.record_count,
                self.header.base_offset,
                self.header.first_timestamp,
            ),
            magic => RecordIter::legacy(
                body,
                magic,
                self.header.base_offset,
                self.header.first_timestamp,
            ),
        };
        Ok(iter)
    }

    fn raw_bytes(&self) -> BatchResult<Bytes> {
        Ok(self.bytes.clone())
    }
}

// ---------------------------------------------------------------------------
// Encoders
// ---------------------------------------------------------------------------

fn put_payload(buf: &mut BytesMut, payload: Option<&Bytes>) {
    match payload {
        Some(bytes) => {
            buf.put_i32(bytes.len() as i32);
            buf.put_slice(bytes);
        }
        None => buf.put_i32(-1),
    }
}

/// Patch the length and CRC fields of the batch that starts at `start`.
fn seal(buf: &mut BytesMut, start: usize) {
    let batch_length = (buf.len() - start - LOG_OVERHEAD) as i32;
    buf[start + LENGTH_OFFSET..start + LOG_OVERHEAD].copy_from_slice(&batch_length.to_be_bytes());
    let crc = crc32fast::hash(&buf[start + BODY_OFFSET..]);
    buf[start + CRC_OFFSET..start + BODY_OFFSET].copy_from_slice(&crc.to_be_bytes());
}

/// Append one magic-2 batch holding `records` to `buf`.
///
/// Record offsets and timestamps are absolute; they are stored as deltas from
/// `base_offset` and the first record's timestamp. `records` must not be empty.
pub(crate) fn encode_v2(buf: &mut BytesMut, base_offset: i64, records: &[Record]) {
    debug_assert!(!records.is_empty());
    let start = buf.len();
    let first_timestamp = records.first().map_or(NO_TIMESTAMP, |r| r.timestamp);
    let max_timestamp = records.iter().map(|r| r.timestamp).max().unwrap_or(NO_TIMESTAMP);
    let last_offset = records.last().map_or(base_offset, |r| r.offset);

    buf.put_i64(base_offset);
    buf.put_i32(0);
    buf.put_u8(MAGIC_V2);
    buf.put_u32(0);
    buf.put_i32((last_offset - base_offset) as i32);
    buf.put_i64(first_timestamp);
    buf.put_i64(max_timestamp);
    buf.put_i32(records.len() as i32);

    for record in records {
        buf.put_i32((record.offset - base_offset) as i32);
        buf.put_i64(record.timestamp.wrapping_sub(first_timestamp));
        put_payload(buf, record.key.as_ref());
        put_payload(buf, record.value.as_ref());
    }

    seal(buf, start);
}

/// Append one legacy (magic 0 or 1) single-record batch to `buf`.
pub(crate) fn encode_legacy(buf: &mut BytesMut, magic: u8, record: &Record) {
    let start = buf.len();
    buf.put_i64(record.offset);
    buf.put_i32(0);
    buf.put_u8(magic);
    buf.put_u32(0);
    if magic == MAGIC_V1 {
        buf.put_i64(record.timestamp);
    }
    put_payload(buf, record.key.as_ref());
    put_payload(buf, record.value.as_ref());
    seal(buf, start);
}

/// Encoded size of a legacy batch carrying `record`.
pub(crate) fn legacy_size(magic: u8, record: &Record) -> usize {
    header_size(magic) + record.payload_size()
}
