// SPDX-License-Identifier: PMPL-1.0-or-later
//
// TideLog Record Batches - Format down-conversion
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Rewrites a sequence of batches into an older format version for readers
// that cannot understand the current one. Batches already at or below the
// target version are copied verbatim; newer batches are re-encoded record by
// record.

use std::time::{Duration, Instant};

use bytes::BytesMut;
use tracing::debug;

use crate::batch::{encode_legacy, legacy_size, RecordBatch, MAGIC_V2};
use crate::error::BatchError;
use crate::memory::MemoryRecords;
use crate::record::Record;

/// Statistics gathered while converting batches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RecordConversionStats {
    /// Bytes of batch data held in memory during conversion.
    pub temporary_memory_bytes: u64,
    /// Number of records re-encoded into the target format.
    pub num_records_converted: u32,
    /// Wall-clock time spent converting.
    pub conversion_time: Duration,
}

impl RecordConversionStats {
    /// Statistics for a conversion that did no work.
    pub const EMPTY: Self = Self {
        temporary_memory_bytes: 0,
        num_records_converted: 0,
        conversion_time: Duration::ZERO,
    };
}

/// A converted record set together with its conversion statistics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConvertedRecords<R> {
    /// The records in the target format.
    pub records: R,
    /// How much work the conversion did.
    pub stats: RecordConversionStats,
}

impl<R> ConvertedRecords<R> {
    /// Pair `records` with `stats`.
    pub fn new(records: R, stats: RecordConversionStats) -> Self {
        Self { records, stats }
    }
}

/// Convert `batches` to format version `to_magic`.
///
/// Only magic-2 batches can need re-encoding, so every converted record ends
/// up in a legacy single-record batch. Re-encoded records with an offset
/// below `first_offset` are dropped, and a batch left without records is
/// skipped entirely. Errors from the batch source abort the conversion and
/// are returned as-is; the source's error type only needs to absorb
/// [`BatchError`].
pub fn down_convert<B, E, I>(
    batches: I,
    to_magic: u8,
    first_offset: i64,
) -> Result<ConvertedRecords<MemoryRecords>, E>
where
    B: RecordBatch,
    E: From<BatchError>,
    I: IntoIterator<Item = Result<B, E>>,
{
    if to_magic > MAGIC_V2 {
        return Err(BatchError::UnsupportedMagic(to_magic).into());
    }

    let started = Instant::now();
    let mut buffer = BytesMut::new();
    let mut temporary_memory_bytes = 0u64;
    let mut num_records_converted = 0u32;

    for batch in batches {
        let batch = batch?;
        temporary_memory_bytes += batch.size_in_bytes() as u64;

        if batch.magic() <= to_magic {
            buffer.extend_from_slice(&batch.raw_bytes()?);
            continue;
        }

        let mut records: Vec<Record> = Vec::new();
        for record in batch.records()? {
            let record = record?;
            if record.offset >= first_offset {
                records.push(record);
            }
        }
        if records.is_empty() {
            continue;
        }

        for record in &records {
            temporary_memory_bytes += legacy_size(to_magic, record) as u64;
            encode_legacy(&mut buffer, to_magic, record);
        }
        num_records_converted += records.len() as u32;
    }

    let stats = RecordConversionStats {
        temporary_memory_bytes,
        num_records_converted,
        conversion_time: started.elapsed(),
    };
    debug!(
        to_magic,
        first_offset,
        converted = num_records_converted,
        bytes = buffer.len(),
        "Down-converted batches"
    );

    Ok(ConvertedRecords::new(MemoryRecords::readable(buffer.freeze()), stats))
}
