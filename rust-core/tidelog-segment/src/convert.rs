// SPDX-License-Identifier: PMPL-1.0-or-later
//
// TideLog Segments - Down-conversion bridge
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>

use tidelog_batch::{ConvertedRecords, MemoryRecords, RecordConversionStats};
use tracing::debug;

use crate::error::SegmentResult;
use crate::segment::SegmentFile;

/// The outcome of [`SegmentFile::down_convert`].
#[derive(Debug)]
pub enum DownConverted {
    /// Re-encoded records held in memory.
    Memory(MemoryRecords),
    /// Nothing was converted; the original bytes are served as they are and
    /// the consumer detects the format from each batch header.
    Unconverted(SegmentFile),
}

impl DownConverted {
    /// Size of the records to be sent, in bytes.
    pub fn size_in_bytes(&self) -> u64 {
        match self {
            DownConverted::Memory(records) => records.size_in_bytes() as u64,
            DownConverted::Unconverted(segment) => segment.size_in_bytes(),
        }
    }

    pub fn is_converted(&self) -> bool {
        matches!(self, DownConverted::Memory(_))
    }
}

impl SegmentFile {
    /// Convert this view's batches to format version `to_magic`, dropping
    /// re-encoded records below `first_offset`.
    ///
    /// When no record ends up converted, the result is an unconverted slice
    /// covering the whole view paired with empty statistics.
    pub fn down_convert(
        &self,
        to_magic: u8,
        first_offset: i64,
    ) -> SegmentResult<ConvertedRecords<DownConverted>> {
        let converted = tidelog_batch::down_convert(self.batches(), to_magic, first_offset)?;

        if converted.stats.num_records_converted == 0 {
            debug!(
                segment = %self.path().display(),
                to_magic,
                first_offset,
                "No records down-converted, serving original batches"
            );
            let unconverted = self.slice(0, self.size_in_bytes())?;
            return Ok(ConvertedRecords::new(
                DownConverted::Unconverted(unconverted),
                RecordConversionStats::EMPTY,
            ));
        }

        Ok(ConvertedRecords::new(
            DownConverted::Memory(converted.records),
            converted.stats,
        ))
    }
}
