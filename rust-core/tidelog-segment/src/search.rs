// SPDX-License-Identifier: PMPL-1.0-or-later
//
// TideLog Segments - Linear searches
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Forward scans over a segment's batches. No index is consulted here; the
// caller supplies a starting batch boundary (typically from an offset or
// time index) and the scan proceeds batch by batch from there.

use std::fmt;

use serde::Serialize;
use tidelog_batch::{RecordBatch, NO_TIMESTAMP};

use crate::error::SegmentResult;
use crate::segment::SegmentFile;

/// Location of a batch: its last offset, file position and encoded size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LogOffsetPosition {
    pub offset: i64,
    pub position: u64,
    pub size: u64,
}

impl fmt::Display for LogOffsetPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "LogOffsetPosition(offset={}, position={}, size={})",
            self.offset, self.position, self.size
        )
    }
}

/// A timestamp together with the offset it belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TimestampAndOffset {
    pub timestamp: i64,
    pub offset: i64,
}

impl TimestampAndOffset {
    /// Returned when there is no timestamp to report.
    pub const UNKNOWN: Self = Self {
        timestamp: NO_TIMESTAMP,
        offset: -1,
    };
}

impl fmt::Display for TimestampAndOffset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "TimestampAndOffset(timestamp={}, offset={})",
            self.timestamp, self.offset
        )
    }
}

impl SegmentFile {
    /// Find the first batch, scanning from `starting_position`, whose last
    /// offset is at least `target_offset`.
    pub fn search_for_offset_with_size(
        &self,
        target_offset: i64,
        starting_position: u64,
    ) -> SegmentResult<Option<LogOffsetPosition>> {
        for batch in self.batches_from(starting_position) {
            let batch = batch?;
            let offset = batch.last_offset();
            if offset >= target_offset {
                return Ok(Some(LogOffsetPosition {
                    offset,
                    position: batch.position(),
                    size: batch.size_in_bytes() as u64,
                }));
            }
        }
        Ok(None)
    }

    /// Find the first record with a timestamp of at least `target_timestamp`
    /// and an offset of at least `starting_offset`.
    ///
    /// Only batches whose max timestamp reaches the target are opened. A
    /// batch that reaches it but holds no record passing both filters does
    /// not stop the scan.
    pub fn search_for_timestamp(
        &self,
        target_timestamp: i64,
        starting_position: u64,
        starting_offset: i64,
    ) -> SegmentResult<Option<TimestampAndOffset>> {
        for batch in self.batches_from(starting_position) {
            let batch = batch?;
            if batch.max_timestamp() < target_timestamp {
                continue;
            }
            for record in batch.records()? {
                let record = record?;
                if record.timestamp() >= target_timestamp && record.offset() >= starting_offset {
                    return Ok(Some(TimestampAndOffset {
                        timestamp: record.timestamp(),
                        offset: record.offset(),
                    }));
                }
            }
        }
        Ok(None)
    }

    /// The largest batch timestamp from `starting_position` to the end of
    /// the view, with the last offset of the first batch carrying it.
    ///
    /// Returns [`TimestampAndOffset::UNKNOWN`] when no batch is scanned.
    pub fn largest_timestamp_after(&self, starting_position: u64) -> SegmentResult<TimestampAndOffset> {
        let mut largest = TimestampAndOffset::UNKNOWN;
        for batch in self.batches_from(starting_position) {
            let batch = batch?;
            let timestamp = batch.max_timestamp();
            if timestamp > largest.timestamp {
                largest = TimestampAndOffset {
                    timestamp,
                    offset: batch.last_offset(),
                };
            }
        }
        Ok(largest)
    }
}
