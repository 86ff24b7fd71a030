// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//! Serializable summaries of segment contents, rendered as text or JSON.

use std::fmt;

use anyhow::Context;
use serde::Serialize;
use tidelog_batch::RecordBatch;
use tidelog_segment::{FileBatch, SegmentFile};

/// One batch as printed by `tidelog-dump batches`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub position: u64,
    pub base_offset: i64,
    pub last_offset: i64,
    pub magic: u8,
    pub size: usize,
    pub max_timestamp: i64,
    pub record_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub crc_valid: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub records: Option<Vec<RecordSummary>>,
}

/// One record inside a [`BatchSummary`]. Payloads are reported by size only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordSummary {
    pub offset: i64,
    pub timestamp: i64,
    pub key_size: Option<usize>,
    pub value_size: Option<usize>,
}

impl BatchSummary {
    fn from_batch(batch: &FileBatch, include_records: bool, verify_crc: bool) -> anyhow::Result<Self> {
        let crc_valid = if verify_crc {
            Some(batch.is_valid()?)
        } else {
            None
        };

        let records = if include_records {
            let mut summaries = Vec::new();
            for record in batch.records()? {
                let record = record?;
                summaries.push(RecordSummary {
                    offset: record.offset(),
                    timestamp: record.timestamp(),
                    key_size: record.key.as_ref().map(|key| key.len()),
                    value_size: record.value.as_ref().map(|value| value.len()),
                });
            }
            Some(summaries)
        } else {
            None
        };

        Ok(Self {
            position: batch.position(),
            base_offset: batch.base_offset(),
            last_offset: batch.last_offset(),
            magic: batch.magic(),
            size: batch.size_in_bytes(),
            max_timestamp: batch.max_timestamp(),
            record_count: batch.header().record_count,
            crc_valid,
            records,
        })
    }
}

impl fmt::Display for BatchSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "baseOffset: {} lastOffset: {} count: {} position: {} size: {} magic: {} maxTimestamp: {}",
            self.base_offset,
            self.last_offset,
            self.record_count,
            self.position,
            self.size,
            self.magic,
            self.max_timestamp
        )?;
        if let Some(valid) = self.crc_valid {
            write!(f, " crcValid: {valid}")?;
        }
        for record in self.records.iter().flatten() {
            write!(
                f,
                "\n| offset: {} timestamp: {} keySize: {} valueSize: {}",
                record.offset,
                record.timestamp,
                size_or_null(record.key_size),
                size_or_null(record.value_size)
            )?;
        }
        Ok(())
    }
}

fn size_or_null(size: Option<usize>) -> String {
    size.map_or_else(|| "-1".to_string(), |size| size.to_string())
}

/// Summarize every batch from `starting_position` to the end of `segment`.
pub fn summarize_batches(
    segment: &SegmentFile,
    starting_position: u64,
    include_records: bool,
    verify_crc: bool,
) -> anyhow::Result<Vec<BatchSummary>> {
    let mut summaries = Vec::new();
    for batch in segment.batches_from(starting_position) {
        let batch = batch.with_context(|| format!("reading batch list of {segment}"))?;
        summaries.push(BatchSummary::from_batch(&batch, include_records, verify_crc)?);
    }
    Ok(summaries)
}
