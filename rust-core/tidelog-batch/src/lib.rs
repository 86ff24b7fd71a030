// SPDX-License-Identifier: PMPL-1.0-or-later
//
// TideLog Record Batches crate
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// The binary format stored inside TideLog segment files. A segment is a flat
// sequence of self-describing, variable-length **batches**; each batch holds
// one or more **records** (offset, timestamp, key, value) plus shared
// metadata such as the last contained offset and the largest timestamp.
//
// This crate knows nothing about files. It provides:
//
// - [`batch`] -- header parsing, the in-memory `BatchView`, and the
//   `RecordBatch` trait every batch source implements.
// - [`record`] -- decoded records and the lazy `RecordIter`.
// - [`memory`] -- `MemoryRecords` buffers and the `MemoryRecordsBuilder`.
// - [`convert`] -- down-conversion to legacy format versions.
//
// ## Usage
//
// ```
// use bytes::Bytes;
// use tidelog_batch::{MemoryRecordsBuilder, RecordBatch, CURRENT_MAGIC};
//
// let mut builder = MemoryRecordsBuilder::new(CURRENT_MAGIC, 0).unwrap();
// builder.append(1_700_000_000_000, None, Some(Bytes::from_static(b"hello")));
// let records = builder.build();
//
// for batch in records.batches() {
//     let batch = batch.unwrap();
//     assert_eq!(batch.last_offset(), 0);
// }
// ```

pub mod batch;
pub mod convert;
pub mod error;
pub mod memory;
pub mod record;

// Re-export the primary public API for ergonomic imports.
pub use batch::{
    BatchHeader, BatchView, RecordBatch, BATCH_OVERHEAD_V2, CURRENT_MAGIC,
    HEADER_SIZE_UP_TO_MAGIC, LOG_OVERHEAD, MAGIC_V0, MAGIC_V1, MAGIC_V2, MIN_BATCH_LENGTH,
    NO_TIMESTAMP,
};
pub use convert::{down_convert, ConvertedRecords, RecordConversionStats};
pub use error::{BatchError, BatchResult};
pub use memory::{MemoryBatches, MemoryRecords, MemoryRecordsBuilder};
pub use record::{Record, RecordIter};
