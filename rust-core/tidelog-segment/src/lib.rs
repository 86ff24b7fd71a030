// SPDX-License-Identifier: PMPL-1.0-or-later
//
// TideLog Segments crate
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// File-backed views over one segment of a TideLog commit log. A segment file
// is a flat sequence of record batches (see `tidelog-batch`); this crate
// owns the open file and exposes it as a `SegmentFile`:
//
// - [`segment`] -- open, append, flush, truncate, trim, close, rename and
//   delete, plus `slice` for zero-copy sub-views sharing the same handle.
// - [`cursor`] -- lazy batch iteration reading one header per step.
// - [`search`] -- forward scans by offset and by timestamp.
// - [`transfer`] -- `write_to`, with `sendfile(2)` for files and sockets.
// - [`convert`] -- down-conversion to legacy batch formats.
// - [`channel`] -- the shared OS file handle behind every view.
// - [`config`] -- open-time settings such as pre-allocation.
//
// ## Usage
//
// ```no_run
// use bytes::Bytes;
// use tidelog_batch::{MemoryRecordsBuilder, CURRENT_MAGIC};
// use tidelog_segment::SegmentFile;
//
// let segment = SegmentFile::open_mutable("/var/lib/tidelog/00000000000000000000.log").unwrap();
// let mut builder = MemoryRecordsBuilder::new(CURRENT_MAGIC, 0).unwrap();
// builder.append(1_700_000_000_000, None, Some(Bytes::from_static(b"event")));
// segment.append(&builder.build()).unwrap();
//
// let found = segment.search_for_offset_with_size(0, 0).unwrap();
// assert!(found.is_some());
// segment.close().unwrap();
// ```
//
// ## Concurrency
//
// Reads (including from slices) may run on any thread. Appends, truncation,
// close and rename must be serialized by the caller. Once the originating
// view releases the channel, every view sharing it fails with an I/O error.

pub mod channel;
pub mod config;
pub mod convert;
pub mod cursor;
pub mod error;
pub mod search;
pub mod segment;
pub mod transfer;

// Re-export the primary public API for ergonomic imports.
pub use channel::{FileChannel, MAX_TRANSFER_BYTES};
pub use config::{SegmentConfig, DEFAULT_MAX_SEGMENT_BYTES};
pub use convert::DownConverted;
pub use cursor::{BatchCursor, FileBatch};
pub use error::{SegmentError, SegmentResult};
pub use search::{LogOffsetPosition, TimestampAndOffset};
pub use segment::{SegmentFile, UNBOUNDED_END};
pub use transfer::{TransferTarget, ZeroCopyTarget};
