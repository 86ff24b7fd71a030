// SPDX-License-Identifier: PMPL-1.0-or-later
// Fuzz target for batch parsing, in memory and through a segment file

#![no_main]

use std::io::Write;

use bytes::Bytes;
use libfuzzer_sys::fuzz_target;
use tidelog_batch::{MemoryRecords, RecordBatch};
use tidelog_segment::SegmentFile;

fuzz_target!(|data: &[u8]| {
    // Arbitrary bytes must never panic the batch or record decoders.
    let records = MemoryRecords::readable(Bytes::copy_from_slice(data));
    for batch in records.batches() {
        let Ok(batch) = batch else { break };
        let _ = batch.is_valid();
        if let Ok(iter) = batch.records() {
            for record in iter {
                if record.is_err() {
                    break;
                }
            }
        }
    }

    // The same bytes as a segment file: scans and searches must fail cleanly.
    let Ok(mut file) = tempfile::NamedTempFile::new() else { return };
    if file.write_all(data).is_err() {
        return;
    }
    let Ok(segment) = SegmentFile::open_read_only(file.path()) else { return };
    let _ = segment.search_for_offset_with_size(i64::MAX, 0);
    let _ = segment.search_for_timestamp(0, 0, 0);
    let _ = segment.largest_timestamp_after(0);
    if let Ok(slice) = segment.slice(data.len() as u64 / 2, data.len() as u64) {
        let _ = slice.batches().count();
    }
});
