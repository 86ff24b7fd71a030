// SPDX-License-Identifier: PMPL-1.0-or-later
//! Integration tests for TideLog segment files
//!
//! End-to-end workflows over real files: searches across several batches,
//! slices that outlive appends, lifecycle operations and the transfer path.

use std::fs;
use std::io::Write;
use std::net::{TcpListener, TcpStream};
use std::thread;

use bytes::Bytes;
use tempfile::TempDir;
use tidelog_batch::{
    MemoryRecords, MemoryRecordsBuilder, RecordBatch, CURRENT_MAGIC, MAGIC_V0, MAGIC_V1,
};
use tidelog_segment::{
    DownConverted, LogOffsetPosition, SegmentConfig, SegmentError, SegmentFile,
    TimestampAndOffset,
};

/// A v2 batch holding offsets `first..=last`, every record stamped `timestamp`.
fn batch(first: i64, last: i64, timestamp: i64) -> MemoryRecords {
    let mut builder = MemoryRecordsBuilder::new(CURRENT_MAGIC, first).unwrap();
    for offset in first..=last {
        builder.append(
            timestamp,
            Some(Bytes::from(format!("key-{offset}"))),
            Some(Bytes::from(format!("value-{offset}"))),
        );
    }
    builder.build()
}

fn open_with(dir: &TempDir, name: &str, batches: &[MemoryRecords]) -> SegmentFile {
    let segment = SegmentFile::open_mutable(dir.path().join(name)).unwrap();
    for batch in batches {
        segment.append(batch).unwrap();
    }
    segment
}

#[test]
fn test_offset_search_across_three_batches() {
    let dir = TempDir::new().unwrap();
    let batches = [batch(0, 5, 100), batch(6, 12, 200), batch(13, 20, 300)];
    let segment = open_with(&dir, "offsets.log", &batches);

    let found = segment.search_for_offset_with_size(10, 0).unwrap();
    assert_eq!(
        found,
        Some(LogOffsetPosition {
            offset: 12,
            position: batches[0].size_in_bytes() as u64,
            size: batches[1].size_in_bytes() as u64,
        })
    );
    assert_eq!(segment.search_for_offset_with_size(21, 0).unwrap(), None);
}

#[test]
fn test_largest_timestamp_first_max_wins() {
    let dir = TempDir::new().unwrap();
    let segment = open_with(
        &dir,
        "timestamps.log",
        &[
            batch(0, 1, 100),
            batch(2, 3, 300),
            batch(4, 5, 300),
            batch(6, 7, 200),
        ],
    );

    assert_eq!(
        segment.largest_timestamp_after(0).unwrap(),
        TimestampAndOffset {
            timestamp: 300,
            offset: 3
        }
    );
}

#[test]
fn test_searches_within_a_slice_stop_at_slice_end() {
    let dir = TempDir::new().unwrap();
    let batches = [batch(0, 2, 100), batch(3, 5, 200), batch(6, 8, 300)];
    let segment = open_with(&dir, "sliced-search.log", &batches);

    let first_two = (batches[0].size_in_bytes() + batches[1].size_in_bytes()) as u64;
    let slice = segment.slice(0, first_two).unwrap();
    assert_eq!(slice.search_for_offset_with_size(7, 0).unwrap(), None);
    assert_eq!(
        slice.largest_timestamp_after(0).unwrap(),
        TimestampAndOffset {
            timestamp: 200,
            offset: 5
        }
    );
    assert_eq!(slice.search_for_timestamp(250, 0, 0).unwrap(), None);
    assert_eq!(
        segment.search_for_timestamp(250, 0, 0).unwrap(),
        Some(TimestampAndOffset {
            timestamp: 300,
            offset: 6
        })
    );
}

#[test]
fn test_round_trip_batches() {
    let dir = TempDir::new().unwrap();
    let batches = [batch(0, 0, 1), batch(1, 4, 2), batch(5, 9, 3)];
    let segment = open_with(&dir, "round-trip.log", &batches);

    let mut expected_position = 0u64;
    let read: Vec<_> = segment.batches().map(Result::unwrap).collect();
    assert_eq!(read.len(), batches.len());
    for (file_batch, written) in read.iter().zip(&batches) {
        assert_eq!(file_batch.position(), expected_position);
        assert_eq!(file_batch.size_in_bytes(), written.size_in_bytes());
        assert_eq!(&file_batch.raw_bytes().unwrap()[..], &written.buffer()[..]);
        assert!(file_batch.is_valid().unwrap());
        expected_position += written.size_in_bytes() as u64;
    }

    // A fresh cursor from the same position reproduces the same sequence.
    let again: Vec<i64> = segment
        .batches_from(0)
        .map(|b| b.unwrap().last_offset())
        .collect();
    assert_eq!(again, vec![0, 4, 9]);
}

#[test]
fn test_slices_survive_parent_appends() {
    let dir = TempDir::new().unwrap();
    let first = batch(0, 2, 10);
    let segment = open_with(&dir, "slices.log", &[first.clone()]);

    let slice = segment.slice(0, segment.size_in_bytes()).unwrap();
    let mut before = vec![0u8; slice.size_in_bytes() as usize];
    slice.read_into(&mut before, 0).unwrap();

    segment.append(&batch(3, 9, 20)).unwrap();
    assert!(segment.size_in_bytes() > slice.size_in_bytes());

    let mut after = vec![0u8; slice.size_in_bytes() as usize];
    slice.read_into(&mut after, 0).unwrap();
    assert_eq!(before, after);
    assert_eq!(slice.batches().count(), 1);
    assert_eq!(segment.batches().count(), 2);
}

#[test]
fn test_write_to_over_request_returns_available() {
    let dir = TempDir::new().unwrap();
    let segment = open_with(&dir, "over.log", &[batch(0, 3, 5)]);
    let size = segment.size_in_bytes();

    let mut sink = Vec::new();
    assert_eq!(segment.write_to(&mut sink, 0, size * 4).unwrap(), size);
    assert_eq!(sink.len() as u64, size);
}

#[test]
fn test_write_to_socket() {
    let dir = TempDir::new().unwrap();
    let segment = open_with(&dir, "socket.log", &[batch(0, 9, 5)]);
    let size = segment.size_in_bytes();

    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let address = listener.local_addr().unwrap();
    let reader = thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        let mut received = Vec::new();
        std::io::Read::read_to_end(&mut stream, &mut received).unwrap();
        received
    });

    let mut stream = TcpStream::connect(address).unwrap();
    let mut sent = 0;
    while sent < size {
        sent += segment.write_to(&mut stream, sent, size - sent).unwrap();
    }
    stream.flush().unwrap();
    drop(stream);

    let received = reader.join().unwrap();
    let mut expected = vec![0u8; size as usize];
    segment.read_into(&mut expected, 0).unwrap();
    assert_eq!(received, expected);
}

#[test]
fn test_preallocated_segment_lifecycle() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("00000000000000000100.log");
    let config = SegmentConfig::preallocated(64 * 1024);

    let segment = SegmentFile::open(&path, true, false, &config).unwrap();
    assert_eq!(segment.size_in_bytes(), 0);
    assert_eq!(fs::metadata(&path).unwrap().len(), 64 * 1024);

    let records = batch(100, 104, 1_000);
    segment.append(&records).unwrap();
    assert_eq!(segment.batches().count(), 1);

    // The pre-allocated tail is not a consistency problem for transfers.
    let mut sink = Vec::new();
    assert_eq!(
        segment.write_to(&mut sink, 0, u64::MAX).unwrap(),
        records.size_in_bytes() as u64
    );

    segment.close().unwrap();
    assert_eq!(
        fs::metadata(&path).unwrap().len(),
        records.size_in_bytes() as u64
    );

    let reopened = SegmentFile::open(&path, false, true, &config).unwrap();
    assert_eq!(reopened.size_in_bytes(), records.size_in_bytes() as u64);
}

#[test]
fn test_rename_then_delete() {
    let dir = TempDir::new().unwrap();
    let segment = open_with(&dir, "00000000000000000000.log", &[batch(0, 1, 1)]);
    let renamed = dir.path().join("00000000000000000000.log.deleted");

    segment.rename_to(&renamed).unwrap();
    assert!(renamed.exists());
    assert!(segment.to_string().contains(".log.deleted"));

    // The channel survives the rename.
    assert_eq!(segment.batches().count(), 1);

    assert!(segment.delete_if_exists().unwrap());
    assert!(!renamed.exists());
    assert!(!segment.delete_if_exists().unwrap());
}

#[test]
fn test_close_handlers_invalidates_every_view() {
    let dir = TempDir::new().unwrap();
    let segment = open_with(&dir, "closed.log", &[batch(0, 1, 1)]);
    let slice = segment.slice(0, 10).unwrap();
    segment.close_handlers().unwrap();

    let mut sink = Vec::new();
    assert!(matches!(
        slice.write_to(&mut sink, 0, 10),
        Err(SegmentError::Io(_))
    ));
    assert!(matches!(
        segment.append(&batch(2, 2, 1)),
        Err(SegmentError::Io(_))
    ));
    let first = segment.batches().next();
    assert!(matches!(first, Some(Err(SegmentError::Io(_)))));
}

#[test]
fn test_down_convert_respects_first_offset() {
    let dir = TempDir::new().unwrap();
    let segment = open_with(&dir, "convert.log", &[batch(0, 4, 50), batch(5, 9, 60)]);

    let converted = segment.down_convert(MAGIC_V0, 7).unwrap();
    assert_eq!(converted.stats.num_records_converted, 3);
    let DownConverted::Memory(records) = converted.records else {
        panic!("expected converted records");
    };
    let offsets: Vec<i64> = records
        .batches()
        .map(|b| {
            let b = b.unwrap();
            assert_eq!(b.magic(), MAGIC_V0);
            b.base_offset()
        })
        .collect();
    assert_eq!(offsets, vec![7, 8, 9]);
}

#[test]
fn test_down_convert_of_cut_batch_falls_back() {
    let dir = TempDir::new().unwrap();
    let segment = open_with(&dir, "cut.log", &[batch(0, 9, 50)]);

    // A slice that cuts through the only batch yields nothing to convert.
    let slice = segment.slice(0, segment.size_in_bytes() - 1).unwrap();
    let converted = slice.down_convert(MAGIC_V1, 0).unwrap();
    assert!(!converted.records.is_converted());
    assert_eq!(converted.records.size_in_bytes(), slice.size_in_bytes());
}

#[test]
fn test_size_observed_from_another_thread_during_appends() {
    let dir = TempDir::new().unwrap();
    let segment = open_with(&dir, "concurrent.log", &[]);
    let record = batch(0, 0, 100);
    let step = record.size_in_bytes() as u64;
    let appends = 200u64;

    thread::scope(|scope| {
        let reader = scope.spawn(|| {
            let mut last = 0;
            while last < step * appends {
                let size = segment.size_in_bytes();
                assert!(size >= last, "size went backwards: {last} -> {size}");
                assert_eq!(size % step, 0, "torn size {size}");
                last = size;
            }
        });

        for _ in 0..appends {
            segment.append(&record).unwrap();
        }
        reader.join().unwrap();
    });

    assert_eq!(segment.size_in_bytes(), step * appends);
    assert_eq!(segment.batches().count() as u64, appends);
}
