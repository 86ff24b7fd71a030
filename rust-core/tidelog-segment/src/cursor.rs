// SPDX-License-Identifier: PMPL-1.0-or-later
//
// TideLog Segments - Batch cursor
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Lazily walks the batches stored in `[position, end)` of a segment file,
// reading one header per step. Record payloads stay on disk until a caller
// asks for them. A batch that does not fit before `end` (a slice cut through
// it, or a torn write at the tail) ends the iteration without an error.

use std::sync::Arc;

use bytes::Bytes;
use tidelog_batch::{
    BatchError, BatchHeader, BatchResult, BatchView, RecordBatch, RecordIter, BATCH_OVERHEAD_V2,
    HEADER_SIZE_UP_TO_MAGIC,
};
use tracing::trace;

use crate::channel::FileChannel;
use crate::error::SegmentResult;

/// Forward-only iterator over the batches of a byte range.
///
/// Yields at most one error, after which it is exhausted.
#[derive(Debug)]
pub struct BatchCursor {
    channel: Arc<FileChannel>,
    position: u64,
    end: u64,
    failed: bool,
}

impl BatchCursor {
    pub(crate) fn new(channel: Arc<FileChannel>, position: u64, end: u64) -> Self {
        Self {
            channel,
            position,
            end,
            failed: false,
        }
    }

    /// Position of the next batch to be read.
    pub fn position(&self) -> u64 {
        self.position
    }

    fn next_batch(&mut self) -> SegmentResult<Option<FileBatch>> {
        if self.position.saturating_add(HEADER_SIZE_UP_TO_MAGIC as u64) >= self.end {
            return Ok(None);
        }

        let want = (self.end - self.position).min(BATCH_OVERHEAD_V2 as u64) as usize;
        let mut header_buf = [0u8; BATCH_OVERHEAD_V2];
        let read = self.channel.read_fully_at(&mut header_buf[..want], self.position)?;

        let header = match BatchHeader::parse_at(&header_buf[..read], self.position) {
            Ok(header) => header,
            Err(BatchError::UnexpectedEof(_)) => return Ok(None),
            Err(error) => return Err(error.into()),
        };

        let size = header.size_in_bytes() as u64;
        if size > self.end - self.position {
            trace!(
                position = self.position,
                size,
                end = self.end,
                "Batch extends past the end of the range"
            );
            return Ok(None);
        }

        let batch = FileBatch {
            channel: Arc::clone(&self.channel),
            position: self.position,
            header,
        };
        self.position += size;
        Ok(Some(batch))
    }
}

impl Iterator for BatchCursor {
    type Item = SegmentResult<FileBatch>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        match self.next_batch() {
            Ok(batch) => batch.map(Ok),
            Err(error) => {
                self.failed = true;
                Some(Err(error))
            }
        }
    }
}

/// A batch located in a segment file. Only its header has been read.
#[derive(Debug, Clone)]
pub struct FileBatch {
    channel: Arc<FileChannel>,
    position: u64,
    header: BatchHeader,
}

impl FileBatch {
    /// Absolute file position of the batch.
    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn header(&self) -> &BatchHeader {
        &self.header
    }

    /// Read the complete batch into memory.
    pub fn load(&self) -> SegmentResult<BatchView> {
        Ok(self.load_view()?)
    }

    /// Whether the stored CRC matches the batch body on disk.
    pub fn is_valid(&self) -> SegmentResult<bool> {
        Ok(self.load_view()?.is_valid())
    }

    fn load_view(&self) -> BatchResult<BatchView> {
        let size = self.header.size_in_bytes();
        let mut buf = vec![0u8; size];
        let read = self.channel.read_fully_at(&mut buf, self.position)?;
        if read < size {
            return Err(BatchError::UnexpectedEof(read));
        }
        BatchView::new(Bytes::from(buf))
    }
}

impl RecordBatch for FileBatch {
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
        self.load_view()?.records()
    }

    fn raw_bytes(&self) -> BatchResult<Bytes> {
        Ok(self.load_view()?.bytes().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;
    use tidelog_batch::{MemoryRecords, MemoryRecordsBuilder, CURRENT_MAGIC, LOG_OVERHEAD};

    use crate::config::SegmentConfig;
    use crate::error::SegmentError;

    fn batch(base_offset: i64, count: i64) -> MemoryRecords {
        let mut builder = MemoryRecordsBuilder::new(CURRENT_MAGIC, base_offset).unwrap();
        for i in 0..count {
            builder.append(100 * (base_offset + i), None, Some(Bytes::from_static(b"payload")));
        }
        builder.build()
    }

    fn channel_with(dir: &TempDir, contents: &[u8]) -> Arc<FileChannel> {
        let channel = FileChannel::open(
            &dir.path().join("cursor.log"),
            true,
            false,
            &SegmentConfig::default(),
        )
        .unwrap();
        (&channel).write_all(contents).unwrap();
        Arc::new(channel)
    }

    fn concat(parts: &[MemoryRecords]) -> Vec<u8> {
        parts.iter().flat_map(|p| p.buffer().to_vec()).collect()
    }

    #[test]
    fn test_iterates_all_batches() {
        let dir = TempDir::new().unwrap();
        let parts = [batch(0, 2), batch(2, 3), batch(5, 1)];
        let bytes = concat(&parts);
        let channel = channel_with(&dir, &bytes);

        let batches: Vec<FileBatch> = BatchCursor::new(channel, 0, bytes.len() as u64)
            .map(Result::unwrap)
            .collect();
        let last_offsets: Vec<i64> = batches.iter().map(|b| b.last_offset()).collect();
        assert_eq!(last_offsets, vec![1, 4, 5]);
        assert_eq!(batches[1].position(), parts[0].size_in_bytes() as u64);
        assert!(batches.iter().all(|b| b.is_valid().unwrap()));
    }

    #[test]
    fn test_partial_tail_ends_iteration() {
        let dir = TempDir::new().unwrap();
        let bytes = concat(&[batch(0, 1), batch(1, 1)]);
        let channel = channel_with(&dir, &bytes);

        let cut = bytes.len() as u64 - 3;
        assert_eq!(BatchCursor::new(channel, 0, cut).count(), 1);
    }

    #[test]
    fn test_tiny_range_is_empty() {
        let dir = TempDir::new().unwrap();
        let channel = channel_with(&dir, &concat(&[batch(0, 1)]));
        assert_eq!(
            BatchCursor::new(channel, 0, HEADER_SIZE_UP_TO_MAGIC as u64).count(),
            0
        );
    }

    #[test]
    fn test_corrupt_length_yields_one_error() {
        let dir = TempDir::new().unwrap();
        let mut bytes = concat(&[batch(0, 1)]);
        bytes[8..LOG_OVERHEAD].copy_from_slice(&2i32.to_be_bytes());
        let channel = channel_with(&dir, &bytes);

        let mut cursor = BatchCursor::new(channel, 0, bytes.len() as u64);
        assert!(matches!(
            cursor.next(),
            Some(Err(SegmentError::Batch(BatchError::Corrupt { position: 0, .. })))
        ));
        assert!(cursor.next().is_none());
    }

    #[test]
    fn test_records_are_read_lazily_from_disk() {
        let dir = TempDir::new().unwrap();
        let bytes = concat(&[batch(10, 3)]);
        let channel = channel_with(&dir, &bytes);

        let file_batch = BatchCursor::new(channel, 0, bytes.len() as u64)
            .next()
            .unwrap()
            .unwrap();
        let offsets: Vec<i64> = file_batch
            .records()
            .unwrap()
            .map(|r| r.unwrap().offset())
            .collect();
        assert_eq!(offsets, vec![10, 11, 12]);
        assert_eq!(&file_batch.raw_bytes().unwrap()[..], &bytes[..]);
    }

    #[test]
    fn test_detects_corrupted_payload() {
        let dir = TempDir::new().unwrap();
        let mut bytes = concat(&[batch(0, 1)]);
        let last = bytes.len() - 1;
        bytes[last] ^= 0x55;
        let channel = channel_with(&dir, &bytes);

        let file_batch = BatchCursor::new(channel, 0, bytes.len() as u64)
            .next()
            .unwrap()
            .unwrap();
        assert!(!file_batch.is_valid().unwrap());
    }
}
