// SPDX-License-Identifier: PMPL-1.0-or-later
//
// TideLog Segments - Segment file views
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// A `SegmentFile` is a byte-range view over one open segment file. The view
// created by `open` covers the whole file and owns the lifecycle of the
// shared `FileChannel`; `slice` derives read-only sub-views that share the
// channel but carry their own fixed `[start, end)` window.
//
// The logical `size` is an atomic counter: appends advance it, truncation
// shrinks it, and readers on any thread may observe it. Structural
// mutations (append, truncate, close, rename) must be serialized by the
// caller.

use std::fmt;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tidelog_batch::MemoryRecords;
use tracing::{debug, info, trace, warn};

use crate::channel::FileChannel;
use crate::config::{SegmentConfig, DEFAULT_MAX_SEGMENT_BYTES};
use crate::cursor::BatchCursor;
use crate::error::{SegmentError, SegmentResult};

/// `end` of a full view whose size follows the live file.
pub const UNBOUNDED_END: u64 = u64::MAX;

/// A view over a contiguous byte range of a segment file.
#[derive(Debug)]
pub struct SegmentFile {
    path: RwLock<PathBuf>,
    channel: Arc<FileChannel>,
    start: u64,
    end: u64,
    is_slice: bool,
    size: AtomicU64,
    max_size: u64,
}

impl SegmentFile {
    /// Build a view over an already-open channel.
    ///
    /// A slice covers exactly `[start, end)` and performs no I/O. A full view
    /// derives its size from `min(file length, end) - start` and moves the
    /// channel's write cursor to that limit, so the next append lands right
    /// after the valid data rather than after a pre-allocated tail.
    pub fn new(
        path: impl Into<PathBuf>,
        channel: Arc<FileChannel>,
        start: u64,
        end: u64,
        is_slice: bool,
    ) -> SegmentResult<Self> {
        let path = path.into();
        let size = if is_slice {
            if start > end {
                return Err(SegmentError::InvalidArgument(format!(
                    "slice start {start} is beyond its end {end}"
                )));
            }
            end - start
        } else {
            let limit = channel.size()?.min(end);
            channel.set_position(limit)?;
            limit.saturating_sub(start)
        };

        Ok(Self {
            path: RwLock::new(path),
            channel,
            start,
            end,
            is_slice,
            size: AtomicU64::new(size),
            max_size: DEFAULT_MAX_SEGMENT_BYTES,
        })
    }

    /// Open a segment file.
    ///
    /// `mutable` opens it read-write (creating it if needed); otherwise it is
    /// opened read-only and must exist. A brand-new file created with
    /// `config.preallocate` is extended to `config.initial_file_size`, and the
    /// view starts out empty instead of covering the reserved bytes.
    pub fn open(
        path: impl AsRef<Path>,
        mutable: bool,
        file_already_exists: bool,
        config: &SegmentConfig,
    ) -> SegmentResult<Self> {
        config.validate()?;
        let path = path.as_ref();
        let channel = FileChannel::open(path, mutable, file_already_exists, config)?;
        let end = if !file_already_exists && config.preallocate {
            0
        } else {
            UNBOUNDED_END
        };

        let mut segment = Self::new(path, Arc::new(channel), 0, end, false)?;
        segment.max_size = config.max_segment_bytes;
        debug!(
            segment = %path.display(),
            size = segment.size_in_bytes(),
            mutable,
            preallocate = config.preallocate && !file_already_exists,
            "Opened segment file"
        );
        Ok(segment)
    }

    /// Open (or create) a segment file for appending.
    pub fn open_mutable(path: impl AsRef<Path>) -> SegmentResult<Self> {
        Self::open(path, true, false, &SegmentConfig::default())
    }

    /// Open an existing segment file for reading.
    pub fn open_read_only(path: impl AsRef<Path>) -> SegmentResult<Self> {
        Self::open(path, false, true, &SegmentConfig::default())
    }

    /// Logical size of the view in bytes.
    pub fn size_in_bytes(&self) -> u64 {
        self.size.load(Ordering::Acquire)
    }

    /// The file this view currently refers to.
    pub fn path(&self) -> PathBuf {
        self.path.read().clone()
    }

    /// The shared channel, for collaborators doing their own positioned reads.
    pub fn channel(&self) -> &Arc<FileChannel> {
        &self.channel
    }

    pub fn start(&self) -> u64 {
        self.start
    }

    pub fn end(&self) -> u64 {
        self.end
    }

    pub fn is_slice(&self) -> bool {
        self.is_slice
    }

    /// Largest logical size appends may grow this view to.
    pub fn max_size(&self) -> u64 {
        self.max_size
    }

    /// Absolute file position of the view-relative `position`.
    fn absolute(&self, position: u64) -> SegmentResult<u64> {
        self.start.checked_add(position).ok_or_else(|| {
            SegmentError::InvalidArgument(format!(
                "position {position} overflows the file position range of {self}"
            ))
        })
    }

    /// Absolute position where batch iteration stops.
    pub(crate) fn scan_end(&self) -> u64 {
        if self.is_slice {
            self.end
        } else {
            self.start + self.size_in_bytes()
        }
    }

    /// Fill `buf` from the view-relative `position`, stopping early only at
    /// end of file. Returns the number of bytes read.
    pub fn read_into(&self, buf: &mut [u8], position: u64) -> SegmentResult<usize> {
        let position = self.absolute(position)?;
        Ok(self.channel.read_fully_at(buf, position)?)
    }

    /// A read-only view of `size` bytes starting at the view-relative
    /// `position`.
    ///
    /// The slice never reaches past this view's current logical end: a
    /// request for more is clamped. Slicing a slice composes positions.
    pub fn slice(&self, position: u64, size: u64) -> SegmentResult<SegmentFile> {
        let current = self.size_in_bytes();
        if position > current {
            return Err(SegmentError::InvalidArgument(format!(
                "slice position {position} is beyond the segment size {current} of {self}"
            )));
        }

        let start = self.start + position;
        let limit = self.start + current;
        let end = start
            .checked_add(size)
            .filter(|&end| end < limit)
            .unwrap_or(limit);

        trace!(segment = %self.path().display(), start, end, "Sliced segment file");
        Ok(SegmentFile {
            path: RwLock::new(self.path()),
            channel: Arc::clone(&self.channel),
            start,
            end,
            is_slice: true,
            size: AtomicU64::new(end - start),
            max_size: self.max_size,
        })
    }

    /// Iterate the batches of this view from its start.
    pub fn batches(&self) -> BatchCursor {
        self.batches_from(self.start)
    }

    /// Iterate the batches from the absolute file `position`, which must be
    /// a batch boundary. Every call yields a fresh cursor.
    pub fn batches_from(&self, position: u64) -> BatchCursor {
        BatchCursor::new(Arc::clone(&self.channel), position, self.scan_end())
    }

    fn ensure_mutable(&self, operation: &str) -> SegmentResult<()> {
        if self.is_slice {
            return Err(SegmentError::InvalidArgument(format!(
                "cannot {operation} read-only slice {self}"
            )));
        }
        Ok(())
    }

    /// Append encoded batches at the end of the file, returning the number
    /// of bytes written.
    pub fn append(&self, records: &MemoryRecords) -> SegmentResult<u64> {
        self.ensure_mutable("append to")?;
        let current = self.size_in_bytes();
        let incoming = records.size_in_bytes() as u64;
        if incoming > self.max_size.saturating_sub(current) {
            return Err(SegmentError::InvalidArgument(format!(
                "append of {incoming} bytes is too large for segment {} with current size {current} and limit {}",
                self.path().display(),
                self.max_size
            )));
        }

        let mut writer = &*self.channel;
        let written = records.write_fully_to(&mut writer)? as u64;
        self.size.fetch_add(written, Ordering::AcqRel);
        trace!(segment = %self.path().display(), bytes = written, "Appended to segment file");
        Ok(written)
    }

    /// Force written data to stable storage.
    pub fn flush(&self) -> SegmentResult<()> {
        self.channel.force()?;
        Ok(())
    }

    /// Shrink the view to `target_size` bytes, returning the number of bytes
    /// removed.
    ///
    /// The file is only truncated physically when it is longer than the
    /// target. The target is not checked against batch boundaries.
    pub fn truncate_to(&self, target_size: u64) -> SegmentResult<u64> {
        self.ensure_mutable("truncate")?;
        let original = self.size_in_bytes();
        if target_size > original {
            return Err(SegmentError::Truncation {
                path: self.path(),
                target_size,
                current_size: original,
            });
        }

        let physical_target = self.start + target_size;
        if physical_target < self.channel.size()? {
            self.channel.truncate(physical_target)?;
            self.size.store(target_size, Ordering::Release);
        }

        let removed = original - target_size;
        if removed > 0 {
            info!(
                segment = %self.path().display(),
                target_size,
                removed,
                "Truncated segment file"
            );
        }
        Ok(removed)
    }

    /// Drop any bytes past the logical end, such as unused pre-allocation.
    pub fn trim(&self) -> SegmentResult<()> {
        self.truncate_to(self.size_in_bytes())?;
        debug!(segment = %self.path().display(), size = self.size_in_bytes(), "Trimmed segment file");
        Ok(())
    }

    /// Flush, trim and release the channel.
    pub fn close(&self) -> SegmentResult<()> {
        self.ensure_mutable("close")?;
        self.flush()?;
        self.trim()?;
        self.channel.close();
        debug!(segment = %self.path().display(), "Closed segment file");
        Ok(())
    }

    /// Release the channel without flushing or trimming. Used when the
    /// storage device is suspected to have failed.
    pub fn close_handlers(&self) -> SegmentResult<()> {
        self.ensure_mutable("close")?;
        self.channel.close();
        debug!(segment = %self.path().display(), "Closed segment file handlers");
        Ok(())
    }

    /// Release the channel and delete the file. Returns `false` if there was
    /// no file to delete.
    pub fn delete_if_exists(&self) -> SegmentResult<bool> {
        self.ensure_mutable("delete")?;
        self.channel.close();

        let path = self.path();
        match fs::remove_file(&path) {
            Ok(()) => {
                info!(segment = %path.display(), "Deleted segment file");
                Ok(true)
            }
            Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(error) => Err(error.into()),
        }
    }

    /// Move the backing file to `new_path`.
    ///
    /// Tries an atomic rename first and falls back to copy plus delete. The
    /// view refers to `new_path` afterwards even if the move failed.
    pub fn rename_to(&self, new_path: impl AsRef<Path>) -> SegmentResult<()> {
        self.ensure_mutable("rename")?;
        let new_path = new_path.as_ref().to_path_buf();
        let old_path = self.path();

        let outcome = move_file(&old_path, &new_path);
        *self.path.write() = new_path.clone();

        match outcome {
            Ok(()) => {
                info!(
                    from = %old_path.display(),
                    to = %new_path.display(),
                    "Renamed segment file"
                );
                Ok(())
            }
            Err(error) => {
                warn!(
                    from = %old_path.display(),
                    to = %new_path.display(),
                    error = %error,
                    "Segment path updated although the rename failed"
                );
                Err(error.into())
            }
        }
    }

    /// Point the view at `path` without touching the channel.
    pub fn set_file(&self, path: impl Into<PathBuf>) {
        *self.path.write() = path.into();
    }
}

impl fmt::Display for SegmentFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SegmentFile(file={}, start={}, end={})",
            self.path.read().display(),
            self.start,
            self.end
        )
    }
}

/// Atomic rename with a copy-and-delete fallback, then sync the target's
/// directory entry.
fn move_file(source: &Path, target: &Path) -> io::Result<()> {
    if let Err(error) = fs::rename(source, target) {
        debug!(
            from = %source.display(),
            to = %target.display(),
            error = %error,
            "Atomic rename failed, falling back to copy"
        );
        fs::copy(source, target)?;
        fs::remove_file(source)?;
    }

    match target.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => File::open(dir)?.sync_all(),
        _ => Ok(()),
    }
}
