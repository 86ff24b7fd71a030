// SPDX-License-Identifier: PMPL-1.0-or-later
//
// TideLog Segments - Shared file channel
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// A `FileChannel` is the one open OS handle behind a segment view and every
// slice derived from it. It is shared through an `Arc`; the originating view
// alone releases it. Reads are positioned (`pread`) and never move the write
// cursor, so slices can read concurrently with the single appender. Once the
// channel is closed every operation fails with an I/O error instead of
// touching a recycled descriptor.

use std::fs::{File, OpenOptions};
use std::io::{self, Seek, SeekFrom, Write};
use std::os::unix::fs::FileExt;
use std::path::Path;

use parking_lot::RwLock;
use tracing::trace;

use crate::config::SegmentConfig;

/// Largest number of bytes a single generic transfer moves.
pub const MAX_TRANSFER_BYTES: u64 = 8 * 1024 * 1024;

/// Staging buffer size for generic (non zero-copy) transfers.
const TRANSFER_BUFFER_SIZE: usize = 64 * 1024;

/// An open file handle shared by a segment view and its slices.
#[derive(Debug)]
pub struct FileChannel {
    file: RwLock<Option<File>>,
}

impl FileChannel {
    /// Wrap an already-open file.
    pub fn new(file: File) -> Self {
        Self {
            file: RwLock::new(Some(file)),
        }
    }

    /// Open the channel backing a segment file.
    ///
    /// Mutable channels are opened read-write and created if missing; a
    /// brand-new file is extended to `config.initial_file_size` when
    /// `config.preallocate` is set. Read-only channels require the file to
    /// exist.
    pub fn open(
        path: &Path,
        mutable: bool,
        file_already_exists: bool,
        config: &SegmentConfig,
    ) -> io::Result<Self> {
        let file = if mutable {
            let file = OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(false)
                .open(path)?;
            if !file_already_exists && config.preallocate {
                file.set_len(config.initial_file_size)?;
            }
            file
        } else {
            OpenOptions::new().read(true).open(path)?
        };
        Ok(Self::new(file))
    }

    /// Whether the handle is still open.
    pub fn is_open(&self) -> bool {
        self.file.read().is_some()
    }

    /// Run `op` against the open file, or fail if the channel is closed.
    ///
    /// The read lock is held for the duration of `op`, so the descriptor
    /// cannot be released underneath it.
    pub fn with_file<R>(&self, op: impl FnOnce(&File) -> io::Result<R>) -> io::Result<R> {
        let guard = self.file.read();
        match guard.as_ref() {
            Some(file) => op(file),
            None => Err(io::Error::new(
                io::ErrorKind::Other,
                "file channel is closed",
            )),
        }
    }

    /// Current physical length of the file.
    pub fn size(&self) -> io::Result<u64> {
        self.with_file(|file| Ok(file.metadata()?.len()))
    }

    /// Current write cursor.
    pub fn position(&self) -> io::Result<u64> {
        self.with_file(|file| {
            let mut handle = file;
            handle.stream_position()
        })
    }

    /// Move the write cursor.
    pub fn set_position(&self, position: u64) -> io::Result<()> {
        self.with_file(|file| {
            let mut handle = file;
            handle.seek(SeekFrom::Start(position))?;
            Ok(())
        })
    }

    /// Positioned read; returns 0 at end of file.
    pub fn read_at(&self, buf: &mut [u8], position: u64) -> io::Result<usize> {
        self.with_file(|file| loop {
            match file.read_at(buf, position) {
                Err(error) if error.kind() == io::ErrorKind::Interrupted => continue,
                other => return other,
            }
        })
    }

    /// Read until `buf` is full or end of file, returning the bytes read.
    pub fn read_fully_at(&self, buf: &mut [u8], position: u64) -> io::Result<usize> {
        let mut filled = 0;
        while filled < buf.len() {
            let at = position.checked_add(filled as u64).ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("read position {position} overflows the file position range"),
                )
            })?;
            let read = self.read_at(&mut buf[filled..], at)?;
            if read == 0 {
                break;
            }
            filled += read;
        }
        Ok(filled)
    }

    /// Truncate the file to `size` bytes, pulling the write cursor back to
    /// the new end if it lay beyond it.
    pub fn truncate(&self, size: u64) -> io::Result<()> {
        self.with_file(|file| {
            let mut handle = file;
            let position = handle.stream_position()?;
            file.set_len(size)?;
            if position > size {
                handle.seek(SeekFrom::Start(size))?;
            }
            Ok(())
        })
    }

    /// Force file data and metadata to stable storage.
    pub fn force(&self) -> io::Result<()> {
        self.with_file(|file| file.sync_all())
    }

    /// Release the OS handle. Closing twice is a no-op.
    pub fn close(&self) {
        if self.file.write().take().is_some() {
            trace!("Closed file channel");
        }
    }

    /// Copy up to `count` bytes starting at `position` into `dest`, staging
    /// them through a bounded buffer.
    ///
    /// Moves at most [`MAX_TRANSFER_BYTES`] per call and stops early at end
    /// of file; the returned count may be smaller than requested.
    pub fn transfer_to<W: Write + ?Sized>(
        &self,
        position: u64,
        count: u64,
        dest: &mut W,
    ) -> io::Result<u64> {
        let count = count.min(MAX_TRANSFER_BYTES);
        let mut buf = vec![0u8; TRANSFER_BUFFER_SIZE.min(count as usize)];
        let mut transferred = 0u64;

        while transferred < count {
            let want = (count - transferred).min(buf.len() as u64) as usize;
            let read = self.read_at(&mut buf[..want], position + transferred)?;
            if read == 0 {
                break;
            }
            dest.write_all(&buf[..read])?;
            transferred += read as u64;
        }

        Ok(transferred)
    }
}

/// Writes go to the channel's cursor, like appends to the file.
impl Write for &FileChannel {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.with_file(|file| {
            let mut handle = file;
            handle.write(buf)
        })
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
