// SPDX-License-Identifier: PMPL-1.0-or-later
//
// TideLog Segments - Transfer to destinations
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// `write_to` copies a byte range of a segment into a destination. Files and
// TCP sockets on Linux receive the bytes through `sendfile(2)`, which moves
// them kernel-side; every other destination gets them through a bounded
// user-space buffer. Either way a single call may move fewer bytes than
// requested. Callers that need an exact amount loop on the returned count.

use std::fs::File;
use std::io::{self, Write};
use std::net::TcpStream;

use tracing::{error, trace};

use crate::error::{SegmentError, SegmentResult};
use crate::segment::SegmentFile;

/// A destination that can pull bytes straight out of a file.
pub trait ZeroCopyTarget {
    /// Move up to `count` bytes starting at `position` of `source` into
    /// `self`, returning how many were moved.
    fn transfer_from(&mut self, source: &File, position: u64, count: u64) -> io::Result<u64>;
}

/// A destination for [`SegmentFile::write_to`].
pub trait TransferTarget: Write {
    /// The zero-copy capability of this destination, if it has one.
    fn zero_copy(&mut self) -> Option<&mut dyn ZeroCopyTarget> {
        None
    }
}

impl TransferTarget for Vec<u8> {}

impl TransferTarget for io::Sink {}

impl TransferTarget for File {
    #[cfg(target_os = "linux")]
    fn zero_copy(&mut self) -> Option<&mut dyn ZeroCopyTarget> {
        Some(self)
    }
}

impl TransferTarget for TcpStream {
    #[cfg(target_os = "linux")]
    fn zero_copy(&mut self) -> Option<&mut dyn ZeroCopyTarget> {
        Some(self)
    }
}

#[cfg(target_os = "linux")]
impl ZeroCopyTarget for File {
    fn transfer_from(&mut self, source: &File, position: u64, count: u64) -> io::Result<u64> {
        use std::os::unix::io::AsRawFd;
        sendfile(self.as_raw_fd(), source, position, count)
    }
}

#[cfg(target_os = "linux")]
impl ZeroCopyTarget for TcpStream {
    fn transfer_from(&mut self, source: &File, position: u64, count: u64) -> io::Result<u64> {
        use std::os::unix::io::AsRawFd;
        sendfile(self.as_raw_fd(), source, position, count)
    }
}

/// One `sendfile(2)` call, retried on `EINTR`.
#[cfg(target_os = "linux")]
fn sendfile(
    out_fd: std::os::unix::io::RawFd,
    source: &File,
    position: u64,
    count: u64,
) -> io::Result<u64> {
    use std::os::unix::io::AsRawFd;

    let count = count.min(crate::channel::MAX_TRANSFER_BYTES) as usize;
    let mut offset = libc::off_t::try_from(position)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "transfer position overflows off_t"))?;
    loop {
        // SAFETY: both descriptors stay open for the duration of the call and
        // `offset` is a valid, exclusively borrowed off_t.
        let sent = unsafe { libc::sendfile(out_fd, source.as_raw_fd(), &mut offset, count) };
        if sent >= 0 {
            return Ok(sent as u64);
        }
        let error = io::Error::last_os_error();
        if error.kind() != io::ErrorKind::Interrupted {
            return Err(error);
        }
    }
}

impl SegmentFile {
    /// Copy up to `length` bytes from the view-relative `offset` into `dest`,
    /// returning the number of bytes actually moved.
    ///
    /// Fails with [`SegmentError::ConsistencyViolation`] if the file has
    /// shrunk below the cached size since it was last observed. Never moves
    /// bytes past the view's end; may move fewer than requested.
    pub fn write_to<T>(&self, dest: &mut T, offset: u64, length: u64) -> SegmentResult<u64>
    where
        T: TransferTarget + ?Sized,
    {
        let old_size = self.size_in_bytes();
        let channel_size = self.channel().size()?;
        let live_end = if self.is_slice() {
            channel_size.min(self.end())
        } else {
            channel_size
        };
        let new_size = live_end.saturating_sub(self.start());
        if new_size < old_size {
            let path = self.path();
            error!(
                segment = %path.display(),
                old_size,
                new_size,
                "Segment file truncated underneath a transfer"
            );
            return Err(SegmentError::ConsistencyViolation {
                path,
                old_size,
                new_size,
            });
        }

        if offset >= old_size || length == 0 {
            return Ok(0);
        }
        let count = length.min(old_size - offset);
        let position = self.start() + offset;

        let zero_copied = match dest.zero_copy() {
            Some(target) => Some(
                self.channel()
                    .with_file(|file| target.transfer_from(file, position, count))?,
            ),
            None => None,
        };
        let transferred = match zero_copied {
            Some(transferred) => transferred,
            None => self.channel().transfer_to(position, count, dest)?,
        };

        trace!(
            segment = %self.path().display(),
            position,
            requested = length,
            transferred,
            zero_copy = zero_copied.is_some(),
            "Transferred segment bytes"
        );
        Ok(transferred)
    }
}
