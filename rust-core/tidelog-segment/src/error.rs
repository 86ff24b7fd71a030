// SPDX-License-Identifier: PMPL-1.0-or-later
//
// TideLog Segments - Error types
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Every segment operation fails loudly: no retries, no silent recovery. The
// variants below are what callers (the log manager) map onto their own
// recovery procedures.

use std::path::PathBuf;

use thiserror::Error;
use tidelog_batch::BatchError;

/// Errors that can occur during segment file operations.
#[derive(Debug, Error)]
pub enum SegmentError {
    /// A slice or read parameter is out of range, or a mutation was attempted
    /// on a read-only slice.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A truncation target lies outside `0..=size`.
    #[error("attempt to truncate log segment {path} to {target_size} bytes failed, size of this log segment is {current_size} bytes")]
    Truncation {
        /// The segment file.
        path: PathBuf,
        /// The requested size.
        target_size: u64,
        /// The logical size at the time of the call.
        current_size: u64,
    },

    /// The file shrank underneath the cached logical size.
    #[error("size of segment file {path} has been truncated during write: old size {old_size}, new size {new_size}")]
    ConsistencyViolation {
        /// The segment file.
        path: PathBuf,
        /// The cached logical size.
        old_size: u64,
        /// The size re-derived from the live file.
        new_size: u64,
    },

    /// An underlying read, write, flush, truncate, rename or delete failed.
    #[error("segment I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Batch data in the file is malformed.
    #[error("segment batch error: {0}")]
    Batch(#[from] BatchError),

    /// A [`crate::config::SegmentConfig`] failed validation.
    #[error("invalid segment configuration: {0}")]
    InvalidConfig(String),
}

/// Convenience type alias for segment results.
pub type SegmentResult<T> = Result<T, SegmentError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_truncation() {
        let error = SegmentError::Truncation {
            path: PathBuf::from("00000000000000000000.log"),
            target_size: 200,
            current_size: 100,
        };
        let message = error.to_string();
        assert!(message.contains("00000000000000000000.log"));
        assert!(message.contains("200"));
        assert!(message.contains("100"));
    }

    #[test]
    fn test_error_display_consistency() {
        let error = SegmentError::ConsistencyViolation {
            path: PathBuf::from("seg.log"),
            old_size: 4096,
            new_size: 1024,
        };
        let message = error.to_string();
        assert!(message.contains("old size 4096"));
        assert!(message.contains("new size 1024"));
    }

    #[test]
    fn test_batch_error_converts() {
        let error = SegmentError::from(BatchError::UnsupportedMagic(9));
        assert!(error.to_string().contains("magic 9"));
    }
}
