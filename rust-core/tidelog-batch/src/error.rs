// SPDX-License-Identifier: PMPL-1.0-or-later
//
// TideLog Record Batches - Error types
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Defines every failure that can surface while parsing, validating, building
// or converting record batches.

use thiserror::Error;

/// Errors that can occur while working with record batches.
#[derive(Debug, Error)]
pub enum BatchError {
    /// An I/O error occurred while reading batch bytes from their source.
    #[error("batch I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The batch header or body is structurally invalid.
    #[error("corrupt batch at position {position}: {reason}")]
    Corrupt {
        /// Byte position of the batch within its source (0 for in-memory buffers).
        position: u64,
        /// Human-readable description of what was wrong.
        reason: String,
    },

    /// CRC32 checksum mismatch between the header and the batch body.
    #[error("CRC mismatch in batch with base offset {base_offset}: stored {stored:#010x}, computed {computed:#010x}")]
    CrcMismatch {
        /// Base offset of the damaged batch.
        base_offset: i64,
        /// The CRC32 value stored in the header.
        stored: u32,
        /// The CRC32 value computed over the body.
        computed: u32,
    },

    /// The magic byte names a format version this crate does not know.
    #[error("unsupported batch magic {0}")]
    UnsupportedMagic(u8),

    /// A record or batch ran past the end of the available bytes.
    #[error("unexpected end of batch data at byte {0}")]
    UnexpectedEof(usize),
}

/// Convenience type alias for batch results.
pub type BatchResult<T> = Result<T, BatchError>;

impl BatchError {
    /// Build a [`BatchError::Corrupt`] for the batch at `position`.
    pub fn corrupt(position: u64, reason: impl Into<String>) -> Self {
        Self::Corrupt {
            position,
            reason: reason.into(),
        }
    }
}
