// SPDX-License-Identifier: PMPL-1.0-or-later
//! Segment file configuration.
//!
//! Defaults:
//! - preallocate: false
//! - initial_file_size: 0
//! - max_segment_bytes: `i32::MAX` (positions inside a segment fit in 31 bits)

use serde::{Deserialize, Serialize};

use crate::error::{SegmentError, SegmentResult};

/// Largest segment size the batch position arithmetic supports.
pub const DEFAULT_MAX_SEGMENT_BYTES: u64 = i32::MAX as u64;

/// Configuration applied when opening segment files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentConfig {
    /// Reserve `initial_file_size` bytes when creating a brand-new file.
    /// Reduces filesystem metadata churn on some platforms.
    pub preallocate: bool,
    /// Pre-allocation size in bytes (only used with `preallocate`).
    pub initial_file_size: u64,
    /// Largest logical size appends may grow a segment to. Also bounds
    /// `initial_file_size`.
    pub max_segment_bytes: u64,
}

impl SegmentConfig {
    /// Configuration that pre-allocates `initial_file_size` bytes for new files.
    pub fn preallocated(initial_file_size: u64) -> Self {
        Self {
            preallocate: true,
            initial_file_size,
            ..Self::default()
        }
    }

    /// Check the configuration for contradictions.
    pub fn validate(&self) -> SegmentResult<()> {
        if self.initial_file_size > self.max_segment_bytes {
            return Err(SegmentError::InvalidConfig(format!(
                "initial_file_size {} exceeds max_segment_bytes {}",
                self.initial_file_size, self.max_segment_bytes
            )));
        }
        if self.preallocate && self.initial_file_size == 0 {
            return Err(SegmentError::InvalidConfig(
                "preallocate requires a non-zero initial_file_size".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for SegmentConfig {
    fn default() -> Self {
        Self {
            preallocate: false,
            initial_file_size: 0,
            max_segment_bytes: DEFAULT_MAX_SEGMENT_BYTES,
        }
    }
}
