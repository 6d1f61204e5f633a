//! Errors raised by [`RecordStore`](crate::RecordStore) operations.
//!
//! A missing key is never an error: `search` returns an exhausted iterator and
//! `erase` returns a count of zero.

use std::io;

use blockfile::BlockError;
use thiserror::Error;

/// Errors that can occur while reading or mutating a disk multimap.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The store has no open file.
    #[error("store is not open")]
    NotOpen,

    /// A key, value, or context is longer than a record field can hold.
    #[error("{field} too long: {len} bytes (max {max})")]
    FieldTooLong {
        /// Which field was rejected (`"key"`, `"value"`, or `"context"`).
        field: &'static str,
        /// Length of the rejected string in bytes.
        len: usize,
        /// Maximum accepted length in bytes.
        max: usize,
    },

    /// A field contains a NUL byte, which the null-padded encoding cannot
    /// represent.
    #[error("{field} contains a NUL byte")]
    InvalidField {
        /// Which field was rejected.
        field: &'static str,
    },

    /// The underlying block file failed.
    #[error(transparent)]
    Block(#[from] BlockError),

    /// Encoding or decoding a record failed.
    #[error("codec error: {0}")]
    Io(#[from] io::Error),

    /// The file does not start with a valid store header.
    #[error("bad header: {0}")]
    BadHeader(String),

    /// A chain offset points somewhere it must not.
    #[error("corrupt record at offset {offset}: {reason}")]
    Corrupt {
        /// Offset that failed validation.
        offset: i64,
        /// What was wrong with it.
        reason: String,
    },
}

impl StoreError {
    /// Returns `true` for errors raised before any write was attempted
    /// (closed store, oversized or unencodable fields).
    #[must_use]
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            StoreError::NotOpen | StoreError::FieldTooLong { .. } | StoreError::InvalidField { .. }
        )
    }

    /// Returns `true` if the on-disk structure is damaged.
    #[must_use]
    pub fn is_corruption(&self) -> bool {
        matches!(self, StoreError::BadHeader(_) | StoreError::Corrupt { .. })
    }
}
