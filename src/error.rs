//! Errors raised by the encoding stages.
//!
//! Every variant carries the name of the failing operation so the caller can
//! tell which stage rejected its input.

use crate::store::FrameKey;

pub type Result<T> = std::result::Result<T, TargetEncodingError>;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TargetEncodingError {
    #[error("{op}: column `{name}` not found")]
    ColumnNotFound { op: &'static str, name: String },

    #[error("{op}: column index {index} out of bounds for frame with {ncols} columns")]
    ColumnIndexOutOfBounds {
        op: &'static str,
        index: usize,
        ncols: usize,
    },

    #[error("{op}: column {index} is not numeric")]
    NotNumeric { op: &'static str, index: usize },

    #[error("{op}: column {index} is not categorical")]
    NotCategorical { op: &'static str, index: usize },

    #[error("{op}: row count mismatch, expected {expected}, got {got}")]
    RowCountMismatch {
        op: &'static str,
        expected: usize,
        got: usize,
    },

    #[error("column `{name}` already exists")]
    DuplicateColumn { name: String },

    #[error("{op}: column {index} has {count} unique values, more than can be indexed")]
    UniqueValuesOverflow {
        op: &'static str,
        index: usize,
        count: usize,
    },

    #[error("frame {0} is not registered")]
    UnknownFrame(FrameKey),

    #[error("{op}: {reason}")]
    InvalidParameter { op: &'static str, reason: String },
}
