use std::{fmt, io};
use thiserror::Error;

/// Unified error type for all tupkv operations.
///
/// The dataset-level variants (`InvalidUri` through `Corrupt`) are the
/// failure modes a caller of the page sink/source can observe; the ambient
/// variants (`Io`, `NotFound`, `Internal`) cover everything underneath.
///
/// # Thread Safety
///
/// `Error` is `Send + Sync` so it can cross thread boundaries, which
/// matters for background cluster prefetch and parallel decompression.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error during a local file or memory operation.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Dataset URI does not match `kv://<pool>/<container>`.
    #[error("invalid dataset URI: {0}")]
    InvalidUri(String),

    /// The requested object class is not recognized by the KV driver.
    #[error("unknown object class: {0}")]
    UnknownObjectClass(String),

    /// The stored anchor record is shorter than its fixed 20-byte prefix.
    #[error("dataset anchor too short")]
    AnchorTooShort,

    /// The anchor's variable part could not be decoded (truncated or
    /// invalid object-class string).
    #[error("dataset anchor corrupted: {0}")]
    AnchorDecodeFailed(String),

    /// The KV driver returned a non-zero status on a single or vectored
    /// write. `code` is the driver's integer error code.
    #[error("write failed: {detail} (driver code {code})")]
    WriteFailed { code: i32, detail: String },

    /// The KV driver returned a non-zero status on a single or vectored
    /// read. `code` is the driver's integer error code.
    #[error("read failed: {detail} (driver code {code})")]
    ReadFailed { code: i32, detail: String },

    /// The caller requested a page of zero elements.
    #[error("invalid call: requested empty page")]
    EmptyPage,

    /// Bytes read back from the store do not match the descriptor
    /// (wrong size, bad magic, undecodable payload).
    #[error("corrupt dataset: {0}")]
    Corrupt(String),

    /// A descriptor lookup (column, cluster, page) found nothing.
    #[error("storage entry not found")]
    NotFound,

    /// Internal error indicating a bug or unexpected state. This should
    /// never surface during normal operation.
    #[error("an internal operation failed: {0}")]
    Internal(String),
}

impl Error {
    /// Wrap a driver write failure, preserving its integer code.
    #[inline]
    pub fn write_failed<E: fmt::Display>(code: i32, err: E) -> Self {
        Error::WriteFailed {
            code,
            detail: err.to_string(),
        }
    }

    /// Wrap a driver read failure, preserving its integer code.
    #[inline]
    pub fn read_failed<E: fmt::Display>(code: i32, err: E) -> Self {
        Error::ReadFailed {
            code,
            detail: err.to_string(),
        }
    }

    /// Create a corruption error from any displayable cause.
    #[inline]
    pub fn corrupt<E: fmt::Display>(err: E) -> Self {
        Error::Corrupt(err.to_string())
    }
}
