//! Error types shared by the engine and the driver-side stages.

use std::io;
use thiserror::Error;

/// Result type for FDMT operations
pub type Result<T> = std::result::Result<T, FdmtError>;

/// Errors surfaced by the transform and its collaborators.
///
/// `Shape`, `Config` and `InternalInvariant` abort the whole call: no partial
/// tensor is ever handed back.
#[derive(Error, Debug)]
pub enum FdmtError {
    /// Malformed input dimensions (channel count not a power of two, empty axes, ...)
    #[error("shape error: {0}")]
    Shape(String),

    /// Invalid physical or search parameters
    #[error("configuration error: {0}")]
    Config(String),

    /// A delay index left the allocated tensor. Indicates a delay-model or engine bug.
    #[error("internal invariant violated: {0}")]
    InternalInvariant(String),

    /// Input sample that the selected numeric kind cannot represent
    #[error("sample at channel {channel}, time {time} is not representable as {kind}")]
    Sample {
        channel: usize,
        time: usize,
        kind: &'static str,
    },

    /// File access failed
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Malformed .npy container
    #[error("npy error: {0}")]
    Npy(String),
}

impl FdmtError {
    pub(crate) fn shape(msg: impl Into<String>) -> Self {
        FdmtError::Shape(msg.into())
    }

    pub(crate) fn config(msg: impl Into<String>) -> Self {
        FdmtError::Config(msg.into())
    }

    pub(crate) fn invariant(msg: impl Into<String>) -> Self {
        FdmtError::InternalInvariant(msg.into())
    }
}
