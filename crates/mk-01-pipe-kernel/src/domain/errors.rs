//! Error types for the pipe kernel.

use thiserror::Error;

/// Errors from individual pipe operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PipeError {
    /// The writable side was already ended.
    #[error("pipe {0} has ended")]
    Ended(String),

    /// Another edge is already consuming this pipe's readable side.
    #[error("pipe {0} already has a reader attached")]
    ReaderAttached(String),

    /// The adapter could not create the pipe.
    #[error("pipe adapter failure: {0}")]
    Adapter(String),
}

/// Errors from kernel composition operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum KernelError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error(transparent)]
    Pipe(#[from] PipeError),
}
