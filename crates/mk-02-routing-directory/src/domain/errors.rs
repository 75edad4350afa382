//! Error types for the routing directory.

use thiserror::Error;

/// Routing directory errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RoutingError {
    /// The announcement was malformed (e.g. empty id).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}
