//! Crate-wide error taxonomy.

use std::io;

/// Errors returned by the timer and scheduler interfaces.
///
/// Unrecoverable conditions are deliberately absent: a re-arm failure after
/// a compensating removal, or a clock read failure inside a timer worker,
/// aborts the process instead of risking a silently lost callback.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An id was out of range or unknown, or the operation does not apply
    /// to the object's current state.
    #[error("invalid argument")]
    InvalidArgument,

    /// No live registration exists under the given id.
    #[error("entry not found")]
    NotFound,

    /// The scheduler is in fatal state or already torn down. A clean
    /// reinitialization is required.
    #[error("operation cancelled; scheduler requires reinitialization")]
    Cancelled,

    /// Signal-driven delivery was requested but compiled out.
    #[error("signal notification support not configured")]
    NotConfigured,

    /// An OS primitive failed in a recoverable path.
    #[error("system error: {0}")]
    Sys(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
