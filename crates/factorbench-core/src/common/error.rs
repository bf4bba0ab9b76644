//! Error types shared by the factorize service and the benchmark driver.
//!
//! The service maps [`Error`] onto an HTTP status and an [`ErrorResponse`]
//! body, so the message of each variant is what a client ends up reading.
//!
//! [`ErrorResponse`]: crate::types::ErrorResponse

pub type Result<T> = core::result::Result<T, Error>;

/// Unified error type for the factorization protocol.
#[derive(Clone, thiserror::Error, Debug, PartialEq, Eq)]
pub enum Error {
    /// The `number` parameter was missing, non-numeric or below 2.
    #[error("please provide a valid number (>= 2)")]
    InvalidNumber { input: String },
}
