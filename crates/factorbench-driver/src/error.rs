//! Error types for the benchmark driver.
//!
//! One enum per failure domain, ordered from the most local to the most
//! fatal:
//!
//! - [`ResolutionError`]: a discovery lookup failed. The refresher logs it and
//!   keeps the previous endpoint.
//! - [`WorkloadError`]: the workload source could not be opened or read. Fatal
//!   to the run before any worker starts.
//! - [`RequestError`]: one factorize request failed. Counted by the worker,
//!   which moves on to its next number.
//! - [`RunError`]: the terminal error a run's caller receives.

use serde::Serialize;
use std::{fmt, io, path::PathBuf, time::Duration};
use thiserror::Error;

/// A discovery lookup failure.
#[derive(Error, Debug)]
pub enum ResolutionError {
    /// The directory could not be reached or the body could not be read.
    #[error("failed to query discovery directory: {0}")]
    Request(#[from] reqwest::Error),

    /// The directory answered with a non-success status.
    #[error("discovery directory answered with status {0}")]
    Status(u16),

    /// The directory answered with something other than a catalog listing.
    #[error("failed to decode discovery response: {0}")]
    Decode(String),

    /// The service has no registered instances.
    #[error("no instances for service {service:?} found")]
    NotFound { service: String },
}

/// A failure to load the workload source.
#[derive(Error, Debug)]
pub enum WorkloadError {
    #[error("failed to open {}: {source}", path.display())]
    Open { path: PathBuf, source: io::Error },

    #[error("failed to read {}: {source}", path.display())]
    Read { path: PathBuf, source: io::Error },
}

/// A single failed factorize request.
#[derive(Error, Debug)]
pub enum RequestError {
    /// No endpoint has been resolved yet.
    #[error("no endpoint resolved")]
    Unresolved,

    /// The request could not be sent or no response arrived.
    #[error("error calling API: {0}")]
    Transport(reqwest::Error),

    /// The response body could not be read.
    #[error("error reading response: {0}")]
    Body(reqwest::Error),

    /// The service answered with a non-success status.
    #[error("service answered {status}: {body}")]
    Status { status: u16, body: String },

    /// The body was not a factorize response.
    #[error("error parsing JSON: {0}")]
    Decode(String),
}

/// Why a run stopped before every worker finished its sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "cause", rename_all = "snake_case")]
pub enum CancelCause {
    /// The owner of the run cancelled it.
    Caller,
    /// The run's time bound elapsed.
    Deadline,
    /// A worker died with a non-recoverable error.
    WorkerFailed { worker: usize, reason: String },
}

impl fmt::Display for CancelCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Caller => write!(f, "cancelled by caller"),
            Self::Deadline => write!(f, "deadline exceeded"),
            Self::WorkerFailed { worker, reason } => write!(f, "worker {worker} failed: {reason}"),
        }
    }
}

/// The terminal error of a run.
#[derive(Error, Debug)]
pub enum RunError {
    #[error(transparent)]
    Workload(#[from] WorkloadError),

    #[error("workload is empty after filtering invalid lines")]
    EmptyWorkload,

    #[error("no endpoint resolved within {0:?}")]
    Unresolved(Duration),

    #[error("run stopped: {0}")]
    Cancelled(CancelCause),
}
