//! Typed failures at the delivery and sampling seams

use thiserror::Error;

/// Why a single record did not reach the collector.
///
/// Every variant is retryable: the caller keeps the record queued.
#[derive(Error, Debug)]
pub enum DeliveryError {
    /// Collector answered with a non-2xx status
    #[error("collector rejected record with status {status}: {body}")]
    Rejected { status: u16, body: String },

    /// Timeout, DNS, connect or I/O failure
    #[error("transport failure: {0}")]
    Transport(#[from] reqwest::Error),
}

/// Failures raised by a location source while subscribing
#[derive(Error, Debug)]
pub enum SourceError {
    /// Fatal for the current run
    #[error("location permission denied: {0}")]
    PermissionDenied(String),

    #[error("location source unavailable: {0}")]
    Unavailable(String),
}

impl SourceError {
    pub fn is_permission_denied(&self) -> bool {
        matches!(self, SourceError::PermissionDenied(_))
    }
}
