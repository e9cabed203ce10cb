use thiserror::Error;

use crate::RejectionReason;

#[derive(Debug, Error)]
pub enum Error {
    /// Market data or historical candles could not be retrieved.
    #[error("Market data unavailable: {0}")]
    DataUnavailable(String),

    /// Warm-up condition: not enough observations to compute statistics.
    #[error("Insufficient samples: need {needed}, have {have}")]
    InsufficientSamples { needed: usize, have: usize },

    /// Two series that must be length- and time-aligned are not.
    #[error("Misaligned series: {0}")]
    MisalignedSeries(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Account query failed: {0}")]
    AccountQueryFailed(String),

    #[error("Order rejected: {reason}")]
    OrderRejected { reason: RejectionReason },

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Errors that abandon a decision cycle without a plan being emitted.
    pub fn abandons_cycle(&self) -> bool {
        matches!(
            self,
            Error::DataUnavailable(_) | Error::MisalignedSeries(_) | Error::Http(_) | Error::Json(_)
        )
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
