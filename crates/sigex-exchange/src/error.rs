//! Exchange error taxonomy.
//!
//! The split matters to the coordinator: `Rejected` is terminal for the
//! order, `Transient` is swallowed and retried on the next poll tick, and
//! `Timeout` is an unknown outcome resolved by re-querying status.

use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum ExchangeError {
    /// Terminal rejection (invalid parameters, insufficient margin).
    /// Never retried.
    #[error("Exchange rejected: {0}")]
    Rejected(String),

    /// Network failure, rate limit, or 5xx. Retried on the next poll tick.
    #[error("Transient exchange error: {0}")]
    Transient(String),

    /// The call exceeded its bounded timeout. The outcome is unknown; the
    /// caller must re-query status rather than assume success or failure.
    #[error("Exchange call timed out after {0} ms")]
    Timeout(u64),
}

impl ExchangeError {
    /// True if the order that triggered this error is terminally dead.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Rejected(_))
    }

    /// True if the error should be resolved by waiting for the next poll.
    #[must_use]
    pub fn is_retriable(&self) -> bool {
        matches!(self, Self::Transient(_) | Self::Timeout(_))
    }
}

pub type ExchangeResult<T> = Result<T, ExchangeError>;
