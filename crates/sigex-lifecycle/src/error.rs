//! Lifecycle error taxonomy.
//!
//! `ConflictBlocked` is a decision, not a failure; it is reported
//! synchronously to the signal's caller. `Exchange` errors split into
//! terminal and retriable per `ExchangeError`. `ProtectiveLegFailure` is
//! the most severe class: the order moves to `ERROR` and is surfaced
//! through the state export rather than left as an unprotected position.

use thiserror::Error;

use sigex_core::TrackedOrderId;
use sigex_exchange::ExchangeError;

#[derive(Debug, Error)]
pub enum LifecycleError {
    /// Signal failed structural checks at the boundary.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// The resolver denied admission.
    #[error("Conflict blocked: {0}")]
    ConflictBlocked(String),

    /// Re-delivery of an already-tracked signal.
    #[error("Duplicate signal: order {0} already tracked")]
    DuplicateSignal(TrackedOrderId),

    /// Exchange boundary failure (terminal or retriable, see inner).
    #[error(transparent)]
    Exchange(#[from] ExchangeError),

    /// A state combination the machine does not define. The exchange's
    /// authoritative status wins during reconciliation.
    #[error("State inconsistency: {0}")]
    StateInconsistency(String),

    /// Entry filled but stop/target attachment failed.
    #[error("Protective leg failure for {id}: {detail}")]
    ProtectiveLegFailure { id: TrackedOrderId, detail: String },

    /// Unknown tracked order id.
    #[error("Unknown order: {0}")]
    UnknownOrder(TrackedOrderId),

    /// The store actor has shut down.
    #[error("Order store closed")]
    StoreClosed,
}

impl From<sigex_core::CoreError> for LifecycleError {
    fn from(e: sigex_core::CoreError) -> Self {
        Self::Validation(e.to_string())
    }
}

impl From<sigex_risk::SizingError> for LifecycleError {
    fn from(e: sigex_risk::SizingError) -> Self {
        Self::Validation(e.to_string())
    }
}

pub type LifecycleResult<T> = Result<T, LifecycleError>;
