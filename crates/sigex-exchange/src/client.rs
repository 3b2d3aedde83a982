//! The `ExchangeClient` trait and its status/response types.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use sigex_core::{Direction, ExchangeOrderId, Price, Qty, Symbol, TrackedOrder};

use crate::error::ExchangeResult;

/// Exchange-reported status of a single order leg.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OrderStatusKind {
    /// Resting on the book, unfilled.
    Open,
    /// Completely filled.
    Filled,
    /// Cancelled (by us or by the exchange).
    Cancelled,
    /// Rejected at submission.
    Rejected,
    /// Not present in exchange order history. History retention is
    /// bounded, so for an old order this is equivalent to "already gone".
    NotFound,
}

/// Status report for one order leg.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderStatusReport {
    pub kind: OrderStatusKind,
    /// Cumulative filled quantity, when the exchange reports one.
    pub filled_qty: Option<Qty>,
    /// Average fill price, when the exchange reports one.
    pub avg_price: Option<Price>,
}

impl OrderStatusReport {
    #[must_use]
    pub fn open() -> Self {
        Self {
            kind: OrderStatusKind::Open,
            filled_qty: None,
            avg_price: None,
        }
    }

    #[must_use]
    pub fn filled(qty: Qty, price: Price) -> Self {
        Self {
            kind: OrderStatusKind::Filled,
            filled_qty: Some(qty),
            avg_price: Some(price),
        }
    }

    #[must_use]
    pub fn cancelled() -> Self {
        Self {
            kind: OrderStatusKind::Cancelled,
            filled_qty: None,
            avg_price: None,
        }
    }

    #[must_use]
    pub fn rejected() -> Self {
        Self {
            kind: OrderStatusKind::Rejected,
            filled_qty: None,
            avg_price: None,
        }
    }

    #[must_use]
    pub fn not_found() -> Self {
        Self {
            kind: OrderStatusKind::NotFound,
            filled_qty: None,
            avg_price: None,
        }
    }
}

/// Exchange ids of the two protective legs attached after an entry fill.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtectiveLegIds {
    pub stop_order_id: ExchangeOrderId,
    pub target_order_id: ExchangeOrderId,
}

/// Contract between the coordinator and the exchange boundary.
///
/// Every call carries a bounded timeout inside the implementation and
/// surfaces it as [`crate::ExchangeError::Timeout`]. All order actions are
/// idempotent: repeating an action against an already-terminal order must
/// succeed, not error. In particular `cancel_order` maps "already
/// cancelled" and "not found" responses to `Ok(())`.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait ExchangeClient: Send + Sync {
    /// Current market price for a symbol.
    async fn get_current_price(&self, symbol: &Symbol) -> ExchangeResult<Price>;

    /// Status of a single order leg.
    async fn get_order_status(&self, id: &ExchangeOrderId) -> ExchangeResult<OrderStatusReport>;

    /// Submit the entry leg. Returns the exchange order id.
    async fn submit_entry(&self, order: &TrackedOrder) -> ExchangeResult<ExchangeOrderId>;

    /// Attach stop and target legs for a filled entry. Both legs or
    /// neither: an implementation must not report success with only one
    /// leg resting.
    async fn attach_protective_legs(
        &self,
        order: &TrackedOrder,
        stop: Price,
        target: Price,
    ) -> ExchangeResult<ProtectiveLegIds>;

    /// Cancel an order leg. Idempotent.
    async fn cancel_order(&self, id: &ExchangeOrderId) -> ExchangeResult<()>;

    /// Move a resting stop leg to a new trigger price, in place. A leg
    /// that is no longer resting amends successfully as a no-op.
    async fn amend_stop(&self, id: &ExchangeOrderId, stop: Price) -> ExchangeResult<()>;

    /// Close an open position with a market order. Idempotent for an
    /// already-flat position.
    async fn close_position(
        &self,
        symbol: &Symbol,
        direction: Direction,
        qty: Qty,
    ) -> ExchangeResult<()>;
}
