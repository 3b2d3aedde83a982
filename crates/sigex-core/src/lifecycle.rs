//! Order lifecycle types.
//!
//! `TrackedOrder` is the mutable unit of lifecycle state, owned exclusively
//! by the coordinator's store. `LifecycleState` encodes the state machine:
//!
//! ```text
//! Created -> PendingEntry -> EntryFilled -> PositionOpen -> {ClosedTp, ClosedSl, ClosedManual}
//! PendingEntry -> {Cancelled, CancelledStale, Rejected}
//! EntryFilled -> Error
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::signal::{Direction, Priority, SessionTag, Signal, StrategyId, Symbol};
use crate::{Price, Qty};

// ============================================================================
// Identifiers
// ============================================================================

/// Deterministic tracked-order identifier.
///
/// Derived from the signal's identity fields, so re-delivery of an
/// identical signal produces the same id and is detectable as a duplicate.
///
/// Format: `sig_{priority}_{arrival_ms}_{symbol}_{strategy}`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TrackedOrderId(String);

impl TrackedOrderId {
    /// Derive the id from a signal's identity fields.
    #[must_use]
    pub fn from_signal(signal: &Signal) -> Self {
        Self(format!(
            "sig_{}_{}_{}_{}",
            signal.priority, signal.arrival_ms, signal.symbol, signal.strategy
        ))
    }

    /// Create from an existing string (for parsing requests).
    pub fn from_string(s: String) -> Self {
        Self(s)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TrackedOrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for TrackedOrderId {
    fn from(s: String) -> Self {
        Self::from_string(s)
    }
}

impl AsRef<str> for TrackedOrderId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Exchange-assigned order id for a single leg.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExchangeOrderId(String);

impl ExchangeOrderId {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ExchangeOrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// LifecycleState
// ============================================================================

/// State of a tracked order in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LifecycleState {
    /// Admitted by the resolver, quantity computed, not yet submitted.
    #[default]
    Created,
    /// Entry order submitted; awaiting fill or cancellation.
    PendingEntry,
    /// Entry leg confirmed filled; protective legs being attached.
    EntryFilled,
    /// Both protective legs active; legs polled for completion.
    PositionOpen,
    /// Target leg filled, position flat.
    ClosedTp,
    /// Stop leg filled, position flat.
    ClosedSl,
    /// Closed by operator request.
    ClosedManual,
    /// Entry cancelled before fill.
    Cancelled,
    /// Entry actively cancelled because its thesis was invalidated
    /// (price past target/stop, excessive entry deviation, or the order
    /// vanished from exchange history).
    CancelledStale,
    /// Terminal exchange rejection.
    Rejected,
    /// Entry filled but protective-leg attachment failed; requires
    /// operator intervention.
    Error,
}

impl LifecycleState {
    /// Returns true if the state is terminal. No transition leaves a
    /// terminal state; a subsequent signal must create a new order.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::ClosedTp
                | Self::ClosedSl
                | Self::ClosedManual
                | Self::Cancelled
                | Self::CancelledStale
                | Self::Rejected
                | Self::Error
        )
    }

    /// Returns true if the order still occupies a conflict slot
    /// (counts toward precedence and pyramiding checks).
    #[must_use]
    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }

    /// Returns true if the order represents a filled, still-open position.
    #[must_use]
    pub fn is_open_position(&self) -> bool {
        matches!(self, Self::EntryFilled | Self::PositionOpen)
    }

    /// Whether the machine defines a transition from `self` to `to`.
    #[must_use]
    pub fn can_transition_to(&self, to: LifecycleState) -> bool {
        use LifecycleState::*;
        matches!(
            (*self, to),
            (Created, PendingEntry)
                | (Created, Rejected)
                | (Created, Cancelled)
                | (PendingEntry, EntryFilled)
                | (PendingEntry, Cancelled)
                | (PendingEntry, CancelledStale)
                | (PendingEntry, Rejected)
                | (EntryFilled, PositionOpen)
                | (EntryFilled, Error)
                | (PositionOpen, ClosedTp)
                | (PositionOpen, ClosedSl)
                | (PositionOpen, ClosedManual)
                | (EntryFilled, ClosedManual)
        )
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Created => "CREATED",
            Self::PendingEntry => "PENDING_ENTRY",
            Self::EntryFilled => "ENTRY_FILLED",
            Self::PositionOpen => "POSITION_OPEN",
            Self::ClosedTp => "CLOSED_TP",
            Self::ClosedSl => "CLOSED_SL",
            Self::ClosedManual => "CLOSED_MANUAL",
            Self::Cancelled => "CANCELLED",
            Self::CancelledStale => "CANCELLED_STALE",
            Self::Rejected => "REJECTED",
            Self::Error => "ERROR",
        };
        write!(f, "{s}")
    }
}

// ============================================================================
// TrackedOrder
// ============================================================================

/// A tracked order from admission through its terminal state.
///
/// All mutation goes through the coordinator's store, which is the single
/// writer per order id. Readers receive cloned snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedOrder {
    /// Deterministic identifier.
    pub id: TrackedOrderId,
    /// Normalized symbol.
    pub symbol: Symbol,
    /// Trade direction.
    pub direction: Direction,
    /// Precedence tier. Immutable after creation.
    pub priority: Priority,
    /// Originating strategy.
    pub strategy: StrategyId,
    /// Limit entry price.
    pub entry: Price,
    /// Stop-loss price.
    pub stop: Price,
    /// Take-profit target, also used as the hypothetical target for
    /// pre-fill staleness checks.
    pub target: Price,
    /// Order quantity.
    pub qty: Qty,
    /// Session window tag, if session-scoped.
    pub session: Option<SessionTag>,
    /// Current lifecycle state.
    pub state: LifecycleState,
    /// Exchange id of the entry leg, once submitted.
    pub entry_order_id: Option<ExchangeOrderId>,
    /// Exchange id of the stop leg, once attached.
    pub stop_order_id: Option<ExchangeOrderId>,
    /// Exchange id of the target leg, once attached.
    pub target_order_id: Option<ExchangeOrderId>,
    /// Fill price once the entry fills.
    pub fill_price: Option<Price>,
    /// Fill quantity once the entry fills.
    pub fill_qty: Option<Qty>,
    /// New stop price once the stop has been moved to break-even.
    /// Doubles as the at-most-once marker for the adjustment.
    #[serde(default)]
    pub break_even_stop: Option<Price>,
    /// Last error text, for surfacing through the state export.
    pub last_error: Option<String>,
    /// Creation timestamp (Unix milliseconds).
    pub created_ms: u64,
    /// Last update timestamp (Unix milliseconds).
    pub updated_ms: u64,
}

impl TrackedOrder {
    /// Create a tracked order from an admitted signal and computed quantity.
    ///
    /// Starts in `Created` state with no exchange ids.
    #[must_use]
    pub fn from_signal(signal: &Signal, qty: Qty, now_ms: u64) -> Self {
        Self {
            id: TrackedOrderId::from_signal(signal),
            symbol: signal.symbol.clone(),
            direction: signal.direction,
            priority: signal.priority,
            strategy: signal.strategy.clone(),
            entry: signal.entry,
            stop: signal.stop,
            target: signal.target,
            qty,
            session: signal.session.clone(),
            state: LifecycleState::Created,
            entry_order_id: None,
            stop_order_id: None,
            target_order_id: None,
            fill_price: None,
            fill_qty: None,
            break_even_stop: None,
            last_error: None,
            created_ms: now_ms,
            updated_ms: now_ms,
        }
    }

    /// True if the order still occupies a conflict slot.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.state.is_active()
    }

    /// True if the order is a filled, still-open position.
    #[must_use]
    pub fn is_open_position(&self) -> bool {
        self.state.is_open_position()
    }
}

// ============================================================================
// Position (derived view)
// ============================================================================

/// Derived view of an open position: filled, still-open tracked orders
/// aggregated by symbol and direction. Not a separate store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Position {
    pub symbol: Symbol,
    pub direction: Direction,
    /// Total open quantity across contributing orders.
    pub qty: Qty,
    /// Ids of the contributing tracked orders.
    pub order_ids: Vec<TrackedOrderId>,
}

impl Position {
    /// Aggregate open positions from a snapshot of tracked orders.
    #[must_use]
    pub fn aggregate(orders: &[TrackedOrder]) -> Vec<Position> {
        let mut out: Vec<Position> = Vec::new();
        for order in orders.iter().filter(|o| o.is_open_position()) {
            let qty = order.fill_qty.unwrap_or(order.qty);
            match out
                .iter_mut()
                .find(|p| p.symbol == order.symbol && p.direction == order.direction)
            {
                Some(pos) => {
                    pos.qty = pos.qty + qty;
                    pos.order_ids.push(order.id.clone());
                }
                None => out.push(Position {
                    symbol: order.symbol.clone(),
                    direction: order.direction,
                    qty,
                    order_ids: vec![order.id.clone()],
                }),
            }
        }
        out
    }
}
