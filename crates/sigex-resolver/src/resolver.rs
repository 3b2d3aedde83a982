//! The conflict resolution algorithm.

use serde::{Deserialize, Serialize};

use sigex_core::{Direction, Qty, Signal, Symbol, TrackedOrder, TrackedOrderId};

/// Resolver configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolverConfig {
    /// Maximum same-direction active orders per (symbol, priority tier).
    /// 1 disables pyramiding.
    pub max_pyramiding: usize,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self { max_pyramiding: 3 }
    }
}

/// A side-effect the coordinator must execute, and confirm, before the
/// admitted signal's entry order may be submitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CleanupAction {
    /// Cancel a not-yet-filled order.
    CancelOrder { id: TrackedOrderId },
    /// Close a filled, still-open position.
    ClosePosition {
        id: TrackedOrderId,
        symbol: Symbol,
        direction: Direction,
        qty: Qty,
    },
}

impl CleanupAction {
    fn for_order(order: &TrackedOrder) -> Self {
        if order.is_open_position() {
            Self::ClosePosition {
                id: order.id.clone(),
                symbol: order.symbol.clone(),
                direction: order.direction,
                qty: order.fill_qty.unwrap_or(order.qty),
            }
        } else {
            Self::CancelOrder {
                id: order.id.clone(),
            }
        }
    }
}

/// Admission decision for one signal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    /// Whether the signal may proceed to submission.
    pub allow: bool,
    /// Actions that must complete (or be confirmed already-absent)
    /// strictly before submission. Empty when blocked.
    pub cleanup: Vec<CleanupAction>,
    /// Human-readable reason, for logs and the caller's response.
    pub reason: String,
}

impl Decision {
    fn allowed(cleanup: Vec<CleanupAction>, reason: impl Into<String>) -> Self {
        Self {
            allow: true,
            cleanup,
            reason: reason.into(),
        }
    }

    fn blocked(reason: impl Into<String>) -> Self {
        Self {
            allow: false,
            cleanup: Vec::new(),
            reason: reason.into(),
        }
    }
}

/// Decide whether `signal` may act given the active orders for its symbol.
///
/// Pure with respect to I/O. The caller guarantees `active` contains only
/// non-terminal orders for `signal.symbol`, observed under the per-symbol
/// serialization that makes the counts sound.
#[must_use]
pub fn resolve(signal: &Signal, active: &[TrackedOrder], config: &ResolverConfig) -> Decision {
    // Any higher-precedence active order blocks outright.
    if let Some(winner) = active
        .iter()
        .find(|o| o.priority.outranks(signal.priority))
    {
        return Decision::blocked(format!(
            "blocked by higher priority order {} (tier {})",
            winner.id, winner.priority
        ));
    }

    let mut cleanup = Vec::new();
    let mut same_tier_same_direction = 0usize;

    for order in active {
        if signal.priority.outranks(order.priority) {
            // A higher-priority instruction always preempts a lower one.
            cleanup.push(CleanupAction::for_order(order));
            continue;
        }

        // Same tier from here on.
        if order.direction == signal.direction {
            same_tier_same_direction += 1;
        } else if signal.priority.is_top() {
            // Only the top tier may reverse an opposing order.
            cleanup.push(CleanupAction::for_order(order));
        } else {
            return Decision::blocked(format!(
                "reversal blocked for priority tier {} (opposing order {})",
                signal.priority, order.id
            ));
        }
    }

    if same_tier_same_direction + 1 > config.max_pyramiding {
        return Decision::blocked(format!(
            "pyramiding limit reached ({} active at tier {})",
            same_tier_same_direction, signal.priority
        ));
    }

    if cleanup.is_empty() {
        Decision::allowed(cleanup, "no conflicts")
    } else {
        let n = cleanup.len();
        Decision::allowed(cleanup, format!("preempting {n} lower-precedence order(s)"))
    }
}
