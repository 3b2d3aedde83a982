//! Pre-fill staleness checks.
//!
//! A pending entry whose thesis has been invalidated by price movement is
//! cancelled rather than left to fill into a dead trade. The checks are
//! pure functions over an order snapshot and the current price; the poller
//! applies them on every reconciliation pass.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use sigex_core::{Direction, Price, TrackedOrder};

/// Staleness thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StalenessConfig {
    /// Maximum tolerated deviation of the current price from the intended
    /// entry, in percent. Exceeding it cancels the pending entry.
    #[serde(default = "default_max_entry_deviation_pct")]
    pub max_entry_deviation_pct: Decimal,
}

fn default_max_entry_deviation_pct() -> Decimal {
    Decimal::from(5)
}

impl Default for StalenessConfig {
    fn default() -> Self {
        Self {
            max_entry_deviation_pct: default_max_entry_deviation_pct(),
        }
    }
}

/// Why a pending entry was judged stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StaleReason {
    /// Price already reached or passed the hypothetical target.
    TargetBreached,
    /// Price already reached or passed the stop.
    StopBreached,
    /// Price drifted too far from the intended entry.
    EntryDeviation,
}

impl fmt::Display for StaleReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::TargetBreached => "target breached before fill",
            Self::StopBreached => "stop breached before fill",
            Self::EntryDeviation => "price deviated from entry",
        };
        write!(f, "{s}")
    }
}

/// Judge whether a pending entry is stale at `price`.
///
/// Checks run in severity order: target breach, stop breach, then entry
/// deviation. Returns `None` while the thesis still holds.
#[must_use]
pub fn check(order: &TrackedOrder, price: Price, config: &StalenessConfig) -> Option<StaleReason> {
    let breached_target = match order.direction {
        Direction::Long => price >= order.target,
        Direction::Short => price <= order.target,
    };
    if breached_target {
        return Some(StaleReason::TargetBreached);
    }

    let breached_stop = match order.direction {
        Direction::Long => price <= order.stop,
        Direction::Short => price >= order.stop,
    };
    if breached_stop {
        return Some(StaleReason::StopBreached);
    }

    if let Some(dev) = price.deviation_pct(order.entry) {
        if dev > config.max_entry_deviation_pct {
            return Some(StaleReason::EntryDeviation);
        }
    }

    None
}
