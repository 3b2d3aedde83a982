//! Break-even stop adjustment.
//!
//! Once an open position has covered a configured share of the distance
//! from its fill price to its target, the stop is moved to the entry
//! price so the trade can no longer close at a loss. The check itself is
//! a pure function of a position snapshot and the current price; the
//! poller applies the result at most once per position.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use sigex_core::{Direction, Price, TrackedOrder};

/// Break-even adjustment configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreakEvenConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Share of the fill-to-target distance that must be covered before
    /// the stop moves, in percent.
    #[serde(default = "default_trigger_pct")]
    pub trigger_pct: Decimal,
    /// Offset applied to the new stop: below entry for longs, above
    /// entry for shorts.
    #[serde(default)]
    pub offset: Decimal,
    /// Minimum position age before an adjustment, in milliseconds,
    /// measured from when the position opened.
    #[serde(default = "default_min_position_age_ms")]
    pub min_position_age_ms: u64,
}

fn default_enabled() -> bool {
    true
}

fn default_trigger_pct() -> Decimal {
    Decimal::from(50)
}

fn default_min_position_age_ms() -> u64 {
    60_000
}

impl Default for BreakEvenConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            trigger_pct: default_trigger_pct(),
            offset: Decimal::ZERO,
            min_position_age_ms: default_min_position_age_ms(),
        }
    }
}

/// The break-even stop for `order` at `price`, if the adjustment is due.
///
/// Returns `None` while the trigger threshold is unmet, while the
/// position is younger than the configured minimum age, or once the stop
/// has already been moved.
#[must_use]
pub fn break_even_stop(
    order: &TrackedOrder,
    price: Price,
    now_ms: u64,
    config: &BreakEvenConfig,
) -> Option<Price> {
    if !config.enabled || order.break_even_stop.is_some() {
        return None;
    }
    if now_ms.saturating_sub(order.updated_ms) < config.min_position_age_ms {
        return None;
    }

    let entry = order.fill_price.unwrap_or(order.entry);
    let (total, covered) = match order.direction {
        Direction::Long => (order.target.0 - entry.0, price.0 - entry.0),
        Direction::Short => (entry.0 - order.target.0, entry.0 - price.0),
    };
    if total <= Decimal::ZERO {
        return None;
    }

    let progress_pct = covered / total * Decimal::from(100);
    if progress_pct < config.trigger_pct {
        return None;
    }

    let stop = match order.direction {
        Direction::Long => entry.0 - config.offset.abs(),
        Direction::Short => entry.0 + config.offset.abs(),
    };
    Some(Price::new(stop))
}
