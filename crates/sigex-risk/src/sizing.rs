//! Value-at-risk quantity computation.
//!
//! `qty = value_at_risk / |entry - stop|`, floored to the instrument lot
//! step, bumped to the minimum quantity, and checked against the minimum
//! notional.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use sigex_core::{Price, Qty};

/// How the per-trade risk budget is derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskMode {
    /// Risk a fixed account-currency amount per trade.
    FixedAmount,
    /// Risk a percentage of current account equity per trade.
    PortfolioPercentage,
}

/// Sizing configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SizingConfig {
    /// Risk budget mode.
    pub mode: RiskMode,
    /// Fixed risk amount (account currency). Used by `FixedAmount`.
    pub risk_amount: Decimal,
    /// Risk percentage of equity (0-100). Used by `PortfolioPercentage`.
    pub risk_pct: Decimal,
}

impl Default for SizingConfig {
    fn default() -> Self {
        Self {
            mode: RiskMode::FixedAmount,
            risk_amount: Decimal::from(100),
            risk_pct: Decimal::ONE,
        }
    }
}

impl SizingConfig {
    /// Resolve the value at risk for this trade given current equity.
    #[must_use]
    pub fn value_at_risk(&self, equity: Decimal) -> Decimal {
        match self.mode {
            RiskMode::FixedAmount => self.risk_amount,
            RiskMode::PortfolioPercentage => equity * self.risk_pct / Decimal::from(100),
        }
    }
}

/// Per-instrument rounding and minimum constraints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstrumentConstraints {
    /// Quantity step (lot size). Zero disables rounding.
    pub lot_step: Qty,
    /// Minimum order quantity.
    pub min_qty: Qty,
    /// Minimum order notional (qty * entry).
    pub min_notional: Decimal,
}

impl Default for InstrumentConstraints {
    fn default() -> Self {
        Self {
            lot_step: Qty::ZERO,
            min_qty: Qty::ZERO,
            min_notional: Decimal::ZERO,
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SizingError {
    #[error("Stop distance is zero: entry equals stop")]
    ZeroStopDistance,

    #[error("Computed quantity {qty} below minimum notional {min_notional}")]
    BelowMinNotional { qty: String, min_notional: String },
}

/// Compute the order quantity for a trade.
///
/// The budget is the amount lost if the stop is hit at exactly the stop
/// price; dividing by the stop distance yields the quantity. The result is
/// floored to the lot step first, then bumped to the minimum quantity if
/// the floor undershot it.
pub fn compute_qty(
    entry: Price,
    stop: Price,
    equity: Decimal,
    config: &SizingConfig,
    constraints: &InstrumentConstraints,
) -> Result<Qty, SizingError> {
    let distance = entry.distance(stop);
    if distance.is_zero() {
        return Err(SizingError::ZeroStopDistance);
    }

    let var = config.value_at_risk(equity);
    let raw = Qty::new(var / distance);

    let mut qty = raw.round_to_lot(constraints.lot_step);
    if qty < constraints.min_qty {
        qty = constraints.min_qty;
    }

    if qty.notional(entry) < constraints.min_notional {
        return Err(SizingError::BelowMinNotional {
            qty: qty.to_string(),
            min_notional: constraints.min_notional.to_string(),
        });
    }

    Ok(qty)
}
