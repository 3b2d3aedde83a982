//! Inbound signal types.
//!
//! A `Signal` is an immutable, validated instruction to open a position.
//! Dynamic payloads from the upstream webhook layer are re-expressed here
//! as typed values once, at the boundary; nothing downstream re-validates.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{CoreError, Result};
use crate::Price;

/// Trade direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    /// Returns the opposite direction.
    pub fn opposite(&self) -> Self {
        match self {
            Self::Long => Self::Short,
            Self::Short => Self::Long,
        }
    }

    /// Returns 1 for long, -1 for short (for position calculations).
    pub fn sign(&self) -> i8 {
        match self {
            Self::Long => 1,
            Self::Short => -1,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Long => write!(f, "long"),
            Self::Short => write!(f, "short"),
        }
    }
}

/// Ordered precedence tier. Lower numeric value wins conflicts.
///
/// A signal arriving without an explicit priority is assigned
/// `Priority::LOWEST`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Priority(pub u8);

impl Priority {
    /// Top precedence tier. Only this tier may reverse an opposing
    /// same-tier order, and only this tier is session-cancelled.
    pub const TOP: Self = Self(1);

    /// Default tier for signals that carry no explicit priority.
    pub const LOWEST: Self = Self(u8::MAX);

    #[must_use]
    pub fn new(value: u8) -> Self {
        Self(value)
    }

    /// True if this tier strictly outranks `other` (smaller value wins).
    #[must_use]
    pub fn outranks(&self, other: Priority) -> bool {
        self.0 < other.0
    }

    /// True if this is the top precedence tier.
    #[must_use]
    pub fn is_top(&self) -> bool {
        *self == Self::TOP
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Normalized instrument symbol.
///
/// Upstream sources append venue suffixes (e.g. `BTCUSDT.P` for
/// perpetuals); those are stripped at construction so every component
/// keys on the same form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Symbol(String);

impl Symbol {
    /// Normalize a raw symbol: trim, uppercase, strip a `.P` suffix.
    pub fn normalize(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(CoreError::InvalidSignal("empty symbol".to_string()));
        }
        let upper = trimmed.to_uppercase();
        let normalized = upper.strip_suffix(".P").unwrap_or(&upper);
        Ok(Self(normalized.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of the strategy that produced a signal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StrategyId(String);

impl StrategyId {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for StrategyId {
    fn default() -> Self {
        Self("default".to_string())
    }
}

impl fmt::Display for StrategyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Tag linking a signal to a configured session window.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionTag(String);

impl SessionTag {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An immutable, validated trade instruction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signal {
    /// Normalized instrument symbol.
    pub symbol: Symbol,
    /// Trade direction.
    pub direction: Direction,
    /// Limit entry price.
    pub entry: Price,
    /// Stop-loss price.
    pub stop: Price,
    /// Take-profit target price.
    pub target: Price,
    /// Precedence tier.
    pub priority: Priority,
    /// Originating strategy.
    pub strategy: StrategyId,
    /// Arrival timestamp (Unix milliseconds).
    pub arrival_ms: u64,
    /// Session window this signal is scoped to, if any.
    pub session: Option<SessionTag>,
}

impl Signal {
    /// Construct a validated signal.
    ///
    /// Structural checks happen here, once: prices must be positive and
    /// ordered consistently with the direction (long: stop < entry < target,
    /// short: target < entry < stop).
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        symbol: Symbol,
        direction: Direction,
        entry: Price,
        stop: Price,
        target: Price,
        priority: Option<Priority>,
        strategy: StrategyId,
        arrival_ms: u64,
        session: Option<SessionTag>,
    ) -> Result<Self> {
        for (name, px) in [("entry", entry), ("stop", stop), ("target", target)] {
            if !px.is_positive() {
                return Err(CoreError::InvalidPrice(format!(
                    "{name} must be positive, got {px}"
                )));
            }
        }

        let ordered = match direction {
            Direction::Long => stop < entry && entry < target,
            Direction::Short => target < entry && entry < stop,
        };
        if !ordered {
            return Err(CoreError::InvalidSignal(format!(
                "prices inconsistent with {direction}: stop={stop} entry={entry} target={target}"
            )));
        }

        Ok(Self {
            symbol,
            direction,
            entry,
            stop,
            target,
            priority: priority.unwrap_or(Priority::LOWEST),
            strategy,
            arrival_ms,
            session,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn px(d: rust_decimal::Decimal) -> Price {
        Price::new(d)
    }

    fn long_signal() -> Result<Signal> {
        Signal::new(
            Symbol::normalize("BTCUSDT")?,
            Direction::Long,
            px(dec!(110)),
            px(dec!(100)),
            px(dec!(130)),
            Some(Priority::new(1)),
            StrategyId::new("breakout"),
            1_700_000_000_000,
            None,
        )
    }

    #[test]
    fn test_direction_opposite() {
        assert_eq!(Direction::Long.opposite(), Direction::Short);
        assert_eq!(Direction::Short.opposite(), Direction::Long);
    }

    #[test]
    fn test_priority_outranks() {
        assert!(Priority::new(1).outranks(Priority::new(2)));
        assert!(!Priority::new(2).outranks(Priority::new(1)));
        assert!(!Priority::new(2).outranks(Priority::new(2)));
        assert!(Priority::TOP.outranks(Priority::LOWEST));
    }

    #[test]
    fn test_symbol_normalization() {
        assert_eq!(Symbol::normalize("btcusdt.p").unwrap().as_str(), "BTCUSDT");
        assert_eq!(Symbol::normalize(" ETHUSDT ").unwrap().as_str(), "ETHUSDT");
        assert!(Symbol::normalize("  ").is_err());
    }

    #[test]
    fn test_valid_long_signal() {
        let sig = long_signal().unwrap();
        assert_eq!(sig.priority, Priority::TOP);
        assert_eq!(sig.symbol.as_str(), "BTCUSDT");
    }

    #[test]
    fn test_missing_priority_defaults_to_lowest() {
        let sig = Signal::new(
            Symbol::normalize("BTCUSDT").unwrap(),
            Direction::Long,
            px(dec!(110)),
            px(dec!(100)),
            px(dec!(130)),
            None,
            StrategyId::default(),
            0,
            None,
        )
        .unwrap();
        assert_eq!(sig.priority, Priority::LOWEST);
    }

    #[test]
    fn test_long_prices_must_be_ordered() {
        // stop above entry is inconsistent for a long
        let err = Signal::new(
            Symbol::normalize("BTCUSDT").unwrap(),
            Direction::Long,
            px(dec!(110)),
            px(dec!(120)),
            px(dec!(130)),
            None,
            StrategyId::default(),
            0,
            None,
        );
        assert!(err.is_err());
    }

    #[test]
    fn test_short_prices_must_be_ordered() {
        let ok = Signal::new(
            Symbol::normalize("BTCUSDT").unwrap(),
            Direction::Short,
            px(dec!(110)),
            px(dec!(120)),
            px(dec!(100)),
            None,
            StrategyId::default(),
            0,
            None,
        );
        assert!(ok.is_ok());
    }

    #[test]
    fn test_nonpositive_price_rejected() {
        let err = Signal::new(
            Symbol::normalize("BTCUSDT").unwrap(),
            Direction::Long,
            px(dec!(110)),
            Price::ZERO,
            px(dec!(130)),
            None,
            StrategyId::default(),
            0,
            None,
        );
        assert!(err.is_err());
    }
}
