//! Core domain types for the sigex order coordinator.
//!
//! This crate provides the fundamental types used throughout the system:
//! - `Price`, `Qty`: precision-safe numeric types
//! - `Signal`, `Direction`, `Priority`: validated inbound instructions
//! - `TrackedOrder`, `LifecycleState`: the lifecycle unit and its state machine
//! - `Position`: derived view over filled, still-open orders

pub mod decimal;
pub mod error;
pub mod lifecycle;
pub mod signal;

pub use decimal::{Price, Qty};
pub use error::{CoreError, Result};
pub use lifecycle::{ExchangeOrderId, LifecycleState, Position, TrackedOrder, TrackedOrderId};
pub use signal::{Direction, Priority, SessionTag, Signal, StrategyId, Symbol};
