//! Exchange collaborator contract.
//!
//! The coordinator talks to the exchange exclusively through the
//! [`ExchangeClient`] trait: price snapshots, order status queries, and the
//! four order actions. All actions are idempotent from the caller's
//! perspective; an implementation must map "already cancelled" and
//! "order not found" cancel responses to success.
//!
//! Enable the `testing` feature to get a generated [`MockExchangeClient`]
//! for use in downstream tests.

pub mod client;
pub mod error;
pub mod paper;

pub use client::{ExchangeClient, OrderStatusKind, OrderStatusReport, ProtectiveLegIds};
pub use error::{ExchangeError, ExchangeResult};
pub use paper::PaperExchange;

#[cfg(any(test, feature = "testing"))]
pub use client::MockExchangeClient;
