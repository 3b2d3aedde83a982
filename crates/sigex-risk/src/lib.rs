//! Risk-based position sizing.
//!
//! Pure function from (entry, stop, risk budget, instrument constraints)
//! to an order quantity. Stateless; included as an input contract to
//! signal admission.

pub mod sizing;

pub use sizing::{InstrumentConstraints, RiskMode, SizingConfig, SizingError, compute_qty};
