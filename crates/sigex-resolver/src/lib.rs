//! Signal conflict resolution.
//!
//! Pure admission logic: given a new signal and a snapshot of active
//! tracked orders for the same symbol, decide whether the signal may act
//! and which cleanup actions must complete first. The resolver performs no
//! I/O; it returns a plan that the lifecycle coordinator executes.

pub mod resolver;

pub use resolver::{CleanupAction, Decision, ResolverConfig, resolve};
