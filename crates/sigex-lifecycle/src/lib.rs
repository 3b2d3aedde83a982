//! Order lifecycle coordination.
//!
//! This crate owns every tracked order from admission to terminal state:
//! - `store`: the single-writer order store actor with snapshot reads
//! - `coordinator`: signal admission, cleanup execution, manual overrides
//! - `staleness`: pre-fill thesis-invalidation checks
//! - `break_even`: post-fill stop adjustment once a position is in profit
//! - `poller`: poll-driven reconciliation against exchange status

pub mod break_even;
pub mod coordinator;
pub mod error;
pub mod poller;
pub mod staleness;
pub mod store;

pub use break_even::BreakEvenConfig;
pub use coordinator::{Coordinator, CoordinatorConfig};
pub use error::{LifecycleError, LifecycleResult};
pub use poller::{Poller, PollerConfig};
pub use staleness::{StaleReason, StalenessConfig};
pub use store::{spawn_order_store, OrderStoreHandle, OrderStoreTask, TransitionCtx};
