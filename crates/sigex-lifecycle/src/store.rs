//! Single-writer order store actor.
//!
//! All mutation of `TrackedOrder` records flows through `OrderStoreTask`,
//! which processes messages sequentially in its own tokio task: it is the
//! single writer per order id. A shared `DashMap` mirror is updated by the
//! actor after each successful mutation, so readers (resolver snapshots,
//! the state export, the pollers) always see complete records without an
//! async round-trip.
//!
//! Transitions are validated against the lifecycle state machine inside
//! the actor; an undefined transition leaves the record untouched and is
//! reported back as a state inconsistency.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use sigex_core::{
    ExchangeOrderId, LifecycleState, Price, Qty, Symbol, TrackedOrder, TrackedOrderId,
};

use crate::error::{LifecycleError, LifecycleResult};

// ============================================================================
// TransitionCtx
// ============================================================================

/// Optional fields applied atomically with a state transition.
#[derive(Debug, Clone, Default)]
pub struct TransitionCtx {
    pub entry_order_id: Option<ExchangeOrderId>,
    pub stop_order_id: Option<ExchangeOrderId>,
    pub target_order_id: Option<ExchangeOrderId>,
    pub fill_price: Option<Price>,
    pub fill_qty: Option<Qty>,
    pub last_error: Option<String>,
}

impl TransitionCtx {
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_entry_id(id: ExchangeOrderId) -> Self {
        Self {
            entry_order_id: Some(id),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_fill(price: Price, qty: Qty) -> Self {
        Self {
            fill_price: Some(price),
            fill_qty: Some(qty),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_legs(stop: ExchangeOrderId, target: ExchangeOrderId) -> Self {
        Self {
            stop_order_id: Some(stop),
            target_order_id: Some(target),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_note(note: impl Into<String>) -> Self {
        Self {
            last_error: Some(note.into()),
            ..Self::default()
        }
    }
}

// ============================================================================
// Messages
// ============================================================================

/// Messages for the order store actor.
#[derive(Debug)]
pub enum OrderStoreMsg {
    /// Register a newly admitted order. Fails on id collision
    /// (signal re-delivery).
    Register {
        order: TrackedOrder,
        reply: oneshot::Sender<LifecycleResult<()>>,
    },

    /// Apply a validated state transition. Replies with the updated
    /// record on success.
    Transition {
        id: TrackedOrderId,
        to: LifecycleState,
        ctx: TransitionCtx,
        reply: oneshot::Sender<LifecycleResult<TrackedOrder>>,
    },

    /// Record a break-even stop adjustment on an open position. Not a
    /// state transition; the order stays `PositionOpen`.
    MarkBreakEven {
        id: TrackedOrderId,
        stop: Price,
        reply: oneshot::Sender<LifecycleResult<TrackedOrder>>,
    },

    /// Graceful shutdown.
    Shutdown,
}

// ============================================================================
// OrderStoreTask
// ============================================================================

/// Order store actor task.
///
/// Maintains the authoritative `HashMap` and mirrors every change into
/// the shared `DashMap` read cache.
pub struct OrderStoreTask {
    rx: mpsc::Receiver<OrderStoreMsg>,

    /// Authoritative state: id -> order.
    orders: HashMap<TrackedOrderId, TrackedOrder>,

    /// Read mirror shared with handles.
    mirror: Arc<DashMap<TrackedOrderId, TrackedOrder>>,
}

impl OrderStoreTask {
    /// Run the actor until `Shutdown` or channel close.
    pub async fn run(mut self) {
        debug!("OrderStoreTask started");

        while let Some(msg) = self.rx.recv().await {
            match msg {
                OrderStoreMsg::Shutdown => {
                    debug!("OrderStoreTask shutting down");
                    break;
                }
                OrderStoreMsg::Register { order, reply } => {
                    let _ = reply.send(self.on_register(order));
                }
                OrderStoreMsg::Transition {
                    id,
                    to,
                    ctx,
                    reply,
                } => {
                    let _ = reply.send(self.on_transition(&id, to, ctx));
                }
                OrderStoreMsg::MarkBreakEven { id, stop, reply } => {
                    let _ = reply.send(self.on_mark_break_even(&id, stop));
                }
            }
        }

        debug!("OrderStoreTask terminated");
    }

    fn on_register(&mut self, order: TrackedOrder) -> LifecycleResult<()> {
        if self.orders.contains_key(&order.id) {
            return Err(LifecycleError::DuplicateSignal(order.id));
        }

        trace!(id = %order.id, symbol = %order.symbol, "Registering order");
        self.mirror.insert(order.id.clone(), order.clone());
        self.orders.insert(order.id.clone(), order);
        Ok(())
    }

    fn on_transition(
        &mut self,
        id: &TrackedOrderId,
        to: LifecycleState,
        ctx: TransitionCtx,
    ) -> LifecycleResult<TrackedOrder> {
        let order = self
            .orders
            .get_mut(id)
            .ok_or_else(|| LifecycleError::UnknownOrder(id.clone()))?;

        if !order.state.can_transition_to(to) {
            warn!(
                id = %id,
                from = %order.state,
                to = %to,
                "Undefined state transition rejected"
            );
            return Err(LifecycleError::StateInconsistency(format!(
                "order {id}: {} -> {to} is not defined",
                order.state
            )));
        }

        let from = order.state;
        order.state = to;
        order.updated_ms = chrono::Utc::now().timestamp_millis() as u64;
        if let Some(v) = ctx.entry_order_id {
            order.entry_order_id = Some(v);
        }
        if let Some(v) = ctx.stop_order_id {
            order.stop_order_id = Some(v);
        }
        if let Some(v) = ctx.target_order_id {
            order.target_order_id = Some(v);
        }
        if let Some(v) = ctx.fill_price {
            order.fill_price = Some(v);
        }
        if let Some(v) = ctx.fill_qty {
            order.fill_qty = Some(v);
        }
        if let Some(v) = ctx.last_error {
            order.last_error = Some(v);
        }

        debug!(id = %id, %from, %to, "Order transitioned");
        self.mirror.insert(id.clone(), order.clone());
        Ok(order.clone())
    }

    fn on_mark_break_even(
        &mut self,
        id: &TrackedOrderId,
        stop: Price,
    ) -> LifecycleResult<TrackedOrder> {
        let order = self
            .orders
            .get_mut(id)
            .ok_or_else(|| LifecycleError::UnknownOrder(id.clone()))?;

        if order.state != LifecycleState::PositionOpen {
            return Err(LifecycleError::StateInconsistency(format!(
                "order {id}: break-even adjustment on {}, not POSITION_OPEN",
                order.state
            )));
        }

        order.break_even_stop = Some(stop);
        order.updated_ms = chrono::Utc::now().timestamp_millis() as u64;
        debug!(id = %id, %stop, "Break-even stop recorded");
        self.mirror.insert(id.clone(), order.clone());
        Ok(order.clone())
    }
}

// ============================================================================
// OrderStoreHandle
// ============================================================================

/// Cloneable handle to the order store.
///
/// Writes go through the actor; reads hit the mirror synchronously.
#[derive(Clone)]
pub struct OrderStoreHandle {
    tx: mpsc::Sender<OrderStoreMsg>,
    mirror: Arc<DashMap<TrackedOrderId, TrackedOrder>>,
}

impl OrderStoreHandle {
    /// Register a newly admitted order.
    pub async fn register(&self, order: TrackedOrder) -> LifecycleResult<()> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(OrderStoreMsg::Register { order, reply })
            .await
            .map_err(|_| LifecycleError::StoreClosed)?;
        rx.await.map_err(|_| LifecycleError::StoreClosed)?
    }

    /// Apply a state transition. Returns the updated record.
    pub async fn transition(
        &self,
        id: &TrackedOrderId,
        to: LifecycleState,
        ctx: TransitionCtx,
    ) -> LifecycleResult<TrackedOrder> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(OrderStoreMsg::Transition {
                id: id.clone(),
                to,
                ctx,
                reply,
            })
            .await
            .map_err(|_| LifecycleError::StoreClosed)?;
        rx.await.map_err(|_| LifecycleError::StoreClosed)?
    }

    /// Record a break-even stop adjustment. Returns the updated record.
    pub async fn mark_break_even(
        &self,
        id: &TrackedOrderId,
        stop: Price,
    ) -> LifecycleResult<TrackedOrder> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(OrderStoreMsg::MarkBreakEven {
                id: id.clone(),
                stop,
                reply,
            })
            .await
            .map_err(|_| LifecycleError::StoreClosed)?;
        rx.await.map_err(|_| LifecycleError::StoreClosed)?
    }

    /// Request actor shutdown.
    pub async fn shutdown(&self) {
        let _ = self.tx.send(OrderStoreMsg::Shutdown).await;
    }

    /// Snapshot of a single order.
    #[must_use]
    pub fn get(&self, id: &TrackedOrderId) -> Option<TrackedOrder> {
        self.mirror.get(id).map(|e| e.value().clone())
    }

    /// Snapshot of every tracked order (the state export).
    #[must_use]
    pub fn snapshot(&self) -> Vec<TrackedOrder> {
        self.mirror.iter().map(|e| e.value().clone()).collect()
    }

    /// Active (non-terminal) orders for one symbol, the resolver's input.
    #[must_use]
    pub fn active_for_symbol(&self, symbol: &Symbol) -> Vec<TrackedOrder> {
        self.mirror
            .iter()
            .filter(|e| e.value().symbol == *symbol && e.value().is_active())
            .map(|e| e.value().clone())
            .collect()
    }

    /// Orders currently in the given state.
    #[must_use]
    pub fn in_state(&self, state: LifecycleState) -> Vec<TrackedOrder> {
        self.mirror
            .iter()
            .filter(|e| e.value().state == state)
            .map(|e| e.value().clone())
            .collect()
    }
}

/// Spawn the order store actor.
///
/// Returns the handle and the actor's join handle.
#[must_use]
pub fn spawn_order_store(capacity: usize) -> (OrderStoreHandle, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(capacity);
    let mirror = Arc::new(DashMap::new());

    let task = OrderStoreTask {
        rx,
        orders: HashMap::new(),
        mirror: Arc::clone(&mirror),
    };

    let handle = OrderStoreHandle { tx, mirror };
    let join = tokio::spawn(task.run());
    (handle, join)
}
