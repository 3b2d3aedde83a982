//! Signal admission and cleanup execution.
//!
//! The coordinator serializes all work per symbol: resolution, cleanup,
//! and entry submission for one symbol happen under that symbol's lock,
//! so the resolver's view of active orders cannot race a concurrent
//! admission. Different symbols proceed in parallel.
//!
//! Ordering is strict: every cleanup action must complete (or the target
//! must be confirmed already terminal) before the admitted signal's entry
//! order is submitted. A cleanup failure aborts the admission with the
//! new order left in `Created`; nothing is submitted on top of an
//! unconfirmed cleanup.

use std::sync::Arc;

use dashmap::DashMap;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{info, warn};

use sigex_core::{LifecycleState, Signal, Symbol, TrackedOrder, TrackedOrderId};
use sigex_exchange::ExchangeClient;
use sigex_resolver::{resolve, CleanupAction, ResolverConfig};
use sigex_risk::{compute_qty, InstrumentConstraints, SizingConfig};
use sigex_telemetry::Metrics;

use crate::error::{LifecycleError, LifecycleResult};
use crate::store::{OrderStoreHandle, TransitionCtx};

// ============================================================================
// Config
// ============================================================================

/// Coordinator configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    /// Conflict resolution parameters.
    #[serde(default)]
    pub resolver: ResolverConfig,
    /// Quantity sizing parameters.
    #[serde(default)]
    pub sizing: SizingConfig,
    /// Instrument rounding and minimum constraints.
    #[serde(default)]
    pub constraints: InstrumentConstraints,
    /// Account equity used for percentage sizing.
    #[serde(default = "default_equity")]
    pub equity: Decimal,
}

fn default_equity() -> Decimal {
    Decimal::from(10_000)
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            resolver: ResolverConfig::default(),
            sizing: SizingConfig::default(),
            constraints: InstrumentConstraints::default(),
            equity: default_equity(),
        }
    }
}

// ============================================================================
// Coordinator
// ============================================================================

/// Admits signals, executes preemption cleanup, and owns every manual
/// override path.
pub struct Coordinator<E: ExchangeClient> {
    store: OrderStoreHandle,
    exchange: Arc<E>,
    config: CoordinatorConfig,
    symbol_locks: DashMap<Symbol, Arc<Mutex<()>>>,
}

impl<E: ExchangeClient> Coordinator<E> {
    pub fn new(store: OrderStoreHandle, exchange: Arc<E>, config: CoordinatorConfig) -> Self {
        Self {
            store,
            exchange,
            config,
            symbol_locks: DashMap::new(),
        }
    }

    pub fn store(&self) -> &OrderStoreHandle {
        &self.store
    }

    /// The lock serializing all state transitions for one symbol. Shared
    /// with the reconciliation poller so its per-order passes cannot
    /// interleave with an admission.
    pub(crate) fn symbol_lock(&self, symbol: &Symbol) -> Arc<Mutex<()>> {
        self.symbol_locks
            .entry(symbol.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    fn refresh_active_gauge(&self) {
        let active = self
            .store
            .snapshot()
            .iter()
            .filter(|o| o.is_active())
            .count();
        Metrics::active_orders(active as i64);
    }

    // ========================================================================
    // Admission
    // ========================================================================

    /// Admit a signal: resolve conflicts, size, register, clean up, submit.
    ///
    /// Returns the tracked order snapshot after submission. The order is
    /// left in `Created` when submission fails retriably; the poller
    /// resubmits it on its next pass.
    pub async fn admit(&self, signal: Signal) -> LifecycleResult<TrackedOrder> {
        let lock = self.symbol_lock(&signal.symbol);
        let _guard = lock.lock().await;

        let active = self.store.active_for_symbol(&signal.symbol);
        let decision = resolve(&signal, &active, &self.config.resolver);
        if !decision.allow {
            info!(
                symbol = %signal.symbol,
                priority = %signal.priority,
                reason = %decision.reason,
                "Signal blocked"
            );
            Metrics::signal(signal.symbol.as_str(), "blocked");
            return Err(LifecycleError::ConflictBlocked(decision.reason));
        }

        let qty = compute_qty(
            signal.entry,
            signal.stop,
            self.config.equity,
            &self.config.sizing,
            &self.config.constraints,
        )
        .map_err(|e| {
            Metrics::signal(signal.symbol.as_str(), "invalid");
            LifecycleError::from(e)
        })?;

        let now_ms = chrono::Utc::now().timestamp_millis() as u64;
        let order = TrackedOrder::from_signal(&signal, qty, now_ms);
        self.store.register(order.clone()).await.map_err(|e| {
            if matches!(e, LifecycleError::DuplicateSignal(_)) {
                warn!(id = %order.id, "Signal re-delivery detected");
                Metrics::signal(signal.symbol.as_str(), "duplicate");
            }
            e
        })?;

        info!(
            id = %order.id,
            symbol = %order.symbol,
            direction = %order.direction,
            priority = %order.priority,
            qty = %order.qty,
            reason = %decision.reason,
            "Signal admitted"
        );
        Metrics::signal(signal.symbol.as_str(), "admitted");

        // Cleanup strictly before submission. Failure leaves the new order
        // in Created and surfaces the exchange error to the caller.
        self.run_cleanup(&decision.cleanup, &order.id).await?;

        let submitted = self.try_submit(&order).await?;
        self.refresh_active_gauge();
        Ok(submitted)
    }

    /// Retry an order left in `Created` by an earlier admission attempt.
    ///
    /// Resolution and cleanup are re-run from scratch before anything is
    /// submitted: the admission that created this order may have aborted
    /// mid-cleanup, and the conflict picture may have changed since. An
    /// order whose tier no longer clears resolution is cancelled instead
    /// of submitted. Caller holds the symbol lock.
    pub(crate) async fn resubmit(&self, order: &TrackedOrder) -> LifecycleResult<()> {
        let active: Vec<TrackedOrder> = self
            .store
            .active_for_symbol(&order.symbol)
            .into_iter()
            .filter(|o| o.id != order.id)
            .collect();
        let signal = Signal::new(
            order.symbol.clone(),
            order.direction,
            order.entry,
            order.stop,
            order.target,
            Some(order.priority),
            order.strategy.clone(),
            order.created_ms,
            order.session.clone(),
        )?;

        let decision = resolve(&signal, &active, &self.config.resolver);
        if !decision.allow {
            warn!(id = %order.id, reason = %decision.reason, "Retried order no longer clears resolution");
            self.store
                .transition(
                    &order.id,
                    LifecycleState::Cancelled,
                    TransitionCtx::with_note(decision.reason),
                )
                .await?;
            Metrics::transition("CREATED", "CANCELLED");
            self.refresh_active_gauge();
            return Ok(());
        }

        self.run_cleanup(&decision.cleanup, &order.id).await?;
        self.try_submit(order).await?;
        self.refresh_active_gauge();
        Ok(())
    }

    /// Submit the entry leg for an order in `Created`.
    ///
    /// A terminal rejection moves the order to `Rejected`. A retriable
    /// failure leaves it in `Created` and returns the current snapshot;
    /// submission is idempotent at the exchange boundary, so the poller
    /// can safely try again.
    async fn try_submit(&self, order: &TrackedOrder) -> LifecycleResult<TrackedOrder> {
        match self.exchange.submit_entry(order).await {
            Ok(exchange_id) => {
                let updated = self
                    .store
                    .transition(
                        &order.id,
                        LifecycleState::PendingEntry,
                        TransitionCtx::with_entry_id(exchange_id),
                    )
                    .await?;
                Metrics::transition("CREATED", "PENDING_ENTRY");
                Ok(updated)
            }
            Err(e) if e.is_terminal() => {
                warn!(id = %order.id, error = %e, "Entry submission rejected");
                Metrics::exchange_error("submit_entry", "rejected");
                let updated = self
                    .store
                    .transition(
                        &order.id,
                        LifecycleState::Rejected,
                        TransitionCtx::with_note(e.to_string()),
                    )
                    .await?;
                Metrics::transition("CREATED", "REJECTED");
                Ok(updated)
            }
            Err(e) => {
                warn!(id = %order.id, error = %e, "Entry submission failed, will retry");
                Metrics::exchange_error("submit_entry", "transient");
                self.store
                    .get(&order.id)
                    .ok_or_else(|| LifecycleError::UnknownOrder(order.id.clone()))
            }
        }
    }

    // ========================================================================
    // Cleanup
    // ========================================================================

    async fn run_cleanup(
        &self,
        actions: &[CleanupAction],
        admitted: &TrackedOrderId,
    ) -> LifecycleResult<()> {
        for action in actions {
            match action {
                CleanupAction::CancelOrder { id } => {
                    self.cancel_tracked(id, &format!("preempted by {admitted}"))
                        .await?;
                    Metrics::cleanup_action("cancel_order");
                }
                CleanupAction::ClosePosition {
                    id,
                    symbol,
                    direction,
                    qty,
                } => {
                    self.exchange.close_position(symbol, *direction, *qty).await?;
                    self.cancel_protective_legs(id).await?;
                    let order = self
                        .store
                        .transition(
                            id,
                            LifecycleState::ClosedManual,
                            TransitionCtx::with_note(format!("preempted by {admitted}")),
                        )
                        .await?;
                    info!(id = %order.id, "Position closed by preemption");
                    Metrics::transition("POSITION_OPEN", "CLOSED_MANUAL");
                    Metrics::cleanup_action("close_position");
                }
            }
        }
        Ok(())
    }

    /// Cancel a not-yet-filled tracked order, moving it to `Cancelled`.
    ///
    /// Safe against races with fills and restarts: a target already in a
    /// terminal state counts as success, and the exchange cancel itself is
    /// idempotent.
    async fn cancel_tracked(&self, id: &TrackedOrderId, note: &str) -> LifecycleResult<()> {
        let order = self
            .store
            .get(id)
            .ok_or_else(|| LifecycleError::UnknownOrder(id.clone()))?;

        if order.state.is_terminal() {
            return Ok(());
        }

        if let Some(exchange_id) = &order.entry_order_id {
            self.exchange.cancel_order(exchange_id).await?;
        }
        let from = order.state;
        self.store
            .transition(id, LifecycleState::Cancelled, TransitionCtx::with_note(note))
            .await?;
        Metrics::transition(&from.to_string(), "CANCELLED");
        Ok(())
    }

    async fn cancel_protective_legs(&self, id: &TrackedOrderId) -> LifecycleResult<()> {
        let order = self
            .store
            .get(id)
            .ok_or_else(|| LifecycleError::UnknownOrder(id.clone()))?;
        for leg in [&order.stop_order_id, &order.target_order_id]
            .into_iter()
            .flatten()
        {
            self.exchange.cancel_order(leg).await?;
        }
        Ok(())
    }

    // ========================================================================
    // Shared cancellation paths (session monitor, staleness, overrides)
    // ========================================================================

    /// Cancel a pending entry into the given terminal cancel state.
    ///
    /// Used by the session monitor (`Cancelled`) and the staleness path
    /// (`CancelledStale`). Already-terminal targets count as success and
    /// return the current snapshot.
    pub async fn cancel_pending(
        &self,
        id: &TrackedOrderId,
        to: LifecycleState,
        note: &str,
    ) -> LifecycleResult<TrackedOrder> {
        let order = self
            .store
            .get(id)
            .ok_or_else(|| LifecycleError::UnknownOrder(id.clone()))?;
        let lock = self.symbol_lock(&order.symbol);
        let _guard = lock.lock().await;
        self.cancel_pending_locked(id, to, note).await
    }

    /// Body of [`Self::cancel_pending`] for callers already holding the
    /// symbol lock. Re-reads the record, since its state may have changed
    /// while the lock was awaited.
    pub(crate) async fn cancel_pending_locked(
        &self,
        id: &TrackedOrderId,
        to: LifecycleState,
        note: &str,
    ) -> LifecycleResult<TrackedOrder> {
        let order = self
            .store
            .get(id)
            .ok_or_else(|| LifecycleError::UnknownOrder(id.clone()))?;

        if order.state.is_terminal() {
            return Ok(order);
        }
        if order.is_open_position() {
            return Err(LifecycleError::StateInconsistency(format!(
                "order {id} is {}, not a pending entry",
                order.state
            )));
        }

        if let Some(exchange_id) = &order.entry_order_id {
            // Duplicate cancellation reports success at the boundary.
            self.exchange.cancel_order(exchange_id).await?;
        }
        let from = order.state;
        let updated = self
            .store
            .transition(id, to, TransitionCtx::with_note(note))
            .await?;
        Metrics::transition(&from.to_string(), &to.to_string());
        self.refresh_active_gauge();
        Ok(updated)
    }

    /// Manually close an open position and cancel its protective legs.
    pub async fn close_manual(&self, id: &TrackedOrderId) -> LifecycleResult<TrackedOrder> {
        let order = self
            .store
            .get(id)
            .ok_or_else(|| LifecycleError::UnknownOrder(id.clone()))?;

        let lock = self.symbol_lock(&order.symbol);
        let _guard = lock.lock().await;

        // Re-read: the state may have changed while the lock was awaited.
        let order = self
            .store
            .get(id)
            .ok_or_else(|| LifecycleError::UnknownOrder(id.clone()))?;
        if !order.is_open_position() {
            return Err(LifecycleError::StateInconsistency(format!(
                "order {id} is {}, not an open position",
                order.state
            )));
        }

        let qty = order.fill_qty.unwrap_or(order.qty);
        self.exchange
            .close_position(&order.symbol, order.direction, qty)
            .await?;
        self.cancel_protective_legs(id).await?;

        let from = order.state;
        let updated = self
            .store
            .transition(
                id,
                LifecycleState::ClosedManual,
                TransitionCtx::with_note("manual close"),
            )
            .await?;
        info!(id = %id, "Position closed manually");
        Metrics::transition(&from.to_string(), "CLOSED_MANUAL");
        self.refresh_active_gauge();
        Ok(updated)
    }

    /// Manual override: preempt every active order for `symbol` below its
    /// best (lowest-numbered) active tier. Returns the number of orders
    /// cleaned up.
    pub async fn cleanup_symbol(&self, symbol: &Symbol) -> LifecycleResult<usize> {
        let lock = self.symbol_lock(symbol);
        let _guard = lock.lock().await;

        let active = self.store.active_for_symbol(symbol);
        let Some(best) = active.iter().map(|o| o.priority).min() else {
            return Ok(0);
        };

        let mut count = 0usize;
        for order in active.iter().filter(|o| best.outranks(o.priority)) {
            if order.is_open_position() {
                let qty = order.fill_qty.unwrap_or(order.qty);
                self.exchange
                    .close_position(&order.symbol, order.direction, qty)
                    .await?;
                self.cancel_protective_legs(&order.id).await?;
                self.store
                    .transition(
                        &order.id,
                        LifecycleState::ClosedManual,
                        TransitionCtx::with_note("cleanup override"),
                    )
                    .await?;
                Metrics::transition(&order.state.to_string(), "CLOSED_MANUAL");
            } else {
                self.cancel_tracked(&order.id, "cleanup override").await?;
            }
            count += 1;
        }

        info!(symbol = %symbol, count, "Cleanup override executed");
        self.refresh_active_gauge();
        Ok(count)
    }
}
