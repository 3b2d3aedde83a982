//! Poll-driven reconciliation.
//!
//! The exchange is the authority on order status. On every pass the poller
//! walks the non-terminal orders and reconciles each against its
//! exchange-reported status: fills advance the machine, cancellations and
//! rejections terminate it, and pending entries are checked for staleness
//! against the current price. Per-order failures are logged and retried on
//! the next pass; the loop itself never exits on error.

use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use sigex_core::{ExchangeOrderId, LifecycleState, TrackedOrder};
use sigex_exchange::{ExchangeClient, OrderStatusKind};
use sigex_telemetry::Metrics;

use crate::break_even::{self, BreakEvenConfig};
use crate::coordinator::Coordinator;
use crate::error::LifecycleResult;
use crate::staleness::{self, StaleReason, StalenessConfig};
use crate::store::{OrderStoreHandle, TransitionCtx};

/// Poller configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollerConfig {
    /// Reconciliation interval in milliseconds.
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    /// Staleness thresholds for pending entries.
    #[serde(default)]
    pub staleness: StalenessConfig,
    /// Break-even stop adjustment for open positions.
    #[serde(default)]
    pub break_even: BreakEvenConfig,
}

fn default_interval_ms() -> u64 {
    5_000
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
            staleness: StalenessConfig::default(),
            break_even: BreakEvenConfig::default(),
        }
    }
}

fn stale_label(reason: StaleReason) -> &'static str {
    match reason {
        StaleReason::TargetBreached => "target_breached",
        StaleReason::StopBreached => "stop_breached",
        StaleReason::EntryDeviation => "entry_deviation",
    }
}

/// The reconciliation loop.
pub struct Poller<E: ExchangeClient> {
    store: OrderStoreHandle,
    exchange: Arc<E>,
    coordinator: Arc<Coordinator<E>>,
    config: PollerConfig,
}

impl<E: ExchangeClient> Poller<E> {
    pub fn new(
        store: OrderStoreHandle,
        exchange: Arc<E>,
        coordinator: Arc<Coordinator<E>>,
        config: PollerConfig,
    ) -> Self {
        Self {
            store,
            exchange,
            coordinator,
            config,
        }
    }

    /// Run reconciliation passes until the task is aborted.
    pub async fn run(self) {
        let mut ticker = tokio::time::interval(std::time::Duration::from_millis(
            self.config.interval_ms,
        ));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        info!(interval_ms = self.config.interval_ms, "Poller started");

        loop {
            ticker.tick().await;
            let now_ms = chrono::Utc::now().timestamp_millis() as u64;
            self.tick_at(now_ms).await;
        }
    }

    /// One reconciliation pass over every non-terminal order.
    ///
    /// Each order is reconciled under its symbol's lock, so a pass never
    /// interleaves with an in-flight admission for the same symbol.
    pub async fn tick_at(&self, now_ms: u64) {
        let started = Instant::now();
        for order in self.store.snapshot() {
            if order.state.is_terminal() {
                continue;
            }
            let lock = self.coordinator.symbol_lock(&order.symbol);
            let _guard = lock.lock().await;
            // Re-read: an admission may have advanced the order while the
            // lock was awaited.
            let Some(order) = self.store.get(&order.id) else {
                continue;
            };
            let result = match order.state {
                LifecycleState::Created => self.retry_submission(&order).await,
                LifecycleState::PendingEntry => self.reconcile_pending(&order, now_ms).await,
                LifecycleState::EntryFilled => self.attach_legs(&order).await,
                LifecycleState::PositionOpen => self.reconcile_open(&order, now_ms).await,
                _ => Ok(()),
            };
            if let Err(e) = result {
                error!(id = %order.id, state = %order.state, error = %e, "Reconciliation failed");
            }
        }
        Metrics::poll_duration("tick", started.elapsed().as_secs_f64() * 1000.0);
    }

    async fn retry_submission(&self, order: &TrackedOrder) -> LifecycleResult<()> {
        debug!(id = %order.id, "Retrying entry submission");
        self.coordinator.resubmit(order).await
    }

    async fn reconcile_pending(&self, order: &TrackedOrder, now_ms: u64) -> LifecycleResult<()> {
        let Some(entry_id) = &order.entry_order_id else {
            warn!(id = %order.id, "Pending entry has no exchange id");
            return Ok(());
        };

        let status = match self.exchange.get_order_status(entry_id).await {
            Ok(s) => s,
            Err(e) => {
                Metrics::exchange_error("get_order_status", "transient");
                warn!(id = %order.id, error = %e, "Status poll failed");
                return Ok(());
            }
        };

        match status.kind {
            OrderStatusKind::Open => self.check_staleness(order).await,
            OrderStatusKind::Filled => {
                let fill_qty = status.filled_qty.unwrap_or(order.qty);
                let fill_price = status.avg_price.unwrap_or(order.entry);
                if fill_qty < order.qty {
                    // The exchange is authoritative; record what it reports
                    // and advance anyway.
                    warn!(
                        id = %order.id,
                        expected = %order.qty,
                        filled = %fill_qty,
                        "Partial fill reported for a full-fill entry"
                    );
                }
                let filled = self
                    .store
                    .transition(
                        &order.id,
                        LifecycleState::EntryFilled,
                        TransitionCtx::with_fill(fill_price, fill_qty),
                    )
                    .await?;
                Metrics::transition("PENDING_ENTRY", "ENTRY_FILLED");
                info!(id = %order.id, price = %fill_price, qty = %fill_qty, "Entry filled");
                self.attach_legs(&filled).await
            }
            OrderStatusKind::Cancelled => {
                self.store
                    .transition(
                        &order.id,
                        LifecycleState::Cancelled,
                        TransitionCtx::with_note("cancelled on exchange"),
                    )
                    .await?;
                Metrics::transition("PENDING_ENTRY", "CANCELLED");
                Ok(())
            }
            OrderStatusKind::Rejected => {
                self.store
                    .transition(
                        &order.id,
                        LifecycleState::Rejected,
                        TransitionCtx::with_note("rejected by exchange"),
                    )
                    .await?;
                Metrics::transition("PENDING_ENTRY", "REJECTED");
                Ok(())
            }
            OrderStatusKind::NotFound => {
                // History retention is bounded; only treat an order as
                // vanished once it is old enough that a submission should
                // long since have appeared.
                if now_ms.saturating_sub(order.updated_ms) > self.config.interval_ms {
                    warn!(id = %order.id, "Entry vanished from exchange history");
                    self.store
                        .transition(
                            &order.id,
                            LifecycleState::CancelledStale,
                            TransitionCtx::with_note("vanished from exchange history"),
                        )
                        .await?;
                    Metrics::transition("PENDING_ENTRY", "CANCELLED_STALE");
                    Metrics::stale_cancel("vanished");
                }
                Ok(())
            }
        }
    }

    async fn check_staleness(&self, order: &TrackedOrder) -> LifecycleResult<()> {
        let price = match self.exchange.get_current_price(&order.symbol).await {
            Ok(p) => p,
            Err(e) => {
                Metrics::exchange_error("get_current_price", "transient");
                warn!(symbol = %order.symbol, error = %e, "Price fetch failed");
                return Ok(());
            }
        };

        if let Some(reason) = staleness::check(order, price, &self.config.staleness) {
            info!(id = %order.id, price = %price, %reason, "Cancelling stale entry");
            self.coordinator
                .cancel_pending_locked(&order.id, LifecycleState::CancelledStale, &reason.to_string())
                .await?;
            Metrics::stale_cancel(stale_label(reason));
        }
        Ok(())
    }

    async fn attach_legs(&self, order: &TrackedOrder) -> LifecycleResult<()> {
        match self
            .exchange
            .attach_protective_legs(order, order.stop, order.target)
            .await
        {
            Ok(legs) => {
                self.store
                    .transition(
                        &order.id,
                        LifecycleState::PositionOpen,
                        TransitionCtx::with_legs(legs.stop_order_id, legs.target_order_id),
                    )
                    .await?;
                Metrics::transition("ENTRY_FILLED", "POSITION_OPEN");
                info!(id = %order.id, "Protective legs attached");
                Ok(())
            }
            Err(e) if e.is_terminal() => {
                error!(id = %order.id, error = %e, "Protective leg attachment rejected");
                Metrics::exchange_error("attach_protective_legs", "rejected");
                self.store
                    .transition(
                        &order.id,
                        LifecycleState::Error,
                        TransitionCtx::with_note(format!("protective legs: {e}")),
                    )
                    .await?;
                Metrics::transition("ENTRY_FILLED", "ERROR");
                Ok(())
            }
            Err(e) => {
                // Stays in EntryFilled; retried next pass.
                Metrics::exchange_error("attach_protective_legs", "transient");
                warn!(id = %order.id, error = %e, "Protective leg attachment failed, will retry");
                Ok(())
            }
        }
    }

    async fn reconcile_open(&self, order: &TrackedOrder, now_ms: u64) -> LifecycleResult<()> {
        let (Some(stop_id), Some(target_id)) = (&order.stop_order_id, &order.target_order_id)
        else {
            warn!(id = %order.id, "Open position missing protective leg ids");
            return Ok(());
        };

        let target_status = match self.exchange.get_order_status(target_id).await {
            Ok(s) => s,
            Err(e) => {
                Metrics::exchange_error("get_order_status", "transient");
                warn!(id = %order.id, error = %e, "Target leg poll failed");
                return Ok(());
            }
        };
        if target_status.kind == OrderStatusKind::Filled {
            self.store
                .transition(
                    &order.id,
                    LifecycleState::ClosedTp,
                    TransitionCtx::with_note("target filled"),
                )
                .await?;
            Metrics::transition("POSITION_OPEN", "CLOSED_TP");
            info!(id = %order.id, "Position closed at target");
            // Sibling cancel is idempotent; a failure here leaves a resting
            // leg the next pass cannot see, so it must surface.
            self.exchange.cancel_order(stop_id).await?;
            return Ok(());
        }

        let stop_status = match self.exchange.get_order_status(stop_id).await {
            Ok(s) => s,
            Err(e) => {
                Metrics::exchange_error("get_order_status", "transient");
                warn!(id = %order.id, error = %e, "Stop leg poll failed");
                return Ok(());
            }
        };
        if stop_status.kind == OrderStatusKind::Filled {
            self.store
                .transition(
                    &order.id,
                    LifecycleState::ClosedSl,
                    TransitionCtx::with_note("stop filled"),
                )
                .await?;
            Metrics::transition("POSITION_OPEN", "CLOSED_SL");
            info!(id = %order.id, "Position closed at stop");
            self.exchange.cancel_order(target_id).await?;
            return Ok(());
        }

        self.check_break_even(order, stop_id, now_ms).await
    }

    /// Move the stop of a sufficiently profitable position to break-even,
    /// at most once per position.
    async fn check_break_even(
        &self,
        order: &TrackedOrder,
        stop_id: &ExchangeOrderId,
        now_ms: u64,
    ) -> LifecycleResult<()> {
        if !self.config.break_even.enabled || order.break_even_stop.is_some() {
            return Ok(());
        }

        let price = match self.exchange.get_current_price(&order.symbol).await {
            Ok(p) => p,
            Err(e) => {
                Metrics::exchange_error("get_current_price", "transient");
                warn!(symbol = %order.symbol, error = %e, "Price fetch failed");
                return Ok(());
            }
        };

        let Some(new_stop) =
            break_even::break_even_stop(order, price, now_ms, &self.config.break_even)
        else {
            return Ok(());
        };

        self.exchange.amend_stop(stop_id, new_stop).await?;
        self.store.mark_break_even(&order.id, new_stop).await?;
        info!(id = %order.id, stop = %new_stop, price = %price, "Stop moved to break-even");
        Metrics::break_even(order.symbol.as_str());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::predicate::*;
    use mockall::Sequence;
    use rust_decimal_macros::dec;
    use sigex_core::{
        Direction, ExchangeOrderId, Price, Priority, Qty, Signal, StrategyId, Symbol,
    };
    use sigex_exchange::{
        ExchangeError, MockExchangeClient, OrderStatusReport, ProtectiveLegIds,
    };

    use crate::coordinator::CoordinatorConfig;
    use crate::error::LifecycleError;
    use crate::store::spawn_order_store;

    fn signal(priority: u8, direction: Direction, arrival_ms: u64) -> Signal {
        let (entry, stop, target) = match direction {
            Direction::Long => (dec!(110), dec!(100), dec!(130)),
            Direction::Short => (dec!(110), dec!(120), dec!(90)),
        };
        Signal::new(
            Symbol::normalize("BTCUSDT").unwrap(),
            direction,
            Price::new(entry),
            Price::new(stop),
            Price::new(target),
            Some(Priority::new(priority)),
            StrategyId::new("breakout"),
            arrival_ms,
            None,
        )
        .unwrap()
    }

    fn pending_order(arrival_ms: u64) -> TrackedOrder {
        let mut order = TrackedOrder::from_signal(
            &signal(1, Direction::Long, arrival_ms),
            Qty::new(dec!(10)),
            arrival_ms,
        );
        order.state = LifecycleState::PendingEntry;
        order.entry_order_id = Some(ExchangeOrderId::new("ex-entry"));
        order
    }

    fn open_position(arrival_ms: u64) -> TrackedOrder {
        let mut order = pending_order(arrival_ms);
        order.state = LifecycleState::PositionOpen;
        order.fill_price = Some(Price::new(dec!(110)));
        order.fill_qty = Some(Qty::new(dec!(10)));
        order.stop_order_id = Some(ExchangeOrderId::new("ex-stop"));
        order.target_order_id = Some(ExchangeOrderId::new("ex-tp"));
        order
    }

    async fn poller_with(
        mock: MockExchangeClient,
    ) -> (Poller<MockExchangeClient>, OrderStoreHandle) {
        let (poller, store, _) = poller_parts(mock).await;
        (poller, store)
    }

    async fn poller_parts(
        mock: MockExchangeClient,
    ) -> (
        Poller<MockExchangeClient>,
        OrderStoreHandle,
        Arc<Coordinator<MockExchangeClient>>,
    ) {
        let (store, _join) = spawn_order_store(32);
        let exchange = Arc::new(mock);
        let coordinator = Arc::new(Coordinator::new(
            store.clone(),
            Arc::clone(&exchange),
            CoordinatorConfig::default(),
        ));
        let poller = Poller::new(
            store.clone(),
            exchange,
            Arc::clone(&coordinator),
            PollerConfig::default(),
        );
        (poller, store, coordinator)
    }

    #[tokio::test]
    async fn test_fill_advances_to_position_open() {
        let mut mock = MockExchangeClient::new();
        mock.expect_get_order_status()
            .with(eq(ExchangeOrderId::new("ex-entry")))
            .returning(|_| {
                Ok(OrderStatusReport::filled(
                    Qty::new(dec!(10)),
                    Price::new(dec!(110.5)),
                ))
            });
        mock.expect_attach_protective_legs().returning(|_, _, _| {
            Ok(ProtectiveLegIds {
                stop_order_id: ExchangeOrderId::new("ex-stop"),
                target_order_id: ExchangeOrderId::new("ex-tp"),
            })
        });

        let (poller, store) = poller_with(mock).await;
        let order = pending_order(1);
        store.register(order.clone()).await.unwrap();

        poller.tick_at(10_000).await;

        let seen = store.get(&order.id).unwrap();
        assert_eq!(seen.state, LifecycleState::PositionOpen);
        assert_eq!(seen.fill_price, Some(Price::new(dec!(110.5))));
        assert_eq!(seen.stop_order_id, Some(ExchangeOrderId::new("ex-stop")));
    }

    #[tokio::test]
    async fn test_stale_pending_entry_cancelled() {
        let mut mock = MockExchangeClient::new();
        mock.expect_get_order_status()
            .returning(|_| Ok(OrderStatusReport::open()));
        // Price past the hypothetical target.
        mock.expect_get_current_price()
            .returning(|_| Ok(Price::new(dec!(135))));
        mock.expect_cancel_order()
            .with(eq(ExchangeOrderId::new("ex-entry")))
            .times(1)
            .returning(|_| Ok(()));

        let (poller, store) = poller_with(mock).await;
        let order = pending_order(1);
        store.register(order.clone()).await.unwrap();

        poller.tick_at(10_000).await;

        let seen = store.get(&order.id).unwrap();
        assert_eq!(seen.state, LifecycleState::CancelledStale);
        assert!(seen.last_error.unwrap().contains("target"));
    }

    #[tokio::test]
    async fn test_fresh_pending_entry_untouched() {
        let mut mock = MockExchangeClient::new();
        mock.expect_get_order_status()
            .returning(|_| Ok(OrderStatusReport::open()));
        mock.expect_get_current_price()
            .returning(|_| Ok(Price::new(dec!(111))));

        let (poller, store) = poller_with(mock).await;
        let order = pending_order(1);
        store.register(order.clone()).await.unwrap();

        poller.tick_at(10_000).await;
        assert_eq!(
            store.get(&order.id).unwrap().state,
            LifecycleState::PendingEntry
        );
    }

    #[tokio::test]
    async fn test_leg_attach_rejection_moves_to_error() {
        let mut mock = MockExchangeClient::new();
        mock.expect_get_order_status().returning(|_| {
            Ok(OrderStatusReport::filled(
                Qty::new(dec!(10)),
                Price::new(dec!(110)),
            ))
        });
        mock.expect_attach_protective_legs()
            .returning(|_, _, _| Err(ExchangeError::Rejected("price out of band".into())));

        let (poller, store) = poller_with(mock).await;
        let order = pending_order(1);
        store.register(order.clone()).await.unwrap();

        poller.tick_at(10_000).await;

        let seen = store.get(&order.id).unwrap();
        assert_eq!(seen.state, LifecycleState::Error);
        assert!(seen.last_error.unwrap().contains("price out of band"));
    }

    #[tokio::test]
    async fn test_leg_attach_transient_failure_retries() {
        let mut mock = MockExchangeClient::new();
        mock.expect_get_order_status().returning(|_| {
            Ok(OrderStatusReport::filled(
                Qty::new(dec!(10)),
                Price::new(dec!(110)),
            ))
        });
        mock.expect_attach_protective_legs()
            .times(1)
            .returning(|_, _, _| Err(ExchangeError::Transient("connection reset".into())));

        let (poller, store) = poller_with(mock).await;
        let order = pending_order(1);
        store.register(order.clone()).await.unwrap();

        poller.tick_at(10_000).await;
        assert_eq!(
            store.get(&order.id).unwrap().state,
            LifecycleState::EntryFilled
        );
    }

    #[tokio::test]
    async fn test_target_fill_closes_tp_and_cancels_stop() {
        let mut mock = MockExchangeClient::new();
        mock.expect_get_order_status()
            .with(eq(ExchangeOrderId::new("ex-tp")))
            .returning(|_| {
                Ok(OrderStatusReport::filled(
                    Qty::new(dec!(10)),
                    Price::new(dec!(130)),
                ))
            });
        mock.expect_cancel_order()
            .with(eq(ExchangeOrderId::new("ex-stop")))
            .times(1)
            .returning(|_| Ok(()));

        let (poller, store) = poller_with(mock).await;
        let mut order = pending_order(1);
        order.state = LifecycleState::PositionOpen;
        order.stop_order_id = Some(ExchangeOrderId::new("ex-stop"));
        order.target_order_id = Some(ExchangeOrderId::new("ex-tp"));
        store.register(order.clone()).await.unwrap();

        poller.tick_at(10_000).await;
        assert_eq!(store.get(&order.id).unwrap().state, LifecycleState::ClosedTp);
    }

    #[tokio::test]
    async fn test_stop_fill_closes_sl_and_cancels_target() {
        let mut mock = MockExchangeClient::new();
        mock.expect_get_order_status()
            .with(eq(ExchangeOrderId::new("ex-tp")))
            .returning(|_| Ok(OrderStatusReport::open()));
        mock.expect_get_order_status()
            .with(eq(ExchangeOrderId::new("ex-stop")))
            .returning(|_| {
                Ok(OrderStatusReport::filled(
                    Qty::new(dec!(10)),
                    Price::new(dec!(100)),
                ))
            });
        mock.expect_cancel_order()
            .with(eq(ExchangeOrderId::new("ex-tp")))
            .times(1)
            .returning(|_| Ok(()));

        let (poller, store) = poller_with(mock).await;
        let mut order = pending_order(1);
        order.state = LifecycleState::PositionOpen;
        order.stop_order_id = Some(ExchangeOrderId::new("ex-stop"));
        order.target_order_id = Some(ExchangeOrderId::new("ex-tp"));
        store.register(order.clone()).await.unwrap();

        poller.tick_at(10_000).await;
        assert_eq!(store.get(&order.id).unwrap().state, LifecycleState::ClosedSl);
    }

    #[tokio::test]
    async fn test_vanished_entry_cancelled_stale_after_grace() {
        let mut mock = MockExchangeClient::new();
        mock.expect_get_order_status()
            .returning(|_| Ok(OrderStatusReport::not_found()));

        let (poller, store) = poller_with(mock).await;
        let order = pending_order(1); // updated_ms = 1
        store.register(order.clone()).await.unwrap();

        // Not yet older than one interval: untouched.
        poller.tick_at(2_000).await;
        assert_eq!(
            store.get(&order.id).unwrap().state,
            LifecycleState::PendingEntry
        );

        // Past one interval: treated as vanished.
        poller.tick_at(10_000).await;
        assert_eq!(
            store.get(&order.id).unwrap().state,
            LifecycleState::CancelledStale
        );
    }

    #[tokio::test]
    async fn test_exchange_cancellation_reconciled() {
        let mut mock = MockExchangeClient::new();
        mock.expect_get_order_status()
            .returning(|_| Ok(OrderStatusReport::cancelled()));

        let (poller, store) = poller_with(mock).await;
        let order = pending_order(1);
        store.register(order.clone()).await.unwrap();

        poller.tick_at(10_000).await;
        assert_eq!(
            store.get(&order.id).unwrap().state,
            LifecycleState::Cancelled
        );
    }

    #[tokio::test]
    async fn test_status_poll_failure_keeps_order() {
        let mut mock = MockExchangeClient::new();
        mock.expect_get_order_status()
            .returning(|_| Err(ExchangeError::Timeout(5000)));

        let (poller, store) = poller_with(mock).await;
        let order = pending_order(1);
        store.register(order.clone()).await.unwrap();

        poller.tick_at(10_000).await;
        assert_eq!(
            store.get(&order.id).unwrap().state,
            LifecycleState::PendingEntry
        );
    }

    #[tokio::test]
    async fn test_created_retry_reruns_cleanup_before_resubmission() {
        // A top-tier reversal whose cleanup cancel times out during
        // admission: the new order stays Created. The retry must re-run
        // the cleanup and only submit once the opposing entry is
        // confirmed cancelled.
        let mut seq = Sequence::new();
        let mut mock = MockExchangeClient::new();
        mock.expect_submit_entry()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(ExchangeOrderId::new("ex-a")));
        mock.expect_cancel_order()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Err(ExchangeError::Timeout(5000)));
        mock.expect_cancel_order()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));
        mock.expect_submit_entry()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(ExchangeOrderId::new("ex-c")));
        // The first order may be reconciled in the same pass.
        mock.expect_get_order_status()
            .returning(|_| Ok(OrderStatusReport::open()));
        mock.expect_get_current_price()
            .returning(|_| Ok(Price::new(dec!(111))));

        let (poller, store, coordinator) = poller_parts(mock).await;

        let first = coordinator
            .admit(signal(1, Direction::Long, 1))
            .await
            .unwrap();
        let err = coordinator.admit(signal(1, Direction::Short, 2)).await;
        assert!(matches!(err, Err(LifecycleError::Exchange(_))));
        assert_eq!(store.in_state(LifecycleState::Created).len(), 1);

        poller.tick_at(10_000).await;

        assert_eq!(
            store.get(&first.id).unwrap().state,
            LifecycleState::Cancelled
        );
        let pending = store.in_state(LifecycleState::PendingEntry);
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].direction, Direction::Short);
        assert_eq!(
            pending[0].entry_order_id,
            Some(ExchangeOrderId::new("ex-c"))
        );
    }

    #[tokio::test]
    async fn test_created_retry_withheld_while_cleanup_fails() {
        // The cleanup cancel keeps failing: the retry must not submit
        // the new entry, so opposing same-tier orders are never pending
        // at the same time.
        let mut mock = MockExchangeClient::new();
        mock.expect_submit_entry()
            .times(1)
            .returning(|_| Ok(ExchangeOrderId::new("ex-a")));
        mock.expect_cancel_order()
            .returning(|_| Err(ExchangeError::Timeout(5000)));
        mock.expect_get_order_status()
            .returning(|_| Ok(OrderStatusReport::open()));
        mock.expect_get_current_price()
            .returning(|_| Ok(Price::new(dec!(111))));

        let (poller, store, coordinator) = poller_parts(mock).await;

        coordinator
            .admit(signal(1, Direction::Long, 1))
            .await
            .unwrap();
        let err = coordinator.admit(signal(1, Direction::Short, 2)).await;
        assert!(matches!(err, Err(LifecycleError::Exchange(_))));

        poller.tick_at(10_000).await;
        poller.tick_at(20_000).await;

        assert_eq!(store.in_state(LifecycleState::PendingEntry).len(), 1);
        assert_eq!(store.in_state(LifecycleState::Created).len(), 1);
    }

    #[tokio::test]
    async fn test_created_retry_cancelled_when_outranked() {
        // A higher tier became active after the order was created; the
        // retry re-resolves and cancels instead of submitting.
        let mut mock = MockExchangeClient::new();
        mock.expect_get_order_status()
            .returning(|_| Ok(OrderStatusReport::open()));
        mock.expect_get_current_price()
            .returning(|_| Ok(Price::new(dec!(111))));

        let (poller, store) = poller_with(mock).await;
        let top = pending_order(1);
        let outranked = TrackedOrder::from_signal(
            &signal(3, Direction::Long, 2),
            Qty::new(dec!(10)),
            2,
        );
        store.register(top.clone()).await.unwrap();
        store.register(outranked.clone()).await.unwrap();

        poller.tick_at(10_000).await;

        let seen = store.get(&outranked.id).unwrap();
        assert_eq!(seen.state, LifecycleState::Cancelled);
        assert!(seen.last_error.unwrap().contains(top.id.as_str()));
        assert_eq!(
            store.get(&top.id).unwrap().state,
            LifecycleState::PendingEntry
        );
    }

    #[tokio::test]
    async fn test_break_even_moves_stop_once() {
        let mut mock = MockExchangeClient::new();
        mock.expect_get_order_status()
            .returning(|_| Ok(OrderStatusReport::open()));
        // 121 covers 55% of the 110 -> 130 move.
        mock.expect_get_current_price()
            .returning(|_| Ok(Price::new(dec!(121))));
        mock.expect_amend_stop()
            .with(
                eq(ExchangeOrderId::new("ex-stop")),
                eq(Price::new(dec!(110))),
            )
            .times(1)
            .returning(|_, _| Ok(()));

        let (poller, store) = poller_with(mock).await;
        let order = open_position(1);
        store.register(order.clone()).await.unwrap();

        poller.tick_at(10_000_000).await;
        let seen = store.get(&order.id).unwrap();
        assert_eq!(seen.state, LifecycleState::PositionOpen);
        assert_eq!(seen.break_even_stop, Some(Price::new(dec!(110))));

        // Second pass: already adjusted, no further amend.
        poller.tick_at(10_100_000).await;
        assert_eq!(
            store.get(&order.id).unwrap().break_even_stop,
            Some(Price::new(dec!(110)))
        );
    }

    #[tokio::test]
    async fn test_break_even_waits_for_min_age() {
        let mut mock = MockExchangeClient::new();
        mock.expect_get_order_status()
            .returning(|_| Ok(OrderStatusReport::open()));
        mock.expect_get_current_price()
            .returning(|_| Ok(Price::new(dec!(121))));
        // No amend_stop expectation: the young position is untouched.

        let (poller, store) = poller_with(mock).await;
        let order = open_position(1);
        store.register(order.clone()).await.unwrap();

        poller.tick_at(30_000).await;
        assert_eq!(store.get(&order.id).unwrap().break_even_stop, None);
    }
}
