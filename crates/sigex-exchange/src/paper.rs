//! In-memory paper venue.
//!
//! Implements [`ExchangeClient`] against a simulated book: prices are fed
//! in with [`PaperExchange::set_price`], and resting orders fill when the
//! price crosses them. Used for dry runs and end-to-end tests; it honors
//! the same idempotence contract as a real venue adapter.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;

use sigex_core::{Direction, ExchangeOrderId, Price, Qty, Symbol, TrackedOrder, TrackedOrderId};

use crate::client::{ExchangeClient, OrderStatusReport, ProtectiveLegIds};
use crate::error::{ExchangeError, ExchangeResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LegKind {
    /// Limit entry at the order's entry price.
    Entry,
    /// Stop leg, triggers on adverse movement.
    Stop,
    /// Target leg, fills on favorable movement.
    Target,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PaperStatus {
    Open,
    Filled,
    Cancelled,
}

#[derive(Debug, Clone)]
struct PaperOrder {
    symbol: Symbol,
    direction: Direction,
    kind: LegKind,
    limit: Price,
    qty: Qty,
    status: PaperStatus,
    fill_price: Option<Price>,
}

impl PaperOrder {
    /// Whether `price` crosses this resting order.
    fn crosses(&self, price: Price) -> bool {
        match (self.kind, self.direction) {
            // A long entry is a buy limit below the market; a short entry
            // is a sell limit above it.
            (LegKind::Entry, Direction::Long) => price <= self.limit,
            (LegKind::Entry, Direction::Short) => price >= self.limit,
            // Protective legs close the position, so the comparisons flip.
            (LegKind::Stop, Direction::Long) => price <= self.limit,
            (LegKind::Stop, Direction::Short) => price >= self.limit,
            (LegKind::Target, Direction::Long) => price >= self.limit,
            (LegKind::Target, Direction::Short) => price <= self.limit,
        }
    }
}

/// Simulated exchange backed by in-memory maps.
#[derive(Default)]
pub struct PaperExchange {
    prices: DashMap<Symbol, Price>,
    orders: DashMap<ExchangeOrderId, PaperOrder>,
    /// Dedup map: tracked order id to its entry leg, so a repeated
    /// submission returns the original id instead of double-booking.
    submitted: DashMap<TrackedOrderId, ExchangeOrderId>,
    seq: AtomicU64,
}

impl PaperExchange {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn next_id(&self, prefix: &str) -> ExchangeOrderId {
        let n = self.seq.fetch_add(1, Ordering::Relaxed);
        ExchangeOrderId::new(format!("paper-{prefix}-{n}"))
    }

    /// Feed a price and fill every resting order it crosses.
    pub fn set_price(&self, symbol: &Symbol, price: Price) {
        self.prices.insert(symbol.clone(), price);
        for mut entry in self.orders.iter_mut() {
            let order = entry.value_mut();
            if order.symbol == *symbol
                && order.status == PaperStatus::Open
                && order.crosses(price)
            {
                order.status = PaperStatus::Filled;
                order.fill_price = Some(order.limit);
            }
        }
    }
}

#[async_trait]
impl ExchangeClient for PaperExchange {
    async fn get_current_price(&self, symbol: &Symbol) -> ExchangeResult<Price> {
        self.prices
            .get(symbol)
            .map(|p| *p.value())
            .ok_or_else(|| ExchangeError::Transient(format!("no price for {symbol}")))
    }

    async fn get_order_status(&self, id: &ExchangeOrderId) -> ExchangeResult<OrderStatusReport> {
        let Some(order) = self.orders.get(id) else {
            return Ok(OrderStatusReport::not_found());
        };
        Ok(match order.status {
            PaperStatus::Open => OrderStatusReport::open(),
            PaperStatus::Filled => OrderStatusReport::filled(
                order.qty,
                order.fill_price.unwrap_or(order.limit),
            ),
            PaperStatus::Cancelled => OrderStatusReport::cancelled(),
        })
    }

    async fn submit_entry(&self, order: &TrackedOrder) -> ExchangeResult<ExchangeOrderId> {
        if let Some(existing) = self.submitted.get(&order.id) {
            return Ok(existing.value().clone());
        }

        let id = self.next_id("entry");
        let mut leg = PaperOrder {
            symbol: order.symbol.clone(),
            direction: order.direction,
            kind: LegKind::Entry,
            limit: order.entry,
            qty: order.qty,
            status: PaperStatus::Open,
            fill_price: None,
        };
        if let Some(price) = self.prices.get(&order.symbol) {
            if leg.crosses(*price.value()) {
                leg.status = PaperStatus::Filled;
                leg.fill_price = Some(leg.limit);
            }
        }
        self.orders.insert(id.clone(), leg);
        self.submitted.insert(order.id.clone(), id.clone());
        Ok(id)
    }

    async fn attach_protective_legs(
        &self,
        order: &TrackedOrder,
        stop: Price,
        target: Price,
    ) -> ExchangeResult<ProtectiveLegIds> {
        let stop_id = self.next_id("stop");
        let target_id = self.next_id("target");
        self.orders.insert(
            stop_id.clone(),
            PaperOrder {
                symbol: order.symbol.clone(),
                direction: order.direction,
                kind: LegKind::Stop,
                limit: stop,
                qty: order.fill_qty.unwrap_or(order.qty),
                status: PaperStatus::Open,
                fill_price: None,
            },
        );
        self.orders.insert(
            target_id.clone(),
            PaperOrder {
                symbol: order.symbol.clone(),
                direction: order.direction,
                kind: LegKind::Target,
                limit: target,
                qty: order.fill_qty.unwrap_or(order.qty),
                status: PaperStatus::Open,
                fill_price: None,
            },
        );
        Ok(ProtectiveLegIds {
            stop_order_id: stop_id,
            target_order_id: target_id,
        })
    }

    async fn cancel_order(&self, id: &ExchangeOrderId) -> ExchangeResult<()> {
        if let Some(mut order) = self.orders.get_mut(id) {
            if order.status == PaperStatus::Open {
                order.status = PaperStatus::Cancelled;
            }
        }
        // Unknown or already-terminal orders cancel successfully.
        Ok(())
    }

    async fn amend_stop(&self, id: &ExchangeOrderId, stop: Price) -> ExchangeResult<()> {
        if let Some(mut order) = self.orders.get_mut(id) {
            if order.status == PaperStatus::Open && order.kind == LegKind::Stop {
                order.limit = stop;
            }
        }
        Ok(())
    }

    async fn close_position(
        &self,
        _symbol: &Symbol,
        _direction: Direction,
        _qty: Qty,
    ) -> ExchangeResult<()> {
        Ok(())
    }
}
