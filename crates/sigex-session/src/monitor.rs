//! The session monitor task.
//!
//! Edge-triggered on a periodically sampled clock: the tick interval is
//! much shorter than the grace zone, so each window occurrence is marked
//! fired in memory the first time its zone is observed and skipped on
//! every later tick. The marker is not persisted; after a restart inside
//! a grace zone the cancellations are issued again and rely on the
//! cancellation path being idempotent.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tracing::{info, warn};

use sigex_core::{LifecycleState, SessionTag};
use sigex_exchange::ExchangeClient;
use sigex_lifecycle::Coordinator;
use sigex_telemetry::Metrics;

use crate::window::{SessionConfig, SessionWindow};

pub struct SessionMonitor<E: ExchangeClient> {
    coordinator: Arc<Coordinator<E>>,
    config: SessionConfig,
    fired: Mutex<HashSet<crate::window::OccurrenceKey>>,
}

impl<E: ExchangeClient> SessionMonitor<E> {
    pub fn new(coordinator: Arc<Coordinator<E>>, config: SessionConfig) -> Self {
        Self {
            coordinator,
            config,
            fired: Mutex::new(HashSet::new()),
        }
    }

    /// Run monitor ticks until the task is aborted.
    pub async fn run(&self) {
        let mut ticker = tokio::time::interval(std::time::Duration::from_millis(
            self.config.tick_interval_ms,
        ));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        info!(
            windows = self.config.windows.len(),
            offset_minutes = self.config.utc_offset_minutes,
            "Session monitor started"
        );

        loop {
            ticker.tick().await;
            self.tick_at(Utc::now()).await;
        }
    }

    /// One monitor tick. Returns the number of cancellations issued.
    pub async fn tick_at(&self, now: DateTime<Utc>) -> usize {
        let mut issued = 0usize;
        for window in self.config.windows.clone() {
            let Some(key) = self.config.cancel_zone_at(&window, now) else {
                continue;
            };
            // Mark before firing so later ticks in the same zone skip it.
            if !self.fired.lock().insert(key) {
                continue;
            }
            issued += self.fire_window(&window).await;
        }
        issued
    }

    /// Issue cancellations for every pending top-tier entry tagged with
    /// `window`. Shared by the tick path and the manual override.
    pub async fn fire_window(&self, window: &SessionWindow) -> usize {
        let pending = self
            .coordinator
            .store()
            .in_state(LifecycleState::PendingEntry);

        let mut issued = 0usize;
        for order in pending.into_iter().filter(|o| {
            o.priority.is_top()
                && o.session
                    .as_ref()
                    .is_some_and(|tag| tag.as_str() == window.name)
        }) {
            match self
                .coordinator
                .cancel_pending(
                    &order.id,
                    LifecycleState::Cancelled,
                    &format!("session {} closed", window.name),
                )
                .await
            {
                Ok(_) => {
                    info!(id = %order.id, window = %window.name, "Session cancellation issued");
                    Metrics::session_cancel(&window.name);
                    issued += 1;
                }
                Err(e) => {
                    warn!(id = %order.id, window = %window.name, error = %e, "Session cancellation failed");
                }
            }
        }
        issued
    }

    /// Whether the tagged session is open at `now`. Session-scoped
    /// signals are only accepted while their window is open. Returns
    /// `None` when the tag matches no configured window; such tags are
    /// not session-scoped here and pass through unchecked.
    #[must_use]
    pub fn session_open(&self, tag: &SessionTag, now: DateTime<Utc>) -> Option<bool> {
        let window = self
            .config
            .windows
            .iter()
            .find(|w| w.name == tag.as_str())?;
        Some(self.config.in_window_at(window, now))
    }

    /// Manual override: fire a named window's cancellation action now,
    /// outside the tick cadence. Returns `None` for an unknown window.
    pub async fn trigger(&self, window_name: &str) -> Option<usize> {
        let window = self
            .config
            .windows
            .iter()
            .find(|w| w.name == window_name)?
            .clone();
        info!(window = %window.name, "Manual session cancellation requested");
        Some(self.fire_window(&window).await)
    }
}
