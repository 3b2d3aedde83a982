//! Prometheus metrics for sigex.
//!
//! Covers signal admission outcomes, lifecycle transitions, cancellation
//! causes, and the exchange boundary.
//!
//! # Panics
//!
//! Metric registration uses `unwrap()` intentionally. Registration only
//! fails on duplicate metric names, a fatal configuration error that
//! should crash at startup rather than fail silently. These panics only
//! occur during static initialization, never at runtime.

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_histogram_vec, register_int_gauge, CounterVec, Encoder,
    HistogramVec, IntGauge, TextEncoder,
};

use crate::error::TelemetryResult;

/// Signal admission outcomes.
/// Labels: symbol, outcome (admitted/blocked/duplicate/invalid)
pub static SIGNALS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "sigex_signals_total",
        "Total signals received by admission outcome",
        &["symbol", "outcome"]
    )
    .unwrap()
});

/// Lifecycle transitions.
/// Labels: from, to
pub static TRANSITIONS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "sigex_transitions_total",
        "Total order lifecycle transitions",
        &["from", "to"]
    )
    .unwrap()
});

/// Currently active (non-terminal) tracked orders.
pub static ACTIVE_ORDERS: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(
        "sigex_active_orders",
        "Number of non-terminal tracked orders"
    )
    .unwrap()
});

/// Cleanup actions executed during signal admission.
/// Labels: kind (cancel_order/close_position)
pub static CLEANUP_ACTIONS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "sigex_cleanup_actions_total",
        "Total preemption cleanup actions executed",
        &["kind"]
    )
    .unwrap()
});

/// Staleness cancellations.
/// Labels: reason (target_breached/stop_breached/entry_deviation/vanished)
pub static STALE_CANCEL_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "sigex_stale_cancel_total",
        "Total pending entries cancelled as stale",
        &["reason"]
    )
    .unwrap()
});

/// Session-window cancellations.
/// Labels: window
pub static SESSION_CANCEL_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "sigex_session_cancel_total",
        "Total pending entries cancelled at session windows",
        &["window"]
    )
    .unwrap()
});

/// Break-even stop adjustments.
/// Labels: symbol
pub static BREAK_EVEN_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "sigex_break_even_total",
        "Total stops moved to break-even",
        &["symbol"]
    )
    .unwrap()
});

/// Exchange boundary errors.
/// Labels: operation, kind (rejected/transient/timeout)
pub static EXCHANGE_ERRORS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "sigex_exchange_errors_total",
        "Total exchange boundary errors",
        &["operation", "kind"]
    )
    .unwrap()
});

/// Reconciliation pass duration in milliseconds.
pub static POLL_DURATION_MS: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "sigex_poll_duration_ms",
        "Reconciliation pass duration in milliseconds",
        &["pass"],
        vec![1.0, 5.0, 10.0, 50.0, 100.0, 500.0, 1000.0, 5000.0, 10000.0]
    )
    .unwrap()
});

/// Encode every registered metric in Prometheus text exposition format.
pub fn render_metrics() -> TelemetryResult<String> {
    let encoder = TextEncoder::new();
    let families = prometheus::gather();
    let mut buf = Vec::new();
    encoder.encode(&families, &mut buf)?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

/// Metrics facade for easy access.
pub struct Metrics;

impl Metrics {
    /// Record a signal admission outcome.
    pub fn signal(symbol: &str, outcome: &str) {
        SIGNALS_TOTAL.with_label_values(&[symbol, outcome]).inc();
    }

    /// Record a lifecycle transition.
    pub fn transition(from: &str, to: &str) {
        TRANSITIONS_TOTAL.with_label_values(&[from, to]).inc();
    }

    /// Update the active order gauge.
    pub fn active_orders(count: i64) {
        ACTIVE_ORDERS.set(count);
    }

    /// Record a cleanup action.
    pub fn cleanup_action(kind: &str) {
        CLEANUP_ACTIONS_TOTAL.with_label_values(&[kind]).inc();
    }

    /// Record a staleness cancellation.
    pub fn stale_cancel(reason: &str) {
        STALE_CANCEL_TOTAL.with_label_values(&[reason]).inc();
    }

    /// Record a session-window cancellation.
    pub fn session_cancel(window: &str) {
        SESSION_CANCEL_TOTAL.with_label_values(&[window]).inc();
    }

    /// Record a break-even stop adjustment.
    pub fn break_even(symbol: &str) {
        BREAK_EVEN_TOTAL.with_label_values(&[symbol]).inc();
    }

    /// Record an exchange boundary error.
    pub fn exchange_error(operation: &str, kind: &str) {
        EXCHANGE_ERRORS_TOTAL
            .with_label_values(&[operation, kind])
            .inc();
    }

    /// Record a reconciliation pass duration.
    pub fn poll_duration(pass: &str, duration_ms: f64) {
        POLL_DURATION_MS
            .with_label_values(&[pass])
            .observe(duration_ms);
    }
}
