//! Ops HTTP server.
//!
//! Inbound signals, the read-only state export, Prometheus metrics, and
//! the manual override surface. Handlers never mutate lifecycle state
//! directly; everything routes through the coordinator and monitor.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use sigex_core::{
    Direction, Position, Price, Priority, SessionTag, Signal, StrategyId, Symbol, TrackedOrder,
    TrackedOrderId,
};
use sigex_exchange::ExchangeClient;
use sigex_lifecycle::{Coordinator, LifecycleError};
use sigex_session::SessionMonitor;
use sigex_telemetry::render_metrics;

// ============================================================================
// State
// ============================================================================

pub struct OpsState<E: ExchangeClient + 'static> {
    pub coordinator: Arc<Coordinator<E>>,
    pub monitor: Arc<SessionMonitor<E>>,
}

impl<E: ExchangeClient + 'static> Clone for OpsState<E> {
    fn clone(&self) -> Self {
        Self {
            coordinator: Arc::clone(&self.coordinator),
            monitor: Arc::clone(&self.monitor),
        }
    }
}

/// Build the ops router.
pub fn router<E: ExchangeClient + 'static>(state: OpsState<E>) -> Router {
    Router::new()
        .route("/signal", post(post_signal))
        .route("/orders", get(get_orders))
        .route("/positions", get(get_positions))
        .route("/health", get(get_health))
        .route("/metrics", get(get_metrics))
        .route("/override/session/{window}", post(post_override_session))
        .route("/override/cleanup/{symbol}", post(post_override_cleanup))
        .route("/override/close/{id}", post(post_override_close))
        .with_state(state)
}

// ============================================================================
// Errors
// ============================================================================

/// Error envelope returned by every handler.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }

    fn conflict(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::CONFLICT,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

impl From<LifecycleError> for ApiError {
    fn from(e: LifecycleError) -> Self {
        let status = match &e {
            LifecycleError::Validation(_) => StatusCode::BAD_REQUEST,
            LifecycleError::ConflictBlocked(_)
            | LifecycleError::DuplicateSignal(_)
            | LifecycleError::StateInconsistency(_) => StatusCode::CONFLICT,
            LifecycleError::UnknownOrder(_) => StatusCode::NOT_FOUND,
            LifecycleError::Exchange(_) | LifecycleError::ProtectiveLegFailure { .. } => {
                StatusCode::BAD_GATEWAY
            }
            LifecycleError::StoreClosed => StatusCode::SERVICE_UNAVAILABLE,
        };
        Self {
            status,
            message: e.to_string(),
        }
    }
}

impl From<sigex_core::CoreError> for ApiError {
    fn from(e: sigex_core::CoreError) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: e.to_string(),
        }
    }
}

// ============================================================================
// Signals
// ============================================================================

/// Inbound signal payload.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignalRequest {
    pub symbol: String,
    pub direction: Direction,
    pub entry: Decimal,
    pub stop: Decimal,
    pub target: Decimal,
    #[serde(default)]
    pub priority: Option<u8>,
    #[serde(default)]
    pub strategy_id: Option<String>,
    #[serde(default)]
    pub session_tag: Option<String>,
}

impl SignalRequest {
    fn into_signal(self, arrival_ms: u64) -> Result<Signal, sigex_core::CoreError> {
        Signal::new(
            Symbol::normalize(&self.symbol)?,
            self.direction,
            Price::new(self.entry),
            Price::new(self.stop),
            Price::new(self.target),
            self.priority.map(Priority::new),
            self.strategy_id
                .map(StrategyId::new)
                .unwrap_or_default(),
            arrival_ms,
            self.session_tag.map(SessionTag::new),
        )
    }
}

async fn post_signal<E: ExchangeClient + 'static>(
    State(state): State<OpsState<E>>,
    Json(request): Json<SignalRequest>,
) -> Result<Json<TrackedOrder>, ApiError> {
    debug!(symbol = %request.symbol, direction = %request.direction, "Signal received");
    let arrival_ms = chrono::Utc::now().timestamp_millis() as u64;
    let signal = request.into_signal(arrival_ms)?;

    // Session-scoped signals are only accepted inside their window.
    if let Some(tag) = &signal.session {
        if state.monitor.session_open(tag, chrono::Utc::now()) == Some(false) {
            return Err(ApiError::conflict(format!(
                "session {} is closed",
                tag.as_str()
            )));
        }
    }

    let order = state.coordinator.admit(signal).await?;
    Ok(Json(order))
}

// ============================================================================
// State export
// ============================================================================

async fn get_orders<E: ExchangeClient + 'static>(
    State(state): State<OpsState<E>>,
) -> Json<Vec<TrackedOrder>> {
    let mut orders = state.coordinator.store().snapshot();
    orders.sort_by_key(|o| o.created_ms);
    Json(orders)
}

async fn get_positions<E: ExchangeClient + 'static>(
    State(state): State<OpsState<E>>,
) -> Json<Vec<Position>> {
    let orders = state.coordinator.store().snapshot();
    Json(Position::aggregate(&orders))
}

async fn get_health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok", "version": env!("CARGO_PKG_VERSION") }))
}

async fn get_metrics() -> Result<String, ApiError> {
    render_metrics().map_err(|e| ApiError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        message: e.to_string(),
    })
}

// ============================================================================
// Overrides
// ============================================================================

async fn post_override_session<E: ExchangeClient + 'static>(
    State(state): State<OpsState<E>>,
    Path(window): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    match state.monitor.trigger(&window).await {
        Some(affected) => Ok(Json(json!({ "window": window, "affected": affected }))),
        None => Err(ApiError::not_found(format!("unknown session window {window}"))),
    }
}

async fn post_override_cleanup<E: ExchangeClient + 'static>(
    State(state): State<OpsState<E>>,
    Path(symbol): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let symbol = Symbol::normalize(&symbol)?;
    let affected = state.coordinator.cleanup_symbol(&symbol).await?;
    Ok(Json(json!({ "symbol": symbol, "affected": affected })))
}

async fn post_override_close<E: ExchangeClient + 'static>(
    State(state): State<OpsState<E>>,
    Path(id): Path<String>,
) -> Result<Json<TrackedOrder>, ApiError> {
    let id = TrackedOrderId::from_string(id);
    let order = state.coordinator.close_manual(&id).await?;
    Ok(Json(order))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use sigex_core::LifecycleState;
    use sigex_exchange::PaperExchange;
    use sigex_lifecycle::{spawn_order_store, CoordinatorConfig};
    use sigex_session::SessionConfig;

    fn request(priority: u8) -> SignalRequest {
        SignalRequest {
            symbol: "btcusdt.p".to_string(),
            direction: Direction::Long,
            entry: dec!(110),
            stop: dec!(100),
            target: dec!(130),
            priority: Some(priority),
            strategy_id: Some("breakout".to_string()),
            session_tag: None,
        }
    }

    fn ops_state() -> OpsState<PaperExchange> {
        ops_state_with(SessionConfig::default())
    }

    fn ops_state_with(sessions: SessionConfig) -> OpsState<PaperExchange> {
        let (store, _join) = spawn_order_store(32);
        let exchange = Arc::new(PaperExchange::new());
        let coordinator = Arc::new(Coordinator::new(
            store,
            exchange,
            CoordinatorConfig::default(),
        ));
        let monitor = Arc::new(SessionMonitor::new(Arc::clone(&coordinator), sessions));
        OpsState {
            coordinator,
            monitor,
        }
    }

    #[tokio::test]
    async fn test_signal_admission_round_trip() {
        let state = ops_state();
        let Json(order) = post_signal(State(state.clone()), Json(request(1)))
            .await
            .unwrap();

        assert_eq!(order.symbol.as_str(), "BTCUSDT");
        assert_eq!(order.state, LifecycleState::PendingEntry);

        let Json(orders) = get_orders(State(state)).await;
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].id, order.id);
    }

    #[tokio::test]
    async fn test_blocked_signal_maps_to_conflict() {
        let state = ops_state();
        post_signal(State(state.clone()), Json(request(1)))
            .await
            .unwrap();

        let mut opposing = request(2);
        opposing.direction = Direction::Short;
        opposing.entry = dec!(110);
        opposing.stop = dec!(120);
        opposing.target = dec!(90);
        let err = post_signal(State(state), Json(opposing)).await.unwrap_err();
        assert_eq!(err.status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_invalid_payload_maps_to_bad_request() {
        let state = ops_state();
        let mut bad = request(1);
        bad.stop = dec!(120); // stop above entry on a long
        let err = post_signal(State(state), Json(bad)).await.unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_signal_outside_its_session_rejected() {
        use chrono::NaiveTime;
        use sigex_session::SessionWindow;

        // A zero-length window is never open.
        let noon = NaiveTime::from_hms_opt(12, 0, 0).unwrap();
        let state = ops_state_with(SessionConfig {
            windows: vec![SessionWindow {
                name: "lunch".to_string(),
                start: noon,
                end: noon,
                grace_secs: 300,
            }],
            ..SessionConfig::default()
        });

        let mut tagged = request(1);
        tagged.session_tag = Some("lunch".to_string());
        let err = post_signal(State(state.clone()), Json(tagged))
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::CONFLICT);

        // A tag matching no configured window is not session-gated.
        let mut untracked = request(1);
        untracked.session_tag = Some("overnight".to_string());
        let Json(order) = post_signal(State(state), Json(untracked)).await.unwrap();
        assert_eq!(order.state, LifecycleState::PendingEntry);
    }

    #[tokio::test]
    async fn test_unknown_session_override_is_not_found() {
        let state = ops_state();
        let err = post_override_session(State(state), Path("nope".to_string()))
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_close_override_unknown_order() {
        let state = ops_state();
        let err = post_override_close(State(state), Path("sig_missing".to_string()))
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_health_and_metrics() {
        let Json(health) = get_health().await;
        assert_eq!(health["status"], "ok");
        assert!(get_metrics().await.is_ok());
    }
}
