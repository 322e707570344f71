use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::atomic::AtomicU64;
use std::sync::Arc;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

use super::handlers;
use super::middleware::{idempotency_middleware, IdempotencyLayerState};
use crate::idempotency::IdempotentProvider;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub provider: Arc<IdempotentProvider>,
    pub executions: Arc<AtomicU64>,
    pub metrics_handle: Option<PrometheusHandle>,
}

impl AppState {
    pub fn new(provider: Arc<IdempotentProvider>) -> Self {
        Self {
            provider,
            executions: Arc::new(AtomicU64::new(0)),
            metrics_handle: None,
        }
    }

    /// Adds metrics handle to the state.
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics_handle = Some(handle);
        self
    }
}

/// Creates the main API router with all routes.
///
/// Only the side-effecting routes sit behind the idempotency middleware.
pub fn create_router(state: AppState) -> Router {
    let idempotency = IdempotencyLayerState::new(state.provider.clone());

    let guarded = Router::new()
        .route("/operations", post(handlers::create_operation))
        .route_layer(middleware::from_fn_with_state(idempotency, idempotency_middleware));

    Router::new()
        .route("/live", get(handlers::liveness_check))
        .route("/metrics", get(handlers::metrics_endpoint))
        .route("/idempotency/stats", get(handlers::idempotency_stats))
        .merge(guarded)
        .with_state(state)
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
}
