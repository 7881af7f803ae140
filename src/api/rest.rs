// =============================================================================
// REST API Endpoints — Axum 0.7
// =============================================================================
//
// Thin transport stub over the library contract. All endpoints live under
// `/api/v1/` except the Prometheus exposition at `/metrics`. The decision
// core never depends on this layer; handlers delegate to AppState and
// serialise the results.
//
// CORS is configured permissively for development; tighten `allowed_origins`
// in production.
// =============================================================================

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use tower_http::cors::{Any, CorsLayer};

use crate::app_state::AppState;
use crate::error::DecisionError;

// =============================================================================
// Router construction
// =============================================================================

/// Build the full REST API router with CORS middleware and shared state.
pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // ── Decision path ───────────────────────────────────────────
        .route("/api/v1/decide", post(decide))
        // ── Probes ──────────────────────────────────────────────────
        .route("/api/v1/health", get(health))
        .route("/api/v1/ready", get(ready))
        // ── Introspection ───────────────────────────────────────────
        .route("/api/v1/state", get(full_state))
        .route("/api/v1/decisions", get(decisions))
        .route("/api/v1/rules", get(rule_statistics))
        .route("/api/v1/patterns", get(pattern_statistics))
        // ── Metrics exposition ──────────────────────────────────────
        .route("/metrics", get(metrics))
        // ── Middleware & State ──────────────────────────────────────
        .layer(cors)
        .with_state(state)
}

// =============================================================================
// Decision
// =============================================================================

async fn decide(State(state): State<Arc<AppState>>, body: String) -> impl IntoResponse {
    match state.process_decision(&body) {
        Ok(response) => (StatusCode::OK, Json(serde_json::json!(response))),
        Err(e) => {
            let status = match &e {
                DecisionError::InvalidRequest { .. } | DecisionError::InvalidDocument { .. } => {
                    StatusCode::BAD_REQUEST
                }
                DecisionError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            };
            let body = serde_json::json!({
                "error": e.kind().as_str(),
                "message": e.to_string(),
            });
            (status, Json(body))
        }
    }
}

// =============================================================================
// Probes
// =============================================================================

async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let report = state.health();
    let status = if report.status == "healthy" {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(report))
}

async fn ready(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let report = state.ready();
    let status = if report.status == "ready" {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(report))
}

// =============================================================================
// Introspection
// =============================================================================

async fn full_state(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.build_snapshot())
}

async fn decisions(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let decisions = state.recent_decisions.read().clone();
    Json(decisions)
}

async fn rule_statistics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.rules.get_rule_statistics())
}

async fn pattern_statistics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.patterns.statistics())
}

// =============================================================================
// Metrics
// =============================================================================

async fn metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    state.metrics.gather()
}
