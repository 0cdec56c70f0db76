// src/routes/health.rs
//! Liveness endpoint for the soilhealth backend.
//!
//! Follows the Explicit Module Boundary Pattern (EMBP): the handler and its
//! response type stay private, and the gateway (`mod.rs`) only sees the
//! subrouter returned by [`router`].

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

use super::AppState;

/// JSON response body for the `/health` endpoint.
#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    store: String,
}

/// Handle `GET /health`.
///
/// Reports which store backend is active. Does not touch the store itself
/// or the geocoder.
async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        store: state.config.store_backend.to_string(),
    })
}

/// Create a subrouter containing the `/health` route.
pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health))
}
