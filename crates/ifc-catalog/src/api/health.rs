use axum::extract::State;
use axum::response::{IntoResponse, Json};
use http::StatusCode;
use serde::Serialize;

use crate::api::state::AppState;

#[derive(Serialize)]
struct HealthBody {
    status: &'static str,
}

/// `GET /health` — liveness only. Per the non-disclosing form (spec §9 resolution),
/// the body is always `{"status": "ok"|"degraded"}`; never a DB version or other detail.
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    match state.db.ping().await {
        Ok(()) => (StatusCode::OK, Json(HealthBody { status: "ok" })),
        Err(err) => {
            tracing::warn!(error = %err, "health check: database ping failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(HealthBody { status: "degraded" }),
            )
        }
    }
}
