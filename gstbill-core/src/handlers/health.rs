use axum::{extract::State, http::StatusCode, Json};
use serde_json::{json, Value};

use crate::app::AppState;

/// Liveness check. Never touches the database.
pub async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Readiness check: `503` while Postgres is unreachable.
pub async fn db_health_check(State(state): State<AppState>) -> Result<Json<Value>, StatusCode> {
    if let Err(e) = sqlx::query_scalar::<_, i32>("SELECT 1").fetch_one(&state.db).await {
        tracing::error!("Readiness check failed: {}", e);
        return Err(StatusCode::SERVICE_UNAVAILABLE);
    }

    Ok(Json(json!({
        "status": "ok",
        "database": "connected",
        "pool_size": state.db.size(),
        "idle_connections": state.db.num_idle()
    })))
}
