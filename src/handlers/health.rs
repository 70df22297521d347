use axum::{Json, extract::State, response::IntoResponse};
use std::sync::Arc;

use crate::state::AppState;

// health handler, reports which store backend enforces quotas
pub async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "store": state.stores.backend(),
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}
