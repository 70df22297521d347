mod client;
mod generate;
mod health;
mod metrics;
mod verify_code;

pub use client::{ClientIp, PREMIUM_TOKEN_HEADER, TIER_HEADER};
pub use generate::generate_handler;
pub use health::health_handler;
pub use metrics::metrics_handler;
pub use verify_code::verify_code_handler;

use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;

use crate::state::AppState;

// creating the router with routes
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .route("/api/generate", post(generate_handler))
        .route("/api/verify-code", post(verify_code_handler))
        .with_state(state)
}
