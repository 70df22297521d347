use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    http::HeaderMap,
};
use std::sync::Arc;
use tracing::info;

use super::client::{ClientIp, PREMIUM_TOKEN_HEADER, TIER_HEADER, header_str};
use crate::error::GatewayError;
use crate::gate::Remaining;
use crate::metrics::REQUEST_TOTAL;
use crate::models::{GenerateRequest, GenerateResponse};
use crate::state::AppState;
use crate::usage::Tier;

pub async fn generate_handler(
    State(state): State<Arc<AppState>>,
    ClientIp(ip): ClientIp,
    headers: HeaderMap,
    payload: Result<Json<GenerateRequest>, JsonRejection>,
) -> Result<Json<GenerateResponse>, GatewayError> {
    REQUEST_TOTAL.inc();

    let tier = Tier::from_claim(header_str(&headers, TIER_HEADER));
    let token = header_str(&headers, PREMIUM_TOKEN_HEADER);

    // Every request counts against the burst window, well-formed or not
    if let Some(denied) = state.gate.burst_denial(&ip, tier).await {
        return Err(GatewayError::RateLimited {
            limit: denied.limit.unwrap_or(0),
        });
    }

    if !state.upstream.is_configured() {
        return Err(GatewayError::Configuration(
            "generation service credential is missing".to_string(),
        ));
    }

    let Json(payload) = payload.map_err(|e| {
        GatewayError::Validation(format!("Invalid request body: {}", e.body_text()))
    })?;
    let messages = payload.into_messages()?;

    if state.require_premium && (tier != Tier::Premium || token.is_none()) {
        return Err(GatewayError::Authorization(
            "Premium access is required".to_string(),
        ));
    }

    let decision = state.gate.charge(&ip, tier, token).await;
    if !decision.allowed {
        return Err(GatewayError::QuotaExceeded {
            limit: decision.limit.unwrap_or(0),
        });
    }

    // Usage is already charged at this point; a failed generation keeps the charge.
    let text = state.upstream.generate(&messages).await?;

    let remaining = match decision.remaining {
        Remaining::Limited(n) => Some(n),
        Remaining::Unbounded => None,
    };
    info!(%ip, tier = decision.tier.as_str(), ?remaining, "generation served");

    Ok(Json(GenerateResponse { text, remaining }))
}
