use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
};
use std::sync::Arc;
use tracing::error;

use super::client::ClientIp;
use crate::entitlement::Redemption;
use crate::models::{VerifyCodeRequest, VerifyCodeResponse};
use crate::state::AppState;

// Malformed, unknown and unconfigured codes all get the same answer.
// Store trouble gets its own answer, whatever the code.
const INVALID_CODE: &str = "Invalid code";

pub async fn verify_code_handler(
    State(state): State<Arc<AppState>>,
    ClientIp(ip): ClientIp,
    payload: Result<Json<VerifyCodeRequest>, JsonRejection>,
) -> (StatusCode, Json<VerifyCodeResponse>) {
    let code = match payload {
        Ok(Json(VerifyCodeRequest { code: Some(code) })) if !code.trim().is_empty() => code,
        _ => {
            return (
                StatusCode::BAD_REQUEST,
                Json(VerifyCodeResponse::invalid("Code is required")),
            );
        }
    };

    match state.entitlement.redeem(&code, &ip).await {
        Ok(Redemption::Granted { token }) => (
            StatusCode::OK,
            Json(VerifyCodeResponse {
                valid: true,
                message: "Valid code".to_string(),
                premium_token: Some(token),
            }),
        ),
        Ok(Redemption::Rejected) => (
            StatusCode::OK,
            Json(VerifyCodeResponse::invalid(INVALID_CODE)),
        ),
        Err(e) => {
            error!(error = %e, "premium code system unavailable");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(VerifyCodeResponse::invalid("Code system unavailable")),
            )
        }
    }
}
