use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

/// Failures a generation request can end in. Upstream and configuration
/// details stay in the log; the caller only ever sees `public_message`.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("invalid request: {0}")]
    Validation(String),
    #[error("unauthorized: {0}")]
    Authorization(String),
    #[error("too many requests, burst ceiling {limit}")]
    RateLimited { limit: u32 },
    #[error("weekly quota of {limit} exhausted")]
    QuotaExceeded { limit: u32 },
    #[error("upstream failure: {0}")]
    Upstream(String),
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    remaining: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    limit: Option<u32>,
}

impl GatewayError {
    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::Configuration(_) => StatusCode::INTERNAL_SERVER_ERROR,
            GatewayError::Validation(_) => StatusCode::BAD_REQUEST,
            GatewayError::Authorization(_) => StatusCode::FORBIDDEN,
            GatewayError::RateLimited { .. } | GatewayError::QuotaExceeded { .. } => {
                StatusCode::TOO_MANY_REQUESTS
            }
            GatewayError::Upstream(_) => StatusCode::BAD_GATEWAY,
        }
    }

    pub fn public_message(&self) -> String {
        match self {
            GatewayError::Configuration(_) => "Service unavailable".to_string(),
            GatewayError::Validation(msg) | GatewayError::Authorization(msg) => msg.clone(),
            GatewayError::RateLimited { .. } => {
                "Too many requests. Try again in a minute.".to_string()
            }
            GatewayError::QuotaExceeded { .. } => {
                "You have reached your weekly generation limit.".to_string()
            }
            GatewayError::Upstream(_) => "Error generating content".to_string(),
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let (remaining, limit) = match &self {
            GatewayError::RateLimited { limit } | GatewayError::QuotaExceeded { limit } => {
                (Some(0), Some(*limit))
            }
            _ => (None, None),
        };
        let body = ErrorBody {
            error: self.public_message(),
            remaining,
            limit,
        };
        (self.status(), Json(body)).into_response()
    }
}
