use std::time::{Duration, Instant};
use tracing::error;

use crate::error::GatewayError;
use crate::metrics::{UPSTREAM_FAILURES, UPSTREAM_LATENCY};
use crate::models::{Message, UpstreamRequest, UpstreamResponse};

const API_VERSION: &str = "2023-06-01";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

// Client for the paid generation service
pub struct UpstreamClient {
    client: reqwest::Client,
    url: String,
    model: String,
    max_tokens: u32,
    api_key: Option<String>,
}

impl UpstreamClient {
    pub fn new(
        client: reqwest::Client,
        url: String,
        model: String,
        max_tokens: u32,
        api_key: Option<String>,
    ) -> Self {
        Self {
            client,
            url,
            model,
            max_tokens,
            api_key: api_key.filter(|k| !k.trim().is_empty()),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    // Returns the first text block. Upstream error bodies are logged, never returned.
    pub async fn generate(&self, messages: &[Message]) -> Result<String, GatewayError> {
        let api_key = self.api_key.as_deref().ok_or_else(|| {
            GatewayError::Configuration("ANTHROPIC_API_KEY is not configured".to_string())
        })?;

        let start_time = Instant::now();
        let result = self
            .client
            .post(&self.url)
            .header("x-api-key", api_key)
            .header("anthropic-version", API_VERSION)
            .timeout(REQUEST_TIMEOUT)
            .json(&UpstreamRequest {
                model: &self.model,
                max_tokens: self.max_tokens,
                messages,
            })
            .send()
            .await;
        UPSTREAM_LATENCY.observe(start_time.elapsed().as_secs_f64());

        let res = result.map_err(|e| fail(format!("request failed: {e}")))?;

        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            return Err(fail(format!("status {status}: {body}")));
        }

        let body: UpstreamResponse = res
            .json()
            .await
            .map_err(|e| fail(format!("parse error: {e}")))?;

        Ok(body
            .content
            .into_iter()
            .next()
            .and_then(|block| block.text)
            .unwrap_or_default())
    }
}

fn fail(detail: String) -> GatewayError {
    UPSTREAM_FAILURES.inc();
    error!(%detail, "generation service error");
    GatewayError::Upstream(detail)
}
