use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use std::time::Duration;
use tracing::debug;

use super::{StoreClient, StoreUnavailable};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

// Reply envelope of the command endpoint: {"result": ...} or {"error": "..."}
#[derive(Deserialize)]
struct CommandReply {
    #[serde(default)]
    result: Value,
    #[serde(default)]
    error: Option<String>,
}

/// Shared key-value service spoken to over HTTPS, one JSON command array per
/// request (`["INCR", "rl:1.2.3.4"]`), bearer-token authenticated.
pub struct RemoteStore {
    client: reqwest::Client,
    url: String,
    token: String,
}

impl RemoteStore {
    pub fn new(client: reqwest::Client, url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
            token: token.into(),
        }
    }

    async fn command(&self, args: Value) -> Result<Value, StoreUnavailable> {
        let res = self
            .client
            .post(&self.url)
            .bearer_auth(&self.token)
            .timeout(REQUEST_TIMEOUT)
            .json(&args)
            .send()
            .await
            .map_err(|e| StoreUnavailable::Transport(e.to_string()))?;

        let status = res.status();
        if !status.is_success() {
            return Err(StoreUnavailable::Status(status.as_u16()));
        }

        let reply: CommandReply = res
            .json()
            .await
            .map_err(|e| StoreUnavailable::Protocol(e.to_string()))?;

        if let Some(error) = reply.error {
            return Err(StoreUnavailable::Protocol(error));
        }
        debug!(command = %args, result = %reply.result, "store command");
        Ok(reply.result)
    }
}

#[async_trait]
impl StoreClient for RemoteStore {
    fn backend(&self) -> &'static str {
        "remote"
    }

    async fn increment(&self, key: &str) -> Result<i64, StoreUnavailable> {
        let result = self.command(json!(["INCR", key])).await?;
        result
            .as_i64()
            .ok_or_else(|| StoreUnavailable::Protocol(format!("INCR returned {result}")))
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<(), StoreUnavailable> {
        self.command(json!(["EXPIRE", key, ttl.as_secs(), "NX"])).await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreUnavailable> {
        match self.command(json!(["GET", key])).await? {
            Value::Null => Ok(None),
            Value::String(s) => Ok(Some(s)),
            other => Err(StoreUnavailable::Protocol(format!("GET returned {other}"))),
        }
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreUnavailable> {
        self.command(json!(["SET", key, value, "EX", ttl.as_secs()])).await?;
        Ok(())
    }
}
