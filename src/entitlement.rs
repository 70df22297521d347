//! Premium activation codes and the tokens they are redeemed for.
//!
//! A token is only as good as its record in the shared store: validation is a
//! lookup, never a recomputation. When the shared store cannot be reached,
//! validation fails closed.

use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::clock::Clock;
use crate::metrics::REDEMPTIONS;
use crate::store::{StoreClient, StoreUnavailable};

pub const TOKEN_TTL: Duration = Duration::from_secs(365 * 24 * 60 * 60);

// Read before a code is looked at. Not token-shaped, so never a real record.
const REACHABILITY_KEY: &str = "premium:reachability";

lazy_static! {
    static ref CODE_FORMAT: Regex = Regex::new(r"^PL-[A-Z0-9]{2,20}$").unwrap();
}

/// What the shared store keeps under `premium:{token}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PremiumRecord {
    pub code: String,
    pub ip: String,
    pub activated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Redemption {
    Granted { token: String },
    // Deliberately carries no reason
    Rejected,
}

/// Trimmed, upper-cased code if it has the activation-code shape.
pub fn normalize_code(code: &str) -> Option<String> {
    let code = code.trim().to_uppercase();
    CODE_FORMAT.is_match(&code).then_some(code)
}

// Comma-separated list as found in configuration
pub fn parse_code_list(raw: &str) -> HashSet<String> {
    raw.split(',')
        .map(|c| c.trim().to_uppercase())
        .filter(|c| !c.is_empty())
        .collect()
}

// Issued tokens are sha-256 hex digests
fn looks_like_token(token: &str) -> bool {
    token.len() == 64 && token.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}

fn token_key(token: &str) -> String {
    format!("premium:{token}")
}

pub struct EntitlementService {
    store: Option<Arc<dyn StoreClient>>,
    codes: HashSet<String>,
    secret: Option<String>,
    clock: Arc<dyn Clock>,
}

impl EntitlementService {
    pub fn new(
        store: Option<Arc<dyn StoreClient>>,
        codes: HashSet<String>,
        secret: Option<String>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        if codes.is_empty() {
            warn!("no premium codes configured, every redemption will be rejected");
        }
        if store.is_none() {
            warn!("no shared store configured, premium tokens can be neither issued nor validated");
        }
        Self {
            store,
            codes,
            secret,
            clock,
        }
    }

    /// Store trouble is reported before the code is examined, so a missing or
    /// unreachable store answers every code alike.
    pub async fn redeem(&self, code: &str, ip: &str) -> Result<Redemption, StoreUnavailable> {
        let store = self.store.as_ref().ok_or(StoreUnavailable::NotConfigured)?;
        store.get(REACHABILITY_KEY).await?;

        let Some(code) = normalize_code(code) else {
            debug!(ip, "malformed activation code");
            return Ok(Redemption::Rejected);
        };
        if self.codes.is_empty() {
            error!("premium code list is not configured");
            return Ok(Redemption::Rejected);
        }
        if !self.codes.contains(&code) {
            debug!(ip, "unknown activation code");
            return Ok(Redemption::Rejected);
        }
        let Some(secret) = self.secret.as_deref() else {
            error!("premium token secret is not configured");
            return Ok(Redemption::Rejected);
        };

        let activated_at = self.clock.now().with_timezone(&Utc);
        let token = mint_token(&code, ip, activated_at, secret);
        let record = PremiumRecord {
            code,
            ip: ip.to_string(),
            activated_at,
        };
        let value = serde_json::to_string(&record)
            .map_err(|e| StoreUnavailable::Protocol(e.to_string()))?;

        store.set(&token_key(&token), &value, TOKEN_TTL).await?;

        REDEMPTIONS.inc();
        info!(ip, "premium code redeemed");
        Ok(Redemption::Granted { token })
    }

    // Present and unexpired in the shared store, nothing else counts
    pub async fn validate(&self, token: &str) -> bool {
        if !looks_like_token(token) {
            debug!("premium token has the wrong shape");
            return false;
        }
        let Some(store) = &self.store else {
            return false;
        };

        match store.get(&token_key(token)).await {
            Ok(Some(record)) => {
                if let Ok(record) = serde_json::from_str::<PremiumRecord>(&record) {
                    debug!(activated_at = %record.activated_at, "premium token confirmed");
                }
                true
            }
            Ok(None) => {
                warn!("unknown or expired premium token");
                false
            }
            Err(e) => {
                warn!(error = %e, "shared store unavailable, premium token not honoured");
                false
            }
        }
    }
}

// Unpredictable without the secret; the random nonce keeps two redemptions
// of the same code in the same millisecond apart
fn mint_token(code: &str, ip: &str, at: DateTime<Utc>, secret: &str) -> String {
    let nonce: u128 = rand::random();
    let mut hasher = Sha256::new();
    hasher.update(code);
    hasher.update(":");
    hasher.update(ip);
    hasher.update(":");
    hasher.update(at.timestamp_millis().to_string());
    hasher.update(":");
    hasher.update(format!("{nonce:032x}"));
    hasher.update(":");
    hasher.update(secret);
    format!("{:x}", hasher.finalize())
}
