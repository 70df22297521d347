//! Key-value store clients used for quota and entitlement state.
//!
//! Two backends implement [`StoreClient`]:
//!
//! - [`RemoteStore`] - shared key-value service reached over HTTPS, one
//!   command per logical operation. Its `INCR` is the only primitive that is
//!   atomic across gateway instances.
//! - [`LocalStore`] - process-local maps behind a single mutex. Used when no
//!   remote credentials are configured and as the per-operation fallback when
//!   the remote store is unreachable.
//!
//! Key layout:
//!
//! ```text
//! rl:{ip}                         -> burst counter (60s TTL)
//! usage:week:{YYYY-MM-DD}:{ip}    -> weekly usage counter (TTL to next Monday + 1 day)
//! premium:{token}                 -> PremiumRecord JSON (365 day TTL)
//! ```

mod local;
mod remote;

pub use local::LocalStore;
pub use remote::RemoteStore;

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use crate::metrics::STORE_FALLBACKS;

/// Every transport or protocol failure collapses into this at the store boundary.
/// Callers treat it as "retry locally" (counters) or "deny" (entitlements).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreUnavailable {
    #[error("store is not configured")]
    NotConfigured,
    #[error("transport error: {0}")]
    Transport(String),
    #[error("store answered with status {0}")]
    Status(u16),
    #[error("unexpected reply: {0}")]
    Protocol(String),
}

#[async_trait]
pub trait StoreClient: Send + Sync {
    /// Short backend name for logs and health output.
    fn backend(&self) -> &'static str;

    /// Atomically add one to `key`, creating it at 1 if absent.
    async fn increment(&self, key: &str) -> Result<i64, StoreUnavailable>;

    /// Set a time-to-live on an existing key that has none yet. Missing keys
    /// and keys already counting down are left alone (`EXPIRE .. NX`).
    async fn expire(&self, key: &str, ttl: Duration) -> Result<(), StoreUnavailable>;

    async fn get(&self, key: &str) -> Result<Option<String>, StoreUnavailable>;

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreUnavailable>;
}

// Outcome of a windowed increment, with the backend that actually counted it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Counted {
    pub count: i64,
    pub degraded: bool,
}

/// Shared store (if configured) plus the process-local fallback.
#[derive(Clone)]
pub struct Stores {
    shared: Option<Arc<dyn StoreClient>>,
    local: Arc<LocalStore>,
}

impl Stores {
    pub fn new(shared: Option<Arc<dyn StoreClient>>, local: Arc<LocalStore>) -> Self {
        Self { shared, local }
    }

    pub fn shared(&self) -> Option<&Arc<dyn StoreClient>> {
        self.shared.as_ref()
    }

    pub fn local(&self) -> &Arc<LocalStore> {
        &self.local
    }

    pub fn backend(&self) -> &'static str {
        match &self.shared {
            Some(store) => store.backend(),
            None => self.local.backend(),
        }
    }

    /// Increment a fixed-window counter and make sure its TTL is armed.
    /// Falls back to the local store when the shared one is unavailable.
    pub async fn count_in_window(&self, key: &str, ttl: Duration) -> Counted {
        if let Some(shared) = &self.shared {
            match count_on(shared.as_ref(), key, ttl).await {
                Ok(count) => {
                    return Counted {
                        count,
                        degraded: false,
                    };
                }
                Err(e) => {
                    STORE_FALLBACKS.inc();
                    warn!(key, error = %e, "shared store unavailable, counting locally");
                }
            }
        }

        // the local store never fails
        let count = count_on(self.local.as_ref(), key, ttl).await.unwrap_or(1);
        Counted {
            count,
            degraded: self.shared.is_some(),
        }
    }
}

async fn count_on(
    store: &dyn StoreClient,
    key: &str,
    ttl: Duration,
) -> Result<i64, StoreUnavailable> {
    let count = store.increment(key).await?;
    // Sent on every hit: a window whose first EXPIRE was lost gets its TTL on
    // the next increment, a running window keeps its deadline.
    if let Err(e) = store.expire(key, ttl).await {
        warn!(key, count, error = %e, backend = store.backend(), "failed to arm counter expiry");
    }
    Ok(count)
}


#[cfg(test)]
mod tests {
    use super::testing::FlakyStore;
    use super::*;
    use crate::clock::ManualClock;
    use chrono::DateTime;

    fn clock() -> Arc<ManualClock> {
        Arc::new(ManualClock::new(
            DateTime::parse_from_rfc3339("2026-01-28T10:00:00+00:00").unwrap(),
        ))
    }

    #[tokio::test]
    async fn counts_on_shared_store_when_healthy() {
        let clock = clock();
        let remote = Arc::new(LocalStore::new(clock.clone()));
        let local = Arc::new(LocalStore::new(clock));
        let stores = Stores::new(Some(remote.clone()), local.clone());

        let first = stores.count_in_window("rl:1.2.3.4", Duration::from_secs(60)).await;
        let second = stores.count_in_window("rl:1.2.3.4", Duration::from_secs(60)).await;

        assert_eq!(first, Counted { count: 1, degraded: false });
        assert_eq!(second.count, 2);
        assert_eq!(remote.get("rl:1.2.3.4").await.unwrap().as_deref(), Some("2"));
        assert_eq!(local.get("rl:1.2.3.4").await.unwrap(), None);
    }

    #[tokio::test]
    async fn falls_back_to_local_during_outage() {
        let clock = clock();
        let flaky = Arc::new(FlakyStore::new(Arc::new(LocalStore::new(clock.clone()))));
        let local = Arc::new(LocalStore::new(clock));
        let stores = Stores::new(Some(flaky.clone()), local.clone());

        flaky.set_down(true);
        let counted = stores.count_in_window("rl:1.2.3.4", Duration::from_secs(60)).await;

        assert_eq!(counted, Counted { count: 1, degraded: true });
        assert_eq!(local.get("rl:1.2.3.4").await.unwrap().as_deref(), Some("1"));
    }

    #[tokio::test]
    async fn local_only_is_not_reported_as_degraded() {
        let stores = Stores::new(None, Arc::new(LocalStore::new(clock())));
        let counted = stores.count_in_window("rl:1.2.3.4", Duration::from_secs(60)).await;
        assert_eq!(counted, Counted { count: 1, degraded: false });
        assert_eq!(stores.backend(), "local");
    }
}
