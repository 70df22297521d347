use std::time::Duration;
use tracing::{debug, warn};

use crate::metrics::BURST_REJECTIONS;
use crate::store::Stores;

pub const BURST_CEILING: u32 = 10;
pub const BURST_WINDOW: Duration = Duration::from_secs(60);

// Fixed-window burst limiter - tracks requests per IP
#[derive(Clone)]
pub struct BurstLimiter {
    stores: Stores,
    ceiling: u32,
    window: Duration,
}

impl BurstLimiter {
    pub fn new(stores: Stores) -> Self {
        Self {
            stores,
            ceiling: BURST_CEILING,
            window: BURST_WINDOW,
        }
    }

    pub fn ceiling(&self) -> u32 {
        self.ceiling
    }

    // Count this request, then compare. The request that crosses the
    // ceiling is charged too.
    pub async fn check_and_count(&self, ip: &str) -> bool {
        let key = format!("rl:{ip}");
        let counted = self.stores.count_in_window(&key, self.window).await;

        if counted.count > i64::from(self.ceiling) {
            BURST_REJECTIONS.inc();
            warn!(ip, count = counted.count, degraded = counted.degraded, "burst limit exceeded");
            return false;
        }

        debug!(ip, count = counted.count, degraded = counted.degraded, "burst window");
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::store::{LocalStore, StoreClient, StoreUnavailable, testing::FlakyStore};
    use async_trait::async_trait;
    use chrono::{DateTime, TimeDelta};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    // Shared store that drops the next EXPIRE and serves everything else
    struct LosesOneExpiry {
        inner: LocalStore,
        lose_next: AtomicBool,
    }

    #[async_trait]
    impl StoreClient for LosesOneExpiry {
        fn backend(&self) -> &'static str {
            "remote"
        }

        async fn increment(&self, key: &str) -> Result<i64, StoreUnavailable> {
            self.inner.increment(key).await
        }

        async fn expire(&self, key: &str, ttl: Duration) -> Result<(), StoreUnavailable> {
            if self.lose_next.swap(false, Ordering::SeqCst) {
                return Err(StoreUnavailable::Transport("connection reset".to_string()));
            }
            self.inner.expire(key, ttl).await
        }

        async fn get(&self, key: &str) -> Result<Option<String>, StoreUnavailable> {
            self.inner.get(key).await
        }

        async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreUnavailable> {
            self.inner.set(key, value, ttl).await
        }
    }

    fn clock() -> Arc<ManualClock> {
        Arc::new(ManualClock::new(
            DateTime::parse_from_rfc3339("2026-01-28T10:00:00+00:00").unwrap(),
        ))
    }

    #[tokio::test]
    async fn only_the_request_over_the_ceiling_is_rejected() {
        let limiter = BurstLimiter::new(Stores::new(None, Arc::new(LocalStore::new(clock()))));

        for _ in 0..BURST_CEILING {
            assert!(limiter.check_and_count("1.2.3.4").await);
        }
        assert!(!limiter.check_and_count("1.2.3.4").await);

        // other IPs are unaffected
        assert!(limiter.check_and_count("5.6.7.8").await);
    }

    #[tokio::test]
    async fn rejected_requests_keep_counting() {
        let store = Arc::new(LocalStore::new(clock()));
        let limiter = BurstLimiter::new(Stores::new(None, store.clone()));

        for _ in 0..BURST_CEILING + 3 {
            limiter.check_and_count("1.2.3.4").await;
        }
        assert_eq!(store.get("rl:1.2.3.4").await.unwrap().as_deref(), Some("13"));
    }

    #[tokio::test]
    async fn window_rollover_resets_the_count() {
        let clock = clock();
        let local = Arc::new(LocalStore::new(clock.clone()));
        let limiter = BurstLimiter::new(Stores::new(None, local));

        for _ in 0..=BURST_CEILING {
            limiter.check_and_count("1.2.3.4").await;
        }
        assert!(!limiter.check_and_count("1.2.3.4").await);

        clock.advance(TimeDelta::seconds(60));
        assert!(limiter.check_and_count("1.2.3.4").await);
    }

    #[tokio::test]
    async fn outage_keeps_limiting_in_process() {
        let clock = clock();
        let shared = Arc::new(FlakyStore::new(Arc::new(LocalStore::new(clock.clone()))));
        let limiter = BurstLimiter::new(Stores::new(
            Some(shared.clone()),
            Arc::new(LocalStore::new(clock)),
        ));

        // 4 hits land remotely before the outage, the local count starts over
        for _ in 0..4 {
            assert!(limiter.check_and_count("1.2.3.4").await);
        }
        shared.set_down(true);
        for _ in 0..BURST_CEILING {
            assert!(limiter.check_and_count("1.2.3.4").await);
        }
        assert!(!limiter.check_and_count("1.2.3.4").await);
    }

    #[tokio::test]
    async fn lost_expiry_is_rearmed_by_the_next_hit() {
        let clock = clock();
        let shared = Arc::new(LosesOneExpiry {
            inner: LocalStore::new(clock.clone()),
            lose_next: AtomicBool::new(true),
        });
        let limiter = BurstLimiter::new(Stores::new(
            Some(shared.clone()),
            Arc::new(LocalStore::new(clock.clone())),
        ));

        for _ in 0..BURST_CEILING {
            assert!(limiter.check_and_count("1.2.3.4").await);
        }
        assert!(!limiter.check_and_count("1.2.3.4").await);
        assert!(!shared.lose_next.load(Ordering::SeqCst));

        clock.advance(TimeDelta::seconds(61));
        assert!(limiter.check_and_count("1.2.3.4").await);
        assert_eq!(shared.get("rl:1.2.3.4").await.unwrap().as_deref(), Some("1"));
    }
}
