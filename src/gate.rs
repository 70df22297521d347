use std::sync::Arc;
use tracing::debug;

use crate::entitlement::EntitlementService;
use crate::metrics::PREMIUM_GRANTS;
use crate::rate_limit::BurstLimiter;
use crate::usage::{Tier, UsageTracker};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Remaining {
    Unbounded,
    Limited(u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Denial {
    Burst,
    Weekly,
}

/// Allow/deny for one request. Never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaDecision {
    pub allowed: bool,
    pub remaining: Remaining,
    pub limit: Option<u32>,
    // tier the request was actually charged as
    pub tier: Tier,
    pub denial: Option<Denial>,
}

/// Burst limiter, then entitlement, then weekly quota.
#[derive(Clone)]
pub struct QuotaGate {
    burst: BurstLimiter,
    usage: UsageTracker,
    entitlement: Arc<EntitlementService>,
}

impl QuotaGate {
    pub fn new(
        burst: BurstLimiter,
        usage: UsageTracker,
        entitlement: Arc<EntitlementService>,
    ) -> Self {
        Self {
            burst,
            usage,
            entitlement,
        }
    }

    pub async fn decide(&self, ip: &str, claimed: Tier, token: Option<&str>) -> QuotaDecision {
        if let Some(denied) = self.burst_denial(ip, claimed).await {
            return denied;
        }
        self.charge(ip, claimed, token).await
    }

    /// Burst step on its own, so callers can run it before anything else
    /// about the request is looked at.
    pub async fn burst_denial(&self, ip: &str, claimed: Tier) -> Option<QuotaDecision> {
        if self.burst.check_and_count(ip).await {
            return None;
        }
        Some(QuotaDecision {
            allowed: false,
            remaining: Remaining::Limited(0),
            limit: Some(self.burst.ceiling()),
            tier: claimed,
            denial: Some(Denial::Burst),
        })
    }

    /// Entitlement then weekly quota, for a request already past the burst step.
    pub async fn charge(&self, ip: &str, claimed: Tier, token: Option<&str>) -> QuotaDecision {
        // The claimed tier is untrusted. Premium treatment needs a token the
        // shared store confirms; anything short of that is charged as anonymous.
        if claimed == Tier::Premium {
            if let Some(token) = token {
                if self.entitlement.validate(token).await {
                    PREMIUM_GRANTS.inc();
                    debug!(ip, "premium entitlement confirmed");
                    return QuotaDecision {
                        allowed: true,
                        remaining: Remaining::Unbounded,
                        limit: None,
                        tier: Tier::Premium,
                        denial: None,
                    };
                }
            }
        }
        let tier = match claimed {
            Tier::Premium => Tier::Anonymous,
            other => other,
        };

        let usage = self.usage.check_and_increment(ip, tier).await;
        QuotaDecision {
            allowed: usage.allowed,
            remaining: Remaining::Limited(usage.remaining),
            limit: Some(usage.limit),
            tier,
            denial: (!usage.allowed).then_some(Denial::Weekly),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::entitlement::{Redemption, parse_code_list};
    use crate::rate_limit::BURST_CEILING;
    use crate::store::{LocalStore, StoreClient, Stores, testing::FlakyStore};
    use chrono::{DateTime, TimeDelta};

    struct Harness {
        clock: Arc<ManualClock>,
        shared: Arc<FlakyStore>,
        entitlement: Arc<EntitlementService>,
        gate: QuotaGate,
    }

    fn harness() -> Harness {
        let clock = Arc::new(ManualClock::new(
            DateTime::parse_from_rfc3339("2026-01-28T10:00:00+00:00").unwrap(),
        ));
        let shared = Arc::new(FlakyStore::new(Arc::new(LocalStore::new(clock.clone()))));
        let shared_dyn: Arc<dyn StoreClient> = shared.clone();
        let stores = Stores::new(
            Some(shared_dyn.clone()),
            Arc::new(LocalStore::new(clock.clone())),
        );
        let entitlement = Arc::new(EntitlementService::new(
            Some(shared_dyn),
            parse_code_list("PL-GOLD01"),
            Some("secret".to_string()),
            clock.clone(),
        ));
        let gate = QuotaGate::new(
            BurstLimiter::new(stores.clone()),
            UsageTracker::new(stores, clock.clone()),
            entitlement.clone(),
        );
        Harness {
            clock,
            shared,
            entitlement,
            gate,
        }
    }

    async fn token(h: &Harness) -> String {
        match h.entitlement.redeem("PL-GOLD01", "9.9.9.9").await.unwrap() {
            Redemption::Granted { token } => token,
            Redemption::Rejected => panic!("code should redeem"),
        }
    }

    // keep the burst window out of the way of quota assertions
    fn next_minute(h: &Harness) {
        h.clock.advance(TimeDelta::seconds(61));
    }

    #[tokio::test]
    async fn anonymous_end_to_end() {
        let h = harness();
        for expected in (0..10).rev() {
            let d = h.gate.decide("1.2.3.4", Tier::Anonymous, None).await;
            assert!(d.allowed);
            assert_eq!(d.remaining, Remaining::Limited(expected));
            assert_eq!(d.limit, Some(10));
            next_minute(&h);
        }
        let d = h.gate.decide("1.2.3.4", Tier::Anonymous, None).await;
        assert_eq!(
            d,
            QuotaDecision {
                allowed: false,
                remaining: Remaining::Limited(0),
                limit: Some(10),
                tier: Tier::Anonymous,
                denial: Some(Denial::Weekly),
            }
        );
    }

    #[tokio::test]
    async fn burst_rejects_before_anything_else() {
        let h = harness();
        let token = token(&h).await;
        for _ in 0..BURST_CEILING {
            assert!(h.gate.decide("1.2.3.4", Tier::Premium, Some(&token)).await.allowed);
        }
        let d = h.gate.decide("1.2.3.4", Tier::Premium, Some(&token)).await;
        assert!(!d.allowed);
        assert_eq!(d.denial, Some(Denial::Burst));
        assert_eq!(d.limit, Some(BURST_CEILING));
    }

    #[tokio::test]
    async fn validated_premium_is_unbounded_and_uncharged() {
        let h = harness();
        let token = token(&h).await;
        for _ in 0..20 {
            let d = h.gate.decide("1.2.3.4", Tier::Premium, Some(&token)).await;
            assert_eq!(d.remaining, Remaining::Unbounded);
            assert_eq!(d.tier, Tier::Premium);
            next_minute(&h);
        }
        // no weekly usage accrued
        let d = h.gate.decide("1.2.3.4", Tier::Anonymous, None).await;
        assert_eq!(d.remaining, Remaining::Limited(9));
    }

    #[tokio::test]
    async fn premium_claim_without_valid_token_is_anonymous() {
        let h = harness();
        let d = h.gate.decide("1.2.3.4", Tier::Premium, None).await;
        assert_eq!(
            (d.tier, d.remaining, d.limit),
            (Tier::Anonymous, Remaining::Limited(9), Some(10))
        );

        next_minute(&h);
        let forged = "f".repeat(64);
        let d = h.gate.decide("1.2.3.4", Tier::Premium, Some(&forged)).await;
        assert_eq!((d.tier, d.remaining), (Tier::Anonymous, Remaining::Limited(8)));
    }

    #[tokio::test]
    async fn token_on_a_non_premium_claim_grants_nothing() {
        let h = harness();
        let token = token(&h).await;
        let d = h.gate.decide("1.2.3.4", Tier::Registered, Some(&token)).await;
        assert_eq!(
            (d.tier, d.remaining, d.limit),
            (Tier::Registered, Remaining::Limited(14), Some(15))
        );
    }

    #[tokio::test]
    async fn outage_downgrades_premium_to_local_anonymous_quota() {
        let h = harness();
        let token = token(&h).await;
        h.shared.set_down(true);

        for expected in (0..10).rev() {
            let d = h.gate.decide("1.2.3.4", Tier::Premium, Some(&token)).await;
            assert!(d.allowed);
            assert_eq!(
                (d.tier, d.remaining),
                (Tier::Anonymous, Remaining::Limited(expected))
            );
            next_minute(&h);
        }
        let d = h.gate.decide("1.2.3.4", Tier::Premium, Some(&token)).await;
        assert_eq!(d.denial, Some(Denial::Weekly));

        h.shared.set_down(false);
        next_minute(&h);
        assert_eq!(
            h.gate.decide("1.2.3.4", Tier::Premium, Some(&token)).await.remaining,
            Remaining::Unbounded
        );
    }

    #[tokio::test]
    async fn burst_step_alone_leaves_weekly_usage_untouched() {
        let h = harness();
        for _ in 0..BURST_CEILING {
            assert_eq!(h.gate.burst_denial("1.2.3.4", Tier::Anonymous).await, None);
        }
        let denied = h.gate.burst_denial("1.2.3.4", Tier::Anonymous).await;
        assert_eq!(denied.and_then(|d| d.denial), Some(Denial::Burst));

        let d = h.gate.charge("1.2.3.4", Tier::Anonymous, None).await;
        assert_eq!(d.remaining, Remaining::Limited(9));
    }
}
