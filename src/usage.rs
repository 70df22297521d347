use chrono::{DateTime, Datelike, Days, FixedOffset, NaiveDate, NaiveTime};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::clock::Clock;
use crate::metrics::WEEKLY_REJECTIONS;
use crate::store::Stores;

pub const ANONYMOUS_WEEKLY_LIMIT: u32 = 10;
pub const REGISTERED_WEEKLY_LIMIT: u32 = 15;

// Extra lifetime on weekly counters past the Monday boundary
const EXPIRY_BUFFER: Duration = Duration::from_secs(24 * 60 * 60);

/// Caller classification, as claimed by the client. Only the quota gate may
/// turn a premium claim into premium treatment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tier {
    Anonymous,
    Registered,
    Premium,
}

impl Tier {
    // Unknown or missing claims are anonymous
    pub fn from_claim(claim: Option<&str>) -> Self {
        match claim.map(str::trim) {
            Some("registered") => Tier::Registered,
            Some("premium") => Tier::Premium,
            _ => Tier::Anonymous,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Tier::Anonymous => "anonymous",
            Tier::Registered => "registered",
            Tier::Premium => "premium",
        }
    }

    // Unverified premium claims are charged like anonymous callers
    pub fn weekly_limit(self) -> u32 {
        match self {
            Tier::Registered => REGISTERED_WEEKLY_LIMIT,
            Tier::Anonymous | Tier::Premium => ANONYMOUS_WEEKLY_LIMIT,
        }
    }
}

// Monday 00:00 (local) that starts the week containing `now`
pub fn week_start(now: &DateTime<FixedOffset>) -> NaiveDate {
    let today = now.date_naive();
    today - Days::new(u64::from(now.weekday().num_days_from_monday()))
}

pub fn week_id(now: &DateTime<FixedOffset>) -> String {
    week_start(now).format("%Y-%m-%d").to_string()
}

// Whole seconds (rounded up) until the next Monday 00:00 local
pub fn seconds_until_next_monday(now: &DateTime<FixedOffset>) -> u64 {
    let next_monday = (week_start(now) + Days::new(7)).and_time(NaiveTime::MIN);
    let remaining_ms = (next_monday - now.naive_local()).num_milliseconds();
    u64::try_from((remaining_ms + 999) / 1000).unwrap_or(0)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UsageDecision {
    pub allowed: bool,
    pub remaining: u32,
    pub limit: u32,
}

/// Per-(week, IP) generation counter.
#[derive(Clone)]
pub struct UsageTracker {
    stores: Stores,
    clock: Arc<dyn Clock>,
}

impl UsageTracker {
    pub fn new(stores: Stores, clock: Arc<dyn Clock>) -> Self {
        Self { stores, clock }
    }

    pub async fn check_and_increment(&self, ip: &str, tier: Tier) -> UsageDecision {
        let limit = tier.weekly_limit();
        let now = self.clock.now();
        let key = format!("usage:week:{}:{}", week_id(&now), ip);
        let ttl = Duration::from_secs(seconds_until_next_monday(&now)) + EXPIRY_BUFFER;

        let counted = self.stores.count_in_window(&key, ttl).await;

        if counted.count > i64::from(limit) {
            WEEKLY_REJECTIONS.inc();
            warn!(
                ip,
                tier = tier.as_str(),
                count = counted.count,
                limit,
                "weekly quota exhausted"
            );
            return UsageDecision {
                allowed: false,
                remaining: 0,
                limit,
            };
        }

        let remaining = u32::try_from(i64::from(limit) - counted.count).unwrap_or(0);
        debug!(
            ip,
            tier = tier.as_str(),
            count = counted.count,
            remaining,
            degraded = counted.degraded,
            "weekly usage"
        );
        UsageDecision {
            allowed: true,
            remaining,
            limit,
        }
    }
}
