use lazy_static::lazy_static;
use prometheus::{Counter, Histogram, register_counter, register_histogram};

lazy_static! {
    pub static ref REQUEST_TOTAL: Counter =
        register_counter!("quota_requests_total", "Total number of generation requests").unwrap();
    pub static ref BURST_REJECTIONS: Counter = register_counter!(
        "quota_burst_rejections_total",
        "Requests rejected by the burst limiter"
    )
    .unwrap();
    pub static ref WEEKLY_REJECTIONS: Counter = register_counter!(
        "quota_weekly_rejections_total",
        "Requests rejected by the weekly quota"
    )
    .unwrap();
    pub static ref STORE_FALLBACKS: Counter = register_counter!(
        "quota_store_fallbacks_total",
        "Counter updates served by the local fallback store"
    )
    .unwrap();
    pub static ref PREMIUM_GRANTS: Counter = register_counter!(
        "quota_premium_grants_total",
        "Requests admitted on a validated premium token"
    )
    .unwrap();
    pub static ref REDEMPTIONS: Counter = register_counter!(
        "quota_redemptions_total",
        "Activation codes redeemed for a premium token"
    )
    .unwrap();
    pub static ref UPSTREAM_FAILURES: Counter = register_counter!(
        "quota_upstream_failures_total",
        "Failed calls to the generation service"
    )
    .unwrap();
    pub static ref UPSTREAM_LATENCY: Histogram = register_histogram!(
        "quota_upstream_latency_seconds",
        "Generation service latency in seconds"
    )
    .unwrap();
}
