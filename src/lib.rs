pub mod clock;
pub mod config;
pub mod entitlement;
pub mod error;
pub mod gate;
pub mod handlers;
pub mod metrics;
pub mod models;
pub mod rate_limit;
pub mod state;
pub mod store;
pub mod upstream;
pub mod usage;
