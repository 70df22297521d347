use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, TimeDelta, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use super::{StoreClient, StoreUnavailable};
use crate::clock::Clock;

// Value with an optional expiry instant
#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Option<DateTime<FixedOffset>>,
}

impl Entry {
    fn is_live(&self, now: DateTime<FixedOffset>) -> bool {
        self.expires_at.is_none_or(|at| now < at)
    }
}

// Which map a key lives in, by its namespace prefix
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Keyspace {
    RateLimit,
    Usage,
    Record,
}

impl Keyspace {
    fn of(key: &str) -> Self {
        if key.starts_with("rl:") {
            Keyspace::RateLimit
        } else if key.starts_with("usage:") {
            Keyspace::Usage
        } else {
            Keyspace::Record
        }
    }
}

#[derive(Debug, Default)]
struct LocalState {
    rate_limits: HashMap<String, Entry>,
    usage: HashMap<String, Entry>,
    records: HashMap<String, Entry>,
}

impl LocalState {
    fn map(&mut self, key: &str) -> &mut HashMap<String, Entry> {
        match Keyspace::of(key) {
            Keyspace::RateLimit => &mut self.rate_limits,
            Keyspace::Usage => &mut self.usage,
            Keyspace::Record => &mut self.records,
        }
    }
}

/// Process-local store. Lives as long as the process; nothing is shared
/// between gateway instances.
pub struct LocalStore {
    clock: Arc<dyn Clock>,
    state: Mutex<LocalState>,
}

impl LocalStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            state: Mutex::new(LocalState::default()),
        }
    }

    /// Drop every expired entry. Expired entries already read as absent,
    /// this only reclaims memory.
    pub async fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let mut state = self.state.lock().await;
        let before = state.rate_limits.len() + state.usage.len() + state.records.len();
        state.rate_limits.retain(|_, e| e.is_live(now));
        state.usage.retain(|_, e| e.is_live(now));
        state.records.retain(|_, e| e.is_live(now));
        before - (state.rate_limits.len() + state.usage.len() + state.records.len())
    }

    fn deadline(&self, ttl: Duration) -> DateTime<FixedOffset> {
        let ttl = TimeDelta::from_std(ttl).unwrap_or(TimeDelta::MAX);
        self.clock
            .now()
            .checked_add_signed(ttl)
            .unwrap_or(DateTime::<Utc>::MAX_UTC.fixed_offset())
    }
}

#[async_trait]
impl StoreClient for LocalStore {
    fn backend(&self) -> &'static str {
        "local"
    }

    async fn increment(&self, key: &str) -> Result<i64, StoreUnavailable> {
        let now = self.clock.now();
        let mut state = self.state.lock().await;
        let map = state.map(key);

        if let Some(entry) = map.get_mut(key).filter(|e| e.is_live(now)) {
            let count = entry.value.parse::<i64>().map_err(|_| {
                StoreUnavailable::Protocol(format!("value at {key} is not an integer"))
            })? + 1;
            entry.value = count.to_string();
            return Ok(count);
        }

        // absent or expired: new window
        map.insert(
            key.to_string(),
            Entry {
                value: "1".to_string(),
                expires_at: None,
            },
        );
        Ok(1)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<(), StoreUnavailable> {
        let now = self.clock.now();
        let deadline = self.deadline(ttl);
        let mut state = self.state.lock().await;
        if let Some(entry) = state.map(key).get_mut(key).filter(|e| e.is_live(now)) {
            if entry.expires_at.is_none() {
                entry.expires_at = Some(deadline);
            }
        }
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreUnavailable> {
        let now = self.clock.now();
        let mut state = self.state.lock().await;
        Ok(state
            .map(key)
            .get(key)
            .filter(|e| e.is_live(now))
            .map(|e| e.value.clone()))
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreUnavailable> {
        let deadline = self.deadline(ttl);
        let mut state = self.state.lock().await;
        state.map(key).insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: Some(deadline),
            },
        );
        Ok(())
    }
}
