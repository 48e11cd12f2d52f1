use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use sha2::{Digest, Sha256};
use thiserror::Error;

const REDIS_KEY_PREFIX: &str = "studyhall:rate_limit:v1";

pub type RateLimitFuture<'a> =
    Pin<Box<dyn Future<Output = Result<RateLimitDecision, RateLimitStoreError>> + Send + 'a>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RateLimitDecision {
    Allowed,
    Limited { retry_after: Duration },
}

impl RateLimitDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed)
    }
}

#[derive(Debug, Error)]
pub enum RateLimitStoreError {
    #[error("rate limit store unavailable: {0}")]
    Unavailable(String),
}

/// Injected counter store so a single-process deployment can use in-process
/// memory while a server deployment backs the same checks with a shared
/// store. Policy is fixed-window in both cases; a burst of `max_requests` at
/// the end of one window plus another at the start of the next is possible
/// and preserved as-is.
pub trait RateLimitStore: Send + Sync {
    fn check<'a>(
        &'a self,
        identifier: &'a str,
        max_requests: u32,
        window: Duration,
    ) -> RateLimitFuture<'a>;

    /// Evicts expired entries. In-memory entries otherwise accumulate for
    /// every identifier ever seen.
    fn sweep<'a>(&'a self) -> RateLimitFuture<'a>;
}

#[derive(Debug, Clone)]
struct WindowEntry {
    count: u32,
    reset_at: Instant,
}

/// Process-wide fixed-window counters. The window is anchored to the first
/// request in the window, not wall-clock aligned.
#[derive(Debug, Default)]
pub struct MemoryRateLimitStore {
    entries: Mutex<HashMap<String, WindowEntry>>,
}

impl MemoryRateLimitStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check-then-increment under one lock acquisition, with the clock
    /// supplied by the caller so tests can drive it.
    pub fn check_at(
        &self,
        identifier: &str,
        max_requests: u32,
        window: Duration,
        now: Instant,
    ) -> RateLimitDecision {
        let mut entries = self.lock_entries();
        match entries.get_mut(identifier) {
            Some(entry) if now <= entry.reset_at => {
                if entry.count >= max_requests {
                    return RateLimitDecision::Limited {
                        retry_after: entry.reset_at.saturating_duration_since(now),
                    };
                }
                entry.count = entry.count.saturating_add(1);
                RateLimitDecision::Allowed
            }
            _ => {
                entries.insert(
                    identifier.to_string(),
                    WindowEntry {
                        count: 1,
                        reset_at: now + window,
                    },
                );
                RateLimitDecision::Allowed
            }
        }
    }

    pub fn sweep_at(&self, now: Instant) {
        self.lock_entries().retain(|_, entry| now <= entry.reset_at);
    }

    pub fn tracked_identifiers(&self) -> usize {
        self.lock_entries().len()
    }

    fn lock_entries(&self) -> std::sync::MutexGuard<'_, HashMap<String, WindowEntry>> {
        match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl RateLimitStore for MemoryRateLimitStore {
    fn check<'a>(
        &'a self,
        identifier: &'a str,
        max_requests: u32,
        window: Duration,
    ) -> RateLimitFuture<'a> {
        Box::pin(async move { Ok(self.check_at(identifier, max_requests, window, Instant::now())) })
    }

    fn sweep<'a>(&'a self) -> RateLimitFuture<'a> {
        Box::pin(async move {
            self.sweep_at(Instant::now());
            Ok(RateLimitDecision::Allowed)
        })
    }
}

/// Shared-store variant for multi-instance deployments. Counters live in
/// Redis under hashed identifiers with a TTL of twice the window, so expiry
/// needs no sweep. Windows here are wall-clock aligned, unlike the
/// first-request anchoring of the in-memory store.
#[derive(Clone)]
pub struct RedisRateLimitStore {
    connection: ConnectionManager,
    key_prefix: String,
}

impl RedisRateLimitStore {
    pub async fn connect(redis_url: &str) -> Result<Self, RateLimitStoreError> {
        let client = redis::Client::open(redis_url)
            .map_err(|err| RateLimitStoreError::Unavailable(err.to_string()))?;
        let connection = ConnectionManager::new(client)
            .await
            .map_err(|err| RateLimitStoreError::Unavailable(err.to_string()))?;

        let mut health_connection = connection.clone();
        redis::cmd("PING")
            .query_async::<String>(&mut health_connection)
            .await
            .map_err(|err| {
                RateLimitStoreError::Unavailable(format!("failed to connect to redis: {err}"))
            })?;

        Ok(Self {
            connection,
            key_prefix: REDIS_KEY_PREFIX.to_string(),
        })
    }

    fn window_key(&self, identifier: &str, window_start: i64) -> String {
        format!(
            "{}:{}:{window_start}",
            self.key_prefix,
            hashed_label(identifier)
        )
    }
}

impl RateLimitStore for RedisRateLimitStore {
    fn check<'a>(
        &'a self,
        identifier: &'a str,
        max_requests: u32,
        window: Duration,
    ) -> RateLimitFuture<'a> {
        Box::pin(async move {
            let now_seconds = chrono::Utc::now().timestamp();
            let window_seconds = i64::try_from(window.as_secs().max(1)).unwrap_or(i64::MAX);
            let window_start = fixed_window_start(now_seconds, window_seconds);
            let key = self.window_key(identifier, window_start);

            let mut connection = self.connection.clone();
            let count: i64 = connection
                .incr(&key, 1_i64)
                .await
                .map_err(|err| RateLimitStoreError::Unavailable(err.to_string()))?;
            let ttl_seconds = window.as_secs().saturating_mul(2).max(1);
            let _: bool = connection
                .expire(&key, i64::try_from(ttl_seconds).unwrap_or(i64::MAX))
                .await
                .map_err(|err| RateLimitStoreError::Unavailable(err.to_string()))?;

            if count > i64::from(max_requests) {
                return Ok(RateLimitDecision::Limited {
                    retry_after: Duration::from_secs(retry_after_seconds(
                        now_seconds,
                        window_start,
                        window_seconds,
                    )),
                });
            }
            Ok(RateLimitDecision::Allowed)
        })
    }

    fn sweep<'a>(&'a self) -> RateLimitFuture<'a> {
        // TTLs expire counters server-side.
        Box::pin(async move { Ok(RateLimitDecision::Allowed) })
    }
}

fn fixed_window_start(now_seconds: i64, window_seconds: i64) -> i64 {
    if window_seconds <= 0 {
        return now_seconds;
    }
    now_seconds - now_seconds.rem_euclid(window_seconds)
}

fn retry_after_seconds(now_seconds: i64, window_start: i64, window_seconds: i64) -> u64 {
    let retry_after = (window_start + window_seconds).saturating_sub(now_seconds);
    if retry_after <= 0 {
        1
    } else {
        u64::try_from(retry_after).unwrap_or(1)
    }
}

fn hashed_label(value: &str) -> String {
    let digest = Sha256::digest(value.as_bytes());
    digest
        .iter()
        .map(|byte| format!("{byte:02x}"))
        .collect::<String>()
}
