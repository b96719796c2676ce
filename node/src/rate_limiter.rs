//! Wallet Rate Limiter
//!
//! Token bucket limiter keyed by wallet id. Built once at startup and shared
//! with the API through an `Arc`.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

/// Buckets untouched for this long are dropped on cleanup
const IDLE_BUCKET_TTL: Duration = Duration::from_secs(300);

/// Rate limit settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Sustained requests per wallet per minute
    pub requests_per_minute: u32,
    /// Maximum burst size
    pub burst_size: u32,
    /// Whether rate limiting is enabled
    pub enabled: bool,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_minute: 30,
            burst_size: 10,
            enabled: true,
        }
    }
}

impl RateLimitConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.enabled && self.requests_per_minute == 0 {
            return Err("requests_per_minute must be > 0".to_string());
        }
        if self.enabled && self.burst_size == 0 {
            return Err("burst_size must be > 0".to_string());
        }
        Ok(())
    }
}

/// Per-wallet token bucket rate limiter
pub struct WalletRateLimiter {
    buckets: Arc<RwLock<HashMap<String, TokenBucket>>>,
    /// Tokens added per second
    rate: f64,
    burst: u32,
    enabled: bool,
    cleanup_interval: Duration,
    last_cleanup: Arc<RwLock<Instant>>,
}

impl WalletRateLimiter {
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            buckets: Arc::new(RwLock::new(HashMap::new())),
            rate: config.requests_per_minute as f64 / 60.0,
            burst: config.burst_size,
            enabled: config.enabled,
            cleanup_interval: Duration::from_secs(60),
            last_cleanup: Arc::new(RwLock::new(Instant::now())),
        }
    }

    /// Limiter that allows everything
    pub fn disabled() -> Self {
        Self::new(&RateLimitConfig {
            enabled: false,
            ..Default::default()
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Consume a token for `wallet`. Returns false when the wallet is over
    /// its limit.
    pub async fn check(&self, wallet: &str) -> bool {
        if !self.enabled {
            return true;
        }

        let mut buckets = self.buckets.write().await;
        self.maybe_cleanup(&mut buckets).await;

        if let Some(bucket) = buckets.get_mut(wallet) {
            return bucket.try_consume();
        }

        let mut bucket = TokenBucket::new(self.burst, self.rate);
        let allowed = bucket.try_consume();
        buckets.insert(wallet.to_string(), bucket);
        allowed
    }

    /// Tokens left for `wallet`, if it is being tracked
    pub async fn remaining(&self, wallet: &str) -> Option<u32> {
        let buckets = self.buckets.read().await;
        buckets.get(wallet).map(|b| b.tokens as u32)
    }

    /// Number of wallets with a live bucket
    pub async fn tracked_keys(&self) -> usize {
        self.buckets.read().await.len()
    }

    async fn maybe_cleanup(&self, buckets: &mut HashMap<String, TokenBucket>) {
        let mut last_cleanup = self.last_cleanup.write().await;

        if last_cleanup.elapsed() < self.cleanup_interval {
            return;
        }

        let now = Instant::now();
        buckets.retain(|_, bucket| now.duration_since(bucket.last_check) < IDLE_BUCKET_TTL);

        *last_cleanup = now;
    }

    /// Forget the bucket for one wallet
    pub async fn reset(&self, wallet: &str) {
        self.buckets.write().await.remove(wallet);
    }

    pub async fn clear_all(&self) {
        self.buckets.write().await.clear();
    }
}

impl Default for WalletRateLimiter {
    fn default() -> Self {
        Self::new(&RateLimitConfig::default())
    }
}

#[derive(Debug)]
struct TokenBucket {
    tokens: f64,
    capacity: f64,
    refill_rate: f64,
    last_check: Instant,
}

impl TokenBucket {
    fn new(capacity: u32, refill_rate: f64) -> Self {
        Self {
            tokens: capacity as f64,
            capacity: capacity as f64,
            refill_rate,
            last_check: Instant::now(),
        }
    }

    fn try_consume(&mut self) -> bool {
        self.refill();

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_check).as_secs_f64();
        self.last_check = now;

        self.tokens = (self.tokens + elapsed * self.refill_rate).min(self.capacity);
    }
}
