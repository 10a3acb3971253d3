//! Runtime configuration for the caches
//!
//! Defaults come from `constants`. `CacheConfig::from_env()` applies the
//! `MARKET_DATA_*` environment overrides; unparsable values are logged and
//! ignored.

use crate::constants::{
    DAILY_BUCKET_FROM_DAYS, FIAT_RATE_TTL_SECS, HISTORY_CACHE_CAPACITY, HISTORY_TTL_SECS,
    HOURLY_BUCKET_FROM_DAYS, LIST_PAGE_SIZE, LIST_TTL_SECS, RETRY_DELAY_MS, TRENDING_TTL_SECS,
};
use crate::types::{HistoryInterval, ProviderId};
use std::str::FromStr;
use std::time::Duration;

/// Maps a bounded range to CoinCap's bucket interval
///
/// `days < hourly_from_days` uses minute buckets, `days >= daily_from_days`
/// uses daily buckets, everything between uses hourly buckets.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BucketPolicy {
    pub hourly_from_days: f64,
    pub daily_from_days: f64,
}

impl BucketPolicy {
    pub fn interval_for(&self, days: f64) -> HistoryInterval {
        if days >= self.daily_from_days {
            HistoryInterval::Daily
        } else if days >= self.hourly_from_days {
            HistoryInterval::Hourly
        } else {
            HistoryInterval::Minute
        }
    }
}

impl Default for BucketPolicy {
    fn default() -> Self {
        Self {
            hourly_from_days: HOURLY_BUCKET_FROM_DAYS,
            daily_from_days: DAILY_BUCKET_FROM_DAYS,
        }
    }
}

/// Cache and failover settings
#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub list_ttl: Duration,
    pub history_ttl: Duration,
    pub fiat_rate_ttl: Duration,
    pub trending_ttl: Duration,
    /// Delay before the single retry of a retried provider
    pub retry_delay: Duration,
    pub page_size: u32,
    pub history_capacity: usize,
    /// Initial sticky primary of the coin list cache
    pub list_primary: ProviderId,
    /// Initial sticky primary of the historical cache
    pub history_primary: ProviderId,
    pub bucket_policy: BucketPolicy,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            list_ttl: Duration::from_secs(LIST_TTL_SECS),
            history_ttl: Duration::from_secs(HISTORY_TTL_SECS),
            fiat_rate_ttl: Duration::from_secs(FIAT_RATE_TTL_SECS),
            trending_ttl: Duration::from_secs(TRENDING_TTL_SECS),
            retry_delay: Duration::from_millis(RETRY_DELAY_MS),
            page_size: LIST_PAGE_SIZE,
            history_capacity: HISTORY_CACHE_CAPACITY,
            list_primary: ProviderId::CoinGecko,
            history_primary: ProviderId::CoinGecko,
            bucket_policy: BucketPolicy::default(),
        }
    }
}

impl CacheConfig {
    /// Defaults with environment overrides applied
    pub fn from_env() -> Self {
        Self::default().with_overrides(|key| std::env::var(key).ok())
    }

    /// Applies overrides from any key lookup (the environment in production)
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(p) = parse_var::<ProviderId>(&lookup, "MARKET_DATA_LIST_PRIMARY") {
            self.list_primary = p;
        }
        if let Some(p) = parse_var::<ProviderId>(&lookup, "MARKET_DATA_HISTORY_PRIMARY") {
            self.history_primary = p;
        }
        if let Some(secs) = parse_var::<u64>(&lookup, "MARKET_DATA_LIST_TTL_SECS") {
            self.list_ttl = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_var::<u64>(&lookup, "MARKET_DATA_HISTORY_TTL_SECS") {
            self.history_ttl = Duration::from_secs(secs);
        }
        if let Some(ms) = parse_var::<u64>(&lookup, "MARKET_DATA_RETRY_DELAY_MS") {
            self.retry_delay = Duration::from_millis(ms);
        }
        if let Some(size) = parse_var::<u32>(&lookup, "MARKET_DATA_PAGE_SIZE") {
            self.page_size = size.max(1);
        }
        self
    }
}

fn parse_var<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = lookup(key)?;
    match raw.parse::<T>() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(key = key, value = %raw, "Ignoring unparsable configuration override");
            None
        }
    }
}
