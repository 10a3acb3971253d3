//! Canonical types for the market data cache

use crate::constants::{SUPPORTED_FIATS, TIMEFRAMES};
use crate::error::ParseError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;
use std::time::Duration;

/// Upstream market data providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderId {
    /// Per-fiat market lists and arbitrary-length history
    CoinGecko,
    /// USD-only lists and windowed history
    CoinCap,
}

impl ProviderId {
    /// The provider to fall back to
    pub fn other(self) -> Self {
        match self {
            ProviderId::CoinGecko => ProviderId::CoinCap,
            ProviderId::CoinCap => ProviderId::CoinGecko,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ProviderId::CoinGecko => "coingecko",
            ProviderId::CoinCap => "coincap",
        }
    }

    pub fn all() -> [ProviderId; 2] {
        [ProviderId::CoinGecko, ProviderId::CoinCap]
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ProviderId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "coingecko" | "a" => Ok(ProviderId::CoinGecko),
            "coincap" | "b" => Ok(ProviderId::CoinCap),
            other => Err(format!("unknown provider: {}", other)),
        }
    }
}

/// Fiat currency code, always stored upper-case
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fiat(String);

impl Fiat {
    pub fn usd() -> Self {
        Fiat("USD".to_string())
    }

    pub fn is_usd(&self) -> bool {
        self.0 == "USD"
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Lower-case form used in provider query strings
    pub fn as_lower(&self) -> String {
        self.0.to_ascii_lowercase()
    }

    /// Whether the code is in the list of currencies offered to callers
    pub fn is_supported(&self) -> bool {
        SUPPORTED_FIATS.contains(&self.0.as_str())
    }
}

impl FromStr for Fiat {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let code = s.trim();
        if !(3..=4).contains(&code.len()) || !code.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(ParseError::InvalidFiat(s.to_string()));
        }
        Ok(Fiat(code.to_ascii_uppercase()))
    }
}

impl fmt::Display for Fiat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One coin in a top-market snapshot
///
/// Monetary fields are in the fiat the snapshot was requested in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoinRecord {
    /// Stable cross-provider identifier, used as the join key
    pub id: String,
    /// Display ticker, upper-case, not unique
    pub symbol: String,
    pub name: String,
    /// Never negative
    pub price: f64,
    /// 24h price change percentage
    pub change_24h: f64,
    pub market_cap: f64,
}

impl CoinRecord {
    /// Builds a normalized record
    ///
    /// Missing or non-finite numbers become `0.0`, negative price and market
    /// cap are clamped to `0.0`, and the symbol is upper-cased.
    pub fn new(
        id: impl Into<String>,
        symbol: &str,
        name: impl Into<String>,
        price: Option<f64>,
        change_24h: Option<f64>,
        market_cap: Option<f64>,
    ) -> Self {
        Self {
            id: id.into(),
            symbol: symbol.trim().to_uppercase(),
            name: name.into(),
            price: finite_or_zero(price).max(0.0),
            change_24h: finite_or_zero(change_24h),
            market_cap: finite_or_zero(market_cap).max(0.0),
        }
    }

    /// Multiplies every monetary field by `rate`
    pub fn converted(mut self, rate: f64) -> Self {
        self.price *= rate;
        self.market_cap *= rate;
        self
    }

    /// Value of `amount` coins in the record's fiat
    pub fn fiat_value(&self, amount: f64) -> f64 {
        amount * self.price
    }
}

fn finite_or_zero(value: Option<f64>) -> f64 {
    match value {
        Some(v) if v.is_finite() => v,
        _ => 0.0,
    }
}

/// A single historical price
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub timestamp_millis: i64,
    pub price: f64,
}

impl PricePoint {
    pub fn new(timestamp_millis: i64, price: f64) -> Self {
        Self {
            timestamp_millis,
            price,
        }
    }
}

/// Price history ordered by ascending timestamp
///
/// An empty series means "no data", not an error.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PriceSeries {
    points: Vec<PricePoint>,
}

impl PriceSeries {
    pub fn new(mut points: Vec<PricePoint>) -> Self {
        points.sort_by_key(|p| p.timestamp_millis);
        Self { points }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn points(&self) -> &[PricePoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn first(&self) -> Option<&PricePoint> {
        self.points.first()
    }

    pub fn last(&self) -> Option<&PricePoint> {
        self.points.last()
    }

    /// Percentage change between the first and last point
    ///
    /// Returns `0.0` for fewer than two points or a zero starting price.
    pub fn calculate_change(&self) -> f64 {
        match (self.points.first(), self.points.last()) {
            (Some(first), Some(last)) if self.points.len() >= 2 && first.price != 0.0 => {
                (last.price - first.price) / first.price * 100.0
            }
            _ => 0.0,
        }
    }

    /// Multiplies every price by `rate`
    pub fn scaled(mut self, rate: f64) -> Self {
        for point in &mut self.points {
            point.price *= rate;
        }
        self
    }
}

/// Requested history window
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RangeSpec {
    /// Bounded window in days; fractional values select sub-day windows
    Days(f64),
    /// Everything the provider has
    Max,
}

impl RangeSpec {
    /// Validated bounded range
    pub fn days(days: f64) -> Result<Self, ParseError> {
        if days.is_finite() && days >= 0.0 {
            Ok(RangeSpec::Days(days))
        } else {
            Err(ParseError::InvalidRange(days.to_string()))
        }
    }

    pub fn is_max(&self) -> bool {
        matches!(self, RangeSpec::Max)
    }

    pub fn as_days(&self) -> Option<f64> {
        match self {
            RangeSpec::Days(d) => Some(*d),
            RangeSpec::Max => None,
        }
    }

    /// False for a `Days` value built directly with a negative or non-finite count
    pub fn is_valid(&self) -> bool {
        match self {
            RangeSpec::Days(d) => d.is_finite() && *d >= 0.0,
            RangeSpec::Max => true,
        }
    }

    fn key_bits(&self) -> Option<u64> {
        // -0.0 and 0.0 must hash the same
        self.as_days().map(|d| (d + 0.0).to_bits())
    }
}

impl PartialEq for RangeSpec {
    fn eq(&self, other: &Self) -> bool {
        self.key_bits() == other.key_bits()
    }
}

impl Eq for RangeSpec {}

impl Hash for RangeSpec {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key_bits().hash(state);
    }
}

impl fmt::Display for RangeSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RangeSpec::Days(d) => write!(f, "{}d", d),
            RangeSpec::Max => f.write_str("max"),
        }
    }
}

impl FromStr for RangeSpec {
    type Err = ParseError;

    /// Accepts `max`, the dashboard timeframes (`24h`, `7d`, `1m`, `3m`, `1y`)
    /// and plain day counts such as `14` or `0.25`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let label = s.trim().to_ascii_lowercase();
        if let Some((_, days)) = TIMEFRAMES.iter().find(|(name, _)| *name == label) {
            return Ok(match days {
                Some(d) => RangeSpec::Days(*d),
                None => RangeSpec::Max,
            });
        }
        label
            .parse::<f64>()
            .map_err(|_| ParseError::InvalidRange(s.to_string()))
            .and_then(RangeSpec::days)
    }
}

/// Bucket size for windowed history requests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HistoryInterval {
    Minute,
    Hourly,
    Daily,
}

impl HistoryInterval {
    /// CoinCap's query value
    pub fn as_str(self) -> &'static str {
        match self {
            HistoryInterval::Minute => "m1",
            HistoryInterval::Hourly => "h1",
            HistoryInterval::Daily => "d1",
        }
    }
}

/// A cached value with its provenance
#[derive(Debug, Clone)]
pub struct CacheEntry<T> {
    pub value: T,
    pub fetched_at: DateTime<Utc>,
    pub source: ProviderId,
}

impl<T> CacheEntry<T> {
    pub fn new(value: T, fetched_at: DateTime<Utc>, source: ProviderId) -> Self {
        Self {
            value,
            fetched_at,
            source,
        }
    }

    /// Age of the entry at `now`, zero if the clock went backwards
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        (now - self.fetched_at).to_std().unwrap_or(Duration::ZERO)
    }

    /// True while `now - fetched_at < ttl`
    pub fn is_fresh(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        self.age(now) < ttl
    }
}

/// Freshness annotation on a served snapshot
#[derive(Debug, Clone, PartialEq)]
pub enum Staleness {
    /// Within TTL or just refreshed
    Fresh,
    /// Every provider failed; this is the last good snapshot
    Stale { age: Duration, warning: String },
}

/// Result of a coin list lookup
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub coins: Vec<CoinRecord>,
    pub fiat: Fiat,
    pub source: ProviderId,
    pub fetched_at: DateTime<Utc>,
    pub staleness: Staleness,
}

impl Snapshot {
    pub fn is_stale(&self) -> bool {
        matches!(self.staleness, Staleness::Stale { .. })
    }
}

/// Overall system health status
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum HealthStatus {
    /// System is healthy and all components are operational
    Healthy,
    /// System is degraded but still functional
    Degraded,
    /// System is unhealthy and requires attention
    Unhealthy,
}

/// Component health information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    /// Component name
    pub name: String,
    /// Component status
    pub status: HealthStatus,
    /// Optional status message
    pub message: Option<String>,
    /// Component-specific details
    pub details: std::collections::HashMap<String, serde_json::Value>,
    /// Last checked timestamp
    pub last_checked: DateTime<Utc>,
}
