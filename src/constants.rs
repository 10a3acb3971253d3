//! Constants for the market data cache
//!
//! Compile-time defaults. `CacheConfig::default()` is built from these and
//! `CacheConfig::from_env()` can override a subset at startup.

/// How long a coin list snapshot is served without refetching (in seconds)
pub const LIST_TTL_SECS: u64 = 60;

/// How long a historical series is served without refetching (in seconds)
///
/// Much shorter than the list TTL: charts are re-queried interactively.
pub const HISTORY_TTL_SECS: u64 = 3;

/// How long the USD-based fiat rate table is kept (in seconds)
pub const FIAT_RATE_TTL_SECS: u64 = 3600;

/// How long the trending symbol list is kept (in seconds)
pub const TRENDING_TTL_SECS: u64 = 300;

/// HTTP request timeout for list and history calls (in seconds)
pub const REQUEST_TIMEOUT_SECS: u64 = 10;

/// HTTP request timeout for exchange-rate and trending calls (in seconds)
pub const RATE_REQUEST_TIMEOUT_SECS: u64 = 5;

/// Fixed delay before the single retry of a retried provider (in milliseconds)
pub const RETRY_DELAY_MS: u64 = 500;

/// Number of coins requested for the top-market list
pub const LIST_PAGE_SIZE: u32 = 100;

/// Maximum number of (coin, fiat, range) series kept in memory
pub const HISTORY_CACHE_CAPACITY: usize = 512;

/// Range (in days) from which CoinCap history uses the hourly bucket
pub const HOURLY_BUCKET_FROM_DAYS: f64 = 1.0;

/// Range (in days) from which CoinCap history uses the daily bucket
pub const DAILY_BUCKET_FROM_DAYS: f64 = 7.0;

/// Milliseconds in one day
pub const MILLIS_PER_DAY: i64 = 86_400_000;

/// CoinGecko API base URL
pub const COINGECKO_API_URL: &str = "https://api.coingecko.com/api/v3";

/// CoinGecko top-market list endpoint
pub const COINGECKO_MARKETS_ENDPOINT: &str = "/coins/markets";

/// CoinGecko exchange rate table endpoint
pub const COINGECKO_EXCHANGE_RATES_ENDPOINT: &str = "/exchange_rates";

/// CoinGecko trending search endpoint
pub const COINGECKO_TRENDING_ENDPOINT: &str = "/search/trending";

/// CoinCap API base URL
pub const COINCAP_API_URL: &str = "https://api.coincap.io/v2";

/// User agent for HTTP requests
pub const USER_AGENT: &str = "market-data-sdk/0.1.0";

/// Fiat currencies offered to callers
pub const SUPPORTED_FIATS: &[&str] = &[
    "USD", "EUR", "JPY", "GBP", "AUD", "CAD", "CHF", "CNY", "INR", "BRL", "RUB", "KRW", "SGD",
    "MXN", "NZD", "HKD", "NOK", "SEK", "ZAR", "TRY",
];

/// Named dashboard timeframes and their day counts (`None` = maximum range)
pub const TIMEFRAMES: &[(&str, Option<f64>)] = &[
    ("24h", Some(1.0)),
    ("7d", Some(7.0)),
    ("1m", Some(30.0)),
    ("3m", Some(90.0)),
    ("1y", Some(365.0)),
    ("max", None),
];
