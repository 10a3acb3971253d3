//! # Market Data SDK
//!
//! Cryptocurrency market data from CoinGecko and CoinCap behind in-memory
//! caches with provider failover.
//!
//! Two caches are exposed through [`MarketDataService`]:
//!
//! - a coin list cache holding the top coins by market cap per fiat
//! - a historical cache holding price series per (coin, fiat, range)
//!
//! Each cache keeps its own sticky primary provider. When the primary
//! fails the other provider is tried, and a successful fallback becomes
//! the new primary. CoinCap quotes only in USD; its results are converted
//! with exchange rates from CoinGecko.
//!
//! ## Usage
//!
//! ```no_run
//! use market_data_sdk::{CacheConfig, Fiat, MarketDataService, RangeSpec};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let service = MarketDataService::new(CacheConfig::from_env())?;
//!
//! let snapshot = service.snapshot(&Fiat::usd()).await?;
//! if snapshot.is_stale() {
//!     println!("serving cached data from {}", snapshot.fetched_at);
//! }
//!
//! let series = service.series("bitcoin", &Fiat::usd(), "7d".parse::<RangeSpec>()?).await;
//! println!("{} points, {:+.2}%", series.len(), series.calculate_change());
//! # Ok(())
//! # }
//! ```

pub mod clock;
pub mod config;
pub mod constants;
pub mod error;
pub mod failover;
pub mod fiat;
pub mod history_cache;
pub mod list_cache;
pub mod metrics;
pub mod provider;
pub mod providers;
pub mod range;
pub mod service;
pub mod store;
pub mod types;

// Re-export commonly used types
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{BucketPolicy, CacheConfig};
pub use error::{CacheError, FailureKind, ParseError, ProviderError, ProviderFailure};
pub use fiat::{ExchangeRateSource, FiatConversionResolver};
pub use metrics::ProviderMetrics;
pub use provider::MarketDataProvider;
pub use service::MarketDataService;
pub use types::{
    CoinRecord, ComponentHealth, Fiat, HealthStatus, PricePoint, PriceSeries, ProviderId,
    RangeSpec, Snapshot, Staleness,
};
