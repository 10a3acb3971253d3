//! Market data service
//!
//! Owns both caches, the fiat resolver and the provider adapters. Callers
//! build one instance and share it; there is no global.

use crate::{
    clock::{Clock, SystemClock},
    config::CacheConfig,
    error::{CacheError, ProviderError},
    failover::FailoverCoordinator,
    fiat::{ExchangeRateSource, FiatConversionResolver},
    history_cache::HistoricalSeriesCache,
    list_cache::CoinListCache,
    metrics::{MetricsRegistry, ProviderMetrics},
    provider::{MarketDataProvider, ProviderSet},
    providers::{CoinCapProvider, CoinGeckoProvider},
    types::{CacheEntry, ComponentHealth, Fiat, HealthStatus, PriceSeries, ProviderId, RangeSpec, Snapshot},
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Success rate below which a provider counts as degraded
const DEGRADED_SUCCESS_RATE: f64 = 0.5;

/// Resilient market data service
///
/// # Example
/// ```no_run
/// use market_data_sdk::{CacheConfig, Fiat, MarketDataService, RangeSpec};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let service = MarketDataService::new(CacheConfig::from_env())?;
///
/// let snapshot = service.snapshot(&"EUR".parse::<Fiat>()?).await?;
/// for coin in snapshot.coins.iter().take(5) {
///     println!("{}: {:.2}", coin.symbol, coin.price);
/// }
///
/// let change = service
///     .series_change("bitcoin", &Fiat::usd(), RangeSpec::days(7.0)?)
///     .await;
/// println!("BTC 7d: {:+.2}%", change);
/// # Ok(())
/// # }
/// ```
pub struct MarketDataService {
    list: CoinListCache,
    history: HistoricalSeriesCache,
    resolver: Arc<FiatConversionResolver>,
    trending_source: Arc<dyn MarketDataProvider>,
    trending: Mutex<Option<CacheEntry<Vec<String>>>>,
    trending_ttl: Duration,
    coordinator: Arc<FailoverCoordinator>,
    metrics: Arc<MetricsRegistry>,
    clock: Arc<dyn Clock>,
}

impl MarketDataService {
    /// Creates a service backed by the live CoinGecko and CoinCap APIs
    pub fn new(config: CacheConfig) -> Result<Self, ProviderError> {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let coingecko = Arc::new(CoinGeckoProvider::new()?);
        let rates: Arc<dyn ExchangeRateSource> = coingecko.clone();
        let resolver = Arc::new(FiatConversionResolver::new(
            rates,
            clock.clone(),
            config.fiat_rate_ttl,
        ));
        let coincap = Arc::new(CoinCapProvider::new(resolver.clone(), config.bucket_policy)?);

        tracing::info!(
            list_primary = %config.list_primary,
            history_primary = %config.history_primary,
            list_ttl_secs = config.list_ttl.as_secs(),
            history_ttl_secs = config.history_ttl.as_secs(),
            "Market data service initialized"
        );

        Ok(Self::with_providers(config, coingecko, coincap, resolver, clock))
    }

    /// Creates a service over custom adapters
    ///
    /// This is primarily for testing with mock providers and a manual clock.
    pub fn with_providers(
        config: CacheConfig,
        coingecko: Arc<dyn MarketDataProvider>,
        coincap: Arc<dyn MarketDataProvider>,
        resolver: Arc<FiatConversionResolver>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let metrics = Arc::new(MetricsRegistry::new());
        let coordinator = Arc::new(FailoverCoordinator::new(config.retry_delay, metrics.clone()));
        let providers = ProviderSet::new(coingecko.clone(), coincap);

        let list = CoinListCache::new(
            providers.clone(),
            coordinator.clone(),
            clock.clone(),
            config.list_primary,
            config.list_ttl,
            config.page_size,
        );
        let history = HistoricalSeriesCache::new(
            providers,
            coordinator.clone(),
            clock.clone(),
            config.history_primary,
            config.history_ttl,
            config.history_capacity,
        );

        Self {
            list,
            history,
            resolver,
            trending_source: coingecko,
            trending: Mutex::new(None),
            trending_ttl: config.trending_ttl,
            coordinator,
            metrics,
            clock,
        }
    }

    /// Top coins by market cap in `fiat`
    pub async fn snapshot(&self, fiat: &Fiat) -> Result<Snapshot, CacheError> {
        self.list.get_snapshot(fiat).await
    }

    /// Price series for a coin, empty when unavailable
    pub async fn series(&self, coin_id: &str, fiat: &Fiat, range: RangeSpec) -> PriceSeries {
        self.history.get_series(coin_id, fiat, range).await
    }

    /// Percentage change over a range, `0.0` when unavailable
    pub async fn series_change(&self, coin_id: &str, fiat: &Fiat, range: RangeSpec) -> f64 {
        self.history.get_change(coin_id, fiat, range).await
    }

    /// Multiplier from USD to `fiat`
    pub async fn rate_to_fiat(&self, fiat: &Fiat) -> f64 {
        self.resolver.rate_to_fiat(fiat).await
    }

    /// Upper-cased trending symbols
    ///
    /// Falls back to the previous list, or an empty one, when the
    /// trending endpoint is unavailable.
    pub async fn trending_symbols(&self) -> Vec<String> {
        let mut cached = self.trending.lock().await;
        let now = self.clock.now();
        if let Some(entry) = cached.as_ref().filter(|e| e.is_fresh(now, self.trending_ttl)) {
            return entry.value.clone();
        }

        let source = self.trending_source.clone();
        let outcome = self
            .coordinator
            .run_pinned(source.id(), 1, |_| {
                let source = source.clone();
                async move { source.fetch_trending().await }
            })
            .await;

        match outcome {
            Ok(served) => {
                let symbols = served.value.clone();
                *cached = Some(CacheEntry::new(served.value, self.clock.now(), served.provider));
                symbols
            }
            Err(failures) => {
                tracing::warn!(failures = failures.len(), "Trending symbols unavailable");
                cached
                    .as_ref()
                    .map(|entry| entry.value.clone())
                    .unwrap_or_default()
            }
        }
    }

    /// Current sticky primary of the coin list cache
    pub async fn list_primary(&self) -> ProviderId {
        self.list.primary().await
    }

    /// Current sticky primary of the historical cache
    pub async fn history_primary(&self) -> ProviderId {
        self.history.primary().await
    }

    /// Latency and success metrics per provider, CoinGecko first
    pub async fn provider_metrics(&self) -> Vec<ProviderMetrics> {
        self.metrics.snapshot().await
    }

    /// Perform a health check on the service
    ///
    /// # Returns
    /// ComponentHealth derived from the recent success rate of each provider
    pub async fn health_check(&self) -> ComponentHealth {
        let mut details = HashMap::new();
        let metrics = self.provider_metrics().await;

        for m in &metrics {
            details.insert(
                format!("{}_success_rate", m.provider_name),
                serde_json::json!(m.success_rate),
            );
            details.insert(
                format!("{}_window", m.provider_name),
                serde_json::json!(m.window_size),
            );
        }
        details.insert(
            "list_primary".to_string(),
            serde_json::json!(self.list_primary().await.name()),
        );
        details.insert(
            "history_primary".to_string(),
            serde_json::json!(self.history_primary().await.name()),
        );
        details.insert(
            "cached_series".to_string(),
            serde_json::json!(self.history.len().await),
        );

        let status = assess(&metrics);
        let message = match status {
            HealthStatus::Healthy => "All market data providers are responding".to_string(),
            HealthStatus::Degraded => {
                let failing: Vec<&str> = metrics
                    .iter()
                    .filter(|m| m.window_size > 0 && m.success_rate < DEGRADED_SUCCESS_RATE)
                    .map(|m| m.provider_name.as_str())
                    .collect();
                format!("Providers failing often: {}", failing.join(", "))
            }
            HealthStatus::Unhealthy => "Every market data provider is failing".to_string(),
        };

        ComponentHealth {
            name: "market_data_service".to_string(),
            status,
            message: Some(message),
            details,
            last_checked: self.clock.now(),
        }
    }
}

fn assess(metrics: &[ProviderMetrics]) -> HealthStatus {
    if metrics
        .iter()
        .all(|m| m.window_size > 0 && m.success_rate == 0.0)
    {
        HealthStatus::Unhealthy
    } else if metrics
        .iter()
        .all(|m| m.window_size == 0 || m.success_rate >= DEGRADED_SUCCESS_RATE)
    {
        HealthStatus::Healthy
    } else {
        HealthStatus::Degraded
    }
}
