//! USD to fiat conversion for providers that only quote in USD
//!
//! The rate table is fetched from its own endpoint and cached independently
//! of the list and history caches. Conversion never fails: any problem
//! degrades to the identity rate.

use crate::{
    clock::Clock,
    error::ProviderError,
    types::{CacheEntry, Fiat, ProviderId},
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Source of a USD-denominated rate table
#[async_trait]
pub trait ExchangeRateSource: Send + Sync {
    /// Provider serving the table
    fn source_id(&self) -> ProviderId;

    /// Multipliers from one USD to each fiat, keyed by upper-case code
    async fn fetch_usd_rates(&self) -> Result<HashMap<String, f64>, ProviderError>;
}

/// Resolves USD → fiat multipliers with a short-lived cache
pub struct FiatConversionResolver {
    source: Arc<dyn ExchangeRateSource>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
    table: Mutex<Option<CacheEntry<HashMap<String, f64>>>>,
}

impl FiatConversionResolver {
    pub fn new(source: Arc<dyn ExchangeRateSource>, clock: Arc<dyn Clock>, ttl: Duration) -> Self {
        Self {
            source,
            clock,
            ttl,
            table: Mutex::new(None),
        }
    }

    /// Multiplier converting a USD amount into `fiat`
    ///
    /// `USD` short-circuits to `1.0` without touching the cache or network.
    /// A failed fetch or an unknown currency also yields `1.0`.
    pub async fn rate_to_fiat(&self, fiat: &Fiat) -> f64 {
        if fiat.is_usd() {
            return 1.0;
        }

        let mut table = self.table.lock().await;
        let now = self.clock.now();
        let needs_refresh = table
            .as_ref()
            .map_or(true, |entry| !entry.is_fresh(now, self.ttl));

        if needs_refresh {
            match self.source.fetch_usd_rates().await {
                Ok(rates) => {
                    tracing::debug!(
                        count = rates.len(),
                        source = %self.source.source_id(),
                        "Refreshed fiat rate table"
                    );
                    *table = Some(CacheEntry::new(rates, now, self.source.source_id()));
                }
                Err(e) => {
                    tracing::warn!(fiat = %fiat, error = %e, "Conversion unavailable, using identity rate");
                    return 1.0;
                }
            }
        }

        let rate = table
            .as_ref()
            .and_then(|entry| entry.value.get(fiat.as_str()).copied());
        match rate {
            Some(r) if r.is_finite() && r > 0.0 => r,
            _ => {
                tracing::warn!(fiat = %fiat, "No usable rate for fiat, using identity rate");
                1.0
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    struct MockRates {
        calls: AtomicUsize,
        healthy: AtomicBool,
    }

    impl MockRates {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                healthy: AtomicBool::new(true),
            }
        }
    }

    #[async_trait]
    impl ExchangeRateSource for MockRates {
        fn source_id(&self) -> ProviderId {
            ProviderId::CoinGecko
        }

        async fn fetch_usd_rates(&self) -> Result<HashMap<String, f64>, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.healthy.load(Ordering::SeqCst) {
                return Err(ProviderError::Timeout);
            }
            Ok([("EUR".to_string(), 0.9), ("JPY".to_string(), 150.0)]
                .into_iter()
                .collect())
        }
    }

    fn setup() -> (Arc<MockRates>, Arc<ManualClock>, FiatConversionResolver) {
        let source = Arc::new(MockRates::new());
        let clock = Arc::new(ManualClock::at_millis(0));
        let resolver =
            FiatConversionResolver::new(source.clone(), clock.clone(), Duration::from_secs(3600));
        (source, clock, resolver)
    }

    #[tokio::test]
    async fn test_usd_never_hits_network() {
        let (source, _clock, resolver) = setup();
        source.healthy.store(false, Ordering::SeqCst);
        assert_eq!(resolver.rate_to_fiat(&Fiat::usd()).await, 1.0);
        assert_eq!(source.calls.load(Ordering::SeqCst), 0);

        source.healthy.store(true, Ordering::SeqCst);
        resolver.rate_to_fiat(&"EUR".parse().unwrap()).await;
        assert_eq!(resolver.rate_to_fiat(&Fiat::usd()).await, 1.0);
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_rate_table_is_cached_for_ttl() {
        let (source, clock, resolver) = setup();
        let eur: Fiat = "EUR".parse().unwrap();
        let jpy: Fiat = "JPY".parse().unwrap();

        assert_eq!(resolver.rate_to_fiat(&eur).await, 0.9);
        assert_eq!(resolver.rate_to_fiat(&jpy).await, 150.0);
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);

        clock.advance(Duration::from_secs(3601));
        assert_eq!(resolver.rate_to_fiat(&eur).await, 0.9);
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_failure_degrades_to_identity() {
        let (source, _clock, resolver) = setup();
        source.healthy.store(false, Ordering::SeqCst);
        assert_eq!(resolver.rate_to_fiat(&"EUR".parse().unwrap()).await, 1.0);
    }

    #[tokio::test]
    async fn test_unknown_fiat_is_identity() {
        let (_source, _clock, resolver) = setup();
        assert_eq!(resolver.rate_to_fiat(&"XYZ".parse().unwrap()).await, 1.0);
    }
}
