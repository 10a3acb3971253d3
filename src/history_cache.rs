//! Historical price series cache
//!
//! Keyed by (coin, fiat, range) with a short TTL. The maximum range is only
//! ever served by CoinGecko; bounded ranges go through this cache's own
//! failover state. Exhaustion degrades to an empty series instead of an
//! error so a missing chart never blocks the rest of a dashboard.

use crate::{
    clock::Clock,
    failover::{AttemptPolicy, FailoverCoordinator, FailoverState},
    provider::ProviderSet,
    store::EntryStore,
    types::{CacheEntry, Fiat, PriceSeries, ProviderId, RangeSpec},
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// Attempts given to CoinGecko for the maximum range (one retry)
const MAX_RANGE_ATTEMPTS: u32 = 2;

/// Cache key for one series
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SeriesKey {
    pub coin_id: String,
    pub fiat: Fiat,
    pub range: RangeSpec,
}

/// Historical series cache with a sticky primary independent of the list cache
pub struct HistoricalSeriesCache {
    providers: ProviderSet,
    coordinator: Arc<FailoverCoordinator>,
    clock: Arc<dyn Clock>,
    state: RwLock<FailoverState>,
    entries: EntryStore<SeriesKey, PriceSeries>,
    ttl: Duration,
}

impl HistoricalSeriesCache {
    pub fn new(
        providers: ProviderSet,
        coordinator: Arc<FailoverCoordinator>,
        clock: Arc<dyn Clock>,
        initial_primary: ProviderId,
        ttl: Duration,
        capacity: usize,
    ) -> Self {
        Self {
            providers,
            coordinator,
            clock,
            state: RwLock::new(FailoverState::new(initial_primary)),
            entries: EntryStore::bounded(capacity),
            ttl,
        }
    }

    /// Gets the price series for a coin
    ///
    /// Returns an empty series when no provider could serve the request.
    pub async fn get_series(&self, coin_id: &str, fiat: &Fiat, range: RangeSpec) -> PriceSeries {
        if !range.is_valid() {
            tracing::warn!(coin_id = coin_id, range = %range, "Rejecting invalid history range");
            return PriceSeries::empty();
        }

        let key = SeriesKey {
            coin_id: coin_id.to_string(),
            fiat: fiat.clone(),
            range,
        };
        let slot = self.entries.slot(&key).await;
        let mut entry = slot.lock().await;

        let now = self.clock.now();
        if let Some(cached) = entry.as_ref().filter(|e| e.is_fresh(now, self.ttl)) {
            tracing::debug!(coin_id = coin_id, fiat = %fiat, range = %range, "History cache hit");
            return cached.value.clone();
        }

        let now_millis = now.timestamp_millis();
        let call = |id: ProviderId| {
            let provider = self.providers.get(id);
            let coin_id = coin_id.to_string();
            let fiat = fiat.clone();
            async move {
                provider
                    .fetch_history(&coin_id, &fiat, range, now_millis)
                    .await
            }
        };

        let outcome = if range.is_max() {
            self.coordinator
                .run_pinned(ProviderId::CoinGecko, MAX_RANGE_ATTEMPTS, call)
                .await
        } else {
            self.coordinator
                .run(
                    &self.state,
                    AttemptPolicy::retry_primary(ProviderId::CoinGecko),
                    call,
                )
                .await
        };

        let series = match outcome {
            Ok(served) => {
                tracing::debug!(
                    coin_id = coin_id,
                    fiat = %fiat,
                    range = %range,
                    provider = %served.provider,
                    points = served.value.len(),
                    "History refreshed"
                );
                let series = served.value.clone();
                *entry = Some(CacheEntry::new(served.value, self.clock.now(), served.provider));
                series
            }
            Err(failures) => {
                tracing::warn!(
                    coin_id = coin_id,
                    fiat = %fiat,
                    range = %range,
                    failures = failures.len(),
                    "History unavailable, returning empty series"
                );
                PriceSeries::empty()
            }
        };

        drop(entry);
        self.entries.settle(&key, &slot).await;
        series
    }

    /// Percentage change over the series, `0.0` when unavailable
    pub async fn get_change(&self, coin_id: &str, fiat: &Fiat, range: RangeSpec) -> f64 {
        self.get_series(coin_id, fiat, range)
            .await
            .calculate_change()
    }

    /// Provider the next bounded refresh will try first
    pub async fn primary(&self) -> ProviderId {
        self.state.read().await.primary()
    }

    /// Number of series currently held; failed first fetches are not kept
    pub async fn len(&self) -> usize {
        self.entries.len().await
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.is_empty().await
    }
}
