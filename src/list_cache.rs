//! Top-market coin list cache
//!
//! One snapshot per fiat. A fresh snapshot is served without any network
//! access; an expired one triggers a failover refresh cycle. When every
//! provider fails the last good snapshot is served flagged as stale, and
//! only a fiat that was never fetched produces `AllSourcesExhausted`.

use crate::{
    clock::Clock,
    error::CacheError,
    failover::{AttemptPolicy, FailoverCoordinator, FailoverState},
    provider::ProviderSet,
    store::EntryStore,
    types::{CacheEntry, CoinRecord, Fiat, ProviderId, Snapshot, Staleness},
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// Coin list cache with its own sticky primary
pub struct CoinListCache {
    providers: ProviderSet,
    coordinator: Arc<FailoverCoordinator>,
    clock: Arc<dyn Clock>,
    state: RwLock<FailoverState>,
    entries: EntryStore<Fiat, Vec<CoinRecord>>,
    ttl: Duration,
    page_size: u32,
}

impl CoinListCache {
    pub fn new(
        providers: ProviderSet,
        coordinator: Arc<FailoverCoordinator>,
        clock: Arc<dyn Clock>,
        initial_primary: ProviderId,
        ttl: Duration,
        page_size: u32,
    ) -> Self {
        Self {
            providers,
            coordinator,
            clock,
            state: RwLock::new(FailoverState::new(initial_primary)),
            entries: EntryStore::new(),
            ttl,
            page_size,
        }
    }

    /// Gets the top-market snapshot for `fiat`
    ///
    /// # Returns
    /// A fresh snapshot, a stale one when every provider failed but an
    /// earlier snapshot exists, or `AllSourcesExhausted` otherwise.
    pub async fn get_snapshot(&self, fiat: &Fiat) -> Result<Snapshot, CacheError> {
        let slot = self.entries.slot(fiat).await;
        let mut entry = slot.lock().await;

        let now = self.clock.now();
        if let Some(cached) = entry.as_ref().filter(|e| e.is_fresh(now, self.ttl)) {
            tracing::debug!(fiat = %fiat, source = %cached.source, "Coin list cache hit");
            return Ok(to_snapshot(cached, fiat, Staleness::Fresh));
        }

        let page_size = self.page_size;
        let outcome = self
            .coordinator
            .run(&self.state, AttemptPolicy::single(), |id| {
                let provider = self.providers.get(id);
                let fiat = fiat.clone();
                async move { provider.fetch_list(&fiat, page_size).await }
            })
            .await;

        let result = match outcome {
            Ok(served) => {
                tracing::debug!(
                    fiat = %fiat,
                    provider = %served.provider,
                    count = served.value.len(),
                    failed_over = served.failed_over,
                    "Coin list refreshed"
                );
                let fresh = CacheEntry::new(served.value, self.clock.now(), served.provider);
                let snapshot = to_snapshot(&fresh, fiat, Staleness::Fresh);
                *entry = Some(fresh);
                Ok(snapshot)
            }
            Err(failures) => match entry.as_ref() {
                Some(previous) => {
                    let age = previous.age(now);
                    let warning = format!(
                        "All providers failed; serving {} snapshot from {} ({}s old)",
                        fiat,
                        previous.source,
                        age.as_secs()
                    );
                    tracing::warn!(
                        fiat = %fiat,
                        age_secs = age.as_secs(),
                        failures = failures.len(),
                        "Serving stale coin list"
                    );
                    Ok(to_snapshot(previous, fiat, Staleness::Stale { age, warning }))
                }
                None => {
                    tracing::warn!(fiat = %fiat, "Coin list unavailable from every provider");
                    Err(CacheError::exhausted(format!("coin list {}", fiat), failures))
                }
            },
        };

        drop(entry);
        self.entries.settle(fiat, &slot).await;
        result
    }

    /// Provider the next refresh will try first
    pub async fn primary(&self) -> ProviderId {
        self.state.read().await.primary()
    }

    /// Cached entry for `fiat`, regardless of age
    pub async fn peek(&self, fiat: &Fiat) -> Option<CacheEntry<Vec<CoinRecord>>> {
        self.entries.peek(fiat).await
    }
}

fn to_snapshot(entry: &CacheEntry<Vec<CoinRecord>>, fiat: &Fiat, staleness: Staleness) -> Snapshot {
    Snapshot {
        coins: entry.value.clone(),
        fiat: fiat.clone(),
        source: entry.source,
        fetched_at: entry.fetched_at,
        staleness,
    }
}
