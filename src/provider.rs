//! Provider abstraction over the upstream market data APIs

use crate::{
    error::ProviderError,
    types::{CoinRecord, Fiat, PriceSeries, ProviderId, RangeSpec},
};
use async_trait::async_trait;
use std::sync::Arc;

/// Trait for market data providers
///
/// Each implementation translates one upstream API into the canonical
/// records. Monetary values returned are already in the requested fiat.
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    /// Which upstream this adapter talks to
    fn id(&self) -> ProviderId;

    /// Fetches the top market list ordered by market cap
    ///
    /// # Arguments
    /// * `fiat` - Currency for every monetary field
    /// * `limit` - Number of coins to request
    async fn fetch_list(&self, fiat: &Fiat, limit: u32) -> Result<Vec<CoinRecord>, ProviderError>;

    /// Fetches the price history of one coin
    ///
    /// # Arguments
    /// * `coin_id` - Stable coin identifier
    /// * `fiat` - Currency of the returned prices
    /// * `range` - Day count or the maximum range
    /// * `now_millis` - End of the window for providers that need absolute bounds
    async fn fetch_history(
        &self,
        coin_id: &str,
        fiat: &Fiat,
        range: RangeSpec,
        now_millis: i64,
    ) -> Result<PriceSeries, ProviderError>;

    /// Fetches currently trending coin symbols
    async fn fetch_trending(&self) -> Result<Vec<String>, ProviderError> {
        Err(ProviderError::Unsupported(format!(
            "{} has no trending endpoint",
            self.provider_name()
        )))
    }

    /// Returns the name of this provider
    fn provider_name(&self) -> &'static str {
        self.id().name()
    }
}

/// The two adapters, addressable by id
#[derive(Clone)]
pub struct ProviderSet {
    coingecko: Arc<dyn MarketDataProvider>,
    coincap: Arc<dyn MarketDataProvider>,
}

impl ProviderSet {
    pub fn new(coingecko: Arc<dyn MarketDataProvider>, coincap: Arc<dyn MarketDataProvider>) -> Self {
        debug_assert_eq!(coingecko.id(), ProviderId::CoinGecko);
        debug_assert_eq!(coincap.id(), ProviderId::CoinCap);
        Self { coingecko, coincap }
    }

    pub fn get(&self, id: ProviderId) -> Arc<dyn MarketDataProvider> {
        match id {
            ProviderId::CoinGecko => self.coingecko.clone(),
            ProviderId::CoinCap => self.coincap.clone(),
        }
    }
}
