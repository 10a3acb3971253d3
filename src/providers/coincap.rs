//! CoinCap provider implementation
//!
//! CoinCap only quotes in USD, so results for any other fiat are converted
//! once, here, with the rate from the fiat resolver. History uses absolute
//! windows and bucket intervals instead of day counts.

use crate::{
    config::BucketPolicy,
    constants::COINCAP_API_URL,
    error::ProviderError,
    fiat::FiatConversionResolver,
    provider::MarketDataProvider,
    providers::{build_client, get_json},
    range::HistoryWindow,
    types::{CoinRecord, Fiat, PricePoint, PriceSeries, ProviderId, RangeSpec},
};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::sync::Arc;

/// CoinCap wraps every payload in `{"data": ...}`
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    data: T,
}

/// CoinCap sends numbers as decimal strings
#[derive(Debug, Deserialize)]
struct CoinCapAsset {
    id: String,
    symbol: String,
    name: String,
    #[serde(rename = "priceUsd")]
    price_usd: Option<String>,
    #[serde(rename = "changePercent24Hr")]
    change_percent_24h: Option<String>,
    #[serde(rename = "marketCapUsd")]
    market_cap_usd: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CoinCapHistoryPoint {
    #[serde(rename = "priceUsd")]
    price_usd: Option<String>,
    time: i64,
}

/// CoinCap market data provider
pub struct CoinCapProvider {
    client: Client,
    base_url: String,
    resolver: Arc<FiatConversionResolver>,
    bucket_policy: BucketPolicy,
}

impl CoinCapProvider {
    /// Creates a new CoinCap provider
    pub fn new(
        resolver: Arc<FiatConversionResolver>,
        bucket_policy: BucketPolicy,
    ) -> Result<Self, ProviderError> {
        Self::with_base_url(COINCAP_API_URL, resolver, bucket_policy)
    }

    /// Creates a provider against another deployment of the same API
    pub fn with_base_url(
        base_url: &str,
        resolver: Arc<FiatConversionResolver>,
        bucket_policy: BucketPolicy,
    ) -> Result<Self, ProviderError> {
        Ok(Self {
            client: build_client()?,
            base_url: base_url.trim_end_matches('/').to_string(),
            resolver,
            bucket_policy,
        })
    }
}

#[async_trait]
impl MarketDataProvider for CoinCapProvider {
    fn id(&self) -> ProviderId {
        ProviderId::CoinCap
    }

    async fn fetch_list(&self, fiat: &Fiat, limit: u32) -> Result<Vec<CoinRecord>, ProviderError> {
        let url = format!("{}/assets", self.base_url);
        tracing::debug!(url = %url, limit = limit, "Fetching asset list from CoinCap");

        let request = self.client.get(&url).query(&[("limit", limit.to_string())]);
        let assets: Envelope<Vec<CoinCapAsset>> = get_json(request, self.provider_name()).await?;
        if assets.data.is_empty() {
            return Err(ProviderError::UpstreamFormat(
                "No assets returned from CoinCap".to_string(),
            ));
        }

        let rate = self.resolver.rate_to_fiat(fiat).await;
        Ok(parse_assets(assets.data, rate))
    }

    async fn fetch_history(
        &self,
        coin_id: &str,
        fiat: &Fiat,
        range: RangeSpec,
        now_millis: i64,
    ) -> Result<PriceSeries, ProviderError> {
        let window = HistoryWindow::translate(range, now_millis, &self.bucket_policy)
            .ok_or_else(|| {
                ProviderError::Unsupported(format!("CoinCap cannot serve range {}", range))
            })?;

        let url = format!("{}/assets/{}/history", self.base_url, coin_id);
        tracing::debug!(
            url = %url,
            start = window.start_millis,
            end = window.end_millis,
            interval = window.interval.as_str(),
            "Fetching history from CoinCap"
        );

        let request = self.client.get(&url).query(&[
            ("interval", window.interval.as_str().to_string()),
            ("start", window.start_millis.to_string()),
            ("end", window.end_millis.to_string()),
        ]);
        let history: Envelope<Vec<CoinCapHistoryPoint>> =
            get_json(request, self.provider_name()).await?;

        let rate = self.resolver.rate_to_fiat(fiat).await;
        Ok(parse_history(history.data).scaled(rate))
    }
}

fn parse_decimal(value: Option<&str>) -> Option<f64> {
    value.and_then(|v| v.trim().parse::<f64>().ok())
}

fn parse_assets(assets: Vec<CoinCapAsset>, rate: f64) -> Vec<CoinRecord> {
    assets
        .into_iter()
        .map(|a| {
            CoinRecord::new(
                a.id,
                &a.symbol,
                a.name,
                parse_decimal(a.price_usd.as_deref()),
                parse_decimal(a.change_percent_24h.as_deref()),
                parse_decimal(a.market_cap_usd.as_deref()),
            )
            .converted(rate)
        })
        .collect()
}

fn parse_history(points: Vec<CoinCapHistoryPoint>) -> PriceSeries {
    PriceSeries::new(
        points
            .into_iter()
            .filter_map(|p| {
                let price = parse_decimal(p.price_usd.as_deref())?;
                Some(PricePoint::new(p.time, price))
            })
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::fiat::ExchangeRateSource;
    use std::collections::HashMap;
    use std::time::Duration;

    struct NoRates;

    #[async_trait]
    impl ExchangeRateSource for NoRates {
        fn source_id(&self) -> ProviderId {
            ProviderId::CoinGecko
        }

        async fn fetch_usd_rates(&self) -> Result<HashMap<String, f64>, ProviderError> {
            Err(ProviderError::Timeout)
        }
    }

    #[tokio::test]
    async fn test_max_range_is_unsupported_without_request() {
        let resolver = Arc::new(FiatConversionResolver::new(
            Arc::new(NoRates),
            Arc::new(ManualClock::at_millis(0)),
            Duration::from_secs(3600),
        ));
        // Nothing listens here; reaching the network would yield a network error
        let provider =
            CoinCapProvider::with_base_url("http://127.0.0.1:9", resolver, BucketPolicy::default())
                .unwrap();

        let result = provider
            .fetch_history("bitcoin", &Fiat::usd(), RangeSpec::Max, 1_700_000_000_000)
            .await;

        match result {
            Err(err @ ProviderError::Unsupported(_)) => {
                assert_eq!(err.kind(), crate::error::FailureKind::Unsupported)
            }
            other => panic!("expected Unsupported, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_assets_converts_monetary_fields() {
        let body = r#"{"data": [
            {"id": "bitcoin", "symbol": "btc", "name": "Bitcoin", "priceUsd": "40000.0",
             "changePercent24Hr": "2.5", "marketCapUsd": "800000000000"},
            {"id": "dust", "symbol": "Dust", "name": "Dust", "priceUsd": null,
             "changePercent24Hr": "oops", "marketCapUsd": null}
        ]}"#;
        let assets: Envelope<Vec<CoinCapAsset>> = serde_json::from_str(body).unwrap();
        let coins = parse_assets(assets.data, 0.5);

        assert_eq!(coins[0].symbol, "BTC");
        assert_eq!(coins[0].price, 20000.0);
        assert_eq!(coins[0].market_cap, 400000000000.0);
        // Percentages are not monetary
        assert_eq!(coins[0].change_24h, 2.5);

        assert_eq!(coins[1].symbol, "DUST");
        assert_eq!(coins[1].price, 0.0);
        assert_eq!(coins[1].change_24h, 0.0);
    }

    #[test]
    fn test_asset_missing_name_is_format_error() {
        let body = r#"{"data": [{"id": "bitcoin", "symbol": "btc"}]}"#;
        assert!(serde_json::from_str::<Envelope<Vec<CoinCapAsset>>>(body).is_err());
    }

    #[test]
    fn test_parse_history() {
        let body = r#"{"data": [
            {"priceUsd": "101.5", "time": 1700000060000},
            {"priceUsd": "100.0", "time": 1700000000000},
            {"priceUsd": null, "time": 1700000120000}
        ]}"#;
        let history: Envelope<Vec<CoinCapHistoryPoint>> = serde_json::from_str(body).unwrap();
        let series = parse_history(history.data).scaled(2.0);

        assert_eq!(series.len(), 2);
        assert_eq!(series.points()[0], PricePoint::new(1_700_000_000_000, 200.0));
        assert_eq!(series.points()[1], PricePoint::new(1_700_000_060_000, 203.0));
    }
}
