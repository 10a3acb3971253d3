//! CoinGecko provider implementation
//!
//! Quotes directly in the requested fiat, serves arbitrary history including
//! the maximum range, and publishes the exchange rate table used for
//! USD-only providers.

use crate::{
    constants::{
        COINGECKO_API_URL, COINGECKO_EXCHANGE_RATES_ENDPOINT, COINGECKO_MARKETS_ENDPOINT,
        COINGECKO_TRENDING_ENDPOINT, RATE_REQUEST_TIMEOUT_SECS,
    },
    error::ProviderError,
    fiat::ExchangeRateSource,
    provider::MarketDataProvider,
    providers::{build_client, get_json},
    types::{CoinRecord, Fiat, PricePoint, PriceSeries, ProviderId, RangeSpec},
};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

/// One row of the `/coins/markets` response
#[derive(Debug, Deserialize)]
struct CoinGeckoMarket {
    id: String,
    symbol: String,
    name: String,
    current_price: Option<f64>,
    price_change_percentage_24h: Option<f64>,
    market_cap: Option<f64>,
}

/// `/coins/{id}/market_chart` response; each price is `[timestamp_ms, price]`
#[derive(Debug, Deserialize)]
struct MarketChartResponse {
    prices: Vec<(f64, Option<f64>)>,
}

/// `/exchange_rates` response, every value relative to one BTC
#[derive(Debug, Deserialize)]
struct ExchangeRatesResponse {
    rates: HashMap<String, ExchangeRate>,
}

#[derive(Debug, Deserialize)]
struct ExchangeRate {
    value: f64,
}

#[derive(Debug, Deserialize)]
struct TrendingResponse {
    coins: Vec<TrendingCoin>,
}

#[derive(Debug, Deserialize)]
struct TrendingCoin {
    item: TrendingItem,
}

#[derive(Debug, Deserialize)]
struct TrendingItem {
    symbol: String,
}

/// CoinGecko market data provider
pub struct CoinGeckoProvider {
    client: Client,
    base_url: String,
}

impl CoinGeckoProvider {
    /// Creates a new CoinGecko provider
    pub fn new() -> Result<Self, ProviderError> {
        Self::with_base_url(COINGECKO_API_URL)
    }

    /// Creates a provider against another deployment of the same API
    pub fn with_base_url(base_url: &str) -> Result<Self, ProviderError> {
        Ok(Self {
            client: build_client()?,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl MarketDataProvider for CoinGeckoProvider {
    fn id(&self) -> ProviderId {
        ProviderId::CoinGecko
    }

    async fn fetch_list(&self, fiat: &Fiat, limit: u32) -> Result<Vec<CoinRecord>, ProviderError> {
        let url = format!("{}{}", self.base_url, COINGECKO_MARKETS_ENDPOINT);
        tracing::debug!(url = %url, fiat = %fiat, limit = limit, "Fetching market list from CoinGecko");

        let request = self.client.get(&url).query(&[
            ("vs_currency", fiat.as_lower()),
            ("order", "market_cap_desc".to_string()),
            ("per_page", limit.to_string()),
            ("page", "1".to_string()),
            ("sparkline", "false".to_string()),
        ]);
        let markets: Vec<CoinGeckoMarket> = get_json(request, self.provider_name()).await?;

        let coins = parse_markets(markets);
        if coins.is_empty() {
            return Err(ProviderError::UpstreamFormat(
                "No coins returned from CoinGecko".to_string(),
            ));
        }
        Ok(coins)
    }

    async fn fetch_history(
        &self,
        coin_id: &str,
        fiat: &Fiat,
        range: RangeSpec,
        _now_millis: i64,
    ) -> Result<PriceSeries, ProviderError> {
        let url = format!("{}/coins/{}/market_chart", self.base_url, coin_id);
        tracing::debug!(url = %url, fiat = %fiat, range = %range, "Fetching history from CoinGecko");

        let request = self
            .client
            .get(&url)
            .query(&[("vs_currency", fiat.as_lower()), ("days", days_param(range))]);
        let chart: MarketChartResponse = get_json(request, self.provider_name()).await?;

        Ok(parse_chart(chart))
    }

    async fn fetch_trending(&self) -> Result<Vec<String>, ProviderError> {
        let url = format!("{}{}", self.base_url, COINGECKO_TRENDING_ENDPOINT);
        let request = self
            .client
            .get(&url)
            .timeout(Duration::from_secs(RATE_REQUEST_TIMEOUT_SECS));
        let trending: TrendingResponse = get_json(request, self.provider_name()).await?;

        Ok(trending
            .coins
            .into_iter()
            .map(|c| c.item.symbol.to_uppercase())
            .collect())
    }
}

#[async_trait]
impl ExchangeRateSource for CoinGeckoProvider {
    fn source_id(&self) -> ProviderId {
        ProviderId::CoinGecko
    }

    async fn fetch_usd_rates(&self) -> Result<HashMap<String, f64>, ProviderError> {
        let url = format!("{}{}", self.base_url, COINGECKO_EXCHANGE_RATES_ENDPOINT);
        let request = self
            .client
            .get(&url)
            .timeout(Duration::from_secs(RATE_REQUEST_TIMEOUT_SECS));
        let response: ExchangeRatesResponse = get_json(request, self.provider_name()).await?;

        usd_rates(response)
    }
}

fn days_param(range: RangeSpec) -> String {
    match range {
        RangeSpec::Days(days) => days.to_string(),
        RangeSpec::Max => "max".to_string(),
    }
}

fn parse_markets(markets: Vec<CoinGeckoMarket>) -> Vec<CoinRecord> {
    markets
        .into_iter()
        .map(|m| {
            CoinRecord::new(
                m.id,
                &m.symbol,
                m.name,
                m.current_price,
                m.price_change_percentage_24h,
                m.market_cap,
            )
        })
        .collect()
}

fn parse_chart(chart: MarketChartResponse) -> PriceSeries {
    PriceSeries::new(
        chart
            .prices
            .into_iter()
            .filter_map(|(ts, price)| Some(PricePoint::new(ts as i64, price?)))
            .collect(),
    )
}

/// Rebases the BTC-relative table onto USD
fn usd_rates(response: ExchangeRatesResponse) -> Result<HashMap<String, f64>, ProviderError> {
    let usd = response
        .rates
        .get("usd")
        .map(|r| r.value)
        .filter(|v| v.is_finite() && *v > 0.0)
        .ok_or_else(|| {
            ProviderError::UpstreamFormat("Exchange rate table has no usd entry".to_string())
        })?;

    Ok(response
        .rates
        .into_iter()
        .map(|(code, rate)| (code.to_uppercase(), rate.value / usd))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_markets() {
        let body = r#"[
            {"id": "bitcoin", "symbol": "btc", "name": "Bitcoin", "current_price": 37000.5,
             "price_change_percentage_24h": -1.25, "market_cap": 720000000000},
            {"id": "newcoin", "symbol": "new", "name": "New Coin", "current_price": null,
             "price_change_percentage_24h": null, "market_cap": null}
        ]"#;
        let markets: Vec<CoinGeckoMarket> = serde_json::from_str(body).unwrap();
        let coins = parse_markets(markets);

        assert_eq!(coins.len(), 2);
        assert_eq!(coins[0].id, "bitcoin");
        assert_eq!(coins[0].symbol, "BTC");
        assert_eq!(coins[0].price, 37000.5);
        assert_eq!(coins[0].change_24h, -1.25);
        assert_eq!(coins[1].symbol, "NEW");
        assert_eq!(coins[1].price, 0.0);
        assert_eq!(coins[1].market_cap, 0.0);
    }

    #[test]
    fn test_markets_missing_id_is_format_error() {
        let body = r#"[{"symbol": "btc", "name": "Bitcoin"}]"#;
        assert!(serde_json::from_str::<Vec<CoinGeckoMarket>>(body).is_err());
    }

    #[test]
    fn test_parse_chart() {
        let body = r#"{"prices": [[1700000060000, 101.0], [1700000000000, 100.0], [1700000120000, null]]}"#;
        let chart: MarketChartResponse = serde_json::from_str(body).unwrap();
        let series = parse_chart(chart);

        assert_eq!(series.len(), 2);
        assert_eq!(series.points()[0], PricePoint::new(1_700_000_000_000, 100.0));
        assert_eq!(series.points()[1], PricePoint::new(1_700_000_060_000, 101.0));
    }

    #[test]
    fn test_usd_rates_rebased() {
        let body = r#"{"rates": {
            "btc": {"name": "Bitcoin", "unit": "BTC", "value": 1.0, "type": "crypto"},
            "usd": {"name": "US Dollar", "unit": "$", "value": 40000.0, "type": "fiat"},
            "eur": {"name": "Euro", "unit": "€", "value": 36000.0, "type": "fiat"}
        }}"#;
        let response: ExchangeRatesResponse = serde_json::from_str(body).unwrap();
        let rates = usd_rates(response).unwrap();

        assert_eq!(rates["USD"], 1.0);
        assert_eq!(rates["EUR"], 0.9);
    }

    #[test]
    fn test_usd_rates_without_usd_entry() {
        let body = r#"{"rates": {"eur": {"value": 36000.0}}}"#;
        let response: ExchangeRatesResponse = serde_json::from_str(body).unwrap();
        assert!(matches!(
            usd_rates(response),
            Err(ProviderError::UpstreamFormat(_))
        ));
    }

    #[test]
    fn test_days_param() {
        assert_eq!(days_param(RangeSpec::Days(1.0)), "1");
        assert_eq!(days_param(RangeSpec::Days(0.5)), "0.5");
        assert_eq!(days_param(RangeSpec::Max), "max");
    }

    #[test]
    fn test_trending_symbols() {
        let body = r#"{"coins": [{"item": {"id": "pepe", "symbol": "pepe"}}]}"#;
        let trending: TrendingResponse = serde_json::from_str(body).unwrap();
        assert_eq!(trending.coins[0].item.symbol, "pepe");
    }
}
