//! Market data provider implementations

pub mod coincap;
pub mod coingecko;

pub use coincap::CoinCapProvider;
pub use coingecko::CoinGeckoProvider;

use crate::{
    constants::{REQUEST_TIMEOUT_SECS, USER_AGENT},
    error::ProviderError,
};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;

/// HTTP client shared by one adapter
pub(crate) fn build_client() -> Result<Client, ProviderError> {
    Client::builder()
        .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
        .user_agent(USER_AGENT)
        .build()
        .map_err(ProviderError::NetworkError)
}

/// Sends a GET request and decodes the JSON body
pub(crate) async fn get_json<T: DeserializeOwned>(
    request: RequestBuilder,
    provider: &str,
) -> Result<T, ProviderError> {
    let response = request.send().await.map_err(ProviderError::from_request)?;
    let status = response.status();
    let body = response.text().await.map_err(ProviderError::from_request)?;

    check_status(status, &body)?;
    decode_body(&body, provider)
}

/// Maps a response status to the provider error it stands for
fn check_status(status: StatusCode, body: &str) -> Result<(), ProviderError> {
    // Check for rate limiting
    if status == StatusCode::TOO_MANY_REQUESTS {
        return Err(ProviderError::RateLimitExceeded);
    }

    // Check for other errors
    if !status.is_success() {
        return Err(ProviderError::ApiError(format!("HTTP {}: {}", status, body)));
    }

    Ok(())
}

fn decode_body<T: DeserializeOwned>(body: &str, provider: &str) -> Result<T, ProviderError> {
    serde_json::from_str(body).map_err(|e| {
        ProviderError::UpstreamFormat(format!("Failed to parse {} response: {}", provider, e))
    })
}
