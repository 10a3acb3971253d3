//! Error types for the market data cache

use crate::types::ProviderId;
use std::fmt;
use thiserror::Error;

/// Errors that can occur on a single provider call
///
/// These never cross a cache boundary: the failover coordinator turns them
/// into a fallback attempt and keeps them only for logging and metrics.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Network request failed (connection refused, TLS, body read)
    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    /// Timeout waiting for response
    #[error("Request timeout")]
    Timeout,

    /// Rate limit exceeded
    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    /// Provider returned a non-success status
    #[error("Provider API error: {0}")]
    ApiError(String),

    /// 2xx response with unexpected or missing fields
    #[error("Unexpected upstream format: {0}")]
    UpstreamFormat(String),

    /// The provider cannot serve this kind of request
    #[error("Unsupported request: {0}")]
    Unsupported(String),
}

impl ProviderError {
    /// Classifies a reqwest error, separating timeouts from other network failures
    pub fn from_request(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if err.is_decode() {
            Self::UpstreamFormat(err.to_string())
        } else {
            Self::NetworkError(err)
        }
    }

    /// The failure kind, kept for logging, metrics and tests
    pub fn kind(&self) -> FailureKind {
        match self {
            ProviderError::NetworkError(_)
            | ProviderError::Timeout
            | ProviderError::RateLimitExceeded
            | ProviderError::ApiError(_) => FailureKind::Network,
            ProviderError::UpstreamFormat(_) => FailureKind::UpstreamFormat,
            ProviderError::Unsupported(_) => FailureKind::Unsupported,
        }
    }
}

/// Coarse classification of a provider failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// Timeout, connection refusal or non-2xx status
    Network,
    /// 2xx response that could not be understood
    UpstreamFormat,
    /// Request the provider cannot serve
    Unsupported,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FailureKind::Network => "network",
            FailureKind::UpstreamFormat => "upstream_format",
            FailureKind::Unsupported => "unsupported",
        };
        f.write_str(name)
    }
}

/// A provider call that failed during a refresh cycle
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderFailure {
    pub provider: ProviderId,
    pub kind: FailureKind,
    pub message: String,
}

impl ProviderFailure {
    pub fn new(provider: ProviderId, error: &ProviderError) -> Self {
        Self {
            provider,
            kind: error.kind(),
            message: error.to_string(),
        }
    }
}

impl fmt::Display for ProviderFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}): {}", self.provider, self.kind, self.message)
    }
}

/// Errors returned to callers of the caches
#[derive(Debug, Error, Clone)]
pub enum CacheError {
    /// Every provider failed and no earlier snapshot exists for this key
    #[error("All sources exhausted for {key}: {}", format_failures(.failures))]
    AllSourcesExhausted {
        key: String,
        failures: Vec<ProviderFailure>,
    },
}

impl CacheError {
    /// Creates an AllSourcesExhausted error
    pub fn exhausted(key: impl Into<String>, failures: Vec<ProviderFailure>) -> Self {
        Self::AllSourcesExhausted {
            key: key.into(),
            failures,
        }
    }
}

/// Errors raised when parsing caller-supplied values
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ParseError {
    /// Not a plausible fiat currency code
    #[error("Invalid fiat currency code: {0:?}")]
    InvalidFiat(String),

    /// Not a day count, timeframe label or "max"
    #[error("Invalid range: {0:?}")]
    InvalidRange(String),
}

fn format_failures(failures: &[ProviderFailure]) -> String {
    if failures.is_empty() {
        return "no providers attempted".to_string();
    }
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
