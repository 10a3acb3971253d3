//! Provider health metrics collection and reporting
//!
//! Tracks latency, success rate and failure kinds for every provider
//! attempt made by the failover coordinator.

use crate::error::FailureKind;
use crate::types::ProviderId;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::RwLock;

/// Maximum number of samples to keep for metrics calculation
const MAX_SAMPLES: usize = 100;

/// Metrics for a single provider
#[derive(Debug, Clone)]
pub struct ProviderMetrics {
    /// Name of the provider
    pub provider_name: String,
    /// 50th percentile latency of successful calls in milliseconds
    pub latency_p50_ms: f64,
    /// 99th percentile latency of successful calls in milliseconds
    pub latency_p99_ms: f64,
    /// Success rate over the rolling window (0.0 to 1.0)
    pub success_rate: f64,
    /// Number of samples in the rolling window
    pub window_size: usize,
    /// Total number of requests tracked
    pub total_requests: u64,
    /// Number of failed requests
    pub failed_requests: u64,
    /// Failures caused by timeouts, refused connections or error statuses
    pub network_failures: u64,
    /// Failures caused by unparsable 2xx responses
    pub format_failures: u64,
}

impl ProviderMetrics {
    /// Creates metrics with no data
    pub fn empty(provider_name: &str) -> Self {
        Self {
            provider_name: provider_name.to_string(),
            latency_p50_ms: 0.0,
            latency_p99_ms: 0.0,
            success_rate: 1.0,
            window_size: 0,
            total_requests: 0,
            failed_requests: 0,
            network_failures: 0,
            format_failures: 0,
        }
    }
}

/// Internal sample for latency tracking
#[derive(Debug, Clone)]
struct LatencySample {
    duration_ms: f64,
    success: bool,
}

#[derive(Debug, Default)]
struct MetricsState {
    samples: VecDeque<LatencySample>,
    total_requests: u64,
    failed_requests: u64,
    network_failures: u64,
    format_failures: u64,
}

/// Collects and computes metrics for one provider
pub struct MetricsCollector {
    provider_name: String,
    state: RwLock<MetricsState>,
}

impl MetricsCollector {
    /// Creates a new metrics collector for a provider
    pub fn new(provider_name: &str) -> Self {
        Self {
            provider_name: provider_name.to_string(),
            state: RwLock::new(MetricsState {
                samples: VecDeque::with_capacity(MAX_SAMPLES),
                ..MetricsState::default()
            }),
        }
    }

    /// Records an attempt with its duration and outcome
    pub async fn record_request(&self, duration: Duration, outcome: Result<(), FailureKind>) {
        let mut state = self.state.write().await;
        state.total_requests += 1;
        match outcome {
            Ok(()) => {}
            Err(kind) => {
                state.failed_requests += 1;
                match kind {
                    FailureKind::Network => state.network_failures += 1,
                    FailureKind::UpstreamFormat => state.format_failures += 1,
                    FailureKind::Unsupported => {}
                }
            }
        }

        if state.samples.len() >= MAX_SAMPLES {
            state.samples.pop_front();
        }
        state.samples.push_back(LatencySample {
            duration_ms: duration.as_secs_f64() * 1000.0,
            success: outcome.is_ok(),
        });
    }

    /// Computes current metrics from collected samples
    pub async fn get_metrics(&self) -> ProviderMetrics {
        let state = self.state.read().await;
        if state.samples.is_empty() {
            return ProviderMetrics::empty(&self.provider_name);
        }

        let mut latencies: Vec<f64> = state
            .samples
            .iter()
            .filter(|s| s.success)
            .map(|s| s.duration_ms)
            .collect();
        latencies.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

        let successes = state.samples.iter().filter(|s| s.success).count();

        ProviderMetrics {
            provider_name: self.provider_name.clone(),
            latency_p50_ms: percentile(&latencies, 50.0),
            latency_p99_ms: percentile(&latencies, 99.0),
            success_rate: successes as f64 / state.samples.len() as f64,
            window_size: state.samples.len(),
            total_requests: state.total_requests,
            failed_requests: state.failed_requests,
            network_failures: state.network_failures,
            format_failures: state.format_failures,
        }
    }
}

/// One collector per provider
pub struct MetricsRegistry {
    coingecko: MetricsCollector,
    coincap: MetricsCollector,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self {
            coingecko: MetricsCollector::new(ProviderId::CoinGecko.name()),
            coincap: MetricsCollector::new(ProviderId::CoinCap.name()),
        }
    }

    pub fn collector(&self, provider: ProviderId) -> &MetricsCollector {
        match provider {
            ProviderId::CoinGecko => &self.coingecko,
            ProviderId::CoinCap => &self.coincap,
        }
    }

    /// Metrics for both providers, CoinGecko first
    pub async fn snapshot(&self) -> Vec<ProviderMetrics> {
        let mut out = Vec::with_capacity(2);
        for provider in ProviderId::all() {
            out.push(self.collector(provider).get_metrics().await);
        }
        out
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Calculate percentile from sorted values
fn percentile(sorted_values: &[f64], p: f64) -> f64 {
    if sorted_values.is_empty() {
        return 0.0;
    }

    let idx = (p / 100.0 * (sorted_values.len() - 1) as f64).round() as usize;
    sorted_values[idx.min(sorted_values.len() - 1)]
}
