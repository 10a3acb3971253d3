//! Failover coordinator with a sticky primary provider
//!
//! Each cache owns one [`FailoverState`]. A refresh cycle tries the current
//! primary first and the other provider second. The provider that serves the
//! cycle becomes (or stays) primary; a cycle where both fail leaves the state
//! untouched.

use crate::{
    error::{ProviderError, ProviderFailure},
    metrics::MetricsRegistry,
    types::ProviderId,
};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tokio::time::sleep;

/// Which provider a cache tries first
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FailoverState {
    primary: ProviderId,
}

impl FailoverState {
    pub fn new(primary: ProviderId) -> Self {
        Self { primary }
    }

    pub fn primary(&self) -> ProviderId {
        self.primary
    }

    /// Attempt order for the next cycle
    pub fn order(&self) -> [ProviderId; 2] {
        [self.primary, self.primary.other()]
    }

    /// Demotes `from` in favour of `to` if `from` is still the primary
    ///
    /// Returns true if the primary changed. A cycle that started before
    /// another cycle's demotion cannot undo it.
    fn record_fallback(&mut self, from: ProviderId, to: ProviderId) -> bool {
        if self.primary == from && from != to {
            self.primary = to;
            true
        } else {
            false
        }
    }
}

/// Retry budget for a refresh cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttemptPolicy {
    /// When the current primary is this provider it gets one retry after the retry delay
    retried_primary: Option<ProviderId>,
}

impl AttemptPolicy {
    /// Every provider gets exactly one attempt
    pub const fn single() -> Self {
        Self {
            retried_primary: None,
        }
    }

    /// `provider` gets one retry when it is the primary
    pub const fn retry_primary(provider: ProviderId) -> Self {
        Self {
            retried_primary: Some(provider),
        }
    }

    fn attempts(&self, provider: ProviderId, is_primary: bool) -> u32 {
        if is_primary && self.retried_primary == Some(provider) {
            2
        } else {
            1
        }
    }
}

/// A successful refresh cycle
#[derive(Debug)]
pub struct Served<T> {
    pub provider: ProviderId,
    pub value: T,
    /// The value came from the non-primary provider
    pub failed_over: bool,
    /// Failed attempts made before the successful one
    pub failures: Vec<ProviderFailure>,
}

/// Drives provider calls for a refresh cycle
pub struct FailoverCoordinator {
    retry_delay: Duration,
    metrics: Arc<MetricsRegistry>,
}

impl FailoverCoordinator {
    pub fn new(retry_delay: Duration, metrics: Arc<MetricsRegistry>) -> Self {
        Self {
            retry_delay,
            metrics,
        }
    }

    /// Runs one refresh cycle against the primary named by `state`, then the other provider
    ///
    /// A fallback success demotes the primary the cycle started with. On total failure
    /// the state is unchanged and every failed attempt is returned.
    pub async fn run<T, F, Fut>(
        &self,
        state: &RwLock<FailoverState>,
        policy: AttemptPolicy,
        mut call: F,
    ) -> Result<Served<T>, Vec<ProviderFailure>>
    where
        F: FnMut(ProviderId) -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let order = state.read().await.order();
        let primary = order[0];
        let mut failures = Vec::new();

        for provider in order {
            let attempts = policy.attempts(provider, provider == primary);
            if let Some(value) = self
                .attempt(provider, attempts, &mut call, &mut failures)
                .await
            {
                // A primary success never transitions the state
                if provider != primary && state.write().await.record_fallback(primary, provider) {
                    tracing::info!(
                        from = %primary,
                        to = %provider,
                        "Primary provider switched after fallback success"
                    );
                }
                return Ok(Served {
                    provider,
                    value,
                    failed_over: provider != primary,
                    failures,
                });
            }
        }

        Err(failures)
    }

    /// Runs a cycle against a single provider, bypassing and never changing any failover state
    pub async fn run_pinned<T, F, Fut>(
        &self,
        provider: ProviderId,
        attempts: u32,
        mut call: F,
    ) -> Result<Served<T>, Vec<ProviderFailure>>
    where
        F: FnMut(ProviderId) -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let mut failures = Vec::new();
        match self
            .attempt(provider, attempts, &mut call, &mut failures)
            .await
        {
            Some(value) => Ok(Served {
                provider,
                value,
                failed_over: false,
                failures,
            }),
            None => Err(failures),
        }
    }

    async fn attempt<T, F, Fut>(
        &self,
        provider: ProviderId,
        attempts: u32,
        call: &mut F,
        failures: &mut Vec<ProviderFailure>,
    ) -> Option<T>
    where
        F: FnMut(ProviderId) -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let attempts = attempts.max(1);
        let collector = self.metrics.collector(provider);

        for attempt in 1..=attempts {
            if attempt > 1 {
                sleep(self.retry_delay).await;
            }

            let start = Instant::now();
            match call(provider).await {
                Ok(value) => {
                    collector.record_request(start.elapsed(), Ok(())).await;
                    tracing::debug!(
                        provider = %provider,
                        attempt = attempt,
                        latency_ms = start.elapsed().as_millis() as u64,
                        "Provider call succeeded"
                    );
                    return Some(value);
                }
                Err(e) => {
                    let failure = ProviderFailure::new(provider, &e);
                    collector
                        .record_request(start.elapsed(), Err(failure.kind))
                        .await;
                    tracing::warn!(
                        provider = %provider,
                        attempt = attempt,
                        max_attempts = attempts,
                        kind = %failure.kind,
                        error = %e,
                        "Provider call failed"
                    );
                    failures.push(failure);
                    if matches!(e, ProviderError::Unsupported(_)) {
                        break;
                    }
                }
            }
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FailureKind;
    use std::collections::HashMap;
    use std::future::ready;
    use std::sync::Mutex;

    /// Scripted outcomes per provider; missing entries fail
    struct Script {
        outcomes: Mutex<HashMap<ProviderId, Vec<bool>>>,
        calls: Mutex<Vec<ProviderId>>,
    }

    impl Script {
        fn new(a: &[bool], b: &[bool]) -> Self {
            let mut outcomes = HashMap::new();
            outcomes.insert(ProviderId::CoinGecko, a.to_vec());
            outcomes.insert(ProviderId::CoinCap, b.to_vec());
            Self {
                outcomes: Mutex::new(outcomes),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn call(&self, provider: ProviderId) -> Result<&'static str, ProviderError> {
            self.calls.lock().unwrap().push(provider);
            let mut outcomes = self.outcomes.lock().unwrap();
            let queue = outcomes.get_mut(&provider).unwrap();
            let ok = if queue.is_empty() { false } else { queue.remove(0) };
            if ok {
                Ok(provider.name())
            } else {
                Err(ProviderError::Timeout)
            }
        }

        fn calls(&self) -> Vec<ProviderId> {
            self.calls.lock().unwrap().clone()
        }
    }

    fn coordinator() -> FailoverCoordinator {
        FailoverCoordinator::new(Duration::ZERO, Arc::new(MetricsRegistry::new()))
    }

    #[tokio::test]
    async fn test_primary_success_keeps_state() {
        let state = RwLock::new(FailoverState::new(ProviderId::CoinGecko));
        let script = Script::new(&[true], &[]);

        let served = coordinator()
            .run(&state, AttemptPolicy::single(), |p| ready(script.call(p)))
            .await
            .unwrap();

        assert_eq!(served.provider, ProviderId::CoinGecko);
        assert!(!served.failed_over);
        assert_eq!(state.read().await.primary(), ProviderId::CoinGecko);
        assert_eq!(script.calls(), vec![ProviderId::CoinGecko]);
    }

    #[tokio::test]
    async fn test_fallback_success_switches_primary() {
        let state = RwLock::new(FailoverState::new(ProviderId::CoinGecko));
        let script = Script::new(&[false], &[true, true]);
        let coordinator = coordinator();

        let served = coordinator
            .run(&state, AttemptPolicy::single(), |p| ready(script.call(p)))
            .await
            .unwrap();
        assert_eq!(served.provider, ProviderId::CoinCap);
        assert!(served.failed_over);
        assert_eq!(served.failures.len(), 1);
        assert_eq!(state.read().await.primary(), ProviderId::CoinCap);

        // Next cycle starts with the new primary
        coordinator
            .run(&state, AttemptPolicy::single(), |p| ready(script.call(p)))
            .await
            .unwrap();
        assert_eq!(
            script.calls(),
            vec![ProviderId::CoinGecko, ProviderId::CoinCap, ProviderId::CoinCap]
        );
    }

    #[tokio::test]
    async fn test_total_failure_leaves_state() {
        let state = RwLock::new(FailoverState::new(ProviderId::CoinCap));
        let script = Script::new(&[false], &[false]);

        let failures = coordinator()
            .run(&state, AttemptPolicy::single(), |p| ready(script.call(p)))
            .await
            .unwrap_err();

        assert_eq!(failures.len(), 2);
        assert_eq!(failures[0].provider, ProviderId::CoinCap);
        assert_eq!(failures[1].provider, ProviderId::CoinGecko);
        assert_eq!(failures[0].kind, FailureKind::Network);
        assert_eq!(state.read().await.primary(), ProviderId::CoinCap);
    }

    #[tokio::test]
    async fn test_retried_primary_gets_second_attempt() {
        let state = RwLock::new(FailoverState::new(ProviderId::CoinGecko));
        let script = Script::new(&[false, true], &[]);

        let served = coordinator()
            .run(
                &state,
                AttemptPolicy::retry_primary(ProviderId::CoinGecko),
                |p| ready(script.call(p)),
            )
            .await
            .unwrap();

        assert_eq!(served.provider, ProviderId::CoinGecko);
        assert_eq!(
            script.calls(),
            vec![ProviderId::CoinGecko, ProviderId::CoinGecko]
        );
    }

    #[tokio::test]
    async fn test_retry_only_applies_to_primary() {
        let state = RwLock::new(FailoverState::new(ProviderId::CoinCap));
        let script = Script::new(&[false, false], &[false]);

        coordinator()
            .run(
                &state,
                AttemptPolicy::retry_primary(ProviderId::CoinGecko),
                |p| ready(script.call(p)),
            )
            .await
            .unwrap_err();

        assert_eq!(
            script.calls(),
            vec![ProviderId::CoinCap, ProviderId::CoinGecko]
        );
    }

    #[tokio::test]
    async fn test_pinned_never_calls_other_provider() {
        let script = Script::new(&[false, false], &[true]);

        let failures = coordinator()
            .run_pinned(ProviderId::CoinGecko, 2, |p| ready(script.call(p)))
            .await
            .unwrap_err();

        assert_eq!(failures.len(), 2);
        assert_eq!(
            script.calls(),
            vec![ProviderId::CoinGecko, ProviderId::CoinGecko]
        );
    }

    #[tokio::test]
    async fn test_attempts_are_recorded_in_metrics() {
        let metrics = Arc::new(MetricsRegistry::new());
        let coordinator = FailoverCoordinator::new(Duration::ZERO, metrics.clone());
        let state = RwLock::new(FailoverState::new(ProviderId::CoinGecko));
        let script = Script::new(&[false], &[true]);

        coordinator
            .run(&state, AttemptPolicy::single(), |p| ready(script.call(p)))
            .await
            .unwrap();

        let snapshot = metrics.snapshot().await;
        assert_eq!(snapshot[0].failed_requests, 1);
        assert_eq!(snapshot[1].total_requests, 1);
        assert_eq!(snapshot[1].failed_requests, 0);
    }

    #[tokio::test]
    async fn test_concurrent_primary_success_keeps_demotion() {
        let state = RwLock::new(FailoverState::new(ProviderId::CoinGecko));
        let coordinator = coordinator();
        let (release, released) = tokio::sync::oneshot::channel::<()>();

        // Slow cycle: CoinGecko answers only after the fast cycle has failed over
        let mut released = Some(released);
        let slow = coordinator.run(&state, AttemptPolicy::single(), |p| {
            let released = released.take();
            async move {
                if let Some(released) = released {
                    let _ = released.await;
                }
                Ok::<_, ProviderError>(p.name())
            }
        });

        // Fast cycle: CoinGecko fails, CoinCap succeeds and releases the slow cycle
        let mut release = Some(release);
        let fast = coordinator.run(&state, AttemptPolicy::single(), |p| {
            let release = if p == ProviderId::CoinCap { release.take() } else { None };
            async move {
                match p {
                    ProviderId::CoinGecko => Err(ProviderError::Timeout),
                    ProviderId::CoinCap => {
                        if let Some(release) = release {
                            let _ = release.send(());
                        }
                        Ok(p.name())
                    }
                }
            }
        });

        let (slow, fast) = tokio::join!(slow, fast);
        let slow = slow.unwrap();
        let fast = fast.unwrap();

        assert_eq!(slow.provider, ProviderId::CoinGecko);
        assert!(!slow.failed_over);
        assert_eq!(fast.provider, ProviderId::CoinCap);
        assert!(fast.failed_over);
        assert_eq!(state.read().await.primary(), ProviderId::CoinCap);
    }

    #[test]
    fn test_record_fallback_is_compare_and_set() {
        let mut state = FailoverState::new(ProviderId::CoinCap);
        assert!(!state.record_fallback(ProviderId::CoinGecko, ProviderId::CoinCap));
        assert_eq!(state.primary(), ProviderId::CoinCap);
        assert!(state.record_fallback(ProviderId::CoinCap, ProviderId::CoinGecko));
        assert_eq!(state.primary(), ProviderId::CoinGecko);
    }
}
