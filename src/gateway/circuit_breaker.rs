use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// Per-provider circuit breaker state.
///
/// After `failure_threshold` consecutive failures the breaker opens for
/// `cooldown` and every call during that window gets `ProviderUnavailable`
/// without touching the network, so the pipeline degrades deterministically
/// instead of retrying into a provider that's already down.
#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    failure_threshold: u32,
    cooldown: Duration,
    state: Arc<Mutex<BreakerState>>,
}

#[derive(Debug)]
struct BreakerState {
    consecutive_failures: u32,
    opened_at: Option<Instant>,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, cooldown: Duration) -> Self {
        Self {
            failure_threshold,
            cooldown,
            state: Arc::new(Mutex::new(BreakerState {
                consecutive_failures: 0,
                opened_at: None,
            })),
        }
    }

    pub fn default_for_provider() -> Self {
        Self::new(5, Duration::from_secs(60))
    }

    /// `true` if the breaker is currently open (calls should be rejected
    /// without attempting the provider).
    pub async fn is_open(&self) -> bool {
        let mut state = self.state.lock().await;
        if let Some(opened_at) = state.opened_at {
            if opened_at.elapsed() >= self.cooldown {
                // Cooldown elapsed: half-open, allow the next call through
                // and clear the open marker; a fresh failure reopens it.
                state.opened_at = None;
                state.consecutive_failures = 0;
                false
            } else {
                true
            }
        } else {
            false
        }
    }

    pub async fn record_success(&self) {
        let mut state = self.state.lock().await;
        state.consecutive_failures = 0;
        state.opened_at = None;
    }

    pub async fn record_failure(&self) {
        let mut state = self.state.lock().await;
        state.consecutive_failures += 1;
        if state.consecutive_failures >= self.failure_threshold && state.opened_at.is_none() {
            log::warn!(
                "circuit breaker opening after {} consecutive failures",
                state.consecutive_failures
            );
            state.opened_at = Some(Instant::now());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn opens_after_threshold_failures() {
        let breaker = CircuitBreaker::new(3, Duration::from_secs(60));
        assert!(!breaker.is_open().await);
        breaker.record_failure().await;
        breaker.record_failure().await;
        assert!(!breaker.is_open().await);
        breaker.record_failure().await;
        assert!(breaker.is_open().await);
    }

    #[tokio::test]
    async fn success_resets_failure_count() {
        let breaker = CircuitBreaker::new(2, Duration::from_secs(60));
        breaker.record_failure().await;
        breaker.record_success().await;
        breaker.record_failure().await;
        assert!(!breaker.is_open().await);
    }

    #[tokio::test]
    async fn half_opens_after_cooldown() {
        let breaker = CircuitBreaker::new(1, Duration::from_millis(20));
        breaker.record_failure().await;
        assert!(breaker.is_open().await);
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(!breaker.is_open().await);
    }
}
