use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// Token-bucket rate limiter, one instance per provider.
///
/// Requests-per-second over any sliding window never exceeds
/// `max_requests / window_seconds` by construction: tokens are only
/// created by the refill computation below, never invented elsewhere.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    max_requests: u32,
    window_seconds: u64,
    tokens: Arc<Mutex<u32>>,
    last_refill: Arc<Mutex<Instant>>,
}

impl RateLimiter {
    pub fn new(max_requests: u32, window_seconds: u64) -> Self {
        Self {
            max_requests,
            window_seconds,
            tokens: Arc::new(Mutex::new(max_requests)),
            last_refill: Arc::new(Mutex::new(Instant::now())),
        }
    }

    /// Conservative default for a typical LLM provider's per-minute cap.
    pub fn provider_default() -> Self {
        Self::new(50, 60)
    }

    fn refill(&self, tokens: &mut u32, last_refill: &mut Instant) {
        let now = Instant::now();
        let elapsed = now.duration_since(*last_refill);
        let window = Duration::from_secs(self.window_seconds);

        if elapsed >= window {
            *tokens = self.max_requests;
            *last_refill = now;
        } else {
            let refilled = (elapsed.as_secs_f64() / window.as_secs_f64()
                * self.max_requests as f64) as u32;
            if refilled > 0 {
                *tokens = (*tokens + refilled).min(self.max_requests);
                *last_refill = now;
            }
        }
    }

    /// Block until a token is available, refilling based on elapsed time.
    pub async fn acquire(&self) {
        loop {
            let mut tokens = self.tokens.lock().await;
            let mut last_refill = self.last_refill.lock().await;
            self.refill(&mut tokens, &mut last_refill);

            if *tokens > 0 {
                *tokens -= 1;
                return;
            }

            let window = Duration::from_secs(self.window_seconds);
            let elapsed = Instant::now().duration_since(*last_refill);
            drop(tokens);
            drop(last_refill);

            let wait = window.saturating_sub(elapsed);
            sleep_at_least(wait).await;
        }
    }

    /// Non-blocking variant used by the gateway to fail fast with
    /// `RateLimited` rather than stalling a role sub-task indefinitely.
    pub async fn try_acquire(&self) -> bool {
        let mut tokens = self.tokens.lock().await;
        let mut last_refill = self.last_refill.lock().await;
        self.refill(&mut tokens, &mut last_refill);

        if *tokens > 0 {
            *tokens -= 1;
            true
        } else {
            false
        }
    }

    #[cfg(test)]
    pub async fn available_tokens(&self) -> u32 {
        let mut tokens = self.tokens.lock().await;
        let mut last_refill = self.last_refill.lock().await;
        self.refill(&mut tokens, &mut last_refill);
        *tokens
    }
}

async fn sleep_at_least(d: Duration) {
    if d.is_zero() {
        tokio::time::sleep(Duration::from_millis(10)).await;
    } else {
        tokio::time::sleep(d).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::Instant as TokioInstant;

    #[tokio::test]
    async fn acquires_immediately_within_budget() {
        let limiter = RateLimiter::new(2, 1);
        let start = TokioInstant::now();
        limiter.acquire().await;
        limiter.acquire().await;
        assert!(start.elapsed().as_millis() < 100);
    }

    #[tokio::test]
    async fn try_acquire_fails_when_exhausted() {
        let limiter = RateLimiter::new(1, 1);
        assert!(limiter.try_acquire().await);
        assert!(!limiter.try_acquire().await);
    }

    #[tokio::test]
    async fn refills_after_window() {
        let limiter = RateLimiter::new(1, 1);
        limiter.acquire().await;
        tokio::time::sleep(Duration::from_millis(1100)).await;
        assert_eq!(limiter.available_tokens().await, 1);
    }
}
