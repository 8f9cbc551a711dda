//! The Model Gateway: the only path any layer takes to reach an LLM.
//!
//! Composes a provider with rate limiting, a circuit breaker, retry with
//! backoff, a bounded schema-correction retry, and content-addressed
//! caching through the document store. Every call is identified by a
//! `purpose` string (e.g. `"jd_structurer"`, `"bullet_tailor"`) that scopes
//! the cache and shows up in logs and trace events.

pub mod circuit_breaker;
pub mod cloud_provider;
pub mod error_messages;
pub mod errors;
pub mod hybrid;
pub mod key_rotation;
pub mod mock_provider;
pub mod provider;
pub mod rate_limiter;
pub mod retry;
pub mod settings;
pub mod types;

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use crate::errors::TailoringError;
use crate::store;

use circuit_breaker::CircuitBreaker;
use errors::GatewayError;
use provider::AiProvider;
use rate_limiter::RateLimiter;
use retry::{retry_with_backoff, RetryConfig, SCHEMA_CORRECTION_RETRIES};
use types::{CallBudget, CallUsage};

/// A function that checks a raw JSON response against a caller's schema,
/// returning `Err(message)` describing what's wrong so it can be appended
/// to a schema-correction retry prompt.
pub type SchemaValidator<'a> = dyn Fn(&Value) -> Result<(), String> + Send + Sync + 'a;

pub struct ModelGateway {
    provider: Arc<dyn AiProvider>,
    rate_limiter: RateLimiter,
    circuit_breaker: CircuitBreaker,
    retry_config: RetryConfig,
    cache_ttl_days: Option<i64>,
}

impl ModelGateway {
    pub fn new(provider: Arc<dyn AiProvider>) -> Self {
        Self {
            provider,
            rate_limiter: RateLimiter::provider_default(),
            circuit_breaker: CircuitBreaker::default_for_provider(),
            retry_config: RetryConfig::default(),
            cache_ttl_days: Some(30),
        }
    }

    /// Overrides the retry/backoff schedule, mainly so tests exercising a
    /// failing provider don't have to sit through the production backoff
    /// delays.
    pub fn with_retry_config(mut self, retry_config: RetryConfig) -> Self {
        self.retry_config = retry_config;
        self
    }

    pub fn with_cache_ttl_days(mut self, days: Option<i64>) -> Self {
        self.cache_ttl_days = days;
        self
    }

    /// Issue a call expected to return JSON, validating the result against
    /// `validate` and allowing exactly [`SCHEMA_CORRECTION_RETRIES`] retries
    /// where the validation failure is appended to the prompt before giving
    /// up. A cache hit skips the network and the validator entirely: a
    /// cached response already passed validation when it was first stored.
    pub async fn call_json(
        &self,
        purpose: &str,
        system_prompt: Option<&str>,
        user_prompt: &str,
        budget: &CallBudget,
        validate: &SchemaValidator<'_>,
    ) -> Result<(Value, CallUsage), TailoringError> {
        let cache_key_payload = serde_json::json!({
            "system_prompt": system_prompt,
            "user_prompt": user_prompt,
            "model": self.provider.name(),
        });
        let input_hash = store::compute_input_hash(&cache_key_payload)?;

        let conn = store::get_connection()?;
        if let Some(entry) = store::cache_get(&conn, purpose, &input_hash)? {
            log::debug!("gateway cache hit for purpose '{}'", purpose);
            return Ok((entry.response_payload, CallUsage::default()));
        }
        drop(conn);

        if self.circuit_breaker.is_open().await {
            return Err(GatewayError::ProviderUnavailable.into());
        }

        if !self.rate_limiter.try_acquire().await {
            return Err(GatewayError::RateLimited.into());
        }

        let outcome = self.call_with_schema_correction(purpose, system_prompt, user_prompt, budget, validate).await;

        match &outcome {
            Ok(_) => self.circuit_breaker.record_success().await,
            Err(e) if e.is_retryable() || matches!(e, GatewayError::SchemaMismatch(_)) => {
                self.circuit_breaker.record_failure().await
            }
            Err(_) => {}
        }

        let (value, usage) = outcome?;

        let conn = store::get_connection()?;
        store::cache_put(
            &conn,
            purpose,
            &input_hash,
            self.provider.name(),
            &cache_key_payload,
            &value,
            self.cache_ttl_days,
        )?;

        Ok((value, usage))
    }

    async fn call_with_schema_correction(
        &self,
        purpose: &str,
        system_prompt: Option<&str>,
        user_prompt: &str,
        budget: &CallBudget,
        validate: &SchemaValidator<'_>,
    ) -> Result<(Value, CallUsage), GatewayError> {
        let mut prompt = user_prompt.to_string();
        let mut schema_attempts = 0;
        let deadline = Duration::from_millis(budget.max_wall_ms);

        loop {
            let retry_config = self.retry_config.clone();
            let provider = self.provider.clone();
            let prompt_ref = &prompt;
            let attempt = retry_with_backoff(
                || {
                    let provider = provider.clone();
                    async move { provider.call_llm(system_prompt, prompt_ref).await }
                },
                retry_config,
            );

            // Per-call deadline (spec §5: "every LLM call... [is a]
            // suspension point" with a per-call timeout); the elapsed
            // budget covers the call's own internal retries, not just a
            // single attempt.
            let (text, usage) = match tokio::time::timeout(deadline, attempt).await {
                Ok(result) => result?,
                Err(_) => {
                    log::warn!("gateway call for purpose '{}' exceeded its {}ms deadline", purpose, budget.max_wall_ms);
                    return Err(GatewayError::Timeout);
                }
            };

            if usage.total_tokens() > budget.max_tokens {
                log::warn!(
                    "gateway call for purpose '{}' exceeded token budget ({} > {})",
                    purpose,
                    usage.total_tokens(),
                    budget.max_tokens
                );
                return Err(GatewayError::BudgetExhausted);
            }

            let value: Value = match serde_json::from_str(&text) {
                Ok(v) => v,
                Err(e) => {
                    if schema_attempts >= SCHEMA_CORRECTION_RETRIES {
                        return Err(GatewayError::SchemaMismatch(format!("not valid JSON: {}", e)));
                    }
                    schema_attempts += 1;
                    prompt = format!(
                        "{}\n\nYour previous response was not valid JSON ({}). Respond again with valid JSON only.",
                        user_prompt, e
                    );
                    continue;
                }
            };

            if let Err(validation_error) = validate(&value) {
                if schema_attempts >= SCHEMA_CORRECTION_RETRIES {
                    return Err(GatewayError::SchemaMismatch(validation_error));
                }
                schema_attempts += 1;
                prompt = format!(
                    "{}\n\nYour previous response failed validation: {}. Correct it and respond again with the full JSON object.",
                    user_prompt, validation_error
                );
                continue;
            }

            return Ok((value, usage));
        }
    }
}

/// Builds a gateway from persisted settings: cloud mode resolves an API
/// key from secure storage, mock mode needs none, hybrid composes a cloud
/// primary with a mock fallback so a run degrades instead of failing
/// outright when no key is configured.
pub fn build_gateway_from_settings() -> Result<ModelGateway, TailoringError> {
    use settings::{load_api_key, load_gateway_settings, GatewayMode};

    let config = load_gateway_settings().map_err(TailoringError::Storage)?;
    let model_name = config.model_name.clone().unwrap_or_else(|| "gpt-4o-mini".to_string());

    let provider: Arc<dyn AiProvider> = match config.mode {
        GatewayMode::Mock => Arc::new(mock_provider::MockProvider::new("{}")),
        GatewayMode::Cloud => {
            let api_key = load_api_key().map_err(TailoringError::Configuration)?;
            Arc::new(cloud_provider::CloudProvider::openai(api_key, model_name))
        }
        GatewayMode::Hybrid => {
            let primary: Arc<dyn AiProvider> = match load_api_key() {
                Ok(api_key) => Arc::new(cloud_provider::CloudProvider::openai(api_key, model_name)),
                Err(_) => Arc::new(mock_provider::MockProvider::new("{}")),
            };
            let fallback: Arc<dyn AiProvider> = Arc::new(mock_provider::MockProvider::new("{}"));
            Arc::new(hybrid::HybridGateway::new(primary, Some(fallback)))
        }
    };

    Ok(ModelGateway::new(provider))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use mock_provider::MockProvider;

    #[tokio::test]
    async fn caches_identical_calls() {
        store::init_database().expect("test db init");

        let provider = Arc::new(MockProvider::new(r#"{"ok": true}"#));
        let gateway = ModelGateway::new(provider);
        let budget = CallBudget::default();
        let validate: &SchemaValidator = &|_v: &Value| Ok(());

        let (first, _) = gateway.call_json("test_purpose", None, "hello", &budget, validate).await.unwrap();
        let (second, _) = gateway.call_json("test_purpose", None, "hello", &budget, validate).await.unwrap();
        assert_eq!(first, second);
    }

    /// A provider that never returns, used to exercise the per-call
    /// deadline without depending on timing races in a real network call.
    struct StallingProvider;

    #[async_trait]
    impl AiProvider for StallingProvider {
        async fn call_llm(&self, _system_prompt: Option<&str>, _user_prompt: &str) -> Result<(String, CallUsage), GatewayError> {
            std::future::pending().await
        }

        fn name(&self) -> &str {
            "stalling"
        }
    }

    #[tokio::test]
    async fn call_times_out_per_call_deadline() {
        store::init_database().expect("test db init");

        let gateway = ModelGateway::new(Arc::new(StallingProvider))
            .with_retry_config(RetryConfig { max_retries: 0, initial_delay_ms: 1, max_delay_ms: 1, backoff_multiplier: 1.0 });
        let budget = CallBudget { max_tokens: 2_000, max_wall_ms: 20 };
        let validate: &SchemaValidator = &|_v: &Value| Ok(());

        let result = gateway.call_json("stalls_forever", None, "hello", &budget, validate).await;
        assert!(matches!(result, Err(TailoringError::Gateway(GatewayError::Timeout))));
    }

    #[tokio::test]
    async fn call_fails_when_response_exceeds_token_budget() {
        store::init_database().expect("test db init");

        let huge_response = format!(r#"{{"text": "{}"}}"#, "a".repeat(10_000));
        let provider = Arc::new(MockProvider::new(huge_response));
        let gateway = ModelGateway::new(provider);
        let budget = CallBudget { max_tokens: 10, max_wall_ms: 30_000 };
        let validate: &SchemaValidator = &|_v: &Value| Ok(());

        let result = gateway.call_json("huge_response", None, "unique prompt for budget test", &budget, validate).await;
        assert!(matches!(result, Err(TailoringError::Gateway(GatewayError::BudgetExhausted))));
    }
}
