use crate::gateway::errors::GatewayError;
use crate::gateway::provider::AiProvider;
use crate::gateway::types::CallUsage;
use async_trait::async_trait;
use std::sync::Arc;

/// Composes a preferred provider with a fallback, trying the fallback only
/// when the preferred provider fails with a recoverable error.
///
/// Used by the Tier Router when a posting's tier wants a cheaper model for
/// a `simple` task class but a stronger one is also configured — the cheap
/// model is primary, the strong one is the safety net.
pub struct HybridGateway {
    primary: Arc<dyn AiProvider>,
    fallback: Option<Arc<dyn AiProvider>>,
}

impl HybridGateway {
    pub fn new(primary: Arc<dyn AiProvider>, fallback: Option<Arc<dyn AiProvider>>) -> Self {
        Self { primary, fallback }
    }
}

#[async_trait]
impl AiProvider for HybridGateway {
    async fn call_llm(
        &self,
        system_prompt: Option<&str>,
        user_prompt: &str,
    ) -> Result<(String, CallUsage), GatewayError> {
        match self.primary.call_llm(system_prompt, user_prompt).await {
            Ok(result) => Ok(result),
            Err(error) => {
                let Some(fallback) = &self.fallback else {
                    return Err(error);
                };
                if !error.is_recoverable_by_fallback() {
                    return Err(error);
                }
                log::warn!(
                    "primary provider '{}' failed ({}), falling back to '{}'",
                    self.primary.name(),
                    error,
                    fallback.name()
                );
                fallback.call_llm(system_prompt, user_prompt).await
            }
        }
    }

    fn name(&self) -> &str {
        self.primary.name()
    }
}
