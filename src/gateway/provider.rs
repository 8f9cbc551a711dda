use crate::gateway::errors::GatewayError;
use crate::gateway::types::CallUsage;
use async_trait::async_trait;

/// The single shape every concrete model backend must implement.
///
/// Every layer that needs an LLM goes through an `AiProvider` wrapped by a
/// [`crate::gateway::ModelGateway`] — nothing calls a provider directly, so
/// rate limiting, circuit breaking, retries and schema validation are
/// applied uniformly regardless of which layer is asking.
#[async_trait]
pub trait AiProvider: Send + Sync {
    /// Issue one chat-style completion. Returns the raw response text (the
    /// gateway is responsible for parsing/validating it against a schema)
    /// plus token usage for cost accounting.
    async fn call_llm(
        &self,
        system_prompt: Option<&str>,
        user_prompt: &str,
    ) -> Result<(String, CallUsage), GatewayError>;

    /// Identifier used in logs, trace events and cost tables.
    fn name(&self) -> &str;
}
