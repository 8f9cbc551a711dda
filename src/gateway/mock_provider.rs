use crate::gateway::errors::GatewayError;
use crate::gateway::provider::AiProvider;
use crate::gateway::types::CallUsage;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

/// Deterministic stand-in for a real model, used by tests and by the
/// template-only SKIP tier path (which issues no real LLM calls but still
/// wants a uniform provider surface).
pub struct MockProvider {
    responses: Mutex<HashMap<String, String>>,
    default_response: String,
}

impl MockProvider {
    pub fn new(default_response: impl Into<String>) -> Self {
        Self {
            responses: Mutex::new(HashMap::new()),
            default_response: default_response.into(),
        }
    }

    /// Register a canned response keyed by a prefix of the user prompt.
    pub fn register(&self, prompt_key: impl Into<String>, response: impl Into<String>) {
        self.responses.lock().unwrap().insert(prompt_key.into(), response.into());
    }

    fn key_for(prompt: &str) -> String {
        prompt.chars().take(64).collect()
    }
}

#[async_trait]
impl AiProvider for MockProvider {
    async fn call_llm(
        &self,
        _system_prompt: Option<&str>,
        user_prompt: &str,
    ) -> Result<(String, CallUsage), GatewayError> {
        let key = Self::key_for(user_prompt);
        let responses = self.responses.lock().unwrap();
        let text = responses.get(&key).cloned().unwrap_or_else(|| self.default_response.clone());
        Ok((text, CallUsage {
            prompt_tokens: (user_prompt.len() / 4) as u32,
            completion_tokens: (text.len() / 4) as u32,
            cost_usd_millis: 0,
        }))
    }

    fn name(&self) -> &str {
        "mock"
    }
}
