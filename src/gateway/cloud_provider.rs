use crate::gateway::errors::GatewayError;
use crate::gateway::provider::AiProvider;
use crate::gateway::types::CallUsage;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

/// Which hosted chat-completions API a [`CloudProvider`] talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloudBackend {
    OpenAiCompatible,
}

/// A cloud-hosted model reached over HTTP.
///
/// Mirrors the teacher's OpenAI client: bearer auth, JSON-mode chat
/// completions, and the same 401/429 → typed-error mapping.
pub struct CloudProvider {
    backend: CloudBackend,
    api_base: String,
    api_key: String,
    model_name: String,
    client: Client,
}

impl CloudProvider {
    pub fn new(backend: CloudBackend, api_base: impl Into<String>, api_key: String, model_name: String) -> Self {
        Self {
            backend,
            api_base: api_base.into(),
            api_key,
            model_name,
            client: Client::new(),
        }
    }

    pub fn openai(api_key: String, model_name: String) -> Self {
        Self::new(
            CloudBackend::OpenAiCompatible,
            "https://api.openai.com/v1/chat/completions",
            api_key,
            model_name,
        )
    }
}

#[async_trait]
impl AiProvider for CloudProvider {
    async fn call_llm(
        &self,
        system_prompt: Option<&str>,
        user_prompt: &str,
    ) -> Result<(String, CallUsage), GatewayError> {
        match self.backend {
            CloudBackend::OpenAiCompatible => {
                let mut messages = Vec::new();
                if let Some(system) = system_prompt {
                    messages.push(json!({"role": "system", "content": system}));
                }
                messages.push(json!({"role": "user", "content": user_prompt}));

                let response = self
                    .client
                    .post(&self.api_base)
                    .header("Authorization", format!("Bearer {}", self.api_key))
                    .header("Content-Type", "application/json")
                    .json(&json!({
                        "model": self.model_name,
                        "messages": messages,
                        // Low temperature favors reproducibility, which the
                        // round-trip property requires for a fixed tier.
                        "temperature": 0.2,
                        "response_format": {"type": "json_object"},
                    }))
                    .send()
                    .await
                    .map_err(|e| GatewayError::NetworkError(e.to_string()))?;

                if response.status() == 401 {
                    return Err(GatewayError::InvalidApiKey);
                }
                if response.status() == 429 {
                    return Err(GatewayError::RateLimited);
                }
                if !response.status().is_success() {
                    let body = response.text().await.unwrap_or_else(|_| "unknown error".to_string());
                    return Err(GatewayError::NetworkError(format!("provider error: {}", body)));
                }

                let body: Value = response
                    .json()
                    .await
                    .map_err(|e| GatewayError::SchemaMismatch(e.to_string()))?;

                let content = body
                    .get("choices")
                    .and_then(|c| c.get(0))
                    .and_then(|c| c.get("message"))
                    .and_then(|m| m.get("content"))
                    .and_then(|c| c.as_str())
                    .ok_or_else(|| GatewayError::SchemaMismatch("missing content in response".to_string()))?
                    .to_string();

                let usage = body
                    .get("usage")
                    .map(|u| CallUsage {
                        prompt_tokens: u.get("prompt_tokens").and_then(|v| v.as_u64()).unwrap_or(0) as u32,
                        completion_tokens: u.get("completion_tokens").and_then(|v| v.as_u64()).unwrap_or(0) as u32,
                        cost_usd_millis: 0,
                    })
                    .unwrap_or_default();

                Ok((content, usage))
            }
        }
    }

    fn name(&self) -> &str {
        &self.model_name
    }
}
