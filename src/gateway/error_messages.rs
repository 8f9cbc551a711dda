//! Turns a [`GatewayError`] into something safe to surface on a degraded
//! event or in a CLI exit message, with recovery hints for the operator.

use crate::gateway::errors::GatewayError;

#[derive(Debug, Clone)]
pub struct UserFriendlyError {
    pub message: String,
    pub suggestions: Vec<String>,
    pub recoverable: bool,
    pub requires_action: bool,
}

impl UserFriendlyError {
    fn new(message: impl Into<String>, suggestions: Vec<&str>, recoverable: bool, requires_action: bool) -> Self {
        Self {
            message: message.into(),
            suggestions: suggestions.into_iter().map(String::from).collect(),
            recoverable,
            requires_action,
        }
    }
}

pub fn to_user_friendly_error(error: &GatewayError) -> UserFriendlyError {
    match error {
        GatewayError::InvalidApiKey => UserFriendlyError::new(
            "the configured API key was rejected",
            vec!["check the key in the gateway settings", "generate a new key if it was revoked"],
            false,
            true,
        ),
        GatewayError::RateLimited => UserFriendlyError::new(
            "rate limited by the model provider",
            vec!["the gateway will back off and retry automatically"],
            true,
            false,
        ),
        GatewayError::NetworkError(msg) => {
            let message = if msg.contains("timeout") || msg.contains("timed out") {
                "connection to the model provider timed out".to_string()
            } else if msg.contains("connection") || msg.contains("refused") {
                "could not reach the model provider".to_string()
            } else {
                format!("network error: {}", msg)
            };
            UserFriendlyError::new(message, vec!["check network connectivity", "retry in a moment"], true, false)
        }
        GatewayError::SchemaMismatch(msg) => UserFriendlyError::new(
            format!("model response did not match the expected schema: {}", msg),
            vec!["the gateway will request a schema-corrected retry"],
            true,
            false,
        ),
        GatewayError::ModelNotFound => UserFriendlyError::new(
            "the configured model id was not found",
            vec!["check the model name in the tier policy"],
            false,
            true,
        ),
        GatewayError::ProviderUnavailable => UserFriendlyError::new(
            "the provider's circuit breaker is open",
            vec!["wait for the cooldown to elapse", "a fallback provider will be tried if configured"],
            true,
            false,
        ),
        GatewayError::Timeout => UserFriendlyError::new(
            "the call exceeded its deadline",
            vec!["the job's remaining budget determines whether this is retried"],
            true,
            false,
        ),
        GatewayError::Cancelled => UserFriendlyError::new("the call was cancelled", vec![], false, false),
        GatewayError::BudgetExhausted => UserFriendlyError::new(
            "the run's token or wall-clock budget is exhausted",
            vec!["increase the run budget or reduce tier scope"],
            false,
            true,
        ),
        GatewayError::Unknown(msg) => UserFriendlyError::new(
            format!("an unexpected gateway error occurred: {}", msg),
            vec!["retry in a moment"],
            true,
            false,
        ),
    }
}

pub fn get_short_message(error: &GatewayError) -> String {
    to_user_friendly_error(error).message
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_api_key_requires_action() {
        let friendly = to_user_friendly_error(&GatewayError::InvalidApiKey);
        assert!(friendly.message.contains("API key"));
        assert!(!friendly.recoverable);
        assert!(friendly.requires_action);
    }

    #[test]
    fn rate_limited_is_recoverable() {
        let friendly = to_user_friendly_error(&GatewayError::RateLimited);
        assert!(friendly.recoverable);
        assert!(!friendly.requires_action);
    }

    #[test]
    fn network_error_detects_timeout() {
        let friendly = to_user_friendly_error(&GatewayError::NetworkError("connection timed out".to_string()));
        assert!(friendly.message.contains("timed out"));
    }
}
