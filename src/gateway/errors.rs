use std::fmt;

/// Typed error taxonomy for every Model Gateway call.
///
/// Mirrors the error kinds named in the error-handling design: a caller
/// downshifts tier or degrades based on which variant it receives rather
/// than on string matching.
#[derive(Debug, Clone)]
pub enum GatewayError {
    /// Transient network/provider failure; safe to retry with backoff.
    NetworkError(String),
    /// Provider responded but the payload didn't parse or didn't match the
    /// caller's JSON schema.
    SchemaMismatch(String),
    /// Provider returned 429 or an equivalent rate-limit signal.
    RateLimited,
    /// Provider rejected the credential outright; retrying won't help.
    InvalidApiKey,
    /// The configured model id doesn't exist for this provider.
    ModelNotFound,
    /// The circuit breaker for this provider is open.
    ProviderUnavailable,
    /// The call's deadline elapsed before a response arrived.
    Timeout,
    /// The caller's cancellation token fired before completion.
    Cancelled,
    /// The run's token or wall-clock budget has been exhausted.
    BudgetExhausted,
    /// Anything else; conservative, not retried by default.
    Unknown(String),
}

impl fmt::Display for GatewayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GatewayError::NetworkError(msg) => write!(f, "network error: {}", msg),
            GatewayError::SchemaMismatch(msg) => write!(f, "schema mismatch: {}", msg),
            GatewayError::RateLimited => write!(f, "rate limited"),
            GatewayError::InvalidApiKey => write!(f, "invalid api key"),
            GatewayError::ModelNotFound => write!(f, "model not found"),
            GatewayError::ProviderUnavailable => write!(f, "provider unavailable (circuit open)"),
            GatewayError::Timeout => write!(f, "call timed out"),
            GatewayError::Cancelled => write!(f, "call cancelled"),
            GatewayError::BudgetExhausted => write!(f, "budget exhausted"),
            GatewayError::Unknown(msg) => write!(f, "unknown error: {}", msg),
        }
    }
}

impl std::error::Error for GatewayError {}

impl GatewayError {
    /// Whether a retry with backoff is worth attempting.
    pub fn is_retryable(&self) -> bool {
        match self {
            GatewayError::NetworkError(_) => true,
            GatewayError::RateLimited => true,
            GatewayError::Timeout => true,
            GatewayError::InvalidApiKey => false,
            GatewayError::SchemaMismatch(_) => false,
            GatewayError::ModelNotFound => false,
            GatewayError::ProviderUnavailable => false,
            GatewayError::Cancelled => false,
            GatewayError::BudgetExhausted => false,
            GatewayError::Unknown(_) => false,
        }
    }

    /// Whether a hybrid gateway should fall over to its secondary provider.
    pub fn is_recoverable_by_fallback(&self) -> bool {
        match self {
            GatewayError::NetworkError(_) => true,
            GatewayError::RateLimited => true,
            GatewayError::Timeout => true,
            GatewayError::ProviderUnavailable => true,
            GatewayError::SchemaMismatch(_) => true,
            GatewayError::InvalidApiKey => false,
            GatewayError::ModelNotFound => false,
            GatewayError::Cancelled => false,
            GatewayError::BudgetExhausted => false,
            GatewayError::Unknown(msg) => {
                let msg = msg.to_lowercase();
                msg.contains("network") || msg.contains("connection") || msg.contains("timeout")
            }
        }
    }
}
