//! API key rotation: validate a new key against the live provider before
//! committing it to secure storage, so a bad key never overwrites a good
//! one.

use crate::gateway::cloud_provider::CloudProvider;
use crate::gateway::errors::GatewayError;
use crate::gateway::provider::AiProvider;
use crate::secure_storage::{get_key_metadata, rotate_secret, should_rotate_key, KeyMetadata};

const API_KEY_SECRET_NAME: &str = "gateway_api_key";

/// Validate `new_api_key` with a throwaway probe call, then rotate it into
/// secure storage. Only a hard `InvalidApiKey` rejection blocks the
/// rotation; transient errors are logged and the rotation proceeds, since
/// they don't tell us anything about the key itself.
pub async fn rotate_api_key(new_api_key: &str, model_name: &str) -> Result<(), String> {
    if new_api_key.is_empty() {
        return Err("API key cannot be empty".to_string());
    }

    let probe = CloudProvider::openai(new_api_key.to_string(), model_name.to_string());

    log::info!("validating new gateway API key before rotation");
    match probe.call_llm(None, "respond with the single word: ok").await {
        Ok(_) => log::info!("new gateway API key validated successfully"),
        Err(GatewayError::InvalidApiKey) => {
            return Err("invalid API key: rejected by the provider".to_string());
        }
        Err(e) => {
            log::warn!("API key validation returned a transient error, proceeding with rotation: {}", e);
        }
    }

    rotate_secret(API_KEY_SECRET_NAME, new_api_key, None::<fn(&str) -> Result<(), String>>)
        .map_err(|e| format!("failed to rotate API key: {}", e))?;

    log::info!("gateway API key rotated successfully");
    Ok(())
}

pub fn get_api_key_metadata() -> Result<KeyMetadata, String> {
    get_key_metadata(API_KEY_SECRET_NAME)
}

/// Returns `Some(days_old)` when the stored key is older than `max_age_days`
/// (default 90), `None` when it's still within the recommended window.
pub fn check_api_key_rotation_needed(max_age_days: Option<u32>) -> Result<Option<u32>, String> {
    should_rotate_key(API_KEY_SECRET_NAME, max_age_days.unwrap_or(90))
}
