//! Persisted gateway configuration: which mode (cloud/mock/hybrid) and
//! model id back each task class, read from the `gateway_settings` table
//! the document store owns.

use crate::errors::{ConfigurationError, StorageError};
use crate::secure_storage::{get_secret, store_secret};
use crate::store::get_connection;
use rusqlite::OptionalExtension;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum GatewayMode {
    Cloud,
    Mock,
    Hybrid,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct GatewaySettings {
    pub mode: GatewayMode,
    pub model_name: Option<String>,
    pub fallback_model_name: Option<String>,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            mode: GatewayMode::Cloud,
            model_name: None,
            fallback_model_name: None,
        }
    }
}

/// Loads persisted gateway settings, or the defaults if none have ever
/// been saved (a fresh document store has no `gateway_settings` row yet,
/// see `store::migration_004_gateway_settings`).
pub fn load_gateway_settings() -> Result<GatewaySettings, StorageError> {
    let conn = get_connection()?;
    let row: Option<(String, Option<String>)> = conn
        .query_row("SELECT mode, model_name FROM gateway_settings WHERE id = 1", [], |row| {
            Ok((row.get(0)?, row.get(1)?))
        })
        .optional()?;

    match row {
        Some((mode, model_name)) => {
            let mode = match mode.as_str() {
                "cloud" => GatewayMode::Cloud,
                "mock" => GatewayMode::Mock,
                "hybrid" => GatewayMode::Hybrid,
                _ => GatewayMode::Cloud,
            };
            Ok(GatewaySettings { mode, model_name, fallback_model_name: None })
        }
        None => Ok(GatewaySettings::default()),
    }
}

pub fn save_gateway_settings(settings: &GatewaySettings) -> Result<(), StorageError> {
    let conn = get_connection()?;
    let mode = match settings.mode {
        GatewayMode::Cloud => "cloud",
        GatewayMode::Mock => "mock",
        GatewayMode::Hybrid => "hybrid",
    };
    conn.execute(
        "INSERT INTO gateway_settings (id, mode, model_name, updated_at)
         VALUES (1, ?1, ?2, datetime('now'))
         ON CONFLICT(id) DO UPDATE SET mode = excluded.mode, model_name = excluded.model_name, updated_at = excluded.updated_at",
        rusqlite::params![mode, settings.model_name],
    )?;
    Ok(())
}

const API_KEY_SECRET_NAME: &str = "gateway_api_key";

pub fn load_api_key() -> Result<String, ConfigurationError> {
    get_secret(API_KEY_SECRET_NAME)
        .map_err(|e| ConfigurationError::Other(format!("failed to read stored API key: {}", e)))?
        .ok_or_else(|| ConfigurationError::SettingNotFound("gateway API key".to_string()))
}

pub fn save_api_key(key: &str) -> Result<(), ConfigurationError> {
    if key.is_empty() {
        return Err(ConfigurationError::InvalidValue("API key cannot be empty".to_string()));
    }
    store_secret(API_KEY_SECRET_NAME, key).map_err(|e| ConfigurationError::Other(format!("failed to store API key: {}", e)))
}
