//! Unified error types for the Tailoring Core.
//!
//! Every subsystem's error enum funnels into `TailoringError`, giving
//! callers one type to match on while still preserving which layer failed.

use std::fmt;

use crate::gateway::errors::GatewayError;

/// Top-level error type returned by the pipeline and by every public
/// layer entry point.
#[derive(Debug, Clone)]
pub enum TailoringError {
    /// The document store (artifact cache, embedding cache, settings).
    Storage(StorageError),
    /// The Model Gateway or one of its providers.
    Gateway(GatewayError),
    /// Evidence/response shape failed validation against its schema or an
    /// invariant in spec §3/§8.
    Validation(ValidationError),
    /// Run configuration or gateway settings.
    Configuration(ConfigurationError),
    /// General application errors that don't fit the above.
    Application(String),
}

/// Document-store errors.
#[derive(Debug, Clone)]
pub enum StorageError {
    ConnectionFailed(String),
    QueryFailed(String),
    MigrationFailed(String),
    ConstraintViolation(String),
    NotFound(String),
    InvalidData(String),
}

/// Validation errors raised by quality gates and schema checks.
#[derive(Debug, Clone)]
pub enum ValidationError {
    MissingField(String),
    InvalidFormat(String),
    OutOfRange(String),
    BusinessRule(String),
    General(String),
}

/// Configuration errors (run config, gateway settings, curriculum source).
#[derive(Debug, Clone)]
pub enum ConfigurationError {
    SettingNotFound(String),
    InvalidValue(String),
    FileNotFound(String),
    ParseError(String),
    Other(String),
}

impl fmt::Display for TailoringError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TailoringError::Storage(e) => write!(f, "storage error: {}", e),
            TailoringError::Gateway(e) => write!(f, "gateway error: {}", e),
            TailoringError::Validation(e) => write!(f, "validation error: {}", e),
            TailoringError::Configuration(e) => write!(f, "configuration error: {}", e),
            TailoringError::Application(msg) => write!(f, "application error: {}", msg),
        }
    }
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::ConnectionFailed(msg) => write!(f, "connection failed: {}", msg),
            StorageError::QueryFailed(msg) => write!(f, "query failed: {}", msg),
            StorageError::MigrationFailed(msg) => write!(f, "migration failed: {}", msg),
            StorageError::ConstraintViolation(msg) => write!(f, "constraint violation: {}", msg),
            StorageError::NotFound(msg) => write!(f, "not found: {}", msg),
            StorageError::InvalidData(msg) => write!(f, "invalid data: {}", msg),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::MissingField(field) => write!(f, "missing required field: {}", field),
            ValidationError::InvalidFormat(msg) => write!(f, "invalid format: {}", msg),
            ValidationError::OutOfRange(msg) => write!(f, "value out of range: {}", msg),
            ValidationError::BusinessRule(msg) => write!(f, "business rule violation: {}", msg),
            ValidationError::General(msg) => write!(f, "validation error: {}", msg),
        }
    }
}

impl fmt::Display for ConfigurationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigurationError::SettingNotFound(setting) => write!(f, "setting not found: {}", setting),
            ConfigurationError::InvalidValue(msg) => write!(f, "invalid configuration value: {}", msg),
            ConfigurationError::FileNotFound(path) => write!(f, "configuration file not found: {}", path),
            ConfigurationError::ParseError(msg) => write!(f, "failed to parse configuration: {}", msg),
            ConfigurationError::Other(msg) => write!(f, "configuration error: {}", msg),
        }
    }
}

impl std::error::Error for TailoringError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TailoringError::Gateway(e) => Some(e),
            _ => None,
        }
    }
}

impl std::error::Error for StorageError {}
impl std::error::Error for ValidationError {}
impl std::error::Error for ConfigurationError {}

impl From<StorageError> for TailoringError {
    fn from(err: StorageError) -> Self {
        TailoringError::Storage(err)
    }
}

impl From<GatewayError> for TailoringError {
    fn from(err: GatewayError) -> Self {
        TailoringError::Gateway(err)
    }
}

impl From<ValidationError> for TailoringError {
    fn from(err: ValidationError) -> Self {
        TailoringError::Validation(err)
    }
}

impl From<ConfigurationError> for TailoringError {
    fn from(err: ConfigurationError) -> Self {
        TailoringError::Configuration(err)
    }
}

impl From<rusqlite::Error> for StorageError {
    fn from(err: rusqlite::Error) -> Self {
        match err {
            rusqlite::Error::SqliteFailure(e, msg) => {
                let error_msg = msg.unwrap_or_else(|| format!("sqlite error code: {:?}", e.code));
                match e.code {
                    rusqlite::ErrorCode::ConstraintViolation => StorageError::ConstraintViolation(error_msg),
                    _ => StorageError::QueryFailed(error_msg),
                }
            }
            rusqlite::Error::QueryReturnedNoRows => StorageError::NotFound("query returned no rows".to_string()),
            _ => StorageError::QueryFailed(err.to_string()),
        }
    }
}

impl From<rusqlite::Error> for TailoringError {
    fn from(err: rusqlite::Error) -> Self {
        TailoringError::Storage(err.into())
    }
}

/// User-facing message, hiding internal detail (mirrors the teacher's
/// `to_user_message`, used by the CLI front-ends in `scripts/`).
pub fn to_user_message(error: &TailoringError) -> String {
    match error {
        TailoringError::Storage(e) => match e {
            StorageError::ConnectionFailed(_) => "failed to connect to the document store".to_string(),
            StorageError::QueryFailed(msg) => format!("document store operation failed: {}", msg),
            StorageError::MigrationFailed(_) => "document store migration failed".to_string(),
            StorageError::ConstraintViolation(msg) => format!("data conflict: {}", msg),
            StorageError::NotFound(msg) => format!("record not found: {}", msg),
            StorageError::InvalidData(msg) => format!("invalid data: {}", msg),
        },
        TailoringError::Gateway(e) => crate::gateway::error_messages::get_short_message(e),
        TailoringError::Validation(e) => match e {
            ValidationError::MissingField(field) => format!("missing required field: {}", field),
            ValidationError::InvalidFormat(msg) => msg.clone(),
            ValidationError::OutOfRange(msg) => msg.clone(),
            ValidationError::BusinessRule(msg) => msg.clone(),
            ValidationError::General(msg) => msg.clone(),
        },
        TailoringError::Configuration(e) => match e {
            ConfigurationError::SettingNotFound(setting) => format!("{} is not configured", setting),
            ConfigurationError::InvalidValue(msg) => msg.clone(),
            ConfigurationError::FileNotFound(_) => "configuration file not found".to_string(),
            ConfigurationError::ParseError(msg) => msg.clone(),
            ConfigurationError::Other(msg) => msg.clone(),
        },
        TailoringError::Application(msg) => msg.clone(),
    }
}

impl TailoringError {
    /// Log the error (with its error-metrics side effect) and return a
    /// short user-facing string; used at process boundaries (CLI exit
    /// codes, event-stream degradation messages).
    pub fn to_string_for_caller(&self) -> String {
        crate::logging::log_tailoring_error("pipeline", self);
        crate::error_logging::record_error_metric(self, "pipeline");
        to_user_message(self)
    }

    pub fn log_and_return(self, context: &str) -> Self {
        crate::logging::log_tailoring_error(context, &self);
        crate::error_logging::record_error_metric(&self, context);
        self
    }
}

impl From<TailoringError> for String {
    fn from(err: TailoringError) -> String {
        err.to_string_for_caller()
    }
}
