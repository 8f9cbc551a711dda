//! Error metrics for monitoring.
//!
//! Tracks counts and recent samples in-process; the event stream (see
//! `events.rs`) surfaces degradation to the caller, this module is for
//! after-the-fact diagnosis (logs, a future `/metrics`-style dump).

use crate::errors::TailoringError;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Debug, Clone)]
struct ErrorMetrics {
    total_errors: u64,
    errors_by_type: HashMap<String, u64>,
    errors_by_context: HashMap<String, u64>,
    recent_errors: Vec<ErrorRecord>,
}

#[derive(Debug, Clone)]
pub struct ErrorRecord {
    pub timestamp: u64,
    pub error_type: String,
    pub context: String,
    pub message: String,
    pub recoverable: bool,
}

impl ErrorMetrics {
    fn new() -> Self {
        Self {
            total_errors: 0,
            errors_by_type: HashMap::new(),
            errors_by_context: HashMap::new(),
            recent_errors: Vec::new(),
        }
    }

    fn record_error(&mut self, error: &TailoringError, context: &str) {
        self.total_errors += 1;

        let error_type = match error {
            TailoringError::Storage(_) => "Storage",
            TailoringError::Gateway(_) => "Gateway",
            TailoringError::Validation(_) => "Validation",
            TailoringError::Configuration(_) => "Configuration",
            TailoringError::Application(_) => "Application",
        };

        *self.errors_by_type.entry(error_type.to_string()).or_insert(0) += 1;
        *self.errors_by_context.entry(context.to_string()).or_insert(0) += 1;

        let timestamp = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_secs();

        let recoverable = match error {
            TailoringError::Storage(_) => false,
            TailoringError::Gateway(e) => e.is_retryable() || e.is_recoverable_by_fallback(),
            TailoringError::Validation(_) => true,
            TailoringError::Configuration(_) => false,
            TailoringError::Application(_) => true,
        };

        let record = ErrorRecord {
            timestamp,
            error_type: error_type.to_string(),
            context: context.to_string(),
            message: crate::errors::to_user_message(error),
            recoverable,
        };

        self.recent_errors.push(record);
        if self.recent_errors.len() > 100 {
            self.recent_errors.remove(0);
        }
    }
}

static ERROR_METRICS: Mutex<Option<Arc<Mutex<ErrorMetrics>>>> = Mutex::new(None);

pub fn init_error_metrics() {
    let mut guard = ERROR_METRICS.lock().unwrap();
    if guard.is_none() {
        *guard = Some(Arc::new(Mutex::new(ErrorMetrics::new())));
    }
}

pub fn record_error_metric(error: &TailoringError, context: &str) {
    if let Ok(guard) = ERROR_METRICS.lock() {
        if let Some(metrics) = guard.as_ref() {
            if let Ok(mut m) = metrics.lock() {
                m.record_error(error, context);
            }
        }
    }
}

pub fn get_error_stats() -> Option<(u64, HashMap<String, u64>, HashMap<String, u64>)> {
    let guard = ERROR_METRICS.lock().ok()?;
    let metrics = guard.as_ref()?;
    let m = metrics.lock().ok()?;
    Some((m.total_errors, m.errors_by_type.clone(), m.errors_by_context.clone()))
}

pub fn get_recent_errors(limit: usize) -> Vec<ErrorRecord> {
    let Ok(guard) = ERROR_METRICS.lock() else { return Vec::new() };
    let Some(metrics) = guard.as_ref() else { return Vec::new() };
    let Ok(m) = metrics.lock() else { return Vec::new() };
    let len = m.recent_errors.len();
    let start = len.saturating_sub(limit);
    m.recent_errors[start..].to_vec()
}
