//! Logging utilities for error tracking and debugging.

use log::LevelFilter;
use simplelog::{CombinedLogger, Config, WriteLogger};
use std::error::Error;
use std::fs::File;

use crate::store::get_app_data_dir;

static LOG_INITIALIZED: std::sync::Once = std::sync::Once::new();

/// Initialize logging to file. Safe to call more than once; only the
/// first call takes effect.
pub fn init_logging() {
    LOG_INITIALIZED.call_once(|| {
        let log_path = get_app_data_dir().join("tailoring-core.log");

        match File::options().create(true).append(true).open(&log_path) {
            Ok(log_file) => {
                let config = Config::default();
                if let Err(e) = CombinedLogger::init(vec![WriteLogger::new(
                    LevelFilter::Debug,
                    config,
                    log_file,
                )]) {
                    eprintln!("failed to initialize logger: {}", e);
                } else {
                    log::info!("=== tailoring-core logging initialized ===");
                    log::info!("log file: {}", log_path.display());
                }
            }
            Err(e) => {
                eprintln!("failed to open log file at {}: {}", log_path.display(), e);
            }
        }
    });
}

/// Install a panic hook that logs and writes a crash log, mirroring the
/// run's event stream contract: a panicking worker still leaves a trail.
pub fn setup_panic_hook() {
    std::panic::set_hook(Box::new(|panic_info| {
        let panic_message = panic_info
            .payload()
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| panic_info.payload().downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());

        let location = panic_info
            .location()
            .map(|loc| format!("{}:{}:{}", loc.file(), loc.line(), loc.column()))
            .unwrap_or_else(|| "unknown location".to_string());

        let message = format!(
            "PANIC: {}\nLocation: {}\nTime: {}",
            panic_message,
            location,
            chrono::Utc::now().to_rfc3339()
        );

        log::error!("{}", message);
        eprintln!("{}", message);

        if let Ok(mut crash_log) = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(get_app_data_dir().join("crash.log"))
        {
            use std::io::Write;
            let _ = writeln!(crash_log, "{}", message);
        }
    }));
}

#[allow(dead_code)]
pub fn log_error(context: &str, error: &dyn Error) {
    log::error!("[{}] error: {}", context, error);
    let mut current: Option<&dyn Error> = error.source();
    let mut depth = 1;
    while let Some(err) = current {
        log::error!("[{}] error chain level {}: {}", context, depth, err);
        current = err.source();
        depth += 1;
        if depth > 10 {
            log::warn!("[{}] error chain too deep, truncating", context);
            break;
        }
    }
}

/// Log a `TailoringError` with context drawn from the error's own variant,
/// so the log line carries the inner detail without the caller having to
/// match on it itself.
pub fn log_tailoring_error(context: &str, error: &crate::errors::TailoringError) {
    use crate::errors::TailoringError;

    log::error!("[{}] {}", context, error);
    match error {
        TailoringError::Storage(e) => log::error!("[{}] storage detail: {:?}", context, e),
        TailoringError::Gateway(e) => log::error!("[{}] gateway detail: {:?}", context, e),
        TailoringError::Validation(e) => log::warn!("[{}] validation detail: {:?}", context, e),
        TailoringError::Configuration(e) => log::warn!("[{}] configuration detail: {:?}", context, e),
        TailoringError::Application(msg) => log::error!("[{}] application detail: {}", context, msg),
    }

    if let Some(source) = error.source() {
        log::error!("[{}] root cause: {}", context, source);
    }
}

#[allow(dead_code)]
pub fn log_warning(context: &str, message: &str) {
    log::warn!("[{}] {}", context, message);
}

#[allow(dead_code)]
pub fn log_debug(context: &str, message: &str) {
    log::debug!("[{}] {}", context, message);
}

pub fn log_info(context: &str, message: &str) {
    log::info!("[{}] {}", context, message);
}

#[allow(dead_code)]
pub fn log_operation_error(operation: &str, context: &str, error: &dyn Error) {
    log::error!("[{}:{}] error: {}", operation, context, error);
    if let Some(source) = error.source() {
        log::error!("[{}:{}] caused by: {}", operation, context, source);
    }
}

#[allow(dead_code)]
pub fn log_error_with_timing(context: &str, error: &dyn Error, duration_ms: u64) {
    log::error!("[{}] error after {}ms: {}", context, duration_ms, error);
    if let Some(source) = error.source() {
        log::error!("[{}] caused by: {}", context, source);
    }
}
