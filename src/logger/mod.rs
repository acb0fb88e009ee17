//! Structured logging for lanescout
//!
//! Provides a tag-based logging API with standard levels, per-module debug
//! control via `--debug-<module>` flags, and dual output (colored console +
//! optional file persistence).
//!
//! ## Usage
//!
//! ```rust
//! use lanescout::logger::{self, LogTag};
//!
//! logger::error(LogTag::Api, "Request failed");
//! logger::info(LogTag::Collector, "Processing phase complete");
//! logger::debug(LogTag::Cache, "Upsert chunk committed"); // Only with --debug-cache
//! ```
//!
//! Call `logger::init(None)` once at startup, before any logging occurs.

mod format;
mod levels;
mod tags;

pub use levels::LogLevel;
pub use tags::LogTag;

use crate::arguments;
use once_cell::sync::Lazy;
use std::collections::HashSet;
use std::sync::RwLock;

#[derive(Debug, Clone)]
struct LoggerConfig {
    min_level: LogLevel,
    debug_tags: HashSet<String>,
    verbose: bool,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            min_level: LogLevel::Info,
            debug_tags: HashSet::new(),
            verbose: false,
        }
    }
}

static LOGGER_CONFIG: Lazy<RwLock<LoggerConfig>> =
    Lazy::new(|| RwLock::new(LoggerConfig::default()));

/// Initialize the logger system
///
/// Scans the command-line arguments for `--debug-<module>`, `--verbose` and
/// `--quiet` flags, then opens the file sink when a path is given. Must be
/// called once at startup.
pub fn init(file_path: Option<&str>) {
    let mut config = LoggerConfig::default();

    for arg in arguments::get_cmd_args() {
        if let Some(key) = arg.strip_prefix("--debug-") {
            config.debug_tags.insert(key.to_string());
        }
    }
    if arguments::is_verbose_enabled() {
        config.min_level = LogLevel::Verbose;
        config.verbose = true;
    } else if arguments::is_quiet_enabled() {
        config.min_level = LogLevel::Warning;
    }

    if let Ok(mut guard) = LOGGER_CONFIG.write() {
        *guard = config;
    }

    if let Some(path) = file_path {
        format::init_file_logging(path);
    }
}

/// Filtering rules:
/// 1. Errors are always shown
/// 2. Debug requires the `--debug-<module>` flag for that tag
/// 3. Verbose requires `--verbose`
/// 4. Everything else compares against the minimum level threshold
fn should_log(tag: &LogTag, level: LogLevel) -> bool {
    if level == LogLevel::Error {
        return true;
    }

    let config = match LOGGER_CONFIG.read() {
        Ok(guard) => guard.clone(),
        Err(_) => return true,
    };

    match level {
        LogLevel::Debug => config.verbose || config.debug_tags.contains(tag.debug_key()),
        LogLevel::Verbose => config.verbose,
        _ => level <= config.min_level,
    }
}

fn log_internal(tag: LogTag, level: LogLevel, message: &str) {
    if !should_log(&tag, level) {
        return;
    }
    format::format_and_log(tag, level.as_str(), message);
}

/// Log at ERROR level (always shown, critical issues)
pub fn error(tag: LogTag, message: &str) {
    log_internal(tag, LogLevel::Error, message);
}

/// Log at WARNING level (important issues)
pub fn warning(tag: LogTag, message: &str) {
    log_internal(tag, LogLevel::Warning, message);
}

/// Log at INFO level (standard operations)
pub fn info(tag: LogTag, message: &str) {
    log_internal(tag, LogLevel::Info, message);
}

/// Log at DEBUG level, gated by `--debug-<module>` for the tag
pub fn debug(tag: LogTag, message: &str) {
    log_internal(tag, LogLevel::Debug, message);
}

/// Log at VERBOSE level, gated by `--verbose`
pub fn verbose(tag: LogTag, message: &str) {
    log_internal(tag, LogLevel::Verbose, message);
}

/// Force flush all pending log writes (call during shutdown)
pub fn flush() {
    format::flush_file_logging();
}
