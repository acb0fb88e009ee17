/// Centralized argument handling for lanescout
///
/// Stores a thread-safe copy of the process arguments so the logger and
/// subsystems can check debug flags without re-reading the environment.
/// Binaries and tests can override the stored arguments via `set_cmd_args`.
use once_cell::sync::Lazy;
use std::env;
use std::sync::Mutex;

/// Global command-line arguments storage
pub static CMD_ARGS: Lazy<Mutex<Vec<String>>> = Lazy::new(|| Mutex::new(env::args().collect()));

/// Override the stored command-line arguments (used by tests)
pub fn set_cmd_args(args: Vec<String>) {
    if let Ok(mut cmd_args) = CMD_ARGS.lock() {
        *cmd_args = args;
    }
}

/// Get a copy of the current command-line arguments
pub fn get_cmd_args() -> Vec<String> {
    match CMD_ARGS.lock() {
        Ok(args) => args.clone(),
        Err(_) => env::args().collect(),
    }
}

/// Check if a specific argument is present
pub fn has_arg(arg: &str) -> bool {
    get_cmd_args().iter().any(|a| a == arg)
}

// =============================================================================
// DEBUG FLAG CHECKING FUNCTIONS
// =============================================================================

/// API client debug mode
pub fn is_debug_api_enabled() -> bool {
    has_arg("--debug-api")
}

/// Collection job debug mode
pub fn is_debug_collector_enabled() -> bool {
    has_arg("--debug-collector")
}

/// Cache store debug mode
pub fn is_debug_cache_enabled() -> bool {
    has_arg("--debug-cache")
}

/// Backfill queue debug mode
pub fn is_debug_backfill_enabled() -> bool {
    has_arg("--debug-backfill")
}

/// Scheduler debug mode
pub fn is_debug_scheduler_enabled() -> bool {
    has_arg("--debug-scheduler")
}

/// Verbose mode - enables all debug and verbose output
pub fn is_verbose_enabled() -> bool {
    has_arg("--verbose")
}

/// Quiet mode - suppresses info-level output
pub fn is_quiet_enabled() -> bool {
    has_arg("--quiet")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overridden_args_are_visible() {
        set_cmd_args(vec!["lanescout".to_string(), "--debug-api".to_string()]);
        assert!(is_debug_api_enabled());
        assert!(!is_debug_cache_enabled());
        set_cmd_args(vec!["lanescout".to_string()]);
    }
}
