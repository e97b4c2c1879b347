//! Plugin-specific error handling utilities
//!
//! Convenience functions that delegate to the generic error logging in core,
//! so plugin code never has to name the `ContextualError` machinery.

use crate::core::error_handling::{log_error_with_context, warn_error_with_context};
use crate::plugin::error::PluginError;

/// Log a plugin error the host could not recover from for this plugin
pub fn log_plugin_error_with_context(error: &PluginError, operation_context: &str) {
    log_error_with_context(error, operation_context);
}

/// Log a plugin error that was tolerated (best-effort teardown, skipped manifest)
pub fn warn_plugin_error_with_context(error: &PluginError, operation_context: &str) {
    warn_error_with_context(error, operation_context);
}
