//! Generic error handling utilities
//!
//! Provides unified error logging that works across the error types of the
//! different subsystems while keeping their domain-specific messages.

/// Trait for errors that can distinguish between user-actionable and system errors
///
/// When `is_user_actionable()` returns `true`, `user_message()` should return
/// `Some(message)` with a helpful, actionable message. When it returns `false`,
/// `user_message()` should return `None`.
pub trait ContextualError: std::error::Error {
    /// Returns true if this error carries a message the user can act on
    /// (a broken manifest, a missing plugin, a bad configuration value).
    ///
    /// System errors (IO failures, timeouts, faults inside plugin code) return false.
    fn is_user_actionable(&self) -> bool;

    /// The message to show the user for a user-actionable error
    fn user_message(&self) -> Option<&str>;
}

/// Log errors with appropriate detail level based on error specificity
///
/// User-actionable errors are logged with their own message; system errors
/// are logged with the operation context and the detail goes to debug level.
pub fn log_error_with_context<E: ContextualError + std::fmt::Display + std::fmt::Debug>(
    error: &E,
    operation_context: &str,
) {
    match error.user_message() {
        Some(user_msg) if error.is_user_actionable() => {
            log::error!("{}: {}", operation_context, user_msg);
        }
        _ => {
            log::error!("{}: {}", operation_context, error);
        }
    }
    log::debug!("DEBUG_DETAILS: {:?}", error);
}

/// Like [`log_error_with_context`] but at warn level, for failures the host recovers from
pub fn warn_error_with_context<E: ContextualError + std::fmt::Display + std::fmt::Debug>(
    error: &E,
    operation_context: &str,
) {
    match error.user_message() {
        Some(user_msg) if error.is_user_actionable() => {
            log::warn!("{}: {}", operation_context, user_msg);
        }
        _ => {
            log::warn!("{}: {}", operation_context, error);
        }
    }
    log::debug!("DEBUG_DETAILS: {:?}", error);
}
