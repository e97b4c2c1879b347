//! Plugin Error Handling
//!
//! Error types for the plugin lifecycle: discovery, loading, activation,
//! lookup, invocation and timeouts.

use crate::core::error_handling::ContextualError;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for plugin operations
pub type PluginResult<T> = std::result::Result<T, PluginError>;

/// Error types for plugin system operations
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PluginError {
    /// A manifest could not be read or parsed; only that entry is skipped
    #[error("Invalid plugin manifest at {}: {cause}", .path.display())]
    Discovery { path: PathBuf, cause: String },

    /// The entry module could not be resolved, read or executed
    #[error("Failed to load plugin '{plugin_id}' from {}: {cause}", .path.display())]
    Load {
        plugin_id: String,
        path: PathBuf,
        cause: String,
    },

    /// The module's initialization hook faulted
    #[error("Plugin '{plugin_id}' failed to activate: {cause}")]
    Activation { plugin_id: String, cause: String },

    /// Unknown plugin id, or a plugin that is not active
    #[error("Plugin not found: {plugin_id}")]
    NotFound { plugin_id: String },

    /// A plugin method faulted while being invoked
    #[error("Plugin '{plugin_id}' method '{method}' failed: {cause}")]
    Invocation {
        plugin_id: String,
        method: String,
        cause: String,
    },

    /// A plugin hook or method did not complete in time
    #[error("Plugin '{plugin_id}' timed out during {operation} after {}ms", .elapsed.as_millis())]
    Timeout {
        plugin_id: String,
        operation: String,
        elapsed: Duration,
    },

    /// Host configuration is invalid
    #[error("Configuration error: {message}")]
    Config { message: String },
}

impl PluginError {
    pub fn not_found(plugin_id: impl Into<String>) -> Self {
        PluginError::NotFound {
            plugin_id: plugin_id.into(),
        }
    }

    pub fn load(
        plugin_id: impl Into<String>,
        path: impl Into<PathBuf>,
        cause: impl ToString,
    ) -> Self {
        PluginError::Load {
            plugin_id: plugin_id.into(),
            path: path.into(),
            cause: cause.to_string(),
        }
    }

    /// Plugin id this error refers to, if any
    pub fn plugin_id(&self) -> Option<&str> {
        match self {
            PluginError::Load { plugin_id, .. }
            | PluginError::Activation { plugin_id, .. }
            | PluginError::NotFound { plugin_id }
            | PluginError::Invocation { plugin_id, .. }
            | PluginError::Timeout { plugin_id, .. } => Some(plugin_id),
            PluginError::Discovery { .. } | PluginError::Config { .. } => None,
        }
    }
}

impl ContextualError for PluginError {
    fn is_user_actionable(&self) -> bool {
        matches!(
            self,
            PluginError::Discovery { .. } | PluginError::Config { .. }
        )
    }

    fn user_message(&self) -> Option<&str> {
        match self {
            PluginError::Discovery { cause, .. } => Some(cause),
            PluginError::Config { message } => Some(message),
            _ => None,
        }
    }
}
