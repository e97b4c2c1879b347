//! Plugin Module Capabilities
//!
//! A loaded module is a [`PluginModule`]. Everything it can do beyond
//! existing is an optional capability:
//!
//! - [`Initializable`]: an `activate` hook run once when the plugin is activated
//! - [`MethodTable`]: named methods the presentation side may invoke
//! - [`Teardown`]: a best-effort `deactivate` hook
//!
//! A module that offers none of them is still a valid, activatable module.

use crate::plugin::types::ActivationContext;
use serde_json::Value;
use thiserror::Error;

/// A fault raised by plugin code
///
/// Only the message crosses the boundary.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct PluginFault {
    message: String,
}

impl PluginFault {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<String> for PluginFault {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

impl From<&str> for PluginFault {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

/// Result type for plugin-side code
pub type FaultResult<T> = std::result::Result<T, PluginFault>;

/// Initialization hook, invoked exactly once per activation
#[async_trait::async_trait]
pub trait Initializable: Send + Sync {
    async fn activate(&self, context: &ActivationContext) -> FaultResult<()>;
}

/// Named methods exposed for invocation from the presentation boundary
///
/// Calls may arrive concurrently, including for the same method; the
/// implementation owns the synchronization of its own state.
#[async_trait::async_trait]
pub trait MethodTable: Send + Sync {
    /// Names of all exposed methods
    fn method_names(&self) -> Vec<String>;

    fn has_method(&self, method: &str) -> bool {
        self.method_names().iter().any(|name| name == method)
    }

    /// Invoke `method` with positional JSON arguments
    async fn call(&self, method: &str, args: Vec<Value>) -> FaultResult<Value>;
}

/// Best-effort teardown hook run on deactivation
#[async_trait::async_trait]
pub trait Teardown: Send + Sync {
    async fn deactivate(&self) -> FaultResult<()>;
}

/// An executable module handle produced by a module loader
pub trait PluginModule: Send + Sync {
    fn initializer(&self) -> Option<&dyn Initializable> {
        None
    }

    fn methods(&self) -> Option<&dyn MethodTable> {
        None
    }

    fn teardown(&self) -> Option<&dyn Teardown> {
        None
    }
}
