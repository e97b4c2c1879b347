//! Host Settings
//!
//! Everything the plugin manager needs to know about its environment. Built
//! from CLI arguments and the TOML configuration file by the app layer, or
//! directly by an embedding host.

use crate::plugin::events::DEFAULT_EVENT_CAPACITY;
use std::path::PathBuf;
use std::time::Duration;

/// Default bound for an initialization hook
pub const DEFAULT_ACTIVATION_TIMEOUT: Duration = Duration::from_secs(30);

/// Default bound for a single method invocation
pub const DEFAULT_INVOCATION_TIMEOUT: Duration = Duration::from_secs(30);

/// Plugin host settings
#[derive(Debug, Clone, PartialEq)]
pub struct HostSettings {
    /// Root directory scanned for plugin subdirectories
    pub plugins_dir: PathBuf,

    /// Plugin ids that are never registered
    pub excluded_plugins: Vec<String>,

    /// Bound for `activate` and `deactivate` hooks
    pub activation_timeout: Duration,

    /// Bound for a method call
    pub invocation_timeout: Duration,

    /// Buffered events per subscriber
    pub event_capacity: usize,
}

impl HostSettings {
    pub fn new(plugins_dir: impl Into<PathBuf>) -> Self {
        Self {
            plugins_dir: plugins_dir.into(),
            ..Self::default()
        }
    }

    pub fn with_excludes<I, S>(mut self, excludes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.excluded_plugins = excludes.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_activation_timeout(mut self, timeout: Duration) -> Self {
        self.activation_timeout = timeout;
        self
    }

    pub fn with_invocation_timeout(mut self, timeout: Duration) -> Self {
        self.invocation_timeout = timeout;
        self
    }

    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }
}

impl Default for HostSettings {
    fn default() -> Self {
        Self {
            plugins_dir: default_plugins_dir(),
            excluded_plugins: Vec::new(),
            activation_timeout: DEFAULT_ACTIVATION_TIMEOUT,
            invocation_timeout: DEFAULT_INVOCATION_TIMEOUT,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

/// Platform plugin directory, falling back to `./plugins`
pub fn default_plugins_dir() -> PathBuf {
    match dirs::config_dir() {
        Some(config_dir) => config_dir.join("Plughost").join("plugins"),
        None => PathBuf::from("./plugins"),
    }
}
