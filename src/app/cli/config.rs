//! TOML configuration file parsing and loading
//!
//! The configuration file supplies defaults for every global option; values
//! given on the command line win. Without `--config-file` the platform
//! default (`<config_dir>/Plughost/plughost.toml`) is read when it exists.

use super::args::Args;
use crate::plugin::api::HostSettings;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error", "off"];
const LOG_FORMATS: &[&str] = &["text", "ext", "json"];

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("The specified configuration file does not exist: {}", .path.display())]
    Missing { path: PathBuf },

    #[error("Error reading configuration file {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Error parsing configuration file {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid value for '{key}': {message}")]
    Invalid { key: String, message: String },
}

impl ConfigError {
    fn invalid(key: &str, message: impl Into<String>) -> Self {
        ConfigError::Invalid {
            key: key.to_string(),
            message: message.into(),
        }
    }
}

/// Default configuration file location
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("Plughost").join("plughost.toml"))
}

impl Args {
    /// Layer the configuration file underneath these command line arguments
    ///
    /// Returns the path that was read, if any.
    pub async fn apply_config_file(&mut self) -> Result<Option<PathBuf>, ConfigError> {
        let config_path = match &self.config_file {
            Some(path) => {
                if !path.exists() {
                    return Err(ConfigError::Missing { path: path.clone() });
                }
                path.clone()
            }
            None => match default_config_path() {
                Some(path) if path.exists() => path,
                _ => return Ok(None),
            },
        };

        let config = read_config(&config_path).await?;
        let mut from_file = Args::default();
        Self::apply_toml_values(&mut from_file, &config)?;
        self.layer_over(from_file);
        Ok(Some(config_path))
    }

    /// Fill every option not given on the command line from `base`
    fn layer_over(&mut self, base: Args) {
        self.plugins_dir = self.plugins_dir.take().or(base.plugins_dir);
        self.color = self.color.or(base.color);
        self.log_level = self.log_level.take().or(base.log_level);
        self.log_file = self.log_file.take().or(base.log_file);
        self.log_format = self.log_format.take().or(base.log_format);
        self.activation_timeout_ms = self.activation_timeout_ms.or(base.activation_timeout_ms);
        self.invocation_timeout_ms = self.invocation_timeout_ms.or(base.invocation_timeout_ms);
        self.event_capacity = self.event_capacity.or(base.event_capacity);

        for exclusion in base.plugin_exclusions {
            if !self.plugin_exclusions.contains(&exclusion) {
                self.plugin_exclusions.push(exclusion);
            }
        }
    }

    /// Apply TOML configuration values to Args
    pub fn apply_toml_values(args: &mut Self, config: &toml::Table) -> Result<(), ConfigError> {
        if let Some(plugins_dir) = config.get("plugins-dir").and_then(|v| v.as_str()) {
            args.plugins_dir = Some(PathBuf::from(plugins_dir));
        }

        // Single string or array, each entry possibly comma separated
        if let Some(exclusions_value) = config.get("exclude-plugin") {
            let mut exclusion_strings = Vec::new();
            if let Some(exclusion_str) = exclusions_value.as_str() {
                exclusion_strings.push(exclusion_str);
            } else if let Some(exclusion_array) = exclusions_value.as_array() {
                exclusion_strings.extend(exclusion_array.iter().filter_map(|v| v.as_str()));
            } else {
                return Err(ConfigError::invalid(
                    "exclude-plugin",
                    "expected a string or an array of strings",
                ));
            }
            for id in exclusion_strings
                .iter()
                .flat_map(|s| s.split(','))
                .map(str::trim)
                .filter(|s| !s.is_empty())
            {
                if !args.plugin_exclusions.iter().any(|e| e == id) {
                    args.plugin_exclusions.push(id.to_string());
                }
            }
        }

        if let Some(color) = config.get("color").and_then(|v| v.as_bool()) {
            args.color = Some(color);
        }
        if let Some(log_level) = config.get("log-level").and_then(|v| v.as_str()) {
            let log_level = log_level.to_ascii_lowercase();
            if !LOG_LEVELS.contains(&log_level.as_str()) {
                return Err(ConfigError::invalid(
                    "log-level",
                    format!("expected one of {}", LOG_LEVELS.join(", ")),
                ));
            }
            args.log_level = Some(log_level);
        }
        if let Some(log_file) = config.get("log-file").and_then(|v| v.as_str()) {
            args.log_file = Some(PathBuf::from(log_file));
        }
        if let Some(log_format) = config.get("log-format").and_then(|v| v.as_str()) {
            let log_format = log_format.to_ascii_lowercase();
            if !LOG_FORMATS.contains(&log_format.as_str()) {
                return Err(ConfigError::invalid(
                    "log-format",
                    format!("expected one of {}", LOG_FORMATS.join(", ")),
                ));
            }
            args.log_format = Some(log_format);
        }

        if let Some(ms) = positive_integer(config, "activation-timeout-ms")? {
            args.activation_timeout_ms = Some(ms);
        }
        if let Some(ms) = positive_integer(config, "invocation-timeout-ms")? {
            args.invocation_timeout_ms = Some(ms);
        }
        if let Some(capacity) = positive_integer(config, "event-capacity")? {
            args.event_capacity = Some(capacity as usize);
        }

        Ok(())
    }

    /// Host settings described by these arguments
    pub fn host_settings(&self) -> HostSettings {
        let mut settings = match &self.plugins_dir {
            Some(dir) => HostSettings::new(dir),
            None => HostSettings::default(),
        }
        .with_excludes(self.plugin_exclusions.iter().cloned());

        if let Some(ms) = self.activation_timeout_ms.filter(|ms| *ms > 0) {
            settings = settings.with_activation_timeout(Duration::from_millis(ms));
        }
        if let Some(ms) = self.invocation_timeout_ms.filter(|ms| *ms > 0) {
            settings = settings.with_invocation_timeout(Duration::from_millis(ms));
        }
        if let Some(capacity) = self.event_capacity.filter(|c| *c > 0) {
            settings = settings.with_event_capacity(capacity);
        }
        settings
    }
}

async fn read_config(path: &Path) -> Result<toml::Table, ConfigError> {
    let contents = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
    toml::from_str::<toml::Table>(&contents).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

fn positive_integer(config: &toml::Table, key: &str) -> Result<Option<u64>, ConfigError> {
    match config.get(key) {
        None => Ok(None),
        Some(value) => match value.as_integer() {
            Some(n) if n > 0 => Ok(Some(n as u64)),
            _ => Err(ConfigError::invalid(key, "expected a positive integer")),
        },
    }
}
