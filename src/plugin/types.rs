//! Type definitions for the plugin system
//!
//! Manifests, lifecycle records and the envelope returned across the
//! presentation boundary.

use crate::plugin::events::EventEmitter;
use crate::plugin::traits::PluginModule;
use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Name of the declaration file expected at the root of every plugin directory
pub const MANIFEST_FILE_NAME: &str = "manifest.json";

/// Immutable plugin descriptor read from `manifest.json`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginManifest {
    /// Stable identity, unique across the registry
    pub id: String,

    /// Display name, falls back to the id
    #[serde(default)]
    pub name: String,

    /// Informational version string
    #[serde(default = "default_version")]
    pub version: String,

    /// Activate this plugin at startup
    #[serde(default)]
    pub enabled: bool,

    /// Process-side module, relative to the plugin directory
    #[serde(default, alias = "main", skip_serializing_if = "Option::is_none")]
    pub main_entry: Option<String>,

    /// Presentation-side module, relative to the plugin directory
    #[serde(default, alias = "renderer", skip_serializing_if = "Option::is_none")]
    pub renderer_entry: Option<String>,
}

fn default_version() -> String {
    "0.0.0".to_string()
}

impl PluginManifest {
    /// Minimal manifest, mainly useful for embedding hosts and tests
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            version: default_version(),
            enabled: false,
            main_entry: None,
            renderer_entry: None,
        }
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_main_entry(mut self, entry: impl Into<String>) -> Self {
        self.main_entry = Some(entry.into());
        self
    }

    pub fn with_renderer_entry(mut self, entry: impl Into<String>) -> Self {
        self.renderer_entry = Some(entry.into());
        self
    }
}

/// A manifest found on disk together with the directory it came from
#[derive(Debug, Clone, PartialEq)]
pub struct DiscoveredPlugin {
    pub base_path: PathBuf,
    pub manifest: PluginManifest,
}

/// Lifecycle state of one discovered plugin
///
/// The module handle is owned by the record. It is only handed out (as a
/// cloned `Arc` for the duration of a call) while the record is active.
#[derive(Clone)]
pub struct PluginRecord {
    pub manifest: PluginManifest,
    pub base_path: PathBuf,
    pub is_active: bool,
    module: Option<Arc<dyn PluginModule>>,
}

impl std::fmt::Debug for PluginRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginRecord")
            .field("id", &self.manifest.id)
            .field("base_path", &self.base_path)
            .field("is_active", &self.is_active)
            .field("has_module", &self.module.is_some())
            .finish()
    }
}

impl PluginRecord {
    /// New record in the unloaded state
    pub fn unloaded(manifest: PluginManifest, base_path: impl Into<PathBuf>) -> Self {
        Self {
            manifest,
            base_path: base_path.into(),
            is_active: false,
            module: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.manifest.id
    }

    pub fn has_module(&self) -> bool {
        self.module.is_some()
    }

    /// Module handle, only while the record is active
    pub(crate) fn active_module(&self) -> Option<Arc<dyn PluginModule>> {
        if self.is_active {
            self.module.clone()
        } else {
            None
        }
    }

    pub(crate) fn set_active(&mut self, module: Option<Arc<dyn PluginModule>>) {
        self.module = module;
        self.is_active = true;
    }

    pub(crate) fn set_inactive(&mut self) -> Option<Arc<dyn PluginModule>> {
        self.is_active = false;
        self.module.take()
    }
}

/// Context handed to a module's initialization hook
#[derive(Debug, Clone)]
pub struct ActivationContext {
    pub plugin_id: String,
    pub base_path: PathBuf,
    pub host_api_version: u32,
    pub events: EventEmitter,
}

impl ActivationContext {
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// JSON form passed to sandboxed modules
    pub fn to_json(&self) -> Value {
        serde_json::json!({
            "basePath": self.base_path.to_string_lossy(),
            "pluginId": self.plugin_id,
            "hostApiVersion": self.host_api_version,
        })
    }
}

/// Uniform result of a boundary invocation
///
/// Serializes as `{"success": true, "result": ...}` or
/// `{"success": false, "error": "..."}`.
#[derive(Debug, Clone, PartialEq)]
pub enum InvocationEnvelope {
    Success(Value),
    Failure(String),
}

impl InvocationEnvelope {
    pub fn failure(message: impl Into<String>) -> Self {
        InvocationEnvelope::Failure(message.into())
    }

    pub fn is_success(&self) -> bool {
        matches!(self, InvocationEnvelope::Success(_))
    }

    pub fn result(&self) -> Option<&Value> {
        match self {
            InvocationEnvelope::Success(value) => Some(value),
            InvocationEnvelope::Failure(_) => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            InvocationEnvelope::Success(_) => None,
            InvocationEnvelope::Failure(message) => Some(message),
        }
    }
}

impl Serialize for InvocationEnvelope {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("InvocationEnvelope", 2)?;
        match self {
            InvocationEnvelope::Success(result) => {
                state.serialize_field("success", &true)?;
                state.serialize_field("result", result)?;
            }
            InvocationEnvelope::Failure(error) => {
                state.serialize_field("success", &false)?;
                state.serialize_field("error", error)?;
            }
        }
        state.end()
    }
}
