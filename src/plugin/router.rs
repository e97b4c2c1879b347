//! Request Routing
//!
//! Resolves `(plugin id, method, args)` requests from the presentation
//! boundary against the active plugins and wraps every outcome in an
//! [`InvocationEnvelope`]. Nothing raised by plugin code crosses the boundary
//! unwrapped.

use crate::plugin::activation::{run_bounded, CallFailure};
use crate::plugin::error_handling::warn_plugin_error_with_context;
use crate::plugin::registry::SharedPluginRegistry;
use crate::plugin::types::{InvocationEnvelope, PluginManifest};
use serde_json::Value;
use std::time::Duration;

/// Public mount point of presentation-side modules
pub const RENDERER_MOUNT: &str = "/plugins";

/// Routes boundary calls to plugin method tables
#[derive(Debug, Clone)]
pub struct RequestRouter {
    registry: SharedPluginRegistry,
    timeout: Duration,
}

impl RequestRouter {
    pub fn new(registry: SharedPluginRegistry, timeout: Duration) -> Self {
        Self { registry, timeout }
    }

    /// Invoke `method` on the active plugin `plugin_id`
    ///
    /// The registry lock is released before the method runs, so a slow call
    /// never blocks lifecycle changes of other plugins.
    pub async fn invoke(&self, plugin_id: &str, method: &str, args: Vec<Value>) -> InvocationEnvelope {
        let module = {
            let registry = self.registry.inner().read().await;
            registry
                .get_active(plugin_id)
                .and_then(|record| record.active_module())
        };

        let Some(module) = module.filter(|module| module.methods().is_some()) else {
            log::debug!("Rejected call to '{plugin_id}.{method}': plugin not invocable");
            return InvocationEnvelope::failure(format!(
                "Plugin {plugin_id} not active or has no exposed methods"
            ));
        };

        let has_method = module
            .methods()
            .map_or(false, |table| table.has_method(method));
        if !has_method {
            return InvocationEnvelope::failure(format!(
                "Method {method} not found in plugin {plugin_id}"
            ));
        }

        log::trace!("Invoking '{plugin_id}.{method}' with {} arguments", args.len());
        let method_name = method.to_string();
        let outcome = run_bounded(self.timeout, async move {
            match module.methods() {
                Some(table) => table.call(&method_name, args).await,
                None => Err(format!("Method {method_name} not found").into()),
            }
        })
        .await;

        match outcome {
            Ok(result) => InvocationEnvelope::Success(result),
            Err(CallFailure::Fault(fault)) => {
                log::debug!("'{plugin_id}.{method}' faulted: {fault}");
                InvocationEnvelope::failure(fault.message())
            }
            Err(failure) => {
                let error = failure.into_error(plugin_id, method);
                warn_plugin_error_with_context(&error, "Plugin method did not complete");
                InvocationEnvelope::failure(error.to_string())
            }
        }
    }

    /// Every registered manifest, in discovery order
    pub async fn list_manifests(&self) -> Vec<PluginManifest> {
        self.registry.list_manifests().await
    }

    /// Public path of the plugin's presentation module, if it declares one
    pub async fn renderer_location(&self, plugin_id: &str) -> Option<String> {
        let record = self.registry.get(plugin_id).await?;
        renderer_path(&record.manifest)
    }
}

/// `/plugins/<id>/<rendererEntry>` with leading `./` segments trimmed
pub fn renderer_path(manifest: &PluginManifest) -> Option<String> {
    let mut entry = manifest.renderer_entry.as_deref()?;
    while let Some(rest) = entry.strip_prefix("./") {
        entry = rest;
    }
    Some(format!("{RENDERER_MOUNT}/{}/{entry}", manifest.id))
}
