//! Plugin Activation
//!
//! Moves plugins between "known" and "active". Each activation loads a fresh
//! module, runs its initialization hook exactly once under a timeout, and
//! only then stores the handle in the registry. Activations of the same id
//! are serialized; different ids proceed independently.

use crate::plugin::error::{PluginError, PluginResult};
use crate::plugin::error_handling::{
    log_plugin_error_with_context, warn_plugin_error_with_context,
};
use crate::plugin::events::EventBus;
use crate::plugin::loader::LoaderSet;
use crate::plugin::registry::SharedPluginRegistry;
use crate::plugin::traits::{FaultResult, PluginFault, PluginModule};
use crate::plugin::types::{ActivationContext, PluginRecord};
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Why a bounded plugin call did not produce a value
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum CallFailure {
    Fault(PluginFault),
    TimedOut(Duration),
}

impl CallFailure {
    pub(crate) fn into_error(self, plugin_id: &str, operation: &str) -> PluginError {
        match self {
            CallFailure::Fault(fault) if operation == "activate" => PluginError::Activation {
                plugin_id: plugin_id.to_string(),
                cause: fault.message().to_string(),
            },
            CallFailure::Fault(fault) => PluginError::Invocation {
                plugin_id: plugin_id.to_string(),
                method: operation.to_string(),
                cause: fault.message().to_string(),
            },
            CallFailure::TimedOut(elapsed) => PluginError::Timeout {
                plugin_id: plugin_id.to_string(),
                operation: operation.to_string(),
                elapsed,
            },
        }
    }
}

/// Run plugin code on its own task, bounded by `timeout`
///
/// A panic in the plugin code becomes a fault. On timeout the task is
/// aborted at its next await point.
pub(crate) async fn run_bounded<T, F>(timeout: Duration, call: F) -> Result<T, CallFailure>
where
    T: Send + 'static,
    F: Future<Output = FaultResult<T>> + Send + 'static,
{
    let task = tokio::spawn(call);
    let abort = task.abort_handle();

    match tokio::time::timeout(timeout, task).await {
        Ok(Ok(Ok(value))) => Ok(value),
        Ok(Ok(Err(fault))) => Err(CallFailure::Fault(fault)),
        Ok(Err(join_error)) => Err(CallFailure::Fault(PluginFault::new(panic_message(
            join_error,
        )))),
        Err(_) => {
            abort.abort();
            Err(CallFailure::TimedOut(timeout))
        }
    }
}

fn panic_message(error: tokio::task::JoinError) -> String {
    if !error.is_panic() {
        return error.to_string();
    }
    let payload = error.into_panic();
    if let Some(message) = payload.downcast_ref::<&str>() {
        format!("plugin panicked: {message}")
    } else if let Some(message) = payload.downcast_ref::<String>() {
        format!("plugin panicked: {message}")
    } else {
        "plugin panicked".to_string()
    }
}

/// Result of activating every enabled plugin
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ActivationReport {
    /// Ids activated (or already active), in discovery order
    pub activated: Vec<String>,
    /// Failures, in discovery order
    pub failed: Vec<PluginError>,
}

/// Drives plugin activation and deactivation against the shared registry
pub struct ActivationController {
    registry: SharedPluginRegistry,
    loaders: LoaderSet,
    events: EventBus,
    timeout: Duration,
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl std::fmt::Debug for ActivationController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActivationController")
            .field("loaders", &self.loaders)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl ActivationController {
    pub fn new(
        registry: SharedPluginRegistry,
        loaders: LoaderSet,
        events: EventBus,
        timeout: Duration,
    ) -> Self {
        Self {
            registry,
            loaders,
            events,
            timeout,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Lock serializing lifecycle changes of `plugin_id`
    ///
    /// Only called for registered ids, so the map is bounded by the registry.
    fn lock_for(&self, plugin_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        Arc::clone(locks.entry(plugin_id.to_string()).or_default())
    }

    /// Activate `plugin_id`, returning its updated record
    ///
    /// Already active plugins are returned unchanged. On any failure the
    /// record stays inactive and the freshly loaded module is dropped.
    pub async fn activate(&self, plugin_id: &str) -> PluginResult<PluginRecord> {
        if !self.registry.contains(plugin_id).await {
            return Err(PluginError::not_found(plugin_id));
        }
        let lock = self.lock_for(plugin_id);
        let _guard = lock.lock().await;

        let record = self
            .registry
            .get(plugin_id)
            .await
            .ok_or_else(|| PluginError::not_found(plugin_id))?;
        if record.is_active {
            log::debug!("Plugin '{}' is already active", plugin_id);
            return Ok(record);
        }

        let module = match &record.manifest.main_entry {
            Some(entry) => Some(
                self.loaders
                    .load(plugin_id, &record.base_path, entry)
                    .await?,
            ),
            None => {
                log::debug!("Plugin '{}' has no main entry", plugin_id);
                None
            }
        };

        if let Some(module) = &module {
            self.initialize(&record, Arc::clone(module)).await?;
        }

        let record = self.registry.mark_active(plugin_id, module).await?;
        log::info!(
            "Activated plugin '{}' v{}",
            record.manifest.id,
            record.manifest.version
        );
        Ok(record)
    }

    async fn initialize(
        &self,
        record: &PluginRecord,
        module: Arc<dyn PluginModule>,
    ) -> PluginResult<()> {
        if module.initializer().is_none() {
            return Ok(());
        }

        let context = ActivationContext {
            plugin_id: record.id().to_string(),
            base_path: record.base_path.clone(),
            host_api_version: crate::get_plugin_api_version(),
            events: self.events.emitter(record.id()),
        };

        log::debug!("Running activate hook of '{}'", record.id());
        run_bounded(self.timeout, async move {
            match module.initializer() {
                Some(initializer) => initializer.activate(&context).await,
                None => Ok(()),
            }
        })
        .await
        .map_err(|failure| failure.into_error(record.id(), "activate"))
    }

    /// Activate every enabled plugin in discovery order
    ///
    /// Failures are logged and collected; they never stop the pass.
    pub async fn activate_all_enabled(&self) -> ActivationReport {
        let enabled: Vec<String> = {
            let registry = self.registry.inner().read().await;
            registry
                .records_in_order()
                .filter(|record| record.manifest.enabled)
                .map(|record| record.id().to_string())
                .collect()
        };

        let mut report = ActivationReport::default();
        for plugin_id in enabled {
            match self.activate(&plugin_id).await {
                Ok(_) => report.activated.push(plugin_id),
                Err(error) => {
                    log_plugin_error_with_context(
                        &error,
                        &format!("Failed to activate plugin '{plugin_id}'"),
                    );
                    report.failed.push(error);
                }
            }
        }

        log::info!(
            "Activated {} enabled plugins ({} failed)",
            report.activated.len(),
            report.failed.len()
        );
        report
    }

    /// Best-effort deactivation
    ///
    /// The plugin is marked inactive before its teardown hook runs, so a
    /// failing or hanging hook never leaves it half active.
    pub async fn deactivate(&self, plugin_id: &str) -> PluginResult<PluginRecord> {
        if !self.registry.contains(plugin_id).await {
            return Err(PluginError::not_found(plugin_id));
        }
        let lock = self.lock_for(plugin_id);
        let _guard = lock.lock().await;

        let record = self
            .registry
            .get(plugin_id)
            .await
            .ok_or_else(|| PluginError::not_found(plugin_id))?;
        if !record.is_active {
            log::debug!("Plugin '{}' is not active", plugin_id);
            return Ok(record);
        }

        if let Some(module) = self.registry.mark_inactive(plugin_id).await? {
            self.teardown(plugin_id, module).await;
        }

        log::info!("Deactivated plugin '{}'", plugin_id);
        self.registry
            .get(plugin_id)
            .await
            .ok_or_else(|| PluginError::not_found(plugin_id))
    }

    async fn teardown(&self, plugin_id: &str, module: Arc<dyn PluginModule>) {
        if module.teardown().is_none() {
            return;
        }

        let outcome = run_bounded(self.timeout, async move {
            match module.teardown() {
                Some(teardown) => teardown.deactivate().await,
                None => Ok(()),
            }
        })
        .await;

        if let Err(failure) = outcome {
            let error = failure.into_error(plugin_id, "deactivate");
            warn_plugin_error_with_context(&error, "Plugin teardown failed");
        }
    }
}
