//! Plugin Manager
//!
//! Owns one registry, loader set and event bus and exposes the lifecycle and
//! boundary operations on top of them. A host constructs one manager and
//! shares it (usually behind an `Arc`) with whatever serves the boundary.

use crate::plugin::activation::{ActivationController, ActivationReport};
use crate::plugin::error::PluginResult;
use crate::plugin::events::{EventBus, EventFilter, EventSubscription};
use crate::plugin::loader::LoaderSet;
use crate::plugin::manifest::{DiscoveryReport, PluginDiscovery};
use crate::plugin::registry::SharedPluginRegistry;
use crate::plugin::router::RequestRouter;
use crate::plugin::settings::HostSettings;
use crate::plugin::types::{InvocationEnvelope, PluginManifest, PluginRecord};
use serde_json::Value;

/// Central plugin manager responsible for:
/// - discovery and registry population
/// - activation and best-effort deactivation
/// - routing boundary calls and plugin events
#[derive(Debug)]
pub struct PluginManager {
    settings: HostSettings,
    registry: SharedPluginRegistry,
    events: EventBus,
    activation: ActivationController,
    router: RequestRouter,
}

impl PluginManager {
    /// Manager with the built-in module loaders
    pub fn new(settings: HostSettings) -> Self {
        Self::with_loaders(settings, LoaderSet::with_defaults())
    }

    /// Manager with a custom loader set
    pub fn with_loaders(settings: HostSettings, loaders: LoaderSet) -> Self {
        let registry = SharedPluginRegistry::new();
        let events = EventBus::new(settings.event_capacity);
        let activation = ActivationController::new(
            registry.clone(),
            loaders,
            events.clone(),
            settings.activation_timeout,
        );
        let router = RequestRouter::new(registry.clone(), settings.invocation_timeout);

        Self {
            settings,
            registry,
            events,
            activation,
            router,
        }
    }

    pub fn settings(&self) -> &HostSettings {
        &self.settings
    }

    /// Get shared access to the plugin registry
    pub fn registry(&self) -> &SharedPluginRegistry {
        &self.registry
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn api_version(&self) -> u32 {
        crate::get_plugin_api_version()
    }

    /// Discover manifests under the plugin directory and register them
    pub async fn load_all(&self) -> DiscoveryReport {
        log::debug!(
            "Discovering plugins in {}",
            self.settings.plugins_dir.display()
        );
        let report = PluginDiscovery::new(&self.settings.plugins_dir)
            .with_excludes(self.settings.excluded_plugins.iter().cloned())
            .discover()
            .await;

        self.registry.populate(report.plugins.iter().cloned()).await;
        log::info!(
            "Registered {} plugins from {}",
            self.registry.len().await,
            self.settings.plugins_dir.display()
        );
        report
    }

    /// Discovery followed by activation of every enabled plugin
    pub async fn start(&self) -> (DiscoveryReport, ActivationReport) {
        let discovery = self.load_all().await;
        let activation = self.activate_all_enabled().await;
        (discovery, activation)
    }

    pub async fn activate(&self, plugin_id: &str) -> PluginResult<PluginRecord> {
        self.activation.activate(plugin_id).await
    }

    pub async fn activate_all_enabled(&self) -> ActivationReport {
        self.activation.activate_all_enabled().await
    }

    pub async fn deactivate(&self, plugin_id: &str) -> PluginResult<PluginRecord> {
        self.activation.deactivate(plugin_id).await
    }

    /// Deactivate every active plugin, returning the ids that were stopped
    pub async fn shutdown(&self) -> Vec<String> {
        let mut stopped = Vec::new();
        for plugin_id in self.registry.active_ids().await {
            match self.activation.deactivate(&plugin_id).await {
                Ok(_) => stopped.push(plugin_id),
                Err(e) => log::warn!("Could not deactivate plugin {plugin_id}: {e}"),
            }
        }
        log::debug!("Deactivated {} plugins", stopped.len());
        stopped
    }

    /// Every registered manifest, in discovery order
    pub async fn list(&self) -> Vec<PluginManifest> {
        self.router.list_manifests().await
    }

    pub async fn invoke(&self, plugin_id: &str, method: &str, args: Vec<Value>) -> InvocationEnvelope {
        self.router.invoke(plugin_id, method, args).await
    }

    pub async fn get_renderer_location(&self, plugin_id: &str) -> Option<String> {
        self.router.renderer_location(plugin_id).await
    }

    /// Subscribe to events of one plugin, optionally a single event name
    pub fn subscribe(&self, plugin_id: &str, event: Option<&str>) -> EventSubscription {
        let filter = EventFilter::plugin(plugin_id);
        let filter = match event {
            Some(event) => filter.event(event),
            None => filter,
        };
        self.events.subscribe(filter)
    }

    /// Subscribe with an arbitrary filter
    pub fn subscribe_filtered(&self, filter: EventFilter) -> EventSubscription {
        self.events.subscribe(filter)
    }
}
