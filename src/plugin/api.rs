//! Public API for the plugin system
//!
//! External modules should import from here rather than directly from
//! internal modules.

// Core plugin management
pub use crate::plugin::manager::PluginManager;
pub use crate::plugin::settings::{
    default_plugins_dir, HostSettings, DEFAULT_ACTIVATION_TIMEOUT, DEFAULT_INVOCATION_TIMEOUT,
};

// Error handling
pub use crate::plugin::error::{PluginError, PluginResult};
pub use crate::plugin::error_handling::log_plugin_error_with_context;

// Manifests, records and envelopes
pub use crate::plugin::types::{
    ActivationContext, DiscoveredPlugin, InvocationEnvelope, PluginManifest, PluginRecord,
    MANIFEST_FILE_NAME,
};

// Discovery and registry
pub use crate::plugin::manifest::{parse_manifest, read_manifest, DiscoveryReport, PluginDiscovery};
pub use crate::plugin::registry::{PluginRegistry, SharedPluginRegistry};

// Lifecycle and routing
pub use crate::plugin::activation::{ActivationController, ActivationReport};
pub use crate::plugin::router::{renderer_path, RequestRouter, RENDERER_MOUNT};

// Module loading and plugin-side capabilities
pub use crate::plugin::loader::{resolve_entry, LoaderSet, ModuleLoader};
pub use crate::plugin::native::{NativeModule, NativeModuleBuilder};
pub use crate::plugin::traits::{
    FaultResult, Initializable, MethodTable, PluginFault, PluginModule, Teardown,
};
pub use crate::plugin::wasm::WasmLoader;

// Events
pub use crate::plugin::events::{
    event_channel, EventBus, EventEmitter, EventFilter, EventSubscription, PluginEvent,
    DEFAULT_EVENT_CAPACITY,
};
