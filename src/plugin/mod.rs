//! Plugin System Module
//!
//! Discovers plugin directories, loads their entry modules, drives their
//! lifecycle and routes boundary calls and events to and from them.

// Internal modules - all access should go through api module
pub(crate) mod activation;
pub(crate) mod error;
pub(crate) mod error_handling;
pub(crate) mod events;
pub(crate) mod loader;
pub(crate) mod manager;
pub(crate) mod manifest;
pub(crate) mod native;
pub(crate) mod registry;
pub(crate) mod router;
pub(crate) mod settings;
pub(crate) mod traits;
pub(crate) mod types;
pub(crate) mod wasm;

// Public API module - the only public interface for the plugin system
pub mod api;

#[cfg(test)]
mod tests;
