pub mod app;
pub mod core;
pub mod plugin;

/// Plugin API version advertised to plugins during activation
pub fn get_plugin_api_version() -> u32 {
    core::version::get_api_version()
}
