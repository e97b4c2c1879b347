//! Build metadata generated by the build script.

include!(concat!(env!("OUT_DIR"), "/version.rs"));

/// Fallback used when the manifest metadata could not be read at build time
const DEFAULT_API_VERSION: u32 = 20251019;

/// Plugin API version as a number, falling back to the compiled-in default.
pub fn get_api_version() -> u32 {
    PLUGIN_API_VERSION.parse().unwrap_or(DEFAULT_API_VERSION)
}

/// Build time string from the build script (UTC)
pub fn build_time() -> &'static str {
    BUILD_TIME
}

/// Short git hash captured by the build script
pub fn git_hash() -> &'static str {
    GIT_HASH
}

/// One-line description used by `--version` style output
pub fn version_line() -> String {
    format!(
        "{} (plugin api {}, built {}, git {})",
        env!("CARGO_PKG_VERSION"),
        get_api_version(),
        build_time(),
        git_hash()
    )
}
