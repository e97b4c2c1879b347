//! Module Loading
//!
//! Turns a plugin's declared entry path into an executable
//! [`PluginModule`]. Entry paths are always resolved against the plugin's own
//! directory, never the host's working directory, and may not escape it.
//! The concrete loader is picked by file extension.

use crate::plugin::error::{PluginError, PluginResult};
use crate::plugin::traits::PluginModule;
use crate::plugin::wasm::WasmLoader;
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

/// Loads one kind of entry artifact
///
/// Every call produces a fresh module instance; loaders do not cache.
#[async_trait::async_trait]
pub trait ModuleLoader: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &str;

    /// File extensions (without the dot) this loader accepts
    fn extensions(&self) -> Vec<String>;

    /// Load the already resolved `entry` for `plugin_id`
    async fn load(&self, plugin_id: &str, entry: &Path) -> PluginResult<Arc<dyn PluginModule>>;
}

/// Resolve `relative_entry` inside `base_path`
///
/// Rejects absolute paths, paths that climb above the base and entries that
/// do not exist as files. Symlinks are followed and must also stay inside
/// the base directory.
pub async fn resolve_entry(base_path: &Path, relative_entry: &str) -> Result<PathBuf, String> {
    let relative = Path::new(relative_entry);
    if relative_entry.trim().is_empty() {
        return Err("entry path is empty".to_string());
    }

    let mut normalized = PathBuf::new();
    let mut depth = 0usize;
    for component in relative.components() {
        match component {
            Component::CurDir => {}
            Component::Normal(part) => {
                normalized.push(part);
                depth += 1;
            }
            Component::ParentDir => {
                if depth == 0 {
                    return Err(format!("entry '{relative_entry}' escapes the plugin directory"));
                }
                normalized.pop();
                depth -= 1;
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(format!("entry '{relative_entry}' must be a relative path"));
            }
        }
    }

    let candidate = base_path.join(&normalized);
    let metadata = tokio::fs::metadata(&candidate)
        .await
        .map_err(|e| format!("entry '{}' not found: {}", candidate.display(), e))?;
    if !metadata.is_file() {
        return Err(format!("entry '{}' is not a file", candidate.display()));
    }

    let canonical_base = tokio::fs::canonicalize(base_path)
        .await
        .map_err(|e| e.to_string())?;
    let canonical_entry = tokio::fs::canonicalize(&candidate)
        .await
        .map_err(|e| e.to_string())?;
    if !canonical_entry.starts_with(&canonical_base) {
        return Err(format!("entry '{relative_entry}' escapes the plugin directory"));
    }

    Ok(candidate)
}

/// Loaders keyed by file extension
#[derive(Clone, Default)]
pub struct LoaderSet {
    loaders: HashMap<String, Arc<dyn ModuleLoader>>,
}

impl std::fmt::Debug for LoaderSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut extensions: Vec<_> = self.loaders.keys().collect();
        extensions.sort();
        f.debug_struct("LoaderSet")
            .field("extensions", &extensions)
            .finish()
    }
}

impl LoaderSet {
    /// An empty set; nothing can be loaded until a loader is registered
    pub fn empty() -> Self {
        Self::default()
    }

    /// The built-in loaders (`.wasm`, `.wat`)
    pub fn with_defaults() -> Self {
        let mut set = Self::empty();
        set.register(Arc::new(WasmLoader::new()));
        set
    }

    /// Register `loader` for all of its extensions, replacing earlier registrations
    pub fn register(&mut self, loader: Arc<dyn ModuleLoader>) {
        for extension in loader.extensions() {
            let extension = extension.trim_start_matches('.').to_ascii_lowercase();
            log::debug!("Registering {} loader for .{}", loader.name(), extension);
            self.loaders.insert(extension, Arc::clone(&loader));
        }
    }

    pub fn supports(&self, entry: &Path) -> bool {
        self.loader_for(entry).is_some()
    }

    fn loader_for(&self, entry: &Path) -> Option<&Arc<dyn ModuleLoader>> {
        let extension = entry.extension()?.to_str()?.to_ascii_lowercase();
        self.loaders.get(&extension)
    }

    /// Resolve and load the entry module of a plugin
    pub async fn load(
        &self,
        plugin_id: &str,
        base_path: &Path,
        relative_entry: &str,
    ) -> PluginResult<Arc<dyn PluginModule>> {
        let entry = resolve_entry(base_path, relative_entry)
            .await
            .map_err(|cause| PluginError::load(plugin_id, base_path.join(relative_entry), cause))?;

        let loader = self.loader_for(&entry).ok_or_else(|| {
            PluginError::load(
                plugin_id,
                &entry,
                "no module loader registered for this file type",
            )
        })?;

        log::debug!(
            "Loading '{}' from {} with the {} loader",
            plugin_id,
            entry.display(),
            loader.name()
        );
        loader.load(plugin_id, &entry).await
    }
}
