//! Manifest Discovery
//!
//! Every immediate subdirectory of the plugin root that contains a
//! `manifest.json` is a plugin. Directories are visited in sorted name order
//! so that discovery order is stable across platforms.

use crate::core::error_handling::warn_error_with_context;
use crate::plugin::error::PluginError;
use crate::plugin::types::{DiscoveredPlugin, PluginManifest, MANIFEST_FILE_NAME};
use std::path::{Path, PathBuf};

/// Outcome of one discovery pass
#[derive(Debug, Default, Clone, PartialEq)]
pub struct DiscoveryReport {
    /// Valid manifests in discovery order
    pub plugins: Vec<DiscoveredPlugin>,
    /// Manifests that could not be used
    pub skipped: Vec<PluginError>,
}

/// Reads plugin descriptors from a root directory
#[derive(Debug, Clone)]
pub struct PluginDiscovery {
    root: PathBuf,
    excluded_plugins: Vec<String>,
}

impl PluginDiscovery {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            excluded_plugins: Vec::new(),
        }
    }

    /// Plugin ids that are dropped after parsing
    pub fn with_excludes<I, S>(mut self, excludes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.excluded_plugins = excludes.into_iter().map(Into::into).collect();
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Scan the root directory
    ///
    /// A missing root yields an empty report. Broken manifests are logged
    /// and reported in `skipped`; they never abort the pass.
    pub async fn discover(&self) -> DiscoveryReport {
        let mut report = DiscoveryReport::default();

        if let Ok(metadata) = tokio::fs::metadata(&self.root).await {
            if !metadata.is_dir() {
                let error = PluginError::Config {
                    message: format!("plugins directory {} is not a directory", self.root.display()),
                };
                warn_error_with_context(&error, "Plugin discovery");
                report.skipped.push(error);
                return report;
            }
        }

        let directories = match plugin_directories(&self.root).await {
            Ok(directories) => directories,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::debug!("Plugin directory {} does not exist", self.root.display());
                return report;
            }
            Err(e) => {
                let error = PluginError::Discovery {
                    path: self.root.clone(),
                    cause: e.to_string(),
                };
                warn_error_with_context(&error, "Plugin directory could not be listed");
                report.skipped.push(error);
                return report;
            }
        };

        log::debug!(
            "Scanning {} candidate plugin directories in {}",
            directories.len(),
            self.root.display()
        );

        for directory in directories {
            match read_manifest(&directory).await {
                Ok(Some(manifest)) => {
                    if self.excluded_plugins.contains(&manifest.id) {
                        log::debug!("Excluding plugin '{}'", manifest.id);
                        continue;
                    }
                    log::debug!(
                        "Discovered plugin '{}' v{} in {}",
                        manifest.id,
                        manifest.version,
                        directory.display()
                    );
                    report.plugins.push(DiscoveredPlugin {
                        base_path: directory,
                        manifest,
                    });
                }
                Ok(None) => {
                    log::trace!("No manifest in {}, skipping", directory.display());
                }
                Err(error) => {
                    warn_error_with_context(&error, "Skipping plugin");
                    report.skipped.push(error);
                }
            }
        }

        log::debug!(
            "Discovery found {} plugins ({} skipped)",
            report.plugins.len(),
            report.skipped.len()
        );
        report
    }
}

/// Immediate subdirectories of `root`, sorted by name
async fn plugin_directories(root: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut entries = tokio::fs::read_dir(root).await?;
    let mut directories = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        // Follows symlinks, so a linked plugin directory counts
        match tokio::fs::metadata(entry.path()).await {
            Ok(metadata) if metadata.is_dir() => directories.push(entry.path()),
            Ok(_) => {}
            Err(e) => log::debug!("Ignoring {}: {}", entry.path().display(), e),
        }
    }
    directories.sort();
    Ok(directories)
}

/// Read and validate `manifest.json` in `directory`
///
/// `Ok(None)` means the directory has no manifest and is not a plugin.
pub async fn read_manifest(directory: &Path) -> Result<Option<PluginManifest>, PluginError> {
    let path = directory.join(MANIFEST_FILE_NAME);
    let content = match tokio::fs::read_to_string(&path).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(PluginError::Discovery {
                path,
                cause: e.to_string(),
            })
        }
    };

    parse_manifest(&content)
        .map(Some)
        .map_err(|cause| PluginError::Discovery { path, cause })
}

/// Parse manifest text, applying defaults
pub fn parse_manifest(content: &str) -> Result<PluginManifest, String> {
    let mut manifest: PluginManifest =
        serde_json::from_str(content).map_err(|e| e.to_string())?;

    if manifest.id.trim().is_empty() {
        return Err("manifest id must not be empty".to_string());
    }
    if manifest.name.trim().is_empty() {
        manifest.name = manifest.id.clone();
    }
    Ok(manifest)
}
