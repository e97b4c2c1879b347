//! Plugin Registry
//!
//! In-memory table of plugin id to lifecycle record. It is the single source
//! of truth for whether a plugin is active, and it remembers discovery order
//! for listing.

use crate::plugin::error::{PluginError, PluginResult};
use crate::plugin::traits::PluginModule;
use crate::plugin::types::{DiscoveredPlugin, PluginManifest, PluginRecord};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Plugin registry keyed by manifest id
#[derive(Default)]
pub struct PluginRegistry {
    records: HashMap<String, PluginRecord>,

    /// Ids in discovery order
    order: Vec<String>,
}

impl std::fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginRegistry")
            .field("plugins", &self.order)
            .field("active", &self.active_ids())
            .finish()
    }
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert one unloaded record per discovered plugin
    ///
    /// A colliding id replaces the earlier record but keeps its position in
    /// discovery order. Existing records (including active ones) with the
    /// same id are replaced as well.
    pub fn populate(&mut self, entries: impl IntoIterator<Item = DiscoveredPlugin>) {
        for entry in entries {
            let id = entry.manifest.id.clone();
            let record = PluginRecord::unloaded(entry.manifest, entry.base_path);

            match self.records.insert(id.clone(), record) {
                Some(previous) => {
                    log::warn!(
                        "Duplicate plugin id '{}': {} replaces {}",
                        id,
                        self.records[&id].base_path.display(),
                        previous.base_path.display()
                    );
                }
                None => self.order.push(id),
            }
        }
    }

    pub fn get(&self, id: &str) -> Option<&PluginRecord> {
        self.records.get(id)
    }

    /// Record for `id`, only while it is active
    pub fn get_active(&self, id: &str) -> Option<&PluginRecord> {
        self.records.get(id).filter(|record| record.is_active)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.records.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Every manifest regardless of state, in discovery order
    pub fn list_manifests(&self) -> Vec<PluginManifest> {
        self.records_in_order()
            .map(|record| record.manifest.clone())
            .collect()
    }

    /// Records in discovery order
    pub fn records_in_order(&self) -> impl Iterator<Item = &PluginRecord> {
        self.order.iter().filter_map(|id| self.records.get(id))
    }

    /// Active plugin ids in discovery order
    pub fn active_ids(&self) -> Vec<String> {
        self.records_in_order()
            .filter(|record| record.is_active)
            .map(|record| record.id().to_string())
            .collect()
    }

    /// Store the module handle and mark the record active
    pub fn mark_active(
        &mut self,
        id: &str,
        module: Option<Arc<dyn PluginModule>>,
    ) -> PluginResult<PluginRecord> {
        let record = self
            .records
            .get_mut(id)
            .ok_or_else(|| PluginError::not_found(id))?;
        record.set_active(module);
        Ok(record.clone())
    }

    /// Mark the record inactive, handing back the detached module
    pub fn mark_inactive(&mut self, id: &str) -> PluginResult<Option<Arc<dyn PluginModule>>> {
        let record = self
            .records
            .get_mut(id)
            .ok_or_else(|| PluginError::not_found(id))?;
        Ok(record.set_inactive())
    }
}

/// Thread-safe shared plugin registry
#[derive(Debug, Clone, Default)]
pub struct SharedPluginRegistry {
    inner: Arc<RwLock<PluginRegistry>>,
}

impl SharedPluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get access to the inner registry for read/write operations
    pub fn inner(&self) -> &Arc<RwLock<PluginRegistry>> {
        &self.inner
    }

    pub async fn populate(&self, entries: impl IntoIterator<Item = DiscoveredPlugin>) {
        let mut registry = self.inner.write().await;
        registry.populate(entries);
    }

    /// Snapshot of the record for `id`
    pub async fn get(&self, id: &str) -> Option<PluginRecord> {
        let registry = self.inner.read().await;
        registry.get(id).cloned()
    }

    /// Snapshot of the record for `id`, only while active
    pub async fn get_active(&self, id: &str) -> Option<PluginRecord> {
        let registry = self.inner.read().await;
        registry.get_active(id).cloned()
    }

    pub async fn contains(&self, id: &str) -> bool {
        let registry = self.inner.read().await;
        registry.contains(id)
    }

    pub async fn len(&self) -> usize {
        let registry = self.inner.read().await;
        registry.len()
    }

    pub async fn list_manifests(&self) -> Vec<PluginManifest> {
        let registry = self.inner.read().await;
        registry.list_manifests()
    }

    pub async fn active_ids(&self) -> Vec<String> {
        let registry = self.inner.read().await;
        registry.active_ids()
    }

    pub async fn is_active(&self, id: &str) -> bool {
        let registry = self.inner.read().await;
        registry.get_active(id).is_some()
    }

    pub async fn mark_active(
        &self,
        id: &str,
        module: Option<Arc<dyn PluginModule>>,
    ) -> PluginResult<PluginRecord> {
        let mut registry = self.inner.write().await;
        registry.mark_active(id, module)
    }

    pub async fn mark_inactive(&self, id: &str) -> PluginResult<Option<Arc<dyn PluginModule>>> {
        let mut registry = self.inner.write().await;
        registry.mark_inactive(id)
    }
}
