//! Resource store registry: a named set of queryable, watchable stores.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use serde_json::Value;

use super::overlay::OverlayResourceStore;
use super::traits::{OverlayOp, ResourceStore};
use crate::errors::StoreError;

/// A named collection of resource stores, one per watched resource type.
#[derive(Clone, Default)]
pub struct StoreRegistry {
    stores: Arc<RwLock<BTreeMap<String, Arc<dyn ResourceStore>>>>,
}

impl StoreRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, name: impl Into<String>, store: Arc<dyn ResourceStore>) {
        self.stores
            .write()
            .expect("registry lock poisoned")
            .insert(name.into(), store);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ResourceStore>> {
        self.stores
            .read()
            .expect("registry lock poisoned")
            .get(name)
            .cloned()
    }

    /// Every registered store, by name.
    pub fn all(&self) -> BTreeMap<String, Arc<dyn ResourceStore>> {
        self.stores.read().expect("registry lock poisoned").clone()
    }

    /// Build an overlay view of a single store with one simulated delta applied.
    pub fn create_overlay(
        &self,
        name: &str,
        namespace: &str,
        object_name: &str,
        resource: Option<Value>,
        op: OverlayOp,
    ) -> Result<Arc<dyn ResourceStore>, StoreError> {
        let base = self
            .get(name)
            .ok_or_else(|| StoreError::NotFound(name.to_string()))?;
        Ok(Arc::new(OverlayResourceStore::new(
            base, namespace, object_name, resource, op,
        )))
    }

    /// Build a full registry snapshot (map of every store) with exactly one
    /// store replaced by its overlay, for dry-run reconciliation.
    pub fn create_overlay_map(
        &self,
        name: &str,
        namespace: &str,
        object_name: &str,
        resource: Option<Value>,
        op: OverlayOp,
    ) -> Result<BTreeMap<String, Arc<dyn ResourceStore>>, StoreError> {
        let overlay = self.create_overlay(name, namespace, object_name, resource, op)?;
        let mut map = self.all();
        map.insert(name.to_string(), overlay);
        Ok(map)
    }
}
