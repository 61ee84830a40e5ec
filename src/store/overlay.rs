//! Overlay stores: copy-on-write dry-run views over a base store.
//!
//! An overlay applies exactly one simulated delta (CREATE/UPDATE/DELETE) on
//! top of a base store without copying the base. An overlay read costs O(1)
//! more than the equivalent base read and the base is never mutated.

use std::sync::Arc;

use serde_json::Value;

use super::traits::{OverlayOp, ResourceStore};
use crate::errors::StoreError;

/// A base store with one simulated delta applied on read.
pub struct OverlayResourceStore {
    base: Arc<dyn ResourceStore>,
    identity: String,
    op: OverlayOp,
    resource: Option<Value>,
}

impl OverlayResourceStore {
    pub fn new(
        base: Arc<dyn ResourceStore>,
        namespace: &str,
        object_name: &str,
        resource: Option<Value>,
        op: OverlayOp,
    ) -> Self {
        Self {
            base,
            identity: format!("{namespace}/{object_name}"),
            op,
            resource,
        }
    }
}

impl ResourceStore for OverlayResourceStore {
    fn resource_type(&self) -> &str {
        self.base.resource_type()
    }

    fn list(&self) -> Result<Vec<Value>, StoreError> {
        let mut resources = self.base.list()?;
        resources.retain(|r| self.base.identity_of(r) != self.identity);
        match self.op {
            OverlayOp::Create | OverlayOp::Update => {
                if let Some(resource) = &self.resource {
                    resources.push(resource.clone());
                }
            }
            OverlayOp::Delete => {}
        }
        Ok(resources)
    }

    fn get(&self, keys: &[String]) -> Result<Vec<Value>, StoreError> {
        let mut matches = self.base.get(keys)?;
        matches.retain(|r| self.base.identity_of(r) != self.identity);
        match self.op {
            OverlayOp::Create | OverlayOp::Update => {
                if let Some(resource) = &self.resource {
                    if self.base.index_key_of(resource) == keys {
                        matches.push(resource.clone());
                    }
                }
            }
            OverlayOp::Delete => {}
        }
        Ok(matches)
    }

    fn add(&self, _resource: Value) -> Result<(), StoreError> {
        Err(StoreError::ListFailed {
            store: self.resource_type().to_string(),
            message: "overlay stores are read-only".into(),
        })
    }

    fn update(&self, _resource: Value) -> Result<(), StoreError> {
        Err(StoreError::ListFailed {
            store: self.resource_type().to_string(),
            message: "overlay stores are read-only".into(),
        })
    }

    fn delete(&self, _identity: &str) -> Result<(), StoreError> {
        Err(StoreError::ListFailed {
            store: self.resource_type().to_string(),
            message: "overlay stores are read-only".into(),
        })
    }

    fn clear(&self) -> Result<(), StoreError> {
        Err(StoreError::ListFailed {
            store: self.resource_type().to_string(),
            message: "overlay stores are read-only".into(),
        })
    }

    fn identity_of(&self, resource: &Value) -> String {
        self.base.identity_of(resource)
    }

    fn index_key_of(&self, resource: &Value) -> Vec<String> {
        self.base.index_key_of(resource)
    }

    fn key_arity(&self) -> usize {
        self.base.key_arity()
    }
}
