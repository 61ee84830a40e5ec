//! An in-memory `ResourceStore` implementation.
//!
//! The real Kubernetes watcher layer is out of scope; this type
//! satisfies the same contract so the rest of the core can be driven and
//! tested without a cluster. Production wiring replaces this with an
//! informer-backed store behind the same trait.

use std::collections::BTreeMap;
use std::sync::RwLock;

use serde_json::Value;

use super::index::eval_key;
use super::traits::ResourceStore;
use crate::errors::StoreError;

struct State {
    by_identity: BTreeMap<String, Value>,
    by_index_key: BTreeMap<Vec<String>, Vec<String>>,
}

/// A thread-safe, in-memory resource store indexed by a fixed key-expression list.
pub struct MemoryResourceStore {
    resource_type: String,
    identity_exprs: Vec<String>,
    key_exprs: Vec<String>,
    state: RwLock<State>,
}

impl MemoryResourceStore {
    /// `identity_exprs` identifies a resource uniquely (typically
    /// `["metadata.namespace", "metadata.name"]`); `key_exprs` is the
    /// config-provided index used by `get`.
    pub fn new(
        resource_type: impl Into<String>,
        identity_exprs: Vec<String>,
        key_exprs: Vec<String>,
    ) -> Self {
        Self {
            resource_type: resource_type.into(),
            identity_exprs,
            key_exprs,
            state: RwLock::new(State {
                by_identity: BTreeMap::new(),
                by_index_key: BTreeMap::new(),
            }),
        }
    }

    fn identity(&self, resource: &Value) -> String {
        eval_key(resource, &self.identity_exprs).join("/")
    }

    fn upsert(&self, resource: Value) -> Result<(), StoreError> {
        let identity = self.identity(&resource);
        let new_key = eval_key(&resource, &self.key_exprs);

        let mut state = self
            .state
            .write()
            .map_err(|_| StoreError::ListFailed {
                store: self.resource_type.clone(),
                message: "lock poisoned".into(),
            })?;

        if let Some(old) = state.by_identity.get(&identity) {
            let old_key = eval_key(old, &self.key_exprs);
            if let Some(bucket) = state.by_index_key.get_mut(&old_key) {
                bucket.retain(|id| id != &identity);
                if bucket.is_empty() {
                    state.by_index_key.remove(&old_key);
                }
            }
        }

        state
            .by_index_key
            .entry(new_key)
            .or_default()
            .push(identity.clone());
        state.by_identity.insert(identity, resource);
        Ok(())
    }
}

impl ResourceStore for MemoryResourceStore {
    fn resource_type(&self) -> &str {
        &self.resource_type
    }

    fn list(&self) -> Result<Vec<Value>, StoreError> {
        let state = self.state.read().map_err(|_| StoreError::ListFailed {
            store: self.resource_type.clone(),
            message: "lock poisoned".into(),
        })?;
        Ok(state.by_identity.values().cloned().collect())
    }

    fn get(&self, keys: &[String]) -> Result<Vec<Value>, StoreError> {
        if keys.len() != self.key_exprs.len() {
            return Err(StoreError::KeyArityMismatch {
                store: self.resource_type.clone(),
                index: self.key_exprs.join(","),
                expected: self.key_exprs.len(),
                actual: keys.len(),
            });
        }
        let state = self.state.read().map_err(|_| StoreError::GetFailed {
            store: self.resource_type.clone(),
            message: "lock poisoned".into(),
        })?;
        let Some(identities) = state.by_index_key.get(keys) else {
            return Ok(Vec::new());
        };
        Ok(identities
            .iter()
            .filter_map(|id| state.by_identity.get(id).cloned())
            .collect())
    }

    fn add(&self, resource: Value) -> Result<(), StoreError> {
        self.upsert(resource)
    }

    fn update(&self, resource: Value) -> Result<(), StoreError> {
        self.upsert(resource)
    }

    fn delete(&self, identity: &str) -> Result<(), StoreError> {
        let mut state = self.state.write().map_err(|_| StoreError::ListFailed {
            store: self.resource_type.clone(),
            message: "lock poisoned".into(),
        })?;
        if let Some(old) = state.by_identity.remove(identity) {
            let old_key = eval_key(&old, &self.key_exprs);
            if let Some(bucket) = state.by_index_key.get_mut(&old_key) {
                bucket.retain(|id| id != identity);
                if bucket.is_empty() {
                    state.by_index_key.remove(&old_key);
                }
            }
        }
        Ok(())
    }

    fn clear(&self) -> Result<(), StoreError> {
        let mut state = self.state.write().map_err(|_| StoreError::ListFailed {
            store: self.resource_type.clone(),
            message: "lock poisoned".into(),
        })?;
        state.by_identity.clear();
        state.by_index_key.clear();
        Ok(())
    }

    fn identity_of(&self, resource: &Value) -> String {
        self.identity(resource)
    }

    fn index_key_of(&self, resource: &Value) -> Vec<String> {
        eval_key(resource, &self.key_exprs)
    }

    fn key_arity(&self) -> usize {
        self.key_exprs.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn pod_store() -> MemoryResourceStore {
        MemoryResourceStore::new(
            "haproxy-pods",
            vec!["metadata.namespace".into(), "metadata.name".into()],
            vec!["metadata.namespace".into()],
        )
    }

    #[test]
    fn add_then_list_returns_resource() {
        let store = pod_store();
        store
            .add(json!({"metadata": {"namespace": "ns", "name": "pod-a"}}))
            .unwrap();
        assert_eq!(store.list().unwrap().len(), 1);
    }

    #[test]
    fn get_uses_configured_index() {
        let store = pod_store();
        store
            .add(json!({"metadata": {"namespace": "ns1", "name": "a"}}))
            .unwrap();
        store
            .add(json!({"metadata": {"namespace": "ns1", "name": "b"}}))
            .unwrap();
        store
            .add(json!({"metadata": {"namespace": "ns2", "name": "c"}}))
            .unwrap();

        let matches = store.get(&["ns1".to_string()]).unwrap();
        assert_eq!(matches.len(), 2);
        assert!(store.get(&["ns3".to_string()]).unwrap().is_empty());
    }

    #[test]
    fn get_with_wrong_arity_errors() {
        let store = pod_store();
        let err = store.get(&["a".into(), "b".into()]).unwrap_err();
        assert!(matches!(err, StoreError::KeyArityMismatch { .. }));
    }

    #[test]
    fn update_moves_index_bucket_when_key_changes() {
        let store = pod_store();
        store
            .add(json!({"metadata": {"namespace": "ns1", "name": "a"}}))
            .unwrap();
        store
            .update(json!({"metadata": {"namespace": "ns2", "name": "a"}}))
            .unwrap();

        assert!(store.get(&["ns1".to_string()]).unwrap().is_empty());
        assert_eq!(store.get(&["ns2".to_string()]).unwrap().len(), 1);
    }

    #[test]
    fn delete_removes_from_list_and_index() {
        let store = pod_store();
        store
            .add(json!({"metadata": {"namespace": "ns1", "name": "a"}}))
            .unwrap();
        store.delete("ns1/a").unwrap();
        assert!(store.list().unwrap().is_empty());
        assert!(store.get(&["ns1".to_string()]).unwrap().is_empty());
    }

    #[test]
    fn clear_empties_store() {
        let store = pod_store();
        store
            .add(json!({"metadata": {"namespace": "ns1", "name": "a"}}))
            .unwrap();
        store.clear().unwrap();
        assert!(store.list().unwrap().is_empty());
    }
}
