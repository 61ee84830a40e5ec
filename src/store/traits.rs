//! The resource store contract.
//!
//! This is the interface the (out-of-scope) Kubernetes watcher layer must
//! implement, and the interface every upstream component (store wrapper,
//! discovery engine, overlay) consumes. `List`/`Get` are synchronous,
//! modeled as O(1)/O(n) in-memory operations that never block.

use serde_json::Value;

use crate::errors::StoreError;

/// A single simulated write applied by an overlay store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverlayOp {
    Create,
    Update,
    Delete,
}

/// A queryable, watchable store of one resource type's objects.
///
/// Implementors store resources in a Kubernetes-generic representation
/// (plain `serde_json::Value` trees here, standing in for the unstructured
/// object the real watcher would hand back) and maintain exactly one index,
/// built once from a config-provided key-expression list.
pub trait ResourceStore: Send + Sync {
    /// The resource type name this store holds (e.g. `"haproxy-pods"`).
    fn resource_type(&self) -> &str;

    /// All resources currently in the store. Order is unspecified.
    fn list(&self) -> Result<Vec<Value>, StoreError>;

    /// Indexed lookup. `keys` must match the arity of this store's configured
    /// key-expression list. May return zero, one, or many matches.
    fn get(&self, keys: &[String]) -> Result<Vec<Value>, StoreError>;

    /// Insert a new resource (used by the watcher, not by core consumers).
    fn add(&self, resource: Value) -> Result<(), StoreError>;

    /// Replace an existing resource by identity.
    fn update(&self, resource: Value) -> Result<(), StoreError>;

    /// Remove a resource by its identity string (see [`ResourceStore::identity_of`]).
    fn delete(&self, identity: &str) -> Result<(), StoreError>;

    /// Remove every resource from the store.
    fn clear(&self) -> Result<(), StoreError>;

    /// Compute the identity of a resource (used for `update`/`delete` and by overlays).
    fn identity_of(&self, resource: &Value) -> String;

    /// Compute the index key a resource would be filed under.
    fn index_key_of(&self, resource: &Value) -> Vec<String>;

    /// The number of key components this store's index expects.
    fn key_arity(&self) -> usize;
}
