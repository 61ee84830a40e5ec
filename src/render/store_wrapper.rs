//! Template-facing façade over a raw `ResourceStore`.
//!
//! Adapts `List`/`Get` into the three-method surface templates actually
//! call, with per-render caching of `List()`, float/int coercion, and
//! store-error-to-empty-result translation (templates only need to test for
//! absence, never handle a store error directly).

use std::sync::Mutex;

use serde_json::Value;
use tracing::warn;

use crate::store::ResourceStore;

/// Recursively converts integer-valued 64-bit floats back into integers.
/// Idempotent: running it twice produces the same result as running it once.
/// Non-integer floats, strings, booleans, and null are left untouched.
pub fn convert_floats_to_ints(value: &Value) -> Value {
    match value {
        Value::Number(n) => {
            if n.is_i64() || n.is_u64() {
                return value.clone();
            }
            if let Some(f) = n.as_f64() {
                if f.is_finite() && f.fract() == 0.0 && f as i64 as f64 == f {
                    return Value::from(f as i64);
                }
            }
            value.clone()
        }
        Value::Array(items) => Value::Array(items.iter().map(convert_floats_to_ints).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), convert_floats_to_ints(v)))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// Coerces a template-supplied key argument to its string form. Template
/// engines often hand back typed wrappers instead of plain strings; this
/// accepts anything `serde_json` can represent and stringifies non-string
/// scalars the way a template author would expect.
pub fn coerce_key(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        other => other.to_string(),
    }
}

/// A render-scoped wrapper over one resource store. `List()` is cached for
/// the lifetime of the wrapper (one render cycle); `Fetch`/`GetSingle` are
/// not, since indexed result sets are small.
pub struct StoreWrapper {
    store: std::sync::Arc<dyn ResourceStore>,
    list_cache: Mutex<Option<std::sync::Arc<Vec<Value>>>>,
}

impl StoreWrapper {
    pub fn new(store: std::sync::Arc<dyn ResourceStore>) -> Self {
        Self {
            store,
            list_cache: Mutex::new(None),
        }
    }

    /// Returns the same cached slice identity on every call within a render.
    pub fn list(&self) -> std::sync::Arc<Vec<Value>> {
        let mut cache = self.list_cache.lock().expect("store wrapper lock poisoned");
        if let Some(cached) = &*cache {
            return cached.clone();
        }
        let values = match self.store.list() {
            Ok(values) => values.iter().map(convert_floats_to_ints).collect(),
            Err(e) => {
                warn!(store = self.store.resource_type(), error = %e, "store List() failed, returning empty result");
                Vec::new()
            }
        };
        let values = std::sync::Arc::new(values);
        *cache = Some(values.clone());
        values
    }

    pub fn fetch(&self, keys: &[Value]) -> Vec<Value> {
        let keys: Vec<String> = keys.iter().map(coerce_key).collect();
        match self.store.get(&keys) {
            Ok(values) => values.iter().map(convert_floats_to_ints).collect(),
            Err(e) => {
                warn!(store = self.store.resource_type(), error = %e, "store Get() failed, returning empty result");
                Vec::new()
            }
        }
    }

    /// 0 matches → `None` (valid absence); 1 match → that value; >1 matches
    /// → `None` with an "ambiguous" warning logged.
    pub fn get_single(&self, keys: &[Value]) -> Option<Value> {
        let mut results = self.fetch(keys);
        match results.len() {
            0 => None,
            1 => Some(results.remove(0)),
            n => {
                warn!(
                    store = self.store.resource_type(),
                    matches = n,
                    "GetSingle() matched more than one resource, treating as absent"
                );
                None
            }
        }
    }
}
