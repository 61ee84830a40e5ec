//! Dotted-path key-expression evaluation used to build store indices.
//!
//! A key expression is a `.`-separated path into a resource's JSON value,
//! e.g. `metadata.namespace` or `spec.containerPort`. Evaluating a list of
//! expressions against a resource produces the composite index key used by
//! `Get`.

use serde_json::Value;

/// Evaluate a single dotted path against `value`, stringifying whatever is found.
/// Missing paths evaluate to the empty string so that index keys remain total
/// functions of the resource (never panics, never errors).
pub fn eval_path(value: &Value, path: &str) -> String {
    let mut current = value;
    for segment in path.split('.') {
        match current.get(segment) {
            Some(next) => current = next,
            None => return String::new(),
        }
    }
    stringify(current)
}

/// Evaluate every expression in `key_exprs` against `value`, producing the
/// composite index key in order.
pub fn eval_key(value: &Value, key_exprs: &[String]) -> Vec<String> {
    key_exprs.iter().map(|expr| eval_path(value, expr)).collect()
}

fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn eval_path_navigates_nested_objects() {
        let v = json!({"metadata": {"namespace": "default", "name": "pod-a"}});
        assert_eq!(eval_path(&v, "metadata.namespace"), "default");
        assert_eq!(eval_path(&v, "metadata.name"), "pod-a");
    }

    #[test]
    fn eval_path_missing_segment_is_empty_not_panic() {
        let v = json!({"metadata": {"namespace": "default"}});
        assert_eq!(eval_path(&v, "metadata.missing"), "");
        assert_eq!(eval_path(&v, "spec.containerPort"), "");
    }

    #[test]
    fn eval_key_builds_composite_key_in_order() {
        let v = json!({"metadata": {"namespace": "ns", "name": "n"}});
        let key = eval_key(&v, &["metadata.namespace".into(), "metadata.name".into()]);
        assert_eq!(key, vec!["ns".to_string(), "n".to_string()]);
    }

    #[test]
    fn numbers_stringify_without_decoration() {
        let v = json!({"port": 80});
        assert_eq!(eval_path(&v, "port"), "80");
    }
}
