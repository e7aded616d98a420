//! Flattening of a nested JSON document into dot-delimited leaf paths.

use std::collections::BTreeMap;

use serde_json::Value;

/// Flatten `doc` into a mapping from dot-delimited path to leaf value.
///
/// Objects recurse through their keys and arrays through their indices;
/// everything else is a leaf. Empty objects and arrays are leaves too, so a
/// marker placed where a sub-document normally sits still gets a path.
pub fn flatten(doc: &Value) -> BTreeMap<String, Value> {
    let mut flat = BTreeMap::new();
    walk(doc, String::new(), &mut flat);
    flat
}

fn walk(value: &Value, prefix: String, out: &mut BTreeMap<String, Value>) {
    match value {
        Value::Object(map) if !map.is_empty() => {
            for (key, child) in map {
                walk(child, join(&prefix, key), out);
            }
        }
        Value::Array(items) if !items.is_empty() => {
            for (index, child) in items.iter().enumerate() {
                walk(child, join(&prefix, &index.to_string()), out);
            }
        }
        leaf => {
            out.insert(prefix, leaf.clone());
        }
    }
}

fn join(prefix: &str, segment: &str) -> String {
    if prefix.is_empty() {
        segment.to_string()
    } else {
        format!("{}.{}", prefix, segment)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::flatten;

    #[test]
    fn nested_objects_flatten_to_dotted_paths() {
        let flat = flatten(&json!({
            "person": { "head": { "eye": { "left": "blue" } } }
        }));
        assert_eq!(flat.get("person.head.eye.left"), Some(&json!("blue")));
        assert_eq!(flat.len(), 1);
    }

    #[test]
    fn arrays_flatten_through_indices() {
        let flat = flatten(&json!({ "roles": ["Employee", "CEO"] }));
        assert_eq!(flat.get("roles.0"), Some(&json!("Employee")));
        assert_eq!(flat.get("roles.1"), Some(&json!("CEO")));
    }

    #[test]
    fn empty_containers_are_leaves() {
        let flat = flatten(&json!({ "before": {}, "tags": [] }));
        assert_eq!(flat.get("before"), Some(&json!({})));
        assert_eq!(flat.get("tags"), Some(&json!([])));
    }
}
