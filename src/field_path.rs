//! Dotted field paths over JSON documents.
//!
//! Paths such as `system.embeddedEffects` or `effects.0.tint` address nested
//! values. Numeric segments index into arrays. Form submissions arrive as
//! flat maps of such paths and are expanded into nested objects before being
//! merged into a record.

use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FieldPathError {
    #[error("field path is empty")]
    Empty,
    #[error("`{0}` does not hold an object")]
    NotAnObject(String),
    #[error("index {index} is out of bounds at `{path}`")]
    OutOfBounds { path: String, index: usize },
}

pub fn get<'a>(doc: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(doc, |node, key| match node {
        Value::Object(map) => map.get(key),
        Value::Array(items) => key.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

/// Set the value at `path`, creating intermediate objects as needed.
pub fn set(doc: &mut Value, path: &str, value: Value) -> Result<(), FieldPathError> {
    if path.is_empty() {
        return Err(FieldPathError::Empty);
    }

    let (parents, last) = match path.rsplit_once('.') {
        Some((parents, last)) => (Some(parents), last),
        None => (None, path),
    };

    let mut node = doc;
    let mut walked = String::new();
    if let Some(parents) = parents {
        for key in parents.split('.') {
            if !walked.is_empty() {
                walked.push('.');
            }
            walked.push_str(key);
            node = descend(node, key, &walked)?;
        }
    }

    if node.is_null() {
        *node = Value::Object(Map::new());
    }
    match node {
        Value::Object(map) => {
            map.insert(last.to_string(), value);
            Ok(())
        }
        Value::Array(items) => {
            let index = parse_index(last, path)?;
            let slot = items.get_mut(index).ok_or(FieldPathError::OutOfBounds {
                path: path.to_string(),
                index,
            })?;
            *slot = value;
            Ok(())
        }
        _ => Err(FieldPathError::NotAnObject(walked)),
    }
}

fn descend<'a>(node: &'a mut Value, key: &str, walked: &str) -> Result<&'a mut Value, FieldPathError> {
    if node.is_null() {
        *node = Value::Object(Map::new());
    }
    match node {
        Value::Object(map) => Ok(map
            .entry(key.to_string())
            .or_insert_with(|| Value::Object(Map::new()))),
        Value::Array(items) => {
            let index = parse_index(key, walked)?;
            items.get_mut(index).ok_or(FieldPathError::OutOfBounds {
                path: walked.to_string(),
                index,
            })
        }
        _ => Err(FieldPathError::NotAnObject(walked.to_string())),
    }
}

fn parse_index(key: &str, path: &str) -> Result<usize, FieldPathError> {
    key.parse::<usize>()
        .map_err(|_| FieldPathError::NotAnObject(path.to_string()))
}

/// Expand a flat map of dotted paths into a nested object.
pub fn expand(flat: &Map<String, Value>) -> Result<Value, FieldPathError> {
    let mut out = Value::Object(Map::new());
    for (path, value) in flat {
        set(&mut out, path, value.clone())?;
    }
    Ok(out)
}

/// Deep-merge `source` into `target`.
///
/// Objects merge key by key. An object whose keys are all indices merges
/// into an array element-wise, which is how `effects.0.tint` style form keys
/// land on existing array entries. Anything else replaces the target.
pub fn merge(target: &mut Value, source: Value) {
    match (target, source) {
        (Value::Object(target), Value::Object(source)) => {
            for (key, value) in source {
                match target.get_mut(&key) {
                    Some(existing) => merge(existing, value),
                    None => {
                        target.insert(key, value);
                    }
                }
            }
        }
        (Value::Array(items), Value::Object(source))
            if source.keys().all(|k| k.parse::<usize>().is_ok()) =>
        {
            for (key, value) in source {
                if let Some(item) = key.parse::<usize>().ok().and_then(|i| items.get_mut(i)) {
                    merge(item, value);
                }
            }
        }
        (target, source) => *target = source,
    }
}

/// Copy keys that `previous` holds as explicit `null` into `next` where
/// `next` omits them.
///
/// Typed records drop null keys when serialized; this puts them back so an
/// unchanged record writes the value it was read from. Arrays are matched
/// element by element on their `id`.
pub fn keep_nulls(previous: &Value, next: &mut Value) {
    match (previous, next) {
        (Value::Object(previous), Value::Object(next)) => {
            for (key, old) in previous {
                match next.get_mut(key) {
                    Some(new) => keep_nulls(old, new),
                    None if old.is_null() => {
                        next.insert(key.clone(), Value::Null);
                    }
                    None => {}
                }
            }
        }
        (Value::Array(previous), Value::Array(next)) => {
            for new in next.iter_mut() {
                let Some(id) = new.get("id").and_then(Value::as_str) else {
                    continue;
                };
                let old = previous
                    .iter()
                    .find(|old| old.get("id").and_then(Value::as_str) == Some(id));
                if let Some(old) = old {
                    keep_nulls(old, new);
                }
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn get_walks_objects_and_arrays() {
        let doc = json!({ "system": { "list": [{ "id": "a" }, { "id": "b" }] } });
        assert_eq!(get(&doc, "system.list.1.id"), Some(&json!("b")));
        assert_eq!(get(&doc, "system.missing"), None);
        assert_eq!(get(&doc, "system.list.7"), None);
    }

    #[test]
    fn set_creates_intermediate_objects() {
        let mut doc = json!({});
        set(&mut doc, "system.details.range", json!(30)).unwrap();
        assert_eq!(doc, json!({ "system": { "details": { "range": 30 } } }));
    }

    #[test]
    fn set_replaces_array_elements_in_bounds_only() {
        let mut doc = json!({ "effects": [{ "tint": "#000000" }] });
        set(&mut doc, "effects.0.tint", json!("#ff0000")).unwrap();
        assert_eq!(doc["effects"][0]["tint"], json!("#ff0000"));

        let err = set(&mut doc, "effects.3.tint", json!("#ff0000")).unwrap_err();
        assert!(matches!(err, FieldPathError::OutOfBounds { .. }));
    }

    #[test]
    fn set_refuses_to_descend_into_scalars() {
        let mut doc = json!({ "name": "Strike" });
        let err = set(&mut doc, "name.first", json!("x")).unwrap_err();
        assert_eq!(err, FieldPathError::NotAnObject("name".to_string()));
    }

    #[test]
    fn expand_then_merge_applies_form_data() {
        let mut form = Map::new();
        form.insert("name".into(), json!("Renamed"));
        form.insert("system.damage".into(), json!("2d6"));
        form.insert("effects.0.tint".into(), json!("#00ff00"));

        let mut record = json!({
            "id": "r1",
            "name": "Strike",
            "system": { "damage": "1d6", "range": 5 },
            "effects": [{ "id": "e1", "tint": "#ffffff" }]
        });
        merge(&mut record, expand(&form).unwrap());

        assert_eq!(
            record,
            json!({
                "id": "r1",
                "name": "Renamed",
                "system": { "damage": "2d6", "range": 5 },
                "effects": [{ "id": "e1", "tint": "#00ff00" }]
            })
        );
    }

    #[test]
    fn keep_nulls_restores_dropped_keys_only() {
        let previous = json!({
            "id": "r1",
            "name": null,
            "icon": "old.svg",
            "effects": [{ "id": "e1", "tint": null, "duration": { "seconds": null } }]
        });
        let mut next = json!({
            "id": "r1",
            "effects": [{ "id": "e1", "duration": {} }, { "id": "e2" }]
        });

        keep_nulls(&previous, &mut next);

        assert_eq!(
            next,
            json!({
                "id": "r1",
                "name": null,
                "effects": [
                    { "id": "e1", "tint": null, "duration": { "seconds": null } },
                    { "id": "e2" }
                ]
            })
        );
    }
}
