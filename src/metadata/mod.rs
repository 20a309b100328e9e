// Metadata extraction and flattening (C6) shared between the image and
// movie extractors.

pub mod exif;
pub mod ffprobe;

use std::collections::BTreeMap;

use serde_json::Value;

/// A flattened metadata leaf. Most leaves are scalars; the rare "list whose
/// element is itself a list" leaf is kept as a list and space-joined only
/// at storage time, matching how the source system's row-insertion step
/// joins list cells rather than the flattening step itself.
#[derive(Debug, Clone, PartialEq)]
pub enum FlatValue {
    Scalar(String),
    List(Vec<String>),
}

impl FlatValue {
    /// Render the value the way a `MediaMetadata` row stores it: list values
    /// joined with single spaces.
    pub fn to_storage_string(&self) -> String {
        match self {
            FlatValue::Scalar(s) => s.clone(),
            FlatValue::List(items) => items.join(" "),
        }
    }
}

fn stringify_scalar(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Flatten a JSON object into dotted-with-underscore keys. Separator: `_`.
/// A list element becomes `parent_i`; nested objects recurse; a list whose
/// element is itself a list is kept as a `FlatValue::List` leaf rather than
/// being further exploded.
///
/// An object all of whose direct values are already scalar is returned
/// unflattened at that level (no prefix applied to its keys) — this check
/// is re-applied at every recursion entry, not only the root, so a nested
/// all-scalar object (e.g. ffprobe's `format.tags`) drops its parent prefix
/// too. This mirrors the base case of the routine historical rows were
/// produced with, including its flattened-keys-collide-on-overwrite quirk
/// when two sibling all-scalar objects share a key.
pub fn flatten_metadata(value: &Value) -> BTreeMap<String, FlatValue> {
    let mut out = BTreeMap::new();
    if let Value::Object(map) = value {
        flatten_object(map, None, &mut out);
    }
    out
}

fn flatten_object(map: &serde_json::Map<String, Value>, parent_key: Option<&str>, out: &mut BTreeMap<String, FlatValue>) {
    if map.values().all(|v| !v.is_object() && !v.is_array()) {
        for (k, v) in map {
            out.insert(k.clone(), FlatValue::Scalar(stringify_scalar(v)));
        }
        return;
    }
    for (k, v) in map {
        let new_key = match parent_key {
            Some(p) => format!("{p}_{k}"),
            None => k.clone(),
        };
        flatten_value(v, &new_key, out);
    }
}

fn flatten_value(value: &Value, key: &str, out: &mut BTreeMap<String, FlatValue>) {
    match value {
        Value::Object(map) => flatten_object(map, Some(key), out),
        Value::Array(items) => {
            for (i, item) in items.iter().enumerate() {
                let idx_key = format!("{key}_{i}");
                match item {
                    Value::Object(inner) => flatten_object(inner, Some(&idx_key), out),
                    Value::Array(inner) => {
                        let joined: Vec<String> = inner.iter().map(stringify_scalar).collect();
                        out.insert(idx_key, FlatValue::List(joined));
                    }
                    other => {
                        out.insert(idx_key, FlatValue::Scalar(stringify_scalar(other)));
                    }
                }
            }
        }
        other => {
            out.insert(key.to_string(), FlatValue::Scalar(stringify_scalar(other)));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn flat_object_keeps_keys_unprefixed() {
        let v = json!({"EXIF:Make": "Canon", "EXIF:Model": "R5"});
        let flat = flatten_metadata(&v);
        assert_eq!(flat.get("EXIF:Make").unwrap().to_storage_string(), "Canon");
    }

    #[test]
    fn nested_object_gets_prefixed_keys() {
        let v = json!({"format": {"duration": "12.3", "tags": {"creation_time": "2023-01-01"}}});
        let flat = flatten_metadata(&v);
        assert_eq!(flat.get("format_duration").unwrap().to_storage_string(), "12.3");
        // `tags` is itself all-scalar, so it drops the `format_` prefix instead of
        // nesting under it.
        assert_eq!(
            flat.get("creation_time").unwrap().to_storage_string(),
            "2023-01-01"
        );
        assert!(!flat.contains_key("format_tags_creation_time"));
    }

    #[test]
    fn list_of_scalars_explodes_by_index() {
        let v = json!({"tags": ["a", "b", "c"]});
        let flat = flatten_metadata(&v);
        assert_eq!(flat.get("tags_0").unwrap().to_storage_string(), "a");
        assert_eq!(flat.get("tags_1").unwrap().to_storage_string(), "b");
        assert_eq!(flat.get("tags_2").unwrap().to_storage_string(), "c");
    }

    #[test]
    fn list_of_lists_is_space_joined_at_storage_time() {
        let v = json!({"grid": [["a", "b"], ["c"]]});
        let flat = flatten_metadata(&v);
        assert_eq!(flat.get("grid_0").unwrap().to_storage_string(), "a b");
        assert_eq!(flat.get("grid_1").unwrap().to_storage_string(), "c");
    }

    #[test]
    fn list_of_objects_recurses_with_index_suffix() {
        // Each stream element is itself all-scalar, so it drops the
        // `streams_i` prefix too — the later element wins on key collision.
        let v = json!({"streams": [{"codec": "h264"}, {"codec": "aac"}]});
        let flat = flatten_metadata(&v);
        assert_eq!(flat.get("codec").unwrap().to_storage_string(), "aac");
        assert!(!flat.contains_key("streams_0_codec"));
        assert!(!flat.contains_key("streams_1_codec"));
    }

    #[test]
    fn list_of_objects_with_distinct_keys_still_recurses_when_not_all_scalar() {
        let v = json!({"streams": [{"codec": "h264", "tags": {"lang": "eng"}}]});
        let flat = flatten_metadata(&v);
        assert_eq!(flat.get("streams_0_codec").unwrap().to_storage_string(), "h264");
        assert_eq!(flat.get("lang").unwrap().to_storage_string(), "eng");
    }
}
