//! Three-way merge for registry objects.
//!
//! On restore, a registry key may have three relevant documents: the value
//! restored last time (`original`, read from the shadow key), the value
//! arriving in the archive (`modified`) and the value currently live in the
//! backend (`current`). The merge rebases the `original` to `modified`
//! delta over `current` so that changes made by the target cluster's
//! controllers survive the restore. Patch semantics are RFC 7396: a field
//! changed in `modified` takes `modified`'s value, a field `modified`
//! removed is removed, and a field untouched by `modified` keeps whatever
//! `current` has.

use serde_json::{Map, Value as JsonValue};

use crate::codec::ObjectCodec;
use crate::error::Result;

/// Merge `modified` over `current`, using `original` as the common
/// ancestor. All three inputs are in backend wire (or JSON) form.
///
/// Returns `Ok(None)` when no write is needed: either `original` and
/// `modified` are byte-identical, or the computed patch is empty.
/// Otherwise returns the merged document re-encoded into wire form.
pub fn three_way_merge(
    codec: &ObjectCodec,
    original: &[u8],
    modified: &[u8],
    current: &[u8],
) -> Result<Option<Vec<u8>>> {
    if original == modified {
        return Ok(None);
    }

    let original = codec.decode(original)?.body;
    let modified = codec.decode(modified)?.body;
    let mut current = codec.decode(current)?;

    let patch = merge_patch(&original, &modified);
    if patch.as_object().is_some_and(Map::is_empty) {
        return Ok(None);
    }

    json_patch::merge(&mut current.body, &patch);
    codec.encode_to_vec(&current).map(Some)
}

/// Build the RFC 7396 merge patch that rewrites `original` into
/// `modified`.
///
/// Fields equal in both documents are omitted, so applying the patch to a
/// third document leaves that document's own values for them in place.
/// Fields missing from `modified` become explicit nulls, which the merge
/// application treats as removals.
pub fn merge_patch(original: &JsonValue, modified: &JsonValue) -> JsonValue {
    match (original, modified) {
        (JsonValue::Object(original), JsonValue::Object(modified)) => {
            let mut patch = Map::new();
            for (key, modified_value) in modified {
                match original.get(key) {
                    Some(original_value) if original_value == modified_value => {}
                    Some(original_value) => {
                        patch.insert(key.clone(), merge_patch(original_value, modified_value));
                    }
                    None => {
                        patch.insert(key.clone(), modified_value.clone());
                    }
                }
            }
            for key in original.keys() {
                if !modified.contains_key(key) {
                    patch.insert(key.clone(), JsonValue::Null);
                }
            }
            JsonValue::Object(patch)
        }
        // Arrays and scalars are replaced wholesale per RFC 7396.
        _ => modified.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn wire(codec: &ObjectCodec, body: serde_json::Value) -> Vec<u8> {
        codec.from_json(&serde_json::to_vec(&body).unwrap()).unwrap()
    }

    fn configmap(data: serde_json::Value) -> serde_json::Value {
        json!({
            "apiVersion": "v1",
            "kind": "ConfigMap",
            "metadata": {"name": "x", "namespace": "ns"},
            "data": data
        })
    }

    #[test]
    fn test_merge_patch_changed_and_added_fields() {
        let original = json!({"a": 1, "b": 2});
        let modified = json!({"a": 1, "b": 3, "c": 4});
        let patch = merge_patch(&original, &modified);
        assert_eq!(patch, json!({"b": 3, "c": 4}));
    }

    #[test]
    fn test_merge_patch_removed_field_becomes_null() {
        let original = json!({"a": 1, "b": 2});
        let modified = json!({"a": 1});
        let patch = merge_patch(&original, &modified);
        assert_eq!(patch, json!({"b": null}));
    }

    #[test]
    fn test_merge_patch_recurses_into_objects() {
        let original = json!({"spec": {"replicas": 1, "paused": false}});
        let modified = json!({"spec": {"replicas": 3, "paused": false}});
        let patch = merge_patch(&original, &modified);
        assert_eq!(patch, json!({"spec": {"replicas": 3}}));
    }

    #[test]
    fn test_merge_patch_replaces_arrays_wholesale() {
        let original = json!({"finalizers": ["a", "b"]});
        let modified = json!({"finalizers": ["a"]});
        let patch = merge_patch(&original, &modified);
        assert_eq!(patch, json!({"finalizers": ["a"]}));
    }

    #[test]
    fn test_identical_bytes_mean_no_change() {
        let codec = ObjectCodec::default();
        let doc = wire(&codec, configmap(json!({"a": "1"})));
        let other = wire(&codec, configmap(json!({"a": "2"})));
        assert!(three_way_merge(&codec, &doc, &doc, &other)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_equivalent_documents_mean_no_change() {
        let codec = ObjectCodec::default();
        // Wire form vs JSON form of the same document: bytes differ but
        // the patch comes out empty.
        let body = configmap(json!({"a": "1"}));
        let as_wire = wire(&codec, body.clone());
        let as_json = serde_json::to_vec(&body).unwrap();
        let current = wire(&codec, configmap(json!({"a": "locally-changed"})));
        assert!(three_way_merge(&codec, &as_wire, &as_json, &current)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_local_additions_survive_the_merge() {
        let codec = ObjectCodec::default();
        let original = wire(&codec, configmap(json!({"a": "1"})));
        let modified = wire(&codec, configmap(json!({"a": "1", "c": "3"})));
        let current = wire(&codec, configmap(json!({"a": "1", "b": "2"})));

        let merged = three_way_merge(&codec, &original, &modified, &current)
            .unwrap()
            .expect("merge must produce a new value");
        let merged = codec.decode(&merged).unwrap();
        assert_eq!(merged.body["data"], json!({"a": "1", "b": "2", "c": "3"}));
    }

    #[test]
    fn test_fields_removed_by_the_snapshot_are_removed() {
        let codec = ObjectCodec::default();
        let original = wire(&codec, configmap(json!({"a": "1", "drop": "me"})));
        let modified = wire(&codec, configmap(json!({"a": "1"})));
        let current = wire(&codec, configmap(json!({"a": "1", "drop": "me", "b": "2"})));

        let merged = three_way_merge(&codec, &original, &modified, &current)
            .unwrap()
            .expect("merge must produce a new value");
        let merged = codec.decode(&merged).unwrap();
        assert_eq!(merged.body["data"], json!({"a": "1", "b": "2"}));
    }

    #[test]
    fn test_current_value_wins_for_untouched_fields() {
        let codec = ObjectCodec::default();
        let original = wire(&codec, configmap(json!({"a": "1", "b": "2"})));
        let modified = wire(&codec, configmap(json!({"a": "changed", "b": "2"})));
        let current = wire(&codec, configmap(json!({"a": "1", "b": "controller-owned"})));

        let merged = three_way_merge(&codec, &original, &modified, &current)
            .unwrap()
            .expect("merge must produce a new value");
        let merged = codec.decode(&merged).unwrap();
        assert_eq!(
            merged.body["data"],
            json!({"a": "changed", "b": "controller-owned"})
        );
    }
}
