//! Built-in apply backend for `.json` targets (spec §4.6, C9).
//!
//! `component` is ignored for JSON targets (there is no Unity component
//! model to address); `path` is a dotted path with optional numeric array
//! segments (`"a.b"`, `"items.0.name"`). Array ops address the array itself
//! by stripping the `.Array.data` suffix the schema requires (spec §4.5).

use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use std::path::Path;

use crate::core::error::UnityToolError;
use crate::core::patch_plan::{PatchOp, ValueKind};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DiffEntry {
    pub path: String,
    pub before: Json,
    pub after: Json,
}

fn schema_err(message: impl Into<String>) -> UnityToolError {
    UnityToolError::Schema {
        code: "SER002",
        message: message.into(),
    }
}

fn value_from_kind(kind: ValueKind, value: &Json) -> Result<Json, UnityToolError> {
    match kind {
        ValueKind::Json => {
            if is_object_reference_payload(value) {
                return Err(schema_err(
                    "value_kind \"json\" ObjectReference payloads are only meaningful through the bridge; rejected for JSON targets",
                ));
            }
            Ok(value.clone())
        }
        ValueKind::Null => Ok(Json::Null),
        ValueKind::Int | ValueKind::Float | ValueKind::Bool | ValueKind::String => Ok(value.clone()),
    }
}

/// Open question resolved in DESIGN.md: a `json` payload carrying an
/// `ObjectReference`-shaped object is rejected for JSON targets with
/// `SER002` rather than silently accepted.
fn is_object_reference_payload(value: &Json) -> bool {
    value
        .as_object()
        .map(|obj| obj.contains_key("guid") && obj.contains_key("file_id"))
        .unwrap_or(false)
}

fn array_json_path(path: &str) -> Result<&str, UnityToolError> {
    path.strip_suffix(".Array.data")
        .ok_or_else(|| schema_err(format!("array op path '{path}' must end in .Array.data")))
}

fn split_path(path: &str) -> Vec<&str> {
    if path.is_empty() { Vec::new() } else { path.split('.').collect() }
}

fn navigate<'a>(root: &'a mut Json, segments: &[&str]) -> Result<&'a mut Json, UnityToolError> {
    let mut current = root;
    for segment in segments {
        current = match current {
            Json::Object(map) => map
                .entry(segment.to_string())
                .or_insert(Json::Null),
            Json::Array(arr) => {
                let idx: usize = segment
                    .parse()
                    .map_err(|_| schema_err(format!("path segment '{segment}' is not a valid array index")))?;
                if idx >= arr.len() {
                    return Err(schema_err(format!("array index {idx} out of range")));
                }
                &mut arr[idx]
            }
            _ => return Err(schema_err(format!("cannot descend into scalar at '{segment}'"))),
        };
    }
    Ok(current)
}

fn get_array_mut<'a>(root: &'a mut Json, json_path: &str) -> Result<&'a mut Vec<Json>, UnityToolError> {
    let segments = split_path(json_path);
    let node = navigate(root, &segments)?;
    if matches!(node, Json::Null) {
        *node = Json::Array(Vec::new());
    }
    node.as_array_mut()
        .ok_or_else(|| schema_err(format!("'{json_path}' is not an array")))
}

/// Apply `ops` to `root` in place, returning a `{path, before, after}` diff
/// entry per op, in op order.
pub fn apply_ops(root: &mut Json, ops: &[PatchOp]) -> Result<Vec<DiffEntry>, UnityToolError> {
    let mut diffs = Vec::new();
    for op in ops {
        match op {
            PatchOp::Set { path, value_kind, value, .. } => {
                let segments = split_path(path);
                let new_value = value_from_kind(*value_kind, value)?;
                let slot = navigate(root, &segments)?;
                let before = slot.clone();
                *slot = new_value.clone();
                diffs.push(DiffEntry {
                    path: path.clone(),
                    before,
                    after: new_value,
                });
            }
            PatchOp::InsertArrayElement { path, index, value_kind, value, .. } => {
                let json_path = array_json_path(path)?;
                let new_value = match (value_kind, value) {
                    (Some(kind), Some(v)) => value_from_kind(*kind, v)?,
                    _ => Json::Null,
                };
                let arr = get_array_mut(root, json_path)?;
                let idx = *index as usize;
                if *index < 0 || idx > arr.len() {
                    return Err(UnityToolError::Integrity {
                        code: "SER002",
                        message: format!("insert index {index} out of range (len {})", arr.len()),
                    });
                }
                arr.insert(idx, new_value.clone());
                diffs.push(DiffEntry {
                    path: format!("{json_path}[{index}]"),
                    before: Json::Null,
                    after: new_value,
                });
            }
            PatchOp::RemoveArrayElement { path, index, .. } => {
                let json_path = array_json_path(path)?;
                let arr = get_array_mut(root, json_path)?;
                let idx = *index as usize;
                if *index < 0 || idx >= arr.len() {
                    return Err(UnityToolError::Integrity {
                        code: "SER002",
                        message: format!("remove index {index} out of range (len {})", arr.len()),
                    });
                }
                let removed = arr.remove(idx);
                diffs.push(DiffEntry {
                    path: format!("{json_path}[{index}]"),
                    before: removed,
                    after: Json::Null,
                });
            }
        }
    }
    Ok(diffs)
}

/// Dry-run: apply against an in-memory copy, never touching disk.
pub fn dry_run(target: &Path, ops: &[PatchOp]) -> Result<Vec<DiffEntry>, UnityToolError> {
    let content = std::fs::read_to_string(target)?;
    let mut root: Json = serde_json::from_str(&content)?;
    apply_ops(&mut root, ops)
}

/// Apply and persist via write-to-temp-then-rename (atomic on POSIX and
/// Windows for same-volume renames).
pub fn apply_to_file(target: &Path, ops: &[PatchOp]) -> Result<Vec<DiffEntry>, UnityToolError> {
    let content = std::fs::read_to_string(target)?;
    let mut root: Json = serde_json::from_str(&content)?;
    let diffs = apply_ops(&mut root, ops)?;

    let rendered = serde_json::to_string_pretty(&root)?;
    let tmp_path = target.with_extension("json.tmp");
    std::fs::write(&tmp_path, rendered)?;
    std::fs::rename(&tmp_path, target)?;
    Ok(diffs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::patch_plan::ValueKind;

    #[test]
    fn set_produces_expected_diff_and_leaves_disk_untouched_on_dry_run() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("cfg.json");
        std::fs::write(&target, r#"{"a": {"b": 1}}"#).unwrap();

        let ops = vec![PatchOp::Set {
            component: String::new(),
            path: "a.b".to_string(),
            value_kind: ValueKind::Int,
            value: serde_json::json!(7),
        }];

        let before_mtime = std::fs::metadata(&target).unwrap().modified().unwrap();
        let diffs = dry_run(&target, &ops).unwrap();
        assert_eq!(diffs[0].before, serde_json::json!(1));
        assert_eq!(diffs[0].after, serde_json::json!(7));

        let after_mtime = std::fs::metadata(&target).unwrap().modified().unwrap();
        assert_eq!(before_mtime, after_mtime);
        let on_disk: Json = serde_json::from_str(&std::fs::read_to_string(&target).unwrap()).unwrap();
        assert_eq!(on_disk["a"]["b"], serde_json::json!(1));
    }

    #[test]
    fn apply_to_file_persists_and_is_atomic() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("cfg.json");
        std::fs::write(&target, r#"{"a": {"b": 1}}"#).unwrap();

        let ops = vec![PatchOp::Set {
            component: String::new(),
            path: "a.b".to_string(),
            value_kind: ValueKind::Int,
            value: serde_json::json!(7),
        }];
        apply_to_file(&target, &ops).unwrap();
        let on_disk: Json = serde_json::from_str(&std::fs::read_to_string(&target).unwrap()).unwrap();
        assert_eq!(on_disk["a"]["b"], serde_json::json!(7));
        assert!(!target.with_extension("json.tmp").exists());
    }

    #[test]
    fn insert_array_element_at_end_appends() {
        let mut root = serde_json::json!({"items": {"Array": [1, 2]}});
        let ops = vec![PatchOp::InsertArrayElement {
            component: String::new(),
            path: "items.Array.data".to_string(),
            index: 2,
            value_kind: Some(ValueKind::Int),
            value: Some(serde_json::json!(3)),
        }];
        let diffs = apply_ops(&mut root, &ops).unwrap();
        assert_eq!(diffs.len(), 1);
        assert_eq!(root["items"]["Array"], serde_json::json!([1, 2, 3]));
    }

    #[test]
    fn insert_array_element_out_of_range_fails() {
        let mut root = serde_json::json!({"items": {"Array": [1, 2]}});
        let ops = vec![PatchOp::InsertArrayElement {
            component: String::new(),
            path: "items.Array.data".to_string(),
            index: 5,
            value_kind: Some(ValueKind::Int),
            value: Some(serde_json::json!(3)),
        }];
        assert!(apply_ops(&mut root, &ops).is_err());
    }

    #[test]
    fn remove_array_element_shifts_and_shrinks() {
        let mut root = serde_json::json!({"items": {"Array": [1, 2, 3]}});
        let ops = vec![PatchOp::RemoveArrayElement {
            component: String::new(),
            path: "items.Array.data".to_string(),
            index: 0,
        }];
        apply_ops(&mut root, &ops).unwrap();
        assert_eq!(root["items"]["Array"], serde_json::json!([2, 3]));
    }

    #[test]
    fn remove_array_element_out_of_range_fails() {
        let mut root = serde_json::json!({"items": {"Array": [1]}});
        let ops = vec![PatchOp::RemoveArrayElement {
            component: String::new(),
            path: "items.Array.data".to_string(),
            index: 3,
        }];
        assert!(apply_ops(&mut root, &ops).is_err());
    }

    #[test]
    fn object_reference_json_value_rejected_for_json_target() {
        let mut root = serde_json::json!({"a": 1});
        let ops = vec![PatchOp::Set {
            component: String::new(),
            path: "a".to_string(),
            value_kind: ValueKind::Json,
            value: serde_json::json!({"guid": "a".repeat(32), "file_id": 0}),
        }];
        let err = apply_ops(&mut root, &ops).unwrap_err();
        assert_eq!(err.code(), Some("SER002"));
    }
}
