//! The declarative patch-plan schema and its validation (spec §3, §4.5, C7).

use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

use crate::core::error::UnityToolError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueKind {
    Int,
    Float,
    Bool,
    String,
    Null,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum PatchOp {
    Set {
        component: String,
        path: String,
        value_kind: ValueKind,
        #[serde(default)]
        value: Json,
    },
    InsertArrayElement {
        component: String,
        path: String,
        index: i64,
        #[serde(default)]
        value_kind: Option<ValueKind>,
        #[serde(default)]
        value: Option<Json>,
    },
    RemoveArrayElement {
        component: String,
        path: String,
        index: i64,
    },
}

impl PatchOp {
    pub fn component(&self) -> &str {
        match self {
            PatchOp::Set { component, .. }
            | PatchOp::InsertArrayElement { component, .. }
            | PatchOp::RemoveArrayElement { component, .. } => component,
        }
    }

    pub fn path(&self) -> &str {
        match self {
            PatchOp::Set { path, .. }
            | PatchOp::InsertArrayElement { path, .. }
            | PatchOp::RemoveArrayElement { path, .. } => path,
        }
    }

    pub fn is_array_op(&self) -> bool {
        matches!(self, PatchOp::InsertArrayElement { .. } | PatchOp::RemoveArrayElement { .. })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatchPlan {
    pub target: String,
    #[serde(default)]
    pub change_reason: String,
    pub ops: Vec<PatchOp>,
}

fn schema_err(message: impl Into<String>) -> UnityToolError {
    UnityToolError::Schema {
        code: "SER002",
        message: message.into(),
    }
}

/// Load and schema-validate a plan from its raw UTF-8 bytes. Validation
/// happens against the already-deserialized structure (component/path
/// required on every op; array-op path shape) per spec §4.5.
pub fn parse_plan(bytes: &[u8]) -> Result<PatchPlan, UnityToolError> {
    let plan: PatchPlan = serde_json::from_slice(bytes).map_err(|e| {
        UnityToolError::Schema {
            code: "SER002",
            message: format!("malformed plan JSON: {e}"),
        }
    })?;
    validate_plan(&plan)?;
    Ok(plan)
}

pub fn validate_plan(plan: &PatchPlan) -> Result<(), UnityToolError> {
    if plan.target.trim().is_empty() {
        return Err(schema_err("plan is missing `target`"));
    }
    if plan.ops.is_empty() {
        return Err(schema_err("plan is missing `ops`"));
    }
    for (idx, op) in plan.ops.iter().enumerate() {
        if op.component().trim().is_empty() {
            return Err(schema_err(format!("ops[{idx}] is missing `component`")));
        }
        if op.path().trim().is_empty() {
            return Err(schema_err(format!("ops[{idx}] is missing `path`")));
        }
        if op.is_array_op() {
            validate_array_path(op.path()).map_err(|detail| {
                schema_err(format!("ops[{idx}]: {detail}"))
            })?;
        }
        if let PatchOp::InsertArrayElement { index, .. } | PatchOp::RemoveArrayElement { index, .. } = op {
            if *index < 0 {
                return Err(schema_err(format!("ops[{idx}]: index must be >= 0")));
            }
        }
    }
    Ok(())
}

/// Array-op paths must end in `.Array.data` and must not carry an inline
/// `[index]` suffix or a `.Array.size` suffix — the index travels
/// out-of-band on the op itself (spec §4.5, §8 boundary behaviors).
fn validate_array_path(path: &str) -> Result<(), String> {
    if path.contains('[') {
        return Err(format!("array op path '{path}' must not contain an inline index"));
    }
    if path.ends_with(".Array.size") {
        return Err(format!("array op path '{path}' must not end in .Array.size"));
    }
    if !path.ends_with(".Array.data") {
        return Err(format!("array op path '{path}' must end in .Array.data"));
    }
    Ok(())
}
