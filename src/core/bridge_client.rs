//! External engine bridge: a versioned JSON request/response protocol
//! dispatched through an allowlisted child process (spec §4.7, C10).
//!
//! Grounded on the allowlist-then-execute-then-log shape of a command
//! broker: resolve the permitted command from configuration, run it,
//! validate what comes back before trusting any of it.

use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use std::io::Write;
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use crate::core::envelope::{Diagnostic, Envelope};
use crate::core::error::UnityToolError;
use crate::core::patch_plan::{PatchOp, ValueKind};

pub const BRIDGE_COMMAND_ENV: &str = "UNITYTOOL_PATCH_BRIDGE";
const PROTOCOL_VERSION: u32 = 1;

/// `PatchOp` normalized into a flat wire shape: the typed value lives in
/// whichever of `value_int`/`value_float`/`value_bool`/`value_string`/
/// `value_json` matches `value_kind`, because the receiver cannot parse
/// an open union (spec §9 design note).
#[derive(Debug, Clone, Serialize)]
pub struct BridgeOp {
    pub op: &'static str,
    pub component: String,
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_kind: Option<ValueKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_int: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_float: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_bool: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_string: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_json: Option<Json>,
}

fn normalize_value(kind: ValueKind, value: &Json, out: &mut BridgeOp) {
    out.value_kind = Some(kind);
    match kind {
        ValueKind::Int => out.value_int = value.as_i64(),
        ValueKind::Float => out.value_float = value.as_f64(),
        ValueKind::Bool => out.value_bool = value.as_bool(),
        ValueKind::String => out.value_string = value.as_str().map(str::to_string),
        ValueKind::Json => out.value_json = Some(value.clone()),
        ValueKind::Null => {}
    }
}

fn normalize_op(op: &PatchOp) -> BridgeOp {
    match op {
        PatchOp::Set { component, path, value_kind, value } => {
            let mut out = BridgeOp {
                op: "set",
                component: component.clone(),
                path: path.clone(),
                index: None,
                value_kind: None,
                value_int: None,
                value_float: None,
                value_bool: None,
                value_string: None,
                value_json: None,
            };
            normalize_value(*value_kind, value, &mut out);
            out
        }
        PatchOp::InsertArrayElement { component, path, index, value_kind, value } => {
            let mut out = BridgeOp {
                op: "insert_array_element",
                component: component.clone(),
                path: path.clone(),
                index: Some(*index),
                value_kind: None,
                value_int: None,
                value_float: None,
                value_bool: None,
                value_string: None,
                value_json: None,
            };
            if let (Some(kind), Some(value)) = (value_kind, value) {
                normalize_value(*kind, value, &mut out);
            }
            out
        }
        PatchOp::RemoveArrayElement { component, path, index } => BridgeOp {
            op: "remove_array_element",
            component: component.clone(),
            path: path.clone(),
            index: Some(*index),
            value_kind: None,
            value_int: None,
            value_float: None,
            value_bool: None,
            value_string: None,
            value_json: None,
        },
    }
}

#[derive(Debug, Serialize)]
pub struct BridgeRequest {
    pub protocol_version: u32,
    pub target: String,
    pub ops: Vec<BridgeOp>,
}

pub fn build_request(target: &str, ops: &[PatchOp]) -> BridgeRequest {
    BridgeRequest {
        protocol_version: PROTOCOL_VERSION,
        target: target.to_string(),
        ops: ops.iter().map(normalize_op).collect(),
    }
}

fn process_err(message: impl Into<String>) -> UnityToolError {
    UnityToolError::Process {
        code: "BRIDGE_UNITY_RESPONSE_SCHEMA",
        message: message.into(),
    }
}

/// Parse and strictly validate a bridge response: it must be exactly
/// `{success, severity, code, message, data, diagnostics}` with
/// `data.protocol_version == 1` (spec §4.7).
fn validate_response(raw: &str) -> Result<Envelope, UnityToolError> {
    let value: Json = serde_json::from_str(raw).map_err(|e| process_err(format!("malformed response JSON: {e}")))?;
    let obj = value
        .as_object()
        .ok_or_else(|| process_err("response is not a JSON object"))?;

    for required in ["success", "severity", "code", "message", "data", "diagnostics"] {
        if !obj.contains_key(required) {
            return Err(process_err(format!("response missing required field '{required}'")));
        }
    }

    let envelope: Envelope =
        serde_json::from_value(value.clone()).map_err(|e| process_err(format!("response does not match envelope schema: {e}")))?;

    let protocol_version = envelope
        .data
        .get("protocol_version")
        .and_then(Json::as_u64);
    if protocol_version != Some(PROTOCOL_VERSION as u64) {
        return Err(process_err("response data.protocol_version is missing or not 1"));
    }

    Ok(envelope)
}

/// Command line configured in [`BRIDGE_COMMAND_ENV`], split on whitespace;
/// the request- and response-file paths are appended as the final two
/// positional arguments.
fn resolve_bridge_command() -> Result<Vec<String>, UnityToolError> {
    let raw = std::env::var(BRIDGE_COMMAND_ENV).map_err(|_| UnityToolError::Schema {
        code: "SER_UNSUPPORTED_TARGET",
        message: format!("environment variable '{BRIDGE_COMMAND_ENV}' is not set"),
    })?;
    let parts: Vec<String> = raw.split_whitespace().map(str::to_string).collect();
    if parts.is_empty() {
        return Err(UnityToolError::Schema {
            code: "SER_UNSUPPORTED_TARGET",
            message: format!("'{BRIDGE_COMMAND_ENV}' is empty"),
        });
    }
    Ok(parts)
}

fn spawn_bridge(command_line: &[String], request_path: &Path, response_path: &Path) -> Result<Child, UnityToolError> {
    Command::new(&command_line[0])
        .args(&command_line[1..])
        .arg(request_path)
        .arg(response_path)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| UnityToolError::Process {
            code: "BRIDGE_TIMEOUT",
            message: format!("failed to spawn bridge command: {e}"),
        })
}

/// Wait for `child` to exit, polling so a timeout can kill it rather than
/// blocking the caller indefinitely (spec §4.9 cancellation/timeout).
fn wait_with_timeout(mut child: Child, timeout: Duration) -> Result<(), UnityToolError> {
    let (tx, rx) = mpsc::channel();
    let poll_interval = Duration::from_millis(20).min(timeout);
    thread::spawn(move || {
        let deadline = Instant::now() + timeout;
        loop {
            match child.try_wait() {
                Ok(Some(status)) => {
                    let _ = tx.send(Ok(status.success()));
                    return;
                }
                Ok(None) => {
                    if Instant::now() >= deadline {
                        let _ = child.kill();
                        let _ = child.wait();
                        let _ = tx.send(Err(()));
                        return;
                    }
                    thread::sleep(poll_interval);
                }
                Err(_) => {
                    let _ = tx.send(Err(()));
                    return;
                }
            }
        }
    });

    match rx.recv_timeout(timeout + Duration::from_secs(1)) {
        Ok(Ok(_)) => Ok(()),
        _ => Err(UnityToolError::Process {
            code: "BRIDGE_TIMEOUT",
            message: format!("bridge command did not respond within {:?}", timeout),
        }),
    }
}

/// Run the full bridge round trip: write the request file, launch the
/// allowlisted command, wait (subject to `timeout`), and strictly
/// validate the response file it is expected to have produced.
pub fn dispatch(target: &str, ops: &[PatchOp], timeout: Duration) -> Result<Envelope, UnityToolError> {
    let command_line = resolve_bridge_command()?;

    let dir = std::env::temp_dir();
    let nonce = crate::core::time::new_event_id();
    let request_path = dir.join(format!("unitytool-bridge-{nonce}.request.json"));
    let response_path = dir.join(format!("unitytool-bridge-{nonce}.response.json"));

    let request = build_request(target, ops);
    let mut f = std::fs::File::create(&request_path)?;
    f.write_all(serde_json::to_string_pretty(&request)?.as_bytes())?;
    drop(f);

    let child = spawn_bridge(&command_line, &request_path, &response_path)?;
    let wait_result = wait_with_timeout(child, timeout);

    let _ = std::fs::remove_file(&request_path);
    wait_result?;

    let raw = std::fs::read_to_string(&response_path).map_err(|e| UnityToolError::Process {
        code: "BRIDGE_UNITY_RESPONSE_SCHEMA",
        message: format!("bridge did not write a readable response file: {e}"),
    })?;
    let _ = std::fs::remove_file(&response_path);

    validate_response(&raw)
}

/// `true` once a diagnostic-level finding should stop the pipeline.
pub fn response_is_failure(envelope: &Envelope) -> bool {
    !envelope.success || envelope.severity.is_failure()
}

pub fn diagnostics_from_response(envelope: &Envelope) -> Vec<Diagnostic> {
    envelope.diagnostics.clone()
}
