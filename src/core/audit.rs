//! JSONL audit trail for apply attempts, bridge invocations, and
//! cancellations (spec §4.11). Structural analogue of an external-action
//! event log: one append-only file, one JSON object per line.

use serde::Serialize;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::core::error::UnityToolError;
use crate::core::time::{new_event_id, now_epoch_z};

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AuditEvent {
    PatchApplyAttempt {
        target: String,
        dry_run: bool,
        confirmed: bool,
        code: String,
    },
    BridgeInvocation {
        target: String,
        code: String,
    },
    Cancellation {
        stage: String,
    },
}

#[derive(Debug, Clone, Serialize)]
struct AuditRecord {
    ts: String,
    event_id: String,
    #[serde(flatten)]
    event: AuditEvent,
}

fn events_path(project_root: &Path) -> PathBuf {
    project_root.join(".unitytool").join("unitytool.events.jsonl")
}

pub fn append_event(project_root: &Path, event: AuditEvent) -> Result<(), UnityToolError> {
    let path = events_path(project_root);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let record = AuditRecord {
        ts: now_epoch_z(),
        event_id: new_event_id(),
        event,
    };
    let mut f = OpenOptions::new().create(true).append(true).open(path)?;
    writeln!(f, "{}", serde_json::to_string(&record)?)?;
    Ok(())
}
