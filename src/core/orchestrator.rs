//! Sequences the `patch apply` pipeline: load → verify → preflight refs →
//! preflight overrides → dry-run → confirm gate → apply → post-apply
//! runtime classification, honoring fail-fast at every boundary (spec
//! §4.5, §4.9, C12).

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::core::audit::{append_event, AuditEvent};
use crate::core::bridge_client;
use crate::core::envelope::Envelope;
use crate::core::error::UnityToolError;
use crate::core::guid_index::{build_guid_index, GuidIndex};
use crate::core::json_backend;
use crate::core::override_inspector::inspect_variant;
use crate::core::patch_plan::{parse_plan, PatchPlan};
use crate::core::plan_crypto::{verify_plan, VerifyExpectations};
use crate::core::ref_scanner::{scan_references, ScanOptions};
use crate::core::runtime_classifier::{assert_no_critical_errors, classify_log_file, ClassifyOptions};

pub struct ApplyRequest {
    pub plan_bytes: Vec<u8>,
    pub project_root: PathBuf,
    pub dry_run: bool,
    pub confirm: bool,
    /// Scope to preflight-scan for broken references; `None` skips step 3.
    pub scope: Option<PathBuf>,
    pub runtime_scene_log: Option<PathBuf>,
    pub verify_expectations: Option<VerifyExpectations>,
    pub bridge_timeout: Duration,
    pub scan_options: ScanOptions,
}

fn fail_fast(project_root: &Path, target: &str, dry_run: bool, confirm: bool, err: UnityToolError) -> Envelope {
    let _ = append_event(
        project_root,
        AuditEvent::PatchApplyAttempt {
            target: target.to_string(),
            dry_run,
            confirmed: confirm,
            code: err.code().unwrap_or("INTERNAL").to_string(),
        },
    );
    Envelope::from_error(&err)
}

fn engine_target(target: &Path) -> bool {
    matches!(
        target.extension().and_then(|e| e.to_str()),
        Some("prefab") | Some("unity") | Some("asset")
    )
}

/// Run the full ordered pipeline and return the final envelope. Every
/// early return below already represents an `error`/`critical` envelope
/// (spec §4.9): no stage after a failing one runs.
pub fn apply_patch(request: ApplyRequest) -> Envelope {
    // 1. Load & schema-validate.
    let plan: PatchPlan = match parse_plan(&request.plan_bytes) {
        Ok(plan) => plan,
        Err(err) => return fail_fast(&request.project_root, "<unparsed>", request.dry_run, request.confirm, err),
    };
    let target_path = request.project_root.join(&plan.target);

    // 2. Verify crypto expectations, if supplied.
    if let Some(expectations) = &request.verify_expectations {
        if let Err(err) = verify_plan(&request.plan_bytes, expectations) {
            return fail_fast(&request.project_root, &plan.target, request.dry_run, request.confirm, err);
        }
    }

    // 3. Preflight — references.
    if let Some(scope) = &request.scope {
        match build_guid_index(&request.project_root, &[]) {
            Ok(index) => {
                if let Err(err) = preflight_refs(&request.project_root, scope, &index, &request.scan_options) {
                    return fail_fast(&request.project_root, &plan.target, request.dry_run, request.confirm, err);
                }
            }
            Err(err) => return fail_fast(&request.project_root, &plan.target, request.dry_run, request.confirm, err),
        }
    }

    // 4. Preflight — overrides, only for .prefab targets.
    if target_path.extension().and_then(|e| e.to_str()) == Some("prefab") && target_path.exists() {
        match inspect_variant(&request.project_root, &target_path, None) {
            Ok(inspection) => {
                if let Some(diag) = inspection.stale_candidates.iter().find(|d| d.code == "PVR001") {
                    let err = UnityToolError::Integrity {
                        code: "PVR001",
                        message: diag.detail.clone(),
                    };
                    return fail_fast(&request.project_root, &plan.target, request.dry_run, request.confirm, err);
                }
            }
            Err(err) => return fail_fast(&request.project_root, &plan.target, request.dry_run, request.confirm, err),
        }
    }

    // 5. Dry-run: always runs, against a JSON in-memory copy when the
    // target is JSON. Engine targets have no in-process dry-run model —
    // their diff is produced by the bridge itself once dispatched.
    let mut diff_data = serde_json::Value::Array(Vec::new());
    if target_path.extension().and_then(|e| e.to_str()) == Some("json") && target_path.exists() {
        match json_backend::dry_run(&target_path, &plan.ops) {
            Ok(diffs) => diff_data = serde_json::to_value(&diffs).unwrap_or_default(),
            Err(err) => return fail_fast(&request.project_root, &plan.target, request.dry_run, request.confirm, err),
        }
    }

    if request.dry_run {
        let _ = append_event(
            &request.project_root,
            AuditEvent::PatchApplyAttempt {
                target: plan.target.clone(),
                dry_run: true,
                confirmed: request.confirm,
                code: "SER_APPLY_OK".to_string(),
            },
        );
        return Envelope::ok("SER_APPLY_OK", "dry run complete", serde_json::json!({ "diff": diff_data }));
    }

    // 6. Gate.
    if !request.confirm {
        let err = UnityToolError::Policy {
            code: "APPLY_CONFIRM_REQUIRED",
            message: "apply requires --confirm when --dry-run is not set".to_string(),
        };
        return fail_fast(&request.project_root, &plan.target, request.dry_run, request.confirm, err);
    }

    // 7. Apply.
    let apply_result = if target_path.extension().and_then(|e| e.to_str()) == Some("json") {
        json_backend::apply_to_file(&target_path, &plan.ops).map(|diffs| serde_json::to_value(&diffs).unwrap_or_default())
    } else if engine_target(&target_path) {
        let _ = append_event(
            &request.project_root,
            AuditEvent::BridgeInvocation {
                target: plan.target.clone(),
                code: "BRIDGE_DISPATCH".to_string(),
            },
        );
        match bridge_client::dispatch(&plan.target, &plan.ops, request.bridge_timeout) {
            Ok(envelope) if bridge_client::response_is_failure(&envelope) => {
                let _ = append_event(
                    &request.project_root,
                    AuditEvent::PatchApplyAttempt {
                        target: plan.target.clone(),
                        dry_run: false,
                        confirmed: true,
                        code: envelope.code.clone(),
                    },
                );
                let diagnostics = bridge_client::diagnostics_from_response(&envelope);
                return Envelope::with_severity(envelope.severity, envelope.code, envelope.message, envelope.data)
                    .with_diagnostics(diagnostics);
            }
            Ok(envelope) => Ok(envelope.data),
            Err(err) => Err(err),
        }
    } else {
        Err(UnityToolError::Schema {
            code: "SER_UNSUPPORTED_TARGET",
            message: format!("no backend for target '{}'", plan.target),
        })
    };

    let applied_data = match apply_result {
        Ok(data) => data,
        Err(err) => return fail_fast(&request.project_root, &plan.target, request.dry_run, request.confirm, err),
    };

    // 8. Post-apply runtime classification, optional.
    if let Some(log_path) = &request.runtime_scene_log {
        match classify_log_file(log_path) {
            Ok(result) => {
                if let Err(err) = assert_no_critical_errors(&result, &ClassifyOptions::default()) {
                    return fail_fast(&request.project_root, &plan.target, request.dry_run, request.confirm, err);
                }
            }
            Err(err) => return fail_fast(&request.project_root, &plan.target, request.dry_run, request.confirm, err),
        }
    }

    // 9. Emit envelope.
    let _ = append_event(
        &request.project_root,
        AuditEvent::PatchApplyAttempt {
            target: plan.target.clone(),
            dry_run: false,
            confirmed: true,
            code: "SER_APPLY_OK".to_string(),
        },
    );
    Envelope::ok("SER_APPLY_OK", "plan applied", serde_json::json!({ "applied": applied_data }))
}

fn preflight_refs(
    project_root: &Path,
    scope: &Path,
    index: &GuidIndex,
    options: &ScanOptions,
) -> Result<(), UnityToolError> {
    let result = scan_references(project_root, scope, index, options)?;
    if result.broken_occurrences > 0 {
        return Err(UnityToolError::Integrity {
            code: "REF001",
            message: format!("{} broken reference occurrence(s) in preflight scope", result.broken_occurrences),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::patch_plan::ValueKind;

    fn plan_bytes(target: &str) -> Vec<u8> {
        format!(
            r#"{{"target": "{target}", "ops": [{{"op": "set", "component": "_", "path": "a.b", "value_kind": "int", "value": 7}}]}}"#
        )
        .into_bytes()
    }

    #[test]
    fn dry_run_reports_diff_and_leaves_file_untouched() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("Assets")).unwrap();
        let target = dir.path().join("Assets/cfg.json");
        std::fs::write(&target, r#"{"a": {"b": 1}}"#).unwrap();

        let request = ApplyRequest {
            plan_bytes: plan_bytes("Assets/cfg.json"),
            project_root: dir.path().to_path_buf(),
            dry_run: true,
            confirm: false,
            scope: None,
            runtime_scene_log: None,
            verify_expectations: None,
            bridge_timeout: Duration::from_secs(5),
            scan_options: ScanOptions::default(),
        };
        let envelope = apply_patch(request);
        assert!(envelope.success);
        assert_eq!(envelope.data["diff"][0]["after"], serde_json::json!(7));
        let on_disk: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&target).unwrap()).unwrap();
        assert_eq!(on_disk["a"]["b"], serde_json::json!(1));
    }

    #[test]
    fn apply_without_confirm_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("Assets")).unwrap();
        let target = dir.path().join("Assets/cfg.json");
        std::fs::write(&target, r#"{"a": {"b": 1}}"#).unwrap();

        let request = ApplyRequest {
            plan_bytes: plan_bytes("Assets/cfg.json"),
            project_root: dir.path().to_path_buf(),
            dry_run: false,
            confirm: false,
            scope: None,
            runtime_scene_log: None,
            verify_expectations: None,
            bridge_timeout: Duration::from_secs(5),
            scan_options: ScanOptions::default(),
        };
        let envelope = apply_patch(request);
        assert_eq!(envelope.code, "APPLY_CONFIRM_REQUIRED");
        let on_disk: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&target).unwrap()).unwrap();
        assert_eq!(on_disk["a"]["b"], serde_json::json!(1));
    }

    #[test]
    fn bridge_missing_for_engine_target_is_unsupported() {
        std::env::remove_var(bridge_client::BRIDGE_COMMAND_ENV);
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("Assets")).unwrap();

        let request = ApplyRequest {
            plan_bytes: plan_bytes("Assets/Foo.prefab"),
            project_root: dir.path().to_path_buf(),
            dry_run: false,
            confirm: true,
            scope: None,
            runtime_scene_log: None,
            verify_expectations: None,
            bridge_timeout: Duration::from_secs(5),
            scan_options: ScanOptions::default(),
        };
        let envelope = apply_patch(request);
        assert_eq!(envelope.code, "SER_UNSUPPORTED_TARGET");
    }

    #[test]
    fn malformed_plan_fails_at_load_stage() {
        let dir = tempfile::tempdir().unwrap();
        let request = ApplyRequest {
            plan_bytes: br#"{"ops": []}"#.to_vec(),
            project_root: dir.path().to_path_buf(),
            dry_run: true,
            confirm: false,
            scope: None,
            runtime_scene_log: None,
            verify_expectations: None,
            bridge_timeout: Duration::from_secs(5),
            scan_options: ScanOptions::default(),
        };
        let envelope = apply_patch(request);
        assert_eq!(envelope.code, "SER002");
    }
}
