//! Exercises the full patch-plan lifecycle end to end: hash → sign →
//! attest → verify → apply, and the orchestrator's fail-fast gates, the
//! way a caller driving the CLI surfaces actually would (spec §4.5, §4.9,
//! §8 end-to-end scenarios).

use std::fs;

use unitytool::core::config::{load_project_config, resolve_bridge_timeout};
use unitytool::core::orchestrator::{apply_patch, ApplyRequest};
use unitytool::core::patch_plan::parse_plan;
use unitytool::core::plan_crypto::{
    build_attestation, plan_digest, sign_plan, verify_plan, VerifyExpectations,
};
use unitytool::core::ref_scanner::ScanOptions;

fn unity_project(tmp: &std::path::Path) -> std::path::PathBuf {
    fs::create_dir_all(tmp.join("Assets")).unwrap();
    tmp.to_path_buf()
}

fn json_plan(target: &str) -> Vec<u8> {
    format!(
        r#"{{"target": "{target}", "change_reason": "bump value", "ops": [{{"op": "set", "component": "_", "path": "a.b", "value_kind": "int", "value": 7}}]}}"#
    )
    .into_bytes()
}

#[test]
fn signed_plan_verifies_and_applies_through_the_orchestrator() {
    let tmp = tempfile::tempdir().unwrap();
    let root = unity_project(tmp.path());
    let target = root.join("Assets/cfg.json");
    fs::write(&target, r#"{"a": {"b": 1}}"#).unwrap();

    let plan_bytes = json_plan("Assets/cfg.json");
    let key = b"integration-test-key".to_vec();
    let signature = sign_plan(&plan_bytes, &key);
    let digest = plan_digest(&plan_bytes);
    let attestation = build_attestation(&plan_bytes, "plan.json", Some(signature.clone()));

    // verify_plan agrees with what the orchestrator will independently check.
    let expectations = VerifyExpectations {
        expected_sha256: Some(digest.clone()),
        expected_signature: Some(signature),
        attestation: Some(attestation),
        signing_key: Some(key),
    };
    verify_plan(&plan_bytes, &expectations).unwrap();

    let config = load_project_config(&root).unwrap();
    let request = ApplyRequest {
        plan_bytes,
        project_root: root.clone(),
        dry_run: false,
        confirm: true,
        scope: None,
        runtime_scene_log: None,
        verify_expectations: Some(expectations),
        bridge_timeout: resolve_bridge_timeout(None, &config),
        scan_options: ScanOptions::default(),
    };
    let envelope = apply_patch(request);
    assert!(envelope.success, "expected success, got {envelope:?}");
    assert_eq!(envelope.code, "SER_APPLY_OK");

    let on_disk: serde_json::Value = serde_json::from_str(&fs::read_to_string(&target).unwrap()).unwrap();
    assert_eq!(on_disk["a"]["b"], serde_json::json!(7));

    // An audit trail entry was appended for the successful apply.
    let events = fs::read_to_string(root.join(".unitytool").join("unitytool.events.jsonl")).unwrap();
    assert!(events.contains("patch_apply_attempt"));
}

#[test]
fn tampered_plan_fails_digest_verification_before_any_write() {
    let tmp = tempfile::tempdir().unwrap();
    let root = unity_project(tmp.path());
    let target = root.join("Assets/cfg.json");
    fs::write(&target, r#"{"a": {"b": 1}}"#).unwrap();

    let plan_bytes = json_plan("Assets/cfg.json");
    let stale_digest = plan_digest(b"a different plan entirely");

    let expectations = VerifyExpectations {
        expected_sha256: Some(stale_digest),
        expected_signature: None,
        attestation: None,
        signing_key: None,
    };
    let request = ApplyRequest {
        plan_bytes,
        project_root: root.clone(),
        dry_run: false,
        confirm: true,
        scope: None,
        runtime_scene_log: None,
        verify_expectations: Some(expectations),
        bridge_timeout: std::time::Duration::from_secs(5),
        scan_options: ScanOptions::default(),
    };
    let envelope = apply_patch(request);
    assert_eq!(envelope.code, "PLAN_DIGEST_MISMATCH");
    assert!(!envelope.success);

    let on_disk: serde_json::Value = serde_json::from_str(&fs::read_to_string(&target).unwrap()).unwrap();
    assert_eq!(on_disk["a"]["b"], serde_json::json!(1));
}

#[test]
fn preflight_ref_scan_blocks_apply_when_scope_has_broken_references() {
    let tmp = tempfile::tempdir().unwrap();
    let root = unity_project(tmp.path());
    let target = root.join("Assets/cfg.json");
    fs::write(&target, r#"{"a": {"b": 1}}"#).unwrap();
    fs::write(
        root.join("Assets/Scene.unity"),
        "guid: aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa\n",
    )
    .unwrap();

    let request = ApplyRequest {
        plan_bytes: json_plan("Assets/cfg.json"),
        project_root: root.clone(),
        dry_run: true,
        confirm: false,
        scope: Some(root.join("Assets")),
        runtime_scene_log: None,
        verify_expectations: None,
        bridge_timeout: std::time::Duration::from_secs(5),
        scan_options: ScanOptions::default(),
    };
    let envelope = apply_patch(request);
    assert_eq!(envelope.code, "REF001");
    assert!(!envelope.success);
}

#[test]
fn parse_plan_round_trips_through_the_cli_schema() {
    let bytes = json_plan("Assets/cfg.json");
    let plan = parse_plan(&bytes).unwrap();
    assert_eq!(plan.target, "Assets/cfg.json");
    assert_eq!(plan.change_reason, "bump value");
    assert_eq!(plan.ops.len(), 1);
}
