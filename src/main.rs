use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Parser;

use unitytool::cli::{
    Cli, Command, IgnoreGuidWriteMode, InspectCommand, OutputFormat, PatchCommand, ReportCommand,
    ReportFormatArg, SuggestCommand, ValidateCommand,
};
use unitytool::core::bridge_client;
use unitytool::core::config::{load_project_config, resolve_bridge_timeout, resolve_default_excludes};
use unitytool::core::envelope::{Envelope, Severity};
use unitytool::core::error::UnityToolError;
use unitytool::core::guid_index::build_guid_index;
use unitytool::core::ignore_guids::{load_ignore_file, suggest_ignore_guids, write_ignore_file, WriteMode};
use unitytool::core::orchestrator::{apply_patch, ApplyRequest};
use unitytool::core::override_inspector::inspect_variant;
use unitytool::core::patch_plan::parse_plan;
use unitytool::core::plan_crypto::{
    build_attestation, plan_digest, resolve_signing_key, sign_plan, verify_plan, Attestation, KeySource,
    VerifyExpectations,
};
use unitytool::core::project_root::resolve_project_root;
use unitytool::core::ref_scanner::{scan_references, where_used, ScanOptions};
use unitytool::core::report::{export_report, ReportFormat, ReportOptions};
use unitytool::core::runtime_classifier::{assert_no_critical_errors, classify_log_file, ClassifyOptions};

fn main() {
    let cli = Cli::parse();
    let format = output_format_for(&cli.command);
    let envelope = match dispatch(&cli) {
        Ok(envelope) => envelope,
        Err(err) => Envelope::from_error(&err),
    };
    if cli.verbose {
        eprintln!("{}", serde_json::to_string_pretty(&envelope).unwrap_or_default());
    }
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&envelope).unwrap_or_default()),
        OutputFormat::Text => println!("{}", render_text(&envelope)),
    }
    std::process::exit(envelope.exit_code());
}

/// Only `patch hash|sign|attest|verify` expose `--format`; every other verb
/// always emits the full envelope as JSON.
fn output_format_for(command: &Command) -> OutputFormat {
    match command {
        Command::Patch(patch) => match &patch.command {
            PatchCommand::Hash { format, .. }
            | PatchCommand::Sign { format, .. }
            | PatchCommand::Attest { format, .. }
            | PatchCommand::Verify { format, .. } => *format,
            PatchCommand::Apply { .. } => OutputFormat::Json,
        },
        _ => OutputFormat::Json,
    }
}

/// Bare primary value for `--format text` — the hash, signature, or a
/// one-line code/message summary when there's no single scalar result.
fn render_text(envelope: &Envelope) -> String {
    for key in ["sha256", "signature"] {
        if let Some(s) = envelope.data.get(key).and_then(|v| v.as_str()) {
            return s.to_string();
        }
    }
    format!("{}: {}", envelope.code, envelope.message)
}

fn dispatch(cli: &Cli) -> Result<Envelope, UnityToolError> {
    match &cli.command {
        Command::Inspect(inspect) => dispatch_inspect(&inspect.command),
        Command::Validate(validate) => dispatch_validate(&validate.command),
        Command::Suggest(suggest) => dispatch_suggest(&suggest.command),
        Command::Patch(patch) => dispatch_patch(&patch.command),
        Command::Report(report) => dispatch_report(&report.command),
    }
}

/// CLI-supplied `--exclude` globs plus the project config's
/// `default_exclude_globs`, deduplicated (spec §4.10).
fn merged_excludes(cli_excludes: &[String], config: &unitytool::core::config::ProjectConfig) -> Vec<String> {
    let mut merged = cli_excludes.to_vec();
    for glob in resolve_default_excludes(config) {
        if !merged.contains(&glob) {
            merged.push(glob);
        }
    }
    merged
}

fn looks_like_guid(s: &str) -> bool {
    s.len() == 32 && s.chars().all(|c| c.is_ascii_hexdigit())
}

fn dispatch_inspect(command: &InspectCommand) -> Result<Envelope, UnityToolError> {
    match command {
        InspectCommand::Variant { path } => {
            let project_root = resolve_project_root(path)?;
            let index = build_guid_index(&project_root, &[])?;
            let inspection = inspect_variant(&project_root, path, Some(&index))?;
            let data = serde_json::json!({
                "prefab_chain": inspection.prefab_chain.iter().map(|r| serde_json::json!({"guid": r.guid, "file_id": r.file_id})).collect::<Vec<_>>(),
                "override_count": inspection.overrides.len(),
            });
            let severity = if inspection.stale_candidates.is_empty() { Severity::Info } else { Severity::Warning };
            Ok(Envelope::with_severity(severity, "PVR_INSPECT_OK", "variant inspected", data)
                .with_diagnostics(inspection.stale_candidates))
        }
        InspectCommand::WhereUsed { asset_or_guid, scope, exclude, max_usages } => {
            let scope_path = scope.clone().unwrap_or_else(|| PathBuf::from("."));
            let project_root = resolve_project_root(&scope_path)?;
            let effective_scope = scope.clone().unwrap_or_else(|| project_root.clone());

            let target_guid = if looks_like_guid(asset_or_guid) {
                asset_or_guid.to_lowercase()
            } else {
                let index = build_guid_index(&project_root, exclude)?;
                index
                    .find_by_path(asset_or_guid)
                    .map(|r| r.guid.clone())
                    .ok_or_else(|| UnityToolError::Schema {
                        code: "SER002",
                        message: format!("'{asset_or_guid}' did not resolve to a known asset or GUID"),
                    })?
            };

            let usages = where_used(&project_root, &effective_scope, &target_guid, exclude, *max_usages)?;
            Ok(Envelope::ok(
                "REF_WHERE_USED_OK",
                format!("found {} usage(s)", usages.len()),
                serde_json::json!({ "target_guid": target_guid, "usage_count": usages.len() }),
            )
            .with_diagnostics(usages))
        }
    }
}

fn dispatch_validate(command: &ValidateCommand) -> Result<Envelope, UnityToolError> {
    match command {
        ValidateCommand::Refs { scope, details, max_diagnostics, exclude, ignore_guid, ignore_guid_file } => {
            let project_root = resolve_project_root(scope)?;
            let config = load_project_config(&project_root)?;
            let exclude_globs = merged_excludes(exclude, &config);
            let index = build_guid_index(&project_root, &exclude_globs)?;

            let mut ignore_guids: std::collections::HashSet<String> = ignore_guid.iter().cloned().collect();
            if let Some(path) = ignore_guid_file {
                ignore_guids.extend(load_ignore_file(path)?);
            }

            let options = ScanOptions {
                exclude_globs: exclude_globs.clone(),
                ignore_guids,
                details: *details,
                max_diagnostics: *max_diagnostics,
            };
            let result = scan_references(&project_root, scope, &index, &options)?;

            let severity = if result.broken_occurrences > 0 { Severity::Error } else { Severity::Info };
            let data = serde_json::json!({
                "broken_occurrences": result.broken_occurrences,
                "categories": result.categories,
                "categories_occurrences": result.categories_occurrences,
                "top_missing_asset_guids": result.top_missing_asset_guids,
                "ignored_missing_asset_occurrences": result.ignored_missing_asset_occurrences,
                "skipped_external_prefab_fileid_checks": result.skipped_external_prefab_fileid_checks,
            });
            let code = if result.broken_occurrences > 0 { "REF001" } else { "REF_SCAN_OK" };
            Ok(Envelope::with_severity(severity, code, "reference scan complete", data)
                .with_diagnostics(result.diagnostics))
        }
        ValidateCommand::Runtime { scene, log_file } => {
            let Some(log_path) = log_file else {
                return Ok(Envelope::ok(
                    "VALIDATE_RUNTIME_RESULT",
                    "no runtime log supplied, nothing to classify",
                    serde_json::json!({ "scene": scene.to_string_lossy() }),
                ));
            };
            let result = classify_log_file(log_path)?;
            let options = ClassifyOptions::default();
            match assert_no_critical_errors(&result, &options) {
                Ok(()) => Ok(Envelope::ok(
                    "VALIDATE_RUNTIME_RESULT",
                    "no critical runtime findings",
                    serde_json::json!({ "scene": scene.to_string_lossy(), "counts": result.counts }),
                )),
                Err(err) => {
                    let mut envelope = Envelope::from_error(&err);
                    envelope.code = "VALIDATE_RUNTIME_RESULT".to_string();
                    envelope.data = serde_json::json!({ "scene": scene.to_string_lossy(), "counts": result.counts });
                    Ok(envelope)
                }
            }
        }
        ValidateCommand::BridgeSmoke { plan, expect_failure, expected_code, expected_applied, expect_applied_from_plan, out } => {
            let bytes = std::fs::read(plan)?;
            let parsed = parse_plan(&bytes)?;
            let dispatch_result = bridge_client::dispatch(&parsed.target, &parsed.ops, Duration::from_secs(30));

            let (observed_envelope, dispatch_failed) = match dispatch_result {
                Ok(envelope) => (envelope, false),
                Err(err) => (Envelope::from_error(&err), true),
            };

            let mut mismatches = Vec::new();
            if *expect_failure != dispatch_failed {
                mismatches.push(format!("expected failure={expect_failure}, observed failure={dispatch_failed}"));
            }
            if let Some(expected) = expected_code {
                if &observed_envelope.code != expected {
                    mismatches.push(format!("expected code '{expected}', observed '{}'", observed_envelope.code));
                }
            }
            let observed_applied = observed_envelope
                .data
                .get("applied")
                .and_then(|v| v.as_array())
                .map(Vec::len)
                .unwrap_or(0);
            if let Some(expected) = expected_applied {
                if observed_applied != *expected {
                    mismatches.push(format!("expected {expected} applied op(s), observed {observed_applied}"));
                }
            }
            if *expect_applied_from_plan && observed_applied != parsed.ops.len() {
                mismatches.push(format!(
                    "expected {} applied op(s) (plan length), observed {observed_applied}",
                    parsed.ops.len()
                ));
            }

            let smoke_envelope = if mismatches.is_empty() {
                Envelope::ok(
                    "SER_APPLY_OK",
                    "bridge smoke test matched expectations",
                    serde_json::json!({ "observed": observed_envelope }),
                )
            } else {
                Envelope::with_severity(
                    Severity::Error,
                    observed_envelope.code.clone(),
                    mismatches.join("; "),
                    serde_json::json!({ "observed": observed_envelope }),
                )
            };

            if let Some(out_path) = out {
                std::fs::write(out_path, serde_json::to_string_pretty(&smoke_envelope)?)?;
            }
            Ok(smoke_envelope)
        }
    }
}

fn dispatch_suggest(command: &SuggestCommand) -> Result<Envelope, UnityToolError> {
    match command {
        SuggestCommand::IgnoreGuids { scope, min_occurrences, max_items, out_ignore_guid_file, out_ignore_guid_mode } => {
            let project_root = resolve_project_root(scope)?;
            let config = load_project_config(&project_root)?;
            let exclude_globs = merged_excludes(&[], &config);
            let index = build_guid_index(&project_root, &exclude_globs)?;
            let scan_options = ScanOptions { exclude_globs: exclude_globs.clone(), ..ScanOptions::default() };
            let scan = scan_references(&project_root, scope, &index, &scan_options)?;
            let suggestions = suggest_ignore_guids(&scan, *min_occurrences, *max_items);

            if let Some(path) = out_ignore_guid_file {
                let guids: Vec<String> = suggestions.iter().map(|(guid, _)| guid.clone()).collect();
                let mode = match out_ignore_guid_mode {
                    IgnoreGuidWriteMode::Replace => WriteMode::Replace,
                    IgnoreGuidWriteMode::Append => WriteMode::Append,
                };
                write_ignore_file(path, &guids, mode)?;
            }

            Ok(Envelope::ok(
                "SUGGEST_IGNORE_GUIDS_OK",
                format!("{} suggestion(s)", suggestions.len()),
                serde_json::json!({ "suggestions": suggestions }),
            ))
        }
    }
}

fn read_key(key_file: &Option<PathBuf>, key_env: &Option<String>) -> Result<Vec<u8>, UnityToolError> {
    let source = match (key_file, key_env) {
        (Some(path), _) => KeySource::File(path),
        (None, Some(name)) => KeySource::EnvVar(name),
        (None, None) => KeySource::Default,
    };
    resolve_signing_key(source)
}

fn dispatch_patch(command: &PatchCommand) -> Result<Envelope, UnityToolError> {
    match command {
        PatchCommand::Hash { plan, format: _ } => {
            let bytes = std::fs::read(plan)?;
            let digest = plan_digest(&bytes);
            Ok(Envelope::ok("SER001", "plan hashed", serde_json::json!({ "sha256": digest })))
        }
        PatchCommand::Sign { plan, format: _, key_file, key_env } => {
            let bytes = std::fs::read(plan)?;
            let key = read_key(key_file, key_env)?;
            let signature = sign_plan(&bytes, &key);
            Ok(Envelope::ok("SER001", "plan signed", serde_json::json!({ "signature": signature })))
        }
        PatchCommand::Attest { plan, format: _, out, unsigned, key_file, key_env } => {
            let bytes = std::fs::read(plan)?;
            let signature = if *unsigned {
                None
            } else {
                let key = read_key(key_file, key_env)?;
                Some(sign_plan(&bytes, &key))
            };
            let attestation = build_attestation(&bytes, &plan.to_string_lossy(), signature);
            std::fs::write(out, serde_json::to_string_pretty(&attestation)?)?;
            Ok(Envelope::ok("SER001", "attestation written", serde_json::to_value(&attestation)?))
        }
        PatchCommand::Verify { plan, format: _, expected_sha256, expected_signature, attestation_file, key_file, key_env } => {
            let bytes = std::fs::read(plan)?;
            let attestation: Option<Attestation> = match attestation_file {
                Some(path) => Some(serde_json::from_str(&std::fs::read_to_string(path)?)?),
                None => None,
            };
            let signing_key = if expected_signature.is_some() || attestation.as_ref().and_then(|a| a.signature.as_ref()).is_some() {
                Some(read_key(key_file, key_env)?)
            } else {
                None
            };
            let expectations = VerifyExpectations {
                expected_sha256: expected_sha256.clone(),
                expected_signature: expected_signature.clone(),
                attestation,
                signing_key,
            };
            verify_plan(&bytes, &expectations)?;
            Ok(Envelope::ok("SER001", "plan verified", serde_json::json!({ "verified": true })))
        }
        PatchCommand::Apply {
            plan,
            dry_run,
            confirm,
            out_report,
            plan_sha256,
            plan_signature,
            attestation_file,
            key_file,
            key_env,
            scope,
            runtime_scene,
            change_reason: _,
            bridge_timeout_secs,
        } => {
            let bytes = std::fs::read(plan)?;
            let anchor: &Path = scope.as_deref().unwrap_or(plan.as_path());
            let project_root = resolve_project_root(anchor)?;

            let attestation: Option<Attestation> = match attestation_file {
                Some(path) => Some(serde_json::from_str(&std::fs::read_to_string(path)?)?),
                None => None,
            };
            let signing_key = if plan_signature.is_some() || attestation.as_ref().and_then(|a| a.signature.as_ref()).is_some() {
                Some(read_key(key_file, key_env)?)
            } else {
                None
            };
            let verify_expectations = if plan_sha256.is_some() || plan_signature.is_some() || attestation.is_some() {
                Some(VerifyExpectations {
                    expected_sha256: plan_sha256.clone(),
                    expected_signature: plan_signature.clone(),
                    attestation,
                    signing_key,
                })
            } else {
                None
            };

            let config = load_project_config(&project_root)?;
            let bridge_timeout = resolve_bridge_timeout(*bridge_timeout_secs, &config);
            let exclude_globs = merged_excludes(&[], &config);

            let request = ApplyRequest {
                plan_bytes: bytes,
                project_root,
                dry_run: *dry_run,
                confirm: *confirm,
                scope: scope.clone(),
                runtime_scene_log: runtime_scene.clone(),
                verify_expectations,
                bridge_timeout,
                scan_options: ScanOptions { exclude_globs, ..ScanOptions::default() },
            };
            let envelope = apply_patch(request);
            if let Some(path) = out_report {
                std::fs::write(path, serde_json::to_string_pretty(&envelope)?)?;
            }
            Ok(envelope)
        }
    }
}

fn dispatch_report(command: &ReportCommand) -> Result<Envelope, UnityToolError> {
    match command {
        ReportCommand::Export { input, format, out, md_max_usages, md_omit_usages, md_max_steps, md_omit_steps } => {
            let report_format = match format {
                ReportFormatArg::Md => ReportFormat::Markdown,
                ReportFormatArg::Json => ReportFormat::Json,
            };
            let options = ReportOptions {
                md_max_usages: *md_max_usages,
                md_omit_usages: *md_omit_usages,
                md_max_steps: *md_max_steps,
                md_omit_steps: *md_omit_steps,
            };
            export_report(input, report_format, out, &options)?;
            Ok(Envelope::ok(
                "REPORT_EXPORT_OK",
                "report exported",
                serde_json::json!({ "out": out.to_string_lossy() }),
            ))
        }
    }
}
