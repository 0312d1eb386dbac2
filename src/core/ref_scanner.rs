//! Reference scanner: walks a scope, classifies every reference against a
//! `GuidIndex`, and produces noise-controlled diagnostics (spec §4.2, C5).

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::core::asset_parser::{extract_references, local_identifiers};
use crate::core::envelope::Diagnostic;
use crate::core::error::UnityToolError;
use crate::core::guid_index::{GuidIndex, is_builtin_guid};
use crate::core::project_root::is_excluded_dir;

#[derive(Debug, Clone, Default)]
pub struct ScanOptions {
    pub exclude_globs: Vec<String>,
    pub ignore_guids: HashSet<String>,
    pub details: bool,
    pub max_diagnostics: usize,
}

#[derive(Debug, Clone, Default)]
pub struct ScanResult {
    /// Unique-problem counts: one entry per distinct GUID/category pair.
    pub categories: HashMap<String, usize>,
    /// Total citation counts per category.
    pub categories_occurrences: HashMap<String, usize>,
    pub broken_occurrences: usize,
    /// Every distinct missing-asset GUID and its occurrence count, untruncated.
    pub missing_asset_occurrences: HashMap<String, usize>,
    /// `missing_asset_occurrences`, sorted and capped at [`TOP_N_MISSING`] for display.
    pub top_missing_asset_guids: Vec<(String, usize)>,
    pub scan_project_root: PathBuf,
    pub skipped_external_prefab_fileid_checks: usize,
    pub ignored_missing_asset_occurrences: usize,
    pub diagnostics: Vec<Diagnostic>,
}

const TOP_N_MISSING: usize = 10;

/// Walk `scope`, extract every reference, and classify it against `index`.
/// `project_root` anchors the relative paths used to decide whether a
/// `.prefab` reference is being cited from inside or outside that prefab.
pub fn scan_references(
    project_root: &Path,
    scope: &Path,
    index: &GuidIndex,
    options: &ScanOptions,
) -> Result<ScanResult, UnityToolError> {
    let mut result = ScanResult {
        scan_project_root: project_root.to_path_buf(),
        ..Default::default()
    };

    let files: Vec<PathBuf> = WalkDir::new(scope)
        .into_iter()
        .filter_entry(|e| {
            if e.file_type().is_dir() {
                if let Some(name) = e.file_name().to_str() {
                    return !is_excluded_dir(name, &options.exclude_globs);
                }
            }
            true
        })
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .collect();

    let mut missing_occurrences: HashMap<String, usize> = HashMap::new();
    let mut missing_local_id_problems: HashSet<(String, i64)> = HashSet::new();

    // Deterministic scope-walk order (walkdir emits a stable depth-first order;
    // the single-threaded pass below is what guarantees diagnostic ordering).
    for file in &files {
        let Ok(content) = std::fs::read_to_string(file) else {
            continue;
        };
        let rel_referrer = file
            .strip_prefix(project_root)
            .unwrap_or(file)
            .to_string_lossy()
            .replace('\\', "/");

        for occurrence in extract_references(&content, &rel_referrer) {
            if is_builtin_guid(&occurrence.guid) {
                continue;
            }
            if options.ignore_guids.contains(&occurrence.guid) {
                result.ignored_missing_asset_occurrences += 1;
                continue;
            }

            let Some(record) = index.get(&occurrence.guid) else {
                *missing_occurrences.entry(occurrence.guid.clone()).or_insert(0) += 1;
                *result
                    .categories_occurrences
                    .entry("missing_asset".to_string())
                    .or_insert(0) += 1;
                result.broken_occurrences += 1;
                if options.details && result.diagnostics.len() < options.max_diagnostics {
                    result.diagnostics.push(Diagnostic::new(
                        "REF001",
                        occurrence.guid.clone(),
                        occurrence.location.clone(),
                        format!("missing_asset: guid {} not found in project index", occurrence.guid),
                        occurrence.evidence.clone(),
                    ));
                }
                continue;
            };

            let referrer_is_target = record.path == rel_referrer;
            if record.extension == "prefab" && !referrer_is_target {
                result.skipped_external_prefab_fileid_checks += 1;
                continue;
            }

            if occurrence.file_id != 0 {
                let target_path = project_root.join(&record.path);
                if let Ok(target_content) = std::fs::read_to_string(&target_path) {
                    let ids = local_identifiers(&target_content);
                    if !ids.is_empty() && !ids.contains(&occurrence.file_id) {
                        missing_local_id_problems.insert((occurrence.guid.clone(), occurrence.file_id));
                        *result
                            .categories_occurrences
                            .entry("missing_local_id".to_string())
                            .or_insert(0) += 1;
                        result.broken_occurrences += 1;
                        if options.details && result.diagnostics.len() < options.max_diagnostics {
                            result.diagnostics.push(Diagnostic::new(
                                "REF002",
                                format!("{}#{}", occurrence.guid, occurrence.file_id),
                                occurrence.location.clone(),
                                format!(
                                    "missing_local_id: fileID {} not found in {}",
                                    occurrence.file_id, record.path
                                ),
                                occurrence.evidence.clone(),
                            ));
                        }
                    }
                }
            }
        }
    }

    result.categories.insert("missing_asset".to_string(), missing_occurrences.len());
    if !missing_local_id_problems.is_empty() {
        result
            .categories
            .insert("missing_local_id".to_string(), missing_local_id_problems.len());
    }

    let mut top: Vec<(String, usize)> = missing_occurrences.iter().map(|(g, c)| (g.clone(), *c)).collect();
    top.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    top.truncate(TOP_N_MISSING);
    result.top_missing_asset_guids = top;
    result.missing_asset_occurrences = missing_occurrences;

    Ok(result)
}

/// Filter a scan to occurrences of a single `asset-or-guid`
/// (`inspect where-used`), capped at `max_usages`.
pub fn where_used(
    project_root: &Path,
    scope: &Path,
    target_guid: &str,
    exclude_globs: &[String],
    max_usages: usize,
) -> Result<Vec<Diagnostic>, UnityToolError> {
    let mut out = Vec::new();
    let files: Vec<PathBuf> = WalkDir::new(scope)
        .into_iter()
        .filter_entry(|e| {
            if e.file_type().is_dir() {
                if let Some(name) = e.file_name().to_str() {
                    return !is_excluded_dir(name, exclude_globs);
                }
            }
            true
        })
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .collect();

    for file in &files {
        if out.len() >= max_usages {
            break;
        }
        let Ok(content) = std::fs::read_to_string(file) else {
            continue;
        };
        let rel = file
            .strip_prefix(project_root)
            .unwrap_or(file)
            .to_string_lossy()
            .replace('\\', "/");
        for occurrence in extract_references(&content, &rel) {
            if occurrence.guid == target_guid {
                out.push(Diagnostic::new(
                    "",
                    occurrence.guid.clone(),
                    occurrence.location.clone(),
                    "usage".to_string(),
                    occurrence.evidence.clone(),
                ));
                if out.len() >= max_usages {
                    break;
                }
            }
        }
    }
    Ok(out)
}
