//! Parses a prefab variant asset to enumerate its Base chain, override
//! entries, and stale-override candidates (spec §4.4, C6).

use regex::Regex;
use std::collections::HashMap;
use std::path::Path;
use std::sync::OnceLock;

use crate::core::envelope::Diagnostic;
use crate::core::error::UnityToolError;
use crate::core::guid_index::GuidIndex;

/// `{guid, file_id}` — spec §3's `AssetReference`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetReference {
    pub guid: String,
    pub file_id: i64,
}

#[derive(Debug, Clone)]
pub struct OverrideEntry {
    pub target_ref: AssetReference,
    pub property_path: String,
    pub value: Option<String>,
    pub object_reference: Option<AssetReference>,
    pub location: String,
}

#[derive(Debug, Clone, Default)]
pub struct OverrideInspection {
    /// Base asset refs, root-to-variant order.
    pub prefab_chain: Vec<AssetReference>,
    pub overrides: Vec<OverrideEntry>,
    /// Diagnostics coded `PVR001` (duplicate override) or an array-size
    /// inconsistency finding.
    pub stale_candidates: Vec<Diagnostic>,
}

fn source_prefab_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"m_SourcePrefab:\s*\{fileID:\s*(-?\d+),\s*guid:\s*([a-f0-9]{32})").unwrap()
    })
}

fn modification_block_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?m)^\s*- target:\s*\{fileID:\s*(-?\d+),\s*guid:\s*([a-f0-9]{32}),[^}]*\}\s*\n\s*propertyPath:\s*(\S+)\s*\n\s*value:\s*(.*)\n(?:\s*objectReference:\s*\{fileID:\s*(-?\d+)(?:,\s*guid:\s*([a-f0-9]{32}))?[^}]*\})?",
        )
        .unwrap()
    })
}

/// Parse a single variant asset's own modification block (does not follow
/// the chain beyond its direct `m_SourcePrefab`).
fn parse_single(content: &str) -> (Option<AssetReference>, Vec<OverrideEntry>) {
    let base = source_prefab_regex().captures(content).map(|c| AssetReference {
        file_id: c.get(1).unwrap().as_str().parse().unwrap_or(0),
        guid: c.get(2).unwrap().as_str().to_string(),
    });

    let mut overrides = Vec::new();
    for (idx, caps) in modification_block_regex().captures_iter(content).enumerate() {
        let target_ref = AssetReference {
            file_id: caps.get(1).unwrap().as_str().parse().unwrap_or(0),
            guid: caps.get(2).unwrap().as_str().to_string(),
        };
        let property_path = caps.get(3).unwrap().as_str().to_string();
        let value_raw = caps.get(4).map(|m| m.as_str().trim().to_string()).unwrap_or_default();
        let value = if value_raw.is_empty() { None } else { Some(value_raw) };
        let object_reference = caps.get(5).and_then(|fid| {
            let file_id: i64 = fid.as_str().parse().ok()?;
            let guid = caps.get(6).map(|g| g.as_str().to_string()).unwrap_or_default();
            if file_id == 0 && guid.is_empty() {
                None
            } else {
                Some(AssetReference { guid, file_id })
            }
        });
        overrides.push(OverrideEntry {
            target_ref,
            property_path,
            value,
            object_reference,
            location: format!("modification[{idx}]"),
        });
    }
    (base, overrides)
}

/// Duplicate `property_path` within the same target: keep last-seen,
/// report every earlier occurrence as `PVR001`.
fn find_duplicate_overrides(overrides: &[OverrideEntry]) -> Vec<Diagnostic> {
    let mut last_seen: HashMap<(String, i64, String), usize> = HashMap::new();
    for (idx, entry) in overrides.iter().enumerate() {
        let key = (
            entry.target_ref.guid.clone(),
            entry.target_ref.file_id,
            entry.property_path.clone(),
        );
        last_seen.insert(key, idx);
    }
    let mut diagnostics = Vec::new();
    let mut seen_keys: HashMap<(String, i64, String), Vec<usize>> = HashMap::new();
    for (idx, entry) in overrides.iter().enumerate() {
        let key = (
            entry.target_ref.guid.clone(),
            entry.target_ref.file_id,
            entry.property_path.clone(),
        );
        seen_keys.entry(key).or_default().push(idx);
    }
    for (key, indices) in seen_keys {
        if indices.len() < 2 {
            continue;
        }
        let last = *indices.last().unwrap();
        for &idx in &indices {
            if idx == last {
                continue;
            }
            diagnostics.push(Diagnostic::new(
                "PVR001",
                key.2.clone(),
                overrides[idx].location.clone(),
                format!(
                    "duplicate override for target {}#{} property '{}', superseded by a later entry",
                    key.0, key.1, key.2
                ),
                overrides[idx].value.clone().unwrap_or_default(),
            ));
        }
    }
    diagnostics
}

/// `Array.size = N` inconsistent with the maximum observed `Array.data[i]`
/// index among the override entries that share the same array property.
fn find_array_size_inconsistencies(overrides: &[OverrideEntry]) -> Vec<Diagnostic> {
    let array_index_re = Regex::new(r"^(.*)\.Array\.data\[(\d+)\]$").unwrap();
    let mut declared_sizes: HashMap<(String, i64, String), i64> = HashMap::new();
    let mut max_index: HashMap<(String, i64, String), i64> = HashMap::new();

    for entry in overrides {
        let base_key = (entry.target_ref.guid.clone(), entry.target_ref.file_id);
        if let Some(prefix) = entry.property_path.strip_suffix(".Array.size") {
            let size: i64 = entry.value.as_deref().unwrap_or("0").trim().parse().unwrap_or(0);
            declared_sizes.insert((base_key.0.clone(), base_key.1, prefix.to_string()), size);
        } else if let Some(caps) = array_index_re.captures(&entry.property_path) {
            let prefix = caps.get(1).unwrap().as_str().to_string();
            let index: i64 = caps.get(2).unwrap().as_str().parse().unwrap_or(0);
            let key = (base_key.0, base_key.1, prefix);
            let entry_max = max_index.entry(key).or_insert(-1);
            if index > *entry_max {
                *entry_max = index;
            }
        }
    }

    let mut diagnostics = Vec::new();
    for (key, declared) in declared_sizes {
        let observed_max = max_index.get(&key).copied().unwrap_or(-1);
        let observed_count = observed_max + 1;
        if observed_count != declared {
            diagnostics.push(Diagnostic::new(
                "PVR001",
                format!("{}.Array", key.2),
                format!("{}#{}", key.0, key.1),
                format!(
                    "stale array override: Array.size={declared} but observed {observed_count} Array.data entries"
                ),
                String::new(),
            ));
        }
    }
    diagnostics
}

/// Parse `path` and, when `index`/`project_root` are supplied, follow
/// `m_SourcePrefab` links to build the full root-to-variant chain.
pub fn inspect_variant(
    project_root: &Path,
    path: &Path,
    index: Option<&GuidIndex>,
) -> Result<OverrideInspection, UnityToolError> {
    let content = std::fs::read_to_string(path)?;
    let (base, overrides) = parse_single(&content);

    let mut chain = Vec::new();
    let mut current = base.clone();
    let mut guard = 0;
    while let Some(base_ref) = current {
        chain.push(base_ref.clone());
        guard += 1;
        if guard > 64 {
            break; // defends against a cyclical m_SourcePrefab chain
        }
        let Some(index) = index else { break };
        let Some(record) = index.get(&base_ref.guid) else {
            break;
        };
        let base_path = project_root.join(&record.path);
        let Ok(base_content) = std::fs::read_to_string(&base_path) else {
            break;
        };
        let (next_base, _) = parse_single(&base_content);
        current = next_base;
    }
    chain.reverse(); // root-to-variant order

    let mut stale_candidates = find_duplicate_overrides(&overrides);
    stale_candidates.extend(find_array_size_inconsistencies(&overrides));

    Ok(OverrideInspection {
        prefab_chain: chain,
        overrides,
        stale_candidates,
    })
}
