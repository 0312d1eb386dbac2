//! `suggest ignore-guids` and the ignore-guid file format (spec §4.3, §6).

use std::collections::HashSet;
use std::path::Path;

use crate::core::error::UnityToolError;
use crate::core::ref_scanner::ScanResult;

/// GUIDs whose `missing_asset` occurrence count is `>= min_occurrences`,
/// capped at `max_items`, ordered by occurrence count descending then
/// lexicographically. Runs over the full per-GUID occurrence map, not the
/// display-only top-N slice, so a scope with more distinct missing GUIDs
/// than that display cap still surfaces every one that qualifies.
pub fn suggest_ignore_guids(
    scan: &ScanResult,
    min_occurrences: usize,
    max_items: usize,
) -> Vec<(String, usize)> {
    let mut candidates: Vec<(String, usize)> = scan
        .missing_asset_occurrences
        .iter()
        .filter(|(_, count)| **count >= min_occurrences)
        .map(|(guid, count)| (guid.clone(), *count))
        .collect();
    candidates.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    candidates.truncate(max_items);
    candidates
}

/// Parse a UTF-8 ignore-guid file: one 32-hex GUID per line, `#` starts a
/// comment, blank lines are skipped.
pub fn parse_ignore_file(content: &str) -> HashSet<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}

pub fn load_ignore_file(path: &Path) -> Result<HashSet<String>, UnityToolError> {
    let content = std::fs::read_to_string(path)?;
    Ok(parse_ignore_file(&content))
}

/// Serialize a GUID set back to the ignore-file text format, one GUID per
/// line, sorted for determinism.
pub fn serialize_ignore_file(guids: &HashSet<String>) -> String {
    let mut sorted: Vec<&String> = guids.iter().collect();
    sorted.sort();
    let mut out = String::new();
    for guid in sorted {
        out.push_str(guid);
        out.push('\n');
    }
    out
}

pub enum WriteMode {
    Replace,
    Append,
}

/// Write (or append to) an ignore-guid file with the suggested GUIDs.
pub fn write_ignore_file(
    path: &Path,
    guids: &[String],
    mode: WriteMode,
) -> Result<(), UnityToolError> {
    let mut set: HashSet<String> = match mode {
        WriteMode::Replace => HashSet::new(),
        WriteMode::Append => {
            if path.exists() {
                load_ignore_file(path)?
            } else {
                HashSet::new()
            }
        }
    };
    set.extend(guids.iter().cloned());
    std::fs::write(path, serialize_ignore_file(&set))?;
    Ok(())
}
