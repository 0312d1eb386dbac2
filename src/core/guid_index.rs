//! GUID index: walks `.meta` sidecar files under a project root and maps
//! `guid -> asset path` (spec §4.1, C3).

use rayon::prelude::*;
use regex::Regex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use walkdir::WalkDir;

use crate::core::error::UnityToolError;
use crate::core::project_root::is_excluded_dir;

/// An asset discovered via its `.meta` sidecar. Immutable once built.
#[derive(Debug, Clone)]
pub struct AssetRecord {
    pub guid: String,
    /// Relative to the project root, `.meta` suffix stripped.
    pub path: String,
    pub extension: String,
}

/// `guid -> AssetRecord`, built once per invocation and read-only thereafter.
#[derive(Debug, Default)]
pub struct GuidIndex {
    records: HashMap<String, AssetRecord>,
    /// GUIDs seen more than once across distinct `.meta` files — first-seen wins,
    /// duplicates are reported as a warning by the caller.
    pub duplicate_guids: Vec<String>,
}

fn guid_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?m)^guid:\s*([a-f0-9]{32})").unwrap())
}

/// Engine built-in GUIDs are excluded from "missing" classification
/// (spec §3 invariants): all-zero, or `f` followed by zeros.
pub fn is_builtin_guid(guid: &str) -> bool {
    if guid.len() != 32 {
        return false;
    }
    guid.starts_with("0000000000000000") || guid.starts_with("f000000000000000")
}

impl GuidIndex {
    pub fn get(&self, guid: &str) -> Option<&AssetRecord> {
        self.records.get(guid)
    }

    pub fn contains(&self, guid: &str) -> bool {
        self.records.contains_key(guid)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Reverse lookup for CLI surfaces that accept either a GUID or an
    /// asset path (`inspect where-used --asset-or-guid`).
    pub fn find_by_path(&self, path: &str) -> Option<&AssetRecord> {
        let needle = path.trim_start_matches("./");
        self.records.values().find(|r| r.path == needle)
    }
}

/// Build the GUID index by walking `project_root`, skipping default and
/// caller-supplied excluded directories, reading every `.meta` file's
/// `guid:` line. Scanning fans out over rayon's thread pool; merging back
/// into the map is a single-threaded post-pass so first-seen-wins is
/// deterministic regardless of scheduling order (spec §5).
pub fn build_guid_index(
    project_root: &Path,
    extra_excludes: &[String],
) -> Result<GuidIndex, UnityToolError> {
    let meta_files: Vec<PathBuf> = WalkDir::new(project_root)
        .into_iter()
        .filter_entry(|e| {
            if e.file_type().is_dir() {
                if let Some(name) = e.file_name().to_str() {
                    return !is_excluded_dir(name, extra_excludes);
                }
            }
            true
        })
        .filter_map(|e| e.ok())
        .filter(|e| {
            e.file_type().is_file()
                && e.path().extension().map(|x| x == "meta").unwrap_or(false)
        })
        .map(|e| e.into_path())
        .collect();

    // Parallel fan-out: read + extract guid/path per file.
    let extracted: Vec<(String, PathBuf)> = meta_files
        .par_iter()
        .filter_map(|meta_path| {
            let content = std::fs::read_to_string(meta_path).ok()?;
            let guid = guid_regex().captures(&content)?.get(1)?.as_str().to_string();
            let asset_path = meta_path.with_extension("");
            Some((guid, asset_path))
        })
        .collect();

    // Deterministic single-threaded merge, first-seen wins by walk order.
    let mut index = GuidIndex::default();
    for (guid, asset_path) in extracted {
        let rel = asset_path
            .strip_prefix(project_root)
            .unwrap_or(&asset_path)
            .to_string_lossy()
            .replace('\\', "/");
        let extension = asset_path
            .extension()
            .map(|e| e.to_string_lossy().to_string())
            .unwrap_or_default();
        if index.records.contains_key(&guid) {
            index.duplicate_guids.push(guid);
            continue;
        }
        index.records.insert(
            guid.clone(),
            AssetRecord {
                guid,
                path: rel,
                extension,
            },
        );
    }
    Ok(index)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write_meta(dir: &Path, asset_name: &str, guid: &str) {
        fs::write(dir.join(asset_name), "fake asset contents").unwrap();
        fs::write(
            dir.join(format!("{asset_name}.meta")),
            format!("fileFormatVersion: 2\nguid: {guid}\n"),
        )
        .unwrap();
    }

    #[test]
    fn indexes_meta_sidecars() {
        let dir = tempfile::tempdir().unwrap();
        let assets = dir.path().join("Assets");
        fs::create_dir_all(&assets).unwrap();
        write_meta(&assets, "Player.prefab", "11111111111111111111111111111111");

        let index = build_guid_index(dir.path(), &[]).unwrap();
        assert_eq!(index.len(), 1);
        let rec = index.get("11111111111111111111111111111111").unwrap();
        assert_eq!(rec.path, "Assets/Player.prefab");
        assert_eq!(rec.extension, "prefab");
    }

    #[test]
    fn skips_excluded_directories() {
        let dir = tempfile::tempdir().unwrap();
        let assets = dir.path().join("Assets");
        let library = dir.path().join("Library");
        fs::create_dir_all(&assets).unwrap();
        fs::create_dir_all(&library).unwrap();
        write_meta(&library, "Noise.asset", "22222222222222222222222222222222");

        let index = build_guid_index(dir.path(), &[]).unwrap();
        assert!(index.is_empty());
    }

    #[test]
    fn first_seen_guid_wins_on_duplicate() {
        let dir = tempfile::tempdir().unwrap();
        let assets = dir.path().join("Assets");
        fs::create_dir_all(&assets).unwrap();
        let guid = "33333333333333333333333333333333";
        write_meta(&assets, "A.prefab", guid);
        write_meta(&assets, "B.prefab", guid);

        let index = build_guid_index(dir.path(), &[]).unwrap();
        assert_eq!(index.len(), 1);
        assert_eq!(index.duplicate_guids.len(), 1);
    }

    #[test]
    fn find_by_path_resolves_an_asset_path_to_its_record() {
        let dir = tempfile::tempdir().unwrap();
        let assets = dir.path().join("Assets");
        fs::create_dir_all(&assets).unwrap();
        write_meta(&assets, "Player.prefab", "44444444444444444444444444444444");

        let index = build_guid_index(dir.path(), &[]).unwrap();
        let rec = index.find_by_path("Assets/Player.prefab").unwrap();
        assert_eq!(rec.guid, "44444444444444444444444444444444");
        assert!(index.find_by_path("Assets/Missing.prefab").is_none());
    }

    #[test]
    fn builtin_guid_detection() {
        assert!(is_builtin_guid("00000000000000000000000000000000"));
        assert!(is_builtin_guid("f000000000000000f000000000000000"));
        assert!(!is_builtin_guid("abcdefabcdefabcdefabcdefabcdefab"));
    }
}
