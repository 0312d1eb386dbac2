//! Drives the reference-audit workflow across modules the way the CLI's
//! `inspect`/`validate`/`suggest` verbs compose them: build the GUID
//! index, scan for broken references, suggest and persist an ignore
//! list, then confirm a rescan comes back clean (spec §4.1-§4.3, §8).

use std::collections::HashSet;
use std::fs;

use unitytool::core::guid_index::build_guid_index;
use unitytool::core::ignore_guids::{load_ignore_file, suggest_ignore_guids, write_ignore_file, WriteMode};
use unitytool::core::override_inspector::inspect_variant;
use unitytool::core::ref_scanner::{scan_references, ScanOptions};

#[test]
fn broken_references_can_be_suggested_ignored_and_rescanned_clean() {
    let dir = tempfile::tempdir().unwrap();
    let assets = dir.path().join("Assets");
    fs::create_dir_all(&assets).unwrap();
    let missing_guid = "a".repeat(32);
    fs::write(
        assets.join("Scene.unity"),
        format!("guid: {missing_guid}\nguid: {missing_guid}\nguid: {missing_guid}\n"),
    )
    .unwrap();

    let index = build_guid_index(dir.path(), &[]).unwrap();
    let first_scan = scan_references(dir.path(), &assets, &index, &ScanOptions::default()).unwrap();
    assert_eq!(first_scan.broken_occurrences, 3);

    let suggestions = suggest_ignore_guids(&first_scan, 1, 10);
    assert_eq!(suggestions, vec![(missing_guid.clone(), 3)]);

    let ignore_path = dir.path().join(".unitytool").join("ignore-guids.txt");
    fs::create_dir_all(ignore_path.parent().unwrap()).unwrap();
    let guids: Vec<String> = suggestions.into_iter().map(|(g, _)| g).collect();
    write_ignore_file(&ignore_path, &guids, WriteMode::Replace).unwrap();

    let loaded: HashSet<String> = load_ignore_file(&ignore_path).unwrap();
    let options = ScanOptions {
        ignore_guids: loaded,
        ..ScanOptions::default()
    };
    let second_scan = scan_references(dir.path(), &assets, &index, &options).unwrap();
    assert_eq!(second_scan.broken_occurrences, 0);
    assert_eq!(second_scan.ignored_missing_asset_occurrences, 3);
}

#[test]
fn override_inspector_follows_the_source_prefab_chain_through_the_guid_index() {
    let dir = tempfile::tempdir().unwrap();
    let assets = dir.path().join("Assets");
    fs::create_dir_all(&assets).unwrap();

    let base_guid = "b".repeat(32);
    fs::write(assets.join("Base.prefab"), "GameObject:\n  m_Name: Base\n").unwrap();
    fs::write(
        assets.join("Base.prefab.meta"),
        format!("fileFormatVersion: 2\nguid: {base_guid}\n"),
    )
    .unwrap();

    let variant_content = format!(
        "PrefabInstance:\n  m_Modification:\n    m_Modifications:\n    - target: {{fileID: 400000, guid: {base_guid}, type: 3}}\n      propertyPath: m_Name\n      value: Variant\n      objectReference: {{fileID: 0}}\n  m_SourcePrefab: {{fileID: 100100000, guid: {base_guid}, type: 3}}\n"
    );
    let variant_path = assets.join("Variant.prefab");
    fs::write(&variant_path, &variant_content).unwrap();

    let index = build_guid_index(dir.path(), &[]).unwrap();
    let inspection = inspect_variant(dir.path(), &variant_path, Some(&index)).unwrap();

    assert_eq!(inspection.prefab_chain.len(), 1);
    assert_eq!(inspection.prefab_chain[0].guid, base_guid);
    assert_eq!(inspection.overrides.len(), 1);
    assert!(inspection.stale_candidates.is_empty());
}
