//! Extracts reference tuples `(guid, file_id)` and the internal local-identifier
//! set from a serialized asset's text (spec §4.2, C4).

use regex::Regex;
use std::sync::OnceLock;

/// One `(guid, file_id)` occurrence plus where it was found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceOccurrence {
    pub guid: String,
    pub file_id: i64,
    /// `file:line` location within the referrer.
    pub location: String,
    /// The literal `guid: ...` (and, when found, `fileID: ...`) text.
    pub evidence: String,
}

fn guid_line_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"guid:\s*([a-f0-9]{32})").unwrap())
}

fn file_id_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"fileID:\s*(-?\d+)").unwrap())
}

/// `--- !u!<type> &<anchor>` anchors a block's own local identifier.
fn anchor_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^--- !u!\d+ &(-?\d+)").unwrap())
}

/// Scan every line of `content` for `guid: <32-hex>` references, pairing
/// each with the nearest `fileID:` token on the same line (Unity always
/// emits them together, e.g. `{fileID: 114123, guid: abcd..., type: 3}`).
/// A `guid:` line with no `fileID:` token on it is treated as `file_id = 0`
/// (the main asset).
pub fn extract_references(content: &str, file_label: &str) -> Vec<ReferenceOccurrence> {
    let mut out = Vec::new();
    for (idx, line) in content.lines().enumerate() {
        let Some(guid_caps) = guid_line_regex().captures(line) else {
            continue;
        };
        let guid = guid_caps.get(1).unwrap().as_str().to_string();
        let file_id = file_id_regex()
            .captures(line)
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().parse::<i64>().ok())
            .unwrap_or(0);
        out.push(ReferenceOccurrence {
            guid,
            file_id,
            location: format!("{file_label}:{}", idx + 1),
            evidence: line.trim().to_string(),
        });
    }
    out
}

/// Enumerate the set of local file identifiers an asset *defines* (its own
/// `--- !u!<type> &<anchor>` block anchors), used to validate that a
/// `fileID` cited from elsewhere in the same file actually exists.
pub fn local_identifiers(content: &str) -> std::collections::HashSet<i64> {
    content
        .lines()
        .filter_map(|line| {
            anchor_regex()
                .captures(line)
                .and_then(|c| c.get(1))
                .and_then(|m| m.as_str().parse::<i64>().ok())
        })
        .collect()
}

/// Validate that `Array.size` matches the number of enumerated
/// `Array.data[i]` entries for every array property block in `content`
/// (spec §3 invariant). Returns the mismatches found, as
/// `(declared_size, observed_entries, location)`.
pub fn check_array_size_consistency(content: &str) -> Vec<(i64, i64, String)> {
    let size_re = Regex::new(r"Array\.size:\s*(-?\d+)").unwrap();
    let mut mismatches = Vec::new();
    let lines: Vec<&str> = content.lines().collect();
    let mut i = 0;
    while i < lines.len() {
        if let Some(caps) = size_re.captures(lines[i]) {
            let declared: i64 = caps.get(1).unwrap().as_str().parse().unwrap_or(0);
            let mut observed = 0i64;
            let mut j = i + 1;
            while j < lines.len() && lines[j].trim_start().starts_with("data[") {
                observed += 1;
                j += 1;
            }
            if observed != declared {
                mismatches.push((declared, observed, format!("line:{}", i + 1)));
            }
            i = j;
        } else {
            i += 1;
        }
    }
    mismatches
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_guid_and_fileid_pair() {
        let content = "  m_Script: {fileID: 11500000, guid: aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa, type: 3}\n";
        let refs = extract_references(content, "Foo.prefab");
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].guid, "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa");
        assert_eq!(refs[0].file_id, 11500000);
        assert_eq!(refs[0].location, "Foo.prefab:1");
    }

    #[test]
    fn missing_file_id_defaults_to_main_asset() {
        let content = "guid: bbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb\n";
        let refs = extract_references(content, "Foo.meta");
        assert_eq!(refs[0].file_id, 0);
    }

    #[test]
    fn collects_local_identifier_anchors() {
        let content = "--- !u!1 &123456\nGameObject:\n--- !u!4 &789\nTransform:\n";
        let ids = local_identifiers(content);
        assert!(ids.contains(&123456));
        assert!(ids.contains(&789));
    }

    #[test]
    fn array_size_mismatch_detected() {
        let content = "  Array.size: 2\n  data[0]: 1\n  data[1]: 2\n  data[2]: 3\n";
        let mismatches = check_array_size_consistency(content);
        assert_eq!(mismatches, vec![(2, 3, "line:1".to_string())]);
    }

    #[test]
    fn array_size_consistent_reports_nothing() {
        let content = "  Array.size: 1\n  data[0]: 1\n";
        assert!(check_array_size_consistency(content).is_empty());
    }
}
