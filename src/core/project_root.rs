//! Project-root resolution and default exclusion policy (spec §4.1, C2).

use std::path::{Path, PathBuf};

use crate::core::error::UnityToolError;

/// Directories skipped by every walk (GUID index build, reference scan)
/// unless a caller explicitly re-includes them — no spec path does.
pub const DEFAULT_EXCLUDED_DIRS: &[&str] = &["Library", "Logs", "Temp", "obj"];

/// Walk upward from `scope` until a directory whose child named `Assets`
/// exists is found. Fails with `UnityToolError::NoProjectRoot` otherwise.
pub fn resolve_project_root(scope: &Path) -> Result<PathBuf, UnityToolError> {
    let start = if scope.is_file() {
        scope
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| scope.to_path_buf())
    } else {
        scope.to_path_buf()
    };

    let mut current = start
        .canonicalize()
        .unwrap_or_else(|_| start.to_path_buf());

    loop {
        if current.join("Assets").is_dir() {
            return Ok(current);
        }
        match current.parent() {
            Some(parent) => current = parent.to_path_buf(),
            None => {
                return Err(UnityToolError::NoProjectRoot(
                    scope.to_string_lossy().to_string(),
                ));
            }
        }
    }
}

/// True if `name` is one of the default-excluded directory names, or
/// matches one of the caller-supplied exclude globs (simple `*`/`?` glob,
/// matched against the bare directory name — not a full path glob).
pub fn is_excluded_dir(name: &str, extra_excludes: &[String]) -> bool {
    if DEFAULT_EXCLUDED_DIRS.contains(&name) {
        return true;
    }
    extra_excludes.iter().any(|g| glob_match(g, name))
}

/// Minimal `*`/`?` glob matcher (no `**`, no character classes) — the spec
/// only ever needs directory-name-level exclusion globs.
pub fn glob_match(pattern: &str, text: &str) -> bool {
    fn go(p: &[u8], t: &[u8]) -> bool {
        match (p.first(), t.first()) {
            (None, None) => true,
            (Some(b'*'), _) => go(&p[1..], t) || (!t.is_empty() && go(p, &t[1..])),
            (Some(b'?'), Some(_)) => go(&p[1..], &t[1..]),
            (Some(pc), Some(tc)) if pc == tc => go(&p[1..], &t[1..]),
            _ => false,
        }
    }
    go(pattern.as_bytes(), text.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn resolves_root_from_nested_scope() {
        let dir = tempfile::tempdir().unwrap();
        let assets = dir.path().join("Assets").join("Prefabs").join("Sub");
        fs::create_dir_all(&assets).unwrap();
        let root = resolve_project_root(&assets).unwrap();
        assert_eq!(root, dir.path().canonicalize().unwrap());
    }

    #[test]
    fn fails_without_assets_ancestor() {
        let dir = tempfile::tempdir().unwrap();
        let scope = dir.path().join("no_assets_here");
        fs::create_dir_all(&scope).unwrap();
        let err = resolve_project_root(&scope).unwrap_err();
        assert_eq!(err.code(), Some("REF_NO_PROJECT_ROOT"));
    }

    #[test]
    fn default_excluded_dirs_match() {
        assert!(is_excluded_dir("Library", &[]));
        assert!(is_excluded_dir("Temp", &[]));
        assert!(!is_excluded_dir("Scripts", &[]));
    }

    #[test]
    fn extra_exclude_glob_matches_bare_name() {
        let extra = vec!["Generated*".to_string()];
        assert!(is_excluded_dir("GeneratedCode", &extra));
        assert!(!is_excluded_dir("Scripts", &extra));
    }

    #[test]
    fn glob_match_handles_question_mark() {
        assert!(glob_match("a?c", "abc"));
        assert!(!glob_match("a?c", "ac"));
    }
}
