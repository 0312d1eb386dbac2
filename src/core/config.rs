//! Optional `.unitytool/bridge.toml` defaults (spec §4.10).
//!
//! CLI flags and environment variables always win; the file only fills in
//! what neither supplies. Absence of the file is not an error — mirrors
//! "no config = no defaults configured".

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::core::error::UnityToolError;

const DEFAULT_BRIDGE_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone, Deserialize, Default)]
pub struct BridgeConfig {
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub default_exclude_globs: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ProjectConfig {
    pub bridge: BridgeConfig,
}

/// Load `<project_root>/.unitytool/bridge.toml`. A missing file yields
/// `ProjectConfig::default()`, not an error.
pub fn load_project_config(project_root: &Path) -> Result<ProjectConfig, UnityToolError> {
    let path = project_root.join(".unitytool").join("bridge.toml");
    if !path.exists() {
        return Ok(ProjectConfig::default());
    }
    let content = std::fs::read_to_string(&path)?;
    let bridge: BridgeConfig = toml::from_str(&content)?;
    Ok(ProjectConfig { bridge })
}

/// CLI flag, if given, wins; otherwise the config file's value; otherwise
/// the built-in default.
pub fn resolve_bridge_timeout(cli_value: Option<u64>, config: &ProjectConfig) -> Duration {
    let secs = cli_value
        .or(config.bridge.timeout_secs)
        .unwrap_or(DEFAULT_BRIDGE_TIMEOUT_SECS);
    Duration::from_secs(secs)
}

pub fn resolve_default_excludes(config: &ProjectConfig) -> Vec<String> {
    config.bridge.default_exclude_globs.clone()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_config_file_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_project_config(dir.path()).unwrap();
        assert_eq!(config.bridge.timeout_secs, None);
    }

    #[test]
    fn parses_bridge_toml_and_cli_overrides_it() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join(".unitytool")).unwrap();
        std::fs::write(
            dir.path().join(".unitytool").join("bridge.toml"),
            "timeout_secs = 60\ndefault_exclude_globs = [\"Library/*\"]\n",
        )
        .unwrap();
        let config = load_project_config(dir.path()).unwrap();
        assert_eq!(config.bridge.timeout_secs, Some(60));

        assert_eq!(resolve_bridge_timeout(Some(5), &config).as_secs(), 5);
        assert_eq!(resolve_bridge_timeout(None, &config).as_secs(), 60);
    }

    #[test]
    fn falls_back_to_built_in_default_timeout() {
        let config = ProjectConfig::default();
        assert_eq!(resolve_bridge_timeout(None, &config).as_secs(), DEFAULT_BRIDGE_TIMEOUT_SECS);
    }
}
