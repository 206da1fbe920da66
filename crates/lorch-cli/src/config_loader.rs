// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Config discovery (§6): load `--config <path>` if given, otherwise search
//! upward from the current directory for `lorch.json`, creating a default
//! one in the working directory if none is found anywhere above it.
//! `lorch-core::Config::validate` owns every actual schema rule; this
//! module only finds/creates the file.

use crate::exit_error::ExitError;
use lorch_core::{AgentConfig, AgentsConfig, Config, PolicyConfig};
use std::path::{Path, PathBuf};

const CONFIG_FILE_NAME: &str = "lorch.json";

fn find_upward(start: &Path) -> Option<PathBuf> {
    for dir in start.ancestors() {
        let candidate = dir.join(CONFIG_FILE_NAME);
        if candidate.is_file() {
            return Some(candidate);
        }
    }
    None
}

fn default_config() -> Config {
    Config {
        version: "1.0".to_string(),
        workspace_root: ".".to_string(),
        policy: PolicyConfig::default(),
        agents: AgentsConfig {
            builder: AgentConfig { cmd: vec!["./agents/builder".to_string()], ..Default::default() },
            reviewer: AgentConfig { cmd: vec!["./agents/reviewer".to_string()], ..Default::default() },
            spec_maintainer: AgentConfig {
                cmd: vec!["./agents/spec_maintainer".to_string()],
                ..Default::default()
            },
            orchestration: None,
        },
    }
}

/// Loads the config from `explicit_path` if given, otherwise searches
/// upward from the current directory; if no `lorch.json` is found
/// anywhere above it, writes a default one in the current directory and
/// loads that. Either way the returned config has already passed
/// `Config::validate`.
pub fn load_or_create(explicit_path: Option<&Path>) -> Result<(PathBuf, Config), ExitError> {
    let cwd = std::env::current_dir()
        .map_err(|e| ExitError::configuration(format!("cannot read current directory: {e}")))?;

    let path = match explicit_path {
        Some(p) => p.to_path_buf(),
        None => match find_upward(&cwd) {
            Some(found) => found,
            None => {
                let path = cwd.join(CONFIG_FILE_NAME);
                let config = default_config();
                let json = serde_json::to_string_pretty(&config).map_err(|e| {
                    ExitError::configuration(format!("failed to render default config: {e}"))
                })?;
                std::fs::write(&path, json).map_err(|e| {
                    ExitError::configuration(format!(
                        "failed to write default config at {}: {e}",
                        path.display()
                    ))
                })?;
                eprintln!("wrote default config to {}", path.display());
                path
            }
        },
    };

    let bytes = std::fs::read(&path)
        .map_err(|e| ExitError::configuration(format!("cannot read {}: {e}", path.display())))?;
    let config: Config = serde_json::from_slice(&bytes)
        .map_err(|e| ExitError::configuration(format!("invalid config at {}: {e}", path.display())))?;
    config.validate()?;
    Ok((path, config))
}

/// `workspace_root` resolved relative to the config file's own directory
/// (§6: "resolved relative to the config file's directory").
pub fn resolve_workspace_root(config_path: &Path, config: &Config) -> PathBuf {
    let base = config_path.parent().unwrap_or_else(|| Path::new("."));
    let root = Path::new(&config.workspace_root);
    if root.is_absolute() {
        root.to_path_buf()
    } else {
        base.join(root)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn creates_a_default_config_when_none_found_above() {
        let dir = tempfile::tempdir().unwrap();
        let prev = std::env::current_dir().unwrap();
        std::env::set_current_dir(dir.path()).unwrap();
        let result = load_or_create(None);
        std::env::set_current_dir(prev).unwrap();

        // the generated default has empty-looking but non-empty placeholder
        // cmds, so it fails validation only if builder/reviewer/spec cmds
        // were empty; here it should load and validate cleanly.
        assert!(result.is_ok());
        assert!(dir.path().join(CONFIG_FILE_NAME).is_file());
    }

    #[test]
    #[serial]
    fn finds_config_in_a_parent_directory() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a/b/c");
        std::fs::create_dir_all(&nested).unwrap();
        let config = default_config();
        std::fs::write(dir.path().join(CONFIG_FILE_NAME), serde_json::to_vec(&config).unwrap())
            .unwrap();

        let prev = std::env::current_dir().unwrap();
        std::env::set_current_dir(&nested).unwrap();
        let result = load_or_create(None);
        std::env::set_current_dir(prev).unwrap();

        let (found_path, _) = result.unwrap();
        assert_eq!(found_path, dir.path().join(CONFIG_FILE_NAME));
    }

    #[test]
    fn explicit_path_overrides_upward_search() {
        let dir = tempfile::tempdir().unwrap();
        let explicit = dir.path().join("custom.json");
        std::fs::write(&explicit, serde_json::to_vec(&default_config()).unwrap()).unwrap();

        let (found_path, _) = load_or_create(Some(&explicit)).unwrap();
        assert_eq!(found_path, explicit);
    }
}
