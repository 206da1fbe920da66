// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared setup every subcommand needs: load/validate the config, resolve
//! the workspace root relative to it, and make sure the fixed directory
//! layout (§6) exists before anything tries to write into it.

use crate::config_loader;
use crate::exit_error::ExitError;
use lorch_core::{Config, WorkspaceLayout};
use std::path::{Path, PathBuf};

pub struct RunContext {
    pub config: Config,
    pub config_path: PathBuf,
    pub workspace_root: PathBuf,
    pub layout: WorkspaceLayout,
}

pub fn load(config_path: Option<&Path>) -> Result<RunContext, ExitError> {
    let (config_path, config) = config_loader::load_or_create(config_path)?;
    let workspace_root = config_loader::resolve_workspace_root(&config_path, &config);
    let layout = WorkspaceLayout::new(&workspace_root);
    layout
        .ensure_all_dirs()
        .map_err(|e| ExitError::run_failed(format!("cannot prepare workspace directories: {e}")))?;
    Ok(RunContext { config, config_path, workspace_root, layout })
}
