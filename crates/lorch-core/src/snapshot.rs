// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Snapshot capture (§4.G): a content-addressed, sorted manifest of an
//! allowlisted subset of the workspace, used to pin every command in a
//! run to a specific state of the tree.

use crate::atomic::write_atomic_json;
use crate::error::Result;
use crate::layout::{is_hidden, WorkspaceLayout};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// Top-level directories scanned by default.
pub const DEFAULT_INCLUDED_DIRS: &[&str] = &["specs", "src", "tests", "docs"];

/// Names excluded anywhere they appear, in addition to the workspace's
/// operational directories.
pub const DEFAULT_EXCLUDED_NAMES: &[&str] = &[".git", "node_modules", ".cache"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    pub path: String,
    pub sha256: String,
    pub size: u64,
    pub mtime: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotManifest {
    pub snapshot_id: String,
    pub created_at: DateTime<Utc>,
    pub workspace_root: PathBuf,
    pub files: Vec<FileEntry>,
}

impl SnapshotManifest {
    /// `snap-<first 12 hex chars of sha256(canonical(manifest with id cleared))>`
    fn compute_id(created_at: DateTime<Utc>, workspace_root: &Path, files: &[FileEntry]) -> String {
        let cleared = serde_json::json!({
            "snapshot_id": "",
            "created_at": created_at.to_rfc3339(),
            "workspace_root": workspace_root.to_string_lossy(),
            "files": files,
        });
        let canonical = lorch_proto::canonical_json(&cleared);
        let mut hasher = Sha256::new();
        hasher.update(canonical.as_bytes());
        let digest = hasher.finalize();
        let hex = format!("{digest:x}");
        format!("snap-{}", &hex[..12])
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            crate::atomic::ensure_dir(dir)?;
        }
        write_atomic_json(path, self)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

/// Walks each of `included_dirs` under `workspace_root`, skipping hidden
/// entries and any directory named in `excluded_names` or one of the
/// workspace's operational directories, hashing every remaining file.
pub fn capture(workspace_root: &Path) -> Result<SnapshotManifest> {
    capture_with(workspace_root, DEFAULT_INCLUDED_DIRS, DEFAULT_EXCLUDED_NAMES)
}

pub fn capture_with(
    workspace_root: &Path,
    included_dirs: &[&str],
    extra_excluded_names: &[&str],
) -> Result<SnapshotManifest> {
    let mut excluded: BTreeSet<&str> = WorkspaceLayout::operational_dir_names().iter().copied().collect();
    excluded.extend(extra_excluded_names.iter().copied());

    let mut files = Vec::new();
    for dir_name in included_dirs {
        let dir_path = workspace_root.join(dir_name);
        if !dir_path.is_dir() {
            continue;
        }
        walk_dir(workspace_root, &dir_path, &excluded, &mut files)?;
    }
    files.sort_by(|a, b| a.path.cmp(&b.path));

    let created_at = Utc::now();
    let snapshot_id = SnapshotManifest::compute_id(created_at, workspace_root, &files);
    Ok(SnapshotManifest { snapshot_id, created_at, workspace_root: workspace_root.to_path_buf(), files })
}

fn walk_dir(
    workspace_root: &Path,
    dir: &Path,
    excluded_names: &BTreeSet<&str>,
    out: &mut Vec<FileEntry>,
) -> Result<()> {
    let entries = match std::fs::read_dir(dir) {
        Ok(e) => e,
        Err(_) => return Ok(()),
    };
    for entry in entries {
        let entry = entry?;
        let path = entry.path();
        if is_hidden(&path) {
            continue;
        }
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
            if excluded_names.contains(name) {
                continue;
            }
            walk_dir(workspace_root, &path, excluded_names, out)?;
        } else if file_type.is_file() {
            let metadata = entry.metadata()?;
            let sha256 = hash_file(&path)?;
            let rel = path.strip_prefix(workspace_root).unwrap_or(&path).to_string_lossy().replace('\\', "/");
            let mtime: DateTime<Utc> = metadata.modified().map(DateTime::<Utc>::from).unwrap_or_else(|_| Utc::now());
            out.push(FileEntry { path: rel, sha256, size: metadata.len(), mtime });
        }
    }
    Ok(())
}

fn hash_file(path: &Path) -> Result<String> {
    use std::io::Read;
    let mut file = std::fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(format!("sha256:{:x}", hasher.finalize()))
}
