// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Workspace layout (§6): the fixed set of paths the core reads and
//! writes under a workspace root. A sibling collaborator (out of scope
//! here) creates the root directory structure; the core only ever touches
//! these specific subpaths within it.

use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct WorkspaceLayout {
    pub root: PathBuf,
}

impl WorkspaceLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn state_dir(&self) -> PathBuf {
        self.root.join("state")
    }

    pub fn run_state_path(&self) -> PathBuf {
        self.state_dir().join("run.json")
    }

    pub fn intake_dir(&self) -> PathBuf {
        self.state_dir().join("intake")
    }

    pub fn intake_snapshot_path(&self, run_id: &str) -> PathBuf {
        self.intake_dir().join(format!("{run_id}.json"))
    }

    pub fn intake_latest_path(&self) -> PathBuf {
        self.intake_dir().join("latest.json")
    }

    pub fn events_dir(&self) -> PathBuf {
        self.root.join("events")
    }

    pub fn ledger_path(&self, run_id: &str) -> PathBuf {
        self.events_dir().join(format!("{run_id}.ndjson"))
    }

    pub fn intake_ledger_path(&self, run_id: &str) -> PathBuf {
        self.events_dir().join(format!("{run_id}-intake.ndjson"))
    }

    pub fn receipts_dir(&self) -> PathBuf {
        self.root.join("receipts")
    }

    pub fn task_receipts_dir(&self, task_id: &str) -> PathBuf {
        self.receipts_dir().join(task_id)
    }

    pub fn receipt_path(&self, task_id: &str, step: u32) -> PathBuf {
        self.task_receipts_dir(task_id).join(format!("step-{step}.json"))
    }

    pub fn snapshots_dir(&self) -> PathBuf {
        self.root.join("snapshots")
    }

    pub fn snapshot_manifest_path(&self, snapshot_id: &str) -> PathBuf {
        self.snapshots_dir().join(format!("{snapshot_id}.manifest.json"))
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.root.join("logs")
    }

    pub fn reviews_dir(&self) -> PathBuf {
        self.root.join("reviews")
    }

    pub fn spec_notes_dir(&self) -> PathBuf {
        self.root.join("spec_notes")
    }

    pub fn transcripts_dir(&self) -> PathBuf {
        self.root.join("transcripts")
    }

    /// Directories excluded from snapshot capture because they're
    /// operational state rather than workspace content (§4.G).
    pub fn operational_dir_names() -> &'static [&'static str] {
        &["state", "events", "receipts", "logs", "snapshots", "transcripts", "reviews", "spec_notes"]
    }

    pub fn ensure_all_dirs(&self) -> std::io::Result<()> {
        for dir in [
            self.state_dir(),
            self.intake_dir(),
            self.events_dir(),
            self.receipts_dir(),
            self.snapshots_dir(),
        ] {
            crate::atomic::ensure_dir(&dir)?;
        }
        Ok(())
    }
}

pub fn is_hidden(path: &Path) -> bool {
    path.file_name().and_then(|n| n.to_str()).map(|n| n.starts_with('.')).unwrap_or(false)
}
