// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The receipt store (§4.E): one record per completed command in a task,
//! written atomically to `receipts/<task_id>/step-<n>.json` with `n` a
//! monotonically increasing, contiguous, per-task step counter.

use crate::atomic::write_atomic_json;
use crate::error::Result;
use crate::ids::intake_correlation_from_pipe;
use crate::layout::WorkspaceLayout;
use chrono::{DateTime, Utc};
use lorch_proto::{Action, Artifact, Command};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Receipt {
    pub task_id: String,
    pub step: u32,
    pub action: Action,
    pub idempotency_key: String,
    pub snapshot_id: String,
    pub command_message_id: String,
    pub correlation_id: String,
    #[serde(default)]
    pub artifacts: Vec<Artifact>,
    #[serde(default)]
    pub events: Vec<String>,
    pub created_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instruction: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approved_plan: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intake_correlation_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clarifications: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conflict_resolutions: Option<Vec<String>>,
}

fn input_str(command: &Command, key: &str) -> Option<String> {
    command.inputs.get(key).and_then(|v| v.as_str()).map(str::to_string)
}

fn input_str_list(command: &Command, key: &str) -> Option<Vec<String>> {
    command.inputs.get(key).and_then(|v| v.as_array()).map(|arr| {
        arr.iter().filter_map(|v| v.as_str().map(str::to_string)).collect()
    })
}

impl Receipt {
    /// Builds a receipt from a completed command and the ids of the
    /// events it produced. Intake lineage is read from `inputs` first;
    /// `intake_correlation_id` falls back to parsing the command's own
    /// correlation id via the `"<intake-corr>|<activation-corr>"`
    /// convention when `inputs` carries none (§4.E).
    pub fn from_command(
        step: u32,
        command: &Command,
        event_ids: Vec<String>,
        artifacts: Vec<Artifact>,
        created_at: DateTime<Utc>,
    ) -> Self {
        let intake_correlation_id = input_str(command, "intake_correlation_id")
            .or_else(|| intake_correlation_from_pipe(&command.correlation_id).map(str::to_string));

        Self {
            task_id: command.task_id.clone(),
            step,
            action: command.action,
            idempotency_key: command.idempotency_key.clone(),
            snapshot_id: command.version.snapshot_id.clone(),
            command_message_id: command.message_id.clone(),
            correlation_id: command.correlation_id.clone(),
            artifacts,
            events: event_ids,
            created_at,
            task_title: input_str(command, "task_title"),
            instruction: input_str(command, "instruction"),
            approved_plan: input_str(command, "approved_plan"),
            intake_correlation_id,
            clarifications: input_str_list(command, "clarifications"),
            conflict_resolutions: input_str_list(command, "conflict_resolutions"),
        }
    }
}

pub struct ReceiptStore<'a> {
    layout: &'a WorkspaceLayout,
}

impl<'a> ReceiptStore<'a> {
    pub fn new(layout: &'a WorkspaceLayout) -> Self {
        Self { layout }
    }

    /// The next step number for `task_id`: one more than the highest
    /// existing `step-<n>.json`, or 1 if none exist yet.
    pub fn next_step(&self, task_id: &str) -> Result<u32> {
        let dir = self.layout.task_receipts_dir(task_id);
        if !dir.exists() {
            return Ok(1);
        }
        let mut max_step = 0u32;
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if let Some(n) = name.strip_prefix("step-").and_then(|s| s.strip_suffix(".json")) {
                if let Ok(n) = n.parse::<u32>() {
                    max_step = max_step.max(n);
                }
            }
        }
        Ok(max_step + 1)
    }

    pub fn write(&self, receipt: &Receipt) -> Result<()> {
        let dir = self.layout.task_receipts_dir(&receipt.task_id);
        crate::atomic::ensure_dir(&dir)?;
        let path = self.layout.receipt_path(&receipt.task_id, receipt.step);
        write_atomic_json(&path, receipt)?;
        Ok(())
    }

    pub fn read(&self, task_id: &str, step: u32) -> Result<Receipt> {
        let path = self.layout.receipt_path(task_id, step);
        let bytes = std::fs::read(path)?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// All receipts for `task_id`, ordered by step.
    pub fn list(&self, task_id: &str) -> Result<Vec<Receipt>> {
        let dir = self.layout.task_receipts_dir(task_id);
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut receipts = Vec::new();
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            let bytes = std::fs::read(entry.path())?;
            receipts.push(serde_json::from_slice::<Receipt>(&bytes)?);
        }
        receipts.sort_by_key(|r| r.step);
        Ok(receipts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lorch_proto::{AgentRef, AgentType, ExpectedOutput, Inputs, Retry, Version};
    use serde_json::json;

    fn command_with_lineage() -> Command {
        let mut inputs = Inputs::new();
        inputs.insert("task_title".into(), json!("Implement feature"));
        inputs.insert("instruction".into(), json!("Implement feature X"));
        inputs.insert("approved_plan".into(), json!("specs/plan.md"));
        inputs.insert("clarifications".into(), json!(["Focus on API"]));
        Command {
            message_id: "msg-1".into(),
            correlation_id: "corr-intake-abc|activate-xyz".into(),
            task_id: "t1".into(),
            to: AgentRef { agent_type: AgentType::Builder, agent_id: String::new() },
            action: Action::Implement,
            inputs,
            expected_outputs: vec![ExpectedOutput { path: "src/foo.rs".into(), description: "".into(), required: true }],
            version: Version { snapshot_id: "snap-1".into() },
            deadline: Utc::now(),
            retry: Retry::default(),
            priority: 0,
            idempotency_key: "ik:abc".into(),
        }
    }

    #[test]
    fn step_counter_is_monotonic_and_contiguous() {
        let dir = tempfile::tempdir().unwrap();
        let layout = WorkspaceLayout::new(dir.path());
        let store = ReceiptStore::new(&layout);
        assert_eq!(store.next_step("t1").unwrap(), 1);

        let cmd = command_with_lineage();
        let r1 = Receipt::from_command(1, &cmd, vec!["evt-1".into()], vec![], Utc::now());
        store.write(&r1).unwrap();
        assert_eq!(store.next_step("t1").unwrap(), 2);

        let r2 = Receipt::from_command(2, &cmd, vec!["evt-2".into()], vec![], Utc::now());
        store.write(&r2).unwrap();
        assert_eq!(store.next_step("t1").unwrap(), 3);

        let listed = store.list("t1").unwrap();
        assert_eq!(listed.iter().map(|r| r.step).collect::<Vec<_>>(), vec![1, 2]);
    }

    #[test]
    fn lineage_fields_extracted_from_inputs() {
        let cmd = command_with_lineage();
        let receipt = Receipt::from_command(1, &cmd, vec![], vec![], Utc::now());
        assert_eq!(receipt.task_title.as_deref(), Some("Implement feature"));
        assert_eq!(receipt.approved_plan.as_deref(), Some("specs/plan.md"));
        assert_eq!(receipt.clarifications, Some(vec!["Focus on API".to_string()]));
        // inputs carry no explicit intake_correlation_id: falls back to the
        // correlation id's pipe-delimited convention.
        assert_eq!(receipt.intake_correlation_id.as_deref(), Some("corr-intake-abc"));
    }

    #[test]
    fn lineage_absent_when_command_has_no_intake_origin() {
        let mut cmd = command_with_lineage();
        cmd.correlation_id = "corr-activate-t1-xyz".into();
        cmd.inputs = Inputs::new();
        let receipt = Receipt::from_command(1, &cmd, vec![], vec![], Utc::now());
        assert!(receipt.task_title.is_none());
        assert!(receipt.intake_correlation_id.is_none());
    }
}
