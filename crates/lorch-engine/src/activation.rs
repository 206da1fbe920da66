// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Task activation (§4.I): maps an approved intake outcome into a sequence
//! of concrete task records, enforcing idempotence against the
//! already-activated set, and builds the first `implement` command for
//! each.

use crate::error::{EngineError, Result};
use chrono::{DateTime, Utc};
use lorch_core::wspath::validate_workspace_relative;
use lorch_proto::{idempotency_key, Action, AgentRef, Command, ExpectedOutput, Inputs, Retry, Version};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

/// A task derived by the orchestration agent during intake, keyed by id in
/// [`ApprovedIntake::derived_tasks`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DerivedTask {
    pub title: String,
    pub files: Vec<String>,
}

/// The snapshot of a completed, approved intake round, ready to be turned
/// into concrete scheduler work.
#[derive(Debug, Clone)]
pub struct ApprovedIntake {
    pub run_id: String,
    pub snapshot_id: String,
    pub workspace_root: PathBuf,
    pub instruction: String,
    pub approved_plan: String,
    pub approved_task_ids: Vec<String>,
    pub derived_tasks: HashMap<String, DerivedTask>,
    pub clarifications: Vec<String>,
    pub conflict_resolutions: Vec<String>,
    pub decision_status: String,
    pub intake_correlation_id: Option<String>,
    pub already_activated_task_ids: HashSet<String>,
}

/// The durable form of a concluded, approved intake round, written to
/// `state/intake/<run_id>.json` / `state/intake/latest.json` (§6) so a
/// later `resume` can re-derive [`ApprovedIntake`] without re-running
/// intake: [`RunState`](lorch_core::RunState) only tracks the one task
/// currently in flight plus the activated-task set, not the full approved
/// plan, so this is the one place that full plan survives a restart.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntakeSnapshot {
    pub run_id: String,
    pub snapshot_id: String,
    pub workspace_root: String,
    pub instruction: String,
    pub approved_plan: String,
    pub approved_task_ids: Vec<String>,
    pub derived_tasks: HashMap<String, DerivedTask>,
    pub clarifications: Vec<String>,
    pub conflict_resolutions: Vec<String>,
    pub decision_status: String,
    pub intake_correlation_id: Option<String>,
}

impl IntakeSnapshot {
    /// Reconstructs [`ApprovedIntake`] from a persisted snapshot, folding
    /// in whatever the run state has already activated so re-running
    /// [`activate`] against it only yields the remaining tasks.
    pub fn into_approved(self, already_activated_task_ids: HashSet<String>) -> ApprovedIntake {
        ApprovedIntake {
            run_id: self.run_id,
            snapshot_id: self.snapshot_id,
            workspace_root: PathBuf::from(self.workspace_root),
            instruction: self.instruction,
            approved_plan: self.approved_plan,
            approved_task_ids: self.approved_task_ids,
            derived_tasks: self.derived_tasks,
            clarifications: self.clarifications,
            conflict_resolutions: self.conflict_resolutions,
            decision_status: self.decision_status,
            intake_correlation_id: self.intake_correlation_id,
            already_activated_task_ids,
        }
    }
}

/// One concrete unit of scheduler work, carrying everything the pipeline's
/// first command needs plus the intake lineage receipts want to record.
#[derive(Debug, Clone)]
pub struct ActivationTask {
    pub id: String,
    pub title: String,
    pub files: Vec<String>,
    pub instruction: String,
    pub approved_plan: String,
    pub clarifications: Vec<String>,
    pub conflict_resolutions: Vec<String>,
    pub snapshot_id: String,
    pub run_id: String,
    pub intake_correlation_id: Option<String>,
}

/// Produces the ordered activation list for an approved intake outcome.
/// Preconditions are checked in the order listed in §4.I; the first
/// failure wins. An empty `approved_task_ids` is not an error — it
/// returns an empty list.
pub fn activate(intake: &ApprovedIntake) -> Result<Vec<ActivationTask>> {
    if intake.decision_status != "approved" {
        return Err(EngineError::Precondition(format!(
            "intake decision must be approved, got {:?}",
            intake.decision_status
        )));
    }
    if intake.workspace_root.as_os_str().is_empty() {
        return Err(EngineError::Precondition("workspace_root must not be empty".into()));
    }
    if intake.approved_plan.trim().is_empty() {
        return Err(EngineError::Precondition("approved_plan must be present".into()));
    }
    let resolved_plan =
        validate_workspace_relative(&intake.workspace_root, &intake.approved_plan)?;
    if !resolved_plan.exists() {
        return Err(EngineError::Precondition(format!(
            "approved_plan does not exist at {}",
            resolved_plan.display()
        )));
    }
    if intake.instruction.trim().is_empty() {
        return Err(EngineError::Precondition("instruction must not be empty".into()));
    }

    if intake.approved_task_ids.is_empty() {
        return Ok(Vec::new());
    }

    let mut tasks = Vec::with_capacity(intake.approved_task_ids.len());
    for task_id in &intake.approved_task_ids {
        if intake.already_activated_task_ids.contains(task_id) {
            continue;
        }
        let derived = intake.derived_tasks.get(task_id).ok_or_else(|| {
            EngineError::Precondition(format!("approved task {task_id} missing from derived tasks"))
        })?;
        if derived.title.trim().is_empty() {
            return Err(EngineError::Precondition(format!("derived task {task_id} has an empty title")));
        }
        tasks.push(ActivationTask {
            id: task_id.clone(),
            title: derived.title.clone(),
            files: derived.files.clone(),
            instruction: intake.instruction.clone(),
            approved_plan: intake.approved_plan.clone(),
            clarifications: intake.clarifications.clone(),
            conflict_resolutions: intake.conflict_resolutions.clone(),
            snapshot_id: intake.snapshot_id.clone(),
            run_id: intake.run_id.clone(),
            intake_correlation_id: intake.intake_correlation_id.clone(),
        });
    }
    Ok(tasks)
}

/// Builds the first `implement` command in a task's pipeline (§4.I): the
/// idempotency key is computed from the task's own content, so re-running
/// activation with identical inputs reproduces the byte-identical key.
pub fn build_implement_command(
    task: &ActivationTask,
    default_deadline_secs: u64,
    now: DateTime<Utc>,
) -> Command {
    let mut inputs = Inputs::new();
    inputs.insert("instruction".into(), json!(task.instruction));
    inputs.insert("task_title".into(), json!(task.title));
    inputs.insert("task_files".into(), json!(task.files));
    inputs.insert("goal".into(), json!(task.title));
    inputs.insert("approved_plan".into(), json!(task.approved_plan));
    inputs.insert("clarifications".into(), json!(task.clarifications));
    inputs.insert("conflict_resolutions".into(), json!(task.conflict_resolutions));
    if let Some(intake_corr) = &task.intake_correlation_id {
        inputs.insert("intake_correlation_id".into(), json!(intake_corr));
    }

    let expected_outputs: Vec<ExpectedOutput> = task
        .files
        .iter()
        .map(|path| ExpectedOutput { path: path.clone(), description: String::new(), required: true })
        .collect();

    let correlation_id =
        lorch_core::ids::activation_correlation_id(task.intake_correlation_id.as_deref(), &task.id);
    let key = idempotency_key(Action::Implement, &task.id, &task.snapshot_id, &inputs, &expected_outputs);

    Command {
        message_id: lorch_core::ids::new_message_id(),
        correlation_id,
        task_id: task.id.clone(),
        to: AgentRef { agent_type: Action::Implement.target_agent_type(), agent_id: String::new() },
        action: Action::Implement,
        inputs,
        expected_outputs,
        version: Version { snapshot_id: task.snapshot_id.clone() },
        deadline: now + chrono::Duration::seconds(default_deadline_secs as i64),
        retry: Retry::default(),
        priority: 0,
        idempotency_key: key,
    }
}

#[cfg(test)]
#[path = "activation_tests.rs"]
mod tests;
