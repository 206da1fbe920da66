// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The run state store (§4.D): a small mutable JSON document describing
//! where a run is in its lifecycle, rewritten atomically on every
//! mutation. Every method here follows "mutate in memory, then persist" —
//! callers must assume a crash can land between any two calls, so every
//! mutation leaves the on-disk document internally consistent on its own.

use crate::atomic::write_atomic_json;
use crate::error::Result;
use chrono::{DateTime, Utc};
use lorch_proto::{AgentType, Inputs};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
    Aborted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Intake,
    Implement,
    Review,
    SpecMaintain,
    Complete,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PendingIntakeCommand {
    pub action: String,
    pub inputs: Inputs,
    pub idempotency_key: String,
    pub correlation_id: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IntakeState {
    pub instruction: String,
    #[serde(default)]
    pub base_inputs: Inputs,
    #[serde(default)]
    pub last_clarifications: Vec<String>,
    #[serde(default)]
    pub conflict_resolutions: Vec<String>,
    #[serde(default)]
    pub last_decision: Option<String>,
    #[serde(default)]
    pub pending: Option<PendingIntakeCommand>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunState {
    pub run_id: String,
    pub status: RunStatus,
    #[serde(default)]
    pub task_id: Option<String>,
    #[serde(default)]
    pub correlation_id: Option<String>,
    pub snapshot_id: String,
    pub current_stage: Stage,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_command_id: Option<String>,
    #[serde(default)]
    pub last_event_id: Option<String>,
    #[serde(default)]
    pub terminal_events: HashMap<String, String>,
    #[serde(default)]
    pub intake: Option<IntakeState>,
    #[serde(default)]
    pub activated_task_ids: Vec<String>,
    #[serde(default)]
    pub current_task_inputs: Option<Inputs>,
}

impl RunState {
    pub fn new(run_id: String, snapshot_id: String, started_at: DateTime<Utc>) -> Self {
        Self {
            run_id,
            status: RunStatus::Running,
            task_id: None,
            correlation_id: None,
            snapshot_id,
            current_stage: Stage::Intake,
            started_at,
            completed_at: None,
            last_command_id: None,
            last_event_id: None,
            terminal_events: HashMap::new(),
            intake: None,
            activated_task_ids: Vec::new(),
            current_task_inputs: None,
        }
    }
}

/// A durable, atomically-rewritten handle on one run's state document.
pub struct RunStateStore {
    path: PathBuf,
    state: Mutex<RunState>,
}

impl RunStateStore {
    pub fn create(path: &Path, run_id: String, snapshot_id: String, started_at: DateTime<Utc>) -> Result<Self> {
        let state = RunState::new(run_id, snapshot_id, started_at);
        let store = Self { path: path.to_path_buf(), state: Mutex::new(state) };
        store.save_locked(&store.state.lock())?;
        Ok(store)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        let state: RunState = serde_json::from_slice(&bytes)?;
        Ok(Self { path: path.to_path_buf(), state: Mutex::new(state) })
    }

    pub fn exists(path: &Path) -> bool {
        path.exists()
    }

    pub fn snapshot(&self) -> RunState {
        self.state.lock().clone()
    }

    fn save_locked(&self, state: &RunState) -> Result<()> {
        if let Some(dir) = self.path.parent() {
            crate::atomic::ensure_dir(dir)?;
        }
        write_atomic_json(&self.path, state)?;
        Ok(())
    }

    fn mutate(&self, f: impl FnOnce(&mut RunState)) -> Result<()> {
        let mut guard = self.state.lock();
        f(&mut guard);
        self.save_locked(&guard)
    }

    pub fn record_command(&self, command_id: &str, correlation_id: &str) -> Result<()> {
        self.mutate(|s| {
            s.last_command_id = Some(command_id.to_string());
            s.correlation_id = Some(correlation_id.to_string());
        })
    }

    pub fn record_event(&self, event_id: &str) -> Result<()> {
        self.mutate(|s| s.last_event_id = Some(event_id.to_string()))
    }

    pub fn record_terminal(&self, agent_type: AgentType, event_id: &str) -> Result<()> {
        self.mutate(|s| {
            s.terminal_events.insert(agent_type.as_str().to_string(), event_id.to_string());
        })
    }

    pub fn set_stage(&self, stage: Stage) -> Result<()> {
        self.mutate(|s| s.current_stage = stage)
    }

    pub fn set_task(&self, task_id: &str) -> Result<()> {
        self.mutate(|s| s.task_id = Some(task_id.to_string()))
    }

    pub fn set_current_task_inputs(&self, inputs: Inputs) -> Result<()> {
        self.mutate(|s| s.current_task_inputs = Some(inputs))
    }

    pub fn mark_completed(&self, now: DateTime<Utc>) -> Result<()> {
        self.mutate(|s| {
            s.status = RunStatus::Completed;
            s.current_stage = Stage::Complete;
            s.completed_at = Some(now);
        })
    }

    pub fn mark_failed(&self, now: DateTime<Utc>) -> Result<()> {
        self.mutate(|s| {
            s.status = RunStatus::Failed;
            s.completed_at = Some(now);
        })
    }

    pub fn mark_aborted(&self, now: DateTime<Utc>) -> Result<()> {
        self.mutate(|s| {
            s.status = RunStatus::Aborted;
            s.completed_at = Some(now);
        })
    }

    pub fn init_intake(&self, instruction: &str, base_inputs: Inputs) -> Result<()> {
        self.mutate(|s| {
            s.intake = Some(IntakeState {
                instruction: instruction.to_string(),
                base_inputs,
                last_clarifications: Vec::new(),
                conflict_resolutions: Vec::new(),
                last_decision: None,
                pending: None,
            });
        })
    }

    pub fn set_clarifications(&self, clarifications: Vec<String>) -> Result<()> {
        self.mutate(|s| {
            if let Some(intake) = s.intake.as_mut() {
                intake.last_clarifications = clarifications;
            }
        })
    }

    pub fn set_conflict_resolutions(&self, resolutions: Vec<String>) -> Result<()> {
        self.mutate(|s| {
            if let Some(intake) = s.intake.as_mut() {
                intake.conflict_resolutions = resolutions;
            }
        })
    }

    pub fn record_intake_command(
        &self,
        action: &str,
        inputs: Inputs,
        idempotency_key: &str,
        correlation_id: &str,
    ) -> Result<()> {
        self.mutate(|s| {
            let intake = s.intake.get_or_insert_with(IntakeState::default);
            intake.pending = Some(PendingIntakeCommand {
                action: action.to_string(),
                inputs,
                idempotency_key: idempotency_key.to_string(),
                correlation_id: correlation_id.to_string(),
            });
        })
    }

    pub fn record_intake_decision(&self, decision: &str) -> Result<()> {
        self.mutate(|s| {
            let intake = s.intake.get_or_insert_with(IntakeState::default);
            intake.last_decision = Some(decision.to_string());
            intake.pending = None;
        })
    }

    pub fn mark_task_activated(&self, task_id: &str) -> Result<()> {
        self.mutate(|s| {
            if !s.activated_task_ids.iter().any(|id| id == task_id) {
                s.activated_task_ids.push(task_id.to_string());
            }
        })
    }

    pub fn is_task_activated(&self, task_id: &str) -> bool {
        self.state.lock().activated_task_ids.iter().any(|id| id == task_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(dir: &tempfile::TempDir) -> RunStateStore {
        RunStateStore::create(&dir.path().join("run.json"), "run-1".into(), "snap-1".into(), Utc::now()).unwrap()
    }

    #[test]
    fn create_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.json");
        {
            let s = RunStateStore::create(&path, "run-1".into(), "snap-1".into(), Utc::now()).unwrap();
            s.set_stage(Stage::Implement).unwrap();
            s.mark_task_activated("t1").unwrap();
        }
        let loaded = RunStateStore::load(&path).unwrap();
        let snap = loaded.snapshot();
        assert_eq!(snap.current_stage, Stage::Implement);
        assert!(loaded.is_task_activated("t1"));
    }

    #[test]
    fn mark_task_activated_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let s = store(&dir);
        s.mark_task_activated("t1").unwrap();
        s.mark_task_activated("t1").unwrap();
        assert_eq!(s.snapshot().activated_task_ids, vec!["t1".to_string()]);
    }

    #[test]
    fn intake_command_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.json");
        let s = RunStateStore::create(&path, "run-1".into(), "snap-1".into(), Utc::now()).unwrap();
        s.init_intake("do the thing", Inputs::new()).unwrap();
        s.record_intake_command("intake", Inputs::new(), "ik:abc", "corr-1").unwrap();

        let loaded = RunStateStore::load(&path).unwrap();
        let pending = loaded.snapshot().intake.unwrap().pending.unwrap();
        assert_eq!(pending.idempotency_key, "ik:abc");
        assert_eq!(pending.correlation_id, "corr-1");
    }

    #[test]
    fn record_intake_decision_clears_pending() {
        let dir = tempfile::tempdir().unwrap();
        let s = store(&dir);
        s.init_intake("x", Inputs::new()).unwrap();
        s.record_intake_command("intake", Inputs::new(), "ik:abc", "corr-1").unwrap();
        s.record_intake_decision("approved").unwrap();
        let intake = s.snapshot().intake.unwrap();
        assert_eq!(intake.last_decision.as_deref(), Some("approved"));
        assert!(intake.pending.is_none());
    }
}
