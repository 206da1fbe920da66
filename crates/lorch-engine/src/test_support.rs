// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared test fixtures for this crate's sibling `*_tests.rs` modules:
//! temp-dir-backed ledger/run-state/receipt-store setup, and fake
//! `/bin/sh` agent subprocesses that speak the NDJSON protocol well
//! enough to drive [`crate::fleet::send_and_await_terminal`] without a
//! real agent binary.

#![cfg(test)]

use crate::activation::{ActivationTask, ApprovedIntake, DerivedTask};
use crate::fleet::{heartbeat_timeout, RunningAgent};
use chrono::Utc;
use lorch_core::{Ledger, ReceiptStore, RunStateStore, WorkspaceLayout};
use lorch_proto::AgentType;
use lorch_supervisor::{AgentSupervisor, AgentSupervisorConfig};
use std::collections::{HashMap, HashSet};

pub struct Harness {
    pub dir: tempfile::TempDir,
    pub layout: WorkspaceLayout,
    pub ledger: Ledger,
    pub run_state: RunStateStore,
}

impl Harness {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let layout = WorkspaceLayout::new(dir.path());
        layout.ensure_all_dirs().unwrap();
        let ledger = Ledger::open(&layout.ledger_path("run-1")).unwrap();
        let run_state = RunStateStore::create(
            &layout.run_state_path(),
            "run-1".into(),
            "snap-1".into(),
            Utc::now(),
        )
        .unwrap();
        Self { dir, layout, ledger, run_state }
    }

    pub fn receipts(&self) -> ReceiptStore<'_> {
        ReceiptStore::new(&self.layout)
    }
}

/// Spawns `/bin/sh -c script` wired up as a [`RunningAgent`] for `agent_type`.
/// The caller's script is responsible for reading and replying to whatever
/// commands the test sends it.
pub fn sh_agent(agent_type: AgentType, script: &str) -> RunningAgent {
    let supervisor = AgentSupervisor::new(AgentSupervisorConfig {
        agent_type,
        cmd: vec!["/bin/sh".into(), "-c".into(), script.into()],
        env: HashMap::new(),
    });
    let channels = supervisor.start().unwrap();
    RunningAgent { supervisor, channels, heartbeat_timeout: heartbeat_timeout(None) }
}

/// A `sh` one-liner that reads exactly one command line off stdin, pulls
/// its `correlation_id` out with `sed` (the second field `serde_json`
/// emits for every `Command`/`Event`, so the pattern is stable), and
/// replies with one event line built from `event_json_fmt` — a
/// `printf`-style format string with a single `%s` for the correlation id
/// — before draining the rest of stdin so the process exits cleanly on
/// EOF.
pub fn one_shot_reply_script(event_json_fmt: &str) -> String {
    format!(
        r#"IFS= read -r line
cid=$(printf '%s' "$line" | sed -n 's/.*"correlation_id":"\([^"]*\)".*/\1/p')
printf '{event_json_fmt}\n' "$cid"
cat > /dev/null
"#
    )
}

/// A `sh` loop that replies once per line read from stdin, each reply
/// drawn in order from `replies` (each a `printf` format string with one
/// `%s` for the correlation id). Used where one agent must answer more
/// than one command across a test (e.g. a review loop's second round).
pub fn sequential_reply_script(replies: &[&str]) -> String {
    let mut body = String::from("i=0\nwhile IFS= read -r line; do\n  i=$((i+1))\n  cid=$(printf '%s' \"$line\" | sed -n 's/.*\"correlation_id\":\"\\([^\"]*\\)\".*/\\1/p')\n  case $i in\n");
    for (idx, reply) in replies.iter().enumerate() {
        body.push_str(&format!("    {})\n      printf '{reply}\\n' \"$cid\"\n      ;;\n", idx + 1));
    }
    body.push_str("  esac\ndone\n");
    body
}

pub fn sample_activation_task(id: &str, plan_path: &std::path::Path) -> ActivationTask {
    ActivationTask {
        id: id.to_string(),
        title: format!("task {id}"),
        files: vec!["src/lib.rs".to_string()],
        instruction: "do the thing".to_string(),
        approved_plan: plan_path.file_name().unwrap().to_string_lossy().into_owned(),
        clarifications: Vec::new(),
        conflict_resolutions: Vec::new(),
        snapshot_id: "snap-1".to_string(),
        run_id: "run-1".to_string(),
        intake_correlation_id: Some("corr-intake-abc".to_string()),
    }
}

pub fn sample_approved_intake(workspace_root: &std::path::Path) -> ApprovedIntake {
    let mut derived_tasks = HashMap::new();
    derived_tasks.insert(
        "t1".to_string(),
        DerivedTask { title: "Implement feature".to_string(), files: vec!["src/lib.rs".to_string()] },
    );
    ApprovedIntake {
        run_id: "run-1".to_string(),
        snapshot_id: "snap-1".to_string(),
        workspace_root: workspace_root.to_path_buf(),
        instruction: "do the thing".to_string(),
        approved_plan: "plan.md".to_string(),
        approved_task_ids: vec!["t1".to_string()],
        derived_tasks,
        clarifications: Vec::new(),
        conflict_resolutions: Vec::new(),
        decision_status: "approved".to_string(),
        intake_correlation_id: Some("corr-intake-abc".to_string()),
        already_activated_task_ids: HashSet::new(),
    }
}
