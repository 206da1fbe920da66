// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `lorch resume --run <id>`: re-derives the in-flight task's position
//! from the ledger alone (§4.K) and drives it to completion, then — if
//! intake produced more approved tasks than have been activated yet —
//! continues activating and scheduling the remainder in approval order.

use super::context;
use crate::exit_error::ExitError;
use crate::output::{format_or_json, OutputFormat};
use chrono::Utc;
use lorch_core::{ids, Ledger, ReceiptStore, RunStateStore, RunStatus};
use lorch_engine::{activate, execute, resume as resume_task, AgentFleet, ApprovedIntake, EngineError, IntakeSnapshot};
use std::collections::HashSet;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

const DEFAULT_DEADLINE_SECS: u64 = 1800;

pub struct ResumeArgs {
    pub config: Option<PathBuf>,
    pub run: String,
    pub format: OutputFormat,
}

pub async fn handle(args: ResumeArgs) -> Result<(), ExitError> {
    let ctx = context::load(args.config.as_deref())?;

    let run_state_path = ctx.layout.run_state_path();
    if !RunStateStore::exists(&run_state_path) {
        return Err(ExitError::run_failed(format!(
            "no run state found at {} — nothing to resume",
            run_state_path.display()
        )));
    }
    let run_state = RunStateStore::load(&run_state_path)?;
    let existing = run_state.snapshot();
    if existing.run_id != args.run {
        return Err(ExitError::run_failed(format!(
            "run state at {} belongs to run {:?}, not {:?}",
            run_state_path.display(),
            existing.run_id,
            args.run
        )));
    }
    if existing.status == RunStatus::Completed {
        format_or_json(args.format, &existing, || {
            println!("run {} already completed", existing.run_id);
        })
        .map_err(|e| ExitError::run_failed(e.to_string()))?;
        return Ok(());
    }
    if existing.status == RunStatus::Aborted {
        return Err(ExitError::run_failed(format!("run {} is aborted and cannot be resumed", existing.run_id)));
    }

    let cancel = CancellationToken::new();
    super::run::install_ctrl_c_handler(cancel.clone());

    let mut fleet = AgentFleet::start(&ctx.config)?;

    let outcome = resume_inner(&ctx, &run_state, &mut fleet, &args.run, &cancel).await;

    fleet.stop_all().await;

    let now = Utc::now();
    match &outcome {
        Ok(()) => run_state.mark_completed(now)?,
        Err(EngineError::Cancelled) => {
            run_state.mark_aborted(now).ok();
        }
        Err(_) => {
            run_state.mark_failed(now).ok();
        }
    }

    let snap = run_state.snapshot();
    format_or_json(args.format, &snap, || {
        println!("run {} finished as {:?}", snap.run_id, snap.status);
        println!("  stage: {:?}", snap.current_stage);
        println!("  activated tasks: {}", snap.activated_task_ids.join(", "));
    })
    .map_err(|e| ExitError::run_failed(e.to_string()))?;

    outcome?;
    Ok(())
}

async fn resume_inner(
    ctx: &context::RunContext,
    run_state: &RunStateStore,
    fleet: &mut AgentFleet,
    run_id: &str,
    cancel: &CancellationToken,
) -> lorch_engine::Result<()> {
    let ledger = Ledger::open(&ctx.layout.ledger_path(run_id))?;
    let receipts = ReceiptStore::new(&ctx.layout);

    let snap = run_state.snapshot();
    let task_id = snap.task_id.clone().ok_or_else(|| {
        EngineError::Precondition(
            "run has no task in flight yet (still in the intake stage); intake rounds cannot be resumed".into(),
        )
    })?;
    let inputs = snap.current_task_inputs.clone().ok_or_else(|| {
        EngineError::Precondition(format!("run state carries no recorded inputs for task {task_id}"))
    })?;

    let current_task = lorch_engine::ActivationTask {
        id: task_id.clone(),
        title: input_str(&inputs, "task_title").unwrap_or_else(|| task_id.clone()),
        files: input_str_list(&inputs, "task_files"),
        instruction: input_str(&inputs, "instruction").unwrap_or_default(),
        approved_plan: input_str(&inputs, "approved_plan").unwrap_or_default(),
        clarifications: input_str_list(&inputs, "clarifications"),
        conflict_resolutions: input_str_list(&inputs, "conflict_resolutions"),
        snapshot_id: snap.snapshot_id.clone(),
        run_id: run_id.to_string(),
        intake_correlation_id: input_str(&inputs, "intake_correlation_id")
            .or_else(|| ids::intake_correlation_from_pipe(snap.correlation_id.as_deref().unwrap_or_default()).map(str::to_string)),
    };

    if !run_state.is_task_activated(&task_id) {
        resume_task(&ledger, run_state, &receipts, fleet, &current_task, DEFAULT_DEADLINE_SECS, cancel).await?;
    }

    let snapshot_path = ctx.layout.intake_snapshot_path(run_id);
    if snapshot_path.exists() {
        let bytes = std::fs::read(&snapshot_path)
            .map_err(|e| EngineError::Precondition(format!("cannot read intake snapshot: {e}")))?;
        let persisted: IntakeSnapshot = serde_json::from_slice(&bytes)
            .map_err(|e| EngineError::Precondition(format!("invalid intake snapshot: {e}")))?;

        let already_activated: HashSet<String> = run_state.snapshot().activated_task_ids.into_iter().collect();
        let approved: ApprovedIntake = persisted.into_approved(already_activated);
        let remaining = activate(&approved)?;
        for task in &remaining {
            execute(&ledger, run_state, &receipts, fleet, task, DEFAULT_DEADLINE_SECS, cancel).await?;
        }
    }

    Ok(())
}

fn input_str(inputs: &lorch_proto::Inputs, key: &str) -> Option<String> {
    inputs.get(key).and_then(|v| v.as_str()).map(str::to_string)
}

fn input_str_list(inputs: &lorch_proto::Inputs, key: &str) -> Vec<String> {
    inputs
        .get(key)
        .and_then(|v| v.as_array())
        .map(|arr| arr.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
        .unwrap_or_default()
}
