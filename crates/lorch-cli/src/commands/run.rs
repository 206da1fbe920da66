// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `lorch run`: either a pre-declared `--task` (intake skipped entirely)
//! or a natural-language instruction driven through the intake negotiation
//! engine (§4.H), then the result of either path through task activation
//! (§4.I) and the scheduler (§4.J) in approval order.

use super::context;
use crate::exit_error::ExitError;
use crate::output::{format_or_json, OutputFormat};
use crate::prompter::StdioPrompter;
use chrono::Utc;
use lorch_core::{ids, snapshot, Ledger, ReceiptStore, RunStateStore};
use lorch_engine::{activate, execute, run_intake, AgentFleet, ApprovedIntake, EngineError, IntakeSnapshot};
use std::collections::HashSet;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

/// Per-action deadline used for every command this invocation sends. §9
/// Open Question 1 leaves the interplay between this and
/// `agents.*.timeouts_s` unresolved upstream; this build resolves it by
/// having the CLI supply one run-wide default and letting each command's
/// own `deadline` field be the thing every agent actually observes
/// (DESIGN.md records this as a decision, not an oversight).
const DEFAULT_DEADLINE_SECS: u64 = 1800;

pub struct RunArgs {
    pub config: Option<PathBuf>,
    pub instruction: Option<String>,
    pub task: Option<String>,
    pub files: Vec<String>,
    pub plan: String,
    pub format: OutputFormat,
}

/// Rejects a malformed invocation before a single agent is spawned: no
/// subprocess, workspace snapshot, or run-state file should be paid for
/// just to discover the arguments don't make sense.
fn validate_args(args: &RunArgs) -> Result<(), ExitError> {
    if args.task.is_some() && args.instruction.is_none() {
        return Err(ExitError::configuration("--task requires an instruction argument as well"));
    }
    if args.task.is_none() && args.instruction.is_none() {
        return Err(ExitError::configuration("an instruction or --task is required"));
    }
    Ok(())
}

pub async fn handle(args: RunArgs) -> Result<(), ExitError> {
    let ctx = context::load(args.config.as_deref())?;
    validate_args(&args)?;

    let manifest = snapshot::capture(&ctx.workspace_root)?;
    manifest.save(&ctx.layout.snapshot_manifest_path(&manifest.snapshot_id))?;

    let run_id = ids::new_run_id();
    let run_state = RunStateStore::create(
        &ctx.layout.run_state_path(),
        run_id.clone(),
        manifest.snapshot_id.clone(),
        Utc::now(),
    )?;

    let cancel = CancellationToken::new();
    install_ctrl_c_handler(cancel.clone());

    let mut fleet = AgentFleet::start(&ctx.config)?;

    let outcome = run_tasks(
        &ctx.workspace_root,
        &ctx.layout,
        &run_state,
        &mut fleet,
        &run_id,
        &manifest.snapshot_id,
        &args,
        &cancel,
    )
    .await;

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

#[allow(clippy::too_many_arguments)]
async fn run_tasks(
    workspace_root: &std::path::Path,
    layout: &lorch_core::WorkspaceLayout,
    run_state: &RunStateStore,
    fleet: &mut AgentFleet,
    run_id: &str,
    snapshot_id: &str,
    args: &RunArgs,
    cancel: &CancellationToken,
) -> lorch_engine::Result<()> {
    let tasks = if let Some(task_id) = &args.task {
        let instruction = args.instruction.clone().ok_or_else(|| {
            EngineError::Precondition("--task requires an instruction argument as well".into())
        })?;
        vec![lorch_engine::ActivationTask {
            id: task_id.clone(),
            title: instruction.clone(),
            files: args.files.clone(),
            instruction,
            approved_plan: args.plan.clone(),
            clarifications: Vec::new(),
            conflict_resolutions: Vec::new(),
            snapshot_id: snapshot_id.to_string(),
            run_id: run_id.to_string(),
            intake_correlation_id: None,
        }]
    } else {
        let instruction = args
            .instruction
            .clone()
            .ok_or_else(|| EngineError::Precondition("an instruction or --task is required".into()))?;
        run_intake_and_activate(workspace_root, layout, run_state, fleet, run_id, snapshot_id, &instruction, cancel)
            .await?
    };

    let ledger = Ledger::open(&layout.ledger_path(run_id))?;
    let receipts = ReceiptStore::new(layout);
    for task in &tasks {
        execute(&ledger, run_state, &receipts, fleet, task, DEFAULT_DEADLINE_SECS, cancel).await?;
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn run_intake_and_activate(
    workspace_root: &std::path::Path,
    layout: &lorch_core::WorkspaceLayout,
    run_state: &RunStateStore,
    fleet: &mut AgentFleet,
    run_id: &str,
    snapshot_id: &str,
    instruction: &str,
    cancel: &CancellationToken,
) -> lorch_engine::Result<Vec<lorch_engine::ActivationTask>> {
    let orchestration = fleet.agent_for(lorch_proto::AgentType::Orchestration).ok_or_else(|| {
        EngineError::Precondition(
            "natural-language intake requires agents.orchestration to be configured and enabled".into(),
        )
    })?;

    let intake_ledger = Ledger::open(&layout.intake_ledger_path(run_id))?;
    let mut prompter = StdioPrompter;
    let outcome = run_intake(
        &intake_ledger,
        run_state,
        orchestration,
        "intake",
        snapshot_id,
        instruction,
        DEFAULT_DEADLINE_SECS,
        &mut prompter,
        cancel,
    )
    .await?;

    if outcome.decision_status != "approved" {
        return Err(EngineError::UserDeclined(format!(
            "intake concluded with decision {:?}; see {} for the preserved intake log",
            outcome.decision_status,
            intake_ledger.path().display(),
        )));
    }

    let persisted = IntakeSnapshot {
        run_id: run_id.to_string(),
        snapshot_id: snapshot_id.to_string(),
        workspace_root: workspace_root.to_string_lossy().to_string(),
        instruction: instruction.to_string(),
        approved_plan: outcome.approved_plan.clone(),
        approved_task_ids: outcome.approved_task_ids.clone(),
        derived_tasks: outcome.derived_tasks.clone(),
        clarifications: outcome.clarifications.clone(),
        conflict_resolutions: outcome.conflict_resolutions.clone(),
        decision_status: outcome.decision_status.clone(),
        intake_correlation_id: Some(outcome.intake_correlation_id.clone()),
    };
    lorch_core::atomic::write_atomic_json(&layout.intake_snapshot_path(run_id), &persisted)
        .map_err(|e| EngineError::Precondition(format!("failed to persist intake snapshot: {e}")))?;
    lorch_core::atomic::write_atomic_json(&layout.intake_latest_path(), &persisted)
        .map_err(|e| EngineError::Precondition(format!("failed to persist intake snapshot: {e}")))?;

    let approved = ApprovedIntake {
        run_id: run_id.to_string(),
        snapshot_id: snapshot_id.to_string(),
        workspace_root: workspace_root.to_path_buf(),
        instruction: instruction.to_string(),
        approved_plan: outcome.approved_plan,
        approved_task_ids: outcome.approved_task_ids,
        derived_tasks: outcome.derived_tasks,
        clarifications: outcome.clarifications,
        conflict_resolutions: outcome.conflict_resolutions,
        decision_status: outcome.decision_status,
        intake_correlation_id: Some(outcome.intake_correlation_id),
        already_activated_task_ids: HashSet::new(),
    };
    activate(&approved)
}

/// §11 supplemented feature 4: forwards SIGINT into the same cancellation
/// token every blocking call already selects on, rather than exiting the
/// process directly.
pub(crate) fn install_ctrl_c_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("received interrupt signal, cancelling run");
            cancel.cancel();
        }
    });
}
