// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The task state machine (§4.J): `IMPLEMENT -> REVIEW -> SPEC_MAINTAIN ->
//! DONE`, with nested change-request loops inside both `REVIEW` and
//! `SPEC_MAINTAIN`. One command is outstanding at a time; every terminal
//! event is persisted to the ledger and written as a receipt before the
//! state machine advances.

use crate::activation::{build_implement_command, ActivationTask};
use crate::error::{EngineError, Result};
use crate::fleet::{send_and_await_terminal, AgentFleet};
use chrono::Utc;
use lorch_core::{ids, Ledger, Receipt, ReceiptStore, RunStateStore, Stage};
use lorch_proto::{event_tags, Action, AgentRef, AgentType, Command, Event, ExpectedOutput, Inputs, Retry, Version};
use serde_json::json;
use tokio_util::sync::CancellationToken;

/// Runs a single activation task through to completion, writing a receipt
/// per command and marking the task activated in run state on success.
pub async fn execute(
    ledger: &Ledger,
    run_state: &RunStateStore,
    receipts: &ReceiptStore<'_>,
    fleet: &mut AgentFleet,
    task: &ActivationTask,
    default_deadline_secs: u64,
    cancel: &CancellationToken,
) -> Result<()> {
    run_state.set_task(&task.id)?;
    let ctx = StepCtx::new(ledger, run_state, receipts, default_deadline_secs);

    run_state.set_stage(Stage::Implement)?;
    let implement_cmd = build_implement_command(task, default_deadline_secs, Utc::now());
    let mut builder_event = run_implement_step(&ctx, fleet, task, &implement_cmd, cancel).await?;

    run_state.set_stage(Stage::Review)?;
    review_until_approved(&ctx, fleet, task, &mut builder_event, cancel).await?;

    run_state.set_stage(Stage::SpecMaintain)?;
    spec_maintain_loop(&ctx, fleet, task, cancel).await?;

    run_state.set_stage(Stage::Complete)?;
    run_state.mark_task_activated(&task.id)?;
    Ok(())
}

/// Borrowed handles every step needs; grouped so the per-step helpers
/// don't each carry four separate parameters. Shared with [`crate::resume`],
/// which re-enters this state machine partway through.
pub(crate) struct StepCtx<'a, 'b> {
    pub(crate) ledger: &'a Ledger,
    pub(crate) run_state: &'a RunStateStore,
    pub(crate) receipts: &'a ReceiptStore<'b>,
    pub(crate) default_deadline_secs: u64,
}

impl<'a, 'b> StepCtx<'a, 'b> {
    pub(crate) fn new(
        ledger: &'a Ledger,
        run_state: &'a RunStateStore,
        receipts: &'a ReceiptStore<'b>,
        default_deadline_secs: u64,
    ) -> Self {
        Self { ledger, run_state, receipts, default_deadline_secs }
    }
}

/// `SPEC_MAINTAIN` from a fresh `update_spec` attempt through to `DONE`
/// (§4.J): loops the nested implement_changes/review cycle each time the
/// spec maintainer requests changes, retrying `update_spec` until it
/// reports `updated` or `no_changes_needed`.
pub(crate) async fn spec_maintain_loop(
    ctx: &StepCtx<'_, '_>,
    fleet: &mut AgentFleet,
    task: &ActivationTask,
    cancel: &CancellationToken,
) -> Result<()> {
    loop {
        let spec_cmd = build_update_spec_command(task, ctx.default_deadline_secs, Utc::now());
        ctx.run_state.set_current_task_inputs(spec_cmd.inputs.clone())?;
        let agent = fleet
            .agent_for(AgentType::SpecMaintainer)
            .ok_or_else(|| EngineError::Precondition("spec_maintainer agent is not configured".into()))?;
        let spec_event = send_and_await_terminal(
            ctx.ledger,
            ctx.run_state,
            agent,
            &spec_cmd,
            lorch_core::terminal_tags_for(Action::UpdateSpec),
            cancel,
        )
        .await?;
        write_receipt(ctx.receipts, &spec_cmd, &spec_event)?;

        match spec_event.event.as_str() {
            tag if tag == event_tags::SPEC_UPDATED || tag == event_tags::SPEC_NO_CHANGES_NEEDED => return Ok(()),
            tag if tag == event_tags::SPEC_CHANGES_REQUESTED => {
                ctx.run_state.set_stage(Stage::Implement)?;
                let changes_cmd =
                    build_implement_changes_command(task, &spec_event, ctx.default_deadline_secs, Utc::now());
                let mut builder_event = run_implement_step(ctx, fleet, task, &changes_cmd, cancel).await?;

                ctx.run_state.set_stage(Stage::Review)?;
                review_until_approved(ctx, fleet, task, &mut builder_event, cancel).await?;
                ctx.run_state.set_stage(Stage::SpecMaintain)?;
            }
            other => {
                return Err(EngineError::AgentContract {
                    task_id: task.id.clone(),
                    message_id: spec_event.message_id.clone(),
                    detail: format!("unrecognized spec-maintainer terminal event {other:?}"),
                });
            }
        }
    }
}

/// Sends `review`, looping through `implement_changes` + re-review each
/// time the reviewer requests changes, until it reports `approved`.
/// `builder_event` is updated in place to the latest builder terminal
/// event, so callers re-entering this loop (the nested spec nested-loop
/// case) see the freshest artifacts.
pub(crate) async fn review_until_approved(
    ctx: &StepCtx<'_, '_>,
    fleet: &mut AgentFleet,
    task: &ActivationTask,
    builder_event: &mut Event,
    cancel: &CancellationToken,
) -> Result<()> {
    loop {
        let review_cmd = build_review_command(task, builder_event, ctx.default_deadline_secs, Utc::now());
        ctx.run_state.set_current_task_inputs(review_cmd.inputs.clone())?;
        let agent = fleet
            .agent_for(AgentType::Reviewer)
            .ok_or_else(|| EngineError::Precondition("reviewer agent is not configured".into()))?;
        let review_event = send_and_await_terminal(
            ctx.ledger,
            ctx.run_state,
            agent,
            &review_cmd,
            lorch_core::terminal_tags_for(Action::Review),
            cancel,
        )
        .await?;
        write_receipt(ctx.receipts, &review_cmd, &review_event)?;

        match review_event.status.as_deref() {
            Some("approved") => return Ok(()),
            Some("changes_requested") => {
                ctx.run_state.set_stage(Stage::Implement)?;
                let changes_cmd = build_implement_changes_command(
                    task,
                    &review_event,
                    ctx.default_deadline_secs,
                    Utc::now(),
                );
                *builder_event = run_implement_step(ctx, fleet, task, &changes_cmd, cancel).await?;
                ctx.run_state.set_stage(Stage::Review)?;
            }
            other => {
                return Err(EngineError::AgentContract {
                    task_id: task.id.clone(),
                    message_id: review_event.message_id.clone(),
                    detail: format!("review.completed carried unrecognized status {other:?}"),
                });
            }
        }
    }
}

/// Sends an `implement`/`implement_changes` command, validates the
/// builder test-result contract on its terminal event, and writes the
/// receipt. Returns the validated event so the caller can thread it into
/// the next review round.
pub(crate) async fn run_implement_step(
    ctx: &StepCtx<'_, '_>,
    fleet: &mut AgentFleet,
    task: &ActivationTask,
    command: &Command,
    cancel: &CancellationToken,
) -> Result<Event> {
    ctx.run_state.set_current_task_inputs(command.inputs.clone())?;
    let agent = fleet
        .agent_for(AgentType::Builder)
        .ok_or_else(|| EngineError::Precondition("builder agent is not configured".into()))?;
    let event = send_and_await_terminal(
        ctx.ledger,
        ctx.run_state,
        agent,
        command,
        lorch_core::terminal_tags_for(command.action),
        cancel,
    )
    .await?;
    validate_builder_test_contract(&task.id, &event)?;
    write_receipt(ctx.receipts, command, &event)?;
    Ok(event)
}

/// The builder test-result contract (§4.J): `payload.tests` must be a
/// mapping carrying a string `status`. `pass` is always accepted; `fail`
/// is accepted only with `allowed_failures == true`; any other status is
/// accepted with a warning (forward-compat); a missing/malformed `tests`
/// or `status` is a fatal contract violation.
fn validate_builder_test_contract(task_id: &str, event: &Event) -> Result<()> {
    let tests = event.payload.get("tests").and_then(|v| v.as_object()).ok_or_else(|| {
        EngineError::AgentContract {
            task_id: task_id.to_string(),
            message_id: event.message_id.clone(),
            detail: "builder.completed missing a `tests` mapping in payload".into(),
        }
    })?;
    let status = tests.get("status").and_then(|v| v.as_str()).ok_or_else(|| EngineError::AgentContract {
        task_id: task_id.to_string(),
        message_id: event.message_id.clone(),
        detail: "builder.completed payload.tests missing a string `status`".into(),
    })?;

    match status {
        "pass" => Ok(()),
        "fail" => {
            let allowed = tests.get("allowed_failures").and_then(|v| v.as_bool()).unwrap_or(false);
            if allowed {
                tracing::warn!(task_id, "builder reported failing tests under an allowed_failures waiver");
                Ok(())
            } else {
                Err(EngineError::AgentFailure {
                    task_id: task_id.to_string(),
                    detail: format!("builder reported failing tests: {}", json!(tests)),
                })
            }
        }
        other => {
            tracing::warn!(task_id, status = other, "builder reported an unrecognized test status, accepting");
            Ok(())
        }
    }
}

pub(crate) fn write_receipt(receipts: &ReceiptStore<'_>, command: &Command, event: &Event) -> Result<()> {
    let step = receipts.next_step(&command.task_id)?;
    let receipt = Receipt::from_command(
        step,
        command,
        vec![event.message_id.clone()],
        event.artifacts.clone(),
        Utc::now(),
    );
    receipts.write(&receipt)?;
    Ok(())
}

fn new_task_command(
    task: &ActivationTask,
    action: Action,
    inputs: Inputs,
    expected_outputs: Vec<ExpectedOutput>,
    deadline_secs: u64,
    now: chrono::DateTime<Utc>,
) -> Command {
    let idempotency_key =
        lorch_proto::idempotency_key(action, &task.id, &task.snapshot_id, &inputs, &expected_outputs);
    Command {
        message_id: ids::new_message_id(),
        correlation_id: ids::new_correlation_id(action.as_str()),
        task_id: task.id.clone(),
        to: AgentRef { agent_type: action.target_agent_type(), agent_id: String::new() },
        action,
        inputs,
        expected_outputs,
        version: Version { snapshot_id: task.snapshot_id.clone() },
        deadline: now + chrono::Duration::seconds(deadline_secs as i64),
        retry: Retry::default(),
        priority: 0,
        idempotency_key,
    }
}

pub(crate) fn build_review_command(
    task: &ActivationTask,
    builder_event: &Event,
    deadline_secs: u64,
    now: chrono::DateTime<Utc>,
) -> Command {
    let mut inputs = Inputs::new();
    inputs.insert("instruction".into(), json!(task.instruction));
    inputs.insert("task_title".into(), json!(task.title));
    inputs.insert("approved_plan".into(), json!(task.approved_plan));
    inputs.insert(
        "artifacts".into(),
        json!(builder_event.artifacts.iter().map(|a| a.path.clone()).collect::<Vec<_>>()),
    );
    new_task_command(task, Action::Review, inputs, Vec::new(), deadline_secs, now)
}

pub(crate) fn build_implement_changes_command(
    task: &ActivationTask,
    feedback_event: &Event,
    deadline_secs: u64,
    now: chrono::DateTime<Utc>,
) -> Command {
    let mut inputs = Inputs::new();
    inputs.insert("instruction".into(), json!(task.instruction));
    inputs.insert("task_title".into(), json!(task.title));
    inputs.insert("task_files".into(), json!(task.files));
    inputs.insert("goal".into(), json!(task.title));
    inputs.insert("approved_plan".into(), json!(task.approved_plan));
    inputs.insert("clarifications".into(), json!(task.clarifications));
    inputs.insert("conflict_resolutions".into(), json!(task.conflict_resolutions));
    inputs.insert("change_request".into(), json!(feedback_event.payload));
    let expected_outputs: Vec<ExpectedOutput> = task
        .files
        .iter()
        .map(|path| ExpectedOutput { path: path.clone(), description: String::new(), required: true })
        .collect();
    new_task_command(task, Action::ImplementChanges, inputs, expected_outputs, deadline_secs, now)
}

pub(crate) fn build_update_spec_command(
    task: &ActivationTask,
    deadline_secs: u64,
    now: chrono::DateTime<Utc>,
) -> Command {
    let mut inputs = Inputs::new();
    inputs.insert("instruction".into(), json!(task.instruction));
    inputs.insert("task_title".into(), json!(task.title));
    inputs.insert("approved_plan".into(), json!(task.approved_plan));
    new_task_command(task, Action::UpdateSpec, inputs, Vec::new(), deadline_secs, now)
}

#[cfg(test)]
#[path = "scheduler_tests.rs"]
mod tests;
