// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The resume engine (§4.K): reconstructs a task's position from the
//! ledger rather than trusting the run-state file's own stage field,
//! then re-enters the scheduler's state machine at that point —
//! including the mid-spec-loop case, where a `spec.changes_requested`
//! event's nested implement/review cycle was interrupted before it
//! completed.

use crate::activation::ActivationTask;
use crate::error::{EngineError, Result};
use crate::fleet::AgentFleet;
use crate::scheduler::{
    build_implement_changes_command, review_until_approved, run_implement_step, spec_maintain_loop, StepCtx,
};
use lorch_core::{Ledger, ReceiptStore, RunStateStore, RunStatus, Stage};
use lorch_proto::{event_tags, Event};
use tokio_util::sync::CancellationToken;

/// Re-derives where a task's pipeline stopped from the ledger alone, then
/// drives the scheduler from there to completion. Returns immediately if
/// the run is already `completed`; refuses to resume an `aborted` run.
pub async fn resume(
    ledger: &Ledger,
    run_state: &RunStateStore,
    receipts: &ReceiptStore<'_>,
    fleet: &mut AgentFleet,
    task: &ActivationTask,
    default_deadline_secs: u64,
    cancel: &CancellationToken,
) -> Result<()> {
    let snapshot = run_state.snapshot();
    if snapshot.status == RunStatus::Completed {
        return Ok(());
    }
    if snapshot.status == RunStatus::Aborted {
        return Err(EngineError::Precondition(format!(
            "run {} is aborted and cannot be resumed",
            snapshot.run_id
        )));
    }
    if run_state.is_task_activated(&task.id) {
        return Ok(());
    }

    // `view.events` is already in ledger append order, i.e. chronological
    // order of arrival — using that position (rather than `occurred_at`,
    // which an agent's own clock supplies and this core never trusts for
    // ordering) to find "the most recent" and "did X happen after Y".
    let view = ledger.view()?;
    run_state.set_task(&task.id)?;
    let ctx = StepCtx::new(ledger, run_state, receipts, default_deadline_secs);

    let task_events: Vec<(usize, &Event)> =
        view.events.iter().enumerate().filter(|(_, e)| e.task_id == task.id).collect();

    let last_matching = |tag: &str| -> Option<(usize, &Event)> {
        task_events.iter().rev().find(|(_, e)| e.event == tag).copied()
    };
    let any_after = |tag: &str, after: usize, require_approved: bool| -> bool {
        task_events.iter().any(|(i, e)| {
            *i > after
                && e.event == tag
                && (!require_approved || e.status.as_deref() == Some("approved"))
        })
    };

    let last_spec = task_events
        .iter()
        .rev()
        .find(|(_, e)| {
            e.event == event_tags::SPEC_UPDATED
                || e.event == event_tags::SPEC_NO_CHANGES_NEEDED
                || e.event == event_tags::SPEC_CHANGES_REQUESTED
        })
        .copied();

    if let Some((spec_idx, spec_event)) = last_spec {
        if spec_event.event == event_tags::SPEC_UPDATED || spec_event.event == event_tags::SPEC_NO_CHANGES_NEEDED {
            run_state.set_stage(Stage::Complete)?;
            run_state.mark_task_activated(&task.id)?;
            return Ok(());
        }

        // spec.changes_requested: mid-spec-loop detection (§4.K step 2).
        let builder_after = any_after(event_tags::BUILDER_COMPLETED, spec_idx, false);
        let review_approved_after = any_after(event_tags::REVIEW_COMPLETED, spec_idx, true);

        if builder_after && review_approved_after {
            run_state.set_stage(Stage::SpecMaintain)?;
            spec_maintain_loop(&ctx, fleet, task, cancel).await?;
        } else {
            run_state.set_stage(Stage::Implement)?;
            let changes_cmd =
                build_implement_changes_command(task, spec_event, default_deadline_secs, chrono::Utc::now());
            let mut builder_event = run_implement_step(&ctx, fleet, task, &changes_cmd, cancel).await?;
            run_state.set_stage(Stage::Review)?;
            review_until_approved(&ctx, fleet, task, &mut builder_event, cancel).await?;
            run_state.set_stage(Stage::SpecMaintain)?;
            spec_maintain_loop(&ctx, fleet, task, cancel).await?;
        }
        run_state.set_stage(Stage::Complete)?;
        run_state.mark_task_activated(&task.id)?;
        return Ok(());
    }

    if let Some((_, review_event)) = last_matching(event_tags::REVIEW_COMPLETED) {
        if review_event.status.as_deref() == Some("approved") {
            run_state.set_stage(Stage::SpecMaintain)?;
            spec_maintain_loop(&ctx, fleet, task, cancel).await?;
        } else {
            // changes_requested (or any non-approved status) with no spec
            // event yet: resume inside the review loop's implement_changes.
            run_state.set_stage(Stage::Implement)?;
            let changes_cmd =
                build_implement_changes_command(task, review_event, default_deadline_secs, chrono::Utc::now());
            let mut builder_event = run_implement_step(&ctx, fleet, task, &changes_cmd, cancel).await?;
            run_state.set_stage(Stage::Review)?;
            review_until_approved(&ctx, fleet, task, &mut builder_event, cancel).await?;
            run_state.set_stage(Stage::SpecMaintain)?;
            spec_maintain_loop(&ctx, fleet, task, cancel).await?;
        }
        run_state.set_stage(Stage::Complete)?;
        run_state.mark_task_activated(&task.id)?;
        return Ok(());
    }

    if let Some((_, builder_event)) = last_matching(event_tags::BUILDER_COMPLETED) {
        run_state.set_stage(Stage::Review)?;
        let mut builder_event = builder_event.clone();
        review_until_approved(&ctx, fleet, task, &mut builder_event, cancel).await?;
        run_state.set_stage(Stage::SpecMaintain)?;
        spec_maintain_loop(&ctx, fleet, task, cancel).await?;
        run_state.set_stage(Stage::Complete)?;
        run_state.mark_task_activated(&task.id)?;
        return Ok(());
    }

    // Nothing for this task landed in the ledger yet: run the pipeline
    // from its very start.
    crate::scheduler::execute(ledger, run_state, receipts, fleet, task, default_deadline_secs, cancel).await
}

#[cfg(test)]
#[path = "resume_tests.rs"]
mod tests;
