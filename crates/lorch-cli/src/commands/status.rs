// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `lorch status`: a read-only view of the current run state (§11
//! supplemented feature 3). Never spawns agents, never mutates anything —
//! just loads what's already on disk and prints it.

use super::context;
use crate::exit_error::ExitError;
use crate::output::{format_or_json, format_time_ago, OutputFormat};
use lorch_core::{Ledger, RunState};
use serde::Serialize;
use std::path::PathBuf;

pub struct StatusArgs {
    pub config: Option<PathBuf>,
    pub run: Option<String>,
    pub format: OutputFormat,
}

#[derive(Debug, Serialize)]
struct StatusReport {
    run: RunState,
    command_count: usize,
    event_count: usize,
    heartbeat_count: usize,
    pending_commands: usize,
}

pub async fn handle(args: StatusArgs) -> Result<(), ExitError> {
    let ctx = context::load(args.config.as_deref())?;

    let run_state_path = ctx.layout.run_state_path();
    if !lorch_core::RunStateStore::exists(&run_state_path) {
        return Err(ExitError::run_failed(format!("no run state found at {}", run_state_path.display())));
    }
    let run_state = lorch_core::RunStateStore::load(&run_state_path)?;
    let run = run_state.snapshot();

    if let Some(wanted) = &args.run {
        if &run.run_id != wanted {
            return Err(ExitError::run_failed(format!(
                "run state at {} belongs to run {:?}, not {:?}",
                run_state_path.display(),
                run.run_id,
                wanted
            )));
        }
    }

    let view = Ledger::read_view(&ctx.layout.ledger_path(&run.run_id))?;
    let report = StatusReport {
        command_count: view.commands.len(),
        event_count: view.events.len(),
        heartbeat_count: view.heartbeats.len(),
        pending_commands: view.pending_commands().len(),
        run,
    };

    format_or_json(args.format, &report, || {
        println!("run:        {}", report.run.run_id);
        println!("status:     {:?}", report.run.status);
        println!("stage:      {:?}", report.run.current_stage);
        println!("started:    {}", format_time_ago(report.run.started_at));
        if let Some(task_id) = &report.run.task_id {
            println!("task:       {task_id}");
        }
        println!("activated:  {}", report.run.activated_task_ids.join(", "));
        println!(
            "ledger:     {} commands, {} events, {} heartbeats, {} pending",
            report.command_count, report.event_count, report.heartbeat_count, report.pending_commands
        );
    })
    .map_err(|e| ExitError::run_failed(e.to_string()))?;

    Ok(())
}
