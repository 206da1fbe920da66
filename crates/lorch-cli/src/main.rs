// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `lorch`: the command-line entrypoint. Parses arguments, initializes
//! logging, dispatches to a subcommand, and turns any resulting
//! [`ExitError`] into a process exit code rather than panicking.

mod commands;
mod config_loader;
mod exit_error;
mod output;
mod prompter;

use clap::{Parser, Subcommand};
use exit_error::ExitError;
use output::OutputFormat;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "lorch", version, about = "Local multi-agent build orchestrator")]
struct Cli {
    /// Path to `lorch.json`. Defaults to searching upward from the
    /// current directory, creating a default config if none is found.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output format for machine consumption.
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Runs a new task, either natural-language (driven through intake
    /// negotiation) or pre-declared with `--task`.
    Run {
        /// Natural-language instruction. Required unless `--task` supplies
        /// one directly.
        instruction: Option<String>,

        /// Bypasses intake entirely and activates this task id directly;
        /// requires `instruction` to double as the task's own instruction.
        #[arg(long)]
        task: Option<String>,

        /// Workspace-relative files the task is expected to touch, used
        /// only with `--task`.
        #[arg(long, value_delimiter = ',')]
        files: Vec<String>,

        /// Workspace-relative path to the approved plan document.
        #[arg(long, default_value = "specs/plan.md")]
        plan: String,
    },

    /// Resumes an interrupted run from where the ledger says it stopped.
    Resume {
        /// The run id to resume (as printed by `lorch run` or `lorch status`).
        #[arg(long)]
        run: String,
    },

    /// Prints the current state of the most recent run, read-only.
    Status {
        /// Verifies the on-disk run state matches this run id.
        #[arg(long)]
        run: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let result = dispatch(cli).await;

    if let Err(err) = result {
        eprintln!("error: {err}");
        std::process::exit(err.code);
    }
}

async fn dispatch(cli: Cli) -> Result<(), ExitError> {
    match cli.command {
        Commands::Run { instruction, task, files, plan } => {
            commands::run::handle(commands::run::RunArgs {
                config: cli.config,
                instruction,
                task,
                files,
                plan,
                format: cli.format,
            })
            .await
        }
        Commands::Resume { run } => {
            commands::resume::handle(commands::resume::ResumeArgs { config: cli.config, run, format: cli.format })
                .await
        }
        Commands::Status { run } => {
            commands::status::handle(commands::status::StatusArgs { config: cli.config, run, format: cli.format })
                .await
        }
    }
}
