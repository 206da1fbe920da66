// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The engine's error enum: §7's taxonomy, adapted to the boundary this
//! crate owns (intake, activation, scheduling, resume). Lower crates'
//! errors are wrapped with `#[from]` rather than restated.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Core(#[from] lorch_core::LorchError),

    #[error(transparent)]
    Supervisor(#[from] lorch_supervisor::SupervisorError),

    #[error("precondition failed: {0}")]
    Precondition(String),

    #[error("agent contract violation (task {task_id}, message {message_id}): {detail}")]
    AgentContract { task_id: String, message_id: String, detail: String },

    #[error("agent-reported failure (task {task_id}): {detail}")]
    AgentFailure { task_id: String, detail: String },

    #[error("timeout waiting for task {task_id} action {action}: {detail}")]
    Timeout { task_id: String, action: String, detail: String },

    #[error("snapshot mismatch (task {task_id}): expected {expected}, agent observed {observed}")]
    SnapshotMismatch { task_id: String, expected: String, observed: String },

    #[error("run cancelled")]
    Cancelled,

    #[error("user declined: {0}")]
    UserDeclined(String),

    #[error("transport error: {0}")]
    Transport(String),
}

pub type Result<T> = std::result::Result<T, EngineError>;
