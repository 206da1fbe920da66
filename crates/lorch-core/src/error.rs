// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error taxonomy (§7). Kinds, not names: every fatal path the core can
//! take is one of these variants, so callers (the scheduler, the intake
//! engine, the CLI) can branch on *kind of failure* rather than string
//! matching.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LorchError {
    /// Invalid or missing configuration. The run never starts.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A precondition failed: intake not approved, plan file missing or
    /// escaping the workspace, instruction empty, activation task missing
    /// from the derived list.
    #[error("precondition failed: {0}")]
    Precondition(String),

    /// NDJSON transport failure: a write error, or an oversize line.
    /// Single-line parse errors are *not* represented here — those are
    /// logged and the reader continues (§4.A).
    #[error("transport error: {0}")]
    Transport(String),

    /// An agent violated the protocol contract: missing `tests.status`,
    /// an unrecognized terminal event shape, and so on.
    #[error("agent contract violation (task {task_id}, message {message_id}): {detail}")]
    AgentContract { task_id: String, message_id: String, detail: String },

    /// An agent reported failure through the protocol itself (e.g.
    /// `builder.completed` with `tests.status = "fail"` and no
    /// `allowed_failures`).
    #[error("agent-reported failure (task {task_id}): {detail}")]
    AgentFailure { task_id: String, detail: String },

    /// A command outstanding past its deadline with no heartbeat activity
    /// inside the configured liveness window.
    #[error("timeout waiting for task {task_id} (action {action})")]
    Timeout { task_id: String, action: String },

    /// Version mismatch: the snapshot id an agent observed doesn't match
    /// what every command in this run carries. Fatal, non-retriable
    /// (Invariant 6).
    #[error("snapshot mismatch (task {task_id}): expected {expected}, agent observed {observed}")]
    SnapshotMismatch { task_id: String, expected: String, observed: String },

    /// Propagated cancellation. Translates to an `aborted` run; resumable.
    #[error("run cancelled")]
    Cancelled,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, LorchError>;
