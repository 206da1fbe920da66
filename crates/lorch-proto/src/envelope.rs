// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Frozen shapes of the four envelope kinds exchanged with agent
//! subprocesses over stdio: commands, events, heartbeats, and free-form log
//! lines. Every envelope is tagged by `kind` so a single NDJSON stream can
//! carry all four.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The four agent roles the core addresses by type, never by instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentType {
    Builder,
    Reviewer,
    SpecMaintainer,
    Orchestration,
}

impl AgentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentType::Builder => "builder",
            AgentType::Reviewer => "reviewer",
            AgentType::SpecMaintainer => "spec_maintainer",
            AgentType::Orchestration => "orchestration",
        }
    }
}

impl std::fmt::Display for AgentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `(agent_type, agent_id)` — the agent_id is opaque, stamped by the agent
/// itself on its first heartbeat. The core never addresses an agent by id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentRef {
    pub agent_type: AgentType,
    #[serde(default)]
    pub agent_id: String,
}

/// The six command actions defined by the protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Implement,
    ImplementChanges,
    Review,
    UpdateSpec,
    Intake,
    TaskDiscovery,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Implement => "implement",
            Action::ImplementChanges => "implement_changes",
            Action::Review => "review",
            Action::UpdateSpec => "update_spec",
            Action::Intake => "intake",
            Action::TaskDiscovery => "task_discovery",
        }
    }

    /// The agent type a command with this action is routed to.
    pub fn target_agent_type(&self) -> AgentType {
        match self {
            Action::Implement | Action::ImplementChanges => AgentType::Builder,
            Action::Review => AgentType::Reviewer,
            Action::UpdateSpec => AgentType::SpecMaintainer,
            Action::Intake | Action::TaskDiscovery => AgentType::Orchestration,
        }
    }
}

/// Free-form mapping of strings, string lists, and nested mappings. Kept as
/// a `serde_json::Map` rather than a closed struct because agents are free
/// to add fields the core never interprets; only canonical(inputs)
/// participates in the idempotency key, never its Rust shape.
pub type Inputs = serde_json::Map<String, serde_json::Value>;

/// One expected output artifact a command asks the agent to produce.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpectedOutput {
    pub path: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_true")]
    pub required: bool,
}

fn default_true() -> bool {
    true
}

/// Version pin carried on every command; the snapshot id the agent must
/// observe matches the snapshot id every other command in the run carries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Version {
    pub snapshot_id: String,
}

/// Retry bookkeeping. Does **not** participate in the idempotency key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Retry {
    #[serde(default)]
    pub attempt: u32,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

fn default_max_attempts() -> u32 {
    1
}

impl Default for Retry {
    fn default() -> Self {
        Self { attempt: 0, max_attempts: default_max_attempts() }
    }
}

/// A structured request to an agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Command {
    pub message_id: String,
    pub correlation_id: String,
    pub task_id: String,
    pub to: AgentRef,
    pub action: Action,
    #[serde(default)]
    pub inputs: Inputs,
    #[serde(default)]
    pub expected_outputs: Vec<ExpectedOutput>,
    pub version: Version,
    pub deadline: DateTime<Utc>,
    #[serde(default)]
    pub retry: Retry,
    #[serde(default)]
    pub priority: i32,
    pub idempotency_key: String,
}

/// An artifact an agent reports having produced. The core only records and
/// checksums; it never writes workspace files itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    pub path: String,
    pub sha256: String,
    pub size: u64,
}

/// A structured reply from an agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub message_id: String,
    pub correlation_id: String,
    pub task_id: String,
    pub from: AgentRef,
    pub event: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default)]
    pub payload: Inputs,
    #[serde(default)]
    pub artifacts: Vec<Artifact>,
    pub occurred_at: DateTime<Utc>,
}

/// Distinguished event tags referenced throughout the scheduler and intake
/// engine. Kept as plain `&'static str` constants (not an enum) because
/// agents may emit tags the core doesn't recognize (§4.F: "unknown
/// discriminator messages are logged and dropped" generalizes to unknown
/// event tags too — the scheduler just won't treat them as terminal).
pub mod event_tags {
    pub const BUILDER_PROGRESS: &str = "builder.progress";
    pub const BUILDER_COMPLETED: &str = "builder.completed";
    pub const ARTIFACT_PRODUCED: &str = "artifact.produced";
    pub const REVIEW_COMPLETED: &str = "review.completed";
    pub const SPEC_UPDATED: &str = "spec.updated";
    pub const SPEC_NO_CHANGES_NEEDED: &str = "spec.no_changes_needed";
    pub const SPEC_CHANGES_REQUESTED: &str = "spec.changes_requested";
    pub const ORCHESTRATION_PROPOSED_TASKS: &str = "orchestration.proposed_tasks";
    pub const ORCHESTRATION_NEEDS_CLARIFICATION: &str = "orchestration.needs_clarification";
    pub const ORCHESTRATION_PLAN_CONFLICT: &str = "orchestration.plan_conflict";
    pub const SYSTEM_USER_DECISION: &str = "system.user_decision";
}

/// Heartbeat liveness states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HeartbeatStatus {
    Starting,
    Ready,
    Busy,
    Stopping,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Heartbeat {
    pub agent: AgentRef,
    pub seq: u64,
    pub status: HeartbeatStatus,
    pub pid: u32,
    pub ppid: u32,
    pub uptime_s: f64,
    pub last_activity_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
}

/// Which OS stream a log line came from. Stdout log lines are protocol
/// traffic tagged `kind: "log"`; raw stderr text is captured separately by
/// the supervisor and never parsed as an envelope at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogStream {
    Stdout,
    Stderr,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogLine {
    pub agent: AgentRef,
    #[serde(default)]
    pub stream: LogStream,
    pub message: String,
    pub occurred_at: DateTime<Utc>,
}

impl Default for LogStream {
    fn default() -> Self {
        LogStream::Stdout
    }
}

/// A single tagged envelope on the wire, discriminated by `kind`. The
/// transport layer never inspects anything past this tag.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Envelope {
    Command(Command),
    Event(Event),
    Heartbeat(Heartbeat),
    Log(LogLine),
}
