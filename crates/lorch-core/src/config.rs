// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Config file shape and validation (§6). The core consumes and validates
//! this document; loading it from disk, searching upward for `lorch.json`,
//! and creating a default one are the CLI collaborator's job, not this
//! crate's.

use crate::error::{LorchError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Jitter {
    Full,
    None,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackoffConfig {
    pub initial_ms: u64,
    pub max_ms: u64,
    pub multiplier: f64,
    pub jitter: Jitter,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self { initial_ms: 500, max_ms: 30_000, multiplier: 2.0, jitter: Jitter::Full }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default)]
    pub backoff: BackoffConfig,
}

fn default_max_attempts() -> u32 {
    3
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self { max_attempts: default_max_attempts(), backoff: BackoffConfig::default() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyConfig {
    #[serde(default = "default_concurrency")]
    pub concurrency: u32,
    #[serde(default = "default_message_max_bytes")]
    pub message_max_bytes: usize,
    #[serde(default = "default_artifact_max_bytes")]
    pub artifact_max_bytes: usize,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default = "default_true_bool")]
    pub strict_version_pinning: bool,
    #[serde(default)]
    pub parallel_reviews: bool,
    #[serde(default = "default_true_bool")]
    pub redact_secrets_in_logs: bool,
}

fn default_concurrency() -> u32 {
    1
}
fn default_message_max_bytes() -> usize {
    1 << 20
}
fn default_artifact_max_bytes() -> usize {
    50 << 20
}
fn default_true_bool() -> bool {
    true
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            message_max_bytes: default_message_max_bytes(),
            artifact_max_bytes: default_artifact_max_bytes(),
            retry: RetryConfig::default(),
            strict_version_pinning: true,
            parallel_reviews: false,
            redact_secrets_in_logs: true,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default)]
    pub enabled: Option<bool>,
    #[serde(default)]
    pub cmd: Vec<String>,
    #[serde(default)]
    pub heartbeat_interval_s: Option<u64>,
    #[serde(default)]
    pub timeouts_s: HashMap<String, u64>,
    #[serde(default)]
    pub env: HashMap<String, String>,
}

impl AgentConfig {
    pub fn is_enabled(&self) -> bool {
        self.enabled.unwrap_or(true)
    }

    /// Per-action deadline: looks up `timeouts_s[action]`, falling back to
    /// `default_secs` when absent. §9 Open Question 1: the command's own
    /// `deadline` and this per-action config default can disagree; this
    /// crate does not resolve that ambiguity, it just supplies the
    /// config-side default for whichever caller decides.
    pub fn timeout_for(&self, action: &str, default_secs: u64) -> u64 {
        self.timeouts_s.get(action).copied().unwrap_or(default_secs)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentsConfig {
    pub builder: AgentConfig,
    pub reviewer: AgentConfig,
    pub spec_maintainer: AgentConfig,
    #[serde(default)]
    pub orchestration: Option<AgentConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub version: String,
    #[serde(default = "default_workspace_root")]
    pub workspace_root: String,
    #[serde(default)]
    pub policy: PolicyConfig,
    pub agents: AgentsConfig,
}

fn default_workspace_root() -> String {
    ".".to_string()
}

impl Config {
    /// Validates the config per §6/§7. Returns a `Configuration` error
    /// carrying a remediation hint on the first failure.
    pub fn validate(&self) -> Result<()> {
        if self.version != "1.0" {
            return Err(LorchError::Configuration(format!(
                "unsupported config version {:?}; this build understands \"1.0\"",
                self.version
            )));
        }
        if self.workspace_root.trim().is_empty() {
            return Err(LorchError::Configuration("workspace_root must not be empty".into()));
        }
        if self.policy.concurrency != 1 {
            return Err(LorchError::Configuration(
                "policy.concurrency must equal 1 — this orchestrator runs exactly one task at a time by policy".into(),
            ));
        }
        self.validate_required_agent("builder", &self.agents.builder)?;
        self.validate_required_agent("reviewer", &self.agents.reviewer)?;
        self.validate_required_agent("spec_maintainer", &self.agents.spec_maintainer)?;
        if let Some(orchestration) = &self.agents.orchestration {
            if orchestration.is_enabled() && orchestration.cmd.is_empty() {
                return Err(LorchError::Configuration(
                    "agents.orchestration.cmd must not be empty when orchestration is enabled \
                     — set a cmd or omit the orchestration agent entirely"
                        .into(),
                ));
            }
        }
        Ok(())
    }

    fn validate_required_agent(&self, name: &str, agent: &AgentConfig) -> Result<()> {
        if agent.cmd.is_empty() {
            return Err(LorchError::Configuration(format!(
                "agents.{name}.cmd must not be empty — provide the subprocess command to launch, e.g. [\"./agents/{name}\"]"
            )));
        }
        Ok(())
    }

    /// Whether natural-language intake is available: requires an enabled
    /// orchestration agent.
    pub fn supports_intake(&self) -> bool {
        self.agents.orchestration.as_ref().map(|a| a.is_enabled() && !a.cmd.is_empty()).unwrap_or(false)
    }
}
