// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The fixed set of agent subprocesses this orchestrator drives, and the
//! single send-then-await-terminal-event primitive every higher-level flow
//! (intake, scheduler) is built from (§4.F, §5's concurrent suspension
//! points).

use crate::error::{EngineError, Result};
use lorch_core::{Config, Ledger, RunStateStore};
use lorch_proto::{AgentType, Command, Event};
use lorch_supervisor::{AgentChannels, AgentSupervisor, AgentSupervisorConfig};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Derives the heartbeat-liveness window per §11 supplemented feature 1:
/// `heartbeat_interval_s * 3`, floored at 30s, overridable by leaving
/// `heartbeat_interval_s` unset (falls back straight to the floor).
pub fn heartbeat_timeout(heartbeat_interval_s: Option<u64>) -> Duration {
    let derived = heartbeat_interval_s.unwrap_or(10).saturating_mul(3);
    Duration::from_secs(derived.max(30))
}

/// One running subprocess plus the channels handed out by its single
/// `start()` call.
pub struct RunningAgent {
    pub supervisor: AgentSupervisor,
    pub channels: AgentChannels,
    pub heartbeat_timeout: Duration,
}

impl RunningAgent {
    fn spawn(agent_type: AgentType, agent_cfg: &lorch_core::AgentConfig) -> Result<Self> {
        let supervisor = AgentSupervisor::new(AgentSupervisorConfig {
            agent_type,
            cmd: agent_cfg.cmd.clone(),
            env: agent_cfg.env.clone(),
        });
        let channels = supervisor.start()?;
        Ok(Self {
            supervisor,
            channels,
            heartbeat_timeout: heartbeat_timeout(agent_cfg.heartbeat_interval_s),
        })
    }

    pub async fn stop(&self) -> Result<()> {
        self.supervisor.stop().await?;
        Ok(())
    }
}

/// The fixed four-agent roster (§3, §4.F): builder/reviewer/spec_maintainer
/// are mandatory, orchestration is present only when intake is configured.
pub struct AgentFleet {
    pub builder: RunningAgent,
    pub reviewer: RunningAgent,
    pub spec_maintainer: RunningAgent,
    pub orchestration: Option<RunningAgent>,
}

impl AgentFleet {
    pub fn start(config: &Config) -> Result<Self> {
        let builder = RunningAgent::spawn(AgentType::Builder, &config.agents.builder)?;
        let reviewer = RunningAgent::spawn(AgentType::Reviewer, &config.agents.reviewer)?;
        let spec_maintainer =
            RunningAgent::spawn(AgentType::SpecMaintainer, &config.agents.spec_maintainer)?;
        let orchestration = match &config.agents.orchestration {
            Some(cfg) if cfg.is_enabled() && !cfg.cmd.is_empty() => {
                Some(RunningAgent::spawn(AgentType::Orchestration, cfg)?)
            }
            _ => None,
        };
        Ok(Self { builder, reviewer, spec_maintainer, orchestration })
    }

    pub fn agent_for(&mut self, agent_type: AgentType) -> Option<&mut RunningAgent> {
        match agent_type {
            AgentType::Builder => Some(&mut self.builder),
            AgentType::Reviewer => Some(&mut self.reviewer),
            AgentType::SpecMaintainer => Some(&mut self.spec_maintainer),
            AgentType::Orchestration => self.orchestration.as_mut(),
        }
    }

    /// Graceful stop of every spawned agent (§4.F `stop`, §5 cancellation
    /// propagation): stdin close, bounded wait, kill on overshoot.
    pub async fn stop_all(&self) {
        self.builder.stop().await.ok();
        self.reviewer.stop().await.ok();
        self.spec_maintainer.stop().await.ok();
        if let Some(o) = &self.orchestration {
            o.stop().await.ok();
        }
    }
}

/// Sends `command`, persists it to the ledger, then waits for the first
/// event matching `command.correlation_id` whose tag is one of
/// `terminal_tags` — forwarding every other event/heartbeat into the
/// ledger/run-state along the way (§4.C/§4.D), interleaving on the three
/// suspension points §5 requires: the event channel, the heartbeat
/// channel, and cancellation. A heartbeat-timeout watch (§11 item 1) fires
/// a distinct [`EngineError::Timeout`] when no traffic arrives inside the
/// agent's liveness window while the command is outstanding.
pub async fn send_and_await_terminal(
    ledger: &Ledger,
    run_state: &RunStateStore,
    agent: &mut RunningAgent,
    command: &Command,
    terminal_tags: &'static [&'static str],
    cancel: &CancellationToken,
) -> Result<Event> {
    ledger.append_command(command)?;
    run_state.record_command(&command.message_id, &command.correlation_id)?;
    agent.supervisor.send_command(command).await?;

    let expected_agent_type = command.to.agent_type;
    let mut last_activity = Instant::now();
    let mut ticker = tokio::time::interval(Duration::from_secs(5).min(agent.heartbeat_timeout));
    ticker.tick().await; // first tick fires immediately; consume it

    loop {
        tokio::select! {
            _ = cancel.cancelled() => return Err(EngineError::Cancelled),
            event = agent.channels.events.recv() => {
                let Some(event) = event else {
                    return Err(EngineError::Transport(format!(
                        "{} event channel closed while awaiting {}",
                        expected_agent_type, command.action.as_str()
                    )));
                };
                last_activity = Instant::now();
                ledger.append_event(&event)?;
                run_state.record_event(&event.message_id)?;
                if event.correlation_id != command.correlation_id {
                    tracing::debug!(
                        correlation_id = %event.correlation_id,
                        expected = %command.correlation_id,
                        "ignoring stale event for a different command"
                    );
                    continue;
                }
                if event.from.agent_type != expected_agent_type {
                    tracing::warn!(
                        from = %event.from.agent_type,
                        expected = %expected_agent_type,
                        "ignoring event from unexpected agent type"
                    );
                    continue;
                }
                if terminal_tags.contains(&event.event.as_str()) {
                    run_state.record_terminal(event.from.agent_type, &event.message_id)?;
                    return Ok(event);
                }
            }
            heartbeat = agent.channels.heartbeats.recv() => {
                if let Some(heartbeat) = heartbeat {
                    last_activity = Instant::now();
                    ledger.append_heartbeat(&heartbeat)?;
                }
            }
            _ = ticker.tick() => {
                if last_activity.elapsed() > agent.heartbeat_timeout {
                    return Err(EngineError::Timeout {
                        task_id: command.task_id.clone(),
                        action: command.action.as_str().to_string(),
                        detail: format!(
                            "no heartbeat or event from {expected_agent_type} within {:?}",
                            agent.heartbeat_timeout
                        ),
                    });
                }
            }
        }
    }
}
