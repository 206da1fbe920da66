// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! One subprocess, owned end to end (§4.F): spawn, env, pipes; three
//! background workers fan stdout into typed channels and reap the exit
//! status; outgoing writes are serialized through a single mutex so the
//! scheduler can interleave reads and writes without corrupting the
//! framing.

use lorch_proto::{
    Envelope, FramedReader, FramedWriter, Heartbeat, LogLine, ReadOutcome, TransportError,
};
use parking_lot::Mutex as SyncMutex;
use std::collections::HashMap;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::io::BufReader;
use tokio::process::{Child, ChildStdin, Command as ProcessCommand};
use tokio::sync::{mpsc, oneshot, Mutex as AsyncMutex};

/// Bound on every fan-out channel (§5 "bounded channels"): back-pressure is
/// deliberate — a slow consumer stalls the supervisor's writer rather than
/// growing memory without limit.
const CHANNEL_CAPACITY: usize = 256;

/// How long `stop()` waits for graceful exit before killing (§4.F: "≈5 s").
const GRACEFUL_STOP_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("agent already running")]
    AlreadyRunning,
    #[error("agent is not running")]
    NotRunning,
    #[error("failed to spawn subprocess: {0}")]
    SpawnFailed(std::io::Error),
    #[error(transparent)]
    Transport(#[from] TransportError),
}

#[derive(Debug, Clone)]
pub struct AgentSupervisorConfig {
    pub agent_type: lorch_proto::AgentType,
    pub cmd: Vec<String>,
    pub env: HashMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct SupervisorStatus {
    pub running: bool,
    pub pid: Option<u32>,
    pub last_heartbeat: Option<Heartbeat>,
}

/// The four lazy, bounded, back-pressured sequences a caller drains to
/// observe one agent's traffic, handed out once by [`AgentSupervisor::start`].
pub struct AgentChannels {
    pub events: mpsc::Receiver<lorch_proto::Event>,
    pub heartbeats: mpsc::Receiver<Heartbeat>,
    pub logs: mpsc::Receiver<LogLine>,
    pub stderr_lines: mpsc::Receiver<String>,
}

/// Control-plane state (liveness/pid bookkeeping) — accessed only
/// synchronously, never held across an `.await`. The child itself lives
/// inside the exit-waiter task; `stop` reaches it by asking that task to
/// perform the graceful-then-kill sequence rather than owning it directly,
/// since only one task may ever call `Child::wait`.
struct ControlState {
    pid: Option<u32>,
    running: Arc<AtomicBool>,
    stop_tx: mpsc::Sender<oneshot::Sender<()>>,
}

/// Owns one agent subprocess.
///
/// `control` (a sync mutex) and `writer` (an async mutex) are deliberately
/// separate: the writer must be lockable across the `.await` of an actual
/// write, while `control` is only ever touched inside synchronous blocks —
/// mirrors §5's "outbound writes on each subprocess's stdin are
/// mutex-guarded inside the supervisor so the scheduler is free to
/// interleave writes and reads without corrupting the framing."
pub struct AgentSupervisor {
    config: AgentSupervisorConfig,
    control: SyncMutex<Option<ControlState>>,
    writer: AsyncMutex<Option<FramedWriter<ChildStdin>>>,
    last_heartbeat: Arc<SyncMutex<Option<Heartbeat>>>,
}

impl AgentSupervisor {
    pub fn new(config: AgentSupervisorConfig) -> Self {
        Self {
            config,
            control: SyncMutex::new(None),
            writer: AsyncMutex::new(None),
            last_heartbeat: Arc::new(SyncMutex::new(None)),
        }
    }

    pub fn agent_type(&self) -> lorch_proto::AgentType {
        self.config.agent_type
    }

    /// Spawns the configured subprocess, inheriting the parent environment
    /// and overlaying `config.env`, plus `AGENT_TYPE` (§6: "the core sets
    /// `AGENT_TYPE` on each spawned subprocess"). Returns once the process
    /// is launched and pipes are bound; fails if already running.
    pub fn start(&self) -> Result<AgentChannels, SupervisorError> {
        let mut control = self.control.lock();
        if control.is_some() {
            return Err(SupervisorError::AlreadyRunning);
        }
        if self.config.cmd.is_empty() {
            return Err(SupervisorError::SpawnFailed(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "empty cmd",
            )));
        }

        let mut proc_cmd = ProcessCommand::new(&self.config.cmd[0]);
        proc_cmd
            .args(&self.config.cmd[1..])
            .env("AGENT_TYPE", self.config.agent_type.as_str())
            .envs(&self.config.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = proc_cmd.spawn().map_err(SupervisorError::SpawnFailed)?;
        let pid = child.id();

        let missing_pipe = || {
            SupervisorError::SpawnFailed(std::io::Error::new(
                std::io::ErrorKind::Other,
                "subprocess did not expose a piped stdio handle",
            ))
        };
        let stdin = child.stdin.take().ok_or_else(missing_pipe)?;
        let stdout = child.stdout.take().ok_or_else(missing_pipe)?;
        let stderr = child.stderr.take().ok_or_else(missing_pipe)?;

        let (event_tx, event_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (heartbeat_tx, heartbeat_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (log_tx, log_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (stderr_tx, stderr_rx) = mpsc::channel(CHANNEL_CAPACITY);

        let agent_type = self.config.agent_type;
        let last_heartbeat = self.last_heartbeat.clone();
        tokio::spawn(stdout_reader(
            agent_type,
            BufReader::new(stdout),
            event_tx,
            heartbeat_tx,
            log_tx,
            last_heartbeat,
        ));
        tokio::spawn(stderr_reader(BufReader::new(stderr), stderr_tx));

        let running = Arc::new(AtomicBool::new(true));
        let (stop_tx, stop_rx) = mpsc::channel(1);
        tokio::spawn(exit_waiter(agent_type, child, running.clone(), stop_rx));

        tracing::info!(agent_type = %agent_type, pid, "agent subprocess spawned");

        *control = Some(ControlState { pid, running, stop_tx });
        // Uncontended: `start` holds the only reference to `self` that can
        // reach the writer this early, and no command can be in flight
        // before `start` returns.
        if let Ok(mut writer_guard) = self.writer.try_lock() {
            *writer_guard = Some(FramedWriter::new(stdin));
        }

        Ok(AgentChannels { events: event_rx, heartbeats: heartbeat_rx, logs: log_rx, stderr_lines: stderr_rx })
    }

    /// Serializes and writes one command. Fails if not running. Only one
    /// write may be in flight at a time — the async mutex enforces that
    /// without blocking the executor thread.
    pub async fn send_command(&self, command: &lorch_proto::Command) -> Result<(), SupervisorError> {
        let envelope = Envelope::Command(command.clone());
        let mut guard = self.writer.lock().await;
        let writer = guard.as_mut().ok_or(SupervisorError::NotRunning)?;
        writer.write_envelope(&envelope).await?;
        Ok(())
    }

    /// Returns the most recently received heartbeat, for liveness checks.
    pub fn last_heartbeat(&self) -> Option<Heartbeat> {
        self.last_heartbeat.lock().clone()
    }

    /// `running` reflects the exit waiter's view of the child, not merely
    /// whether `control` has been populated — an unprompted crash flips it
    /// to `false` on its own, without a `stop()` call (§4.F).
    pub fn status(&self) -> SupervisorStatus {
        let control = self.control.lock();
        let running = control.as_ref().map(|s| s.running.load(Ordering::SeqCst)).unwrap_or(false);
        let pid = control.as_ref().and_then(|s| s.pid);
        SupervisorStatus { running, pid, last_heartbeat: self.last_heartbeat() }
    }

    /// Closes stdin (signals the agent to exit on EOF), then asks the
    /// exit-waiter task to wait up to [`GRACEFUL_STOP_TIMEOUT`] and kill if
    /// the process hasn't exited by then — the waiter is the only task
    /// allowed to call `Child::wait`, so `stop` hands off to it rather than
    /// reaping the child itself. Safe to call twice — a second call on an
    /// already-stopped supervisor is a no-op.
    pub async fn stop(&self) -> Result<(), SupervisorError> {
        // Drop the writer first: closing stdin signals EOF to the agent.
        { self.writer.lock().await.take(); }

        let stop_tx = {
            let mut control = self.control.lock();
            match control.take() {
                Some(s) => s.stop_tx,
                None => return Ok(()),
            }
        };

        let (ack_tx, ack_rx) = oneshot::channel();
        if stop_tx.send(ack_tx).await.is_ok() {
            let _ = ack_rx.await;
        }
        Ok(())
    }
}

/// The third background worker (§4.F): owns the `Child` for the rest of
/// its life, reaping it either because it exits on its own (flipping
/// `running` to `false` without anyone calling `stop`) or because `stop`
/// asked it to, in which case it waits up to [`GRACEFUL_STOP_TIMEOUT`]
/// before killing.
async fn exit_waiter(
    agent_type: lorch_proto::AgentType,
    mut child: Child,
    running: Arc<AtomicBool>,
    mut stop_rx: mpsc::Receiver<oneshot::Sender<()>>,
) {
    tokio::select! {
        status = child.wait() => {
            running.store(false, Ordering::SeqCst);
            match status {
                Ok(status) => tracing::info!(agent_type = %agent_type, ?status, "agent exited"),
                Err(e) => tracing::warn!(agent_type = %agent_type, error = %e, "error waiting on agent exit"),
            }
            // Drain a racing stop() so its ack_rx doesn't hang forever.
            if let Ok(ack) = stop_rx.try_recv() {
                let _ = ack.send(());
            }
        }
        Some(ack) = stop_rx.recv() => {
            match tokio::time::timeout(GRACEFUL_STOP_TIMEOUT, child.wait()).await {
                Ok(Ok(status)) => {
                    tracing::info!(agent_type = %agent_type, ?status, "agent exited cleanly");
                }
                Ok(Err(e)) => {
                    tracing::warn!(agent_type = %agent_type, error = %e, "error waiting on agent exit");
                }
                Err(_) => {
                    tracing::warn!(agent_type = %agent_type, "agent did not exit within grace period, killing");
                    let _ = child.start_kill();
                    let _ = child.wait().await;
                }
            }
            running.store(false, Ordering::SeqCst);
            let _ = ack.send(());
        }
    }
}

async fn stdout_reader(
    agent_type: lorch_proto::AgentType,
    stdout: BufReader<tokio::process::ChildStdout>,
    event_tx: mpsc::Sender<lorch_proto::Event>,
    heartbeat_tx: mpsc::Sender<Heartbeat>,
    log_tx: mpsc::Sender<LogLine>,
    last_heartbeat: Arc<SyncMutex<Option<Heartbeat>>>,
) {
    let mut reader = FramedReader::new(stdout);
    loop {
        match reader.read_next().await {
            Ok(ReadOutcome::Envelope(Envelope::Event(event))) => {
                if event_tx.send(event).await.is_err() {
                    break;
                }
            }
            Ok(ReadOutcome::Envelope(Envelope::Heartbeat(hb))) => {
                *last_heartbeat.lock() = Some(hb.clone());
                if heartbeat_tx.send(hb).await.is_err() {
                    break;
                }
            }
            Ok(ReadOutcome::Envelope(Envelope::Log(log))) => {
                if log_tx.send(log).await.is_err() {
                    break;
                }
            }
            Ok(ReadOutcome::Envelope(Envelope::Command(_))) => {
                tracing::warn!(agent_type = %agent_type, "dropped unexpected command envelope on agent stdout");
            }
            Ok(ReadOutcome::ParseError { raw, error }) => {
                tracing::warn!(agent_type = %agent_type, error = %error, raw = %raw, "dropped unparseable line on agent stdout");
            }
            Ok(ReadOutcome::EndOfStream) => break,
            Err(e) => {
                tracing::error!(agent_type = %agent_type, error = %e, "agent stdout transport error");
                break;
            }
        }
    }
}

async fn stderr_reader(
    mut stderr: BufReader<tokio::process::ChildStderr>,
    stderr_tx: mpsc::Sender<String>,
) {
    use tokio::io::AsyncBufReadExt;
    let mut line = String::new();
    loop {
        line.clear();
        match stderr.read_line(&mut line).await {
            Ok(0) => break,
            Ok(_) => {
                let text = line.trim_end_matches(['\n', '\r']).to_string();
                if stderr_tx.send(text).await.is_err() {
                    break;
                }
            }
            Err(_) => break,
        }
    }
}

#[cfg(test)]
#[path = "supervisor_tests.rs"]
mod tests;
