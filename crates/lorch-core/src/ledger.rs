// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The append-only event ledger (§4.C): one NDJSON file per run, holding
//! every command, event, heartbeat, and log line ever sent or received.
//! Writes are serialized through an internal lock; reads reconstruct three
//! indexed lists plus the derived `terminal_events` map.

use crate::error::Result;
use lorch_proto::{event_tags, Action, Command, Envelope, Event, Heartbeat, LogLine};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

/// The three indexed views over a ledger, plus the derived
/// `terminal_events` map keyed by the triggering command's `message_id`.
#[derive(Debug, Clone, Default)]
pub struct LedgerView {
    pub commands: Vec<Command>,
    pub events: Vec<Event>,
    pub heartbeats: Vec<Heartbeat>,
    pub logs: Vec<LogLine>,
    pub terminal_events: HashMap<String, Event>,
}

impl LedgerView {
    /// Commands whose `message_id` has no entry in `terminal_events`.
    pub fn pending_commands(&self) -> Vec<&Command> {
        self.commands.iter().filter(|c| !self.terminal_events.contains_key(&c.message_id)).collect()
    }

    /// All events carrying the given `correlation_id`, in ledger order.
    pub fn events_for_correlation(&self, correlation_id: &str) -> Vec<&Event> {
        self.events.iter().filter(|e| e.correlation_id == correlation_id).collect()
    }

    /// The most recent command with the given `correlation_id`, if any.
    pub fn last_command_for_correlation(&self, correlation_id: &str) -> Option<&Command> {
        self.commands.iter().rev().find(|c| c.correlation_id == correlation_id)
    }
}

/// The terminal event tags that conclude a command for the given action
/// (§4.C). `update_spec`'s `spec.changes_requested` concludes the
/// *command* but not the task — callers distinguish that at the scheduler
/// layer, not here.
pub fn terminal_tags_for(action: Action) -> &'static [&'static str] {
    match action {
        Action::Implement | Action::ImplementChanges => &[event_tags::BUILDER_COMPLETED],
        Action::Review => &[event_tags::REVIEW_COMPLETED],
        Action::UpdateSpec => &[
            event_tags::SPEC_UPDATED,
            event_tags::SPEC_NO_CHANGES_NEEDED,
            event_tags::SPEC_CHANGES_REQUESTED,
        ],
        Action::Intake | Action::TaskDiscovery => &[
            event_tags::ORCHESTRATION_PROPOSED_TASKS,
            event_tags::ORCHESTRATION_NEEDS_CLARIFICATION,
            event_tags::ORCHESTRATION_PLAN_CONFLICT,
        ],
    }
}

/// Finds the first event (in ledger/chronological order) matching
/// `correlation_id` whose `event` tag is one of this action's terminal
/// tags.
pub fn find_terminal_event<'a>(
    action: Action,
    correlation_id: &str,
    events: &'a [Event],
) -> Option<&'a Event> {
    let tags = terminal_tags_for(action);
    events
        .iter()
        .find(|e| e.correlation_id == correlation_id && tags.contains(&e.event.as_str()))
}

fn build_view(entries: Vec<Envelope>) -> LedgerView {
    let mut view = LedgerView::default();
    for entry in entries {
        match entry {
            Envelope::Command(c) => view.commands.push(c),
            Envelope::Event(e) => view.events.push(e),
            Envelope::Heartbeat(h) => view.heartbeats.push(h),
            Envelope::Log(l) => view.logs.push(l),
        }
    }
    for command in &view.commands {
        if let Some(event) =
            find_terminal_event(command.action, &command.correlation_id, &view.events)
        {
            view.terminal_events.entry(command.message_id.clone()).or_insert_with(|| event.clone());
        }
    }
    view
}

/// An append-only NDJSON ledger backed by a single file.
pub struct Ledger {
    path: PathBuf,
    file: Mutex<File>,
}

impl Ledger {
    /// Opens (creating if absent) the ledger file at `path` in append-only
    /// mode, 0600 inside its (already 0700) parent directory.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(dir) = path.parent() {
            crate::atomic::ensure_dir(dir)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            file.set_permissions(std::fs::Permissions::from_mode(0o600))?;
        }
        Ok(Self { path: path.to_path_buf(), file: Mutex::new(file) })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends one envelope as a single NDJSON line and fsyncs it before
    /// returning, so a later reply can never cause a state change for a
    /// command that isn't durably on disk yet (Invariant 2).
    pub fn append(&self, envelope: &Envelope) -> Result<()> {
        let mut line = serde_json::to_vec(envelope)?;
        line.push(b'\n');
        let mut file = self.file.lock();
        file.write_all(&line)?;
        file.sync_all()?;
        Ok(())
    }

    pub fn append_command(&self, command: &Command) -> Result<()> {
        self.append(&Envelope::Command(command.clone()))
    }

    pub fn append_event(&self, event: &Event) -> Result<()> {
        self.append(&Envelope::Event(event.clone()))
    }

    pub fn append_heartbeat(&self, heartbeat: &Heartbeat) -> Result<()> {
        self.append(&Envelope::Heartbeat(heartbeat.clone()))
    }

    /// Reads the whole ledger from disk and reconstructs its view. Lines
    /// that fail to parse are skipped — by construction the ledger never
    /// writes an unparseable line, but a reader tolerates one anyway
    /// rather than aborting a resume.
    pub fn read_view(path: &Path) -> Result<LedgerView> {
        if !path.exists() {
            return Ok(LedgerView::default());
        }
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        let mut entries = Vec::new();
        for line in reader.lines() {
            let line = line?;
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            if let Ok(envelope) = serde_json::from_str::<Envelope>(trimmed) {
                entries.push(envelope);
            }
        }
        Ok(build_view(entries))
    }

    /// Re-reads this ledger's own file.
    pub fn view(&self) -> Result<LedgerView> {
        Self::read_view(&self.path)
    }
}
