// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! lorch-core: the durability layer — atomic writes, ids, clock, workspace
//! paths, config validation, the event ledger, the run-state store, the
//! receipt store, and snapshot capture.

pub mod atomic;
pub mod clock;
pub mod config;
pub mod error;
pub mod ids;
pub mod ledger;
pub mod layout;
pub mod receipt;
pub mod run_state;
pub mod snapshot;
pub mod wspath;

pub use clock::{Clock, FakeClock, SystemClock};
pub use config::{AgentConfig, AgentsConfig, Config, PolicyConfig};
pub use error::LorchError;
pub use layout::WorkspaceLayout;
pub use ledger::{terminal_tags_for, Ledger, LedgerView};
pub use receipt::{Receipt, ReceiptStore};
pub use run_state::{IntakeState, PendingIntakeCommand, RunState, RunStateStore, RunStatus, Stage};
pub use snapshot::{FileEntry, SnapshotManifest};
