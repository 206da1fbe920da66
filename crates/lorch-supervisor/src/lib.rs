// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! lorch-supervisor: owns one agent subprocess end to end — spawn, env,
//! pipes, NDJSON framing in both directions, liveness, and clean or
//! forced shutdown (§4.F).

mod supervisor;

pub use supervisor::{
    AgentChannels, AgentSupervisor, AgentSupervisorConfig, SupervisorError, SupervisorStatus,
};
