// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! lorch-proto: frozen wire protocol shared between the orchestrator core
//! and every agent subprocess — envelopes, canonical JSON, and the
//! idempotency keyer.

pub mod canonical;
pub mod envelope;
pub mod idempotency;
pub mod transport;

pub use canonical::canonical_json;
pub use envelope::{
    event_tags, Action, AgentRef, AgentType, Artifact, Command, Envelope, Event, ExpectedOutput,
    Heartbeat, HeartbeatStatus, Inputs, LogLine, LogStream, Retry, Version,
};
pub use idempotency::idempotency_key;
pub use transport::{FramedReader, FramedWriter, ReadOutcome, TransportError};
