// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Custom error type that carries a process exit code.
//!
//! Commands return `ExitError` instead of calling `std::process::exit()`
//! directly, allowing `main()` to handle process termination.

use std::fmt;

#[derive(Debug)]
pub struct ExitError {
    pub code: i32,
    pub message: String,
}

impl ExitError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self { code, message: message.into() }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(2, message)
    }

    pub fn run_failed(message: impl Into<String>) -> Self {
        Self::new(1, message)
    }
}

impl fmt::Display for ExitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ExitError {}

impl From<lorch_core::LorchError> for ExitError {
    fn from(err: lorch_core::LorchError) -> Self {
        match err {
            lorch_core::LorchError::Configuration(_) => Self::new(2, err.to_string()),
            other => Self::new(1, other.to_string()),
        }
    }
}

impl From<lorch_engine::EngineError> for ExitError {
    fn from(err: lorch_engine::EngineError) -> Self {
        use lorch_engine::EngineError::*;
        match err {
            UserDeclined(msg) => Self::new(3, format!("intake declined: {msg}")),
            Cancelled => Self::new(130, "cancelled"),
            Core(e) => e.into(),
            other => Self::new(1, other.to_string()),
        }
    }
}
