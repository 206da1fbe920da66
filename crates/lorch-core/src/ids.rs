// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! ID generation. IDs are prefixed so they're self-describing in logs and
//! ledger dumps (`msg-`, `run-`, `corr-`, `snap-`), mirroring the
//! convention the rest of this codebase uses for its own identifiers.

use nanoid::nanoid;

const ALPHABET: [char; 36] = [
    '0', '1', '2', '3', '4', '5', '6', '7', '8', '9', 'a', 'b', 'c', 'd', 'e', 'f', 'g', 'h', 'i',
    'j', 'k', 'l', 'm', 'n', 'o', 'p', 'q', 'r', 's', 't', 'u', 'v', 'w', 'x', 'y', 'z',
];

fn random_suffix(len: usize) -> String {
    nanoid!(len, &ALPHABET)
}

/// `msg-<16 random chars>`
pub fn new_message_id() -> String {
    format!("msg-{}", random_suffix(16))
}

/// `run-<12 random chars>`
pub fn new_run_id() -> String {
    format!("run-{}", random_suffix(12))
}

/// `corr-<prefix>-<8 random chars>`
pub fn new_correlation_id(prefix: &str) -> String {
    format!("corr-{}-{}", prefix, random_suffix(8))
}

/// `<intake_correlation_id>|activate-<8 random chars>` per §4.I, used so
/// receipt lineage can recover the intake correlation id even when only
/// the activation command's correlation id survives.
pub fn activation_correlation_id(intake_correlation_id: Option<&str>, task_id: &str) -> String {
    match intake_correlation_id {
        Some(intake_corr) => format!("{intake_corr}|activate-{}", random_suffix(8)),
        None => format!("corr-activate-{task_id}-{}", random_suffix(8)),
    }
}

/// Parses `"<intake-corr>|<activation-corr>"` back into its intake half,
/// the fallback the receipt store uses when a command's `inputs` carry no
/// explicit `intake_correlation_id` (§4.E).
pub fn intake_correlation_from_pipe(correlation_id: &str) -> Option<&str> {
    correlation_id.split_once('|').map(|(intake, _)| intake)
}
