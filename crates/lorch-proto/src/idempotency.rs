// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The idempotency keyer. A command's key is derived from exactly five
//! fields — `action`, `task_id`, `version.snapshot_id`, `canonical(inputs)`,
//! `canonical(expected_outputs)` — and nothing else. `message_id`,
//! `correlation_id`, `deadline`, `priority`, and `retry` must never
//! influence it: those vary across retries of the same logical attempt,
//! while the key must not.

use crate::canonical::canonical_json;
use crate::envelope::{Action, ExpectedOutput, Inputs};
use serde_json::Value;
use sha2::{Digest, Sha256};

/// Computes `ik:<hex sha256>` over the five key-bearing fields.
pub fn idempotency_key(
    action: Action,
    task_id: &str,
    snapshot_id: &str,
    inputs: &Inputs,
    expected_outputs: &[ExpectedOutput],
) -> String {
    let inputs_value = Value::Object(inputs.clone());
    let outputs_value =
        serde_json::to_value(expected_outputs).unwrap_or_else(|_| Value::Array(Vec::new()));

    let mut hasher = Sha256::new();
    hasher.update(action.as_str().as_bytes());
    hasher.update(b"\n");
    hasher.update(task_id.as_bytes());
    hasher.update(b"\n");
    hasher.update(snapshot_id.as_bytes());
    hasher.update(b"\n");
    hasher.update(canonical_json(&inputs_value).as_bytes());
    hasher.update(b"\n");
    hasher.update(canonical_json(&outputs_value).as_bytes());

    format!("ik:{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn inputs(pairs: &[(&str, Value)]) -> Inputs {
        let mut m = Inputs::new();
        for (k, v) in pairs {
            m.insert(k.to_string(), v.clone());
        }
        m
    }

    #[test]
    fn identical_five_fields_yield_identical_key() {
        let i1 = inputs(&[("a", json!(1)), ("b", json!("x"))]);
        let i2 = inputs(&[("b", json!("x")), ("a", json!(1))]); // different insertion order
        let outputs = vec![ExpectedOutput {
            path: "src/foo.rs".into(),
            description: "".into(),
            required: true,
        }];
        let k1 = idempotency_key(Action::Implement, "t1", "snap-abc", &i1, &outputs);
        let k2 = idempotency_key(Action::Implement, "t1", "snap-abc", &i2, &outputs);
        assert_eq!(k1, k2);
    }

    #[test]
    fn changing_any_of_the_five_fields_changes_the_key() {
        let base_inputs = inputs(&[("goal", json!("x"))]);
        let outputs = vec![ExpectedOutput {
            path: "a".into(),
            description: "".into(),
            required: true,
        }];
        let base = idempotency_key(Action::Implement, "t1", "snap-1", &base_inputs, &outputs);

        assert_ne!(base, idempotency_key(Action::Review, "t1", "snap-1", &base_inputs, &outputs));
        assert_ne!(
            base,
            idempotency_key(Action::Implement, "t2", "snap-1", &base_inputs, &outputs)
        );
        assert_ne!(
            base,
            idempotency_key(Action::Implement, "t1", "snap-2", &base_inputs, &outputs)
        );
        let other_inputs = inputs(&[("goal", json!("y"))]);
        assert_ne!(
            base,
            idempotency_key(Action::Implement, "t1", "snap-1", &other_inputs, &outputs)
        );
        let other_outputs = vec![ExpectedOutput {
            path: "b".into(),
            description: "".into(),
            required: true,
        }];
        assert_ne!(
            base,
            idempotency_key(Action::Implement, "t1", "snap-1", &base_inputs, &other_outputs)
        );
    }

    #[test]
    fn key_has_stable_prefix() {
        let k = idempotency_key(Action::Intake, "t1", "snap-1", &Inputs::new(), &[]);
        assert!(k.starts_with("ik:"));
        assert_eq!(k.len(), "ik:".len() + 64);
    }
}
