use super::*;
use crate::test_support::{one_shot_reply_script, sh_agent, Harness};
use lorch_proto::AgentType;
use tokio_util::sync::CancellationToken;

struct ScriptedPrompter {
    responses: Vec<PrompterResponse>,
}

impl Prompter for ScriptedPrompter {
    fn ask(&mut self, _question: &IntakeQuestion) -> PrompterResponse {
        if self.responses.is_empty() {
            panic!("prompter asked more times than the test scripted");
        }
        self.responses.remove(0)
    }
}

const PROPOSED_TASKS_EVENT: &str = r#"{"kind":"event","message_id":"evt-1","correlation_id":"%s","task_id":"","from":{"agent_type":"orchestration","agent_id":"a1"},"event":"orchestration.proposed_tasks","status":null,"payload":{"plan_summary":"Plan A","tasks":[{"id":"t1","title":"Implement feature","files":["src/lib.rs"]}]},"artifacts":[],"occurred_at":"2026-01-01T00:00:00Z"}"#;

const NEEDS_CLARIFICATION_EVENT: &str = r#"{"kind":"event","message_id":"evt-1","correlation_id":"%s","task_id":"","from":{"agent_type":"orchestration","agent_id":"a1"},"event":"orchestration.needs_clarification","status":null,"payload":{"questions":["which API?"]},"artifacts":[],"occurred_at":"2026-01-01T00:00:00Z"}"#;

const PLAN_CONFLICT_EVENT: &str = r#"{"kind":"event","message_id":"evt-1","correlation_id":"%s","task_id":"","from":{"agent_type":"orchestration","agent_id":"a1"},"event":"orchestration.plan_conflict","status":null,"payload":{"description":"two plans touch the same file"},"artifacts":[],"occurred_at":"2026-01-01T00:00:00Z"}"#;

#[tokio::test]
async fn approving_proposed_tasks_concludes_with_one_decision_event() {
    let h = Harness::new();
    let mut agent = sh_agent(AgentType::Orchestration, &one_shot_reply_script(PROPOSED_TASKS_EVENT));
    let mut prompter = ScriptedPrompter { responses: vec![PrompterResponse::Approve] };
    let cancel = CancellationToken::new();

    let outcome = run_intake(
        &h.ledger,
        &h.run_state,
        &mut agent,
        "t1",
        "snap-1",
        "do the thing",
        30,
        &mut prompter,
        &cancel,
    )
    .await
    .unwrap();

    assert_eq!(outcome.decision_status, "approved");
    assert_eq!(outcome.approved_task_ids, vec!["t1".to_string()]);
    assert_eq!(outcome.approved_plan, "Plan A");
    assert!(outcome.derived_tasks.contains_key("t1"));

    let view = h.ledger.view().unwrap();
    let decisions: Vec<_> =
        view.events.iter().filter(|e| e.event == event_tags::SYSTEM_USER_DECISION).collect();
    assert_eq!(decisions.len(), 1);
    assert_eq!(decisions[0].status.as_deref(), Some("approved"));
    assert_eq!(decisions[0].from.agent_type, AgentType::Orchestration);

    assert_eq!(h.run_state.snapshot().intake.unwrap().last_decision.as_deref(), Some("approved"));

    agent.stop().await.ok();
}

#[tokio::test]
async fn declining_proposed_tasks_concludes_with_no_approved_tasks() {
    let h = Harness::new();
    let mut agent = sh_agent(AgentType::Orchestration, &one_shot_reply_script(PROPOSED_TASKS_EVENT));
    let mut prompter = ScriptedPrompter { responses: vec![PrompterResponse::Decline] };
    let cancel = CancellationToken::new();

    let outcome = run_intake(
        &h.ledger,
        &h.run_state,
        &mut agent,
        "t1",
        "snap-1",
        "do the thing",
        30,
        &mut prompter,
        &cancel,
    )
    .await
    .unwrap();

    assert_eq!(outcome.decision_status, "denied");
    assert!(outcome.approved_task_ids.is_empty());

    let view = h.ledger.view().unwrap();
    let decisions: Vec<_> =
        view.events.iter().filter(|e| e.event == event_tags::SYSTEM_USER_DECISION).collect();
    assert_eq!(decisions.len(), 1);
    assert_eq!(decisions[0].status.as_deref(), Some("denied"));
    let reason = decisions[0].payload.get("reason").and_then(|v| v.as_str()).unwrap_or_default();
    assert!(reason.contains("declined"), "reason {reason:?} must contain \"declined\"");

    assert_eq!(h.run_state.snapshot().intake.unwrap().last_decision.as_deref(), Some("denied"));

    agent.stop().await.ok();
}

#[tokio::test]
async fn clarification_round_is_answered_then_agent_proposes_tasks() {
    let h = Harness::new();
    let replies = [NEEDS_CLARIFICATION_EVENT, PROPOSED_TASKS_EVENT];
    let mut agent = sh_agent(
        AgentType::Orchestration,
        &crate::test_support::sequential_reply_script(&replies),
    );
    let mut prompter = ScriptedPrompter {
        responses: vec![
            PrompterResponse::Clarify(vec!["use the REST API".to_string()]),
            PrompterResponse::Approve,
        ],
    };
    let cancel = CancellationToken::new();

    let outcome = run_intake(
        &h.ledger,
        &h.run_state,
        &mut agent,
        "t1",
        "snap-1",
        "do the thing",
        30,
        &mut prompter,
        &cancel,
    )
    .await
    .unwrap();

    assert_eq!(outcome.decision_status, "approved");
    // the correlation id and idempotency key stayed stable across both
    // rounds, even though the second round's inputs carry the answered
    // clarification the first round didn't (§4.H, spec.md scenario S5).
    let view = h.ledger.view().unwrap();
    let corr_ids: std::collections::HashSet<_> =
        view.commands.iter().map(|c| c.correlation_id.clone()).collect();
    assert_eq!(corr_ids.len(), 1);
    let ik_ids: std::collections::HashSet<_> =
        view.commands.iter().map(|c| c.idempotency_key.clone()).collect();
    assert_eq!(ik_ids.len(), 1, "idempotency key must not change across a clarification retry");
    assert_eq!(view.commands.len(), 2);
    assert_ne!(view.commands[0].inputs.get("clarifications"), view.commands[1].inputs.get("clarifications"));

    agent.stop().await.ok();
}

#[tokio::test]
async fn plan_conflict_is_resolved_then_agent_proposes_tasks() {
    let h = Harness::new();
    let replies = [PLAN_CONFLICT_EVENT, PROPOSED_TASKS_EVENT];
    let mut agent = sh_agent(
        AgentType::Orchestration,
        &crate::test_support::sequential_reply_script(&replies),
    );
    let mut prompter = ScriptedPrompter {
        responses: vec![
            PrompterResponse::ResolveConflict(vec!["defer to plan A".to_string()]),
            PrompterResponse::Approve,
        ],
    };
    let cancel = CancellationToken::new();

    let outcome = run_intake(
        &h.ledger,
        &h.run_state,
        &mut agent,
        "t1",
        "snap-1",
        "do the thing",
        30,
        &mut prompter,
        &cancel,
    )
    .await
    .unwrap();

    assert_eq!(outcome.decision_status, "approved");
    agent.stop().await.ok();
}

#[tokio::test]
async fn approving_a_clarification_request_is_a_contract_violation() {
    let h = Harness::new();
    let mut agent =
        sh_agent(AgentType::Orchestration, &one_shot_reply_script(NEEDS_CLARIFICATION_EVENT));
    let mut prompter = ScriptedPrompter { responses: vec![PrompterResponse::Approve] };
    let cancel = CancellationToken::new();

    let err = run_intake(
        &h.ledger,
        &h.run_state,
        &mut agent,
        "t1",
        "snap-1",
        "do the thing",
        30,
        &mut prompter,
        &cancel,
    )
    .await
    .unwrap_err();

    assert!(matches!(err, EngineError::AgentContract { .. }));
    agent.stop().await.ok();
}
