use super::*;
use crate::fleet::AgentFleet;
use crate::test_support::{one_shot_reply_script, sample_activation_task, sh_agent, Harness};
use chrono::Utc;
use lorch_proto::{Action, AgentRef, AgentType, Inputs};
use tokio_util::sync::CancellationToken;

const BUILDER_PASS: &str = r#"{"kind":"event","message_id":"evt-b1","correlation_id":"%s","task_id":"t1","from":{"agent_type":"builder","agent_id":"a1"},"event":"builder.completed","status":null,"payload":{"tests":{"status":"pass"}},"artifacts":[],"occurred_at":"2026-01-01T00:00:00Z"}"#;
const REVIEW_APPROVED: &str = r#"{"kind":"event","message_id":"evt-r1","correlation_id":"%s","task_id":"t1","from":{"agent_type":"reviewer","agent_id":"a1"},"event":"review.completed","status":"approved","payload":{},"artifacts":[],"occurred_at":"2026-01-01T00:00:00Z"}"#;
const SPEC_UPDATED: &str = r#"{"kind":"event","message_id":"evt-s1","correlation_id":"%s","task_id":"t1","from":{"agent_type":"spec_maintainer","agent_id":"a1"},"event":"spec.updated","status":null,"payload":{},"artifacts":[],"occurred_at":"2026-01-01T00:00:00Z"}"#;

fn idle_fleet() -> AgentFleet {
    // never actually sent a command in tests where resume should short-circuit
    // before reaching any agent; `cat > /dev/null` just sits there.
    AgentFleet {
        builder: sh_agent(AgentType::Builder, "cat > /dev/null"),
        reviewer: sh_agent(AgentType::Reviewer, "cat > /dev/null"),
        spec_maintainer: sh_agent(AgentType::SpecMaintainer, "cat > /dev/null"),
        orchestration: None,
    }
}

fn seed_event(h: &Harness, tag: &str, status: Option<&str>, from: AgentType) {
    let event = Event {
        message_id: lorch_core::ids::new_message_id(),
        correlation_id: "corr-hist-1".to_string(),
        task_id: "t1".to_string(),
        from: AgentRef { agent_type: from, agent_id: "a1".to_string() },
        event: tag.to_string(),
        status: status.map(str::to_string),
        payload: Inputs::new(),
        artifacts: Vec::new(),
        occurred_at: Utc::now(),
    };
    h.ledger.append_event(&event).unwrap();
}

#[tokio::test]
async fn completed_run_is_a_pure_no_op() {
    let h = Harness::new();
    h.run_state.mark_completed(Utc::now()).unwrap();
    let task = sample_activation_task("t1", &h.dir.path().join("plan.md"));
    let mut fleet = idle_fleet();
    let cancel = CancellationToken::new();

    resume(&h.ledger, &h.run_state, &h.receipts(), &mut fleet, &task, 30, &cancel).await.unwrap();

    fleet.stop_all().await;
}

#[tokio::test]
async fn aborted_run_refuses_to_resume() {
    let h = Harness::new();
    h.run_state.mark_aborted(Utc::now()).unwrap();
    let task = sample_activation_task("t1", &h.dir.path().join("plan.md"));
    let mut fleet = idle_fleet();
    let cancel = CancellationToken::new();

    let err =
        resume(&h.ledger, &h.run_state, &h.receipts(), &mut fleet, &task, 30, &cancel).await.unwrap_err();
    assert!(matches!(err, EngineError::Precondition(_)));

    fleet.stop_all().await;
}

#[tokio::test]
async fn already_activated_task_is_a_no_op() {
    let h = Harness::new();
    h.run_state.mark_task_activated("t1").unwrap();
    let task = sample_activation_task("t1", &h.dir.path().join("plan.md"));
    let mut fleet = idle_fleet();
    let cancel = CancellationToken::new();

    resume(&h.ledger, &h.run_state, &h.receipts(), &mut fleet, &task, 30, &cancel).await.unwrap();

    fleet.stop_all().await;
}

#[tokio::test]
async fn spec_updated_in_ledger_marks_task_complete_without_touching_agents() {
    let h = Harness::new();
    seed_event(&h, event_tags::BUILDER_COMPLETED, None, AgentType::Builder);
    seed_event(&h, event_tags::REVIEW_COMPLETED, Some("approved"), AgentType::Reviewer);
    seed_event(&h, event_tags::SPEC_UPDATED, None, AgentType::SpecMaintainer);
    let task = sample_activation_task("t1", &h.dir.path().join("plan.md"));
    let mut fleet = idle_fleet();
    let cancel = CancellationToken::new();

    resume(&h.ledger, &h.run_state, &h.receipts(), &mut fleet, &task, 30, &cancel).await.unwrap();
    assert!(h.run_state.is_task_activated("t1"));

    fleet.stop_all().await;
}

#[tokio::test]
async fn mid_spec_loop_with_both_followups_present_resumes_in_spec_maintain() {
    let h = Harness::new();
    seed_event(&h, event_tags::BUILDER_COMPLETED, None, AgentType::Builder);
    seed_event(&h, event_tags::REVIEW_COMPLETED, Some("approved"), AgentType::Reviewer);
    seed_event(&h, event_tags::SPEC_CHANGES_REQUESTED, None, AgentType::SpecMaintainer);
    // the nested implement_changes/review cycle already completed after the
    // changes_requested event:
    seed_event(&h, event_tags::BUILDER_COMPLETED, None, AgentType::Builder);
    seed_event(&h, event_tags::REVIEW_COMPLETED, Some("approved"), AgentType::Reviewer);

    let task = sample_activation_task("t1", &h.dir.path().join("plan.md"));
    let mut fleet = AgentFleet {
        builder: sh_agent(AgentType::Builder, "cat > /dev/null"),
        reviewer: sh_agent(AgentType::Reviewer, "cat > /dev/null"),
        spec_maintainer: sh_agent(AgentType::SpecMaintainer, &one_shot_reply_script(SPEC_UPDATED)),
        orchestration: None,
    };
    let cancel = CancellationToken::new();

    resume(&h.ledger, &h.run_state, &h.receipts(), &mut fleet, &task, 30, &cancel).await.unwrap();
    assert!(h.run_state.is_task_activated("t1"));

    let view = h.ledger.view().unwrap();
    // only the spec_maintainer is re-contacted; no fresh implement/review commands.
    assert_eq!(view.commands.iter().filter(|c| c.action == Action::UpdateSpec).count(), 1);
    assert_eq!(view.commands.iter().filter(|c| c.action == Action::Implement).count(), 0);
    assert_eq!(view.commands.iter().filter(|c| c.action == Action::Review).count(), 0);

    fleet.stop_all().await;
}

#[tokio::test]
async fn mid_spec_loop_without_followups_redoes_implement_changes_and_review() {
    let h = Harness::new();
    seed_event(&h, event_tags::BUILDER_COMPLETED, None, AgentType::Builder);
    seed_event(&h, event_tags::REVIEW_COMPLETED, Some("approved"), AgentType::Reviewer);
    seed_event(&h, event_tags::SPEC_CHANGES_REQUESTED, None, AgentType::SpecMaintainer);
    // interrupted before the nested cycle produced anything further

    let task = sample_activation_task("t1", &h.dir.path().join("plan.md"));
    let mut fleet = AgentFleet {
        builder: sh_agent(AgentType::Builder, &one_shot_reply_script(BUILDER_PASS)),
        reviewer: sh_agent(AgentType::Reviewer, &one_shot_reply_script(REVIEW_APPROVED)),
        spec_maintainer: sh_agent(AgentType::SpecMaintainer, &one_shot_reply_script(SPEC_UPDATED)),
        orchestration: None,
    };
    let cancel = CancellationToken::new();

    resume(&h.ledger, &h.run_state, &h.receipts(), &mut fleet, &task, 30, &cancel).await.unwrap();
    assert!(h.run_state.is_task_activated("t1"));

    let view = h.ledger.view().unwrap();
    assert_eq!(view.commands.iter().filter(|c| c.action == Action::ImplementChanges).count(), 1);
    assert_eq!(view.commands.iter().filter(|c| c.action == Action::Review).count(), 1);
    assert_eq!(view.commands.iter().filter(|c| c.action == Action::UpdateSpec).count(), 1);

    fleet.stop_all().await;
}

#[tokio::test]
async fn review_approved_with_no_spec_event_resumes_at_spec_maintain() {
    let h = Harness::new();
    seed_event(&h, event_tags::BUILDER_COMPLETED, None, AgentType::Builder);
    seed_event(&h, event_tags::REVIEW_COMPLETED, Some("approved"), AgentType::Reviewer);

    let task = sample_activation_task("t1", &h.dir.path().join("plan.md"));
    let mut fleet = AgentFleet {
        builder: sh_agent(AgentType::Builder, "cat > /dev/null"),
        reviewer: sh_agent(AgentType::Reviewer, "cat > /dev/null"),
        spec_maintainer: sh_agent(AgentType::SpecMaintainer, &one_shot_reply_script(SPEC_UPDATED)),
        orchestration: None,
    };
    let cancel = CancellationToken::new();

    resume(&h.ledger, &h.run_state, &h.receipts(), &mut fleet, &task, 30, &cancel).await.unwrap();
    assert!(h.run_state.is_task_activated("t1"));

    let view = h.ledger.view().unwrap();
    assert_eq!(view.commands.iter().filter(|c| c.action == Action::UpdateSpec).count(), 1);
    assert_eq!(view.commands.iter().filter(|c| c.action == Action::Review).count(), 0);

    fleet.stop_all().await;
}

#[tokio::test]
async fn builder_completed_with_no_review_resumes_at_review() {
    let h = Harness::new();
    seed_event(&h, event_tags::BUILDER_COMPLETED, None, AgentType::Builder);

    let task = sample_activation_task("t1", &h.dir.path().join("plan.md"));
    let mut fleet = AgentFleet {
        builder: sh_agent(AgentType::Builder, "cat > /dev/null"),
        reviewer: sh_agent(AgentType::Reviewer, &one_shot_reply_script(REVIEW_APPROVED)),
        spec_maintainer: sh_agent(AgentType::SpecMaintainer, &one_shot_reply_script(SPEC_UPDATED)),
        orchestration: None,
    };
    let cancel = CancellationToken::new();

    resume(&h.ledger, &h.run_state, &h.receipts(), &mut fleet, &task, 30, &cancel).await.unwrap();
    assert!(h.run_state.is_task_activated("t1"));

    let view = h.ledger.view().unwrap();
    assert_eq!(view.commands.iter().filter(|c| c.action == Action::Review).count(), 1);
    assert_eq!(view.commands.iter().filter(|c| c.action == Action::Implement).count(), 0);

    fleet.stop_all().await;
}

#[tokio::test]
async fn no_ledger_history_falls_through_to_a_fresh_execute() {
    let h = Harness::new();
    let task = sample_activation_task("t1", &h.dir.path().join("plan.md"));
    let mut fleet = AgentFleet {
        builder: sh_agent(AgentType::Builder, &one_shot_reply_script(BUILDER_PASS)),
        reviewer: sh_agent(AgentType::Reviewer, &one_shot_reply_script(REVIEW_APPROVED)),
        spec_maintainer: sh_agent(AgentType::SpecMaintainer, &one_shot_reply_script(SPEC_UPDATED)),
        orchestration: None,
    };
    let cancel = CancellationToken::new();

    resume(&h.ledger, &h.run_state, &h.receipts(), &mut fleet, &task, 30, &cancel).await.unwrap();
    assert!(h.run_state.is_task_activated("t1"));

    let view = h.ledger.view().unwrap();
    assert_eq!(view.commands.iter().filter(|c| c.action == Action::Implement).count(), 1);

    fleet.stop_all().await;
}
