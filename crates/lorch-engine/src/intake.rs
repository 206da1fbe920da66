// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The intake negotiation engine (§4.H): a loop of clarification,
//! plan-conflict, and task-discovery rounds against the orchestration
//! agent, reusing one correlation id until exactly one
//! `system.user_decision` ledger event concludes it.

use crate::activation::DerivedTask;
use crate::error::{EngineError, Result};
use crate::fleet::{send_and_await_terminal, RunningAgent};
use chrono::Utc;
use lorch_core::ids::new_correlation_id;
use lorch_core::{ids, Ledger, RunStateStore};
use lorch_proto::{event_tags, Action, AgentRef, AgentType, Command, Event, ExpectedOutput, Inputs, Retry, Version};
use serde_json::json;
use std::collections::HashMap;
use tokio_util::sync::CancellationToken;

/// What the human operator decides in response to one intake round. The
/// CLI collaborator asks for this; this crate never reads stdin itself.
#[derive(Debug, Clone)]
pub enum PrompterResponse {
    /// The proposed plan and task list are approved as-is.
    Approve,
    /// The operator answers one or more clarification questions in free
    /// text, which is fed back into the next round's inputs.
    Clarify(Vec<String>),
    /// The operator resolves a reported plan conflict, also fed back.
    ResolveConflict(Vec<String>),
    /// The operator rejects the round outright; intake ends undecided.
    Decline,
}

/// One candidate plan from an `orchestration.proposed_tasks` payload,
/// as presented to the operator (§4.H: "ordered by descending confidence;
/// ties broken by input order").
#[derive(Debug, Clone)]
pub struct PlanCandidate {
    pub summary: String,
    pub confidence: f64,
}

/// What the orchestration agent asked for, shown to the operator.
#[derive(Debug, Clone)]
pub enum IntakeQuestion {
    ProposedTasks { plan_summary: String, candidates: Vec<PlanCandidate>, tasks: Vec<(String, DerivedTask)> },
    NeedsClarification { questions: Vec<String> },
    PlanConflict { description: String },
}

/// Collaborator-supplied decision point. §4.H names six narrower
/// callbacks (propose/clarify/conflict/discover/approve/decline); this
/// engine collapses them into one `ask` per round plus a final
/// `notify_approved`, since every one of those callbacks ultimately
/// produces the same shape of answer — a [`PrompterResponse`] — and the
/// `question` argument already tells the implementation which of the six
/// situations it is in.
pub trait Prompter {
    fn ask(&mut self, question: &IntakeQuestion) -> PrompterResponse;
}

/// The terminal outcome of a finished intake negotiation.
#[derive(Debug, Clone)]
pub struct IntakeOutcome {
    pub decision_status: String,
    pub approved_plan: String,
    pub approved_task_ids: Vec<String>,
    pub derived_tasks: HashMap<String, DerivedTask>,
    pub clarifications: Vec<String>,
    pub conflict_resolutions: Vec<String>,
    pub intake_correlation_id: String,
}

/// Runs the intake negotiation to conclusion against `agent` (expected to
/// be the orchestration agent), persisting every round and the single
/// concluding decision event to `ledger`/`run_state` (§4.H, §4.D).
pub async fn run_intake(
    ledger: &Ledger,
    run_state: &RunStateStore,
    agent: &mut RunningAgent,
    task_id: &str,
    snapshot_id: &str,
    instruction: &str,
    deadline_secs: u64,
    prompter: &mut dyn Prompter,
    cancel: &CancellationToken,
) -> Result<IntakeOutcome> {
    let correlation_id = new_correlation_id("intake");
    run_state.init_intake(instruction, Inputs::new())?;

    let mut clarifications: Vec<String> = Vec::new();
    let mut conflict_resolutions: Vec<String> = Vec::new();
    let mut action = Action::Intake;
    // Pins the idempotency key for the current logical round (§4.H step 1):
    // retransmissions within a round (clarification answers, conflict
    // resolutions) must carry byte-identical `idempotency_key` even though
    // `inputs` grows each time. A fresh `task_discovery` round gets its own
    // key. `None` / a changed `action` marks "start a new round".
    let mut round_anchor: Option<(Action, String)> = None;

    loop {
        let mut command = build_round_command(
            task_id,
            snapshot_id,
            instruction,
            &clarifications,
            &conflict_resolutions,
            &correlation_id,
            action,
            deadline_secs,
        );
        match &round_anchor {
            Some((anchor_action, anchor_key)) if *anchor_action == action => {
                command.idempotency_key = anchor_key.clone();
            }
            _ => round_anchor = Some((action, command.idempotency_key.clone())),
        }
        run_state.record_intake_command(
            command.action.as_str(),
            command.inputs.clone(),
            &command.idempotency_key,
            &command.correlation_id,
        )?;

        let terminal_tags = lorch_core::terminal_tags_for(action);
        let event =
            send_and_await_terminal(ledger, run_state, agent, &command, terminal_tags, cancel).await?;

        match event.event.as_str() {
            tag if tag == event_tags::ORCHESTRATION_PROPOSED_TASKS => {
                let (plan, candidates, tasks) = parse_proposed_tasks(&event)?;
                let question = IntakeQuestion::ProposedTasks {
                    plan_summary: plan.clone(),
                    candidates,
                    tasks: tasks.clone().into_iter().collect(),
                };
                match prompter.ask(&question) {
                    PrompterResponse::Approve => {
                        let approved_task_ids: Vec<String> = tasks.keys().cloned().collect();
                        return conclude(
                            ledger,
                            run_state,
                            agent.supervisor.agent_type(),
                            &correlation_id,
                            "approved",
                            plan,
                            approved_task_ids,
                            tasks,
                            clarifications,
                            conflict_resolutions,
                        );
                    }
                    PrompterResponse::Decline => {
                        return conclude(
                            ledger,
                            run_state,
                            agent.supervisor.agent_type(),
                            &correlation_id,
                            "denied",
                            plan,
                            Vec::new(),
                            tasks,
                            clarifications,
                            conflict_resolutions,
                        );
                    }
                    PrompterResponse::Clarify(answers) | PrompterResponse::ResolveConflict(answers) => {
                        clarifications.extend(answers);
                        action = Action::TaskDiscovery;
                    }
                }
            }
            tag if tag == event_tags::ORCHESTRATION_NEEDS_CLARIFICATION => {
                let questions = event
                    .payload
                    .get("questions")
                    .and_then(|v| v.as_array())
                    .map(|arr| arr.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
                    .unwrap_or_default();
                let question = IntakeQuestion::NeedsClarification { questions };
                match prompter.ask(&question) {
                    PrompterResponse::Decline => {
                        return conclude(
                            ledger,
                            run_state,
                            agent.supervisor.agent_type(),
                            &correlation_id,
                            "denied",
                            String::new(),
                            Vec::new(),
                            HashMap::new(),
                            clarifications,
                            conflict_resolutions,
                        );
                    }
                    PrompterResponse::Clarify(answers) | PrompterResponse::ResolveConflict(answers) => {
                        clarifications.extend(answers);
                        run_state.set_clarifications(clarifications.clone())?;
                        action = Action::Intake;
                    }
                    PrompterResponse::Approve => {
                        return Err(EngineError::AgentContract {
                            task_id: task_id.to_string(),
                            message_id: event.message_id.clone(),
                            detail: "approve is not a valid response to a clarification request".into(),
                        });
                    }
                }
            }
            tag if tag == event_tags::ORCHESTRATION_PLAN_CONFLICT => {
                let description = event
                    .payload
                    .get("description")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string();
                let question = IntakeQuestion::PlanConflict { description };
                match prompter.ask(&question) {
                    PrompterResponse::Decline => {
                        return conclude(
                            ledger,
                            run_state,
                            agent.supervisor.agent_type(),
                            &correlation_id,
                            "denied",
                            String::new(),
                            Vec::new(),
                            HashMap::new(),
                            clarifications,
                            conflict_resolutions,
                        );
                    }
                    PrompterResponse::Clarify(answers) | PrompterResponse::ResolveConflict(answers) => {
                        conflict_resolutions.extend(answers);
                        run_state.set_conflict_resolutions(conflict_resolutions.clone())?;
                        action = Action::TaskDiscovery;
                    }
                    PrompterResponse::Approve => {
                        return Err(EngineError::AgentContract {
                            task_id: task_id.to_string(),
                            message_id: event.message_id.clone(),
                            detail: "approve is not a valid response to a plan conflict".into(),
                        });
                    }
                }
            }
            other => {
                return Err(EngineError::AgentContract {
                    task_id: task_id.to_string(),
                    message_id: event.message_id.clone(),
                    detail: format!("unrecognized intake terminal event tag {other:?}"),
                });
            }
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn conclude(
    ledger: &Ledger,
    run_state: &RunStateStore,
    from_agent_type: AgentType,
    correlation_id: &str,
    decision_status: &str,
    approved_plan: String,
    approved_task_ids: Vec<String>,
    derived_tasks: HashMap<String, DerivedTask>,
    clarifications: Vec<String>,
    conflict_resolutions: Vec<String>,
) -> Result<IntakeOutcome> {
    let decision_event = Event {
        message_id: ids::new_message_id(),
        correlation_id: correlation_id.to_string(),
        task_id: String::new(),
        from: AgentRef { agent_type: from_agent_type, agent_id: "core".into() },
        event: event_tags::SYSTEM_USER_DECISION.to_string(),
        status: Some(decision_status.to_string()),
        payload: {
            let mut p = Inputs::new();
            p.insert("decision".into(), json!(decision_status));
            p.insert("approved_task_ids".into(), json!(approved_task_ids));
            if decision_status != "approved" {
                p.insert("reason".into(), json!("operator declined the intake round"));
            }
            p
        },
        artifacts: Vec::new(),
        occurred_at: Utc::now(),
    };
    ledger.append_event(&decision_event)?;
    run_state.record_event(&decision_event.message_id)?;
    run_state.record_intake_decision(decision_status)?;

    Ok(IntakeOutcome {
        decision_status: decision_status.to_string(),
        approved_plan,
        approved_task_ids,
        derived_tasks,
        clarifications,
        conflict_resolutions,
        intake_correlation_id: correlation_id.to_string(),
    })
}

#[allow(clippy::too_many_arguments)]
fn build_round_command(
    task_id: &str,
    snapshot_id: &str,
    instruction: &str,
    clarifications: &[String],
    conflict_resolutions: &[String],
    correlation_id: &str,
    action: Action,
    deadline_secs: u64,
) -> Command {
    let mut inputs = Inputs::new();
    inputs.insert("instruction".into(), json!(instruction));
    inputs.insert("clarifications".into(), json!(clarifications));
    inputs.insert("conflict_resolutions".into(), json!(conflict_resolutions));

    let expected_outputs: Vec<ExpectedOutput> = Vec::new();
    let idempotency_key =
        lorch_proto::idempotency_key(action, task_id, snapshot_id, &inputs, &expected_outputs);

    Command {
        message_id: ids::new_message_id(),
        correlation_id: correlation_id.to_string(),
        task_id: task_id.to_string(),
        to: AgentRef { agent_type: action.target_agent_type(), agent_id: String::new() },
        action,
        inputs,
        expected_outputs,
        version: Version { snapshot_id: snapshot_id.to_string() },
        deadline: Utc::now() + chrono::Duration::seconds(deadline_secs as i64),
        retry: Retry::default(),
        priority: 0,
        idempotency_key,
    }
}

/// Parses the ranked plan candidates and the derived task set out of an
/// `orchestration.proposed_tasks` payload (§4.H). Candidates are sorted
/// descending by confidence; `sort_by` is stable, so candidates tied on
/// confidence keep their input order. The returned `plan_summary` is the
/// top-ranked candidate's. A payload with no `plan_candidates` array
/// falls back to a single candidate built from the legacy `plan_summary`
/// field at confidence 1.0.
fn parse_proposed_tasks(event: &Event) -> Result<(String, Vec<PlanCandidate>, HashMap<String, DerivedTask>)> {
    let mut candidates: Vec<PlanCandidate> = match event.payload.get("plan_candidates").and_then(|v| v.as_array()) {
        Some(raw) => raw
            .iter()
            .map(|c| PlanCandidate {
                summary: c.get("summary").and_then(|v| v.as_str()).unwrap_or_default().to_string(),
                confidence: c.get("confidence").and_then(|v| v.as_f64()).unwrap_or(0.0),
            })
            .collect(),
        None => {
            let summary =
                event.payload.get("plan_summary").and_then(|v| v.as_str()).unwrap_or_default().to_string();
            vec![PlanCandidate { summary, confidence: 1.0 }]
        }
    };
    candidates.sort_by(|a, b| b.confidence.partial_cmp(&a.confidence).unwrap_or(std::cmp::Ordering::Equal));
    let plan_summary = candidates.first().map(|c| c.summary.clone()).unwrap_or_default();

    let raw_tasks = event.payload.get("tasks").and_then(|v| v.as_array()).ok_or_else(|| {
        EngineError::AgentContract {
            task_id: event.task_id.clone(),
            message_id: event.message_id.clone(),
            detail: "orchestration.proposed_tasks payload missing a `tasks` array".into(),
        }
    })?;

    let mut tasks = HashMap::new();
    for (i, raw) in raw_tasks.iter().enumerate() {
        let id = raw
            .get("id")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| format!("task-{i}"));
        let title = raw.get("title").and_then(|v| v.as_str()).unwrap_or_default().to_string();
        let files = raw
            .get("files")
            .and_then(|v| v.as_array())
            .map(|arr| arr.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
            .unwrap_or_default();
        tasks.insert(id, DerivedTask { title, files });
    }
    Ok((plan_summary, candidates, tasks))
}

#[cfg(test)]
#[path = "intake_tests.rs"]
mod tests;
