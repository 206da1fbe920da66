use super::*;
use crate::error::EngineError;
use crate::test_support::sample_approved_intake;

fn write_plan(dir: &std::path::Path) {
    std::fs::write(dir.join("plan.md"), b"the plan").unwrap();
}

#[test]
fn happy_path_activates_every_approved_task() {
    let dir = tempfile::tempdir().unwrap();
    write_plan(dir.path());
    let intake = sample_approved_intake(dir.path());

    let tasks = activate(&intake).unwrap();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].id, "t1");
    assert_eq!(tasks[0].title, "Implement feature");
    assert_eq!(tasks[0].files, vec!["src/lib.rs".to_string()]);
    assert_eq!(tasks[0].intake_correlation_id.as_deref(), Some("corr-intake-abc"));
}

#[test]
fn rejects_non_approved_decision() {
    let dir = tempfile::tempdir().unwrap();
    write_plan(dir.path());
    let mut intake = sample_approved_intake(dir.path());
    intake.decision_status = "denied".to_string();

    let err = activate(&intake).unwrap_err();
    assert!(matches!(err, EngineError::Precondition(_)));
}

#[test]
fn rejects_empty_workspace_root() {
    let dir = tempfile::tempdir().unwrap();
    write_plan(dir.path());
    let mut intake = sample_approved_intake(dir.path());
    intake.workspace_root = PathBuf::new();

    let err = activate(&intake).unwrap_err();
    assert!(matches!(err, EngineError::Precondition(_)));
}

#[test]
fn rejects_missing_approved_plan_file() {
    let dir = tempfile::tempdir().unwrap();
    // deliberately not writing plan.md
    let intake = sample_approved_intake(dir.path());

    let err = activate(&intake).unwrap_err();
    assert!(matches!(err, EngineError::Precondition(_)));
}

#[test]
fn rejects_plan_path_escaping_workspace() {
    let dir = tempfile::tempdir().unwrap();
    write_plan(dir.path());
    let mut intake = sample_approved_intake(dir.path());
    intake.approved_plan = "../escape.md".to_string();

    let err = activate(&intake).unwrap_err();
    assert!(matches!(err, EngineError::Core(_)));
}

#[test]
fn rejects_empty_instruction() {
    let dir = tempfile::tempdir().unwrap();
    write_plan(dir.path());
    let mut intake = sample_approved_intake(dir.path());
    intake.instruction = "   ".to_string();

    let err = activate(&intake).unwrap_err();
    assert!(matches!(err, EngineError::Precondition(_)));
}

#[test]
fn empty_approved_task_ids_is_not_an_error() {
    let dir = tempfile::tempdir().unwrap();
    write_plan(dir.path());
    let mut intake = sample_approved_intake(dir.path());
    intake.approved_task_ids.clear();

    let tasks = activate(&intake).unwrap();
    assert!(tasks.is_empty());
}

#[test]
fn already_activated_tasks_are_skipped_idempotently() {
    let dir = tempfile::tempdir().unwrap();
    write_plan(dir.path());
    let mut intake = sample_approved_intake(dir.path());
    intake.already_activated_task_ids.insert("t1".to_string());

    let tasks = activate(&intake).unwrap();
    assert!(tasks.is_empty());
}

#[test]
fn missing_derived_task_for_an_approved_id_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    write_plan(dir.path());
    let mut intake = sample_approved_intake(dir.path());
    intake.approved_task_ids.push("t2".to_string());

    let err = activate(&intake).unwrap_err();
    assert!(matches!(err, EngineError::Precondition(_)));
}

#[test]
fn derived_task_with_empty_title_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    write_plan(dir.path());
    let mut intake = sample_approved_intake(dir.path());
    intake.derived_tasks.get_mut("t1").unwrap().title = String::new();

    let err = activate(&intake).unwrap_err();
    assert!(matches!(err, EngineError::Precondition(_)));
}

#[test]
fn implement_command_idempotency_key_is_stable_for_identical_inputs() {
    let dir = tempfile::tempdir().unwrap();
    write_plan(dir.path());
    let intake = sample_approved_intake(dir.path());
    let tasks = activate(&intake).unwrap();
    let now = Utc::now();

    let cmd1 = build_implement_command(&tasks[0], 600, now);
    let cmd2 = build_implement_command(&tasks[0], 600, now);
    assert_eq!(cmd1.idempotency_key, cmd2.idempotency_key);
    // message_id and correlation_id are always freshly generated, unlike
    // the idempotency key they don't need to match.
    assert_ne!(cmd1.message_id, cmd2.message_id);
}

#[test]
fn implement_command_carries_expected_outputs_from_task_files() {
    let dir = tempfile::tempdir().unwrap();
    write_plan(dir.path());
    let intake = sample_approved_intake(dir.path());
    let tasks = activate(&intake).unwrap();

    let cmd = build_implement_command(&tasks[0], 600, Utc::now());
    assert_eq!(cmd.expected_outputs.len(), 1);
    assert_eq!(cmd.expected_outputs[0].path, "src/lib.rs");
    assert_eq!(cmd.to.agent_type, Action::Implement.target_agent_type());
}
