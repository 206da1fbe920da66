// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use chrono::Utc;
use lorch_proto::{Action, AgentRef, AgentType, ExpectedOutput, Inputs, Retry, Version};

fn sh_config(agent_type: AgentType, script: &str) -> AgentSupervisorConfig {
    AgentSupervisorConfig {
        agent_type,
        cmd: vec!["/bin/sh".into(), "-c".into(), script.into()],
        env: HashMap::new(),
    }
}

fn sample_command() -> lorch_proto::Command {
    lorch_proto::Command {
        message_id: "msg-1".into(),
        correlation_id: "corr-1".into(),
        task_id: "t1".into(),
        to: AgentRef { agent_type: AgentType::Builder, agent_id: String::new() },
        action: Action::Implement,
        inputs: Inputs::new(),
        expected_outputs: vec![ExpectedOutput { path: "a".into(), description: "".into(), required: true }],
        version: Version { snapshot_id: "snap-1".into() },
        deadline: Utc::now(),
        retry: Retry::default(),
        priority: 0,
        idempotency_key: "ik:abc".into(),
    }
}

#[tokio::test]
async fn start_reports_running_with_pid_then_stop_clears_it() {
    let sup = AgentSupervisor::new(sh_config(AgentType::Builder, "cat > /dev/null"));
    let _channels = sup.start().unwrap();
    let status = sup.status();
    assert!(status.running);
    assert!(status.pid.is_some());

    sup.stop().await.unwrap();
    assert!(!sup.status().running);
}

#[tokio::test]
async fn exit_waiter_flips_running_false_on_unprompted_crash() {
    let sup = AgentSupervisor::new(sh_config(AgentType::Builder, "exit 1"));
    let _channels = sup.start().unwrap();

    for _ in 0..50 {
        if !sup.status().running {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }
    assert!(!sup.status().running, "exit waiter should flip running=false once the child exits on its own");

    // stop() on an already-exited child is still a safe no-op.
    sup.stop().await.unwrap();
}

#[tokio::test]
async fn starting_twice_fails() {
    let sup = AgentSupervisor::new(sh_config(AgentType::Builder, "cat > /dev/null"));
    let _channels = sup.start().unwrap();
    let err = sup.start().unwrap_err();
    assert!(matches!(err, SupervisorError::AlreadyRunning));
    sup.stop().await.unwrap();
}

#[tokio::test]
async fn stop_is_safe_to_call_twice() {
    let sup = AgentSupervisor::new(sh_config(AgentType::Builder, "cat > /dev/null"));
    let _channels = sup.start().unwrap();
    sup.stop().await.unwrap();
    sup.stop().await.unwrap();
}

#[tokio::test]
async fn send_command_fails_when_not_running() {
    let sup = AgentSupervisor::new(sh_config(AgentType::Builder, "cat > /dev/null"));
    let err = sup.send_command(&sample_command()).await.unwrap_err();
    assert!(matches!(err, SupervisorError::NotRunning));
}

#[tokio::test]
async fn heartbeat_is_forwarded_and_updates_last_heartbeat() {
    let heartbeat_line = serde_json::json!({
        "kind": "heartbeat",
        "agent": {"agent_type": "builder", "agent_id": "a1"},
        "seq": 1,
        "status": "ready",
        "pid": 123,
        "ppid": 1,
        "uptime_s": 0.1,
        "last_activity_at": Utc::now().to_rfc3339(),
    })
    .to_string();
    let script = format!("printf '%s\\n' '{heartbeat_line}'; cat > /dev/null");

    let sup = AgentSupervisor::new(sh_config(AgentType::Builder, &script));
    let mut channels = sup.start().unwrap();

    let hb = tokio::time::timeout(std::time::Duration::from_secs(5), channels.heartbeats.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(hb.seq, 1);
    assert_eq!(sup.last_heartbeat().unwrap().seq, 1);

    sup.stop().await.unwrap();
}

#[tokio::test]
async fn stderr_lines_are_captured_separately_from_protocol_traffic() {
    let script = "echo 'diagnostic message' 1>&2; cat > /dev/null";
    let sup = AgentSupervisor::new(sh_config(AgentType::Builder, script));
    let mut channels = sup.start().unwrap();

    let line = tokio::time::timeout(std::time::Duration::from_secs(5), channels.stderr_lines.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(line, "diagnostic message");

    sup.stop().await.unwrap();
}

#[tokio::test]
async fn send_command_succeeds_while_running() {
    let sup = AgentSupervisor::new(sh_config(AgentType::Builder, "cat > /dev/null"));
    let _channels = sup.start().unwrap();
    sup.send_command(&sample_command()).await.unwrap();
    sup.stop().await.unwrap();
}

#[tokio::test]
async fn agent_type_env_var_is_set_on_subprocess() {
    let sup = AgentSupervisor::new(sh_config(AgentType::Reviewer, "printf '%s' \"$AGENT_TYPE\" 1>&2; cat > /dev/null"));
    let mut channels = sup.start().unwrap();
    let line = tokio::time::timeout(std::time::Duration::from_secs(5), channels.stderr_lines.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(line, "reviewer");
    sup.stop().await.unwrap();
}
