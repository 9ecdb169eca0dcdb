//! CLI tests for the `reasoner` binary.
//!
//! Spawns the compiled binary and checks exit codes and the JSON printed to
//! stdout.

use std::process::Command;

use serde_json::Value;

use reasoner::exit_codes;
use reasoner::io::config::{EngineConfig, load_config, write_config};

fn reasoner(config: &std::path::Path) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_reasoner"));
    cmd.arg("--config").arg(config);
    cmd
}

#[test]
fn init_writes_default_config_once() {
    let temp = tempfile::tempdir().expect("tempdir");
    let path = temp.path().join("reasoner.toml");

    let status = reasoner(&path).arg("init").status().expect("reasoner init");
    assert_eq!(status.code(), Some(exit_codes::OK));
    assert_eq!(load_config(&path).expect("load"), EngineConfig::default());

    let status = reasoner(&path).arg("init").status().expect("reasoner init");
    assert_eq!(status.code(), Some(exit_codes::INVALID));

    let status = reasoner(&path)
        .args(["init", "--force"])
        .status()
        .expect("reasoner init --force");
    assert_eq!(status.code(), Some(exit_codes::OK));
}

#[test]
fn select_prints_choice_and_candidates() {
    let temp = tempfile::tempdir().expect("tempdir");
    let output = reasoner(&temp.path().join("missing.toml"))
        .args(["select", "First do this, then that, step by step"])
        .output()
        .expect("reasoner select");
    assert_eq!(output.status.code(), Some(exit_codes::OK));

    let report: Value = serde_json::from_slice(&output.stdout).expect("json report");
    assert_eq!(report["selector"], "advanced");
    assert!(report["selected"]["name"].is_string());
    assert_eq!(report["candidates"].as_array().map(Vec::len), Some(4));
}

#[test]
fn invalid_config_exits_invalid() {
    let temp = tempfile::tempdir().expect("tempdir");
    let path = temp.path().join("reasoner.toml");
    std::fs::write(&path, "[engine]\nmax_steps_default = 0\n").expect("write");
    let status = reasoner(&path)
        .args(["select", "anything"])
        .status()
        .expect("reasoner select");
    assert_eq!(status.code(), Some(exit_codes::INVALID));
}

#[cfg(unix)]
fn config_with_gateway(dir: &std::path::Path, script: &str) -> std::path::PathBuf {
    let path = dir.join("reasoner.toml");
    let mut cfg = EngineConfig::default();
    cfg.gateway.command = vec!["sh".to_string(), "-c".to_string(), script.to_string()];
    write_config(&path, &cfg).expect("write config");
    path
}

#[cfg(unix)]
#[test]
fn run_prints_result_from_command_gateway() {
    let temp = tempfile::tempdir().expect("tempdir");
    let path = config_with_gateway(
        temp.path(),
        r#"cat >/dev/null; printf '{"response":{"steps":[{"description":"Define objectives","reasoning":"List goals and constraints."}],"shouldContinue":false}}'"#,
    );
    let output = reasoner(&path)
        .args(["run", "Plan a system architecture", "--max-steps", "1"])
        .output()
        .expect("reasoner run");
    assert_eq!(output.status.code(), Some(exit_codes::OK));

    let result: Value = serde_json::from_slice(&output.stdout).expect("json result");
    assert_eq!(result["steps"].as_array().map(Vec::len), Some(1));
    assert_eq!(result["steps"][0]["description"], "Define objectives");
    assert_eq!(result["stateMetrics"]["finalState"], "completed");
    assert!(result["tokenUsage"].as_u64().is_some_and(|t| t > 0));
}

#[cfg(unix)]
#[test]
fn run_exits_with_run_error_when_gateway_fails() {
    let temp = tempfile::tempdir().expect("tempdir");
    let path = config_with_gateway(temp.path(), "cat >/dev/null; echo offline >&2; exit 2");
    let output = reasoner(&path)
        .args(["run", "Plan a system architecture"])
        .output()
        .expect("reasoner run");
    assert_eq!(output.status.code(), Some(exit_codes::RUN_ERROR));

    let result: Value = serde_json::from_slice(&output.stdout).expect("json result");
    assert_eq!(result["stateMetrics"]["finalState"], "error");
    assert_eq!(result["steps"][0]["status"], "error");
}
