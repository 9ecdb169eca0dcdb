//! End-to-end tests for `process_problem` with scripted collaborators.
//!
//! These drive whole runs through the public API and check the properties a
//! caller relies on: token accounting, step limits, fallbacks and fail-fast
//! behavior.

use std::thread;

use serde_json::json;

use reasoner::core::budget::CancellationToken;
use reasoner::core::state::Phase;
use reasoner::core::types::StepStatus;
use reasoner::io::config::EngineConfig;
use reasoner::io::gateway::GatewayResponse;
use reasoner::io::optimizer::HeuristicOptimizer;
use reasoner::orchestrator::{ProcessOptions, StepOrchestrator};
use reasoner::test_support::{FailingGateway, FixedOptimizer, ScriptedGateway, analysis};

fn max_steps(n: usize) -> ProcessOptions {
    ProcessOptions {
        max_steps: Some(n),
        ..ProcessOptions::default()
    }
}

#[test]
fn single_step_architecture_plan() {
    let gateway = ScriptedGateway::new(vec![Ok(GatewayResponse::structured(json!({
        "steps": [{
            "description": "Define objectives",
            "reasoning": "Identify the system goals, users and quality attributes first."
        }],
        "shouldContinue": false
    })))]);
    let optimizer = HeuristicOptimizer;
    let cfg = EngineConfig::default();
    let result = StepOrchestrator::new(&gateway, &optimizer, &cfg).process_problem(
        "Plan a system architecture",
        "claude-sonnet",
        &max_steps(1),
    );

    assert_eq!(result.steps.len(), 1);
    assert!(result.token_usage > 0);
    assert_eq!(result.final_state(), Some(Phase::Completed));
    let step = &result.steps[0];
    assert_eq!(step.id, "step-1");
    assert_eq!(step.description, "Define objectives");
    assert_eq!(step.metrics.coherence, 1.0);
    assert_eq!(step.status, StepStatus::Completed);
    assert_eq!(result.reasoning.len(), 1);
    assert!(result.problem_id.is_some_and(|id| id.len() == 16));
}

#[test]
fn token_usage_matches_step_sum() {
    let gateway = ScriptedGateway::repeating(analysis("load balancing", true, 0.8), 4);
    let optimizer = HeuristicOptimizer;
    let cfg = EngineConfig::default();
    let result = StepOrchestrator::new(&gateway, &optimizer, &cfg).process_problem(
        "How should we balance load across regions?",
        "gpt-4o",
        &max_steps(4),
    );

    assert_eq!(result.steps.len(), 4);
    let sum: usize = result.steps.iter().map(|s| s.tokens).sum();
    assert_eq!(result.token_usage, sum);
    let ids: Vec<_> = result.steps.iter().map(|s| s.id.as_str()).collect();
    assert_eq!(ids, vec!["step-1", "step-2", "step-3", "step-4"]);
}

#[test]
fn never_exceeds_max_steps() {
    let gateway = ScriptedGateway::repeating(analysis("keep going", true, 0.8), 10);
    let optimizer = FixedOptimizer::new(4);
    let cfg = EngineConfig::default();
    let result = StepOrchestrator::new(&gateway, &optimizer, &cfg).process_problem(
        "Explain recursion",
        "claude",
        &max_steps(3),
    );
    assert_eq!(result.steps.len(), 3);
    assert_eq!(gateway.requests().len(), 3);
    assert_eq!(result.final_state(), Some(Phase::Completed));
}

#[test]
fn default_step_limit_comes_from_config() {
    let gateway = ScriptedGateway::repeating(analysis("keep going", true, 0.8), 10);
    let optimizer = FixedOptimizer::new(4);
    let mut cfg = EngineConfig::default();
    cfg.engine.max_steps_default = 2;
    let result = StepOrchestrator::new(&gateway, &optimizer, &cfg).process_problem(
        "Explain recursion",
        "claude",
        &ProcessOptions::default(),
    );
    assert_eq!(result.steps.len(), 2);
}

#[test]
fn empty_response_yields_one_fallback_step() {
    let gateway = ScriptedGateway::new(vec![Ok(GatewayResponse::default())]);
    let optimizer = FixedOptimizer::new(6);
    let cfg = EngineConfig::default();
    let result = StepOrchestrator::new(&gateway, &optimizer, &cfg).process_problem(
        "Explain recursion",
        "claude",
        &max_steps(1),
    );
    assert_eq!(result.steps.len(), 1);
    let step = &result.steps[0];
    assert_eq!(step.status, StepStatus::Completed);
    assert_eq!(step.description, "Continue analysis");
    assert_eq!(step.confidence, 0.7);
    assert!(step.challenges.is_empty() && step.concepts.is_empty());
    assert_eq!(result.token_usage, 6);
    assert!(!result.is_error());
}

#[test]
fn gateway_failure_stops_after_one_error_step() {
    let gateway = FailingGateway::new("upstream unavailable");
    let optimizer = FixedOptimizer::new(6);
    let cfg = EngineConfig::default();
    let result = StepOrchestrator::new(&gateway, &optimizer, &cfg).process_problem(
        "Explain recursion",
        "claude",
        &max_steps(5),
    );
    assert_eq!(result.steps.len(), 1);
    assert_eq!(result.steps[0].status, StepStatus::Error);
    assert_eq!(result.token_usage, 0);
    assert_eq!(result.final_state(), Some(Phase::Error));
    let value = serde_json::to_value(&result).expect("serialize");
    assert_eq!(value["stateMetrics"]["finalState"], "error");
    assert_eq!(value["steps"][0]["status"], "error");
}

#[test]
fn failure_after_progress_keeps_earlier_steps() {
    let gateway = ScriptedGateway::new(vec![
        Ok(GatewayResponse::structured(analysis("first idea", true, 0.8))),
        Err(anyhow::anyhow!("socket closed")),
    ]);
    let optimizer = FixedOptimizer::new(9);
    let cfg = EngineConfig::default();
    let result = StepOrchestrator::new(&gateway, &optimizer, &cfg).process_problem(
        "Explain recursion",
        "claude",
        &max_steps(5),
    );
    assert_eq!(result.steps.len(), 2);
    assert_eq!(result.steps[0].status, StepStatus::Completed);
    assert_eq!(result.steps[1].status, StepStatus::Error);
    assert_eq!(result.token_usage, 9);
    assert!(result.is_error());
}

#[test]
fn empty_registry_uses_fallback_system() {
    let gateway = ScriptedGateway::default();
    let optimizer = FixedOptimizer::new(1);
    let mut cfg = EngineConfig::default();
    cfg.reasoning_systems.clear();
    let result = StepOrchestrator::new(&gateway, &optimizer, &cfg).process_problem(
        "Explain recursion",
        "claude",
        &max_steps(1),
    );
    assert_eq!(
        result.reasoning_system.map(|s| s.name),
        Some("chain_of_thought".to_string())
    );
    assert_eq!(result.steps.len(), 1);
}

#[test]
fn optimized_runs_keep_the_problem_after_budget_is_spent() {
    let insight = "queue partition replica ".repeat(170);
    let gateway = ScriptedGateway::repeating(analysis(&insight, true, 0.8), 8);
    let optimizer = HeuristicOptimizer;
    let cfg = EngineConfig::default();
    let result = StepOrchestrator::new(&gateway, &optimizer, &cfg).process_problem(
        "Design a fault tolerant message queue",
        "unknown-model",
        &ProcessOptions {
            max_steps: Some(8),
            optimize_tokens: true,
            ..ProcessOptions::default()
        },
    );

    assert_eq!(result.final_state(), Some(Phase::Completed));
    assert!(result.token_usage > cfg.engine.fallback_token_budget);
    let requests = gateway.requests();
    assert_eq!(requests.len(), 8);
    for request in &requests {
        let user = &request.messages[1].content;
        assert!(user.contains("<problem>"));
        assert!(user.contains("Design a fault tolerant message queue"));
        assert!(user.contains("### Progress"));
    }
    let last = &requests[7].messages[1].content;
    assert!(last.contains("step 8 of at most 8"));
    assert!(last.contains("[...]"));
}

#[test]
fn concurrent_runs_share_collaborators() {
    let gateway = ScriptedGateway::repeating(analysis("shared", true, 0.8), 64);
    let optimizer = FixedOptimizer::new(5);
    let cfg = EngineConfig::default();
    let orchestrator = StepOrchestrator::new(&gateway, &optimizer, &cfg);

    let results: Vec<_> = thread::scope(|scope| {
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let orchestrator = &orchestrator;
                scope.spawn(move || {
                    orchestrator.process_problem(
                        &format!("Independent problem number {i}"),
                        "claude",
                        &max_steps(3),
                    )
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|h| h.join().expect("run thread"))
            .collect()
    });

    assert_eq!(results.len(), 4);
    for result in &results {
        assert_eq!(result.steps.len(), 3);
        assert_eq!(result.token_usage, 15);
    }
    assert_eq!(gateway.requests().len(), 12);
}

#[test]
fn cancellation_mid_run_stops_stepping() {
    let cancel = CancellationToken::new();
    let gateway = CancellingGateway {
        cancel: cancel.clone(),
    };
    let optimizer = FixedOptimizer::new(2);
    let cfg = EngineConfig::default();
    let result = StepOrchestrator::new(&gateway, &optimizer, &cfg).process_problem(
        "Explain recursion",
        "claude",
        &ProcessOptions {
            max_steps: Some(5),
            cancel: Some(cancel),
            ..ProcessOptions::default()
        },
    );
    assert_eq!(result.steps.len(), 2);
    assert_eq!(result.steps[0].status, StepStatus::Completed);
    assert!(result.steps[1].reasoning.contains("run cancelled"));
    assert!(result.is_error());
}

/// Answers once, then cancels the run it belongs to.
struct CancellingGateway {
    cancel: CancellationToken,
}

impl reasoner::io::gateway::ModelGateway for CancellingGateway {
    fn query(
        &self,
        _request: &reasoner::io::gateway::GatewayRequest,
    ) -> anyhow::Result<GatewayResponse> {
        self.cancel.cancel();
        Ok(GatewayResponse::structured(analysis("partial", true, 0.8)))
    }
}
