//! Test-only helpers: deterministic steps and scripted collaborators.

use std::collections::VecDeque;
use std::sync::Mutex;

use anyhow::{Result, anyhow};
use chrono::{TimeZone, Utc};
use serde_json::{Value, json};

use crate::core::invariants::step_id;
use crate::core::types::{Problem, StepMetrics, StepStatus, ThinkingStep};
use crate::io::gateway::{GatewayRequest, GatewayResponse, ModelGateway};
use crate::io::optimizer::{OptimizationResult, OptimizeOptions, TokenOptimizer};

/// Problem with a fixed id.
pub fn problem(text: &str) -> Problem {
    Problem {
        problem_id: "0123456789abcdef".to_string(),
        text: text.to_string(),
    }
}

/// Completed step `n` with the given token cost and a fixed timestamp.
pub fn completed_step(n: usize, tokens: usize) -> ThinkingStep {
    ThinkingStep {
        id: step_id(n),
        description: format!("Step {n} description"),
        reasoning: format!("Reasoning about component boundaries for step {n}"),
        confidence: 0.8,
        challenges: Vec::new(),
        concepts: vec!["architecture".to_string()],
        alternatives: Vec::new(),
        tokens,
        status: StepStatus::Completed,
        timestamp: Utc
            .timestamp_opt(1_700_000_000 + n as i64, 0)
            .single()
            .unwrap_or_default(),
        metrics: StepMetrics {
            coherence: 1.0,
            complexity: 0.5,
            significance_score: 0.5,
        },
    }
}

/// Structured analysis payload in the flat form.
pub fn analysis(insight: &str, should_continue: bool, confidence: f64) -> Value {
    json!({
        "suggestedStepDescription": format!("Analyze {insight}"),
        "insights": [insight],
        "alternatives": [],
        "challenges": [],
        "concepts": [insight],
        "shouldContinue": should_continue,
        "confidence": confidence,
    })
}

/// Gateway that replays queued replies and records every request.
///
/// Once the queue is empty it answers with a final, non-continuing analysis.
#[derive(Default)]
pub struct ScriptedGateway {
    replies: Mutex<VecDeque<Result<GatewayResponse>>>,
    requests: Mutex<Vec<GatewayRequest>>,
}

impl ScriptedGateway {
    pub fn new(replies: Vec<Result<GatewayResponse>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Gateway that answers every query with the same structured payload.
    pub fn repeating(value: Value, times: usize) -> Self {
        Self::new(
            (0..times)
                .map(|_| Ok(GatewayResponse::structured(value.clone())))
                .collect(),
        )
    }

    pub fn requests(&self) -> Vec<GatewayRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

impl ModelGateway for ScriptedGateway {
    fn query(&self, request: &GatewayRequest) -> Result<GatewayResponse> {
        self.requests
            .lock()
            .map_err(|_| anyhow!("request log poisoned"))?
            .push(request.clone());
        self.replies
            .lock()
            .map_err(|_| anyhow!("reply queue poisoned"))?
            .pop_front()
            .unwrap_or_else(|| {
                Ok(GatewayResponse::structured(analysis(
                    "conclusion",
                    false,
                    0.9,
                )))
            })
    }
}

/// Gateway whose every query fails.
pub struct FailingGateway {
    pub message: String,
}

impl FailingGateway {
    pub fn new(message: &str) -> Self {
        Self {
            message: message.to_string(),
        }
    }
}

impl ModelGateway for FailingGateway {
    fn query(&self, _request: &GatewayRequest) -> Result<GatewayResponse> {
        Err(anyhow!("{}", self.message))
    }
}

/// Optimizer with a fixed per-text token estimate and a canned rewrite.
#[derive(Default)]
pub struct FixedOptimizer {
    pub tokens_per_estimate: usize,
    pub rewrite: Option<String>,
    calls: Mutex<Vec<OptimizeOptions>>,
}

impl FixedOptimizer {
    pub fn new(tokens_per_estimate: usize) -> Self {
        Self {
            tokens_per_estimate,
            ..Self::default()
        }
    }

    pub fn rewriting(tokens_per_estimate: usize, rewrite: &str) -> Self {
        Self {
            tokens_per_estimate,
            rewrite: Some(rewrite.to_string()),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<OptimizeOptions> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

impl TokenOptimizer for FixedOptimizer {
    fn optimize_token_usage(
        &self,
        _text: &str,
        options: &OptimizeOptions,
    ) -> Result<OptimizationResult> {
        self.calls
            .lock()
            .map_err(|_| anyhow!("call log poisoned"))?
            .push(options.clone());
        Ok(OptimizationResult {
            optimized_prompt: self.rewrite.clone(),
            token_savings: usize::from(self.rewrite.is_some()),
        })
    }

    fn estimate_token_count(&self, _text: &str, _model: Option<&str>) -> usize {
        self.tokens_per_estimate
    }
}
