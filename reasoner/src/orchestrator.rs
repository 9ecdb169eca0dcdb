//! Orchestration of one problem-processing run.
//!
//! [`StepOrchestrator::process_problem`] selects a reasoning system once, then
//! produces steps one gateway call at a time until the model stops, the step
//! limit is reached or a step fails. Every run owns its own [`EngineState`];
//! the gateway and optimizer are shared and must tolerate concurrent runs.

use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow, bail};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{debug, info, instrument, warn};

use crate::core::analysis::{AnalysisDecoder, StepAnalysis};
use crate::core::budget::{CancellationToken, ensure_active, remaining_budget, token_budget};
use crate::core::invariants::{step_id, validate_invariants};
use crate::core::scoring::{coherence, complexity, significance};
use crate::core::selector::{StrategySelector, build_selector};
use crate::core::state::{EngineState, Phase};
use crate::core::types::{
    AdjustmentKind, AdjustmentRecord, Problem, ProgressMetrics, ReasoningSystemDescriptor,
    ResourceConstraints, StepMetrics, StepStatus, ThinkingStep,
};
use crate::core::window::context_steps;
use crate::io::config::EngineConfig;
use crate::io::gateway::{GatewayRequest, Message, ModelGateway};
use crate::io::optimizer::{OptimizeOptions, TokenOptimizer};
use crate::io::prompt::{PromptBuilder, StepPrompt, StepPromptInputs};

const LOW_CONFIDENCE_THRESHOLD: f64 = 0.4;
const COHERENCE_DRIFT_THRESHOLD: f64 = 0.2;
const PROBLEM_ID_HEX_CHARS: usize = 16;

/// Caller options for a single run.
#[derive(Debug, Clone, Default)]
pub struct ProcessOptions {
    /// Step limit; `engine.max_steps_default` when unset.
    pub max_steps: Option<usize>,
    /// Derive the token budget from the model and run the optimizer on prompts.
    pub optimize_tokens: bool,
    /// Record adjustments and feed guidance into later prompts.
    pub enable_dynamic_adjustment: bool,
    pub cancel: Option<CancellationToken>,
}

/// Final engine metrics attached to a result.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StateMetrics {
    pub adjustments: Vec<AdjustmentRecord>,
    pub progress_metrics: ProgressMetrics,
    pub final_state: Phase,
}

/// Outcome of [`StepOrchestrator::process_problem`]. Always well formed.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessResult {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub problem_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning_system: Option<ReasoningSystemDescriptor>,
    pub steps: Vec<ThinkingStep>,
    pub reasoning: Vec<String>,
    pub token_usage: usize,
    #[serde(rename = "executionTime")]
    pub execution_time_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state_metrics: Option<StateMetrics>,
}

impl ProcessResult {
    /// Empty result carrying a single diagnostic entry.
    pub fn failed(message: &str, elapsed: Duration) -> Self {
        Self {
            problem_id: None,
            reasoning_system: None,
            steps: Vec::new(),
            reasoning: vec![format!("Error processing problem: {message}")],
            token_usage: 0,
            execution_time_ms: millis(elapsed),
            state_metrics: Some(StateMetrics {
                adjustments: Vec::new(),
                progress_metrics: ProgressMetrics::default(),
                final_state: Phase::Error,
            }),
        }
    }

    fn from_state(state: &EngineState, elapsed: Duration) -> Self {
        Self {
            problem_id: Some(state.problem().problem_id.clone()),
            reasoning_system: state.reasoning_system().cloned(),
            steps: state.steps().to_vec(),
            reasoning: state.steps().iter().map(|s| s.reasoning.clone()).collect(),
            token_usage: state.tokens_used(),
            execution_time_ms: millis(elapsed),
            state_metrics: Some(StateMetrics {
                adjustments: state.adjustments().to_vec(),
                progress_metrics: *state.progress(),
                final_state: state.phase(),
            }),
        }
    }

    pub fn final_state(&self) -> Option<Phase> {
        self.state_metrics.as_ref().map(|m| m.final_state)
    }

    pub fn is_error(&self) -> bool {
        self.final_state() == Some(Phase::Error)
    }
}

/// Fixed parameters of one run.
struct RunContext<'r> {
    model: &'r str,
    token_budget: usize,
    deadline: Instant,
    options: &'r ProcessOptions,
    decoder: AnalysisDecoder,
    prompts: PromptBuilder,
}

/// A synthesized step plus the model's continuation signal.
struct StepOutcome {
    step: ThinkingStep,
    should_continue: bool,
}

/// Drives runs against injected collaborators.
pub struct StepOrchestrator<'a, G: ModelGateway, O: TokenOptimizer> {
    gateway: &'a G,
    optimizer: &'a O,
    config: &'a EngineConfig,
}

impl<'a, G: ModelGateway, O: TokenOptimizer> StepOrchestrator<'a, G, O> {
    pub fn new(gateway: &'a G, optimizer: &'a O, config: &'a EngineConfig) -> Self {
        Self {
            gateway,
            optimizer,
            config,
        }
    }

    /// Process `problem` with `model`. Never fails: run-level errors come back
    /// as [`ProcessResult::failed`] with `finalState = "error"`.
    #[instrument(skip_all, fields(model = %model, max_steps = ?options.max_steps))]
    pub fn process_problem(
        &self,
        problem: &str,
        model: &str,
        options: &ProcessOptions,
    ) -> ProcessResult {
        let start = Instant::now();
        match self.try_process(problem, model, options, start) {
            Ok(result) => {
                info!(
                    steps = result.steps.len(),
                    token_usage = result.token_usage,
                    final_state = ?result.final_state(),
                    "run finished"
                );
                result
            }
            Err(err) => {
                let message = format!("{err:#}");
                warn!(err = %message, "run failed");
                ProcessResult::failed(&message, start.elapsed())
            }
        }
    }

    fn try_process(
        &self,
        text: &str,
        model: &str,
        options: &ProcessOptions,
        start: Instant,
    ) -> Result<ProcessResult> {
        let engine = &self.config.engine;
        let problem = Problem {
            problem_id: problem_id(text, Utc::now()),
            text: text.to_string(),
        };
        let max_steps = options.max_steps.unwrap_or(engine.max_steps_default);
        let run = RunContext {
            model,
            token_budget: token_budget(
                self.config.model_limits(model),
                options.optimize_tokens,
                engine.max_tokens_per_step,
                engine.fallback_token_budget,
            ),
            deadline: start + Duration::from_millis(engine.time_budget_ms),
            options,
            decoder: AnalysisDecoder::new().context("initialize response decoder")?,
            prompts: PromptBuilder::new(engine.prompt_budget_bytes)
                .context("initialize prompt builder")?,
        };
        debug!(
            problem_id = %problem.problem_id,
            max_steps,
            token_budget = run.token_budget,
            "starting run"
        );

        let mut state = EngineState::new(problem, max_steps);
        advance(&mut state, Phase::ProblemAnalysis)?;
        advance(&mut state, Phase::StrategySelection)?;
        let system = self.select_system(text, &run);
        state.set_reasoning_system(system).map_err(|e| anyhow!(e))?;
        advance(&mut state, Phase::Execution)?;

        let mut guidance: Vec<String> = Vec::new();
        for current in 1..=max_steps {
            let prompt = self.build_prompt(&state, &run, current, &guidance)?;
            match self.execute_step(&state, &run, prompt, current) {
                Ok(outcome) => {
                    debug!(
                        step = current,
                        tokens = outcome.step.tokens,
                        confidence = outcome.step.confidence,
                        "step completed"
                    );
                    let progress = ProgressMetrics::from_step(&outcome.step);
                    state.add_step(outcome.step).map_err(|e| anyhow!(e))?;
                    state.update_progress(progress);
                    if options.enable_dynamic_adjustment {
                        guidance = apply_adjustments(
                            &mut state,
                            run.token_budget,
                            engine.max_tokens_per_step,
                        );
                    }
                    check_invariants(&state)?;
                    if !outcome.should_continue {
                        debug!(step = current, "model signalled completion");
                        break;
                    }
                }
                Err(err) => {
                    warn!(step = current, err = %format!("{err:#}"), "step failed, stopping run");
                    let step = error_step(current, &err);
                    let progress = ProgressMetrics::from_step(&step);
                    state.add_step(step).map_err(|e| anyhow!(e))?;
                    state.update_progress(progress);
                    check_invariants(&state)?;
                    advance(&mut state, Phase::Error)?;
                    break;
                }
            }
        }

        if !state.is_terminal() {
            advance(&mut state, Phase::Conclusion)?;
            advance(&mut state, Phase::Completed)?;
        }
        Ok(ProcessResult::from_state(&state, start.elapsed()))
    }

    #[instrument(skip_all)]
    fn select_system(&self, text: &str, run: &RunContext<'_>) -> ReasoningSystemDescriptor {
        let time_budget_ms = remaining_budget(run.deadline)
            .map(millis)
            .unwrap_or_default();
        let constraints = ResourceConstraints {
            parallel_capacity: self.config.resources.parallel_capacity,
            remaining_tokens: run.token_budget,
            time_budget_ms,
        };
        let selector = build_selector(&self.config.reasoning_systems, constraints);
        let system = selector.select_reasoning_system(text);
        info!(selector = selector.kind(), system = %system.name, "selected reasoning system");
        system
    }

    fn build_prompt(
        &self,
        state: &EngineState,
        run: &RunContext<'_>,
        step_number: usize,
        guidance: &[String],
    ) -> Result<StepPrompt> {
        let system = state
            .reasoning_system()
            .ok_or_else(|| anyhow!("reasoning system not selected"))?;
        let context = context_steps(state.steps(), self.config.engine.max_previous_steps);
        run.prompts
            .build(&StepPromptInputs {
                problem: &state.problem().text,
                system,
                step_number,
                max_steps: state.max_steps(),
                context: &context,
                guidance,
            })
            .with_context(|| format!("render prompt for step {step_number}"))
    }

    /// Run the optimizer over the droppable context when optimization is on.
    ///
    /// Required sections never reach the optimizer, and the allowance never
    /// drops below one step's generation ceiling even once the run budget is
    /// spent.
    fn optimize_context(
        &self,
        state: &EngineState,
        run: &RunContext<'_>,
        context: &str,
    ) -> Result<Option<String>> {
        if !run.options.optimize_tokens || context.trim().is_empty() {
            return Ok(None);
        }
        ensure_active(run.deadline, run.options.cancel.as_ref())?;
        let options = OptimizeOptions {
            available_tokens: state
                .remaining_tokens(run.token_budget)
                .max(self.config.engine.max_tokens_per_step),
            user_selected_model: run.model.to_string(),
        };
        let optimized = self
            .optimizer
            .optimize_token_usage(context, &options)
            .context("optimize prompt context")?;
        if optimized.optimized_prompt.is_some() {
            debug!(
                token_savings = optimized.token_savings,
                available_tokens = options.available_tokens,
                "using optimized context"
            );
        }
        Ok(optimized.optimized_prompt)
    }

    /// Optimize, query and synthesize one step. Any error here ends the run
    /// with a terminal error step.
    #[instrument(skip_all, fields(step = step_number))]
    fn execute_step(
        &self,
        state: &EngineState,
        run: &RunContext<'_>,
        prompt: StepPrompt,
        step_number: usize,
    ) -> Result<StepOutcome> {
        let engine = &self.config.engine;
        let cancel = run.options.cancel.as_ref();
        let user = match self.optimize_context(state, run, &prompt.context)? {
            Some(context) => prompt.user_with_context(&context),
            None => prompt.user(),
        };

        let timeout = ensure_active(run.deadline, cancel)?;
        let request = GatewayRequest {
            model: run.model.to_string(),
            messages: vec![Message::system(prompt.system), Message::user(user)],
            max_tokens: engine.max_tokens_per_step,
            temperature: engine.temperature,
            timeout,
        };
        let response = self
            .gateway
            .query(&request)
            .context("query model gateway")?;

        let decoded = run.decoder.decode(response.response.as_ref());
        if let Some(reason) = &decoded.fallback_reason {
            debug!(reason = %reason, "step uses fallback analysis");
        }
        let should_continue = decoded.analysis.should_continue;
        let mut step = synthesize_step(state, step_number, decoded.analysis);
        let serialized = serde_json::to_string(&step).context("serialize step")?;
        step.tokens = self
            .optimizer
            .estimate_token_count(&serialized, Some(run.model));
        Ok(StepOutcome {
            step,
            should_continue,
        })
    }
}

fn synthesize_step(state: &EngineState, step_number: usize, analysis: StepAnalysis) -> ThinkingStep {
    let reasoning = analysis.insights.join("\n");
    let previous: Vec<&str> = state.steps().iter().map(|s| s.reasoning.as_str()).collect();
    let metrics = StepMetrics {
        coherence: coherence(&reasoning, previous.as_slice()),
        complexity: complexity(
            &reasoning,
            analysis.confidence,
            analysis.challenges.len(),
            analysis.concepts.len(),
        ),
        significance_score: significance(&reasoning, &state.problem().text),
    };
    ThinkingStep {
        id: step_id(step_number),
        description: analysis.suggested_step_description,
        reasoning,
        confidence: analysis.confidence,
        challenges: analysis.challenges,
        concepts: analysis.concepts,
        alternatives: analysis.alternatives,
        tokens: 0,
        status: StepStatus::Completed,
        timestamp: Utc::now(),
        metrics,
    }
}

fn error_step(step_number: usize, err: &anyhow::Error) -> ThinkingStep {
    ThinkingStep {
        id: step_id(step_number),
        description: "Execution error".to_string(),
        reasoning: format!("Step failed: {err:#}"),
        confidence: 0.0,
        challenges: vec!["Execution failed".to_string()],
        concepts: Vec::new(),
        alternatives: Vec::new(),
        tokens: 0,
        status: StepStatus::Error,
        timestamp: Utc::now(),
        metrics: StepMetrics {
            coherence: 0.0,
            complexity: 1.0,
            significance_score: 0.0,
        },
    }
}

/// Record adjustments triggered by the latest step and return prompt guidance
/// for the next one.
fn apply_adjustments(
    state: &mut EngineState,
    token_budget: usize,
    max_tokens_per_step: usize,
) -> Vec<String> {
    let mut guidance = Vec::new();
    let Some(step) = state.steps().last() else {
        return guidance;
    };
    let confidence = step.confidence;
    let coherence = step.metrics.coherence;
    let after_first = state.steps().len() > 1;

    if confidence < LOW_CONFIDENCE_THRESHOLD {
        state.record_adjustment(
            AdjustmentKind::LowConfidence,
            format!("confidence {confidence:.2} below {LOW_CONFIDENCE_THRESHOLD:.2}"),
        );
        guidance.push(
            "Confidence is low. Check your assumptions and resolve open challenges before moving on."
                .to_string(),
        );
    }
    if after_first && coherence < COHERENCE_DRIFT_THRESHOLD {
        state.record_adjustment(
            AdjustmentKind::CoherenceDrift,
            format!("coherence {coherence:.2} below {COHERENCE_DRIFT_THRESHOLD:.2}"),
        );
        guidance.push(
            "The last step drifted from earlier steps. Tie the next step back to the established line of reasoning."
                .to_string(),
        );
    }
    let remaining = state.remaining_tokens(token_budget);
    if remaining < max_tokens_per_step {
        state.record_adjustment(
            AdjustmentKind::TokenPressure,
            format!("{remaining} tokens left, step ceiling {max_tokens_per_step}"),
        );
        guidance.push("The token budget is nearly spent. Be concise and work toward a conclusion.".to_string());
    }
    if !guidance.is_empty() {
        debug!(adjustments = guidance.len(), "recorded adjustments");
    }
    guidance
}

fn advance(state: &mut EngineState, phase: Phase) -> Result<()> {
    state.set_phase(phase).map_err(|e| anyhow!(e))
}

fn check_invariants(state: &EngineState) -> Result<()> {
    let errors = validate_invariants(state);
    if !errors.is_empty() {
        bail!("invariant violations:\n- {}", errors.join("\n- "));
    }
    Ok(())
}

/// First 16 hex chars of `sha256(problem || started_at)`.
fn problem_id(text: &str, started_at: DateTime<Utc>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hasher.update(started_at.to_rfc3339().as_bytes());
    let mut id = hex::encode(hasher.finalize());
    id.truncate(PROBLEM_ID_HEX_CHARS);
    id
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
