//! Per-run engine state: phase machine plus the append-only step ledger.
//!
//! The state never decides transitions itself. The orchestrator drives the
//! phase through [`EngineState::set_phase`], which only rejects moves that
//! would go backward or leave a terminal phase.

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::core::types::{
    AdjustmentKind, AdjustmentRecord, Problem, ProgressMetrics, ReasoningSystemDescriptor,
    ThinkingStep,
};

/// Lifecycle phase of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Initializing,
    ProblemAnalysis,
    StrategySelection,
    Execution,
    Conclusion,
    Error,
    Completed,
}

impl Phase {
    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Initializing => "initializing",
            Phase::ProblemAnalysis => "problem_analysis",
            Phase::StrategySelection => "strategy_selection",
            Phase::Execution => "execution",
            Phase::Conclusion => "conclusion",
            Phase::Error => "error",
            Phase::Completed => "completed",
        }
    }

    fn rank(self) -> u8 {
        match self {
            Phase::Initializing => 0,
            Phase::ProblemAnalysis => 1,
            Phase::StrategySelection => 2,
            Phase::Execution => 3,
            Phase::Conclusion | Phase::Error => 4,
            Phase::Completed => 5,
        }
    }

    /// Whether moving from `self` to `next` is allowed.
    ///
    /// `Error` is reachable from every phase except the terminal ones
    /// (`Error`, `Completed`). Nothing leaves a terminal phase, so a completed
    /// run is never marked as failed afterwards. `Completed` is only reachable
    /// from `Conclusion`.
    pub fn can_advance_to(self, next: Phase) -> bool {
        if self == next {
            return true;
        }
        if self == Phase::Error || self == Phase::Completed {
            return false;
        }
        match next {
            Phase::Error => true,
            Phase::Completed => self == Phase::Conclusion,
            _ => next.rank() > self.rank(),
        }
    }
}

/// Mutable ledger owned by exactly one run.
#[derive(Debug, Clone)]
pub struct EngineState {
    problem: Problem,
    max_steps: usize,
    phase: Phase,
    reasoning_system: Option<ReasoningSystemDescriptor>,
    steps: Vec<ThinkingStep>,
    tokens_used: usize,
    current_step_index: usize,
    progress: ProgressMetrics,
    adjustments: Vec<AdjustmentRecord>,
}

impl EngineState {
    pub fn new(problem: Problem, max_steps: usize) -> Self {
        Self {
            problem,
            max_steps,
            phase: Phase::Initializing,
            reasoning_system: None,
            steps: Vec::new(),
            tokens_used: 0,
            current_step_index: 0,
            progress: ProgressMetrics::default(),
            adjustments: Vec::new(),
        }
    }

    pub fn problem(&self) -> &Problem {
        &self.problem
    }

    pub fn max_steps(&self) -> usize {
        self.max_steps
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn steps(&self) -> &[ThinkingStep] {
        &self.steps
    }

    pub fn tokens_used(&self) -> usize {
        self.tokens_used
    }

    pub fn current_step_index(&self) -> usize {
        self.current_step_index
    }

    pub fn progress(&self) -> &ProgressMetrics {
        &self.progress
    }

    pub fn adjustments(&self) -> &[AdjustmentRecord] {
        &self.adjustments
    }

    pub fn reasoning_system(&self) -> Option<&ReasoningSystemDescriptor> {
        self.reasoning_system.as_ref()
    }

    pub fn set_phase(&mut self, next: Phase) -> Result<(), String> {
        if !self.phase.can_advance_to(next) {
            return Err(format!(
                "illegal phase transition {} -> {}",
                self.phase.as_str(),
                next.as_str()
            ));
        }
        self.phase = next;
        Ok(())
    }

    /// Bind the run's reasoning system. It can be set once.
    pub fn set_reasoning_system(
        &mut self,
        descriptor: ReasoningSystemDescriptor,
    ) -> Result<(), String> {
        if let Some(existing) = &self.reasoning_system {
            return Err(format!(
                "reasoning system already selected: {}",
                existing.name
            ));
        }
        self.reasoning_system = Some(descriptor);
        Ok(())
    }

    /// Append a step, keeping `tokens_used` and `current_step_index` in sync.
    pub fn add_step(&mut self, step: ThinkingStep) -> Result<(), String> {
        if self.steps.len() >= self.max_steps {
            return Err(format!(
                "step limit reached ({} of {})",
                self.steps.len(),
                self.max_steps
            ));
        }
        self.tokens_used += step.tokens;
        self.steps.push(step);
        self.current_step_index = self.steps.len();
        Ok(())
    }

    /// Replace the progress snapshot entirely.
    pub fn update_progress(&mut self, metrics: ProgressMetrics) {
        self.progress = metrics;
    }

    pub fn record_adjustment(&mut self, kind: AdjustmentKind, details: impl Into<String>) {
        self.adjustments.push(AdjustmentRecord {
            kind,
            details: details.into(),
            step: self.current_step_index,
            timestamp: Utc::now(),
        });
    }

    /// Tokens left before `budget` is exhausted.
    pub fn remaining_tokens(&self, budget: usize) -> usize {
        budget.saturating_sub(self.tokens_used)
    }

    /// `Error` or `Completed`; the orchestrator stops driving phases here.
    pub fn is_terminal(&self) -> bool {
        matches!(self.phase, Phase::Error | Phase::Completed)
    }
}
