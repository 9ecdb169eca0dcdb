//! Shared deterministic types for the step orchestration engine.
//!
//! These types define stable contracts between core components. They must not
//! depend on external state or I/O. Serialized field names are camelCase so a
//! result can be handed to any JSON consumer unchanged.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Name of the strategy used whenever selection cannot do better.
pub const FALLBACK_SYSTEM_NAME: &str = "chain_of_thought";

/// Identifies the reasoning strategy chosen once per run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReasoningSystemDescriptor {
    pub name: String,
    pub description: String,
    pub implementation: String,
}

impl ReasoningSystemDescriptor {
    pub fn new(name: &str, description: &str, implementation: &str) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            implementation: implementation.to_string(),
        }
    }

    /// The fixed `chain_of_thought` descriptor every selector falls back to.
    pub fn fallback() -> Self {
        Self::new(
            FALLBACK_SYSTEM_NAME,
            "Step-by-step sequential reasoning",
            FALLBACK_SYSTEM_NAME,
        )
    }

    /// Lower-cased `name` + `description`, the text selectors match keywords against.
    pub fn search_text(&self) -> String {
        format!("{} {}", self.name, self.description).to_lowercase()
    }
}

/// A problem statement bound to a run. Immutable once the run starts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Problem {
    pub problem_id: String,
    pub text: String,
}

/// Outcome of a single step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Completed,
    Error,
}

/// Quality scores computed for a step.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepMetrics {
    pub coherence: f64,
    pub complexity: f64,
    pub significance_score: f64,
}

/// One unit of incremental reasoning produced by a single gateway call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThinkingStep {
    pub id: String,
    pub description: String,
    pub reasoning: String,
    pub confidence: f64,
    pub challenges: Vec<String>,
    pub concepts: Vec<String>,
    pub alternatives: Vec<String>,
    pub tokens: usize,
    pub status: StepStatus,
    pub timestamp: DateTime<Utc>,
    pub metrics: StepMetrics,
}

/// Latest progress snapshot. Replaced wholesale on every update.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressMetrics {
    pub confidence: f64,
    pub relevant_concepts: usize,
    pub identified_challenges: usize,
    pub has_alternatives: bool,
    pub complexity_score: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub significance_score: Option<f64>,
}

impl ProgressMetrics {
    pub fn from_step(step: &ThinkingStep) -> Self {
        Self {
            confidence: step.confidence,
            relevant_concepts: step.concepts.len(),
            identified_challenges: step.challenges.len(),
            has_alternatives: !step.alternatives.is_empty(),
            complexity_score: step.metrics.complexity,
            significance_score: Some(step.metrics.significance_score),
        }
    }
}

/// Kind of dynamic adjustment applied between steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdjustmentKind {
    LowConfidence,
    CoherenceDrift,
    TokenPressure,
}

/// Append-only log entry describing an adjustment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdjustmentRecord {
    pub kind: AdjustmentKind,
    pub details: String,
    /// 1-indexed step that triggered the adjustment.
    pub step: usize,
    pub timestamp: DateTime<Utc>,
}

/// Runtime resources reported to the advanced selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceConstraints {
    pub parallel_capacity: usize,
    pub remaining_tokens: usize,
    pub time_budget_ms: u64,
}

/// A candidate descriptor with its selection score. Only lives during selection.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoredStrategy {
    pub descriptor: ReasoningSystemDescriptor,
    pub score: f64,
    pub matched_features: Vec<String>,
}
