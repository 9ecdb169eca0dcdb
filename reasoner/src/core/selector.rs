//! Reasoning-strategy selection.
//!
//! Selection never fails: every selector returns a usable descriptor, and
//! [`build_selector`] resolves the advanced → default → emergency chain once at
//! run start with explicit branches.

use anyhow::{Context, Result};
use regex::Regex;
use tracing::{debug, warn};

use crate::core::classifier::{ComplexityLevel, ProblemClassifier};
use crate::core::types::{ReasoningSystemDescriptor, ResourceConstraints, ScoredStrategy};

/// Chooses the reasoning system for a problem.
pub trait StrategySelector {
    fn select_reasoning_system(&self, problem: &str) -> ReasoningSystemDescriptor;
}

/// Remaining-token threshold below which token-efficient strategies are preferred.
pub const LOW_TOKEN_BUDGET: usize = 4096;
/// Time budget (ms) below which fast strategies are preferred.
pub const SHORT_TIME_BUDGET_MS: u64 = 30_000;

const PARALLEL_HINTS: &[&str] = &["parallel", "concurrent"];
const EFFICIENCY_HINTS: &[&str] = &["efficien", "token", "concise", "compact"];
const SPEED_HINTS: &[&str] = &["fast", "quick", "speed", "rapid"];

/// Default heuristic selector: coarse problem type mapped to a preferred name.
#[derive(Debug, Clone)]
pub struct DefaultSelector {
    systems: Vec<ReasoningSystemDescriptor>,
    sequential: Regex,
    multiple_aspects: Regex,
}

/// Problem type recognized by [`DefaultSelector`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProblemType {
    Sequential,
    MultipleAspects,
    General,
}

impl ProblemType {
    fn preferred_system(self) -> &'static str {
        match self {
            ProblemType::Sequential => "chain_of_thought",
            ProblemType::MultipleAspects => "tree_of_thoughts",
            ProblemType::General => "chain_of_thought",
        }
    }
}

impl DefaultSelector {
    pub fn new(systems: Vec<ReasoningSystemDescriptor>) -> Result<Self> {
        Ok(Self {
            systems,
            sequential: Regex::new(r"\b(steps?|sequence|process|procedure|first|then|order)\b")
                .context("compile sequential pattern")?,
            multiple_aspects: Regex::new(
                r"\b(aspects?|factors?|perspectives?|multiple|various|dimensions?|compare)\b",
            )
            .context("compile multiple-aspects pattern")?,
        })
    }

    pub fn classify(&self, problem: &str) -> ProblemType {
        let lowered = problem.to_lowercase();
        if self.sequential.is_match(&lowered) {
            ProblemType::Sequential
        } else if self.multiple_aspects.is_match(&lowered) {
            ProblemType::MultipleAspects
        } else {
            ProblemType::General
        }
    }
}

impl StrategySelector for DefaultSelector {
    fn select_reasoning_system(&self, problem: &str) -> ReasoningSystemDescriptor {
        let preferred = self.classify(problem).preferred_system();
        self.systems
            .iter()
            .find(|system| system.name == preferred)
            .or_else(|| self.systems.first())
            .cloned()
            .unwrap_or_else(ReasoningSystemDescriptor::fallback)
    }
}

/// Multi-factor selector combining complexity, domain, features and resources.
#[derive(Debug, Clone)]
pub struct AdvancedSelector {
    systems: Vec<ReasoningSystemDescriptor>,
    constraints: ResourceConstraints,
    classifier: ProblemClassifier,
}

impl AdvancedSelector {
    pub fn new(
        systems: Vec<ReasoningSystemDescriptor>,
        constraints: ResourceConstraints,
    ) -> Result<Self> {
        Ok(Self {
            systems,
            constraints,
            classifier: ProblemClassifier::new()?,
        })
    }

    /// Score every candidate in configuration order.
    pub fn score_candidates(&self, problem: &str) -> Vec<ScoredStrategy> {
        let complexity = self.classifier.complexity(problem);
        let domain = self.classifier.domain(problem);
        let features = self.classifier.features(problem);
        debug!(?complexity, domain = domain.as_str(), ?features, "classified problem");

        self.systems
            .iter()
            .map(|system| {
                let text = system.search_text();
                let mut score = 0.0;
                let mut matched = Vec::new();

                let (hints, bonus) = complexity_affinity(complexity);
                if contains_any(&text, hints) {
                    score += bonus;
                    matched.push(format!("complexity:{}", complexity_label(complexity)));
                }
                if system.name.to_lowercase().contains(domain.as_str()) {
                    score += 2.0;
                    matched.push(format!("domain:{}", domain.as_str()));
                }
                for feature in &features {
                    if contains_any(&text, feature.descriptor_hints()) {
                        score += 1.0;
                        matched.push(feature.as_str().to_string());
                    }
                }
                if self.constraints.parallel_capacity < 2 && contains_any(&text, PARALLEL_HINTS) {
                    score -= 2.0;
                    matched.push("constraint:parallel_capacity".to_string());
                }
                if self.constraints.remaining_tokens < LOW_TOKEN_BUDGET
                    && contains_any(&text, EFFICIENCY_HINTS)
                {
                    score += 1.5;
                    matched.push("constraint:token_efficient".to_string());
                }
                if self.constraints.time_budget_ms < SHORT_TIME_BUDGET_MS
                    && contains_any(&text, SPEED_HINTS)
                {
                    score += 1.5;
                    matched.push("constraint:fast".to_string());
                }

                ScoredStrategy {
                    descriptor: system.clone(),
                    score,
                    matched_features: matched,
                }
            })
            .collect()
    }

    /// Highest-scoring candidate; ties keep the first one seen.
    pub fn select_scored(&self, problem: &str) -> ScoredStrategy {
        let mut best: Option<ScoredStrategy> = None;
        for candidate in self.score_candidates(problem) {
            match &best {
                Some(current) if candidate.score <= current.score => {}
                _ => best = Some(candidate),
            }
        }
        best.unwrap_or_else(|| ScoredStrategy {
            descriptor: ReasoningSystemDescriptor::fallback(),
            score: 0.0,
            matched_features: Vec::new(),
        })
    }
}

impl StrategySelector for AdvancedSelector {
    fn select_reasoning_system(&self, problem: &str) -> ReasoningSystemDescriptor {
        self.select_scored(problem).descriptor
    }
}

/// Last-resort selector that always returns the fixed fallback.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmergencySelector;

impl StrategySelector for EmergencySelector {
    fn select_reasoning_system(&self, _problem: &str) -> ReasoningSystemDescriptor {
        ReasoningSystemDescriptor::fallback()
    }
}

/// The selector resolved for a run.
#[derive(Debug, Clone)]
pub enum Selector {
    Advanced(AdvancedSelector),
    Default(DefaultSelector),
    Emergency(EmergencySelector),
}

impl Selector {
    pub fn kind(&self) -> &'static str {
        match self {
            Selector::Advanced(_) => "advanced",
            Selector::Default(_) => "default",
            Selector::Emergency(_) => "emergency",
        }
    }
}

impl StrategySelector for Selector {
    fn select_reasoning_system(&self, problem: &str) -> ReasoningSystemDescriptor {
        match self {
            Selector::Advanced(inner) => inner.select_reasoning_system(problem),
            Selector::Default(inner) => inner.select_reasoning_system(problem),
            Selector::Emergency(inner) => inner.select_reasoning_system(problem),
        }
    }
}

/// Build the best available selector for the configured systems.
pub fn build_selector(
    systems: &[ReasoningSystemDescriptor],
    constraints: ResourceConstraints,
) -> Selector {
    resolve_selector(AdvancedSelector::new(systems.to_vec(), constraints), || {
        DefaultSelector::new(systems.to_vec())
    })
}

/// Resolve the fallback chain from construction results.
pub fn resolve_selector<F>(advanced: Result<AdvancedSelector>, default: F) -> Selector
where
    F: FnOnce() -> Result<DefaultSelector>,
{
    match advanced {
        Ok(selector) => return Selector::Advanced(selector),
        Err(err) => warn!(err = %format!("{err:#}"), "advanced selector unavailable"),
    }
    match default() {
        Ok(selector) => Selector::Default(selector),
        Err(err) => {
            warn!(err = %format!("{err:#}"), "default selector unavailable, using emergency selector");
            Selector::Emergency(EmergencySelector)
        }
    }
}

fn complexity_affinity(level: ComplexityLevel) -> (&'static [&'static str], f64) {
    match level {
        ComplexityLevel::Low => (&["simple", "direct", "basic", "concise", "linear"], 1.0),
        ComplexityLevel::Medium => (&["step", "chain", "sequential", "structured"], 2.0),
        ComplexityLevel::High => (&["tree", "branch", "explor", "decompos"], 2.5),
        ComplexityLevel::VeryHigh => (&["graph", "tree", "parallel", "multi", "hierarch"], 3.0),
    }
}

fn complexity_label(level: ComplexityLevel) -> &'static str {
    match level {
        ComplexityLevel::Low => "low",
        ComplexityLevel::Medium => "medium",
        ComplexityLevel::High => "high",
        ComplexityLevel::VeryHigh => "very_high",
    }
}

fn contains_any(text: &str, hints: &[&str]) -> bool {
    hints.iter().any(|hint| text.contains(hint))
}
