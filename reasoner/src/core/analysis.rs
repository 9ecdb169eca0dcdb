//! Schema-validated decoding of the gateway's step analysis.
//!
//! Decoding never fails. Anything missing, unparsable or off-schema decodes
//! to [`StepAnalysis::default`] so the loop still makes progress.

use anyhow::{Context, Result};
use jsonschema::{Draft, Validator};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

const STEP_ANALYSIS_SCHEMA: &str = include_str!("../../schemas/step_analysis.schema.json");

pub const DEFAULT_STEP_DESCRIPTION: &str = "Continue analysis";
pub const DEFAULT_CONFIDENCE: f64 = 0.7;

/// Typed analysis of one step as reported by the model.
#[derive(Debug, Clone, PartialEq)]
pub struct StepAnalysis {
    pub suggested_step_description: String,
    pub insights: Vec<String>,
    pub alternatives: Vec<String>,
    pub challenges: Vec<String>,
    pub concepts: Vec<String>,
    pub should_continue: bool,
    pub confidence: f64,
}

impl Default for StepAnalysis {
    fn default() -> Self {
        Self {
            suggested_step_description: DEFAULT_STEP_DESCRIPTION.to_string(),
            insights: Vec::new(),
            alternatives: Vec::new(),
            challenges: Vec::new(),
            concepts: Vec::new(),
            should_continue: true,
            confidence: DEFAULT_CONFIDENCE,
        }
    }
}

/// Decoded analysis plus the reason a fallback was used, if any.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedAnalysis {
    pub analysis: StepAnalysis,
    pub fallback_reason: Option<String>,
}

impl DecodedAnalysis {
    fn fallback(reason: String) -> Self {
        warn!(reason = %reason, "using fallback step analysis");
        Self {
            analysis: StepAnalysis::default(),
            fallback_reason: Some(reason),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct RawAnalysis {
    suggested_step_description: Option<String>,
    insights: Vec<String>,
    alternatives: Vec<String>,
    challenges: Vec<String>,
    concepts: Vec<String>,
    should_continue: Option<bool>,
    confidence: Option<f64>,
    steps: Vec<RawStep>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawStep {
    description: Option<String>,
    reasoning: Option<String>,
}

impl RawAnalysis {
    fn into_analysis(self) -> StepAnalysis {
        let defaults = StepAnalysis::default();
        let description = self
            .suggested_step_description
            .or_else(|| self.steps.iter().find_map(|s| s.description.clone()))
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty())
            .unwrap_or(defaults.suggested_step_description);
        let insights = if self.insights.is_empty() {
            self.steps
                .into_iter()
                .filter_map(|s| s.reasoning)
                .filter(|r| !r.trim().is_empty())
                .collect()
        } else {
            self.insights
        };
        StepAnalysis {
            suggested_step_description: description,
            insights,
            alternatives: self.alternatives,
            challenges: self.challenges,
            concepts: self.concepts,
            should_continue: self.should_continue.unwrap_or(defaults.should_continue),
            confidence: self.confidence.unwrap_or(defaults.confidence),
        }
    }
}

/// Validates and decodes gateway payloads against the step analysis schema.
pub struct AnalysisDecoder {
    validator: Validator,
}

impl AnalysisDecoder {
    pub fn new() -> Result<Self> {
        let schema: Value =
            serde_json::from_str(STEP_ANALYSIS_SCHEMA).context("parse step analysis schema")?;
        let validator = jsonschema::options()
            .with_draft(Draft::Draft202012)
            .build(&schema)
            .context("compile step analysis schema")?;
        Ok(Self { validator })
    }

    /// Decode a gateway payload, which may be structured JSON or JSON text.
    pub fn decode(&self, payload: Option<&Value>) -> DecodedAnalysis {
        let Some(payload) = payload else {
            return DecodedAnalysis::fallback("missing response payload".to_string());
        };
        let structured = match payload {
            Value::String(text) => match parse_text_payload(text) {
                Some(value) => value,
                None => {
                    return DecodedAnalysis::fallback("response text is not JSON".to_string());
                }
            },
            Value::Null => {
                return DecodedAnalysis::fallback("missing response payload".to_string());
            }
            other => other.clone(),
        };

        let violations: Vec<String> = self
            .validator
            .iter_errors(&structured)
            .map(|err| err.to_string())
            .collect();
        if !violations.is_empty() {
            return DecodedAnalysis::fallback(format!(
                "response violates schema: {}",
                violations.join("; ")
            ));
        }

        match serde_json::from_value::<RawAnalysis>(structured) {
            Ok(raw) => {
                let analysis = raw.into_analysis();
                debug!(
                    insights = analysis.insights.len(),
                    should_continue = analysis.should_continue,
                    "decoded step analysis"
                );
                DecodedAnalysis {
                    analysis,
                    fallback_reason: None,
                }
            }
            Err(err) => DecodedAnalysis::fallback(format!("decode response: {err}")),
        }
    }
}

/// Parse JSON text, tolerating a surrounding Markdown code fence.
fn parse_text_payload(text: &str) -> Option<Value> {
    let trimmed = text.trim();
    let body = match trimmed.strip_prefix("```") {
        Some(fenced) => {
            let after_lang = fenced.split_once('\n').map_or("", |(_, rest)| rest);
            after_lang.trim_end().strip_suffix("```").unwrap_or(after_lang)
        }
        None => trimmed,
    };
    serde_json::from_str(body.trim()).ok()
}
