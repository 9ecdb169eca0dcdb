//! Token estimation and prompt shrinking.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Options passed to [`TokenOptimizer::optimize_token_usage`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OptimizeOptions {
    pub available_tokens: usize,
    pub user_selected_model: String,
}

/// Result of an optimization pass. `optimized_prompt` is `None` when the text
/// was left alone.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptimizationResult {
    pub optimized_prompt: Option<String>,
    pub token_savings: usize,
}

/// Token accounting collaborator shared by concurrently running problems.
pub trait TokenOptimizer: Send + Sync {
    fn optimize_token_usage(
        &self,
        text: &str,
        options: &OptimizeOptions,
    ) -> Result<OptimizationResult>;

    fn estimate_token_count(&self, text: &str, model: Option<&str>) -> usize;
}

const CHARS_PER_TOKEN: usize = 4;
const ELISION_MARKER: &str = "\n[...]\n";

/// Character-based estimator that trims the middle of over-budget prompts.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicOptimizer;

impl TokenOptimizer for HeuristicOptimizer {
    fn optimize_token_usage(
        &self,
        text: &str,
        options: &OptimizeOptions,
    ) -> Result<OptimizationResult> {
        let before = self.estimate_token_count(text, Some(&options.user_selected_model));
        if before <= options.available_tokens {
            return Ok(OptimizationResult::default());
        }

        let marker_chars = ELISION_MARKER.chars().count();
        let allowed = (options.available_tokens * CHARS_PER_TOKEN).saturating_sub(marker_chars);
        let chars: Vec<char> = text.chars().collect();
        // Head carries the instructions, tail the most recent context.
        let head_len = allowed / 2;
        let tail_len = allowed - head_len;
        let mut optimized: String = chars[..head_len].iter().collect();
        optimized.push_str(ELISION_MARKER);
        optimized.extend(&chars[chars.len() - tail_len..]);

        let after = self.estimate_token_count(&optimized, Some(&options.user_selected_model));
        debug!(before, after, "trimmed prompt to token budget");
        Ok(OptimizationResult {
            optimized_prompt: Some(optimized),
            token_savings: before.saturating_sub(after),
        })
    }

    fn estimate_token_count(&self, text: &str, _model: Option<&str>) -> usize {
        text.chars().count().div_ceil(CHARS_PER_TOKEN)
    }
}
