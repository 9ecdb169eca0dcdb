//! Time and token budget helpers for deterministic orchestration.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use anyhow::{Result, anyhow};

/// Return the remaining time budget until the provided deadline.
pub fn remaining_budget(deadline: Instant) -> Result<Duration> {
    let remaining = deadline
        .checked_duration_since(Instant::now())
        .unwrap_or(Duration::from_secs(0));
    if remaining.is_zero() {
        return Err(anyhow!("run timed out"));
    }
    Ok(remaining)
}

/// Cooperative cancellation flag shared between a caller and one or more runs.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Checked before every suspension point. Returns the time left on success.
pub fn ensure_active(deadline: Instant, cancel: Option<&CancellationToken>) -> Result<Duration> {
    if cancel.is_some_and(CancellationToken::is_cancelled) {
        return Err(anyhow!("run cancelled"));
    }
    remaining_budget(deadline)
}

/// Context window and output ceiling of one model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelLimits {
    pub context_window: usize,
    pub max_output: usize,
}

impl ModelLimits {
    /// Input budget after reserving output tokens and a 5% safety margin.
    ///
    /// The reservation is clamped to the model's `max_output`.
    pub fn effective_input_budget_with_reserved(&self, reserved_output: usize) -> usize {
        let reserved = reserved_output.min(self.max_output);
        let available = self.context_window.saturating_sub(reserved);
        let safety_margin = available / 20;
        available.saturating_sub(safety_margin)
    }
}

/// Token budget for a run.
///
/// With optimization requested and known model limits the budget derives from
/// the context window; otherwise the fixed fallback applies.
pub fn token_budget(
    limits: Option<ModelLimits>,
    optimize: bool,
    max_tokens_per_step: usize,
    fallback: usize,
) -> usize {
    match (optimize, limits) {
        (true, Some(limits)) => limits.effective_input_budget_with_reserved(max_tokens_per_step),
        _ => fallback,
    }
}
