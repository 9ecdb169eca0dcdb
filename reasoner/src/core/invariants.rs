//! Ledger invariants checked after every step.

use crate::core::state::EngineState;

/// Check engine state invariants:
/// - `tokens_used` equals the sum of step tokens
/// - no more than `max_steps` steps
/// - `current_step_index` equals the step count
/// - step ids are contiguous (`step-1`, `step-2`, ...)
/// - adjustment timestamps never go backward
pub fn validate_invariants(state: &EngineState) -> Vec<String> {
    let mut errors = Vec::new();

    let token_sum: usize = state.steps().iter().map(|step| step.tokens).sum();
    if token_sum != state.tokens_used() {
        errors.push(format!(
            "tokens_used {} does not match step token sum {}",
            state.tokens_used(),
            token_sum
        ));
    }

    if state.steps().len() > state.max_steps() {
        errors.push(format!(
            "{} steps exceed max_steps {}",
            state.steps().len(),
            state.max_steps()
        ));
    }

    if state.current_step_index() != state.steps().len() {
        errors.push(format!(
            "current_step_index {} does not match step count {}",
            state.current_step_index(),
            state.steps().len()
        ));
    }

    for (idx, step) in state.steps().iter().enumerate() {
        let expected = step_id(idx + 1);
        if step.id != expected {
            errors.push(format!("step {} has id '{}', expected '{}'", idx + 1, step.id, expected));
        }
    }

    if !state
        .adjustments()
        .windows(2)
        .all(|pair| pair[0].timestamp <= pair[1].timestamp)
    {
        errors.push("adjustment log is not in timestamp order".to_string());
    }

    errors
}

/// Stable id for the 1-indexed step `n`.
pub fn step_id(n: usize) -> String {
    format!("step-{n}")
}
