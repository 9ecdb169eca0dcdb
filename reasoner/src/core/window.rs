//! Bounded selection of previous steps fed back into the next prompt.

use crate::core::types::ThinkingStep;

/// Default number of previous steps carried into a prompt.
pub const MAX_PREVIOUS_STEPS: usize = 3;

/// Steps that make up the context for the next step, oldest first.
///
/// The first step is always kept as an anchor, followed by at most
/// `max_previous - 1` of the most recent steps.
pub fn context_steps(steps: &[ThinkingStep], max_previous: usize) -> Vec<&ThinkingStep> {
    let Some((first, rest)) = steps.split_first() else {
        return Vec::new();
    };
    if max_previous == 0 {
        return Vec::new();
    }
    let recent = max_previous - 1;
    let skip = rest.len().saturating_sub(recent);
    std::iter::once(first).chain(rest.iter().skip(skip)).collect()
}
