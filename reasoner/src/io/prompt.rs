//! Prompt rendering for step queries.

use std::sync::LazyLock;

use anyhow::{Context, Result};
use minijinja::{Environment, context};
use regex::Regex;
use serde::Serialize;
use tracing::debug;

use crate::core::types::{ReasoningSystemDescriptor, ThinkingStep};

const SYSTEM_TEMPLATE: &str = include_str!("prompts/system.md");
const STEP_TEMPLATE: &str = include_str!("prompts/step.md");

/// Droppable sections, least important first.
const DROP_ORDER: [&str; 3] = ["guidance", "recent", "anchor"];
const TRUNCATION_NOTICE: &str = "\n[truncated]";

static SECTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<!--\s*section:(\w+)\s+(required|droppable)\s*-->")
        .expect("section marker pattern is valid")
});

/// A previous step as shown to the model.
#[derive(Debug, Clone, Serialize)]
struct StepView {
    id: String,
    description: String,
    reasoning: String,
}

impl StepView {
    fn from_step(step: &ThinkingStep) -> Self {
        Self {
            id: step.id.clone(),
            description: step.description.trim().to_string(),
            reasoning: step.reasoning.trim().to_string(),
        }
    }
}

/// Everything needed to render the prompt for one step.
#[derive(Debug, Clone)]
pub struct StepPromptInputs<'a> {
    pub problem: &'a str,
    pub system: &'a ReasoningSystemDescriptor,
    /// 1-indexed number of the step being requested.
    pub step_number: usize,
    pub max_steps: usize,
    /// Windowed previous steps, oldest first; the first entry is the anchor.
    pub context: &'a [&'a ThinkingStep],
    /// Directives from dynamic adjustments; empty when adjustment is off.
    pub guidance: &'a [String],
}

/// Rendered prompts for a step.
///
/// The user prompt is split into its required sections (problem, progress)
/// and the droppable context (earlier steps, guidance) so only the context is
/// ever handed to a token optimizer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepPrompt {
    pub system: String,
    pub required: String,
    pub context: String,
}

impl StepPrompt {
    /// Full user message with `context` in place of the rendered context.
    pub fn user_with_context(&self, context: &str) -> String {
        if context.trim().is_empty() {
            return self.required.clone();
        }
        format!("{}\n\n{}", self.required, context)
    }

    pub fn user(&self) -> String {
        self.user_with_context(&self.context)
    }
}

/// A parsed section from rendered template output.
#[derive(Debug, Clone)]
struct ParsedSection {
    key: String,
    required: bool,
    content: String,
}

/// Builds step prompts within a byte budget, dropping droppable sections first.
pub struct PromptBuilder {
    env: Environment<'static>,
    budget_bytes: usize,
}

impl PromptBuilder {
    pub fn new(budget_bytes: usize) -> Result<Self> {
        let mut env = Environment::new();
        env.add_template("system", SYSTEM_TEMPLATE)
            .context("load system template")?;
        env.add_template("step", STEP_TEMPLATE)
            .context("load step template")?;
        Ok(Self { env, budget_bytes })
    }

    pub fn build(&self, input: &StepPromptInputs<'_>) -> Result<StepPrompt> {
        let system = self
            .env
            .get_template("system")?
            .render(context! { system => input.system })
            .context("render system prompt")?;

        let (anchor, recent): (Option<StepView>, Vec<StepView>) = match input.context.split_first() {
            Some((first, rest)) => (
                Some(StepView::from_step(*first)),
                rest.iter().copied().map(StepView::from_step).collect(),
            ),
            None => (None, Vec::new()),
        };
        let rendered = self
            .env
            .get_template("step")?
            .render(context! {
                problem => input.problem.trim(),
                step_number => input.step_number,
                max_steps => input.max_steps,
                anchor => anchor,
                recent => recent,
                guidance => input.guidance,
            })
            .context("render step prompt")?;

        let mut sections = parse_sections(&rendered);
        apply_budget_to_sections(&mut sections, self.budget_bytes);
        let (required, context): (Vec<_>, Vec<_>) =
            sections.into_iter().partition(|s| s.required);
        Ok(StepPrompt {
            system: system.trim().to_string(),
            required: render_sections(&required),
            context: render_sections(&context),
        })
    }
}

/// Parse sections using `<!-- section:KEY required|droppable -->` markers.
fn parse_sections(rendered: &str) -> Vec<ParsedSection> {
    let matches: Vec<_> = SECTION_RE.captures_iter(rendered).collect();
    let mut sections = Vec::with_capacity(matches.len());

    for (i, caps) in matches.iter().enumerate() {
        let (Some(marker), Some(key), Some(kind)) = (caps.get(0), caps.get(1), caps.get(2)) else {
            continue;
        };
        let end = matches
            .get(i + 1)
            .and_then(|next| next.get(0))
            .map_or(rendered.len(), |m| m.start());
        let content = rendered[marker.end()..end].trim().to_string();
        let required = kind.as_str() == "required";
        if !content.is_empty() || required {
            sections.push(ParsedSection {
                key: key.as_str().to_string(),
                required,
                content,
            });
        }
    }

    sections
}

fn apply_budget_to_sections(sections: &mut Vec<ParsedSection>, budget: usize) {
    let total_len =
        |secs: &[ParsedSection]| -> usize { secs.iter().map(|s| s.content.len()).sum() };

    for key in DROP_ORDER {
        if total_len(sections) <= budget {
            return;
        }
        if let Some(idx) = sections.iter().position(|s| s.key == key && !s.required) {
            debug!(
                section = key,
                bytes_dropped = sections[idx].content.len(),
                "dropped section for budget"
            );
            sections.remove(idx);
        }
    }

    // Still over budget: truncate the largest remaining section.
    let total = total_len(sections);
    if total > budget
        && let Some(largest) = sections.iter_mut().max_by_key(|s| s.content.len())
    {
        let keep = largest
            .content
            .len()
            .saturating_sub(total - budget + TRUNCATION_NOTICE.len());
        let cut = floor_char_boundary(&largest.content, keep);
        largest.content.truncate(cut);
        largest.content.push_str(TRUNCATION_NOTICE);
        debug!(section = %largest.key, "truncated section for budget");
    }
}

fn floor_char_boundary(text: &str, mut idx: usize) -> usize {
    idx = idx.min(text.len());
    while idx > 0 && !text.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}

fn render_sections(sections: &[ParsedSection]) -> String {
    sections
        .iter()
        .map(|s| s.content.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::completed_step;

    fn build(context: &[&ThinkingStep], guidance: &[String], budget: usize) -> StepPrompt {
        let system = ReasoningSystemDescriptor::fallback();
        PromptBuilder::new(budget)
            .expect("templates")
            .build(&StepPromptInputs {
                problem: "Plan a system architecture",
                system: &system,
                step_number: context.len() + 1,
                max_steps: 5,
                context,
                guidance,
            })
            .expect("render")
    }

    #[test]
    fn first_step_prompt_has_no_history() {
        let prompt = build(&[], &[], 10_000);
        assert!(prompt.system.contains("chain_of_thought"));
        assert!(prompt.user().contains("<problem>"));
        assert!(prompt.user().contains("step 1 of at most 5"));
        assert!(prompt.user().contains("No previous steps yet"));
        assert!(!prompt.user().contains("### First Step"));
    }

    #[test]
    fn sections_render_in_order() {
        let steps: Vec<_> = (1..=3).map(|n| completed_step(n, 1)).collect();
        let context: Vec<&ThinkingStep> = steps.iter().collect();
        let guidance = vec!["Return to the problem statement".to_string()];
        let user = build(&context, &guidance, 10_000).user();

        let problem = user.find("### Problem").expect("problem");
        let anchor = user.find("### First Step").expect("anchor");
        let recent = user.find("### Recent Steps").expect("recent");
        let guide = user.find("### Guidance").expect("guidance");
        assert!(problem < anchor && anchor < recent && recent < guide);
        assert!(user.contains(r#"<step id="step-3">"#));
        assert!(!user.contains("No previous steps yet"));
    }

    #[test]
    fn context_is_split_from_required_sections() {
        let steps: Vec<_> = (1..=2).map(|n| completed_step(n, 1)).collect();
        let context: Vec<&ThinkingStep> = steps.iter().collect();
        let prompt = build(&context, &[], 10_000);

        assert!(prompt.required.contains("### Problem"));
        assert!(prompt.required.contains("### Progress"));
        assert!(!prompt.required.contains("### First Step"));
        assert!(prompt.context.starts_with("### First Step"));
        assert!(!prompt.context.contains("### Problem"));

        let replaced = prompt.user_with_context("[...]");
        assert!(replaced.starts_with(&prompt.required));
        assert!(replaced.ends_with("[...]"));
        assert_eq!(prompt.user_with_context(""), prompt.required);
    }

    #[test]
    fn budget_drops_guidance_then_recent_steps() {
        let steps: Vec<_> = (1..=3).map(|n| completed_step(n, 1)).collect();
        let context: Vec<&ThinkingStep> = steps.iter().collect();
        let guidance = vec!["g".repeat(400)];
        let full = build(&context, &guidance, 100_000);
        let without_guidance = full.user().len() - 300;

        let prompt = build(&context, &guidance, without_guidance);
        assert!(!prompt.user().contains("### Guidance"));
        assert!(prompt.user().contains("### Recent Steps"));
        assert!(prompt.user().contains("### First Step"));

        let prompt = build(&context, &guidance, 200);
        assert!(!prompt.user().contains("### Recent Steps"));
        assert!(!prompt.user().contains("### First Step"));
        assert!(prompt.user().contains("### Problem"));
    }
}
