//! Deterministic classification of problem statements.
//!
//! Three independent analyses feed the advanced strategy selector:
//! complexity tier, subject domain, and structural features.

use anyhow::{Context, Result};
use regex::Regex;
use serde::Serialize;

/// Complexity tier of a problem statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ComplexityLevel {
    Low,
    Medium,
    High,
    VeryHigh,
}

/// Subject domain of a problem statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Domain {
    Mathematical,
    Logical,
    Creative,
    Scientific,
    Engineering,
    Linguistic,
    Medical,
    Business,
    General,
}

impl Domain {
    pub fn as_str(self) -> &'static str {
        match self {
            Domain::Mathematical => "mathematical",
            Domain::Logical => "logical",
            Domain::Creative => "creative",
            Domain::Scientific => "scientific",
            Domain::Engineering => "engineering",
            Domain::Linguistic => "linguistic",
            Domain::Medical => "medical",
            Domain::Business => "business",
            Domain::General => "general",
        }
    }
}

/// Structural feature tag of a problem statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Feature {
    Sequential,
    Branching,
    Parallel,
    Analytical,
    Creative,
    Comparative,
    TimeSensitive,
    Coding,
    General,
}

impl Feature {
    pub fn as_str(self) -> &'static str {
        match self {
            Feature::Sequential => "sequential",
            Feature::Branching => "branching",
            Feature::Parallel => "parallel",
            Feature::Analytical => "analytical",
            Feature::Creative => "creative",
            Feature::Comparative => "comparative",
            Feature::TimeSensitive => "time_sensitive",
            Feature::Coding => "coding",
            Feature::General => "general",
        }
    }

    /// Fragments whose presence in a descriptor's name or description counts as
    /// support for this feature.
    pub fn descriptor_hints(self) -> &'static [&'static str] {
        match self {
            Feature::Sequential => &["sequential", "step"],
            Feature::Branching => &["branch", "tree"],
            Feature::Parallel => &["parallel", "concurrent"],
            Feature::Analytical => &["analytic", "analysis"],
            Feature::Creative => &["creative"],
            Feature::Comparative => &["compar"],
            Feature::TimeSensitive => &["time_sensitive", "time-sensitive"],
            Feature::Coding => &["code", "coding", "program"],
            Feature::General => &["general"],
        }
    }
}

const VERY_HIGH_WORDS: usize = 200;
const HIGH_WORDS: usize = 100;
const MEDIUM_WORDS: usize = 50;

const COMPOUND_PATTERN: &str =
    r"\b(and|or|multiple|several|various|both|additionally|furthermore|as well as)\b";
const ADVANCED_PATTERN: &str = r"\b(algorithms?|optimi[sz]\w*|quantum|differential|integrals?|theorems?|asymptotic|distributed|concurren\w*|cryptograph\w*|topolog\w*|eigen\w*|stochastic|bayesian|neural|heuristics?|architectures?)\b";

const DOMAIN_PATTERNS: &[(Domain, &str)] = &[
    (
        Domain::Mathematical,
        r"\b(math\w*|equations?|calculat\w*|numbers?|algebra\w*|geometr\w*|probabilit\w*|proofs?|integrals?|derivatives?|matri(x|ces))\b",
    ),
    (
        Domain::Logical,
        r"\b(logic\w*|deduc\w*|infer\w*|premises?|syllogisms?|paradox\w*|puzzles?|therefore|implies)\b",
    ),
    (
        Domain::Creative,
        r"\b(creativ\w*|stor(y|ies)|poems?|imagin\w*|artistic|fiction|novel|brainstorm\w*|invent\w*)\b",
    ),
    (
        Domain::Scientific,
        r"\b(scien\w*|experiments?|hypothes[ie]s|physics|chemi\w*|biolog\w*|research|theor(y|ies)|observations?)\b",
    ),
    (
        Domain::Engineering,
        r"\b(engineer\w*|systems?|architectures?|design|build|infrastructure|scalab\w*|software|hardware|implement\w*)\b",
    ),
    (
        Domain::Linguistic,
        r"\b(language|grammar|translat\w*|words?|sentences?|meaning|semantic\w*|syntax|linguistic\w*)\b",
    ),
    (
        Domain::Medical,
        r"\b(medic\w*|health|patients?|diagnos\w*|symptoms?|treatments?|diseases?|clinical|therap\w*)\b",
    ),
    (
        Domain::Business,
        r"\b(business\w*|market\w*|revenue|customers?|profit\w*|strateg(y|ic)|sales|invest\w*|budget)\b",
    ),
    (
        Domain::General,
        r"\b(general|question|explain|understand|overview|help)\b",
    ),
];

const FEATURE_PATTERNS: &[(Feature, &str)] = &[
    (
        Feature::Sequential,
        r"\b(steps?|sequen\w*|order|first|then|next|process|procedure|stages?|phases?)\b",
    ),
    (
        Feature::Branching,
        r"\b(if|alternatives?|options?|choices?|branch\w*|either|possibilit\w*|scenarios?)\b",
    ),
    (
        Feature::Parallel,
        r"\b(parallel|simultaneous\w*|concurrent\w*|at the same time|independent\w*)\b",
    ),
    (
        Feature::Analytical,
        r"\b(analy[sz]\w*|evaluat\w*|assess\w*|examin\w*|investigat\w*|measure\w*)\b",
    ),
    (
        Feature::Creative,
        r"\b(creat\w*|design\w*|imagin\w*|invent\w*|novel|brainstorm\w*|original)\b",
    ),
    (
        Feature::Comparative,
        r"\b(compar\w*|versus|vs|differen\w*|contrast\w*|better|trade-?offs?)\b",
    ),
    (
        Feature::TimeSensitive,
        r"\b(urgent\w*|quick\w*|asap|deadlines?|immediate\w*|time-sensitive|fast)\b",
    ),
    (
        Feature::Coding,
        r"\b(code|coding|program\w*|functions?|debug\w*|compile\w*|api|rust|python|javascript|sql)\b",
    ),
];

/// Compiled keyword patterns for problem classification.
#[derive(Debug, Clone)]
pub struct ProblemClassifier {
    compound: Regex,
    advanced: Regex,
    domains: Vec<(Domain, Regex)>,
    features: Vec<(Feature, Regex)>,
}

impl ProblemClassifier {
    pub fn new() -> Result<Self> {
        let domains = DOMAIN_PATTERNS
            .iter()
            .map(|(domain, pattern)| {
                Regex::new(pattern)
                    .with_context(|| format!("compile {} domain pattern", domain.as_str()))
                    .map(|re| (*domain, re))
            })
            .collect::<Result<Vec<_>>>()?;
        let features = FEATURE_PATTERNS
            .iter()
            .map(|(feature, pattern)| {
                Regex::new(pattern)
                    .with_context(|| format!("compile {} feature pattern", feature.as_str()))
                    .map(|re| (*feature, re))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            compound: Regex::new(COMPOUND_PATTERN).context("compile compound pattern")?,
            advanced: Regex::new(ADVANCED_PATTERN).context("compile vocabulary pattern")?,
            domains,
            features,
        })
    }

    /// Classify complexity from length, question count and vocabulary.
    ///
    /// Tiers are checked from the top: the first matching rule wins.
    pub fn complexity(&self, problem: &str) -> ComplexityLevel {
        let lowered = problem.to_lowercase();
        let words = problem.split_whitespace().count();
        let questions = problem.matches('?').count();
        let compound = self.compound.is_match(&lowered);
        let advanced = self.advanced.is_match(&lowered);

        if words > VERY_HIGH_WORDS || questions >= 3 || (compound && advanced) {
            ComplexityLevel::VeryHigh
        } else if words > HIGH_WORDS || questions >= 2 || advanced {
            ComplexityLevel::High
        } else if words > MEDIUM_WORDS || questions >= 1 || compound {
            ComplexityLevel::Medium
        } else {
            ComplexityLevel::Low
        }
    }

    /// Domain with the most keyword hits. Ties and no hits resolve to `General`.
    pub fn domain(&self, problem: &str) -> Domain {
        let lowered = problem.to_lowercase();
        let mut best = Domain::General;
        let mut best_count = 0usize;
        let mut tied = false;
        for (domain, re) in &self.domains {
            let count = re.find_iter(&lowered).count();
            if count > best_count {
                best = *domain;
                best_count = count;
                tied = false;
            } else if count == best_count && count > 0 {
                tied = true;
            }
        }
        if best_count == 0 || tied {
            Domain::General
        } else {
            best
        }
    }

    /// Independent feature tags in declaration order; `[General]` if none match.
    pub fn features(&self, problem: &str) -> Vec<Feature> {
        let lowered = problem.to_lowercase();
        let found: Vec<Feature> = self
            .features
            .iter()
            .filter(|(_, re)| re.is_match(&lowered))
            .map(|(feature, _)| *feature)
            .collect();
        if found.is_empty() {
            vec![Feature::General]
        } else {
            found
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classifier() -> ProblemClassifier {
        ProblemClassifier::new().expect("patterns compile")
    }

    #[test]
    fn long_problem_with_many_questions_is_very_high() {
        let text = format!("{} Why? How? When?", "word ".repeat(210));
        assert_eq!(classifier().complexity(&text), ComplexityLevel::VeryHigh);
    }

    #[test]
    fn compound_with_advanced_vocabulary_is_very_high() {
        let text = "Compare the algorithm and the heuristic";
        assert_eq!(classifier().complexity(text), ComplexityLevel::VeryHigh);
    }

    #[test]
    fn advanced_vocabulary_alone_is_high() {
        assert_eq!(
            classifier().complexity("Explain quantum tunnelling"),
            ComplexityLevel::High
        );
        assert_eq!(
            classifier().complexity("Why is this? What now?"),
            ComplexityLevel::High
        );
    }

    #[test]
    fn single_question_or_compound_is_medium() {
        assert_eq!(
            classifier().complexity("What is a list?"),
            ComplexityLevel::Medium
        );
        assert_eq!(
            classifier().complexity("Cats and dogs"),
            ComplexityLevel::Medium
        );
        assert_eq!(
            classifier().complexity(&"word ".repeat(60)),
            ComplexityLevel::Medium
        );
    }

    #[test]
    fn short_plain_statement_is_low() {
        assert_eq!(classifier().complexity("Name a color"), ComplexityLevel::Low);
    }

    #[test]
    fn domain_with_most_hits_wins() {
        let c = classifier();
        assert_eq!(
            c.domain("Solve the equation and calculate the derivative"),
            Domain::Mathematical
        );
        assert_eq!(
            c.domain("Patients report symptoms before diagnosis"),
            Domain::Medical
        );
    }

    #[test]
    fn domain_ties_and_misses_resolve_to_general() {
        let c = classifier();
        assert_eq!(c.domain("zebra quokka"), Domain::General);
        // one medical hit, one business hit
        assert_eq!(c.domain("patient revenue"), Domain::General);
    }

    #[test]
    fn features_are_tagged_independently() {
        let features = classifier().features("First compare the options, then write the code");
        assert_eq!(
            features,
            vec![
                Feature::Sequential,
                Feature::Branching,
                Feature::Comparative,
                Feature::Coding
            ]
        );
    }

    #[test]
    fn untagged_problem_is_general() {
        assert_eq!(classifier().features("zebra quokka"), vec![Feature::General]);
    }
}
