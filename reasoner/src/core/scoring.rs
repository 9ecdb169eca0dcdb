//! Text-only quality scores for thinking steps.
//!
//! Every function here is pure: identical inputs always produce identical
//! scores, which lets a stored step be re-scored for verification.

use std::collections::HashSet;

const STOPWORDS: &[&str] = &[
    "the", "and", "for", "are", "but", "not", "you", "all", "any", "can", "had", "her", "was",
    "one", "our", "out", "has", "him", "his", "how", "its", "may", "new", "now", "old", "see",
    "two", "who", "did", "get", "let", "put", "say", "she", "too", "use", "this", "that", "with",
    "have", "from", "they", "will", "would", "there", "their", "what", "about", "which", "when",
    "make", "like", "than", "then", "them", "these", "those", "into", "some", "could", "should",
    "other", "been", "were", "also", "each", "just", "over", "such", "only", "very", "your",
    "where", "while", "here", "more", "most", "much", "many", "does", "being", "both", "after",
    "before", "because", "through", "between", "under", "again", "further", "once", "same",
];

/// Characters of reasoning at which significance stops rewarding length.
const SIGNIFICANCE_LENGTH_SCALE: f64 = 500.0;
/// Characters of reasoning that count as one unit of complexity.
const COMPLEXITY_LENGTH_SCALE: f64 = 100.0;

/// Lower-cased, stopword-filtered terms longer than two characters.
pub fn key_terms(text: &str) -> HashSet<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|term| term.chars().count() > 2)
        .filter(|term| !STOPWORDS.contains(term))
        .map(str::to_string)
        .collect()
}

/// |A ∩ B| / |A ∪ B|, or 0 when either set is empty.
pub fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.union(b).count();
    intersection as f64 / union as f64
}

/// Mean term overlap between `current` and each previous reasoning text.
///
/// The first step (no previous reasoning) is coherent by definition: `1.0`.
pub fn coherence<S: AsRef<str>>(current: &str, previous: &[S]) -> f64 {
    if previous.is_empty() {
        return 1.0;
    }
    let current_terms = key_terms(current);
    let total: f64 = previous
        .iter()
        .map(|prev| jaccard(&current_terms, &key_terms(prev.as_ref())))
        .sum();
    total / previous.len() as f64
}

/// `0.7 * overlap(problem, reasoning) + 0.3 * min(1, len / 500)`.
pub fn significance(reasoning: &str, problem: &str) -> f64 {
    let overlap = jaccard(&key_terms(problem), &key_terms(reasoning));
    let length_factor = (reasoning.chars().count() as f64 / SIGNIFICANCE_LENGTH_SCALE).min(1.0);
    0.7 * overlap + 0.3 * length_factor
}

/// Mean of four unbounded factors, clamped to `[0, 1]`.
///
/// The factors are `len / 100`, `0.2 * challenges`, `0.1 * concepts` and
/// `1 - confidence`. Large inputs saturate at 1 rather than being rescaled.
pub fn complexity(
    reasoning: &str,
    confidence: f64,
    challenge_count: usize,
    concept_count: usize,
) -> f64 {
    let factors = [
        reasoning.chars().count() as f64 / COMPLEXITY_LENGTH_SCALE,
        challenge_count as f64 * 0.2,
        concept_count as f64 * 0.1,
        1.0 - confidence,
    ];
    let mean = factors.iter().sum::<f64>() / factors.len() as f64;
    mean.clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_terms_drop_short_words_and_stopwords() {
        let terms = key_terms("The API and an SDK: design, DESIGN, go!");
        let mut sorted: Vec<_> = terms.into_iter().collect();
        sorted.sort();
        assert_eq!(sorted, vec!["api", "design", "sdk"]);
    }

    #[test]
    fn jaccard_of_empty_set_is_zero() {
        let empty = HashSet::new();
        let other = key_terms("database schema");
        assert_eq!(jaccard(&empty, &other), 0.0);
        assert_eq!(jaccard(&other, &empty), 0.0);
    }

    #[test]
    fn first_step_is_fully_coherent() {
        let none: [&str; 0] = [];
        assert_eq!(coherence("anything at all", &none), 1.0);
        assert_eq!(coherence("", &none), 1.0);
    }

    #[test]
    fn coherence_averages_over_previous_steps() {
        // {alpha, beta} vs {alpha, beta} = 1.0 and vs {gamma, delta} = 0.0
        let score = coherence("alpha beta", &["alpha beta", "gamma delta"]);
        assert!((score - 0.5).abs() < 1e-9);
    }

    #[test]
    fn significance_weights_overlap_and_length() {
        let problem = "optimize database queries";
        let reasoning = "optimize database queries";
        let expected = 0.7 + 0.3 * (reasoning.len() as f64 / 500.0);
        assert!((significance(reasoning, problem) - expected).abs() < 1e-9);

        let long = "x".repeat(2_000);
        assert!((significance(&long, problem) - 0.3).abs() < 1e-9);
    }

    #[test]
    fn complexity_saturates_at_one() {
        assert_eq!(complexity(&"word ".repeat(400), 0.0, 20, 30), 1.0);
    }

    #[test]
    fn complexity_is_mean_of_factors() {
        // len 50 -> 0.5, 1 challenge -> 0.2, 2 concepts -> 0.2, confidence 0.9 -> 0.1
        let reasoning = "a".repeat(50);
        let score = complexity(&reasoning, 0.9, 1, 2);
        assert!((score - 0.25).abs() < 1e-9);
    }

    #[test]
    fn scores_stay_in_unit_range() {
        let samples = [
            "",
            "short",
            "A detailed plan covering storage, caching, replication and failover.",
        ];
        let long = "lorem ipsum dolor ".repeat(200);
        for text in samples.iter().copied().chain(std::iter::once(long.as_str())) {
            for prev in samples {
                let c = coherence(text, &[prev]);
                assert!((0.0..=1.0).contains(&c));
            }
            let s = significance(text, "plan a storage system with caching");
            assert!((0.0..=1.0).contains(&s));
            let x = complexity(text, 0.3, 4, 7);
            assert!((0.0..=1.0).contains(&x));
        }
    }
}
