//! Keyword relevance scoring
//!
//! One formula serves two purposes:
//! - the *overall relevance* of a chunk is the mean of its category scores and
//!   gates extraction;
//! - a single *category score* decides whether a chunk demonstrates a skill
//!   during ingestion.
//!
//! Both go through [`RelevanceScorer::category_score`].

use std::collections::BTreeMap;

use regex::Regex;

/// Category name to keyword list
pub type KeywordFilters = BTreeMap<String, Vec<String>>;

/// Minimum overall relevance for a chunk to be kept at extraction time
pub const EXTRACTION_THRESHOLD: f64 = 0.1;

/// Pure keyword scorer
#[derive(Debug, Clone, Copy, Default)]
pub struct RelevanceScorer;

impl RelevanceScorer {
    /// Overall relevance of `text` in [0, 1]
    ///
    /// No categories means everything is relevant (1.0). Otherwise the
    /// unweighted mean of the per-category scores.
    pub fn score(text: &str, categories: &KeywordFilters) -> f64 {
        if categories.is_empty() {
            return 1.0;
        }

        let total: f64 = categories
            .values()
            .map(|keywords| Self::category_score(text, keywords))
            .sum();

        total / categories.len() as f64
    }

    /// Fraction of `keywords` found in `text` as whole words (case-insensitive),
    /// capped at 1.0
    ///
    /// An empty keyword list scores 0. Blank keywords never match.
    pub fn category_score(text: &str, keywords: &[String]) -> f64 {
        if keywords.is_empty() {
            return 0.0;
        }

        let matched = keywords
            .iter()
            .filter(|keyword| keyword_regex(keyword).is_some_and(|re| re.is_match(text)))
            .count();

        (matched as f64 / keywords.len() as f64).min(1.0)
    }

    /// Whether an overall relevance keeps a chunk at extraction time (inclusive)
    pub fn passes_extraction_gate(relevance: f64, threshold: f64) -> bool {
        relevance >= threshold
    }
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Case-insensitive whole-word matcher for `keyword`
///
/// Word boundaries are only required on edges that are word characters, so
/// keywords such as `c++` or `.net` still match.
fn keyword_regex(keyword: &str) -> Option<Regex> {
    let keyword = keyword.trim();
    if keyword.is_empty() {
        return None;
    }

    let start = if keyword.starts_with(is_word_char) { r"\b" } else { "" };
    let end = if keyword.ends_with(is_word_char) { r"\b" } else { "" };
    Regex::new(&format!("(?i){}{}{}", start, regex::escape(keyword), end)).ok()
}

/// Case-insensitive substring test used for technology matching
pub fn mentions(text: &str, term: &str) -> bool {
    text.to_lowercase().contains(&term.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filters(entries: &[(&str, &[&str])]) -> KeywordFilters {
        entries
            .iter()
            .map(|(category, keywords)| {
                (
                    category.to_string(),
                    keywords.iter().map(|k| k.to_string()).collect(),
                )
            })
            .collect()
    }

    #[test]
    fn test_empty_categories_score_one() {
        assert_eq!(RelevanceScorer::score("anything", &KeywordFilters::new()), 1.0);
        assert_eq!(RelevanceScorer::score("", &KeywordFilters::new()), 1.0);
    }

    #[test]
    fn test_partial_category_match() {
        let f = filters(&[("a", &["x", "y"])]);
        assert_eq!(RelevanceScorer::score("x only", &f), 0.5);
    }

    #[test]
    fn test_keywords_match_whole_words_only() {
        let f = filters(&[("a", &["y"])]);
        assert_eq!(RelevanceScorer::score("only", &f), 0.0);

        let go = vec!["go".to_string()];
        assert_eq!(RelevanceScorer::category_score("Sign in with Google", &go), 0.0);
        assert_eq!(RelevanceScorer::category_score("written in Go.", &go), 1.0);
        assert_eq!(RelevanceScorer::category_score("go_routine", &go), 0.0);
    }

    #[test]
    fn test_symbolic_keywords_match() {
        let keywords = vec!["c++".to_string(), ".net".to_string()];
        assert_eq!(RelevanceScorer::category_score("C++ and .NET interop", &keywords), 1.0);
        assert_eq!(RelevanceScorer::category_score("plain C code", &keywords), 0.0);
    }

    #[test]
    fn test_multi_word_keyword() {
        let keywords = vec!["rate limit".to_string(), "  ".to_string()];
        assert_eq!(RelevanceScorer::category_score("Add a Rate Limit middleware", &keywords), 0.5);
    }

    #[test]
    fn test_mean_across_categories() {
        let f = filters(&[("api", &["rest", "graphql"]), ("db", &["postgres"])]);
        // api: 1/2, db: 1/1
        let score = RelevanceScorer::score("A REST service backed by Postgres", &f);
        assert!((score - 0.75).abs() < f64::EPSILON);
    }

    #[test]
    fn test_empty_keyword_list_scores_zero() {
        assert_eq!(RelevanceScorer::category_score("text", &[]), 0.0);

        let f = filters(&[("empty", &[]), ("full", &["text"])]);
        assert_eq!(RelevanceScorer::score("text", &f), 0.5);
    }

    #[test]
    fn test_category_score_is_capped() {
        let keywords = vec!["rust".to_string(), "rust".to_string()];
        assert_eq!(RelevanceScorer::category_score("rust", &keywords), 1.0);
    }

    #[test]
    fn test_score_is_deterministic() {
        let f = filters(&[("a", &["x", "y", "z"]), ("b", &["w"])]);
        let first = RelevanceScorer::score("x and z", &f);
        let second = RelevanceScorer::score("x and z", &f);
        assert_eq!(first, second);
        assert!((0.0..=1.0).contains(&first));
    }

    #[test]
    fn test_extraction_gate_is_inclusive() {
        assert!(RelevanceScorer::passes_extraction_gate(
            EXTRACTION_THRESHOLD,
            EXTRACTION_THRESHOLD
        ));
        assert!(RelevanceScorer::passes_extraction_gate(0.9, EXTRACTION_THRESHOLD));
        assert!(!RelevanceScorer::passes_extraction_gate(0.05, EXTRACTION_THRESHOLD));
        assert!(!RelevanceScorer::passes_extraction_gate(0.3, 0.5));
    }

    #[test]
    fn test_mentions_ignores_case() {
        assert!(mentions("Built with FastAPI", "fastapi"));
        assert!(!mentions("Built with Flask", "django"));
        // technologies stay substring matches
        assert!(mentions("import reactDOM", "react"));
    }
}
