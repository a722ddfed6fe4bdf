//! Entity resolution against the Charity Commission register
//!
//! - Name normalisation and similarity scoring (this module)
//! - [`EntityResolver`]: single-entity resolution, confirmation, re-resolution
//! - [`BatchProcessor`]: bounded-concurrency resolution of a whole batch

pub mod batch;
pub mod resolver;

pub use batch::{BatchProcessor, ProcessOptions};
pub use resolver::{apply_match, EntityResolver, ScoredCandidate};

use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Best score at or above which a fuzzy candidate is committed automatically
pub const EXACT_MATCH_THRESHOLD: f64 = 0.95;

/// Candidates kept per search
pub const DEFAULT_MAX_CANDIDATES: usize = 5;

/// Legal and geographic words removed before comparison. Each is removed
/// wherever it appears after a space, not only at the end of the name.
const NAME_SUFFIXES: &[&str] = &[
    " limited",
    " ltd",
    " plc",
    " llp",
    " cic",
    " cio",
    " charity",
    " charitable",
    " trust",
    " foundation",
    " association",
    " society",
    " organisation",
    " organization",
    " uk",
    " england",
    " wales",
    " scotland",
];

/// Normalise an organisation name for comparison.
///
/// ```
/// use charity_enrich::resolution::normalize_name;
///
/// assert_eq!(normalize_name("The Oxfam Trust Ltd."), "the oxfam");
/// assert_eq!(normalize_name("Barnardo’s"), "barnardos");
/// ```
pub fn normalize_name(name: &str) -> String {
    let folded: String = name
        .nfkd()
        .filter(|c| !is_combining_mark(*c))
        .collect::<String>()
        .to_lowercase();

    let mut normalized = folded;
    for suffix in NAME_SUFFIXES {
        normalized = normalized.replace(suffix, "");
    }

    let stripped: String = normalized
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '_' || c.is_whitespace())
        .collect();

    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Similarity of two names in [0, 1] after normalisation.
///
/// Normalised Levenshtein; 0.0 when either side normalises to nothing.
pub fn calculate_similarity(a: &str, b: &str) -> f64 {
    let a = normalize_name(a);
    let b = normalize_name(b);
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    strsim::normalized_levenshtein(&a, &b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_normalize_strips_suffixes_and_punctuation() {
        assert_eq!(normalize_name("OXFAM"), "oxfam");
        assert_eq!(normalize_name("Oxfam Limited"), "oxfam");
        assert_eq!(
            normalize_name("The British Red Cross Society"),
            "the british red cross"
        );
        assert_eq!(normalize_name("Cancer Research UK"), "cancer research");
        assert_eq!(normalize_name("  Age   UK  England. "), "age");
        assert_eq!(normalize_name("Save the Children Fund!"), "save the children fund");
    }

    #[test]
    fn test_normalize_folds_accents() {
        assert_eq!(normalize_name("Café Société"), "cafe societe");
    }

    #[test]
    fn test_normalize_empty() {
        assert_eq!(normalize_name(""), "");
        assert_eq!(normalize_name(" Ltd."), "");
    }

    #[test]
    fn test_similarity_identical_after_normalisation() {
        assert_eq!(calculate_similarity("OXFAM", "Oxfam Limited"), 1.0);
        assert_eq!(calculate_similarity("Macmillan", "MACMILLAN"), 1.0);
    }

    #[test]
    fn test_similarity_empty_is_zero() {
        assert_eq!(calculate_similarity("", "Oxfam"), 0.0);
        assert_eq!(calculate_similarity("!!!", "Oxfam"), 0.0);
    }

    #[test]
    fn test_similarity_orders_candidates() {
        let name = "Marie Curie Cancer Care";
        let close = calculate_similarity(name, "MARIE CURIE");
        let far = calculate_similarity(name, "SHELTER, NATIONAL CAMPAIGN FOR HOMELESS PEOPLE LIMITED");
        assert!(close > far);
        assert!(close < EXACT_MATCH_THRESHOLD);
    }

    proptest! {
        #[test]
        fn prop_similarity_in_unit_interval(a in "\\PC{0,40}", b in "\\PC{0,40}") {
            let s = calculate_similarity(&a, &b);
            prop_assert!((0.0..=1.0).contains(&s));
        }

        #[test]
        fn prop_similarity_symmetric(a in "[a-zA-Z ]{0,30}", b in "[a-zA-Z ]{0,30}") {
            prop_assert_eq!(calculate_similarity(&a, &b), calculate_similarity(&b, &a));
        }

        #[test]
        fn prop_normalized_is_lowercase_words(a in "\\PC{0,40}") {
            let n = normalize_name(&a);
            prop_assert!(!n.starts_with(' ') && !n.ends_with(' '));
            prop_assert!(!n.contains("  "));
            prop_assert!(n.chars().all(|c| c.is_alphanumeric() || c == '_' || c == ' '));
        }
    }
}
