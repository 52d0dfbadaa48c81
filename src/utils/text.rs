//! Text normalization helpers shared by blocking and the similarity signals.

use std::collections::HashSet;

/// Words ignored when tokenizing affiliations and keywords
const STOPWORDS: &[&str] = &["a", "an", "and", "at", "de", "der", "for", "in", "of", "the"];

/// Lowercase and collapse runs of whitespace
pub fn normalize_whitespace(s: &str) -> String {
    s.to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Normalize a title for comparison: lowercase, alphanumerics and single spaces only
pub fn normalize_title(title: &str) -> String {
    title
        .to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Collapse a name into a blocking key: lowercase alphanumerics only.
///
/// `"O'Brien-Smith"` and `"obrien smith"` both become `"obriensmith"`.
pub fn normalize_key(s: &str) -> String {
    s.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

/// First alphabetic character of a name, lowercased
pub fn first_initial(name: &str) -> Option<char> {
    name.chars()
        .find(|c| c.is_alphabetic())
        .and_then(|c| c.to_lowercase().next())
}

/// Check if a name part is an initial (e.g. "E." or "E")
pub fn is_initial(part: &str) -> bool {
    let cleaned = part.trim().trim_end_matches('.');
    let mut chars = cleaned.chars();
    matches!((chars.next(), chars.next()), (Some(c), None) if c.is_alphabetic())
}

/// Lowercased word tokens of the given strings, minus stopwords
pub fn token_set<'a, I>(values: I) -> HashSet<String>
where
    I: IntoIterator<Item = &'a String>,
{
    values
        .into_iter()
        .flat_map(|v| {
            v.split(|c: char| !c.is_alphanumeric())
                .map(str::to_lowercase)
                .collect::<Vec<_>>()
        })
        .filter(|t| !t.is_empty() && !STOPWORDS.contains(&t.as_str()))
        .collect()
}

/// Whole strings as a set, normalized like titles, blanks dropped
pub fn phrase_set<'a, I>(values: I) -> HashSet<String>
where
    I: IntoIterator<Item = &'a String>,
{
    values
        .into_iter()
        .map(|v| normalize_title(v))
        .filter(|v| !v.is_empty())
        .collect()
}

/// Character trigrams of each word, padded the way `pg_trgm` pads them
pub fn trigrams(text: &str) -> HashSet<String> {
    let mut out = HashSet::new();
    for word in normalize_title(text).split_whitespace() {
        let padded: Vec<char> = format!("  {} ", word).chars().collect();
        for window in padded.windows(3) {
            out.insert(window.iter().collect());
        }
    }
    out
}

/// Trigram Jaccard similarity of two strings, 0.0 when either has no trigrams
pub fn trigram_similarity(a: &str, b: &str) -> f64 {
    let ta = trigrams(a);
    let tb = trigrams(b);
    if ta.is_empty() || tb.is_empty() {
        return 0.0;
    }
    let shared = ta.intersection(&tb).count();
    let union = ta.len() + tb.len() - shared;
    shared as f64 / union as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_title() {
        assert_eq!(normalize_title("A Study on Data."), "a study on data");
        assert_eq!(normalize_title("Test   Title"), "test title");
        assert_eq!(normalize_title("Test: A-B/C"), "test abc");
        assert_eq!(normalize_title("   "), "");
    }

    #[test]
    fn test_normalize_key() {
        assert_eq!(normalize_key("O'Brien-Smith"), "obriensmith");
        assert_eq!(normalize_key("  Madjarov "), "madjarov");
        assert_eq!(normalize_key(""), "");
    }

    #[test]
    fn test_first_initial() {
        assert_eq!(first_initial("John A."), Some('j'));
        assert_eq!(first_initial(" .e"), Some('e'));
        assert_eq!(first_initial(""), None);
    }

    #[test]
    fn test_is_initial() {
        assert!(is_initial("J."));
        assert!(is_initial("J"));
        assert!(!is_initial("John"));
        assert!(!is_initial("."));
    }

    #[test]
    fn test_token_set_drops_stopwords() {
        let affiliations = vec!["University of California".to_string(), "MIT".to_string()];
        let tokens = token_set(&affiliations);
        assert!(tokens.contains("university"));
        assert!(tokens.contains("california"));
        assert!(tokens.contains("mit"));
        assert!(!tokens.contains("of"));
        assert_eq!(tokens.len(), 3);
    }

    #[test]
    fn test_phrase_set() {
        let titles = vec![
            "A Study on Data".to_string(),
            "a study on data.".to_string(),
            " ".to_string(),
        ];
        let set = phrase_set(&titles);
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_trigram_similarity() {
        assert_eq!(trigram_similarity("John Smith", "john smith"), 1.0);
        assert_eq!(trigram_similarity("", "john smith"), 0.0);
        let close = trigram_similarity("John Smith", "John A. Smith");
        let far = trigram_similarity("John Smith", "Gjorgji Madjarov");
        assert!(close > 0.4);
        assert!(far < 0.1);
    }
}
