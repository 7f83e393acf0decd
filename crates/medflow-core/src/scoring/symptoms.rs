//! Critical-symptom keyword matching.
//!
//! Handles:
//! - Case-insensitive substring matches ("Crushing chest pain" → chest pain)
//! - Misspellings in single tokens or word windows ("unresponsiv" → unresponsive)
//! - One match per symptom entry, one count per keyword per patient

use strsim::jaro_winkler;

/// Similarity required for a fuzzy keyword hit.
const FUZZY_THRESHOLD: f64 = 0.92;

/// Tokens shorter than this never fuzzy-match.
const MIN_FUZZY_TOKEN_LEN: usize = 5;

/// Clinical system a keyword belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SymptomCategory {
    Cardiac,
    Neurological,
    Trauma,
    Respiratory,
}

/// A keyword that raises the symptom sub-score.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CriticalKeyword {
    pub keyword: &'static str,
    pub points: u8,
    pub category: SymptomCategory,
}

/// Keyword table in match-precedence order.
const CRITICAL_KEYWORDS: &[CriticalKeyword] = &[
    CriticalKeyword { keyword: "cardiac arrest", points: 4, category: SymptomCategory::Cardiac },
    CriticalKeyword { keyword: "unresponsive", points: 4, category: SymptomCategory::Neurological },
    CriticalKeyword { keyword: "stroke", points: 4, category: SymptomCategory::Neurological },
    CriticalKeyword { keyword: "chest pain", points: 3, category: SymptomCategory::Cardiac },
    CriticalKeyword { keyword: "seizure", points: 3, category: SymptomCategory::Neurological },
    CriticalKeyword { keyword: "severe bleeding", points: 3, category: SymptomCategory::Trauma },
    CriticalKeyword { keyword: "head trauma", points: 3, category: SymptomCategory::Trauma },
    CriticalKeyword { keyword: "difficulty breathing", points: 2, category: SymptomCategory::Respiratory },
    CriticalKeyword { keyword: "altered mental", points: 2, category: SymptomCategory::Neurological },
    CriticalKeyword { keyword: "fracture", points: 1, category: SymptomCategory::Trauma },
];

/// A symptom entry that hit a keyword.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymptomMatch {
    pub keyword: &'static str,
    pub symptom: String,
    pub points: u8,
    pub category: SymptomCategory,
}

/// Matcher over the critical keyword table.
pub struct SymptomMatcher {
    keywords: Vec<CriticalKeyword>,
}

impl Default for SymptomMatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl SymptomMatcher {
    pub fn new() -> Self {
        Self {
            keywords: CRITICAL_KEYWORDS.to_vec(),
        }
    }

    /// Add a keyword after the defaults (lowest precedence).
    pub fn add_keyword(&mut self, keyword: CriticalKeyword) {
        self.keywords.push(keyword);
    }

    /// Match each symptom against the table. Results follow symptom order.
    pub fn match_symptoms(&self, symptoms: &[String]) -> Vec<SymptomMatch> {
        let mut matches: Vec<SymptomMatch> = Vec::new();

        for symptom in symptoms {
            let lower = symptom.to_lowercase();
            let hit = self
                .keywords
                .iter()
                .find(|k| lower.contains(k.keyword))
                .or_else(|| self.keywords.iter().find(|k| fuzzy_contains(&lower, k.keyword)));

            if let Some(keyword) = hit {
                if matches.iter().any(|m| m.keyword == keyword.keyword) {
                    continue;
                }
                matches.push(SymptomMatch {
                    keyword: keyword.keyword,
                    symptom: symptom.clone(),
                    points: keyword.points,
                    category: keyword.category,
                });
            }
        }

        matches
    }
}

/// Whether any window of words in `text` is a close spelling of `keyword`.
fn fuzzy_contains(text: &str, keyword: &str) -> bool {
    let tokens: Vec<&str> = text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .collect();
    let width = keyword.split_whitespace().count();

    if width == 0 || tokens.len() < width {
        return false;
    }

    tokens
        .windows(width)
        .filter(|window| width > 1 || window[0].len() >= MIN_FUZZY_TOKEN_LEN)
        .any(|window| jaro_winkler(&window.join(" "), keyword) >= FUZZY_THRESHOLD)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn symptoms(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_substring_match() {
        let matcher = SymptomMatcher::new();
        let matches = matcher.match_symptoms(&symptoms(&["Crushing chest pain radiating to jaw"]));

        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].keyword, "chest pain");
        assert_eq!(matches[0].points, 3);
        assert_eq!(matches[0].category, SymptomCategory::Cardiac);
    }

    #[test]
    fn test_misspelling_match() {
        let matcher = SymptomMatcher::new();
        let matches = matcher.match_symptoms(&symptoms(&["patient unresponsiv on arrival"]));

        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].keyword, "unresponsive");
    }

    #[test]
    fn test_keyword_counted_once() {
        let matcher = SymptomMatcher::new();
        let matches = matcher.match_symptoms(&symptoms(&["chest pain", "chest pain at rest", "seizure"]));

        let keywords: Vec<&str> = matches.iter().map(|m| m.keyword).collect();
        assert_eq!(keywords, vec!["chest pain", "seizure"]);
    }

    #[test]
    fn test_precedence_within_symptom() {
        let matcher = SymptomMatcher::new();
        // Both keywords appear; the higher-precedence one wins for this entry.
        let matches = matcher.match_symptoms(&symptoms(&["stroke with altered mental status"]));

        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].keyword, "stroke");
    }

    #[test]
    fn test_no_false_positive_on_unrelated_text() {
        let matcher = SymptomMatcher::new();
        let matches = matcher.match_symptoms(&symptoms(&["mild headache", "nausea", "struck knee"]));
        assert!(matches.is_empty());
    }

    #[test]
    fn test_custom_keyword() {
        let mut matcher = SymptomMatcher::new();
        matcher.add_keyword(CriticalKeyword {
            keyword: "anaphylaxis",
            points: 4,
            category: SymptomCategory::Respiratory,
        });

        let matches = matcher.match_symptoms(&symptoms(&["suspected anaphylaxis"]));
        assert_eq!(matches[0].points, 4);
    }
}
