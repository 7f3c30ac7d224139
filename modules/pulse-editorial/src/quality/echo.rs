use std::collections::BTreeSet;

use pulse_common::config::QualityConfig;

use super::sections::{split_sections, Section};
use super::types::{IssueKind, QualityIssue};

/// Common words plus newsletter filler that says nothing about the content.
const STOPWORDS: &[&str] = &[
    "about", "above", "across", "after", "again", "against", "also", "among", "around", "because",
    "been", "before", "being", "below", "between", "both", "could", "does", "doing", "down",
    "during", "each", "even", "every", "from", "further", "have", "having", "here", "into",
    "just", "like", "made", "make", "makes", "many", "more", "most", "much", "must", "only",
    "other", "over", "same", "should", "some", "still", "such", "than", "that", "their", "theirs",
    "them", "then", "there", "these", "they", "this", "those", "through", "under", "until",
    "very", "were", "what", "when", "where", "which", "while", "will", "with", "within",
    "without", "would", "your", "yours",
    // filler
    "really", "thing", "things", "going", "week", "weeks", "issue", "topic", "topics", "trend",
    "trends", "signal", "signals", "space", "today", "lots", "kind", "sort", "seems", "means",
];

/// Lowercased words of at least `min_len` characters, minus stopwords.
pub fn significant_words(text: &str, min_len: usize) -> BTreeSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.chars().count() >= min_len)
        .map(str::to_lowercase)
        .filter(|w| !w.chars().all(|c| c.is_ascii_digit()))
        .filter(|w| !STOPWORDS.contains(&w.as_str()))
        .collect()
}

/// Shared words over the smaller set. 0.0 when either set is empty.
pub fn overlap_ratio(a: &BTreeSet<String>, b: &BTreeSet<String>) -> f64 {
    let smaller = a.len().min(b.len());
    if smaller == 0 {
        return 0.0;
    }
    a.intersection(b).count() as f64 / smaller as f64
}

pub fn check_section_echo(text: &str) -> Vec<QualityIssue> {
    check_section_echo_with(text, &QualityConfig::default())
}

/// Flag every section pair whose significant vocabulary overlaps beyond the threshold.
pub fn check_section_echo_with(text: &str, config: &QualityConfig) -> Vec<QualityIssue> {
    let sections = split_sections(text);
    let words: Vec<(&Section<'_>, BTreeSet<String>)> = sections
        .iter()
        .map(|s| (s, significant_words(s.body, config.min_word_len)))
        .filter(|(_, w)| w.len() >= config.min_section_words)
        .collect();

    let mut issues = Vec::new();
    for (i, (a, a_words)) in words.iter().enumerate() {
        for (b, b_words) in &words[i + 1..] {
            let overlap = overlap_ratio(a_words, b_words);
            if overlap > config.echo_threshold {
                issues.push(QualityIssue::warning(
                    IssueKind::SectionEcho,
                    format!(
                        "sections \"{}\" and \"{}\" share {:.0}% of their key words",
                        a.title(),
                        b.title(),
                        overlap * 100.0
                    ),
                ));
            }
        }
    }
    issues
}
