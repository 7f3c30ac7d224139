use std::sync::LazyLock;

use regex::Regex;

use super::sections::split_sections;
use super::types::{IssueKind, QualityIssue};

/// Replaces a repeated statistic in later sections.
pub const STAT_BACK_REFERENCE: &str = "that figure";

static RE_BOLD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\*\*([^*\n]+?)\*\*").unwrap());

static RE_STAT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(?P<cur>[$€£]\s?)?\d+(?:[.,]\d+)*(?P<unit>\s?(?:%|×|x\b|bn\b|k\b|m\b|b\b|percent\b|thousand\b|million\b|billion\b|trillion\b))?",
    )
    .unwrap()
});

/// The statistic the lead section leans on: the first bolded numeric token
/// with a unit or currency symbol, else the first bolded one with two or
/// more digits.
pub fn salient_statistic(text: &str) -> Option<String> {
    let sections = split_sections(text);
    let first = sections.first()?;

    let mut fallback = None;
    for bold in RE_BOLD.captures_iter(first.body) {
        let span = bold.get(1).map(|m| m.as_str()).unwrap_or_default();
        for stat in RE_STAT.captures_iter(span) {
            let token = stat.get(0).map(|m| m.as_str().trim()).unwrap_or_default();
            if stat.name("cur").is_some() || stat.name("unit").is_some() {
                return Some(token.to_string());
            }
            if fallback.is_none() && token.chars().filter(|c| c.is_ascii_digit()).count() >= 2 {
                fallback = Some(token.to_string());
            }
        }
    }
    fallback
}

/// Flag the lead statistic once if any later section repeats it verbatim.
pub fn check_stat_repetition(text: &str) -> Option<QualityIssue> {
    let stat = salient_statistic(text)?;
    let sections = split_sections(text);
    let repeated_in: Vec<&str> = sections
        .iter()
        .skip(1)
        .filter(|s| !verbatim_matches(s.body, &stat).is_empty())
        .map(|s| s.title())
        .collect();

    if repeated_in.is_empty() {
        return None;
    }
    Some(QualityIssue::warning(
        IssueKind::StatRepetition,
        format!(
            "lead statistic \"{stat}\" is repeated in: {}",
            repeated_in.join(", ")
        ),
    ))
}

/// Keep the lead section's occurrences and swap later verbatim repeats for a
/// back-reference. Returns the input unchanged when there is nothing to fix.
pub fn auto_fix_stat_repetition(content: &str) -> String {
    let Some(stat) = salient_statistic(content) else {
        return content.to_string();
    };

    let mut replacements: Vec<(usize, usize)> = Vec::new();
    for section in split_sections(content).iter().skip(1) {
        for start in verbatim_matches(section.body, &stat) {
            let at = section.range.start + start;
            replacements.push((at, at + stat.len()));
        }
    }
    if replacements.is_empty() {
        return content.to_string();
    }

    let mut fixed = String::with_capacity(content.len());
    let mut cursor = 0;
    for (start, end) in replacements {
        fixed.push_str(&content[cursor..start]);
        fixed.push_str(STAT_BACK_REFERENCE);
        cursor = end;
    }
    fixed.push_str(&content[cursor..]);
    fixed
}

/// Byte offsets of `needle` in `haystack` that are not part of a longer token.
fn verbatim_matches(haystack: &str, needle: &str) -> Vec<usize> {
    haystack
        .match_indices(needle)
        .filter(|(start, _)| {
            let before = haystack[..*start].chars().next_back();
            let after = haystack[start + needle.len()..].chars().next();
            !before.is_some_and(is_token_char) && !after.is_some_and(is_token_char)
        })
        .map(|(start, _)| start)
        .collect()
}

fn is_token_char(c: char) -> bool {
    c.is_alphanumeric() || c == '$' || c == '€' || c == '£'
}
