use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;

use pulse_common::{Prediction, PredictionStatus};

use super::dates::{extract_target_date_from, timeframe_patterns};
use super::types::{IssueKind, QualityIssue};

static RE_BOLD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\*\*([^*\n]+?)\*\*").unwrap());

static RE_MEASURABLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\d|\b(?:one|two|three|four|five|six|seven|eight|nine|ten|eleven|twelve|dozens?|hundreds?|thousands?|millions?|billions?|half|double[sd]?|twice|triple[sd]?|majority|most|least|first|largest|biggest|smallest|fastest|slowest|top)\b",
    )
    .unwrap()
});

/// A previously published prediction that content might still cite.
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogEntry {
    pub id: String,
    pub title: Option<String>,
    pub text: String,
    pub status: PredictionStatus,
    pub target_date: Option<NaiveDate>,
}

impl From<&Prediction> for CatalogEntry {
    fn from(p: &Prediction) -> Self {
        Self {
            id: p.id.to_string(),
            title: None,
            text: p.text.clone(),
            status: p.status,
            target_date: None,
        }
    }
}

impl CatalogEntry {
    /// Known stale, or still unresolved after its target date.
    fn is_stale(&self, known_stale_ids: &[String], today: NaiveDate) -> bool {
        if known_stale_ids.iter().any(|id| id == &self.id) {
            return true;
        }
        if !self.status.is_active() {
            return false;
        }
        self.target_date
            .or_else(|| extract_target_date_from(&self.text, today))
            .is_some_and(|target| target < today)
    }
}

fn normalize(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Flag content that cites a stale prediction by title or text.
pub fn check_stale_predictions(
    text: &str,
    known_stale_ids: &[String],
    catalog: &[CatalogEntry],
    today: NaiveDate,
) -> Vec<QualityIssue> {
    let content = normalize(text);
    catalog
        .iter()
        .filter(|entry| entry.is_stale(known_stale_ids, today))
        .filter(|entry| {
            let title = entry.title.as_deref().map(normalize).unwrap_or_default();
            let body = normalize(&entry.text);
            (!title.is_empty() && content.contains(&title))
                || (!body.is_empty() && content.contains(&body))
        })
        .map(|entry| {
            QualityIssue::critical(
                IssueKind::StalePrediction,
                format!("content cites stale prediction {}", entry.id),
            )
        })
        .collect()
}

/// Every bolded prediction line needs a timeframe and a measurable outcome.
pub fn check_prediction_format(text: &str, today: NaiveDate) -> Vec<QualityIssue> {
    let mut issues = Vec::new();

    for line in text.lines() {
        let mentions_prediction = RE_BOLD
            .captures_iter(line)
            .any(|c| c[1].to_lowercase().contains("predict"));
        if !mentions_prediction {
            continue;
        }

        let has_timeframe = extract_target_date_from(line, today).is_some();

        let mut outcome = line.to_string();
        for re in timeframe_patterns() {
            outcome = re.replace_all(&outcome, " ").into_owned();
        }
        let has_measure = RE_MEASURABLE.is_match(&outcome);

        let missing = match (has_timeframe, has_measure) {
            (true, true) => continue,
            (false, true) => "timeframe",
            (true, false) => "measurable outcome",
            (false, false) => "timeframe and measurable outcome",
        };
        issues.push(QualityIssue::warning(
            IssueKind::UnfalsifiablePrediction,
            format!("prediction lacks a {missing}: {}", line.trim()),
        ));
    }

    issues
}

#[cfg(test)]
mod tests {
    use super::*;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 1).unwrap()
    }

    fn entry(id: &str, text: &str, status: PredictionStatus) -> CatalogEntry {
        CatalogEntry {
            id: id.into(),
            title: None,
            text: text.into(),
            status,
            target_date: None,
        }
    }

    #[test]
    fn overdue_open_prediction_is_stale_when_cited() {
        let catalog = vec![entry(
            "p1",
            "Three major clouds ship managed vector search by Q2 2026",
            PredictionStatus::Open,
        )];
        let content = "Recall our call:  three major clouds ship\nmanaged vector search by Q2 2026.";
        let issues = check_stale_predictions(content, &[], &catalog, today());
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].kind, IssueKind::StalePrediction);
    }

    #[test]
    fn resolved_or_future_predictions_are_not_stale() {
        let catalog = vec![
            entry("p1", "Rust reaches top five by Q2 2026", PredictionStatus::Confirmed),
            entry("p2", "WASM runtimes double by Q4 2027", PredictionStatus::Open),
        ];
        let content = "Rust reaches top five by Q2 2026. WASM runtimes double by Q4 2027.";
        assert!(check_stale_predictions(content, &[], &catalog, today()).is_empty());
    }

    #[test]
    fn known_stale_ids_and_titles_match() {
        let mut cited = entry("p9", "some long prediction text", PredictionStatus::Open);
        cited.title = Some("The Great Framework Consolidation".into());
        let content = "As in the great framework   consolidation piece...";
        let issues = check_stale_predictions(content, &["p9".into()], &[cited], today());
        assert_eq!(issues.len(), 1);
    }

    #[test]
    fn falsifiable_prediction_passes() {
        let text = "**Prediction:** At least 3 of the top 5 clouds will ship this by Q3 2027.";
        assert!(check_prediction_format(text, today()).is_empty());
    }

    #[test]
    fn timeframe_digits_do_not_count_as_outcome() {
        let text = "**Prediction:** The ecosystem will mature by Q3 2027.";
        let issues = check_prediction_format(text, today());
        assert_eq!(issues.len(), 1);
        assert!(issues[0].detail.contains("lacks a measurable outcome"));
    }

    #[test]
    fn missing_timeframe_is_flagged() {
        let text = "**We predict** the majority of teams will switch.";
        let issues = check_prediction_format(text, today());
        assert_eq!(issues.len(), 1);
        assert!(issues[0].detail.contains("lacks a timeframe"));
    }

    #[test]
    fn unbolded_or_unrelated_lines_are_ignored() {
        let text = "We predict things will improve.\n**Bold claim** without the keyword.";
        assert!(check_prediction_format(text, today()).is_empty());
    }
}
