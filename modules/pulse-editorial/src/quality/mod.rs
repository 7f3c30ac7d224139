//! Deterministic checks run over generated content before it ships.
//!
//! Everything here is pure: no datastore, no clock unless the caller omits one.

pub mod dates;
pub mod echo;
pub mod predictions;
pub mod sections;
pub mod stats;
pub mod types;

use chrono::{NaiveDate, Utc};

use pulse_common::config::QualityConfig;

pub use dates::{extract_target_date, extract_target_date_from};
pub use echo::{check_section_echo, check_section_echo_with};
pub use predictions::{check_prediction_format, check_stale_predictions, CatalogEntry};
pub use stats::{auto_fix_stat_repetition, check_stat_repetition};
pub use types::{IssueKind, QualityIssue, Severity};

/// Empty or whitespace-only content.
pub fn check_empty_content(text: &str) -> Option<QualityIssue> {
    text.trim()
        .is_empty()
        .then(|| QualityIssue::critical(IssueKind::EmptyContent, "content is empty"))
}

/// What the checks need beyond the content itself.
#[derive(Debug, Clone)]
pub struct QualityContext {
    pub known_stale_ids: Vec<String>,
    pub catalog: Vec<CatalogEntry>,
    pub today: NaiveDate,
    pub config: QualityConfig,
}

impl Default for QualityContext {
    fn default() -> Self {
        Self {
            known_stale_ids: Vec::new(),
            catalog: Vec::new(),
            today: Utc::now().date_naive(),
            config: QualityConfig::default(),
        }
    }
}

impl QualityContext {
    pub fn with_catalog(mut self, catalog: Vec<CatalogEntry>) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn with_known_stale(mut self, ids: Vec<String>) -> Self {
        self.known_stale_ids = ids;
        self
    }

    pub fn with_config(mut self, config: QualityConfig) -> Self {
        self.config = config;
        self
    }

    pub fn on(mut self, today: NaiveDate) -> Self {
        self.today = today;
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct QualityReport {
    /// Critical issues first.
    pub issues: Vec<QualityIssue>,
}

impl QualityReport {
    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn has_critical(&self) -> bool {
        self.issues.iter().any(|i| i.severity == Severity::Critical)
    }

    pub fn critical(&self) -> impl Iterator<Item = &QualityIssue> {
        self.issues.iter().filter(|i| i.severity == Severity::Critical)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &QualityIssue> {
        self.issues.iter().filter(|i| i.severity == Severity::Warning)
    }

    pub fn count(&self, kind: IssueKind) -> usize {
        self.issues.iter().filter(|i| i.kind == kind).count()
    }

    /// One line per issue, for task error messages.
    pub fn summary(&self) -> String {
        self.issues
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Run every check. Empty content short-circuits with a single critical issue.
pub fn run_quality_checks(content: &str, ctx: &QualityContext) -> QualityReport {
    if let Some(empty) = check_empty_content(content) {
        return QualityReport {
            issues: vec![empty],
        };
    }

    let mut issues = check_stale_predictions(content, &ctx.known_stale_ids, &ctx.catalog, ctx.today);
    issues.extend(check_stat_repetition(content));
    issues.extend(check_section_echo_with(content, &ctx.config));
    issues.extend(check_prediction_format(content, ctx.today));

    issues.sort_by_key(|i| i.severity);
    QualityReport { issues }
}
