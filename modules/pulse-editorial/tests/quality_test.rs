//! Fixture-driven checks for the content quality gate.

use chrono::NaiveDate;

use pulse_common::PredictionStatus;
use pulse_editorial::quality::{
    auto_fix_stat_repetition, check_section_echo, check_stat_repetition, extract_target_date,
    run_quality_checks, CatalogEntry, IssueKind, QualityContext, Severity,
};

const REPEATED_STAT: &str = "# Weekly pulse
Agent frameworks drew **$4.2B** in funding this quarter.

## Funding
That $4.2B is concentrated in three labs.

## Outlook
Expect the $4.2B figure to double.
";

const REWORDED_STAT: &str = "# Weekly pulse
Agent frameworks drew **$4.2B** in funding this quarter.

## Funding
That sum is concentrated in three labs.

## Outlook
Expect the headline figure to double.
";

const ECHOING_SECTIONS: &str = "## Adoption
Enterprise platform engineering groups adopting internal developer portals accelerate onboarding dramatically.

## Outlook
Internal developer portals accelerate onboarding for enterprise platform engineering groups everywhere.

## Risks
Licensing disputes around model weights could fragment hosting choices sharply next quarter.
";

const DISTINCT_SECTIONS: &str = "## Adoption
Enterprise platform engineering groups adopting internal developer portals accelerate onboarding dramatically.

## Tooling
Compiler authors shipped incremental linking, faster borrow checking, and smaller debug binaries.

## Risks
Licensing disputes around model weights could fragment hosting choices sharply next quarter.
";

fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 10, 1).unwrap()
}

// ---------------------------------------------------------------------------
// Statistic repetition
// ---------------------------------------------------------------------------

#[test]
fn repeated_lead_statistic_is_flagged_once() {
    let issue = check_stat_repetition(REPEATED_STAT).expect("repetition should be flagged");
    assert_eq!(issue.kind, IssueKind::StatRepetition);
    assert_eq!(issue.severity, Severity::Warning);
    assert!(issue.detail.contains("$4.2B"));

    let report = run_quality_checks(REPEATED_STAT, &QualityContext::default().on(today()));
    assert_eq!(report.count(IssueKind::StatRepetition), 1);
}

#[test]
fn reworded_statistic_is_not_flagged() {
    assert!(check_stat_repetition(REWORDED_STAT).is_none());
}

#[test]
fn auto_fix_replaces_later_repeats_and_is_idempotent() {
    let fixed = auto_fix_stat_repetition(REPEATED_STAT);
    assert_ne!(fixed, REPEATED_STAT);
    assert!(fixed.contains("drew **$4.2B** in funding"));
    assert_eq!(fixed.matches("$4.2B").count(), 1);
    assert!(check_stat_repetition(&fixed).is_none());

    assert_eq!(auto_fix_stat_repetition(&fixed), fixed);
    assert_eq!(auto_fix_stat_repetition(REWORDED_STAT), REWORDED_STAT);
}

// ---------------------------------------------------------------------------
// Section echo
// ---------------------------------------------------------------------------

#[test]
fn overlapping_sections_are_flagged_once() {
    let issues = check_section_echo(ECHOING_SECTIONS);
    assert_eq!(issues.len(), 1);
    assert_eq!(issues[0].kind, IssueKind::SectionEcho);
    assert!(issues[0].detail.contains("Adoption"));
    assert!(issues[0].detail.contains("Outlook"));
}

#[test]
fn distinct_sections_are_not_flagged() {
    assert!(check_section_echo(DISTINCT_SECTIONS).is_empty());
}

// ---------------------------------------------------------------------------
// Full run
// ---------------------------------------------------------------------------

#[test]
fn empty_content_short_circuits() {
    let report = run_quality_checks("  \n\t ", &QualityContext::default());
    assert_eq!(report.issues.len(), 1);
    assert_eq!(report.issues[0].kind, IssueKind::EmptyContent);
    assert!(report.has_critical());
}

#[test]
fn critical_issues_come_first() {
    let catalog = vec![CatalogEntry {
        id: "p1".into(),
        title: None,
        text: "Three labs take half the funding by Q2 2026".into(),
        status: PredictionStatus::Open,
        target_date: None,
    }];
    let content = format!("{REPEATED_STAT}\nReminder: three labs take half the funding by Q2 2026.\n");
    let report = run_quality_checks(&content, &QualityContext::default().with_catalog(catalog).on(today()));

    assert!(report.has_critical());
    assert_eq!(report.issues[0].kind, IssueKind::StalePrediction);
    assert_eq!(report.warnings().count(), report.issues.len() - 1);
    assert!(report.warnings().any(|i| i.kind == IssueKind::StatRepetition));
}

#[test]
fn clean_content_passes() {
    let report = run_quality_checks(DISTINCT_SECTIONS, &QualityContext::default().on(today()));
    assert!(report.is_clean(), "unexpected issues: {}", report.summary());
}

// ---------------------------------------------------------------------------
// Target dates
// ---------------------------------------------------------------------------

#[test]
fn relative_timeframe_lands_in_window() {
    let now = chrono::Utc::now().date_naive();
    let target = extract_target_date("within 6 months").unwrap();
    let days = (target - now).num_days();
    assert!((150..=210).contains(&days), "got {days} days");
}

#[test]
fn absolute_timeframes() {
    let ymd = |y, m, d| NaiveDate::from_ymd_opt(y, m, d).unwrap();
    assert_eq!(extract_target_date("By Q3 2026"), Some(ymd(2026, 9, 30)));
    assert_eq!(extract_target_date("by end of 2026"), Some(ymd(2026, 12, 31)));
    assert_eq!(extract_target_date("by mid-2027"), Some(ymd(2027, 6, 30)));
    assert_eq!(extract_target_date("sometime soon"), None);
}
