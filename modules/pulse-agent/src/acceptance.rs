//! Acceptance review for ingested agent output.
//!
//! Shape validation first, then the quality gate. Accepted analyses become
//! SpotlightRecords with their prediction opened in the ledger, at most one
//! per (issue, topic). Newsletters get the statistic auto-fix before the
//! gate runs.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};
use tracing::{info, warn};
use uuid::Uuid;

use pulse_common::config::QualityConfig;
use pulse_common::{
    validate_output, AnalysisOutput, NewsletterOutput, SpotlightMode, SpotlightRecord, Task,
    TaskInput, TaskOutput,
};
use pulse_editorial::quality::{auto_fix_stat_repetition, CatalogEntry};
use pulse_editorial::{
    run_quality_checks, EditorialStore, PredictionLedger, PredictionStore, QualityContext,
    QualityReport,
};
use pulse_queue::{ResultReview, Review};

pub struct EditorialReview<E> {
    editorial: E,
    ledger: PredictionLedger<E>,
    quality: QualityConfig,
}

impl<E> EditorialReview<E>
where
    E: EditorialStore + PredictionStore + Clone,
{
    pub fn new(editorial: E, quality: QualityConfig) -> Self {
        Self {
            ledger: PredictionLedger::new(editorial.clone()),
            editorial,
            quality,
        }
    }

    async fn quality_context(&self) -> QualityContext {
        let catalog = match self.ledger.active().await {
            Ok(predictions) => predictions.iter().map(CatalogEntry::from).collect(),
            Err(e) => {
                warn!(error = %e, "Failed to load prediction catalog, skipping stale checks");
                Vec::new()
            }
        };
        QualityContext::default()
            .with_catalog(catalog)
            .with_config(self.quality.clone())
    }

    async fn gate(&self, task: &Task, content: &str, output: &Value) -> Result<QualityReport, Review> {
        let report = run_quality_checks(content, &self.quality_context().await);
        if report.has_critical() {
            warn!(task_id = %task.id, issues = %report.summary(), "Quality gate blocked output");
            return Err(Review::Reject {
                error: format!("quality gate: {}", report.summary()),
                partial: Some(output.clone()),
            });
        }
        for issue in report.warnings() {
            info!(task_id = %task.id, kind = %issue.kind, detail = issue.detail.as_str(), "Quality warning");
        }
        Ok(report)
    }

    async fn accept_analysis(&self, task: &Task, analysis: AnalysisOutput) -> Review {
        let Some(target) = AnalysisTarget::from_input(&task.input) else {
            return accept_value(task, &TaskOutput::Analysis(analysis), None);
        };

        let value = match serde_json::to_value(&analysis) {
            Ok(v) => v,
            Err(e) => return reject(format!("failed to encode output: {e}")),
        };
        let report = match self.gate(task, &analysis_markdown(&analysis), &value).await {
            Ok(report) => report,
            Err(rejected) => return rejected,
        };

        // A rerun of the same task (requeued after acceptance) reuses the record.
        let spotlight_id = match self.existing_spotlight(&target).await {
            Some(id) => {
                info!(task_id = %task.id, spotlight_id = %id, "Spotlight already stored for this issue");
                id
            }
            None => match self.store_spotlight(task, target, analysis).await {
                Ok(id) => id,
                Err(e) => {
                    warn!(task_id = %task.id, error = %e, "Failed to store spotlight");
                    return Review::Reject {
                        error: format!("failed to store spotlight: {e}"),
                        partial: Some(value),
                    };
                }
            },
        };

        let mut accepted = value;
        if let Value::Object(map) = &mut accepted {
            map.insert("spotlight_id".into(), json!(spotlight_id));
            map.insert("quality_warnings".into(), warnings_json(&report));
        }
        Review::Accept(accepted)
    }

    async fn existing_spotlight(&self, target: &AnalysisTarget) -> Option<Uuid> {
        match self.editorial.spotlights_since(target.issue_number).await {
            Ok(records) => records
                .into_iter()
                .find(|r| r.issue_number == target.issue_number && r.topic_id == target.topic_id)
                .map(|r| r.id),
            Err(e) => {
                warn!(issue = target.issue_number, error = %e, "Failed to check for an existing spotlight");
                None
            }
        }
    }

    async fn store_spotlight(
        &self,
        task: &Task,
        target: AnalysisTarget,
        analysis: AnalysisOutput,
    ) -> anyhow::Result<Uuid> {
        let record = SpotlightRecord {
            id: Uuid::new_v4(),
            topic_id: target.topic_id,
            topic_name: target.topic_name,
            covered_topics: target.covered_topics,
            issue_number: target.issue_number,
            mode: target.mode,
            thesis: analysis.thesis,
            evidence: analysis.evidence,
            counter_argument: analysis.counter_argument,
            prediction: analysis.prediction,
            builder_implications: analysis.builder_implications,
            sources_used: analysis.sources_used,
            created_at: Utc::now(),
        };

        self.editorial.insert_spotlight(&record).await?;
        info!(
            task_id = %task.id,
            spotlight_id = %record.id,
            topic = record.topic_id.as_str(),
            mode = %record.mode,
            "Spotlight accepted"
        );

        if let Err(e) = self.ledger.record_from_spotlight(&record).await {
            warn!(spotlight_id = %record.id, error = %e, "Failed to record prediction");
        }
        Ok(record.id)
    }

    async fn accept_newsletter(&self, task: &Task, newsletter: NewsletterOutput) -> Review {
        let fixed = NewsletterOutput {
            content: auto_fix_stat_repetition(&newsletter.content),
            subject: newsletter.subject,
        };
        if fixed.content != newsletter.content {
            info!(task_id = %task.id, "Replaced repeated lead statistic");
        }

        let value = match serde_json::to_value(&fixed) {
            Ok(v) => v,
            Err(e) => return reject(format!("failed to encode output: {e}")),
        };
        match self.gate(task, &fixed.content, &value).await {
            Ok(report) => accept_value(task, &TaskOutput::Newsletter(fixed), Some(&report)),
            Err(rejected) => rejected,
        }
    }
}

#[async_trait]
impl<E> ResultReview for EditorialReview<E>
where
    E: EditorialStore + PredictionStore + Clone,
{
    async fn review(&self, task: &Task, output: Value) -> Review {
        let typed = match validate_output(&task.input, &output) {
            Ok(typed) => typed,
            Err(e) => {
                warn!(task_id = %task.id, error = %e, "Agent output failed validation");
                return Review::Reject {
                    error: e.to_string(),
                    partial: serde_json::to_value(&e.partial).ok(),
                };
            }
        };

        match typed {
            TaskOutput::Analysis(analysis) => self.accept_analysis(task, analysis).await,
            TaskOutput::Newsletter(newsletter) => self.accept_newsletter(task, newsletter).await,
            untyped @ TaskOutput::Untyped(_) => accept_value(task, &untyped, None),
        }
    }
}

/// Where an analysis lands. Synthesis records are filed under their lead
/// topic and list every member in `covered_topics`.
struct AnalysisTarget {
    topic_id: String,
    topic_name: String,
    covered_topics: Vec<String>,
    issue_number: i32,
    mode: SpotlightMode,
}

impl AnalysisTarget {
    fn from_input(input: &TaskInput) -> Option<Self> {
        match input {
            TaskInput::Spotlight(brief) => Some(Self {
                topic_id: brief.topic_key.clone(),
                topic_name: brief.topic_name.clone(),
                covered_topics: Vec::new(),
                issue_number: brief.issue_number,
                mode: SpotlightMode::Spotlight,
            }),
            TaskInput::Synthesis(brief) => {
                let lead = brief.topics.first()?;
                let keys: Vec<String> = brief.topics.iter().map(|t| t.topic_key.clone()).collect();
                Some(Self {
                    topic_id: lead.topic_key.clone(),
                    topic_name: keys.join(" + "),
                    covered_topics: keys,
                    issue_number: brief.issue_number,
                    mode: SpotlightMode::Synthesis,
                })
            }
            _ => None,
        }
    }
}

/// Render an analysis as sectioned markdown for the quality gate.
fn analysis_markdown(a: &AnalysisOutput) -> String {
    format!(
        "## Thesis\n{}\n\n## Evidence\n{}\n\n## Counter-argument\n{}\n\n## Prediction\n**Prediction:** {}\n\n## Builder implications\n{}\n",
        a.thesis, a.evidence, a.counter_argument, a.prediction, a.builder_implications
    )
}

fn warnings_json(report: &QualityReport) -> Value {
    Value::Array(
        report
            .warnings()
            .map(|i| json!({ "kind": i.kind.to_string(), "detail": i.detail }))
            .collect(),
    )
}

fn accept_value(task: &Task, output: &TaskOutput, report: Option<&QualityReport>) -> Review {
    match output.to_value() {
        Ok(mut value) => {
            if let (Some(report), Value::Object(map)) = (report, &mut value) {
                map.insert("quality_warnings".into(), warnings_json(report));
            }
            Review::Accept(value)
        }
        Err(e) => {
            warn!(task_id = %task.id, error = %e, "Failed to encode output");
            reject(format!("failed to encode output: {e}"))
        }
    }
}

fn reject(error: String) -> Review {
    Review::Reject {
        error,
        partial: None,
    }
}
