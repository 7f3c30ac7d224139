use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;

use pulse_common::{Prediction, PredictionStatus, SpotlightRecord, Topic, VelocitySnapshot};

use crate::store::{EditorialStore, PredictionStore};

/// Topics, spotlights and predictions in Postgres.
#[derive(Clone)]
pub struct PgEditorialStore {
    pool: PgPool,
}

impl PgEditorialStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

// --- Rows ---

#[derive(Debug, sqlx::FromRow)]
struct TopicRow {
    id: Uuid,
    topic_key: String,
    current_stage: String,
    snapshots: Json<Vec<VelocitySnapshot>>,
    last_updated: DateTime<Utc>,
}

impl TryFrom<TopicRow> for Topic {
    type Error = anyhow::Error;

    fn try_from(row: TopicRow) -> Result<Self> {
        let lifecycle_stage = row
            .current_stage
            .parse()
            .with_context(|| format!("topic {} has an unreadable stage", row.topic_key))?;
        let mut snapshots = row.snapshots.0;
        snapshots.sort_by_key(|s| s.timestamp);
        Ok(Topic {
            id: row.id,
            topic_key: row.topic_key,
            lifecycle_stage,
            snapshots,
            last_updated: row.last_updated,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct SpotlightRow {
    id: Uuid,
    topic_id: String,
    topic_name: String,
    covered_topics: Vec<String>,
    issue_number: i32,
    mode: String,
    thesis: String,
    evidence: String,
    counter_argument: String,
    prediction: String,
    builder_implications: String,
    sources_used: Vec<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<SpotlightRow> for SpotlightRecord {
    type Error = anyhow::Error;

    fn try_from(row: SpotlightRow) -> Result<Self> {
        let mode = row
            .mode
            .parse()
            .with_context(|| format!("spotlight {} has an unreadable mode", row.id))?;
        Ok(SpotlightRecord {
            id: row.id,
            topic_id: row.topic_id,
            topic_name: row.topic_name,
            covered_topics: row.covered_topics,
            issue_number: row.issue_number,
            mode,
            thesis: row.thesis,
            evidence: row.evidence,
            counter_argument: row.counter_argument,
            prediction: row.prediction,
            builder_implications: row.builder_implications,
            sources_used: row.sources_used,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct PredictionRow {
    id: Uuid,
    spotlight_id: Option<Uuid>,
    topic_id: String,
    text: String,
    issue_number: i32,
    status: String,
    resolution_notes: Option<String>,
    resolved_at: Option<DateTime<Utc>>,
    scorecard_issue: Option<i32>,
    created_at: DateTime<Utc>,
}

impl TryFrom<PredictionRow> for Prediction {
    type Error = anyhow::Error;

    fn try_from(row: PredictionRow) -> Result<Self> {
        let status = row
            .status
            .parse()
            .with_context(|| format!("prediction {} has an unreadable status", row.id))?;
        Ok(Prediction {
            id: row.id,
            spotlight_id: row.spotlight_id,
            topic_id: row.topic_id,
            text: row.text,
            issue_number: row.issue_number,
            status,
            resolution_notes: row.resolution_notes,
            resolved_at: row.resolved_at,
            scorecard_issue: row.scorecard_issue,
            created_at: row.created_at,
        })
    }
}

const PREDICTION_COLUMNS: &str = "id, spotlight_id, topic_id, text, issue_number, status, \
                                  resolution_notes, resolved_at, scorecard_issue, created_at";

fn terminal_statuses() -> Vec<&'static str> {
    PredictionStatus::TERMINAL.iter().map(|s| s.as_str()).collect()
}

// --- EditorialStore ---

#[async_trait]
impl EditorialStore for PgEditorialStore {
    async fn list_topics(&self) -> Result<Vec<Topic>> {
        let rows = sqlx::query_as::<_, TopicRow>(
            "SELECT id, topic_key, current_stage, snapshots, last_updated
             FROM topics
             ORDER BY topic_key",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Topic::try_from).collect()
    }

    async fn spotlights_since(&self, since_issue: i32) -> Result<Vec<SpotlightRecord>> {
        let rows = sqlx::query_as::<_, SpotlightRow>(
            "SELECT id, topic_id, topic_name, covered_topics, issue_number, mode, thesis, evidence,
                    counter_argument, prediction, builder_implications, sources_used, created_at
             FROM spotlights
             WHERE issue_number >= $1
             ORDER BY issue_number DESC, created_at DESC",
        )
        .bind(since_issue)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(SpotlightRecord::try_from).collect()
    }

    async fn insert_spotlight(&self, record: &SpotlightRecord) -> Result<()> {
        sqlx::query(
            "INSERT INTO spotlights (id, topic_id, topic_name, covered_topics, issue_number, mode,
                                     thesis, evidence, counter_argument, prediction,
                                     builder_implications, sources_used, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)",
        )
        .bind(record.id)
        .bind(&record.topic_id)
        .bind(&record.topic_name)
        .bind(&record.covered_topics)
        .bind(record.issue_number)
        .bind(record.mode.as_str())
        .bind(&record.thesis)
        .bind(&record.evidence)
        .bind(&record.counter_argument)
        .bind(&record.prediction)
        .bind(&record.builder_implications)
        .bind(&record.sources_used)
        .bind(record.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

// --- PredictionStore ---

#[async_trait]
impl PredictionStore for PgEditorialStore {
    async fn insert_prediction(&self, p: &Prediction) -> Result<()> {
        sqlx::query(
            "INSERT INTO predictions (id, spotlight_id, topic_id, text, issue_number, status,
                                      resolution_notes, resolved_at, scorecard_issue, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
        )
        .bind(p.id)
        .bind(p.spotlight_id)
        .bind(&p.topic_id)
        .bind(&p.text)
        .bind(p.issue_number)
        .bind(p.status.as_str())
        .bind(p.resolution_notes.as_deref())
        .bind(p.resolved_at)
        .bind(p.scorecard_issue)
        .bind(p.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn fetch_prediction(&self, id: Uuid) -> Result<Option<Prediction>> {
        let row = sqlx::query_as::<_, PredictionRow>(&format!(
            "SELECT {PREDICTION_COLUMNS} FROM predictions WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Prediction::try_from).transpose()
    }

    async fn list_active_predictions(&self) -> Result<Vec<Prediction>> {
        let rows = sqlx::query_as::<_, PredictionRow>(&format!(
            "SELECT {PREDICTION_COLUMNS} FROM predictions
             WHERE status IN ('open', 'flagged')
             ORDER BY created_at"
        ))
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Prediction::try_from).collect()
    }

    async fn update_status(
        &self,
        id: Uuid,
        from: PredictionStatus,
        to: PredictionStatus,
        notes: &str,
        resolved_at: Option<DateTime<Utc>>,
    ) -> Result<Option<Prediction>> {
        let row = sqlx::query_as::<_, PredictionRow>(&format!(
            "UPDATE predictions
             SET status = $3,
                 resolution_notes = $4,
                 resolved_at = COALESCE($5, resolved_at)
             WHERE id = $1 AND status = $2
             RETURNING {PREDICTION_COLUMNS}"
        ))
        .bind(id)
        .bind(from.as_str())
        .bind(to.as_str())
        .bind(notes)
        .bind(resolved_at)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Prediction::try_from).transpose()
    }

    async fn list_scorecard_candidates(&self, limit: usize) -> Result<Vec<Prediction>> {
        let rows = sqlx::query_as::<_, PredictionRow>(&format!(
            "SELECT {PREDICTION_COLUMNS} FROM predictions
             WHERE status = ANY($1) AND scorecard_issue IS NULL
             ORDER BY resolved_at DESC NULLS LAST, id
             LIMIT $2"
        ))
        .bind(terminal_statuses())
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Prediction::try_from).collect()
    }

    async fn mark_scorecard(&self, id: Uuid, issue: i32) -> Result<Option<Prediction>> {
        let row = sqlx::query_as::<_, PredictionRow>(&format!(
            "UPDATE predictions SET scorecard_issue = $2
             WHERE id = $1 AND scorecard_issue IS NULL
             RETURNING {PREDICTION_COLUMNS}"
        ))
        .bind(id)
        .bind(issue)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Prediction::try_from).transpose()
    }

    async fn list_scorecard(&self, issue: i32) -> Result<Vec<Prediction>> {
        let rows = sqlx::query_as::<_, PredictionRow>(&format!(
            "SELECT {PREDICTION_COLUMNS} FROM predictions
             WHERE scorecard_issue = $1
             ORDER BY resolved_at DESC NULLS LAST, id"
        ))
        .bind(issue)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Prediction::try_from).collect()
    }
}
