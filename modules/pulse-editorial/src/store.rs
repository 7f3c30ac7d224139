use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use pulse_common::{Prediction, PredictionStatus, SpotlightRecord, Topic};

/// Topics and spotlight history.
#[async_trait]
pub trait EditorialStore: Send + Sync {
    async fn list_topics(&self) -> Result<Vec<Topic>>;

    /// Spotlights with `issue_number >= since_issue`, newest issue first.
    async fn spotlights_since(&self, since_issue: i32) -> Result<Vec<SpotlightRecord>>;

    async fn insert_spotlight(&self, record: &SpotlightRecord) -> Result<()>;
}

/// Prediction rows. Every status or scorecard change is conditional.
#[async_trait]
pub trait PredictionStore: Send + Sync {
    async fn insert_prediction(&self, prediction: &Prediction) -> Result<()>;

    async fn fetch_prediction(&self, id: Uuid) -> Result<Option<Prediction>>;

    /// Open and flagged predictions.
    async fn list_active_predictions(&self) -> Result<Vec<Prediction>>;

    /// Move `id` from `from` to `to` only if it is still `from`.
    async fn update_status(
        &self,
        id: Uuid,
        from: PredictionStatus,
        to: PredictionStatus,
        notes: &str,
        resolved_at: Option<DateTime<Utc>>,
    ) -> Result<Option<Prediction>>;

    /// Resolved, never used in a scorecard, most recently resolved first.
    async fn list_scorecard_candidates(&self, limit: usize) -> Result<Vec<Prediction>>;

    /// Set `scorecard_issue` if it is still unset.
    async fn mark_scorecard(&self, id: Uuid, issue: i32) -> Result<Option<Prediction>>;

    /// Predictions marked for `issue`, most recently resolved first.
    async fn list_scorecard(&self, issue: i32) -> Result<Vec<Prediction>>;
}

// ---------------------------------------------------------------------------
// Arc<S> blankets
// ---------------------------------------------------------------------------

#[async_trait]
impl<S: EditorialStore + ?Sized> EditorialStore for Arc<S> {
    async fn list_topics(&self) -> Result<Vec<Topic>> {
        (**self).list_topics().await
    }

    async fn spotlights_since(&self, since_issue: i32) -> Result<Vec<SpotlightRecord>> {
        (**self).spotlights_since(since_issue).await
    }

    async fn insert_spotlight(&self, record: &SpotlightRecord) -> Result<()> {
        (**self).insert_spotlight(record).await
    }
}

#[async_trait]
impl<S: PredictionStore + ?Sized> PredictionStore for Arc<S> {
    async fn insert_prediction(&self, prediction: &Prediction) -> Result<()> {
        (**self).insert_prediction(prediction).await
    }

    async fn fetch_prediction(&self, id: Uuid) -> Result<Option<Prediction>> {
        (**self).fetch_prediction(id).await
    }

    async fn list_active_predictions(&self) -> Result<Vec<Prediction>> {
        (**self).list_active_predictions().await
    }

    async fn update_status(
        &self,
        id: Uuid,
        from: PredictionStatus,
        to: PredictionStatus,
        notes: &str,
        resolved_at: Option<DateTime<Utc>>,
    ) -> Result<Option<Prediction>> {
        (**self).update_status(id, from, to, notes, resolved_at).await
    }

    async fn list_scorecard_candidates(&self, limit: usize) -> Result<Vec<Prediction>> {
        (**self).list_scorecard_candidates(limit).await
    }

    async fn mark_scorecard(&self, id: Uuid, issue: i32) -> Result<Option<Prediction>> {
        (**self).mark_scorecard(id, issue).await
    }

    async fn list_scorecard(&self, issue: i32) -> Result<Vec<Prediction>> {
        (**self).list_scorecard(issue).await
    }
}
