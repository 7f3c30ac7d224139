//! Prediction lifecycle and scorecard bookkeeping.
//!
//! open → flagged → {confirmed, refuted, partially_correct}, with flagged
//! optional. A prediction is used in at most one scorecard; the marker is
//! set once by a conditional update.

use std::cmp::Reverse;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use pulse_common::{Prediction, PredictionStatus, SpotlightRecord};

use crate::store::PredictionStore;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("prediction {0} not found")]
    NotFound(Uuid),

    #[error("notes are required to {0} a prediction")]
    NotesRequired(&'static str),

    #[error("{0} is not a resolution outcome")]
    NotAnOutcome(PredictionStatus),

    #[error("prediction {id} cannot move from {from} to {to}")]
    InvalidTransition {
        id: Uuid,
        from: PredictionStatus,
        to: PredictionStatus,
    },

    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

pub struct PredictionLedger<S> {
    store: S,
}

impl<S: PredictionStore> PredictionLedger<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Mark an open prediction as needing attention.
    pub async fn flag(&self, id: Uuid, notes: &str) -> Result<Prediction, LedgerError> {
        if notes.trim().is_empty() {
            return Err(LedgerError::NotesRequired("flag"));
        }
        self.transition(id, PredictionStatus::Flagged, notes, None)
            .await
    }

    /// Record the outcome of an open or flagged prediction.
    pub async fn resolve(
        &self,
        id: Uuid,
        outcome: PredictionStatus,
        notes: &str,
        resolved_at: DateTime<Utc>,
    ) -> Result<Prediction, LedgerError> {
        if !outcome.is_terminal() {
            return Err(LedgerError::NotAnOutcome(outcome));
        }
        if notes.trim().is_empty() {
            return Err(LedgerError::NotesRequired("resolve"));
        }
        self.transition(id, outcome, notes, Some(resolved_at)).await
    }

    async fn transition(
        &self,
        id: Uuid,
        to: PredictionStatus,
        notes: &str,
        resolved_at: Option<DateTime<Utc>>,
    ) -> Result<Prediction, LedgerError> {
        let current = self
            .store
            .fetch_prediction(id)
            .await?
            .ok_or(LedgerError::NotFound(id))?;

        if !current.status.can_transition_to(to) {
            return Err(LedgerError::InvalidTransition {
                id,
                from: current.status,
                to,
            });
        }

        match self
            .store
            .update_status(id, current.status, to, notes, resolved_at)
            .await?
        {
            Some(updated) => {
                info!(prediction_id = %id, from = %current.status, to = %to, "Prediction updated");
                Ok(updated)
            }
            None => {
                // Someone else moved it between the read and the write.
                let now = self
                    .store
                    .fetch_prediction(id)
                    .await?
                    .ok_or(LedgerError::NotFound(id))?;
                warn!(prediction_id = %id, status = %now.status, "Prediction changed concurrently");
                Err(LedgerError::InvalidTransition {
                    id,
                    from: now.status,
                    to,
                })
            }
        }
    }

    /// Pick resolved predictions for the scorecard of `current_issue`.
    ///
    /// Re-running for the same issue returns the set already marked for it.
    /// Otherwise the most recently resolved unused predictions are marked,
    /// each with a set-once update; rows lost to a concurrent marker are kept
    /// only if that marker used the same issue.
    pub async fn select_for_scorecard(
        &self,
        current_issue: i32,
        max_count: usize,
    ) -> Result<Vec<Prediction>, LedgerError> {
        let existing = self.store.list_scorecard(current_issue).await?;
        if !existing.is_empty() {
            debug!(issue = current_issue, count = existing.len(), "Scorecard already selected");
            return Ok(existing);
        }
        if max_count == 0 {
            return Ok(Vec::new());
        }

        let candidates = self.store.list_scorecard_candidates(max_count).await?;
        let mut selected = Vec::with_capacity(candidates.len());

        for candidate in candidates {
            match self.store.mark_scorecard(candidate.id, current_issue).await? {
                Some(marked) => selected.push(marked),
                None => {
                    let Some(now) = self.store.fetch_prediction(candidate.id).await? else {
                        continue;
                    };
                    if now.scorecard_issue == Some(current_issue) {
                        selected.push(now);
                    } else {
                        debug!(
                            prediction_id = %candidate.id,
                            used_in = ?now.scorecard_issue,
                            "Prediction claimed by another scorecard"
                        );
                    }
                }
            }
        }

        selected.sort_by_key(|p| (Reverse(p.resolved_at), p.id));
        info!(issue = current_issue, count = selected.len(), "Scorecard selected");
        Ok(selected)
    }

    /// Open a prediction from an accepted spotlight. Blank prediction text
    /// records nothing.
    pub async fn record_from_spotlight(
        &self,
        record: &SpotlightRecord,
    ) -> Result<Option<Prediction>, LedgerError> {
        let text = record.prediction.trim();
        if text.is_empty() {
            return Ok(None);
        }

        let prediction = Prediction {
            id: Uuid::new_v4(),
            spotlight_id: Some(record.id),
            topic_id: record.topic_id.clone(),
            text: text.to_string(),
            issue_number: record.issue_number,
            status: PredictionStatus::Open,
            resolution_notes: None,
            resolved_at: None,
            scorecard_issue: None,
            created_at: Utc::now(),
        };
        self.store.insert_prediction(&prediction).await?;
        info!(
            prediction_id = %prediction.id,
            spotlight_id = %record.id,
            topic = record.topic_id.as_str(),
            "Prediction recorded"
        );
        Ok(Some(prediction))
    }

    /// Open and flagged predictions, for stale-claim checks.
    pub async fn active(&self) -> Result<Vec<Prediction>, LedgerError> {
        Ok(self.store.list_active_predictions().await?)
    }
}
