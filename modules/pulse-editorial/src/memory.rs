use std::cmp::Reverse;
use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use pulse_common::{Prediction, PredictionStatus, SpotlightRecord, Topic};

use crate::store::{EditorialStore, PredictionStore};

/// In-memory editorial tables for tests and dry runs.
#[derive(Default)]
pub struct MemoryEditorialStore {
    topics: Mutex<Vec<Topic>>,
    spotlights: Mutex<Vec<SpotlightRecord>>,
    predictions: Mutex<Vec<Prediction>>,
}

impl MemoryEditorialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace by `topic_key`.
    pub fn put_topic(&self, topic: Topic) {
        let mut topics = self.topics.lock().unwrap();
        match topics.iter_mut().find(|t| t.topic_key == topic.topic_key) {
            Some(existing) => *existing = topic,
            None => topics.push(topic),
        }
    }

    /// Insert or replace by id.
    pub fn put_prediction(&self, prediction: Prediction) {
        let mut predictions = self.predictions.lock().unwrap();
        match predictions.iter_mut().find(|p| p.id == prediction.id) {
            Some(existing) => *existing = prediction,
            None => predictions.push(prediction),
        }
    }

    pub fn spotlights(&self) -> Vec<SpotlightRecord> {
        self.spotlights.lock().unwrap().clone()
    }

    pub fn predictions(&self) -> Vec<Prediction> {
        self.predictions.lock().unwrap().clone()
    }
}

fn newest_resolved_first(rows: &mut [Prediction]) {
    rows.sort_by_key(|p| (Reverse(p.resolved_at), p.id));
}

#[async_trait]
impl EditorialStore for MemoryEditorialStore {
    async fn list_topics(&self) -> Result<Vec<Topic>> {
        Ok(self.topics.lock().unwrap().clone())
    }

    async fn spotlights_since(&self, since_issue: i32) -> Result<Vec<SpotlightRecord>> {
        let mut rows: Vec<SpotlightRecord> = self
            .spotlights
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.issue_number >= since_issue)
            .cloned()
            .collect();
        rows.sort_by_key(|r| Reverse(r.issue_number));
        Ok(rows)
    }

    async fn insert_spotlight(&self, record: &SpotlightRecord) -> Result<()> {
        self.spotlights.lock().unwrap().push(record.clone());
        Ok(())
    }
}

#[async_trait]
impl PredictionStore for MemoryEditorialStore {
    async fn insert_prediction(&self, prediction: &Prediction) -> Result<()> {
        self.predictions.lock().unwrap().push(prediction.clone());
        Ok(())
    }

    async fn fetch_prediction(&self, id: Uuid) -> Result<Option<Prediction>> {
        Ok(self
            .predictions
            .lock()
            .unwrap()
            .iter()
            .find(|p| p.id == id)
            .cloned())
    }

    async fn list_active_predictions(&self) -> Result<Vec<Prediction>> {
        Ok(self
            .predictions
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.status.is_active())
            .cloned()
            .collect())
    }

    async fn update_status(
        &self,
        id: Uuid,
        from: PredictionStatus,
        to: PredictionStatus,
        notes: &str,
        resolved_at: Option<DateTime<Utc>>,
    ) -> Result<Option<Prediction>> {
        let mut predictions = self.predictions.lock().unwrap();
        match predictions.iter_mut().find(|p| p.id == id) {
            Some(p) if p.status == from => {
                p.status = to;
                p.resolution_notes = Some(notes.to_string());
                if resolved_at.is_some() {
                    p.resolved_at = resolved_at;
                }
                Ok(Some(p.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn list_scorecard_candidates(&self, limit: usize) -> Result<Vec<Prediction>> {
        let mut rows: Vec<Prediction> = self
            .predictions
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.status.is_terminal() && p.scorecard_issue.is_none())
            .cloned()
            .collect();
        newest_resolved_first(&mut rows);
        rows.truncate(limit);
        Ok(rows)
    }

    async fn mark_scorecard(&self, id: Uuid, issue: i32) -> Result<Option<Prediction>> {
        let mut predictions = self.predictions.lock().unwrap();
        match predictions.iter_mut().find(|p| p.id == id) {
            Some(p) if p.scorecard_issue.is_none() => {
                p.scorecard_issue = Some(issue);
                Ok(Some(p.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn list_scorecard(&self, issue: i32) -> Result<Vec<Prediction>> {
        let mut rows: Vec<Prediction> = self
            .predictions
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.scorecard_issue == Some(issue))
            .cloned()
            .collect();
        newest_resolved_first(&mut rows);
        Ok(rows)
    }
}
