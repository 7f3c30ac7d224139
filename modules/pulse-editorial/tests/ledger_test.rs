//! Prediction lifecycle and scorecard selection against the in-memory store.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{Duration, Utc};
use uuid::Uuid;

use pulse_common::{Prediction, PredictionStatus, SpotlightMode, SpotlightRecord};
use pulse_editorial::{LedgerError, MemoryEditorialStore, PredictionLedger, PredictionStore};

fn ledger() -> PredictionLedger<Arc<MemoryEditorialStore>> {
    PredictionLedger::new(Arc::new(MemoryEditorialStore::new()))
}

fn prediction(status: PredictionStatus, resolved_days_ago: Option<i64>) -> Prediction {
    Prediction {
        id: Uuid::new_v4(),
        spotlight_id: None,
        topic_id: "edge-inference".into(),
        text: "Half of new laptops ship NPUs by Q4 2026".into(),
        issue_number: 3,
        status,
        resolution_notes: None,
        resolved_at: resolved_days_ago.map(|d| Utc::now() - Duration::days(d)),
        scorecard_issue: None,
        created_at: Utc::now() - Duration::days(90),
    }
}

fn seed(ledger: &PredictionLedger<Arc<MemoryEditorialStore>>, p: Prediction) -> Uuid {
    let id = p.id;
    ledger.store().put_prediction(p);
    id
}

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

#[tokio::test]
async fn open_to_flagged_to_resolved() {
    let ledger = ledger();
    let id = seed(&ledger, prediction(PredictionStatus::Open, None));

    let flagged = ledger.flag(id, "vendor roadmap slipped").await.unwrap();
    assert_eq!(flagged.status, PredictionStatus::Flagged);
    assert_eq!(flagged.resolution_notes.as_deref(), Some("vendor roadmap slipped"));

    let when = Utc::now();
    let resolved = ledger
        .resolve(id, PredictionStatus::PartiallyCorrect, "30% not 50%", when)
        .await
        .unwrap();
    assert_eq!(resolved.status, PredictionStatus::PartiallyCorrect);
    assert_eq!(resolved.resolved_at, Some(when));
}

#[tokio::test]
async fn open_can_resolve_directly() {
    let ledger = ledger();
    let id = seed(&ledger, prediction(PredictionStatus::Open, None));
    let resolved = ledger
        .resolve(id, PredictionStatus::Refuted, "did not happen", Utc::now())
        .await
        .unwrap();
    assert_eq!(resolved.status, PredictionStatus::Refuted);
}

#[tokio::test]
async fn invalid_transitions_are_typed_errors() {
    let ledger = ledger();
    let done = seed(&ledger, prediction(PredictionStatus::Confirmed, Some(1)));
    let open = seed(&ledger, prediction(PredictionStatus::Open, None));

    assert!(matches!(
        ledger.flag(done, "late flag").await,
        Err(LedgerError::InvalidTransition { from: PredictionStatus::Confirmed, .. })
    ));
    assert!(matches!(
        ledger.resolve(open, PredictionStatus::Flagged, "notes", Utc::now()).await,
        Err(LedgerError::NotAnOutcome(PredictionStatus::Flagged))
    ));
    assert!(matches!(
        ledger.resolve(open, PredictionStatus::Confirmed, "   ", Utc::now()).await,
        Err(LedgerError::NotesRequired(_))
    ));
    assert!(matches!(
        ledger.flag(Uuid::new_v4(), "notes").await,
        Err(LedgerError::NotFound(_))
    ));

    let untouched = ledger.store().fetch_prediction(open).await.unwrap().unwrap();
    assert_eq!(untouched.status, PredictionStatus::Open);
}

// ---------------------------------------------------------------------------
// Scorecard
// ---------------------------------------------------------------------------

#[tokio::test]
async fn scorecard_takes_most_recent_resolutions() {
    let ledger = ledger();
    let old = seed(&ledger, prediction(PredictionStatus::Confirmed, Some(30)));
    let newest = seed(&ledger, prediction(PredictionStatus::Refuted, Some(1)));
    let middle = seed(&ledger, prediction(PredictionStatus::PartiallyCorrect, Some(10)));
    seed(&ledger, prediction(PredictionStatus::Open, None));
    seed(&ledger, prediction(PredictionStatus::Flagged, None));

    let picked = ledger.select_for_scorecard(20, 2).await.unwrap();
    let ids: Vec<_> = picked.iter().map(|p| p.id).collect();
    assert_eq!(ids, vec![newest, middle]);
    assert!(picked.iter().all(|p| p.scorecard_issue == Some(20)));

    let unused = ledger.store().fetch_prediction(old).await.unwrap().unwrap();
    assert_eq!(unused.scorecard_issue, None);
}

#[tokio::test]
async fn rerun_for_same_issue_returns_same_set() {
    let ledger = ledger();
    for days in [1, 2, 3] {
        seed(&ledger, prediction(PredictionStatus::Confirmed, Some(days)));
    }

    let first = ledger.select_for_scorecard(20, 2).await.unwrap();
    let again = ledger.select_for_scorecard(20, 5).await.unwrap();
    assert_eq!(first, again);
}

#[tokio::test]
async fn a_prediction_appears_in_one_scorecard_only() {
    let ledger = ledger();
    for days in [1, 2, 3] {
        seed(&ledger, prediction(PredictionStatus::Confirmed, Some(days)));
    }

    let first: HashSet<_> = ledger
        .select_for_scorecard(20, 2)
        .await
        .unwrap()
        .into_iter()
        .map(|p| p.id)
        .collect();
    let second: HashSet<_> = ledger
        .select_for_scorecard(21, 5)
        .await
        .unwrap()
        .into_iter()
        .map(|p| p.id)
        .collect();

    assert_eq!(first.len(), 2);
    assert_eq!(second.len(), 1);
    assert!(first.is_disjoint(&second));
    assert!(ledger.select_for_scorecard(22, 5).await.unwrap().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_scorecards_never_share_predictions() {
    let ledger = Arc::new(ledger());
    for days in 1..=12 {
        seed(&ledger, prediction(PredictionStatus::Confirmed, Some(days)));
    }

    let mut handles = Vec::new();
    for issue in 30..34 {
        let ledger = ledger.clone();
        handles.push(tokio::spawn(async move {
            ledger.select_for_scorecard(issue, 5).await.unwrap()
        }));
    }

    let mut seen = HashSet::new();
    for handle in handles {
        for p in handle.await.unwrap() {
            assert!(seen.insert(p.id), "prediction {} used twice", p.id);
        }
    }
    assert!(!seen.is_empty());
    assert!(ledger.store().predictions().iter().all(|p| match p.scorecard_issue {
        Some(issue) => (30..34).contains(&issue) && seen.contains(&p.id),
        None => !seen.contains(&p.id),
    }));
}

// ---------------------------------------------------------------------------
// From spotlights
// ---------------------------------------------------------------------------

fn spotlight(prediction: &str) -> SpotlightRecord {
    SpotlightRecord {
        id: Uuid::new_v4(),
        topic_id: "edge-inference".into(),
        topic_name: "Edge inference".into(),
        covered_topics: vec![],
        issue_number: 14,
        mode: SpotlightMode::Spotlight,
        thesis: "t".into(),
        evidence: "e".into(),
        counter_argument: "c".into(),
        prediction: prediction.into(),
        builder_implications: "b".into(),
        sources_used: vec![],
        created_at: Utc::now(),
    }
}

#[tokio::test]
async fn spotlight_prediction_is_recorded_open() {
    let ledger = ledger();
    let record = spotlight("  Two OEMs ship 40 TOPS NPUs by Q2 2027 ");
    let p = ledger.record_from_spotlight(&record).await.unwrap().unwrap();

    assert_eq!(p.status, PredictionStatus::Open);
    assert_eq!(p.spotlight_id, Some(record.id));
    assert_eq!(p.text, "Two OEMs ship 40 TOPS NPUs by Q2 2027");
    assert_eq!(p.issue_number, 14);
    assert_eq!(ledger.active().await.unwrap().len(), 1);
}

#[tokio::test]
async fn blank_spotlight_prediction_records_nothing() {
    let ledger = ledger();
    assert!(ledger.record_from_spotlight(&spotlight("  ")).await.unwrap().is_none());
    assert!(ledger.store().predictions().is_empty());
}
