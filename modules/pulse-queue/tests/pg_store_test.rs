//! Integration tests for PgQueueStore.
//! Requires a Postgres instance. Set DATABASE_TEST_URL or these tests are skipped.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{Duration, Utc};
use serde_json::json;
use sqlx::PgPool;
use uuid::Uuid;

use pulse_common::{NewTask, TaskInput, TaskStatus};
use pulse_queue::{PgQueueStore, QueueStore, TaskClaimCoordinator, TaskFilter, Transition};

/// Get a test database pool, or skip if no test DB is available.
async fn test_pool() -> Option<PgPool> {
    let url = std::env::var("DATABASE_TEST_URL").ok()?;
    let pool = PgPool::connect(&url).await.ok()?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS tasks (
            id            UUID         PRIMARY KEY,
            agent_type    TEXT         NOT NULL,
            task_type     TEXT         NOT NULL,
            status        TEXT         NOT NULL DEFAULT 'pending',
            priority      INTEGER      NOT NULL DEFAULT 100,
            input_data    JSONB        NOT NULL,
            output_data   JSONB,
            error_message TEXT,
            created_at    TIMESTAMPTZ  NOT NULL DEFAULT now(),
            started_at    TIMESTAMPTZ,
            completed_at  TIMESTAMPTZ
        )
        "#,
    )
    .execute(&pool)
    .await
    .ok()?;

    Some(pool)
}

/// Tests share the table, so each one works under its own agent type.
fn agent() -> String {
    format!("agent-{}", Uuid::new_v4())
}

fn job(agent: &str, n: i64) -> NewTask {
    NewTask::new(agent, TaskInput::from_parts("opportunity_scan", json!({ "n": n })))
}

// =========================================================================
// Basic behavior
// =========================================================================

#[tokio::test]
async fn insert_then_fetch_round_trips_typed_input() {
    let Some(pool) = test_pool().await else {
        return;
    };
    let store = PgQueueStore::new(pool);
    let agent = agent();

    let task = store.insert_task(&job(&agent, 7)).await.unwrap();
    assert_eq!(task.status, TaskStatus::Pending);

    let fetched = store.fetch_task(task.id).await.unwrap().unwrap();
    assert_eq!(fetched.input, task.input);
    assert_eq!(fetched.agent_type, agent);
}

#[tokio::test]
async fn claim_orders_by_priority_then_age() {
    let Some(pool) = test_pool().await else {
        return;
    };
    let coordinator = TaskClaimCoordinator::new(PgQueueStore::new(pool));
    let agent = agent();

    let routine = coordinator.submit(job(&agent, 1)).await.unwrap();
    let urgent = coordinator.submit(job(&agent, 2).with_priority(1)).await.unwrap();

    let claimed = coordinator.claim(&agent, 1).await.unwrap();
    assert_eq!(claimed.len(), 1);
    assert_eq!(claimed[0].id, urgent.id);
    assert_eq!(claimed[0].status, TaskStatus::InProgress);
    assert!(claimed[0].started_at.is_some());

    let next = coordinator.claim(&agent, 5).await.unwrap();
    assert_eq!(next.iter().map(|t| t.id).collect::<Vec<_>>(), vec![routine.id]);
}

#[tokio::test]
async fn completion_is_applied_once() {
    let Some(pool) = test_pool().await else {
        return;
    };
    let coordinator = TaskClaimCoordinator::new(PgQueueStore::new(pool));
    let agent = agent();

    let task = coordinator.submit(job(&agent, 1)).await.unwrap();
    coordinator.claim(&agent, 1).await.unwrap();

    let first = coordinator.complete(task.id, json!({ "ok": true })).await.unwrap();
    assert!(first.applied());

    let second = coordinator.fail(task.id, "late failure").await.unwrap();
    assert_eq!(
        second,
        Transition::Ignored {
            current: Some(TaskStatus::Completed)
        }
    );

    let row = coordinator.store().fetch_task(task.id).await.unwrap().unwrap();
    assert_eq!(row.output, Some(json!({ "ok": true })));
    assert!(row.error.is_none());
}

// =========================================================================
// Concurrency
// =========================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_claimers_never_share_a_task() {
    let Some(pool) = test_pool().await else {
        return;
    };
    let coordinator = Arc::new(TaskClaimCoordinator::new(PgQueueStore::new(pool)));
    let agent = agent();
    for n in 0..20 {
        coordinator.submit(job(&agent, n)).await.unwrap();
    }

    let mut handles = Vec::new();
    for _ in 0..4 {
        let coordinator = coordinator.clone();
        let agent = agent.clone();
        handles.push(tokio::spawn(async move {
            let mut mine = Vec::new();
            loop {
                let batch = coordinator.claim(&agent, 3).await.unwrap();
                if batch.is_empty() {
                    break;
                }
                mine.extend(batch.into_iter().map(|t| t.id));
            }
            mine
        }));
    }

    let mut seen = HashSet::new();
    for handle in handles {
        for id in handle.await.unwrap() {
            assert!(seen.insert(id), "task {id} claimed twice");
        }
    }
    assert_eq!(seen.len(), 20);
}

// =========================================================================
// Sweeps and counts
// =========================================================================

#[tokio::test]
async fn stale_tasks_return_to_pending() {
    let Some(pool) = test_pool().await else {
        return;
    };
    let coordinator = TaskClaimCoordinator::new(PgQueueStore::new(pool));
    let agent = agent();

    let task = coordinator.submit(job(&agent, 1)).await.unwrap();
    coordinator.claim(&agent, 1).await.unwrap();

    let future_cutoff = Utc::now() + Duration::minutes(1);
    let requeued = coordinator
        .requeue_started_before(Some(&agent), future_cutoff)
        .await
        .unwrap();
    assert_eq!(requeued, 1);

    let row = coordinator.store().fetch_task(task.id).await.unwrap().unwrap();
    assert_eq!(row.status, TaskStatus::Pending);
    assert!(row.started_at.is_none());
}

#[tokio::test]
async fn count_respects_created_since() {
    let Some(pool) = test_pool().await else {
        return;
    };
    let store = PgQueueStore::new(pool);
    let agent = agent();
    store.insert_task(&job(&agent, 1)).await.unwrap();
    store.insert_task(&job(&agent, 2)).await.unwrap();

    let today = TaskFilter::for_agent(&agent).created_since(Utc::now() - Duration::hours(1));
    assert_eq!(store.count_tasks(&today).await.unwrap(), 2);

    let later = TaskFilter::for_agent(&agent).created_since(Utc::now() + Duration::hours(1));
    assert_eq!(store.count_tasks(&later).await.unwrap(), 0);
}
