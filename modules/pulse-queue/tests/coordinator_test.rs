//! Claim races and state-machine edges, driven against the in-memory store.

use std::collections::HashSet;
use std::sync::Arc;

use serde_json::json;

use pulse_common::{NewTask, TaskInput, TaskStatus};
use pulse_queue::{MemoryQueueStore, QueueStore, TaskClaimCoordinator, Transition};

fn shared_coordinator() -> Arc<TaskClaimCoordinator<Arc<MemoryQueueStore>>> {
    Arc::new(TaskClaimCoordinator::new(Arc::new(MemoryQueueStore::new())))
}

fn scan(n: usize) -> NewTask {
    NewTask::new("analyst", TaskInput::from_parts("opportunity_scan", json!({ "n": n })))
}

// ---------------------------------------------------------------------------
// Exactly-once claiming
// ---------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_claimers_never_share_a_task() {
    let coordinator = shared_coordinator();
    for n in 0..40 {
        coordinator.submit(scan(n)).await.unwrap();
    }

    let mut handles = Vec::new();
    for _ in 0..8 {
        let coordinator = coordinator.clone();
        handles.push(tokio::spawn(async move {
            let mut mine = Vec::new();
            loop {
                let batch = coordinator.claim("analyst", 3).await.unwrap();
                if batch.is_empty() {
                    break;
                }
                mine.extend(batch.into_iter().map(|t| t.id));
                tokio::task::yield_now().await;
            }
            mine
        }));
    }

    let mut seen = HashSet::new();
    let mut total = 0;
    for handle in handles {
        for id in handle.await.unwrap() {
            total += 1;
            assert!(seen.insert(id), "task {id} claimed twice");
        }
    }
    assert_eq!(total, 40);

    let rows = coordinator.store().tasks();
    assert!(rows.iter().all(|t| t.status == TaskStatus::InProgress));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_completions_apply_once() {
    let coordinator = shared_coordinator();
    let task = coordinator.submit(scan(0)).await.unwrap();
    coordinator.claim("analyst", 1).await.unwrap();

    let mut handles = Vec::new();
    for n in 0..6 {
        let coordinator = coordinator.clone();
        handles.push(tokio::spawn(async move {
            if n % 2 == 0 {
                coordinator.complete(task.id, json!({ "winner": n })).await.unwrap()
            } else {
                coordinator.fail(task.id, "lost").await.unwrap()
            }
        }));
    }

    let mut applied = 0;
    for handle in handles {
        if handle.await.unwrap().applied() {
            applied += 1;
        }
    }
    assert_eq!(applied, 1);

    let row = coordinator.store().fetch_task(task.id).await.unwrap().unwrap();
    assert!(row.status.is_terminal());
}

// ---------------------------------------------------------------------------
// Retry is a new task
// ---------------------------------------------------------------------------

#[tokio::test]
async fn failed_tasks_stay_failed_and_retry_gets_a_new_id() {
    let coordinator = shared_coordinator();
    let task = coordinator.submit(scan(0)).await.unwrap();
    coordinator.claim("analyst", 1).await.unwrap();
    coordinator.fail(task.id, "agent crashed").await.unwrap();

    assert!(coordinator.claim("analyst", 5).await.unwrap().is_empty());

    let retry = coordinator
        .submit(NewTask::new("analyst", task.input.clone()))
        .await
        .unwrap();
    assert_ne!(retry.id, task.id);

    let claimed = coordinator.claim("analyst", 5).await.unwrap();
    assert_eq!(claimed.len(), 1);
    assert_eq!(claimed[0].id, retry.id);

    let outcome = coordinator.complete(task.id, json!({})).await.unwrap();
    assert_eq!(outcome, Transition::Ignored { current: Some(TaskStatus::Failed) });
}
