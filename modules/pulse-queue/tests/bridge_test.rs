//! File hand-off protocol against a real directory tree.

use std::path::Path;

use chrono::Utc;
use serde_json::json;
use tempfile::TempDir;
use uuid::Uuid;

use pulse_common::{NewTask, SpotlightBrief, Task, TaskInput, TaskStatus, LifecycleStage};
use pulse_queue::{AgentOutcome, FileQueueBridge, TaskFile};

fn bridge(dir: &TempDir) -> FileQueueBridge {
    FileQueueBridge::new(dir.path().join("pending"), dir.path().join("results"), "pulse-test")
}

fn spotlight_task(agent_type: &str) -> Task {
    let new = NewTask::new(
        agent_type,
        TaskInput::Spotlight(SpotlightBrief {
            topic_key: "local-first-sync".into(),
            topic_name: "Local-first sync".into(),
            issue_number: 12,
            lifecycle_stage: LifecycleStage::Debating,
            velocity: 14.0,
            sources: vec!["hn".into(), "lobsters".into()],
        }),
    );
    Task {
        id: Uuid::new_v4(),
        agent_type: new.agent_type,
        input: new.input,
        status: TaskStatus::InProgress,
        priority: new.priority,
        output: None,
        error: None,
        created_at: Utc::now(),
        started_at: Some(Utc::now()),
        completed_at: None,
    }
}

fn file_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

fn write_result(bridge: &FileQueueBridge, name: &str, body: &str) {
    std::fs::write(bridge.results_dir().join(name), body).unwrap();
}

// ---------------------------------------------------------------------------
// Publish
// ---------------------------------------------------------------------------

#[tokio::test]
async fn publish_writes_complete_task_file_and_no_temp() {
    let dir = TempDir::new().unwrap();
    let bridge = bridge(&dir);
    bridge.init().await.unwrap();

    let task = spotlight_task("analyst");
    let queued = bridge.publish(&task).await.unwrap();

    assert_eq!(queued.path, bridge.queue_path("analyst", task.id));
    assert_eq!(file_names(bridge.queue_dir()), vec![format!("analyst_{}.json", task.id)]);

    let on_disk: TaskFile =
        serde_json::from_str(&std::fs::read_to_string(&queued.path).unwrap()).unwrap();
    assert_eq!(on_disk, queued.payload);
    assert_eq!(on_disk.task, "spotlight");
    assert_eq!(on_disk.task_id, task.id);
    assert_eq!(on_disk.created_by, "pulse-test");
    assert_eq!(on_disk.params["topic_key"], "local-first-sync");
}

#[tokio::test]
async fn init_clears_interrupted_writes() {
    let dir = TempDir::new().unwrap();
    let bridge = bridge(&dir);
    bridge.init().await.unwrap();

    let leftover = bridge.queue_dir().join(".analyst_123.tmp");
    std::fs::write(&leftover, "{\"task\":").unwrap();
    bridge.init().await.unwrap();

    assert!(!leftover.exists());
}

#[tokio::test]
async fn publish_into_missing_directory_fails() {
    let dir = TempDir::new().unwrap();
    let bridge = bridge(&dir);

    assert!(bridge.publish(&spotlight_task("analyst")).await.is_err());
}

// ---------------------------------------------------------------------------
// Ingest
// ---------------------------------------------------------------------------

#[tokio::test]
async fn ingest_consumes_result_and_queue_file() {
    let dir = TempDir::new().unwrap();
    let bridge = bridge(&dir);
    bridge.init().await.unwrap();

    let task = spotlight_task("analyst");
    bridge.publish(&task).await.unwrap();
    write_result(
        &bridge,
        &format!("analyst_{}.result.json", task.id),
        &json!({ "task_id": task.id, "success": true, "result": { "thesis": "t" } }).to_string(),
    );

    let results = bridge.ingest("analyst").await.unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].task_id, task.id);
    assert_eq!(results[0].outcome, AgentOutcome::Succeeded(json!({ "thesis": "t" })));

    assert!(file_names(bridge.queue_dir()).is_empty());
    assert!(file_names(bridge.results_dir()).is_empty());

    assert!(bridge.ingest("analyst").await.unwrap().is_empty());
}

#[tokio::test]
async fn failure_results_carry_the_agent_error() {
    let dir = TempDir::new().unwrap();
    let bridge = bridge(&dir);
    bridge.init().await.unwrap();

    let id = Uuid::new_v4();
    write_result(
        &bridge,
        &format!("analyst_{id}.result.json"),
        &json!({ "task_id": id.to_string(), "success": false, "error": "rate limited" }).to_string(),
    );

    let results = bridge.ingest("analyst").await.unwrap();
    assert_eq!(results[0].outcome, AgentOutcome::Failed("rate limited".into()));
}

#[tokio::test]
async fn malformed_and_id_less_results_are_deleted_without_effect() {
    let dir = TempDir::new().unwrap();
    let bridge = bridge(&dir);
    bridge.init().await.unwrap();

    let task = spotlight_task("analyst");
    bridge.publish(&task).await.unwrap();

    write_result(&bridge, "analyst_aaa.result.json", "{ not json");
    write_result(&bridge, "analyst_bbb.result.json", r#"{"success": true, "result": {}}"#);
    write_result(&bridge, "analyst_ccc.result.json", r#"{"task_id": "nope", "success": true}"#);

    let results = bridge.ingest("analyst").await.unwrap();
    assert!(results.is_empty());
    assert!(file_names(bridge.results_dir()).is_empty());
    // Unrelated queue file is untouched.
    assert_eq!(file_names(bridge.queue_dir()), vec![format!("analyst_{}.json", task.id)]);
}

#[tokio::test]
async fn ingest_only_reads_its_own_agent_type() {
    let dir = TempDir::new().unwrap();
    let bridge = bridge(&dir);
    bridge.init().await.unwrap();

    let id = Uuid::new_v4();
    let body = json!({ "task_id": id, "success": true, "result": {} }).to_string();
    write_result(&bridge, &format!("writer_{id}.result.json"), &body);
    write_result(&bridge, &format!("analyst_deep_{id}.result.json"), &body);
    write_result(&bridge, "analyst_notes.txt", "ignore me");

    assert!(bridge.ingest("analyst").await.unwrap().is_empty());
    assert_eq!(file_names(bridge.results_dir()).len(), 3);

    let writer = bridge.ingest("writer").await.unwrap();
    assert_eq!(writer.len(), 1);
    let deep = bridge.ingest("analyst_deep").await.unwrap();
    assert_eq!(deep.len(), 1);
}
