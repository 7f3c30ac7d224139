use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use pulse_common::{NewTask, Task, TaskStatus};

use crate::store::{QueueStore, TaskFilter, TaskGuard, TaskOrder, TaskUpdate};

/// In-memory task table for tests and local runs. Every operation holds one
/// lock, so `compare_and_swap` is atomic the same way a guarded UPDATE is.
pub struct MemoryQueueStore {
    tasks: Mutex<Vec<Task>>,
}

impl MemoryQueueStore {
    pub fn new() -> Self {
        Self {
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Snapshot of every row (for test assertions).
    pub fn tasks(&self) -> Vec<Task> {
        self.tasks.lock().unwrap().clone()
    }

    /// Overwrite a row in place (for test setup, e.g. backdating `started_at`).
    pub fn put(&self, task: Task) {
        let mut tasks = self.tasks.lock().unwrap();
        match tasks.iter_mut().find(|t| t.id == task.id) {
            Some(existing) => *existing = task,
            None => tasks.push(task),
        }
    }
}

impl Default for MemoryQueueStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl QueueStore for MemoryQueueStore {
    async fn insert_task(&self, task: &NewTask) -> Result<Task> {
        let row = Task {
            id: Uuid::new_v4(),
            agent_type: task.agent_type.clone(),
            input: task.input.clone(),
            status: TaskStatus::Pending,
            priority: task.priority,
            output: None,
            error: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        };
        self.tasks.lock().unwrap().push(row.clone());
        Ok(row)
    }

    async fn fetch_task(&self, id: Uuid) -> Result<Option<Task>> {
        Ok(self.tasks.lock().unwrap().iter().find(|t| t.id == id).cloned())
    }

    async fn list_tasks(
        &self,
        filter: &TaskFilter,
        order: TaskOrder,
        limit: usize,
    ) -> Result<Vec<Task>> {
        let mut rows: Vec<Task> = self
            .tasks
            .lock()
            .unwrap()
            .iter()
            .filter(|t| filter.matches(t))
            .cloned()
            .collect();

        // Stable sort: insertion order breaks timestamp ties.
        match order {
            TaskOrder::Queue => rows.sort_by_key(|t| (t.priority, t.created_at)),
            TaskOrder::StartedAt => rows.sort_by_key(|t| t.started_at),
        }
        rows.truncate(limit);
        Ok(rows)
    }

    async fn count_tasks(&self, filter: &TaskFilter) -> Result<u64> {
        let count = self
            .tasks
            .lock()
            .unwrap()
            .iter()
            .filter(|t| filter.matches(t))
            .count();
        Ok(count as u64)
    }

    async fn compare_and_swap(
        &self,
        id: Uuid,
        guard: &TaskGuard,
        update: &TaskUpdate,
    ) -> Result<Option<Task>> {
        let mut tasks = self.tasks.lock().unwrap();
        match tasks.iter_mut().find(|t| t.id == id) {
            Some(task) if guard.admits(task) => {
                update.apply(task);
                Ok(Some(task.clone()))
            }
            _ => Ok(None),
        }
    }
}
