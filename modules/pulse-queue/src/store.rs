//! QueueStore: the typed seam over the task table.
//!
//! Row CRUD plus exactly one atomic primitive, `compare_and_swap`. Every
//! status change in the system goes through it.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

use pulse_common::{NewTask, Task, TaskStatus};

/// Row filter for listing and counting. `None` fields match everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskFilter {
    pub agent_type: Option<String>,
    pub status: Option<TaskStatus>,
    pub started_before: Option<DateTime<Utc>>,
    pub created_since: Option<DateTime<Utc>>,
}

impl TaskFilter {
    pub fn for_agent(agent_type: &str) -> Self {
        Self {
            agent_type: Some(agent_type.to_string()),
            ..Self::default()
        }
    }

    pub fn with_status(mut self, status: TaskStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn started_before(mut self, cutoff: DateTime<Utc>) -> Self {
        self.started_before = Some(cutoff);
        self
    }

    pub fn created_since(mut self, since: DateTime<Utc>) -> Self {
        self.created_since = Some(since);
        self
    }

    pub fn matches(&self, task: &Task) -> bool {
        if let Some(agent_type) = &self.agent_type {
            if &task.agent_type != agent_type {
                return false;
            }
        }
        if let Some(status) = self.status {
            if task.status != status {
                return false;
            }
        }
        if let Some(cutoff) = self.started_before {
            match task.started_at {
                Some(started) if started < cutoff => {}
                _ => return false,
            }
        }
        if let Some(since) = self.created_since {
            if task.created_at < since {
                return false;
            }
        }
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOrder {
    /// Claim order: priority ascending, then oldest first.
    Queue,
    /// Longest-running first.
    StartedAt,
}

/// Predicate a row must still satisfy for a conditional update to apply.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskGuard {
    pub status: TaskStatus,
    pub started_before: Option<DateTime<Utc>>,
}

impl TaskGuard {
    pub fn status(status: TaskStatus) -> Self {
        Self {
            status,
            started_before: None,
        }
    }

    pub fn stale(cutoff: DateTime<Utc>) -> Self {
        Self {
            status: TaskStatus::InProgress,
            started_before: Some(cutoff),
        }
    }

    pub fn admits(&self, task: &Task) -> bool {
        if task.status != self.status {
            return false;
        }
        match self.started_before {
            Some(cutoff) => task.started_at.is_some_and(|s| s < cutoff),
            None => true,
        }
    }
}

/// Column changes applied by a successful `compare_and_swap`.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskUpdate {
    pub status: TaskStatus,
    /// `Some(None)` clears the column.
    pub started_at: Option<Option<DateTime<Utc>>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub output: Option<Value>,
    pub error: Option<String>,
}

impl TaskUpdate {
    pub fn claim(now: DateTime<Utc>) -> Self {
        Self {
            status: TaskStatus::InProgress,
            started_at: Some(Some(now)),
            completed_at: None,
            output: None,
            error: None,
        }
    }

    pub fn complete(now: DateTime<Utc>, output: Value) -> Self {
        Self {
            status: TaskStatus::Completed,
            started_at: None,
            completed_at: Some(now),
            output: Some(output),
            error: None,
        }
    }

    pub fn fail(now: DateTime<Utc>, error: String, partial: Option<Value>) -> Self {
        Self {
            status: TaskStatus::Failed,
            started_at: None,
            completed_at: Some(now),
            output: partial,
            error: Some(error),
        }
    }

    pub fn requeue() -> Self {
        Self {
            status: TaskStatus::Pending,
            started_at: Some(None),
            completed_at: None,
            output: None,
            error: None,
        }
    }

    pub fn apply(&self, task: &mut Task) {
        task.status = self.status;
        if let Some(started_at) = self.started_at {
            task.started_at = started_at;
        }
        if let Some(completed_at) = self.completed_at {
            task.completed_at = Some(completed_at);
        }
        if let Some(output) = &self.output {
            task.output = Some(output.clone());
        }
        if let Some(error) = &self.error {
            task.error = Some(error.clone());
        }
    }
}

#[async_trait]
pub trait QueueStore: Send + Sync {
    async fn insert_task(&self, task: &NewTask) -> Result<Task>;

    async fn fetch_task(&self, id: Uuid) -> Result<Option<Task>>;

    async fn list_tasks(
        &self,
        filter: &TaskFilter,
        order: TaskOrder,
        limit: usize,
    ) -> Result<Vec<Task>>;

    async fn count_tasks(&self, filter: &TaskFilter) -> Result<u64>;

    /// Apply `update` only if the row still satisfies `guard`, atomically.
    /// Returns the updated row, or `None` when the guard no longer held.
    async fn compare_and_swap(
        &self,
        id: Uuid,
        guard: &TaskGuard,
        update: &TaskUpdate,
    ) -> Result<Option<Task>>;
}

// ---------------------------------------------------------------------------
// Arc<S> blanket so loops and tests can share one store
// ---------------------------------------------------------------------------

#[async_trait]
impl<S: QueueStore + ?Sized> QueueStore for Arc<S> {
    async fn insert_task(&self, task: &NewTask) -> Result<Task> {
        (**self).insert_task(task).await
    }

    async fn fetch_task(&self, id: Uuid) -> Result<Option<Task>> {
        (**self).fetch_task(id).await
    }

    async fn list_tasks(
        &self,
        filter: &TaskFilter,
        order: TaskOrder,
        limit: usize,
    ) -> Result<Vec<Task>> {
        (**self).list_tasks(filter, order, limit).await
    }

    async fn count_tasks(&self, filter: &TaskFilter) -> Result<u64> {
        (**self).count_tasks(filter).await
    }

    async fn compare_and_swap(
        &self,
        id: Uuid,
        guard: &TaskGuard,
        update: &TaskUpdate,
    ) -> Result<Option<Task>> {
        (**self).compare_and_swap(id, guard, update).await
    }
}
