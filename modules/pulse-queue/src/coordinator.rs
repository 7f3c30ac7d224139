use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{debug, info, warn};
use uuid::Uuid;

use pulse_common::{NewTask, Task, TaskStatus};

use crate::store::{QueueStore, TaskFilter, TaskGuard, TaskOrder, TaskUpdate};

/// Candidates fetched per requested slot, so a lost race does not starve the batch.
const CLAIM_OVERFETCH: usize = 2;

/// Rows examined per requeue sweep.
const REQUEUE_BATCH: usize = 500;

/// Outcome of a complete/fail call.
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    Applied(Task),
    /// The task was not in progress. `current` is its status, or `None` if it does not exist.
    Ignored { current: Option<TaskStatus> },
}

impl Transition {
    pub fn applied(&self) -> bool {
        matches!(self, Self::Applied(_))
    }
}

/// Exactly-once claiming and the task state machine.
///
/// pending → in_progress → completed | failed. The requeue sweep is the only
/// path back to pending.
pub struct TaskClaimCoordinator<S> {
    store: S,
}

impl<S: QueueStore> TaskClaimCoordinator<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Insert a new pending task. Retrying a failed task is a new submission.
    pub async fn submit(&self, task: NewTask) -> Result<Task> {
        let task = self.store.insert_task(&task).await?;
        info!(
            task_id = %task.id,
            agent_type = task.agent_type.as_str(),
            task_type = task.task_type(),
            priority = task.priority,
            "Task submitted"
        );
        Ok(task)
    }

    /// Claim up to `limit` pending tasks for `agent_type`, in (priority, created_at) order.
    pub async fn claim(&self, agent_type: &str, limit: usize) -> Result<Vec<Task>> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let filter = TaskFilter::for_agent(agent_type).with_status(TaskStatus::Pending);
        let candidates = self
            .store
            .list_tasks(&filter, TaskOrder::Queue, limit * CLAIM_OVERFETCH)
            .await?;

        let now = Utc::now();
        let guard = TaskGuard::status(TaskStatus::Pending);
        let update = TaskUpdate::claim(now);
        let mut claimed = Vec::with_capacity(limit);

        for candidate in candidates {
            if claimed.len() == limit {
                break;
            }
            match self.store.compare_and_swap(candidate.id, &guard, &update).await? {
                Some(task) => claimed.push(task),
                None => debug!(task_id = %candidate.id, "Lost claim race, skipping"),
            }
        }

        if !claimed.is_empty() {
            info!(agent_type, claimed = claimed.len(), "Claimed tasks");
        }
        Ok(claimed)
    }

    /// in_progress → completed. No-op on any other status.
    pub async fn complete(&self, id: Uuid, output: Value) -> Result<Transition> {
        self.finish(id, TaskUpdate::complete(Utc::now(), output)).await
    }

    /// in_progress → failed. No-op on any other status.
    pub async fn fail(&self, id: Uuid, error: &str) -> Result<Transition> {
        self.finish(id, TaskUpdate::fail(Utc::now(), error.to_string(), None))
            .await
    }

    /// Like `fail`, also keeping the best-effort partial output.
    pub async fn fail_with_partial(&self, id: Uuid, error: &str, partial: Value) -> Result<Transition> {
        self.finish(id, TaskUpdate::fail(Utc::now(), error.to_string(), Some(partial)))
            .await
    }

    async fn finish(&self, id: Uuid, update: TaskUpdate) -> Result<Transition> {
        let guard = TaskGuard::status(TaskStatus::InProgress);
        if let Some(task) = self.store.compare_and_swap(id, &guard, &update).await? {
            match task.status {
                TaskStatus::Failed => warn!(
                    task_id = %id,
                    error = task.error.as_deref().unwrap_or_default(),
                    "Task failed"
                ),
                _ => info!(task_id = %id, status = %task.status, "Task finished"),
            }
            return Ok(Transition::Applied(task));
        }

        let current = self.store.fetch_task(id).await?.map(|t| t.status);
        match current {
            Some(status) if status.is_terminal() => {
                debug!(task_id = %id, status = %status, "Task already terminal, ignoring")
            }
            Some(status) => {
                warn!(task_id = %id, status = %status, target = %update.status, "Task not in progress, ignoring")
            }
            None => warn!(task_id = %id, "Unknown task, ignoring"),
        }
        Ok(Transition::Ignored { current })
    }

    /// Put tasks whose worker went silent back to pending.
    pub async fn requeue_stale(&self, agent_type: Option<&str>, timeout: Duration) -> Result<u64> {
        let timeout = chrono::Duration::from_std(timeout)?;
        self.requeue_started_before(agent_type, Utc::now() - timeout)
            .await
    }

    /// Requeue in-progress tasks started before `cutoff`. Each row is a
    /// guarded update, so this is safe to run alongside claiming.
    pub async fn requeue_started_before(
        &self,
        agent_type: Option<&str>,
        cutoff: DateTime<Utc>,
    ) -> Result<u64> {
        let filter = TaskFilter {
            agent_type: agent_type.map(str::to_string),
            ..TaskFilter::default()
        }
        .with_status(TaskStatus::InProgress)
        .started_before(cutoff);

        let stale = self
            .store
            .list_tasks(&filter, TaskOrder::StartedAt, REQUEUE_BATCH)
            .await?;

        let guard = TaskGuard::stale(cutoff);
        let update = TaskUpdate::requeue();
        let mut requeued = 0u64;

        for task in stale {
            if self
                .store
                .compare_and_swap(task.id, &guard, &update)
                .await?
                .is_some()
            {
                warn!(
                    task_id = %task.id,
                    agent_type = task.agent_type.as_str(),
                    started_at = ?task.started_at,
                    "Requeued stale task"
                );
                requeued += 1;
            }
        }

        Ok(requeued)
    }
}
