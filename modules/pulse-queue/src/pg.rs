use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use pulse_common::{NewTask, Task, TaskInput, TaskStatus};

use crate::store::{QueueStore, TaskFilter, TaskGuard, TaskOrder, TaskUpdate};

const TASK_COLUMNS: &str = "id, agent_type, task_type, status, priority, input_data, output_data, \
                            error_message, created_at, started_at, completed_at";

/// Task table backed by Postgres.
#[derive(Clone)]
pub struct PgQueueStore {
    pool: PgPool,
}

impl PgQueueStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct TaskRow {
    id: Uuid,
    agent_type: String,
    task_type: String,
    status: String,
    priority: i32,
    input_data: serde_json::Value,
    output_data: Option<serde_json::Value>,
    error_message: Option<String>,
    created_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
}

impl TryFrom<TaskRow> for Task {
    type Error = anyhow::Error;

    fn try_from(row: TaskRow) -> Result<Self> {
        let status: TaskStatus = row
            .status
            .parse()
            .with_context(|| format!("task {} has an unreadable status", row.id))?;
        Ok(Task {
            id: row.id,
            agent_type: row.agent_type,
            input: TaskInput::from_parts(&row.task_type, row.input_data),
            status,
            priority: row.priority,
            output: row.output_data,
            error: row.error_message,
            created_at: row.created_at,
            started_at: row.started_at,
            completed_at: row.completed_at,
        })
    }
}

fn order_clause(order: TaskOrder) -> &'static str {
    match order {
        TaskOrder::Queue => "ORDER BY priority ASC, created_at ASC, id ASC",
        TaskOrder::StartedAt => "ORDER BY started_at ASC NULLS LAST, id ASC",
    }
}

const FILTER_CLAUSE: &str = "($1::text IS NULL OR agent_type = $1)
              AND ($2::text IS NULL OR status = $2)
              AND ($3::timestamptz IS NULL OR started_at < $3)
              AND ($4::timestamptz IS NULL OR created_at >= $4)";

#[async_trait]
impl QueueStore for PgQueueStore {
    async fn insert_task(&self, task: &NewTask) -> Result<Task> {
        let input = task.input.to_value()?;
        let row = sqlx::query_as::<_, TaskRow>(&format!(
            "INSERT INTO tasks (id, agent_type, task_type, status, priority, input_data, created_at)
             VALUES ($1, $2, $3, 'pending', $4, $5, NOW())
             RETURNING {TASK_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(&task.agent_type)
        .bind(task.input.task_type())
        .bind(task.priority)
        .bind(input)
        .fetch_one(&self.pool)
        .await?;
        row.try_into()
    }

    async fn fetch_task(&self, id: Uuid) -> Result<Option<Task>> {
        let row = sqlx::query_as::<_, TaskRow>(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Task::try_from).transpose()
    }

    async fn list_tasks(
        &self,
        filter: &TaskFilter,
        order: TaskOrder,
        limit: usize,
    ) -> Result<Vec<Task>> {
        let rows = sqlx::query_as::<_, TaskRow>(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks
             WHERE {FILTER_CLAUSE}
             {}
             LIMIT $5",
            order_clause(order)
        ))
        .bind(filter.agent_type.as_deref())
        .bind(filter.status.map(|s| s.as_str()))
        .bind(filter.started_before)
        .bind(filter.created_since)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Task::try_from).collect()
    }

    async fn count_tasks(&self, filter: &TaskFilter) -> Result<u64> {
        let row = sqlx::query_as::<_, (i64,)>(&format!(
            "SELECT COUNT(*) FROM tasks WHERE {FILTER_CLAUSE}"
        ))
        .bind(filter.agent_type.as_deref())
        .bind(filter.status.map(|s| s.as_str()))
        .bind(filter.started_before)
        .bind(filter.created_since)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.0.max(0) as u64)
    }

    async fn compare_and_swap(
        &self,
        id: Uuid,
        guard: &TaskGuard,
        update: &TaskUpdate,
    ) -> Result<Option<Task>> {
        // Single guarded UPDATE: a concurrent writer that changed the row
        // first makes the predicate fail and this returns zero rows.
        let row = sqlx::query_as::<_, TaskRow>(&format!(
            "UPDATE tasks SET
                status = $3,
                started_at = CASE WHEN $4 THEN $5 ELSE started_at END,
                completed_at = COALESCE($6, completed_at),
                output_data = COALESCE($7, output_data),
                error_message = COALESCE($8, error_message)
             WHERE id = $1
               AND status = $2
               AND ($9::timestamptz IS NULL OR started_at < $9)
             RETURNING {TASK_COLUMNS}"
        ))
        .bind(id)
        .bind(guard.status.as_str())
        .bind(update.status.as_str())
        .bind(update.started_at.is_some())
        .bind(update.started_at.flatten())
        .bind(update.completed_at)
        .bind(update.output.as_ref())
        .bind(update.error.as_deref())
        .bind(guard.started_before)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Task::try_from).transpose()
    }
}
