//! One polling loop per agent type.
//!
//! Each cycle: requeue stale work, claim and publish new work, then ingest
//! results and settle the tasks they belong to. Errors are logged and the
//! loop carries on; the next cycle retries.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::time::{Interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use pulse_common::{Task, TaskStatus};

use crate::bridge::{AgentOutcome, FileQueueBridge, IngestedResult};
use crate::coordinator::{TaskClaimCoordinator, Transition};
use crate::store::QueueStore;

// ---------------------------------------------------------------------------
// Tickers
// ---------------------------------------------------------------------------

#[async_trait]
pub trait Ticker: Send {
    /// Wait until the next cycle is due. `false` ends the loop.
    async fn tick(&mut self) -> bool;
}

/// Wall-clock ticker. The first tick fires immediately; a cycle that overruns
/// pushes the schedule back instead of bursting.
pub struct IntervalTicker {
    interval: Interval,
}

impl IntervalTicker {
    pub fn new(period: Duration) -> Self {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self { interval }
    }
}

#[async_trait]
impl Ticker for IntervalTicker {
    async fn tick(&mut self) -> bool {
        self.interval.tick().await;
        true
    }
}

/// Runs a fixed number of cycles back to back.
pub struct ManualTicker {
    remaining: usize,
}

impl ManualTicker {
    pub fn times(n: usize) -> Self {
        Self { remaining: n }
    }
}

#[async_trait]
impl Ticker for ManualTicker {
    async fn tick(&mut self) -> bool {
        if self.remaining == 0 {
            return false;
        }
        self.remaining -= 1;
        true
    }
}

// ---------------------------------------------------------------------------
// Result review
// ---------------------------------------------------------------------------

/// Verdict on a successful agent result.
#[derive(Debug, Clone, PartialEq)]
pub enum Review {
    /// Store this as the task output.
    Accept(Value),
    Reject {
        error: String,
        partial: Option<Value>,
    },
}

/// Decides whether an agent's output is fit to be the task's result.
#[async_trait]
pub trait ResultReview: Send + Sync {
    async fn review(&self, task: &Task, output: Value) -> Review;
}

#[async_trait]
impl<R: ResultReview + ?Sized> ResultReview for Arc<R> {
    async fn review(&self, task: &Task, output: Value) -> Review {
        (**self).review(task, output).await
    }
}

// ---------------------------------------------------------------------------
// Stats
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PollStats {
    pub requeued: u64,
    pub claimed: u64,
    pub published: u64,
    pub publish_failed: u64,
    pub ingested: u64,
    pub completed: u64,
    pub failed: u64,
    /// Results for tasks that were missing or no longer in progress.
    pub discarded: u64,
}

impl PollStats {
    pub fn is_idle(&self) -> bool {
        *self == Self::default()
    }

    pub fn absorb(&mut self, other: &PollStats) {
        self.requeued += other.requeued;
        self.claimed += other.claimed;
        self.published += other.published;
        self.publish_failed += other.publish_failed;
        self.ingested += other.ingested;
        self.completed += other.completed;
        self.failed += other.failed;
        self.discarded += other.discarded;
    }
}

impl fmt::Display for PollStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "requeued={} claimed={} published={} publish_failed={} ingested={} completed={} failed={} discarded={}",
            self.requeued,
            self.claimed,
            self.published,
            self.publish_failed,
            self.ingested,
            self.completed,
            self.failed,
            self.discarded
        )
    }
}

// ---------------------------------------------------------------------------
// PollLoop
// ---------------------------------------------------------------------------

pub struct PollLoop<S, R> {
    agent_type: String,
    coordinator: TaskClaimCoordinator<S>,
    bridge: FileQueueBridge,
    review: R,
    batch_size: usize,
    stale_timeout: Duration,
}

impl<S: QueueStore, R: ResultReview> PollLoop<S, R> {
    pub fn new(
        agent_type: &str,
        coordinator: TaskClaimCoordinator<S>,
        bridge: FileQueueBridge,
        review: R,
    ) -> Self {
        Self {
            agent_type: agent_type.to_string(),
            coordinator,
            bridge,
            review,
            batch_size: 5,
            stale_timeout: Duration::from_secs(60 * 60),
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_stale_timeout(mut self, timeout: Duration) -> Self {
        self.stale_timeout = timeout;
        self
    }

    pub fn agent_type(&self) -> &str {
        &self.agent_type
    }

    pub fn coordinator(&self) -> &TaskClaimCoordinator<S> {
        &self.coordinator
    }

    /// Run cycles until the ticker stops. Returns the totals.
    pub async fn run<T: Ticker>(&self, mut ticker: T) -> PollStats {
        info!(
            agent_type = self.agent_type.as_str(),
            batch_size = self.batch_size,
            "Poll loop started"
        );
        let mut totals = PollStats::default();
        while ticker.tick().await {
            let stats = self.run_cycle().await;
            if stats.is_idle() {
                debug!(agent_type = self.agent_type.as_str(), "Poll cycle idle");
            } else {
                info!(agent_type = self.agent_type.as_str(), %stats, "Poll cycle complete");
            }
            totals.absorb(&stats);
        }
        info!(agent_type = self.agent_type.as_str(), %totals, "Poll loop stopped");
        totals
    }

    /// One full cycle. Never fails: every error is logged and counted.
    pub async fn run_cycle(&self) -> PollStats {
        let mut stats = PollStats::default();
        let agent_type = self.agent_type.as_str();

        match self
            .coordinator
            .requeue_stale(Some(agent_type), self.stale_timeout)
            .await
        {
            Ok(n) => stats.requeued = n,
            Err(e) => warn!(agent_type, error = %e, "Requeue sweep failed"),
        }

        self.dispatch(&mut stats).await;

        match self.bridge.ingest(agent_type).await {
            Ok(results) => {
                stats.ingested = results.len() as u64;
                for result in results {
                    self.settle(result, &mut stats).await;
                }
            }
            Err(e) => warn!(agent_type, error = %e, "Result ingest failed, will retry"),
        }

        stats
    }

    async fn dispatch(&self, stats: &mut PollStats) {
        let agent_type = self.agent_type.as_str();
        let claimed = match self.coordinator.claim(agent_type, self.batch_size).await {
            Ok(tasks) => tasks,
            Err(e) => {
                warn!(agent_type, error = %e, "Claim failed, will retry");
                return;
            }
        };
        stats.claimed = claimed.len() as u64;

        for task in claimed {
            match self.bridge.publish(&task).await {
                Ok(_) => stats.published += 1,
                Err(e) => {
                    stats.publish_failed += 1;
                    warn!(task_id = %task.id, error = %e, "Failed to write queue file");
                    let error = format!("failed to write queue file: {e}");
                    if let Err(e) = self.coordinator.fail(task.id, &error).await {
                        warn!(task_id = %task.id, error = %e, "Failed to record publish failure");
                    }
                }
            }
        }
    }

    async fn settle(&self, result: IngestedResult, stats: &mut PollStats) {
        let task = match self.coordinator.store().fetch_task(result.task_id).await {
            Ok(Some(task)) if task.status == TaskStatus::InProgress => task,
            Ok(Some(task)) => {
                debug!(task_id = %task.id, status = %task.status, "Discarding result for settled task");
                stats.discarded += 1;
                return;
            }
            Ok(None) => {
                warn!(task_id = %result.task_id, "Discarding result for unknown task");
                stats.discarded += 1;
                return;
            }
            Err(e) => {
                // The result file is already gone; the stale sweep will rerun the task.
                warn!(task_id = %result.task_id, error = %e, "Failed to load task for result");
                return;
            }
        };

        let transition = match result.outcome {
            AgentOutcome::Failed(error) => self.coordinator.fail(task.id, &error).await,
            AgentOutcome::Succeeded(output) => match self.review.review(&task, output).await {
                Review::Accept(output) => self.coordinator.complete(task.id, output).await,
                Review::Reject {
                    error,
                    partial: Some(partial),
                } => {
                    self.coordinator
                        .fail_with_partial(task.id, &error, partial)
                        .await
                }
                Review::Reject {
                    error,
                    partial: None,
                } => self.coordinator.fail(task.id, &error).await,
            },
        };

        match transition {
            Ok(Transition::Applied(task)) if task.status == TaskStatus::Completed => {
                stats.completed += 1
            }
            Ok(Transition::Applied(_)) => stats.failed += 1,
            Ok(Transition::Ignored { .. }) => stats.discarded += 1,
            Err(e) => warn!(task_id = %task.id, error = %e, "Failed to settle task"),
        }
    }
}
