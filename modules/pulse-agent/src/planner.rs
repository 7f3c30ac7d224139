use anyhow::{Context, Result};
use chrono::Utc;
use tracing::{info, warn};

use pulse_common::config::FileConfig;
use pulse_common::{
    NewTask, NewsletterBrief, SpotlightBrief, SynthesisBrief, Task, TaskInput, TopicBrief,
};
use pulse_editorial::{EditorialStore, PredictionLedger, PredictionStore, Selection, TopicSelector};
use pulse_queue::{DailyTaskBudget, QueueStore, TaskClaimCoordinator};

pub const ANALYST_AGENT: &str = "analyst";
pub const WRITER_AGENT: &str = "writer";

/// Spotlight work jumps ahead of routine tasks.
const ANALYSIS_PRIORITY: i32 = 10;
const NEWSLETTER_PRIORITY: i32 = 20;

#[derive(Debug, Clone, PartialEq)]
pub enum PlanOutcome {
    Submitted(Task),
    NothingToDo,
    BudgetExhausted,
}

/// Turns editorial state into queued tasks for one issue.
pub struct EditorialPlanner<Q, E> {
    coordinator: TaskClaimCoordinator<Q>,
    editorial: E,
    ledger: PredictionLedger<E>,
    selector: TopicSelector,
    budget: DailyTaskBudget,
    scorecard_max: usize,
}

impl<Q, E> EditorialPlanner<Q, E>
where
    Q: QueueStore,
    E: EditorialStore + PredictionStore + Clone,
{
    pub fn new(queue: Q, editorial: E, config: &FileConfig) -> Self {
        Self {
            coordinator: TaskClaimCoordinator::new(queue),
            ledger: PredictionLedger::new(editorial.clone()),
            editorial,
            selector: TopicSelector::new(config.selection.clone()),
            budget: DailyTaskBudget::new(config.queue.daily_task_budget),
            scorecard_max: config.scorecard.max_entries,
        }
    }

    pub fn coordinator(&self) -> &TaskClaimCoordinator<Q> {
        &self.coordinator
    }

    /// Analysis first, then the newsletter. A failure in one step is logged
    /// and does not stop the other.
    pub async fn plan_issue(&self, issue: i32) -> Vec<PlanOutcome> {
        let mut outcomes = Vec::new();
        match self.plan_analysis(issue).await {
            Ok(outcome) => outcomes.push(outcome),
            Err(e) => warn!(issue, error = %e, "Analysis planning failed"),
        }
        match self.plan_newsletter(issue).await {
            Ok(outcome) => outcomes.push(outcome),
            Err(e) => warn!(issue, error = %e, "Newsletter planning failed"),
        }
        outcomes
    }

    /// Select the next topic (or synthesis set) and queue it for the analyst.
    pub async fn plan_analysis(&self, issue: i32) -> Result<PlanOutcome> {
        if self
            .budget
            .is_exhausted(self.coordinator.store(), ANALYST_AGENT, Utc::now())
            .await
        {
            return Ok(PlanOutcome::BudgetExhausted);
        }

        let topics = self
            .editorial
            .list_topics()
            .await
            .context("Failed to load topics")?;
        let since = issue - self.selector.config().cooldown_issues;
        let history = self
            .editorial
            .spotlights_since(since)
            .await
            .context("Failed to load spotlight history")?;

        let input = match self.selector.select(&topics, &history, issue) {
            Selection::Spotlight(pick) => TaskInput::Spotlight(SpotlightBrief {
                topic_name: pick.topic.topic_key.clone(),
                sources: pick
                    .topic
                    .latest()
                    .map(|s| s.sources.iter().cloned().collect())
                    .unwrap_or_default(),
                topic_key: pick.topic.topic_key,
                issue_number: issue,
                lifecycle_stage: pick.topic.lifecycle_stage,
                velocity: pick.velocity,
            }),
            Selection::Synthesis(picks) => TaskInput::Synthesis(SynthesisBrief {
                issue_number: issue,
                topics: picks
                    .into_iter()
                    .map(|p| TopicBrief {
                        topic_key: p.topic.topic_key,
                        lifecycle_stage: p.topic.lifecycle_stage,
                        velocity: p.velocity,
                    })
                    .collect(),
            }),
            Selection::NoSelection => return Ok(PlanOutcome::NothingToDo),
        };

        let task = self
            .coordinator
            .submit(NewTask::new(ANALYST_AGENT, input).with_priority(ANALYSIS_PRIORITY))
            .await?;
        Ok(PlanOutcome::Submitted(task))
    }

    /// Queue the newsletter for `issue` with its spotlights and scorecard.
    pub async fn plan_newsletter(&self, issue: i32) -> Result<PlanOutcome> {
        if self
            .budget
            .is_exhausted(self.coordinator.store(), WRITER_AGENT, Utc::now())
            .await
        {
            return Ok(PlanOutcome::BudgetExhausted);
        }

        let spotlight_ids: Vec<_> = self
            .editorial
            .spotlights_since(issue)
            .await
            .context("Failed to load spotlights")?
            .into_iter()
            .filter(|s| s.issue_number == issue)
            .map(|s| s.id)
            .collect();

        let scorecard = self
            .ledger
            .select_for_scorecard(issue, self.scorecard_max)
            .await?;

        if spotlight_ids.is_empty() && scorecard.is_empty() {
            info!(issue, "Nothing to write about");
            return Ok(PlanOutcome::NothingToDo);
        }

        let brief = NewsletterBrief {
            issue_number: issue,
            spotlight_ids,
            scorecard_prediction_ids: scorecard.iter().map(|p| p.id).collect(),
        };
        let task = self
            .coordinator
            .submit(
                NewTask::new(WRITER_AGENT, TaskInput::Newsletter(brief))
                    .with_priority(NEWSLETTER_PRIORITY),
            )
            .await?;
        Ok(PlanOutcome::Submitted(task))
    }
}
