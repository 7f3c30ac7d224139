use std::sync::Arc;

use anyhow::Result;
use sqlx::postgres::PgPoolOptions;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use pulse_agent::{EditorialPlanner, EditorialReview, PlanOutcome};
use pulse_common::config::load_or_default;
use pulse_common::Config;
use pulse_editorial::PgEditorialStore;
use pulse_queue::{FileQueueBridge, IntervalTicker, PgQueueStore, PollLoop, TaskClaimCoordinator};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("pulse=info".parse()?))
        .init();

    info!("Pulse coordinator starting...");

    // Load config
    let config = Config::from_env();
    config.log_redacted();
    let tunables = load_or_default(config.config_path.as_deref())?;

    // Connect to Postgres
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await?;
    info!("Connected to database");

    let queue = PgQueueStore::new(pool.clone());
    let editorial = PgEditorialStore::new(pool);

    let bridge = FileQueueBridge::new(
        &config.queue_dir,
        &config.results_dir,
        &tunables.queue.bridge_identity,
    );
    bridge.init().await?;

    // Optional planning pass
    if let Some(issue) = config.plan_issue {
        let planner = EditorialPlanner::new(queue.clone(), editorial.clone(), &tunables);
        for outcome in planner.plan_issue(issue).await {
            match outcome {
                PlanOutcome::Submitted(task) => info!(
                    issue,
                    task_id = %task.id,
                    task_type = task.input.task_type(),
                    "Planned task"
                ),
                PlanOutcome::NothingToDo => info!(issue, "Nothing to plan"),
                PlanOutcome::BudgetExhausted => warn!(issue, "Daily task budget exhausted"),
            }
        }
    }

    // One poll loop per agent type
    let review = Arc::new(EditorialReview::new(editorial, tunables.quality.clone()));
    let mut handles = Vec::with_capacity(config.agent_types.len());
    for agent_type in &config.agent_types {
        let poll = PollLoop::new(
            agent_type,
            TaskClaimCoordinator::new(queue.clone()),
            bridge.clone(),
            review.clone(),
        )
        .with_batch_size(tunables.queue.claim_batch_size)
        .with_stale_timeout(tunables.queue.stale_task_timeout());
        let ticker = IntervalTicker::new(tunables.queue.poll_interval());

        info!(agent_type = agent_type.as_str(), "Starting poll loop");
        handles.push(tokio::spawn(async move {
            let stats = poll.run(ticker).await;
            info!(agent_type = poll.agent_type(), "Poll loop stopped. {stats}");
        }));
    }

    tokio::signal::ctrl_c().await?;
    info!("Shutdown requested");
    for handle in handles {
        handle.abort();
    }

    Ok(())
}
