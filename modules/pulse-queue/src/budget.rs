use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::store::{QueueStore, TaskFilter};

/// Caps how many tasks an agent type is given per UTC day.
/// Counts rows created since midnight, so it survives restarts.
#[derive(Debug, Clone, Copy)]
pub struct DailyTaskBudget {
    /// 0 = unlimited.
    daily_limit: u64,
}

impl DailyTaskBudget {
    pub fn new(daily_limit: u64) -> Self {
        Self { daily_limit }
    }

    pub fn unlimited() -> Self {
        Self::new(0)
    }

    pub fn limit(&self) -> u64 {
        self.daily_limit
    }

    /// True when today's submissions for `agent_type` reached the limit.
    /// A store error counts as "not exhausted".
    pub async fn is_exhausted<S: QueueStore + ?Sized>(
        &self,
        store: &S,
        agent_type: &str,
        now: DateTime<Utc>,
    ) -> bool {
        if self.daily_limit == 0 {
            return false;
        }

        let Some(midnight) = now.date_naive().and_hms_opt(0, 0, 0) else {
            return false;
        };
        let filter = TaskFilter::for_agent(agent_type).created_since(midnight.and_utc());

        match store.count_tasks(&filter).await {
            Ok(used) if used >= self.daily_limit => {
                info!(agent_type, used, limit = self.daily_limit, "Daily task budget exhausted");
                true
            }
            Ok(_) => false,
            Err(e) => {
                warn!(agent_type, error = %e, "Budget check failed, proceeding");
                false
            }
        }
    }
}
