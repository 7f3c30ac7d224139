pub mod bridge;
pub mod budget;
pub mod coordinator;
pub mod memory;
pub mod pg;
pub mod poller;
pub mod store;

pub use bridge::{AgentOutcome, BridgeError, FileQueueBridge, IngestedResult, QueueFile, TaskFile};
pub use budget::DailyTaskBudget;
pub use coordinator::{TaskClaimCoordinator, Transition};
pub use memory::MemoryQueueStore;
pub use pg::PgQueueStore;
pub use poller::{IntervalTicker, ManualTicker, PollLoop, PollStats, ResultReview, Review, Ticker};
pub use store::{QueueStore, TaskFilter, TaskGuard, TaskOrder, TaskUpdate};
