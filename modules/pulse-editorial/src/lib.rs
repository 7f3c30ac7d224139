pub mod memory;
pub mod pg;
pub mod predictions;
pub mod quality;
pub mod store;
pub mod topics;

pub use memory::MemoryEditorialStore;
pub use pg::PgEditorialStore;
pub use predictions::{LedgerError, PredictionLedger};
pub use quality::{run_quality_checks, QualityContext, QualityIssue, QualityReport};
pub use store::{EditorialStore, PredictionStore};
pub use topics::{ScoredTopic, Selection, TopicSelector};
