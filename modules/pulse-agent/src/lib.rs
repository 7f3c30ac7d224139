pub mod acceptance;
pub mod planner;

pub use acceptance::EditorialReview;
pub use planner::{EditorialPlanner, PlanOutcome};
