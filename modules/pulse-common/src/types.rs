use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::PulseError;
use crate::payload::TaskInput;

/// Lower values are claimed first.
pub const DEFAULT_TASK_PRIORITY: i32 = 100;

// --- Tasks ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = PulseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "in_progress" => Ok(Self::InProgress),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(PulseError::UnknownVariant {
                kind: "task status",
                value: other.to_string(),
            }),
        }
    }
}

/// A unit of work assigned to one agent type.
#[derive(Debug, Clone, PartialEq)]
pub struct Task {
    pub id: Uuid,
    pub agent_type: String,
    pub input: TaskInput,
    pub status: TaskStatus,
    pub priority: i32,
    pub output: Option<serde_json::Value>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Task {
    pub fn task_type(&self) -> &str {
        self.input.task_type()
    }
}

/// A task waiting to be inserted. The store assigns id and timestamps.
#[derive(Debug, Clone, PartialEq)]
pub struct NewTask {
    pub agent_type: String,
    pub input: TaskInput,
    pub priority: i32,
}

impl NewTask {
    pub fn new(agent_type: impl Into<String>, input: TaskInput) -> Self {
        Self {
            agent_type: agent_type.into(),
            input,
            priority: DEFAULT_TASK_PRIORITY,
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }
}

// --- Topics ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleStage {
    Emerging,
    Debating,
    Building,
    Mature,
    Declining,
}

impl LifecycleStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Emerging => "emerging",
            Self::Debating => "debating",
            Self::Building => "building",
            Self::Mature => "mature",
            Self::Declining => "declining",
        }
    }
}

impl fmt::Display for LifecycleStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LifecycleStage {
    type Err = PulseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "emerging" => Ok(Self::Emerging),
            "debating" => Ok(Self::Debating),
            "building" => Ok(Self::Building),
            "mature" => Ok(Self::Mature),
            "declining" => Ok(Self::Declining),
            other => Err(PulseError::UnknownVariant {
                kind: "lifecycle stage",
                value: other.to_string(),
            }),
        }
    }
}

/// One observation of how much a topic is being talked about.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VelocitySnapshot {
    pub mentions: i64,
    #[serde(default)]
    pub sources: BTreeSet<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Topic {
    pub id: Uuid,
    pub topic_key: String,
    pub lifecycle_stage: LifecycleStage,
    /// Oldest first.
    pub snapshots: Vec<VelocitySnapshot>,
    pub last_updated: DateTime<Utc>,
}

impl Topic {
    pub fn latest(&self) -> Option<&VelocitySnapshot> {
        self.snapshots.last()
    }

    /// Mention delta between the two most recent snapshots. With a single
    /// snapshot the raw count stands in for the delta.
    pub fn velocity(&self) -> f64 {
        match self.snapshots.as_slice() {
            [] => 0.0,
            [only] => only.mentions as f64,
            [.., prev, last] => (last.mentions - prev.mentions) as f64,
        }
    }

    pub fn mention_count(&self) -> i64 {
        self.latest().map(|s| s.mentions).unwrap_or(0)
    }

    pub fn distinct_sources(&self) -> usize {
        self.latest().map(|s| s.sources.len()).unwrap_or(0)
    }
}

// --- Spotlights ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpotlightMode {
    Spotlight,
    Synthesis,
}

impl SpotlightMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Spotlight => "spotlight",
            Self::Synthesis => "synthesis",
        }
    }
}

impl fmt::Display for SpotlightMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SpotlightMode {
    type Err = PulseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "spotlight" => Ok(Self::Spotlight),
            "synthesis" => Ok(Self::Synthesis),
            other => Err(PulseError::UnknownVariant {
                kind: "spotlight mode",
                value: other.to_string(),
            }),
        }
    }
}

/// A produced analysis artifact. Immutable once stored.
///
/// `topic_id` is a weak reference holding the topic key. Synthesis records
/// carry the key of their lead topic, and `covered_topics` lists every
/// member so all of them enter cooldown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpotlightRecord {
    pub id: Uuid,
    pub topic_id: String,
    pub topic_name: String,
    #[serde(default)]
    pub covered_topics: Vec<String>,
    pub issue_number: i32,
    pub mode: SpotlightMode,
    pub thesis: String,
    pub evidence: String,
    pub counter_argument: String,
    pub prediction: String,
    pub builder_implications: String,
    pub sources_used: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl SpotlightRecord {
    /// Every topic key this record featured.
    pub fn topic_keys(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.topic_id.as_str()).chain(self.covered_topics.iter().map(String::as_str))
    }
}

// --- Predictions ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PredictionStatus {
    Open,
    Flagged,
    Confirmed,
    Refuted,
    PartiallyCorrect,
}

impl PredictionStatus {
    pub const TERMINAL: [PredictionStatus; 3] =
        [Self::Confirmed, Self::Refuted, Self::PartiallyCorrect];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Flagged => "flagged",
            Self::Confirmed => "confirmed",
            Self::Refuted => "refuted",
            Self::PartiallyCorrect => "partially_correct",
        }
    }

    pub fn is_terminal(&self) -> bool {
        Self::TERMINAL.contains(self)
    }

    /// Still awaiting an outcome.
    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }

    /// open → flagged → terminal, with flagged optional.
    pub fn can_transition_to(&self, next: PredictionStatus) -> bool {
        match (self, next) {
            (Self::Open, Self::Flagged) => true,
            (Self::Open | Self::Flagged, n) => n.is_terminal(),
            _ => false,
        }
    }
}

impl fmt::Display for PredictionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PredictionStatus {
    type Err = PulseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(Self::Open),
            "flagged" => Ok(Self::Flagged),
            "confirmed" => Ok(Self::Confirmed),
            "refuted" => Ok(Self::Refuted),
            "partially_correct" => Ok(Self::PartiallyCorrect),
            other => Err(PulseError::UnknownVariant {
                kind: "prediction status",
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub id: Uuid,
    pub spotlight_id: Option<Uuid>,
    pub topic_id: String,
    pub text: String,
    pub issue_number: i32,
    pub status: PredictionStatus,
    pub resolution_notes: Option<String>,
    pub resolved_at: Option<DateTime<Utc>>,
    /// Set once, when the prediction is used in a scorecard.
    pub scorecard_issue: Option<i32>,
    pub created_at: DateTime<Utc>,
}
