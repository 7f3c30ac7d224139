use std::cmp::Ordering;
use std::collections::HashSet;

use tracing::{debug, info};

use pulse_common::config::SelectionConfig;
use pulse_common::{SpotlightRecord, Topic};

#[derive(Debug, Clone, PartialEq)]
pub struct ScoredTopic {
    pub topic: Topic,
    pub velocity: f64,
    pub score: f64,
}

/// What the next issue should analyze.
#[derive(Debug, Clone, PartialEq)]
pub enum Selection {
    Spotlight(ScoredTopic),
    /// Up to `synthesis_fan_out` topics, best first.
    Synthesis(Vec<ScoredTopic>),
    /// Nothing survived the filters. A valid outcome, not an error.
    NoSelection,
}

impl Selection {
    pub fn topics(&self) -> Vec<&ScoredTopic> {
        match self {
            Self::Spotlight(t) => vec![t],
            Self::Synthesis(ts) => ts.iter().collect(),
            Self::NoSelection => Vec::new(),
        }
    }
}

/// Scores topics by velocity and lifecycle stage, then filters by cooldown
/// and minimum signal. Deterministic for a given input.
pub struct TopicSelector {
    config: SelectionConfig,
}

impl TopicSelector {
    pub fn new(config: SelectionConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SelectionConfig {
        &self.config
    }

    /// `velocity × stage multiplier`.
    pub fn score(&self, topic: &Topic) -> ScoredTopic {
        let velocity = topic.velocity();
        let multiplier = self
            .config
            .lifecycle_multipliers
            .for_stage(topic.lifecycle_stage);
        ScoredTopic {
            topic: topic.clone(),
            velocity,
            score: velocity * multiplier,
        }
    }

    /// Topic keys featured within the cooldown window of `current_issue`.
    pub fn cooling_down(&self, history: &[SpotlightRecord], current_issue: i32) -> HashSet<String> {
        history
            .iter()
            .filter(|r| current_issue - r.issue_number <= self.config.cooldown_issues)
            .flat_map(|r| r.topic_keys().map(str::to_string))
            .collect()
    }

    /// Eligible topics, best first. Ties break on `topic_key` ascending.
    pub fn rank(
        &self,
        topics: &[Topic],
        history: &[SpotlightRecord],
        current_issue: i32,
    ) -> Vec<ScoredTopic> {
        let cooling = self.cooling_down(history, current_issue);

        let mut ranked: Vec<ScoredTopic> = topics
            .iter()
            .filter(|t| {
                if cooling.contains(&t.topic_key) {
                    debug!(topic = t.topic_key.as_str(), "Skipping topic in cooldown");
                    return false;
                }
                if t.mention_count() < self.config.min_mentions
                    || t.distinct_sources() < self.config.min_sources
                {
                    debug!(
                        topic = t.topic_key.as_str(),
                        mentions = t.mention_count(),
                        sources = t.distinct_sources(),
                        "Skipping topic below minimum signal"
                    );
                    return false;
                }
                true
            })
            .map(|t| self.score(t))
            .collect();

        ranked.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.topic.topic_key.cmp(&b.topic.topic_key))
        });
        ranked
    }

    pub fn select(
        &self,
        topics: &[Topic],
        history: &[SpotlightRecord],
        current_issue: i32,
    ) -> Selection {
        let ranked = self.rank(topics, history, current_issue);

        let selection = match ranked.first() {
            None => Selection::NoSelection,
            Some(top) if top.score > self.config.single_topic_threshold => {
                Selection::Spotlight(top.clone())
            }
            Some(_) => Selection::Synthesis(
                ranked
                    .into_iter()
                    .take(self.config.synthesis_fan_out)
                    .collect(),
            ),
        };

        match &selection {
            Selection::Spotlight(t) => info!(
                issue = current_issue,
                topic = t.topic.topic_key.as_str(),
                score = t.score,
                "Selected spotlight topic"
            ),
            Selection::Synthesis(ts) => info!(
                issue = current_issue,
                topics = ?ts.iter().map(|t| t.topic.topic_key.as_str()).collect::<Vec<_>>(),
                "No topic above threshold, selected synthesis"
            ),
            Selection::NoSelection => info!(
                issue = current_issue,
                candidates = topics.len(),
                "No eligible topics"
            ),
        }
        selection
    }
}
