use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::info;

use crate::error::PulseError;
use crate::types::LifecycleStage;

/// Process configuration loaded from environment variables.
/// Tunables live in the optional TOML file named by `PULSE_CONFIG`.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub config_path: Option<PathBuf>,

    // File hand-off
    pub queue_dir: PathBuf,
    pub results_dir: PathBuf,

    /// Agent types this process polls for.
    pub agent_types: Vec<String>,

    /// When set, plan this issue before polling starts.
    pub plan_issue: Option<i32>,
}

impl Config {
    /// Load configuration from environment variables.
    /// Panics with a clear message if required vars are missing.
    pub fn from_env() -> Self {
        Self {
            database_url: required_env("DATABASE_URL"),
            config_path: env::var("PULSE_CONFIG").ok().map(PathBuf::from),
            queue_dir: env::var("PULSE_QUEUE_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("queue/pending")),
            results_dir: env::var("PULSE_RESULTS_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("queue/results")),
            agent_types: env::var("PULSE_AGENT_TYPES")
                .unwrap_or_else(|_| "analyst,writer".to_string())
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            plan_issue: env::var("PULSE_PLAN_ISSUE").ok().map(|v| {
                v.parse()
                    .unwrap_or_else(|_| panic!("PULSE_PLAN_ISSUE must be an issue number, got {v}"))
            }),
        }
    }

    /// Log the effective configuration without credentials.
    pub fn log_redacted(&self) {
        info!(
            database = redact_url(&self.database_url).as_str(),
            config_path = ?self.config_path,
            queue_dir = %self.queue_dir.display(),
            results_dir = %self.results_dir.display(),
            agent_types = ?self.agent_types,
            plan_issue = ?self.plan_issue,
            "Configuration loaded"
        );
    }
}

fn required_env(key: &str) -> String {
    env::var(key).unwrap_or_else(|_| panic!("{key} environment variable is required"))
}

/// Drop the userinfo part of a connection URL.
fn redact_url(url: &str) -> String {
    match (url.find("://"), url.rfind('@')) {
        (Some(scheme_end), Some(at)) if at > scheme_end => {
            format!("{}://***{}", &url[..scheme_end], &url[at..])
        }
        _ => url.to_string(),
    }
}

// ---------------------------------------------------------------------------
// TOML tunables
// ---------------------------------------------------------------------------

/// TOML-backed tunables. Every section is optional and falls back to defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub queue: QueueConfig,
    pub selection: SelectionConfig,
    pub scorecard: ScorecardConfig,
    pub quality: QualityConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct QueueConfig {
    pub poll_interval_secs: u64,
    pub claim_batch_size: usize,
    pub stale_task_timeout_secs: u64,
    /// Tasks an agent type may be given per day. 0 = unlimited.
    pub daily_task_budget: u64,
    /// Written as `created_by` in task files.
    pub bridge_identity: String,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 30,
            claim_batch_size: 5,
            stale_task_timeout_secs: 60 * 60,
            daily_task_budget: 0,
            bridge_identity: "pulse-coordinator".to_string(),
        }
    }
}

impl QueueConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn stale_task_timeout(&self) -> Duration {
        Duration::from_secs(self.stale_task_timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SelectionConfig {
    /// A topic featured this many issues ago or more recently is skipped.
    pub cooldown_issues: i32,
    pub min_mentions: i64,
    pub min_sources: usize,
    /// Top score must exceed this for a single-topic spotlight.
    pub single_topic_threshold: f64,
    /// Topics combined into one synthesis.
    pub synthesis_fan_out: usize,
    pub lifecycle_multipliers: LifecycleMultipliers,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            cooldown_issues: 4,
            min_mentions: 3,
            min_sources: 2,
            single_topic_threshold: 10.0,
            synthesis_fan_out: 3,
            lifecycle_multipliers: LifecycleMultipliers::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LifecycleMultipliers {
    pub emerging: f64,
    pub debating: f64,
    pub building: f64,
    pub mature: f64,
    pub declining: f64,
}

impl Default for LifecycleMultipliers {
    fn default() -> Self {
        Self {
            emerging: 1.0,
            debating: 1.5,
            building: 1.4,
            mature: 0.8,
            declining: 0.5,
        }
    }
}

impl LifecycleMultipliers {
    pub fn for_stage(&self, stage: LifecycleStage) -> f64 {
        match stage {
            LifecycleStage::Emerging => self.emerging,
            LifecycleStage::Debating => self.debating,
            LifecycleStage::Building => self.building,
            LifecycleStage::Mature => self.mature,
            LifecycleStage::Declining => self.declining,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScorecardConfig {
    pub max_entries: usize,
}

impl Default for ScorecardConfig {
    fn default() -> Self {
        Self { max_entries: 5 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct QualityConfig {
    /// Section pairs sharing more than this fraction of significant words are echoes.
    pub echo_threshold: f64,
    pub min_word_len: usize,
    /// Sections with fewer significant words are not compared.
    pub min_section_words: usize,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            echo_threshold: 0.5,
            min_word_len: 4,
            min_section_words: 5,
        }
    }
}

impl FileConfig {
    /// Reject values that would make selection or polling meaningless.
    pub fn validate(&self) -> Result<(), PulseError> {
        if self.queue.claim_batch_size == 0 {
            return Err(PulseError::Config("queue.claim_batch_size must be > 0".into()));
        }
        if self.queue.poll_interval_secs == 0 {
            return Err(PulseError::Config("queue.poll_interval_secs must be > 0".into()));
        }
        if self.selection.synthesis_fan_out == 0 {
            return Err(PulseError::Config("selection.synthesis_fan_out must be > 0".into()));
        }
        if self.selection.cooldown_issues < 0 {
            return Err(PulseError::Config("selection.cooldown_issues must be >= 0".into()));
        }
        if !(0.0..=1.0).contains(&self.quality.echo_threshold) {
            return Err(PulseError::Config("quality.echo_threshold must be within 0..=1".into()));
        }
        Ok(())
    }
}

/// Load and parse a TOML config file.
pub fn load_config(path: &Path) -> Result<FileConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    let config: FileConfig = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
    config.validate()?;
    Ok(config)
}

/// Load the file if one is configured, otherwise use defaults.
pub fn load_or_default(path: Option<&Path>) -> Result<FileConfig> {
    match path {
        Some(path) => load_config(path),
        None => {
            info!("No PULSE_CONFIG set, using default tunables");
            Ok(FileConfig::default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_toml_keeps_defaults_for_missing_sections() {
        let config: FileConfig = toml::from_str(
            r#"
            [selection]
            cooldown_issues = 2

            [selection.lifecycle_multipliers]
            debating = 3.0
            "#,
        )
        .unwrap();

        assert_eq!(config.selection.cooldown_issues, 2);
        assert_eq!(config.selection.min_mentions, 3);
        assert_eq!(config.selection.lifecycle_multipliers.debating, 3.0);
        assert_eq!(config.selection.lifecycle_multipliers.mature, 0.8);
        assert_eq!(config.scorecard.max_entries, 5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let parsed = toml::from_str::<FileConfig>("[queue]\npoll_every = 3\n");
        assert!(parsed.is_err());
    }

    #[test]
    fn zero_fan_out_fails_validation() {
        let mut config = FileConfig::default();
        config.selection.synthesis_fan_out = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn default_multipliers_favor_debating_and_building() {
        let m = LifecycleMultipliers::default();
        for low in [LifecycleStage::Emerging, LifecycleStage::Mature, LifecycleStage::Declining] {
            assert!(m.for_stage(LifecycleStage::Debating) > m.for_stage(low));
            assert!(m.for_stage(LifecycleStage::Building) > m.for_stage(low));
        }
    }

    #[test]
    fn redaction_hides_credentials() {
        assert_eq!(
            redact_url("postgres://pulse:secret@db:5432/pulse"),
            "postgres://***@db:5432/pulse"
        );
        assert_eq!(redact_url("postgres://db/pulse"), "postgres://db/pulse");
    }
}
