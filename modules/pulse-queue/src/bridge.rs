//! File hand-off between the task table and an external execution agent.
//!
//! Claimed tasks are mirrored to `{queue_dir}/{agent_type}_{task_id}.json`.
//! The agent answers with `{results_dir}/{agent_type}_{task_id}.result.json`.
//! Writes are temp-file-then-rename; result consumption is read-then-delete.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};
use uuid::Uuid;

use pulse_common::Task;

const RESULT_SUFFIX: &str = ".result.json";
const TMP_EXTENSION: &str = "tmp";

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize task file: {0}")]
    Serialize(#[from] serde_json::Error),
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> BridgeError + '_ {
    move |source| BridgeError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Contents of a queue file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskFile {
    /// The task type.
    pub task: String,
    pub task_id: Uuid,
    pub params: Value,
    pub created_by: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueueFile {
    pub path: PathBuf,
    pub task_id: Uuid,
    pub payload: TaskFile,
}

/// Result file as written by the agent. `task_id` stays loose so a bad id
/// can be told apart from unparseable JSON.
#[derive(Debug, Deserialize)]
struct RawResult {
    task_id: Option<Value>,
    success: bool,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AgentOutcome {
    Succeeded(Value),
    Failed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct IngestedResult {
    pub task_id: Uuid,
    pub outcome: AgentOutcome,
}

#[derive(Debug, Clone)]
pub struct FileQueueBridge {
    queue_dir: PathBuf,
    results_dir: PathBuf,
    identity: String,
}

impl FileQueueBridge {
    pub fn new(queue_dir: impl Into<PathBuf>, results_dir: impl Into<PathBuf>, identity: &str) -> Self {
        Self {
            queue_dir: queue_dir.into(),
            results_dir: results_dir.into(),
            identity: identity.to_string(),
        }
    }

    pub fn queue_dir(&self) -> &Path {
        &self.queue_dir
    }

    pub fn results_dir(&self) -> &Path {
        &self.results_dir
    }

    pub fn queue_path(&self, agent_type: &str, task_id: Uuid) -> PathBuf {
        self.queue_dir.join(format!("{agent_type}_{task_id}.json"))
    }

    pub fn result_path(&self, agent_type: &str, task_id: Uuid) -> PathBuf {
        self.results_dir
            .join(format!("{agent_type}_{task_id}{RESULT_SUFFIX}"))
    }

    /// Create both directories and clear temp files left by interrupted writes.
    pub async fn init(&self) -> Result<(), BridgeError> {
        for dir in [&self.queue_dir, &self.results_dir] {
            fs::create_dir_all(dir).await.map_err(io_err(dir))?;
        }

        let mut entries = fs::read_dir(&self.queue_dir)
            .await
            .map_err(io_err(&self.queue_dir))?;
        while let Ok(Some(entry)) = entries.next_entry().await {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == TMP_EXTENSION) {
                debug!(path = %path.display(), "Removing interrupted write");
                remove_if_present(&path).await;
            }
        }
        Ok(())
    }

    /// Write the task file for a claimed task. Readers never see a partial file.
    pub async fn publish(&self, task: &Task) -> Result<QueueFile, BridgeError> {
        let payload = TaskFile {
            task: task.task_type().to_string(),
            task_id: task.id,
            params: task.input.to_value()?,
            created_by: self.identity.clone(),
        };
        let bytes = serde_json::to_vec_pretty(&payload)?;

        let path = self.queue_path(&task.agent_type, task.id);
        let tmp = self
            .queue_dir
            .join(format!(".{}_{}.{TMP_EXTENSION}", task.agent_type, task.id));
        write_atomic(&tmp, &path, &bytes).await?;

        debug!(task_id = %task.id, path = %path.display(), "Published task file");
        Ok(QueueFile {
            path,
            task_id: task.id,
            payload,
        })
    }

    /// Consume every result file for `agent_type`, oldest name first.
    ///
    /// Unparseable files and files without a usable task id are deleted and
    /// skipped. A consumed result also removes its queue file.
    pub async fn ingest(&self, agent_type: &str) -> Result<Vec<IngestedResult>, BridgeError> {
        let mut paths = self.result_files(agent_type).await?;
        paths.sort();

        let mut results = Vec::with_capacity(paths.len());
        for path in paths {
            let content = match fs::read_to_string(&path).await {
                Ok(content) => content,
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Failed to read result file, will retry");
                    continue;
                }
            };

            let raw: RawResult = match serde_json::from_str(&content) {
                Ok(raw) => raw,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Discarding unparseable result file");
                    remove_if_present(&path).await;
                    continue;
                }
            };

            let Some(task_id) = parse_task_id(raw.task_id.as_ref()) else {
                warn!(path = %path.display(), "Discarding result file without a valid task_id");
                remove_if_present(&path).await;
                continue;
            };

            let outcome = if raw.success {
                AgentOutcome::Succeeded(raw.result.unwrap_or(Value::Null))
            } else {
                AgentOutcome::Failed(
                    raw.error
                        .filter(|e| !e.trim().is_empty())
                        .unwrap_or_else(|| "agent reported failure without an error".to_string()),
                )
            };

            remove_if_present(&path).await;
            remove_if_present(&self.queue_path(agent_type, task_id)).await;

            info!(task_id = %task_id, agent_type, success = raw.success, "Ingested result");
            results.push(IngestedResult { task_id, outcome });
        }

        Ok(results)
    }

    async fn result_files(&self, agent_type: &str) -> Result<Vec<PathBuf>, BridgeError> {
        let prefix = format!("{agent_type}_");
        let mut entries = fs::read_dir(&self.results_dir)
            .await
            .map_err(io_err(&self.results_dir))?;

        let mut paths = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(io_err(&self.results_dir))?
        {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            let Some(stem) = name
                .strip_prefix(&prefix)
                .and_then(|rest| rest.strip_suffix(RESULT_SUFFIX))
            else {
                continue;
            };
            // `a_b_<id>` belongs to agent type `a_b`, not `a`.
            if stem.is_empty() || stem.contains('_') {
                continue;
            }
            paths.push(entry.path());
        }
        Ok(paths)
    }
}

fn parse_task_id(value: Option<&Value>) -> Option<Uuid> {
    value?.as_str().and_then(|s| Uuid::parse_str(s.trim()).ok())
}

async fn write_atomic(tmp: &Path, path: &Path, bytes: &[u8]) -> Result<(), BridgeError> {
    let mut file = fs::File::create(tmp).await.map_err(io_err(tmp))?;
    let written = match file.write_all(bytes).await {
        Ok(()) => file.sync_all().await,
        Err(e) => Err(e),
    };
    drop(file);

    if let Err(e) = written {
        remove_if_present(tmp).await;
        return Err(io_err(tmp)(e));
    }

    if let Err(e) = fs::rename(tmp, path).await {
        remove_if_present(tmp).await;
        return Err(io_err(path)(e));
    }
    Ok(())
}

async fn remove_if_present(path: &Path) {
    match fs::remove_file(path).await {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove file"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn task_id_must_be_a_uuid_string() {
        let id = Uuid::new_v4();
        assert_eq!(parse_task_id(Some(&json!(id.to_string()))), Some(id));
        assert_eq!(parse_task_id(Some(&json!("not-a-uuid"))), None);
        assert_eq!(parse_task_id(Some(&json!(42))), None);
        assert_eq!(parse_task_id(None), None);
    }

    #[test]
    fn paths_follow_the_naming_convention() {
        let bridge = FileQueueBridge::new("/q", "/r", "pulse");
        let id = Uuid::nil();
        assert_eq!(
            bridge.queue_path("analyst", id),
            PathBuf::from(format!("/q/analyst_{id}.json"))
        );
        assert_eq!(
            bridge.result_path("analyst", id),
            PathBuf::from(format!("/r/analyst_{id}.result.json"))
        );
    }
}
