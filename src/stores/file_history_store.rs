use crate::errors::BotError;
use crate::services::access::UserId;
use crate::utils::fs_atomic::atomic_write_text_file;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub user_id: UserId,
    pub host: String,
    pub action: String,
    pub ts: i64,
}

impl HistoryRecord {
    pub fn new(user_id: UserId, host: &str, action: &str, ts: i64) -> Self {
        Self {
            user_id,
            host: host.to_string(),
            action: action.to_string(),
            ts,
        }
    }
}

/// Whole-file JSON array of history records.
#[derive(Debug, Clone)]
pub struct FileHistoryStore {
    file_path: PathBuf,
}

impl FileHistoryStore {
    pub fn new(file_path: PathBuf) -> Self {
        Self { file_path }
    }

    pub fn path(&self) -> &Path {
        &self.file_path
    }

    /// Missing file reads as empty; unreadable or malformed content is an error.
    pub fn load(&self) -> Result<Vec<HistoryRecord>, BotError> {
        if !self.file_path.exists() {
            return Ok(Vec::new());
        }
        let raw = std::fs::read_to_string(&self.file_path)
            .map_err(|err| BotError::internal(format!("Failed to load history: {}", err)))?;
        if raw.trim().is_empty() {
            return Ok(Vec::new());
        }
        serde_json::from_str(&raw)
            .map_err(|err| BotError::internal(format!("Failed to parse history: {}", err)))
    }

    pub fn persist(&self, records: &[HistoryRecord]) -> Result<(), BotError> {
        let payload = serde_json::to_string_pretty(records)
            .map_err(|err| BotError::internal(format!("Failed to serialize history: {}", err)))?;
        atomic_write_text_file(&self.file_path, &format!("{}\n", payload), 0o600)
            .map_err(|err| BotError::internal(format!("Failed to persist history: {}", err)))
    }
}
