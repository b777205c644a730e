use crate::errors::BotError;
use crate::services::access::AllowList;
use crate::services::config::HistorySettings;
use crate::services::logger::Logger;
use crate::stores::file_history_store::{FileHistoryStore, HistoryRecord};
use crate::utils::text::escape_html;
use crate::utils::time::{format_timestamp, now_unix};
use chrono::FixedOffset;
use std::sync::{Arc, Mutex};

/// Time-windowed execution log. Every access loads the whole file, prunes
/// expired records and writes the survivors back under one process-wide lock.
#[derive(Clone)]
pub struct HistoryLedger {
    logger: Logger,
    store: Option<FileHistoryStore>,
    retention_secs: i64,
    queue: Arc<Mutex<()>>,
}

impl HistoryLedger {
    pub fn new(logger: Logger, settings: &HistorySettings) -> Self {
        Self {
            logger: logger.child("history"),
            store: settings.path.clone().map(FileHistoryStore::new),
            retention_secs: i64::try_from(settings.retention.as_secs()).unwrap_or(i64::MAX),
            queue: Arc::new(Mutex::new(())),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.store.is_some()
    }

    pub fn append(&self, record: HistoryRecord) -> Result<(), BotError> {
        self.append_at(record, now_unix())
    }

    pub fn append_at(&self, record: HistoryRecord, now: i64) -> Result<(), BotError> {
        let Some(store) = self.store.as_ref() else {
            return Ok(());
        };
        let _guard = self.queue.lock().unwrap_or_else(|err| err.into_inner());
        let mut records = self.load_pruned(store, now).0;
        records.push(record);
        store.persist(&records)
    }

    /// Surviving records, oldest first.
    pub fn list(&self) -> Vec<HistoryRecord> {
        self.list_at(now_unix())
    }

    pub fn list_at(&self, now: i64) -> Vec<HistoryRecord> {
        let Some(store) = self.store.as_ref() else {
            return Vec::new();
        };
        let _guard = self.queue.lock().unwrap_or_else(|err| err.into_inner());
        let (records, pruned) = self.load_pruned(store, now);
        if pruned > 0 {
            if let Err(err) = store.persist(&records) {
                self.logger.warn(
                    "History prune write failed",
                    Some(&serde_json::json!({"error": err.to_string()})),
                );
            }
        }
        records
    }

    fn load_pruned(&self, store: &FileHistoryStore, now: i64) -> (Vec<HistoryRecord>, usize) {
        let mut records = match store.load() {
            Ok(records) => records,
            Err(err) => {
                self.logger.warn(
                    "History file unreadable, starting empty",
                    Some(&serde_json::json!({
                        "path": store.path(),
                        "error": err.to_string(),
                    })),
                );
                Vec::new()
            }
        };
        let before = records.len();
        let cutoff = now.saturating_sub(self.retention_secs);
        records.retain(|record| record.ts >= cutoff);
        let pruned = before - records.len();
        (records, pruned)
    }
}

const HISTORY_HEADER: &str = "<b>History</b>";
/// Room kept for the "N older entries omitted" line.
const OMITTED_LINE_RESERVE: usize = 48;

fn render_line(record: &HistoryRecord, users: &AllowList, zone: &FixedOffset) -> String {
    format!(
        "{} <b>{}</b> {} <code>{}</code>",
        format_timestamp(record.ts, zone),
        escape_html(&users.display_name(record.user_id)),
        escape_html(&record.host),
        escape_html(&record.action),
    )
}

/// Renders the newest records that fit in `max_chars`, oldest first.
/// Records are dropped whole, never cut, so the markup stays valid.
pub fn render_history(
    records: &[HistoryRecord],
    users: &AllowList,
    zone: &FixedOffset,
    max_chars: usize,
) -> String {
    if records.is_empty() {
        return "History is empty.".to_string();
    }
    let mut budget = max_chars.saturating_sub(HISTORY_HEADER.len() + OMITTED_LINE_RESERVE);
    let mut kept = Vec::new();
    for record in records.iter().rev() {
        let line = render_line(record, users, zone);
        let cost = line.chars().count() + 1;
        if cost > budget {
            break;
        }
        budget -= cost;
        kept.push(line);
    }
    let omitted = records.len() - kept.len();
    let mut lines = vec![HISTORY_HEADER.to_string()];
    if omitted > 0 {
        lines.push(format!("{} older entries omitted", omitted));
    }
    lines.extend(kept.into_iter().rev());
    lines.join("\n")
}
