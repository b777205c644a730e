use crate::services::logger::Logger;
use crate::utils::fs_atomic::atomic_write_text_file;
use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostKeyCheck {
    /// First contact: the key was accepted and remembered.
    Learned,
    Matched,
    Mismatch { expected: String },
}

/// Trust-on-first-use host key memory. Any key is accepted the first time an
/// endpoint is seen; later connections must present the same fingerprint.
/// Nothing is verified against a pre-shared store, so a first-contact MITM
/// goes unnoticed.
#[derive(Clone)]
pub struct KnownHosts {
    logger: Logger,
    file_path: Option<PathBuf>,
    entries: Arc<Mutex<HashMap<String, String>>>,
}

impl KnownHosts {
    pub fn new(logger: Logger, file_path: Option<PathBuf>) -> Self {
        let known = Self {
            logger: logger.child("known_hosts"),
            file_path,
            entries: Arc::new(Mutex::new(HashMap::new())),
        };
        known.load();
        known
    }

    pub fn in_memory(logger: Logger) -> Self {
        Self::new(logger, None)
    }

    fn load(&self) {
        let Some(path) = self.file_path.as_ref() else {
            return;
        };
        if !path.exists() {
            return;
        }
        let parsed = std::fs::read_to_string(path)
            .map_err(|err| err.to_string())
            .and_then(|raw| serde_json::from_str::<Value>(&raw).map_err(|err| err.to_string()));
        match parsed {
            Ok(Value::Object(map)) => {
                let mut guard = self.entries.lock().unwrap_or_else(|err| err.into_inner());
                for (endpoint, fingerprint) in map {
                    if let Some(text) = fingerprint.as_str() {
                        guard.insert(endpoint, text.to_string());
                    }
                }
            }
            Ok(_) => self.logger.warn("Known hosts file is not an object, ignoring", None),
            Err(err) => self.logger.warn(
                "Known hosts file unreadable, ignoring",
                Some(&serde_json::json!({"error": err})),
            ),
        }
    }

    pub fn fingerprint(&self, endpoint: &str) -> Option<String> {
        self.entries
            .lock()
            .unwrap_or_else(|err| err.into_inner())
            .get(endpoint)
            .cloned()
    }

    pub fn check_and_remember(&self, endpoint: &str, fingerprint: &str) -> HostKeyCheck {
        let mut guard = self.entries.lock().unwrap_or_else(|err| err.into_inner());
        match guard.get(endpoint) {
            Some(expected) if expected == fingerprint => HostKeyCheck::Matched,
            Some(expected) => HostKeyCheck::Mismatch {
                expected: expected.clone(),
            },
            None => {
                guard.insert(endpoint.to_string(), fingerprint.to_string());
                self.logger.info(
                    "Accepted new host key",
                    Some(&serde_json::json!({"endpoint": endpoint, "fingerprint": fingerprint})),
                );
                self.persist(&guard);
                HostKeyCheck::Learned
            }
        }
    }

    fn persist(&self, entries: &HashMap<String, String>) {
        let Some(path) = self.file_path.as_ref() else {
            return;
        };
        let mut sorted: Vec<(&String, &String)> = entries.iter().collect();
        sorted.sort();
        let payload = Value::Object(
            sorted
                .into_iter()
                .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                .collect(),
        );
        let text = serde_json::to_string_pretty(&payload).unwrap_or_else(|_| "{}".to_string());
        if let Err(err) = atomic_write_text_file(path, &format!("{}\n", text), 0o600) {
            self.logger.warn(
                "Failed to save known hosts",
                Some(&serde_json::json!({"error": err.to_string()})),
            );
        }
    }
}
