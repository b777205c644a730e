#![allow(dead_code)]

use once_cell::sync::Lazy;
use sshbot::errors::{BotError, ExecError};
use sshbot::gateway::{ChatId, Keyboard, MessageId, MessagingGateway};
use sshbot::managers::dispatcher::{DispatchSettings, Dispatcher};
use sshbot::managers::ssh::{ExecOutput, RemoteExecutor};
use sshbot::services::access::AllowList;
use sshbot::services::config::HistorySettings;
use sshbot::services::history::HistoryLedger;
use sshbot::services::logger::Logger;
use sshbot::services::registry::{Action, Host, Registry};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::sync::Mutex;

pub static ENV_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

pub const OPERATOR: i64 = 42;
pub const STRANGER: i64 = 666;
pub const CHAT: i64 = 1000;

pub fn tmp_dir(prefix: &str) -> PathBuf {
    std::env::temp_dir().join(format!("{}-{}", prefix, uuid::Uuid::new_v4()))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outgoing {
    Send {
        chat: ChatId,
        text: String,
        keyboard: Option<Keyboard>,
    },
    Edit {
        chat: ChatId,
        message_id: MessageId,
        text: String,
    },
}

impl Outgoing {
    pub fn text(&self) -> &str {
        match self {
            Outgoing::Send { text, .. } | Outgoing::Edit { text, .. } => text,
        }
    }

    pub fn keyboard(&self) -> Option<&Keyboard> {
        match self {
            Outgoing::Send { keyboard, .. } => keyboard.as_ref(),
            Outgoing::Edit { .. } => None,
        }
    }
}

/// Records every message the dispatcher emits.
#[derive(Default)]
pub struct RecordingGateway {
    outgoing: StdMutex<Vec<Outgoing>>,
}

impl RecordingGateway {
    pub fn outgoing(&self) -> Vec<Outgoing> {
        self.outgoing.lock().expect("lock").clone()
    }
}

#[async_trait::async_trait]
impl MessagingGateway for RecordingGateway {
    async fn send_message(
        &self,
        chat: ChatId,
        text: &str,
        keyboard: Option<&Keyboard>,
    ) -> Result<(), BotError> {
        self.outgoing.lock().expect("lock").push(Outgoing::Send {
            chat,
            text: text.to_string(),
            keyboard: keyboard.cloned(),
        });
        Ok(())
    }

    async fn edit_message(
        &self,
        chat: ChatId,
        message_id: MessageId,
        text: &str,
        _keyboard: Option<&Keyboard>,
    ) -> Result<(), BotError> {
        self.outgoing.lock().expect("lock").push(Outgoing::Edit {
            chat,
            message_id,
            text: text.to_string(),
        });
        Ok(())
    }
}

/// Returns a scripted result and counts invocations.
pub struct FakeExecutor {
    result: Result<ExecOutput, ExecError>,
    calls: AtomicUsize,
    commands: StdMutex<Vec<(String, String)>>,
}

impl FakeExecutor {
    pub fn new(result: Result<ExecOutput, ExecError>) -> Self {
        Self {
            result,
            calls: AtomicUsize::new(0),
            commands: StdMutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn commands(&self) -> Vec<(String, String)> {
        self.commands.lock().expect("lock").clone()
    }
}

#[async_trait::async_trait]
impl RemoteExecutor for FakeExecutor {
    async fn execute(&self, host: &Host, command: &str) -> Result<ExecOutput, ExecError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.commands
            .lock()
            .expect("lock")
            .push((host.alias.clone(), command.to_string()));
        self.result.clone()
    }
}

pub fn registry() -> Registry {
    Registry::new(
        vec![
            Host::with_password("web", "10.0.0.1", "root", "pw"),
            Host::with_key("db", "10.0.0.2", "root", "/keys/db"),
        ],
        vec![
            Action::new("uptime", "uptime"),
            Action::new("disk", "df -h"),
        ],
    )
    .expect("registry")
}

pub struct Harness {
    pub dispatcher: Dispatcher,
    pub gateway: Arc<RecordingGateway>,
    pub executor: Arc<FakeExecutor>,
    pub ledger: HistoryLedger,
    pub dir: PathBuf,
}

impl Harness {
    pub fn new(result: Result<ExecOutput, ExecError>) -> Self {
        let dir = tmp_dir("sshbot-dispatch");
        let logger = Logger::new("test");
        let settings = HistorySettings {
            path: Some(dir.join("history.json")),
            ..HistorySettings::default()
        };
        let ledger = HistoryLedger::new(logger.clone(), &settings);
        let gateway = Arc::new(RecordingGateway::default());
        let executor = Arc::new(FakeExecutor::new(result));
        let users: AllowList = [(OPERATOR, "alice".to_string())].into_iter().collect();
        let dispatcher = Dispatcher::new(
            logger,
            Arc::new(registry()),
            Arc::new(users),
            executor.clone(),
            ledger.clone(),
            gateway.clone(),
            DispatchSettings {
                result_delay: Duration::ZERO,
                timezone: settings.timezone,
            },
        );
        Self {
            dispatcher,
            gateway,
            executor,
            ledger,
            dir,
        }
    }
}

impl Drop for Harness {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.dir);
    }
}
