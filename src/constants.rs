pub mod network {
    pub const SSH_DEFAULT_PORT: u16 = 22;
    pub const TIMEOUT_SSH_CONNECT_MS: u64 = 2_000;
    pub const TIMEOUT_SSH_EXEC_DEFAULT_MS: u64 = 30_000;
    pub const SSH_POLL_INTERVAL_MS: u64 = 20;
    pub const TELEGRAM_API_BASE: &str = "https://api.telegram.org";
    pub const TELEGRAM_POLL_TIMEOUT_SECS: u64 = 30;
    pub const TELEGRAM_RETRY_DELAY_MS: u64 = 2_000;
}

pub mod limits {
    pub const MAX_CAPTURE_BYTES: usize = 64 * 1024;
    pub const MENU_COLUMNS: usize = 2;
    pub const CALLBACK_PAYLOAD_MAX_BYTES: usize = 64;
}

pub mod history {
    pub const DEFAULT_RETENTION_DAYS: u64 = 7;
    pub const SECONDS_PER_DAY: i64 = 86_400;
    pub const DEFAULT_TIMEZONE: &str = "UTC";
}

pub mod ui {
    pub const RESULT_DELAY_MS: u64 = 2_000;
    pub const HOST_PROMPT: &str = "Please choose a host:";
    pub const ACTION_PROMPT: &str = "Please choose an action:";
    pub const CANCEL_LABEL: &str = "Cancel";
    pub const HISTORY_LABEL: &str = "History";
    pub const CANCELLED_TEXT: &str = "<b>Cancelled</b>";
    pub const OK_SENTINEL: &str = "OK";
}
