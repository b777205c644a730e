use crate::constants::{history, network, ui};
use crate::errors::BotError;
use crate::services::access::{AllowList, UserId};
use crate::services::registry::{Action, Host, Registry};
use crate::utils::paths::{
    normalize_env_path, resolve_relative_to, HISTORY_PATH_ENV, KNOWN_HOSTS_PATH_ENV,
};
use crate::utils::time::parse_display_zone;
use chrono::{FixedOffset, Offset, Utc};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const TOKEN_ENV: &str = "SSHBOT_TELEGRAM_TOKEN";

#[derive(Debug, Clone)]
pub struct BotSettings {
    pub token: String,
    pub poll_timeout_secs: u64,
}

#[derive(Debug, Clone)]
pub struct HistorySettings {
    pub path: Option<PathBuf>,
    pub retention: Duration,
    pub timezone: FixedOffset,
}

impl Default for HistorySettings {
    fn default() -> Self {
        Self {
            path: None,
            retention: Duration::from_secs(
                history::DEFAULT_RETENTION_DAYS * history::SECONDS_PER_DAY as u64,
            ),
            timezone: Utc.fix(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SshSettings {
    pub connect_timeout: Duration,
    pub exec_timeout: Duration,
    pub known_hosts_path: Option<PathBuf>,
}

impl Default for SshSettings {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_millis(network::TIMEOUT_SSH_CONNECT_MS),
            exec_timeout: Duration::from_millis(network::TIMEOUT_SSH_EXEC_DEFAULT_MS),
            known_hosts_path: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct UiSettings {
    pub result_delay: Duration,
}

impl Default for UiSettings {
    fn default() -> Self {
        Self {
            result_delay: Duration::from_millis(ui::RESULT_DELAY_MS),
        }
    }
}

/// Everything the process needs, validated once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub bot: BotSettings,
    pub users: AllowList,
    pub registry: Registry,
    pub history: HistorySettings,
    pub ssh: SshSettings,
    pub ui: UiSettings,
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    #[serde(default)]
    bot: RawBot,
    #[serde(default)]
    hosts: Map<String, Value>,
    #[serde(default, alias = "commands")]
    actions: Map<String, Value>,
    #[serde(default)]
    history: RawHistory,
    #[serde(default)]
    ssh: RawSsh,
    #[serde(default)]
    ui: RawUi,
}

#[derive(Debug, Default, Deserialize)]
struct RawBot {
    #[serde(default)]
    token: String,
    #[serde(default)]
    users: Value,
    poll_timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct RawHost {
    address: String,
    port: Option<u16>,
    #[serde(alias = "user", alias = "username")]
    login: String,
    key_path: Option<String>,
    passphrase: Option<String>,
    password: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawHistory {
    path: Option<String>,
    retention_days: Option<u64>,
    timezone: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawSsh {
    connect_timeout_ms: Option<u64>,
    exec_timeout_ms: Option<u64>,
    known_hosts_path: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawUi {
    result_delay_ms: Option<u64>,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, BotError> {
        let raw = std::fs::read_to_string(path).map_err(|err| {
            BotError::config(format!(
                "Failed to read config file {}: {}",
                path.display(),
                err
            ))
            .with_hint("Pass --config <path> or set SSHBOT_CONFIG")
        })?;
        let base_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        Self::from_json_str(&raw, &base_dir)
    }

    /// Parses and validates a config document. Relative paths resolve against `base_dir`.
    pub fn from_json_str(raw: &str, base_dir: &Path) -> Result<Self, BotError> {
        let parsed: RawConfig = serde_json::from_str(raw)
            .map_err(|err| BotError::config(format!("Failed to parse config: {}", err)))?;

        let token = std::env::var(TOKEN_ENV)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or(parsed.bot.token);
        if token.trim().is_empty() {
            return Err(BotError::config("bot.token must be a non-empty string")
                .with_hint(format!("Set it in the config file or via {}", TOKEN_ENV)));
        }
        let bot = BotSettings {
            token: token.trim().to_string(),
            poll_timeout_secs: positive(
                parsed.bot.poll_timeout_secs,
                network::TELEGRAM_POLL_TIMEOUT_SECS,
                "bot.poll_timeout_secs",
            )?,
        };

        let users = parse_users(&parsed.bot.users)?;
        if users.is_empty() {
            return Err(BotError::config("bot.users must list at least one user id"));
        }

        let mut hosts = Vec::with_capacity(parsed.hosts.len());
        for (alias, value) in parsed.hosts {
            hosts.push(parse_host(&alias, value, base_dir)?);
        }
        if hosts.is_empty() {
            return Err(BotError::config("hosts must define at least one host"));
        }
        let mut actions = Vec::with_capacity(parsed.actions.len());
        for (alias, value) in parsed.actions {
            let command = value
                .as_str()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .ok_or_else(|| {
                    BotError::config(format!("actions.{} must be a non-empty command string", alias))
                })?;
            actions.push(Action::new(&alias, command));
        }
        if actions.is_empty() {
            return Err(BotError::config("actions must define at least one action"));
        }
        let registry = Registry::new(hosts, actions)?;

        let history_path = normalize_env_path(std::env::var(HISTORY_PATH_ENV).ok())
            .or_else(|| parsed.history.path.as_deref().and_then(non_empty_path))
            .map(|p| resolve_relative_to(base_dir, &p));
        let retention_days = positive(
            parsed.history.retention_days,
            history::DEFAULT_RETENTION_DAYS,
            "history.retention_days",
        )?;
        let timezone_raw = parsed
            .history
            .timezone
            .unwrap_or_else(|| history::DEFAULT_TIMEZONE.to_string());
        let timezone = parse_display_zone(&timezone_raw).ok_or_else(|| {
            BotError::config(format!("Unsupported history.timezone: {}", timezone_raw))
                .with_hint("Use UTC or a fixed offset such as +03:00")
        })?;
        let retention_secs = retention_days
            .checked_mul(history::SECONDS_PER_DAY as u64)
            .ok_or_else(|| {
                BotError::config(format!(
                    "history.retention_days is too large: {}",
                    retention_days
                ))
            })?;
        let history = HistorySettings {
            path: history_path,
            retention: Duration::from_secs(retention_secs),
            timezone,
        };

        let known_hosts_path = normalize_env_path(std::env::var(KNOWN_HOSTS_PATH_ENV).ok())
            .or_else(|| parsed.ssh.known_hosts_path.as_deref().and_then(non_empty_path))
            .map(|p| resolve_relative_to(base_dir, &p));
        let ssh = SshSettings {
            connect_timeout: Duration::from_millis(positive(
                parsed.ssh.connect_timeout_ms,
                network::TIMEOUT_SSH_CONNECT_MS,
                "ssh.connect_timeout_ms",
            )?),
            exec_timeout: Duration::from_millis(positive(
                parsed.ssh.exec_timeout_ms,
                network::TIMEOUT_SSH_EXEC_DEFAULT_MS,
                "ssh.exec_timeout_ms",
            )?),
            known_hosts_path,
        };

        let ui = UiSettings {
            result_delay: Duration::from_millis(
                parsed.ui.result_delay_ms.unwrap_or(ui::RESULT_DELAY_MS),
            ),
        };

        Ok(Self {
            bot,
            users,
            registry,
            history,
            ssh,
            ui,
        })
    }

    /// Hosts that carry both a key file and a password; the key wins.
    pub fn hosts_with_redundant_credentials(&self) -> Vec<&str> {
        self.registry
            .hosts()
            .iter()
            .filter(|h| h.key_path.is_some() && h.password.is_some())
            .map(|h| h.alias.as_str())
            .collect()
    }
}

fn positive(value: Option<u64>, fallback: u64, label: &str) -> Result<u64, BotError> {
    match value {
        None => Ok(fallback),
        Some(0) => Err(BotError::config(format!("{} must be greater than zero", label))),
        Some(v) => Ok(v),
    }
}

fn non_empty_path(raw: &str) -> Option<PathBuf> {
    normalize_env_path(Some(raw.to_string()))
}

fn parse_user_id(raw: &str) -> Result<UserId, BotError> {
    raw.trim()
        .parse::<UserId>()
        .map_err(|_| BotError::config(format!("bot.users: invalid user id '{}'", raw)))
}

/// Accepts `{"123": "alice"}`, `[123, 456]` or `"123,456"`.
fn parse_users(value: &Value) -> Result<AllowList, BotError> {
    match value {
        Value::Null => Ok(AllowList::default()),
        Value::Object(map) => map
            .iter()
            .map(|(id, name)| {
                let id = parse_user_id(id)?;
                let name = name
                    .as_str()
                    .map(str::to_string)
                    .unwrap_or_else(|| id.to_string());
                Ok((id, name))
            })
            .collect(),
        Value::Array(items) => items
            .iter()
            .map(|item| {
                let id = match item {
                    Value::Number(n) => n.as_i64().ok_or_else(|| {
                        BotError::config(format!("bot.users: invalid user id '{}'", n))
                    })?,
                    Value::String(s) => parse_user_id(s)?,
                    other => {
                        return Err(BotError::config(format!(
                            "bot.users: invalid user id '{}'",
                            other
                        )))
                    }
                };
                Ok((id, id.to_string()))
            })
            .collect(),
        Value::String(list) => list
            .split(',')
            .filter(|s| !s.trim().is_empty())
            .map(|s| parse_user_id(s).map(|id| (id, id.to_string())))
            .collect(),
        other => Err(BotError::config(format!(
            "bot.users must be an object, array or comma-separated string, got {}",
            other
        ))),
    }
}

fn split_host_port(raw: &str) -> (String, Option<u16>) {
    let trimmed = raw.trim();
    if let Some(rest) = trimmed.strip_prefix('[') {
        if let Some((host, tail)) = rest.split_once(']') {
            let port = tail.strip_prefix(':').and_then(|p| p.parse::<u16>().ok());
            return (host.to_string(), port);
        }
    }
    match trimmed.rsplit_once(':') {
        Some((host, port)) if !host.contains(':') => match port.parse::<u16>() {
            Ok(port) => (host.to_string(), Some(port)),
            Err(_) => (trimmed.to_string(), None),
        },
        _ => (trimmed.to_string(), None),
    }
}

fn parse_host(alias: &str, value: Value, base_dir: &Path) -> Result<Host, BotError> {
    let raw: RawHost = serde_json::from_value(value)
        .map_err(|err| BotError::config(format!("hosts.{}: {}", alias, err)))?;
    let (address, embedded_port) = split_host_port(&raw.address);
    if address.is_empty() {
        return Err(BotError::config(format!("hosts.{}.address must be non-empty", alias)));
    }
    if raw.login.trim().is_empty() {
        return Err(BotError::config(format!("hosts.{}.login must be non-empty", alias)));
    }
    let key_path = raw
        .key_path
        .as_deref()
        .and_then(non_empty_path)
        .map(|p| resolve_relative_to(base_dir, &p));
    let password = raw.password.filter(|p| !p.is_empty());
    if key_path.is_none() && password.is_none() {
        return Err(BotError::config(format!(
            "hosts.{} has no credentials: set key_path or password",
            alias
        )));
    }
    Ok(Host {
        alias: alias.to_string(),
        address,
        port: raw
            .port
            .or(embedded_port)
            .unwrap_or(network::SSH_DEFAULT_PORT),
        login: raw.login.trim().to_string(),
        key_path,
        passphrase: raw.passphrase.filter(|p| !p.is_empty()),
        password,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "bot": { "token": "123:abc", "users": { "42": "alice", "7": "bob" } },
        "hosts": {
            "web": { "address": "10.0.0.5:2222", "login": "deploy", "key_path": "keys/id_ed25519" },
            "db": { "address": "db.internal", "user": "root", "password": "pw" }
        },
        "actions": { "uptime": "uptime", "disk": "df -h /" },
        "history": { "path": "history.json", "retention_days": 3, "timezone": "+02:00" }
    }"#;

    fn parse(raw: &str) -> Result<Config, BotError> {
        Config::from_json_str(raw, Path::new("/etc/sshbot"))
    }

    #[test]
    fn hosts_and_actions_keep_file_order() {
        let config = parse(SAMPLE).expect("config");
        let hosts: Vec<&str> = config.registry.hosts().iter().map(|h| h.alias.as_str()).collect();
        assert_eq!(hosts, vec!["web", "db"]);
        let actions: Vec<&str> = config.registry.actions().iter().map(|a| a.alias.as_str()).collect();
        assert_eq!(actions, vec!["uptime", "disk"]);
    }

    #[test]
    fn host_fields_are_normalized() {
        let config = parse(SAMPLE).expect("config");
        let web = config.registry.host("web").expect("web");
        assert_eq!(web.address, "10.0.0.5");
        assert_eq!(web.port, 2222);
        assert_eq!(web.key_path, Some(PathBuf::from("/etc/sshbot/keys/id_ed25519")));
        let db = config.registry.host("db").expect("db");
        assert_eq!(db.port, 22);
        assert_eq!(db.login, "root");
        assert_eq!(db.password.as_deref(), Some("pw"));
    }

    #[test]
    fn history_settings_resolve() {
        let config = parse(SAMPLE).expect("config");
        assert_eq!(config.history.path, Some(PathBuf::from("/etc/sshbot/history.json")));
        assert_eq!(config.history.retention, Duration::from_secs(3 * 86_400));
        assert_eq!(config.history.timezone.local_minus_utc(), 7200);
        assert_eq!(config.ssh.connect_timeout, Duration::from_millis(2_000));
        assert_eq!(config.ui.result_delay, Duration::from_millis(2_000));
        assert!(config.users.is_allowed(42));
        assert_eq!(config.users.display_name(7), "bob");
    }

    #[test]
    fn host_without_credentials_is_fatal() {
        let raw = r#"{
            "bot": { "token": "t", "users": [1] },
            "hosts": { "bare": { "address": "h", "login": "u" } },
            "actions": { "uptime": "uptime" }
        }"#;
        let err = parse(raw).unwrap_err();
        assert!(err.is_config());
        assert!(err.message.contains("no credentials"));
    }

    #[test]
    fn users_accept_comma_separated_ids() {
        let raw = r#"{
            "bot": { "token": "t", "users": "1, 2,3" },
            "hosts": { "h": { "address": "h", "login": "u", "password": "p" } },
            "actions": { "uptime": "uptime" }
        }"#;
        let config = parse(raw).expect("config");
        assert_eq!(config.users.len(), 3);
        assert_eq!(config.users.display_name(2), "2");
    }

    #[test]
    fn legacy_commands_key_is_accepted() {
        let raw = r#"{
            "bot": { "token": "t", "users": [1] },
            "hosts": { "h": { "address": "h", "login": "u", "password": "p" } },
            "commands": { "uptime": "uptime" }
        }"#;
        let config = parse(raw).expect("config");
        assert!(config.registry.action("uptime").is_some());
        assert!(config.history.path.is_none());
    }

    #[test]
    fn bad_timezone_and_zero_timeouts_are_rejected() {
        let raw = r#"{
            "bot": { "token": "t", "users": [1] },
            "hosts": { "h": { "address": "h", "login": "u", "password": "p" } },
            "actions": { "uptime": "uptime" },
            "history": { "timezone": "Mars/Olympus" }
        }"#;
        assert!(parse(raw).unwrap_err().message.contains("timezone"));
        let raw = r#"{
            "bot": { "token": "t", "users": [1] },
            "hosts": { "h": { "address": "h", "login": "u", "password": "p" } },
            "actions": { "uptime": "uptime" },
            "ssh": { "connect_timeout_ms": 0 }
        }"#;
        assert!(parse(raw).unwrap_err().message.contains("connect_timeout_ms"));
    }

    #[test]
    fn oversized_retention_is_a_config_error() {
        let raw = r#"{
            "bot": { "token": "t", "users": [1] },
            "hosts": { "h": { "address": "h", "login": "u", "password": "p" } },
            "actions": { "uptime": "uptime" },
            "history": { "retention_days": 18446744073709551615 }
        }"#;
        let err = parse(raw).unwrap_err();
        assert!(err.is_config());
        assert!(err.message.contains("retention_days is too large"));
    }

    #[test]
    fn split_host_port_handles_ipv6() {
        assert_eq!(split_host_port("[::1]:2200"), ("::1".to_string(), Some(2200)));
        assert_eq!(split_host_port("fe80::1"), ("fe80::1".to_string(), None));
        assert_eq!(split_host_port("box"), ("box".to_string(), None));
    }
}
