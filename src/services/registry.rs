use crate::constants::network::SSH_DEFAULT_PORT;
use crate::errors::BotError;
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};

#[derive(Clone, PartialEq, Eq)]
pub struct Host {
    pub alias: String,
    pub address: String,
    pub port: u16,
    pub login: String,
    pub key_path: Option<PathBuf>,
    pub passphrase: Option<String>,
    pub password: Option<String>,
}

/// Credential the executor should present, key file first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Credential<'a> {
    KeyFile {
        path: &'a Path,
        passphrase: Option<&'a str>,
    },
    Password(&'a str),
}

impl Host {
    pub fn with_password(alias: &str, address: &str, login: &str, password: &str) -> Self {
        Self {
            alias: alias.to_string(),
            address: address.to_string(),
            port: SSH_DEFAULT_PORT,
            login: login.to_string(),
            key_path: None,
            passphrase: None,
            password: Some(password.to_string()),
        }
    }

    pub fn with_key(alias: &str, address: &str, login: &str, key_path: impl Into<PathBuf>) -> Self {
        Self {
            alias: alias.to_string(),
            address: address.to_string(),
            port: SSH_DEFAULT_PORT,
            login: login.to_string(),
            key_path: Some(key_path.into()),
            passphrase: None,
            password: None,
        }
    }

    pub fn credential(&self) -> Option<Credential<'_>> {
        if let Some(path) = self.key_path.as_deref() {
            return Some(Credential::KeyFile {
                path,
                passphrase: self.passphrase.as_deref(),
            });
        }
        self.password.as_deref().map(Credential::Password)
    }

    /// `address:port`, bracketing IPv6 literals.
    pub fn endpoint(&self) -> String {
        if self.address.contains(':') {
            format!("[{}]:{}", self.address, self.port)
        } else {
            format!("{}:{}", self.address, self.port)
        }
    }
}

impl fmt::Debug for Host {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Host")
            .field("alias", &self.alias)
            .field("address", &self.address)
            .field("port", &self.port)
            .field("login", &self.login)
            .field("key_path", &self.key_path)
            .field("passphrase", &self.passphrase.as_ref().map(|_| "***"))
            .field("password", &self.password.as_ref().map(|_| "***"))
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Action {
    pub alias: String,
    pub command: String,
}

impl Action {
    pub fn new(alias: &str, command: &str) -> Self {
        Self {
            alias: alias.to_string(),
            command: command.to_string(),
        }
    }
}

/// Hosts and actions in configuration order. Immutable once built.
#[derive(Debug, Clone)]
pub struct Registry {
    hosts: Vec<Host>,
    actions: Vec<Action>,
}

impl Registry {
    pub fn new(hosts: Vec<Host>, actions: Vec<Action>) -> Result<Self, BotError> {
        ensure_unique("host", hosts.iter().map(|h| h.alias.as_str()))?;
        ensure_unique("action", actions.iter().map(|a| a.alias.as_str()))?;
        Ok(Self { hosts, actions })
    }

    pub fn hosts(&self) -> &[Host] {
        &self.hosts
    }

    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    pub fn host(&self, alias: &str) -> Option<&Host> {
        self.hosts.iter().find(|host| host.alias == alias)
    }

    pub fn action(&self, alias: &str) -> Option<&Action> {
        self.actions.iter().find(|action| action.alias == alias)
    }
}

fn ensure_unique<'a>(label: &str, aliases: impl Iterator<Item = &'a str>) -> Result<(), BotError> {
    let mut seen = HashSet::new();
    for alias in aliases {
        if alias.trim().is_empty() {
            return Err(BotError::config(format!("{} alias must be a non-empty string", label)));
        }
        if !seen.insert(alias) {
            return Err(BotError::config(format!("Duplicate {} alias: {}", label, alias)));
        }
    }
    Ok(())
}
