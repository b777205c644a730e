use std::env;
use std::path::{Path, PathBuf};

pub const CONFIG_PATH_ENV: &str = "SSHBOT_CONFIG";
pub const HISTORY_PATH_ENV: &str = "SSHBOT_HISTORY_PATH";
pub const KNOWN_HOSTS_PATH_ENV: &str = "SSHBOT_KNOWN_HOSTS_PATH";

pub fn normalize_env_path(value: Option<String>) -> Option<PathBuf> {
    let raw = value?;
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    let lowered = trimmed.to_lowercase();
    if lowered == "undefined" || lowered == "null" {
        return None;
    }
    Some(PathBuf::from(trimmed))
}

fn resolve_home_dir() -> Option<PathBuf> {
    env::var("HOME").ok().map(PathBuf::from)
}

fn resolve_xdg_state_dir() -> Option<PathBuf> {
    if let Some(path) = normalize_env_path(env::var("XDG_STATE_HOME").ok()) {
        return Some(path);
    }
    resolve_home_dir().map(|home| home.join(".local").join("state"))
}

pub fn expand_home_path(path: impl AsRef<Path>) -> PathBuf {
    let path = path.as_ref();
    let Some(text) = path.to_str() else {
        return path.to_path_buf();
    };
    match (text, resolve_home_dir()) {
        ("~", Some(home)) => home,
        (other, Some(home)) if other.starts_with("~/") => home.join(&other[2..]),
        _ => path.to_path_buf(),
    }
}

/// Config file lookup: explicit flag, then `SSHBOT_CONFIG`, then the first of
/// the XDG state dir and the working directory that actually has a file.
pub fn resolve_config_path(explicit: Option<&Path>) -> PathBuf {
    if let Some(path) = explicit {
        return expand_home_path(path);
    }
    if let Some(path) = normalize_env_path(env::var(CONFIG_PATH_ENV).ok()) {
        return expand_home_path(path);
    }
    let mut candidates = Vec::new();
    if let Some(state) = resolve_xdg_state_dir() {
        candidates.push(state.join("sshbot").join("config.json"));
    }
    candidates.push(PathBuf::from("config.json"));
    for candidate in &candidates {
        if candidate.exists() {
            return candidate.clone();
        }
    }
    PathBuf::from("config.json")
}

/// Expands `~` and anchors relative paths at `base_dir`.
pub fn resolve_relative_to(base_dir: &Path, raw: &Path) -> PathBuf {
    let expanded = expand_home_path(raw);
    if expanded.is_absolute() {
        expanded
    } else {
        base_dir.join(expanded)
    }
}
