pub mod access;
pub mod config;
pub mod history;
pub mod known_hosts;
pub mod logger;
pub mod registry;
