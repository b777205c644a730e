use thiserror::Error;

/// Failure of a single remote action run.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecError {
    #[error("connection failed: {0}")]
    Connection(String),
    #[error("authentication failed: {0}")]
    Auth(String),
    #[error("command timed out: {0}")]
    Timeout(String),
}

impl ExecError {
    pub fn code(&self) -> &'static str {
        match self {
            ExecError::Connection(_) => "connection",
            ExecError::Auth(_) => "auth",
            ExecError::Timeout(_) => "timeout",
        }
    }
}
