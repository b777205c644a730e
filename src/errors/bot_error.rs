use serde::Serialize;
use std::error::Error;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BotErrorKind {
    Config,
    Denied,
    UnknownSelection,
    Gateway,
    Internal,
}

#[derive(Debug, Clone, Serialize)]
pub struct BotError {
    pub kind: BotErrorKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

impl BotError {
    pub fn new(kind: BotErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            hint: None,
        }
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::new(BotErrorKind::Config, message)
    }

    pub fn denied(message: impl Into<String>) -> Self {
        Self::new(BotErrorKind::Denied, message)
    }

    pub fn unknown_selection(message: impl Into<String>) -> Self {
        Self::new(BotErrorKind::UnknownSelection, message)
    }

    pub fn gateway(message: impl Into<String>) -> Self {
        Self::new(BotErrorKind::Gateway, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(BotErrorKind::Internal, message)
    }

    pub fn is_config(&self) -> bool {
        self.kind == BotErrorKind::Config
    }
}

impl fmt::Display for BotError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.hint.as_ref() {
            Some(hint) => write!(f, "{} ({})", self.message, hint),
            None => write!(f, "{}", self.message),
        }
    }
}

impl Error for BotError {}

impl From<std::io::Error> for BotError {
    fn from(err: std::io::Error) -> Self {
        BotError::internal(err.to_string())
    }
}
