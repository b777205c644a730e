pub mod telegram;

use crate::errors::BotError;
use crate::services::access::UserId;

pub type ChatId = i64;
pub type MessageId = i64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Button {
    pub label: String,
    pub payload: String,
}

impl Button {
    pub fn new(label: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            payload: payload.into(),
        }
    }
}

/// Inline keyboard: rows of buttons, top to bottom.
pub type Keyboard = Vec<Vec<Button>>;

/// What the chat surface hands to the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Interaction {
    Start {
        user: UserId,
        chat: ChatId,
    },
    Callback {
        user: UserId,
        chat: ChatId,
        message_id: MessageId,
        payload: String,
    },
}

impl Interaction {
    pub fn user(&self) -> UserId {
        match self {
            Interaction::Start { user, .. } | Interaction::Callback { user, .. } => *user,
        }
    }

    pub fn chat(&self) -> ChatId {
        match self {
            Interaction::Start { chat, .. } | Interaction::Callback { chat, .. } => *chat,
        }
    }
}

#[async_trait::async_trait]
pub trait MessagingGateway: Send + Sync {
    async fn send_message(
        &self,
        chat: ChatId,
        text: &str,
        keyboard: Option<&Keyboard>,
    ) -> Result<(), BotError>;

    async fn edit_message(
        &self,
        chat: ChatId,
        message_id: MessageId,
        text: &str,
        keyboard: Option<&Keyboard>,
    ) -> Result<(), BotError>;
}
