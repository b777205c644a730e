use crate::constants::network as network_constants;
use crate::errors::BotError;
use crate::gateway::{ChatId, Interaction, Keyboard, MessageId, MessagingGateway};
use crate::managers::dispatcher::Dispatcher;
use crate::services::logger::Logger;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

const PARSE_MODE: &str = "HTML";

/// Telegram Bot API client: long-polls updates and renders messages.
pub struct TelegramGateway {
    logger: Logger,
    client: Client,
    base_url: String,
    token: String,
    poll_timeout_secs: u64,
}

impl TelegramGateway {
    pub fn new(logger: Logger, token: &str, poll_timeout_secs: u64) -> Result<Self, BotError> {
        Self::with_api_base(logger, network_constants::TELEGRAM_API_BASE, token, poll_timeout_secs)
    }

    pub fn with_api_base(
        logger: Logger,
        api_base: &str,
        token: &str,
        poll_timeout_secs: u64,
    ) -> Result<Self, BotError> {
        if token.trim().is_empty() {
            return Err(BotError::config("telegram token cannot be empty"));
        }
        let client = Client::builder()
            .timeout(Duration::from_secs(poll_timeout_secs + 10))
            .build()
            .map_err(|err| BotError::config(format!("failed to build telegram HTTP client: {}", err)))?;
        Ok(Self {
            logger: logger.child("telegram"),
            client,
            base_url: format!("{}/bot{}", api_base.trim_end_matches('/'), token.trim()),
            token: token.trim().to_string(),
            poll_timeout_secs,
        })
    }

    /// Polls until Ctrl-C. Each interaction is handled in its own task.
    pub async fn run_until_shutdown(&self, dispatcher: Arc<Dispatcher>) -> Result<(), BotError> {
        self.logger.info("Telegram polling started", None);
        let mut offset: Option<i64> = None;
        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    self.logger.info("Telegram polling stopped", None);
                    break;
                }
                polled = self.poll_once(offset, dispatcher.clone()) => {
                    match polled {
                        Ok(next) => offset = Some(next),
                        Err(err) => {
                            self.logger.warn(
                                "Telegram poll failed",
                                Some(&serde_json::json!({"error": err.to_string()})),
                            );
                            tokio::time::sleep(Duration::from_millis(
                                network_constants::TELEGRAM_RETRY_DELAY_MS,
                            ))
                            .await;
                        }
                    }
                }
            }
        }
        Ok(())
    }

    async fn poll_once(
        &self,
        current_offset: Option<i64>,
        dispatcher: Arc<Dispatcher>,
    ) -> Result<i64, BotError> {
        let updates = self.get_updates(current_offset).await?;
        let mut next_offset = current_offset.unwrap_or(0);
        for update in updates {
            next_offset = next_offset.max(update.update_id + 1);
            let callback_id = update.callback_query.as_ref().map(|q| q.id.clone());
            if let Some(id) = callback_id {
                self.answer_callback(&id).await;
            }
            let Some(interaction) = to_interaction(update) else {
                continue;
            };
            let dispatcher = dispatcher.clone();
            tokio::spawn(async move {
                dispatcher.handle(interaction).await;
            });
        }
        Ok(next_offset)
    }

    async fn get_updates(&self, offset: Option<i64>) -> Result<Vec<TelegramUpdate>, BotError> {
        let mut body = serde_json::json!({
            "timeout": self.poll_timeout_secs,
            "allowed_updates": ["message", "callback_query"],
        });
        if let Some(offset) = offset {
            body["offset"] = Value::from(offset);
        }
        let result = self.call("getUpdates", &body).await?;
        serde_json::from_value(result)
            .map_err(|err| BotError::gateway(format!("invalid telegram getUpdates payload: {}", err)))
    }

    async fn answer_callback(&self, callback_query_id: &str) {
        let body = serde_json::json!({ "callback_query_id": callback_query_id });
        if let Err(err) = self.call("answerCallbackQuery", &body).await {
            self.logger.debug(
                "answerCallbackQuery failed",
                Some(&serde_json::json!({"error": err.to_string()})),
            );
        }
    }

    async fn call<T: Serialize + ?Sized>(&self, method: &str, body: &T) -> Result<Value, BotError> {
        let response = self
            .client
            .post(format!("{}/{}", self.base_url, method))
            .json(body)
            .send()
            .await
            .map_err(|err| {
                BotError::gateway(format!("telegram {} failed: {}", method, self.redact(&err)))
            })?;
        let status = response.status();
        let payload: ApiResponse = response
            .json()
            .await
            .map_err(|err| {
                BotError::gateway(format!(
                    "invalid telegram {} response ({}): {}",
                    method,
                    status,
                    self.redact(&err)
                ))
            })?;
        if !payload.ok {
            return Err(BotError::gateway(format!(
                "telegram {} error ({}): {}",
                method,
                status,
                payload.description.unwrap_or_else(|| "<no description>".to_string())
            )));
        }
        Ok(payload.result.unwrap_or(Value::Null))
    }

    /// reqwest errors embed the request URL, which carries the bot token.
    fn redact(&self, err: &reqwest::Error) -> String {
        err.to_string().replace(&self.token, "<token>")
    }
}

#[async_trait::async_trait]
impl MessagingGateway for TelegramGateway {
    async fn send_message(
        &self,
        chat: ChatId,
        text: &str,
        keyboard: Option<&Keyboard>,
    ) -> Result<(), BotError> {
        let body = SendMessageRequest {
            chat_id: chat,
            text,
            parse_mode: PARSE_MODE,
            reply_markup: keyboard.map(InlineKeyboardMarkup::from_keyboard),
        };
        self.call("sendMessage", &body).await.map(|_| ())
    }

    async fn edit_message(
        &self,
        chat: ChatId,
        message_id: MessageId,
        text: &str,
        keyboard: Option<&Keyboard>,
    ) -> Result<(), BotError> {
        let body = EditMessageTextRequest {
            chat_id: chat,
            message_id,
            text,
            parse_mode: PARSE_MODE,
            reply_markup: keyboard.map(InlineKeyboardMarkup::from_keyboard),
        };
        match self.call("editMessageText", &body).await {
            Ok(_) => Ok(()),
            Err(err) if err.message.contains("message is not modified") => Ok(()),
            Err(err) => Err(err),
        }
    }
}

fn command_name(text: &str) -> Option<&str> {
    let first = text.split_whitespace().next()?;
    let command = first.strip_prefix('/')?;
    Some(command.split('@').next().unwrap_or(command))
}

fn to_interaction(update: TelegramUpdate) -> Option<Interaction> {
    if let Some(query) = update.callback_query {
        let message = query.message?;
        return Some(Interaction::Callback {
            user: query.from.id,
            chat: message.chat.id,
            message_id: message.message_id,
            payload: query.data.unwrap_or_default(),
        });
    }
    let message = update.message?;
    let user = message.from.as_ref()?.id;
    match message.text.as_deref().and_then(command_name) {
        Some("start") | Some("menu") => Some(Interaction::Start {
            user,
            chat: message.chat.id,
        }),
        _ => None,
    }
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    ok: bool,
    description: Option<String>,
    result: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct TelegramUpdate {
    update_id: i64,
    message: Option<TelegramMessage>,
    callback_query: Option<TelegramCallbackQuery>,
}

#[derive(Debug, Deserialize)]
struct TelegramMessage {
    message_id: i64,
    from: Option<TelegramUser>,
    chat: TelegramChat,
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TelegramUser {
    id: i64,
}

#[derive(Debug, Deserialize)]
struct TelegramChat {
    id: i64,
}

#[derive(Debug, Deserialize)]
struct TelegramCallbackQuery {
    id: String,
    from: TelegramUser,
    message: Option<TelegramMessage>,
    data: Option<String>,
}

#[derive(Debug, Serialize)]
struct InlineKeyboardButton {
    text: String,
    callback_data: String,
}

#[derive(Debug, Serialize)]
struct InlineKeyboardMarkup {
    inline_keyboard: Vec<Vec<InlineKeyboardButton>>,
}

impl InlineKeyboardMarkup {
    fn from_keyboard(keyboard: &Keyboard) -> Self {
        Self {
            inline_keyboard: keyboard
                .iter()
                .map(|row| {
                    row.iter()
                        .map(|button| InlineKeyboardButton {
                            text: button.label.clone(),
                            callback_data: button.payload.clone(),
                        })
                        .collect()
                })
                .collect(),
        }
    }
}

#[derive(Debug, Serialize)]
struct SendMessageRequest<'a> {
    chat_id: i64,
    text: &'a str,
    parse_mode: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply_markup: Option<InlineKeyboardMarkup>,
}

#[derive(Debug, Serialize)]
struct EditMessageTextRequest<'a> {
    chat_id: i64,
    message_id: i64,
    text: &'a str,
    parse_mode: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply_markup: Option<InlineKeyboardMarkup>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::Button;

    fn update(raw: Value) -> TelegramUpdate {
        serde_json::from_value(raw).expect("update")
    }

    #[test]
    fn start_command_becomes_start_interaction() {
        let interaction = to_interaction(update(serde_json::json!({
            "update_id": 1,
            "message": {
                "message_id": 10,
                "from": { "id": 42, "is_bot": false, "first_name": "A" },
                "chat": { "id": 99, "type": "private" },
                "text": "/start@ops_bot"
            }
        })));
        assert_eq!(interaction, Some(Interaction::Start { user: 42, chat: 99 }));
    }

    #[test]
    fn plain_text_is_ignored() {
        let interaction = to_interaction(update(serde_json::json!({
            "update_id": 2,
            "message": {
                "message_id": 11,
                "from": { "id": 42 },
                "chat": { "id": 99 },
                "text": "hello"
            }
        })));
        assert_eq!(interaction, None);
    }

    #[test]
    fn callback_query_carries_payload_and_message() {
        let interaction = to_interaction(update(serde_json::json!({
            "update_id": 3,
            "callback_query": {
                "id": "cb-1",
                "from": { "id": 42 },
                "message": { "message_id": 12, "chat": { "id": 99 } },
                "data": "{\"h\":\"web\"}"
            }
        })));
        assert_eq!(
            interaction,
            Some(Interaction::Callback {
                user: 42,
                chat: 99,
                message_id: 12,
                payload: "{\"h\":\"web\"}".to_string(),
            })
        );
    }

    #[test]
    fn keyboard_serializes_as_inline_markup() {
        let keyboard = vec![vec![Button::new("web", "{\"h\":\"web\"}")]];
        let body = serde_json::to_value(SendMessageRequest {
            chat_id: 1,
            text: "pick",
            parse_mode: PARSE_MODE,
            reply_markup: Some(InlineKeyboardMarkup::from_keyboard(&keyboard)),
        })
        .expect("json");
        assert_eq!(
            body["reply_markup"],
            serde_json::json!({
                "inline_keyboard": [[{ "text": "web", "callback_data": "{\"h\":\"web\"}" }]]
            })
        );
        assert_eq!(body["parse_mode"], "HTML");
    }

    #[test]
    fn empty_token_is_rejected() {
        assert!(TelegramGateway::new(Logger::new("test"), " ", 30).is_err());
    }
}
