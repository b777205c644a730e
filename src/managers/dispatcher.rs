use crate::constants::ui;
use crate::errors::{BotError, BotErrorKind};
use crate::gateway::{ChatId, Interaction, MessageId, MessagingGateway};
use crate::managers::navigation::{
    action_menu, decide, error_text, host_menu, host_selected_text, rejection_text, result_text,
    Decision, SelectionToken,
};
use crate::managers::ssh::RemoteExecutor;
use crate::services::access::{AllowList, UserId};
use crate::services::history::{render_history, HistoryLedger};
use crate::services::logger::Logger;
use crate::services::registry::{Action, Host, Registry};
use crate::stores::file_history_store::HistoryRecord;
use crate::utils::text::MAX_MESSAGE_CHARS;
use chrono::FixedOffset;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Copy)]
pub struct DispatchSettings {
    /// Pause between showing a result and bringing the host menu back.
    pub result_delay: Duration,
    pub timezone: FixedOffset,
}

/// Entry point for every interaction. All failures stop here: the user gets
/// one message and is sent back to the host menu.
#[derive(Clone)]
pub struct Dispatcher {
    logger: Logger,
    registry: Arc<Registry>,
    users: Arc<AllowList>,
    executor: Arc<dyn RemoteExecutor>,
    ledger: HistoryLedger,
    gateway: Arc<dyn MessagingGateway>,
    settings: DispatchSettings,
}

impl Dispatcher {
    pub fn new(
        logger: Logger,
        registry: Arc<Registry>,
        users: Arc<AllowList>,
        executor: Arc<dyn RemoteExecutor>,
        ledger: HistoryLedger,
        gateway: Arc<dyn MessagingGateway>,
        settings: DispatchSettings,
    ) -> Self {
        Self {
            logger: logger.child("dispatch"),
            registry,
            users,
            executor,
            ledger,
            gateway,
            settings,
        }
    }

    pub async fn handle(&self, interaction: Interaction) {
        let user = interaction.user();
        let chat = interaction.chat();
        let authorized = self.users.is_allowed(user);
        let message_id = match &interaction {
            Interaction::Callback { message_id, .. } => Some(*message_id),
            Interaction::Start { .. } => None,
        };
        match self.route(&interaction, authorized).await {
            Ok(()) => {}
            Err(err) if err.kind == BotErrorKind::Denied => self.reject(user, chat).await,
            Err(err) => self.recover(chat, message_id, &err).await,
        }
    }

    async fn reject(&self, user: UserId, chat: ChatId) {
        self.logger.warn(
            "Unknown user",
            Some(&serde_json::json!({"user": user, "chat": chat})),
        );
        if let Err(err) = self
            .gateway
            .send_message(chat, &rejection_text(user), None)
            .await
        {
            self.logger.error(
                "Failed to send rejection",
                Some(&serde_json::json!({"user": user, "error": err.to_string()})),
            );
        }
    }

    /// Strangers' payloads are never decoded.
    async fn route(&self, interaction: &Interaction, authorized: bool) -> Result<(), BotError> {
        let user = interaction.user();
        let chat = interaction.chat();
        let (message_id, token) = match interaction {
            Interaction::Start { .. } => (None, None),
            Interaction::Callback {
                message_id,
                payload,
                ..
            } => {
                let token = if authorized {
                    Some(SelectionToken::decode(payload)?)
                } else {
                    None
                };
                (Some(*message_id), token)
            }
        };
        if let Some(token) = &token {
            self.logger.debug(
                "Callback",
                Some(&serde_json::json!({"user": user, "token": format!("{:?}", token)})),
            );
        }
        match (decide(&self.registry, authorized, token.as_ref()), message_id) {
            (Decision::Unauthorized, _) => Err(BotError::denied(format!(
                "user {} is not allowed",
                user
            ))),
            (Decision::HostMenu, _) => self.show_host_menu(chat).await,
            (Decision::UnknownSelection(reason), _) => Err(BotError::unknown_selection(reason)),
            (_, None) => Err(BotError::internal("selection has no message to edit")),
            (Decision::Cancelled, Some(id)) => self.cancel(chat, id).await,
            (Decision::HistoryView, Some(id)) => self.show_history(chat, id).await,
            (Decision::ActionMenu(host), Some(id)) => self.show_actions(chat, id, host).await,
            (Decision::Execute(host, action), Some(id)) => {
                self.execute(user, chat, id, host, action).await
            }
        }
    }

    async fn show_host_menu(&self, chat: ChatId) -> Result<(), BotError> {
        self.gateway
            .send_message(chat, ui::HOST_PROMPT, Some(&host_menu(&self.registry)))
            .await
    }

    async fn cancel(&self, chat: ChatId, message_id: MessageId) -> Result<(), BotError> {
        self.gateway
            .edit_message(chat, message_id, ui::CANCELLED_TEXT, None)
            .await?;
        self.pause().await;
        self.show_host_menu(chat).await
    }

    async fn show_history(&self, chat: ChatId, message_id: MessageId) -> Result<(), BotError> {
        let records = self.ledger.list();
        let text = render_history(
            &records,
            &self.users,
            &self.settings.timezone,
            MAX_MESSAGE_CHARS,
        );
        self.gateway
            .edit_message(chat, message_id, &text, None)
            .await?;
        self.show_host_menu(chat).await
    }

    async fn show_actions(
        &self,
        chat: ChatId,
        message_id: MessageId,
        host: &Host,
    ) -> Result<(), BotError> {
        self.gateway
            .edit_message(chat, message_id, &host_selected_text(host), None)
            .await?;
        self.gateway
            .send_message(
                chat,
                ui::ACTION_PROMPT,
                Some(&action_menu(&self.registry, host)),
            )
            .await
    }

    async fn execute(
        &self,
        user: UserId,
        chat: ChatId,
        message_id: MessageId,
        host: &Host,
        action: &Action,
    ) -> Result<(), BotError> {
        let outcome = self.executor.execute(host, &action.command).await;
        let text = match &outcome {
            Ok(output) => result_text(&action.command, &output.report()),
            Err(err) => error_text(&err.to_string()),
        };
        let rendered = self
            .gateway
            .edit_message(chat, message_id, &text, None)
            .await;
        if outcome.is_ok() {
            self.record(user, host, action);
        }
        rendered?;
        self.pause().await;
        self.show_host_menu(chat).await
    }

    fn record(&self, user: UserId, host: &Host, action: &Action) {
        let record = HistoryRecord::new(
            user,
            &host.alias,
            &action.alias,
            crate::utils::time::now_unix(),
        );
        if let Err(err) = self.ledger.append(record) {
            self.logger.warn(
                "History append failed",
                Some(&serde_json::json!({"error": err.to_string()})),
            );
        }
    }

    async fn pause(&self) {
        if !self.settings.result_delay.is_zero() {
            tokio::time::sleep(self.settings.result_delay).await;
        }
    }

    async fn recover(&self, chat: ChatId, message_id: Option<MessageId>, err: &BotError) {
        self.logger.warn(
            "Interaction failed",
            Some(&serde_json::json!({
                "chat": chat,
                "kind": err.kind,
                "error": err.to_string(),
            })),
        );
        let text = match err.kind {
            BotErrorKind::UnknownSelection => {
                error_text("unknown selection, the menu may be outdated")
            }
            _ => error_text("request failed, see server logs"),
        };
        let shown = match message_id {
            Some(id) => match self.gateway.edit_message(chat, id, &text, None).await {
                Ok(()) => Ok(()),
                Err(_) => self.gateway.send_message(chat, &text, None).await,
            },
            None => self.gateway.send_message(chat, &text, None).await,
        };
        if let Err(secondary) = shown {
            self.logger.error(
                "Failed to report error",
                Some(&serde_json::json!({"error": secondary.to_string()})),
            );
        }
        self.pause().await;
        if let Err(secondary) = self.show_host_menu(chat).await {
            self.logger.error(
                "Failed to restore host menu",
                Some(&serde_json::json!({"error": secondary.to_string()})),
            );
        }
    }
}
