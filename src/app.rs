use crate::errors::BotError;
use crate::gateway::telegram::TelegramGateway;
use crate::gateway::MessagingGateway;
use crate::managers::dispatcher::{DispatchSettings, Dispatcher};
use crate::managers::navigation::validate_payload_sizes;
use crate::managers::ssh::{RemoteExecutor, SshExecutor};
use crate::services::config::Config;
use crate::services::history::HistoryLedger;
use crate::services::known_hosts::KnownHosts;
use crate::services::logger::Logger;
use std::path::Path;
use std::sync::Arc;

pub struct App {
    pub logger: Logger,
    pub gateway: Arc<TelegramGateway>,
    pub dispatcher: Arc<Dispatcher>,
}

impl App {
    /// Loads and validates configuration, then wires every component.
    /// Any error here is fatal.
    pub fn initialize(config_path: &Path) -> Result<Self, BotError> {
        let logger = Logger::new("sshbot");
        let config = Config::load(config_path)?;
        validate_payload_sizes(&config.registry)?;
        Self::from_config(logger, config)
    }

    pub fn from_config(logger: Logger, config: Config) -> Result<Self, BotError> {
        let redundant = config.hosts_with_redundant_credentials();
        if !redundant.is_empty() {
            logger.warn(
                "Hosts configure both key_path and password, the key file is used",
                Some(&serde_json::json!({"hosts": redundant})),
            );
        }

        let known_hosts = KnownHosts::new(logger.clone(), config.ssh.known_hosts_path.clone());
        let executor: Arc<dyn RemoteExecutor> =
            Arc::new(SshExecutor::new(logger.clone(), &config.ssh, known_hosts));
        let ledger = HistoryLedger::new(logger.clone(), &config.history);
        if !ledger.is_enabled() {
            logger.info("History path not configured, executions are not recorded", None);
        }
        let gateway = Arc::new(TelegramGateway::new(
            logger.clone(),
            &config.bot.token,
            config.bot.poll_timeout_secs,
        )?);
        let messaging: Arc<dyn MessagingGateway> = gateway.clone();

        logger.info(
            "Configuration loaded",
            Some(&serde_json::json!({
                "hosts": config.registry.hosts().len(),
                "actions": config.registry.actions().len(),
                "users": config.users.len(),
                "history": config.history.path.as_ref().map(|p| p.display().to_string()),
            })),
        );

        let dispatcher = Arc::new(Dispatcher::new(
            logger.clone(),
            Arc::new(config.registry),
            Arc::new(config.users),
            executor,
            ledger,
            messaging,
            DispatchSettings {
                result_delay: config.ui.result_delay,
                timezone: config.history.timezone,
            },
        ));

        Ok(Self {
            logger,
            gateway,
            dispatcher,
        })
    }

    pub async fn run(&self) -> Result<(), BotError> {
        self.gateway
            .run_until_shutdown(self.dispatcher.clone())
            .await
    }
}
