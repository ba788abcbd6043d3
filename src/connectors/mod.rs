//! # Connectors
//!
//! Chat platform glue: inbound polling, outbound delivery, health checks.
//!
//! - **Version**: 1.0.0
//! - **Since**: 0.1.0
//! - **Toggleable**: false

pub mod mock;
pub mod telegram;

pub use mock::MockConnector;
pub use telegram::TelegramConnector;

use crate::core::config::{Config, ConnectorKind};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::sync::Arc;

/// A message received from a chat platform
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    /// Conversation the message arrived in; replies go here
    pub thread_id: String,
    pub sender_id: String,
    pub text: String,
}

impl InboundMessage {
    pub fn new(thread_id: &str, sender_id: &str, text: &str) -> Self {
        Self {
            thread_id: thread_id.to_string(),
            sender_id: sender_id.to_string(),
            text: text.to_string(),
        }
    }
}

/// Outbound half of a connector, all the scheduler needs
#[async_trait]
pub trait MessageSink: Send + Sync {
    async fn send_message(&self, thread_id: &str, text: &str) -> Result<()>;
}

#[async_trait]
pub trait Connector: MessageSink {
    /// Platform name, recorded on reminders created through this connector
    fn name(&self) -> &'static str;

    /// Messages received since the previous call
    async fn get_new_messages(&self) -> Result<Vec<InboundMessage>>;

    /// Whether the platform is reachable and authenticated
    async fn health_check(&self) -> bool;

    fn as_sink(self: Arc<Self>) -> Arc<dyn MessageSink>;
}

/// Build the connector selected by configuration
pub fn make_connector(config: &Config) -> Result<Arc<dyn Connector>> {
    match config.connector {
        ConnectorKind::Telegram => {
            let token = config
                .telegram_bot_token
                .as_deref()
                .ok_or_else(|| anyhow!("TELEGRAM_BOT_TOKEN is not set"))?;
            Ok(Arc::new(TelegramConnector::with_api_base(
                token,
                &config.telegram_api_base,
            )?))
        }
        ConnectorKind::Mock => Ok(Arc::new(MockConnector::new())),
    }
}
