use async_trait::async_trait;
use thiserror::Error;

use super::models::ChannelConfig;

pub mod telegram;
pub mod webhook;

#[derive(Error, Debug)]
pub enum SenderError {
    #[error("Failed to send notification: {0}")]
    SendFailed(String),
    #[error("Invalid configuration for sender: {0}")]
    InvalidConfiguration(String),
    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),
    #[error("Templating error: {0}")]
    TemplatingError(String),
}

/// A trait for sending notifications to a specific channel type.
///
/// `payload` is the structured event (heartbeat or certificate info) for
/// channels that support templating or rich bodies; plain-text channels
/// use `message` alone.
#[async_trait]
pub trait NotificationSender {
    async fn send(
        &self,
        config: &ChannelConfig,
        message: &str,
        payload: Option<&serde_json::Value>,
    ) -> Result<(), SenderError>;
}
