//! Dispatch of important beats and certificate warnings to the
//! notification channels assigned to a monitor.

use chrono::Local;
use serde_json::json;
use sqlx::SqlitePool;
use tracing::{error, info};

use super::models::ChannelConfig;
use super::senders::{telegram::TelegramSender, webhook::WebhookSender, NotificationSender};
use crate::db::models::{Heartbeat, Monitor};
use crate::db::services as db;
use crate::monitor::status::Status;
use crate::server::env::Env;

pub struct NotificationService {
    pool: SqlitePool,
}

impl NotificationService {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Builds the transition message and payload for an important beat and
    /// dispatches it to every channel configured for the monitor.
    pub async fn notify_important_beat(&self, monitor: &Monitor, beat: &Heartbeat, env: &Env) {
        let status_label = if beat.status == Status::Up {
            "✅ Up"
        } else {
            "🔴 Down"
        };
        let msg = if beat.msg.is_empty() { "N/A" } else { &beat.msg };
        let title = format!("[{}] [{}] {}", monitor.name, status_label, msg);

        let local_time = beat.time.with_timezone(&Local);
        let mut heartbeat_json = serde_json::to_value(beat).unwrap_or_else(|_| json!({}));
        if let Some(fields) = heartbeat_json.as_object_mut() {
            fields.insert("timezone".into(), json!(env.timezone));
            fields.insert(
                "timezoneOffset".into(),
                json!(local_time.offset().to_string()),
            );
            fields.insert(
                "localDateTime".into(),
                json!(local_time.format("%Y-%m-%d %H:%M:%S").to_string()),
            );
        }
        let payload = json!({
            "heartbeat": heartbeat_json,
            "monitor": monitor.public_json(),
            "msg": title,
        });

        self.send_to_monitor_channels(monitor, &title, Some(&payload))
            .await;
    }

    /// Fire-and-forget fan-out. A failing provider is logged and never
    /// stops the remaining providers.
    pub async fn send_to_monitor_channels(
        &self,
        monitor: &Monitor,
        message: &str,
        payload: Option<&serde_json::Value>,
    ) {
        let channels = match db::list_for_monitor(&self.pool, monitor.id).await {
            Ok(channels) => channels,
            Err(e) => {
                error!(monitor_id = monitor.id, error = %e, "Failed to load notification channels.");
                return;
            }
        };

        for channel in channels {
            let config: ChannelConfig = match serde_json::from_str(&channel.config) {
                Ok(config) => config,
                Err(e) => {
                    error!(
                        channel_id = channel.id,
                        error = %e,
                        "Skipping notification channel with unreadable config."
                    );
                    continue;
                }
            };

            let result = match &config {
                ChannelConfig::Telegram { .. } => {
                    TelegramSender::new().send(&config, message, payload).await
                }
                ChannelConfig::Webhook { .. } => {
                    WebhookSender::new().send(&config, message, payload).await
                }
            };

            match result {
                Ok(()) => {
                    info!(
                        monitor_id = monitor.id,
                        channel = %channel.name,
                        "Notification sent."
                    );
                }
                Err(e) => {
                    error!(
                        monitor_id = monitor.id,
                        channel = %channel.name,
                        error = %e,
                        "Notification failed."
                    );
                }
            }
        }
    }
}
