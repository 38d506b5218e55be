use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Provider-specific configuration, stored as JSON in the `notification`
/// table's `config` column.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ChannelConfig {
    Telegram {
        bot_token: String,
        chat_id: String,
    },
    Webhook {
        url: String,
        method: String, // "GET" or "POST"
        headers: Option<HashMap<String, String>>,
        body_template: Option<String>, // JSON template for POST requests
    },
}
