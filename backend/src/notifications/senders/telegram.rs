use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;

use super::{NotificationSender, SenderError};
use crate::notifications::models::ChannelConfig;

/// A sender for pushing notifications via the Telegram Bot API.
///
/// Messages go out as MarkdownV2: the transition headline in bold,
/// followed by the beat details carried in the event payload.
pub struct TelegramSender {
    client: Client,
}

impl Default for TelegramSender {
    fn default() -> Self {
        Self::new()
    }
}

impl TelegramSender {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
        }
    }
}

/// Escapes text for Telegram MarkdownV2.
/// Characters to escape: _ * [ ] ( ) ~ ` > # + - = | { } . !
fn escape_markdown_v2(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for character in text.chars() {
        if matches!(
            character,
            '_' | '*'
                | '['
                | ']'
                | '('
                | ')'
                | '~'
                | '`'
                | '>'
                | '#'
                | '+'
                | '-'
                | '='
                | '|'
                | '{'
                | '}'
                | '.'
                | '!'
        ) {
            escaped.push('\\');
        }
        escaped.push(character);
    }
    escaped
}

/// Headline plus whatever beat context the payload carries: the localized
/// timestamp with its timezone, and the measured ping.
fn render_text(message: &str, payload: Option<&Value>) -> String {
    let mut text = format!("*{}*", escape_markdown_v2(message));
    let Some(heartbeat) = payload.and_then(|payload| payload.get("heartbeat")) else {
        return text;
    };

    if let Some(local_time) = heartbeat.get("localDateTime").and_then(Value::as_str) {
        let timezone = heartbeat
            .get("timezone")
            .and_then(Value::as_str)
            .unwrap_or("UTC");
        text.push('\n');
        text.push_str(&escape_markdown_v2(&format!(
            "Time ({timezone}): {local_time}"
        )));
    }
    if let Some(ping) = heartbeat.get("ping").and_then(Value::as_f64) {
        text.push('\n');
        text.push_str(&escape_markdown_v2(&format!("Ping: {ping} ms")));
    }
    text
}

#[derive(Serialize)]
struct TelegramMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
    parse_mode: &'a str,
}

#[async_trait]
impl NotificationSender for TelegramSender {
    async fn send(
        &self,
        config: &ChannelConfig,
        message: &str,
        payload: Option<&Value>,
    ) -> Result<(), SenderError> {
        let (bot_token, chat_id) = match config {
            ChannelConfig::Telegram { bot_token, chat_id } => (bot_token, chat_id),
            _ => {
                return Err(SenderError::InvalidConfiguration(
                    "Expected Telegram config, but found a different type.".to_string(),
                ));
            }
        };

        let text = render_text(message, payload);
        let url = format!("https://api.telegram.org/bot{bot_token}/sendMessage");
        let body = TelegramMessage {
            chat_id,
            text: &text,
            parse_mode: "MarkdownV2",
        };

        let response = self.client.post(&url).json(&body).send().await?;
        let status = response.status();
        if !status.is_success() {
            let error_body = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error body".to_string());
            return Err(SenderError::SendFailed(format!(
                "Telegram API returned {status}: {error_body}"
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn escapes_all_markdown_v2_specials() {
        assert_eq!(
            escape_markdown_v2("[web] 1.5s (down!)"),
            "\\[web\\] 1\\.5s \\(down\\!\\)"
        );
        assert_eq!(escape_markdown_v2("plain text"), "plain text");
    }

    #[test]
    fn renders_headline_with_beat_details() {
        let payload = json!({
            "heartbeat": {
                "localDateTime": "2026-08-02 10:15:00",
                "timezone": "Europe/Berlin",
                "ping": 12.0,
            }
        });
        let text = render_text("[web] [🔴 Down] timeout", Some(&payload));

        assert!(text.starts_with("*\\[web\\]"));
        assert!(text.contains("Time \\(Europe/Berlin\\): 2026\\-08\\-02 10:15:00"));
        assert!(text.contains("Ping: 12 ms"));
    }

    #[test]
    fn renders_bare_headline_without_payload() {
        let text = render_text("certificate expires in 7 days", None);
        assert_eq!(text, "*certificate expires in 7 days*");
    }
}
