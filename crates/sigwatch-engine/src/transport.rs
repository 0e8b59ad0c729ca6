//! Delivery transport — the seam between the engine and the chat platform.

use async_trait::async_trait;
use serde::Deserialize;
use sigwatch_core::{Result, SigwatchError};

/// Telegram's maximum message length; the engine splits before sending.
pub const TELEGRAM_MAX_LEN: usize = 4096;

/// Sends one message to one chat. Implementations enforce their own
/// transport-level limits; `max_message_len` tells the engine where to
/// split.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send_message(&self, chat_id: i64, text: &str) -> Result<()>;

    fn max_message_len(&self) -> usize {
        TELEGRAM_MAX_LEN
    }
}

/// Telegram Bot API transport.
pub struct TelegramTransport {
    bot_token: String,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct TelegramApiResponse {
    ok: bool,
    description: Option<String>,
}

impl TelegramTransport {
    pub fn new(bot_token: &str) -> Self {
        Self {
            bot_token: bot_token.to_string(),
            client: reqwest::Client::new(),
        }
    }

    fn api_url(&self, method: &str) -> String {
        format!("https://api.telegram.org/bot{}/{}", self.bot_token, method)
    }
}

#[async_trait]
impl Transport for TelegramTransport {
    async fn send_message(&self, chat_id: i64, text: &str) -> Result<()> {
        let body = serde_json::json!({
            "chat_id": chat_id,
            "text": text,
        });

        let response = self
            .client
            .post(self.api_url("sendMessage"))
            .json(&body)
            .timeout(std::time::Duration::from_secs(10))
            .send()
            .await
            .map_err(|e| SigwatchError::Transport(format!("sendMessage failed: {e}")))?;

        let result: TelegramApiResponse = response
            .json()
            .await
            .map_err(|e| SigwatchError::Transport(format!("Invalid send response: {e}")))?;

        if result.ok {
            Ok(())
        } else {
            Err(SigwatchError::Transport(format!(
                "Telegram API error: {}",
                result.description.unwrap_or_default()
            )))
        }
    }

    fn max_message_len(&self) -> usize {
        TELEGRAM_MAX_LEN
    }
}
