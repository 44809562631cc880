// src/services/transport.rs

//! Chat messaging transport.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

use crate::error::{AppError, Result};
use crate::models::{BotConfig, InboundEvent};
use crate::utils::http;

/// Telegram's hard limit on message length, in UTF-16 code units.
pub const TELEGRAM_MAX_MESSAGE_LEN: usize = 4096;

/// Inbound polling and outbound delivery for one chat channel.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Events newer than `cursor`, waiting up to the poll timeout for some.
    async fn pending_events(&self, cursor: Option<i64>) -> Result<Vec<InboundEvent>>;

    /// Deliver one message to one recipient.
    async fn deliver(&self, chat_id: i64, text: &str) -> Result<()>;
}

/// Telegram Bot API transport.
pub struct TelegramTransport {
    client: Client,
    endpoint: String,
    poll_timeout_secs: u64,
}

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    description: Option<String>,
    result: Option<T>,
}

#[derive(Debug, Deserialize)]
struct Update {
    update_id: i64,
    #[serde(default)]
    message: Option<Message>,
}

#[derive(Debug, Deserialize)]
struct Message {
    chat: Chat,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Chat {
    id: i64,
}

impl TelegramTransport {
    pub fn new(config: &BotConfig, token: &str) -> Result<Self> {
        Ok(Self::with_client(http::create_bot_client(config)?, config, token))
    }

    pub fn with_client(client: Client, config: &BotConfig, token: &str) -> Self {
        Self {
            client,
            endpoint: format!("{}/bot{}", config.api_base.trim_end_matches('/'), token),
            poll_timeout_secs: config.poll_timeout_secs,
        }
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/{}", self.endpoint, method)
    }
}

fn check<T>(method: &str, response: ApiResponse<T>) -> Result<Option<T>> {
    if response.ok {
        Ok(response.result)
    } else {
        Err(AppError::transport(
            method,
            response
                .description
                .unwrap_or_else(|| "request rejected".to_string()),
        ))
    }
}

#[async_trait]
impl Transport for TelegramTransport {
    async fn pending_events(&self, cursor: Option<i64>) -> Result<Vec<InboundEvent>> {
        let mut query = vec![("timeout", self.poll_timeout_secs.to_string())];
        if let Some(cursor) = cursor {
            query.push(("offset", (cursor + 1).to_string()));
        }

        let response: ApiResponse<Vec<Update>> = self
            .client
            .get(self.method_url("getUpdates"))
            .query(&query)
            .send()
            .await?
            .json()
            .await?;

        let updates = check("getUpdates", response)?.unwrap_or_default();
        Ok(updates
            .into_iter()
            .map(|update| InboundEvent {
                id: update.update_id,
                chat_id: update.message.as_ref().map(|m| m.chat.id),
                text: update.message.and_then(|m| m.text),
            })
            .collect())
    }

    async fn deliver(&self, chat_id: i64, text: &str) -> Result<()> {
        let response: ApiResponse<serde_json::Value> = self
            .client
            .post(self.method_url("sendMessage"))
            .json(&json!({ "chat_id": chat_id, "text": text }))
            .send()
            .await?
            .json()
            .await?;

        check("sendMessage", response).map(|_| ())
    }
}
