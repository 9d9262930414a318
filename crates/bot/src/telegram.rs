//! Telegram Bot API client
//!
//! `sendMessage` and `getUpdates` over the same monoio HTTPS transport the
//! account client uses. The bot token is part of every request path, so
//! every error text leaving this module is scrubbed of it.

use crate::config::BotConfig;
use crate::error::{BotError, Result};
use tradepulse_core::{log_error, PerfTimer};
use tradepulse_exchanges::{ExchangeError, HttpRequest, HttpResponse, HttpTransport, MonoioHttpsClient};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use url::Url;

/// Telegram refuses messages longer than this many characters
pub const MAX_MESSAGE_CHARS: usize = 4096;

pub const NOTIFICATION_PREFIX: &str = "🔔 Notification: ";

/// Envelope of every Bot API response
#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
    error_code: Option<u16>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<Message>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub message_id: i64,
    pub chat: Chat,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chat {
    pub id: i64,
}

/// Outbound notification sink
#[async_trait(?Send)]
pub trait Notifier {
    /// Deliver `text` to the configured chat. Failures are logged, never returned.
    async fn notify(&self, text: &str);
}

pub struct TelegramClient<T: HttpTransport = MonoioHttpsClient> {
    config: BotConfig,
    transport: T,
}

impl TelegramClient<MonoioHttpsClient> {
    pub fn new(config: BotConfig) -> Result<Self> {
        let transport = MonoioHttpsClient::with_timeout(config.request_timeout())?;
        Ok(Self::with_transport(config, transport))
    }
}

impl<T: HttpTransport> TelegramClient<T> {
    pub fn with_transport(config: BotConfig, transport: T) -> Self {
        info!("🤖 Telegram client created for chat {}", config.chat_id);
        Self { config, transport }
    }

    pub fn config(&self) -> &BotConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// `sendMessage`; long texts go out as several messages
    pub async fn send_message(&self, chat_id: &str, text: &str) -> Result<()> {
        for part in split_message(text, MAX_MESSAGE_CHARS) {
            let body = serde_json::json!({ "chat_id": chat_id, "text": part });
            let request = HttpRequest::post(self.method_url("sendMessage")?)
                .with_header("Content-Type", "application/json")
                .with_body(body.to_string());
            let _: serde_json::Value = self.call("sendMessage", request).await?;
        }
        debug!("Message sent to {}", chat_id);
        Ok(())
    }

    /// `getUpdates` long poll starting at `offset`
    pub async fn get_updates(&self, offset: Option<i64>, timeout_secs: u64) -> Result<Vec<Update>> {
        let mut url = self.method_url("getUpdates")?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("timeout", &timeout_secs.to_string());
            if let Some(offset) = offset {
                query.append_pair("offset", &offset.to_string());
            }
        }
        self.call("getUpdates", HttpRequest::get(url)).await
    }

    /// Send to the configured chat, logging instead of failing
    pub async fn send_to_chat(&self, text: &str) {
        match self.send_message(&self.config.chat_id, text).await {
            Ok(()) => info!("Message sent: {}", text),
            Err(e) => {
                log_error!("send_message", e);
            }
        }
    }

    /// Send with the notification marker
    pub async fn send_notification(&self, text: &str) {
        self.send_to_chat(&format!("{NOTIFICATION_PREFIX}{text}")).await;
    }

    fn method_url(&self, method: &str) -> Result<Url> {
        let base = self.config.api_url.trim_end_matches('/');
        Ok(Url::parse(&format!("{base}/bot{}/{method}", self.config.bot_token))?)
    }

    async fn call<D: DeserializeOwned>(&self, method: &str, request: HttpRequest) -> Result<D> {
        let _timer = PerfTimer::start(format!("telegram_{method}"));
        let response = self
            .transport
            .execute(request)
            .await
            .map_err(|e| BotError::Api(self.scrub(&e.to_string())))?;
        self.decode(method, response)
    }

    fn decode<D: DeserializeOwned>(&self, method: &str, response: HttpResponse) -> Result<D> {
        if response.status == 401 {
            return Err(BotError::Unauthorized);
        }

        let envelope: ApiResponse<D> = match serde_json::from_str(&response.body) {
            Ok(envelope) => envelope,
            Err(e) if response.is_success() => return Err(e.into()),
            Err(_) => {
                return Err(BotError::Exchange(ExchangeError::HttpError(
                    response.status,
                    self.scrub(&response.body),
                )));
            }
        };

        if !envelope.ok {
            if envelope.error_code == Some(401) {
                return Err(BotError::Unauthorized);
            }
            let description = envelope.description.unwrap_or_else(|| "no description".to_string());
            return Err(BotError::Api(format!("{method}: {}", self.scrub(&description))));
        }
        envelope
            .result
            .ok_or_else(|| BotError::Api(format!("{method}: response without result")))
    }

    fn scrub(&self, text: &str) -> String {
        if self.config.bot_token.is_empty() {
            return text.to_string();
        }
        text.replace(&self.config.bot_token, "<token>")
    }
}

#[async_trait(?Send)]
impl<T: HttpTransport> Notifier for TelegramClient<T> {
    async fn notify(&self, text: &str) {
        self.send_notification(text).await;
    }
}

/// Split `text` into chunks of at most `max_chars`, preferring line breaks
pub fn split_message(text: &str, max_chars: usize) -> Vec<String> {
    if text.chars().count() <= max_chars {
        return vec![text.to_string()];
    }

    let mut parts = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for line in text.split_inclusive('\n') {
        let line_len = line.chars().count();
        if current_len + line_len > max_chars && !current.is_empty() {
            parts.push(std::mem::take(&mut current));
            current_len = 0;
        }
        if line_len > max_chars {
            // A single oversized line is cut at character boundaries
            let chars: Vec<char> = line.chars().collect();
            for chunk in chars.chunks(max_chars) {
                parts.push(chunk.iter().collect());
            }
            continue;
        }
        current.push_str(line);
        current_len += line_len;
    }
    if !current.is_empty() {
        parts.push(current);
    }
    parts
}
