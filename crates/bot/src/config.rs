//! Telegram bot configuration

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_API_URL: &str = "https://api.telegram.org";
pub const DEFAULT_POLL_TIMEOUT_SECS: u64 = 30;

/// Delay after a failed `getUpdates` before polling again
pub const DEFAULT_RETRY_DELAY_MS: u64 = 5_000;

#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BotConfig {
    pub bot_token: String,
    /// Chat that receives fill notifications
    pub chat_id: String,
    pub api_url: String,
    /// Long-poll timeout passed to `getUpdates`
    pub poll_timeout_secs: u64,
    pub retry_delay_ms: u64,
}

impl std::fmt::Debug for BotConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BotConfig")
            .field("bot_token_set", &!self.bot_token.is_empty())
            .field("chat_id", &self.chat_id)
            .field("api_url", &self.api_url)
            .field("poll_timeout_secs", &self.poll_timeout_secs)
            .field("retry_delay_ms", &self.retry_delay_ms)
            .finish()
    }
}

impl BotConfig {
    pub fn new(bot_token: impl Into<String>, chat_id: impl Into<String>) -> Self {
        Self {
            bot_token: bot_token.into(),
            chat_id: chat_id.into(),
            api_url: DEFAULT_API_URL.to_string(),
            poll_timeout_secs: DEFAULT_POLL_TIMEOUT_SECS,
            retry_delay_ms: DEFAULT_RETRY_DELAY_MS,
        }
    }

    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into();
        self
    }

    pub fn with_poll_timeout_secs(mut self, secs: u64) -> Self {
        self.poll_timeout_secs = secs;
        self
    }

    pub fn with_retry_delay_ms(mut self, millis: u64) -> Self {
        self.retry_delay_ms = millis;
        self
    }

    /// Read configuration from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read configuration through `lookup`
    ///
    /// `TELEGRAM_BOT_TOKEN` and `TELEGRAM_CHAT_ID` are required.
    /// `TELEGRAM_API_URL`, `TELEGRAM_POLL_TIMEOUT_SECS` and
    /// `TELEGRAM_RETRY_DELAY_MS` are optional.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |name: &'static str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .ok_or(ConfigError::Missing(name))
        };
        let number = |name: &'static str, default: u64| match lookup(name) {
            None => Ok(default),
            Some(raw) => raw.trim().parse::<u64>().map_err(|_| ConfigError::Invalid { name, value: raw }),
        };

        let mut config = Self::new(required("TELEGRAM_BOT_TOKEN")?, required("TELEGRAM_CHAT_ID")?);
        if let Some(api_url) = lookup("TELEGRAM_API_URL") {
            config.api_url = api_url.trim_end_matches('/').to_string();
        }
        config.poll_timeout_secs = number("TELEGRAM_POLL_TIMEOUT_SECS", DEFAULT_POLL_TIMEOUT_SECS)?;
        config.retry_delay_ms = number("TELEGRAM_RETRY_DELAY_MS", DEFAULT_RETRY_DELAY_MS)?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if url::Url::parse(&self.api_url).is_err() {
            return Err(ConfigError::Invalid {
                name: "TELEGRAM_API_URL",
                value: self.api_url.clone(),
            });
        }
        Ok(())
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_secs(self.poll_timeout_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    /// HTTP deadline for one request; long polls get headroom past the poll timeout
    pub fn request_timeout(&self) -> Duration {
        self.poll_timeout() + Duration::from_secs(10)
    }
}
