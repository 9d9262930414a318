//! Bot error types

use thiserror::Error;
use tradepulse_exchanges::ExchangeError;

/// Result type for bot operations
pub type Result<T> = std::result::Result<T, BotError>;

/// Configuration faults found while reading the environment
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {name}: {value:?}")]
    Invalid { name: &'static str, value: String },
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum BotError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The bot token was refused; polling cannot continue
    #[error("Telegram rejected the bot token")]
    Unauthorized,

    #[error("Telegram API error: {0}")]
    Api(String),

    #[error(transparent)]
    Exchange(#[from] ExchangeError),
}

impl From<serde_json::Error> for BotError {
    fn from(err: serde_json::Error) -> Self {
        BotError::Exchange(ExchangeError::from(err))
    }
}

impl From<url::ParseError> for BotError {
    fn from(err: url::ParseError) -> Self {
        BotError::Exchange(ExchangeError::from(err))
    }
}
