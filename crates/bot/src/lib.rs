//! # TradePulse Bot
//!
//! Telegram front end over the Binance account client.
//!
//! - `telegram`: Bot API client and the `Notifier` seam
//! - `commands`: `/balance`, `/orders`, `/pnl`, `/history` and friends
//! - `report`: message rendering
//! - `app`: fill forwarding and the polling loop

pub mod app;
pub mod commands;
pub mod config;
pub mod error;
pub mod report;
pub mod telegram;

pub use app::{forward_fills, Poller};
pub use commands::{Command, CommandHandler};
pub use config::BotConfig;
pub use error::{BotError, ConfigError, Result};
pub use telegram::{Notifier, TelegramClient, Update};
