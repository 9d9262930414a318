//! Chat command parsing and dispatch

use crate::report;
use tradepulse_core::log_error;
use tradepulse_exchanges::{AccountClient, ExchangeError, HttpTransport, PnlEngine};

use std::rc::Rc;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    Balance,
    Orders,
    /// Optional symbol filter
    Pnl(Option<String>),
    History(Option<String>),
    Help,
    Unknown(String),
}

impl Command {
    /// Parse a chat message
    ///
    /// Commands are case-insensitive and may carry a `@botname` suffix.
    /// Symbol arguments are upper-cased. Blank text yields `None`.
    pub fn parse(text: &str) -> Option<Self> {
        let mut words = text.split_whitespace();
        let head = words.next()?;
        let name = head.split('@').next().unwrap_or(head).to_ascii_lowercase();
        let symbol = words.next().map(|s| s.to_ascii_uppercase());

        let command = match name.as_str() {
            "/start" => Command::Start,
            "/balance" => Command::Balance,
            "/orders" => Command::Orders,
            "/pnl" => Command::Pnl(symbol),
            "/history" => Command::History(symbol),
            "/help" => Command::Help,
            _ => Command::Unknown(text.trim().to_string()),
        };
        Some(command)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Command::Start => "start",
            Command::Balance => "balance",
            Command::Orders => "orders",
            Command::Pnl(_) => "pnl",
            Command::History(_) => "history",
            Command::Help => "help",
            Command::Unknown(_) => "unknown",
        }
    }
}

/// Answers commands from account data
pub struct CommandHandler<T: HttpTransport> {
    client: Rc<AccountClient<T>>,
}

impl<T: HttpTransport> CommandHandler<T> {
    pub fn new(client: Rc<AccountClient<T>>) -> Self {
        Self { client }
    }

    /// Reply text for `command`. Failures are logged and replaced by a
    /// failure text; this never errors.
    pub async fn handle(&self, command: &Command) -> String {
        info!("Handling /{} command", command.name());
        match self.reply(command).await {
            Ok(text) => text,
            Err(e) => {
                log_error!(format!("/{}", command.name()), e);
                failure_text(command).to_string()
            }
        }
    }

    async fn reply(&self, command: &Command) -> Result<String, ExchangeError> {
        let text = match command {
            Command::Start => report::START_TEXT.to_string(),
            Command::Help => report::HELP_TEXT.to_string(),
            Command::Unknown(_) => report::UNKNOWN_TEXT.to_string(),
            Command::Balance => report::balances(&self.client.wallet_balance().await?),
            Command::Orders => {
                let (orders, summary) = PnlEngine::new(&*self.client).report(None).await?;
                report::open_orders(&orders, &summary)
            }
            Command::Pnl(symbol) => {
                let (_, summary) = PnlEngine::new(&*self.client).report(symbol.as_deref()).await?;
                report::summary_text(&summary)
            }
            Command::History(None) => report::HISTORY_USAGE_TEXT.to_string(),
            Command::History(Some(symbol)) => {
                let trades = self.client.order_history(Some(symbol.as_str()), None).await?;
                report::trade_history(symbol, &trades)
            }
        };
        Ok(text)
    }
}

fn failure_text(command: &Command) -> &'static str {
    match command {
        Command::Balance => report::BALANCE_FAILURE_TEXT,
        Command::Orders => report::ORDERS_FAILURE_TEXT,
        _ => report::GENERIC_FAILURE_TEXT,
    }
}
