//! TradePulse: Binance account notifications over Telegram

use anyhow::Context;
use std::rc::Rc;
use tradepulse_bot::{forward_fills, BotConfig, CommandHandler, Poller, TelegramClient};
use tradepulse_core::prelude::*;
use tradepulse_exchanges::{AccountClient, BinanceConfig, ReconnectPolicy, StreamSession, WsConnector};
use tracing::{error, info};

fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    init_logging();

    info!("🚀 TradePulse is starting...");
    PulseRuntime::new().block_on(run())?
}

async fn run() -> anyhow::Result<()> {
    let binance = BinanceConfig::from_env().context("reading Binance configuration")?;
    let bot = BotConfig::from_env().context("reading Telegram configuration")?;
    let policy = ReconnectPolicy::from_env().context("reading stream reconnect policy")?;
    info!("{:?}", binance);
    info!("{:?}", bot);

    let client = Rc::new(AccountClient::new(binance.clone())?);
    let telegram = Rc::new(TelegramClient::new(bot)?);

    let session = StreamSession::new(Rc::clone(&client), WsConnector::default(), binance.ws_url.clone(), policy);
    let fills = session.subscribe();
    match session.start() {
        Ok(()) => {
            let notifier = Rc::clone(&telegram);
            monoio::spawn(async move {
                forward_fills(fills, &*notifier).await;
            });
        }
        // Commands still work without the stream; account calls will report the same fault.
        Err(e) => error!("User data stream not started: {}", e),
    }

    let handler = CommandHandler::new(Rc::clone(&client));
    let mut poller = Poller::new(&*telegram, &handler);
    info!("✅ Bot is running");
    let outcome = poller.run().await;

    session.close().await;
    outcome.context("Telegram polling stopped")
}
