//! Long-running bot tasks: fill forwarding and update polling

use crate::commands::{Command, CommandHandler};
use crate::error::{BotError, Result};
use crate::report;
use crate::telegram::{Notifier, TelegramClient};
use tradepulse_core::log_error;
use tradepulse_exchanges::{FillEvent, HttpTransport};

use tracing::{debug, info, warn};

/// Forward every fill to `notifier` until the stream drops its sender
pub async fn forward_fills<N: Notifier>(fills: flume::Receiver<FillEvent>, notifier: &N) -> usize {
    let mut forwarded = 0;
    while let Ok(fill) = fills.recv_async().await {
        notifier.notify(&report::fill_notification(&fill)).await;
        forwarded += 1;
    }
    debug!("Fill forwarding stopped after {} notifications", forwarded);
    forwarded
}

/// `getUpdates` long-poll loop answering commands
pub struct Poller<'a, T: HttpTransport, A: HttpTransport> {
    telegram: &'a TelegramClient<T>,
    handler: &'a CommandHandler<A>,
    offset: Option<i64>,
}

impl<'a, T: HttpTransport, A: HttpTransport> Poller<'a, T, A> {
    pub fn new(telegram: &'a TelegramClient<T>, handler: &'a CommandHandler<A>) -> Self {
        Self {
            telegram,
            handler,
            offset: None,
        }
    }

    /// Next `getUpdates` offset
    pub fn offset(&self) -> Option<i64> {
        self.offset
    }

    /// Poll forever. Returns only when the bot token is rejected.
    pub async fn run(&mut self) -> Result<()> {
        info!("📱 Bot will respond to commands in Telegram");
        loop {
            match self.poll_once().await {
                Ok(_) => {}
                Err(BotError::Unauthorized) => return Err(BotError::Unauthorized),
                Err(e) => {
                    log_error!("get_updates", e);
                    let delay = self.telegram.config().retry_delay();
                    warn!("Polling again in {:?}", delay);
                    monoio::time::sleep(delay).await;
                }
            }
        }
    }

    /// One `getUpdates` round; returns the number of commands answered
    ///
    /// Only the configured chat is answered. Other chats are skipped but
    /// still acknowledged.
    pub async fn poll_once(&mut self) -> Result<usize> {
        let timeout = self.telegram.config().poll_timeout_secs;
        let updates = self.telegram.get_updates(self.offset, timeout).await?;

        let mut answered = 0;
        for update in updates {
            // Acknowledge before answering so a failing reply is not replayed
            self.offset = Some(update.update_id + 1);

            let Some(message) = update.message else { continue };
            let chat_id = message.chat.id.to_string();
            if chat_id != self.telegram.config().chat_id {
                warn!("Ignoring update {} from unauthorized chat {}", update.update_id, chat_id);
                continue;
            }
            let Some(command) = message.text.as_deref().and_then(Command::parse) else {
                continue;
            };

            let reply = self.handler.handle(&command).await;
            if let Err(e) = self.telegram.send_message(&chat_id, &reply).await {
                log_error!("send_reply", e);
                if e == BotError::Unauthorized {
                    return Err(e);
                }
                continue;
            }
            answered += 1;
        }
        Ok(answered)
    }
}
