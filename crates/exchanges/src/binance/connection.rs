//! User stream connection setup and reconnection policy

use crate::errors::{ExchangeError, Result};
use crate::traits::StreamConnector;
use crate::websocket::{redact_path, MonoioWebSocket};
use tradepulse_core::PerfTimer;

use async_trait::async_trait;
use std::time::Duration;
use tracing::info;
use url::Url;

/// Reconnection configuration
///
/// Defaults restart every 5 seconds, forever.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectPolicy {
    /// Delay before the first restart after a failure
    pub delay: Duration,
    /// Growth per consecutive failure; 1.0 keeps the delay fixed
    pub backoff_multiplier: f64,
    pub max_delay: Duration,
    /// Consecutive failed cycles tolerated. `None` is unbounded.
    pub max_attempts: Option<u32>,
    /// Treat listen-key issuance failures like disconnects
    pub retry_credential_failures: bool,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            delay: Duration::from_secs(5),
            backoff_multiplier: 1.0,
            max_delay: Duration::from_secs(60),
            max_attempts: None,
            retry_credential_failures: true,
        }
    }
}

impl ReconnectPolicy {
    pub fn fixed(delay: Duration) -> Self {
        Self {
            delay,
            ..Default::default()
        }
    }

    /// Default policy with `STREAM_RECONNECT_DELAY_MS` applied
    pub fn from_env() -> Result<Self> {
        let mut policy = Self::default();
        if let Ok(raw) = std::env::var("STREAM_RECONNECT_DELAY_MS") {
            let millis: u64 = raw.trim().parse().map_err(|_| {
                ExchangeError::ConfigurationError(format!(
                    "STREAM_RECONNECT_DELAY_MS is not a number: {raw:?}"
                ))
            })?;
            policy.delay = Duration::from_millis(millis);
        }
        Ok(policy)
    }

    pub fn with_backoff(mut self, multiplier: f64, max_delay: Duration) -> Self {
        self.backoff_multiplier = multiplier;
        self.max_delay = max_delay;
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    pub fn with_credential_retry(mut self, retry: bool) -> Self {
        self.retry_credential_failures = retry;
        self
    }

    /// Delay before restart number `attempt` (1-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        if self.backoff_multiplier <= 1.0 {
            return self.delay;
        }
        let exponent = attempt.saturating_sub(1).min(64) as i32;
        let millis = self.delay.as_millis() as f64 * self.backoff_multiplier.powi(exponent);
        let capped = millis.min(self.max_delay.as_millis() as f64).max(self.delay.as_millis() as f64);
        Duration::from_millis(capped as u64)
    }

    pub fn allows(&self, attempt: u32) -> bool {
        self.max_attempts.is_none_or(|max| attempt <= max)
    }
}

/// Opens `wss://` user stream connections with a connect deadline
#[derive(Debug, Clone)]
pub struct WsConnector {
    connect_timeout: Duration,
}

impl WsConnector {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

impl Default for WsConnector {
    fn default() -> Self {
        Self::new(Duration::from_secs(10))
    }
}

#[async_trait(?Send)]
impl StreamConnector for WsConnector {
    type Connection = MonoioWebSocket;

    async fn connect(&self, url: &Url) -> Result<MonoioWebSocket> {
        let timer = PerfTimer::start("user_stream_connect");
        let websocket = monoio::time::timeout(self.connect_timeout, MonoioWebSocket::connect(url))
            .await
            .map_err(|_| {
                ExchangeError::Timeout(format!(
                    "WebSocket connect to {} exceeded {:?}",
                    redact_path(url),
                    self.connect_timeout
                ))
            })??;
        info!("🔗 User stream connected ({}μs)", timer.elapsed_micros());
        Ok(websocket)
    }
}
