//! Binance user data stream session
//!
//! Issues a listen key, connects to `{ws_url}/ws/{listenKey}` and turns
//! `executionReport` fills into `FillEvent`s for every subscriber. Transport
//! failures restart the whole cycle (new key, new connection) after the
//! policy delay. `close()` wins over any pending restart.

use crate::binance::connection::ReconnectPolicy;
use crate::errors::{ExchangeError, Result};
use crate::traits::{ListenKeyIssuer, StreamConnection, StreamConnector};
use crate::types::{FillEvent, ListenKey, OrderSide};
use crate::websocket::redact_path;
use tradepulse_core::{log_error, log_fill, Fixed};

use monoio::task::JoinHandle;
use serde::Deserialize;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use url::Url;

/// Observable session state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Idle,
    IssuingCredential,
    Connected,
    /// Connection lost or never established; a restart may be pending
    Disconnected,
    Closed,
}

impl fmt::Display for StreamState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StreamState::Idle => "idle",
            StreamState::IssuingCredential => "issuing-credential",
            StreamState::Connected => "connected",
            StreamState::Disconnected => "disconnected",
            StreamState::Closed => "closed",
        };
        f.write_str(name)
    }
}

#[derive(Deserialize)]
struct ExecutionReport {
    #[serde(rename = "s")]
    symbol: String,
    #[serde(rename = "S")]
    side: String,
    #[serde(rename = "X")]
    status: String,
    #[serde(rename = "q")]
    quantity: String,
    #[serde(rename = "p")]
    price: String,
}

/// Decode one user stream payload
///
/// `Ok(Some)` for a fully filled order, `Ok(None)` for anything else the
/// venue sends, `MalformedMessage` when the payload cannot be read.
pub fn parse_user_event(text: &str) -> Result<Option<FillEvent>> {
    let value: serde_json::Value = serde_json::from_str(text)
        .map_err(|e| ExchangeError::MalformedMessage(format!("invalid JSON: {e}")))?;

    let event_type = value.get("e").and_then(|e| e.as_str()).unwrap_or_default();
    if event_type != "executionReport" {
        debug!("Ignoring user stream event {:?}", event_type);
        return Ok(None);
    }

    let report: ExecutionReport = serde_json::from_value(value)
        .map_err(|e| ExchangeError::MalformedMessage(format!("executionReport: {e}")))?;
    if report.status != "FILLED" {
        debug!("executionReport {} {} ({})", report.side, report.symbol, report.status);
        return Ok(None);
    }

    let side = OrderSide::parse(&report.side)
        .ok_or_else(|| ExchangeError::MalformedMessage(format!("unknown side {:?}", report.side)))?;
    let quantity = Fixed::from_str_exact(&report.quantity)
        .map_err(|e| ExchangeError::MalformedMessage(format!("quantity: {e}")))?;
    let price = Fixed::from_str_exact(&report.price)
        .map_err(|e| ExchangeError::MalformedMessage(format!("price: {e}")))?;

    Ok(Some(FillEvent {
        symbol: report.symbol,
        side,
        quantity,
        price,
    }))
}

/// `{ws_url}/ws/{listenKey}`
pub fn stream_url(ws_url: &str, key: &ListenKey) -> Result<Url> {
    Ok(Url::parse(&format!("{}/ws/{}", ws_url.trim_end_matches('/'), key.as_str()))?)
}

/// State shared between the session handle and its task
struct Shared {
    state: Cell<StreamState>,
    closed: Cell<bool>,
    /// Cleared when the session task returns on its own
    running: Cell<bool>,
    subscribers: RefCell<Vec<flume::Sender<FillEvent>>>,
}

impl Shared {
    fn set_state(&self, state: StreamState) {
        // Closed is terminal
        if self.state.get() != StreamState::Closed && self.state.get() != state {
            debug!("user stream: {} -> {}", self.state.get(), state);
            self.state.set(state);
        }
    }

    fn publish(&self, event: &FillEvent) {
        self.subscribers
            .borrow_mut()
            .retain(|tx| tx.send(event.clone()).is_ok());
    }
}

/// Long-lived user data stream with automatic restart
pub struct StreamSession<I, C>
where
    I: ListenKeyIssuer + 'static,
    C: StreamConnector + 'static,
{
    issuer: Rc<I>,
    connector: Rc<C>,
    ws_url: String,
    policy: ReconnectPolicy,
    shared: Rc<Shared>,
    shutdown_tx: flume::Sender<()>,
    shutdown_rx: flume::Receiver<()>,
    task: RefCell<Option<JoinHandle<()>>>,
}

impl<I, C> StreamSession<I, C>
where
    I: ListenKeyIssuer + 'static,
    C: StreamConnector + 'static,
{
    pub fn new(issuer: Rc<I>, connector: C, ws_url: impl Into<String>, policy: ReconnectPolicy) -> Self {
        let (shutdown_tx, shutdown_rx) = flume::bounded(1);
        Self {
            issuer,
            connector: Rc::new(connector),
            ws_url: ws_url.into(),
            policy,
            shared: Rc::new(Shared {
                state: Cell::new(StreamState::Idle),
                closed: Cell::new(false),
                running: Cell::new(false),
                subscribers: RefCell::new(Vec::new()),
            }),
            shutdown_tx,
            shutdown_rx,
            task: RefCell::new(None),
        }
    }

    pub fn state(&self) -> StreamState {
        self.shared.state.get()
    }

    pub fn policy(&self) -> &ReconnectPolicy {
        &self.policy
    }

    /// New receiver for every fill seen from now on
    pub fn subscribe(&self) -> flume::Receiver<FillEvent> {
        let (tx, rx) = flume::unbounded();
        self.shared.subscribers.borrow_mut().push(tx);
        rx
    }

    /// Spawn the session task on the current monoio runtime
    ///
    /// Without credentials this fails with `MissingCredentials` and the
    /// session stays `Idle`. Starting a running session is a no-op; a
    /// session whose task gave up is started afresh.
    pub fn start(&self) -> Result<()> {
        if self.shared.closed.get() {
            return Err(ExchangeError::ConfigurationError(
                "user stream session already closed".to_string(),
            ));
        }
        if self.shared.running.get() {
            return Ok(());
        }
        if !self.issuer.has_credentials() {
            let err = ExchangeError::MissingCredentials(
                "user data stream needs BINANCE_API_KEY and BINANCE_API_SECRET".to_string(),
            );
            log_error!("start_user_stream", err);
            return Err(err);
        }

        let driver = Driver {
            issuer: Rc::clone(&self.issuer),
            connector: Rc::clone(&self.connector),
            ws_url: self.ws_url.clone(),
            policy: self.policy.clone(),
            shared: Rc::clone(&self.shared),
            shutdown: self.shutdown_rx.clone(),
        };
        info!("🚀 Starting user data stream");
        self.shared.running.set(true);
        *self.task.borrow_mut() = Some(monoio::spawn(driver.run()));
        Ok(())
    }

    /// Stop the session and wait for its task to finish
    ///
    /// Cancels any pending restart. Idempotent.
    pub async fn close(&self) {
        if self.shared.closed.replace(true) {
            return;
        }
        // A full channel already carries the signal.
        let _ = self.shutdown_tx.try_send(());

        let task = self.task.borrow_mut().take();
        if let Some(task) = task {
            task.await;
        }
        self.shared.state.set(StreamState::Closed);
        info!("🔒 User data stream closed");
    }
}

enum CycleEnd {
    Shutdown,
    CredentialFailed,
    Dropped { was_connected: bool },
}

struct Driver<I, C> {
    issuer: Rc<I>,
    connector: Rc<C>,
    ws_url: String,
    policy: ReconnectPolicy,
    shared: Rc<Shared>,
    shutdown: flume::Receiver<()>,
}

impl<I, C> Driver<I, C>
where
    I: ListenKeyIssuer + 'static,
    C: StreamConnector + 'static,
{
    async fn run(self) {
        self.drive().await;
        self.shared.running.set(false);
    }

    async fn drive(&self) {
        let mut failures = 0u32;

        loop {
            if self.shared.closed.get() {
                return;
            }

            match self.cycle().await {
                CycleEnd::Shutdown => return,
                CycleEnd::CredentialFailed if !self.policy.retry_credential_failures => {
                    error!("Failed to initialize user stream; not retrying");
                    self.shared.set_state(StreamState::Idle);
                    return;
                }
                CycleEnd::CredentialFailed => {}
                CycleEnd::Dropped { was_connected } => {
                    if was_connected {
                        failures = 0;
                    }
                }
            }

            failures += 1;
            if !self.policy.allows(failures) {
                error!("❌ User stream gave up after {} consecutive failures", failures - 1);
                self.shared.set_state(StreamState::Disconnected);
                return;
            }

            self.shared.set_state(StreamState::Disconnected);
            let delay = self.policy.delay_for(failures);
            warn!("WebSocket closed. Reconnecting in {:?} (attempt {})", delay, failures);
            if !self.sleep_unless_shutdown(delay).await {
                return;
            }
        }
    }

    /// One issue-connect-read cycle
    async fn cycle(&self) -> CycleEnd {
        self.shared.set_state(StreamState::IssuingCredential);

        let issued = monoio::select! {
            _ = self.shutdown.recv_async() => None,
            key = self.issuer.issue_listen_key() => Some(key),
        };
        let key = match issued {
            None => return CycleEnd::Shutdown,
            Some(Ok(key)) => key,
            Some(Err(e)) => {
                log_error!("issue_listen_key", e);
                return CycleEnd::CredentialFailed;
            }
        };
        debug!("Received listen key {:?}", key);

        let url = match stream_url(&self.ws_url, &key) {
            Ok(url) => url,
            Err(e) => {
                log_error!("stream_url", e);
                return CycleEnd::Dropped { was_connected: false };
            }
        };

        let connected = monoio::select! {
            _ = self.shutdown.recv_async() => None,
            conn = self.connector.connect(&url) => Some(conn),
        };
        let mut conn = match connected {
            None => return CycleEnd::Shutdown,
            Some(Ok(conn)) => conn,
            Some(Err(e)) => {
                log_error!("connect_user_stream", e);
                return CycleEnd::Dropped { was_connected: false };
            }
        };

        self.shared.set_state(StreamState::Connected);
        info!("WebSocket connection opened ({})", redact_path(&url));

        loop {
            let next = monoio::select! {
                _ = self.shutdown.recv_async() => None,
                message = conn.next_message() => Some(message),
            };
            match next {
                None => {
                    if let Err(e) = conn.close().await {
                        debug!("Close during shutdown failed: {}", e);
                    }
                    return CycleEnd::Shutdown;
                }
                Some(Ok(Some(text))) => self.handle_message(&text),
                // The frame was consumed; the connection is still usable.
                Some(Err(ExchangeError::MalformedMessage(reason))) => {
                    warn!("Skipping malformed user stream message: {}", reason);
                }
                Some(Ok(None)) => {
                    warn!("User stream closed by remote");
                    return CycleEnd::Dropped { was_connected: true };
                }
                Some(Err(e)) => {
                    log_error!("user_stream_read", e);
                    if let Err(e) = conn.close().await {
                        debug!("Close after error failed: {}", e);
                    }
                    return CycleEnd::Dropped { was_connected: true };
                }
            }
        }
    }

    fn handle_message(&self, text: &str) {
        match parse_user_event(text) {
            Ok(Some(fill)) => {
                log_fill!(fill.side, fill.symbol, fill.quantity, fill.price);
                self.shared.publish(&fill);
            }
            Ok(None) => {}
            Err(e) => {
                log_error!("parse_user_event", e);
            }
        }
    }

    /// False when shutdown arrived first
    async fn sleep_unless_shutdown(&self, delay: Duration) -> bool {
        monoio::select! {
            _ = self.shutdown.recv_async() => false,
            _ = monoio::time::sleep(delay) => !self.shared.closed.get(),
        }
    }
}
