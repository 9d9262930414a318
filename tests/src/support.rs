//! In-memory stand-ins for the network seams
//!
//! - `FakeTransport`: scripted HTTP responses keyed by request path
//! - `FakeIssuer`: listen keys on demand, optionally failing
//! - `FakeConnector`: scripted stream connections

use async_trait::async_trait;
use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;
use std::time::Duration;
use tradepulse_exchanges::prelude::*;
use tradepulse_exchanges::{HttpRequest, HttpResponse};
use url::Url;

pub const TEST_API_KEY: &str = "test-api-key";
pub const TEST_API_SECRET: &str = "test-api-secret";

/// Binance config with test credentials pointed at a fake host
pub fn test_config() -> BinanceConfig {
    BinanceConfig::default()
        .with_credentials(TEST_API_KEY.to_string(), TEST_API_SECRET.to_string())
        .with_urls("https://api.binance.test", "wss://stream.binance.test:9443")
}

pub fn test_client(transport: FakeTransport) -> AccountClient<FakeTransport> {
    AccountClient::with_transport(test_config(), transport).expect("valid test config")
}

/// HTTP transport answering from per-path queues
///
/// The last response queued for a path is repeated once the queue drains.
/// Unknown paths fail with a network error.
#[derive(Default)]
pub struct FakeTransport {
    routes: RefCell<HashMap<String, VecDeque<HttpResponse>>>,
    requests: RefCell<Vec<HttpRequest>>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(self, path: &str, status: u16, body: &str) -> Self {
        self.routes
            .borrow_mut()
            .entry(path.to_string())
            .or_default()
            .push_back(HttpResponse::new(status, body));
        self
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.borrow().clone()
    }

    pub fn count(&self, path: &str) -> usize {
        self.requests.borrow().iter().filter(|r| r.url.path() == path).count()
    }

    pub fn last(&self, path: &str) -> Option<HttpRequest> {
        self.requests.borrow().iter().rev().find(|r| r.url.path() == path).cloned()
    }
}

#[async_trait(?Send)]
impl HttpTransport for FakeTransport {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse> {
        let path = request.url.path().to_string();
        self.requests.borrow_mut().push(request);

        let mut routes = self.routes.borrow_mut();
        let queue = routes
            .get_mut(&path)
            .ok_or_else(|| ExchangeError::NetworkError(format!("no route for {path}")))?;
        let response = if queue.len() > 1 { queue.pop_front() } else { queue.front().cloned() };
        response.ok_or_else(|| ExchangeError::NetworkError(format!("no response for {path}")))
    }
}

/// Listen key issuer with scripted failures
pub struct FakeIssuer {
    credentials: bool,
    failures: RefCell<VecDeque<ExchangeError>>,
    calls: Cell<usize>,
}

impl FakeIssuer {
    pub fn new() -> Self {
        Self {
            credentials: true,
            failures: RefCell::new(VecDeque::new()),
            calls: Cell::new(0),
        }
    }

    pub fn without_credentials() -> Self {
        Self {
            credentials: false,
            ..Self::new()
        }
    }

    /// Fail the next issuance with `error`
    pub fn fail_next(self, error: ExchangeError) -> Self {
        self.failures.borrow_mut().push_back(error);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.get()
    }
}

impl Default for FakeIssuer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait(?Send)]
impl ListenKeyIssuer for FakeIssuer {
    async fn issue_listen_key(&self) -> Result<ListenKey> {
        let n = self.calls.get() + 1;
        self.calls.set(n);
        if let Some(error) = self.failures.borrow_mut().pop_front() {
            return Err(error);
        }
        Ok(ListenKey::new(format!("listen-key-{n}")))
    }

    fn has_credentials(&self) -> bool {
        self.credentials
    }
}

/// What a scripted connection does, in order
#[derive(Debug, Clone)]
pub enum Step {
    Message(String),
    Wait(Duration),
    /// Remote close
    Drop,
    Fail(ExchangeError),
}

/// Script for one `connect` call
#[derive(Debug, Clone)]
pub enum Script {
    Refuse(ExchangeError),
    /// Run the steps, then stay open until closed
    Open(Vec<Step>),
}

#[derive(Default)]
struct ConnectorState {
    scripts: RefCell<VecDeque<Script>>,
    refuse_when_drained: Cell<bool>,
    urls: RefCell<Vec<Url>>,
    closes: Cell<usize>,
}

/// Stream connector; clones share one script and one log
#[derive(Clone, Default)]
pub struct FakeConnector {
    state: Rc<ConnectorState>,
}

impl FakeConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every connect attempt fails once the scripts run out
    pub fn refusing() -> Self {
        let connector = Self::default();
        connector.state.refuse_when_drained.set(true);
        connector
    }

    pub fn then(self, script: Script) -> Self {
        self.state.scripts.borrow_mut().push_back(script);
        self
    }

    pub fn connects(&self) -> usize {
        self.state.urls.borrow().len()
    }

    pub fn urls(&self) -> Vec<Url> {
        self.state.urls.borrow().clone()
    }

    pub fn closes(&self) -> usize {
        self.state.closes.get()
    }
}

#[async_trait(?Send)]
impl StreamConnector for FakeConnector {
    type Connection = FakeConnection;

    async fn connect(&self, url: &Url) -> Result<FakeConnection> {
        self.state.urls.borrow_mut().push(url.clone());

        let script = self.state.scripts.borrow_mut().pop_front();
        let steps = match script {
            Some(Script::Refuse(error)) => return Err(error),
            Some(Script::Open(steps)) => steps,
            None if self.state.refuse_when_drained.get() => {
                return Err(ExchangeError::ConnectionFailed("refused".to_string()));
            }
            None => Vec::new(),
        };
        Ok(FakeConnection {
            steps: steps.into(),
            state: Rc::clone(&self.state),
        })
    }
}

pub struct FakeConnection {
    steps: VecDeque<Step>,
    state: Rc<ConnectorState>,
}

#[async_trait(?Send)]
impl StreamConnection for FakeConnection {
    async fn next_message(&mut self) -> Result<Option<String>> {
        loop {
            match self.steps.pop_front() {
                Some(Step::Message(text)) => return Ok(Some(text)),
                Some(Step::Wait(delay)) => monoio::time::sleep(delay).await,
                Some(Step::Drop) => return Ok(None),
                Some(Step::Fail(error)) => return Err(error),
                None => std::future::pending::<()>().await,
            }
        }
    }

    async fn close(&mut self) -> Result<()> {
        self.state.closes.set(self.state.closes.get() + 1);
        Ok(())
    }
}

/// `executionReport` text as the venue sends it
pub fn execution_report(symbol: &str, side: &str, status: &str, quantity: &str, price: &str) -> String {
    serde_json::json!({
        "e": "executionReport",
        "E": 1_499_405_658_658u64,
        "s": symbol,
        "c": "mUvoqJxFIILMdfAW5iGSOW",
        "S": side,
        "o": "LIMIT",
        "f": "GTC",
        "q": quantity,
        "p": price,
        "X": status,
        "x": "TRADE"
    })
    .to_string()
}

/// Open order JSON in the `/api/v3/openOrders` shape
pub fn open_order_json(symbol: &str, order_id: u64, side: &str, price: &str, qty: &str) -> serde_json::Value {
    serde_json::json!({
        "symbol": symbol,
        "orderId": order_id,
        "orderListId": -1,
        "clientOrderId": "myOrder1",
        "price": price,
        "origQty": qty,
        "executedQty": "0.0",
        "cummulativeQuoteQty": "0.0",
        "status": "NEW",
        "timeInForce": "GTC",
        "type": "LIMIT",
        "side": side,
        "stopPrice": "0.0",
        "icebergQty": "0.0",
        "time": 1_499_827_319_559u64,
        "updateTime": 1_499_827_319_559u64,
        "isWorking": true,
        "origQuoteOrderQty": "0.000000"
    })
}

/// Poll `condition` every few milliseconds until it holds or `deadline` passes
pub async fn eventually<F: Fn() -> bool>(deadline: Duration, condition: F) -> bool {
    let step = Duration::from_millis(5);
    let mut waited = Duration::ZERO;
    while waited < deadline {
        if condition() {
            return true;
        }
        monoio::time::sleep(step).await;
        waited += step;
    }
    condition()
}
