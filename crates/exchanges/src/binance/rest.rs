//! Binance account REST client
//!
//! - Signed calls go through `Signer` and carry `X-MBX-APIKEY`
//! - Every failure is logged with the operation name and returned as is
//! - The transport is a trait so tests can run without a network

use crate::binance::auth::{Credentials, QueryParams, Signer, API_KEY_HEADER};
use crate::errors::{ExchangeError, Result};
use crate::http::{HttpMethod, HttpRequest, MonoioHttpsClient};
use crate::traits::{HttpTransport, ListenKeyIssuer};
use crate::types::{AccountSnapshot, Balance, ListenKey, ListenKeyResponse, MarketPrice, Order, Trade};
use tradepulse_core::{log_error, timestamp_ms, PerfTimer};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;
use tracing::{debug, error, info};
use url::Url;

pub const ACCOUNT_PATH: &str = "/api/v3/account";
pub const OPEN_ORDERS_PATH: &str = "/api/v3/openOrders";
pub const MY_TRADES_PATH: &str = "/api/v3/myTrades";
pub const TICKER_PRICE_PATH: &str = "/api/v3/ticker/price";
pub const USER_DATA_STREAM_PATH: &str = "/api/v3/userDataStream";

/// Trades returned by `order_history` when no limit is given
pub const DEFAULT_HISTORY_LIMIT: u32 = 10;

/// Binance exchange configuration
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BinanceConfig {
    pub api_key: String,
    pub api_secret: String,
    pub base_url: String,
    pub ws_url: String,
    pub testnet: bool,
    pub timeout_ms: u64,
}

impl Default for BinanceConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            api_secret: String::new(),
            base_url: "https://api.binance.com".to_string(),
            ws_url: "wss://stream.binance.com:9443".to_string(),
            testnet: false,
            timeout_ms: 10_000,
        }
    }
}

impl std::fmt::Debug for BinanceConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BinanceConfig")
            .field("api_key_set", &!self.api_key.is_empty())
            .field("api_secret_set", &!self.api_secret.is_empty())
            .field("base_url", &self.base_url)
            .field("ws_url", &self.ws_url)
            .field("testnet", &self.testnet)
            .field("timeout_ms", &self.timeout_ms)
            .finish()
    }
}

impl BinanceConfig {
    pub fn testnet() -> Self {
        Self {
            base_url: "https://testnet.binance.vision".to_string(),
            ws_url: "wss://testnet.binance.vision".to_string(),
            testnet: true,
            ..Default::default()
        }
    }

    pub fn with_credentials(mut self, api_key: String, api_secret: String) -> Self {
        self.api_key = api_key;
        self.api_secret = api_secret;
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    pub fn with_urls(mut self, base_url: impl Into<String>, ws_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self.ws_url = ws_url.into();
        self
    }

    /// Read configuration from the process environment
    ///
    /// Missing credentials are not an error here; `credentials()` reports
    /// them as absent. Malformed optional values are.
    pub fn from_env() -> Result<Self> {
        let testnet = match std::env::var("BINANCE_TESTNET") {
            Ok(raw) => parse_flag("BINANCE_TESTNET", &raw)?,
            Err(_) => false,
        };
        let mut config = if testnet { Self::testnet() } else { Self::default() };

        config.api_key = std::env::var("BINANCE_API_KEY").unwrap_or_default();
        config.api_secret = std::env::var("BINANCE_API_SECRET").unwrap_or_default();

        if let Ok(base_url) = std::env::var("BINANCE_BASE_URL") {
            config.base_url = base_url;
        }
        if let Ok(ws_url) = std::env::var("BINANCE_WS_URL") {
            config.ws_url = ws_url;
        }
        if let Ok(raw) = std::env::var("HTTP_TIMEOUT_MS") {
            config.timeout_ms = raw.trim().parse().map_err(|_| {
                ExchangeError::ConfigurationError(format!("HTTP_TIMEOUT_MS is not a number: {raw:?}"))
            })?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        Url::parse(&self.base_url)
            .map_err(|e| ExchangeError::ConfigurationError(format!("base_url {:?}: {e}", self.base_url)))?;
        Url::parse(&self.ws_url)
            .map_err(|e| ExchangeError::ConfigurationError(format!("ws_url {:?}: {e}", self.ws_url)))?;
        if self.timeout_ms == 0 {
            return Err(ExchangeError::ConfigurationError("timeout_ms must be positive".to_string()));
        }
        Ok(())
    }

    /// Credentials when both halves are present
    pub fn credentials(&self) -> Option<Credentials> {
        Credentials::new(self.api_key.clone(), self.api_secret.clone()).ok()
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

pub(crate) fn parse_flag(name: &str, raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(ExchangeError::ConfigurationError(format!("{name} is not a boolean: {raw:?}"))),
    }
}

/// Authenticated Binance account client
pub struct AccountClient<T: HttpTransport = MonoioHttpsClient> {
    config: BinanceConfig,
    signer: Option<Signer>,
    transport: T,
}

impl AccountClient<MonoioHttpsClient> {
    /// Client over the monoio HTTPS transport
    pub fn new(config: BinanceConfig) -> Result<Self> {
        let transport = MonoioHttpsClient::with_timeout(config.timeout())?;
        Self::with_transport(config, transport)
    }
}

impl<T: HttpTransport> AccountClient<T> {
    pub fn with_transport(config: BinanceConfig, transport: T) -> Result<Self> {
        config.validate()?;

        let signer = config.credentials().map(Signer::new);
        if signer.is_none() {
            error!("Binance API credentials are missing. Please check your environment variables.");
        }

        info!("🔗 Binance account client created");
        info!("   Base URL: {}", config.base_url);

        Ok(Self {
            config,
            signer,
            transport,
        })
    }

    pub fn config(&self) -> &BinanceConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn has_credentials(&self) -> bool {
        self.signer.is_some()
    }

    /// Signed `GET /api/v3/account`
    pub async fn account_snapshot(&self) -> Result<AccountSnapshot> {
        logged(
            "account_snapshot",
            self.signed_get("account_snapshot", ACCOUNT_PATH, QueryParams::new()).await,
        )
    }

    /// Balances with a non-zero free or locked amount, venue order kept
    pub async fn wallet_balance(&self) -> Result<Vec<Balance>> {
        let snapshot = logged("wallet_balance", self.account_snapshot().await)?;
        let balances: Vec<Balance> = snapshot
            .balances
            .into_iter()
            .filter(Balance::is_active)
            .collect();
        debug!("💰 {} active balances", balances.len());
        Ok(balances)
    }

    /// Signed `GET /api/v3/openOrders`, optionally for one symbol
    pub async fn open_orders(&self, symbol: Option<&str>) -> Result<Vec<Order>> {
        let mut params = QueryParams::new();
        params.push_opt("symbol", symbol);
        logged("open_orders", self.signed_get("open_orders", OPEN_ORDERS_PATH, params).await)
    }

    /// Signed `GET /api/v3/myTrades`; `limit` defaults to 10
    pub async fn order_history(&self, symbol: Option<&str>, limit: Option<u32>) -> Result<Vec<Trade>> {
        let mut params = QueryParams::new();
        params.push("limit", limit.unwrap_or(DEFAULT_HISTORY_LIMIT));
        params.push_opt("symbol", symbol);
        logged("order_history", self.signed_get("order_history", MY_TRADES_PATH, params).await)
    }

    /// Latest prices for `symbols`, one unsigned request for the whole set
    pub async fn current_prices(&self, symbols: &HashSet<String>) -> Result<Vec<MarketPrice>> {
        if symbols.is_empty() {
            return Ok(Vec::new());
        }

        let prices = logged("current_prices", self.all_prices().await)?;
        Ok(prices
            .into_iter()
            .filter(|p| symbols.contains(&p.symbol))
            .collect())
    }

    /// `POST /api/v3/userDataStream`; API key header only, no signature
    pub async fn create_listen_key(&self) -> Result<ListenKey> {
        let key = logged("create_listen_key", self.post_listen_key().await)?;
        info!("🔑 Listen key created for user data stream");
        Ok(key)
    }

    async fn all_prices(&self) -> Result<Vec<MarketPrice>> {
        let request = HttpRequest::get(self.endpoint(TICKER_PRICE_PATH)?);
        let body = self.execute("current_prices", request).await?;
        Ok(serde_json::from_str(&body)?)
    }

    async fn post_listen_key(&self) -> Result<ListenKey> {
        let signer = self.signer()?;
        let request = HttpRequest::post(self.endpoint(USER_DATA_STREAM_PATH)?)
            .with_header(API_KEY_HEADER, signer.api_key());
        let body = self.execute("create_listen_key", request).await?;
        let response: ListenKeyResponse = serde_json::from_str(&body)?;
        Ok(ListenKey::new(response.listen_key))
    }

    fn signer(&self) -> Result<&Signer> {
        self.signer
            .as_ref()
            .ok_or_else(|| ExchangeError::MissingCredentials("BINANCE_API_KEY/BINANCE_API_SECRET".to_string()))
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        let mut url = Url::parse(&self.config.base_url)?;
        url.set_path(path);
        Ok(url)
    }

    async fn signed_get<D: DeserializeOwned>(
        &self,
        operation: &str,
        path: &str,
        params: QueryParams,
    ) -> Result<D> {
        let signer = self.signer()?;
        let signed = signer.sign_request(HttpMethod::Get, path, params, timestamp_ms())?;
        let request = signed.into_http_request(&self.config.base_url, signer.api_key())?;
        let body = self.execute(operation, request).await?;
        Ok(serde_json::from_str(&body)?)
    }

    async fn execute(&self, operation: &str, request: HttpRequest) -> Result<String> {
        let _timer = PerfTimer::start(format!("binance_{operation}"));
        debug!("📡 {} {}", request.method.as_str(), request.url.path());

        let response = self.transport.execute(request).await?;
        if !response.is_success() {
            return Err(ExchangeError::from_status(response.status, response.body));
        }
        Ok(response.body)
    }
}

fn logged<T>(operation: &str, result: Result<T>) -> Result<T> {
    if let Err(e) = &result {
        log_error!(operation, e);
    }
    result
}

#[async_trait(?Send)]
impl<T: HttpTransport> ListenKeyIssuer for AccountClient<T> {
    async fn issue_listen_key(&self) -> Result<ListenKey> {
        self.create_listen_key().await
    }

    fn has_credentials(&self) -> bool {
        AccountClient::has_credentials(self)
    }
}
