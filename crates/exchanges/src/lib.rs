//! # TradePulse Exchange Integration
//!
//! Binance spot account access for the TradePulse notifier.
//!
//! ## Architecture
//!
//! - **monoio-based HTTP client** - single-threaded async, rustls TLS, per-request timeout
//! - **Signed REST client** - account snapshot, balances, open orders, trade history, prices
//! - **User data stream** - listen-key session with automatic restart and fill fan-out
//! - **P&L engine** - open orders joined with live prices, exact decimal arithmetic

pub mod binance;
pub mod errors;
pub mod http;
pub mod pnl;
pub mod traits;
pub mod types;
pub mod websocket;

// Re-export main types
pub use binance::{AccountClient, BinanceConfig, ReconnectPolicy, StreamSession, StreamState, WsConnector};
pub use errors::{ExchangeError, Result};
pub use http::{HttpMethod, HttpRequest, HttpResponse, MonoioHttpsClient};
pub use pnl::{OrderPnl, OrderWithPnL, PnlEngine, PnlSummary};
pub use traits::{HttpTransport, ListenKeyIssuer, StreamConnection, StreamConnector};
pub use types::*;
pub use websocket::MonoioWebSocket;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::binance::{AccountClient, BinanceConfig, ReconnectPolicy, StreamSession, StreamState, WsConnector};
    pub use crate::errors::{ExchangeError, Result};
    pub use crate::pnl::{OrderPnl, OrderWithPnL, PnlEngine, PnlSummary};
    pub use crate::traits::{HttpTransport, ListenKeyIssuer, StreamConnection, StreamConnector};
    pub use crate::types::*;
    pub use tradepulse_core::prelude::*;
}
