//! Binance spot account integration
//!
//! - `auth`: HMAC-SHA256 request signing
//! - `rest`: account, order, trade and price endpoints
//! - `connection`: websocket connector and restart policy
//! - `user_stream`: listen-key driven fill notifications

pub mod auth;
pub mod connection;
pub mod rest;
pub mod user_stream;

pub use auth::{sign, Credentials, QueryParams, SignedRequest, Signer, API_KEY_HEADER};
pub use connection::{ReconnectPolicy, WsConnector};
pub use rest::{AccountClient, BinanceConfig, DEFAULT_HISTORY_LIMIT};
pub use user_stream::{parse_user_event, stream_url, StreamSession, StreamState};

/// User stream session over the live client and websocket connector
pub type BinanceStreamSession = StreamSession<AccountClient, WsConnector>;
