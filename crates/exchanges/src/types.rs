//! Account, order and stream types
//!
//! Amounts stay as the venue's decimal strings on the wire types and are
//! parsed into `Fixed` where they are used, so one bad amount never fails a
//! whole payload.

use serde::{Deserialize, Serialize};
use std::fmt;
use tradepulse_core::Fixed;

/// Order side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "BUY" => Some(OrderSide::Buy),
            "SELL" => Some(OrderSide::Sell),
            _ => None,
        }
    }
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderSide::Buy => write!(f, "BUY"),
            OrderSide::Sell => write!(f, "SELL"),
        }
    }
}

/// Order status. Values the venue adds later land in `Unknown`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum OrderStatus {
    New,
    PartiallyFilled,
    Filled,
    Canceled,
    PendingCancel,
    Rejected,
    Expired,
    Unknown(String),
}

impl From<String> for OrderStatus {
    fn from(s: String) -> Self {
        match s.as_str() {
            "NEW" => OrderStatus::New,
            "PARTIALLY_FILLED" => OrderStatus::PartiallyFilled,
            "FILLED" => OrderStatus::Filled,
            "CANCELED" => OrderStatus::Canceled,
            "PENDING_CANCEL" => OrderStatus::PendingCancel,
            "REJECTED" => OrderStatus::Rejected,
            "EXPIRED" => OrderStatus::Expired,
            _ => OrderStatus::Unknown(s),
        }
    }
}

impl From<OrderStatus> for String {
    fn from(status: OrderStatus) -> Self {
        status.to_string()
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderStatus::New => write!(f, "NEW"),
            OrderStatus::PartiallyFilled => write!(f, "PARTIALLY_FILLED"),
            OrderStatus::Filled => write!(f, "FILLED"),
            OrderStatus::Canceled => write!(f, "CANCELED"),
            OrderStatus::PendingCancel => write!(f, "PENDING_CANCEL"),
            OrderStatus::Rejected => write!(f, "REJECTED"),
            OrderStatus::Expired => write!(f, "EXPIRED"),
            OrderStatus::Unknown(raw) => write!(f, "{raw}"),
        }
    }
}

/// Parse a venue amount, treating garbage as zero
fn amount_or_zero(raw: &str) -> Fixed {
    Fixed::from_str_exact(raw).unwrap_or(Fixed::ZERO)
}

/// Per-asset holding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Balance {
    pub asset: String,
    pub free: String,
    pub locked: String,
}

impl Balance {
    pub fn free_amount(&self) -> Fixed {
        amount_or_zero(&self.free)
    }

    pub fn locked_amount(&self) -> Fixed {
        amount_or_zero(&self.locked)
    }

    /// Get total balance (free + locked)
    pub fn total(&self) -> Fixed {
        self.free_amount() + self.locked_amount()
    }

    /// Non-zero free or locked amount
    pub fn is_active(&self) -> bool {
        self.free_amount().is_positive() || self.locked_amount().is_positive()
    }
}

/// `/api/v3/account` payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountSnapshot {
    #[serde(default)]
    pub maker_commission: i64,
    #[serde(default)]
    pub taker_commission: i64,
    #[serde(default)]
    pub buyer_commission: i64,
    #[serde(default)]
    pub seller_commission: i64,
    #[serde(default)]
    pub can_trade: bool,
    #[serde(default)]
    pub can_withdraw: bool,
    #[serde(default)]
    pub can_deposit: bool,
    #[serde(default)]
    pub update_time: u64,
    #[serde(default)]
    pub account_type: String,
    pub balances: Vec<Balance>,
    #[serde(default)]
    pub permissions: Vec<String>,
}

/// Open order as returned by `/api/v3/openOrders`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub symbol: String,
    pub order_id: u64,
    pub price: String,
    pub orig_qty: String,
    pub executed_qty: String,
    pub status: OrderStatus,
    #[serde(rename = "type")]
    pub order_type: String,
    pub side: OrderSide,
    pub time: u64,
}

/// Account trade from `/api/v3/myTrades`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trade {
    pub symbol: String,
    pub id: u64,
    pub order_id: u64,
    pub price: String,
    pub qty: String,
    pub quote_qty: String,
    pub commission: String,
    pub commission_asset: String,
    pub time: u64,
    pub is_buyer: bool,
    pub is_maker: bool,
}

impl Trade {
    pub fn side(&self) -> OrderSide {
        if self.is_buyer {
            OrderSide::Buy
        } else {
            OrderSide::Sell
        }
    }
}

/// Last traded price from `/api/v3/ticker/price`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketPrice {
    pub symbol: String,
    pub price: String,
}

/// User data stream credential
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ListenKey(String);

impl ListenKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

// Keys grant read access to the account stream; keep them out of logs.
impl fmt::Debug for ListenKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let visible: String = self.0.chars().take(6).collect();
        write!(f, "ListenKey({visible}…)")
    }
}

/// Body of `POST /api/v3/userDataStream`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ListenKeyResponse {
    pub listen_key: String,
}

/// A fully filled order reported on the user data stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FillEvent {
    pub symbol: String,
    pub side: OrderSide,
    pub quantity: Fixed,
    pub price: Fixed,
}

impl fmt::Display for FillEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {} @ {}", self.side, self.symbol, self.quantity, self.price)
    }
}
