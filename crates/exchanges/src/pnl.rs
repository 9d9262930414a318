//! Unrealized profit and loss for open orders
//!
//! Open orders are joined with one batched price fetch. Per-order faults
//! (zero price, unreadable amounts, overflow) leave that order unpriced and
//! never fail the batch.

use crate::binance::rest::AccountClient;
use crate::errors::{ExchangeError, Result};
use crate::traits::HttpTransport;
use crate::types::{MarketPrice, Order, OrderSide};
use tradepulse_core::{log_error, Fixed, PerfTimer};

use serde::{Deserialize, Serialize, Serializer};
use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};

/// SELL profit and loss is capped at this share of the order notional
pub fn sell_cap_ratio() -> Fixed {
    Fixed::new(2, 1)
}

/// Money fields serialize as two-decimal strings
fn money<S: Serializer>(value: &Fixed, serializer: S) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_str(&value.to_money_string())
}

/// Derived figures for one priced order
///
/// Fields keep full precision in memory. The serialized form carries
/// `profit_loss` and `profit_loss_percent` rounded to two decimals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderPnl {
    pub current_price: Fixed,
    #[serde(serialize_with = "money")]
    pub profit_loss: Fixed,
    #[serde(serialize_with = "money")]
    pub profit_loss_percent: Fixed,
}

/// An open order with its P&L when it could be priced
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderWithPnL {
    pub order: Order,
    pub pnl: Option<OrderPnl>,
}

impl OrderWithPnL {
    pub fn is_priced(&self) -> bool {
        self.pnl.is_some()
    }
}

/// Aggregate over one batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PnlSummary {
    pub order_count: usize,
    pub priced_count: usize,
    pub unpriced_count: usize,
    #[serde(serialize_with = "money")]
    pub total_profit_loss: Fixed,
    /// `price * origQty` over priced orders
    #[serde(serialize_with = "money")]
    pub total_notional: Fixed,
}

fn parse_amount(field: &str, raw: &str, order: &Order) -> Result<Fixed> {
    Fixed::from_str_exact(raw).map_err(|e| {
        ExchangeError::ComputationFault(format!("order {} {}: {}: {}", order.order_id, order.symbol, field, e))
    })
}

fn fault(order: &Order, what: &str) -> ExchangeError {
    ExchangeError::ComputationFault(format!("order {} {}: {}", order.order_id, order.symbol, what))
}

/// P&L of `order` at `current_price`
///
/// BUY: `(current - price) * qty`. SELL: `(price - current) * qty` clamped
/// to `±(price * qty * 0.2)`. The percentage is `diff / price * 100` for
/// both sides and is never clamped. `qty` is the original order quantity.
pub fn compute_order_pnl(order: &Order, current_price: Fixed) -> Result<OrderPnl> {
    let price = parse_amount("price", &order.price, order)?;
    let quantity = parse_amount("origQty", &order.orig_qty, order)?;
    if price.is_zero() {
        return Err(fault(order, "zero order price"));
    }

    let diff = match order.side {
        OrderSide::Buy => current_price.checked_sub(price),
        OrderSide::Sell => price.checked_sub(current_price),
    }
    .map_err(|e| fault(order, &e.to_string()))?;

    let raw = diff.checked_mul(quantity).map_err(|e| fault(order, &e.to_string()))?;
    let profit_loss = match order.side {
        OrderSide::Buy => raw,
        OrderSide::Sell => {
            let cap = price
                .checked_mul(quantity)
                .and_then(|notional| notional.checked_mul(sell_cap_ratio()))
                .map_err(|e| fault(order, &e.to_string()))?
                .abs();
            raw.clamp_to(-cap, cap)
        }
    };
    let profit_loss_percent = diff.percent_of(price).map_err(|e| fault(order, &e.to_string()))?;

    Ok(OrderPnl {
        current_price,
        profit_loss,
        profit_loss_percent,
    })
}

/// Join `orders` with `prices` by exact symbol match
pub fn attach_prices(orders: Vec<Order>, prices: &[MarketPrice]) -> Vec<OrderWithPnL> {
    let lookup: HashMap<&str, &str> = prices
        .iter()
        .map(|p| (p.symbol.as_str(), p.price.as_str()))
        .collect();

    orders
        .into_iter()
        .map(|order| {
            let pnl = match lookup.get(order.symbol.as_str()) {
                None => {
                    debug!("No market price for {}", order.symbol);
                    None
                }
                Some(raw) => Fixed::from_str_exact(raw)
                    .map_err(|e| fault(&order, &format!("market price: {e}")))
                    .and_then(|current| compute_order_pnl(&order, current))
                    .inspect_err(|e| {
                        log_error!("compute_order_pnl", e);
                    })
                    .ok(),
            };
            OrderWithPnL { order, pnl }
        })
        .collect()
}

/// Totals over a batch at full precision
pub fn summarize(orders: &[OrderWithPnL]) -> PnlSummary {
    let mut summary = PnlSummary {
        order_count: orders.len(),
        priced_count: 0,
        unpriced_count: 0,
        total_profit_loss: Fixed::ZERO,
        total_notional: Fixed::ZERO,
    };

    for entry in orders {
        let Some(pnl) = &entry.pnl else {
            summary.unpriced_count += 1;
            continue;
        };
        summary.priced_count += 1;

        match summary.total_profit_loss.checked_add(pnl.profit_loss) {
            Ok(total) => summary.total_profit_loss = total,
            Err(e) => warn!("P&L total skipped order {}: {}", entry.order.order_id, e),
        }

        // Priced orders have readable amounts
        let notional = Fixed::from_str_exact(&entry.order.price)
            .and_then(|price| {
                Fixed::from_str_exact(&entry.order.orig_qty).and_then(|qty| price.checked_mul(qty))
            })
            .and_then(|notional| summary.total_notional.checked_add(notional));
        match notional {
            Ok(total) => summary.total_notional = total,
            Err(e) => warn!("Notional total skipped order {}: {}", entry.order.order_id, e),
        }
    }

    summary
}

/// Open orders joined with live prices
pub struct PnlEngine<'a, T: HttpTransport> {
    client: &'a AccountClient<T>,
}

impl<'a, T: HttpTransport> PnlEngine<'a, T> {
    pub fn new(client: &'a AccountClient<T>) -> Self {
        Self { client }
    }

    /// Open orders (optionally for one symbol) with P&L attached
    ///
    /// No open orders means no price request at all.
    pub async fn open_orders_with_pnl(&self, symbol: Option<&str>) -> Result<Vec<OrderWithPnL>> {
        let _timer = PerfTimer::start("open_orders_with_pnl");

        let orders = self.client.open_orders(symbol).await?;
        if orders.is_empty() {
            return Ok(Vec::new());
        }

        let symbols: HashSet<String> = orders.iter().map(|o| o.symbol.clone()).collect();
        let prices = self.client.current_prices(&symbols).await?;
        debug!("Priced {} of {} symbols", prices.len(), symbols.len());

        Ok(attach_prices(orders, &prices))
    }

    /// `open_orders_with_pnl` plus its summary
    pub async fn report(&self, symbol: Option<&str>) -> Result<(Vec<OrderWithPnL>, PnlSummary)> {
        let orders = self.open_orders_with_pnl(symbol).await?;
        let summary = summarize(&orders);
        Ok((orders, summary))
    }
}
