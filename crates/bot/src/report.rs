//! Chat message rendering for account data

use std::fmt::Write;
use tradepulse_core::{Fixed, Timestamp};
use tradepulse_exchanges::{Balance, FillEvent, OrderWithPnL, PnlSummary, Trade};

/// Balance amounts are shown with this many decimals
pub const AMOUNT_DECIMALS: u32 = 8;

pub const START_TEXT: &str = "🚀 Welcome to TradePulse!

Available commands:
/balance - Get wallet balance
/orders - Get open orders with P&L
/pnl [SYMBOL] - Unrealized P&L summary
/history SYMBOL - Recent trades
/help - Show this help message

Your bot is now connected to Binance! 📈";

pub const HELP_TEXT: &str = "🤖 TradePulse Help

Available commands:
/start - Start the bot and see welcome message
/balance - Get your wallet balance
/orders - Get your open orders with current P&L
/pnl [SYMBOL] - Unrealized P&L across open orders
/history SYMBOL - Your most recent trades for a symbol
/help - Show this help message

Filled orders are reported here as they happen.";

pub const UNKNOWN_TEXT: &str = "Unknown command. Use /help to see available commands.";
pub const HISTORY_USAGE_TEXT: &str = "Usage: /history SYMBOL (for example /history BTCUSDT)";
pub const GENERIC_FAILURE_TEXT: &str = "❌ An error occurred while processing your request.";
pub const BALANCE_FAILURE_TEXT: &str = "❌ Failed to get wallet balance. Please check your API credentials.";
pub const ORDERS_FAILURE_TEXT: &str = "❌ Failed to get open orders. Please check your API credentials.";

fn signed(value: Fixed) -> String {
    if value.is_positive() {
        format!("+{}", value.to_money_string())
    } else {
        value.to_money_string()
    }
}

/// Free, locked and total per asset
pub fn balances(balances: &[Balance]) -> String {
    let active: Vec<&Balance> = balances.iter().filter(|b| b.total().is_positive()).collect();
    if active.is_empty() {
        return "💰 No balances found in your wallet.".to_string();
    }

    let mut message = String::from("💰 Wallet Balance:\n\n");
    for balance in active {
        let _ = writeln!(message, "{}:", balance.asset);
        let _ = writeln!(message, "  Free: {}", balance.free_amount().to_string_with_scale(AMOUNT_DECIMALS));
        let _ = writeln!(message, "  Locked: {}", balance.locked_amount().to_string_with_scale(AMOUNT_DECIMALS));
        let _ = writeln!(message, "  Total: {}\n", balance.total().to_string_with_scale(AMOUNT_DECIMALS));
    }
    message
}

/// Open orders with their P&L, followed by the summary
pub fn open_orders(orders: &[OrderWithPnL], summary: &PnlSummary) -> String {
    if orders.is_empty() {
        return "📋 No open orders found.".to_string();
    }

    let mut message = String::from("📋 Open Orders:\n\n");
    for entry in orders {
        let order = &entry.order;
        let _ = writeln!(message, "{} {}", order.symbol, order.side);
        let _ = writeln!(message, "  Price: {}", order.price);
        let _ = writeln!(message, "  Quantity: {}", order.orig_qty);
        let _ = writeln!(message, "  Status: {}", order.status);
        let _ = writeln!(message, "  Type: {}", order.order_type);
        match &entry.pnl {
            Some(pnl) => {
                let _ = writeln!(message, "  Current: {}", pnl.current_price);
                let _ = writeln!(
                    message,
                    "  P&L: {} ({}%)",
                    signed(pnl.profit_loss),
                    signed(pnl.profit_loss_percent)
                );
            }
            None => {
                let _ = writeln!(message, "  P&L: n/a");
            }
        }
        message.push('\n');
    }
    message.push_str(&summary_text(summary));
    message
}

/// Aggregate P&L only
pub fn summary_text(summary: &PnlSummary) -> String {
    if summary.order_count == 0 {
        return "📊 No open orders to evaluate.".to_string();
    }

    let mut message = String::from("📊 P&L Summary:\n");
    let _ = writeln!(message, "  Orders priced: {}/{}", summary.priced_count, summary.order_count);
    let _ = writeln!(message, "  Total P&L: {}", signed(summary.total_profit_loss));
    let _ = write!(message, "  Notional: {}", summary.total_notional.to_money_string());
    message
}

/// Most recent trades for one symbol
pub fn trade_history(symbol: &str, trades: &[Trade]) -> String {
    if trades.is_empty() {
        return format!("📜 No trades found for {symbol}.");
    }

    let mut message = format!("📜 Recent Trades ({symbol}):\n\n");
    for trade in trades {
        let when = Timestamp::from_millis(trade.time);
        let _ = writeln!(
            message,
            "{} {} @ {} (fee {} {})",
            trade.side(),
            trade.qty,
            trade.price,
            trade.commission,
            trade.commission_asset
        );
        let _ = writeln!(message, "  {when}");
    }
    message
}

/// Text forwarded to the chat for a filled order
pub fn fill_notification(fill: &FillEvent) -> String {
    format!("✅ Order FILLED: {fill}")
}
