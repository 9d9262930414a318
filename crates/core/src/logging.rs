//! Unified logging
//!
//! One `tracing` subscriber per process. Filtering follows `RUST_LOG`
//! and defaults to `info`.

use std::sync::Once;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

static INIT: Once = Once::new();

/// Initialize the global tracing subscriber. Safe to call more than once.
pub fn init_logging() {
    INIT.call_once(|| {
        let subscriber = FmtSubscriber::builder()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
            )
            .with_target(false)
            .with_thread_ids(true)
            .with_line_number(true)
            .finish();

        // A subscriber installed by the host (tests, embedding binary) wins.
        if tracing::subscriber::set_global_default(subscriber).is_ok() {
            tracing::info!("📝 Initialized tracing logging");
        }
    });
}

#[macro_export]
macro_rules! log_latency {
    ($operation:expr, $duration_micros:expr) => {
        if $duration_micros < 1000 {
            tracing::debug!("⚡ {} completed in {}μs", $operation, $duration_micros);
        } else {
            tracing::debug!("⚡ {} completed in {:.3}ms", $operation, $duration_micros as f64 / 1000.0);
        }
    };
}

#[macro_export]
macro_rules! log_fill {
    ($side:expr, $symbol:expr, $quantity:expr, $price:expr) => {
        tracing::info!("✅ Order FILLED: {} {} {} @ {}", $side, $symbol, $quantity, $price);
    };
}

#[macro_export]
macro_rules! log_error {
    ($operation:expr, $error:expr) => {
        tracing::error!("❌ {} failed: {}", $operation, $error);
    };
}
