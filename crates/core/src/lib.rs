//! # TradePulse Core
//!
//! Runtime and value primitives shared by the exchange client and the bot.
//!
//! ## Architecture Principles
//!
//! 1. **Single-threaded async with monoio** - every task of the process runs on one runtime thread
//! 2. **Timers always on** - request timeouts and reconnect delays depend on them
//! 3. **Exact decimals** - prices and quantities never go through floating point
//! 4. **Unified logging** - tracing everywhere, one subscriber per process

pub mod runtime;
pub mod timing;
pub mod fixed;
pub mod logging;

// Re-export commonly used items
pub use runtime::PulseRuntime;
pub use timing::{nanos, timestamp_ms, PerfTimer, Timestamp};
pub use fixed::{Fixed, FixedError};
pub use logging::init_logging;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::runtime::{PulseRuntime, RuntimeConfig};
    pub use crate::timing::{nanos, timestamp_ms, PerfTimer, Timestamp};
    pub use crate::fixed::{Fixed, FixedError};
    pub use crate::logging::init_logging;

    // Common external types
    pub use monoio;
    pub use serde::{Deserialize, Serialize};
}
