//! Async runtime based on monoio
//!
//! One runtime thread drives the REST client, the user stream session and the
//! bot's polling loop. The timer driver is always enabled: request timeouts
//! and the stream reconnect delay are built on `monoio::time`.

use monoio::{FusionDriver, RuntimeBuilder};
use tracing::info;

/// Runtime configuration
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Thread name, used in log lines only
    pub thread_name: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            thread_name: "tradepulse-main".to_string(),
        }
    }
}

/// TradePulse runtime
///
/// Wraps a monoio fusion runtime (io_uring when the kernel supports it,
/// epoll otherwise) with the timer enabled.
pub struct PulseRuntime {
    config: RuntimeConfig,
}

impl PulseRuntime {
    /// Create a new runtime with default configuration
    pub fn new() -> Self {
        Self::with_config(RuntimeConfig::default())
    }

    /// Create a new runtime with custom configuration
    pub fn with_config(config: RuntimeConfig) -> Self {
        Self { config }
    }

    /// Run a future to completion on a fresh runtime
    pub fn block_on<F>(&self, future: F) -> std::io::Result<F::Output>
    where
        F: std::future::Future,
    {
        info!("▶️  Starting runtime on {}", self.config.thread_name);
        let mut runtime = RuntimeBuilder::<FusionDriver>::new()
            .enable_timer()
            .build()?;
        let output = runtime.block_on(future);
        info!("⏹️  Runtime on {} stopped", self.config.thread_name);
        Ok(output)
    }

    /// Get runtime configuration
    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }
}

impl Default for PulseRuntime {
    fn default() -> Self {
        Self::new()
    }
}
