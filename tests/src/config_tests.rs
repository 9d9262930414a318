//! Environment-driven configuration
//!
//! Every test here mutates process environment, so all of them are serial.

use serial_test::serial;
use std::env;
use std::time::Duration;
use tradepulse_bot::{BotConfig, ConfigError};
use tradepulse_exchanges::prelude::*;

const BINANCE_VARS: &[&str] = &[
    "BINANCE_API_KEY",
    "BINANCE_API_SECRET",
    "BINANCE_TESTNET",
    "BINANCE_BASE_URL",
    "BINANCE_WS_URL",
    "HTTP_TIMEOUT_MS",
    "STREAM_RECONNECT_DELAY_MS",
];

const TELEGRAM_VARS: &[&str] = &[
    "TELEGRAM_BOT_TOKEN",
    "TELEGRAM_CHAT_ID",
    "TELEGRAM_API_URL",
    "TELEGRAM_POLL_TIMEOUT_SECS",
    "TELEGRAM_RETRY_DELAY_MS",
];

fn clear_env() {
    for name in BINANCE_VARS.iter().chain(TELEGRAM_VARS) {
        env::remove_var(name);
    }
}

#[cfg(test)]
mod binance {
    use super::*;

    #[test]
    #[serial]
    fn test_defaults_without_credentials() {
        clear_env();
        let config = BinanceConfig::from_env().unwrap();

        assert_eq!(config.base_url, "https://api.binance.com");
        assert_eq!(config.ws_url, "wss://stream.binance.com:9443");
        assert_eq!(config.timeout(), Duration::from_secs(10));
        assert!(config.credentials().is_none());
    }

    #[test]
    #[serial]
    fn test_credentials_and_overrides() {
        clear_env();
        env::set_var("BINANCE_API_KEY", "env-key");
        env::set_var("BINANCE_API_SECRET", "env-secret");
        env::set_var("BINANCE_TESTNET", "true");
        env::set_var("HTTP_TIMEOUT_MS", "2500");

        let config = BinanceConfig::from_env().unwrap();
        assert!(config.testnet);
        assert_eq!(config.base_url, "https://testnet.binance.vision");
        assert_eq!(config.timeout(), Duration::from_millis(2500));
        assert_eq!(config.credentials().unwrap().api_key(), "env-key");

        env::set_var("BINANCE_BASE_URL", "http://localhost:8080");
        assert_eq!(BinanceConfig::from_env().unwrap().base_url, "http://localhost:8080");
        clear_env();
    }

    #[test]
    #[serial]
    fn test_half_credentials_count_as_missing() {
        clear_env();
        env::set_var("BINANCE_API_KEY", "env-key");
        assert!(BinanceConfig::from_env().unwrap().credentials().is_none());
        clear_env();
    }

    #[test]
    #[serial]
    fn test_malformed_values_are_configuration_faults() {
        clear_env();
        env::set_var("HTTP_TIMEOUT_MS", "fast");
        let err = BinanceConfig::from_env().unwrap_err();
        assert!(err.is_configuration_fault());

        clear_env();
        env::set_var("BINANCE_TESTNET", "maybe");
        assert!(BinanceConfig::from_env().unwrap_err().is_configuration_fault());

        clear_env();
        env::set_var("BINANCE_WS_URL", "not a url");
        assert!(BinanceConfig::from_env().unwrap_err().is_configuration_fault());
        clear_env();
    }

    #[test]
    #[serial]
    fn test_reconnect_delay_override() {
        clear_env();
        assert_eq!(ReconnectPolicy::from_env().unwrap(), ReconnectPolicy::default());

        env::set_var("STREAM_RECONNECT_DELAY_MS", "750");
        let policy = ReconnectPolicy::from_env().unwrap();
        assert_eq!(policy.delay, Duration::from_millis(750));
        assert_eq!(policy.delay_for(3), Duration::from_millis(750));

        env::set_var("STREAM_RECONNECT_DELAY_MS", "-1");
        assert!(ReconnectPolicy::from_env().is_err());
        clear_env();
    }
}

#[cfg(test)]
mod telegram {
    use super::*;

    #[test]
    #[serial]
    fn test_bot_config_from_env() {
        clear_env();
        env::set_var("TELEGRAM_BOT_TOKEN", "123:abc");
        env::set_var("TELEGRAM_CHAT_ID", "987654");
        env::set_var("TELEGRAM_POLL_TIMEOUT_SECS", "5");

        let config = BotConfig::from_env().unwrap();
        assert_eq!(config.bot_token, "123:abc");
        assert_eq!(config.chat_id, "987654");
        assert_eq!(config.poll_timeout(), Duration::from_secs(5));
        assert_eq!(config.api_url, "https://api.telegram.org");
        clear_env();
    }

    #[test]
    #[serial]
    fn test_bot_config_requires_chat() {
        clear_env();
        env::set_var("TELEGRAM_BOT_TOKEN", "123:abc");
        assert_eq!(BotConfig::from_env().unwrap_err(), ConfigError::Missing("TELEGRAM_CHAT_ID"));
        clear_env();
    }
}
