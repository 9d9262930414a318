//! Exchange-specific error types
//!
//! Every REST failure reaches the caller as one of these variants with the
//! venue's status and body kept intact. Stream failures are absorbed by the
//! session loop after being logged.

use thiserror::Error;

/// Result type for exchange operations
pub type Result<T> = std::result::Result<T, ExchangeError>;

/// Exchange operation errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExchangeError {
    /// API key or secret absent. Permanent, never retried.
    #[error("Missing credentials: {0}")]
    MissingCredentials(String),

    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// Venue rejected the key or the signature
    #[error("Authentication rejected (HTTP {0}): {1}")]
    AuthenticationError(u16, String),

    #[error("HTTP error {0}: {1}")]
    HttpError(u16, String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Signing error: {0}")]
    SigningError(String),

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Unparsable user stream payload
    #[error("Malformed stream message: {0}")]
    MalformedMessage(String),

    /// Degenerate P&L input, scoped to one order
    #[error("Computation fault: {0}")]
    ComputationFault(String),
}

impl ExchangeError {
    /// Build the error for a non-2xx venue response
    pub fn from_status(status: u16, body: String) -> Self {
        let code = serde_json::from_str::<serde_json::Value>(&body)
            .ok()
            .and_then(|v| v["code"].as_i64())
            .map(VenueErrorCode::from)
            .unwrap_or(VenueErrorCode::Unknown);

        if matches!(status, 401 | 403) || code.is_authentication() {
            Self::AuthenticationError(status, body)
        } else {
            Self::HttpError(status, body)
        }
    }

    /// Configuration faults disable features instead of being retried
    pub fn is_configuration_fault(&self) -> bool {
        matches!(self, Self::MissingCredentials(_) | Self::ConfigurationError(_))
    }

    /// HTTP status, when the venue answered at all
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::AuthenticationError(status, _) | Self::HttpError(status, _) => Some(*status),
            _ => None,
        }
    }
}

impl From<tradepulse_core::FixedError> for ExchangeError {
    fn from(err: tradepulse_core::FixedError) -> Self {
        Self::ComputationFault(err.to_string())
    }
}

impl From<serde_json::Error> for ExchangeError {
    fn from(err: serde_json::Error) -> Self {
        Self::SerializationError(err.to_string())
    }
}

impl From<url::ParseError> for ExchangeError {
    fn from(err: url::ParseError) -> Self {
        Self::InvalidUrl(err.to_string())
    }
}

/// Binance error codes (`{"code": -1022, "msg": "..."}`) that matter here
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VenueErrorCode {
    Unknown,
    Disconnected,
    TooManyRequests,
    InvalidTimestamp,
    InvalidSignature,
    NoSuchOrder,
    RejectedMbxKey,
    InvalidApiKeyPermissions,
}

impl VenueErrorCode {
    pub fn is_authentication(&self) -> bool {
        matches!(
            self,
            Self::InvalidSignature | Self::RejectedMbxKey | Self::InvalidApiKeyPermissions
        )
    }
}

impl From<i64> for VenueErrorCode {
    fn from(code: i64) -> Self {
        match code {
            -1001 => VenueErrorCode::Disconnected,
            -1003 => VenueErrorCode::TooManyRequests,
            -1021 => VenueErrorCode::InvalidTimestamp,
            -1022 => VenueErrorCode::InvalidSignature,
            -2013 => VenueErrorCode::NoSuchOrder,
            -2014 => VenueErrorCode::RejectedMbxKey,
            -2015 => VenueErrorCode::InvalidApiKeyPermissions,
            _ => VenueErrorCode::Unknown,
        }
    }
}
