//! Binance authentication and request signing
//!
//! Signed endpoints take `timestamp` as the first query parameter and
//! `signature` as the last. The signature is the lowercase hex HMAC-SHA256
//! of the exact query string that precedes it.

use crate::errors::{ExchangeError, Result};
use crate::http::{HttpMethod, HttpRequest};
use tradepulse_core::PerfTimer;

use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::fmt;
use tracing::debug;
use url::Url;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the API key on authenticated calls
pub const API_KEY_HEADER: &str = "X-MBX-APIKEY";

/// Binance API credentials
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    api_key: String,
    api_secret: String,
}

impl Credentials {
    /// Both halves must be non-empty
    pub fn new(api_key: impl Into<String>, api_secret: impl Into<String>) -> Result<Self> {
        let api_key = api_key.into();
        let api_secret = api_secret.into();
        if api_key.trim().is_empty() {
            return Err(ExchangeError::MissingCredentials("BINANCE_API_KEY".to_string()));
        }
        if api_secret.trim().is_empty() {
            return Err(ExchangeError::MissingCredentials("BINANCE_API_SECRET".to_string()));
        }
        Ok(Self {
            api_key,
            api_secret,
        })
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &self.api_key)
            .field("api_secret", &"<redacted>")
            .finish()
    }
}

/// Ordered query parameters
///
/// Serializes as `key=value` joined by `&` in insertion order. Values are
/// percent-encoded, keys are written as given.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryParams {
    pairs: Vec<(String, String)>,
}

impl QueryParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, key: impl Into<String>, value: impl ToString) -> &mut Self {
        self.pairs.push((key.into(), value.to_string()));
        self
    }

    /// Builder form of `push`
    pub fn with(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.push(key, value);
        self
    }

    pub fn push_opt(&mut self, key: impl Into<String>, value: Option<impl ToString>) -> &mut Self {
        if let Some(value) = value {
            self.push(key, value);
        }
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.pairs.iter().map(|(k, _)| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn serialize(&self) -> String {
        self.pairs
            .iter()
            .map(|(k, v)| format!("{}={}", k, urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&")
    }
}

/// Lowercase hex HMAC-SHA256 of `payload` keyed by `secret`
pub fn sign(secret: &str, payload: &str) -> Result<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| ExchangeError::SigningError(format!("HMAC setup failed: {e}")))?;
    mac.update(payload.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Binance request signer
pub struct Signer {
    credentials: Credentials,
}

impl Signer {
    pub fn new(credentials: Credentials) -> Self {
        Self { credentials }
    }

    /// Build a signer straight from raw key material
    pub fn from_parts(api_key: &str, api_secret: &str) -> Result<Self> {
        Ok(Self::new(Credentials::new(api_key, api_secret)?))
    }

    pub fn api_key(&self) -> &str {
        self.credentials.api_key()
    }

    /// Sign `params` for `path`, with `timestamp` placed first
    pub fn sign_request(
        &self,
        method: HttpMethod,
        path: &str,
        params: QueryParams,
        timestamp: u64,
    ) -> Result<SignedRequest> {
        let _timer = PerfTimer::start("binance_sign_request");

        let mut query = QueryParams::new().with("timestamp", timestamp);
        query.pairs.extend(params.pairs);

        let signature = sign(&self.credentials.api_secret, &query.serialize())?;
        debug!("🔐 Signed request: {} {}", method.as_str(), path);

        Ok(SignedRequest {
            method,
            path: path.to_string(),
            query,
            timestamp,
            signature,
        })
    }
}

/// Signed request with all necessary components
#[derive(Debug, Clone, PartialEq)]
pub struct SignedRequest {
    pub method: HttpMethod,
    pub path: String,
    pub query: QueryParams,
    pub timestamp: u64,
    pub signature: String,
}

impl SignedRequest {
    /// The exact bytes that were signed
    pub fn payload(&self) -> String {
        self.query.serialize()
    }

    /// `payload&signature=<hex>`
    pub fn wire_query(&self) -> String {
        format!("{}&signature={}", self.payload(), self.signature)
    }

    /// Full URL against `base_url`, query set verbatim
    pub fn build_url(&self, base_url: &str) -> Result<Url> {
        let mut url = Url::parse(base_url)?;
        url.set_path(&self.path);
        url.set_query(Some(&self.wire_query()));
        Ok(url)
    }

    /// Transport request with the API key header attached
    pub fn into_http_request(self, base_url: &str, api_key: &str) -> Result<HttpRequest> {
        let url = self.build_url(base_url)?;
        let request = match self.method {
            HttpMethod::Get => HttpRequest::get(url),
            HttpMethod::Post => HttpRequest::post(url),
        };
        Ok(request.with_header(API_KEY_HEADER, api_key))
    }
}
