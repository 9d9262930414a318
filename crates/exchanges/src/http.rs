//! Monoio-native HTTP/HTTPS client implementation
//!
//! - Single-threaded async with monoio
//! - Direct TLS integration with rustls
//! - One HTTP/1.1 request per connection (`Connection: close`)
//! - Whole-request deadline enforced with `monoio::time::timeout`

use crate::errors::{ExchangeError, Result};
use crate::traits::HttpTransport;
use async_trait::async_trait;
use monoio::io::{AsyncReadRent, AsyncWriteRentExt};
use monoio::net::TcpStream;
use rustls::pki_types::ServerName;
use rustls::{ClientConfig, ClientConnection};
use std::io::{Read, Write};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Default deadline for a single REST round trip
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// HTTP method subset used against the venue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
        }
    }
}

/// Outbound request, fully built (signed query already in `url`)
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: Url,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

impl HttpRequest {
    pub fn get(url: Url) -> Self {
        Self {
            method: HttpMethod::Get,
            url,
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn post(url: Url) -> Self {
        Self {
            method: HttpMethod::Post,
            url,
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn with_body(mut self, body: String) -> Self {
        self.body = Some(body);
        self
    }

    /// Header lookup, case-insensitive on the name
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Query string value by key
    pub fn query_value(&self, key: &str) -> Option<String> {
        self.url
            .query_pairs()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.into_owned())
    }
}

/// HTTP response
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Monoio-native HTTPS client
pub struct MonoioHttpsClient {
    tls_config: Arc<ClientConfig>,
    timeout: Duration,
}

/// TLS stream wrapper for monoio
pub struct TlsStream {
    stream: TcpStream,
    tls_conn: ClientConnection,
    write_buf: Vec<u8>,
    tls_read_buf: Vec<u8>,
    handshake_complete: bool,
}

impl MonoioHttpsClient {
    /// Create a new HTTPS client with the webpki root store
    pub fn new() -> Result<Self> {
        Self::with_timeout(DEFAULT_HTTP_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        Ok(Self {
            tls_config: tls_client_config(),
            timeout,
        })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn send(&self, request: &HttpRequest) -> Result<HttpResponse> {
        let host = request
            .url
            .host_str()
            .ok_or_else(|| ExchangeError::InvalidUrl("No host in URL".to_string()))?;
        let port = request.url.port_or_known_default().unwrap_or(443);

        let mut path_and_query = request.url.path().to_string();
        if path_and_query.is_empty() {
            path_and_query.push('/');
        }
        if let Some(query) = request.url.query() {
            path_and_query.push('?');
            path_and_query.push_str(query);
        }

        let tcp_stream = TcpStream::connect(&format!("{host}:{port}"))
            .await
            .map_err(|e| ExchangeError::NetworkError(format!("TCP connect failed: {e}")))?;

        let server_name = ServerName::try_from(host.to_string())
            .map_err(|e| ExchangeError::NetworkError(format!("Invalid server name: {e:?}")))?;
        let tls_conn = ClientConnection::new(self.tls_config.clone(), server_name)
            .map_err(|e| ExchangeError::NetworkError(format!("TLS setup failed: {e}")))?;
        let mut tls_stream = TlsStream::new(tcp_stream, tls_conn);

        let raw = build_request_head(request, host, &path_and_query);
        tls_stream.write_all(raw.as_bytes()).await?;

        let response_data = tls_stream.read_to_end().await?;
        parse_http_response(&response_data)
    }
}

#[async_trait(?Send)]
impl HttpTransport for MonoioHttpsClient {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse> {
        debug!("{} {}", request.method.as_str(), request.url.path());
        match monoio::time::timeout(self.timeout, self.send(&request)).await {
            Ok(result) => result,
            Err(_) => Err(ExchangeError::Timeout(format!(
                "{} {} exceeded {:?}",
                request.method.as_str(),
                request.url.path(),
                self.timeout
            ))),
        }
    }
}

/// Root store from webpki-roots, shared by HTTPS and WSS
pub(crate) fn tls_client_config() -> Arc<ClientConfig> {
    let mut root_store = rustls::RootCertStore::empty();
    root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

    let config = ClientConfig::builder()
        .with_root_certificates(root_store)
        .with_no_client_auth();
    Arc::new(config)
}

fn build_request_head(request: &HttpRequest, host: &str, path_and_query: &str) -> String {
    let method = request.method.as_str();
    let content_length = request.body.as_ref().map(|b| b.len()).unwrap_or(0);
    let mut raw = format!(
        "{method} {path_and_query} HTTP/1.1\r\n\
         Host: {host}\r\n\
         User-Agent: TradePulse/1.0\r\n\
         Connection: close\r\n\
         Content-Length: {content_length}\r\n"
    );
    for (key, value) in &request.headers {
        raw.push_str(&format!("{key}: {value}\r\n"));
    }
    raw.push_str("\r\n");
    if let Some(body) = &request.body {
        raw.push_str(body);
    }
    raw
}

/// Parse a complete HTTP/1.1 response read until EOF
pub fn parse_http_response(data: &[u8]) -> Result<HttpResponse> {
    let header_end = data
        .windows(4)
        .position(|w| w == b"\r\n\r\n")
        .ok_or_else(|| {
            ExchangeError::InvalidResponse("no header terminator".to_string())
        })?;

    let header_part = String::from_utf8_lossy(&data[..header_end]);
    let body_bytes = &data[header_end + 4..];

    let mut lines = header_part.lines();
    let status_line = lines
        .next()
        .ok_or_else(|| ExchangeError::InvalidResponse("empty response".to_string()))?;
    let status = status_line
        .split_whitespace()
        .nth(1)
        .and_then(|s| s.parse::<u16>().ok())
        .ok_or_else(|| ExchangeError::InvalidResponse(format!("bad status line: {status_line}")))?;

    let headers: Vec<(String, String)> = lines
        .filter_map(|line| line.split_once(':'))
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .collect();

    let chunked = headers.iter().any(|(k, v)| {
        k.eq_ignore_ascii_case("transfer-encoding") && v.to_ascii_lowercase().contains("chunked")
    });
    let body = if chunked {
        decode_chunked(body_bytes)?
    } else {
        body_bytes.to_vec()
    };

    Ok(HttpResponse {
        status,
        headers,
        body: String::from_utf8_lossy(&body).into_owned(),
    })
}

/// Decode a `Transfer-Encoding: chunked` body
pub fn decode_chunked(mut data: &[u8]) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(data.len());
    loop {
        let line_end = data
            .windows(2)
            .position(|w| w == b"\r\n")
            .ok_or_else(|| ExchangeError::InvalidResponse("truncated chunk header".to_string()))?;
        let size_line = String::from_utf8_lossy(&data[..line_end]);
        // Chunk extensions follow a ';'
        let size_hex = size_line.split(';').next().unwrap_or("").trim();
        let size = usize::from_str_radix(size_hex, 16)
            .map_err(|_| ExchangeError::InvalidResponse(format!("bad chunk size: {size_hex}")))?;
        data = &data[line_end + 2..];

        if size == 0 {
            return Ok(out);
        }
        if data.len() < size {
            return Err(ExchangeError::InvalidResponse("truncated chunk body".to_string()));
        }
        out.extend_from_slice(&data[..size]);
        data = &data[size..];
        if data.starts_with(b"\r\n") {
            data = &data[2..];
        }
    }
}

impl TlsStream {
    pub fn new(stream: TcpStream, tls_conn: ClientConnection) -> Self {
        Self {
            stream,
            tls_conn,
            write_buf: Vec::with_capacity(8192),
            tls_read_buf: Vec::with_capacity(8192),
            handshake_complete: false,
        }
    }

    async fn flush_tls(&mut self) -> Result<()> {
        while self.tls_conn.wants_write() {
            self.write_buf.clear();
            let tls_bytes = self
                .tls_conn
                .write_tls(&mut self.write_buf)
                .map_err(|e| ExchangeError::NetworkError(format!("TLS write failed: {e}")))?;
            if tls_bytes > 0 {
                let (result, _) = self.stream.write_all(self.write_buf.clone()).await;
                result.map_err(|e| ExchangeError::NetworkError(format!("TCP write failed: {e}")))?;
            }
        }
        Ok(())
    }

    /// Feed one TCP read into rustls. Returns false on EOF.
    async fn fill_tls(&mut self) -> Result<bool> {
        let buffer = vec![0u8; 4096];
        let (result, buf) = self.stream.read(buffer).await;
        let bytes_read =
            result.map_err(|e| ExchangeError::NetworkError(format!("TCP read failed: {e}")))?;
        if bytes_read == 0 {
            return Ok(false);
        }
        self.tls_conn
            .read_tls(&mut std::io::Cursor::new(&buf[..bytes_read]))
            .map_err(|e| ExchangeError::NetworkError(format!("TLS read failed: {e}")))?;
        self.tls_conn
            .process_new_packets()
            .map_err(|e| ExchangeError::NetworkError(format!("TLS process failed: {e}")))?;
        Ok(true)
    }

    /// Complete TLS handshake
    pub async fn complete_handshake(&mut self) -> Result<()> {
        if self.handshake_complete {
            return Ok(());
        }

        loop {
            self.flush_tls().await?;

            if !self.tls_conn.is_handshaking() {
                self.handshake_complete = true;
                return Ok(());
            }

            if self.tls_conn.wants_read() {
                if !self.fill_tls().await? {
                    return Err(ExchangeError::NetworkError(
                        "Connection closed during handshake".to_string(),
                    ));
                }
            } else if !self.tls_conn.wants_write() {
                return Err(ExchangeError::NetworkError("TLS handshake stalled".to_string()));
            }
        }
    }

    pub async fn write_all(&mut self, data: &[u8]) -> Result<()> {
        self.complete_handshake().await?;
        self.tls_conn
            .writer()
            .write_all(data)
            .map_err(|e| ExchangeError::NetworkError(format!("TLS application write failed: {e}")))?;
        self.flush_tls().await
    }

    /// Read decrypted bytes. `Ok(0)` means the peer closed.
    pub async fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.complete_handshake().await?;

        loop {
            match self.tls_conn.reader().read(buf) {
                Ok(n) if n > 0 => return Ok(n),
                Ok(_) => return Ok(0),
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {}
                Err(e) => return Err(ExchangeError::NetworkError(format!("TLS read failed: {e}"))),
            }

            if !self.fill_tls().await? {
                return Ok(0);
            }
        }
    }

    async fn read_to_end(&mut self) -> Result<Vec<u8>> {
        self.complete_handshake().await?;

        let mut response_data = Vec::new();
        loop {
            self.tls_read_buf.clear();
            self.tls_read_buf.resize(4096, 0);

            match self.tls_conn.reader().read(&mut self.tls_read_buf) {
                // Clean close_notify
                Ok(0) => break,
                Ok(n) => {
                    response_data.extend_from_slice(&self.tls_read_buf[..n]);
                    continue;
                }
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {}
                Err(e) => {
                    return Err(ExchangeError::NetworkError(format!("TLS read failed: {e}")));
                }
            }

            if !self.fill_tls().await? {
                break;
            }
        }

        Ok(response_data)
    }
}
