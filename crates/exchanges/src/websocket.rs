//! Monoio-native WebSocket client
//!
//! RFC 6455 client over the rustls `TlsStream` from `http`. Control frames
//! are answered inline; fragmented text messages are reassembled before
//! they reach the caller.

use crate::errors::{ExchangeError, Result};
use crate::http::{tls_client_config, TlsStream};
use crate::traits::StreamConnection;
use tradepulse_core::PerfTimer;

use async_trait::async_trait;
use base64::Engine;
use monoio::net::TcpStream;
use sha1::{Digest, Sha1};
use tracing::{debug, info, warn};
use url::Url;

/// Largest frame payload accepted from the server
pub const MAX_FRAME_PAYLOAD: u64 = 16 * 1024 * 1024;

const WS_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// WebSocket opcode constants
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpCode {
    Continuation = 0x0,
    Text = 0x1,
    Binary = 0x2,
    Close = 0x8,
    Ping = 0x9,
    Pong = 0xa,
}

impl OpCode {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x0 => Some(OpCode::Continuation),
            0x1 => Some(OpCode::Text),
            0x2 => Some(OpCode::Binary),
            0x8 => Some(OpCode::Close),
            0x9 => Some(OpCode::Ping),
            0xa => Some(OpCode::Pong),
            _ => None,
        }
    }
}

/// WebSocket frame header
#[derive(Debug, Clone, PartialEq)]
pub struct FrameHeader {
    pub fin: bool,
    pub opcode: OpCode,
    pub mask: Option<[u8; 4]>,
    pub payload_len: u64,
}

/// WebSocket frame
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub header: FrameHeader,
    pub payload: Vec<u8>,
}

impl Frame {
    fn client(opcode: OpCode, payload: Vec<u8>) -> Self {
        Self {
            header: FrameHeader {
                fin: true,
                opcode,
                mask: Some(Self::generate_mask()),
                payload_len: payload.len() as u64,
            },
            payload,
        }
    }

    pub fn pong(data: Vec<u8>) -> Self {
        Self::client(OpCode::Pong, data)
    }

    pub fn close(code: u16, reason: &str) -> Self {
        let mut payload = Vec::with_capacity(2 + reason.len());
        payload.extend_from_slice(&code.to_be_bytes());
        payload.extend_from_slice(reason.as_bytes());
        Self::client(OpCode::Close, payload)
    }

    fn generate_mask() -> [u8; 4] {
        rand::random::<u32>().to_be_bytes()
    }

    fn apply_mask(payload: &mut [u8], mask: &[u8; 4]) {
        for (i, byte) in payload.iter_mut().enumerate() {
            *byte ^= mask[i % 4];
        }
    }

    /// Serialize frame to bytes
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut frame = Vec::with_capacity(self.payload.len() + 14);

        let first_byte = if self.header.fin { 0x80 } else { 0x00 } | (self.header.opcode as u8);
        frame.push(first_byte);

        let mask_bit = if self.header.mask.is_some() { 0x80 } else { 0x00 };
        if self.header.payload_len < 126 {
            frame.push(mask_bit | (self.header.payload_len as u8));
        } else if self.header.payload_len < 65536 {
            frame.push(mask_bit | 126);
            frame.extend_from_slice(&(self.header.payload_len as u16).to_be_bytes());
        } else {
            frame.push(mask_bit | 127);
            frame.extend_from_slice(&self.header.payload_len.to_be_bytes());
        }

        let mut payload = self.payload.clone();
        if let Some(mask) = &self.header.mask {
            frame.extend_from_slice(mask);
            Self::apply_mask(&mut payload, mask);
        }
        frame.extend_from_slice(&payload);
        frame
    }

    /// Parse one frame off the front of `data`
    ///
    /// `Ok(None)` when more bytes are needed; otherwise the frame and the
    /// number of bytes it used.
    pub fn parse(data: &[u8]) -> Result<Option<(Self, usize)>> {
        if data.len() < 2 {
            return Ok(None);
        }

        let fin = (data[0] & 0x80) != 0;
        let opcode = OpCode::from_u8(data[0] & 0x0f).ok_or_else(|| {
            ExchangeError::InvalidResponse(format!("Invalid WebSocket opcode {:#x}", data[0] & 0x0f))
        })?;
        let masked = (data[1] & 0x80) != 0;

        let mut offset = 2;
        let payload_len = match data[1] & 0x7f {
            126 => {
                if data.len() < offset + 2 {
                    return Ok(None);
                }
                let len = u16::from_be_bytes([data[2], data[3]]) as u64;
                offset += 2;
                len
            }
            127 => {
                if data.len() < offset + 8 {
                    return Ok(None);
                }
                let mut raw = [0u8; 8];
                raw.copy_from_slice(&data[2..10]);
                offset += 8;
                u64::from_be_bytes(raw)
            }
            len => len as u64,
        };

        if payload_len > MAX_FRAME_PAYLOAD {
            return Err(ExchangeError::InvalidResponse(format!(
                "WebSocket frame of {payload_len} bytes exceeds limit"
            )));
        }

        let mask = if masked {
            if data.len() < offset + 4 {
                return Ok(None);
            }
            let mask = [data[offset], data[offset + 1], data[offset + 2], data[offset + 3]];
            offset += 4;
            Some(mask)
        } else {
            None
        };

        let end = offset + payload_len as usize;
        if data.len() < end {
            return Ok(None);
        }

        let mut payload = data[offset..end].to_vec();
        if let Some(mask) = &mask {
            Self::apply_mask(&mut payload, mask);
        }

        let frame = Frame {
            header: FrameHeader {
                fin,
                opcode,
                mask,
                payload_len,
            },
            payload,
        };
        Ok(Some((frame, end)))
    }
}

/// Accumulates fragmented data messages
#[derive(Debug, Default)]
pub struct MessageAssembler {
    partial: Option<(OpCode, Vec<u8>)>,
}

impl MessageAssembler {
    /// Feed a data frame. Returns a complete text message when one is ready.
    /// Binary messages are dropped once complete.
    pub fn push(&mut self, frame: Frame) -> Result<Option<String>> {
        let (opcode, payload) = match frame.header.opcode {
            OpCode::Text | OpCode::Binary => {
                if self.partial.is_some() {
                    return Err(ExchangeError::InvalidResponse(
                        "New data frame inside a fragmented message".to_string(),
                    ));
                }
                if !frame.header.fin {
                    self.partial = Some((frame.header.opcode, frame.payload));
                    return Ok(None);
                }
                (frame.header.opcode, frame.payload)
            }
            OpCode::Continuation => {
                let Some((opcode, mut buffered)) = self.partial.take() else {
                    return Err(ExchangeError::InvalidResponse(
                        "Continuation frame without a message".to_string(),
                    ));
                };
                buffered.extend_from_slice(&frame.payload);
                if !frame.header.fin {
                    self.partial = Some((opcode, buffered));
                    return Ok(None);
                }
                (opcode, buffered)
            }
            _ => return Ok(None),
        };

        if opcode == OpCode::Binary {
            debug!("Skipping {} byte binary message", payload.len());
            return Ok(None);
        }
        String::from_utf8(payload)
            .map(Some)
            .map_err(|e| ExchangeError::MalformedMessage(format!("Invalid UTF-8 in text frame: {e}")))
    }
}

/// `Sec-WebSocket-Accept` value for a given key
pub fn accept_key(ws_key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(ws_key.as_bytes());
    hasher.update(WS_GUID.as_bytes());
    base64::engine::general_purpose::STANDARD.encode(hasher.finalize())
}

fn validate_handshake_response(response: &str, ws_key: &str) -> Result<()> {
    let status_ok = response
        .lines()
        .next()
        .map(|line| line.split_whitespace().nth(1) == Some("101"))
        .unwrap_or(false);
    if !status_ok {
        let status_line = response.lines().next().unwrap_or_default();
        return Err(ExchangeError::ConnectionFailed(format!(
            "WebSocket handshake rejected: {status_line}"
        )));
    }

    let expected = accept_key(ws_key);
    let accepted = response.lines().any(|line| {
        line.split_once(':').is_some_and(|(name, value)| {
            name.trim().eq_ignore_ascii_case("sec-websocket-accept") && value.trim() == expected
        })
    });
    if !accepted {
        return Err(ExchangeError::ConnectionFailed(
            "WebSocket handshake failed: invalid accept key".to_string(),
        ));
    }
    Ok(())
}

/// Monoio-native WebSocket client
pub struct MonoioWebSocket {
    stream: TlsStream,
    connected: bool,
    close_sent: bool,
    buffer: Vec<u8>,
    assembler: MessageAssembler,
}

impl MonoioWebSocket {
    /// Open a `wss://` connection and complete the upgrade
    pub async fn connect(url: &Url) -> Result<Self> {
        let _timer = PerfTimer::start("websocket_connect");

        let host = url
            .host_str()
            .ok_or_else(|| ExchangeError::InvalidUrl("No host in WebSocket URL".to_string()))?;
        let port = url.port_or_known_default().unwrap_or(443);

        let tcp_stream = TcpStream::connect(&format!("{host}:{port}"))
            .await
            .map_err(|e| ExchangeError::NetworkError(format!("TCP connection failed: {e}")))?;
        debug!("✅ TCP connection established to {}:{}", host, port);

        let server_name = rustls::pki_types::ServerName::try_from(host.to_string())
            .map_err(|e| ExchangeError::NetworkError(format!("Invalid server name: {e}")))?;
        let tls_conn = rustls::ClientConnection::new(tls_client_config(), server_name)
            .map_err(|e| ExchangeError::NetworkError(format!("TLS connection setup failed: {e}")))?;

        let mut stream = TlsStream::new(tcp_stream, tls_conn);
        stream.complete_handshake().await?;
        debug!("✅ TLS handshake completed");

        let mut websocket = Self {
            stream,
            connected: false,
            close_sent: false,
            buffer: Vec::with_capacity(8192),
            assembler: MessageAssembler::default(),
        };
        websocket.perform_handshake(url, host).await?;

        info!("✅ WebSocket connection established to {}{}", host, redact_path(url));
        Ok(websocket)
    }

    async fn perform_handshake(&mut self, url: &Url, host: &str) -> Result<()> {
        let mut nonce = [0u8; 16];
        nonce[..8].copy_from_slice(&rand::random::<u64>().to_be_bytes());
        nonce[8..].copy_from_slice(&rand::random::<u64>().to_be_bytes());
        let ws_key = base64::engine::general_purpose::STANDARD.encode(nonce);

        let path = if url.path().is_empty() { "/" } else { url.path() };
        let query = url.query().map(|q| format!("?{q}")).unwrap_or_default();
        let request = format!(
            "GET {path}{query} HTTP/1.1\r\n\
             Host: {host}\r\n\
             Upgrade: websocket\r\n\
             Connection: Upgrade\r\n\
             Sec-WebSocket-Key: {ws_key}\r\n\
             Sec-WebSocket-Version: 13\r\n\
             \r\n"
        );
        self.stream.write_all(request.as_bytes()).await?;

        // Read until the end of the response head; anything after it is frame data.
        let head_end = loop {
            if let Some(pos) = self.buffer.windows(4).position(|w| w == b"\r\n\r\n") {
                break pos + 4;
            }
            if self.buffer.len() > 16 * 1024 {
                return Err(ExchangeError::ConnectionFailed("Oversized handshake response".to_string()));
            }
            let mut chunk = vec![0u8; 4096];
            let n = self.stream.read(&mut chunk).await?;
            if n == 0 {
                return Err(ExchangeError::ConnectionFailed(
                    "Connection closed during WebSocket handshake".to_string(),
                ));
            }
            self.buffer.extend_from_slice(&chunk[..n]);
        };

        let head: Vec<u8> = self.buffer.drain(..head_end).collect();
        validate_handshake_response(&String::from_utf8_lossy(&head), &ws_key)?;

        self.connected = true;
        debug!("✅ WebSocket handshake completed");
        Ok(())
    }

    pub async fn send_frame(&mut self, frame: Frame) -> Result<()> {
        if !self.connected || self.close_sent {
            return Err(ExchangeError::NetworkError("WebSocket not connected".to_string()));
        }
        self.stream.write_all(&frame.to_bytes()).await?;
        if frame.header.opcode == OpCode::Close {
            self.close_sent = true;
        }
        Ok(())
    }

    /// Next frame from the wire. Peer EOF is an error.
    pub async fn receive_frame(&mut self) -> Result<Frame> {
        loop {
            if let Some((frame, consumed)) = Frame::parse(&self.buffer)? {
                self.buffer.drain(..consumed);
                return Ok(frame);
            }

            let mut chunk = vec![0u8; 4096];
            let n = self.stream.read(&mut chunk).await?;
            if n == 0 {
                self.connected = false;
                return Err(ExchangeError::NetworkError(
                    "WebSocket connection closed by peer".to_string(),
                ));
            }
            self.buffer.extend_from_slice(&chunk[..n]);
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected && !self.close_sent
    }
}

#[async_trait(?Send)]
impl StreamConnection for MonoioWebSocket {
    async fn next_message(&mut self) -> Result<Option<String>> {
        if !self.connected {
            return Ok(None);
        }

        loop {
            let frame = self.receive_frame().await?;
            match frame.header.opcode {
                OpCode::Ping => {
                    debug!("Received ping, sending pong");
                    self.send_frame(Frame::pong(frame.payload)).await?;
                }
                OpCode::Pong => {}
                OpCode::Close => {
                    debug!("Received close frame");
                    if !self.close_sent {
                        if let Err(e) = self.send_frame(Frame::close(1000, "Normal closure")).await {
                            warn!("Failed to answer close frame: {}", e);
                        }
                    }
                    self.connected = false;
                    return Ok(None);
                }
                _ => {
                    if let Some(message) = self.assembler.push(frame)? {
                        return Ok(Some(message));
                    }
                }
            }
        }
    }

    async fn close(&mut self) -> Result<()> {
        if !self.is_connected() {
            return Ok(());
        }
        info!("🔌 Closing WebSocket connection");
        self.send_frame(Frame::close(1000, "Normal closure")).await?;
        self.connected = false;
        Ok(())
    }
}

/// Path with its last segment (the listen key) shortened for logs
pub fn redact_path(url: &Url) -> String {
    let path = url.path();
    match path.rsplit_once('/') {
        Some((prefix, last)) if last.len() > 8 => {
            let visible: String = last.chars().take(6).collect();
            format!("{prefix}/{visible}…")
        }
        _ => path.to_string(),
    }
}
