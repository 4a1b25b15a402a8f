//! Remote access to a registry.
//!
//! The wire protocol is line-delimited JSON over TCP. Every request line gets
//! exactly one response line, in order, on the same connection:
//!
//! ```text
//! > {"op":"enumerate"}
//! < {"status":"tests","tests":[{"name":"Group A.test one","identifier":"5c1f…"}]}
//! > {"op":"invoke","identifier":"5c1f…","context":{"user":"ci"}}
//! < {"status":"result","report":{"name":"Group A.test one","passed":true,…}}
//! > {"op":"invoke","identifier":"nope"}
//! < {"status":"error","code":"not_found","message":"failed to run test \"nope\": not on service"}
//! ```
//!
//! Connections are served concurrently; the service does not serialize
//! invocations of the same test.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};

use crate::diagnostics::TetherError;
use crate::engine::{ExecutionEngine, Reporter, TestReport};
use crate::registry::{SharedRegistry, TestListing};

/// Port the service listens on unless configured otherwise.
pub const DEFAULT_PORT: u16 = 5000;

/// Longest request line the service accepts, newline excluded.
pub const MAX_REQUEST_BYTES: usize = 1 << 20;

const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Where the service listens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceConfig {
    pub bind: IpAddr,
    pub port: u16,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            bind: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: DEFAULT_PORT,
        }
    }
}

impl ServiceConfig {
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind, self.port)
    }
}

// =====================
// Wire types
// =====================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Request {
    Enumerate,
    Invoke {
        identifier: String,
        #[serde(default)]
        context: Value,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Response {
    Tests { tests: Vec<TestListing> },
    Result { report: TestReport },
    Error { code: String, message: String },
}

impl From<TetherError> for Response {
    fn from(error: TetherError) -> Self {
        Response::Error {
            code: error.category().as_str().to_string(),
            message: error.to_string(),
        }
    }
}

// =====================
// Service
// =====================

/// Answers enumerate and invoke requests against a shared registry.
#[derive(Clone)]
pub struct Service {
    registry: SharedRegistry,
    engine: Arc<dyn ExecutionEngine>,
}

impl Service {
    /// A service running tests with the default [`Reporter`].
    pub fn new(registry: SharedRegistry) -> Self {
        Self::with_engine(registry, Arc::new(Reporter))
    }

    pub fn with_engine(registry: SharedRegistry, engine: Arc<dyn ExecutionEngine>) -> Self {
        Self { registry, engine }
    }

    pub fn registry(&self) -> &SharedRegistry {
        &self.registry
    }

    pub async fn handle(&self, request: Request) -> Response {
        match request {
            Request::Enumerate => Response::Tests {
                tests: self.registry.enumerate().await,
            },
            Request::Invoke {
                identifier,
                context,
            } => match self
                .registry
                .invoke(&identifier, context, self.engine.as_ref())
                .await
            {
                Ok(report) => Response::Result { report },
                Err(error) => error.into(),
            },
        }
    }

    /// Decodes and answers one request line.
    pub async fn handle_line(&self, line: &str) -> Response {
        match serde_json::from_str::<Request>(line) {
            Ok(request) => self.handle(request).await,
            Err(source) => TetherError::Protocol {
                message: source.to_string(),
                source: Some(source),
            }
            .into(),
        }
    }

    /// Binds `config` and serves forever. Only a failed bind is returned.
    pub async fn listen(self, config: ServiceConfig) -> Result<(), TetherError> {
        let addr = config.socket_addr();
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| TetherError::transport(format!("bind {addr}"), source))?;
        self.serve(listener).await
    }

    /// Accepts connections on an already bound listener. Failed accepts are
    /// logged and retried; only [`Service::listen`] reports bind errors.
    pub async fn serve(self, listener: TcpListener) -> Result<(), TetherError> {
        let tests = self.registry.len().await;
        if let Ok(addr) = listener.local_addr() {
            tracing::info!(%addr, tests, "listening");
        }
        loop {
            let (stream, peer) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(error) => {
                    tracing::warn!(%error, "accept failed, retrying");
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                    continue;
                }
            };
            let service = self.clone();
            tokio::spawn(async move {
                if let Err(error) = service.serve_connection(stream).await {
                    tracing::warn!(%peer, %error, "connection closed with an error");
                }
            });
        }
    }

    async fn serve_connection(&self, stream: TcpStream) -> Result<(), TetherError> {
        let peer = stream
            .peer_addr()
            .map(|addr| addr.to_string())
            .unwrap_or_else(|_| "unknown peer".to_string());
        tracing::debug!(%peer, "connection opened");

        let (reader, mut writer) = stream.into_split();
        let mut reader = BufReader::new(reader);
        let mut buf = Vec::new();
        loop {
            let line = read_request_line(&mut reader, &mut buf)
                .await
                .map_err(|source| TetherError::transport(format!("read from {peer}"), source))?;
            let response = match line {
                RequestLine::Eof => break,
                RequestLine::Text(line) if line.trim().is_empty() => continue,
                RequestLine::Text(line) => self.handle_line(&line).await,
                RequestLine::Rejected(error) => {
                    tracing::debug!(%peer, %error, "rejected request line");
                    error.into()
                }
            };
            let mut encoded = serde_json::to_string(&response).map_err(|source| {
                TetherError::Protocol {
                    message: "response could not be encoded".to_string(),
                    source: Some(source),
                }
            })?;
            encoded.push('\n');
            writer
                .write_all(encoded.as_bytes())
                .await
                .map_err(|source| TetherError::transport(format!("write to {peer}"), source))?;
        }

        tracing::debug!(%peer, "connection closed");
        Ok(())
    }
}

// =====================
// Line framing
// =====================

enum RequestLine {
    Text(String),
    Rejected(TetherError),
    Eof,
}

/// Reads one newline-terminated request of at most [`MAX_REQUEST_BYTES`].
/// An oversized or non UTF-8 line is consumed up to its newline and rejected
/// so the connection can carry on with the next request.
async fn read_request_line<R>(reader: &mut R, buf: &mut Vec<u8>) -> std::io::Result<RequestLine>
where
    R: AsyncBufRead + Unpin,
{
    buf.clear();
    let limit = MAX_REQUEST_BYTES as u64 + 1;
    let read = (&mut *reader).take(limit).read_until(b'\n', buf).await?;
    if read == 0 {
        return Ok(RequestLine::Eof);
    }

    if buf.last() == Some(&b'\n') {
        buf.pop();
        if buf.last() == Some(&b'\r') {
            buf.pop();
        }
    } else if buf.len() > MAX_REQUEST_BYTES {
        skip_past_newline(reader).await?;
        return Ok(RequestLine::Rejected(TetherError::Protocol {
            message: format!("request exceeds {MAX_REQUEST_BYTES} bytes"),
            source: None,
        }));
    }

    match String::from_utf8(std::mem::take(buf)) {
        Ok(text) => Ok(RequestLine::Text(text)),
        Err(_) => Ok(RequestLine::Rejected(TetherError::Protocol {
            message: "request is not valid UTF-8".to_string(),
            source: None,
        })),
    }
}

async fn skip_past_newline<R>(reader: &mut R) -> std::io::Result<()>
where
    R: AsyncBufRead + Unpin,
{
    loop {
        let available = reader.fill_buf().await?;
        if available.is_empty() {
            return Ok(());
        }
        match available.iter().position(|&byte| byte == b'\n') {
            Some(pos) => {
                reader.consume(pos + 1);
                return Ok(());
            }
            None => {
                let len = available.len();
                reader.consume(len);
            }
        }
    }
}
