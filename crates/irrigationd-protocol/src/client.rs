//! Async TCP client for irrigationd
//!
//! A single connection actor owns the socket; callers submit commands
//! through an mpsc channel and are served strictly in submission order,
//! so no two commands are ever in flight at once.

use crate::command::Command;
use crate::types::{DaemonError, DaemonEvent};
use crate::wire::Response;

use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc, oneshot};

/// Timeout for establishing the TCP link
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Timeout for a single command/response round trip
pub const COMMAND_TIMEOUT: Duration = Duration::from_secs(3);

/// Reconnect attempts before a command fails as unavailable
pub const MAX_RECONNECT_ATTEMPTS: u32 = 3;

/// Request to the connection actor
enum ClientRequest {
    Send {
        cmd: Command,
        reply: oneshot::Sender<Result<Response, DaemonError>>,
    },
    Connect {
        reply: oneshot::Sender<Result<(), DaemonError>>,
    },
    Disconnect,
    SetEndpoint {
        host: String,
        port: u16,
    },
}

/// Handle to the connection actor owning the single daemon link
///
/// Cheap to clone; the actor exits once every handle is dropped.
#[derive(Clone)]
pub struct DaemonClient {
    req_tx: mpsc::Sender<ClientRequest>,
    event_tx: broadcast::Sender<DaemonEvent>,
}

impl DaemonClient {
    /// Create a client for the daemon at `host:port` and spawn its actor
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self::with_token(host, port, None)
    }

    /// Create a client for a daemon that requires an auth token; the
    /// token is appended to every command line.
    #[must_use]
    pub fn with_token(host: impl Into<String>, port: u16, token: Option<String>) -> Self {
        let (req_tx, req_rx) = mpsc::channel(32);
        let (event_tx, _) = broadcast::channel(16);

        let actor = ConnectionActor {
            host: host.into(),
            port,
            token,
            stream: None,
            was_connected: false,
            event_tx: event_tx.clone(),
        };
        tokio::spawn(actor.run(req_rx));

        Self { req_tx, event_tx }
    }

    /// Establish the daemon link. Idempotent: a no-op while connected.
    pub async fn connect(&self) -> Result<(), DaemonError> {
        let (reply, rx) = oneshot::channel();
        self.req_tx
            .send(ClientRequest::Connect { reply })
            .await
            .map_err(|_| DaemonError::Closed)?;
        rx.await.map_err(|_| DaemonError::Closed)?
    }

    /// Submit one command and wait for the daemon's reply.
    ///
    /// Transient connection/timeout failures are retried internally with
    /// backoff; every call resolves with a response or an explicit error.
    pub async fn send_command(&self, cmd: Command) -> Result<Response, DaemonError> {
        let (reply, rx) = oneshot::channel();
        self.req_tx
            .send(ClientRequest::Send { cmd, reply })
            .await
            .map_err(|_| DaemonError::Closed)?;
        rx.await.map_err(|_| DaemonError::Closed)?
    }

    /// Release the daemon link. Always safe to call.
    pub async fn disconnect(&self) {
        let _ = self.req_tx.send(ClientRequest::Disconnect).await;
    }

    /// Point the client at a new endpoint, reconnecting if it changed
    pub async fn set_endpoint(&self, host: impl Into<String>, port: u16) {
        let _ = self
            .req_tx
            .send(ClientRequest::SetEndpoint {
                host: host.into(),
                port,
            })
            .await;
    }

    /// Subscribe to connection lifecycle events
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<DaemonEvent> {
        self.event_tx.subscribe()
    }
}

/// Actor state: exclusive owner of the TCP stream
struct ConnectionActor {
    host: String,
    port: u16,
    /// Auth token appended to every command line when set
    token: Option<String>,
    stream: Option<BufReader<TcpStream>>,
    /// Distinguishes the first `Connected` from later `Reconnected` events
    was_connected: bool,
    event_tx: broadcast::Sender<DaemonEvent>,
}

impl ConnectionActor {
    async fn run(mut self, mut req_rx: mpsc::Receiver<ClientRequest>) {
        while let Some(req) = req_rx.recv().await {
            match req {
                ClientRequest::Send { cmd, reply } => {
                    let result = self.send_with_retry(cmd).await;
                    let _ = reply.send(result);
                }
                ClientRequest::Connect { reply } => {
                    let result = self.ensure_connected().await.map(|_| ());
                    let _ = reply.send(result);
                }
                ClientRequest::Disconnect => self.drop_stream(),
                ClientRequest::SetEndpoint { host, port } => {
                    if host != self.host || port != self.port {
                        tracing::info!(%host, port, "daemon endpoint changed");
                        self.host = host;
                        self.port = port;
                        self.drop_stream();
                        if let Err(e) = self.ensure_connected().await {
                            tracing::warn!("reconnect to new endpoint failed: {}", e);
                        }
                    }
                }
            }
        }
        tracing::debug!("daemon client actor shutting down");
    }

    /// Send one command, reconnecting with backoff on transient failures
    async fn send_with_retry(&mut self, cmd: Command) -> Result<Response, DaemonError> {
        let mut attempt: u32 = 0;
        loop {
            match self.try_send(&cmd).await {
                Ok(response) => return Ok(response),
                Err(e) if e.is_transient() => {
                    self.drop_stream();
                    if attempt >= MAX_RECONNECT_ATTEMPTS {
                        tracing::error!(
                            zone = cmd.zone(),
                            "daemon unreachable after {} reconnect attempts",
                            MAX_RECONNECT_ATTEMPTS
                        );
                        return Err(DaemonError::Unavailable(MAX_RECONNECT_ATTEMPTS));
                    }
                    let backoff = Duration::from_secs(1u64 << attempt);
                    attempt += 1;
                    tracing::warn!(
                        zone = cmd.zone(),
                        attempt,
                        "daemon command failed ({}), retrying in {:?}",
                        e,
                        backoff
                    );
                    tokio::time::sleep(backoff).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// One write/read round trip on the current connection
    async fn try_send(&mut self, cmd: &Command) -> Result<Response, DaemonError> {
        let line = cmd.encode_with_token(self.token.as_deref());
        let stream = self.ensure_connected().await?;

        stream
            .get_mut()
            .write_all(line.as_bytes())
            .await
            .map_err(|e| DaemonError::Connection(e.to_string()))?;

        let mut response = String::new();
        match tokio::time::timeout(COMMAND_TIMEOUT, stream.read_line(&mut response)).await {
            Err(_) => Err(DaemonError::Timeout),
            Ok(Err(e)) => Err(DaemonError::Connection(e.to_string())),
            Ok(Ok(0)) => Err(DaemonError::Connection(
                "daemon closed the connection".to_string(),
            )),
            Ok(Ok(_)) => {
                tracing::debug!(zone = cmd.zone(), "daemon replied: {}", response.trim());
                Response::parse(&response)
            }
        }
    }

    async fn ensure_connected(&mut self) -> Result<&mut BufReader<TcpStream>, DaemonError> {
        if self.stream.is_none() {
            let addr = format!("{}:{}", self.host, self.port);
            tracing::info!(%addr, "connecting to irrigationd");

            let stream = tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect(&addr))
                .await
                .map_err(|_| DaemonError::Connection(format!("connect to {addr} timed out")))?
                .map_err(|e| DaemonError::Connection(format!("{addr}: {e}")))?;

            self.stream = Some(BufReader::new(stream));

            let event = if self.was_connected {
                DaemonEvent::Reconnected
            } else {
                DaemonEvent::Connected
            };
            self.was_connected = true;
            let _ = self.event_tx.send(event);
            tracing::info!(%addr, "connected to irrigationd");
        }

        match self.stream.as_mut() {
            Some(stream) => Ok(stream),
            None => Err(DaemonError::Closed),
        }
    }

    fn drop_stream(&mut self) {
        if self.stream.take().is_some() {
            tracing::debug!("daemon link released");
            let _ = self.event_tx.send(DaemonEvent::Disconnected);
        }
    }
}
