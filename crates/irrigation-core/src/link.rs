//! Seam between zone management and the concrete daemon client

use async_trait::async_trait;
use irrigationd_protocol::{Command, DaemonClient, DaemonError, DaemonEvent, Response};
use tokio::sync::broadcast;

/// Command channel to the irrigation daemon.
///
/// [`DaemonClient`] is the production implementation; tests substitute
/// scripted fakes.
#[async_trait]
pub trait DaemonLink: Send + Sync {
    /// Submit one command and wait for the daemon's reply
    async fn send_command(&self, cmd: Command) -> Result<Response, DaemonError>;

    /// Subscribe to connection lifecycle events
    fn subscribe(&self) -> broadcast::Receiver<DaemonEvent>;

    /// Point the link at a new endpoint (options update)
    async fn set_endpoint(&self, host: &str, port: u16);
}

#[async_trait]
impl DaemonLink for DaemonClient {
    async fn send_command(&self, cmd: Command) -> Result<Response, DaemonError> {
        DaemonClient::send_command(self, cmd).await
    }

    fn subscribe(&self) -> broadcast::Receiver<DaemonEvent> {
        DaemonClient::subscribe(self)
    }

    async fn set_endpoint(&self, host: &str, port: u16) {
        DaemonClient::set_endpoint(self, host, port).await;
    }
}
