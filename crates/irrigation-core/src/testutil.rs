//! Scripted in-process daemon for tests

use crate::link::DaemonLink;
use async_trait::async_trait;
use irrigationd_protocol::{Command, DaemonError, DaemonEvent, Response, ZoneId, ZoneStatus};
use std::collections::HashSet;
use std::sync::Mutex;
use tokio::sync::broadcast;

/// In-memory stand-in for irrigationd.
///
/// Tracks which zones it believes are running, logs every command it
/// receives, and lets tests inject canned failures.
pub(crate) struct FakeDaemon {
    running: Mutex<HashSet<ZoneId>>,
    sent: Mutex<Vec<Command>>,
    /// Next commands answered with `ERR <reason>` (front first)
    reject_next: Mutex<Vec<String>>,
    /// Next commands failed with a transport error (front first)
    fail_next: Mutex<Vec<DaemonError>>,
    event_tx: broadcast::Sender<DaemonEvent>,
    /// Recorded `set_endpoint` calls
    endpoints: Mutex<Vec<(String, u16)>>,
}

impl FakeDaemon {
    pub(crate) fn new() -> Self {
        let (event_tx, _) = broadcast::channel(16);
        Self {
            running: Mutex::new(HashSet::new()),
            sent: Mutex::new(Vec::new()),
            reject_next: Mutex::new(Vec::new()),
            fail_next: Mutex::new(Vec::new()),
            event_tx,
            endpoints: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn sent(&self) -> Vec<Command> {
        self.sent.lock().unwrap().clone()
    }

    pub(crate) fn reject_next(&self, reason: &str) {
        self.reject_next.lock().unwrap().push(reason.to_string());
    }

    pub(crate) fn fail_next(&self, error: DaemonError) {
        self.fail_next.lock().unwrap().push(error);
    }

    /// Simulate the daemon turning a zone off behind our back
    pub(crate) fn force_off(&self, zone: ZoneId) {
        self.running.lock().unwrap().remove(&zone);
    }

    pub(crate) fn is_running(&self, zone: ZoneId) -> bool {
        self.running.lock().unwrap().contains(&zone)
    }

    pub(crate) fn emit(&self, event: DaemonEvent) {
        let _ = self.event_tx.send(event);
    }

    pub(crate) fn endpoints(&self) -> Vec<(String, u16)> {
        self.endpoints.lock().unwrap().clone()
    }
}

#[async_trait]
impl DaemonLink for FakeDaemon {
    async fn send_command(&self, cmd: Command) -> Result<Response, DaemonError> {
        self.sent.lock().unwrap().push(cmd);

        {
            let mut fail = self.fail_next.lock().unwrap();
            if !fail.is_empty() {
                return Err(fail.remove(0));
            }
        }
        {
            let mut reject = self.reject_next.lock().unwrap();
            if !reject.is_empty() {
                return Ok(Response::Err(reject.remove(0)));
            }
        }

        let mut running = self.running.lock().unwrap();
        match cmd {
            Command::Start { zone, .. } => {
                running.insert(zone);
                Ok(Response::Ok)
            }
            Command::Stop { zone } => {
                running.remove(&zone);
                Ok(Response::Ok)
            }
            Command::Status { zone } => Ok(Response::Status(ZoneStatus {
                zone,
                running: running.contains(&zone),
                remaining_secs: 0,
            })),
        }
    }

    fn subscribe(&self) -> broadcast::Receiver<DaemonEvent> {
        self.event_tx.subscribe()
    }

    async fn set_endpoint(&self, host: &str, port: u16) {
        self.endpoints.lock().unwrap().push((host.to_string(), port));
    }
}
