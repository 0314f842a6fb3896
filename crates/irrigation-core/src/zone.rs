//! Per-zone session state machine
//!
//! ```text
//! Idle ──[start acknowledged]──▶ Running ──[stop / timer expiry]──▶ Stopping
//!  ▲                                                                   │
//!  └──────────────────[stop acknowledged]─────────────────────────────┘
//! ```
//!
//! Operations on one zone are serialized by an internal lock held across
//! the daemon round trip, so at most one command per zone is ever in
//! flight. Readers never take that lock: snapshots come from a watch
//! channel.

use crate::link::DaemonLink;
use crate::session::{SessionOwner, ZoneSession, ZoneState};
use irrigationd_protocol::{Command, DaemonError, Response, ZoneId};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::{broadcast, watch, Mutex};
use tokio::task::JoinHandle;

/// Errors surfaced by zone session operations
#[derive(Error, Debug)]
pub enum ZoneError {
    /// A conflicting session already owns the zone
    #[error("zone {0} is busy")]
    Busy(ZoneId),

    /// Zone id outside the configured range
    #[error("zone {0} is not configured")]
    UnknownZone(ZoneId),

    /// The daemon refused the command
    #[error("daemon rejected command for zone {zone}: {reason}")]
    Rejected { zone: ZoneId, reason: String },

    /// Transport-level failure
    #[error(transparent)]
    Daemon(#[from] DaemonError),
}

/// Session lifecycle events
#[derive(Debug, Clone)]
pub enum ZoneEvent {
    /// A session was acknowledged by the daemon and its timer armed
    SessionStarted {
        zone: ZoneId,
        owner: SessionOwner,
        duration: Duration,
    },
    /// A session returned to Idle (stop acknowledged or timer fired)
    SessionEnded { zone: ZoneId },
    /// Local state disagreed with daemon truth and was forced to Idle
    StateDesync { zone: ZoneId },
}

/// State machine for a single irrigation zone
pub struct ZoneManager {
    zone: ZoneId,
    link: Arc<dyn DaemonLink>,
    /// Serializes operations and guards the auto-stop timer handle
    op_lock: Mutex<Option<JoinHandle<()>>>,
    state_tx: watch::Sender<ZoneSession>,
    event_tx: broadcast::Sender<ZoneEvent>,
}

impl ZoneManager {
    /// Create the manager for `zone`, initially Idle
    #[must_use]
    pub fn new(
        zone: ZoneId,
        link: Arc<dyn DaemonLink>,
        event_tx: broadcast::Sender<ZoneEvent>,
    ) -> Arc<Self> {
        let (state_tx, _) = watch::channel(ZoneSession::idle(zone));
        Arc::new(Self {
            zone,
            link,
            op_lock: Mutex::new(None),
            state_tx,
            event_tx,
        })
    }

    /// Zone this manager owns
    #[must_use]
    pub fn zone(&self) -> ZoneId {
        self.zone
    }

    /// Lock-free snapshot of the current session
    #[must_use]
    pub fn session(&self) -> ZoneSession {
        self.state_tx.borrow().clone()
    }

    /// Subscribe to session snapshots
    #[must_use]
    pub fn watch(&self) -> watch::Receiver<ZoneSession> {
        self.state_tx.subscribe()
    }

    /// Wait until this zone's session returns to Idle
    pub async fn wait_idle(&self) {
        let mut rx = self.state_tx.subscribe();
        let _ = rx.wait_for(|s| s.state == ZoneState::Idle).await;
    }

    /// Begin a time-bounded session.
    ///
    /// Rejected with [`ZoneError::Busy`] while a session is active,
    /// unless a Manual request meets a Cycle-owned session, in which
    /// case the cycle session is stopped first (manual control always
    /// overrides an automated cycle). Daemon failures are surfaced
    /// without retry; the caller decides.
    pub async fn start(
        self: &Arc<Self>,
        duration: Duration,
        owner: SessionOwner,
    ) -> Result<(), ZoneError> {
        let mut timer = self.op_lock.lock().await;

        let current = self.state_tx.borrow().clone();
        if current.is_active() {
            let preempt =
                owner == SessionOwner::Manual && current.owner == Some(SessionOwner::Cycle);
            if !preempt {
                return Err(ZoneError::Busy(self.zone));
            }
            tracing::info!(zone = self.zone, "manual start pre-empting cycle session");
            self.stop_locked(&mut timer).await?;
        }

        let duration_secs = duration.as_secs();
        let response = self
            .link
            .send_command(Command::Start {
                zone: self.zone,
                duration_secs,
            })
            .await?;
        match response {
            Response::Ok => {}
            Response::Err(reason) => {
                // Stays Idle; no timer was armed
                return Err(ZoneError::Rejected {
                    zone: self.zone,
                    reason,
                });
            }
            other => {
                return Err(
                    DaemonError::Protocol(format!("unexpected reply to START: {other:?}")).into(),
                )
            }
        }

        self.state_tx.send_replace(ZoneSession {
            zone: self.zone,
            state: ZoneState::Running,
            owner: Some(owner),
            started_at: Some(Instant::now()),
            requested_duration: Some(duration),
        });
        *timer = Some(self.arm_timer(duration));

        tracing::info!(zone = self.zone, duration_secs, ?owner, "zone session started");
        let _ = self.event_tx.send(ZoneEvent::SessionStarted {
            zone: self.zone,
            owner,
            duration,
        });
        Ok(())
    }

    /// End the active session. Idempotent: a no-op on an Idle zone, with
    /// nothing sent on the wire.
    pub async fn stop(self: &Arc<Self>) -> Result<(), ZoneError> {
        let mut timer = self.op_lock.lock().await;
        self.stop_locked(&mut timer).await
    }

    /// Reconcile local state against daemon truth after a reconnect.
    ///
    /// If the daemon reports the zone off while we believe a session is
    /// active, local state is forced to Idle and a single
    /// [`ZoneEvent::StateDesync`] is recorded.
    pub async fn reconcile(self: &Arc<Self>) -> Result<(), ZoneError> {
        let mut timer = self.op_lock.lock().await;

        if !self.state_tx.borrow().is_active() {
            return Ok(());
        }

        let response = self.link.send_command(Command::Status { zone: self.zone }).await?;
        let status = match response {
            Response::Status(status) => status,
            Response::Err(reason) => {
                return Err(ZoneError::Rejected {
                    zone: self.zone,
                    reason,
                })
            }
            other => {
                return Err(
                    DaemonError::Protocol(format!("unexpected reply to STATUS: {other:?}")).into(),
                )
            }
        };

        if !status.running {
            if let Some(handle) = timer.take() {
                handle.abort();
            }
            self.state_tx.send_replace(ZoneSession::idle(self.zone));
            tracing::warn!(
                zone = self.zone,
                "daemon reports zone off while a local session was active, forcing idle"
            );
            let _ = self.event_tx.send(ZoneEvent::StateDesync { zone: self.zone });
        }
        Ok(())
    }

    /// Stop with the operation lock already held
    async fn stop_locked(&self, timer: &mut Option<JoinHandle<()>>) -> Result<(), ZoneError> {
        if !self.state_tx.borrow().is_active() {
            return Ok(());
        }

        // Disarm the auto-stop deterministically before touching the wire
        if let Some(handle) = timer.take() {
            handle.abort();
        }
        self.state_tx.send_modify(|s| s.state = ZoneState::Stopping);

        let response = self.link.send_command(Command::Stop { zone: self.zone }).await;
        match response {
            Ok(Response::Ok) => {
                self.state_tx.send_replace(ZoneSession::idle(self.zone));
                tracing::info!(zone = self.zone, "zone session ended");
                let _ = self.event_tx.send(ZoneEvent::SessionEnded { zone: self.zone });
                Ok(())
            }
            // Stays Stopping: the daemon never acknowledged, so we must
            // not assume the valve closed
            Ok(Response::Err(reason)) => Err(ZoneError::Rejected {
                zone: self.zone,
                reason,
            }),
            Ok(other) => Err(
                DaemonError::Protocol(format!("unexpected reply to STOP: {other:?}")).into(),
            ),
            Err(e) => Err(e.into()),
        }
    }

    /// Arm the duration timer; expiry behaves exactly like `stop()`
    fn arm_timer(self: &Arc<Self>, duration: Duration) -> JoinHandle<()> {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(duration).await;

            let mut timer = manager.op_lock.lock().await;
            // Detach (not abort) our own handle before stopping
            timer.take();
            tracing::debug!(zone = manager.zone, "session duration elapsed");
            if let Err(e) = manager.stop_locked(&mut timer).await {
                tracing::warn!(zone = manager.zone, error = %e, "auto-stop failed");
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::FakeDaemon;
    use tokio::sync::broadcast;

    fn manager_with_fake(zone: ZoneId) -> (Arc<ZoneManager>, Arc<FakeDaemon>) {
        let fake = Arc::new(FakeDaemon::new());
        let (event_tx, _) = broadcast::channel(64);
        let manager = ZoneManager::new(zone, fake.clone(), event_tx);
        (manager, fake)
    }

    #[tokio::test]
    async fn test_start_then_stop_returns_idle() {
        let (manager, fake) = manager_with_fake(1);

        manager
            .start(Duration::from_secs(600), SessionOwner::Manual)
            .await
            .unwrap();
        assert_eq!(manager.session().state, ZoneState::Running);
        assert!(fake.is_running(1));

        manager.stop().await.unwrap();
        assert_eq!(manager.session().state, ZoneState::Idle);
        assert!(!fake.is_running(1));
    }

    #[tokio::test]
    async fn test_stop_on_idle_zone_sends_nothing() {
        let (manager, fake) = manager_with_fake(1);
        manager.stop().await.unwrap();
        assert!(fake.sent().is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_starts_exactly_one_wins() {
        let (manager, _fake) = manager_with_fake(1);

        let (a, b) = tokio::join!(
            manager.start(Duration::from_secs(60), SessionOwner::Manual),
            manager.start(Duration::from_secs(60), SessionOwner::Manual),
        );
        assert_eq!(a.is_ok() as u8 + b.is_ok() as u8, 1);
        assert!(matches!(
            [a, b].into_iter().find(|r| r.is_err()),
            Some(Err(ZoneError::Busy(1)))
        ));
    }

    #[tokio::test]
    async fn test_manual_start_preempts_cycle_session() {
        let (manager, fake) = manager_with_fake(2);

        manager
            .start(Duration::from_secs(300), SessionOwner::Cycle)
            .await
            .unwrap();
        manager
            .start(Duration::from_secs(120), SessionOwner::Manual)
            .await
            .unwrap();

        let session = manager.session();
        assert_eq!(session.state, ZoneState::Running);
        assert_eq!(session.owner, Some(SessionOwner::Manual));

        // The cycle session must have been stopped before the new start
        let kinds: Vec<_> = fake.sent();
        assert!(matches!(kinds[0], Command::Start { .. }));
        assert!(matches!(kinds[1], Command::Stop { .. }));
        assert!(matches!(kinds[2], Command::Start { .. }));
    }

    #[tokio::test]
    async fn test_cycle_start_does_not_preempt_manual() {
        let (manager, _fake) = manager_with_fake(2);

        manager
            .start(Duration::from_secs(300), SessionOwner::Manual)
            .await
            .unwrap();
        let result = manager
            .start(Duration::from_secs(300), SessionOwner::Cycle)
            .await;
        assert!(matches!(result, Err(ZoneError::Busy(2))));
        assert_eq!(manager.session().owner, Some(SessionOwner::Manual));
    }

    #[tokio::test]
    async fn test_rejected_start_stays_idle() {
        let (manager, fake) = manager_with_fake(2);

        fake.reject_next("busy");
        let result = manager
            .start(Duration::from_secs(300), SessionOwner::Cycle)
            .await;
        assert!(matches!(result, Err(ZoneError::Rejected { zone: 2, .. })));
        assert_eq!(manager.session().state, ZoneState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_auto_stop_after_duration() {
        let (manager, fake) = manager_with_fake(3);

        manager
            .start(Duration::from_secs(300), SessionOwner::Manual)
            .await
            .unwrap();

        // No further call: the timer must drive Running -> Idle
        tokio::time::timeout(Duration::from_secs(301), manager.wait_idle())
            .await
            .expect("zone did not auto-stop within its duration");
        assert!(!fake.is_running(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_manual_stop_disarms_timer() {
        let (manager, fake) = manager_with_fake(1);

        manager
            .start(Duration::from_secs(300), SessionOwner::Manual)
            .await
            .unwrap();
        manager.stop().await.unwrap();

        // Long after the original duration, the cancelled timer must not
        // have issued a second STOP
        tokio::time::sleep(Duration::from_secs(600)).await;
        let stops = fake
            .sent()
            .iter()
            .filter(|c| matches!(c, Command::Stop { .. }))
            .count();
        assert_eq!(stops, 1);
    }

    #[tokio::test]
    async fn test_failed_stop_stays_stopping() {
        let (manager, fake) = manager_with_fake(1);

        manager
            .start(Duration::from_secs(300), SessionOwner::Manual)
            .await
            .unwrap();
        fake.fail_next(DaemonError::Timeout);

        let result = manager.stop().await;
        assert!(matches!(result, Err(ZoneError::Daemon(_))));
        assert_eq!(manager.session().state, ZoneState::Stopping);

        // A retried stop succeeds and completes the transition
        manager.stop().await.unwrap();
        assert_eq!(manager.session().state, ZoneState::Idle);
    }

    #[tokio::test]
    async fn test_reconcile_forces_idle_and_records_desync_once() {
        let fake = Arc::new(FakeDaemon::new());
        let (event_tx, mut events) = broadcast::channel(64);
        let manager = ZoneManager::new(4, fake.clone(), event_tx);

        manager
            .start(Duration::from_secs(300), SessionOwner::Manual)
            .await
            .unwrap();
        fake.force_off(4);

        manager.reconcile().await.unwrap();
        assert_eq!(manager.session().state, ZoneState::Idle);

        // Second reconcile on an idle zone must not query or re-emit
        let sent_before = fake.sent().len();
        manager.reconcile().await.unwrap();
        assert_eq!(fake.sent().len(), sent_before);

        let mut desyncs = 0;
        while let Ok(event) = events.try_recv() {
            if matches!(event, ZoneEvent::StateDesync { zone: 4 }) {
                desyncs += 1;
            }
        }
        assert_eq!(desyncs, 1);
    }

    #[tokio::test]
    async fn test_reconcile_keeps_running_session() {
        let (manager, _fake) = manager_with_fake(5);

        manager
            .start(Duration::from_secs(300), SessionOwner::Cycle)
            .await
            .unwrap();
        manager.reconcile().await.unwrap();
        assert_eq!(manager.session().state, ZoneState::Running);
    }
}
