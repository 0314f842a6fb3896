//! Entity-facing facade over the per-zone managers

use crate::config::{ConfigError, IrrigationConfig};
use crate::link::DaemonLink;
use crate::session::{SessionOwner, ZoneSession};
use crate::zone::{ZoneError, ZoneEvent, ZoneManager};
use dashmap::DashMap;
use irrigationd_protocol::{DaemonEvent, ZoneId};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, RwLock};

/// Owns one [`ZoneManager`] per configured zone and exposes the
/// contract the platform's entity layer calls into: turn on, turn off,
/// is-on and remaining-seconds per zone.
pub struct ZoneController {
    link: Arc<dyn DaemonLink>,
    managers: DashMap<ZoneId, Arc<ZoneManager>>,
    config: RwLock<IrrigationConfig>,
    event_tx: broadcast::Sender<ZoneEvent>,
}

impl ZoneController {
    /// Build the controller and spawn the reconnect/reconcile listener
    pub fn new(
        link: Arc<dyn DaemonLink>,
        config: IrrigationConfig,
    ) -> Result<Arc<Self>, ConfigError> {
        config.validate()?;

        let (event_tx, _) = broadcast::channel(64);
        let managers = DashMap::new();
        for zone in 1..=config.zones {
            managers.insert(zone, ZoneManager::new(zone, link.clone(), event_tx.clone()));
        }

        let controller = Arc::new(Self {
            link,
            managers,
            config: RwLock::new(config),
            event_tx,
        });
        Arc::clone(&controller).spawn_reconcile_listener();
        Ok(controller)
    }

    /// Background task: after every reconnect, query each zone's status
    /// so daemon truth wins over stale local sessions.
    fn spawn_reconcile_listener(self: Arc<Self>) {
        let mut events = self.link.subscribe();
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(DaemonEvent::Reconnected) => {
                        tracing::info!("daemon link re-established, reconciling zone state");
                        let managers: Vec<_> =
                            self.managers.iter().map(|e| e.value().clone()).collect();
                        for manager in managers {
                            if let Err(e) = manager.reconcile().await {
                                tracing::warn!(
                                    zone = manager.zone(),
                                    error = %e,
                                    "zone reconciliation failed"
                                );
                            }
                        }
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!("daemon event listener lagged by {} events", n);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
    }

    /// Manager for one zone, for callers that sequence sessions themselves
    #[must_use]
    pub fn manager(&self, zone: ZoneId) -> Option<Arc<ZoneManager>> {
        self.managers.get(&zone).map(|m| m.value().clone())
    }

    fn manager_or_err(&self, zone: ZoneId) -> Result<Arc<ZoneManager>, ZoneError> {
        self.manager(zone).ok_or(ZoneError::UnknownZone(zone))
    }

    /// Start a manual session; falls back to the configured default
    /// duration when none is given.
    pub async fn turn_on(&self, zone: ZoneId, duration: Option<Duration>) -> Result<(), ZoneError> {
        let duration = match duration {
            Some(d) => d,
            None => self.config.read().await.default_duration(),
        };
        self.manager_or_err(zone)?
            .start(duration, SessionOwner::Manual)
            .await
    }

    /// Stop a zone; a no-op when it is already Idle
    pub async fn turn_off(&self, zone: ZoneId) -> Result<(), ZoneError> {
        self.manager_or_err(zone)?.stop().await
    }

    /// Whether the zone's valve must be presumed open.
    ///
    /// A zone stuck in Stopping counts as on: the daemon never
    /// acknowledged the STOP, so the valve cannot be assumed closed.
    #[must_use]
    pub fn is_on(&self, zone: ZoneId) -> bool {
        self.manager(zone).is_some_and(|m| m.session().is_active())
    }

    /// Seconds left in the active session, `None` when Idle or unknown
    #[must_use]
    pub fn remaining_seconds(&self, zone: ZoneId) -> Option<u64> {
        self.manager(zone)?
            .session()
            .remaining()
            .map(|d| d.as_secs())
    }

    /// Snapshot of a zone's session
    #[must_use]
    pub fn session(&self, zone: ZoneId) -> Option<ZoneSession> {
        self.manager(zone).map(|m| m.session())
    }

    /// Subscribe to session lifecycle events across all zones
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ZoneEvent> {
        self.event_tx.subscribe()
    }

    /// Number of configured zones
    #[must_use]
    pub fn zone_count(&self) -> usize {
        self.managers.len()
    }

    /// Apply an options update: re-validate, resize the zone set, and
    /// force a reconnect when the daemon endpoint changed.
    pub async fn apply_options(&self, new: IrrigationConfig) -> Result<(), ConfigError> {
        new.validate()?;

        let mut config = self.config.write().await;
        if new.host != config.host || new.port != config.port {
            tracing::info!(host = %new.host, port = new.port, "daemon endpoint changed");
            self.link.set_endpoint(&new.host, new.port).await;
        }

        for zone in 1..=new.zones {
            self.managers.entry(zone).or_insert_with(|| {
                ZoneManager::new(zone, self.link.clone(), self.event_tx.clone())
            });
        }
        if new.zones < config.zones {
            for zone in (new.zones + 1)..=config.zones {
                if let Some((_, manager)) = self.managers.remove(&zone) {
                    if let Err(e) = manager.stop().await {
                        tracing::warn!(zone, error = %e, "failed to stop removed zone");
                    }
                }
            }
        }

        *config = new;
        Ok(())
    }
}
