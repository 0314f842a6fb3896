//! Sequential driver for scheduled irrigation cycles
//!
//! One task per cycle run walks the step list in order, starting each
//! zone with owner `Cycle` and waiting for it to return to Idle before
//! advancing. A failing step is logged and skipped so one bad zone does
//! not abort the rest of the schedule; cancellation stops the active
//! zone and prevents any later step from starting.

use crate::error::CycleError;
use crate::model::{CycleEvent, CycleStep};
use chrono::{DateTime, Local};
use irrigation_core::{SessionOwner, ZoneController};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Launches and tracks cycle runs against a [`ZoneController`]
pub struct CycleOrchestrator {
    controller: Arc<ZoneController>,
    event_tx: broadcast::Sender<CycleEvent>,
}

impl CycleOrchestrator {
    #[must_use]
    pub fn new(controller: Arc<ZoneController>) -> Self {
        let (event_tx, _) = broadcast::channel(64);
        Self {
            controller,
            event_tx,
        }
    }

    /// Subscribe to progress events of all cycle runs
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<CycleEvent> {
        self.event_tx.subscribe()
    }

    /// Spawn a cycle run, optionally delayed until `start_at`.
    ///
    /// A start time in the past runs immediately. The returned handle
    /// cancels or joins the run; dropping it detaches the run instead.
    pub fn start_cycle(
        &self,
        steps: Vec<CycleStep>,
        start_at: Option<DateTime<Local>>,
    ) -> Result<CycleHandle, CycleError> {
        if steps.is_empty() {
            return Err(CycleError::Empty);
        }

        let id = Uuid::new_v4();
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let run = CycleRun {
            id,
            steps,
            controller: Arc::clone(&self.controller),
            event_tx: self.event_tx.clone(),
            cancel_rx,
        };

        tracing::info!(cycle = %id, start_at = ?start_at, "cycle scheduled");
        let task = tokio::spawn(run.drive(start_at));
        Ok(CycleHandle {
            id,
            cancel_tx,
            task,
        })
    }
}

/// Handle to one spawned cycle run
#[derive(Debug)]
pub struct CycleHandle {
    id: Uuid,
    cancel_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl CycleHandle {
    /// Identifier of this run
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Cancel the run: the active zone is stopped and no further step
    /// will start. Safe to call more than once.
    pub fn cancel(&self) {
        let _ = self.cancel_tx.send(true);
    }

    /// Whether the run has finished (completed or cancelled)
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the run to finish
    pub async fn join(self) {
        let _ = self.task.await;
    }
}

/// State owned by one running cycle task
struct CycleRun {
    id: Uuid,
    steps: Vec<CycleStep>,
    controller: Arc<ZoneController>,
    event_tx: broadcast::Sender<CycleEvent>,
    cancel_rx: watch::Receiver<bool>,
}

/// Resolves only when the cycle is cancelled; pends forever if the
/// handle was dropped without cancelling.
async fn cancelled(rx: &mut watch::Receiver<bool>) {
    if rx.wait_for(|cancelled| *cancelled).await.is_err() {
        std::future::pending::<()>().await;
    }
}

impl CycleRun {
    async fn drive(mut self, start_at: Option<DateTime<Local>>) {
        if let Some(at) = start_at {
            let wait = (at - Local::now()).to_std().unwrap_or(Duration::ZERO);
            if !wait.is_zero() {
                tracing::debug!(cycle = %self.id, ?wait, "waiting for scheduled start");
                tokio::select! {
                    () = tokio::time::sleep(wait) => {}
                    () = cancelled(&mut self.cancel_rx) => {
                        tracing::info!(cycle = %self.id, "cycle cancelled before start");
                        let _ = self.event_tx.send(CycleEvent::CycleCancelled {
                            cycle: self.id,
                            index: 0,
                        });
                        return;
                    }
                }
            }
        }

        let _ = self.event_tx.send(CycleEvent::CycleStarted {
            cycle: self.id,
            steps: self.steps.len(),
        });

        let steps = self.steps.clone();
        for (index, step) in steps.into_iter().enumerate() {
            if *self.cancel_rx.borrow() {
                let _ = self.event_tx.send(CycleEvent::CycleCancelled {
                    cycle: self.id,
                    index,
                });
                return;
            }

            let Some(manager) = self.controller.manager(step.zone) else {
                self.skip_step(index, step, "zone is not configured");
                continue;
            };

            let duration = Duration::from_secs(step.duration_secs);
            if let Err(e) = manager.start(duration, SessionOwner::Cycle).await {
                self.skip_step(index, step, &e.to_string());
                continue;
            }
            let _ = self.event_tx.send(CycleEvent::StepStarted {
                cycle: self.id,
                index,
                step,
            });

            tokio::select! {
                () = manager.wait_idle() => {
                    tracing::debug!(cycle = %self.id, zone = step.zone, "cycle step finished");
                    let _ = self.event_tx.send(CycleEvent::StepCompleted {
                        cycle: self.id,
                        index,
                    });
                }
                () = cancelled(&mut self.cancel_rx) => {
                    tracing::info!(cycle = %self.id, zone = step.zone, "cycle cancelled, stopping active zone");
                    if let Err(e) = manager.stop().await {
                        tracing::warn!(cycle = %self.id, zone = step.zone, error = %e, "failed to stop zone on cancel");
                    }
                    let _ = self.event_tx.send(CycleEvent::CycleCancelled {
                        cycle: self.id,
                        index,
                    });
                    return;
                }
            }
        }

        tracing::info!(cycle = %self.id, "cycle completed");
        let _ = self.event_tx.send(CycleEvent::CycleCompleted { cycle: self.id });
    }

    /// Per-step failure isolation: log, emit, move on
    fn skip_step(&self, index: usize, step: CycleStep, error: &str) {
        tracing::warn!(
            cycle = %self.id,
            zone = step.zone,
            index,
            "cycle step failed to start, skipping: {}",
            error
        );
        let _ = self.event_tx.send(CycleEvent::StepSkipped {
            cycle: self.id,
            index,
            error: error.to_string(),
        });
    }
}
