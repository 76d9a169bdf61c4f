//! Scheduler (C10): a periodic, single-flight tick driver plus a manual
//! trigger channel, built around a `tokio::select! { shutdown, tick }` loop
//! that fires the orchestrator on a fixed interval.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{broadcast, mpsc, oneshot};

use crate::db::models::run::RunSummary;
use crate::orchestrator::TickOrchestrator;

/// Result of a single trigger attempt, returned to whoever asked for it
/// (the scheduler loop itself, or the manual-trigger HTTP handler).
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "camelCase")]
pub enum TriggerOutcome {
    Ran(RunSummary),
    AlreadyRunning,
}

struct ManualTrigger {
    respond_to: oneshot::Sender<TriggerOutcome>,
}

/// Handle held in `AppState`: lets HTTP handlers ask for a manual tick and
/// read the missed-tick counter without touching the loop task directly.
#[derive(Clone)]
pub struct Scheduler {
    trigger_tx: mpsc::Sender<ManualTrigger>,
    missed_ticks: Arc<AtomicU64>,
}

impl Scheduler {
    pub fn missed_ticks(&self) -> u64 {
        self.missed_ticks.load(Ordering::Relaxed)
    }

    /// Ask the scheduler loop to run a tick right now. Waits for the loop to
    /// pick up the request and report what happened — unlike the periodic
    /// path, a manual trigger's caller wants to know the outcome.
    pub async fn trigger_manual(&self) -> TriggerOutcome {
        let (tx, rx) = oneshot::channel();
        if self
            .trigger_tx
            .send(ManualTrigger { respond_to: tx })
            .await
            .is_err()
        {
            return TriggerOutcome::AlreadyRunning;
        }
        rx.await.unwrap_or(TriggerOutcome::AlreadyRunning)
    }
}

/// Spawns the scheduler loop and returns a `Scheduler` handle plus its join
/// handle. No auto-fire on startup: the first scheduled tick fires after one
/// full `interval`, not immediately, unless a manual trigger arrives first.
pub fn spawn(
    orchestrator: Arc<TickOrchestrator>,
    interval: Duration,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> (Scheduler, tokio::task::JoinHandle<()>) {
    let (trigger_tx, mut trigger_rx) = mpsc::channel::<ManualTrigger>(8);
    let missed_ticks = Arc::new(AtomicU64::new(0));
    let handle_missed = missed_ticks.clone();

    let join = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // Consume the immediate first tick `interval()` fires at creation so
        // the scheduled path doesn't fire on startup.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    tracing::info!("scheduler loop shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    match orchestrator.try_run_tick().await {
                        Some(summary) => {
                            tracing::info!(run_id = %summary.run_id, "scheduled tick complete");
                        }
                        None => {
                            let missed = handle_missed.fetch_add(1, Ordering::Relaxed) + 1;
                            tracing::warn!(missed_ticks = missed, "scheduled tick skipped, one already running");
                        }
                    }
                }
                Some(manual) = trigger_rx.recv() => {
                    let outcome = match orchestrator.try_run_tick().await {
                        Some(summary) => TriggerOutcome::Ran(summary),
                        None => {
                            let missed = handle_missed.fetch_add(1, Ordering::Relaxed) + 1;
                            tracing::warn!(missed_ticks = missed, "manual trigger skipped, one already running");
                            TriggerOutcome::AlreadyRunning
                        }
                    };
                    let _ = manual.respond_to.send(outcome);
                }
            }
        }
    });

    (
        Scheduler {
            trigger_tx,
            missed_ticks,
        },
        join,
    )
}
