use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use tracing::{debug, trace, warn};

use crate::statemachine::QbftEvent;
use crate::types::{ConsensusRoundIdentifier, RoundTimer};

type ActiveTimers = Arc<Mutex<HashMap<ConsensusRoundIdentifier, AbortHandle>>>;

/// [`RoundTimer`] on tokio tasks. An expiry is delivered as [`QbftEvent::RoundExpiry`] on
/// the controller's intake.
///
/// Must be used from within a tokio runtime.
#[derive(Debug, Clone)]
pub struct TokioRoundTimer {
    events: mpsc::Sender<QbftEvent>,
    active_timers: ActiveTimers,
}

impl TokioRoundTimer {
    pub fn new(events: mpsc::Sender<QbftEvent>) -> Self {
        Self { events, active_timers: Arc::default() }
    }

    pub fn is_running(&self, round: &ConsensusRoundIdentifier) -> bool {
        lock(&self.active_timers).contains_key(round)
    }
}

fn lock(timers: &ActiveTimers) -> MutexGuard<'_, HashMap<ConsensusRoundIdentifier, AbortHandle>> {
    timers.lock().unwrap_or_else(PoisonError::into_inner)
}

impl RoundTimer for TokioRoundTimer {
    fn start_timer(&self, round: ConsensusRoundIdentifier, timeout: Duration) {
        let mut active = lock(&self.active_timers);
        if let Some(existing) = active.remove(&round) {
            existing.abort();
            debug!(target: "consensus::qbft::timer", %round, "Restarting running timer");
        }

        let events = self.events.clone();
        let timers = Arc::clone(&self.active_timers);
        let task = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            lock(&timers).remove(&round);
            if let Err(e) = events.send(QbftEvent::RoundExpiry(round)).await {
                warn!(target: "consensus::qbft::timer", %round, error = %e, "Intake closed, dropping round expiry");
            }
        });

        active.insert(round, task.abort_handle());
        debug!(target: "consensus::qbft::timer", %round, timeout_ms = timeout.as_millis() as u64, "Started round timer");
    }

    fn cancel_timer(&self, round: ConsensusRoundIdentifier) {
        if let Some(handle) = lock(&self.active_timers).remove(&round) {
            handle.abort();
            debug!(target: "consensus::qbft::timer", %round, "Cancelled round timer");
        } else {
            trace!(target: "consensus::qbft::timer", %round, "No running timer to cancel");
        }
    }
}
