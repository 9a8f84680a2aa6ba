//! Bounded in-memory log of engine events.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};

use deletion_engine::{EngineEvent, RunEvent, RunOutcome};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::warn;

/// Keeps the most recent events and the last finished run.
#[derive(Debug)]
pub struct EventLog {
    capacity: usize,
    entries: Mutex<VecDeque<EngineEvent>>,
    last_outcome: Mutex<Option<RunOutcome>>,
}

impl EventLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: Mutex::new(VecDeque::with_capacity(capacity.max(1))),
            last_outcome: Mutex::new(None),
        }
    }

    pub fn record(&self, event: RunEvent) {
        match event {
            RunEvent::Log(e) => {
                let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
                if entries.len() == self.capacity {
                    entries.pop_front();
                }
                entries.push_back(e);
            }
            RunEvent::Finished(outcome) => {
                *self.last_outcome.lock().unwrap_or_else(PoisonError::into_inner) = Some(outcome);
            }
        }
    }

    /// Up to `limit` most recent events, oldest first.
    pub fn recent(&self, limit: usize) -> Vec<EngineEvent> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let skip = entries.len().saturating_sub(limit);
        entries.iter().skip(skip).cloned().collect()
    }

    pub fn last_outcome(&self) -> Option<RunOutcome> {
        self.last_outcome
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Drain `rx` into `log` until the engine's sender is dropped.
pub fn spawn_collector(
    mut rx: broadcast::Receiver<RunEvent>,
    log: Arc<EventLog>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => log.record(event),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "event log fell behind; events dropped");
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}
