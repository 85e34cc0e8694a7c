//! Single-slot task queue for presentation layers
//!
//! A front end that must stay responsive hands one query at a time to the
//! slot. Generation runs on a tokio task and the result comes back as a
//! `TaskEvent` on a channel that only the front end reads. A second
//! submission while one is outstanding is rejected with `SlotBusy`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::orchestrator::{AgentOrchestrator, GenerationOutcome};

/// Messages delivered to the front end
#[derive(Debug, Clone)]
pub enum TaskEvent {
    Started { query: String },
    Finished { query: String, outcome: GenerationOutcome },
    /// The task ended without a result (it panicked)
    Aborted { query: String },
}

/// A task is already in flight
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotBusy;

impl std::fmt::Display for SlotBusy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "A request is already being processed")
    }
}

impl std::error::Error for SlotBusy {}

/// Frees the slot when the task ends, including by panic
struct SlotGuard {
    busy: Arc<AtomicBool>,
    events: mpsc::UnboundedSender<TaskEvent>,
    query: Option<String>,
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        if let Some(query) = self.query.take() {
            warn!(query = %query, "Generation task ended without a result");
            let _ = self.events.send(TaskEvent::Aborted { query });
        }
        self.busy.store(false, Ordering::Release);
    }
}

/// Runs at most one `generate` call at a time
pub struct TaskSlot {
    orchestrator: Arc<AgentOrchestrator>,
    busy: Arc<AtomicBool>,
    events: mpsc::UnboundedSender<TaskEvent>,
}

impl TaskSlot {
    /// Create a slot and the receiver its events are delivered on
    pub fn new(orchestrator: Arc<AgentOrchestrator>) -> (Self, mpsc::UnboundedReceiver<TaskEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let slot = Self {
            orchestrator,
            busy: Arc::new(AtomicBool::new(false)),
            events,
        };
        (slot, rx)
    }

    pub fn orchestrator(&self) -> &Arc<AgentOrchestrator> {
        &self.orchestrator
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Start generating code for `query` in the background
    pub fn submit(&self, query: impl Into<String>) -> Result<(), SlotBusy> {
        if self
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(SlotBusy);
        }

        let query = query.into();
        let orchestrator = Arc::clone(&self.orchestrator);
        let mut guard = SlotGuard {
            busy: Arc::clone(&self.busy),
            events: self.events.clone(),
            query: Some(query.clone()),
        };

        tokio::spawn(async move {
            let _ = guard.events.send(TaskEvent::Started { query: query.clone() });
            let outcome = orchestrator.generate(&query).await;
            debug!(query = %query, state = %outcome.state, "Generation task finished");

            guard.query = None;
            // Free the slot before the front end sees the result
            guard.busy.store(false, Ordering::Release);
            let _ = guard.events.send(TaskEvent::Finished { query, outcome });
        });

        Ok(())
    }
}
