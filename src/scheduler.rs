//! Cooperative pattern scheduling.
//!
//! Exactly one pattern body runs at a time. A mode change is only a request
//! until the running body reaches a checkpoint; there the request is promoted
//! to `running` and the body unwinds by propagating [`Preempted`].

use log::debug;
use crate::pattern::PatternId;

/// Control signal: the running body must return now. Bodies propagate it with
/// `?` from every loop level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Preempted;

/// Ok(()) means the body finished on its own and will be dispatched again
/// (after any pending request is promoted).
pub type BodyResult = Result<(), Preempted>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerState {
    running: PatternId,
    requested: Option<PatternId>,
}

impl SchedulerState {
    pub fn new(initial: PatternId) -> Self {
        SchedulerState { running: initial, requested: None }
    }

    pub fn running(&self) -> PatternId {
        self.running
    }

    pub fn requested(&self) -> Option<PatternId> {
        self.requested
    }

    /// Last writer wins; nothing is queued.
    pub fn request_pattern(&mut self, id: PatternId) {
        if let Some(previous) = self.requested.replace(id) {
            if previous != id {
                debug!("[SCHED] request {} replaces pending {}", id, previous);
            }
        }
    }

    /// Promote a pending request. Returns true when `running` changed and the
    /// current body must unwind. A request equal to `running` is dropped.
    pub fn checkpoint(&mut self) -> bool {
        match self.requested.take() {
            Some(id) if id != self.running => {
                debug!("[SCHED] preempting {} for {}", self.running, id);
                self.running = id;
                true
            }
            _ => false,
        }
    }
}

impl Default for SchedulerState {
    fn default() -> Self {
        SchedulerState::new(PatternId::Off)
    }
}
