//! Single-assignment completion cell.
//!
//! The state machine underneath both [`Promise`](super::Promise) and
//! [`ListenerFuture`](super::ListenerFuture): a cell transitions from pending
//! to exactly one of fulfilled/failed, and never changes again.

use crate::error::Error;
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// The settled result of a cell: the value, or the failure that produced it.
///
/// Failures travel as `Arc<Error>` so the original error reaches every
/// observer of a chain without re-wrapping.
pub type Outcome<T> = std::result::Result<T, Arc<Error>>;

enum CellState<T> {
    Pending,
    Fulfilled(T),
    Failed(Arc<Error>),
}

pub struct CompletionCell<T> {
    state: Mutex<CellState<T>>,
    settled: Condvar,
}

impl<T> CompletionCell<T> {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(CellState::Pending),
            settled: Condvar::new(),
        }
    }

    /// Transition to fulfilled. Returns whether this call won the transition;
    /// a losing call is a no-op and never overwrites the first result.
    pub fn fulfill(&self, value: T) -> bool {
        let mut state = self.state.lock();
        if !matches!(*state, CellState::Pending) {
            return false;
        }
        *state = CellState::Fulfilled(value);
        drop(state);
        self.settled.notify_all();
        true
    }

    /// Transition to failed. Same single-assignment contract as [`fulfill`].
    ///
    /// [`fulfill`]: CompletionCell::fulfill
    pub fn fail(&self, error: Arc<Error>) -> bool {
        let mut state = self.state.lock();
        if !matches!(*state, CellState::Pending) {
            return false;
        }
        *state = CellState::Failed(error);
        drop(state);
        self.settled.notify_all();
        true
    }

    pub fn is_done(&self) -> bool {
        !matches!(*self.state.lock(), CellState::Pending)
    }

    pub fn is_failed(&self) -> bool {
        matches!(*self.state.lock(), CellState::Failed(_))
    }

    /// The failure, if the cell settled failed.
    pub fn error(&self) -> Option<Arc<Error>> {
        match &*self.state.lock() {
            CellState::Failed(error) => Some(error.clone()),
            _ => None,
        }
    }
}

impl<T: Clone> CompletionCell<T> {
    /// Non-blocking read: `None` while pending.
    pub fn try_get(&self) -> Option<Outcome<T>> {
        Self::snapshot(&self.state.lock())
    }

    /// Block until settled or `timeout` elapses. `None` on timeout.
    ///
    /// Waiters park on a condvar; there is no spin loop.
    pub fn wait(&self, timeout: Duration) -> Option<Outcome<T>> {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        loop {
            if let Some(outcome) = Self::snapshot(&state) {
                return Some(outcome);
            }
            if self.settled.wait_until(&mut state, deadline).timed_out() {
                return Self::snapshot(&state);
            }
        }
    }

    fn snapshot(state: &CellState<T>) -> Option<Outcome<T>> {
        match state {
            CellState::Pending => None,
            CellState::Fulfilled(value) => Some(Ok(value.clone())),
            CellState::Failed(error) => Some(Err(error.clone())),
        }
    }
}

impl<T> Default for CompletionCell<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for CompletionCell<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match &*self.state.lock() {
            CellState::Pending => "Pending",
            CellState::Fulfilled(_) => "Fulfilled",
            CellState::Failed(_) => "Failed",
        };
        f.debug_struct("CompletionCell").field("state", &state).finish()
    }
}
