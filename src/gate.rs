//! Implements [`RendezvousGate`] using a Mutex and a Condvar from the std
//! library.

use crate::error::GateError;
use log::trace;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

#[derive(Debug, Default)]
struct GateState {
    opened: bool,
    opened_at: Option<Instant>,
    cancelled: bool,
    // threads currently parked in one of the await functions
    waiting: usize,
    #[cfg(test)]
    signal_calls: usize,
}

/// One-shot completion signal: one writer opens it, any number of waiters
/// are released.
///
/// The gate moves from `CLOSED` to `OPEN` exactly once and never back. A fresh
/// gate has to be created for every coordination episode.
#[derive(Debug, Default)]
pub struct RendezvousGate {
    state: Mutex<GateState>,
    condvar: Condvar,
}

/// Creates a closed gate, ready to be shared between a producer and a
/// consumer.
#[must_use]
pub fn create_gate() -> Arc<RendezvousGate> {
    Arc::new(RendezvousGate::new())
}

impl RendezvousGate {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // The guarded state is plain data, it stays consistent even if a holder
    // panicked.
    fn lock(&self) -> MutexGuard<'_, GateState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Opens the gate and wakes all waiters.
    ///
    /// Never blocks beyond acquiring the internal lock. Returns `true` for the
    /// call that performed the transition; any further call leaves the state
    /// untouched, does not notify again, and returns `false`.
    pub fn signal(&self) -> bool {
        let mut guard = self.lock();
        #[cfg(test)]
        {
            guard.signal_calls += 1;
        }
        if guard.opened {
            return false;
        }
        guard.opened = true;
        guard.opened_at = Some(Instant::now());
        drop(guard);

        self.condvar.notify_all();
        trace!("gate opened");
        true
    }

    /// Requests all current and future waiters to give up.
    ///
    /// Has no effect on an open gate: a signal that already happened always
    /// wins. Returns `true` if the request was recorded.
    pub fn cancel(&self) -> bool {
        let mut guard = self.lock();
        if guard.opened {
            return false;
        }
        guard.cancelled = true;
        drop(guard);

        self.condvar.notify_all();
        trace!("gate cancelled");
        true
    }

    /// Blocks until the gate is open.
    ///
    /// Every wakeup re-checks the state under the lock, so spurious wakeups
    /// are absorbed.
    pub fn await_open(&self) -> Result<(), GateError> {
        let mut guard = self.lock();
        guard.waiting += 1;
        while !guard.opened && !guard.cancelled {
            guard = self
                .condvar
                .wait(guard)
                .unwrap_or_else(PoisonError::into_inner);
        }
        guard.waiting -= 1;

        if guard.opened {
            Ok(())
        } else {
            Err(GateError::Cancelled)
        }
    }

    /// Like [`Self::await_open`] but gives up after `timeout`.
    ///
    /// The deadline is fixed on entry, a spurious wakeup only waits for the
    /// remaining time.
    pub fn await_open_timeout(&self, timeout: Duration) -> Result<(), GateError> {
        let begin = Instant::now();
        let deadline = begin + timeout;
        let mut guard = self.lock();
        guard.waiting += 1;

        let result = loop {
            if guard.opened {
                break Ok(());
            }
            if guard.cancelled {
                break Err(GateError::Cancelled);
            }
            let now = Instant::now();
            if now >= deadline {
                break Err(GateError::TimedOut {
                    waited: begin.elapsed(),
                });
            }
            let (guard_, _) = self
                .condvar
                .wait_timeout(guard, deadline - now)
                .unwrap_or_else(PoisonError::into_inner);
            guard = guard_;
        };

        guard.waiting -= 1;
        result
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.lock().opened
    }

    /// The instant [`Self::signal`] opened the gate, if it did.
    #[must_use]
    pub fn opened_at(&self) -> Option<Instant> {
        self.lock().opened_at
    }

    /// Number of threads currently blocked on the gate.
    #[must_use]
    pub fn waiting(&self) -> usize {
        self.lock().waiting
    }

    #[cfg(test)]
    pub(crate) fn signal_calls(&self) -> usize {
        self.lock().signal_calls
    }

    /// Wakes all waiters without changing the state, the same thing a
    /// spurious wakeup does.
    #[cfg(test)]
    pub(crate) fn notify_without_opening(&self) {
        let _guard = self.lock();
        self.condvar.notify_all();
    }
}
