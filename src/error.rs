//! Error types of the gate, the workers and the driver.

use crate::Role;
use std::io;
use std::time::Duration;
use thiserror::Error;

/// Why [`RendezvousGate::await_open`] returned without the gate being open.
///
/// [`RendezvousGate::await_open`]: crate::gate::RendezvousGate::await_open
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateError {
    #[error("gate did not open within {waited:?}")]
    TimedOut { waited: Duration },
    #[error("wait on gate was cancelled")]
    Cancelled,
}

/// Terminal failure reason of a worker. Carried inside an [`Outcome`].
///
/// [`Outcome`]: crate::Outcome
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WorkerError {
    #[error("producer never signalled the gate (waited {waited:?})")]
    SignalNeverSent { waited: Duration },
    #[error("wait for the producer was cancelled")]
    WaitCancelled,
    #[error("worker failed at step {step}: {reason}")]
    WorkerFailed { step: u32, reason: String },
    #[error("worker panicked: {0}")]
    Panicked(String),
}

impl From<GateError> for WorkerError {
    fn from(err: GateError) -> Self {
        match err {
            GateError::TimedOut { waited } => Self::SignalNeverSent { waited },
            GateError::Cancelled => Self::WaitCancelled,
        }
    }
}

#[derive(Error, Debug)]
pub enum DriverError {
    #[error("failed to spawn {0} thread")]
    Spawn(Role, #[source] io::Error),
    #[error("workers {pending:?} did not finish within {timeout:?}")]
    JoinTimedOut { timeout: Duration, pending: Vec<Role> },
    #[error("{0} thread exited without reporting an outcome")]
    WorkerLost(Role),
}
