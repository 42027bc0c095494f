#![deny(
    clippy::all,
    clippy::cargo,
    clippy::nursery,
    clippy::must_use_candidate,
    clippy::perf
    // clippy::restriction,
    // clippy::pedantic
)]
// now allow a few rules which are denied by the above statement
// --> they are ridiculous and not necessary
#![allow(
    clippy::suboptimal_flops,
    clippy::redundant_pub_crate,
    clippy::fallible_impl_from
)]
#![deny(missing_debug_implementations)]

pub mod driver;
pub mod error;
pub mod gate;
pub mod sink;
pub mod synchronization;
pub mod worker;
pub mod worker_thread;

pub use driver::{EpisodeConfig, Report, run_episode};
pub use error::{DriverError, GateError, WorkerError};
pub use gate::{RendezvousGate, create_gate};
pub use worker::{WorkerConfig, run_consumer, run_producer};
pub use worker_thread::{WorkerThread, join_all};

use std::fmt;

/// The two sides of an episode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// Counts up and opens the gate.
    Producer,
    /// Waits for the gate and counts down.
    Consumer,
}

impl Role {
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Producer => "producer",
            Self::Consumer => "consumer",
        }
    }

    #[must_use]
    pub const fn thread_name(self) -> &'static str {
        match self {
            Self::Producer => "producer-worker",
            Self::Consumer => "consumer-worker",
        }
    }

    #[must_use]
    pub const fn batch_label(self) -> &'static str {
        match self {
            Self::Producer => "UP:",
            Self::Consumer => "DOWN:",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.name())
    }
}

/// Terminal result of a worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Completed { output: Vec<u32> },
    Failed { reason: WorkerError },
    /// The worker never started its sequence because the wait for the gate
    /// timed out or was cancelled.
    Cancelled { reason: WorkerError },
}

impl Outcome {
    #[must_use]
    pub const fn is_completed(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }

    #[must_use]
    pub fn output(&self) -> Option<&[u32]> {
        match self {
            Self::Completed { output } => Some(output),
            _ => None,
        }
    }

    #[must_use]
    pub const fn reason(&self) -> Option<&WorkerError> {
        match self {
            Self::Completed { .. } => None,
            Self::Failed { reason } | Self::Cancelled { reason } => Some(reason),
        }
    }
}

impl From<Result<Vec<u32>, WorkerError>> for Outcome {
    fn from(result: Result<Vec<u32>, WorkerError>) -> Self {
        match result {
            Ok(output) => Self::Completed { output },
            Err(reason @ (WorkerError::SignalNeverSent { .. } | WorkerError::WaitCancelled)) => {
                Self::Cancelled { reason }
            }
            Err(reason) => Self::Failed { reason },
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Completed { output } => {
                write!(f, "completed:")?;
                for value in output {
                    write!(f, " {value}")?;
                }
                Ok(())
            }
            Self::Failed { reason } => write!(f, "failed: {reason}"),
            Self::Cancelled { reason } => write!(f, "cancelled: {reason}"),
        }
    }
}
