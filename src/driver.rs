//! Runs one coordination episode: one gate, one producer, one consumer.

use crate::error::DriverError;
use crate::gate::create_gate;
use crate::sink::Sink;
use crate::synchronization::StartLine;
use crate::worker::{WorkerConfig, run_consumer, run_producer};
use crate::worker_thread::{WorkerThread, join_all};
use crate::{Outcome, Role};
use log::{error, info};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Parameters of one episode.
///
/// Both workers are expected to use the same `bound`; a mismatch is not
/// detected.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EpisodeConfig {
    pub producer: WorkerConfig,
    pub consumer: WorkerConfig,
    /// Upper bound for waiting on both workers. `None` waits forever.
    pub join_timeout: Option<Duration>,
}

impl EpisodeConfig {
    #[must_use]
    pub fn with_bound(bound: u32) -> Self {
        Self {
            producer: WorkerConfig::with_bound(bound),
            consumer: WorkerConfig::with_bound(bound),
            join_timeout: None,
        }
    }
}

/// Result of a finished episode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report {
    /// Wall-clock time from gate creation until both workers were joined.
    pub elapsed: Duration,
    /// Time from gate creation until the gate opened.
    pub signalled_after: Option<Duration>,
    /// One outcome per role, producer first.
    pub outcomes: Vec<(Role, Outcome)>,
    pub completed: usize,
    pub failed: usize,
}

impl Report {
    fn new(elapsed: Duration, signalled_after: Option<Duration>, outcomes: Vec<(Role, Outcome)>) -> Self {
        let completed = outcomes.iter().filter(|(_, o)| o.is_completed()).count();
        let failed = outcomes.len() - completed;
        Self {
            elapsed,
            signalled_after,
            outcomes,
            completed,
            failed,
        }
    }

    #[must_use]
    pub fn outcome(&self, role: Role) -> Option<&Outcome> {
        self.outcomes
            .iter()
            .find(|(r, _)| *r == role)
            .map(|(_, outcome)| outcome)
    }

    #[must_use]
    pub const fn all_completed(&self) -> bool {
        self.failed == 0
    }

    /// Process exit code: `0` if every worker completed, `1` otherwise.
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        if self.all_completed() { 0 } else { 1 }
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Episode       : {:>8} µs", self.elapsed.as_micros())?;
        match self.signalled_after {
            Some(after) => writeln!(f, "  |- signalled: {:>8} µs", after.as_micros())?,
            None => writeln!(f, "  |- signalled:    never")?,
        }
        for (role, outcome) in &self.outcomes {
            writeln!(f, "  {role:<9}   : {outcome}")?;
        }
        write!(f, "Completed (#): {}, failed (#): {}", self.completed, self.failed)
    }
}

/// Creates a gate, runs producer and consumer on their own threads and waits
/// for both.
///
/// A failing worker never stops the driver from waiting for the other one.
/// If `join_timeout` expires, the gate is cancelled so a waiting consumer
/// gives up, the remaining threads are abandoned and
/// [`DriverError::JoinTimedOut`] is returned.
pub fn run_episode(config: &EpisodeConfig, sink: Arc<dyn Sink>) -> Result<Report, DriverError> {
    let begin = Instant::now();
    let gate = create_gate();
    let start_line = Arc::new(StartLine::new(2));

    let producer = {
        let gate = gate.clone();
        let sink = sink.clone();
        let config = config.producer.clone();
        WorkerThread::spawn(Role::Producer, start_line.clone(), move || {
            run_producer(&gate, &config, &*sink)
        })?
    };

    let consumer = {
        let gate = gate.clone();
        let config = config.consumer.clone();
        WorkerThread::spawn(Role::Consumer, start_line.clone(), move || {
            run_consumer(&gate, &config, &*sink)
        })
    };
    let consumer = match consumer {
        Ok(consumer) => consumer,
        Err(e) => {
            // Let the producer run alone, there is nobody to wait for it.
            start_line.unblock();
            let _ = producer.join();
            return Err(e);
        }
    };

    let outcomes = match join_all(vec![producer, consumer], config.join_timeout) {
        Ok(outcomes) => outcomes,
        Err(e) => {
            gate.cancel();
            error!("abandoning episode: {e}");
            return Err(e);
        }
    };

    let signalled_after = gate.opened_at().map(|at| at.saturating_duration_since(begin));
    let report = Report::new(begin.elapsed(), signalled_after, outcomes);
    info!(
        "episode finished in {:?}: {} completed, {} failed",
        report.elapsed, report.completed, report.failed
    );
    Ok(report)
}
