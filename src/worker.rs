//! The two worker roles: [`run_producer`] counts up and opens the gate,
//! [`run_consumer`] waits for the gate and counts down.
//!
//! Both entry points are a boundary: errors and panics inside the body end up
//! in the returned [`Outcome`] and never cross into the calling thread.

use crate::error::WorkerError;
use crate::gate::RendezvousGate;
use crate::sink::{Event, Sink};
use crate::{Outcome, Role};
use log::{debug, info, warn};
use std::any::Any;
use std::io;
use std::mem;
use std::panic::{self, AssertUnwindSafe};
use std::thread::sleep;
use std::time::{Duration, Instant};

/// Upper end of the counting range if nothing else is configured.
pub const DEFAULT_BOUND: u32 = 20;

/// Parameters of one worker run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerConfig {
    /// Inclusive upper end `N` of the range `[0, N]`.
    pub bound: u32,
    /// Fixed delay after each step.
    pub pacing: Duration,
    /// Additional random delay in `[0, jitter]` after each step.
    pub jitter: Option<Duration>,
    /// Fail with [`WorkerError::WorkerFailed`] on reaching this value.
    pub fail_at: Option<u32>,
    /// Panic on reaching this value.
    pub panic_at: Option<u32>,
    /// How long the consumer waits for the gate. `None` waits forever.
    pub wait_timeout: Option<Duration>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            bound: DEFAULT_BOUND,
            pacing: Duration::ZERO,
            jitter: None,
            fail_at: None,
            panic_at: None,
            wait_timeout: None,
        }
    }
}

impl WorkerConfig {
    #[must_use]
    pub fn with_bound(bound: u32) -> Self {
        Self {
            bound,
            ..Self::default()
        }
    }

    fn inject_fault(&self, value: u32) -> Result<(), WorkerError> {
        if self.panic_at == Some(value) {
            panic!("injected panic at step {value}");
        }
        if self.fail_at == Some(value) {
            return Err(WorkerError::WorkerFailed {
                step: value,
                reason: "injected fault".to_string(),
            });
        }
        Ok(())
    }

    fn pace(&self) {
        if !self.pacing.is_zero() {
            sleep(self.pacing);
        }
        if let Some(jitter) = self.jitter {
            let max_us = jitter.as_micros() as u64;
            sleep(Duration::from_micros(fastrand::u64(0..=max_us)));
        }
    }
}

/// Opens the gate when dropped, unless it is already open.
///
/// Keeps the consumer from blocking forever when the producer leaves early
/// through `?` or a panic.
struct SignalOnDrop<'a> {
    gate: &'a RendezvousGate,
}

impl<'a> SignalOnDrop<'a> {
    const fn new(gate: &'a RendezvousGate) -> Self {
        Self { gate }
    }

    fn open(self) {
        self.gate.signal();
        mem::forget(self);
    }
}

impl Drop for SignalOnDrop<'_> {
    fn drop(&mut self) {
        if self.gate.signal() {
            debug!("[{}] gate opened on early exit", Role::Producer);
        }
    }
}

fn sink_failure(step: u32, err: &io::Error) -> WorkerError {
    WorkerError::WorkerFailed {
        step,
        reason: format!("output failed: {err}"),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

fn run_guarded(
    role: Role,
    sink: &dyn Sink,
    body: impl FnOnce() -> Result<Vec<u32>, WorkerError>,
) -> Outcome {
    let begin = Instant::now();
    let result = panic::catch_unwind(AssertUnwindSafe(body))
        .unwrap_or_else(|payload| Err(WorkerError::Panicked(panic_message(&*payload))));
    let outcome = Outcome::from(result);

    match &outcome {
        Outcome::Completed { output } => info!(
            "[{role}] completed {} steps in {:?}",
            output.len(),
            begin.elapsed()
        ),
        Outcome::Failed { reason } => warn!("[{role}] failed after {:?}: {reason}", begin.elapsed()),
        Outcome::Cancelled { reason } => {
            warn!("[{role}] cancelled after {:?}: {reason}", begin.elapsed());
        }
    }
    if let Err(e) = sink.record(role, Event::Finished(outcome.clone())) {
        warn!("[{role}] could not record outcome: {e}");
    }
    outcome
}

fn produce(gate: &RendezvousGate, config: &WorkerConfig, sink: &dyn Sink) -> Result<Vec<u32>, WorkerError> {
    let guard = SignalOnDrop::new(gate);
    let mut output = Vec::with_capacity(config.bound as usize + 1);

    for value in 0..=config.bound {
        config.inject_fault(value)?;
        sink.record(Role::Producer, Event::Step(value))
            .map_err(|e| sink_failure(value, &e))?;
        output.push(value);
        config.pace();
    }

    sink.record(Role::Producer, Event::Signal)
        .map_err(|e| sink_failure(config.bound, &e))?;
    guard.open();
    info!("[{}] count up completed, gate released", Role::Producer);

    sink.record(Role::Producer, Event::Batch(output.clone()))
        .map_err(|e| sink_failure(config.bound, &e))?;
    Ok(output)
}

fn consume(gate: &RendezvousGate, config: &WorkerConfig, sink: &dyn Sink) -> Result<Vec<u32>, WorkerError> {
    debug!("[{}] waiting on gate", Role::Consumer);
    match config.wait_timeout {
        Some(timeout) => gate.await_open_timeout(timeout)?,
        None => gate.await_open()?,
    }
    sink.record(Role::Consumer, Event::Released)
        .map_err(|e| sink_failure(config.bound, &e))?;
    info!("[{}] gate open, starting count down", Role::Consumer);

    // Dropped on any early return, partial output is never reported.
    let mut output = Vec::with_capacity(config.bound as usize + 1);
    for value in (0..=config.bound).rev() {
        config.inject_fault(value)?;
        sink.record(Role::Consumer, Event::Step(value))
            .map_err(|e| sink_failure(value, &e))?;
        output.push(value);
        config.pace();
    }

    sink.record(Role::Consumer, Event::Batch(output.clone()))
        .map_err(|e| sink_failure(0, &e))?;
    Ok(output)
}

/// Counts `0..=bound` and opens `gate` afterward.
///
/// The gate is opened on every exit path, including failures and panics, so
/// a waiting consumer always gets released.
pub fn run_producer(gate: &RendezvousGate, config: &WorkerConfig, sink: &dyn Sink) -> Outcome {
    info!("[{}] starting count up to {}", Role::Producer, config.bound);
    run_guarded(Role::Producer, sink, || produce(gate, config, sink))
}

/// Waits for `gate`, then counts `bound..=0`.
///
/// A timed out or cancelled wait yields [`Outcome::Cancelled`] without any
/// step being taken. A failure mid-count discards the partial output.
pub fn run_consumer(gate: &RendezvousGate, config: &WorkerConfig, sink: &dyn Sink) -> Outcome {
    run_guarded(Role::Consumer, sink, || consume(gate, config, sink))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GateError;
    use crate::gate::create_gate;
    use crate::sink::Journal;
    use assert2::{check, let_assert};
    use std::sync::Arc;
    use std::thread;

    struct BrokenSink;

    impl Sink for BrokenSink {
        fn record(&self, _role: Role, event: Event) -> io::Result<()> {
            match event {
                Event::Step(5) => Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed")),
                _ => Ok(()),
            }
        }
    }

    #[test]
    fn producer_counts_up_then_signals() {
        let gate = RendezvousGate::new();
        let journal = Journal::new();

        let outcome = run_producer(&gate, &WorkerConfig::with_bound(5), &journal);

        check!(outcome == Outcome::Completed { output: vec![0, 1, 2, 3, 4, 5] });
        check!(gate.is_open());
        check!(journal.steps(Role::Producer) == vec![0, 1, 2, 3, 4, 5]);
        check!(journal.batches(Role::Producer) == vec![vec![0, 1, 2, 3, 4, 5]]);

        let signal = journal.first_tick(Role::Producer, |e| *e == Event::Signal).unwrap();
        let batch = journal
            .first_tick(Role::Producer, |e| matches!(e, Event::Batch(_)))
            .unwrap();
        check!(signal < batch);
        check!(gate.signal_calls() == 1);
        check!(journal.outcome(Role::Producer) == Some(outcome));
    }

    #[test]
    fn producer_signals_on_failure() {
        let gate = RendezvousGate::new();
        let journal = Journal::new();
        let config = WorkerConfig {
            fail_at: Some(3),
            ..WorkerConfig::with_bound(5)
        };

        let outcome = run_producer(&gate, &config, &journal);

        let_assert!(Outcome::Failed { reason } = outcome);
        check!(reason == WorkerError::WorkerFailed { step: 3, reason: "injected fault".to_string() });
        check!(gate.is_open());
        check!(gate.signal_calls() == 1);
        check!(journal.steps(Role::Producer) == vec![0, 1, 2]);
        check!(journal.batches(Role::Producer).is_empty());
    }

    #[test]
    fn producer_signals_on_panic() {
        let gate = RendezvousGate::new();
        let config = WorkerConfig {
            panic_at: Some(2),
            ..WorkerConfig::with_bound(5)
        };

        let outcome = run_producer(&gate, &config, &Journal::new());

        let_assert!(Outcome::Failed { reason: WorkerError::Panicked(msg) } = outcome);
        check!(msg == "injected panic at step 2");
        check!(gate.is_open());
    }

    #[test]
    fn producer_signals_when_output_fails() {
        let gate = RendezvousGate::new();

        let outcome = run_producer(&gate, &WorkerConfig::with_bound(10), &BrokenSink);

        let_assert!(Outcome::Failed { reason: WorkerError::WorkerFailed { step: 5, .. } } = outcome);
        check!(gate.is_open());
    }

    #[test]
    fn consumer_counts_down_after_gate_opens() {
        let gate = create_gate();
        let journal = Arc::new(Journal::new());

        let consumer = {
            let gate = gate.clone();
            let journal = journal.clone();
            thread::spawn(move || run_consumer(&gate, &WorkerConfig::with_bound(3), &*journal))
        };

        thread::sleep(Duration::from_millis(20));
        check!(journal.entries().is_empty());
        gate.signal();

        let outcome = consumer.join().unwrap();
        check!(outcome == Outcome::Completed { output: vec![3, 2, 1, 0] });
        check!(journal.steps(Role::Consumer) == vec![3, 2, 1, 0]);
        check!(journal.first_tick_of(Role::Consumer) == journal.first_tick(Role::Consumer, |e| *e == Event::Released));
    }

    #[test]
    fn consumer_timeout_is_cancelled_without_steps() {
        let gate = RendezvousGate::new();
        let journal = Journal::new();
        let config = WorkerConfig {
            wait_timeout: Some(Duration::from_millis(10)),
            ..WorkerConfig::with_bound(3)
        };

        let outcome = run_consumer(&gate, &config, &journal);

        let_assert!(Outcome::Cancelled { reason: WorkerError::SignalNeverSent { waited } } = outcome);
        check!(waited >= Duration::from_millis(10));
        check!(journal.first_tick_of(Role::Consumer).is_none());
        let_assert!(Some(Outcome::Cancelled { .. }) = journal.outcome(Role::Consumer));
    }

    #[test]
    fn consumer_cancelled_wait() {
        let gate = RendezvousGate::new();
        gate.cancel();

        let outcome = run_consumer(&gate, &WorkerConfig::default(), &Journal::new());

        check!(outcome == Outcome::Cancelled { reason: WorkerError::WaitCancelled });
        check!(WorkerError::from(GateError::Cancelled) == WorkerError::WaitCancelled);
    }

    #[test]
    fn consumer_failure_discards_partial_output() {
        let gate = RendezvousGate::new();
        gate.signal();
        let journal = Journal::new();
        let config = WorkerConfig {
            fail_at: Some(1),
            ..WorkerConfig::with_bound(4)
        };

        let outcome = run_consumer(&gate, &config, &journal);

        let_assert!(Outcome::Failed { reason: WorkerError::WorkerFailed { step: 1, .. } } = &outcome);
        check!(outcome.output().is_none());
        check!(journal.steps(Role::Consumer) == vec![4, 3, 2]);
        check!(journal.batches(Role::Consumer).is_empty());
    }

    #[test]
    fn zero_bound_is_a_single_step() {
        let gate = RendezvousGate::new();
        let journal = Journal::new();
        let config = WorkerConfig::with_bound(0);

        check!(run_producer(&gate, &config, &journal) == Outcome::Completed { output: vec![0] });
        check!(run_consumer(&gate, &config, &journal) == Outcome::Completed { output: vec![0] });
    }

    #[test]
    fn panic_payloads_are_readable() {
        let owned: Box<dyn Any + Send> = Box::new("owned".to_string());
        let unknown: Box<dyn Any + Send> = Box::new(7_u8);
        check!(panic_message(&*owned) == "owned");
        check!(panic_message(&*unknown) == "unknown panic payload");
    }
}
