//! Observable output of the workers. See [`Sink`].

use crate::{Outcome, Role};
use log::{debug, trace};
use std::fmt::Write as _;
use std::io::{self, Write};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Something a worker makes observable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// One value of the worker's sequence.
    Step(u32),
    /// The producer is about to open the gate.
    Signal,
    /// The consumer saw the gate open.
    Released,
    /// The whole sequence, flushed once.
    Batch(Vec<u32>),
    /// The worker reached its terminal outcome. Always the last event of a
    /// role.
    Finished(Outcome),
}

impl Event {
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Finished(_))
    }
}

/// Destination for worker events.
///
/// Both workers share one sink, so implementations serialize access with
/// their own lock. That lock is independent of the gate's.
pub trait Sink: Send + Sync {
    fn record(&self, role: Role, event: Event) -> io::Result<()>;
}

/// Writes batches as one line each, e.g. `[producer] UP:   0 1 2`.
///
/// Per-step events only go to the trace log.
#[derive(Debug)]
pub struct WriterSink<W> {
    writer: Mutex<W>,
}

impl<W: Write + Send> WriterSink<W> {
    pub const fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    pub fn into_inner(self) -> W {
        self.writer
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl WriterSink<io::Stdout> {
    #[must_use]
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

fn format_batch(role: Role, values: &[u32]) -> String {
    let mut line = format!("[{role}] {:<6}", role.batch_label());
    for (i, value) in values.iter().enumerate() {
        if i > 0 {
            line.push(' ');
        }
        // Writing into a String cannot fail.
        let _ = write!(line, "{value}");
    }
    line
}

impl<W: Write + Send> Sink for WriterSink<W> {
    fn record(&self, role: Role, event: Event) -> io::Result<()> {
        match event {
            Event::Step(value) => trace!("[{role}] {value}"),
            Event::Signal => debug!("[{role}] signalling gate"),
            Event::Released => debug!("[{role}] gate open"),
            Event::Finished(outcome) => debug!("[{role}] {outcome}"),
            Event::Batch(values) => {
                let line = format_batch(role, &values);
                let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
                writeln!(writer, "{line}")?;
                writer.flush()?;
            }
        }
        Ok(())
    }
}

/// One recorded event with its logical timestamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub tick: u64,
    pub role: Role,
    pub event: Event,
}

/// Records every event with a tick from a logical clock.
///
/// Ticks are taken under the journal's lock, so they increase strictly in
/// the order the events were recorded, across both threads.
#[derive(Debug, Default)]
pub struct Journal {
    entries: Mutex<Vec<Entry>>,
}

impl Journal {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Entry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[must_use]
    pub fn entries(&self) -> Vec<Entry> {
        self.lock().clone()
    }

    /// Tick of the first event of `role` matching `pred`.
    pub fn first_tick(&self, role: Role, pred: impl Fn(&Event) -> bool) -> Option<u64> {
        self.lock()
            .iter()
            .find(|e| e.role == role && pred(&e.event))
            .map(|e| e.tick)
    }

    /// Tick of the first event of `role`, not counting its terminal one.
    #[must_use]
    pub fn first_tick_of(&self, role: Role) -> Option<u64> {
        self.first_tick(role, |e| !e.is_terminal())
    }

    /// The terminal outcome `role` reported, if it finished.
    #[must_use]
    pub fn outcome(&self, role: Role) -> Option<Outcome> {
        self.lock()
            .iter()
            .filter(|e| e.role == role)
            .find_map(|e| match &e.event {
                Event::Finished(outcome) => Some(outcome.clone()),
                _ => None,
            })
    }

    /// The values `role` emitted as single steps, in recording order.
    #[must_use]
    pub fn steps(&self, role: Role) -> Vec<u32> {
        self.lock()
            .iter()
            .filter(|e| e.role == role)
            .filter_map(|e| match e.event {
                Event::Step(value) => Some(value),
                _ => None,
            })
            .collect()
    }

    /// The batches `role` flushed.
    #[must_use]
    pub fn batches(&self, role: Role) -> Vec<Vec<u32>> {
        self.lock()
            .iter()
            .filter(|e| e.role == role)
            .filter_map(|e| match &e.event {
                Event::Batch(values) => Some(values.clone()),
                _ => None,
            })
            .collect()
    }
}

impl Sink for Journal {
    fn record(&self, role: Role, event: Event) -> io::Result<()> {
        let mut entries = self.lock();
        let tick = entries.len() as u64;
        entries.push(Entry { tick, role, event });
        Ok(())
    }
}
