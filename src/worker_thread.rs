//! Module for worker thread control. See [`WorkerThread`] and [`join_all`].

use crate::error::DriverError;
use crate::synchronization::StartLine;
use crate::{Outcome, Role};
use log::{debug, warn};
use std::sync::Arc;
use std::sync::mpsc::{Receiver, RecvTimeoutError, SyncSender, TryRecvError, sync_channel};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Handle to a named OS thread running exactly one worker.
///
/// The thread spins on a shared [`StartLine`] before running, then sends its
/// [`Outcome`] through a channel. The outcome can be collected with
/// [`WorkerThread::join`] or, for several workers under one deadline, with
/// [`join_all`].
#[derive(Debug)]
pub struct WorkerThread {
    role: Role,
    handle: JoinHandle<()>,
    receiver: Receiver<Outcome>,
}

impl WorkerThread {
    fn thread_fn(
        work: impl FnOnce() -> Outcome,
        start_line: Arc<StartLine>,
        sender: SyncSender<Outcome>,
    ) -> impl FnOnce() {
        move || {
            start_line.wait();
            let outcome = work();
            // The receiver is gone only if the driver abandoned this worker.
            let _ = sender.send(outcome);
        }
    }

    /// Spawns a thread named after `role` that runs `work` once all parties
    /// of `start_line` arrived.
    pub fn spawn<F>(role: Role, start_line: Arc<StartLine>, work: F) -> Result<Self, DriverError>
    where
        F: FnOnce() -> Outcome + Send + 'static,
    {
        // One outcome per thread, the send never blocks.
        let (sender, receiver) = sync_channel(1);
        let handle = thread::Builder::new()
            .name(role.thread_name().to_string())
            .spawn(Self::thread_fn(work, start_line, sender))
            .map_err(|e| DriverError::Spawn(role, e))?;
        debug!("spawned {} thread", role.thread_name());

        Ok(Self {
            role,
            handle,
            receiver,
        })
    }

    #[must_use]
    pub const fn role(&self) -> Role {
        self.role
    }

    /// Waits for the worker without any deadline.
    pub fn join(self) -> Result<Outcome, DriverError> {
        let outcome = self
            .receiver
            .recv()
            .map_err(|_| DriverError::WorkerLost(self.role))?;
        self.finish();
        Ok(outcome)
    }

    fn finish(self) {
        if self.handle.join().is_err() {
            // Worker bodies catch their own panics, only the send could panic.
            warn!("{} thread panicked after reporting", self.role);
        }
    }
}

/// Waits for every worker to reach a terminal outcome.
///
/// With a `timeout`, the whole join shares one deadline. If it expires, the
/// workers still running are detached and reported in
/// [`DriverError::JoinTimedOut`]. Outcomes are returned in the order of
/// `workers`.
pub fn join_all(
    workers: Vec<WorkerThread>,
    timeout: Option<Duration>,
) -> Result<Vec<(Role, Outcome)>, DriverError> {
    let deadline = timeout.map(|t| Instant::now() + t);
    let mut outcomes = Vec::with_capacity(workers.len());
    let mut pending = Vec::new();

    for worker in workers {
        if !pending.is_empty() {
            // The deadline already passed, only pick up what is ready.
            match worker.receiver.try_recv() {
                Ok(outcome) => {
                    outcomes.push((worker.role, outcome));
                    worker.finish();
                }
                Err(TryRecvError::Empty) => pending.push(worker.role),
                Err(TryRecvError::Disconnected) => return Err(DriverError::WorkerLost(worker.role)),
            }
            continue;
        }

        let received = match deadline {
            Some(deadline) => worker
                .receiver
                .recv_timeout(deadline.saturating_duration_since(Instant::now())),
            None => worker
                .receiver
                .recv()
                .map_err(|_| RecvTimeoutError::Disconnected),
        };
        match received {
            Ok(outcome) => {
                outcomes.push((worker.role, outcome));
                worker.finish();
            }
            Err(RecvTimeoutError::Timeout) => pending.push(worker.role),
            Err(RecvTimeoutError::Disconnected) => return Err(DriverError::WorkerLost(worker.role)),
        }
    }

    if pending.is_empty() {
        Ok(outcomes)
    } else {
        Err(DriverError::JoinTimedOut {
            // `pending` is only filled when a timeout was given
            timeout: timeout.unwrap_or_default(),
            pending,
        })
    }
}
