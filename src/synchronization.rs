use core::hint;
use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// A one-shot busy-wait start line for a fixed number of threads.
///
/// Workers spin on it right before running their bodies, so the last arrival
/// releases everybody within a few cycles. This keeps either worker from a
/// systematic head start and makes interleavings depend on the scheduler
/// only.
#[derive(Debug)]
pub struct StartLine {
    parties: usize,
    arrived: AtomicUsize,
    released: AtomicBool,
}

impl StartLine {
    /// Create a start line for `parties` threads.
    #[must_use]
    pub const fn new(parties: usize) -> Self {
        Self {
            parties,
            arrived: AtomicUsize::new(0),
            released: AtomicBool::new(false),
        }
    }

    /// Wait until all parties have arrived, or until [`Self::unblock`].
    /// - Every thread but the last spins.
    /// - The last thread flips `released`.
    ///
    /// Returns `true` for the thread that released the others.
    pub fn wait(&self) -> bool {
        let arrival_count = self.arrived.fetch_add(1, Ordering::AcqRel) + 1;

        if arrival_count >= self.parties {
            self.released.store(true, Ordering::Release);
            true
        } else {
            while !self.released.load(Ordering::Acquire) {
                hint::spin_loop();
            }
            false
        }
    }

    /// Release all spinners even though not every party arrived.
    ///
    /// Used when a party could not be started at all.
    pub fn unblock(&self) {
        self.released.store(true, Ordering::Release);
    }

    #[must_use]
    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }
}
