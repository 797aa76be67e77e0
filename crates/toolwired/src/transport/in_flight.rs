//! Counts requests whose responses have not been written yet.

use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Shared counter of requests currently being handled.
#[derive(Debug, Default)]
pub(crate) struct InFlight {
    active: Mutex<usize>,
    idle: Condvar,
}

impl InFlight {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Marks one request as started until the returned guard drops.
    pub(crate) fn begin(self: &Arc<Self>) -> InFlightGuard {
        *self.active.lock().unwrap_or_else(PoisonError::into_inner) += 1;
        InFlightGuard {
            owner: Arc::clone(self),
        }
    }

    pub(crate) fn count(&self) -> usize {
        *self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Blocks until no request is in flight or `timeout` elapses.
    ///
    /// Returns `true` when the counter reached zero.
    pub(crate) fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        while *active > 0 {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return false;
            }
            let (guard, _) = self
                .idle
                .wait_timeout(active, remaining)
                .unwrap_or_else(PoisonError::into_inner);
            active = guard;
        }
        true
    }
}

/// Decrements the in-flight counter on drop.
#[derive(Debug)]
pub(crate) struct InFlightGuard {
    owner: Arc<InFlight>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        let mut active = self
            .owner
            .active
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        *active = active.saturating_sub(1);
        if *active == 0 {
            self.owner.idle.notify_all();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;

    #[test]
    fn idle_when_nothing_started() {
        let in_flight = InFlight::new();
        assert!(in_flight.wait_idle(Duration::ZERO));
    }

    #[test]
    fn tracks_guards() {
        let in_flight = InFlight::new();
        let first = in_flight.begin();
        let second = in_flight.begin();
        assert_eq!(in_flight.count(), 2);
        drop(first);
        assert_eq!(in_flight.count(), 1);
        drop(second);
        assert_eq!(in_flight.count(), 0);
    }

    #[test]
    fn wait_times_out_while_busy() {
        let in_flight = InFlight::new();
        let _guard = in_flight.begin();
        assert!(!in_flight.wait_idle(Duration::from_millis(20)));
    }

    #[test]
    fn wait_returns_once_the_last_guard_drops() {
        let in_flight = InFlight::new();
        let guard = in_flight.begin();
        let worker = thread::spawn(move || {
            thread::sleep(Duration::from_millis(30));
            drop(guard);
        });
        assert!(in_flight.wait_idle(Duration::from_secs(2)));
        worker.join().expect("join worker");
    }
}
