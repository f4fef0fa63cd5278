//! The single clock that drives phase timers and message timestamps.
//!
//! [`TokioClock`] follows tokio's timer, so tests running under
//! `#[tokio::test(start_paused = true)]` get virtual time for free.
//! [`VirtualClock`] only moves when told to.

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::oneshot;

/// Time source shared by the coordinator and every probe.
///
/// `now` is measured from the clock's creation.
pub trait Clock: Clone + Send + Sync + 'static {
    fn now(&self) -> Duration;

    fn sleep(&self, duration: Duration) -> impl Future<Output = ()> + Send + 'static;
}

/// Wall clock backed by `tokio::time`.
#[derive(Debug, Clone, Copy)]
pub struct TokioClock {
    origin: tokio::time::Instant,
}

impl TokioClock {
    #[must_use]
    pub fn new() -> Self {
        Self {
            origin: tokio::time::Instant::now(),
        }
    }
}

impl Default for TokioClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for TokioClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }

    fn sleep(&self, duration: Duration) -> impl Future<Output = ()> + Send + 'static {
        tokio::time::sleep(duration)
    }
}

#[derive(Debug, Default)]
struct VirtualState {
    now: Duration,
    sleepers: Vec<(Duration, oneshot::Sender<()>)>,
}

/// Manually advanced clock.
///
/// Sleepers wake once [`VirtualClock::advance`] moves time past their
/// deadline.
#[derive(Debug, Clone, Default)]
pub struct VirtualClock {
    state: Arc<Mutex<VirtualState>>,
}

impl VirtualClock {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, VirtualState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Move time forward and wake every sleeper whose deadline has passed.
    pub fn advance(&self, by: Duration) {
        let mut state = self.lock();
        state.now += by;
        let now = state.now;

        let (due, pending) = std::mem::take(&mut state.sleepers)
            .into_iter()
            .partition::<Vec<_>, _>(|(deadline, _)| *deadline <= now);
        state.sleepers = pending;
        drop(state);

        for (_, waker) in due {
            let _ = waker.send(());
        }
    }

    /// Number of sleeps still waiting on a future `advance`.
    #[must_use]
    pub fn pending_sleepers(&self) -> usize {
        self.lock().sleepers.len()
    }
}

impl Clock for VirtualClock {
    fn now(&self) -> Duration {
        self.lock().now
    }

    fn sleep(&self, duration: Duration) -> impl Future<Output = ()> + Send + 'static {
        let rx = {
            let mut state = self.lock();
            let deadline = state.now + duration;
            if deadline <= state.now {
                None
            } else {
                let (tx, rx) = oneshot::channel();
                state.sleepers.push((deadline, tx));
                Some(rx)
            }
        };

        async move {
            if let Some(rx) = rx {
                let _ = rx.await;
            }
        }
    }
}
