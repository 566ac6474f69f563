//!  src/util/debounce.rs
//!  ===================================================================
//!  Timers for rescans, watcher storms and drag hover.
//!
//!  • [`DeadlineTimer`]: one pending callback; `schedule_earliest` keeps
//!    whichever deadline comes first, `schedule_replace` always re-arms.
//!  • [`Aggregator`]: leading-edge call, then trailing debounce while
//!    calls keep arriving within the window.
//!
//!  Both use `tokio::time` so paused-clock tests drive them.

use parking_lot::Mutex;
use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};
use std::time::Duration;
use tokio::{
    task::JoinHandle,
    time::{Instant, sleep, sleep_until},
};
use tracing::trace;

#[derive(Debug)]
struct Pending {
    id: u64,
    deadline: Instant,
    handle: JoinHandle<()>,
}

/// Single-slot cancellable timer.
#[derive(Debug, Default)]
pub struct DeadlineTimer {
    slot: Arc<Mutex<Option<Pending>>>,
    next_id: AtomicU64,
}

impl DeadlineTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arms the timer unless an earlier-or-equal deadline is already pending.
    /// Returns whether the timer was (re)armed.
    pub fn schedule_earliest<F>(&self, delay: Duration, fire: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        let deadline = Instant::now() + delay;
        let mut slot = self.slot.lock();
        if let Some(pending) = slot.as_ref()
            && pending.deadline <= deadline
        {
            trace!("Keeping earlier deadline");
            return false;
        }
        self.arm(&mut slot, deadline, fire);
        true
    }

    /// Arms the timer, dropping any pending callback.
    pub fn schedule_replace<F>(&self, delay: Duration, fire: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let deadline = Instant::now() + delay;
        let mut slot = self.slot.lock();
        self.arm(&mut slot, deadline, fire);
    }

    fn arm<F>(&self, slot: &mut Option<Pending>, deadline: Instant, fire: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let shared = self.slot.clone();

        // The caller holds the slot lock, so the task cannot observe the slot
        // before its own `Pending` is stored.
        let handle = tokio::spawn(async move {
            sleep_until(deadline).await;
            {
                let mut slot = shared.lock();
                if slot.as_ref().is_none_or(|p| p.id != id) {
                    return;
                }
                *slot = None;
            }
            fire();
        });

        if let Some(old) = slot.replace(Pending {
            id,
            deadline,
            handle,
        }) {
            old.handle.abort();
        }
    }

    pub fn cancel(&self) {
        if let Some(pending) = self.slot.lock().take() {
            pending.handle.abort();
        }
    }

    pub fn is_armed(&self) -> bool {
        self.slot.lock().is_some()
    }
}

impl Drop for DeadlineTimer {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[derive(Debug, Default)]
struct AggregatorState {
    last_run: Option<Instant>,
    scheduled: Option<JoinHandle<()>>,
}

/// Collapses bursts of calls into a leading call plus one trailing call.
pub struct Aggregator {
    delay: Duration,
    state: Arc<Mutex<AggregatorState>>,
    callback: Arc<dyn Fn() + Send + Sync>,
}

impl Aggregator {
    pub fn new(delay: Duration, callback: impl Fn() + Send + Sync + 'static) -> Self {
        Self {
            delay,
            state: Arc::new(Mutex::new(AggregatorState::default())),
            callback: Arc::new(callback),
        }
    }

    pub fn run(&self) {
        let now = Instant::now();
        let mut state = self.state.lock();

        if let Some(scheduled) = state.scheduled.take() {
            scheduled.abort();
        }

        if let Some(last) = state.last_run
            && now.duration_since(last) < self.delay
        {
            let shared = self.state.clone();
            let callback = self.callback.clone();
            let wait = self.delay + Duration::from_millis(1);

            state.scheduled = Some(tokio::spawn(async move {
                sleep(wait).await;
                {
                    let mut state = shared.lock();
                    state.scheduled = None;
                    state.last_run = Some(Instant::now());
                }
                callback();
            }));
            state.last_run = Some(now);
            return;
        }

        state.last_run = Some(now);
        drop(state);
        (self.callback)();
    }

    pub fn cancel(&self) {
        if let Some(scheduled) = self.state.lock().scheduled.take() {
            scheduled.abort();
        }
    }
}

impl Drop for Aggregator {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl std::fmt::Debug for Aggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Aggregator")
            .field("delay", &self.delay)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[tokio::test(start_paused = true)]
    async fn test_earliest_deadline_wins() {
        let timer = DeadlineTimer::new();
        let fired = Arc::new(Mutex::new(Vec::new()));

        let f = fired.clone();
        assert!(timer.schedule_earliest(Duration::from_millis(500), move || f.lock().push("later")));
        let f = fired.clone();
        assert!(timer.schedule_earliest(Duration::from_millis(100), move || f.lock().push("soon")));
        let f = fired.clone();
        assert!(!timer.schedule_earliest(Duration::from_millis(500), move || f.lock().push("ignored")));

        sleep(Duration::from_millis(1000)).await;
        assert_eq!(*fired.lock(), vec!["soon"]);
        assert!(!timer.is_armed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_prevents_fire() {
        let timer = DeadlineTimer::new();
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        timer.schedule_replace(Duration::from_millis(50), move || {
            c.fetch_add(1, Ordering::SeqCst);
        });
        timer.cancel();

        sleep(Duration::from_millis(100)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_aggregator_runs_leading_and_one_trailing() {
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        let aggregator = Aggregator::new(Duration::from_millis(500), move || {
            c.fetch_add(1, Ordering::SeqCst);
        });

        aggregator.run();
        assert_eq!(count.load(Ordering::SeqCst), 1);

        for _ in 0..5 {
            sleep(Duration::from_millis(50)).await;
            aggregator.run();
        }
        assert_eq!(count.load(Ordering::SeqCst), 1);

        sleep(Duration::from_millis(600)).await;
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }
}
