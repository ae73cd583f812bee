use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Snapshot of a poll loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollStatus {
    pub active: bool,
    pub interval: Duration,
    /// Iterations left for a bounded run; `None` when unbounded.
    pub remaining: Option<u32>,
    /// Actions performed by the current (or last) run.
    pub iterations: u64,
}

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSummary {
    pub iterations: u64,
    /// `true` if the run stopped because of [`PollLoop::cancel`] (or a newer
    /// `start`) rather than running out of iterations.
    pub cancelled: bool,
}

#[derive(Debug, Default)]
struct PollState {
    status: PollStatus,
    generation: u64,
}

/// Repeats an async action at a fixed interval, e.g. an interval shutter.
///
/// `Idle → Active → Idle`. Cancellation is cooperative: it is observed at
/// the top of the next iteration, never in the middle of an action or a
/// sleep. Clones share the same state, so one handle can run the loop while
/// another cancels it or reads its status.
#[derive(Debug, Clone, Default)]
pub struct PollLoop {
    state: Arc<Mutex<PollState>>,
}

impl PollLoop {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the loop active and return the run.
    ///
    /// The state turns Active when `start` returns, before the future is
    /// first polled, so a `cancel` issued right after `start` is always
    /// seen. `repeat` of `None` runs until cancelled. Starting again
    /// supersedes any earlier run, which stops at its next iteration.
    ///
    /// An action error stops the loop, sets it Idle and is returned.
    /// Dropping the run, polled or not, also sets it Idle unless a newer
    /// `start` has taken over.
    pub fn start<A, Fut, E>(
        &self,
        mut action: A,
        interval: Duration,
        repeat: Option<u32>,
    ) -> impl Future<Output = Result<PollSummary, E>> + Send + 'static
    where
        A: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
        E: Send + 'static,
    {
        let generation = {
            let mut state = self.lock();
            state.generation += 1;
            state.status = PollStatus {
                active: true,
                interval,
                remaining: repeat,
                iterations: 0,
            };
            state.generation
        };
        tracing::debug!(?interval, ?repeat, generation, "poll loop started");

        let run = RunGuard {
            state: Arc::clone(&self.state),
            generation,
        };
        async move {
            let state = &run.state;
            let mut iterations = 0;
            loop {
                {
                    let mut guard = state.lock().unwrap_or_else(PoisonError::into_inner);
                    if guard.generation != generation || !guard.status.active {
                        drop(guard);
                        tracing::debug!(iterations, generation, "poll loop cancelled");
                        return Ok(PollSummary {
                            iterations,
                            cancelled: true,
                        });
                    }
                    if guard.status.remaining == Some(0) {
                        guard.status.active = false;
                        drop(guard);
                        tracing::debug!(iterations, generation, "poll loop finished");
                        return Ok(PollSummary {
                            iterations,
                            cancelled: false,
                        });
                    }
                }

                if let Err(err) = action().await {
                    let mut guard = state.lock().unwrap_or_else(PoisonError::into_inner);
                    if guard.generation == generation {
                        guard.status.active = false;
                    }
                    drop(guard);
                    tracing::warn!(iterations, generation, "poll action failed, stopping");
                    return Err(err);
                }
                iterations += 1;
                {
                    let mut guard = state.lock().unwrap_or_else(PoisonError::into_inner);
                    if guard.generation == generation {
                        guard.status.iterations = iterations;
                    }
                }

                tokio::time::sleep(interval).await;

                let mut guard = state.lock().unwrap_or_else(PoisonError::into_inner);
                if guard.generation == generation {
                    if let Some(remaining) = guard.status.remaining.as_mut() {
                        *remaining = remaining.saturating_sub(1);
                    }
                }
            }
        }
    }

    /// Request the loop to stop. Takes effect at the next iteration.
    pub fn cancel(&self) {
        let mut state = self.lock();
        if state.status.active {
            state.status.active = false;
            tracing::debug!(generation = state.generation, "poll loop cancel requested");
        }
    }

    pub fn is_active(&self) -> bool {
        self.lock().status.active
    }

    pub fn status(&self) -> PollStatus {
        self.lock().status
    }

    fn lock(&self) -> MutexGuard<'_, PollState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// Owned by a run future; marks the loop Idle when that run goes away.
struct RunGuard {
    state: Arc<Mutex<PollState>>,
    generation: u64,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.generation == self.generation && state.status.active {
            state.status.active = false;
            tracing::debug!(generation = self.generation, "poll loop run dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    fn counter() -> (Arc<AtomicU32>, impl FnMut() -> std::future::Ready<Result<(), ()>> + Send + 'static) {
        let count = Arc::new(AtomicU32::new(0));
        let seen = Arc::clone(&count);
        (count, move || {
            seen.fetch_add(1, Ordering::SeqCst);
            std::future::ready(Ok(()))
        })
    }

    #[tokio::test(start_paused = true)]
    async fn bounded_run_performs_exactly_repeat_actions() {
        let poll = PollLoop::new();
        let (count, action) = counter();

        let summary = poll
            .start(action, Duration::from_secs(2), Some(3))
            .await
            .unwrap();

        assert_eq!(count.load(Ordering::SeqCst), 3);
        assert_eq!(summary, PollSummary { iterations: 3, cancelled: false });
        let status = poll.status();
        assert!(!status.active);
        assert_eq!(status.remaining, Some(0));
        assert_eq!(status.iterations, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_right_after_start_runs_nothing() {
        let poll = PollLoop::new();
        let (count, action) = counter();

        let run = poll.start(action, Duration::from_millis(10), None);
        assert!(poll.is_active());
        poll.cancel();

        let summary = run.await.unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert!(summary.cancelled);
        assert!(!poll.is_active());
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_run_goes_idle() {
        let poll = PollLoop::new();
        let (count, action) = counter();

        let run = poll.start(action, Duration::from_secs(1), None);
        assert!(poll.is_active());
        drop(run);
        assert!(!poll.is_active());

        let (_, action) = counter();
        let handle = tokio::spawn(poll.start(action, Duration::from_secs(1), None));
        tokio::time::sleep(Duration::from_millis(1500)).await;
        handle.abort();
        assert!(handle.await.unwrap_err().is_cancelled());
        assert!(!poll.is_active());
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn unbounded_run_stops_when_cancelled_from_another_task() {
        let poll = PollLoop::new();
        let (count, action) = counter();

        let handle = tokio::spawn(poll.start(action, Duration::from_secs(1), None));
        tokio::time::sleep(Duration::from_millis(4500)).await;
        poll.cancel();

        let summary = handle.await.unwrap().unwrap();
        // Actions at t=0,1,2,3,4; cancellation observed before the sixth.
        assert_eq!(summary.iterations, 5);
        assert_eq!(count.load(Ordering::SeqCst), 5);
        assert!(summary.cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_from_inside_action_allows_no_further_action() {
        let poll = PollLoop::new();
        let handle = poll.clone();
        let count = Arc::new(AtomicU32::new(0));
        let seen = Arc::clone(&count);

        let summary = poll
            .start(
                move || {
                    seen.fetch_add(1, Ordering::SeqCst);
                    handle.cancel();
                    std::future::ready(Ok::<(), ()>(()))
                },
                Duration::from_secs(1),
                Some(10),
            )
            .await
            .unwrap();

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(summary, PollSummary { iterations: 1, cancelled: true });
    }

    #[tokio::test(start_paused = true)]
    async fn action_error_stops_and_goes_idle() {
        let poll = PollLoop::new();
        let count = Arc::new(AtomicU32::new(0));
        let seen = Arc::clone(&count);

        let err = poll
            .start(
                move || {
                    let n = seen.fetch_add(1, Ordering::SeqCst) + 1;
                    std::future::ready(if n == 2 { Err("shutter failed") } else { Ok(()) })
                },
                Duration::from_secs(1),
                None,
            )
            .await
            .unwrap_err();

        assert_eq!(err, "shutter failed");
        assert_eq!(count.load(Ordering::SeqCst), 2);
        assert!(!poll.is_active());
    }

    #[tokio::test(start_paused = true)]
    async fn restart_supersedes_previous_run() {
        let poll = PollLoop::new();
        let (first_count, first) = counter();
        let (second_count, second) = counter();

        let old = tokio::spawn(poll.start(first, Duration::from_secs(1), None));
        tokio::time::sleep(Duration::from_millis(1500)).await;

        let summary = poll.start(second, Duration::from_secs(1), Some(2)).await.unwrap();
        let old_summary = old.await.unwrap().unwrap();

        assert!(old_summary.cancelled);
        assert_eq!(first_count.load(Ordering::SeqCst), 2);
        assert_eq!(second_count.load(Ordering::SeqCst), 2);
        assert_eq!(summary, PollSummary { iterations: 2, cancelled: false });
    }

    #[test]
    fn fresh_loop_is_idle() {
        let status = PollLoop::new().status();
        assert!(!status.active);
        assert_eq!(status.remaining, None);
    }
}
