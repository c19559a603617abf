//! Time-shaped worker pool.
//!
//! [`ConcurrencyManager`] keeps between 1 and `target_concurrency` tasks in
//! flight for a fixed wall-clock duration. The number of active slots is
//! recomputed on every tick from a [`LoadPattern`], and finished tasks are
//! reaped as soon as they complete so their slot can be refilled.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tokio::task::{JoinError, JoinSet};
use tokio::time::{Instant, MissedTickBehavior};

pub use loadbench_core::LoadPattern;

/// Default cadence for recomputing the active pool size.
pub const DEFAULT_TICK: Duration = Duration::from_millis(10);

/// Clock the load pattern is evaluated against.
///
/// A window that is part of a longer run passes the run-relative offset so
/// ramp, spike and wave shapes span the whole run instead of restarting in
/// every window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PatternClock {
    /// Time already elapsed in the run when the window starts.
    pub offset: Duration,
    /// Total run length the pattern is shaped over.
    pub total: Duration,
}

impl PatternClock {
    /// Clock for a standalone window of `duration`.
    pub fn window(duration: Duration) -> Self {
        Self {
            offset: Duration::ZERO,
            total: duration,
        }
    }

    /// Clock for a window starting `offset` into a run lasting `total`.
    pub fn run(offset: Duration, total: Duration) -> Self {
        Self { offset, total }
    }
}

/// Bounded, continuously retuned worker pool.
#[derive(Debug, Clone)]
pub struct ConcurrencyManager {
    target_concurrency: usize,
    tick: Duration,
}

impl ConcurrencyManager {
    /// Create a manager whose pool never exceeds `target_concurrency`.
    ///
    /// A target of zero is treated as one.
    pub fn new(target_concurrency: usize) -> Self {
        Self {
            target_concurrency: target_concurrency.max(1),
            tick: DEFAULT_TICK,
        }
    }

    /// Override the pool-resize cadence.
    #[must_use]
    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = tick.max(Duration::from_millis(1));
        self
    }

    pub fn target_concurrency(&self) -> usize {
        self.target_concurrency
    }

    /// Run `task` over `args` round-robin for `duration`, shaped by `pattern`.
    ///
    /// Returns the output of every task that finished, including tasks still
    /// in flight when the duration elapsed. Tasks that return `Err` or panic
    /// are logged and left out of the result.
    pub async fn execute_concurrent<A, F, Fut, T, E>(
        &self,
        task: F,
        args: &[A],
        duration: Duration,
        pattern: LoadPattern,
    ) -> Vec<T>
    where
        A: Clone,
        F: Fn(A) -> Fut,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Display + Send + 'static,
    {
        self.execute_with_clock(task, args, duration, pattern, PatternClock::window(duration))
            .await
    }

    /// Same as [`execute_concurrent`](Self::execute_concurrent), evaluating
    /// `pattern` against `clock` instead of the window itself.
    pub async fn execute_with_clock<A, F, Fut, T, E>(
        &self,
        task: F,
        args: &[A],
        duration: Duration,
        pattern: LoadPattern,
        clock: PatternClock,
    ) -> Vec<T>
    where
        A: Clone,
        F: Fn(A) -> Fut,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Display + Send + 'static,
    {
        if args.is_empty() {
            tracing::warn!("No tasks to execute, skipping window");
            return Vec::new();
        }

        let start = Instant::now();
        let total_secs = clock.total.as_secs_f64();
        let mut in_flight: JoinSet<Result<T, E>> = JoinSet::new();
        let mut results = Vec::new();
        let mut next_arg = 0usize;
        let mut submitted = 0usize;
        let mut failed = 0usize;

        let mut ticker = tokio::time::interval(self.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        tracing::debug!(
            target_concurrency = self.target_concurrency,
            pattern = %pattern,
            duration_secs = duration.as_secs_f64(),
            "Starting concurrent execution"
        );

        loop {
            let elapsed = start.elapsed();
            if elapsed >= duration {
                break;
            }

            let run_elapsed = (clock.offset + elapsed).as_secs_f64();
            let current = pattern.concurrency_at(run_elapsed, total_secs, self.target_concurrency);

            while in_flight.len() < current {
                let arg = args[next_arg].clone();
                next_arg = (next_arg + 1) % args.len();
                in_flight.spawn(task(arg));
                submitted += 1;
            }

            tokio::select! {
                _ = ticker.tick() => {}
                Some(joined) = in_flight.join_next() => {
                    if !reap(joined, &mut results) {
                        failed += 1;
                    }
                }
            }
        }

        // Drain whatever is still running; in-flight work is never discarded.
        let draining = in_flight.len();
        while let Some(joined) = in_flight.join_next().await {
            if !reap(joined, &mut results) {
                failed += 1;
            }
        }

        tracing::debug!(
            submitted,
            completed = results.len(),
            failed,
            drained = draining,
            elapsed_secs = start.elapsed().as_secs_f64(),
            "Concurrent execution finished"
        );

        results
    }
}

/// Record one joined task. Returns `false` if it failed or panicked.
fn reap<T, E: Display>(joined: Result<Result<T, E>, JoinError>, results: &mut Vec<T>) -> bool {
    match joined {
        Ok(Ok(output)) => {
            results.push(output);
            true
        }
        Ok(Err(e)) => {
            tracing::warn!(error = %e, "Task failed");
            false
        }
        Err(e) => {
            tracing::error!(error = %e, "Task panicked or was cancelled");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Default)]
    struct Gauge {
        active: AtomicUsize,
        peak: AtomicUsize,
        started: AtomicUsize,
    }

    impl Gauge {
        fn enter(&self) {
            self.started.fetch_add(1, Ordering::SeqCst);
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
        }

        fn exit(&self) {
            self.active.fetch_sub(1, Ordering::SeqCst);
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_constant_pool_stays_bounded_and_loses_nothing() {
        let gauge = Arc::new(Gauge::default());
        let manager = ConcurrencyManager::new(5);

        let task_gauge = Arc::clone(&gauge);
        let results = manager
            .execute_concurrent(
                move |n: usize| {
                    let gauge = Arc::clone(&task_gauge);
                    async move {
                        gauge.enter();
                        tokio::time::sleep(Duration::from_millis(5)).await;
                        gauge.exit();
                        Ok::<_, String>(n)
                    }
                },
                &[1, 2, 3],
                Duration::from_secs(2),
                LoadPattern::Constant,
            )
            .await;

        assert!(gauge.peak.load(Ordering::SeqCst) <= 5);
        assert_eq!(gauge.peak.load(Ordering::SeqCst), 5);
        assert_eq!(results.len(), gauge.started.load(Ordering::SeqCst));
        assert_eq!(gauge.active.load(Ordering::SeqCst), 0);
        assert!(!results.is_empty());
    }

    #[tokio::test]
    async fn test_args_cycle_round_robin() {
        let manager = ConcurrencyManager::new(1);
        let results = manager
            .execute_concurrent(
                |c: char| async move {
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    Ok::<_, String>(c)
                },
                &['a', 'b', 'c'],
                Duration::from_millis(150),
                LoadPattern::Constant,
            )
            .await;

        assert!(results.len() >= 4);
        for (i, c) in results.iter().enumerate() {
            assert_eq!(*c, ['a', 'b', 'c'][i % 3]);
        }
    }

    #[tokio::test]
    async fn test_failures_and_panics_are_excluded() {
        let manager = ConcurrencyManager::new(3);
        let results = manager
            .execute_concurrent(
                |n: u32| async move {
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    match n {
                        0 => Err("boom".to_string()),
                        1 => panic!("handler panicked"),
                        _ => Ok(n),
                    }
                },
                &[0, 1, 2],
                Duration::from_millis(200),
                LoadPattern::Constant,
            )
            .await;

        assert!(!results.is_empty());
        assert!(results.iter().all(|n| *n == 2));
    }

    #[tokio::test]
    async fn test_in_flight_tasks_are_drained() {
        let manager = ConcurrencyManager::new(4);
        let start = Instant::now();
        let results = manager
            .execute_concurrent(
                |_: ()| async {
                    tokio::time::sleep(Duration::from_millis(300)).await;
                    Ok::<_, String>(())
                },
                &[()],
                Duration::from_millis(50),
                LoadPattern::Constant,
            )
            .await;

        assert_eq!(results.len(), 4);
        assert!(start.elapsed() >= Duration::from_millis(300));
    }

    #[tokio::test]
    async fn test_empty_args_returns_nothing() {
        let manager = ConcurrencyManager::new(4);
        let results = manager
            .execute_concurrent(
                |n: u8| async move { Ok::<_, String>(n) },
                &[],
                Duration::from_secs(5),
                LoadPattern::Constant,
            )
            .await;
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_ramp_up_starts_with_single_worker() {
        let gauge = Arc::new(Gauge::default());
        let manager = ConcurrencyManager::new(10).with_tick(Duration::from_millis(2));

        let task_gauge = Arc::clone(&gauge);
        manager
            .execute_with_clock(
                move |_: ()| {
                    let gauge = Arc::clone(&task_gauge);
                    async move {
                        gauge.enter();
                        tokio::time::sleep(Duration::from_millis(5)).await;
                        gauge.exit();
                        Ok::<_, String>(())
                    }
                },
                &[()],
                Duration::from_millis(100),
                LoadPattern::RampUp,
                PatternClock::run(Duration::ZERO, Duration::from_secs(600)),
            )
            .await;

        // 100ms into a 600s ramp the pattern still asks for one worker.
        assert_eq!(gauge.peak.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_zero_target_is_clamped() {
        assert_eq!(ConcurrencyManager::new(0).target_concurrency(), 1);
    }

    #[test]
    fn test_tick_override_has_a_floor() {
        assert_eq!(ConcurrencyManager::new(4).tick, DEFAULT_TICK);
        let manager = ConcurrencyManager::new(4).with_tick(Duration::from_millis(25));
        assert_eq!(manager.tick, Duration::from_millis(25));
        let manager = ConcurrencyManager::new(4).with_tick(Duration::ZERO);
        assert_eq!(manager.tick, Duration::from_millis(1));
    }
}
