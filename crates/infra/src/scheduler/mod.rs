//! Fixed-interval background tasks.
//!
//! Each task runs on its own named thread. A run that overruns its interval
//! delays the next tick rather than stacking up, and a task never runs twice
//! at once: on-demand runs that find one in flight are skipped.

mod tasks;

pub use tasks::{AutoApproveSweep, BackgroundJobs, LowStockSweep};

use std::io;
use std::sync::mpsc::{self, RecvTimeoutError, TryRecvError};
use std::sync::{Arc, Mutex, TryLockError};
use std::thread;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::services::ServiceResult;

/// Upper bound on how long the loop sleeps before re-checking for triggers.
const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// A unit of periodic work.
pub trait PeriodicTask: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    fn run(&self) -> ServiceResult<()>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TaskStats {
    pub runs: u64,
    pub failures: u64,
    pub skipped: u64,
    pub last_run: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Completed,
    Failed,
    /// Another run was already in flight.
    Skipped,
}

/// A task plus its single-flight guard and counters.
pub struct Scheduler {
    task: Arc<dyn PeriodicTask>,
    in_flight: Mutex<()>,
    stats: Mutex<TaskStats>,
}

impl Scheduler {
    pub fn new(task: Arc<dyn PeriodicTask>) -> Self {
        Self {
            task,
            in_flight: Mutex::new(()),
            stats: Mutex::new(TaskStats::default()),
        }
    }

    pub fn name(&self) -> &'static str {
        self.task.name()
    }

    /// Run the task now unless a run is already in progress.
    pub fn run_now(&self) -> RunOutcome {
        let _guard = match self.in_flight.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
            Err(TryLockError::WouldBlock) => {
                debug!(task = self.name(), "run already in flight; skipping");
                self.record(|s| s.skipped += 1);
                return RunOutcome::Skipped;
            }
        };

        let started = Instant::now();
        let result = self.task.run();
        let elapsed_ms = started.elapsed().as_millis() as u64;
        let now = Utc::now();
        match result {
            Ok(()) => {
                debug!(task = self.name(), elapsed_ms, "task run completed");
                self.record(|s| {
                    s.runs += 1;
                    s.last_run = Some(now);
                    s.last_error = None;
                });
                RunOutcome::Completed
            }
            Err(e) => {
                warn!(task = self.name(), elapsed_ms, error = %e, "task run failed");
                self.record(|s| {
                    s.runs += 1;
                    s.failures += 1;
                    s.last_run = Some(now);
                    s.last_error = Some(e.to_string());
                });
                RunOutcome::Failed
            }
        }
    }

    pub fn stats(&self) -> TaskStats {
        match self.stats.lock() {
            Ok(s) => s.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Start the loop on a dedicated thread. The first run happens
    /// immediately, then every `interval`.
    pub fn spawn(self: Arc<Self>, interval: Duration) -> io::Result<SchedulerHandle> {
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
        let (trigger_tx, trigger_rx) = mpsc::sync_channel::<()>(1);

        let scheduler = self.clone();
        let join = thread::Builder::new()
            .name(self.name().to_string())
            .spawn(move || scheduler.run_loop(interval, shutdown_rx, trigger_rx))?;

        Ok(SchedulerHandle {
            scheduler: self,
            shutdown: shutdown_tx,
            trigger: trigger_tx,
            join: Some(join),
        })
    }

    fn run_loop(
        &self,
        interval: Duration,
        shutdown_rx: mpsc::Receiver<()>,
        trigger_rx: mpsc::Receiver<()>,
    ) {
        info!(task = self.name(), interval_secs = interval.as_secs(), "scheduler started");

        let mut next_tick = Instant::now() + interval;
        let mut pending = true;

        loop {
            match shutdown_rx.try_recv() {
                Ok(()) | Err(TryRecvError::Disconnected) => break,
                Err(TryRecvError::Empty) => {}
            }

            let now = Instant::now();
            if now >= next_tick {
                pending = true;
                while next_tick <= now {
                    next_tick += interval;
                }
            }
            while trigger_rx.try_recv().is_ok() {
                pending = true;
            }

            if pending {
                pending = false;
                self.run_now();
                continue;
            }

            let wait = next_tick
                .saturating_duration_since(Instant::now())
                .min(POLL_INTERVAL);
            match shutdown_rx.recv_timeout(wait) {
                Err(RecvTimeoutError::Timeout) => {}
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        info!(task = self.name(), "scheduler stopped");
    }

    fn record(&self, update: impl FnOnce(&mut TaskStats)) {
        match self.stats.lock() {
            Ok(mut s) => update(&mut s),
            Err(poisoned) => update(&mut poisoned.into_inner()),
        }
    }
}

/// Running scheduler: trigger, inspect and stop it.
pub struct SchedulerHandle {
    scheduler: Arc<Scheduler>,
    shutdown: mpsc::Sender<()>,
    trigger: mpsc::SyncSender<()>,
    join: Option<thread::JoinHandle<()>>,
}

impl SchedulerHandle {
    /// Ask the loop for an extra run. Requests made while one is already
    /// queued are coalesced.
    pub fn trigger(&self) {
        let _ = self.trigger.try_send(());
    }

    /// Run on the caller's thread; skipped if the loop is mid-run.
    pub fn run_now(&self) -> RunOutcome {
        self.scheduler.run_now()
    }

    pub fn stats(&self) -> TaskStats {
        self.scheduler.stats()
    }

    pub fn name(&self) -> &'static str {
        self.scheduler.name()
    }

    /// Stop the loop and wait for an in-flight run to finish.
    pub fn shutdown(mut self) {
        let _ = self.shutdown.send(());
        if let Some(join) = self.join.take() {
            if join.join().is_err() {
                warn!(task = self.scheduler.name(), "scheduler thread panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::ServiceError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::mpsc::Receiver;

    struct Counting {
        runs: AtomicUsize,
        fail: bool,
    }

    impl PeriodicTask for Counting {
        fn name(&self) -> &'static str {
            "counting"
        }

        fn run(&self) -> ServiceResult<()> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(ServiceError::Internal("boom".to_string()));
            }
            Ok(())
        }
    }

    /// Blocks inside `run` until released.
    struct Blocking {
        entered: Mutex<mpsc::Sender<()>>,
        release: Mutex<Receiver<()>>,
    }

    impl PeriodicTask for Blocking {
        fn name(&self) -> &'static str {
            "blocking"
        }

        fn run(&self) -> ServiceResult<()> {
            let _ = self.entered.lock().unwrap().send(());
            let _ = self.release.lock().unwrap().recv();
            Ok(())
        }
    }

    fn wait_for(cond: impl Fn() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !cond() {
            assert!(Instant::now() < deadline, "condition not reached in time");
            thread::sleep(Duration::from_millis(10));
        }
    }

    #[test]
    fn run_now_records_outcomes() {
        let ok = Scheduler::new(Arc::new(Counting { runs: AtomicUsize::new(0), fail: false }));
        assert_eq!(ok.run_now(), RunOutcome::Completed);

        let failing = Scheduler::new(Arc::new(Counting { runs: AtomicUsize::new(0), fail: true }));
        assert_eq!(failing.run_now(), RunOutcome::Failed);
        let stats = failing.stats();
        assert_eq!((stats.runs, stats.failures), (1, 1));
        assert_eq!(stats.last_error.as_deref(), Some("internal error: boom"));
    }

    #[test]
    fn overlapping_runs_are_skipped() {
        let (entered_tx, entered_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        let scheduler = Arc::new(Scheduler::new(Arc::new(Blocking {
            entered: Mutex::new(entered_tx),
            release: Mutex::new(release_rx),
        })));

        let first = {
            let scheduler = scheduler.clone();
            thread::spawn(move || scheduler.run_now())
        };
        entered_rx.recv().unwrap();
        assert_eq!(scheduler.run_now(), RunOutcome::Skipped);

        release_tx.send(()).unwrap();
        assert_eq!(first.join().unwrap(), RunOutcome::Completed);
        let stats = scheduler.stats();
        assert_eq!((stats.runs, stats.skipped), (1, 1));
    }

    #[test]
    fn spawned_loop_runs_on_start_and_on_trigger() {
        let task = Arc::new(Counting { runs: AtomicUsize::new(0), fail: false });
        let handle = Arc::new(Scheduler::new(task.clone()))
            .spawn(Duration::from_secs(3600))
            .unwrap();

        wait_for(|| task.runs.load(Ordering::SeqCst) == 1);
        handle.trigger();
        wait_for(|| task.runs.load(Ordering::SeqCst) == 2);

        handle.shutdown();
        assert_eq!(task.runs.load(Ordering::SeqCst), 2);
    }
}
