//! Update Scheduler
//!
//! The scheduler batches deferred work. Component re-renders and watcher
//! callbacks are queued as [`Job`]s; the queue is drained by a flush that
//! runs after the synchronous frame that queued them.
//!
//! # Algorithm
//!
//! 1. [`queue_job`] appends a job unless it is already waiting, then makes
//!    sure exactly one flush is requested.
//!
//! 2. [`flush_jobs`] clears the pending-flush flag *before* taking the
//!    queue, then runs every job in enqueue order. Jobs queued while the
//!    flush runs land in a fresh queue and request a new flush.
//!
//! 3. Jobs are expected to re-check their own dirty state, so a job that
//!    runs twice (once from the taken copy, once from the new queue) does
//!    its work once.
//!
//! # Drivers
//!
//! How the requested flush gets executed is chosen by
//! [`FlushDriver`](crate::config::FlushDriver). With the manual driver the
//! host calls [`flush_jobs`] or [`run_until_idle`] itself. With the tokio
//! driver the flush is spawned on the current `LocalSet`. Tokio cannot be
//! asked whether a `LocalSet` is running, so futures that queue work must be
//! driven through [`run_local`] or wrapped with [`within_local_set`]; outside
//! them no flush is spawned and the jobs wait for the host.
//!
//! All state is thread-local.

mod job;
mod queue;

pub use job::{Job, JobId};
pub use queue::JobQueue;

use std::cell::{Cell, RefCell};
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use tracing::{debug, trace, warn};

use crate::config::{FlushDriver, SchedulerConfig};
use crate::error::{Error, Result};

#[derive(Default)]
struct SchedulerState {
    queue: JobQueue,
    flush_pending: bool,
    flushing: bool,
    config: SchedulerConfig,
}

thread_local! {
    static SCHEDULER: RefCell<SchedulerState> = RefCell::new(SchedulerState::default());
    /// Number of [`InLocalSet`] futures being polled on this thread.
    static LOCAL_SET_DEPTH: Cell<usize> = const { Cell::new(0) };
}

fn with_state<R>(f: impl FnOnce(&mut SchedulerState) -> R) -> R {
    SCHEDULER.with(|state| f(&mut state.borrow_mut()))
}

/// Install a configuration for this thread's scheduler.
pub fn configure(config: SchedulerConfig) {
    debug!(?config, "scheduler configured");
    with_state(|state| state.config = config);
}

/// The configuration in effect on this thread.
pub fn config() -> SchedulerConfig {
    with_state(|state| state.config.clone())
}

/// Queue a job for the next flush.
///
/// A job already waiting is not queued twice. With
/// [`FlushDriver::TokioLocal`] outside [`run_local`] or
/// [`within_local_set`], the job stays queued until the host flushes.
pub fn queue_job(job: &Job) {
    let request = with_state(|state| {
        if state.queue.push(job.clone()) {
            trace!(job = ?job.id(), "job queued");
        }
        if state.flush_pending {
            None
        } else {
            state.flush_pending = true;
            Some(state.config.driver)
        }
    });

    if let Some(driver) = request {
        if !request_flush(driver) {
            with_state(|state| state.flush_pending = false);
        }
    }
}

/// Returns whether a flush is now on its way.
fn request_flush(driver: FlushDriver) -> bool {
    match driver {
        FlushDriver::Manual => {
            trace!("flush requested");
            true
        }
        FlushDriver::TokioLocal => {
            if !in_local_set() {
                warn!("tokio driver used outside a LocalSet; flush left to the host");
                return false;
            }
            tokio::task::spawn_local(within_local_set(async {
                flush_jobs();
            }));
            true
        }
    }
}

fn in_local_set() -> bool {
    LOCAL_SET_DEPTH.with(Cell::get) > 0
}

struct LocalSetEntered;

impl LocalSetEntered {
    fn enter() -> Self {
        LOCAL_SET_DEPTH.with(|depth| depth.set(depth.get() + 1));
        Self
    }
}

impl Drop for LocalSetEntered {
    fn drop(&mut self) {
        let _ = LOCAL_SET_DEPTH.try_with(|depth| depth.set(depth.get().saturating_sub(1)));
    }
}

/// Future returned by [`within_local_set`].
#[must_use = "futures do nothing unless polled"]
pub struct InLocalSet<F> {
    inner: Pin<Box<F>>,
}

impl<F: Future> Future for InLocalSet<F> {
    type Output = F::Output;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let _entered = LocalSetEntered::enter();
        self.inner.as_mut().poll(cx)
    }
}

/// Mark `future` as running on a `tokio::task::LocalSet`.
///
/// While it is being polled, the tokio driver spawns flushes with
/// `spawn_local`. The caller guarantees the future is polled by a `LocalSet`
/// (for example through `LocalSet::run_until`).
pub fn within_local_set<F: Future>(future: F) -> InLocalSet<F> {
    InLocalSet {
        inner: Box::pin(future),
    }
}

/// Run `future` on a fresh `LocalSet` with the tokio driver enabled.
pub async fn run_local<F: Future>(future: F) -> F::Output {
    tokio::task::LocalSet::new()
        .run_until(within_local_set(future))
        .await
}

/// Remove a job from the queue if it is waiting.
pub fn invalidate_job(job: &Job) {
    let _ = SCHEDULER.try_with(|state| {
        if let Ok(mut state) = state.try_borrow_mut() {
            if state.queue.remove(job.id()) {
                trace!(job = ?job.id(), "job invalidated");
            }
        }
    });
}

struct FlushGuard;

impl Drop for FlushGuard {
    fn drop(&mut self) {
        let _ = SCHEDULER.try_with(|state| state.borrow_mut().flushing = false);
    }
}

/// Run every queued job in enqueue order. Returns how many ran.
///
/// Calling this from inside a job is refused: the inner call logs a warning
/// and returns 0, and the outer flush carries on.
pub fn flush_jobs() -> usize {
    let jobs = with_state(|state| {
        if state.flushing {
            return None;
        }
        state.flushing = true;
        state.flush_pending = false;
        Some(state.queue.take())
    });

    let Some(jobs) = jobs else {
        warn!("flush_jobs called while a flush is running; ignored");
        return 0;
    };
    let _guard = FlushGuard;

    if !jobs.is_empty() {
        debug!(count = jobs.len(), "flushing jobs");
    }
    for job in &jobs {
        job.run();
    }
    jobs.len()
}

/// Flush until the queue stays empty.
///
/// Returns the total number of jobs run, or
/// [`Error::FlushLimitExceeded`] if jobs keep queueing more jobs for longer
/// than [`SchedulerConfig::max_flush_cycles`] flushes.
pub fn run_until_idle() -> Result<usize> {
    let limit = config().max_flush_cycles;
    let mut total = 0;

    for _ in 0..limit {
        if !has_pending_jobs() {
            return Ok(total);
        }
        total += flush_jobs();
    }

    if has_pending_jobs() {
        warn!(limit, "update queue did not settle");
        return Err(Error::FlushLimitExceeded(limit));
    }
    Ok(total)
}

pub fn has_pending_jobs() -> bool {
    with_state(|state| !state.queue.is_empty())
}

pub fn pending_job_count() -> usize {
    with_state(|state| state.queue.len())
}

/// Whether a flush has been requested but has not started yet.
pub fn is_flush_pending() -> bool {
    with_state(|state| state.flush_pending)
}

/// Wait until the current batch has been applied.
///
/// Yields once so a spawned flush can run, then drains whatever is still
/// queued.
pub async fn next_tick() {
    tokio::task::yield_now().await;
    if has_pending_jobs() {
        flush_jobs();
    }
}

#[cfg(test)]
mod tests {
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    use super::*;

    fn recording_job(log: &Rc<RefCell<Vec<&'static str>>>, name: &'static str) -> Job {
        let log = log.clone();
        Job::new(move || log.borrow_mut().push(name))
    }

    #[test]
    fn jobs_run_once_in_enqueue_order() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let a = recording_job(&log, "a");
        let b = recording_job(&log, "b");

        queue_job(&b);
        queue_job(&a);
        queue_job(&b);
        assert!(is_flush_pending());
        assert_eq!(pending_job_count(), 2);

        assert_eq!(flush_jobs(), 2);
        assert_eq!(*log.borrow(), vec!["b", "a"]);
        assert!(!is_flush_pending());
        assert!(!has_pending_jobs());
    }

    #[test]
    fn invalidated_job_does_not_run() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let a = recording_job(&log, "a");
        let b = recording_job(&log, "b");

        queue_job(&a);
        queue_job(&b);
        invalidate_job(&a);

        flush_jobs();
        assert_eq!(*log.borrow(), vec!["b"]);
    }

    #[test]
    fn jobs_queued_during_flush_wait_for_next_flush() {
        let runs = Rc::new(Cell::new(0));
        let second = Job::new({
            let runs = runs.clone();
            move || runs.set(runs.get() + 10)
        });
        let first = Job::new({
            let (runs, second) = (runs.clone(), second.clone());
            move || {
                runs.set(runs.get() + 1);
                queue_job(&second);
            }
        });

        queue_job(&first);
        assert_eq!(flush_jobs(), 1);
        assert_eq!(runs.get(), 1);
        assert!(is_flush_pending());

        assert_eq!(flush_jobs(), 1);
        assert_eq!(runs.get(), 11);
    }

    #[test]
    fn reentrant_flush_is_refused() {
        let inner = Rc::new(Cell::new(usize::MAX));
        let job = Job::new({
            let inner = inner.clone();
            move || inner.set(flush_jobs())
        });

        queue_job(&job);
        flush_jobs();
        assert_eq!(inner.get(), 0);
    }

    #[test]
    fn run_until_idle_drains_chains() {
        let runs = Rc::new(Cell::new(0));
        let tail = Job::new({
            let runs = runs.clone();
            move || runs.set(runs.get() + 1)
        });
        let head = Job::new({
            let (runs, tail) = (runs.clone(), tail.clone());
            move || {
                runs.set(runs.get() + 1);
                queue_job(&tail);
            }
        });

        queue_job(&head);
        assert_eq!(run_until_idle().unwrap(), 2);
        assert_eq!(runs.get(), 2);
    }

    #[test]
    fn run_until_idle_reports_runaway_queues() {
        configure(SchedulerConfig {
            max_flush_cycles: 5,
            ..SchedulerConfig::default()
        });

        let slot: Rc<RefCell<Option<Job>>> = Rc::new(RefCell::new(None));
        let job = Job::new({
            let slot = slot.clone();
            move || {
                if let Some(me) = slot.borrow().as_ref() {
                    queue_job(me);
                }
            }
        });
        slot.replace(Some(job.clone()));

        queue_job(&job);
        let err = run_until_idle().unwrap_err();
        assert!(matches!(err, Error::FlushLimitExceeded(5)));

        invalidate_job(&job);
        slot.replace(None);
        configure(SchedulerConfig::default());
    }

    #[test]
    fn tokio_driver_without_local_set_leaves_flush_to_host() {
        configure(SchedulerConfig {
            driver: FlushDriver::TokioLocal,
            ..SchedulerConfig::default()
        });
        let log = Rc::new(RefCell::new(Vec::new()));
        let a = recording_job(&log, "a");
        let b = recording_job(&log, "b");

        queue_job(&a);
        assert!(!is_flush_pending());
        assert!(has_pending_jobs());

        // A later batch asks again instead of assuming a flush is on its way.
        queue_job(&b);
        assert!(!is_flush_pending());

        assert_eq!(flush_jobs(), 2);
        assert_eq!(*log.borrow(), vec!["a", "b"]);
        configure(SchedulerConfig::default());
    }
}
