//! Scheduler jobs.

use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Unique identifier for a job.
///
/// The queue deduplicates by this id, so clones of one job share it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobId(u64);

impl JobId {
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

/// A unit of deferred work: typically "re-render this component" or "call
/// this watcher back".
///
/// Jobs must tolerate running after the state they refer to is gone; the
/// runtime's own jobs hold weak references and do nothing in that case.
#[derive(Clone)]
pub struct Job {
    inner: Rc<JobInner>,
}

struct JobInner {
    id: JobId,
    run: Box<dyn Fn()>,
}

impl Job {
    pub fn new(run: impl Fn() + 'static) -> Self {
        Self {
            inner: Rc::new(JobInner {
                id: JobId::new(),
                run: Box::new(run),
            }),
        }
    }

    pub fn id(&self) -> JobId {
        self.inner.id
    }

    /// Run the job now, outside the queue.
    pub fn run(&self) {
        (self.inner.run)();
    }
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Job").field(&self.inner.id).finish()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;

    #[test]
    fn job_ids_are_unique() {
        let a = Job::new(|| {});
        let b = Job::new(|| {});
        assert_ne!(a.id(), b.id());
        assert_eq!(a.id(), a.clone().id());
    }

    #[test]
    fn run_calls_the_closure() {
        let runs = Rc::new(Cell::new(0));
        let job = Job::new({
            let runs = runs.clone();
            move || runs.set(runs.get() + 1)
        });

        job.run();
        job.clone().run();
        assert_eq!(runs.get(), 2);
    }
}
