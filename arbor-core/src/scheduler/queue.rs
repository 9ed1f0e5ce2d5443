//! The pending-job queue.
//!
//! An insertion-ordered map from job id to job: a job already waiting is not
//! added again, and removing a job keeps the others in order.

use indexmap::IndexMap;

use super::job::{Job, JobId};

#[derive(Debug, Default)]
pub struct JobQueue {
    jobs: IndexMap<JobId, Job>,
}

impl JobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `job` unless it is already queued. Returns whether it was added.
    pub fn push(&mut self, job: Job) -> bool {
        let id = job.id();
        if self.jobs.contains_key(&id) {
            return false;
        }
        self.jobs.insert(id, job);
        true
    }

    /// Remove a queued job. Returns whether it was queued.
    pub fn remove(&mut self, id: JobId) -> bool {
        self.jobs.shift_remove(&id).is_some()
    }

    /// Take every queued job, leaving the queue empty.
    pub fn take(&mut self) -> Vec<Job> {
        std::mem::take(&mut self.jobs).into_values().collect()
    }

    pub fn contains(&self, id: JobId) -> bool {
        self.jobs.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_push_is_ignored() {
        let mut queue = JobQueue::new();
        let job = Job::new(|| {});

        assert!(queue.push(job.clone()));
        assert!(!queue.push(job.clone()));
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn remove_preserves_order() {
        let mut queue = JobQueue::new();
        let jobs: Vec<Job> = (0..4).map(|_| Job::new(|| {})).collect();
        for job in &jobs {
            queue.push(job.clone());
        }

        assert!(queue.remove(jobs[1].id()));
        assert!(!queue.remove(jobs[1].id()));

        let remaining: Vec<JobId> = queue.take().iter().map(Job::id).collect();
        assert_eq!(remaining, vec![jobs[0].id(), jobs[2].id(), jobs[3].id()]);
        assert!(queue.is_empty());
    }

    #[test]
    fn taken_jobs_can_be_queued_again() {
        let mut queue = JobQueue::new();
        let job = Job::new(|| {});

        queue.push(job.clone());
        queue.take();
        assert!(!queue.contains(job.id()));
        assert!(queue.push(job));
    }
}
