//! Update Scheduler
//!
//! Component updates are not run the moment their state changes. Instead
//! the update effect's scheduler puts a [`Job`] into the [`JobQueue`], and
//! the queue is flushed from a microtask. Any number of synchronous
//! mutations therefore collapse into one update per component.
//!
//! # Algorithm
//!
//! 1. `queue_job` inserts the job unless a job with the same ID is already
//!    pending. The first insertion after a flush also schedules a flush
//!    microtask; later insertions piggyback on it.
//! 2. The flush takes the whole pending batch at once and clears the
//!    "flush scheduled" flag before running anything, so jobs queued *by*
//!    jobs land in a fresh batch with its own microtask.
//! 3. Jobs run in the order they were first queued. A job that was
//!    deactivated while waiting (its component unmounted) is skipped.
//!
//! A parent that updates a child synchronously can also pull the child's
//! job out of the queue with [`JobQueue::remove`], so the child does not
//! render twice.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::IndexMap;

/// Unique identifier for a [`Job`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct JobId(u64);

impl JobId {
    fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

/// A unit of deferred work, usually one component update.
#[derive(Clone)]
pub struct Job {
    inner: Rc<JobInner>,
}

struct JobInner {
    id: JobId,
    active: Cell<bool>,
    task: Box<dyn Fn()>,
}

impl Job {
    /// Wrap a task.
    pub fn new(task: impl Fn() + 'static) -> Self {
        Self {
            inner: Rc::new(JobInner {
                id: JobId::next(),
                active: Cell::new(true),
                task: Box::new(task),
            }),
        }
    }

    pub fn id(&self) -> JobId {
        self.inner.id
    }

    pub fn is_active(&self) -> bool {
        self.inner.active.get()
    }

    /// Prevent the job from running again, including a pending run.
    pub fn deactivate(&self) {
        self.inner.active.set(false);
    }

    /// Run the task if the job is still active.
    pub fn run(&self) {
        if self.is_active() {
            (self.inner.task)();
        }
    }
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job")
            .field("id", &self.inner.id)
            .field("active", &self.is_active())
            .finish()
    }
}

/// Pending jobs, deduplicated by ID.
#[derive(Debug, Default)]
pub(crate) struct JobQueue {
    pending: RefCell<IndexMap<JobId, Job>>,
    flush_scheduled: Cell<bool>,
    flushing: Cell<bool>,
}

impl JobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a job. Returns `false` if it was already pending.
    pub fn push(&self, job: Job) -> bool {
        let mut pending = self.pending.borrow_mut();
        if pending.contains_key(&job.id()) {
            return false;
        }
        pending.insert(job.id(), job);
        true
    }

    /// Mark a flush as scheduled. Returns `true` if the caller must
    /// schedule it, i.e. no flush was scheduled yet.
    pub fn request_flush(&self) -> bool {
        !self.flush_scheduled.replace(true)
    }

    /// Remove a pending job. Returns whether it was pending.
    pub fn remove(&self, id: JobId) -> bool {
        self.pending.borrow_mut().shift_remove(&id).is_some()
    }

    pub fn contains(&self, id: JobId) -> bool {
        self.pending.borrow().contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.pending.borrow().len()
    }

    pub fn is_flushing(&self) -> bool {
        self.flushing.get()
    }

    /// Take the pending batch and reset the scheduled flag.
    pub fn take_batch(&self) -> Vec<Job> {
        self.flush_scheduled.set(false);
        std::mem::take(&mut *self.pending.borrow_mut())
            .into_values()
            .collect()
    }

    /// Mark the queue as flushing until the guard drops.
    pub fn begin_flush(&self) -> FlushGuard<'_> {
        self.flushing.set(true);
        FlushGuard { queue: self }
    }
}

/// Clears the flushing flag when dropped, even if a job panicked.
pub(crate) struct FlushGuard<'a> {
    queue: &'a JobQueue,
}

impl Drop for FlushGuard<'_> {
    fn drop(&mut self) {
        self.queue.flushing.set(false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_deduplicates() {
        let queue = JobQueue::new();
        let job = Job::new(|| {});

        assert!(queue.push(job.clone()));
        assert!(!queue.push(job.clone()));
        assert_eq!(queue.len(), 1);

        assert!(queue.remove(job.id()));
        assert!(!queue.contains(job.id()));
    }

    #[test]
    fn flush_requested_once_per_batch() {
        let queue = JobQueue::new();
        assert!(queue.request_flush());
        assert!(!queue.request_flush());

        queue.take_batch();
        assert!(queue.request_flush());
    }

    #[test]
    fn batch_keeps_first_queue_order() {
        let queue = JobQueue::new();
        let order = Rc::new(RefCell::new(Vec::new()));

        let jobs: Vec<Job> = (0..3)
            .map(|i| {
                let order = order.clone();
                Job::new(move || order.borrow_mut().push(i))
            })
            .collect();

        queue.push(jobs[2].clone());
        queue.push(jobs[0].clone());
        queue.push(jobs[2].clone());
        queue.push(jobs[1].clone());

        for job in queue.take_batch() {
            job.run();
        }
        assert_eq!(*order.borrow(), vec![2, 0, 1]);
        assert_eq!(queue.len(), 0);
    }

    #[test]
    fn deactivated_job_does_not_run() {
        let ran = Rc::new(Cell::new(false));
        let r = ran.clone();
        let job = Job::new(move || r.set(true));

        job.deactivate();
        job.run();
        assert!(!ran.get());
    }

    #[test]
    fn flush_guard_resets_flag() {
        let queue = JobQueue::new();
        {
            let _guard = queue.begin_flush();
            assert!(queue.is_flushing());
        }
        assert!(!queue.is_flushing());
    }
}
