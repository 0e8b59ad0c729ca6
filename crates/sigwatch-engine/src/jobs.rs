//! Pending job table — the time-ordered set of one-shot work items.

use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};

/// What a pending job does when it fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobKind {
    /// Reconciliation pass.
    Actualizer,
    /// Cron-scheduled listener check; reschedules itself after firing.
    Listener,
    /// One-off force-check; independent of the listener's own schedule.
    Checker,
}

impl JobKind {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Actualizer => "actualizer",
            Self::Listener => "listener",
            Self::Checker => "checker",
        }
    }
}

/// A pending one-shot work item.
#[derive(Debug, Clone)]
pub struct Job {
    pub kind: JobKind,
    pub due: DateTime<Utc>,
    pub listener_id: Option<i64>,
    /// Chat that force-triggered the check, notified directly on failure.
    pub caller_chat: Option<i64>,
}

impl Job {
    pub fn actualizer(due: DateTime<Utc>) -> Self {
        Self {
            kind: JobKind::Actualizer,
            due,
            listener_id: None,
            caller_chat: None,
        }
    }

    pub fn listener(listener_id: i64, due: DateTime<Utc>) -> Self {
        Self {
            kind: JobKind::Listener,
            due,
            listener_id: Some(listener_id),
            caller_chat: None,
        }
    }

    pub fn checker(listener_id: i64, caller_chat: Option<i64>) -> Self {
        Self {
            kind: JobKind::Checker,
            due: Utc::now(),
            listener_id: Some(listener_id),
            caller_chat,
        }
    }
}

/// The pending job set. Jobs are one-shot: firing removes them, and
/// listeners re-arm themselves after each check.
///
/// Invariant: at most one pending `Listener` job per listener id —
/// scheduling replaces rather than adds.
#[derive(Default)]
pub struct JobQueue {
    pending: Mutex<Vec<Job>>,
}

impl JobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule(&self, job: Job) {
        let mut pending = self.lock();
        if job.kind == JobKind::Listener {
            pending.retain(|j| !(j.kind == JobKind::Listener && j.listener_id == job.listener_id));
        }
        pending.push(job);
    }

    /// Remove and return every job due at or before `now`.
    pub fn take_due(&self, now: DateTime<Utc>) -> Vec<Job> {
        let mut pending = self.lock();
        let (due, rest): (Vec<Job>, Vec<Job>) =
            pending.drain(..).partition(|job| job.due <= now);
        *pending = rest;
        due
    }

    /// Drop every pending job of the given kind.
    pub fn cancel(&self, kind: JobKind) {
        self.lock().retain(|job| job.kind != kind);
    }

    /// Drop every pending job.
    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn has(&self, kind: JobKind) -> bool {
        self.lock().iter().any(|job| job.kind == kind)
    }

    pub fn has_listener_job(&self, listener_id: i64) -> bool {
        self.lock()
            .iter()
            .any(|job| job.kind == JobKind::Listener && job.listener_id == Some(listener_id))
    }

    /// Pending jobs ordered by due time.
    pub fn snapshot(&self) -> Vec<Job> {
        let mut jobs = self.lock().clone();
        jobs.sort_by_key(|job| job.due);
        jobs
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Job>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_listener_job_replaces() {
        let queue = JobQueue::new();
        queue.schedule(Job::listener(1, Utc::now() + chrono::Duration::minutes(5)));
        queue.schedule(Job::listener(1, Utc::now() + chrono::Duration::minutes(10)));
        queue.schedule(Job::listener(2, Utc::now() + chrono::Duration::minutes(5)));
        assert_eq!(queue.len(), 2);
        assert!(queue.has_listener_job(1));
    }

    #[test]
    fn test_checker_jobs_accumulate() {
        let queue = JobQueue::new();
        queue.schedule(Job::checker(1, None));
        queue.schedule(Job::checker(1, Some(42)));
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn test_take_due_only_returns_elapsed() {
        let queue = JobQueue::new();
        queue.schedule(Job::listener(1, Utc::now() - chrono::Duration::seconds(1)));
        queue.schedule(Job::listener(2, Utc::now() + chrono::Duration::minutes(5)));
        let due = queue.take_due(Utc::now());
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].listener_id, Some(1));
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_cancel_kind_spares_others() {
        let queue = JobQueue::new();
        queue.schedule(Job::listener(1, Utc::now()));
        queue.schedule(Job::checker(1, None));
        queue.schedule(Job::actualizer(Utc::now()));
        queue.cancel(JobKind::Listener);
        assert_eq!(queue.len(), 2);
        assert!(queue.has(JobKind::Checker));
        assert!(queue.has(JobKind::Actualizer));
    }
}
