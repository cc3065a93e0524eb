use std::collections::VecDeque;

use parking_lot::Mutex;
use tracing::trace;

use super::{Job, Scheduler};

/// A FIFO queue of jobs that only runs when asked to.
///
/// Nothing runs until [`QueueScheduler::run_next`] or [`QueueScheduler::run_until_idle`] is
/// called, which makes it suitable for deterministic tests and for hosts that own their loop.
#[derive(Default)]
pub struct QueueScheduler {
    jobs: Mutex<VecDeque<Job>>,
}

impl QueueScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending(&self) -> usize {
        self.jobs.lock().len()
    }

    /// Runs the oldest job, returns `false` if there was none.
    pub fn run_next(&self) -> bool {
        // the lock must be released before running, jobs schedule more jobs.
        let job = self.jobs.lock().pop_front();
        match job {
            Some(job) => {
                job();
                true
            }
            None => false,
        }
    }

    /// Runs jobs, including ones scheduled by the jobs themselves, until the queue is empty.
    pub fn run_until_idle(&self) -> usize {
        let mut count = 0;
        while self.run_next() {
            count += 1;
        }
        trace!("Queue scheduler idle. jobs_run: {}", count);
        count
    }
}

impl Scheduler for QueueScheduler {
    fn schedule(&self, job: Job) {
        self.jobs.lock().push_back(job);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[test]
    fn jobs_run_in_submission_order() {
        // given
        let scheduler = QueueScheduler::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        for index in 0..3 {
            let log = log.clone();
            scheduler.schedule(Box::new(move || log.lock().push(index)));
        }

        // expect
        assert_eq!(scheduler.pending(), 3);
        assert!(log.lock().is_empty());

        // when
        let count = scheduler.run_until_idle();

        // then
        assert_eq!(count, 3);
        assert_eq!(*log.lock(), vec![0, 1, 2]);
    }

    #[test]
    fn jobs_scheduled_by_jobs_are_run() {
        // given
        let scheduler = Arc::new(QueueScheduler::new());
        let log = Arc::new(Mutex::new(Vec::new()));

        let inner_scheduler = scheduler.clone();
        let inner_log = log.clone();
        scheduler.schedule(Box::new(move || {
            inner_log.lock().push("outer");
            let log = inner_log.clone();
            inner_scheduler.schedule(Box::new(move || log.lock().push("inner")));
        }));

        // when
        scheduler.run_until_idle();

        // then
        assert_eq!(*log.lock(), vec!["outer", "inner"]);
        assert_eq!(scheduler.pending(), 0);
    }

    #[test]
    fn run_next_on_empty_queue() {
        // given
        let scheduler = QueueScheduler::new();

        // expect
        assert!(!scheduler.run_next());
    }
}
