use std::panic::{self, AssertUnwindSafe};
use std::thread;

use crossbeam_channel::{Receiver, Sender, unbounded};
use tracing::{error, info, trace};

use super::{Job, Scheduler};
use crate::config::SchedulerConfig;
use crate::error::SchedulerError;

/// Runs jobs on a fixed set of worker threads fed from a shared queue.
///
/// With a single worker, jobs run strictly in submission order. With more workers, jobs start
/// in submission order but may overlap; futures only ever have one drain job in flight, so
/// per-future ordering is unaffected.
///
/// Workers stop once the scheduler, and every future holding it, has been dropped.
pub struct ThreadPoolScheduler {
    sender: Sender<Job>,
    workers: usize,
}

impl ThreadPoolScheduler {
    pub fn new(config: &SchedulerConfig) -> Result<Self, SchedulerError> {
        if config.worker_threads == 0 {
            return Err(SchedulerError::NoWorkers);
        }

        let (sender, receiver) = unbounded::<Job>();

        for index in 0..config.worker_threads {
            let receiver = receiver.clone();
            thread::Builder::new()
                .name(format!("{}-{}", config.thread_name_prefix, index))
                .spawn(move || run_worker(index, receiver))
                .map_err(|reason| SchedulerError::SpawnWorker {
                    index,
                    reason,
                })?;
        }

        info!(
            "Started thread pool scheduler. workers: {}, prefix: '{}'",
            config.worker_threads, config.thread_name_prefix
        );

        Ok(Self {
            sender,
            workers: config.worker_threads,
        })
    }

    pub fn workers(&self) -> usize {
        self.workers
    }
}

impl Scheduler for ThreadPoolScheduler {
    fn schedule(&self, job: Job) {
        if let Err(cause) = self.sender.send(job) {
            error!("Unable to schedule job. cause: {}", cause);
        }
    }
}

fn run_worker(index: usize, receiver: Receiver<Job>) {
    trace!("Scheduler worker started. index: {}", index);

    while let Ok(job) = receiver.recv() {
        // reactions are already guarded, this protects the worker from other jobs.
        if panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
            error!("Scheduled job panicked. worker: {}", index);
        }
    }

    trace!("Scheduler worker stopped. index: {}", index);
}
