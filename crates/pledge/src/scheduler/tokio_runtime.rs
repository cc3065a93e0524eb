use tokio::runtime::{Handle, TryCurrentError};

use super::{Job, Scheduler};

/// Spawns jobs as tasks on a tokio runtime.
#[derive(Debug, Clone)]
pub struct TokioScheduler {
    handle: Handle,
}

impl TokioScheduler {
    pub fn new(handle: Handle) -> Self {
        Self {
            handle,
        }
    }

    /// Uses the runtime the caller is running in.
    pub fn try_current() -> Result<Self, TryCurrentError> {
        Ok(Self::new(Handle::try_current()?))
    }
}

impl Scheduler for TokioScheduler {
    fn schedule(&self, job: Job) {
        // the task is detached, completion is observed through the future's reactions.
        let _ = self.handle.spawn(async move { job() });
    }
}
