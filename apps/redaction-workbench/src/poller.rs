//! Job status polling
//!
//! One background task per job id. Watching a job that is already being
//! polled replaces the old task. A task stops on its own once the job
//! reaches a terminal status or nobody is listening any more; `cancel`,
//! `cancel_all` and dropping the poller abort it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use redaction_core::{JobId, JobState, JobStatus};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::config::PollingConfig;
use crate::service::RedactionService;

type TaskMap = Arc<Mutex<HashMap<JobId, PollTask>>>;

struct PollTask {
    generation: u64,
    handle: JoinHandle<()>,
}

pub struct JobPoller {
    service: Arc<dyn RedactionService>,
    interval: Duration,
    max_failures: u32,
    tasks: TaskMap,
    next_generation: AtomicU64,
}

/// Receiving end of one job's status updates
#[derive(Clone)]
pub struct JobWatch {
    job_id: JobId,
    status: watch::Receiver<Option<JobStatus>>,
}

impl JobWatch {
    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    /// Most recent status, `None` before the first response
    pub fn latest(&self) -> Option<JobStatus> {
        self.status.borrow().clone()
    }

    /// Wait for a terminal status. A poll that is cancelled or replaced
    /// before the job finishes reports `Cancelled`.
    pub async fn wait(&mut self) -> JobStatus {
        loop {
            let current = self.status.borrow_and_update().clone();
            if let Some(status) = current {
                if status.status.is_terminal() {
                    return status;
                }
            }
            if self.status.changed().await.is_err() {
                let last = self.status.borrow().clone();
                return match last {
                    Some(status) if status.status.is_terminal() => status,
                    _ => JobStatus {
                        error: Some("polling stopped".to_string()),
                        ..JobStatus::new(JobState::Cancelled, 0.0)
                    },
                };
            }
        }
    }
}

fn lock(tasks: &Mutex<HashMap<JobId, PollTask>>) -> MutexGuard<'_, HashMap<JobId, PollTask>> {
    tasks.lock().unwrap_or_else(PoisonError::into_inner)
}

impl JobPoller {
    pub fn new(service: Arc<dyn RedactionService>, config: &PollingConfig) -> Self {
        Self {
            service,
            interval: config.interval(),
            max_failures: config.max_failures.max(1),
            tasks: Arc::new(Mutex::new(HashMap::new())),
            next_generation: AtomicU64::new(0),
        }
    }

    /// Start polling `job_id`, replacing any poll already running for it
    pub fn watch(&self, job_id: JobId) -> JobWatch {
        let (tx, rx) = watch::channel(None);
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);

        // Registered under the lock so the task cannot deregister before
        // it has been inserted.
        let mut tasks = lock(&self.tasks);
        let handle = tokio::spawn(poll_job(
            Arc::clone(&self.service),
            job_id.clone(),
            self.interval,
            self.max_failures,
            tx,
            Arc::clone(&self.tasks),
            generation,
        ));
        if let Some(previous) = tasks.insert(job_id.clone(), PollTask { generation, handle }) {
            debug!(job_id = %job_id, "Replacing existing poll");
            previous.handle.abort();
        }

        JobWatch { job_id, status: rx }
    }

    /// Stop polling `job_id`. Returns false when it was not being polled.
    pub fn cancel(&self, job_id: &str) -> bool {
        match lock(&self.tasks).remove(job_id) {
            Some(task) => {
                task.handle.abort();
                debug!(job_id, "Poll cancelled");
                true
            }
            None => false,
        }
    }

    pub fn cancel_all(&self) {
        let mut tasks = lock(&self.tasks);
        for (_, task) in tasks.drain() {
            task.handle.abort();
        }
    }

    pub fn is_polling(&self, job_id: &str) -> bool {
        lock(&self.tasks).contains_key(job_id)
    }

    pub fn active_count(&self) -> usize {
        lock(&self.tasks).len()
    }
}

impl Drop for JobPoller {
    fn drop(&mut self) {
        self.cancel_all();
    }
}

async fn poll_job(
    service: Arc<dyn RedactionService>,
    job_id: JobId,
    interval: Duration,
    max_failures: u32,
    tx: watch::Sender<Option<JobStatus>>,
    tasks: TaskMap,
    generation: u64,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut failures = 0u32;

    loop {
        ticker.tick().await;

        let status = match service.job_status(&job_id).await {
            Ok(status) => {
                failures = 0;
                status
            }
            Err(e) => {
                failures += 1;
                warn!(job_id = %job_id, failures, error = %e, "Job status request failed");
                if failures < max_failures {
                    continue;
                }
                JobStatus {
                    error: Some(e.to_string()),
                    ..JobStatus::new(JobState::Failed, 0.0)
                }
            }
        };

        let terminal = status.status.is_terminal();
        if terminal {
            info!(job_id = %job_id, status = ?status.status, "Job finished");
        } else {
            debug!(job_id = %job_id, progress = status.progress, "Job progress");
        }
        if tx.send(Some(status)).is_err() {
            debug!(job_id = %job_id, "No one is watching; stopping poll");
            break;
        }
        if terminal {
            break;
        }
    }

    let mut tasks = lock(&tasks);
    if tasks.get(&job_id).map(|t| t.generation) == Some(generation) {
        tasks.remove(&job_id);
    }
}
