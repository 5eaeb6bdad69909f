//! In-process job queue runtime
//!
//! Two named queues share one runtime: `planning` runs schedule-mutating
//! jobs strictly one at a time, `sync` runs provider ticks with a small
//! parallel budget. A job holds its queue's semaphore permit only while the
//! handler runs; delays and retry backoffs sleep without a permit so they
//! never starve the queue.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use tempo_core::{JobContext, JobDispatcher, JobError, JobHandler};
use tempo_domain::constants::{PLANNING_QUEUE_CONCURRENCY, SYNC_QUEUE_CONCURRENCY};
use tempo_domain::{JobId, JobKind, JobSpec, QueueName, Result, TempoError};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, instrument, warn};

use crate::scheduling::error::{SchedulerError, SchedulerResult};

type HandlerMap = HashMap<JobKind, Arc<dyn JobHandler>>;

/// State shared between the queue front-end and its spawned job tasks.
struct QueueShared {
    handlers: RwLock<HandlerMap>,
    semaphores: HashMap<QueueName, Arc<Semaphore>>,
    cancel: CancellationToken,
}

/// The queue runtime. Clones share the same underlying queues; a clone is
/// what gets handed around as the dispatcher port.
#[derive(Clone)]
pub struct JobQueue {
    shared: Arc<QueueShared>,
    tracker: TaskTracker,
}

impl JobQueue {
    pub fn new() -> Self {
        let mut semaphores = HashMap::new();
        semaphores
            .insert(QueueName::Sync, Arc::new(Semaphore::new(SYNC_QUEUE_CONCURRENCY)));
        semaphores
            .insert(QueueName::Planning, Arc::new(Semaphore::new(PLANNING_QUEUE_CONCURRENCY)));

        Self {
            shared: Arc::new(QueueShared {
                handlers: RwLock::new(HashMap::new()),
                semaphores,
                cancel: CancellationToken::new(),
            }),
            tracker: TaskTracker::new(),
        }
    }

    /// Bind a handler to a job kind. Handlers are registered after queue
    /// construction because some handlers dispatch back into the queue.
    pub fn register(&self, kind: JobKind, handler: Arc<dyn JobHandler>) {
        if let Ok(mut handlers) = self.shared.handlers.write() {
            handlers.insert(kind, handler);
        }
    }

    /// Stop accepting jobs, cancel pending delays, and wait for in-flight
    /// handlers to finish.
    #[instrument(skip(self))]
    pub async fn shutdown(&self, timeout: Duration) -> SchedulerResult<()> {
        info!("shutting down job queue");
        self.shared.cancel.cancel();
        self.tracker.close();

        tokio::time::timeout(timeout, self.tracker.wait())
            .await
            .map_err(|source| SchedulerError::Timeout { duration: timeout, source })?;

        info!("job queue drained");
        Ok(())
    }

    async fn run_job(shared: Arc<QueueShared>, id: JobId, spec: JobSpec) {
        let JobSpec { queue, kind, payload, delay, max_attempts, backoff } = spec;

        if let Some(delay) = delay {
            if !sleep_or_cancel(&shared.cancel, delay).await {
                debug!(%id, %kind, "queue cancelled during initial delay");
                return;
            }
        }

        let Some(semaphore) = shared.semaphores.get(&queue).cloned() else {
            error!(%id, queue = %queue, "no semaphore for queue");
            return;
        };

        let mut payload = payload;
        let mut attempts_made: u32 = 0;
        loop {
            let permit = tokio::select! {
                _ = shared.cancel.cancelled() => {
                    debug!(%id, %kind, "queue cancelled while waiting for a slot");
                    return;
                }
                permit = semaphore.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => return,
                },
            };

            let handler = shared
                .handlers
                .read()
                .ok()
                .and_then(|handlers| handlers.get(&kind).cloned());
            let Some(handler) = handler else {
                error!(%id, %kind, "no handler registered for job kind");
                return;
            };

            let ctx = JobContext {
                id: id.clone(),
                kind,
                payload: payload.clone(),
                attempts_made,
                max_attempts,
            };

            let outcome = handler.run(ctx).await;
            drop(permit);

            match outcome {
                Ok(()) => {
                    debug!(%id, %kind, attempts_made, "job completed");
                    return;
                }
                Err(JobError::Fatal(err)) => {
                    error!(%id, %kind, error = %err, error_kind = err.label(), "job failed fatally");
                    return;
                }
                Err(JobError::Retry { reason, payload: replacement }) => {
                    attempts_made += 1;
                    if attempts_made >= max_attempts {
                        error!(%id, %kind, attempts_made, reason, "job exhausted its attempts");
                        return;
                    }

                    if let Some(replacement) = replacement {
                        payload = replacement;
                    }

                    let delay = Duration::from_millis(backoff.delay_ms(attempts_made));
                    warn!(%id, %kind, attempts_made, reason, delay_ms = delay.as_millis() as u64,
                        "job retrying after backoff");
                    if !sleep_or_cancel(&shared.cancel, delay).await {
                        debug!(%id, %kind, "queue cancelled during retry backoff");
                        return;
                    }
                }
            }
        }
    }
}

impl Default for JobQueue {
    fn default() -> Self {
        Self::new()
    }
}

/// Returns false when the queue was cancelled before the delay elapsed.
async fn sleep_or_cancel(cancel: &CancellationToken, delay: Duration) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(delay) => true,
    }
}

#[async_trait]
impl JobDispatcher for JobQueue {
    #[instrument(skip(self, spec), fields(queue = %spec.queue, kind = %spec.kind))]
    async fn enqueue(&self, spec: JobSpec) -> Result<JobId> {
        if self.shared.cancel.is_cancelled() {
            return Err(TempoError::Internal("job queue is shut down".into()));
        }

        let id = JobId::new();
        debug!(%id, delay = ?spec.delay, max_attempts = spec.max_attempts, "job enqueued");

        let shared = Arc::clone(&self.shared);
        let job_id = id.clone();
        self.tracker.spawn(async move {
            JobQueue::run_job(shared, job_id, spec).await;
        });

        Ok(id)
    }
}
