use std::collections::{HashSet, VecDeque};
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Weak};

use chrono::{DateTime, Utc};
use futures::FutureExt;
use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc, Notify};
use tracing::{debug, error, info, instrument, warn};

use crate::{
    config::QueueConfig,
    processor::{JobContext, ProgressReporter, ProgressSink},
    retry::RetryPolicy,
    store::JobStore,
    JobError, JobEvent, JobId, JobOutcome, JobRecord, JobStatus, Processor, QueueError,
    QueueResult, QueueStats,
};

type SharedProcessor<I, O> = Arc<dyn Processor<I, O>>;

/// In-process job scheduler with a bounded pool of worker slots.
///
/// Cheap to clone; all clones drive the same queue. Operations that may start
/// work (`submit`, `set_processor`, `resume`) must run inside a Tokio runtime.
pub struct Scheduler<I, O> {
    inner: Arc<Inner<I, O>>,
}

impl<I, O> Clone for Scheduler<I, O> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct Inner<I, O> {
    state: Mutex<QueueState<I, O>>,
    retry_policy: Arc<dyn RetryPolicy>,
    max_attempts: u32,
    /// Signalled whenever the last in-flight attempt settles
    idle: Notify,
    self_ref: Weak<Inner<I, O>>,
}

/// Everything the scheduling actor mutates; guarded by one mutex
struct QueueState<I, O> {
    store: JobStore<I, O>,
    pending: VecDeque<JobId>,
    active: HashSet<JobId>,
    processor: Option<SharedProcessor<I, O>>,
    concurrency: usize,
    paused: bool,
    accepting: bool,
    closed: bool,
    events: Option<broadcast::Sender<JobEvent<I, O>>>,
    /// Unbounded feeds of terminal records; never lag
    finished: Vec<mpsc::UnboundedSender<JobRecord<I, O>>>,
}

fn emit<I, O>(events: &Option<broadcast::Sender<JobEvent<I, O>>>, event: JobEvent<I, O>) {
    if let Some(tx) = events {
        // No subscribers is fine
        let _ = tx.send(event);
    }
}

fn publish_finished<I: Clone, O: Clone>(
    subscribers: &mut Vec<mpsc::UnboundedSender<JobRecord<I, O>>>,
    record: &JobRecord<I, O>,
) {
    subscribers.retain(|tx| tx.send(record.clone()).is_ok());
}

fn retry_time(delay: std::time::Duration) -> DateTime<Utc> {
    let now = Utc::now();
    chrono::Duration::from_std(delay)
        .ok()
        .and_then(|d| now.checked_add_signed(d))
        .unwrap_or(now)
}

impl<I, O> Scheduler<I, O>
where
    I: Clone + Send + Sync + 'static,
    O: Clone + Send + Sync + 'static,
{
    /// Create a scheduler using the exponential retry schedule from `config`
    pub fn new(config: QueueConfig) -> Self {
        let policy = config.retry_policy();
        Self::with_retry_policy(config, policy)
    }

    /// Create a scheduler with a custom retry policy
    pub fn with_retry_policy(config: QueueConfig, retry_policy: impl RetryPolicy) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        let inner = Arc::new_cyclic(|self_ref| Inner {
            state: Mutex::new(QueueState {
                store: JobStore::new(),
                pending: VecDeque::new(),
                active: HashSet::new(),
                processor: None,
                concurrency: config.concurrency.max(1),
                paused: false,
                accepting: true,
                closed: false,
                events: Some(events),
                finished: Vec::new(),
            }),
            retry_policy: Arc::new(retry_policy),
            max_attempts: config.max_attempts.max(1),
            idle: Notify::new(),
            self_ref: self_ref.clone(),
        });
        Self { inner }
    }

    /// Install the processing function and the slot count, then start filling slots
    pub fn set_processor<P>(&self, concurrency: usize, processor: P)
    where
        P: Processor<I, O>,
    {
        {
            let mut state = self.inner.state.lock();
            if state.closed {
                warn!("ignoring processor installed on a closed queue");
                return;
            }
            state.processor = Some(Arc::new(processor));
            state.concurrency = concurrency.max(1);
            state.paused = false;
        }
        info!(concurrency, "queue processor set");
        self.inner.fill_slots();
    }

    /// Submit a job under a freshly generated id
    pub fn submit(&self, input: I) -> QueueResult<JobRecord<I, O>> {
        self.submit_with_id(JobId::new(), input)
    }

    /// Submit a job under a caller-assigned id.
    ///
    /// Returns the pending record immediately; execution happens on a worker slot.
    #[instrument(skip(self, input), fields(job_id = %id))]
    pub fn submit_with_id(&self, id: JobId, input: I) -> QueueResult<JobRecord<I, O>> {
        let record = {
            let mut guard = self.inner.state.lock();
            let state = &mut *guard;
            if !state.accepting {
                return Err(QueueError::Closed);
            }

            let record = JobRecord::new(id.clone(), input, self.inner.max_attempts);
            state.store.insert(record.clone())?;
            state.pending.push_back(id.clone());
            emit(
                &state.events,
                JobEvent::Enqueued {
                    job_id: id,
                    at: record.created_at,
                },
            );
            record
        };

        info!(job_id = %record.id, "job added to queue");
        self.inner.fill_slots();
        Ok(record)
    }

    /// Snapshot of a job, if it is still in the table
    pub fn get_job(&self, id: &JobId) -> Option<JobRecord<I, O>> {
        self.inner.state.lock().store.get(id).cloned()
    }

    /// Best-effort progress update for the job's current attempt
    pub fn update_progress(&self, id: &JobId, percent: u8) {
        if let Some(record) = self.inner.state.lock().store.get_mut(id) {
            record.advance_progress(percent);
        }
    }

    pub fn stats(&self) -> QueueStats {
        let state = self.inner.state.lock();
        let waiting = state.pending.len();
        let delayed = state.store.count_backing_off();
        let active = state.active.len();
        QueueStats {
            waiting,
            delayed,
            active,
            completed: state.store.count_status(JobStatus::Completed),
            failed: state.store.count_status(JobStatus::Failed),
            total: waiting + delayed + active,
        }
    }

    /// Stop pulling new jobs into slots; in-flight attempts finish normally
    pub fn pause(&self) {
        self.inner.state.lock().paused = true;
        info!("queue paused");
    }

    /// Undo [`pause`](Self::pause)
    pub fn resume(&self) {
        {
            let mut state = self.inner.state.lock();
            if state.closed {
                return;
            }
            state.paused = false;
        }
        info!("queue resumed");
        self.inner.fill_slots();
    }

    /// Stop everything: no admission, no slot filling, no further events.
    ///
    /// Subscribers see their stream end. Job records stay readable.
    pub fn close(&self) {
        {
            let mut state = self.inner.state.lock();
            state.closed = true;
            state.accepting = false;
            state.processor = None;
            state.events = None;
            state.finished.clear();
        }
        info!("queue closed");
    }

    /// Drain and close: stop admitting and pulling, wait for in-flight
    /// attempts to settle, then [`close`](Self::close).
    pub async fn shutdown(&self) {
        {
            let mut state = self.inner.state.lock();
            state.accepting = false;
            state.paused = true;
        }
        info!("draining queue");

        loop {
            let notified = self.inner.idle.notified();
            if self.inner.state.lock().active.is_empty() {
                break;
            }
            notified.await;
        }

        self.close();
    }

    pub fn is_closed(&self) -> bool {
        self.inner.state.lock().closed
    }

    /// Subscribe to lifecycle events; a closed queue yields an ended stream
    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent<I, O>> {
        match &self.inner.state.lock().events {
            Some(tx) => tx.subscribe(),
            None => broadcast::channel(1).1,
        }
    }

    /// Every completed or failed record, in settle order.
    ///
    /// Unlike [`subscribe`](Self::subscribe) nothing is dropped when the
    /// consumer falls behind. The stream ends when the queue closes.
    pub fn subscribe_finished(&self) -> mpsc::UnboundedReceiver<JobRecord<I, O>> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut state = self.inner.state.lock();
        if !state.closed {
            state.finished.push(tx);
        }
        rx
    }

    /// Resolve once the job is terminal. `None` if the job is unknown or the
    /// queue closed before it finished.
    pub async fn wait(&self, id: &JobId) -> Option<JobOutcome<O>> {
        let mut events = self.subscribe();
        loop {
            let record = self.get_job(id)?;
            if let Some(outcome) = record.outcome() {
                return Some(outcome);
            }

            match events.recv().await {
                Ok(event) => {
                    if let Some(record) = event.terminal_record() {
                        if record.id == *id {
                            return record.outcome();
                        }
                    }
                }
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => {
                    return self.get_job(id).and_then(|r| r.outcome());
                }
            }
        }
    }

    /// Remove finished jobs whose `completed_at` is older than `cutoff`
    pub fn purge_finished_before(&self, cutoff: DateTime<Utc>) -> usize {
        self.inner.state.lock().store.remove_finished_before(cutoff)
    }
}

impl<I, O> Inner<I, O>
where
    I: Clone + Send + Sync + 'static,
    O: Clone + Send + Sync + 'static,
{
    /// Move pending jobs into free slots until one of them runs out
    fn fill_slots(self: &Arc<Self>) {
        loop {
            let (processor, ctx) = {
                let mut guard = self.state.lock();
                let state = &mut *guard;
                if state.closed || state.paused || state.active.len() >= state.concurrency {
                    return;
                }
                let Some(processor) = state.processor.clone() else {
                    return;
                };
                let Some(job_id) = state.pending.pop_front() else {
                    return;
                };
                let Some(record) = state.store.get_mut(&job_id) else {
                    continue;
                };
                if record.status != JobStatus::Pending {
                    continue;
                }

                record.start_attempt();
                let ctx = JobContext {
                    job_id: job_id.clone(),
                    attempt: record.attempts,
                    max_attempts: record.max_attempts,
                    input: record.input.clone(),
                    progress: ProgressReporter::new(
                        self.self_ref.clone(),
                        job_id.clone(),
                        record.attempts,
                    ),
                };
                state.active.insert(job_id.clone());
                emit(
                    &state.events,
                    JobEvent::Started {
                        job_id,
                        attempt: ctx.attempt,
                        at: Utc::now(),
                    },
                );
                (processor, ctx)
            };

            debug!(job_id = %ctx.job_id, attempt = ctx.attempt, "processing job");
            let inner = Arc::clone(self);
            tokio::spawn(async move { inner.run_attempt(processor, ctx).await });
        }
    }

    async fn run_attempt(self: Arc<Self>, processor: SharedProcessor<I, O>, ctx: JobContext<I>) {
        let job_id = ctx.job_id.clone();
        let result = AssertUnwindSafe(processor.process(ctx))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| Err(JobError::from_panic(panic)));

        self.settle(job_id, result);
        self.fill_slots();
    }

    /// Release the slot and apply the attempt's outcome
    fn settle(self: &Arc<Self>, job_id: JobId, result: Result<O, JobError>) {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        state.active.remove(&job_id);

        if let Some(record) = state.store.get_mut(&job_id) {
            match result {
                Ok(output) => {
                    record.complete(output);
                    info!(job_id = %job_id, attempts = record.attempts, "job completed");
                    emit(&state.events, JobEvent::Completed(record.clone()));
                    publish_finished(&mut state.finished, record);
                }
                Err(error) if record.can_retry() => {
                    let delay = self.retry_policy.delay(record.attempts);
                    let retry_at = retry_time(delay);
                    warn!(
                        job_id = %job_id,
                        attempt = record.attempts,
                        max_attempts = record.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "job failed, retrying"
                    );
                    record.schedule_retry(error.clone(), retry_at);
                    emit(
                        &state.events,
                        JobEvent::Retrying {
                            job_id: job_id.clone(),
                            attempt: record.attempts,
                            retry_at,
                            error,
                        },
                    );

                    let inner = Arc::clone(self);
                    tokio::spawn(async move {
                        tokio::time::sleep(delay).await;
                        inner.requeue(job_id);
                    });
                }
                Err(error) => {
                    error!(
                        job_id = %job_id,
                        attempts = record.attempts,
                        error = %error,
                        "job failed after all attempts"
                    );
                    record.fail(error);
                    emit(&state.events, JobEvent::Failed(record.clone()));
                    publish_finished(&mut state.finished, record);
                }
            }
        }

        let idle = state.active.is_empty();
        drop(guard);
        if idle {
            self.idle.notify_waiters();
        }
    }

    /// Backoff elapsed: put the job back at the tail of the pending list
    fn requeue(self: &Arc<Self>, job_id: JobId) {
        {
            let mut guard = self.state.lock();
            let state = &mut *guard;
            if state.closed {
                return;
            }
            match state.store.get_mut(&job_id) {
                Some(record) if record.is_backing_off() => {
                    record.requeue();
                    state.pending.push_back(job_id.clone());
                }
                _ => return,
            }
        }

        debug!(job_id = %job_id, "job re-enqueued after backoff");
        self.fill_slots();
    }
}

impl<I, O> ProgressSink for Inner<I, O>
where
    I: Send + Sync,
    O: Send + Sync,
{
    fn report(&self, job_id: &JobId, attempt: u32, percent: u8) {
        let mut state = self.state.lock();
        if let Some(record) = state.store.get_mut(job_id) {
            if record.attempts == attempt {
                record.advance_progress(percent);
            }
        }
    }
}
