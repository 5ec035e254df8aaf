use std::collections::HashSet;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::broadcast::error::RecvError;
use tokio::time::Instant;

use snap_queue::{
    processor_fn, FixedDelays, JobContext, JobError, JobEvent, JobOutcome, JobStatus,
    QueueConfig, QueueError, Scheduler, PANIC_ERROR_CODE,
};

fn config(concurrency: usize) -> QueueConfig {
    QueueConfig {
        concurrency,
        ..QueueConfig::default()
    }
}

fn echo_queue(concurrency: usize) -> Scheduler<u32, u32> {
    let queue = Scheduler::new(config(concurrency));
    queue.set_processor(
        concurrency,
        processor_fn(|ctx: JobContext<u32>| async move { Ok::<_, JobError>(ctx.input * 10) }),
    );
    queue
}

/// Fails the first `failures` attempts of every job, then succeeds
fn flaky_processor(
    failures: u32,
    calls: Arc<AtomicU32>,
) -> impl snap_queue::Processor<u32, u32> {
    processor_fn(move |ctx: JobContext<u32>| {
        calls.fetch_add(1, Ordering::SeqCst);
        async move {
            if ctx.attempt <= failures {
                Err(JobError::new("NAVIGATION_FAILED", format!("attempt {} failed", ctx.attempt)))
            } else {
                Ok(ctx.input)
            }
        }
    })
}

async fn drain_event_names(rx: &mut tokio::sync::broadcast::Receiver<JobEvent<u32, u32>>) -> Vec<&'static str> {
    let mut names = Vec::new();
    loop {
        match rx.recv().await {
            Ok(event) => {
                let terminal = event.terminal_record().is_some();
                names.push(event.event_name());
                if terminal {
                    return names;
                }
            }
            Err(RecvError::Lagged(_)) => continue,
            Err(RecvError::Closed) => return names,
        }
    }
}

/// Q1. A submitted job stays pending until a processor picks it up
#[tokio::test(start_paused = true)]
async fn test_job_is_pending_before_pickup() {
    let queue: Scheduler<u32, u32> = Scheduler::new(QueueConfig::default());

    let job = queue.submit(1).unwrap();

    let record = queue.get_job(&job.id).unwrap();
    assert_eq!(record.status, JobStatus::Pending);
    assert_eq!(record.attempts, 0);
    assert!(record.started_at.is_none());
}

/// Q2. A succeeding processor completes the job in one attempt
#[tokio::test(start_paused = true)]
async fn test_success_completes_in_one_attempt() {
    let queue = echo_queue(5);

    let job = queue.submit(4).unwrap();
    let outcome = queue.wait(&job.id).await;

    assert_eq!(outcome, Some(JobOutcome::Completed(40)));
    let record = queue.get_job(&job.id).unwrap();
    assert_eq!(record.status, JobStatus::Completed);
    assert_eq!(record.attempts, 1);
    assert_eq!(record.progress, 100);
    assert_eq!(record.result, Some(40));
    assert!(record.completed_at.is_some());
    assert!(record.started_at.is_some());
}

/// Q3. Two failures then success: three attempts with 2s and 4s backoff
#[tokio::test(start_paused = true)]
async fn test_retries_with_exponential_backoff() {
    let calls = Arc::new(AtomicU32::new(0));
    let queue: Scheduler<u32, u32> = Scheduler::new(QueueConfig::default());
    queue.set_processor(5, flaky_processor(2, calls.clone()));

    let started = Instant::now();
    let job = queue.submit(7).unwrap();
    let outcome = queue.wait(&job.id).await;

    assert_eq!(outcome, Some(JobOutcome::Completed(7)));
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert!(started.elapsed() >= Duration::from_secs(6));

    let record = queue.get_job(&job.id).unwrap();
    assert_eq!(record.status, JobStatus::Completed);
    assert_eq!(record.attempts, 3);
    assert!(record.retry_at.is_none());
}

/// Q4. A job that always fails ends failed after max attempts
#[tokio::test(start_paused = true)]
async fn test_permanent_failure_after_max_attempts() {
    let calls = Arc::new(AtomicU32::new(0));
    let queue: Scheduler<u32, u32> = Scheduler::new(QueueConfig::default());
    let mut events = queue.subscribe();
    queue.set_processor(5, flaky_processor(u32::MAX, calls.clone()));

    let job = queue.submit(1).unwrap();
    let names = drain_event_names(&mut events).await;

    assert_eq!(
        names,
        vec!["enqueued", "started", "retrying", "started", "retrying", "started", "failed"]
    );

    let record = queue.get_job(&job.id).unwrap();
    assert_eq!(record.status, JobStatus::Failed);
    assert_eq!(record.attempts, 3);
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    let error = record.last_error.unwrap();
    assert_eq!(error.code, "NAVIGATION_FAILED");
    assert_eq!(error.message, "attempt 3 failed");

    let stats = queue.stats();
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.total, 0);
}

/// Q5. No more than `concurrency` attempts run at once
#[tokio::test(start_paused = true)]
async fn test_concurrency_is_bounded() {
    let running = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let queue: Scheduler<u32, u32> = Scheduler::new(config(2));

    let (r, p) = (running.clone(), peak.clone());
    queue.set_processor(
        2,
        processor_fn(move |ctx: JobContext<u32>| {
            let (running, peak) = (r.clone(), p.clone());
            async move {
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_secs(1)).await;
                running.fetch_sub(1, Ordering::SeqCst);
                Ok::<_, JobError>(ctx.input)
            }
        }),
    );

    let jobs: Vec<_> = (0..5).map(|i| queue.submit(i).unwrap()).collect();

    let stats = queue.stats();
    assert_eq!(stats.active, 2);
    assert_eq!(stats.waiting, 3);
    assert_eq!(stats.total, 5);

    for job in &jobs {
        assert!(queue.wait(&job.id).await.unwrap().is_completed());
    }
    assert_eq!(peak.load(Ordering::SeqCst), 2);
    assert_eq!(queue.stats().completed, 5);
}

/// Q6. Jobs that never fail start in submission order
#[tokio::test(start_paused = true)]
async fn test_fifo_start_order() {
    let order = Arc::new(Mutex::new(Vec::new()));
    let queue: Scheduler<u32, u32> = Scheduler::new(config(1));

    let log = order.clone();
    queue.set_processor(
        1,
        processor_fn(move |ctx: JobContext<u32>| {
            log.lock().push(ctx.input);
            async move { Ok::<_, JobError>(ctx.input) }
        }),
    );

    let jobs: Vec<_> = (1..=4).map(|i| queue.submit(i).unwrap()).collect();
    for job in &jobs {
        queue.wait(&job.id).await;
    }

    assert_eq!(*order.lock(), vec![1, 2, 3, 4]);
}

/// Q7. A retried job re-enters at the tail, behind younger jobs
#[tokio::test(start_paused = true)]
async fn test_retry_reenters_at_tail() {
    let order = Arc::new(Mutex::new(Vec::new()));
    let queue: Scheduler<u32, u32> =
        Scheduler::with_retry_policy(config(1), FixedDelays(vec![Duration::from_millis(10)]));

    let log = order.clone();
    queue.set_processor(
        1,
        processor_fn(move |ctx: JobContext<u32>| {
            log.lock().push(ctx.input);
            async move {
                match ctx.input {
                    1 if ctx.attempt == 1 => Err(JobError::message("first attempt fails")),
                    2 => {
                        tokio::time::sleep(Duration::from_millis(100)).await;
                        Ok(2)
                    }
                    n => Ok(n),
                }
            }
        }),
    );
    queue.pause();

    let a = queue.submit(1).unwrap();
    let b = queue.submit(2).unwrap();
    let c = queue.submit(3).unwrap();
    queue.resume();

    for job in [&a, &b, &c] {
        assert!(queue.wait(&job.id).await.unwrap().is_completed());
    }
    assert_eq!(*order.lock(), vec![1, 2, 3, 1]);
    assert_eq!(queue.get_job(&a.id).unwrap().attempts, 2);
}

/// Q8. Paused queues hold jobs; resuming releases them
#[tokio::test(start_paused = true)]
async fn test_pause_and_resume() {
    let queue = echo_queue(2);
    queue.pause();

    let job = queue.submit(3).unwrap();
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(queue.get_job(&job.id).unwrap().status, JobStatus::Pending);
    assert_eq!(queue.stats().waiting, 1);

    queue.resume();
    assert_eq!(queue.wait(&job.id).await, Some(JobOutcome::Completed(30)));
}

/// Q9. Shutdown lets in-flight attempts finish, then refuses work and ends streams
#[tokio::test(start_paused = true)]
async fn test_shutdown_drains_in_flight_jobs() {
    let queue: Scheduler<u32, u32> = Scheduler::new(config(1));
    queue.set_processor(
        1,
        processor_fn(|ctx: JobContext<u32>| async move {
            tokio::time::sleep(Duration::from_secs(2)).await;
            Ok::<_, JobError>(ctx.input)
        }),
    );
    let mut events = queue.subscribe();

    let running = queue.submit(1).unwrap();
    let queued = queue.submit(2).unwrap();
    assert_eq!(queue.stats().active, 1);

    queue.shutdown().await;

    assert_eq!(queue.get_job(&running.id).unwrap().status, JobStatus::Completed);
    // Never started: stays pending and readable
    assert_eq!(queue.get_job(&queued.id).unwrap().status, JobStatus::Pending);
    assert_eq!(queue.submit(3).unwrap_err(), QueueError::Closed);
    assert!(queue.is_closed());

    let mut seen = Vec::new();
    loop {
        match events.recv().await {
            Ok(event) => seen.push(event.event_name()),
            Err(RecvError::Closed) => break,
            Err(RecvError::Lagged(_)) => continue,
        }
    }
    assert_eq!(seen, vec!["enqueued", "started", "enqueued", "completed"]);
}

/// Q10. Retry timers that fire after close are dropped
#[tokio::test(start_paused = true)]
async fn test_close_drops_pending_retries() {
    let calls = Arc::new(AtomicU32::new(0));
    let queue: Scheduler<u32, u32> = Scheduler::new(QueueConfig::default());
    queue.set_processor(1, flaky_processor(1, calls.clone()));

    let job = queue.submit(1).unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(queue.get_job(&job.id).unwrap().is_backing_off());
    assert_eq!(queue.stats().delayed, 1);

    queue.close();
    tokio::time::sleep(Duration::from_secs(10)).await;

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(queue.wait(&job.id).await, None);
}

/// Q11. A panicking processor fails the job without taking the pool down
#[tokio::test(start_paused = true)]
async fn test_processor_panic_is_contained() {
    let queue: Scheduler<u32, u32> = Scheduler::new(config(1));
    queue.set_processor(
        1,
        processor_fn(|ctx: JobContext<u32>| async move {
            if ctx.input == 0 {
                panic!("renderer crashed");
            }
            Ok::<_, JobError>(ctx.input)
        }),
    );

    let bad = queue.submit(0).unwrap();
    let good = queue.submit(5).unwrap();

    match queue.wait(&bad.id).await {
        Some(JobOutcome::Failed(error)) => {
            assert_eq!(error.code, PANIC_ERROR_CODE);
            assert_eq!(error.message, "renderer crashed");
        }
        other => panic!("expected failure, got {other:?}"),
    }
    assert_eq!(queue.get_job(&bad.id).unwrap().attempts, 3);
    assert_eq!(queue.wait(&good.id).await, Some(JobOutcome::Completed(5)));
}

/// Q12. Reading a terminal job has no side effects
#[tokio::test(start_paused = true)]
async fn test_get_job_is_idempotent() {
    let queue = echo_queue(1);
    let job = queue.submit(2).unwrap();
    queue.wait(&job.id).await;

    let first = serde_json::to_string(&queue.get_job(&job.id).unwrap()).unwrap();
    let second = serde_json::to_string(&queue.get_job(&job.id).unwrap()).unwrap();
    assert_eq!(first, second);
}

/// Q13. Progress only moves forward within an attempt
#[tokio::test(start_paused = true)]
async fn test_progress_resets_between_attempts() {
    let queue: Scheduler<u32, u32> = Scheduler::new(config(1));
    let mut events = queue.subscribe();
    queue.set_processor(
        1,
        processor_fn(|ctx: JobContext<u32>| async move {
            ctx.progress.report(70);
            ctx.progress.report(40);
            if ctx.attempt == 1 {
                Err(JobError::message("render failed"))
            } else {
                tokio::time::sleep(Duration::from_secs(1)).await;
                Ok(ctx.input)
            }
        }),
    );

    let job = queue.submit(9).unwrap();

    // Wait for the second attempt to start
    let mut starts = 0;
    while starts < 2 {
        if let Ok(JobEvent::Started { .. }) = events.recv().await {
            starts += 1;
        }
    }
    tokio::time::sleep(Duration::from_millis(10)).await;
    let running = queue.get_job(&job.id).unwrap();
    assert_eq!(running.status, JobStatus::Active);
    assert_eq!(running.progress, 70);

    queue.update_progress(&job.id, 50);
    assert_eq!(queue.get_job(&job.id).unwrap().progress, 70);
    queue.update_progress(&job.id, 90);
    assert_eq!(queue.get_job(&job.id).unwrap().progress, 90);

    assert_eq!(queue.wait(&job.id).await, Some(JobOutcome::Completed(9)));
}

/// Q14. wait() on an unknown id resolves immediately
#[tokio::test]
async fn test_wait_unknown_job() {
    let queue = echo_queue(1);
    assert_eq!(queue.wait(&"missing".into()).await, None);
}

/// Q15. Finished records survive a burst that overflows the event buffer
#[tokio::test]
async fn test_finished_stream_survives_event_overflow() {
    let queue: Scheduler<u32, u32> = Scheduler::new(QueueConfig {
        concurrency: 256,
        event_capacity: 8,
        ..QueueConfig::default()
    });
    let mut events = queue.subscribe();
    let mut finished = queue.subscribe_finished();
    queue.set_processor(
        256,
        processor_fn(|ctx: JobContext<u32>| async move { Ok::<_, JobError>(ctx.input) }),
    );

    let ids: Vec<_> = (0..300).map(|i| queue.submit(i).unwrap().id).collect();
    for id in &ids {
        assert!(queue.wait(id).await.unwrap().is_completed());
    }
    queue.close();

    let mut seen = HashSet::new();
    while let Some(record) = finished.recv().await {
        assert_eq!(record.status, JobStatus::Completed);
        seen.insert(record.id);
    }
    assert_eq!(seen.len(), ids.len());

    // The broadcast subscriber did fall behind
    assert!(matches!(events.recv().await, Err(RecvError::Lagged(_))));
}

/// Q16. Subscribing to finished records after close yields an ended stream
#[tokio::test]
async fn test_finished_stream_after_close() {
    let queue = echo_queue(1);
    queue.close();
    assert!(queue.subscribe_finished().recv().await.is_none());
}
