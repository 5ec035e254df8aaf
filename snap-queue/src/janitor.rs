use std::time::Duration;

use chrono::Utc;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

use crate::{config::RetentionConfig, Scheduler};

/// Periodically evicts finished jobs older than the retention window
pub struct Janitor<I, O> {
    scheduler: Scheduler<I, O>,
    interval: Duration,
    retention: Duration,
}

impl<I, O> Janitor<I, O>
where
    I: Clone + Send + Sync + 'static,
    O: Clone + Send + Sync + 'static,
{
    pub fn new(scheduler: Scheduler<I, O>, config: &RetentionConfig) -> Self {
        Self {
            scheduler,
            interval: config.sweep_interval,
            retention: config.max_age,
        }
    }

    /// Run one sweep; returns how many records were removed
    pub fn sweep_once(&self) -> usize {
        let cutoff = chrono::Duration::from_std(self.retention)
            .ok()
            .and_then(|age| Utc::now().checked_sub_signed(age));
        let Some(cutoff) = cutoff else {
            return 0;
        };

        let removed = self.scheduler.purge_finished_before(cutoff);
        if removed > 0 {
            info!(removed, "cleaned up finished jobs");
        } else {
            debug!("no finished jobs past retention");
        }
        removed
    }

    /// Sweep on a fixed cadence until the handle is stopped or dropped
    pub fn spawn(self) -> JanitorHandle {
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel();
        info!(interval = ?self.interval, retention = ?self.retention, "starting job janitor");

        let task = tokio::spawn(async move {
            let mut ticker = interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // First tick fires immediately
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    _ = ticker.tick() => {
                        self.sweep_once();
                    }
                }
            }
            debug!("job janitor stopped");
        });

        JanitorHandle {
            shutdown: Some(shutdown_tx),
            task,
        }
    }
}

/// Owner of a running sweeper task
#[derive(Debug)]
pub struct JanitorHandle {
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl JanitorHandle {
    /// Stop the sweeper and wait for it to exit
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        let _ = (&mut self.task).await;
    }
}

impl Drop for JanitorHandle {
    fn drop(&mut self) {
        if self.shutdown.is_some() {
            self.task.abort();
        }
    }
}
