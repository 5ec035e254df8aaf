use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::{JobId, JobRecord, JobStatus, QueueError, QueueResult};

/// In-memory job table keyed by job id.
///
/// No locking of its own: the scheduler owns the single instance and
/// serializes every access behind its state mutex.
#[derive(Debug)]
pub struct JobStore<I, O> {
    jobs: HashMap<JobId, JobRecord<I, O>>,
}

impl<I, O> Default for JobStore<I, O> {
    fn default() -> Self {
        Self {
            jobs: HashMap::new(),
        }
    }
}

impl<I, O> JobStore<I, O> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a fresh record; ids must be unique for the table's lifetime
    pub fn insert(&mut self, record: JobRecord<I, O>) -> QueueResult<()> {
        if self.jobs.contains_key(&record.id) {
            return Err(QueueError::DuplicateJob(record.id.to_string()));
        }
        self.jobs.insert(record.id.clone(), record);
        Ok(())
    }

    pub fn get(&self, id: &JobId) -> Option<&JobRecord<I, O>> {
        self.jobs.get(id)
    }

    pub fn get_mut(&mut self, id: &JobId) -> Option<&mut JobRecord<I, O>> {
        self.jobs.get_mut(id)
    }

    pub fn count_status(&self, status: JobStatus) -> usize {
        self.jobs.values().filter(|r| r.status == status).count()
    }

    /// Jobs that failed an attempt and are waiting out their backoff
    pub fn count_backing_off(&self) -> usize {
        self.jobs.values().filter(|r| r.is_backing_off()).count()
    }

    /// Remove terminal records whose `completed_at` is older than `cutoff`.
    /// Transient jobs are never touched.
    pub fn remove_finished_before(&mut self, cutoff: DateTime<Utc>) -> usize {
        let before = self.jobs.len();
        self.jobs.retain(|_, record| !record.finished_before(cutoff));
        before - self.jobs.len()
    }
}
