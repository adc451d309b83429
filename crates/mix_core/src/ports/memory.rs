//! In-memory reference implementations of the queue and store ports.

use std::collections::{BTreeMap, HashMap, VecDeque};

use parking_lot::{Condvar, Mutex};

use crate::models::{JobEnvelope, StatusBlob};

use super::{JobQueue, JobStore, StoreError};

/// FIFO in-memory queue with blocking pop and explicit close.
pub struct MemoryJobQueue {
    state: Mutex<QueueState>,
    available: Condvar,
}

struct QueueState {
    jobs: VecDeque<JobEnvelope>,
    closed: bool,
}

impl MemoryJobQueue {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(QueueState {
                jobs: VecDeque::new(),
                closed: false,
            }),
            available: Condvar::new(),
        }
    }

    /// Close the queue: pending jobs still drain, then `pop` returns
    /// `None` to every waiting slot.
    pub fn close(&self) {
        let mut state = self.state.lock();
        state.closed = true;
        self.available.notify_all();
    }

    /// Jobs currently waiting.
    pub fn len(&self) -> usize {
        self.state.lock().jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().jobs.is_empty()
    }
}

impl Default for MemoryJobQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl JobQueue for MemoryJobQueue {
    fn push(&self, envelope: JobEnvelope) {
        let mut state = self.state.lock();
        state.jobs.push_back(envelope);
        self.available.notify_one();
    }

    fn pop(&self) -> Option<JobEnvelope> {
        let mut state = self.state.lock();
        loop {
            if let Some(envelope) = state.jobs.pop_front() {
                return Some(envelope);
            }
            if state.closed {
                return None;
            }
            self.available.wait(&mut state);
        }
    }
}

#[derive(Default)]
struct JobRecord {
    status: Option<StatusBlob>,
    inputs: BTreeMap<String, Vec<u8>>,
    artifacts: BTreeMap<String, Vec<u8>>,
}

/// In-memory job store; concurrency-safe, atomic per operation.
pub struct MemoryJobStore {
    jobs: Mutex<HashMap<String, JobRecord>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self {
            jobs: Mutex::new(HashMap::new()),
        }
    }

    /// Names of the artifacts stored for a job.
    pub fn artifact_names(&self, job_id: &str) -> Vec<String> {
        self.jobs
            .lock()
            .get(job_id)
            .map(|r| r.artifacts.keys().cloned().collect())
            .unwrap_or_default()
    }
}

impl Default for MemoryJobStore {
    fn default() -> Self {
        Self::new()
    }
}

impl JobStore for MemoryJobStore {
    fn set_status(&self, job_id: &str, status: StatusBlob) {
        self.jobs
            .lock()
            .entry(job_id.to_string())
            .or_default()
            .status = Some(status);
    }

    fn get_status(&self, job_id: &str) -> Option<StatusBlob> {
        self.jobs.lock().get(job_id)?.status.clone()
    }

    fn put_artifact(&self, job_id: &str, name: &str, bytes: Vec<u8>) -> Result<(), StoreError> {
        let mut jobs = self.jobs.lock();
        let record = jobs.entry(job_id.to_string()).or_default();
        if record.artifacts.contains_key(name) {
            tracing::debug!(job_id, name, "artifact already stored; keeping first write");
            return Ok(());
        }
        record.artifacts.insert(name.to_string(), bytes);
        Ok(())
    }

    fn get_artifact(&self, job_id: &str, name: &str) -> Option<Vec<u8>> {
        self.jobs.lock().get(job_id)?.artifacts.get(name).cloned()
    }

    fn put_input(&self, job_id: &str, name: &str, bytes: Vec<u8>) {
        self.jobs
            .lock()
            .entry(job_id.to_string())
            .or_default()
            .inputs
            .insert(name.to_string(), bytes);
    }

    fn get_inputs(&self, job_id: &str) -> BTreeMap<String, Vec<u8>> {
        self.jobs
            .lock()
            .get(job_id)
            .map(|r| r.inputs.clone())
            .unwrap_or_default()
    }
}
