//! Abstract transport and persistence boundaries.
//!
//! The core depends on four ports: a [`JobQueue`] the worker pops
//! envelopes from, a [`JobStore`] holding status blobs, inputs and
//! artifacts, a [`ProgressSink`] the orchestrator emits per-stage events
//! through, and an [`ArtifactSink`] for the finalize step. A
//! [`MediaSource`] resolves a job's `media_ref` to stem byte buffers.
//!
//! The in-memory implementations here are the reference semantics (and
//! the test harness); production deployments adapt their broker and KV
//! store to the same traits.

mod media;
mod memory;
mod sinks;

use std::collections::BTreeMap;

use thiserror::Error;

use crate::models::{JobEnvelope, StatusBlob};

pub use media::{DirMediaSource, MediaSource, StoreMediaSource};
pub use memory::{MemoryJobQueue, MemoryJobStore};
pub use sinks::{
    ArtifactSink, NullProgressSink, ProgressEvent, ProgressSink, StoreArtifactSink,
    StoreProgressSink,
};

/// A store-side refusal (quota, backend outage, ...).
#[derive(Error, Debug)]
#[error("{0}")]
pub struct StoreError(pub String);

/// FIFO queue of job envelopes. Delivery is at-least-once; consumers are
/// idempotent per `job_id`.
pub trait JobQueue: Send + Sync {
    /// Enqueue a job.
    fn push(&self, envelope: JobEnvelope);

    /// Block until a job is available. Returns `None` once the queue is
    /// closed and drained - the worker slot's shutdown signal.
    fn pop(&self) -> Option<JobEnvelope>;
}

/// Per-job key/value persistence: one status blob (overwritable), named
/// input buffers, and write-once artifacts. No cross-job queries.
pub trait JobStore: Send + Sync {
    /// Overwrite the job's status blob (last writer wins).
    fn set_status(&self, job_id: &str, status: StatusBlob);

    fn get_status(&self, job_id: &str) -> Option<StatusBlob>;

    /// Store an artifact. Write-once per `(job_id, name)`: a second write
    /// is a silent no-op, which keeps at-least-once job delivery
    /// idempotent.
    fn put_artifact(&self, job_id: &str, name: &str, bytes: Vec<u8>) -> Result<(), StoreError>;

    fn get_artifact(&self, job_id: &str, name: &str) -> Option<Vec<u8>>;

    /// Store an input buffer (uploaded stem).
    fn put_input(&self, job_id: &str, name: &str, bytes: Vec<u8>);

    /// All input buffers for a job, keyed by name.
    fn get_inputs(&self, job_id: &str) -> BTreeMap<String, Vec<u8>>;
}
