//! Progress and artifact publication paths.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::StatusBlob;
use crate::orchestrator::errors::PipelineError;

use super::JobStore;

/// One per-stage progress event emitted by the stage runner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEvent {
    /// Contract id of the stage that just completed.
    pub stage_id: String,
    /// 1-based position of the completed stage in the resolved plan.
    pub stage_index: u32,
    /// Stages in the resolved plan.
    pub total_stages: u32,
    /// Human-readable progress line.
    pub message: String,
    /// Wall-clock seconds the stage took.
    pub elapsed_sec: f64,
    /// Session block of the pre-analysis record.
    pub pre_summary: Value,
    /// Session block of the post-analysis record.
    pub post_summary: Value,
    /// Changed-field summary of the stage diff.
    pub diff_summary: Value,
}

/// Receives per-stage progress events, in stage order, from a single
/// thread per job.
pub trait ProgressSink: Send + Sync {
    fn emit(&self, job_id: &str, event: &ProgressEvent);
}

/// A sink that ignores everything (embedded/test use).
pub struct NullProgressSink;

impl ProgressSink for NullProgressSink {
    fn emit(&self, _job_id: &str, _event: &ProgressEvent) {}
}

/// Default sink: composes a `running` status blob and writes it to the
/// job store (last writer wins; order is guaranteed by the worker loop's
/// single thread per job).
pub struct StoreProgressSink {
    store: Arc<dyn JobStore>,
}

impl StoreProgressSink {
    pub fn new(store: Arc<dyn JobStore>) -> Self {
        Self { store }
    }
}

impl ProgressSink for StoreProgressSink {
    fn emit(&self, job_id: &str, event: &ProgressEvent) {
        self.store.set_status(
            job_id,
            StatusBlob::running(
                job_id,
                event.stage_index,
                event.total_stages,
                &event.stage_id,
                &event.message,
            ),
        );
    }
}

/// Publishes named artifacts for a job.
pub trait ArtifactSink: Send + Sync {
    fn publish(&self, job_id: &str, name: &str, bytes: Vec<u8>) -> Result<(), PipelineError>;
}

/// Thin adapter over [`JobStore::put_artifact`] mapping store refusal to
/// [`PipelineError::ArtifactWriteFailed`].
pub struct StoreArtifactSink {
    store: Arc<dyn JobStore>,
}

impl StoreArtifactSink {
    pub fn new(store: Arc<dyn JobStore>) -> Self {
        Self { store }
    }
}

impl ArtifactSink for StoreArtifactSink {
    fn publish(&self, job_id: &str, name: &str, bytes: Vec<u8>) -> Result<(), PipelineError> {
        self.store
            .put_artifact(job_id, name, bytes)
            .map_err(|e| PipelineError::artifact_write_failed(name, e.to_string()))
    }
}
