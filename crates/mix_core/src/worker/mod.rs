//! Worker loop: queue intake and the job lifecycle.
//!
//! Each worker slot blocks on the queue, runs one job to completion
//! through the orchestrator, publishes terminal status, and only then
//! pops the next envelope. Multiple slots run as OS threads; each job
//! owns its context with no shared mutable state between slots.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread::JoinHandle;

use parking_lot::Mutex;

use crate::config::Settings;
use crate::context::CancelHandle;
use crate::logging::{JobLogger, LogConfig};
use crate::models::{JobEnvelope, StatusBlob};
use crate::orchestrator::Orchestrator;
use crate::ports::{JobQueue, JobStore, MediaSource, StoreArtifactSink, StoreProgressSink};

/// Env var exporting the current job id to DSP leaves.
///
/// Diagnostic propagation only - the core threads the context explicitly
/// and never reads this back. The variable is process-wide, so with
/// multiple slots it names one of the currently running jobs; all
/// mutation is serialized under the active-jobs lock and the variable is
/// only cleared once the last job finishes.
pub const JOB_ID_ENV: &str = "MIX_JOB_ID";

/// Hosts one or more concurrent job slots over a queue/store pair.
pub struct Worker {
    queue: Arc<dyn JobQueue>,
    store: Arc<dyn JobStore>,
    media: Arc<dyn MediaSource>,
    orchestrator: Arc<Orchestrator>,
    log_dir: Option<PathBuf>,
    active: Mutex<HashMap<String, CancelHandle>>,
}

impl Worker {
    pub fn new(
        queue: Arc<dyn JobQueue>,
        store: Arc<dyn JobStore>,
        media: Arc<dyn MediaSource>,
        orchestrator: Arc<Orchestrator>,
        settings: &Settings,
    ) -> Self {
        let log_dir = if settings.paths.logs_dir.is_empty() {
            None
        } else {
            Some(PathBuf::from(&settings.paths.logs_dir))
        };
        Self {
            queue,
            store,
            media,
            orchestrator,
            log_dir,
            active: Mutex::new(HashMap::new()),
        }
    }

    /// Request cancellation of a running job. Returns false when the job
    /// is not currently running on this worker.
    pub fn cancel(&self, job_id: &str) -> bool {
        match self.active.lock().get(job_id) {
            Some(handle) => {
                handle.cancel();
                true
            }
            None => false,
        }
    }

    /// Run one slot until the queue closes.
    pub fn run_slot(&self) {
        while let Some(envelope) = self.queue.pop() {
            self.process(&envelope);
        }
        tracing::info!("worker slot shutting down: queue closed");
    }

    /// Spawn the configured number of slots as threads.
    pub fn spawn(self: &Arc<Self>, slots: usize) -> Vec<JoinHandle<()>> {
        (0..slots.max(1))
            .map(|slot| {
                let worker = Arc::clone(self);
                std::thread::Builder::new()
                    .name(format!("mix-worker-{slot}"))
                    .spawn(move || worker.run_slot())
                    .expect("failed to spawn worker slot")
            })
            .collect()
    }

    /// Process one popped envelope end-to-end.
    ///
    /// At-least-once delivery makes duplicates normal: a job whose store
    /// status is already terminal is not re-run - its terminal status is
    /// re-published and the message is considered acknowledged.
    pub fn process(&self, envelope: &JobEnvelope) {
        let job_id = envelope.job_id.clone();

        if let Some(status) = self.store.get_status(&job_id) {
            if status.status.is_terminal() {
                tracing::info!(%job_id, "duplicate delivery of finished job; re-publishing status");
                self.store.set_status(&job_id, status);
                return;
            }
        }

        tracing::info!(%job_id, media_ref = %envelope.media_ref, "job started");
        self.store.set_status(
            &job_id,
            StatusBlob::running(&job_id, 0, 0, "initializing", "Initializing mix pipeline..."),
        );

        let logger = self.make_logger(&job_id);
        let cancel = CancelHandle::new();
        {
            let mut active = self.active.lock();
            active.insert(job_id.clone(), cancel.clone());
            // SAFETY: every environment mutation in this process happens
            // here, under the active-jobs lock. Other threads may still
            // read the environment concurrently (libc getenv is not
            // synchronized with setenv), which is the inherent hazard of
            // this diagnostic escape hatch.
            unsafe { std::env::set_var(JOB_ID_ENV, &job_id) };
        }

        let progress = StoreProgressSink::new(Arc::clone(&self.store));
        let artifacts = StoreArtifactSink::new(Arc::clone(&self.store));

        let result = self.orchestrator.run_job(
            envelope,
            self.media.as_ref(),
            &progress,
            &artifacts,
            &logger,
            cancel,
        );

        match result {
            Ok(outcome) => {
                tracing::info!(
                    %job_id,
                    stages = outcome.stages_completed.len(),
                    "job finished successfully"
                );
                self.store.set_status(
                    &job_id,
                    StatusBlob::success(
                        &job_id,
                        outcome.total_stages,
                        outcome.final_metrics,
                        outcome.artifact_names,
                    ),
                );
            }
            Err(error) => {
                // Progress reflects the last completed stage, which the
                // running blob already tracks.
                let (stage_index, total_stages) = self
                    .store
                    .get_status(&job_id)
                    .map(|s| (s.stage_index, s.total_stages))
                    .unwrap_or((0, 0));

                if error.is_cancellation() {
                    tracing::info!(%job_id, "job cancelled");
                    logger.warn("job cancelled");
                    self.store
                        .set_status(&job_id, StatusBlob::cancelled(&job_id, stage_index, total_stages));
                } else {
                    tracing::error!(%job_id, error = %error, "job failed");
                    logger.error(&error.to_string());
                    self.store.set_status(
                        &job_id,
                        StatusBlob::failure(
                            &job_id,
                            stage_index,
                            total_stages,
                            error.kind(),
                            error.stage_id().map(str::to_string),
                            error.to_string(),
                        ),
                    );
                }
            }
        }

        {
            let mut active = self.active.lock();
            active.remove(&job_id);
            // Keep the variable naming a still-running job; clear it only
            // when this slot finished the last one.
            // SAFETY: as in the set above - mutation is serialized under
            // the active-jobs lock.
            match active.keys().next() {
                Some(other) => unsafe { std::env::set_var(JOB_ID_ENV, other) },
                None => unsafe { std::env::remove_var(JOB_ID_ENV) },
            }
        }
    }

    fn make_logger(&self, job_id: &str) -> JobLogger {
        match &self.log_dir {
            Some(dir) => match JobLogger::new(job_id, dir, LogConfig::default(), None) {
                Ok(logger) => logger,
                Err(e) => {
                    tracing::warn!(job_id, "failed to create job log file: {e}");
                    JobLogger::null(job_id)
                }
            },
            None => JobLogger::null(job_id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{wav, AudioBuffer};
    use crate::models::JobStatus;
    use crate::ports::{MemoryJobQueue, MemoryJobStore, StoreMediaSource};

    fn sine_wav(rate: u32, seconds: f64) -> Vec<u8> {
        let frames = (rate as f64 * seconds) as usize;
        let samples: Vec<f32> = (0..frames)
            .map(|i| {
                0.4 * (2.0 * std::f64::consts::PI * 440.0 * i as f64 / rate as f64).sin() as f32
            })
            .collect();
        wav::encode(&AudioBuffer::new(1, samples), rate).unwrap()
    }

    fn worker_with_store() -> (Arc<Worker>, Arc<MemoryJobStore>, Arc<MemoryJobQueue>) {
        let queue = Arc::new(MemoryJobQueue::new());
        let store = Arc::new(MemoryJobStore::new());
        let media = Arc::new(StoreMediaSource::new(store.clone()));
        let mut settings = Settings::default();
        settings.paths.logs_dir = String::new(); // no files in tests
        let worker = Arc::new(Worker::new(
            queue.clone(),
            store.clone(),
            media,
            Arc::new(Orchestrator::standard()),
            &settings,
        ));
        (worker, store, queue)
    }

    #[test]
    fn successful_job_publishes_success_with_metrics() {
        let (worker, store, _queue) = worker_with_store();
        store.put_input("job-1", "a.wav", sine_wav(44_100, 1.0));

        worker.process(&JobEnvelope::new("job-1", "store"));

        let status = store.get_status("job-1").unwrap();
        assert_eq!(status.status, JobStatus::Success);
        assert_eq!(status.progress, 100.0);
        assert!(status.metrics.is_some());
        assert!(store.get_artifact("job-1", "report.json").is_some());
    }

    #[test]
    fn missing_inputs_publish_failure() {
        let (worker, store, _queue) = worker_with_store();
        worker.process(&JobEnvelope::new("job-2", "store"));

        let status = store.get_status("job-2").unwrap();
        assert_eq!(status.status, JobStatus::Failure);
        assert_eq!(status.error_kind.as_deref(), Some("InputMissing"));
        assert!(status.progress < 100.0);
        assert!(store.get_artifact("job-2", "report.json").is_none());
    }

    #[test]
    fn duplicate_delivery_is_idempotent() {
        let (worker, store, _queue) = worker_with_store();
        store.put_input("job-3", "a.wav", sine_wav(44_100, 1.0));

        let envelope = JobEnvelope::new("job-3", "store");
        worker.process(&envelope);
        let first = store.get_status("job-3").unwrap();
        let first_report = store.get_artifact("job-3", "report.json").unwrap();

        worker.process(&envelope);
        let second = store.get_status("job-3").unwrap();
        assert_eq!(second.status, JobStatus::Success);
        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
        // Artifacts are write-once: byte-identical after redelivery.
        assert_eq!(
            store.get_artifact("job-3", "report.json").unwrap(),
            first_report
        );
    }

    #[test]
    fn slots_drain_queue_and_stop_on_close() {
        let (worker, store, queue) = worker_with_store();
        store.put_input("job-4", "a.wav", sine_wav(44_100, 0.5));
        store.put_input("job-5", "a.wav", sine_wav(44_100, 0.5));
        queue.push(JobEnvelope::new("job-4", "store"));
        queue.push(JobEnvelope::new("job-5", "store"));
        queue.close();

        let handles = worker.spawn(2);
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(store.get_status("job-4").unwrap().status, JobStatus::Success);
        assert_eq!(store.get_status("job-5").unwrap().status, JobStatus::Success);
    }

    #[test]
    fn cancel_is_a_no_op_for_unknown_jobs() {
        let (worker, _store, _queue) = worker_with_store();
        assert!(!worker.cancel("ghost"));
    }
}
