//! The orchestrator itself: ingest, stage loop, finalize.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::context::{CancelHandle, ContextError, JobContext};
use crate::contracts::ContractRegistry;
use crate::logging::JobLogger;
use crate::models::{FinalMetrics, JobEnvelope};
use crate::ports::{ArtifactSink, MediaSource, ProgressSink};
use crate::runner::{StageExecution, StageRunner};
use crate::stages::StageRegistry;

use super::errors::{PipelineError, PipelineResult};
use super::plan::resolve_plan;
use super::report::{build_report, compute_final_metrics, REPORT_ARTIFACT};

/// What a successful run hands back to the worker loop.
#[derive(Debug)]
pub struct JobOutcome {
    pub job_id: String,
    pub total_stages: u32,
    pub stages_completed: Vec<String>,
    pub final_metrics: FinalMetrics,
    /// Artifact names published to the sink, in publish order.
    pub artifact_names: Vec<String>,
}

/// Runs full jobs against a fixed contract and stage registry pair.
pub struct Orchestrator {
    contracts: Arc<ContractRegistry>,
    stages: Arc<StageRegistry>,
}

impl Orchestrator {
    pub fn new(contracts: Arc<ContractRegistry>, stages: Arc<StageRegistry>) -> Self {
        Self { contracts, stages }
    }

    /// The standard pipeline: built-in contracts, standard stage set.
    pub fn standard() -> Self {
        Self::new(
            Arc::new(ContractRegistry::standard()),
            Arc::new(StageRegistry::standard()),
        )
    }

    pub fn contracts(&self) -> &ContractRegistry {
        &self.contracts
    }

    /// Run one job to completion.
    ///
    /// On success the report and mixdown artifacts are published and the
    /// outcome carries the final metrics. On failure or cancellation the
    /// already-rendered artifacts (never `report.json`) are flushed
    /// best-effort and the error is returned as a value for the worker to
    /// publish.
    pub fn run_job(
        &self,
        envelope: &JobEnvelope,
        media: &dyn MediaSource,
        progress: &dyn ProgressSink,
        artifacts: &dyn ArtifactSink,
        logger: &JobLogger,
        cancel: CancelHandle,
    ) -> PipelineResult<JobOutcome> {
        let job_id = envelope.job_id.clone();

        // 1. Resolve the plan before touching any audio.
        let plan = resolve_plan(&self.contracts, envelope.enabled_stage_ids.as_deref())?;
        let total_stages = plan.len() as u32;
        logger.info(&format!(
            "resolved plan: {} stage(s) for job '{job_id}'",
            total_stages
        ));

        // 2. Ingest.
        let mut ctx = JobContext::new(&job_id, cancel);
        let sources = media.resolve(&job_id, &envelope.media_ref)?;
        let loaded = ctx.load_stems(&sources).map_err(|e| match e {
            ContextError::InputMissing => PipelineError::input_missing(format!(
                "media ref '{}' yielded no decodable stems",
                envelope.media_ref
            )),
            other => PipelineError::input_missing(other.to_string()),
        })?;
        ctx.apply_metadata(&envelope.metadata);
        logger.info(&format!(
            "loaded {loaded} stem(s) at {} Hz",
            ctx.sample_rate()
        ));

        // 3. Initial mixdown.
        ctx.refresh_mixdown();

        // 4. Execute the plan.
        let runner = StageRunner::new(&self.stages, progress, logger);
        let mut executions: Vec<StageExecution> = Vec::with_capacity(plan.len());
        for (index, contract) in plan.iter().enumerate() {
            match runner.run_stage(&mut ctx, contract, index as u32 + 1, total_stages) {
                Ok(execution) => executions.push(execution),
                Err(error) => {
                    self.flush_best_effort(&ctx, artifacts, logger);
                    return Err(error);
                }
            }
        }

        // Cancellation between the last stage and finalize is still honored.
        if ctx.is_cancelled() {
            self.flush_best_effort(&ctx, artifacts, logger);
            return Err(PipelineError::cancelled(None));
        }

        // 5. Finalize.
        let final_metrics = compute_final_metrics(&ctx);
        logger.measure(&format!(
            "final mix: {:.2} LUFS, {:.2} dBTP, LRA {:.2} LU",
            final_metrics.integrated_lufs,
            final_metrics.true_peak_dbtp,
            final_metrics.loudness_range_lu
        ));
        let stage_names: BTreeMap<String, String> = plan
            .iter()
            .map(|c| (c.id.clone(), c.name.clone()))
            .collect();
        let style_preset = envelope.style_preset().unwrap_or("Unknown").to_string();
        let report = build_report(
            &ctx,
            &executions,
            &stage_names,
            &style_preset,
            final_metrics.clone(),
        );
        let report_bytes = serde_json::to_vec_pretty(&report).map_err(|e| {
            PipelineError::artifact_write_failed(REPORT_ARTIFACT, e.to_string())
        })?;
        ctx.put_artifact(REPORT_ARTIFACT, report_bytes);

        // Make sure an empty plan still ships the raw mixdown.
        if ctx.get_artifact(crate::runner::MIXDOWN_ARTIFACT).is_none() {
            if let Some(mix) = ctx.mixdown() {
                let bytes = crate::audio::wav::encode(mix, ctx.sample_rate()).map_err(|e| {
                    PipelineError::artifact_write_failed(
                        crate::runner::MIXDOWN_ARTIFACT,
                        e.to_string(),
                    )
                })?;
                ctx.put_artifact(crate::runner::MIXDOWN_ARTIFACT, bytes);
            }
        }

        let mut artifact_names = Vec::new();
        for (name, bytes) in ctx.artifacts() {
            artifacts.publish(&job_id, name, bytes.clone())?;
            artifact_names.push(name.clone());
        }
        logger.success(&format!(
            "job '{job_id}' finished: {} artifact(s) published",
            artifact_names.len()
        ));

        Ok(JobOutcome {
            job_id,
            total_stages,
            stages_completed: executions.iter().map(|e| e.contract_id.clone()).collect(),
            final_metrics,
            artifact_names,
        })
    }

    /// Flush whatever is staged, minus the report (which is only written
    /// on success). Failures here are logged and swallowed; the job is
    /// already on its failure path.
    fn flush_best_effort(
        &self,
        ctx: &JobContext,
        artifacts: &dyn ArtifactSink,
        logger: &JobLogger,
    ) {
        for (name, bytes) in ctx.artifacts() {
            if name == REPORT_ARTIFACT {
                continue;
            }
            if let Err(e) = artifacts.publish(ctx.job_id(), name, bytes.clone()) {
                logger.warn(&format!("best-effort artifact '{name}' not published: {e}"));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{wav, AudioBuffer};
    use crate::models::JobEnvelope;
    use crate::ports::{MemoryJobStore, NullProgressSink, StoreArtifactSink, StoreMediaSource};
    use crate::ports::JobStore;

    fn sine_wav(freq: f64, seconds: f64, rate: u32) -> Vec<u8> {
        let frames = (seconds * rate as f64) as usize;
        let samples: Vec<f32> = (0..frames)
            .map(|i| {
                0.4 * (2.0 * std::f64::consts::PI * freq * i as f64 / rate as f64).sin() as f32
            })
            .collect();
        wav::encode(&AudioBuffer::new(1, samples), rate).unwrap()
    }

    fn store_with_inputs(job_id: &str) -> Arc<MemoryJobStore> {
        let store = Arc::new(MemoryJobStore::new());
        store.put_input(job_id, "a.wav", sine_wav(440.0, 1.0, 44_100));
        store.put_input(job_id, "b.wav", sine_wav(880.0, 0.5, 44_100));
        store
    }

    #[test]
    fn full_standard_plan_succeeds() {
        let store = store_with_inputs("job-full");
        let orchestrator = Orchestrator::standard();
        let outcome = orchestrator
            .run_job(
                &JobEnvelope::new("job-full", "store"),
                &StoreMediaSource::new(store.clone()),
                &NullProgressSink,
                &StoreArtifactSink::new(store.clone()),
                &JobLogger::null("job-full"),
                CancelHandle::new(),
            )
            .unwrap();

        assert_eq!(outcome.total_stages as usize, outcome.stages_completed.len());
        assert!(store.get_artifact("job-full", "report.json").is_some());
        assert!(store.get_artifact("job-full", "full_song.wav").is_some());
        assert!(outcome.final_metrics.integrated_lufs.is_finite());
    }

    #[test]
    fn zero_inputs_fail_with_input_missing() {
        let store = Arc::new(MemoryJobStore::new());
        let orchestrator = Orchestrator::standard();
        let err = orchestrator
            .run_job(
                &JobEnvelope::new("job-empty", "store"),
                &StoreMediaSource::new(store.clone()),
                &NullProgressSink,
                &StoreArtifactSink::new(store),
                &JobLogger::null("job-empty"),
                CancelHandle::new(),
            )
            .unwrap_err();
        assert!(matches!(err, PipelineError::InputMissing { .. }));
    }

    #[test]
    fn invalid_plan_fails_before_ingest() {
        let store = store_with_inputs("job-plan");
        let orchestrator = Orchestrator::standard();
        let err = orchestrator
            .run_job(
                &JobEnvelope::new("job-plan", "store")
                    .with_stages(["S10_MASTER_FINAL_LIMITS"]),
                &StoreMediaSource::new(store.clone()),
                &NullProgressSink,
                &StoreArtifactSink::new(store.clone()),
                &JobLogger::null("job-plan"),
                CancelHandle::new(),
            )
            .unwrap_err();
        assert!(matches!(err, PipelineError::InvalidPlan { .. }));
        // Nothing published.
        assert!(store.get_artifact("job-plan", "report.json").is_none());
        assert!(store.get_artifact("job-plan", "full_song.wav").is_none());
    }
}
