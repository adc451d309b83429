//! Stage runner: executes exactly one stage end-to-end.
//!
//! The runner owns the analyse -> process -> analyse sandwich, the
//! dependency gate, the mixdown refresh rules, the pre/post diff, the
//! timing record, the staged mixdown artifact and the progress event.
//! All stage errors are caught here and classified into the pipeline
//! error taxonomy; nothing above the runner ever sees a raw
//! [`StageError`].

use std::time::Instant;

use serde_json::Value;

use crate::analysis::{compute_diff, AnalysisRecord, StageDiff, POST_RECORD_SUFFIX};
use crate::audio::wav;
use crate::context::JobContext;
use crate::contracts::{Contract, StageKind};
use crate::logging::JobLogger;
use crate::orchestrator::errors::{PipelineError, PipelineResult, StageError};
use crate::ports::{ProgressEvent, ProgressSink};
use crate::stages::StageRegistry;

/// The mixdown artifact name, re-staged after every stage.
pub const MIXDOWN_ARTIFACT: &str = "full_song.wav";

/// Everything one stage execution produced.
#[derive(Debug)]
pub struct StageExecution {
    pub contract_id: String,
    pub pre: AnalysisRecord,
    pub post: AnalysisRecord,
    pub diff: StageDiff,
    pub duration_sec: f64,
}

/// Executes stages against a job context.
pub struct StageRunner<'a> {
    stages: &'a StageRegistry,
    progress: &'a dyn ProgressSink,
    logger: &'a JobLogger,
}

impl<'a> StageRunner<'a> {
    pub fn new(
        stages: &'a StageRegistry,
        progress: &'a dyn ProgressSink,
        logger: &'a JobLogger,
    ) -> Self {
        Self {
            stages,
            progress,
            logger,
        }
    }

    /// Run one stage. `stage_index` is the 1-based position in the plan.
    pub fn run_stage(
        &self,
        ctx: &mut JobContext,
        contract: &Contract,
        stage_index: u32,
        total_stages: u32,
    ) -> PipelineResult<StageExecution> {
        // 1. Cancellation is honored before any work.
        if ctx.is_cancelled() {
            self.logger
                .warn(&format!("cancelled before '{}'", contract.id));
            return Err(PipelineError::cancelled(None));
        }

        // 2. Dependency gate.
        for dep in &contract.depends_on {
            if !ctx.has_analysis(dep) {
                return Err(PipelineError::dependency_missing(&contract.id, dep));
            }
        }

        let stage = self
            .stages
            .get(&contract.id)
            .ok_or_else(|| PipelineError::unknown_stage(&contract.id))?;

        self.logger.phase(&contract.id);
        let started = Instant::now();

        // 3. Pre-analysis.
        let pre = stage
            .analyse(ctx, contract)
            .map_err(|e| classify(&contract.id, e, ErrorPhase::Analysis))?;
        ctx.record_analysis(&contract.id, pre.clone())
            .map_err(|e| {
                PipelineError::analysis_failed(&contract.id, StageError::other(e.to_string()))
            })?;

        // 4/5. Process and post-analysis; both collapse for analysis-only
        // stages (post equals pre, diff is empty).
        let (post, diff) = if contract.kind == StageKind::AnalysisOnly {
            (pre.clone(), StageDiff::default())
        } else {
            stage
                .process(ctx, contract, &pre)
                .map_err(|e| classify(&contract.id, e, ErrorPhase::Process))?;

            if contract.kind.refreshes_mixdown() {
                ctx.refresh_mixdown();
            }

            let post = stage
                .analyse(ctx, contract)
                .map_err(|e| classify(&contract.id, e, ErrorPhase::Analysis))?;
            ctx.record_analysis(format!("{}{}", contract.id, POST_RECORD_SUFFIX), post.clone())
                .map_err(|e| {
                    PipelineError::analysis_failed(&contract.id, StageError::other(e.to_string()))
                })?;

            // 6. Diff.
            let diff = compute_diff(&pre, &post);
            (post, diff)
        };

        // Re-stage the current mixdown so a later failure still leaves the
        // best-effort render of everything that succeeded so far.
        if let Some(mix) = ctx.mixdown() {
            let bytes = wav::encode(mix, ctx.sample_rate()).map_err(|e| {
                PipelineError::artifact_write_failed(MIXDOWN_ARTIFACT, e.to_string())
            })?;
            ctx.put_artifact(MIXDOWN_ARTIFACT, bytes);
        }

        // 7. Timing.
        let duration = started.elapsed();
        ctx.record_timing(&contract.id, duration);

        // 8. Progress event.
        let changed = diff.changed_count();
        let message = format!(
            "Completed {} ({}/{}) - {} field(s) changed",
            contract.name, stage_index, total_stages, changed
        );
        let event = ProgressEvent {
            stage_id: contract.id.clone(),
            stage_index,
            total_stages,
            message: message.clone(),
            elapsed_sec: duration.as_secs_f64(),
            pre_summary: serde_json::to_value(&pre.session).unwrap_or(Value::Null),
            post_summary: serde_json::to_value(&post.session).unwrap_or(Value::Null),
            diff_summary: serde_json::to_value(&diff).unwrap_or(Value::Null),
        };
        self.progress.emit(ctx.job_id(), &event);
        self.logger.success(&message);

        Ok(StageExecution {
            contract_id: contract.id.clone(),
            pre,
            post,
            diff,
            duration_sec: duration.as_secs_f64(),
        })
    }
}

enum ErrorPhase {
    Analysis,
    Process,
}

/// Map a stage error to the taxonomy; a cancellation surfaced by the
/// stage stays a cancellation, never a failure.
fn classify(stage_id: &str, error: StageError, phase: ErrorPhase) -> PipelineError {
    if matches!(error, StageError::Cancelled) {
        return PipelineError::cancelled(Some(stage_id.to_string()));
    }
    match phase {
        ErrorPhase::Analysis => PipelineError::analysis_failed(stage_id, error),
        ErrorPhase::Process => PipelineError::process_failed(stage_id, error),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::StemAnalysis;
    use crate::audio::AudioBuffer;
    use crate::context::{CancelHandle, Stem};
    use crate::contracts::StageKind;
    use crate::orchestrator::errors::StageResult;
    use crate::ports::NullProgressSink;
    use crate::stages::Stage;
    use std::collections::BTreeMap;

    fn contract(id: &str, kind: StageKind, depends_on: Vec<String>) -> Contract {
        Contract {
            id: id.to_string(),
            ordinal: 0,
            name: id.to_string(),
            kind,
            depends_on,
            metrics: BTreeMap::new(),
            limits: BTreeMap::new(),
        }
    }

    fn ctx_with_stem() -> JobContext {
        let mut ctx = JobContext::new("j", CancelHandle::new());
        ctx.set_sample_rate(44_100);
        ctx.stems_mut().insert(
            "a.wav".to_string(),
            Stem::new("a.wav", 44_100, AudioBuffer::new(1, vec![0.5; 64])),
        );
        ctx.refresh_mixdown();
        ctx
    }

    /// Measures stem peaks; halves every stem in process.
    struct HalfGainStage;

    impl Stage for HalfGainStage {
        fn analyse(&self, ctx: &JobContext, contract: &Contract) -> StageResult<AnalysisRecord> {
            let mut record = AnalysisRecord::for_contract(contract);
            for stem in ctx.stems().values() {
                record.push_stem(
                    StemAnalysis::new(&stem.name)
                        .with("peak", stem.buffer.peak() as f64),
                );
            }
            record.set_session(
                "mix_peak",
                ctx.mixdown().map(|m| m.peak() as f64).unwrap_or(0.0),
            );
            Ok(record)
        }

        fn process(
            &self,
            ctx: &mut JobContext,
            _contract: &Contract,
            _pre: &AnalysisRecord,
        ) -> StageResult<()> {
            for stem in ctx.stems_mut().values_mut() {
                stem.buffer.apply_gain(0.5);
            }
            Ok(())
        }
    }

    struct FailingStage;

    impl Stage for FailingStage {
        fn analyse(&self, _ctx: &JobContext, contract: &Contract) -> StageResult<AnalysisRecord> {
            Ok(AnalysisRecord::for_contract(contract))
        }

        fn process(
            &self,
            _ctx: &mut JobContext,
            _contract: &Contract,
            _pre: &AnalysisRecord,
        ) -> StageResult<()> {
            Err(StageError::other("deliberate"))
        }
    }

    fn registry() -> StageRegistry {
        let mut registry = StageRegistry::new();
        registry.register("HALF", HalfGainStage);
        registry.register("FAIL", FailingStage);
        registry
    }

    #[test]
    fn stems_dsp_stage_refreshes_mixdown_and_diffs() {
        let registry = registry();
        let sink = NullProgressSink;
        let logger = JobLogger::null("j");
        let runner = StageRunner::new(&registry, &sink, &logger);

        let mut ctx = ctx_with_stem();
        let contract = contract("HALF", StageKind::StemsDsp, Vec::new());
        let execution = runner.run_stage(&mut ctx, &contract, 1, 1).unwrap();

        // Mixdown refreshed to the halved stems.
        assert!((ctx.mixdown().unwrap().peak() - 0.25).abs() < 1e-7);
        // Pre and post records both stored.
        assert!(ctx.has_analysis("HALF"));
        assert!(ctx.has_analysis("HALF:post"));
        // Diff saw the change.
        assert!(execution.diff.session["mix_peak"].changed);
        assert!(execution.diff.stems["a.wav"]["peak"].changed);
        // The staged mixdown artifact tracks the new state.
        assert!(ctx.get_artifact(MIXDOWN_ARTIFACT).is_some());
    }

    #[test]
    fn analysis_only_stage_collapses_post() {
        let mut registry = StageRegistry::new();
        registry.register("MEASURE", HalfGainStage); // process never called
        let sink = NullProgressSink;
        let logger = JobLogger::null("j");
        let runner = StageRunner::new(&registry, &sink, &logger);

        let mut ctx = ctx_with_stem();
        let contract = contract("MEASURE", StageKind::AnalysisOnly, Vec::new());
        let execution = runner.run_stage(&mut ctx, &contract, 1, 1).unwrap();

        assert!(execution.diff.is_unchanged());
        assert!(ctx.has_analysis("MEASURE"));
        assert!(!ctx.has_analysis("MEASURE:post"));
        // Stems untouched.
        assert!((ctx.stems()["a.wav"].buffer.peak() - 0.5).abs() < 1e-7);
    }

    #[test]
    fn dependency_gate_fires() {
        let registry = registry();
        let sink = NullProgressSink;
        let logger = JobLogger::null("j");
        let runner = StageRunner::new(&registry, &sink, &logger);

        let mut ctx = ctx_with_stem();
        let contract = contract("HALF", StageKind::StemsDsp, vec!["MISSING".to_string()]);
        let err = runner.run_stage(&mut ctx, &contract, 1, 1).unwrap_err();
        assert!(matches!(err, PipelineError::DependencyMissing { .. }));
    }

    #[test]
    fn process_failure_is_classified() {
        let registry = registry();
        let sink = NullProgressSink;
        let logger = JobLogger::null("j");
        let runner = StageRunner::new(&registry, &sink, &logger);

        let mut ctx = ctx_with_stem();
        let contract = contract("FAIL", StageKind::StemsDsp, Vec::new());
        let err = runner.run_stage(&mut ctx, &contract, 1, 1).unwrap_err();
        assert!(matches!(err, PipelineError::ProcessFailed { .. }));
        // Pre-record stored, post never reached.
        assert!(ctx.has_analysis("FAIL"));
        assert!(!ctx.has_analysis("FAIL:post"));
    }

    #[test]
    fn cancelled_context_short_circuits() {
        let registry = registry();
        let sink = NullProgressSink;
        let logger = JobLogger::null("j");
        let runner = StageRunner::new(&registry, &sink, &logger);

        let mut ctx = ctx_with_stem();
        ctx.request_cancel();
        let contract = contract("HALF", StageKind::StemsDsp, Vec::new());
        let err = runner.run_stage(&mut ctx, &contract, 1, 1).unwrap_err();
        assert!(err.is_cancellation());
        assert!(!ctx.has_analysis("HALF"));
    }

    #[test]
    fn unknown_stage_is_reported() {
        let registry = StageRegistry::new();
        let sink = NullProgressSink;
        let logger = JobLogger::null("j");
        let runner = StageRunner::new(&registry, &sink, &logger);

        let mut ctx = ctx_with_stem();
        let contract = contract("GHOST", StageKind::AnalysisOnly, Vec::new());
        let err = runner.run_stage(&mut ctx, &contract, 1, 1).unwrap_err();
        assert!(matches!(err, PipelineError::UnknownStage { .. }));
    }
}
