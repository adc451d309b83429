//! Report assembly (`report.json`).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::analysis::{MetricValue, StageDiff};
use crate::audio::{
    channel_loudness_diff_db, integrated_lufs, loudness_range_lu, stereo_correlation,
    true_peak_dbfs,
};
use crate::context::JobContext;
use crate::dsp::estimate_tempo_bpm;
use crate::models::FinalMetrics;
use crate::runner::StageExecution;

/// The report artifact name.
pub const REPORT_ARTIFACT: &str = "report.json";

/// Outcome of one stage as recorded in the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageReportStatus {
    Analyzed,
    Skipped,
    Failed,
}

/// Per-stage summary in the report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageReportEntry {
    pub contract_id: String,
    pub name: String,
    pub status: StageReportStatus,
    /// Post-analysis session block (what the stage left behind).
    pub session: BTreeMap<String, MetricValue>,
    /// Processing parameters the stage decided on.
    pub parameters: BTreeMap<String, MetricValue>,
    /// Per-stage auxiliary artifacts (published under `<contract_id>/`).
    pub images: Vec<String>,
    pub diff: StageDiff,
}

/// Wall-clock accounting for the run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineDurations {
    pub stages: Vec<StageDuration>,
    pub total_duration_sec: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageDuration {
    pub contract_id: String,
    pub duration_sec: f64,
}

/// The full `report.json` document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub pipeline_version: String,
    /// ISO-8601 UTC generation timestamp.
    pub generated_at_utc: String,
    pub style_preset: String,
    pub stages: Vec<StageReportEntry>,
    pub final_metrics: FinalMetrics,
    pub pipeline_durations: PipelineDurations,
}

/// Measure the finished mixdown for the terminal status and the report.
///
/// Key and scale are copied from the key-detection record when that stage
/// ran; everything else is measured directly off the final buffer.
pub fn compute_final_metrics(ctx: &JobContext) -> FinalMetrics {
    let Some(mix) = ctx.mixdown() else {
        return FinalMetrics::default();
    };
    let rate = ctx.sample_rate();

    let key_record = ctx.analysis("S1_KEY_DETECTION");
    let key = key_record
        .and_then(|r| r.session_value("detected_key"))
        .and_then(MetricValue::as_text)
        .map(str::to_string);
    let scale = key_record
        .and_then(|r| r.session_value("detected_scale"))
        .and_then(MetricValue::as_text)
        .map(str::to_string);

    FinalMetrics {
        integrated_lufs: integrated_lufs(mix, rate),
        true_peak_dbtp: true_peak_dbfs(mix),
        loudness_range_lu: loudness_range_lu(mix, rate),
        tempo_bpm: estimate_tempo_bpm(mix, rate),
        key,
        scale,
        channel_loudness_diff_db: channel_loudness_diff_db(mix),
        stereo_correlation: stereo_correlation(mix),
    }
}

/// Assemble the report from the executed stages and the final context.
pub fn build_report(
    ctx: &JobContext,
    executions: &[StageExecution],
    stage_names: &BTreeMap<String, String>,
    style_preset: &str,
    final_metrics: FinalMetrics,
) -> Report {
    let stages = executions
        .iter()
        .map(|execution| {
            let prefix = format!("{}/", execution.contract_id);
            let images: Vec<String> = ctx
                .artifacts()
                .keys()
                .filter(|name| name.starts_with(&prefix))
                .cloned()
                .collect();
            StageReportEntry {
                contract_id: execution.contract_id.clone(),
                name: stage_names
                    .get(&execution.contract_id)
                    .cloned()
                    .unwrap_or_else(|| execution.contract_id.clone()),
                status: StageReportStatus::Analyzed,
                session: execution.post.session.clone(),
                parameters: execution.post.parameters.clone(),
                images,
                diff: execution.diff.clone(),
            }
        })
        .collect();

    let stage_durations: Vec<StageDuration> = ctx
        .timings()
        .iter()
        .map(|t| StageDuration {
            contract_id: t.stage_id.clone(),
            duration_sec: t.duration.as_secs_f64(),
        })
        .collect();
    let total_duration_sec = stage_durations.iter().map(|d| d.duration_sec).sum();

    Report {
        pipeline_version: crate::pipeline_version().to_string(),
        generated_at_utc: chrono::Utc::now().to_rfc3339(),
        style_preset: style_preset.to_string(),
        stages,
        final_metrics,
        pipeline_durations: PipelineDurations {
            stages: stage_durations,
            total_duration_sec,
        },
    }
}
