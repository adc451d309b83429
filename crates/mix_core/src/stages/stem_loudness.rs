//! Stem working loudness measurement (analysis-only).
//!
//! Per-stem integrated loudness and true peak, plus the current mixbus
//! peak. Several downstream stages declare this record as a dependency,
//! so it also resolves each stem's instrument profile from the session
//! metadata and pins it into the record.

use serde_json::Value;

use crate::analysis::{AnalysisRecord, StemAnalysis};
use crate::audio::{integrated_lufs, peak_dbfs, true_peak_dbfs};
use crate::context::JobContext;
use crate::contracts::Contract;
use crate::models::meta_keys;
use crate::orchestrator::errors::StageResult;
use crate::stages::Stage;

pub struct StemLoudnessStage;

impl StemLoudnessStage {
    pub fn new() -> Self {
        Self
    }
}

impl Default for StemLoudnessStage {
    fn default() -> Self {
        Self::new()
    }
}

/// Resolve the instrument profile for a stem from `profiles_by_name`.
///
/// `"auto"` and absent entries fall back to `"Other"`; explicit choices
/// pass through unchanged.
pub(crate) fn resolve_profile<'a>(metadata: &'a serde_json::Map<String, Value>, file_name: &str) -> &'a str {
    let requested = metadata
        .get(meta_keys::PROFILES_BY_NAME)
        .and_then(|m| m.get(file_name))
        .and_then(Value::as_str)
        .unwrap_or("Other");
    if requested.eq_ignore_ascii_case("auto") {
        "Other"
    } else {
        requested
    }
}

impl Stage for StemLoudnessStage {
    fn analyse(&self, ctx: &JobContext, contract: &Contract) -> StageResult<AnalysisRecord> {
        let mut record = AnalysisRecord::for_contract(contract);
        let rate = ctx.sample_rate();

        let mut max_true_peak = f64::NEG_INFINITY;
        for stem in ctx.stems().values() {
            let lufs = integrated_lufs(&stem.buffer, rate);
            let true_peak = true_peak_dbfs(&stem.buffer);
            max_true_peak = max_true_peak.max(true_peak);

            record.push_stem(
                StemAnalysis::new(&stem.name)
                    .with("samplerate_hz", stem.rate_hz as f64)
                    .with("integrated_lufs", lufs)
                    .with("true_peak_dbfs", true_peak)
                    .with("instrument_profile", resolve_profile(ctx.metadata(), &stem.name)),
            );
        }

        let mixbus_peak = ctx
            .mixdown()
            .map(peak_dbfs)
            .unwrap_or(f64::NEG_INFINITY);

        record.set_session("max_true_peak_dbfs_measured", max_true_peak);
        record.set_session("mixbus_peak_dbfs_measured", mixbus_peak);
        Ok(record)
    }
}
