//! Manual correction adjustment (structural).
//!
//! Applies caller-reviewed per-stem corrections carried in the session
//! metadata: gain offsets, pans, and mutes. Panning converts mono stems
//! to stereo (constant-power law), and a mute drops the stem entirely -
//! both structural changes, which is why this stage carries that kind and
//! the runner re-lays-out the mixdown afterwards.

use serde::Deserialize;
use serde_json::Value;

use crate::analysis::{AnalysisRecord, StemAnalysis};
use crate::audio::{db_to_linear, peak_dbfs, AudioBuffer};
use crate::context::JobContext;
use crate::contracts::Contract;
use crate::models::meta_keys;
use crate::orchestrator::errors::{StageError, StageResult};
use crate::stages::Stage;

/// One correction entry from the session metadata.
#[derive(Debug, Clone, Deserialize)]
struct Correction {
    file_name: String,
    #[serde(default)]
    gain_db: Option<f64>,
    /// Pan position, -1.0 (hard left) to 1.0 (hard right).
    #[serde(default)]
    pan: Option<f64>,
    #[serde(default)]
    mute: bool,
}

fn parse_corrections(metadata: &serde_json::Map<String, Value>) -> StageResult<Vec<Correction>> {
    let Some(raw) = metadata.get(meta_keys::MANUAL_CORRECTIONS) else {
        return Ok(Vec::new());
    };
    serde_json::from_value(raw.clone())
        .map_err(|e| StageError::bad_metadata(meta_keys::MANUAL_CORRECTIONS, e.to_string()))
}

/// Constant-power pan of a buffer; mono input becomes stereo.
fn pan_buffer(buffer: &AudioBuffer, pan: f64) -> AudioBuffer {
    let angle = (pan.clamp(-1.0, 1.0) + 1.0) * std::f64::consts::FRAC_PI_4;
    let left_gain = angle.cos() as f32 * std::f32::consts::SQRT_2;
    let right_gain = angle.sin() as f32 * std::f32::consts::SQRT_2;

    let stereo = buffer.to_stereo();
    let mut samples = stereo.into_samples();
    for frame in samples.chunks_exact_mut(2) {
        frame[0] *= left_gain;
        frame[1] *= right_gain;
    }
    AudioBuffer::new(2, samples)
}

pub struct ManualCorrectionStage;

impl ManualCorrectionStage {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ManualCorrectionStage {
    fn default() -> Self {
        Self::new()
    }
}

impl Stage for ManualCorrectionStage {
    fn analyse(&self, ctx: &JobContext, contract: &Contract) -> StageResult<AnalysisRecord> {
        let mut record = AnalysisRecord::for_contract(contract);
        let corrections = parse_corrections(ctx.metadata())?;

        let applicable = corrections
            .iter()
            .filter(|c| ctx.stems().contains_key(&c.file_name))
            .count();

        for stem in ctx.stems().values() {
            let correction = corrections.iter().find(|c| c.file_name == stem.name);
            record.push_stem(
                StemAnalysis::new(&stem.name)
                    .with("peak_dbfs", peak_dbfs(&stem.buffer))
                    .with("channels", stem.buffer.channels() as f64)
                    .with("has_correction", correction.is_some()),
            );
        }

        record.set_session("corrections_requested", corrections.len() as f64);
        record.set_parameter("corrections_to_apply", applicable as f64);
        Ok(record)
    }

    fn process(
        &self,
        ctx: &mut JobContext,
        contract: &Contract,
        _pre: &AnalysisRecord,
    ) -> StageResult<()> {
        let corrections = parse_corrections(ctx.metadata())?;
        let max_gain = contract.limit("max_correction_gain_db").unwrap_or(12.0);

        for correction in corrections {
            if ctx.is_cancelled() {
                return Err(StageError::Cancelled);
            }
            if correction.mute {
                ctx.stems_mut().remove(&correction.file_name);
                continue;
            }
            let Some(stem) = ctx.stems_mut().get_mut(&correction.file_name) else {
                // Correction for a stem that never arrived; nothing to do.
                continue;
            };

            if let Some(gain_db) = correction.gain_db {
                let bounded = gain_db.clamp(-max_gain, max_gain);
                stem.buffer.apply_gain(db_to_linear(bounded) as f32);
            }
            if let Some(pan) = correction.pan {
                stem.buffer = pan_buffer(&stem.buffer, pan);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{CancelHandle, Stem};
    use crate::contracts::ContractRegistry;

    fn contract() -> Contract {
        ContractRegistry::standard()
            .get("S6_MANUAL_CORRECTION")
            .unwrap()
            .clone()
    }

    fn ctx_with_corrections(corrections: Value) -> JobContext {
        let mut ctx = JobContext::new("j", CancelHandle::new());
        ctx.set_sample_rate(48_000);
        ctx.stems_mut().insert(
            "gtr.wav".to_string(),
            Stem::new("gtr.wav", 48_000, AudioBuffer::new(1, vec![0.5; 100])),
        );
        ctx.apply_metadata(
            serde_json::json!({ (meta_keys::MANUAL_CORRECTIONS): corrections })
                .as_object()
                .unwrap(),
        );
        ctx
    }

    #[test]
    fn gain_is_applied_and_clamped() {
        let mut ctx =
            ctx_with_corrections(serde_json::json!([{"file_name": "gtr.wav", "gain_db": -60.0}]));
        let stage = ManualCorrectionStage::new();
        let pre = stage.analyse(&ctx, &contract()).unwrap();
        stage.process(&mut ctx, &contract(), &pre).unwrap();

        // Clamped to -12 dB, not -60.
        let peak = peak_dbfs(&ctx.stems()["gtr.wav"].buffer);
        assert!((peak - (peak_dbfs(&AudioBuffer::new(1, vec![0.5])) - 12.0)).abs() < 0.1);
    }

    #[test]
    fn pan_converts_mono_to_stereo() {
        let mut ctx =
            ctx_with_corrections(serde_json::json!([{"file_name": "gtr.wav", "pan": -1.0}]));
        let stage = ManualCorrectionStage::new();
        let pre = stage.analyse(&ctx, &contract()).unwrap();
        stage.process(&mut ctx, &contract(), &pre).unwrap();

        let buffer = &ctx.stems()["gtr.wav"].buffer;
        assert_eq!(buffer.channels(), 2);
        // Hard left: right channel is silent.
        assert!(buffer.channel_iter(1).all(|s| s.abs() < 1e-6));
        assert!(buffer.channel_iter(0).any(|s| s.abs() > 0.1));
    }

    #[test]
    fn mute_drops_the_stem() {
        let mut ctx =
            ctx_with_corrections(serde_json::json!([{"file_name": "gtr.wav", "mute": true}]));
        let stage = ManualCorrectionStage::new();
        let pre = stage.analyse(&ctx, &contract()).unwrap();
        stage.process(&mut ctx, &contract(), &pre).unwrap();
        assert!(ctx.stems().is_empty());
    }

    #[test]
    fn malformed_corrections_are_bad_metadata() {
        let ctx = ctx_with_corrections(serde_json::json!({"not": "a list"}));
        let err = ManualCorrectionStage::new()
            .analyse(&ctx, &contract())
            .unwrap_err();
        assert!(matches!(err, StageError::BadMetadata { .. }));
    }

    #[test]
    fn no_corrections_is_a_clean_no_op() {
        let mut ctx = JobContext::new("j", CancelHandle::new());
        ctx.set_sample_rate(48_000);
        ctx.stems_mut().insert(
            "a.wav".to_string(),
            Stem::new("a.wav", 48_000, AudioBuffer::new(1, vec![0.3; 10])),
        );
        let before = ctx.stems()["a.wav"].buffer.clone();

        let stage = ManualCorrectionStage::new();
        let pre = stage.analyse(&ctx, &contract()).unwrap();
        assert_eq!(pre.parameter_number("corrections_to_apply"), Some(0.0));
        stage.process(&mut ctx, &contract(), &pre).unwrap();
        assert_eq!(ctx.stems()["a.wav"].buffer, before);
    }
}
