//! Session format normalization (structural).
//!
//! Brings every stem to the session target sample rate and pulls hot stems
//! down to the target working peak. This is the stage that reconciles
//! mixed-rate uploads; after it runs, the context rate is authoritative
//! for the rest of the pipeline.

use crate::analysis::{AnalysisRecord, StemAnalysis};
use crate::audio::{db_to_linear, peak_dbfs};
use crate::context::JobContext;
use crate::contracts::Contract;
use crate::dsp::resample_linear;
use crate::orchestrator::errors::{StageError, StageResult};
use crate::stages::Stage;

pub struct SessionFormatStage;

impl SessionFormatStage {
    pub fn new() -> Self {
        Self
    }

    /// The rate everything gets normalized to: the contract target when
    /// declared, otherwise the session rate the first stem established.
    fn target_rate(ctx: &JobContext, contract: &Contract) -> u32 {
        contract
            .metric("samplerate_hz")
            .map(|r| r as u32)
            .filter(|&r| r > 0)
            .unwrap_or_else(|| ctx.sample_rate())
    }
}

impl Default for SessionFormatStage {
    fn default() -> Self {
        Self::new()
    }
}

impl Stage for SessionFormatStage {
    fn analyse(&self, ctx: &JobContext, contract: &Contract) -> StageResult<AnalysisRecord> {
        let mut record = AnalysisRecord::for_contract(contract);
        let target_rate = Self::target_rate(ctx, contract);

        let mut to_resample = 0u32;
        let mut to_normalize = 0u32;
        let max_peak_dbfs = contract.metric("max_peak_dbfs");

        for stem in ctx.stems().values() {
            let peak = peak_dbfs(&stem.buffer);
            if stem.rate_hz != target_rate {
                to_resample += 1;
            }
            if max_peak_dbfs.is_some_and(|limit| peak > limit) {
                to_normalize += 1;
            }
            record.push_stem(
                StemAnalysis::new(&stem.name)
                    .with("samplerate_hz", stem.rate_hz as f64)
                    .with("peak_dbfs", peak)
                    .with("frames", stem.buffer.frames() as f64),
            );
        }

        record.set_session("session_rate_hz", ctx.sample_rate() as f64);
        record.set_session("target_rate_hz", target_rate as f64);
        record.set_parameter("stems_to_resample", to_resample as f64);
        record.set_parameter("stems_to_normalize", to_normalize as f64);
        Ok(record)
    }

    fn process(
        &self,
        ctx: &mut JobContext,
        contract: &Contract,
        _pre: &AnalysisRecord,
    ) -> StageResult<()> {
        let target_rate = Self::target_rate(ctx, contract);
        let max_peak = contract.metric("max_peak_dbfs").map(db_to_linear);

        let names: Vec<String> = ctx.stems().keys().cloned().collect();
        for name in names {
            if ctx.is_cancelled() {
                return Err(StageError::Cancelled);
            }
            let stem = ctx
                .stems_mut()
                .get_mut(&name)
                .expect("stem disappeared mid-stage");

            if stem.rate_hz != target_rate {
                stem.buffer = resample_linear(&stem.buffer, stem.rate_hz, target_rate);
                stem.rate_hz = target_rate;
            }

            if let Some(ceiling) = max_peak {
                let peak = stem.buffer.peak() as f64;
                if peak > ceiling {
                    stem.buffer.apply_gain((ceiling / peak) as f32);
                }
            }
        }

        ctx.set_sample_rate(target_rate);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::AudioBuffer;
    use crate::context::{CancelHandle, Stem};
    use crate::contracts::ContractRegistry;

    fn ctx_with_stem(rate: u32, amplitude: f32) -> JobContext {
        let mut ctx = JobContext::new("j", CancelHandle::new());
        ctx.set_sample_rate(rate);
        ctx.stems_mut().insert(
            "a.wav".to_string(),
            Stem::new("a.wav", rate, AudioBuffer::new(1, vec![amplitude; 1_000])),
        );
        ctx
    }

    fn contract() -> Contract {
        ContractRegistry::standard()
            .get("S0_SESSION_FORMAT")
            .unwrap()
            .clone()
    }

    #[test]
    fn resamples_to_contract_target() {
        let mut ctx = ctx_with_stem(44_100, 0.1);
        let stage = SessionFormatStage::new();
        let pre = stage.analyse(&ctx, &contract()).unwrap();
        assert_eq!(pre.parameter_number("stems_to_resample"), Some(1.0));

        stage.process(&mut ctx, &contract(), &pre).unwrap();
        assert_eq!(ctx.sample_rate(), 48_000);
        assert_eq!(ctx.stems()["a.wav"].rate_hz, 48_000);
    }

    #[test]
    fn pulls_hot_stems_to_target_peak() {
        let mut ctx = ctx_with_stem(48_000, 0.99);
        let stage = SessionFormatStage::new();
        let pre = stage.analyse(&ctx, &contract()).unwrap();
        stage.process(&mut ctx, &contract(), &pre).unwrap();

        let peak = peak_dbfs(&ctx.stems()["a.wav"].buffer);
        assert!((peak + 3.0).abs() < 0.1, "peak {peak}");
    }

    #[test]
    fn quiet_stems_are_untouched() {
        let mut ctx = ctx_with_stem(48_000, 0.1);
        let before = ctx.stems()["a.wav"].buffer.clone();
        let stage = SessionFormatStage::new();
        let pre = stage.analyse(&ctx, &contract()).unwrap();
        stage.process(&mut ctx, &contract(), &pre).unwrap();
        assert_eq!(ctx.stems()["a.wav"].buffer, before);
    }
}
