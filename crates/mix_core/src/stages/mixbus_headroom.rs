//! Mixbus headroom trim (stems-DSP).
//!
//! Applies one uniform trim gain to every stem so the summed mixbus peaks
//! at the working headroom target. Trimming the stems (rather than the
//! mixdown) keeps later stem-level stages operating at the same gain
//! staging the mix bus sees.

use crate::analysis::{AnalysisRecord, StemAnalysis};
use crate::audio::{db_to_linear, peak_dbfs};
use crate::context::JobContext;
use crate::contracts::Contract;
use crate::orchestrator::errors::{StageError, StageResult};
use crate::stages::Stage;

/// Trims below this magnitude are not worth a pass over the samples.
const MIN_TRIM_DB: f64 = 0.01;

pub struct MixbusHeadroomStage;

impl MixbusHeadroomStage {
    pub fn new() -> Self {
        Self
    }
}

impl Default for MixbusHeadroomStage {
    fn default() -> Self {
        Self::new()
    }
}

impl Stage for MixbusHeadroomStage {
    fn analyse(&self, ctx: &JobContext, contract: &Contract) -> StageResult<AnalysisRecord> {
        let mut record = AnalysisRecord::for_contract(contract);

        let measured = ctx
            .mixdown()
            .map(peak_dbfs)
            .unwrap_or(f64::NEG_INFINITY);
        let target = contract.metric("mixbus_peak_target_dbfs").unwrap_or(-6.0);
        let max_gain = contract.limit("max_gain_db").unwrap_or(12.0);

        let trim_gain_db = if measured.is_finite() {
            (target - measured).clamp(-max_gain, max_gain)
        } else {
            0.0
        };

        for stem in ctx.stems().values() {
            record.push_stem(
                StemAnalysis::new(&stem.name).with("peak_dbfs", peak_dbfs(&stem.buffer)),
            );
        }
        record.set_session("mixbus_peak_dbfs_measured", measured);
        record.set_session("mixbus_peak_target_dbfs", target);
        record.set_parameter("trim_gain_db", trim_gain_db);
        Ok(record)
    }

    fn process(
        &self,
        ctx: &mut JobContext,
        _contract: &Contract,
        pre: &AnalysisRecord,
    ) -> StageResult<()> {
        let trim_gain_db = pre
            .parameter_number("trim_gain_db")
            .ok_or_else(|| StageError::missing_record("trim_gain_db parameter"))?;
        if trim_gain_db.abs() < MIN_TRIM_DB {
            return Ok(());
        }

        let gain = db_to_linear(trim_gain_db) as f32;
        let names: Vec<String> = ctx.stems().keys().cloned().collect();
        for name in names {
            if ctx.is_cancelled() {
                return Err(StageError::Cancelled);
            }
            ctx.stems_mut()
                .get_mut(&name)
                .expect("stem disappeared mid-stage")
                .buffer
                .apply_gain(gain);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::AudioBuffer;
    use crate::context::{CancelHandle, Stem};
    use crate::contracts::ContractRegistry;

    fn contract() -> Contract {
        ContractRegistry::standard()
            .get("S3_MIXBUS_HEADROOM")
            .unwrap()
            .clone()
    }

    fn ctx_peaking_at(amplitude: f32) -> JobContext {
        let mut ctx = JobContext::new("j", CancelHandle::new());
        ctx.set_sample_rate(48_000);
        ctx.stems_mut().insert(
            "a.wav".to_string(),
            Stem::new(
                "a.wav",
                48_000,
                AudioBuffer::new(1, vec![amplitude, -amplitude, amplitude]),
            ),
        );
        ctx.refresh_mixdown();
        ctx
    }

    #[test]
    fn trims_hot_mixbus_to_target() {
        let mut ctx = ctx_peaking_at(0.9);
        let stage = MixbusHeadroomStage::new();
        let pre = stage.analyse(&ctx, &contract()).unwrap();
        assert!(pre.parameter_number("trim_gain_db").unwrap() < 0.0);

        stage.process(&mut ctx, &contract(), &pre).unwrap();
        ctx.refresh_mixdown();
        let peak = peak_dbfs(ctx.mixdown().unwrap());
        assert!((peak + 6.0).abs() < 0.1, "peak {peak}");
    }

    #[test]
    fn boosts_quiet_mixbus_within_limit() {
        let mut ctx = ctx_peaking_at(0.01);
        let stage = MixbusHeadroomStage::new();
        let pre = stage.analyse(&ctx, &contract()).unwrap();
        // Needed gain is ~34 dB; the contract caps at 12.
        assert!((pre.parameter_number("trim_gain_db").unwrap() - 12.0).abs() < 1e-9);

        stage.process(&mut ctx, &contract(), &pre).unwrap();
        ctx.refresh_mixdown();
        assert!(peak_dbfs(ctx.mixdown().unwrap()) < -6.0);
    }

    #[test]
    fn silent_mixbus_is_a_no_op() {
        let mut ctx = ctx_peaking_at(0.0);
        let stage = MixbusHeadroomStage::new();
        let pre = stage.analyse(&ctx, &contract()).unwrap();
        assert_eq!(pre.parameter_number("trim_gain_db"), Some(0.0));
        stage.process(&mut ctx, &contract(), &pre).unwrap();
    }
}
