//! Mixbus tonal balance (mixdown-DSP).
//!
//! Measures the spectral tilt of the mix and nudges it toward the style
//! target with complementary low/high shelves on the mixdown.

use crate::analysis::AnalysisRecord;
use crate::audio::AudioBuffer;
use crate::context::JobContext;
use crate::contracts::Contract;
use crate::dsp::{band_energies, high_shelf, low_shelf};
use crate::orchestrator::errors::{StageError, StageResult};
use crate::stages::Stage;

const LOW_CORNER_HZ: f64 = 250.0;
const HIGH_CORNER_HZ: f64 = 4_000.0;

pub struct TonalBalanceStage;

impl TonalBalanceStage {
    pub fn new() -> Self {
        Self
    }
}

impl Default for TonalBalanceStage {
    fn default() -> Self {
        Self::new()
    }
}

impl Stage for TonalBalanceStage {
    fn analyse(&self, ctx: &JobContext, contract: &Contract) -> StageResult<AnalysisRecord> {
        let mut record = AnalysisRecord::for_contract(contract);
        let Some(mix) = ctx.mixdown() else {
            record.set_parameter("shelf_gain_db", 0.0);
            return Ok(record);
        };

        let bands = band_energies(mix, ctx.sample_rate());
        let target = contract.metric("tilt_target_db").unwrap_or(-6.0);
        let max_shelf = contract.limit("max_shelf_db").unwrap_or(4.0);

        // Split the tilt error across the two shelves.
        let shelf_gain_db = if bands.low_db.is_finite() && bands.high_db.is_finite() {
            ((target - bands.tilt_db) / 2.0).clamp(-max_shelf, max_shelf)
        } else {
            0.0
        };

        record.set_session("low_band_db", bands.low_db);
        record.set_session("mid_band_db", bands.mid_db);
        record.set_session("high_band_db", bands.high_db);
        record.set_session("tilt_db_measured", bands.tilt_db);
        record.set_session("tilt_target_db", target);
        record.set_parameter("shelf_gain_db", shelf_gain_db);
        Ok(record)
    }

    fn process(
        &self,
        ctx: &mut JobContext,
        _contract: &Contract,
        pre: &AnalysisRecord,
    ) -> StageResult<()> {
        let shelf_gain_db = pre
            .parameter_number("shelf_gain_db")
            .ok_or_else(|| StageError::missing_record("shelf_gain_db parameter"))?;
        if shelf_gain_db.abs() < 0.01 {
            return Ok(());
        }

        let rate = ctx.sample_rate();
        let mix = ctx
            .mixdown_mut()
            .ok_or_else(|| StageError::precondition("mixdown not rendered"))?;

        apply_tilt(mix, rate, shelf_gain_db);
        Ok(())
    }
}

/// Complementary shelves: positive gain brightens, negative darkens.
fn apply_tilt(mix: &mut AudioBuffer, sample_rate: u32, shelf_gain_db: f64) {
    low_shelf(mix, sample_rate, LOW_CORNER_HZ, -shelf_gain_db);
    high_shelf(mix, sample_rate, HIGH_CORNER_HZ, shelf_gain_db);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{CancelHandle, Stem};
    use crate::contracts::ContractRegistry;

    fn contract() -> Contract {
        ContractRegistry::standard()
            .get("S7_MIXBUS_TONAL_BALANCE")
            .unwrap()
            .clone()
    }

    /// A very dark mix: all energy at 100 Hz.
    fn dark_ctx() -> JobContext {
        let rate = 48_000u32;
        let mut ctx = JobContext::new("j", CancelHandle::new());
        ctx.set_sample_rate(rate);
        let samples: Vec<f32> = (0..rate as usize)
            .map(|i| 0.4 * (2.0 * std::f64::consts::PI * 100.0 * i as f64 / rate as f64).sin() as f32)
            .collect();
        ctx.stems_mut().insert(
            "bass.wav".to_string(),
            Stem::new("bass.wav", rate, AudioBuffer::new(1, samples)),
        );
        ctx.refresh_mixdown();
        ctx
    }

    #[test]
    fn dark_mix_gets_a_brightening_shelf() {
        let ctx = dark_ctx();
        let pre = TonalBalanceStage::new().analyse(&ctx, &contract()).unwrap();
        let gain = pre.parameter_number("shelf_gain_db").unwrap();
        // Measured tilt is far below target; shelf maxes out at the limit.
        assert!((gain - 4.0).abs() < 1e-9, "gain {gain}");
    }

    #[test]
    fn processing_moves_the_tilt_toward_target() {
        let mut ctx = dark_ctx();
        let stage = TonalBalanceStage::new();
        let pre = stage.analyse(&ctx, &contract()).unwrap();
        let before = pre.session_number("tilt_db_measured").unwrap();

        stage.process(&mut ctx, &contract(), &pre).unwrap();
        let after = band_energies(ctx.mixdown().unwrap(), ctx.sample_rate()).tilt_db;
        assert!(after > before, "{before} -> {after}");
    }

    #[test]
    fn missing_mixdown_analyse_is_benign() {
        let mut ctx = JobContext::new("j", CancelHandle::new());
        ctx.set_sample_rate(48_000);
        let pre = TonalBalanceStage::new().analyse(&ctx, &contract()).unwrap();
        assert_eq!(pre.parameter_number("shelf_gain_db"), Some(0.0));
    }
}
