//! Master program gain (mixdown-DSP).
//!
//! Moves the mix's integrated loudness toward the delivery target. The
//! final limiter downstream handles whatever true-peak overshoot this
//! gain introduces.

use crate::analysis::AnalysisRecord;
use crate::audio::{db_to_linear, integrated_lufs};
use crate::context::JobContext;
use crate::contracts::Contract;
use crate::orchestrator::errors::{StageError, StageResult};
use crate::stages::Stage;

pub struct MasterGainStage;

impl MasterGainStage {
    pub fn new() -> Self {
        Self
    }
}

impl Default for MasterGainStage {
    fn default() -> Self {
        Self::new()
    }
}

impl Stage for MasterGainStage {
    fn analyse(&self, ctx: &JobContext, contract: &Contract) -> StageResult<AnalysisRecord> {
        let mut record = AnalysisRecord::for_contract(contract);

        let measured = ctx
            .mixdown()
            .map(|mix| integrated_lufs(mix, ctx.sample_rate()))
            .unwrap_or(f64::NEG_INFINITY);
        let target = contract.metric("target_lufs").unwrap_or(-14.0);
        let max_gain = contract.limit("max_gain_db").unwrap_or(10.0);

        let gain_db = if measured.is_finite() {
            (target - measured).clamp(-max_gain, max_gain)
        } else {
            0.0
        };

        record.set_session("integrated_lufs_measured", measured);
        record.set_session("target_lufs", target);
        record.set_parameter("gain_db", gain_db);
        Ok(record)
    }

    fn process(
        &self,
        ctx: &mut JobContext,
        _contract: &Contract,
        pre: &AnalysisRecord,
    ) -> StageResult<()> {
        let gain_db = pre
            .parameter_number("gain_db")
            .ok_or_else(|| StageError::missing_record("gain_db parameter"))?;
        if gain_db.abs() < 0.01 {
            return Ok(());
        }
        let mix = ctx
            .mixdown_mut()
            .ok_or_else(|| StageError::precondition("mixdown not rendered"))?;
        mix.apply_gain(db_to_linear(gain_db) as f32);
        Ok(())
    }
}
