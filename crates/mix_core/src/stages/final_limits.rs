//! Master final limits (mixdown-DSP): true-peak ceiling enforcement.

use crate::analysis::AnalysisRecord;
use crate::audio::true_peak_dbfs;
use crate::context::JobContext;
use crate::contracts::Contract;
use crate::dsp::{limit, LimiterParams};
use crate::orchestrator::errors::{StageError, StageResult};
use crate::stages::Stage;

/// The last processing stage before delivery. Anything still above the
/// contract ceiling after this is a bug in the limiter, not a mix
/// decision.
pub struct FinalLimitsStage;

impl FinalLimitsStage {
    pub fn new() -> Self {
        Self
    }
}

impl Default for FinalLimitsStage {
    fn default() -> Self {
        Self::new()
    }
}

impl Stage for FinalLimitsStage {
    fn analyse(&self, ctx: &JobContext, contract: &Contract) -> StageResult<AnalysisRecord> {
        let mut record = AnalysisRecord::for_contract(contract);

        let measured = ctx
            .mixdown()
            .map(true_peak_dbfs)
            .unwrap_or(f64::NEG_INFINITY);
        let ceiling = contract.metric("true_peak_ceiling_dbtp").unwrap_or(-1.0);

        record.set_session("true_peak_dbtp_measured", measured);
        record.set_session("true_peak_ceiling_dbtp", ceiling);
        record.set_parameter("ceiling_db", ceiling);
        record.set_parameter(
            "limiting_needed",
            if measured > ceiling { 1.0 } else { 0.0 },
        );
        Ok(record)
    }

    fn process(
        &self,
        ctx: &mut JobContext,
        _contract: &Contract,
        pre: &AnalysisRecord,
    ) -> StageResult<()> {
        if pre.parameter_number("limiting_needed") == Some(0.0) {
            return Ok(());
        }
        let ceiling_db = pre
            .parameter_number("ceiling_db")
            .ok_or_else(|| StageError::missing_record("ceiling_db parameter"))?;

        let rate = ctx.sample_rate();
        let mix = ctx
            .mixdown_mut()
            .ok_or_else(|| StageError::precondition("mixdown not rendered"))?;

        limit(
            mix,
            rate,
            &LimiterParams {
                ceiling_db,
                ..Default::default()
            },
        );
        Ok(())
    }
}
