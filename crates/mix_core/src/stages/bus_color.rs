//! Mixbus color (mixdown-DSP): gentle saturation drive.

use crate::analysis::AnalysisRecord;
use crate::audio::crest_factor_db;
use crate::context::JobContext;
use crate::contracts::Contract;
use crate::dsp::saturate;
use crate::orchestrator::errors::{StageError, StageResult};
use crate::stages::Stage;

pub struct BusColorStage;

impl BusColorStage {
    pub fn new() -> Self {
        Self
    }
}

impl Default for BusColorStage {
    fn default() -> Self {
        Self::new()
    }
}

impl Stage for BusColorStage {
    fn analyse(&self, ctx: &JobContext, contract: &Contract) -> StageResult<AnalysisRecord> {
        let mut record = AnalysisRecord::for_contract(contract);

        let crest = ctx.mixdown().map(crest_factor_db).unwrap_or(0.0);
        let target_drive = contract.metric("drive_target_db").unwrap_or(3.0);
        let max_drive = contract.limit("max_drive_db").unwrap_or(6.0);
        let drive_db = target_drive.clamp(0.0, max_drive);

        record.set_session("crest_db_measured", crest);
        record.set_parameter("drive_db", drive_db);
        Ok(record)
    }

    fn process(
        &self,
        ctx: &mut JobContext,
        _contract: &Contract,
        pre: &AnalysisRecord,
    ) -> StageResult<()> {
        let drive_db = pre
            .parameter_number("drive_db")
            .ok_or_else(|| StageError::missing_record("drive_db parameter"))?;
        if drive_db <= 0.0 {
            return Ok(());
        }
        let mix = ctx
            .mixdown_mut()
            .ok_or_else(|| StageError::precondition("mixdown not rendered"))?;
        saturate(mix, drive_db);
        Ok(())
    }
}
