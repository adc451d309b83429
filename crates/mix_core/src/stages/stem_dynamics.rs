//! Stem dynamics control (stems-DSP).
//!
//! Compresses stems whose crest factor sits well above the contract
//! target. Gain reduction is bounded by the contract limit; makeup gain
//! restores the pre-compression RMS so the static mix balance survives.

use crate::analysis::{AnalysisRecord, StemAnalysis};
use crate::audio::{crest_factor_db, peak_dbfs, rms_dbfs};
use crate::context::JobContext;
use crate::contracts::Contract;
use crate::dsp::{compress, CompressorParams};
use crate::orchestrator::errors::{StageError, StageResult};
use crate::stages::Stage;

/// Crest overshoot below which a stem is left uncompressed.
const CREST_TOLERANCE_DB: f64 = 2.0;

pub struct StemDynamicsStage;

impl StemDynamicsStage {
    pub fn new() -> Self {
        Self
    }

    fn crest_target(contract: &Contract) -> f64 {
        contract.metric("crest_target_db").unwrap_or(14.0)
    }
}

impl Default for StemDynamicsStage {
    fn default() -> Self {
        Self::new()
    }
}

impl Stage for StemDynamicsStage {
    fn analyse(&self, ctx: &JobContext, contract: &Contract) -> StageResult<AnalysisRecord> {
        let mut record = AnalysisRecord::for_contract(contract);
        let target = Self::crest_target(contract);

        let mut max_crest = 0.0f64;
        let mut flagged = 0u32;
        for stem in ctx.stems().values() {
            let crest = crest_factor_db(&stem.buffer);
            max_crest = max_crest.max(crest);
            let needs = crest > target + CREST_TOLERANCE_DB;
            if needs {
                flagged += 1;
            }
            record.push_stem(
                StemAnalysis::new(&stem.name)
                    .with("crest_db", crest)
                    .with("rms_dbfs", rms_dbfs(&stem.buffer))
                    .with("needs_compression", needs),
            );
        }

        record.set_session("max_crest_db", max_crest);
        record.set_session("crest_target_db", target);
        record.set_parameter("stems_to_compress", flagged as f64);
        Ok(record)
    }

    fn process(
        &self,
        ctx: &mut JobContext,
        contract: &Contract,
        _pre: &AnalysisRecord,
    ) -> StageResult<()> {
        let target = Self::crest_target(contract);
        let max_reduction = contract.limit("max_gain_reduction_db").unwrap_or(8.0);
        let rate = ctx.sample_rate();

        let names: Vec<String> = ctx.stems().keys().cloned().collect();
        for name in names {
            if ctx.is_cancelled() {
                return Err(StageError::Cancelled);
            }
            let stem = ctx
                .stems_mut()
                .get_mut(&name)
                .expect("stem disappeared mid-stage");

            let crest = crest_factor_db(&stem.buffer);
            let overshoot = crest - target;
            if overshoot <= CREST_TOLERANCE_DB {
                continue;
            }

            let peak = peak_dbfs(&stem.buffer);
            let rms_before = rms_dbfs(&stem.buffer);
            if !peak.is_finite() {
                continue;
            }

            // Put the threshold where the excess crest lives, capped by
            // the contract's reduction limit.
            let reduction = overshoot.min(max_reduction);
            let params = CompressorParams {
                threshold_db: peak - reduction,
                ratio: 4.0,
                attack_ms: 8.0,
                release_ms: 120.0,
                makeup_db: 0.0,
            };
            compress(&mut stem.buffer, rate, &params);

            // Makeup to the original RMS.
            let rms_after = rms_dbfs(&stem.buffer);
            if rms_before.is_finite() && rms_after.is_finite() {
                let makeup = (rms_before - rms_after).clamp(0.0, max_reduction);
                stem.buffer
                    .apply_gain(crate::audio::db_to_linear(makeup) as f32);
            }
        }
        Ok(())
    }
}
